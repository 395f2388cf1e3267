//! SAML endpoints.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/saml/slo` | [`slo::slo_redirect`] |
//! | POST | `/saml/slo` | [`slo::slo_post`] |
//! | POST | `/saml/slo/soap` | [`slo::slo_soap`] |
//! | GET | `/saml/logout` | [`slo::local_logout`] |
//! | POST | `/saml/artifact` | [`artifact::artifact_resolve`] |
//! | GET | `/saml/metadata` | [`metadata::idp_metadata`] |
//!
//! Every inbound message is checked in [`inbound`] before the orchestrator
//! sees it.

pub mod artifact;
pub mod inbound;
pub mod metadata;
pub mod response;
pub mod slo;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Routes for the SAML endpoints.
pub fn saml_router() -> Router<AppState> {
    Router::new()
        .route("/saml/slo", get(slo::slo_redirect).post(slo::slo_post))
        .route("/saml/slo/soap", post(slo::slo_soap))
        .route("/saml/logout", get(slo::local_logout))
        .route("/saml/artifact", post(artifact::artifact_resolve))
        .route("/saml/metadata", get(metadata::idp_metadata))
}
