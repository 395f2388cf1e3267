//! IdP metadata endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET handler for `/saml/metadata`.
pub async fn idp_metadata(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/samlmetadata+xml")],
        state.idp_metadata.to_string(),
    )
}
