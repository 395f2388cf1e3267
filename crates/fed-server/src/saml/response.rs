//! Turning logout steps and errors into HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use fed_logout::{LogoutError, LogoutStep, LogoutSummary};
use fed_protocol_saml::bindings::{SoapBinding, SOAP_CONTENT_TYPE};
use fed_protocol_saml::xml::escape;
use fed_protocol_saml::SamlError;

/// Renders the next step for a browser.
pub fn browser_step(step: LogoutStep) -> Response {
    match step {
        LogoutStep::Redirect(url) => Redirect::temporary(&url).into_response(),
        LogoutStep::PostForm(html) => Html(html).into_response(),
        LogoutStep::SoapResponse(envelope) => soap(StatusCode::OK, envelope),
        LogoutStep::Finished {
            return_to: Some(url),
            ..
        } => Redirect::temporary(&url).into_response(),
        LogoutStep::Finished {
            summary,
            return_to: None,
        } => Html(logout_complete_page(&summary)).into_response(),
    }
}

/// A SOAP envelope with the SOAP content type.
pub fn soap(status: StatusCode, envelope: String) -> Response {
    (status, [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)], envelope).into_response()
}

/// A SOAP fault. Faults travel with status 500.
pub fn soap_fault(err: &LogoutError) -> Response {
    let server_side = match err {
        LogoutError::Protocol(e) => http_status(e).is_server_error(),
        _ => true,
    };
    soap(
        StatusCode::INTERNAL_SERVER_ERROR,
        SoapBinding::fault(server_side, &err.to_string()),
    )
}

/// An error page for a browser.
pub fn error_page(err: &LogoutError) -> Response {
    let status = match err {
        LogoutError::Protocol(e) => http_status(e),
        LogoutError::Transport { .. } | LogoutError::PartnerRefused { .. } => StatusCode::BAD_GATEWAY,
        LogoutError::Session(_) | LogoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Logout request failed");
    } else {
        tracing::info!(error = %err, "Logout request rejected");
    }
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>SAML Error</title></head>
<body>
<h1>SAML Error</h1>
<p>{}</p>
</body>
</html>"#,
        escape(&err.to_string())
    );
    (status, Html(html)).into_response()
}

fn http_status(err: &SamlError) -> StatusCode {
    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn logout_complete_page(summary: &LogoutSummary) -> String {
    let detail = match summary {
        LogoutSummary::Full => "You have been signed out of every application.".to_string(),
        LogoutSummary::NotLoggedIn => "You were not signed in.".to_string(),
        LogoutSummary::Partial(abandoned) => {
            let items: String = abandoned
                .iter()
                .map(|entity_id| format!("<li>{}</li>", escape(entity_id)))
                .collect();
            format!(
                "You have been signed out, but these applications could not be reached:<ul>{items}</ul>\
                 Close your browser to end those sessions."
            )
        }
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Logged Out</title></head>
<body data-logout="{}">
<h1>Logged Out</h1>
<p>{detail}</p>
</body>
</html>"#,
        summary.as_str()
    )
}
