//! SAML Status types.

use super::{status_codes, sub_status_codes};
use crate::error::{SamlError, SamlResult};
use crate::xml::{escape, XmlElement};

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::success(),
            status_message: None,
        }
    }

    /// Success with a `PartialLogout` sub-status.
    #[must_use]
    pub fn partial_logout() -> Self {
        Self {
            status_code: StatusCode::success()
                .with_sub_status(StatusCode::new(sub_status_codes::PARTIAL_LOGOUT)),
            status_message: Some("Some sessions could not be terminated".to_string()),
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::requester(),
            status_message: Some(message.into()),
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::responder(),
            status_message: Some(message.into()),
        }
    }

    /// Builds the status describing a rejected message.
    #[must_use]
    pub fn from_error(error: &SamlError) -> Self {
        let mut code = StatusCode::new(error.status_code());
        if let Some(sub) = error.sub_status_code() {
            code = code.with_sub_status(StatusCode::new(sub));
        }
        Self {
            status_code: code,
            status_message: Some(error.to_string()),
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Returns true for success carrying a `PartialLogout` sub-status.
    #[must_use]
    pub fn is_partial_logout(&self) -> bool {
        self.is_success()
            && self.status_code.sub_status_value() == Some(sub_status_codes::PARTIAL_LOGOUT)
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub(crate) fn to_xml(&self) -> String {
        let message = self
            .status_message
            .as_deref()
            .map(|m| format!("<samlp:StatusMessage>{}</samlp:StatusMessage>", escape(m)))
            .unwrap_or_default();
        format!(
            "<samlp:Status>{}{message}</samlp:Status>",
            self.status_code.to_xml()
        )
    }

    /// Reads the `Status` child of a response element.
    pub(crate) fn from_element(response: &XmlElement) -> SamlResult<Self> {
        let status = response
            .child("Status")
            .ok_or_else(|| SamlError::MissingElement("Status".to_string()))?;
        let code = status
            .child("StatusCode")
            .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?;
        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: status.child_text("StatusMessage").map(str::to_string),
        })
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Creates a success status code.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS)
    }

    /// Creates a requester error status code.
    #[must_use]
    pub fn requester() -> Self {
        Self::new(status_codes::REQUESTER)
    }

    /// Creates a responder error status code.
    #[must_use]
    pub fn responder() -> Self {
        Self::new(status_codes::RESPONDER)
    }

    /// Adds a sub-status code.
    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }

    /// Returns true if this is a success status code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == status_codes::SUCCESS
    }

    /// Returns the sub-status code value if present.
    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_ref().map(|s| s.value.as_str())
    }

    fn to_xml(&self) -> String {
        match &self.status_code {
            Some(sub) => format!(
                r#"<samlp:StatusCode Value="{}">{}</samlp:StatusCode>"#,
                escape(&self.value),
                sub.to_xml()
            ),
            None => format!(r#"<samlp:StatusCode Value="{}"/>"#, escape(&self.value)),
        }
    }

    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let value = element.required_attr("Value")?.to_string();
        let status_code = match element.child("StatusCode") {
            Some(sub) => Some(Box::new(Self::from_element(sub)?)),
            None => None,
        };
        Ok(Self { value, status_code })
    }
}
