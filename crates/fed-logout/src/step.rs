//! What the caller does next.

use fed_protocol_saml::Status;

/// Result of a finished saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutSummary {
    /// Every partner confirmed or was skipped.
    Full,
    /// These partners could not be confirmed.
    Partial(Vec<String>),
    /// There was no session to log out.
    NotLoggedIn,
}

impl LogoutSummary {
    /// Returns true unless some partner was abandoned.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !matches!(self, Self::Partial(_))
    }

    /// Abandoned partners.
    #[must_use]
    pub fn abandoned(&self) -> &[String] {
        match self {
            Self::Partial(abandoned) => abandoned,
            _ => &[],
        }
    }

    /// Status reported to the initiator.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Partial(_) => Status::partial_logout(),
            Self::Full | Self::NotLoggedIn => Status::success(),
        }
    }

    /// Short label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial(_) => "partial",
            Self::NotLoggedIn => "not-logged-in",
        }
    }
}

/// Next action for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutStep {
    /// Redirect the browser to this URL.
    Redirect(String),
    /// Serve this auto-submitting HTML form.
    PostForm(String),
    /// Answer the SOAP caller with this envelope.
    SoapResponse(String),
    /// Nothing left to send to a partner.
    Finished {
        /// How the saga ended.
        summary: LogoutSummary,
        /// Caller-supplied URL to send the browser to.
        return_to: Option<String>,
    },
}

impl LogoutStep {
    pub(crate) const fn not_logged_in() -> Self {
        Self::Finished {
            summary: LogoutSummary::NotLoggedIn,
            return_to: None,
        }
    }
}
