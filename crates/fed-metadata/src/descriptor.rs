//! Metadata descriptor types.

use std::fmt;

use fed_core::config::PartnerRole;
use fed_trust::CertificateInfo;

/// SAML protocol bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    /// HTTP Redirect binding.
    HttpRedirect,
    /// HTTP POST binding.
    HttpPost,
    /// HTTP POST-SimpleSign binding.
    HttpPostSimpleSign,
    /// HTTP Artifact binding.
    HttpArtifact,
    /// SOAP binding.
    Soap,
}

impl Binding {
    /// Front-channel bindings in the order they are tried.
    pub const FRONT_CHANNEL: [Self; 4] = [
        Self::HttpRedirect,
        Self::HttpPost,
        Self::HttpPostSimpleSign,
        Self::HttpArtifact,
    ];

    /// Returns the URI for this binding.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::HttpPostSimpleSign => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST-SimpleSign",
            Self::HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Self::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
        }
    }

    /// Parses a binding from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" => Some(Self::HttpRedirect),
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" => Some(Self::HttpPost),
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST-SimpleSign" => {
                Some(Self::HttpPostSimpleSign)
            }
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact" => Some(Self::HttpArtifact),
            "urn:oasis:names:tc:SAML:2.0:bindings:SOAP" => Some(Self::Soap),
            _ => None,
        }
    }

    /// Returns true for browser-mediated bindings.
    #[must_use]
    pub const fn is_front_channel(&self) -> bool {
        !matches!(self, Self::Soap)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Service types a partner publishes endpoints for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceType {
    /// `SingleLogoutService`.
    SingleLogout,
    /// `AssertionConsumerService`.
    AssertionConsumer,
    /// `SingleSignOnService`.
    SingleSignOn,
    /// `ArtifactResolutionService`.
    ArtifactResolution,
}

impl ServiceType {
    /// Metadata element name.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::SingleLogout => "SingleLogoutService",
            Self::AssertionConsumer => "AssertionConsumerService",
            Self::SingleSignOn => "SingleSignOnService",
            Self::ArtifactResolution => "ArtifactResolutionService",
        }
    }

    /// Parses a metadata element name.
    #[must_use]
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "SingleLogoutService" => Some(Self::SingleLogout),
            "AssertionConsumerService" => Some(Self::AssertionConsumer),
            "SingleSignOnService" => Some(Self::SingleSignOn),
            "ArtifactResolutionService" => Some(Self::ArtifactResolution),
            _ => None,
        }
    }
}

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Binding the endpoint accepts.
    pub binding: Binding,
    /// Request URL.
    pub location: String,
    /// Response URL when it differs from `location`.
    pub response_location: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint without a separate response location.
    pub fn new(binding: Binding, location: impl Into<String>) -> Self {
        Self {
            binding,
            location: location.into(),
            response_location: None,
        }
    }

    /// URL that responses are sent to.
    #[must_use]
    pub fn response_url(&self) -> &str {
        self.response_location.as_deref().unwrap_or(&self.location)
    }
}

/// One `EntityDescriptor` as read from a metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// `entityID` attribute.
    pub entity_id: String,
    /// Role of the first SSO descriptor found.
    pub role: Option<PartnerRole>,
    /// Endpoints in document order, first per (service, binding) only.
    pub endpoints: Vec<(ServiceType, Endpoint)>,
    /// Certificates from `KeyDescriptor`s usable for signing.
    pub signing_certificates: Vec<CertificateInfo>,
}

impl EntityDescriptor {
    /// Creates an empty descriptor.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            role: None,
            endpoints: Vec::new(),
            signing_certificates: Vec::new(),
        }
    }

    /// Adds an endpoint unless one already exists for the pair.
    pub fn add_endpoint(&mut self, service: ServiceType, endpoint: Endpoint) -> bool {
        let exists = self
            .endpoints
            .iter()
            .any(|(s, e)| *s == service && e.binding == endpoint.binding);
        if !exists {
            self.endpoints.push((service, endpoint));
        }
        !exists
    }

    /// Finds the endpoint for a (service, binding) pair.
    #[must_use]
    pub fn endpoint(&self, service: ServiceType, binding: Binding) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|(s, e)| *s == service && e.binding == binding)
            .map(|(_, e)| e)
    }
}
