//! Trusted partner entities.

use std::collections::HashMap;

use fed_core::config::{MetadataLocation, PartnerRole};
use fed_crypto::PublicKey;
use fed_trust::CertificateInfo;

use crate::descriptor::{Binding, EntityDescriptor, Endpoint, ServiceType};

/// A partner whose metadata passed trust checks.
///
/// Only the signing certificates that were accepted are kept.
#[derive(Debug, Clone)]
pub struct PartnerEntity {
    /// Entity identifier.
    pub entity_id: String,
    /// Configured role.
    pub role: PartnerRole,
    /// Where the metadata came from.
    pub metadata_location: MetadataLocation,
    /// Endpoints keyed by (service, binding).
    pub endpoints: HashMap<(ServiceType, Binding), Endpoint>,
    /// Trusted signing certificates, in document order.
    pub signing_certificates: Vec<CertificateInfo>,
    /// Whether logout messages may be sent to this partner.
    pub logout_supported: bool,
}

impl PartnerEntity {
    /// Builds an entity from a parsed descriptor and the certificates that
    /// passed trust checks.
    ///
    /// Logout is supported only if configuration allows it and the metadata
    /// publishes at least one `SingleLogoutService`.
    #[must_use]
    pub fn new(
        descriptor: EntityDescriptor,
        role: PartnerRole,
        metadata_location: MetadataLocation,
        trusted_certificates: Vec<CertificateInfo>,
        logout_allowed: bool,
    ) -> Self {
        let endpoints: HashMap<_, _> = descriptor
            .endpoints
            .into_iter()
            .map(|(service, endpoint)| ((service, endpoint.binding), endpoint))
            .collect();
        let publishes_slo = endpoints
            .keys()
            .any(|(service, _)| *service == ServiceType::SingleLogout);

        Self {
            entity_id: descriptor.entity_id,
            role,
            metadata_location,
            endpoints,
            signing_certificates: trusted_certificates,
            logout_supported: logout_allowed && publishes_slo,
        }
    }

    /// Endpoint for a (service, binding) pair.
    #[must_use]
    pub fn endpoint(&self, service: ServiceType, binding: Binding) -> Option<&Endpoint> {
        self.endpoints.get(&(service, binding))
    }

    /// Public keys of the trusted signing certificates.
    #[must_use]
    pub fn signing_keys(&self) -> Vec<PublicKey> {
        self.signing_certificates
            .iter()
            .map(|cert| cert.public_key().clone())
            .collect()
    }

    /// First front-channel logout endpoint in preference order.
    #[must_use]
    pub fn front_channel_logout(&self) -> Option<&Endpoint> {
        Binding::FRONT_CHANNEL
            .iter()
            .find_map(|binding| self.endpoint(ServiceType::SingleLogout, *binding))
    }

    /// SOAP logout endpoint.
    #[must_use]
    pub fn back_channel_logout(&self) -> Option<&Endpoint> {
        self.endpoint(ServiceType::SingleLogout, Binding::Soap)
    }

    /// Preferred logout endpoint: front channel first, then SOAP.
    ///
    /// `None` if logout is unsupported or no endpoint exists.
    #[must_use]
    pub fn preferred_logout_endpoint(&self) -> Option<&Endpoint> {
        if !self.logout_supported {
            return None;
        }
        self.front_channel_logout()
            .or_else(|| self.back_channel_logout())
    }
}
