//! Metadata published for this server.

use fed_core::config::FederationConfig;
use fed_metadata::Binding;
use fed_trust::CertificateInfo;

use crate::types::{NameIdFormat, MD_NS, XMLDSIG_NS};
use crate::xml::escape;

/// This server's own entity descriptor.
#[derive(Debug, Clone)]
pub struct IdpMetadata {
    /// Entity ID.
    pub entity_id: String,
    /// Signing certificate.
    pub certificate: CertificateInfo,
    /// Front-channel single logout endpoint.
    pub slo_url: String,
    /// SOAP single logout endpoint.
    pub slo_soap_url: String,
    /// Artifact resolution endpoint.
    pub artifact_url: String,
}

impl IdpMetadata {
    /// Builds the descriptor from configuration and the loaded certificate.
    #[must_use]
    pub fn from_config(config: &FederationConfig, certificate: CertificateInfo) -> Self {
        Self {
            entity_id: config.server.entity_id.clone(),
            certificate,
            slo_url: config.slo_url(),
            slo_soap_url: config.slo_soap_url(),
            artifact_url: config.artifact_url(),
        }
    }

    /// Renders the `EntityDescriptor` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let slo: String = Binding::FRONT_CHANNEL
            .iter()
            .map(|binding| (binding, &self.slo_url))
            .chain(std::iter::once((&Binding::Soap, &self.slo_soap_url)))
            .map(|(binding, location)| {
                format!(
                    r#"
        <md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                    binding.uri(),
                    escape(location)
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="{MD_NS}" entityID="{}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="{XMLDSIG_NS}">
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:ArtifactResolutionService Binding="{}" Location="{}" index="0" isDefault="true"/>{slo}
        <md:NameIDFormat>{}</md:NameIDFormat>
        <md:NameIDFormat>{}</md:NameIDFormat>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
            escape(&self.entity_id),
            self.certificate.to_base64(),
            Binding::Soap.uri(),
            escape(&self.artifact_url),
            NameIdFormat::Persistent.uri(),
            NameIdFormat::Transient.uri(),
        )
    }
}
