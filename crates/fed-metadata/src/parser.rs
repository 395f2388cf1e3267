//! Metadata document parser.

use fed_core::config::PartnerRole;
use fed_trust::CertificateInfo;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::descriptor::{Binding, EntityDescriptor, Endpoint, ServiceType};
use crate::error::{MetadataError, MetadataResult};

/// Maximum accepted document size.
pub const MAX_METADATA_SIZE: usize = 4 * 1024 * 1024;

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().into_inner()).to_string()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().into_inner() == name.as_bytes() {
            attr.unescape_value().ok().map(|v| v.to_string())
        } else {
            None
        }
    })
}

#[derive(Default)]
struct State {
    entities: Vec<EntityDescriptor>,
    current: Option<EntityDescriptor>,
    in_role: bool,
    in_key: bool,
    key_is_signing: bool,
    cert_text: Option<String>,
}

impl State {
    fn open(&mut self, e: &BytesStart<'_>, name: &str, has_body: bool) -> MetadataResult<()> {
        match name {
            "EntityDescriptor" => {
                let entity_id = attribute(e, "entityID").ok_or_else(|| {
                    MetadataError::Parse("EntityDescriptor without entityID".to_string())
                })?;
                self.current = Some(EntityDescriptor::new(entity_id));
            }
            "SPSSODescriptor" | "IDPSSODescriptor" => {
                if let Some(current) = self.current.as_mut() {
                    if current.role.is_none() {
                        current.role = Some(if name == "SPSSODescriptor" {
                            PartnerRole::Sp
                        } else {
                            PartnerRole::Idp
                        });
                    }
                    self.in_role = has_body;
                }
            }
            "KeyDescriptor" if self.in_role && has_body => {
                self.in_key = true;
                self.key_is_signing =
                    attribute(e, "use").map_or(true, |usage| usage == "signing");
            }
            "X509Certificate" if self.in_key && self.key_is_signing && has_body => {
                self.cert_text = Some(String::new());
            }
            _ => {
                if let Some(service) = ServiceType::from_element(name) {
                    self.endpoint(e, service);
                }
            }
        }
        Ok(())
    }

    fn endpoint(&mut self, e: &BytesStart<'_>, service: ServiceType) {
        let Some(current) = self.current.as_mut().filter(|_| self.in_role) else {
            return;
        };
        let binding_uri = attribute(e, "Binding").unwrap_or_default();
        let Some(binding) = Binding::from_uri(&binding_uri) else {
            tracing::debug!(
                entity_id = %current.entity_id,
                binding = %binding_uri,
                "Ignoring endpoint with unsupported binding"
            );
            return;
        };
        let Some(location) = attribute(e, "Location") else {
            return;
        };
        current.add_endpoint(
            service,
            Endpoint {
                binding,
                location,
                response_location: attribute(e, "ResponseLocation"),
            },
        );
    }

    fn close(&mut self, name: &str) -> MetadataResult<()> {
        match name {
            "EntityDescriptor" => {
                if let Some(entity) = self.current.take() {
                    self.entities.push(entity);
                }
            }
            "SPSSODescriptor" | "IDPSSODescriptor" => self.in_role = false,
            "KeyDescriptor" => {
                self.in_key = false;
                self.key_is_signing = false;
            }
            "X509Certificate" => {
                if let Some(text) = self.cert_text.take() {
                    let cert = CertificateInfo::from_base64(&text)?;
                    if let Some(current) = self.current.as_mut() {
                        current.signing_certificates.push(cert);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parses every `EntityDescriptor` in a metadata document.
///
/// Accepts a bare `EntityDescriptor` or an `EntitiesDescriptor` aggregate.
/// Endpoints with an unknown binding and encryption-only keys are ignored.
///
/// # Errors
///
/// Returns [`MetadataError::Parse`] for malformed XML or a document without
/// entities, and [`MetadataError::Certificate`] for an unparsable signing
/// certificate.
pub fn parse_metadata(xml: &str) -> MetadataResult<Vec<EntityDescriptor>> {
    if xml.len() > MAX_METADATA_SIZE {
        return Err(MetadataError::Parse("metadata document too large".to_string()));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = State::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                state.open(e, &name, true)?;
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e);
                state.open(e, &name, false)?;
                state.close(&name)?;
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                state.close(&name)?;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(text) = state.cert_text.as_mut() {
                    let chunk = e
                        .unescape()
                        .map_err(|err| MetadataError::Parse(format!("XML parse error: {err}")))?;
                    text.push_str(&chunk);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(MetadataError::Parse(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    if state.entities.is_empty() {
        return Err(MetadataError::Parse(
            "no EntityDescriptor in document".to_string(),
        ));
    }
    Ok(state.entities)
}

/// Parses a document and returns the descriptor for `entity_id`.
///
/// # Errors
///
/// Returns [`MetadataError::EntityNotFound`] if the document does not
/// describe `entity_id`, or any error from [`parse_metadata`].
pub fn find_entity(xml: &str, entity_id: &str) -> MetadataResult<EntityDescriptor> {
    parse_metadata(xml)?
        .into_iter()
        .find(|e| e.entity_id == entity_id)
        .ok_or_else(|| MetadataError::EntityNotFound {
            expected: entity_id.to_string(),
        })
}
