//! SOAP 1.1 binding for back-channel calls.

use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::reader::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::SOAP_ENV_NS;
use crate::xml::{escape, XmlElement, MAX_MESSAGE_SIZE};

/// Content type of SOAP 1.1 messages.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// SOAP envelope encoder/decoder.
pub struct SoapBinding;

impl SoapBinding {
    /// Wraps a message in an envelope.
    #[must_use]
    pub fn wrap(body: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="{SOAP_ENV_NS}"><soap:Body>{body}</soap:Body></soap:Envelope>"#
        )
    }

    /// Builds a fault envelope. `server` selects `soap:Server` over
    /// `soap:Client`.
    #[must_use]
    pub fn fault(server: bool, message: &str) -> String {
        let code = if server { "soap:Server" } else { "soap:Client" };
        Self::wrap(&format!(
            "<soap:Fault><faultcode>{code}</faultcode><faultstring>{}</faultstring></soap:Fault>",
            escape(message)
        ))
    }

    /// Returns the first element inside `<Body>`, as it appears in the
    /// envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed input,
    /// [`SamlError::InvalidRequest`] for an envelope with an empty body and
    /// [`SamlError::InvalidResponse`] when the body is a fault.
    pub fn unwrap(envelope: &str) -> SamlResult<String> {
        if envelope.len() > MAX_MESSAGE_SIZE {
            return Err(SamlError::XmlParse("message too large".to_string()));
        }

        let mut reader = Reader::from_str(envelope);
        reader.config_mut().trim_text(true);

        let mut depth = 0usize;
        let mut in_body = false;
        loop {
            let start = position(&reader)?;
            match reader.read_event()? {
                Event::Start(e) if in_body => {
                    let name = e.name().as_ref().to_vec();
                    reader.read_to_end(QName(&name))?;
                    let end = position(&reader)?;
                    return body_element(&envelope[start..end]);
                }
                Event::Empty(_) if in_body => {
                    let end = position(&reader)?;
                    return body_element(&envelope[start..end]);
                }
                Event::Start(e) => {
                    let local = e.local_name();
                    match (depth, local.as_ref()) {
                        (0, b"Envelope") => {}
                        (0, _) => {
                            return Err(SamlError::InvalidRequest(
                                "not a SOAP envelope".to_string(),
                            ))
                        }
                        (1, b"Body") => in_body = true,
                        _ => {
                            let name = e.name().as_ref().to_vec();
                            reader.read_to_end(QName(&name))?;
                            continue;
                        }
                    }
                    depth += 1;
                }
                Event::End(_) if in_body => {
                    return Err(SamlError::InvalidRequest("empty SOAP body".to_string()))
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => {
                    return Err(SamlError::InvalidRequest("missing SOAP body".to_string()))
                }
                _ => {}
            }
        }
    }
}

fn position(reader: &Reader<&[u8]>) -> SamlResult<usize> {
    usize::try_from(reader.buffer_position())
        .map_err(|_| SamlError::XmlParse("offset overflow".to_string()))
}

fn body_element(raw: &str) -> SamlResult<String> {
    let raw = raw.trim();
    let element = XmlElement::parse(raw)?;
    if element.name == "Fault" {
        let message = element
            .child_text("faultstring")
            .unwrap_or("unspecified fault");
        return Err(SamlError::InvalidResponse(format!("SOAP fault: {message}")));
    }
    Ok(raw.to_string())
}
