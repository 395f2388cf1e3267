//! Minimal XML tree used to read protocol messages.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{SamlError, SamlResult};

/// Maximum accepted message size.
pub const MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// An element with its attributes, text and children. Names are local
/// names; namespace prefixes are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name.
    pub name: String,
    /// Attributes by local name, in document order.
    pub attributes: Vec<(String, String)>,
    /// Concatenated, unescaped text content.
    pub text: String,
    /// Child elements.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(e: &BytesStart<'_>) -> SamlResult<Self> {
        let name = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| SamlError::XmlParse(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().into_inner()).to_string();
            if key == "xmlns" || attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let value = attr.unescape_value()?.to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    /// Parses a document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed or oversized input.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        if xml.len() > MAX_MESSAGE_SIZE {
            return Err(SamlError::XmlParse("message too large".to_string()));
        }

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Self> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => stack.push(Self::from_start(e)?),
                Event::Empty(ref e) => {
                    let element = Self::from_start(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(ref e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(ref e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unclosed element".to_string()));
        }
        root.ok_or_else(|| SamlError::XmlParse("empty document".to_string()))
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Required attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] naming `element@name`.
    pub fn required_attr(&self, name: &str) -> SamlResult<&str> {
        self.attr(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SamlError::MissingElement(format!("{}@{name}", self.name)))
    }

    /// First child with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given name, if non-empty.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Required child text.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if absent or empty.
    pub fn required_child_text(&self, name: &str) -> SamlResult<&str> {
        self.child_text(name)
            .ok_or_else(|| SamlError::MissingElement(name.to_string()))
    }
}

/// Escapes text for element content and attribute values.
#[must_use]
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// Current time at whole-second precision.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Formats an instant the way messages carry it.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an `xs:dateTime` value.
///
/// # Errors
///
/// Returns [`SamlError::InvalidRequest`] for a malformed value.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidRequest(format!("invalid timestamp {value}: {e}")))
}

/// Parses an instant attribute and keeps its text when it differs from
/// [`format_instant`]. Signatures cover the text as the sender wrote it.
///
/// # Errors
///
/// Returns [`SamlError::InvalidRequest`] for a malformed value.
pub fn parse_wire_instant(value: &str) -> SamlResult<(DateTime<Utc>, Option<String>)> {
    let instant = parse_instant(value)?;
    let wire = (format_instant(&instant) != value).then(|| value.to_string());
    Ok((instant, wire))
}

/// Text of an instant: the received form if any, else [`format_instant`].
#[must_use]
pub fn instant_text(instant: &DateTime<Utc>, wire: Option<&str>) -> String {
    wire.map_or_else(|| format_instant(instant), str::to_string)
}

/// Generates a message ID.
#[must_use]
pub fn new_id() -> String {
    format!("_{}", uuid::Uuid::new_v4().simple())
}
