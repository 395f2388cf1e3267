//! SAML Name ID types.

use super::NameIdFormat;
use crate::error::SamlResult;
use crate::xml::{escape, XmlElement};

/// SAML Name ID.
///
/// The partner-facing identifier of the subject being logged out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    /// Sets the format for this name ID.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Sets the format URI as received.
    #[must_use]
    pub fn with_format_uri(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> NameIdFormat {
        self.format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default()
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut attrs = String::new();
        for (name, value) in [
            ("Format", &self.format),
            ("NameQualifier", &self.name_qualifier),
            ("SPNameQualifier", &self.sp_name_qualifier),
        ] {
            if let Some(value) = value {
                attrs.push_str(&format!(r#" {name}="{}""#, escape(value)));
            }
        }
        format!("<saml:NameID{attrs}>{}</saml:NameID>", escape(&self.value))
    }

    pub(crate) fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let name_id = element
            .child("NameID")
            .filter(|n| !n.text.is_empty())
            .ok_or_else(|| crate::error::SamlError::MissingElement("NameID".to_string()))?;
        Ok(Self {
            value: name_id.text.clone(),
            format: name_id.attr("Format").map(str::to_string),
            name_qualifier: name_id.attr("NameQualifier").map(str::to_string),
            sp_name_qualifier: name_id.attr("SPNameQualifier").map(str::to_string),
        })
    }
}
