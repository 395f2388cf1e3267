//! Requested authentication context.

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

/// How requested class references are compared against the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    /// First requested reference known to the table.
    #[default]
    Exact,
    /// Lowest level among the known requested references.
    Minimum,
    /// Highest level among the known requested references.
    Maximum,
    /// Next level above the highest known requested reference.
    Better,
}

impl Comparison {
    /// Parses the `Comparison` attribute value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "minimum" => Some(Self::Minimum),
            "maximum" => Some(Self::Maximum),
            "better" => Some(Self::Better),
            _ => None,
        }
    }

    /// Attribute value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Better => "better",
        }
    }
}

/// `<samlp:RequestedAuthnContext>` of an authentication request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedAuthnContext {
    /// Comparison operator.
    pub comparison: Comparison,
    /// `AuthnContextClassRef` values, in document order.
    pub class_refs: Vec<String>,
}

impl RequestedAuthnContext {
    /// Reads the requested context of an `AuthnRequest` document.
    ///
    /// Returns `None` when the request does not ask for one.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] for a document that is not an
    /// `AuthnRequest` or carries an unknown comparison.
    pub fn from_authn_request(xml: &str) -> SamlResult<Option<Self>> {
        let root = XmlElement::parse(xml)?;
        if root.name != "AuthnRequest" {
            return Err(SamlError::InvalidRequest(format!(
                "expected AuthnRequest, got {}",
                root.name
            )));
        }
        root.child("RequestedAuthnContext")
            .map(Self::from_element)
            .transpose()
    }

    /// Reads a `RequestedAuthnContext` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] for an unknown comparison.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let comparison = match element.attr("Comparison") {
            None => Comparison::Exact,
            Some(value) => Comparison::parse(value).ok_or_else(|| {
                SamlError::InvalidRequest(format!("unknown comparison {value}"))
            })?,
        };
        Ok(Self {
            comparison,
            class_refs: element
                .children_named("AuthnContextClassRef")
                .map(|c| c.text.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        })
    }
}
