//! Assurance level table and level negotiation.
//!
//! Partners ask for an authentication strength by listing context class
//! URIs with a comparison operator. The table maps URIs (current and legacy)
//! to sparse integer levels; negotiation picks one entry or reports that
//! no entry satisfies the request.

use fed_core::config::AssuranceConfig;

use crate::error::{SamlError, SamlResult};
use crate::types::{Comparison, RequestedAuthnContext};

/// One row of the level table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssuranceLevelEntry {
    /// Numeric strength; higher is stronger.
    pub level: i32,
    /// Context class URI.
    pub uri: String,
    /// Older URI accepted for the same level.
    pub legacy_uri: Option<String>,
}

impl AssuranceLevelEntry {
    /// Creates an entry without a legacy URI.
    #[must_use]
    pub fn new(level: i32, uri: impl Into<String>) -> Self {
        Self {
            level,
            uri: uri.into(),
            legacy_uri: None,
        }
    }

    /// Sets the legacy URI.
    #[must_use]
    pub fn with_legacy_uri(mut self, uri: impl Into<String>) -> Self {
        self.legacy_uri = Some(uri.into());
        self
    }

    fn matches(&self, uri: &str) -> bool {
        self.uri == uri || self.legacy_uri.as_deref() == Some(uri)
    }
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatedLevel {
    /// A table entry.
    Level(AssuranceLevelEntry),
    /// `better` was asked for above the highest level; the caller uses the
    /// strongest method it has.
    NoCeiling,
}

impl NegotiatedLevel {
    /// Numeric level, if bounded.
    #[must_use]
    pub fn level(&self) -> Option<i32> {
        match self {
            Self::Level(entry) => Some(entry.level),
            Self::NoCeiling => None,
        }
    }
}

/// Totally ordered assurance level table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityLevelTable {
    entries: Vec<AssuranceLevelEntry>,
    previous_session: Option<i32>,
}

impl SecurityLevelTable {
    /// Builds a table, sorting entries by level.
    ///
    /// `previous_session` names the level reserved for reusing an existing
    /// session; it is never chosen for a request without a context.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if two entries share a level.
    pub fn new(
        mut entries: Vec<AssuranceLevelEntry>,
        previous_session: Option<i32>,
    ) -> SamlResult<Self> {
        entries.sort_by_key(|e| e.level);
        if let Some(pair) = entries.windows(2).find(|w| w[0].level == w[1].level) {
            return Err(SamlError::Configuration(format!(
                "assurance level {} defined twice",
                pair[0].level
            )));
        }
        Ok(Self {
            entries,
            previous_session,
        })
    }

    /// Builds the table from configuration.
    ///
    /// # Errors
    ///
    /// See [`SecurityLevelTable::new`].
    pub fn from_config(config: &AssuranceConfig) -> SamlResult<Self> {
        let entries = config
            .levels
            .iter()
            .map(|l| AssuranceLevelEntry {
                level: l.level,
                uri: l.uri.clone(),
                legacy_uri: l.legacy_uri.clone(),
            })
            .collect();
        Self::new(entries, config.previous_session_level)
    }

    /// Entries in ascending level order.
    #[must_use]
    pub fn entries(&self) -> &[AssuranceLevelEntry] {
        &self.entries
    }

    /// Entry whose URI or legacy URI is `uri`.
    #[must_use]
    pub fn by_uri(&self, uri: &str) -> Option<&AssuranceLevelEntry> {
        self.entries.iter().find(|e| e.matches(uri))
    }

    /// Entry at exactly `level`.
    #[must_use]
    pub fn by_level(&self, level: i32) -> Option<&AssuranceLevelEntry> {
        self.entries.iter().find(|e| e.level == level)
    }

    /// Lowest level that is not the previous-session level.
    #[must_use]
    pub fn default_level(&self) -> Option<&AssuranceLevelEntry> {
        self.entries
            .iter()
            .find(|e| Some(e.level) != self.previous_session)
    }

    /// Negotiates a level for the requested class references.
    ///
    /// Unknown URIs are ignored. An empty request yields
    /// [`SecurityLevelTable::default_level`]. `None` means no entry satisfies
    /// the request.
    #[must_use]
    pub fn compare(&self, requested: &[String], comparison: Comparison) -> Option<NegotiatedLevel> {
        if requested.is_empty() {
            return self.default_level().cloned().map(NegotiatedLevel::Level);
        }

        let mut known = requested.iter().filter_map(|uri| self.by_uri(uri));
        let chosen = match comparison {
            Comparison::Exact => known.next(),
            Comparison::Minimum => known.min_by_key(|e| e.level),
            Comparison::Maximum => known.max_by_key(|e| e.level),
            Comparison::Better => {
                let highest = known.map(|e| e.level).max()?;
                return Some(
                    self.entries
                        .iter()
                        .find(|e| e.level > highest)
                        .cloned()
                        .map_or(NegotiatedLevel::NoCeiling, NegotiatedLevel::Level),
                );
            }
        };
        chosen.cloned().map(NegotiatedLevel::Level)
    }

    /// Negotiates a level for a parsed `RequestedAuthnContext`.
    #[must_use]
    pub fn negotiate(&self, context: Option<&RequestedAuthnContext>) -> Option<NegotiatedLevel> {
        match context {
            Some(context) => self.compare(&context.class_refs, context.comparison),
            None => self.compare(&[], Comparison::Exact),
        }
    }
}
