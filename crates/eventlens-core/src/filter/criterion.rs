//! Collector criteria and their validation.
//!
//! A collector definition names a [`FactKind`] and lists criteria of the form
//! `{ "kind": "fqnRegex" | "methodNameRegex", "pattern": "<regex>" }`.
//! Definitions are validated when they are loaded, before any analysis runs:
//! unknown collector names, unknown criterion kinds, missing or empty patterns
//! and regexes that do not compile are all rejected.
//!
//! ## Matching Semantics
//!
//! Criteria of the same kind are alternatives (any may match). FQN criteria and
//! method-name criteria are combined with a logical AND. A collector without
//! method-name criteria accepts every method of a matching class.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::facts::FactKind;

/// Error type for collector definitions.
#[derive(Debug, Error)]
pub enum CriterionError {
    /// Collector name does not denote a known fact kind.
    #[error("unknown collector '{name}'")]
    UnknownCollector { name: String },

    /// Criterion kind is neither `fqnRegex` nor `methodNameRegex`.
    #[error("collector '{collector}': unknown criterion kind '{kind}'")]
    UnknownCriterionKind { collector: String, kind: String },

    /// Criterion has no kind.
    #[error("collector '{collector}': criterion #{index} has no kind")]
    MissingKind { collector: String, index: usize },

    /// Criterion has no (or an empty) pattern.
    #[error("collector '{collector}': criterion #{index} has no pattern")]
    MissingPattern { collector: String, index: usize },

    /// Pattern is not a valid regex.
    #[error("collector '{collector}': invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        collector: String,
        pattern: String,
        message: String,
    },

    /// Collector lists no criteria at all.
    #[error("collector '{collector}' has no criteria")]
    EmptyCollector { collector: String },

    /// Malformed JSON document.
    #[error("invalid collector configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Criterion kind identifying what a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionKind {
    /// Fully-qualified class name (or receiver type for dispatch collectors).
    FqnRegex,
    /// Method name (or called method for dispatch collectors).
    MethodNameRegex,
}

impl CriterionKind {
    /// Parse a criterion kind from its configuration spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fqnRegex" | "fqn_regex" => Some(CriterionKind::FqnRegex),
            "methodNameRegex" | "method_name_regex" => Some(CriterionKind::MethodNameRegex),
            _ => None,
        }
    }

    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::FqnRegex => "fqnRegex",
            CriterionKind::MethodNameRegex => "methodNameRegex",
        }
    }
}

/// A single validated criterion.
#[derive(Debug, Clone)]
pub struct Criterion {
    /// What the pattern is matched against.
    pub kind: CriterionKind,
    /// Compiled pattern.
    pub regex: Regex,
}

impl Criterion {
    /// Create a criterion, compiling its pattern.
    pub fn new(kind: CriterionKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Criterion {
            kind,
            regex: Regex::new(pattern)?,
        })
    }

    /// Source pattern.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// A validated collector: a fact kind and its criteria.
#[derive(Debug, Clone)]
pub struct CollectorDefinition {
    /// Kind of fact this collector produces.
    pub kind: FactKind,
    /// Criteria in configuration order.
    pub criteria: Vec<Criterion>,
}

impl CollectorDefinition {
    /// Create a collector definition.
    pub fn new(kind: FactKind, criteria: Vec<Criterion>) -> Self {
        CollectorDefinition { kind, criteria }
    }

    /// FQN patterns of this collector.
    pub fn fqn_patterns(&self) -> Vec<&str> {
        self.patterns_of(CriterionKind::FqnRegex)
    }

    /// Method-name patterns of this collector.
    pub fn method_patterns(&self) -> Vec<&str> {
        self.patterns_of(CriterionKind::MethodNameRegex)
    }

    fn patterns_of(&self, kind: CriterionKind) -> Vec<&str> {
        self.criteria
            .iter()
            .filter(|c| c.kind == kind)
            .map(Criterion::pattern)
            .collect()
    }
}

/// Raw criterion as it appears in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCriterion {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Validated set of collectors, ordered by fact kind.
#[derive(Debug, Clone, Default)]
pub struct CollectorSet {
    collectors: BTreeMap<FactKind, CollectorDefinition>,
}

impl CollectorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate raw collector definitions keyed by collector name.
    pub fn from_raw(raw: &BTreeMap<String, Vec<RawCriterion>>) -> Result<Self, CriterionError> {
        let mut set = CollectorSet::new();
        for (name, criteria) in raw {
            let kind = FactKind::parse(name)
                .ok_or_else(|| CriterionError::UnknownCollector { name: name.clone() })?;
            if criteria.is_empty() {
                return Err(CriterionError::EmptyCollector {
                    collector: name.clone(),
                });
            }
            let mut validated = Vec::with_capacity(criteria.len());
            for (index, raw_criterion) in criteria.iter().enumerate() {
                validated.push(validate_criterion(name, index, raw_criterion)?);
            }
            set.insert(CollectorDefinition::new(kind, validated));
        }
        Ok(set)
    }

    /// Parse and validate a JSON object `{ "<collector>": [criteria...] }`.
    pub fn parse_json(input: &str) -> Result<Self, CriterionError> {
        let raw: BTreeMap<String, Vec<RawCriterion>> = serde_json::from_str(input)?;
        Self::from_raw(&raw)
    }

    /// Add (or replace) a collector.
    pub fn insert(&mut self, collector: CollectorDefinition) {
        self.collectors.insert(collector.kind, collector);
    }

    /// Collector for a fact kind.
    pub fn get(&self, kind: FactKind) -> Option<&CollectorDefinition> {
        self.collectors.get(&kind)
    }

    /// Iterate over collectors in fact-kind order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectorDefinition> {
        self.collectors.values()
    }

    /// Returns true if no collector is configured.
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

fn validate_criterion(
    collector: &str,
    index: usize,
    raw: &RawCriterion,
) -> Result<Criterion, CriterionError> {
    let kind_str = raw
        .kind
        .as_deref()
        .ok_or_else(|| CriterionError::MissingKind {
            collector: collector.to_string(),
            index,
        })?;
    let kind = CriterionKind::parse(kind_str).ok_or_else(|| {
        CriterionError::UnknownCriterionKind {
            collector: collector.to_string(),
            kind: kind_str.to_string(),
        }
    })?;
    let pattern = raw
        .pattern
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| CriterionError::MissingPattern {
            collector: collector.to_string(),
            index,
        })?;
    Criterion::new(kind, pattern).map_err(|e| CriterionError::InvalidPattern {
        collector: collector.to_string(),
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
