//! Analysis configuration.
//!
//! A configuration document is JSON:
//!
//! ```json
//! {
//!   "collectors": {
//!     "listener": [{ "kind": "fqnRegex", "pattern": ".*Listener$" }]
//!   },
//!   "components": { "src/Billing": "Billing" },
//!   "exclude": ["vendor/**"]
//! }
//! ```
//!
//! Everything is validated at load time: unknown collector or criterion
//! kinds, missing patterns and patterns that do not compile are rejected
//! before any source is read.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use eventlens_core::error::EventlensError;
use eventlens_core::filter::{CollectorSet, CriterionError, RawCriterion};

use crate::components::ComponentMap;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be read.
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    /// The document is not valid JSON for this schema.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// A collector definition is invalid.
    #[error(transparent)]
    Criterion(#[from] CriterionError),

    /// The document configures no collector.
    #[error("no collectors configured")]
    NoCollectors,

    /// A component has an empty name.
    #[error("component for prefix '{prefix}' has an empty name")]
    EmptyComponentName { prefix: String },
}

// ============================================================================
// Bridge: ConfigError -> EventlensError
// ============================================================================

impl From<ConfigError> for EventlensError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } if source.kind() == io::ErrorKind::NotFound => {
                EventlensError::FileNotFound { path }
            }
            ConfigError::Criterion(e) => EventlensError::from(e),
            other => EventlensError::invalid_config(other.to_string()),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    collectors: BTreeMap<String, Vec<RawCriterion>>,
    #[serde(default)]
    components: BTreeMap<String, String>,
    #[serde(default)]
    exclude: Vec<String>,
}

/// A validated configuration.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Collectors keyed by fact kind.
    pub collectors: CollectorSet,
    /// Path prefix to component name.
    pub components: ComponentMap,
    /// Exclusion globs for source discovery.
    pub exclude: Vec<String>,
}

impl AnalysisConfig {
    /// Parse and validate a configuration document.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(input)?;
        if raw.collectors.is_empty() {
            return Err(ConfigError::NoCollectors);
        }
        let collectors = CollectorSet::from_raw(&raw.collectors)?;

        let mut components = ComponentMap::new();
        for (prefix, name) in raw.components {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyComponentName { prefix });
            }
            components.insert(&prefix, name.trim());
        }
        Ok(AnalysisConfig {
            collectors,
            components,
            exclude: raw.exclude,
        })
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&input)?;
        tracing::debug!(
            path = %path.display(),
            components = config.components.len(),
            "loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlens_core::error::OutputErrorCode;
    use eventlens_core::facts::FactKind;

    #[test]
    fn parses_collectors_and_components() {
        let config = AnalysisConfig::parse(
            r#"{
                "collectors": {
                    "listener": [{"kind": "fqnRegex", "pattern": ".*Listener$"}],
                    "event_dispatch": [{"kind": "methodNameRegex", "pattern": "^dispatch$"}]
                },
                "components": {"src/Billing": "Billing", "src": "App"},
                "exclude": ["vendor/**"]
            }"#,
        )
        .unwrap();
        assert!(config.collectors.get(FactKind::Listener).is_some());
        assert!(config.collectors.get(FactKind::UseCase).is_none());
        assert_eq!(config.components.len(), 2);
        assert_eq!(config.exclude, vec!["vendor/**".to_string()]);
    }

    #[test]
    fn rejects_invalid_documents() {
        let json = r#"{"collectors": {"handler": [{"kind": "fqnRegex", "pattern": "x"}]}}"#;
        let unknown_collector = AnalysisConfig::parse(json);
        assert!(matches!(
            unknown_collector,
            Err(ConfigError::Criterion(CriterionError::UnknownCollector { .. }))
        ));

        let json = r#"{"collectors": {"listener": [{"kind": "fqnRegex", "pattern": "("}]}}"#;
        let bad_regex = AnalysisConfig::parse(json);
        assert!(matches!(bad_regex, Err(ConfigError::Criterion(_))));

        let json = r#"{"collectors": {"listener": [{"kind": "fqnRegex"}]}}"#;
        let missing_pattern = AnalysisConfig::parse(json);
        assert!(matches!(missing_pattern, Err(ConfigError::Criterion(_))));

        assert!(matches!(
            AnalysisConfig::parse(r#"{"components": {}}"#),
            Err(ConfigError::NoCollectors)
        ));
        assert!(matches!(
            AnalysisConfig::parse(r#"{"collectors": {}, "extra": 1}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn config_errors_are_invalid_arguments() {
        let err = AnalysisConfig::parse("{").unwrap_err();
        let err = EventlensError::from(err);
        assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::InvalidArguments);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eventlens.json");
        let json = r#"{"collectors": {"use_case": [{"kind": "fqnRegex", "pattern": "UseCase$"}]}}"#;
        fs::write(&path, json).unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert!(config.collectors.get(FactKind::UseCase).is_some());

        let missing = AnalysisConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(
            EventlensError::from(missing),
            EventlensError::FileNotFound { .. }
        ));
    }
}
