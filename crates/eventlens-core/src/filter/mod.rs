//! Collector filters: the criteria that select domain facts.
//!
//! This module implements the configuration-facing half of fact collection:
//! - Criterion kinds (`fqnRegex`, `methodNameRegex`)
//! - Validation of raw definitions at load time
//! - A validated [`CollectorSet`] keyed by fact kind
//!
//! ## Usage
//!
//! ```
//! use eventlens_core::facts::FactKind;
//! use eventlens_core::filter::CollectorSet;
//!
//! let set = CollectorSet::parse_json(
//!     r#"{"listener": [{"kind": "fqnRegex", "pattern": ".*Listener$"}]}"#,
//! )
//! .unwrap();
//! assert!(set.get(FactKind::Listener).is_some());
//! ```

mod criterion;

pub use criterion::{
    CollectorDefinition, CollectorSet, Criterion, CriterionError, CriterionKind, RawCriterion,
};
