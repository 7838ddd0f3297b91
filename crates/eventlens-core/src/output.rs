//! JSON output types and serialization for CLI responses.
//!
//! These types form the contract with downstream consumers (diagram
//! generators, scripts). Principles:
//!
//! 1. **Status first:** every response has `status` as first field
//! 2. **Deterministic:** same input produces identical bytes (sorted facts,
//!    sorted components)
//! 3. **Nullable vs absent:** absent field means "not applicable"
//! 4. **Versioned:** schema version in every response

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{EventlensError, OutputErrorCode};
use crate::facts::{Diagnostic, DomainFact, EventRef, FactKind, FactSet};
use crate::types::short_name;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Fact Output
// ============================================================================

/// Event information attached to a fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutput {
    /// Fully-qualified event type.
    pub fqn: String,
    /// Canonical short name.
    pub short_name: String,
}

impl From<&EventRef> for EventOutput {
    fn from(event: &EventRef) -> Self {
        EventOutput {
            fqn: event.fqn.clone(),
            short_name: event.short_name().to_string(),
        }
    }
}

/// A single fact in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactOutput {
    /// Fact kind.
    pub kind: FactKind,
    /// FQN of the class (dispatcher class for dispatch facts).
    pub fqn: String,
    /// Canonical short name of the class.
    pub short_name: String,
    /// Method name (listener, subscriber and dispatch facts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Event type (listener, subscriber and dispatch facts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventOutput>,
    /// Source file the fact was extracted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line of the originating node (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl From<&DomainFact> for FactOutput {
    fn from(fact: &DomainFact) -> Self {
        FactOutput {
            kind: fact.kind(),
            fqn: fact.fqn().to_string(),
            short_name: fact.short_name().to_string(),
            method: fact.method().map(str::to_string),
            event: fact.event().map(EventOutput::from),
            file: fact.origin().map(|o| o.file.clone()),
            line: fact.origin().map(|o| o.span.line),
        }
    }
}

/// A skipped-fact diagnostic in JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticOutput {
    /// Kind of the fact that was skipped.
    pub kind: FactKind,
    /// FQN of the class involved.
    pub fqn: String,
    /// Method involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Why the fact was skipped.
    pub message: String,
    /// Source file, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl From<&Diagnostic> for DiagnosticOutput {
    fn from(diag: &Diagnostic) -> Self {
        DiagnosticOutput {
            kind: diag.kind,
            fqn: diag.fqn.clone(),
            method: diag.method.clone(),
            message: diag.message.clone(),
            file: diag.origin.as_ref().map(|o| o.file.clone()),
            line: diag.origin.as_ref().map(|o| o.span.line),
        }
    }
}

/// Facts belonging to one named component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFacts {
    /// Component name.
    pub name: String,
    /// Facts in deterministic order.
    pub facts: Vec<FactOutput>,
}

/// Counts per fact kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactsSummary {
    pub use_cases: usize,
    pub listeners: usize,
    pub subscribers: usize,
    pub event_dispatches: usize,
    /// Number of candidate facts skipped with a diagnostic.
    pub skipped: usize,
}

impl FactsSummary {
    /// Count the facts and diagnostics of a fact set.
    pub fn from_facts(facts: &FactSet) -> Self {
        let mut summary = FactsSummary {
            skipped: facts.diagnostics().len(),
            ..Default::default()
        };
        for fact in facts.iter() {
            match fact.kind() {
                FactKind::UseCase => summary.use_cases += 1,
                FactKind::Listener => summary.listeners += 1,
                FactKind::Subscriber => summary.subscribers += 1,
                FactKind::EventDispatch => summary.event_dispatches += 1,
            }
        }
        summary
    }
}

/// Response for the `facts` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsReport {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Facts grouped by component, sorted by component name.
    pub components: Vec<ComponentFacts>,
    /// Facts that belong to no component.
    pub unassigned: Vec<FactOutput>,
    /// Diagnostics for skipped facts.
    pub diagnostics: Vec<DiagnosticOutput>,
    /// Counts.
    pub summary: FactsSummary,
}

impl FactsReport {
    /// Build a report, assigning each fact to a component with `component_of`.
    pub fn build<F>(facts: &FactSet, component_of: F) -> Self
    where
        F: Fn(&DomainFact) -> Option<String>,
    {
        let mut grouped: BTreeMap<String, Vec<FactOutput>> = BTreeMap::new();
        let mut unassigned = Vec::new();
        for fact in facts.iter() {
            match component_of(fact) {
                Some(name) => grouped.entry(name).or_default().push(FactOutput::from(fact)),
                None => unassigned.push(FactOutput::from(fact)),
            }
        }
        FactsReport {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            components: grouped
                .into_iter()
                .map(|(name, facts)| ComponentFacts { name, facts })
                .collect(),
            unassigned,
            diagnostics: facts.diagnostics().iter().map(DiagnosticOutput::from).collect(),
            summary: FactsSummary::from_facts(facts),
        }
    }
}

// ============================================================================
// Index and Types Responses
// ============================================================================

/// A unit listed in the `index` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutput {
    /// Fully-qualified name.
    pub fqn: String,
    /// class, interface or trait.
    pub kind: String,
    /// Source file.
    pub file: String,
}

/// Response for the `index` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Number of parsed files.
    pub files: usize,
    /// Indexed units in traversal order.
    pub units: Vec<UnitOutput>,
    /// Snapshot path, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl IndexResponse {
    /// Create a new index response.
    pub fn new(files: usize, units: Vec<UnitOutput>, snapshot: Option<String>) -> Self {
        IndexResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            files,
            units,
            snapshot,
        }
    }
}

/// Resolved types of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTypes {
    /// Member name (`$prop`, `method()` or `CONST`).
    pub member: String,
    /// property, method or constant.
    pub kind: String,
    /// Resolved type names, sorted.
    pub types: Vec<String>,
    /// Set when the member could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for the `types` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesResponse {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Unit inspected.
    pub fqn: String,
    /// Canonical short name.
    pub short_name: String,
    /// Member types in declaration order.
    pub members: Vec<MemberTypes>,
}

impl TypesResponse {
    /// Create a new types response.
    pub fn new(fqn: impl Into<String>, members: Vec<MemberTypes>) -> Self {
        let fqn = fqn.into();
        TypesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            short_name: short_name(&fqn).to_string(),
            fqn,
            members,
        }
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// Error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from an EventlensError.
    pub fn from_error(err: &EventlensError) -> Self {
        let details = match err {
            EventlensError::InvalidArguments { details, .. } => details.clone(),
            EventlensError::UnitNotFound { fqn } => Some(serde_json::json!({ "fqn": fqn })),
            EventlensError::FileNotFound { path } => Some(serde_json::json!({ "path": path })),
            EventlensError::CircularReference { chain } => {
                Some(serde_json::json!({ "chain": chain }))
            }
            EventlensError::ParseError { file, .. } => Some(serde_json::json!({ "file": file })),
            EventlensError::InvalidConfig { .. }
            | EventlensError::ResolutionError { .. }
            | EventlensError::InternalError { .. } => None,
        };
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            details,
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from an EventlensError.
    pub fn from_error(err: &EventlensError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Response Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
///
/// This is the single output path for CLI, ensuring consistency.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactOrigin;
    use crate::types::Span;

    fn sample_facts() -> FactSet {
        let mut facts = FactSet::new();
        facts.insert(DomainFact::use_case("App\\Order\\PlaceOrder").with_origin(FactOrigin {
            file: "src/Order/PlaceOrder.php".to_string(),
            span: Span::new(6, 120, 5),
        }));
        facts.insert(DomainFact::listener(
            "App\\Mail\\OrderPlacedListener",
            "handle",
            EventRef::new("App\\Order\\OrderPlaced"),
        ));
        facts.push_diagnostic(Diagnostic::new(
            FactKind::EventDispatch,
            "App\\Order\\PlaceOrder",
            Some("__invoke".to_string()),
            "event type is not unique: App\\A|App\\B",
        ));
        facts
    }

    mod facts_report_tests {
        use super::*;

        #[test]
        fn groups_by_component() {
            let facts = sample_facts();
            let report = FactsReport::build(&facts, |fact| {
                fact.fqn()
                    .starts_with("App\\Order\\")
                    .then(|| "Ordering".to_string())
            });
            assert_eq!(report.components.len(), 1);
            assert_eq!(report.components[0].name, "Ordering");
            assert_eq!(report.components[0].facts[0].short_name, "PlaceOrder");
            assert_eq!(report.unassigned.len(), 1);
            assert_eq!(report.unassigned[0].method.as_deref(), Some("handle"));
            assert_eq!(
                report.unassigned[0].event,
                Some(EventOutput {
                    fqn: "App\\Order\\OrderPlaced".to_string(),
                    short_name: "OrderPlaced".to_string(),
                })
            );
        }

        #[test]
        fn summary_counts_kinds() {
            let report = FactsReport::build(&sample_facts(), |_| None);
            assert_eq!(report.summary.use_cases, 1);
            assert_eq!(report.summary.listeners, 1);
            assert_eq!(report.summary.subscribers, 0);
            assert_eq!(report.summary.skipped, 1);
            assert_eq!(report.diagnostics[0].kind, FactKind::EventDispatch);
        }

        #[test]
        fn status_is_first_field() {
            let report = FactsReport::build(&sample_facts(), |_| None);
            let json = serde_json::to_string(&report).unwrap();
            assert!(json.starts_with(r#"{"status":"ok""#));
        }

        #[test]
        fn use_case_omits_method_and_event() {
            let report = FactsReport::build(&sample_facts(), |_| None);
            let use_case = report
                .unassigned
                .iter()
                .find(|f| f.kind == FactKind::UseCase)
                .unwrap();
            let json = serde_json::to_value(use_case).unwrap();
            assert!(json.get("method").is_none());
            assert!(json.get("event").is_none());
            assert_eq!(json["line"], 5);
        }
    }

    mod error_response_tests {
        use super::*;

        #[test]
        fn error_response_carries_code_and_details() {
            let err = EventlensError::unit_not_found("App\\Missing");
            let response = ErrorResponse::from_error(&err);
            assert_eq!(response.status, "error");
            assert_eq!(response.error.code, 3);
            assert_eq!(
                response.error.details,
                Some(serde_json::json!({ "fqn": "App\\Missing" }))
            );
        }
    }

    mod emission_tests {
        use super::*;

        #[test]
        fn emit_is_deterministic() {
            let report = FactsReport::build(&sample_facts(), |_| None);
            let mut first = Vec::new();
            let mut second = Vec::new();
            emit_response(&report, &mut first).unwrap();
            emit_response(&report, &mut second).unwrap();
            assert_eq!(first, second);
            assert!(first.ends_with(b"\n"));
        }
    }
}
