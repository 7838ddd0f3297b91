//! Domain facts: the architectural assertions extracted from a code base.
//!
//! This module provides the fact model consumed by diagram generators:
//! - [`DomainFact`]: one use case, listener, subscriber or event dispatch
//! - [`EventRef`]: the event type carried by listener/subscriber/dispatch facts
//! - [`FactSet`]: deduplicating, deterministically ordered fact storage
//! - [`Diagnostic`]: why a candidate fact was skipped
//!
//! # Identity
//!
//! Facts are identified by kind, FQN and method (and event type for
//! dispatches). Inserting a fact with an identity already present in a
//! [`FactSet`] is a no-op, so repeated queries never inflate the output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{short_name, Span};

// ============================================================================
// Fact Kinds
// ============================================================================

/// Kind of a domain fact (and of the collector that produces it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// A class implementing an application use case.
    UseCase,
    /// A method reacting to an event.
    Listener,
    /// A method subscribed to an event.
    Subscriber,
    /// A call site dispatching an event.
    EventDispatch,
}

impl FactKind {
    /// All kinds in declaration order.
    pub const ALL: [FactKind; 4] = [
        FactKind::UseCase,
        FactKind::Listener,
        FactKind::Subscriber,
        FactKind::EventDispatch,
    ];

    /// Parse a kind from its configuration spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "use_case" | "useCase" => Some(FactKind::UseCase),
            "listener" => Some(FactKind::Listener),
            "subscriber" => Some(FactKind::Subscriber),
            "event_dispatch" | "eventDispatch" => Some(FactKind::EventDispatch),
            _ => None,
        }
    }

    /// Stable snake_case spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::UseCase => "use_case",
            FactKind::Listener => "listener",
            FactKind::Subscriber => "subscriber",
            FactKind::EventDispatch => "event_dispatch",
        }
    }

    /// Returns true if facts of this kind carry an event type.
    pub fn carries_event(&self) -> bool {
        !matches!(self, FactKind::UseCase)
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Facts
// ============================================================================

/// Source position of the declaration or call site a fact was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactOrigin {
    /// Path of the source file (relative to the analyzed root).
    pub file: String,
    /// Span of the originating node.
    pub span: Span,
}

/// Event type carried by a listener, subscriber or dispatch fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRef {
    /// Fully-qualified name of the event type.
    pub fqn: String,
}

impl EventRef {
    /// Create an event reference.
    pub fn new(fqn: impl Into<String>) -> Self {
        EventRef { fqn: fqn.into() }
    }

    /// Canonical short name of the event type.
    pub fn short_name(&self) -> &str {
        short_name(&self.fqn)
    }
}

/// One extracted architectural assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainFact {
    /// A use-case class.
    UseCase {
        fqn: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<FactOrigin>,
    },
    /// A listener method keyed by the event type of its event parameter.
    Listener {
        fqn: String,
        method: String,
        event: EventRef,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<FactOrigin>,
    },
    /// A subscriber method keyed by the event type of its event parameter.
    Subscriber {
        fqn: String,
        method: String,
        event: EventRef,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<FactOrigin>,
    },
    /// A call site dispatching an event.
    EventDispatch {
        dispatcher_fqn: String,
        dispatcher_method: String,
        event: EventRef,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<FactOrigin>,
    },
}

/// Identity key of a fact: kind, FQN, method and (for dispatches) event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactKey {
    pub kind: FactKind,
    pub fqn: String,
    pub method: Option<String>,
    pub event: Option<String>,
}

impl DomainFact {
    /// Create a use-case fact.
    pub fn use_case(fqn: impl Into<String>) -> Self {
        DomainFact::UseCase {
            fqn: fqn.into(),
            origin: None,
        }
    }

    /// Create a listener fact.
    pub fn listener(fqn: impl Into<String>, method: impl Into<String>, event: EventRef) -> Self {
        DomainFact::Listener {
            fqn: fqn.into(),
            method: method.into(),
            event,
            origin: None,
        }
    }

    /// Create a subscriber fact.
    pub fn subscriber(fqn: impl Into<String>, method: impl Into<String>, event: EventRef) -> Self {
        DomainFact::Subscriber {
            fqn: fqn.into(),
            method: method.into(),
            event,
            origin: None,
        }
    }

    /// Create an event-dispatch fact.
    pub fn event_dispatch(
        dispatcher_fqn: impl Into<String>,
        dispatcher_method: impl Into<String>,
        event: EventRef,
    ) -> Self {
        DomainFact::EventDispatch {
            dispatcher_fqn: dispatcher_fqn.into(),
            dispatcher_method: dispatcher_method.into(),
            event,
            origin: None,
        }
    }

    /// Builder method that attaches the originating source position.
    pub fn with_origin(mut self, new_origin: FactOrigin) -> Self {
        match &mut self {
            DomainFact::UseCase { origin, .. }
            | DomainFact::Listener { origin, .. }
            | DomainFact::Subscriber { origin, .. }
            | DomainFact::EventDispatch { origin, .. } => *origin = Some(new_origin),
        }
        self
    }

    /// Kind of this fact.
    pub fn kind(&self) -> FactKind {
        match self {
            DomainFact::UseCase { .. } => FactKind::UseCase,
            DomainFact::Listener { .. } => FactKind::Listener,
            DomainFact::Subscriber { .. } => FactKind::Subscriber,
            DomainFact::EventDispatch { .. } => FactKind::EventDispatch,
        }
    }

    /// FQN of the class the fact belongs to (dispatcher class for dispatches).
    pub fn fqn(&self) -> &str {
        match self {
            DomainFact::UseCase { fqn, .. }
            | DomainFact::Listener { fqn, .. }
            | DomainFact::Subscriber { fqn, .. } => fqn,
            DomainFact::EventDispatch { dispatcher_fqn, .. } => dispatcher_fqn,
        }
    }

    /// Canonical short name of [`DomainFact::fqn`].
    pub fn short_name(&self) -> &str {
        short_name(self.fqn())
    }

    /// Method name, for method-level facts.
    pub fn method(&self) -> Option<&str> {
        match self {
            DomainFact::UseCase { .. } => None,
            DomainFact::Listener { method, .. } | DomainFact::Subscriber { method, .. } => {
                Some(method)
            }
            DomainFact::EventDispatch {
                dispatcher_method, ..
            } => Some(dispatcher_method),
        }
    }

    /// Event type, for event-carrying facts.
    pub fn event(&self) -> Option<&EventRef> {
        match self {
            DomainFact::UseCase { .. } => None,
            DomainFact::Listener { event, .. }
            | DomainFact::Subscriber { event, .. }
            | DomainFact::EventDispatch { event, .. } => Some(event),
        }
    }

    /// Originating source position, if recorded.
    pub fn origin(&self) -> Option<&FactOrigin> {
        match self {
            DomainFact::UseCase { origin, .. }
            | DomainFact::Listener { origin, .. }
            | DomainFact::Subscriber { origin, .. }
            | DomainFact::EventDispatch { origin, .. } => origin.as_ref(),
        }
    }

    /// Identity key used for deduplication.
    pub fn key(&self) -> FactKey {
        FactKey {
            kind: self.kind(),
            fqn: self.fqn().to_string(),
            method: self.method().map(str::to_string),
            event: match self {
                DomainFact::EventDispatch { event, .. } => Some(event.fqn.clone()),
                _ => None,
            },
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Why a candidate fact was not emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Kind of fact that was being extracted.
    pub kind: FactKind,
    /// Class the candidate belongs to.
    pub fqn: String,
    /// Method of the candidate, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Human-readable reason.
    pub message: String,
    /// Source position of the candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<FactOrigin>,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(
        kind: FactKind,
        fqn: impl Into<String>,
        method: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            fqn: fqn.into(),
            method,
            message: message.into(),
            origin: None,
        }
    }

    /// Builder method that attaches the candidate's source position.
    pub fn with_origin(mut self, origin: FactOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}::{}: {}", self.kind, self.fqn, method, self.message),
            None => write!(f, "{} {}: {}", self.kind, self.fqn, self.message),
        }
    }
}

// ============================================================================
// Fact Set
// ============================================================================

/// Deduplicating fact storage with deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    facts: BTreeMap<FactKey, DomainFact>,
    diagnostics: Vec<Diagnostic>,
}

impl FactSet {
    /// Create an empty fact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact. Returns false if a fact with the same identity exists.
    pub fn insert(&mut self, fact: DomainFact) -> bool {
        let key = fact.key();
        if self.facts.contains_key(&key) {
            return false;
        }
        self.facts.insert(key, fact);
        true
    }

    /// Record a skipped-fact diagnostic.
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: FactSet) {
        for fact in other.facts.into_values() {
            self.insert(fact);
        }
        self.diagnostics.extend(other.diagnostics);
    }

    /// Iterate over facts in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainFact> {
        self.facts.values()
    }

    /// Facts of one kind.
    pub fn of_kind(&self, kind: FactKind) -> impl Iterator<Item = &DomainFact> {
        self.facts.values().filter(move |f| f.kind() == kind)
    }

    /// Recorded diagnostics in insertion order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if no fact was recorded.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_kind_parse_roundtrip() {
        for kind in FactKind::ALL {
            assert_eq!(FactKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FactKind::parse("eventDispatch"), Some(FactKind::EventDispatch));
        assert_eq!(FactKind::parse("controller"), None);
    }

    #[test]
    fn fact_accessors() {
        let fact = DomainFact::listener(
            "App\\Listener\\OrderPlacedListener",
            "__invoke",
            EventRef::new("App\\Event\\OrderPlaced"),
        );
        assert_eq!(fact.kind(), FactKind::Listener);
        assert_eq!(fact.short_name(), "OrderPlacedListener");
        assert_eq!(fact.method(), Some("__invoke"));
        assert_eq!(fact.event().map(EventRef::short_name), Some("OrderPlaced"));
        assert!(fact.origin().is_none());
    }

    #[test]
    fn fact_set_deduplicates_by_identity() {
        let mut facts = FactSet::new();
        assert!(facts.insert(DomainFact::use_case("App\\PlaceOrder")));
        assert!(!facts.insert(DomainFact::use_case("App\\PlaceOrder").with_origin(
            FactOrigin {
                file: "src/PlaceOrder.php".to_string(),
                span: Span::default(),
            }
        )));
        assert!(facts.insert(DomainFact::listener(
            "App\\L",
            "handle",
            EventRef::new("App\\E")
        )));
        assert!(!facts.insert(DomainFact::listener(
            "App\\L",
            "handle",
            EventRef::new("App\\Other")
        )));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.of_kind(FactKind::Listener).count(), 1);
    }

    #[test]
    fn dispatches_of_distinct_events_are_distinct() {
        let mut facts = FactSet::new();
        assert!(facts.insert(DomainFact::event_dispatch(
            "App\\S",
            "run",
            EventRef::new("App\\A")
        )));
        assert!(facts.insert(DomainFact::event_dispatch(
            "App\\S",
            "run",
            EventRef::new("App\\B")
        )));
        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn fact_serializes_with_kind_tag() {
        let fact = DomainFact::use_case("App\\PlaceOrder");
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["kind"], "use_case");
        assert_eq!(json["fqn"], "App\\PlaceOrder");
    }
}
