//! Domain fact extraction.
//!
//! Each configured collector becomes one or two queries. Criteria of the
//! same kind are OR-ed into a single alternation; FQN and method-name
//! criteria are AND-ed by the query. Event-carrying facts need the event
//! type to reduce to exactly one known class; candidates that do not are
//! skipped and recorded as [`Diagnostic`]s.

use eventlens_core::facts::{Diagnostic, DomainFact, EventRef, FactKind, FactOrigin, FactSet};
use eventlens_core::filter::{CollectorDefinition, CollectorSet};
use eventlens_core::types::{NodeId, Type};
use eventlens_php_ast::{Forest, NodeKind};
use thiserror::Error;

use crate::index::{UnitIndex, UnitKind};
use crate::query::{QueryBuilder, QueryError, QueryMatch};
use crate::resolve::{ResolveError, TypeResolver};

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid collector query: {0}")]
    Query(#[from] QueryError),

    /// Only circular references propagate; other resolution failures become
    /// diagnostics.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

// ============================================================================
// Event Argument Policy
// ============================================================================

/// Chooses the node carrying the event of a listener or dispatch.
pub trait EventArgumentPolicy {
    /// Event parameter of a listener or subscriber method.
    fn event_parameter(&self, forest: &Forest, method: NodeId) -> Option<NodeId>;

    /// Event expression of a dispatch call.
    fn event_argument(&self, forest: &Forest, call: NodeId) -> Option<NodeId>;
}

/// The first parameter is the event; so is the first positional argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstPositional;

impl EventArgumentPolicy for FirstPositional {
    fn event_parameter(&self, forest: &Forest, method: NodeId) -> Option<NodeId> {
        forest.parameters(method).into_iter().next()
    }

    fn event_argument(&self, forest: &Forest, call: NodeId) -> Option<NodeId> {
        forest
            .arguments(call)
            .into_iter()
            .find(|arg| {
                matches!(
                    forest.kind(*arg),
                    NodeKind::Argument {
                        name: None,
                        unpack: false
                    }
                )
            })
            .and_then(|arg| forest.first_child(arg))
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Runs a collector set over an index.
pub struct FactExtractor<'c> {
    collectors: &'c CollectorSet,
    policy: Box<dyn EventArgumentPolicy + 'c>,
}

enum EventOutcome {
    Found(EventRef),
    Skipped(String),
}

impl<'c> FactExtractor<'c> {
    pub fn new(collectors: &'c CollectorSet) -> Self {
        FactExtractor {
            collectors,
            policy: Box::new(FirstPositional),
        }
    }

    /// Replace the event argument policy.
    pub fn with_policy(mut self, policy: impl EventArgumentPolicy + 'c) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Extract every configured fact kind.
    pub fn extract(&self, resolver: &mut TypeResolver<'_>) -> Result<FactSet, ExtractError> {
        let mut facts = FactSet::new();
        for collector in self.collectors.iter() {
            let before = facts.len();
            match collector.kind {
                FactKind::UseCase => self.use_cases(collector, resolver, &mut facts)?,
                FactKind::Listener | FactKind::Subscriber => {
                    self.listeners(collector, resolver, &mut facts)?
                }
                FactKind::EventDispatch => self.dispatches(collector, resolver, &mut facts)?,
            }
            tracing::debug!(kind = %collector.kind, facts = facts.len() - before, "collector done");
        }
        Ok(facts)
    }

    fn use_cases(
        &self,
        collector: &CollectorDefinition,
        resolver: &mut TypeResolver<'_>,
        facts: &mut FactSet,
    ) -> Result<(), ExtractError> {
        let index = resolver.index();
        let mut builder = QueryBuilder::new();
        if let Some(fqn) = alternation(&collector.fqn_patterns()) {
            builder = builder.select_units_matching(&fqn);
        }
        if let Some(methods) = alternation(&collector.method_patterns()) {
            builder = builder.select_methods(&methods);
        }
        for hit in run(builder, resolver, collector.kind, facts)? {
            let Some(unit) = hit.fqn().and_then(|fqn| index.find(fqn)) else {
                continue;
            };
            if unit.kind != UnitKind::Class {
                continue;
            }
            facts.insert(DomainFact::use_case(&unit.fqn).with_origin(origin(index, unit.node)));
        }
        Ok(())
    }

    fn listeners(
        &self,
        collector: &CollectorDefinition,
        resolver: &mut TypeResolver<'_>,
        facts: &mut FactSet,
    ) -> Result<(), ExtractError> {
        let index = resolver.index();
        let forest = index.forest();
        let mut builder = QueryBuilder::new();
        if let Some(fqn) = alternation(&collector.fqn_patterns()) {
            builder = builder.select_units_matching(&fqn);
        }
        let methods = alternation(&collector.method_patterns()).unwrap_or_else(|| ".*".to_string());
        builder = builder.select_methods(&methods);

        for hit in run(builder, resolver, collector.kind, facts)? {
            let QueryMatch::Method { fqn, method, node } = hit else {
                continue;
            };
            if index.find(&fqn).is_some_and(|u| u.kind == UnitKind::Interface) {
                continue;
            }
            let NodeKind::Method { modifiers, .. } = forest.kind(node) else {
                continue;
            };
            if !modifiers.is_public()
                || modifiers.is_static
                || method.eq_ignore_ascii_case("__construct")
            {
                continue;
            }
            let parameter = self.policy.event_parameter(forest, node);
            match event_of(resolver, parameter, "no event parameter")? {
                EventOutcome::Found(event) => {
                    let fact = if collector.kind == FactKind::Subscriber {
                        DomainFact::subscriber(&fqn, &method, event)
                    } else {
                        DomainFact::listener(&fqn, &method, event)
                    };
                    facts.insert(fact.with_origin(origin(index, node)));
                }
                EventOutcome::Skipped(reason) => {
                    skip(facts, collector.kind, &fqn, Some(method), reason, origin(index, node));
                }
            }
        }
        Ok(())
    }

    fn dispatches(
        &self,
        collector: &CollectorDefinition,
        resolver: &mut TypeResolver<'_>,
        facts: &mut FactSet,
    ) -> Result<(), ExtractError> {
        let index = resolver.index();
        let forest = index.forest();
        let receivers = alternation(&collector.fqn_patterns());
        let methods = alternation(&collector.method_patterns());

        let builder = QueryBuilder::new().select_call_sites(
            receivers.as_deref().unwrap_or(".*"),
            methods.as_deref().unwrap_or(".*"),
        );
        let mut sites = run(builder, resolver, collector.kind, facts)?;
        // Plain function calls have no receiver to match.
        if receivers.is_none() {
            if let Some(methods) = &methods {
                let builder = QueryBuilder::new().select_function_calls(methods);
                sites.extend(run(builder, resolver, collector.kind, facts)?);
            }
        }

        for site in sites {
            let QueryMatch::CallSite {
                node,
                called,
                fqn,
                caller,
            } = site
            else {
                continue;
            };
            let (Some(fqn), Some(caller)) = (fqn, caller) else {
                tracing::debug!(called = %called, "dispatch outside a class method ignored");
                continue;
            };
            let argument = self.policy.event_argument(forest, node);
            match event_of(resolver, argument, "no event argument")? {
                EventOutcome::Found(event) => {
                    let fact = DomainFact::event_dispatch(&fqn, &caller, event);
                    facts.insert(fact.with_origin(origin(index, node)));
                }
                EventOutcome::Skipped(reason) => {
                    skip(facts, collector.kind, &fqn, Some(caller), reason, origin(index, node));
                }
            }
        }
        Ok(())
    }
}

/// Extract facts with a fresh resolver and the default policy.
pub fn extract_facts(
    index: &UnitIndex,
    collectors: &CollectorSet,
) -> Result<FactSet, ExtractError> {
    let mut resolver = TypeResolver::new(index);
    FactExtractor::new(collectors).extract(&mut resolver)
}

// ============================================================================
// Helpers
// ============================================================================

/// `(?:a)|(?:b)` for several patterns, `None` for none.
fn alternation(patterns: &[&str]) -> Option<String> {
    if patterns.is_empty() {
        return None;
    }
    Some(
        patterns
            .iter()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

/// Run a collector query. A circular reference aborts extraction; any other
/// resolution failure drops the collector with a diagnostic.
fn run(
    builder: QueryBuilder,
    resolver: &mut TypeResolver<'_>,
    kind: FactKind,
    facts: &mut FactSet,
) -> Result<Vec<QueryMatch>, ExtractError> {
    let query = builder.all()?;
    match query.execute(resolver) {
        Ok(hits) => Ok(hits),
        Err(e @ ResolveError::Circular { .. }) => Err(e.into()),
        Err(e) => {
            tracing::info!(kind = %kind, error = %e, "collector query failed");
            let message = format!("collector omitted: {e}");
            facts.push_diagnostic(Diagnostic::new(kind, "*", None, message));
            Ok(Vec::new())
        }
    }
}

fn event_of(
    resolver: &mut TypeResolver<'_>,
    node: Option<NodeId>,
    missing: &str,
) -> Result<EventOutcome, ExtractError> {
    let Some(node) = node else {
        return Ok(EventOutcome::Skipped(missing.to_string()));
    };
    let types = match resolver.resolve(node) {
        Ok(types) => types,
        Err(e @ ResolveError::Circular { .. }) => return Err(e.into()),
        Err(e) => return Ok(EventOutcome::Skipped(format!("fact omitted: {e}"))),
    };
    let forest = resolver.forest();
    let types = if declared_nullable(forest, node) {
        types.without_null()
    } else {
        types
    };
    if types.is_empty() || types.is_unknown() {
        return Ok(EventOutcome::Skipped(format!("event type is unknown ({types})")));
    }
    if types.iter().any(Type::is_unknown) {
        return Ok(EventOutcome::Skipped(format!("event type is partly unresolved ({types})")));
    }
    Ok(match types.unique() {
        Ok(ty) if ty.is_native() => {
            EventOutcome::Skipped(format!("event type {} is not a class", ty.name()))
        }
        Ok(ty) => EventOutcome::Found(EventRef::new(ty.name())),
        Err(e) => EventOutcome::Skipped(format!("event type is ambiguous: {e}")),
    })
}

/// A parameter declared `?T` or `T|null`.
fn declared_nullable(forest: &Forest, node: NodeId) -> bool {
    if !matches!(forest.kind(node), NodeKind::Parameter { .. }) {
        return false;
    }
    let Some(hint) = forest.type_hint(node) else {
        return false;
    };
    match forest.kind(hint) {
        NodeKind::NullableType => true,
        NodeKind::UnionType => forest
            .children(hint)
            .iter()
            .filter_map(|c| forest.kind(*c).name())
            .any(|name| name.eq_ignore_ascii_case("null")),
        _ => false,
    }
}

fn skip(
    facts: &mut FactSet,
    kind: FactKind,
    fqn: &str,
    method: Option<String>,
    reason: String,
    origin: FactOrigin,
) {
    tracing::info!(
        kind = %kind,
        fqn,
        method = method.as_deref().unwrap_or(""),
        reason = %reason,
        "skipping fact"
    );
    facts.push_diagnostic(Diagnostic::new(kind, fqn, method, reason).with_origin(origin));
}

fn origin(index: &UnitIndex, node: NodeId) -> FactOrigin {
    let forest = index.forest();
    FactOrigin {
        file: forest.file_of(node).map(|f| f.path.clone()).unwrap_or_default(),
        span: forest.node(node).span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(sources: &[(&str, &str)]) -> UnitIndex {
        UnitIndex::from_sources(sources).unwrap()
    }

    fn shop() -> UnitIndex {
        index(&[
            (
                "src/Event/OrderPlaced.php",
                "<?php\nnamespace App\\Event;\nclass OrderPlaced {}\n",
            ),
            (
                "src/Listener/OrderPlacedListener.php",
                r#"<?php
namespace App\Listener;
use App\Event\OrderPlaced;
class OrderPlacedListener {
    public function __construct(int $retries) {}
    public function onOrderPlaced(OrderPlaced $event): void {}
    public function onAnything($event): void {}
    private function helper(OrderPlaced $event) {}
    public static function create(OrderPlaced $event) {}
}
"#,
            ),
            (
                "src/Service/OrderPlacedService.php",
                r#"<?php
namespace App\Service;
use App\Event\OrderPlaced;
use Symfony\Contracts\EventDispatcher\EventDispatcherInterface;
class OrderPlacedService {
    public function __construct(private EventDispatcherInterface $dispatcher) {}
    public function place(): void {
        $this->dispatcher->dispatch(new OrderPlaced());
    }
}
"#,
            ),
        ])
    }

    fn collectors(json: &str) -> CollectorSet {
        CollectorSet::parse_json(json).unwrap()
    }

    #[test]
    fn fqn_criterion_selects_only_matching_units() {
        let index = shop();
        let facts = extract_facts(
            &index,
            &collectors(r#"{"use_case": [{"kind": "fqnRegex", "pattern": ".*Listener$"}]}"#),
        )
        .unwrap();
        let fqns: Vec<&str> = facts.iter().map(DomainFact::fqn).collect();
        assert_eq!(fqns, vec!["App\\Listener\\OrderPlacedListener"]);
    }

    #[test]
    fn listeners_use_the_first_parameter_type() {
        let index = shop();
        let facts = extract_facts(
            &index,
            &collectors(r#"{"listener": [{"kind": "fqnRegex", "pattern": "Listener$"}]}"#),
        )
        .unwrap();
        let listeners: Vec<_> = facts.of_kind(FactKind::Listener).collect();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].method(), Some("onOrderPlaced"));
        assert_eq!(listeners[0].event().map(|e| e.fqn.as_str()), Some("App\\Event\\OrderPlaced"));
        assert_eq!(
            listeners[0].origin().map(|o| o.file.as_str()),
            Some("src/Listener/OrderPlacedListener.php")
        );

        // The untyped parameter is reported; private, static and constructor
        // methods are not candidates at all.
        let diagnostics = facts.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].method.as_deref(), Some("onAnything"));
    }

    #[test]
    fn same_kind_criteria_are_alternatives() {
        let index = shop();
        let facts = extract_facts(
            &index,
            &collectors(
                r#"{"use_case": [
                    {"kind": "fqnRegex", "pattern": "Listener$"},
                    {"kind": "fqnRegex", "pattern": "Service$"}
                ]}"#,
            ),
        )
        .unwrap();
        assert_eq!(facts.len(), 2);

        let facts = extract_facts(
            &index,
            &collectors(
                r#"{"listener": [
                    {"kind": "fqnRegex", "pattern": "Listener$"},
                    {"kind": "methodNameRegex", "pattern": "^onOrder"}
                ]}"#,
            ),
        )
        .unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts.diagnostics().is_empty());
    }

    #[test]
    fn dispatches_are_keyed_by_the_enclosing_method() {
        let index = shop();
        let facts = extract_facts(
            &index,
            &collectors(
                r#"{"event_dispatch": [
                    {"kind": "fqnRegex", "pattern": "EventDispatcherInterface$"},
                    {"kind": "methodNameRegex", "pattern": "^dispatch$"}
                ]}"#,
            ),
        )
        .unwrap();
        let dispatches: Vec<_> = facts.of_kind(FactKind::EventDispatch).collect();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].fqn(), "App\\Service\\OrderPlacedService");
        assert_eq!(dispatches[0].method(), Some("place"));
        assert_eq!(dispatches[0].event().map(EventRef::short_name), Some("OrderPlaced"));
    }

    #[test]
    fn ambiguous_dispatched_events_are_skipped_with_a_diagnostic() {
        let index = index(&[
            ("src/A.php", "<?php\nnamespace App;\nclass A {}\n"),
            ("src/B.php", "<?php\nnamespace App;\nclass B {}\n"),
            (
                "src/Trigger.php",
                r#"<?php
namespace App;
class Trigger {
    public function fire(bool $cond) {
        $x = $cond ? new A() : new B();
        dispatch($x);
    }
}
"#,
            ),
        ]);
        let facts = extract_facts(
            &index,
            &collectors(r#"{"event_dispatch": [{"kind": "methodNameRegex", "pattern": "^dispatch$"}]}"#),
        )
        .unwrap();
        assert!(facts.is_empty());
        let diagnostics = facts.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, FactKind::EventDispatch);
        assert_eq!(diagnostics[0].fqn, "App\\Trigger");
        assert_eq!(diagnostics[0].method.as_deref(), Some("fire"));
        assert!(diagnostics[0].message.contains("ambiguous"));
    }

    #[test]
    fn partly_resolved_events_are_skipped() {
        let index = index(&[
            ("src/Ev.php", "<?php\nnamespace App;\nclass Ev {}\n"),
            (
                "src/EvListener.php",
                "<?php\nnamespace App;\nclass EvListener {\n    public function on(?Ev $e) {}\n}\n",
            ),
            (
                "src/Svc.php",
                r#"<?php
namespace App;
class Svc {
    public function fire(bool $c, $f) {
        $x = $c ? new Ev() : $f->make();
        dispatch($x);
    }
    public function maybe(bool $c) {
        $y = $c ? new Ev() : null;
        dispatch($y);
    }
}
"#,
            ),
        ]);
        let facts = extract_facts(
            &index,
            &collectors(
                r#"{
                    "listener": [{"kind": "fqnRegex", "pattern": "Listener$"}],
                    "event_dispatch": [{"kind": "methodNameRegex", "pattern": "^dispatch$"}]
                }"#,
            ),
        )
        .unwrap();

        // A declared `?Ev` parameter still names its event.
        let listeners: Vec<_> = facts.of_kind(FactKind::Listener).collect();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].event().map(|e| e.fqn.as_str()), Some("App\\Ev"));

        assert_eq!(facts.of_kind(FactKind::EventDispatch).count(), 0);
        let diagnostics = facts.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        let message_of = |method: &str| {
            diagnostics
                .iter()
                .find(|d| d.method.as_deref() == Some(method))
                .map(|d| d.message.clone())
                .unwrap_or_default()
        };
        assert!(message_of("fire").contains("partly unresolved"));
        assert!(message_of("maybe").contains("ambiguous"));
    }

    #[test]
    fn custom_policy_picks_another_parameter() {
        struct LastParameter;
        impl EventArgumentPolicy for LastParameter {
            fn event_parameter(&self, forest: &Forest, method: NodeId) -> Option<NodeId> {
                forest.parameters(method).into_iter().last()
            }
            fn event_argument(&self, forest: &Forest, call: NodeId) -> Option<NodeId> {
                FirstPositional.event_argument(forest, call)
            }
        }

        let index = index(&[
            ("src/Context.php", "<?php\nnamespace App;\nclass Context {}\n"),
            ("src/Placed.php", "<?php\nnamespace App;\nclass Placed {}\n"),
            (
                "src/PlacedListener.php",
                r#"<?php
namespace App;
class PlacedListener {
    public function handle(Context $context, Placed $event) {}
}
"#,
            ),
        ]);
        let set = collectors(r#"{"listener": [{"kind": "fqnRegex", "pattern": "Listener$"}]}"#);
        let mut resolver = TypeResolver::new(&index);
        let facts = FactExtractor::new(&set)
            .with_policy(LastParameter)
            .extract(&mut resolver)
            .unwrap();
        let events: Vec<_> = facts
            .iter()
            .filter_map(|f| f.event())
            .map(|e| e.fqn.as_str())
            .collect();
        assert_eq!(events, vec!["App\\Placed"]);
    }

    #[test]
    fn alternation_wraps_each_pattern() {
        assert_eq!(alternation(&[]), None);
        assert_eq!(alternation(&["a|b"]).as_deref(), Some("(?:a|b)"));
        assert_eq!(alternation(&["a", "b$"]).as_deref(), Some("(?:a)|(?:b$)"));
    }
}
