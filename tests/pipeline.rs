//! End-to-end pipeline tests over on-disk source trees.
//!
//! Each test writes a small PHP project into a temporary directory, indexes
//! it from disk and runs resolution, queries or fact extraction on it.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use eventlens::cli::{open_index, run_facts, IndexSource};
use eventlens::config::AnalysisConfig;
use eventlens::facts::FactKind;
use eventlens::php::{QueryBuilder, TypeResolver, UnitIndex};
use eventlens::ast::NodeKind;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, content).unwrap();
}

/// A small shop: one event, one listener, one use case dispatching the event.
fn shop() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "src/Order/Event/OrderPlaced.php",
        "<?php\nnamespace App\\Order\\Event;\n\nfinal class OrderPlaced\n{\n    public function __construct(public readonly int $orderId) {}\n}\n",
    );
    write(
        root,
        "src/Order/PlaceOrder.php",
        r#"<?php
namespace App\Order;

use App\Order\Event\OrderPlaced;
use Psr\EventDispatcher\EventDispatcherInterface;

final class PlaceOrder
{
    public function __construct(private EventDispatcherInterface $events) {}

    public function __invoke(int $orderId): void
    {
        $event = new OrderPlaced($orderId);
        $this->events->dispatch($event);
    }
}
"#,
    );
    write(
        root,
        "src/Mail/OrderPlacedListener.php",
        r#"<?php
namespace App\Mail;

use App\Order\Event\OrderPlaced;

class OrderPlacedListener
{
    public function __invoke(OrderPlaced $event): void {}
}
"#,
    );
    write(root, "vendor/lib/Broken.php", "<?php class {");
    dir
}

const CONFIG: &str = r#"{
    "collectors": {
        "use_case": [{"kind": "fqnRegex", "pattern": "^App\\\\Order\\\\PlaceOrder$"}],
        "listener": [{"kind": "fqnRegex", "pattern": ".*Listener$"}],
        "event_dispatch": [
            {"kind": "fqnRegex", "pattern": "EventDispatcherInterface$"},
            {"kind": "methodNameRegex", "pattern": "^dispatch$"}
        ]
    },
    "components": {"src/Order": "Ordering", "src/Mail": "Mailing"},
    "exclude": ["vendor/**"]
}"#;

// ============================================================================
// Tests
// ============================================================================

#[test]
fn facts_are_grouped_by_component() {
    let dir = shop();
    let config = AnalysisConfig::parse(CONFIG).unwrap();
    let index = open_index(IndexSource::Root(dir.path()), &config.exclude).unwrap();
    let report = run_facts(&index, &config).unwrap();

    assert_eq!(report.summary.use_cases, 1);
    assert_eq!(report.summary.listeners, 1);
    assert_eq!(report.summary.event_dispatches, 1);
    assert_eq!(report.summary.skipped, 0);
    assert!(report.unassigned.is_empty());

    let names: Vec<&str> = report.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Mailing", "Ordering"]);

    let mailing = &report.components[0];
    assert_eq!(mailing.facts[0].kind, FactKind::Listener);
    assert_eq!(mailing.facts[0].method.as_deref(), Some("__invoke"));
    let event = mailing.facts[0].event.as_ref().unwrap();
    assert_eq!(event.fqn, "App\\Order\\Event\\OrderPlaced");
    assert_eq!(event.short_name, "OrderPlaced");

    let dispatch = report.components[1]
        .facts
        .iter()
        .find(|f| f.kind == FactKind::EventDispatch)
        .unwrap();
    assert_eq!(dispatch.fqn, "App\\Order\\PlaceOrder");
    assert_eq!(dispatch.method.as_deref(), Some("__invoke"));
    assert_eq!(dispatch.file.as_deref(), Some("src/Order/PlaceOrder.php"));
}

#[test]
fn unexcluded_syntax_errors_abort_indexing() {
    let dir = shop();
    let err = open_index(IndexSource::Root(dir.path()), &[]).unwrap_err();
    assert!(matches!(err, eventlens::error::EventlensError::ParseError { .. }));
}

#[test]
fn snapshots_answer_like_the_sources() {
    let dir = shop();
    let config = AnalysisConfig::parse(CONFIG).unwrap();
    let index = open_index(IndexSource::Root(dir.path()), &config.exclude).unwrap();
    let snapshot = dir.path().join("index.json");
    index.save(&snapshot).unwrap();

    let loaded = open_index(IndexSource::Snapshot(&snapshot), &[]).unwrap();
    assert_eq!(loaded.len(), index.len());
    let from_sources = run_facts(&index, &config).unwrap();
    let from_snapshot = run_facts(&loaded, &config).unwrap();
    assert_eq!(
        serde_json::to_value(&from_sources.components).unwrap(),
        serde_json::to_value(&from_snapshot.components).unwrap()
    );
}

#[test]
fn resolution_is_idempotent_across_queries() {
    let dir = shop();
    let index = UnitIndex::build(
        dir.path(),
        &eventlens::php::IndexOptions::default().exclude("vendor/**"),
    )
    .unwrap();
    let mut resolver = TypeResolver::new(&index);
    let query = QueryBuilder::new()
        .select_call_sites("EventDispatcherInterface$", "^dispatch$")
        .all()
        .unwrap();

    let first = query.execute(&mut resolver).unwrap();
    let second = query.execute(&mut resolver).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);

    let call = first[0].node();
    assert!(matches!(index.forest().kind(call), NodeKind::MethodCall { .. }));
    let argument = index.forest().arguments(call)[0];
    let value = index.forest().first_child(argument).unwrap();
    let once = resolver.resolve(value).unwrap();
    let twice = resolver.resolve(value).unwrap();
    assert_eq!(once.names(), vec!["App\\Order\\Event\\OrderPlaced"]);
    assert_eq!(once.names(), twice.names());
}
