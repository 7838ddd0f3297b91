// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Lowering tests over small PHP sources.

use eventlens_php_ast::{parse_source, Forest, NameRole, NodeKind, ParseError, UseKind};

fn parse(source: &str) -> Forest {
    parse_source("src/Test.php", source).expect("source should parse")
}

fn find<'a>(forest: &'a Forest, pred: impl Fn(&NodeKind) -> bool + 'a) -> Vec<&'a NodeKind> {
    forest
        .ids()
        .map(|id| forest.kind(id))
        .filter(|k| pred(*k))
        .collect()
}

#[test]
fn registers_single_file_root() {
    let forest = parse("<?php\necho 1;\n");
    assert_eq!(forest.files().len(), 1);
    let file = &forest.files()[0];
    assert_eq!(file.path, "src/Test.php");
    assert!(matches!(forest.kind(file.root), NodeKind::File));
    assert_eq!(file.content_hash.0.len(), 64);
}

#[test]
fn lowers_class_members() {
    let forest = parse(
        r#"<?php
namespace App\Order;

final class PlaceOrder extends Base implements Handler
{
    private Logger $logger;
    public const NAME = 'place';

    public function __invoke(Command $command): void
    {
        $this->logger->info('x');
    }
}
"#,
    );

    let classes = find(&forest, |k| matches!(k, NodeKind::Class { .. }));
    assert_eq!(classes.len(), 1);
    match classes[0] {
        NodeKind::Class { name, modifiers } => {
            assert_eq!(name, "PlaceOrder");
            assert!(modifiers.is_final);
        }
        other => panic!("unexpected {other}"),
    }

    let properties = find(&forest, |k| matches!(k, NodeKind::Property { .. }));
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].name(), Some("logger"));

    let methods = find(&forest, |k| matches!(k, NodeKind::Method { .. }));
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].name(), Some("__invoke"));

    let constants = find(&forest, |k| matches!(k, NodeKind::ClassConstant { .. }));
    assert_eq!(constants[0].name(), Some("NAME"));

    let extends = find(&forest, |k| {
        matches!(k, NodeKind::Name { role: NameRole::Extends, .. })
    });
    assert_eq!(extends[0].name(), Some("Base"));
    let implements = find(&forest, |k| {
        matches!(k, NodeKind::Name { role: NameRole::Implements, .. })
    });
    assert_eq!(implements[0].name(), Some("Handler"));

    let calls = find(&forest, |k| matches!(k, NodeKind::MethodCall { .. }));
    assert_eq!(calls[0].name(), Some("info"));
    let fetches = find(&forest, |k| matches!(k, NodeKind::PropertyFetch { .. }));
    assert_eq!(fetches[0].name(), Some("logger"));
}

#[test]
fn unbraced_namespace_owns_following_statements() {
    let forest = parse("<?php\nnamespace App;\n\nclass A {}\nclass B {}\n");
    let namespace = forest
        .ids()
        .find(|id| matches!(forest.kind(*id), NodeKind::Namespace { .. }))
        .expect("namespace node");
    let classes: Vec<_> = forest
        .children(namespace)
        .iter()
        .filter(|c| matches!(forest.kind(**c), NodeKind::Class { .. }))
        .collect();
    assert_eq!(classes.len(), 2);
}

#[test]
fn use_declarations_become_use_nodes() {
    let forest = parse(
        "<?php\nnamespace App;\nuse App\\Event\\{OrderPlaced, OrderShipped as Shipped};\nuse function App\\helper;\n",
    );
    let uses: Vec<_> = find(&forest, |k| matches!(k, NodeKind::Use { .. }))
        .into_iter()
        .map(|k| match k {
            NodeKind::Use { kind, name, alias } => (*kind, name.clone(), alias.clone()),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(uses.len(), 3);
    assert!(uses.contains(&(
        UseKind::Class,
        "App\\Event\\OrderShipped".to_string(),
        "Shipped".to_string()
    )));
    assert!(uses.contains(&(
        UseKind::Function,
        "App\\helper".to_string(),
        "helper".to_string()
    )));
}

#[test]
fn doc_comment_attaches_to_declaration() {
    let forest = parse(
        r#"<?php
class A
{
    /** @var Logger */
    private $logger;

    /** @return Event[] */
    public function events() { return []; }
}
"#,
    );
    let property = forest
        .ids()
        .find(|id| matches!(forest.kind(*id), NodeKind::Property { .. }))
        .expect("property");
    assert_eq!(forest.doc_comment(property), Some("/** @var Logger */"));

    let method = forest
        .ids()
        .find(|id| matches!(forest.kind(*id), NodeKind::Method { .. }))
        .expect("method");
    assert_eq!(forest.doc_comment(method), Some("/** @return Event[] */"));
}

#[test]
fn statement_doc_comment_stays_inline() {
    let forest = parse("<?php\nfunction f() {\n    /** @var Foo $x */\n    $x = make();\n}\n");
    let docs = find(&forest, |k| matches!(k, NodeKind::DocComment { .. }));
    assert_eq!(docs.len(), 1);
    let function = forest
        .ids()
        .find(|id| matches!(forest.kind(*id), NodeKind::Function { .. }))
        .expect("function");
    assert_eq!(forest.doc_comment(function), None);
}

#[test]
fn parameters_carry_type_and_promotion() {
    let forest = parse(
        "<?php\nclass A {\n    public function __construct(private readonly Bus $bus, int ...$ids) {}\n}\n",
    );
    let params: Vec<_> = find(&forest, |k| matches!(k, NodeKind::Parameter { .. }));
    assert_eq!(params.len(), 2);
    match params[0] {
        NodeKind::Parameter { name, promoted, .. } => {
            assert_eq!(name, "bus");
            let modifiers = promoted.expect("promoted");
            assert!(modifiers.is_readonly);
        }
        _ => unreachable!(),
    }
    match params[1] {
        NodeKind::Parameter { name, variadic, promoted, .. } => {
            assert_eq!(name, "ids");
            assert!(*variadic);
            assert!(promoted.is_none());
        }
        _ => unreachable!(),
    }
}

#[test]
fn new_and_coalesce_expressions() {
    let forest = parse("<?php\n$a = new \\App\\Foo(1);\n$b = $a ?? null;\n");
    let news = forest
        .ids()
        .find(|id| matches!(forest.kind(*id), NodeKind::New))
        .expect("new");
    let class = forest.first_child(news).expect("class name");
    assert!(matches!(
        forest.kind(class),
        NodeKind::Name { role: NameRole::Class, text } if text == "\\App\\Foo"
    ));
    assert_eq!(forest.arguments(news).len(), 1);
    assert_eq!(find(&forest, |k| matches!(k, NodeKind::Coalesce)).len(), 1);
}

#[test]
fn foreach_records_key_presence() {
    let forest = parse("<?php\nforeach ($items as $k => $v) {}\nforeach ($items as $v) {}\n");
    let loops = find(&forest, |k| matches!(k, NodeKind::Foreach { .. }));
    assert_eq!(loops.len(), 2);
    assert_eq!(loops[0], &NodeKind::Foreach { has_key: true });
    assert_eq!(loops[1], &NodeKind::Foreach { has_key: false });
}

#[test]
fn syntax_errors_are_rejected() {
    let err = parse_source("src/Broken.php", "<?php class {").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { .. }));
    assert_eq!(err.path(), Some("src/Broken.php"));
}
