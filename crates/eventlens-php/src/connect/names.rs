//! Name-resolution pass.
//!
//! Tracks the namespace and imports in effect while walking each file and
//! writes the fully-qualified name into `resolved_name`:
//! - `Name` nodes (class references, type hints, functions, constants);
//! - class, interface and trait declarations;
//! - top-level function declarations.
//!
//! `self` and `static` resolve to the enclosing class, `parent` to the
//! enclosing class's parent. The textual name stays in the node kind.

use eventlens_core::types::NodeId;
use eventlens_php_ast::{Forest, NameRole, NameScope, NodeKind};

enum Frame {
    Enter(NodeId),
    Leave(NodeId),
}

struct ClassFrame {
    fqn: String,
    parent: Option<String>,
}

/// Resolve every name in the forest and record per-file/namespace scopes.
pub fn resolve_names(forest: &mut Forest) {
    let roots: Vec<NodeId> = forest.files().iter().map(|f| f.root).collect();
    let mut resolved = 0usize;
    for root in roots {
        resolved += resolve_file(forest, root);
    }
    tracing::debug!(resolved, "resolved names");
}

fn resolve_file(forest: &mut Forest, root: NodeId) -> usize {
    let fallback = NameScope::default();
    let mut scopes: Vec<NameScope> = Vec::new();
    let mut classes: Vec<ClassFrame> = Vec::new();
    let mut resolved = 0usize;
    let mut work = vec![Frame::Enter(root)];

    while let Some(frame) = work.pop() {
        match frame {
            Frame::Enter(id) => {
                let kind = forest.kind(id).clone();
                match &kind {
                    NodeKind::File => scopes.push(NameScope::new(id, "")),
                    NodeKind::Namespace { name } => scopes.push(NameScope::new(id, name.as_str())),
                    NodeKind::Use { kind, name, alias } => {
                        if let Some(scope) = scopes.last_mut() {
                            scope.add_use(*kind, name, alias);
                        }
                    }
                    NodeKind::Class { name, .. }
                    | NodeKind::Interface { name }
                    | NodeKind::Trait { name } => {
                        let scope = scopes.last().unwrap_or(&fallback);
                        let fqn = scope.qualify(name);
                        let parent = match kind {
                            NodeKind::Class { .. } => forest
                                .names_with_role(id, NameRole::Extends)
                                .first()
                                .and_then(|n| forest.kind(*n).name())
                                .map(|text| scope.resolve_class(text)),
                            _ => None,
                        };
                        forest.node_mut(id).resolved_name = Some(fqn.clone());
                        classes.push(ClassFrame { fqn, parent });
                    }
                    NodeKind::Function { name } if classes.is_empty() => {
                        let scope = scopes.last().unwrap_or(&fallback);
                        forest.node_mut(id).resolved_name = Some(scope.qualify(name));
                    }
                    NodeKind::Name { text, role } => {
                        let scope = scopes.last().unwrap_or(&fallback);
                        let fqn = resolve_name(scope, classes.last(), text, *role);
                        forest.node_mut(id).resolved_name = Some(fqn);
                        resolved += 1;
                    }
                    _ => {}
                }
                work.push(Frame::Leave(id));
                work.extend(forest.children(id).iter().rev().map(|c| Frame::Enter(*c)));
            }
            Frame::Leave(id) => match forest.kind(id) {
                NodeKind::File | NodeKind::Namespace { .. } => {
                    if let Some(scope) = scopes.pop() {
                        forest.set_name_scope(scope);
                    }
                }
                kind if kind.is_class_like() => {
                    classes.pop();
                }
                _ => {}
            },
        }
    }
    resolved
}

fn resolve_name(
    scope: &NameScope,
    class: Option<&ClassFrame>,
    text: &str,
    role: NameRole,
) -> String {
    match role {
        NameRole::Function => scope.resolve_function(text),
        NameRole::Constant => scope.resolve_constant(text),
        _ => match text.to_ascii_lowercase().as_str() {
            "self" | "static" => class
                .map(|c| c.fqn.clone())
                .unwrap_or_else(|| text.to_string()),
            "parent" => class
                .and_then(|c| c.parent.clone())
                .unwrap_or_else(|| text.to_string()),
            _ => scope.resolve_class(text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::link_parents;
    use eventlens_php_ast::parse_source;

    fn connected(source: &str) -> Forest {
        let mut forest = parse_source("src/Test.php", source).unwrap();
        link_parents(&mut forest).unwrap();
        resolve_names(&mut forest);
        forest
    }

    fn resolved(forest: &Forest, text: &str, role: NameRole) -> Vec<String> {
        forest
            .ids()
            .filter(|id| {
                matches!(forest.kind(*id), NodeKind::Name { text: t, role: r } if t == text && *r == role)
            })
            .filter_map(|id| forest.node(id).resolved_name.clone())
            .collect()
    }

    const SOURCE: &str = r#"<?php
namespace App\Order;

use App\Event\OrderPlaced;
use Psr\Log\LoggerInterface as Logger;

class PlaceOrder extends Base
{
    public function __construct(private Logger $logger) {}

    public function make(): self
    {
        parent::boot();
        return new static();
    }

    public function event(): OrderPlaced
    {
        return new OrderPlaced();
    }

    public function count(): int
    {
        return 1;
    }
}
"#;

    #[test]
    fn declarations_get_namespaced_fqn() {
        let forest = connected(SOURCE);
        let class = forest
            .ids()
            .find(|id| matches!(forest.kind(*id), NodeKind::Class { .. }))
            .unwrap();
        assert_eq!(
            forest.node(class).resolved_name.as_deref(),
            Some("App\\Order\\PlaceOrder")
        );
    }

    #[test]
    fn imports_and_relative_names_expand() {
        let forest = connected(SOURCE);
        assert_eq!(
            resolved(&forest, "Logger", NameRole::TypeHint),
            vec!["Psr\\Log\\LoggerInterface"]
        );
        assert_eq!(
            resolved(&forest, "Base", NameRole::Extends),
            vec!["App\\Order\\Base"]
        );
        assert_eq!(
            resolved(&forest, "OrderPlaced", NameRole::Class),
            vec!["App\\Event\\OrderPlaced"]
        );
        assert_eq!(resolved(&forest, "int", NameRole::TypeHint), vec!["int"]);
    }

    #[test]
    fn self_static_and_parent_use_enclosing_class() {
        let forest = connected(SOURCE);
        assert_eq!(
            resolved(&forest, "self", NameRole::TypeHint),
            vec!["App\\Order\\PlaceOrder"]
        );
        assert_eq!(
            resolved(&forest, "static", NameRole::Class),
            vec!["App\\Order\\PlaceOrder"]
        );
        assert_eq!(
            resolved(&forest, "parent", NameRole::Class),
            vec!["App\\Order\\Base"]
        );
    }

    #[test]
    fn namespace_scope_is_recorded() {
        let forest = connected(SOURCE);
        let namespace = forest
            .ids()
            .find(|id| matches!(forest.kind(*id), NodeKind::Namespace { .. }))
            .unwrap();
        let scope = forest.name_scope(namespace).expect("scope recorded");
        assert_eq!(scope.namespace, "App\\Order");
        assert_eq!(scope.resolve_class("Logger"), "Psr\\Log\\LoggerInterface");
    }

    #[test]
    fn global_namespace_keeps_plain_names() {
        let forest = connected("<?php\nclass Plain { public function f(): Other {} }\n");
        assert_eq!(resolved(&forest, "Other", NameRole::TypeHint), vec!["Other"]);
    }
}
