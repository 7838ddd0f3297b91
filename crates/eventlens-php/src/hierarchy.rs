//! Class hierarchy lookups over the connected forest.
//!
//! Every lookup starts at a class-like declaration node and follows the
//! declaration links written by the reference-injection pass:
//! `extends` names to the parent, `implements` names to interfaces and trait
//! uses to traits. Names that point outside the index stop the walk but are
//! still reported by the `*_names` functions, so callers can match library
//! supertypes by name.
//!
//! # Lookup Order
//!
//! Members resolve in this order, first match wins:
//!
//! 1. the class's own members
//! 2. used traits (and the traits they use)
//! 3. the parent chain, nearest first, each with its traits
//! 4. implemented interfaces (including inherited ones)
//!
//! Malformed hierarchies (a class extending itself, trait cycles) are cut at
//! the first repeated node.

use std::collections::HashSet;

use eventlens_core::types::NodeId;
use eventlens_php_ast::{Forest, NameRole, NodeKind};

// ============================================================================
// Direct Supertypes
// ============================================================================

/// Parent class of a class declaration (linked `extends` name).
pub fn parent_of(forest: &Forest, class: NodeId) -> Option<NodeId> {
    if !matches!(forest.kind(class), NodeKind::Class { .. }) {
        return None;
    }
    forest
        .names_with_role(class, NameRole::Extends)
        .first()
        .and_then(|name| forest.node(*name).declaration)
}

/// Interfaces implemented by a class, or extended by an interface.
pub fn interfaces_of(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    interface_name_nodes(forest, class)
        .into_iter()
        .filter_map(|name| forest.node(name).declaration)
        .collect()
}

/// Traits used directly by a class-like declaration.
pub fn traits_of(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    trait_name_nodes(forest, class)
        .into_iter()
        .filter_map(|name| forest.node(name).declaration)
        .collect()
}

fn interface_name_nodes(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    match forest.kind(class) {
        NodeKind::Class { .. } => forest.names_with_role(class, NameRole::Implements),
        NodeKind::Interface { .. } => forest.names_with_role(class, NameRole::Extends),
        _ => Vec::new(),
    }
}

fn trait_name_nodes(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    forest
        .children_where(class, |k| matches!(k, NodeKind::TraitUse))
        .flat_map(|use_node| forest.names_with_role(use_node, NameRole::TraitUse))
        .collect()
}

// ============================================================================
// Orders
// ============================================================================

/// Parent chain of a class, nearest first, excluding the class itself.
pub fn parent_chain(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([class]);
    let mut current = parent_of(forest, class);
    while let Some(parent) = current {
        if !seen.insert(parent) {
            tracing::debug!(%class, %parent, "cyclic parent chain");
            break;
        }
        chain.push(parent);
        current = parent_of(forest, parent);
    }
    chain
}

/// Traits used by a declaration, transitively, in use order.
pub fn trait_closure(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut seen = HashSet::from([class]);
    collect_traits(forest, class, &mut seen, &mut out);
    out
}

fn collect_traits(
    forest: &Forest,
    class: NodeId,
    seen: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    for used in traits_of(forest, class) {
        if seen.insert(used) {
            out.push(used);
            collect_traits(forest, used, seen, out);
        }
    }
}

/// Every interface reachable from a declaration: its own, those of its
/// parents, and the interfaces those extend.
pub fn interface_closure(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut seen = HashSet::from([class]);
    let mut pending: Vec<NodeId> = std::iter::once(class)
        .chain(parent_chain(forest, class))
        .flat_map(|c| interfaces_of(forest, c))
        .collect();
    pending.reverse();
    while let Some(interface) = pending.pop() {
        if !seen.insert(interface) {
            continue;
        }
        out.push(interface);
        let mut parents = interfaces_of(forest, interface);
        parents.reverse();
        pending.extend(parents);
    }
    out
}

/// The declaration and its parent chain, each followed by its trait closure.
fn class_and_trait_chain(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut order = vec![class];
    order.extend(trait_closure(forest, class));
    for parent in parent_chain(forest, class) {
        order.push(parent);
        order.extend(trait_closure(forest, parent));
    }
    dedup_preserving_order(order)
}

/// Member lookup order: own, traits, parent chain (each with its traits),
/// interfaces.
pub fn lookup_order(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut order = class_and_trait_chain(forest, class);
    order.extend(interface_closure(forest, class));
    dedup_preserving_order(order)
}

/// Property aggregation order: parent chain (farthest first) with their
/// traits, then own traits, then the declaration itself.
pub fn property_order(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    for parent in parent_chain(forest, class).into_iter().rev() {
        order.push(parent);
        order.extend(trait_closure(forest, parent));
    }
    order.extend(trait_closure(forest, class));
    order.push(class);
    dedup_preserving_order(order)
}

fn dedup_preserving_order(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    nodes.into_iter().filter(|n| seen.insert(*n)).collect()
}

// ============================================================================
// Member Lookup
// ============================================================================

/// Method named `name` (case-insensitive), searched in [`lookup_order`].
pub fn find_method(forest: &Forest, class: NodeId, name: &str) -> Option<NodeId> {
    lookup_order(forest, class).into_iter().find_map(|owner| {
        forest
            .members(owner)
            .find(|m| match forest.kind(*m) {
                NodeKind::Method { name: method, .. } => method.eq_ignore_ascii_case(name),
                _ => false,
            })
    })
}

/// Class constant named `name`, searched in [`lookup_order`].
pub fn find_constant(forest: &Forest, class: NodeId, name: &str) -> Option<NodeId> {
    lookup_order(forest, class).into_iter().find_map(|owner| {
        forest
            .members(owner)
            .find(|m| matches!(forest.kind(*m), NodeKind::ClassConstant { name: c } if c == name))
    })
}

/// Property declarations made directly in a declaration: `Property`
/// members plus promoted constructor parameters.
pub fn own_properties(forest: &Forest, class: NodeId) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = forest
        .members(class)
        .filter(|m| matches!(forest.kind(*m), NodeKind::Property { .. }))
        .collect();
    let constructor = forest.members(class).find(|m| {
        matches!(forest.kind(*m), NodeKind::Method { name, .. } if name.eq_ignore_ascii_case("__construct"))
    });
    if let Some(constructor) = constructor {
        out.extend(
            forest
                .parameters(constructor)
                .into_iter()
                .filter(|p| {
                    matches!(forest.kind(*p), NodeKind::Parameter { promoted: Some(_), .. })
                }),
        );
    }
    out
}

/// Own property declarations named `name`.
pub fn own_property_declarations(forest: &Forest, class: NodeId, name: &str) -> Vec<NodeId> {
    own_properties(forest, class)
        .into_iter()
        .filter(|p| forest.kind(*p).name() == Some(name))
        .collect()
}

// ============================================================================
// Supertype Names
// ============================================================================

/// FQNs of the parent chain, including a trailing parent outside the index.
pub fn parent_names(forest: &Forest, class: NodeId) -> Vec<String> {
    std::iter::once(class)
        .chain(parent_chain(forest, class))
        .filter(|c| matches!(forest.kind(*c), NodeKind::Class { .. }))
        .filter_map(|c| {
            forest
                .names_with_role(c, NameRole::Extends)
                .first()
                .and_then(|n| forest.name_of(*n))
                .map(str::to_string)
        })
        .collect()
}

/// FQNs of every implemented interface, including those outside the index.
pub fn interface_names(forest: &Forest, class: NodeId) -> Vec<String> {
    let holders = class_and_trait_chain(forest, class)
        .into_iter()
        .chain(interface_closure(forest, class));
    let names: Vec<String> = holders
        .flat_map(|holder| interface_name_nodes(forest, holder))
        .filter_map(|n| forest.name_of(n).map(str::to_string))
        .collect();
    dedup_names(names)
}

/// FQNs of every used trait, including those outside the index.
pub fn trait_names(forest: &Forest, class: NodeId) -> Vec<String> {
    let names: Vec<String> = class_and_trait_chain(forest, class)
        .into_iter()
        .flat_map(|holder| trait_name_nodes(forest, holder))
        .filter_map(|n| forest.name_of(n).map(str::to_string))
        .collect();
    dedup_names(names)
}

/// Every supertype FQN: parents, interfaces and traits.
pub fn supertype_names(forest: &Forest, class: NodeId) -> Vec<String> {
    let mut names = parent_names(forest, class);
    names.extend(interface_names(forest, class));
    names.extend(trait_names(forest, class));
    dedup_names(names)
}

fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.to_ascii_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::UnitIndex;

    fn index() -> UnitIndex {
        UnitIndex::from_sources(&[
            (
                "src/Base.php",
                "<?php\nnamespace App;\nabstract class Base implements \\Countable { use Stamps; public $stamp; public function boot() {} public const KIND = 'base'; }\n",
            ),
            (
                "src/Stamps.php",
                "<?php\nnamespace App;\ntrait Stamps { use Clock; public $stamps; public function stamp() {} }\n",
            ),
            (
                "src/Clock.php",
                "<?php\nnamespace App;\ntrait Clock { public function now() {} }\n",
            ),
            (
                "src/Handler.php",
                "<?php\nnamespace App;\ninterface Handler extends Runnable { public function handle(); }\n",
            ),
            (
                "src/Runnable.php",
                "<?php\nnamespace App;\ninterface Runnable { public function run(); public const PRIORITY = 1; }\n",
            ),
            (
                "src/Service.php",
                "<?php\nnamespace App;\nclass Service extends Base implements Handler {\n    public $stamp;\n    public function __construct(private Bus $bus) {}\n    public function handle() {}\n    public function BOOT() {}\n}\n",
            ),
        ])
        .unwrap()
    }

    fn node(index: &UnitIndex, fqn: &str) -> NodeId {
        index.get(fqn).unwrap().node
    }

    fn owner_of(index: &UnitIndex, member: NodeId) -> String {
        let forest = index.forest();
        let class = forest.enclosing_class(member).unwrap();
        forest.node(class).resolved_name.clone().unwrap()
    }

    #[test]
    fn parent_chain_and_traits() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        assert_eq!(parent_chain(forest, service), vec![node(&index, "App\\Base")]);
        assert_eq!(
            trait_closure(forest, node(&index, "App\\Base")),
            vec![node(&index, "App\\Stamps"), node(&index, "App\\Clock")]
        );
    }

    #[test]
    fn own_method_shadows_inherited_case_insensitively() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        let boot = find_method(forest, service, "boot").unwrap();
        assert_eq!(owner_of(&index, boot), "App\\Service");
    }

    #[test]
    fn methods_found_through_traits_and_interfaces() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        let now = find_method(forest, service, "now").unwrap();
        assert_eq!(owner_of(&index, now), "App\\Clock");
        let run = find_method(forest, service, "run").unwrap();
        assert_eq!(owner_of(&index, run), "App\\Runnable");
        assert!(find_method(forest, service, "missing").is_none());
    }

    #[test]
    fn constants_follow_lookup_order() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        assert!(find_constant(forest, service, "KIND").is_some());
        assert!(find_constant(forest, service, "PRIORITY").is_some());
        assert!(find_constant(forest, service, "kind").is_none());
    }

    #[test]
    fn property_declarations_run_parent_first() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        let declarations = |name: &str| -> Vec<NodeId> {
            property_order(forest, service)
                .into_iter()
                .flat_map(|owner| own_property_declarations(forest, owner, name))
                .collect()
        };
        let owners: Vec<String> = declarations("stamp")
            .iter()
            .map(|p| owner_of(&index, *p))
            .collect();
        assert_eq!(owners, vec!["App\\Base", "App\\Service"]);
        assert_eq!(declarations("stamps").len(), 1);
        assert_eq!(own_property_declarations(forest, service, "bus").len(), 1);
    }

    #[test]
    fn supertype_names_include_external_interfaces() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        assert_eq!(parent_names(forest, service), vec!["App\\Base"]);
        let interfaces = interface_names(forest, service);
        assert!(interfaces.contains(&"App\\Handler".to_string()));
        assert!(interfaces.contains(&"App\\Runnable".to_string()));
        assert!(interfaces.contains(&"Countable".to_string()));
        assert_eq!(trait_names(forest, service), vec!["App\\Stamps", "App\\Clock"]);
    }

    #[test]
    fn traits_of_inherited_traits_are_supertypes() {
        let index = index();
        let forest = index.forest();
        let service = node(&index, "App\\Service");
        let names = supertype_names(forest, service);
        assert!(names.contains(&"App\\Clock".to_string()));
        assert_eq!(
            lookup_order(forest, service)[..4],
            [
                service,
                node(&index, "App\\Base"),
                node(&index, "App\\Stamps"),
                node(&index, "App\\Clock")
            ]
        );
    }
}
