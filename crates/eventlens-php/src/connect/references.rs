//! Reference-injection passes.
//!
//! Each pass handles one site shape and writes the declaration node of the
//! referenced unit into `declaration`. Names whose FQN is not indexed stay
//! unlinked and later resolve to an opaque type.

use eventlens_core::types::NodeId;
use eventlens_php_ast::{Forest, NameRole, NodeKind};

/// Counts of links written by [`inject_references`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceStats {
    /// `X::f()`, `X::C` and `X::$p` scopes.
    pub static_targets: usize,
    /// `new X`.
    pub instantiations: usize,
    /// Type hints, `extends`, `implements`, trait uses and `instanceof`.
    pub type_hints: usize,
    /// `$this`, `self` and `static`.
    pub self_targets: usize,
    /// Class-like names whose FQN is not indexed.
    pub unresolved: usize,
}

/// Link reference sites to declarations.
///
/// `lookup` maps a fully-qualified class-like name to its declaration node.
pub fn inject_references<F>(forest: &mut Forest, lookup: &F) -> ReferenceStats
where
    F: Fn(&str) -> Option<NodeId>,
{
    let mut stats = ReferenceStats::default();
    link_static_targets(forest, lookup, &mut stats);
    link_instantiations(forest, lookup, &mut stats);
    link_type_hints(forest, lookup, &mut stats);
    link_self_targets(forest, &mut stats);
    tracing::debug!(
        static_targets = stats.static_targets,
        instantiations = stats.instantiations,
        type_hints = stats.type_hints,
        self_targets = stats.self_targets,
        unresolved = stats.unresolved,
        "injected references"
    );
    stats
}

fn link_static_targets<F>(forest: &mut Forest, lookup: &F, stats: &mut ReferenceStats)
where
    F: Fn(&str) -> Option<NodeId>,
{
    let sites: Vec<(NodeId, NodeId)> = forest
        .ids()
        .filter(|id| {
            matches!(
                forest.kind(*id),
                NodeKind::StaticCall { .. }
                    | NodeKind::ClassConstantFetch { .. }
                    | NodeKind::StaticPropertyFetch { .. }
            )
        })
        .filter_map(|site| class_name_child(forest, site).map(|name| (site, name)))
        .collect();
    for (site, name) in sites {
        match link(forest, name, Some(site), lookup) {
            true => stats.static_targets += 1,
            false => stats.unresolved += 1,
        }
    }
}

fn link_instantiations<F>(forest: &mut Forest, lookup: &F, stats: &mut ReferenceStats)
where
    F: Fn(&str) -> Option<NodeId>,
{
    let sites: Vec<(NodeId, NodeId)> = forest
        .ids()
        .filter(|id| matches!(forest.kind(*id), NodeKind::New))
        .filter_map(|site| class_name_child(forest, site).map(|name| (site, name)))
        .collect();
    for (site, name) in sites {
        match link(forest, name, Some(site), lookup) {
            true => stats.instantiations += 1,
            false => stats.unresolved += 1,
        }
    }
}

fn link_type_hints<F>(forest: &mut Forest, lookup: &F, stats: &mut ReferenceStats)
where
    F: Fn(&str) -> Option<NodeId>,
{
    let names: Vec<NodeId> = forest
        .ids()
        .filter(|id| match forest.kind(*id) {
            NodeKind::Name { role, .. } => match role {
                NameRole::TypeHint
                | NameRole::Extends
                | NameRole::Implements
                | NameRole::TraitUse => true,
                NameRole::Class => forest
                    .parent(*id)
                    .is_some_and(|p| matches!(forest.kind(p), NodeKind::Instanceof)),
                NameRole::Function | NameRole::Constant => false,
            },
            _ => false,
        })
        .filter(|id| forest.name_of(*id).is_some_and(|fqn| !is_native(fqn)))
        .collect();
    for name in names {
        match link(forest, name, None, lookup) {
            true => stats.type_hints += 1,
            false => stats.unresolved += 1,
        }
    }
}

fn link_self_targets(forest: &mut Forest, stats: &mut ReferenceStats) {
    let sites: Vec<(NodeId, NodeId)> = forest
        .ids()
        .filter(|id| match forest.kind(*id) {
            NodeKind::Variable { name } => name == "this",
            NodeKind::Name { text, role } if role.is_class_like() => {
                text.eq_ignore_ascii_case("self") || text.eq_ignore_ascii_case("static")
            }
            _ => false,
        })
        .filter_map(|id| forest.enclosing_class(id).map(|class| (id, class)))
        .collect();
    for (site, class) in sites {
        forest.node_mut(site).declaration = Some(class);
        stats.self_targets += 1;
    }
}

/// Class `Name` in scope position of a static access or instantiation.
fn class_name_child(forest: &Forest, site: NodeId) -> Option<NodeId> {
    forest
        .first_child(site)
        .filter(|c| matches!(forest.kind(*c), NodeKind::Name { role: NameRole::Class, .. }))
}

fn link<F>(forest: &mut Forest, name: NodeId, site: Option<NodeId>, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<NodeId>,
{
    let Some(target) = forest.name_of(name).and_then(lookup) else {
        return false;
    };
    forest.node_mut(name).declaration = Some(target);
    if let Some(site) = site {
        forest.node_mut(site).declaration = Some(target);
    }
    true
}

fn is_native(fqn: &str) -> bool {
    eventlens_core::types::is_native_type(fqn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::connect_syntax;
    use eventlens_php_ast::parse_source;
    use std::collections::HashMap;

    fn connected(source: &str) -> (Forest, HashMap<String, NodeId>) {
        let mut forest = parse_source("src/Test.php", source).unwrap();
        connect_syntax(&mut forest).unwrap();
        let declarations = forest
            .ids()
            .filter(|id| forest.kind(*id).is_class_like())
            .filter_map(|id| forest.node(id).resolved_name.clone().map(|fqn| (fqn, id)))
            .collect();
        (forest, declarations)
    }

    fn inject(forest: &mut Forest, declarations: &HashMap<String, NodeId>) -> ReferenceStats {
        inject_references(forest, &|fqn: &str| declarations.get(fqn).copied())
    }

    fn sites_of(forest: &Forest, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        forest.ids().filter(|id| pred(forest.kind(*id))).collect()
    }

    const SOURCE: &str = r#"<?php
namespace App;

interface Handler {}
trait Loggable {}

class Event
{
    public const NAME = 'event';
}

class Service implements Handler
{
    use Loggable;

    public function run(Event $event): Event
    {
        $name = Event::NAME;
        $copy = new Event();
        $missing = new Missing();
        if ($event instanceof Event) {
            return self::build($this);
        }
        return $copy;
    }
}
"#;

    #[test]
    fn instantiation_and_static_sites_link_to_declaration() {
        let (mut forest, declarations) = connected(SOURCE);
        let stats = inject(&mut forest, &declarations);
        let event = declarations["App\\Event"];

        let news = sites_of(&forest, |k| matches!(k, NodeKind::New));
        assert_eq!(forest.node(news[0]).declaration, Some(event));
        assert_eq!(forest.node(news[1]).declaration, None);

        let fetch = sites_of(&forest, |k| matches!(k, NodeKind::ClassConstantFetch { .. }));
        assert_eq!(forest.node(fetch[0]).declaration, Some(event));

        assert_eq!(stats.instantiations, 1);
        assert!(stats.unresolved >= 1);
    }

    #[test]
    fn type_hints_and_hierarchy_names_link() {
        let (mut forest, declarations) = connected(SOURCE);
        inject(&mut forest, &declarations);

        let implements = sites_of(&forest, |k| {
            matches!(k, NodeKind::Name { role: NameRole::Implements, .. })
        });
        assert_eq!(
            forest.node(implements[0]).declaration,
            Some(declarations["App\\Handler"])
        );
        let trait_use = sites_of(&forest, |k| {
            matches!(k, NodeKind::Name { role: NameRole::TraitUse, .. })
        });
        assert_eq!(
            forest.node(trait_use[0]).declaration,
            Some(declarations["App\\Loggable"])
        );
        let hints = sites_of(&forest, |k| {
            matches!(k, NodeKind::Name { role: NameRole::TypeHint, text } if text == "Event")
        });
        assert_eq!(hints.len(), 2);
        assert!(hints
            .iter()
            .all(|h| forest.node(*h).declaration == Some(declarations["App\\Event"])));
    }

    #[test]
    fn this_and_self_link_to_enclosing_class() {
        let (mut forest, declarations) = connected(SOURCE);
        let stats = inject(&mut forest, &declarations);
        let service = declarations["App\\Service"];

        let this = sites_of(&forest, |k| matches!(k, NodeKind::Variable { name } if name == "this"));
        assert_eq!(forest.node(this[0]).declaration, Some(service));
        let selfs = sites_of(&forest, |k| matches!(k, NodeKind::Name { text, .. } if text == "self"));
        assert_eq!(forest.node(selfs[0]).declaration, Some(service));
        assert_eq!(stats.self_targets, 2);
    }
}
