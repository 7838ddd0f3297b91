//! Type resolution engine.
//!
//! [`TypeResolver::resolve`] computes the set of possible types of any node
//! in the index forest. Resolution is lazy and memoized per node: the first
//! request runs the strategy for the node's kind, later requests hit the
//! memo table.
//!
//! # Re-entry
//!
//! An explicit stack records the nodes being resolved. Asking for a node
//! already on the stack is a cycle:
//!
//! - property fetches, property declarations and parameters contribute
//!   nothing on re-entry (their other sources still count);
//! - every other kind fails with [`ResolveError::Circular`], listing the
//!   cycle as `Kind(name)` entries.
//!
//! A depth guard bounds the stack ([`ResolverOptions::max_depth`]).
//!
//! # Buffers
//!
//! Variables are typed by sweeping their scope once, in evaluation order,
//! into a [`buffers::VariableBuffer`]; every read is memoized with the state
//! of the buffer at that point. A read that reaches a scope whose sweep is
//! still running, ahead of the sweep, is answered from the buffer but left
//! out of the memo, together with every frame above the sweep.
//!
//! Properties are typed in two phases: the methods of a class are scanned
//! for writes into a [`buffers::PropertyBuffer`], then the writes are
//! injected into the matching declarations.

pub mod buffers;
mod properties;
mod strategies;
mod variables;

use std::collections::{HashMap, HashSet};

use eventlens_core::types::{is_native_type, NodeId, Type, TypeCollection};
use eventlens_php_ast::{DocType, Forest, NodeKind};
use thiserror::Error;

use crate::index::UnitIndex;
use buffers::{PropertyBuffer, PropertySite, ScopeStack};

/// Default bound on nested resolution frames.
pub const DEFAULT_MAX_DEPTH: usize = 512;

// ============================================================================
// Errors and Options
// ============================================================================

/// Hard resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A node's type depends on itself.
    #[error("circular reference: {}", .chain.join(" -> "))]
    Circular { chain: Vec<String> },

    /// Resolution nested deeper than the configured limit.
    #[error("resolution depth limit {limit} exceeded at {node}")]
    DepthExceeded { limit: usize, node: String },
}

/// Resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Maximum number of nested resolution frames.
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ResolverOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Memoizing type resolver over one unit index.
pub struct TypeResolver<'a> {
    index: &'a UnitIndex,
    options: ResolverOptions,
    memo: HashMap<NodeId, TypeCollection>,
    /// Nodes being resolved, outermost first.
    stack: Vec<NodeId>,
    in_progress: HashSet<NodeId>,
    /// Variable buffers of the scopes being swept.
    scopes: ScopeStack,
    /// Frames at or above this stack depth read a variable ahead of its
    /// sweep; their results are returned but not memoized.
    unsettled_from: Option<usize>,
    swept: HashSet<NodeId>,
    /// Class-likes whose property writes have been collected.
    collected: HashSet<NodeId>,
    /// Writes injected into property declarations (and promoted parameters).
    injected: HashMap<NodeId, Vec<PropertySite>>,
    /// Writes to properties a class-like never declares.
    dynamic: HashMap<NodeId, PropertyBuffer>,
}

impl<'a> TypeResolver<'a> {
    /// Create a resolver with default options.
    pub fn new(index: &'a UnitIndex) -> Self {
        Self::with_options(index, ResolverOptions::default())
    }

    pub fn with_options(index: &'a UnitIndex, options: ResolverOptions) -> Self {
        TypeResolver {
            index,
            options,
            memo: HashMap::new(),
            stack: Vec::new(),
            in_progress: HashSet::new(),
            scopes: ScopeStack::new(),
            unsettled_from: None,
            swept: HashSet::new(),
            collected: HashSet::new(),
            injected: HashMap::new(),
            dynamic: HashMap::new(),
        }
    }

    /// The index this resolver reads.
    pub fn index(&self) -> &'a UnitIndex {
        self.index
    }

    /// The index forest.
    pub fn forest(&self) -> &'a Forest {
        self.index.forest()
    }

    /// Number of memoized nodes.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Returns true while `node` is on the resolution stack.
    pub fn is_resolving(&self, node: NodeId) -> bool {
        self.in_progress.contains(&node)
    }

    /// Resolve the possible types of `node`.
    ///
    /// Never returns an empty collection: a strategy that finds nothing
    /// yields `Unknown(kind)`.
    pub fn resolve(&mut self, node: NodeId) -> Result<TypeCollection, ResolveError> {
        if let Some(types) = self.memo.get(&node) {
            return Ok(types.clone());
        }
        let kind = self.forest().kind(node);
        if self.in_progress.contains(&node) {
            if contributes_nothing_on_reentry(kind) {
                tracing::trace!(node = %kind, "re-entered, contributing nothing");
                return Ok(TypeCollection::new());
            }
            let chain = self.cycle_chain(node);
            tracing::debug!(chain = %chain.join(" -> "), "circular reference");
            return Err(ResolveError::Circular { chain });
        }
        if self.stack.len() >= self.options.max_depth {
            return Err(ResolveError::DepthExceeded {
                limit: self.options.max_depth,
                node: kind.to_string(),
            });
        }

        self.stack.push(node);
        self.in_progress.insert(node);
        let result = self.dispatch(node);
        self.stack.pop();
        self.in_progress.remove(&node);
        let settled = self.settle(self.stack.len());

        let mut types = result?;
        if types.is_empty() {
            types = TypeCollection::unknown(kind.tag());
        }
        if settled {
            self.memo.insert(node, types.clone());
        } else {
            tracing::trace!(node = %kind, "partial result left unmemoized");
        }
        Ok(types)
    }

    /// Mark the frames from `depth` up as depending on a partial sweep.
    fn unsettle_from(&mut self, depth: usize) {
        let depth = self.unsettled_from.map_or(depth, |from| from.min(depth));
        self.unsettled_from = Some(depth);
    }

    /// Whether the frame that just left stack position `depth` may be
    /// memoized. The mark is cleared once its lowest frame returns.
    fn settle(&mut self, depth: usize) -> bool {
        match self.unsettled_from {
            Some(from) if depth >= from => {
                if depth == from {
                    self.unsettled_from = None;
                }
                false
            }
            _ => true,
        }
    }

    /// Resolve `node` unless it is on the stack.
    fn resolve_unless_resolving(&mut self, node: NodeId) -> Result<TypeCollection, ResolveError> {
        if self.is_resolving(node) {
            return Ok(TypeCollection::new());
        }
        self.resolve(node)
    }

    /// Union of the resolutions of `nodes`.
    fn resolve_all(&mut self, nodes: &[NodeId]) -> Result<TypeCollection, ResolveError> {
        let mut types = TypeCollection::new();
        for node in nodes {
            types.extend(&self.resolve(*node)?);
        }
        Ok(types)
    }

    fn cycle_chain(&self, node: NodeId) -> Vec<String> {
        let forest = self.forest();
        let start = self.stack.iter().position(|n| *n == node).unwrap_or(0);
        self.stack[start..]
            .iter()
            .chain(std::iter::once(&node))
            .map(|n| forest.kind(*n).to_string())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------------

    /// Declaration node of a class-like type, if indexed.
    fn class_node(&self, ty: &Type) -> Option<NodeId> {
        if ty.is_unknown() || ty.is_native() {
            return None;
        }
        let forest = self.forest();
        ty.declaration()
            .filter(|d| forest.kind(*d).is_class_like())
            .or_else(|| self.index.declaration(ty.base_name()))
    }

    /// The enclosing class-like of `node` as a declared type.
    fn enclosing_class_type(&self, node: NodeId) -> Option<Type> {
        let forest = self.forest();
        let class = if forest.kind(node).is_class_like() {
            node
        } else {
            forest.enclosing_class(node)?
        };
        let fqn = forest.node(class).resolved_name.as_deref()?;
        Some(Type::declared(fqn, class))
    }

    /// Lower a doc-comment type written at `context`.
    fn lower_doc(&self, context: NodeId, doc: &DocType) -> TypeCollection {
        let forest = self.forest();
        let index = self.index;
        let scope = forest.name_scope_for(context);
        let class = self.enclosing_class_type(context);
        let mut resolve_name = |name: &str| -> Type {
            let bare = name.trim_start_matches('\\');
            match bare.to_ascii_lowercase().as_str() {
                "self" | "static" | "$this" => {
                    return class.clone().unwrap_or_else(|| Type::named(bare));
                }
                _ => {}
            }
            if is_native_type(bare) {
                return Type::named(bare);
            }
            let fqn = match scope {
                Some(scope) => scope.resolve_class(name),
                None => bare.to_string(),
            };
            match index.declaration(&fqn) {
                Some(decl) => Type::declared(&fqn, decl),
                None => Type::named(&fqn),
            }
        };
        doc.lower(&mut resolve_name)
    }
}

/// Kinds whose re-entry is cut silently instead of reported as a cycle.
fn contributes_nothing_on_reentry(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::PropertyFetch { .. }
            | NodeKind::StaticPropertyFetch { .. }
            | NodeKind::Property { .. }
            | NodeKind::Parameter { .. }
    )
}
