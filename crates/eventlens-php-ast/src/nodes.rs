// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Arena AST for PHP sources.
//!
//! Every parsed file lives in one [`Forest`]: a flat vector of [`Node`]s
//! addressed by [`NodeId`]. Parent links, resolved names and declaration links
//! are plain fields filled by later passes; nothing in the arena owns another
//! node through a pointer.
//!
//! # Child Layout
//!
//! [`NodeKind`] is a closed set. The children of each kind follow a fixed
//! layout that the accessor helpers on [`Forest`] rely on:
//!
//! | Kind | Children |
//! |------|----------|
//! | `Class` | doc?, `Name(Extends)`?, `Name(Implements)`*, members |
//! | `Interface` | doc?, `Name(Extends)`*, members |
//! | `Trait` | doc?, members |
//! | `Method`, `Function` | doc?, `Parameter`*, return type?, `Block`? |
//! | `Closure` | `Parameter`*, `Variable`* (use clause), return type?, `Block` |
//! | `ArrowFunction` | `Parameter`*, return type?, body expression |
//! | `Property`, `Parameter`, `ClassConstant` | doc?, type?, default/value? |
//! | `Foreach` | source, key? (see `has_key`), value target, body |
//! | `Catch` | `Name(TypeHint)`*, `Variable`?, `Block` |
//! | `New` | class (`Name` or expression), `Argument`* |
//! | `MethodCall`, `StaticCall`, `FunctionCall` | receiver/scope/callee, `Argument`* |
//! | `Ternary` | condition, then (absent when `short`), else |
//! | `MatchArm` | conditions*, result (last) |
//!
//! Type hints are `Name` nodes with [`NameRole::TypeHint`] or one of
//! `NullableType`, `UnionType`, `IntersectionType`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use eventlens_core::types::{native_type_name, NodeId, Span};
use eventlens_core::workspace::ContentHash;
use serde::{Deserialize, Serialize};

// ============================================================================
// Modifiers
// ============================================================================

/// Member visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

/// Declaration modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_readonly: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Modifiers {
    /// Public, non-static modifiers.
    pub fn public() -> Self {
        Self::default()
    }

    /// Returns true for public members.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

// ============================================================================
// Node Kinds
// ============================================================================

/// What a `Name` node refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameRole {
    /// Class reference in expression position (`new X`, `X::f()`, `instanceof X`).
    Class,
    /// Declared type of a parameter, property, constant or return value.
    TypeHint,
    /// Parent class (or parent interface).
    Extends,
    /// Implemented interface.
    Implements,
    /// Trait named by a `use` inside a class body.
    TraitUse,
    /// Called function name.
    Function,
    /// Global constant reference.
    Constant,
}

impl NameRole {
    /// Returns true if the name denotes a class-like symbol.
    pub fn is_class_like(&self) -> bool {
        !matches!(self, NameRole::Function | NameRole::Constant)
    }
}

/// Kind of a `use` import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseKind {
    Class,
    Function,
    Constant,
}

/// Kind of a scalar literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    Int,
    Float,
    String,
    Bool,
    Null,
}

impl LiteralKind {
    /// Native type name of the literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralKind::Int => "int",
            LiteralKind::Float => "float",
            LiteralKind::String => "string",
            LiteralKind::Bool => "bool",
            LiteralKind::Null => "null",
        }
    }
}

/// Closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    // Structure
    File,
    Namespace { name: String },
    Use { kind: UseKind, name: String, alias: String },
    Block,
    Return,
    ExpressionStatement,
    Foreach { has_key: bool },
    Catch,
    StaticVariable { name: String },
    DocComment { text: String },
    ControlFlow { ts_kind: String },

    // Declarations
    Class { name: String, modifiers: Modifiers },
    Interface { name: String },
    Trait { name: String },
    TraitUse,
    Method { name: String, modifiers: Modifiers },
    Function { name: String },
    Property { name: String, modifiers: Modifiers },
    Parameter {
        name: String,
        variadic: bool,
        by_ref: bool,
        promoted: Option<Modifiers>,
    },
    ClassConstant { name: String },

    // Type hints
    NullableType,
    UnionType,
    IntersectionType,

    // Expressions
    Name { text: String, role: NameRole },
    Variable { name: String },
    Assign { by_ref: bool },
    CompoundAssign { op: String },
    New,
    MethodCall { name: String, nullsafe: bool },
    StaticCall { name: String },
    FunctionCall,
    Argument { name: Option<String>, unpack: bool },
    PropertyFetch { name: String, nullsafe: bool },
    StaticPropertyFetch { name: String },
    ClassConstantFetch { name: String },
    Ternary { short: bool },
    Coalesce,
    Binary { op: String },
    Unary { op: String },
    Cast { target: String },
    Literal { kind: LiteralKind },
    ArrayLiteral,
    ArrayAccess,
    Clone,
    Match,
    MatchArm { default: bool },
    Closure { is_static: bool },
    ArrowFunction,
    Instanceof,
    ListDestructure,

    /// Parser kind without meaning to the analysis.
    Other { ts_kind: String },
}

impl NodeKind {
    /// Short tag used for diagnostics and unknown-type origins.
    pub fn tag(&self) -> &str {
        match self {
            NodeKind::File => "File",
            NodeKind::Namespace { .. } => "Namespace",
            NodeKind::Use { .. } => "Use",
            NodeKind::Block => "Block",
            NodeKind::Return => "Return",
            NodeKind::ExpressionStatement => "ExpressionStatement",
            NodeKind::Foreach { .. } => "Foreach",
            NodeKind::Catch => "Catch",
            NodeKind::StaticVariable { .. } => "StaticVariable",
            NodeKind::DocComment { .. } => "DocComment",
            NodeKind::ControlFlow { .. } => "ControlFlow",
            NodeKind::Class { .. } => "Class",
            NodeKind::Interface { .. } => "Interface",
            NodeKind::Trait { .. } => "Trait",
            NodeKind::TraitUse => "TraitUse",
            NodeKind::Method { .. } => "Method",
            NodeKind::Function { .. } => "Function",
            NodeKind::Property { .. } => "Property",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::ClassConstant { .. } => "ClassConstant",
            NodeKind::NullableType => "NullableType",
            NodeKind::UnionType => "UnionType",
            NodeKind::IntersectionType => "IntersectionType",
            NodeKind::Name { .. } => "Name",
            NodeKind::Variable { .. } => "Variable",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::CompoundAssign { .. } => "CompoundAssign",
            NodeKind::New => "New",
            NodeKind::MethodCall { .. } => "MethodCall",
            NodeKind::StaticCall { .. } => "StaticCall",
            NodeKind::FunctionCall => "FunctionCall",
            NodeKind::Argument { .. } => "Argument",
            NodeKind::PropertyFetch { .. } => "PropertyFetch",
            NodeKind::StaticPropertyFetch { .. } => "StaticPropertyFetch",
            NodeKind::ClassConstantFetch { .. } => "ClassConstantFetch",
            NodeKind::Ternary { .. } => "Ternary",
            NodeKind::Coalesce => "Coalesce",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Cast { .. } => "Cast",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::ArrayLiteral => "ArrayLiteral",
            NodeKind::ArrayAccess => "ArrayAccess",
            NodeKind::Clone => "Clone",
            NodeKind::Match => "Match",
            NodeKind::MatchArm { .. } => "MatchArm",
            NodeKind::Closure { .. } => "Closure",
            NodeKind::ArrowFunction => "ArrowFunction",
            NodeKind::Instanceof => "Instanceof",
            NodeKind::ListDestructure => "ListDestructure",
            NodeKind::Other { ts_kind } => ts_kind,
        }
    }

    /// Declared name carried by the kind, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Namespace { name }
            | NodeKind::Class { name, .. }
            | NodeKind::Interface { name }
            | NodeKind::Trait { name }
            | NodeKind::Method { name, .. }
            | NodeKind::Function { name }
            | NodeKind::Property { name, .. }
            | NodeKind::Parameter { name, .. }
            | NodeKind::ClassConstant { name }
            | NodeKind::StaticVariable { name }
            | NodeKind::Variable { name }
            | NodeKind::MethodCall { name, .. }
            | NodeKind::StaticCall { name }
            | NodeKind::PropertyFetch { name, .. }
            | NodeKind::StaticPropertyFetch { name }
            | NodeKind::ClassConstantFetch { name } => Some(name),
            NodeKind::Name { text, .. } => Some(text),
            NodeKind::Use { alias, .. } => Some(alias),
            _ => None,
        }
    }

    /// Class, interface or trait declaration.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            NodeKind::Class { .. } | NodeKind::Interface { .. } | NodeKind::Trait { .. }
        )
    }

    /// Method, function, closure or arrow function.
    pub fn is_function_like(&self) -> bool {
        matches!(
            self,
            NodeKind::Method { .. }
                | NodeKind::Function { .. }
                | NodeKind::Closure { .. }
                | NodeKind::ArrowFunction
        )
    }

    /// Declared type hint node.
    pub fn is_type_hint(&self) -> bool {
        matches!(
            self,
            NodeKind::Name {
                role: NameRole::TypeHint,
                ..
            } | NodeKind::NullableType
                | NodeKind::UnionType
                | NodeKind::IntersectionType
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", self.tag(), name),
            None => write!(f, "{}", self.tag()),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// One node of the arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    /// Set by the parent-link pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Fully-qualified name, set by the name-resolution pass on `Name` nodes
    /// and on class-like and function declarations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_name: Option<String>,
    /// Declaration this node references, set by the reference-injection passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<NodeId>,
}

impl Node {
    /// Create an unlinked node.
    pub fn new(kind: NodeKind, span: Span, children: Vec<NodeId>) -> Self {
        Node {
            kind,
            span,
            children,
            parent: None,
            resolved_name: None,
            declaration: None,
        }
    }
}

// ============================================================================
// Source Files and Name Scopes
// ============================================================================

/// A parsed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the analyzed root (forward slashes).
    pub path: String,
    /// SHA-256 of the file bytes.
    pub content_hash: ContentHash,
    /// The `File` node.
    pub root: NodeId,
}

/// Namespace and import table in effect for a `File` or `Namespace` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameScope {
    /// Node that opens this scope.
    pub node: NodeId,
    /// Current namespace (`""` for the global namespace).
    pub namespace: String,
    /// Class imports: lowercase alias -> FQN.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
    /// Function imports: lowercase alias -> FQN.
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
    /// Constant imports: alias -> FQN.
    #[serde(default)]
    pub constants: BTreeMap<String, String>,
}

impl NameScope {
    /// Create an empty scope for a namespace.
    pub fn new(node: NodeId, namespace: impl Into<String>) -> Self {
        NameScope {
            node,
            namespace: namespace.into().trim_matches('\\').to_string(),
            ..Default::default()
        }
    }

    /// Register a `use` import.
    pub fn add_use(&mut self, kind: UseKind, name: &str, alias: &str) {
        let fqn = name.trim_start_matches('\\').to_string();
        match kind {
            UseKind::Class => {
                self.classes.insert(alias.to_ascii_lowercase(), fqn);
            }
            UseKind::Function => {
                self.functions.insert(alias.to_ascii_lowercase(), fqn);
            }
            UseKind::Constant => {
                self.constants.insert(alias.to_string(), fqn);
            }
        }
    }

    /// Resolve a class-like name to its FQN.
    ///
    /// Fully-qualified names lose their leading separator, native names map to
    /// their canonical spelling, imported aliases are expanded and everything
    /// else is assumed to live in the current namespace. `self`, `static` and
    /// `parent` are not handled here.
    pub fn resolve_class(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            return String::new();
        }
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_string();
        }
        if let Some(native) = native_type_name(name) {
            return native.to_string();
        }
        if let Some(rest) = strip_namespace_keyword(name) {
            return self.qualify(rest);
        }
        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        match (self.classes.get(&first.to_ascii_lowercase()), rest) {
            (Some(target), Some(rest)) => format!("{}\\{}", target, rest),
            (Some(target), None) => target.clone(),
            (None, _) => self.qualify(name),
        }
    }

    /// Resolve a function name to its FQN.
    pub fn resolve_function(&self, name: &str) -> String {
        let name = name.trim();
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_string();
        }
        if !name.contains('\\') {
            if let Some(target) = self.functions.get(&name.to_ascii_lowercase()) {
                return target.clone();
            }
        }
        self.qualify(name)
    }

    /// Resolve a constant name to its FQN.
    pub fn resolve_constant(&self, name: &str) -> String {
        let name = name.trim();
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_string();
        }
        if let Some(target) = self.constants.get(name) {
            return target.clone();
        }
        if matches!(name.to_ascii_lowercase().as_str(), "true" | "false" | "null") {
            return name.to_ascii_lowercase();
        }
        self.qualify(name)
    }

    /// Qualify a declared name with the current namespace.
    pub fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.namespace, name)
        }
    }
}

fn strip_namespace_keyword(name: &str) -> Option<&str> {
    let prefix = "namespace\\";
    if name.len() > prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

// ============================================================================
// Forest
// ============================================================================

/// Arena holding the nodes of every parsed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Forest {
    nodes: Vec<Node>,
    files: Vec<SourceFile>,
    name_scopes: Vec<NameScope>,
    /// Map from file root to index in `files`.
    #[serde(skip)]
    root_to_file: HashMap<NodeId, usize>,
    /// Map from scope node to index in `name_scopes`.
    #[serde(skip)]
    scope_index: HashMap<NodeId, usize>,
}

impl Forest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild lookup tables after deserialization.
    pub fn restore_indexes(&mut self) {
        self.root_to_file = self
            .files
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.root, idx))
            .collect();
        self.scope_index = self
            .name_scopes
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.node, idx))
            .collect();
    }

    /// Append a node and return its handle.
    pub fn push(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, span, children));
        id
    }

    /// Register a parsed file whose `File` node is `root`.
    pub fn add_file(&mut self, path: impl Into<String>, content_hash: ContentHash, root: NodeId) {
        self.root_to_file.insert(root, self.files.len());
        self.files.push(SourceFile {
            path: path.into(),
            content_hash,
            root,
        });
    }

    /// Move every node and file of `other` into this forest.
    ///
    /// Handles of `other` are shifted by the current node count; name scopes
    /// are carried over.
    pub fn absorb(&mut self, other: Forest) {
        let offset = self.nodes.len() as u32;
        let shift = |id: NodeId| NodeId::new(id.0 + offset);
        for mut node in other.nodes {
            node.children = node.children.into_iter().map(shift).collect();
            node.parent = node.parent.map(shift);
            node.declaration = node.declaration.map(shift);
            self.nodes.push(node);
        }
        for file in other.files {
            self.add_file(file.path, file.content_hash, shift(file.root));
        }
        for mut scope in other.name_scopes {
            scope.node = shift(scope.node);
            self.set_name_scope(scope);
        }
    }

    /// Node by handle.
    ///
    /// Handles are only minted by this forest, so an out-of-range handle is a
    /// caller bug and panics.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutable node by handle.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Node by handle, if it exists.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Kind of a node.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Children of a node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Parent of a node (after the parent-link pass).
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the forest holds no node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node handles in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId::new)
    }

    /// Parsed files in insertion order.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// File whose root is `root`.
    pub fn file_by_root(&self, root: NodeId) -> Option<&SourceFile> {
        self.root_to_file.get(&root).map(|idx| &self.files[*idx])
    }

    /// File containing `id` (after the parent-link pass).
    pub fn file_of(&self, id: NodeId) -> Option<&SourceFile> {
        let root = self.ancestors_inclusive(id).last()?;
        self.file_by_root(root)
    }

    // ------------------------------------------------------------------------
    // Name scopes
    // ------------------------------------------------------------------------

    /// Record (or replace) the name scope opened by a node.
    pub fn set_name_scope(&mut self, scope: NameScope) {
        match self.scope_index.get(&scope.node) {
            Some(idx) => self.name_scopes[*idx] = scope,
            None => {
                self.scope_index.insert(scope.node, self.name_scopes.len());
                self.name_scopes.push(scope);
            }
        }
    }

    /// Name scope opened by exactly this node.
    pub fn name_scope(&self, node: NodeId) -> Option<&NameScope> {
        self.scope_index.get(&node).map(|idx| &self.name_scopes[*idx])
    }

    /// Innermost name scope enclosing `id`.
    pub fn name_scope_for(&self, id: NodeId) -> Option<&NameScope> {
        self.ancestors_inclusive(id)
            .find_map(|ancestor| self.name_scope(ancestor))
    }

    // ------------------------------------------------------------------------
    // Upward walks
    // ------------------------------------------------------------------------

    /// Ancestors of `id`, nearest first, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            next: self.parent(id),
        }
    }

    /// `id` followed by its ancestors.
    pub fn ancestors_inclusive(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            next: Some(id),
        }
    }

    /// Nearest ancestor (excluding `id`) satisfying `pred`.
    pub fn enclosing(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.ancestors(id).find(|a| pred(self.kind(*a)))
    }

    /// Nearest enclosing class, interface or trait.
    pub fn enclosing_class(&self, id: NodeId) -> Option<NodeId> {
        self.enclosing(id, NodeKind::is_class_like)
    }

    /// Nearest enclosing method, function, closure or arrow function.
    pub fn enclosing_function_like(&self, id: NodeId) -> Option<NodeId> {
        self.enclosing(id, NodeKind::is_function_like)
    }

    /// Nearest enclosing scope that owns its own variables.
    ///
    /// Arrow functions share the variables of their parent scope, so they are
    /// skipped; the file itself is the scope of top-level code.
    pub fn variable_scope(&self, id: NodeId) -> Option<NodeId> {
        self.enclosing(id, |kind| {
            matches!(
                kind,
                NodeKind::Method { .. }
                    | NodeKind::Function { .. }
                    | NodeKind::Closure { .. }
                    | NodeKind::File
            )
        })
    }

    // ------------------------------------------------------------------------
    // Child accessors
    // ------------------------------------------------------------------------

    /// Children of `id` satisfying `pred`.
    pub fn children_where<'a>(
        &'a self,
        id: NodeId,
        pred: impl Fn(&NodeKind) -> bool + 'a,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| pred(self.kind(*c)))
    }

    /// Attached documentation comment text.
    pub fn doc_comment(&self, id: NodeId) -> Option<&str> {
        self.children(id).iter().find_map(|c| match self.kind(*c) {
            NodeKind::DocComment { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Declared type hint (return type for function-likes).
    pub fn type_hint(&self, id: NodeId) -> Option<NodeId> {
        self.children_where(id, NodeKind::is_type_hint).next()
    }

    /// Default value (parameters, properties) or value (class constants).
    pub fn default_value(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|c| {
            let kind = self.kind(*c);
            !kind.is_type_hint() && !matches!(kind, NodeKind::DocComment { .. })
        })
    }

    /// Parameters of a function-like node.
    pub fn parameters(&self, id: NodeId) -> Vec<NodeId> {
        self.children_where(id, |k| matches!(k, NodeKind::Parameter { .. }))
            .collect()
    }

    /// Body of a function-like node: the `Block`, or the expression of an
    /// arrow function.
    pub fn body(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::ArrowFunction => self.children(id).iter().rev().copied().find(|c| {
                let kind = self.kind(*c);
                !kind.is_type_hint() && !matches!(kind, NodeKind::Parameter { .. })
            }),
            _ => self
                .children_where(id, |k| matches!(k, NodeKind::Block))
                .next(),
        }
    }

    /// Arguments of a call or instantiation node.
    pub fn arguments(&self, id: NodeId) -> Vec<NodeId> {
        self.children_where(id, |k| matches!(k, NodeKind::Argument { .. }))
            .collect()
    }

    /// First child (receiver, scope, callee or operand).
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    /// Member declarations of a class-like node.
    pub fn members(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children_where(id, |k| {
            matches!(
                k,
                NodeKind::Method { .. }
                    | NodeKind::Property { .. }
                    | NodeKind::ClassConstant { .. }
                    | NodeKind::TraitUse
            )
        })
    }

    /// Names of a class-like node with the given role.
    pub fn names_with_role(&self, id: NodeId, role: NameRole) -> Vec<NodeId> {
        self.children_where(id, move |k| matches!(k, NodeKind::Name { role: r, .. } if *r == role))
            .collect()
    }

    /// Resolved name of a `Name` node, falling back to its text.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Name { text, .. } => Some(node.resolved_name.as_deref().unwrap_or(text)),
            _ => None,
        }
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }
}

/// Iterator over ancestors.
pub struct Ancestors<'a> {
    forest: &'a Forest,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.forest.parent(current);
        Some(current)
    }
}
