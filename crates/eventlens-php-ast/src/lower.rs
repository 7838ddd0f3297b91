// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Lowering from tree-sitter-php parse trees into the arena AST.
//!
//! The lowering is text-driven where the grammar offers several shapes for
//! the same construct (imports, modifiers, operators), and falls back to
//! named children where a field is absent. Parser kinds that carry no
//! meaning for type inference become [`NodeKind::Other`] with their named
//! children lowered, so no assignment or call inside them is lost.
//!
//! Two structural rewrites happen here:
//! - statements following an unbraced `namespace X;` become children of that
//!   `Namespace` node;
//! - a `/** ... */` comment directly before a declaration becomes the
//!   declaration's first child; elsewhere it stays a statement-level
//!   `DocComment` (inline `@var` annotations).

use eventlens_core::types::{NodeId, Span};
use eventlens_core::workspace::ContentHash;
use thiserror::Error;
use tree_sitter::{Node as TsNode, Parser};

use crate::nodes::{Forest, LiteralKind, Modifiers, NameRole, NodeKind, UseKind, Visibility};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while parsing a source file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The grammar could not be loaded into the parser.
    #[error("failed to load PHP grammar: {message}")]
    Language { message: String },

    /// The parser produced no tree (cancelled or timed out).
    #[error("no parse tree produced for {path}")]
    NoTree { path: String },

    /// The source contains syntax errors.
    #[error("syntax error in {path} at line {line}: {message}")]
    Syntax {
        path: String,
        line: u32,
        message: String,
    },
}

impl ParseError {
    /// Path of the offending file, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            ParseError::Language { .. } => None,
            ParseError::NoTree { path } | ParseError::Syntax { path, .. } => Some(path),
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// A reusable PHP parser producing arena forests.
///
/// One parser per thread: tree-sitter parsers are not shareable.
pub struct PhpParser {
    parser: Parser,
}

impl PhpParser {
    /// Create a parser with the PHP grammar loaded.
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
            .map_err(|e| ParseError::Language {
                message: e.to_string(),
            })?;
        Ok(PhpParser { parser })
    }

    /// Parse one file into its own forest.
    ///
    /// The returned forest holds exactly one `File` root registered under
    /// `path`. Sources with syntax errors are rejected.
    pub fn parse(&mut self, path: &str, source: &[u8]) -> Result<Forest, ParseError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ParseError::NoTree {
                path: path.to_string(),
            })?;
        let root = tree.root_node();
        if root.has_error() {
            let (line, message) = describe_first_error(root, source);
            return Err(ParseError::Syntax {
                path: path.to_string(),
                line,
                message,
            });
        }

        let mut lowerer = Lowerer::new(source);
        let file = lowerer.lower_program(root);
        let mut forest = lowerer.finish();
        forest.add_file(path, ContentHash::compute(source), file);
        tracing::trace!(path, nodes = forest.len(), "lowered file");
        Ok(forest)
    }
}

/// Parse a single source into a forest (convenience for tests and tools).
pub fn parse_source(path: &str, source: &str) -> Result<Forest, ParseError> {
    PhpParser::new()?.parse(path, source.as_bytes())
}

fn describe_first_error(root: TsNode<'_>, source: &[u8]) -> (u32, String) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            return (
                node.start_position().row as u32 + 1,
                format!("missing {}", node.kind()),
            );
        }
        if node.is_error() {
            let text = node.utf8_text(source).unwrap_or("");
            let snippet: String = text.chars().take(40).collect();
            return (
                node.start_position().row as u32 + 1,
                format!("unexpected '{}'", snippet.trim()),
            );
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    (root.start_position().row as u32 + 1, "syntax error".to_string())
}

// ============================================================================
// Lowering
// ============================================================================

/// Parser kinds that denote a declared type.
const TYPE_KINDS: &[&str] = &[
    "named_type",
    "optional_type",
    "primitive_type",
    "union_type",
    "intersection_type",
    "disjunctive_normal_form_type",
    "bottom_type",
    "type_list",
];

/// Parser kinds that accept a preceding doc comment.
const DOCUMENTED_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "trait_declaration",
    "enum_declaration",
    "function_definition",
    "method_declaration",
    "property_declaration",
    "const_declaration",
];

/// Parser kinds lowered to `ControlFlow`.
const CONTROL_FLOW_KINDS: &[&str] = &[
    "if_statement",
    "else_clause",
    "else_if_clause",
    "while_statement",
    "do_statement",
    "for_statement",
    "switch_statement",
    "switch_block",
    "case_statement",
    "default_statement",
    "try_statement",
    "finally_clause",
    "colon_block",
    "declare_statement",
];

/// Parser kinds skipped entirely.
const SKIPPED_KINDS: &[&str] = &[
    "php_tag",
    "text",
    "text_interpolation",
    "empty_statement",
    "comment",
    "attribute_list",
    "reference_modifier",
    "variadic_placeholder",
];

struct Lowerer<'s> {
    source: &'s [u8],
    forest: Forest,
}

impl<'s> Lowerer<'s> {
    fn new(source: &'s [u8]) -> Self {
        Lowerer {
            source,
            forest: Forest::new(),
        }
    }

    fn finish(self) -> Forest {
        self.forest
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn text(&self, node: TsNode<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn span(node: TsNode<'_>) -> Span {
        Span::new(
            node.start_byte() as u32,
            node.end_byte() as u32,
            node.start_position().row as u32 + 1,
        )
    }

    fn push(&mut self, kind: NodeKind, node: TsNode<'_>, children: Vec<NodeId>) -> NodeId {
        self.forest.push(kind, Self::span(node), children)
    }

    fn named_children<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect()
    }

    fn all_children<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
        let mut cursor = node.walk();
        node.children(&mut cursor).collect()
    }

    fn is_doc_comment(&self, node: TsNode<'_>) -> bool {
        node.kind() == "comment" && self.text(node).starts_with("/**")
    }

    fn doc_node(&mut self, node: TsNode<'_>) -> NodeId {
        let text = self.text(node).to_string();
        self.push(NodeKind::DocComment { text }, node, vec![])
    }

    fn field<'t>(node: TsNode<'t>, name: &str) -> Option<TsNode<'t>> {
        node.child_by_field_name(name)
    }

    fn variable_text(&self, node: TsNode<'_>) -> String {
        self.text(node).trim_start_matches('&').trim_start_matches('$').to_string()
    }

    fn modifiers(&self, node: TsNode<'_>) -> Modifiers {
        let mut modifiers = Modifiers::default();
        for child in Self::all_children(node) {
            match child.kind() {
                "visibility_modifier" => {
                    modifiers.visibility = match self.text(child).to_ascii_lowercase().as_str() {
                        "private" => Visibility::Private,
                        "protected" => Visibility::Protected,
                        _ => Visibility::Public,
                    };
                }
                "static_modifier" => modifiers.is_static = true,
                "abstract_modifier" => modifiers.is_abstract = true,
                "final_modifier" => modifiers.is_final = true,
                "readonly_modifier" => modifiers.is_readonly = true,
                _ => {}
            }
        }
        modifiers
    }

    fn name_node(&mut self, node: TsNode<'_>, role: NameRole) -> NodeId {
        let text = self.text(node).trim().to_string();
        self.push(NodeKind::Name { text, role }, node, vec![])
    }

    fn is_name_like(kind: &str) -> bool {
        matches!(
            kind,
            "name" | "qualified_name" | "relative_scope" | "reserved_identifier" | "namespace_name"
        )
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn lower_program(&mut self, root: TsNode<'_>) -> NodeId {
        let mut cursor = root.walk();
        let statements: Vec<_> = root.named_children(&mut cursor).collect();
        let children = self.lower_statement_list(&statements);
        self.push(NodeKind::File, root, children)
    }

    /// Lower a statement sequence, attaching doc comments and nesting
    /// statements under unbraced namespaces.
    fn lower_statement_list(&mut self, nodes: &[TsNode<'_>]) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending_doc: Option<TsNode<'_>> = None;
        let mut idx = 0;
        while idx < nodes.len() {
            let node = nodes[idx];
            let kind = node.kind();

            if kind == "comment" {
                if self.is_doc_comment(node) {
                    if let Some(previous) = pending_doc.replace(node) {
                        out.push(self.doc_node(previous));
                    }
                }
                idx += 1;
                continue;
            }

            if kind == "namespace_definition" && Self::field(node, "body").is_none() {
                if let Some(doc) = pending_doc.take() {
                    out.push(self.doc_node(doc));
                }
                let end = nodes[idx + 1..]
                    .iter()
                    .position(|n| n.kind() == "namespace_definition")
                    .map(|p| idx + 1 + p)
                    .unwrap_or(nodes.len());
                let children = self.lower_statement_list(&nodes[idx + 1..end]);
                let name = Self::field(node, "name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                let last = nodes[end - 1];
                let span = Span::new(
                    node.start_byte() as u32,
                    last.end_byte().max(node.end_byte()) as u32,
                    node.start_position().row as u32 + 1,
                );
                out.push(self.forest.push(NodeKind::Namespace { name }, span, children));
                idx = end;
                continue;
            }

            let doc = pending_doc.take();
            if DOCUMENTED_KINDS.contains(&kind) {
                out.extend(self.lower_declaration(node, doc));
            } else {
                if let Some(doc) = doc {
                    out.push(self.doc_node(doc));
                }
                out.extend(self.lower_any(node));
            }
            idx += 1;
        }
        if let Some(doc) = pending_doc {
            out.push(self.doc_node(doc));
        }
        out
    }

    /// Lower any node: statements by kind, everything else as an expression.
    fn lower_any(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        let kind = node.kind();
        if SKIPPED_KINDS.contains(&kind) {
            return Vec::new();
        }
        match kind {
            "compound_statement" => {
                let children = self.lower_statement_list(&Self::all_named(node));
                vec![self.push(NodeKind::Block, node, children)]
            }
            "expression_statement" => {
                let children = self.lower_children_flat(node);
                vec![self.push(NodeKind::ExpressionStatement, node, children)]
            }
            "return_statement" => {
                let children = self.lower_children_flat(node);
                vec![self.push(NodeKind::Return, node, children)]
            }
            "namespace_definition" => vec![self.lower_namespace(node)],
            "namespace_use_declaration" => self.lower_use_declaration(node),
            "foreach_statement" => vec![self.lower_foreach(node)],
            "catch_clause" => vec![self.lower_catch(node)],
            "function_static_declaration" => self.lower_static_variables(node),
            _ if DOCUMENTED_KINDS.contains(&kind) => self.lower_declaration(node, None),
            _ if CONTROL_FLOW_KINDS.contains(&kind) => {
                let children = self.lower_children_flat(node);
                vec![self.push(
                    NodeKind::ControlFlow {
                        ts_kind: kind.to_string(),
                    },
                    node,
                    children,
                )]
            }
            _ => self.lower_expr(node).into_iter().collect(),
        }
    }

    /// Named children including comments (statement lists need them).
    fn all_named<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor).collect()
    }

    fn lower_children_flat(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in Self::named_children(node) {
            out.extend(self.lower_any(child));
        }
        out
    }

    fn lower_namespace(&mut self, node: TsNode<'_>) -> NodeId {
        let name = Self::field(node, "name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let children = match Self::field(node, "body") {
            Some(body) => self.lower_statement_list(&Self::all_named(body)),
            None => Vec::new(),
        };
        self.push(NodeKind::Namespace { name }, node, children)
    }

    fn lower_use_declaration(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        parse_use_text(self.text(node))
            .into_iter()
            .map(|(kind, name, alias)| self.push(NodeKind::Use { kind, name, alias }, node, vec![]))
            .collect()
    }

    fn lower_static_variables(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in Self::named_children(node) {
            if child.kind() != "static_variable_declaration" {
                continue;
            }
            let parts = Self::named_children(child);
            let Some(var) = Self::field(child, "name").or_else(|| parts.first().copied()) else {
                continue;
            };
            let name = self.variable_text(var);
            let value = Self::field(child, "value")
                .or_else(|| parts.get(1).copied())
                .and_then(|v| self.lower_expr(v));
            out.push(self.push(
                NodeKind::StaticVariable { name },
                child,
                value.into_iter().collect(),
            ));
        }
        out
    }

    fn lower_foreach(&mut self, node: TsNode<'_>) -> NodeId {
        let parts = Self::named_children(node);
        let body = Self::field(node, "body");
        let mut children = Vec::new();
        let mut has_key = false;

        if let Some(source) = parts.first() {
            children.extend(self.lower_expr(*source));
        }
        if let Some(target) = parts.get(1) {
            if target.kind() == "pair" {
                let pair = Self::named_children(*target);
                if let (Some(key), Some(value)) = (pair.first(), pair.get(1)) {
                    has_key = true;
                    children.extend(self.lower_expr(*key));
                    children.extend(self.lower_expr(*value));
                }
            } else {
                children.extend(self.lower_expr(*target));
            }
        }
        let body = body.or_else(|| parts.get(2).copied());
        if let Some(body) = body {
            children.extend(self.lower_any(body));
        }
        self.push(NodeKind::Foreach { has_key }, node, children)
    }

    fn lower_catch(&mut self, node: TsNode<'_>) -> NodeId {
        let mut children = Vec::new();
        for child in Self::named_children(node) {
            match child.kind() {
                "variable_name" => {
                    let name = self.variable_text(child);
                    children.push(self.push(NodeKind::Variable { name }, child, vec![]));
                }
                "compound_statement" => children.extend(self.lower_any(child)),
                _ => self.collect_type_names(child, &mut children),
            }
        }
        self.push(NodeKind::Catch, node, children)
    }

    fn collect_type_names(&mut self, node: TsNode<'_>, out: &mut Vec<NodeId>) {
        if Self::is_name_like(node.kind()) {
            out.push(self.name_node(node, NameRole::TypeHint));
            return;
        }
        for child in Self::named_children(node) {
            self.collect_type_names(child, out);
        }
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    fn lower_declaration(&mut self, node: TsNode<'_>, doc: Option<TsNode<'_>>) -> Vec<NodeId> {
        let doc = doc.map(|d| self.doc_node(d));
        match node.kind() {
            "class_declaration" | "enum_declaration" => vec![self.lower_class(node, doc)],
            "interface_declaration" => vec![self.lower_interface(node, doc)],
            "trait_declaration" => vec![self.lower_trait(node, doc)],
            "function_definition" | "method_declaration" => vec![self.lower_function(node, doc)],
            "property_declaration" => self.lower_property(node, doc),
            "const_declaration" => self.lower_constants(node, doc),
            _ => {
                let mut children: Vec<NodeId> = doc.into_iter().collect();
                children.extend(self.lower_children_flat(node));
                vec![self.push(
                    NodeKind::Other {
                        ts_kind: node.kind().to_string(),
                    },
                    node,
                    children,
                )]
            }
        }
    }

    fn declared_name(&self, node: TsNode<'_>) -> String {
        Self::field(node, "name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn lower_class(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> NodeId {
        let name = self.declared_name(node);
        let mut modifiers = self.modifiers(node);
        if node.kind() == "enum_declaration" {
            modifiers.is_final = true;
        }
        let mut children: Vec<NodeId> = doc.into_iter().collect();
        for child in Self::named_children(node) {
            match child.kind() {
                "base_clause" => self.collect_names(child, NameRole::Extends, &mut children),
                "class_interface_clause" => {
                    self.collect_names(child, NameRole::Implements, &mut children)
                }
                "declaration_list" | "enum_declaration_list" => {
                    children.extend(self.lower_members(child))
                }
                _ => {}
            }
        }
        self.push(NodeKind::Class { name, modifiers }, node, children)
    }

    fn lower_interface(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> NodeId {
        let name = self.declared_name(node);
        let mut children: Vec<NodeId> = doc.into_iter().collect();
        for child in Self::named_children(node) {
            match child.kind() {
                "base_clause" => self.collect_names(child, NameRole::Extends, &mut children),
                "declaration_list" => children.extend(self.lower_members(child)),
                _ => {}
            }
        }
        self.push(NodeKind::Interface { name }, node, children)
    }

    fn lower_trait(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> NodeId {
        let name = self.declared_name(node);
        let mut children: Vec<NodeId> = doc.into_iter().collect();
        for child in Self::named_children(node) {
            if child.kind() == "declaration_list" {
                children.extend(self.lower_members(child));
            }
        }
        self.push(NodeKind::Trait { name }, node, children)
    }

    fn collect_names(&mut self, clause: TsNode<'_>, role: NameRole, out: &mut Vec<NodeId>) {
        for child in Self::named_children(clause) {
            if Self::is_name_like(child.kind()) {
                out.push(self.name_node(child, role));
            }
        }
    }

    fn lower_members(&mut self, list: TsNode<'_>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending_doc: Option<TsNode<'_>> = None;
        for member in Self::all_named(list) {
            match member.kind() {
                "comment" => {
                    if self.is_doc_comment(member) {
                        pending_doc = Some(member);
                    }
                }
                "use_declaration" => {
                    pending_doc = None;
                    let mut names = Vec::new();
                    self.collect_names(member, NameRole::TraitUse, &mut names);
                    out.push(self.push(NodeKind::TraitUse, member, names));
                }
                kind if DOCUMENTED_KINDS.contains(&kind) => {
                    out.extend(self.lower_declaration(member, pending_doc.take()));
                }
                _ => pending_doc = None,
            }
        }
        out
    }

    fn lower_function(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> NodeId {
        let name = self.declared_name(node);
        let mut children: Vec<NodeId> = doc.into_iter().collect();
        if let Some(params) = Self::field(node, "parameters") {
            children.extend(self.lower_parameters(params));
        }
        if let Some(ret) = Self::field(node, "return_type") {
            children.extend(self.lower_type(ret));
        }
        if let Some(body) = Self::field(node, "body") {
            children.extend(self.lower_any(body));
        }
        let kind = if node.kind() == "method_declaration" {
            NodeKind::Method {
                name,
                modifiers: self.modifiers(node),
            }
        } else {
            NodeKind::Function { name }
        };
        self.push(kind, node, children)
    }

    fn lower_parameters(&mut self, list: TsNode<'_>) -> Vec<NodeId> {
        let mut out = Vec::new();
        for param in Self::named_children(list) {
            let kind = param.kind();
            if !matches!(
                kind,
                "simple_parameter" | "variadic_parameter" | "property_promotion_parameter"
            ) {
                continue;
            }
            let parts = Self::named_children(param);
            let name = Self::field(param, "name")
                .or_else(|| parts.iter().copied().find(|p| p.kind() == "variable_name"))
                .map(|n| self.variable_text(n))
                .unwrap_or_default();
            let variadic = kind == "variadic_parameter" || self.text(param).contains("...");
            let by_ref = parts.iter().any(|p| p.kind() == "reference_modifier")
                || self.text(param).contains("&$");
            let promoted = (kind == "property_promotion_parameter").then(|| self.modifiers(param));

            let mut children = Vec::new();
            let type_node = Self::field(param, "type")
                .or_else(|| parts.iter().copied().find(|p| TYPE_KINDS.contains(&p.kind())));
            if let Some(ty) = type_node {
                children.extend(self.lower_type(ty));
            }
            if let Some(default) = Self::field(param, "default_value") {
                children.extend(self.lower_expr(default));
            }
            out.push(self.push(
                NodeKind::Parameter {
                    name,
                    variadic,
                    by_ref,
                    promoted,
                },
                param,
                children,
            ));
        }
        out
    }

    fn lower_property(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> Vec<NodeId> {
        let modifiers = self.modifiers(node);
        let parts = Self::named_children(node);
        let type_node = Self::field(node, "type")
            .or_else(|| parts.iter().copied().find(|p| TYPE_KINDS.contains(&p.kind())));
        let doc_text = doc.and_then(|d| match self.forest.kind(d) {
            NodeKind::DocComment { text } => Some(text.clone()),
            _ => None,
        });

        let mut out = Vec::new();
        for element in parts.iter().filter(|p| p.kind() == "property_element") {
            let pieces = Self::named_children(*element);
            let Some(var) = Self::field(*element, "name")
                .or_else(|| pieces.iter().copied().find(|p| p.kind() == "variable_name"))
            else {
                continue;
            };
            let name = self.variable_text(var);
            let mut children = Vec::new();
            // Every element of a grouped declaration shares the doc comment.
            match (out.is_empty(), doc, &doc_text) {
                (true, Some(doc), _) => children.push(doc),
                (false, Some(_), Some(text)) => {
                    let text = text.clone();
                    children.push(self.push(NodeKind::DocComment { text }, *element, vec![]));
                }
                _ => {}
            }
            if let Some(ty) = type_node {
                children.extend(self.lower_type(ty));
            }
            let default = Self::field(*element, "default_value").or_else(|| {
                pieces
                    .iter()
                    .copied()
                    .find(|p| p.id() != var.id())
                    .map(|p| {
                        if p.kind() == "property_initializer" {
                            Self::named_children(p).first().copied().unwrap_or(p)
                        } else {
                            p
                        }
                    })
            });
            if let Some(default) = default {
                children.extend(self.lower_expr(default));
            }
            out.push(self.push(
                NodeKind::Property { name, modifiers },
                *element,
                children,
            ));
        }
        out
    }

    fn lower_constants(&mut self, node: TsNode<'_>, doc: Option<NodeId>) -> Vec<NodeId> {
        let parts = Self::named_children(node);
        let type_node = Self::field(node, "type")
            .or_else(|| parts.iter().copied().find(|p| TYPE_KINDS.contains(&p.kind())));
        let mut out = Vec::new();
        let mut doc = doc;
        for element in parts.iter().filter(|p| p.kind() == "const_element") {
            let pieces = Self::named_children(*element);
            let Some(name_node) = pieces.first() else {
                continue;
            };
            let name = self.text(*name_node).to_string();
            let mut children: Vec<NodeId> = doc.take().into_iter().collect();
            if let Some(ty) = type_node {
                children.extend(self.lower_type(ty));
            }
            if let Some(value) = pieces.get(1) {
                children.extend(self.lower_expr(*value));
            }
            out.push(self.push(NodeKind::ClassConstant { name }, *element, children));
        }
        out
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    fn lower_type(&mut self, node: TsNode<'_>) -> Option<NodeId> {
        let kind = node.kind();
        match kind {
            "named_type" => {
                let inner = Self::named_children(node).first().copied().unwrap_or(node);
                Some(self.name_node(inner, NameRole::TypeHint))
            }
            "primitive_type" | "bottom_type" => Some(self.name_node(node, NameRole::TypeHint)),
            _ if Self::is_name_like(kind) => Some(self.name_node(node, NameRole::TypeHint)),
            "optional_type" => {
                let inner = Self::named_children(node)
                    .first()
                    .and_then(|c| self.lower_type(*c));
                Some(self.push(NodeKind::NullableType, node, inner.into_iter().collect()))
            }
            "union_type" | "disjunctive_normal_form_type" | "type_list" => {
                let children = self.lower_type_children(node);
                Some(self.push(NodeKind::UnionType, node, children))
            }
            "intersection_type" => {
                let children = self.lower_type_children(node);
                Some(self.push(NodeKind::IntersectionType, node, children))
            }
            _ => match Self::named_children(node).first() {
                Some(child) => self.lower_type(*child),
                None if !self.text(node).trim().is_empty() => {
                    Some(self.name_node(node, NameRole::TypeHint))
                }
                None => None,
            },
        }
    }

    fn lower_type_children(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        Self::named_children(node)
            .into_iter()
            .filter_map(|c| self.lower_type(c))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn lower_expr(&mut self, node: TsNode<'_>) -> Option<NodeId> {
        let kind = node.kind();
        if SKIPPED_KINDS.contains(&kind) {
            return None;
        }
        let id = match kind {
            "parenthesized_expression" | "by_ref" | "error_suppression_expression" => {
                let inner = Self::named_children(node).first().copied()?;
                return self.lower_expr(inner);
            }
            "variable_name" => {
                let name = self.variable_text(node);
                self.push(NodeKind::Variable { name }, node, vec![])
            }
            "name" | "qualified_name" => self.name_node(node, NameRole::Constant),
            "integer" => self.literal(node, LiteralKind::Int),
            "float" => self.literal(node, LiteralKind::Float),
            "string" | "encapsed_string" | "heredoc" | "nowdoc" | "shell_command_expression" => {
                self.literal(node, LiteralKind::String)
            }
            "boolean" => self.literal(node, LiteralKind::Bool),
            "null" => self.literal(node, LiteralKind::Null),
            "assignment_expression" | "reference_assignment_expression" => {
                let by_ref = kind == "reference_assignment_expression";
                let children = self.lower_pair(node, "left", "right");
                self.push(NodeKind::Assign { by_ref }, node, children)
            }
            "augmented_assignment_expression" => {
                let op = self.operator(node, "left", "right");
                let children = self.lower_pair(node, "left", "right");
                self.push(NodeKind::CompoundAssign { op }, node, children)
            }
            "object_creation_expression" => self.lower_new(node),
            "member_call_expression" | "nullsafe_member_call_expression" => {
                let nullsafe = kind.starts_with("nullsafe");
                let name = self.member_name(node);
                let mut children: Vec<NodeId> = Self::field(node, "object")
                    .and_then(|o| self.lower_expr(o))
                    .into_iter()
                    .collect();
                children.extend(self.lower_arguments(node));
                self.push(NodeKind::MethodCall { name, nullsafe }, node, children)
            }
            "scoped_call_expression" => {
                let name = self.member_name(node);
                let mut children: Vec<NodeId> = Self::field(node, "scope")
                    .and_then(|s| self.lower_scope(s))
                    .into_iter()
                    .collect();
                children.extend(self.lower_arguments(node));
                self.push(NodeKind::StaticCall { name }, node, children)
            }
            "function_call_expression" => {
                let mut children = Vec::new();
                if let Some(function) = Self::field(node, "function") {
                    if Self::is_name_like(function.kind()) {
                        children.push(self.name_node(function, NameRole::Function));
                    } else {
                        children.extend(self.lower_expr(function));
                    }
                }
                children.extend(self.lower_arguments(node));
                self.push(NodeKind::FunctionCall, node, children)
            }
            "member_access_expression" | "nullsafe_member_access_expression" => {
                let nullsafe = kind.starts_with("nullsafe");
                let name = self.member_name(node);
                let children: Vec<NodeId> = Self::field(node, "object")
                    .and_then(|o| self.lower_expr(o))
                    .into_iter()
                    .collect();
                self.push(NodeKind::PropertyFetch { name, nullsafe }, node, children)
            }
            "scoped_property_access_expression" => {
                let name = Self::field(node, "name")
                    .map(|n| self.variable_text(n))
                    .unwrap_or_default();
                let children: Vec<NodeId> = Self::field(node, "scope")
                    .and_then(|s| self.lower_scope(s))
                    .into_iter()
                    .collect();
                self.push(NodeKind::StaticPropertyFetch { name }, node, children)
            }
            "class_constant_access_expression" => {
                let parts = Self::named_children(node);
                let name = parts
                    .get(1)
                    .map(|n| self.text(*n).to_string())
                    .unwrap_or_default();
                let children: Vec<NodeId> = parts
                    .first()
                    .and_then(|s| self.lower_scope(*s))
                    .into_iter()
                    .collect();
                self.push(NodeKind::ClassConstantFetch { name }, node, children)
            }
            "conditional_expression" => self.lower_ternary(node),
            "binary_expression" => self.lower_binary(node),
            "unary_op_expression" | "update_expression" => {
                let operand = Self::named_children(node).first().copied();
                let op = match operand {
                    Some(operand) => {
                        let text = self.text(node);
                        let inner = self.text(operand);
                        text.replacen(inner, "", 1).trim().to_string()
                    }
                    None => String::new(),
                };
                let children: Vec<NodeId> =
                    operand.and_then(|o| self.lower_expr(o)).into_iter().collect();
                self.push(NodeKind::Unary { op }, node, children)
            }
            "cast_expression" => {
                let target = Self::field(node, "type")
                    .map(|t| {
                        self.text(t)
                            .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
                            .to_ascii_lowercase()
                    })
                    .unwrap_or_default();
                let children: Vec<NodeId> = Self::field(node, "value")
                    .or_else(|| Self::named_children(node).last().copied())
                    .and_then(|v| self.lower_expr(v))
                    .into_iter()
                    .collect();
                self.push(NodeKind::Cast { target }, node, children)
            }
            "clone_expression" => {
                let children = self.lower_children_flat(node);
                self.push(NodeKind::Clone, node, children)
            }
            "match_expression" => self.lower_match(node),
            "anonymous_function" | "anonymous_function_creation_expression" => {
                self.lower_closure(node)
            }
            "arrow_function" => {
                let mut children = Vec::new();
                if let Some(params) = Self::field(node, "parameters") {
                    children.extend(self.lower_parameters(params));
                }
                if let Some(ret) = Self::field(node, "return_type") {
                    children.extend(self.lower_type(ret));
                }
                if let Some(body) = Self::field(node, "body") {
                    children.extend(self.lower_expr(body));
                }
                self.push(NodeKind::ArrowFunction, node, children)
            }
            "array_creation_expression" => {
                let mut children = Vec::new();
                for element in Self::named_children(node) {
                    if element.kind() == "array_element_initializer" {
                        children.extend(self.lower_children_flat(element));
                    } else {
                        children.extend(self.lower_any(element));
                    }
                }
                self.push(NodeKind::ArrayLiteral, node, children)
            }
            "subscript_expression" => {
                let children = self.lower_children_flat(node);
                self.push(NodeKind::ArrayAccess, node, children)
            }
            "list_literal" => {
                let children = self.lower_children_flat(node);
                self.push(NodeKind::ListDestructure, node, children)
            }
            "anonymous_class" => self.push(
                NodeKind::Other {
                    ts_kind: kind.to_string(),
                },
                node,
                vec![],
            ),
            _ if DOCUMENTED_KINDS.contains(&kind)
                || CONTROL_FLOW_KINDS.contains(&kind)
                || matches!(
                    kind,
                    "compound_statement" | "expression_statement" | "return_statement"
                ) =>
            {
                return self.lower_any(node).into_iter().next();
            }
            _ => {
                let children = self.lower_children_flat(node);
                self.push(
                    NodeKind::Other {
                        ts_kind: kind.to_string(),
                    },
                    node,
                    children,
                )
            }
        };
        Some(id)
    }

    fn literal(&mut self, node: TsNode<'_>, kind: LiteralKind) -> NodeId {
        self.push(NodeKind::Literal { kind }, node, vec![])
    }

    fn lower_pair(&mut self, node: TsNode<'_>, left: &str, right: &str) -> Vec<NodeId> {
        let parts = Self::named_children(node);
        let left = Self::field(node, left).or_else(|| parts.first().copied());
        let right = Self::field(node, right).or_else(|| parts.last().copied());
        let mut children = Vec::new();
        if let Some(left) = left {
            children.extend(self.lower_expr(left));
        }
        if let Some(right) = right {
            children.extend(self.lower_expr(right));
        }
        children
    }

    /// Operator text between the left and right operands.
    fn operator(&self, node: TsNode<'_>, left: &str, right: &str) -> String {
        if let Some(op) = Self::field(node, "operator") {
            return self.text(op).trim().to_string();
        }
        let parts = Self::named_children(node);
        let left = Self::field(node, left).or_else(|| parts.first().copied());
        let right = Self::field(node, right).or_else(|| parts.last().copied());
        match (left, right) {
            (Some(l), Some(r)) if l.end_byte() <= r.start_byte() => {
                String::from_utf8_lossy(&self.source[l.end_byte()..r.start_byte()])
                    .trim()
                    .to_string()
            }
            _ => String::new(),
        }
    }

    fn member_name(&self, node: TsNode<'_>) -> String {
        match Self::field(node, "name") {
            Some(name) if name.kind() == "name" => self.text(name).to_string(),
            _ => String::new(),
        }
    }

    /// Lower the scope of a static access (`X::`, `self::`, `$obj::`).
    fn lower_scope(&mut self, node: TsNode<'_>) -> Option<NodeId> {
        if Self::is_name_like(node.kind()) {
            Some(self.name_node(node, NameRole::Class))
        } else {
            self.lower_expr(node)
        }
    }

    fn lower_arguments(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        let args = Self::field(node, "arguments").or_else(|| {
            Self::named_children(node)
                .into_iter()
                .find(|c| c.kind() == "arguments")
        });
        let Some(args) = args else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for arg in Self::named_children(args) {
            match arg.kind() {
                "argument" => {
                    let name_node = Self::field(arg, "name");
                    let name = name_node.map(|n| self.text(n).to_string());
                    let unpack = self.text(arg).trim_start().starts_with("...");
                    let value = Self::named_children(arg)
                        .into_iter()
                        .filter(|c| Some(c.id()) != name_node.map(|n| n.id()))
                        .last();
                    let value = match value {
                        Some(v) if v.kind() == "variadic_unpacking" => {
                            Self::named_children(v).first().copied()
                        }
                        other => other,
                    };
                    let children: Vec<NodeId> =
                        value.and_then(|v| self.lower_expr(v)).into_iter().collect();
                    out.push(self.push(NodeKind::Argument { name, unpack }, arg, children));
                }
                "variadic_unpacking" => {
                    let children: Vec<NodeId> = Self::named_children(arg)
                        .first()
                        .and_then(|v| self.lower_expr(*v))
                        .into_iter()
                        .collect();
                    out.push(self.push(
                        NodeKind::Argument {
                            name: None,
                            unpack: true,
                        },
                        arg,
                        children,
                    ));
                }
                "variadic_placeholder" => {}
                _ => {
                    let children: Vec<NodeId> = self.lower_expr(arg).into_iter().collect();
                    out.push(self.push(
                        NodeKind::Argument {
                            name: None,
                            unpack: false,
                        },
                        arg,
                        children,
                    ));
                }
            }
        }
        out
    }

    fn lower_new(&mut self, node: TsNode<'_>) -> NodeId {
        let mut children = Vec::new();
        for (idx, child) in Self::named_children(node).into_iter().enumerate() {
            match child.kind() {
                "arguments" => {}
                kind if idx == 0 && Self::is_name_like(kind) => {
                    children.push(self.name_node(child, NameRole::Class));
                }
                "anonymous_class" => {
                    children.push(self.push(
                        NodeKind::Other {
                            ts_kind: "anonymous_class".to_string(),
                        },
                        child,
                        vec![],
                    ));
                }
                _ if idx == 0 => children.extend(self.lower_expr(child)),
                _ => {}
            }
        }
        children.extend(self.lower_arguments(node));
        self.push(NodeKind::New, node, children)
    }

    fn lower_ternary(&mut self, node: TsNode<'_>) -> NodeId {
        let parts = Self::named_children(node);
        let condition = Self::field(node, "condition").or_else(|| parts.first().copied());
        let alternative = Self::field(node, "alternative").or_else(|| parts.last().copied());
        let body = Self::field(node, "body").or_else(|| {
            if parts.len() >= 3 {
                parts.get(1).copied()
            } else {
                None
            }
        });
        let short = body.is_none();
        let mut children = Vec::new();
        for part in [condition, body, alternative].into_iter().flatten() {
            children.extend(self.lower_expr(part));
        }
        self.push(NodeKind::Ternary { short }, node, children)
    }

    fn lower_binary(&mut self, node: TsNode<'_>) -> NodeId {
        let op = self.operator(node, "left", "right");
        if op.eq_ignore_ascii_case("instanceof") {
            let parts = Self::named_children(node);
            let left = Self::field(node, "left").or_else(|| parts.first().copied());
            let right = Self::field(node, "right").or_else(|| parts.last().copied());
            let mut children: Vec<NodeId> =
                left.and_then(|l| self.lower_expr(l)).into_iter().collect();
            if let Some(right) = right {
                children.extend(self.lower_scope(right));
            }
            return self.push(NodeKind::Instanceof, node, children);
        }
        let children = self.lower_pair(node, "left", "right");
        if op == "??" {
            self.push(NodeKind::Coalesce, node, children)
        } else {
            self.push(NodeKind::Binary { op }, node, children)
        }
    }

    fn lower_match(&mut self, node: TsNode<'_>) -> NodeId {
        let mut children = Vec::new();
        if let Some(condition) = Self::field(node, "condition") {
            children.extend(self.lower_expr(condition));
        }
        let block = Self::field(node, "body").or_else(|| {
            Self::named_children(node)
                .into_iter()
                .find(|c| c.kind() == "match_block")
        });
        if let Some(block) = block {
            for arm in Self::named_children(block) {
                let default = arm.kind() == "match_default_expression";
                let mut arm_children = Vec::new();
                if let Some(conditions) = Self::field(arm, "conditions") {
                    arm_children.extend(self.lower_children_flat(conditions));
                }
                let result = Self::field(arm, "return_expression")
                    .or_else(|| Self::named_children(arm).last().copied());
                if let Some(result) = result {
                    arm_children.extend(self.lower_expr(result));
                }
                children.push(self.push(NodeKind::MatchArm { default }, arm, arm_children));
            }
        }
        self.push(NodeKind::Match, node, children)
    }

    fn lower_closure(&mut self, node: TsNode<'_>) -> NodeId {
        let is_static = Self::all_children(node)
            .iter()
            .any(|c| c.kind() == "static_modifier" || self.text(*c) == "static");
        let mut children = Vec::new();
        if let Some(params) = Self::field(node, "parameters") {
            children.extend(self.lower_parameters(params));
        }
        for child in Self::named_children(node) {
            if child.kind() == "anonymous_function_use_clause" {
                for var in Self::named_children(child) {
                    let var = if var.kind() == "by_ref" {
                        Self::named_children(var).first().copied().unwrap_or(var)
                    } else {
                        var
                    };
                    if var.kind() == "variable_name" {
                        let name = self.variable_text(var);
                        children.push(self.push(NodeKind::Variable { name }, var, vec![]));
                    }
                }
            }
        }
        if let Some(ret) = Self::field(node, "return_type") {
            children.extend(self.lower_type(ret));
        }
        if let Some(body) = Self::field(node, "body") {
            children.extend(self.lower_any(body));
        }
        self.push(NodeKind::Closure { is_static }, node, children)
    }
}

// ============================================================================
// Import Parsing
// ============================================================================

/// Split a `use` declaration into `(kind, fqn, alias)` triples.
///
/// Handles `use A\B;`, `use A\B as C;`, `use function A\f;`,
/// `use const A\X;`, comma lists and group uses (`use A\{B, C as D};`).
pub fn parse_use_text(text: &str) -> Vec<(UseKind, String, String)> {
    let body = text.trim().trim_end_matches(';').trim();
    let body = strip_keyword(body, "use").unwrap_or(body);
    let (default_kind, body) = split_use_kind(body);

    let mut out = Vec::new();
    if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) {
        let prefix = body[..open].trim().trim_end_matches('\\').trim_start_matches('\\');
        for part in body[open + 1..close].split(',') {
            let (kind, part) = split_use_kind(part.trim());
            let kind = if kind == UseKind::Class { default_kind } else { kind };
            if let Some((name, alias)) = split_alias(part) {
                out.push((kind, format!("{}\\{}", prefix, name), alias));
            }
        }
    } else {
        for part in body.split(',') {
            if let Some((name, alias)) = split_alias(part.trim()) {
                out.push((default_kind, name.trim_start_matches('\\').to_string(), alias));
            }
        }
    }
    out
}

fn strip_keyword<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let head = text.get(..keyword.len())?;
    let rest = &text[keyword.len()..];
    if head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn split_use_kind(text: &str) -> (UseKind, &str) {
    if let Some(rest) = strip_keyword(text, "function") {
        (UseKind::Function, rest)
    } else if let Some(rest) = strip_keyword(text, "const") {
        (UseKind::Constant, rest)
    } else {
        (UseKind::Class, text)
    }
}

fn split_alias(part: &str) -> Option<(String, String)> {
    let words: Vec<&str> = part.split_whitespace().collect();
    match words.as_slice() {
        [] => None,
        [name] => {
            let name = name.trim_start_matches('\\');
            let alias = name.rsplit('\\').next().unwrap_or(name);
            Some((name.to_string(), alias.to_string()))
        }
        [name, as_kw, alias] if as_kw.eq_ignore_ascii_case("as") => Some((
            name.trim_start_matches('\\').to_string(),
            alias.to_string(),
        )),
        _ => None,
    }
}
