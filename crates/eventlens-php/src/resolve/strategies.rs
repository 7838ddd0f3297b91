//! Per-kind resolution strategies.
//!
//! [`TypeResolver::dispatch`] is the single entry point: one arm per node
//! kind. Strategies only read the forest; they compose the resolutions of
//! the nodes they reference.

use eventlens_core::types::{native_type_name, NodeId, Type, TypeCollection};
use eventlens_php_ast::{DocBlock, DocType, Forest, NameRole, NodeKind};

use super::{ResolveError, TypeResolver};
use crate::hierarchy;

fn single(name: &str) -> TypeCollection {
    TypeCollection::singleton(Type::named(name))
}

fn int_or_float() -> TypeCollection {
    [Type::named("int"), Type::named("float")].into_iter().collect()
}

impl TypeResolver<'_> {
    pub(super) fn dispatch(&mut self, node: NodeId) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let children = forest.children(node);
        match forest.kind(node) {
            // ----------------------------------------------------------------
            // Declarations
            // ----------------------------------------------------------------
            NodeKind::Class { .. } | NodeKind::Interface { .. } | NodeKind::Trait { .. } => {
                Ok(self.enclosing_class_type(node).into_iter().collect())
            }
            NodeKind::Method { .. } | NodeKind::Function { .. } => self.return_type(node),
            NodeKind::Closure { .. } | NodeKind::ArrowFunction => Ok(single("Closure")),
            NodeKind::Property { name, .. } => self.resolve_property(node, name),
            NodeKind::Parameter {
                name,
                variadic,
                promoted,
                ..
            } => self.resolve_parameter(node, name, *variadic, promoted.is_some()),
            NodeKind::ClassConstant { .. } => {
                match forest.default_value(node).or(forest.type_hint(node)) {
                    Some(value) => self.resolve(value),
                    None => Ok(TypeCollection::new()),
                }
            }

            // ----------------------------------------------------------------
            // Type hints and names
            // ----------------------------------------------------------------
            NodeKind::NullableType => {
                let mut types = self.resolve_all(children)?;
                types.add(Type::null());
                Ok(types)
            }
            NodeKind::UnionType | NodeKind::IntersectionType => self.resolve_all(children),
            NodeKind::Name { text, role } => Ok(self.resolve_name(node, text, *role)),

            // ----------------------------------------------------------------
            // Variables and assignment
            // ----------------------------------------------------------------
            NodeKind::Variable { name } => self.resolve_variable(node, name),
            NodeKind::Assign { .. } => match children.get(1) {
                Some(value) => self.resolve(*value),
                None => Ok(TypeCollection::new()),
            },
            NodeKind::CompoundAssign { op } => self.compound_assign(children, op),
            NodeKind::StaticVariable { .. } => match children.first() {
                Some(value) => self.resolve(*value),
                None => Ok(single("null")),
            },

            // ----------------------------------------------------------------
            // Instantiation and calls
            // ----------------------------------------------------------------
            NodeKind::New => match children.first() {
                Some(class) if matches!(forest.kind(*class), NodeKind::Name { .. }) => {
                    self.resolve(*class)
                }
                _ => Ok(TypeCollection::new()),
            },
            NodeKind::MethodCall { name, .. } | NodeKind::StaticCall { name } => {
                self.resolve_call(children.first().copied(), name)
            }
            NodeKind::FunctionCall => Ok(self.function_call(children.first().copied())),
            NodeKind::Argument { .. } => match children.first() {
                Some(value) => self.resolve(*value),
                None => Ok(TypeCollection::new()),
            },

            // ----------------------------------------------------------------
            // Member fetches
            // ----------------------------------------------------------------
            NodeKind::PropertyFetch { name, .. } | NodeKind::StaticPropertyFetch { name } => {
                self.resolve_property_fetch(node, name)
            }
            NodeKind::ClassConstantFetch { name } => {
                self.class_constant_fetch(children.first().copied(), name)
            }

            // ----------------------------------------------------------------
            // Operators
            // ----------------------------------------------------------------
            NodeKind::Ternary { short } => {
                // Short ternaries reuse the condition as the "then" branch.
                let branches = if *short { children } else { children.get(1..).unwrap_or(&[]) };
                self.resolve_all(branches)
            }
            NodeKind::Coalesce => {
                let mut types = TypeCollection::new();
                if let Some(left) = children.first() {
                    types.extend(&self.resolve(*left)?.without_null());
                }
                if let Some(right) = children.get(1) {
                    types.extend(&self.resolve(*right)?);
                }
                Ok(types)
            }
            NodeKind::Binary { op } => self.binary(children, op),
            NodeKind::Unary { op } => self.unary(children.first().copied(), op),
            NodeKind::Cast { target } => Ok(cast(target)),
            NodeKind::Instanceof => Ok(single("bool")),
            NodeKind::Literal { kind } => Ok(single(kind.type_name())),
            NodeKind::ArrayLiteral => self.array_literal(children),
            NodeKind::ListDestructure => Ok(single("array")),
            NodeKind::ArrayAccess => {
                let Some(base) = children.first() else {
                    return Ok(TypeCollection::new());
                };
                let base_types = self.resolve(*base)?;
                let mut types = base_types.element_types();
                if base_types.contains("string") {
                    types.add(Type::named("string"));
                }
                Ok(types)
            }
            NodeKind::Clone => match children.first() {
                Some(operand) => self.resolve(*operand),
                None => Ok(TypeCollection::new()),
            },
            NodeKind::Match => {
                let arms: Vec<NodeId> = forest
                    .children_where(node, |k| matches!(k, NodeKind::MatchArm { .. }))
                    .collect();
                self.resolve_all(&arms)
            }
            NodeKind::MatchArm { .. } => match children.last() {
                Some(result) => self.resolve(*result),
                None => Ok(TypeCollection::new()),
            },

            // ----------------------------------------------------------------
            // Structure
            // ----------------------------------------------------------------
            NodeKind::File
            | NodeKind::Namespace { .. }
            | NodeKind::Use { .. }
            | NodeKind::Block
            | NodeKind::Return
            | NodeKind::ExpressionStatement
            | NodeKind::Foreach { .. }
            | NodeKind::Catch
            | NodeKind::DocComment { .. }
            | NodeKind::ControlFlow { .. }
            | NodeKind::TraitUse
            | NodeKind::Other { .. } => Ok(TypeCollection::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    /// Declared return type and `@return`, else the union of `return` values.
    fn return_type(&mut self, function: NodeId) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let mut types = TypeCollection::new();
        if let Some(hint) = forest.type_hint(function) {
            types.extend(&self.resolve(hint)?);
        }
        if let Some(doc) = forest.doc_comment(function) {
            let block = DocBlock::parse(doc);
            if let Some(ty) = block.return_type() {
                types.extend(&self.lower_doc(function, ty));
            }
        }
        if !types.is_empty() {
            return Ok(types);
        }

        let Some(body) = forest.body(function) else {
            return Ok(types);
        };
        let returns = return_statements(forest, body);
        if returns.is_empty() {
            return Ok(single("void"));
        }
        for ret in returns {
            match forest.first_child(ret) {
                Some(value) => types.extend(&self.resolve_unless_resolving(value)?),
                None => {
                    types.add(Type::named("void"));
                }
            }
        }
        // A cut recursive call must not hide the other returns.
        let known = types.known();
        if !known.is_empty() {
            types = known;
        }
        Ok(types)
    }

    fn resolve_parameter(
        &mut self,
        param: NodeId,
        name: &str,
        variadic: bool,
        promoted: bool,
    ) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let mut types = TypeCollection::new();
        if let Some(hint) = forest.type_hint(param) {
            types.extend(&self.resolve(hint)?);
        }
        let doc = forest.parent(param).and_then(|f| forest.doc_comment(f).map(|d| (f, d)));
        if let Some((function, doc)) = doc {
            let block = DocBlock::parse(doc);
            if let Some(ty) = block.param_type(name) {
                types.extend(&self.lower_doc(function, ty));
            }
        }
        if variadic {
            let mut wrapped: TypeCollection =
                types.known().iter().cloned().map(Type::array_of).collect();
            if wrapped.is_empty() {
                wrapped.add(Type::named("array"));
            }
            types = wrapped;
        }
        if let Some(default) = forest.default_value(param) {
            types.extend(&self.resolve(default)?);
        }
        if promoted {
            if let Some(class) = forest.enclosing_class(param) {
                self.collect_properties(class);
            }
            types.extend(&self.injected_types(param)?);
        }
        Ok(types)
    }

    fn resolve_name(&self, node: NodeId, text: &str, role: NameRole) -> TypeCollection {
        let forest = self.forest();
        match role {
            NameRole::Function => TypeCollection::new(),
            NameRole::Constant => match text.to_ascii_lowercase().as_str() {
                "true" | "false" => single("bool"),
                "null" => single("null"),
                _ => TypeCollection::new(),
            },
            _ => {
                if let Some(decl) = forest.node(node).declaration {
                    if let Some(fqn) = forest.node(decl).resolved_name.as_deref() {
                        return TypeCollection::singleton(Type::declared(fqn, decl));
                    }
                }
                match forest.name_of(node) {
                    Some(name) if !name.is_empty() => match self.index.declaration(name) {
                        Some(decl) => TypeCollection::singleton(Type::declared(name, decl)),
                        None => single(name),
                    },
                    _ => TypeCollection::new(),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Calls and constants
    // ------------------------------------------------------------------------

    /// Union of the return types of every receiver candidate defining `name`.
    fn resolve_call(
        &mut self,
        receiver: Option<NodeId>,
        name: &str,
    ) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let Some(receiver) = receiver else {
            return Ok(TypeCollection::new());
        };
        let candidates = self.resolve(receiver)?;
        let mut types = TypeCollection::new();
        let mut defined = false;
        for candidate in candidates.iter() {
            let Some(class) = self.class_node(candidate) else {
                continue;
            };
            let Some(method) = hierarchy::find_method(forest, class, name) else {
                tracing::info!(
                    class = candidate.name(),
                    method = name,
                    "method not found in candidate"
                );
                continue;
            };
            defined = true;
            // Recursive calls add nothing beyond the other returns.
            if self.is_resolving(method) {
                continue;
            }
            let returned = self.resolve(method)?;
            types.extend(&self.late_bind(method, returned, candidate));
        }
        if !defined && !candidates.is_unknown() {
            tracing::info!(
                method = name,
                receiver = %candidates,
                "no receiver candidate defines method"
            );
        }
        Ok(types)
    }

    /// Rebind `static` / `$this` returns of `method` to the receiver type.
    fn late_bind(
        &self,
        method: NodeId,
        returned: TypeCollection,
        receiver: &Type,
    ) -> TypeCollection {
        let forest = self.forest();
        let hinted = forest.type_hint(method).is_some_and(|hint| {
            forest
                .descendants(hint)
                .into_iter()
                .filter_map(|n| match forest.kind(n) {
                    NodeKind::Name { text, .. } => Some(text),
                    _ => None,
                })
                .any(|text| text.eq_ignore_ascii_case("static"))
        });
        let documented = forest.doc_comment(method).is_some_and(|doc| {
            DocBlock::parse(doc).return_type().is_some_and(|ty| {
                ty.alternatives().into_iter().any(|alt| {
                    let alt = match alt {
                        DocType::Nullable(inner) => inner.as_ref(),
                        other => other,
                    };
                    matches!(alt, DocType::Named(n) if n == "static" || n == "$this")
                })
            })
        });
        let declaring = forest.enclosing_class(method);
        if !(hinted || documented) || declaring.is_none() {
            return returned;
        }
        returned
            .iter()
            .map(|t| {
                if t.declaration() == declaring {
                    receiver.clone()
                } else {
                    t.clone()
                }
            })
            .collect()
    }

    fn function_call(&self, callee: Option<NodeId>) -> TypeCollection {
        let forest = self.forest();
        let Some(NodeKind::Name { text, .. }) = callee.map(|c| forest.kind(c)) else {
            return TypeCollection::new();
        };
        let short = text.rsplit('\\').next().unwrap_or(text);
        match short.to_ascii_lowercase().as_str() {
            "isset" | "empty" => single("bool"),
            _ => TypeCollection::new(),
        }
    }

    fn class_constant_fetch(
        &mut self,
        scope: Option<NodeId>,
        name: &str,
    ) -> Result<TypeCollection, ResolveError> {
        if name.eq_ignore_ascii_case("class") {
            return Ok(single("string"));
        }
        let forest = self.forest();
        let Some(scope) = scope else {
            return Ok(TypeCollection::new());
        };
        let classes = self.resolve(scope)?;
        let mut types = TypeCollection::new();
        for class in classes.iter().filter_map(|t| self.class_node(t)).collect::<Vec<_>>() {
            if let Some(constant) = hierarchy::find_constant(forest, class, name) {
                types.extend(&self.resolve(constant)?);
            }
        }
        Ok(types)
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    fn compound_assign(
        &mut self,
        children: &[NodeId],
        op: &str,
    ) -> Result<TypeCollection, ResolveError> {
        let (Some(target), Some(value)) = (children.first().copied(), children.get(1).copied())
        else {
            return Ok(TypeCollection::new());
        };
        match op {
            "??=" => {
                let mut types = self.resolve_unless_resolving(target)?.without_null();
                types.extend(&self.resolve(value)?);
                Ok(types)
            }
            ".=" => Ok(single("string")),
            "/=" => Ok(int_or_float()),
            "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => Ok(single("int")),
            "+=" | "-=" | "*=" | "**=" => {
                let left = self.resolve_unless_resolving(target)?;
                let right = self.resolve(value)?;
                Ok(arithmetic(op.trim_end_matches('='), &left, &right))
            }
            _ => self.resolve(value),
        }
    }

    fn binary(&mut self, children: &[NodeId], op: &str) -> Result<TypeCollection, ResolveError> {
        let op = op.to_ascii_lowercase();
        match op.as_str() {
            "==" | "!=" | "===" | "!==" | "<>" | "<" | ">" | "<=" | ">=" | "&&" | "||" | "and" | "or"
            | "xor" => Ok(single("bool")),
            "<=>" => Ok(single("int")),
            "." => Ok(single("string")),
            "/" => Ok(int_or_float()),
            "%" | "&" | "|" | "^" | "<<" | ">>" => Ok(single("int")),
            "+" | "-" | "*" | "**" => {
                let (Some(left), Some(right)) = (children.first(), children.get(1)) else {
                    return Ok(int_or_float());
                };
                let left = self.resolve(*left)?;
                let right = self.resolve(*right)?;
                Ok(arithmetic(&op, &left, &right))
            }
            _ => Ok(TypeCollection::new()),
        }
    }

    fn unary(&mut self, operand: Option<NodeId>, op: &str) -> Result<TypeCollection, ResolveError> {
        match op {
            "!" => return Ok(single("bool")),
            "~" => return Ok(single("int")),
            _ => {}
        }
        let Some(operand) = operand else {
            return Ok(TypeCollection::new());
        };
        let types = self.resolve(operand)?;
        match op {
            "-" | "+" | "++" | "--" => Ok(arithmetic("-", &types, &types)),
            _ => Ok(types),
        }
    }

    /// `array`, plus `T[]` for every class-typed element value.
    fn array_literal(&mut self, children: &[NodeId]) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let mut types = single("array");
        for child in children {
            if matches!(forest.kind(*child), NodeKind::Literal { .. }) {
                continue;
            }
            let element = self.resolve_unless_resolving(*child)?;
            for ty in element.known().iter().filter(|t| !t.is_native() && t.element().is_none()) {
                types.add(Type::array_of(ty.clone()));
            }
        }
        Ok(types)
    }
}

/// `return` statements of a body, excluding nested functions and classes.
fn return_statements(forest: &Forest, body: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        let kind = forest.kind(node);
        if node != body && (kind.is_class_like() || kind.is_function_like()) {
            continue;
        }
        if matches!(kind, NodeKind::Return) {
            out.push(node);
        }
        stack.extend(forest.children(node).iter().rev().copied());
    }
    out
}

/// Result of `+ - * **` over two operand collections.
fn arithmetic(op: &str, left: &TypeCollection, right: &TypeCollection) -> TypeCollection {
    if op == "+" && left.contains("array") && right.contains("array") {
        return single("array");
    }
    let only_int = |t: &TypeCollection| !t.is_empty() && t.iter().all(|t| t.name() == "int");
    let numeric =
        |t: &TypeCollection| !t.is_empty() && t.iter().all(|t| matches!(t.name(), "int" | "float"));
    if only_int(left) && only_int(right) {
        single("int")
    } else if numeric(left) && numeric(right) {
        single("float")
    } else {
        int_or_float()
    }
}

fn cast(target: &str) -> TypeCollection {
    match target {
        "binary" => single("string"),
        "unset" => single("null"),
        other => match native_type_name(other) {
            Some(native) => single(native),
            None => TypeCollection::new(),
        },
    }
}
