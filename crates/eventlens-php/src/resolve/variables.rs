//! Variable typing: scope sweeps and the variable strategy.
//!
//! A scope is swept at most once, on the first read that needs it. The sweep
//! walks the scope body in evaluation order with an explicit work stack:
//! values are visited before the assignment that binds them, so every read
//! sees the bindings made before it. Nested class-likes, methods and
//! functions are separate scopes and are skipped; closures contribute only
//! their `use` variables (read in the outer scope); arrow functions share
//! the outer scope, with their parameters bound for the body only.

use eventlens_core::types::{NodeId, Type, TypeCollection};
use eventlens_php_ast::{DocBlock, DocTagKind, NodeKind};

use super::{ResolveError, TypeResolver};

/// Where the types bound by a [`Step::Bind`] come from.
enum Source {
    /// Resolve this node.
    Node(NodeId),
    /// Element types of this node's resolution.
    ElementsOf(NodeId),
    /// Already computed.
    Types(TypeCollection),
}

enum Step {
    Visit(NodeId),
    Bind { target: NodeId, source: Source },
    /// Restore bindings shadowed by arrow-function parameters.
    Restore(Vec<(String, Option<TypeCollection>)>),
}

impl TypeResolver<'_> {
    // ------------------------------------------------------------------------
    // Variable strategy
    // ------------------------------------------------------------------------

    pub(super) fn resolve_variable(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        if name == "this" {
            return Ok(self.this_type(node).into_iter().collect());
        }
        let Some(parent) = forest.parent(node) else {
            return Ok(TypeCollection::new());
        };
        let children = forest.children(parent);
        match forest.kind(parent) {
            NodeKind::Assign { .. } if children.first() == Some(&node) => {
                match children.get(1) {
                    Some(value) => self.resolve_unless_resolving(*value),
                    None => Ok(TypeCollection::new()),
                }
            }
            NodeKind::Foreach { has_key } if children.first() != Some(&node) => {
                let Some(source) = children.first().copied() else {
                    return Ok(TypeCollection::new());
                };
                let source_types = self.resolve_unless_resolving(source)?;
                if *has_key && children.get(1) == Some(&node) {
                    let keys = source_types.key_types();
                    if keys.is_empty() {
                        let keys = [Type::named("int"), Type::named("string")];
                        return Ok(keys.into_iter().collect());
                    }
                    return Ok(keys);
                }
                Ok(source_types.element_types())
            }
            NodeKind::Catch => {
                let caught: Vec<NodeId> = forest
                    .children_where(parent, |k| matches!(k, NodeKind::Name { .. }))
                    .collect();
                self.resolve_all(&caught)
            }
            NodeKind::ListDestructure | NodeKind::ArrayLiteral => match self.destructured(parent)? {
                Some(types) => Ok(types),
                None => self.read_variable(node, name),
            },
            _ => self.read_variable(node, name),
        }
    }

    fn this_type(&self, node: NodeId) -> Option<Type> {
        let forest = self.forest();
        match forest.node(node).declaration {
            Some(class) => forest
                .node(class)
                .resolved_name
                .as_deref()
                .map(|fqn| Type::declared(fqn, class)),
            None => self.enclosing_class_type(node),
        }
    }

    /// Element types flowing into the variables of a destructuring target,
    /// or `None` if `target` is not in a target position.
    fn destructured(&mut self, target: NodeId) -> Result<Option<TypeCollection>, ResolveError> {
        let forest = self.forest();
        let Some(parent) = forest.parent(target) else {
            return Ok(None);
        };
        let children = forest.children(parent);
        match forest.kind(parent) {
            NodeKind::Assign { .. } if children.first() == Some(&target) => match children.get(1) {
                Some(value) => Ok(Some(self.resolve_unless_resolving(*value)?.element_types())),
                None => Ok(Some(TypeCollection::new())),
            },
            NodeKind::Foreach { .. } if children.first() != Some(&target) => {
                let Some(source) = children.first().copied() else {
                    return Ok(None);
                };
                let source_types = self.resolve_unless_resolving(source)?;
                Ok(Some(source_types.element_types().element_types()))
            }
            NodeKind::ListDestructure | NodeKind::ArrayLiteral => Ok(self
                .destructured(parent)?
                .map(|outer| outer.element_types())),
            _ => Ok(None),
        }
    }

    /// Type of a variable read: the state of its scope's buffer at the read.
    fn read_variable(&mut self, node: NodeId, name: &str) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        // Closure `use` variables are read where the closure is created.
        let scope = match forest.parent(node) {
            Some(closure) if matches!(forest.kind(closure), NodeKind::Closure { .. }) => {
                forest.variable_scope(closure)
            }
            _ => forest.variable_scope(node),
        };
        let Some(scope) = scope else {
            return Ok(TypeCollection::new());
        };
        // The sweep of this scope has not reached the read yet: answer with
        // the bindings so far, without memoizing.
        if let Some((buffer, depth)) = self.scopes.find(scope) {
            let types = buffer.get(name).cloned().unwrap_or_default();
            self.unsettle_from(depth);
            return Ok(types);
        }
        self.sweep(scope)?;
        Ok(self.memo.get(&node).cloned().unwrap_or_default())
    }

    // ------------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------------

    /// Sweep `scope` once, memoizing every variable read in it.
    pub(super) fn sweep(&mut self, scope: NodeId) -> Result<(), ResolveError> {
        if self.swept.contains(&scope) || self.scopes.contains(scope) {
            return Ok(());
        }
        tracing::trace!(scope = %self.forest().kind(scope), "sweeping scope");
        self.scopes.enter(scope, self.stack.len());
        let result = self.sweep_scope(scope);
        self.scopes.leave();
        if result.is_ok() {
            self.swept.insert(scope);
        }
        result
    }

    fn sweep_scope(&mut self, scope: NodeId) -> Result<(), ResolveError> {
        let forest = self.forest();
        let mut work: Vec<Step> = Vec::new();
        match forest.kind(scope) {
            NodeKind::File => {
                work.extend(forest.children(scope).iter().rev().map(|c| Step::Visit(*c)));
            }
            _ => {
                if let Some(body) = forest.body(scope) {
                    work.push(Step::Visit(body));
                }
                let use_vars: Vec<NodeId> = match forest.kind(scope) {
                    NodeKind::Closure { .. } => forest
                        .children_where(scope, |k| matches!(k, NodeKind::Variable { .. }))
                        .collect(),
                    _ => Vec::new(),
                };
                for var in use_vars.into_iter().rev() {
                    work.push(Step::Bind {
                        target: var,
                        source: Source::Node(var),
                    });
                }
                for param in forest.parameters(scope).into_iter().rev() {
                    work.push(Step::Bind {
                        target: param,
                        source: Source::Node(param),
                    });
                }
            }
        }

        while let Some(step) = work.pop() {
            match step {
                Step::Visit(node) => self.visit(node, &mut work)?,
                Step::Bind { target, source } => {
                    let types = match source {
                        Source::Node(n) if self.is_resolving(n) => continue,
                        Source::Node(n) => self.resolve(n)?,
                        Source::ElementsOf(n) => self.resolve_unless_resolving(n)?.element_types(),
                        Source::Types(types) => types,
                    };
                    self.bind(target, types);
                }
                Step::Restore(saved) => {
                    if let Some(buffer) = self.scopes.current_mut() {
                        for (name, previous) in saved {
                            match previous {
                                Some(types) => buffer.bind(&name, types),
                                None => {
                                    buffer.unbind(&name);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Schedule the work for one node.
    fn visit(&mut self, node: NodeId, work: &mut Vec<Step>) -> Result<(), ResolveError> {
        let forest = self.forest();
        let children = forest.children(node);
        match forest.kind(node) {
            NodeKind::Class { .. }
            | NodeKind::Interface { .. }
            | NodeKind::Trait { .. }
            | NodeKind::Method { .. }
            | NodeKind::Function { .. } => {}
            NodeKind::Variable { name } => {
                if name != "this" {
                    let types = self
                        .scopes
                        .current()
                        .and_then(|b| b.get(name).cloned())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| TypeCollection::unknown("Variable"));
                    self.memo.entry(node).or_insert(types);
                }
            }
            NodeKind::Assign { .. } => {
                let (Some(target), Some(value)) =
                    (children.first().copied(), children.get(1).copied())
                else {
                    work.extend(children.iter().rev().map(|c| Step::Visit(*c)));
                    return Ok(());
                };
                let pending = match forest.kind(target) {
                    NodeKind::Variable { .. } => {
                        self.scopes.current_mut().and_then(|b| b.take_pending())
                    }
                    _ => None,
                };
                let source = match pending {
                    Some(types) => Source::Types(types),
                    None => Source::Node(value),
                };
                match forest.kind(target) {
                    NodeKind::Variable { .. }
                    | NodeKind::ListDestructure
                    | NodeKind::ArrayLiteral => {
                        work.push(Step::Bind { target, source });
                    }
                    NodeKind::ArrayAccess => {
                        work.push(Step::Bind { target, source });
                        work.extend(forest.children(target).iter().rev().map(|c| Step::Visit(*c)));
                    }
                    // Property writes go through the property buffers.
                    _ => work.extend(forest.children(target).iter().rev().map(|c| Step::Visit(*c))),
                }
                work.push(Step::Visit(value));
            }
            NodeKind::CompoundAssign { .. } => {
                if let Some(target) = children.first().copied() {
                    work.push(Step::Bind {
                        target,
                        source: Source::Node(node),
                    });
                }
                work.extend(children.iter().rev().map(|c| Step::Visit(*c)));
            }
            NodeKind::Foreach { has_key } => {
                let Some(source) = children.first().copied() else {
                    return Ok(());
                };
                let value_at = if *has_key { 2 } else { 1 };
                if let Some(body) = children.get(value_at + 1) {
                    work.push(Step::Visit(*body));
                }
                if let Some(value) = children.get(value_at).copied() {
                    let source = match forest.kind(value) {
                        NodeKind::ListDestructure | NodeKind::ArrayLiteral => {
                            Source::ElementsOf(source)
                        }
                        _ => Source::Node(value),
                    };
                    work.push(Step::Bind { target: value, source });
                }
                if *has_key {
                    if let Some(key) = children.get(1).copied() {
                        work.push(Step::Bind {
                            target: key,
                            source: Source::Node(key),
                        });
                    }
                }
                work.push(Step::Visit(source));
            }
            NodeKind::Catch => {
                for child in children.iter().rev() {
                    match forest.kind(*child) {
                        NodeKind::Variable { .. } => work.push(Step::Bind {
                            target: *child,
                            source: Source::Node(*child),
                        }),
                        NodeKind::Name { .. } => {}
                        _ => work.push(Step::Visit(*child)),
                    }
                }
            }
            NodeKind::StaticVariable { .. } => {
                work.push(Step::Bind {
                    target: node,
                    source: Source::Node(node),
                });
                work.extend(children.iter().rev().map(|c| Step::Visit(*c)));
            }
            NodeKind::Closure { .. } => {
                let use_vars: Vec<NodeId> = forest
                    .children_where(node, |k| matches!(k, NodeKind::Variable { .. }))
                    .collect();
                work.extend(use_vars.into_iter().rev().map(Step::Visit));
            }
            NodeKind::ArrowFunction => {
                let params = forest.parameters(node);
                let saved: Vec<(String, Option<TypeCollection>)> = params
                    .iter()
                    .filter_map(|p| forest.kind(*p).name())
                    .map(|name| {
                        let previous = self.scopes.current().and_then(|b| b.binding(name).cloned());
                        (name.to_string(), previous)
                    })
                    .collect();
                work.push(Step::Restore(saved));
                if let Some(body) = forest.body(node) {
                    work.push(Step::Visit(body));
                }
                for param in params.into_iter().rev() {
                    work.push(Step::Bind {
                        target: param,
                        source: Source::Node(param),
                    });
                }
            }
            NodeKind::DocComment { text } => self.annotate(node, text),
            _ => work.extend(children.iter().rev().map(|c| Step::Visit(*c))),
        }
        Ok(())
    }

    /// Apply an inline doc comment to the current buffer.
    fn annotate(&mut self, node: NodeId, text: &str) {
        let block = DocBlock::parse(text);
        let named: Vec<(String, TypeCollection)> = block
            .named_vars()
            .map(|(name, ty)| (name.to_string(), self.lower_doc(node, ty)))
            .collect();
        let unnamed = block
            .tags
            .iter()
            .find(|t| t.kind == DocTagKind::Var && t.variable.is_none())
            .map(|t| self.lower_doc(node, &t.ty));
        let Some(buffer) = self.scopes.current_mut() else {
            return;
        };
        for (name, types) in named {
            buffer.annotate(&name, types);
        }
        if let Some(types) = unnamed {
            buffer.set_pending(types);
        }
    }

    /// Write `types` into the buffer for an assignment target.
    fn bind(&mut self, target: NodeId, types: TypeCollection) {
        let forest = self.forest();
        match forest.kind(target) {
            NodeKind::Variable { name }
            | NodeKind::Parameter { name, .. }
            | NodeKind::StaticVariable { name } => {
                if name == "this" {
                    return;
                }
                if let Some(buffer) = self.scopes.current_mut() {
                    buffer.bind(name, types);
                }
            }
            NodeKind::ArrayAccess => {
                // `$list[] = value` appends; keyed writes leave the variable alone.
                let children = forest.children(target);
                let (Some(base), None) = (children.first(), children.get(1)) else {
                    return;
                };
                let NodeKind::Variable { name } = forest.kind(*base) else {
                    return;
                };
                let Some(buffer) = self.scopes.current_mut() else {
                    return;
                };
                let mut appended: TypeCollection = types
                    .iter()
                    .filter(|t| !t.is_unknown())
                    .cloned()
                    .map(Type::array_of)
                    .collect();
                if appended.is_empty() {
                    appended.add(Type::named("array"));
                }
                if let Some(existing) = buffer.binding(name) {
                    appended.extend(&existing.known());
                }
                buffer.bind(name, appended);
            }
            NodeKind::ListDestructure | NodeKind::ArrayLiteral => {
                let elements = types.element_types();
                for child in forest.children(target) {
                    match forest.kind(*child) {
                        NodeKind::Variable { .. } => self.bind(*child, elements.clone()),
                        NodeKind::ListDestructure | NodeKind::ArrayLiteral => {
                            self.bind(*child, elements.clone())
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn resolve_last_read(source: &str, method: &str, variable: &str) -> Vec<String> {
        let index = index(&[("src/Subject.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let method = self::method(&index, "App\\Subject", method);
        let reads = variables(&index, method, variable);
        let last = *reads.last().unwrap();
        names(&resolver.resolve(last).unwrap())
    }

    #[test]
    fn last_assignment_wins() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        $x = 1;
        $x = 'text';
        return $x;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "x"), vec!["string"]);
    }

    #[test]
    fn reads_see_bindings_made_before_them() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        $x = new Subject();
        $y = $x;
        $x = 1;
        return $y;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "y"), vec!["App\\Subject"]);
    }

    #[test]
    fn parameters_seed_the_buffer() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run(Subject $s, int ...$counts) {
        return [$s, $counts];
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "s"), vec!["App\\Subject"]);
        assert_eq!(resolve_last_read(source, "run", "counts"), vec!["int[]"]);
    }

    #[test]
    fn scopes_do_not_leak_between_methods() {
        let source = r#"<?php
namespace App;
class Subject {
    public function first() {
        $x = new Subject();
        return $x;
    }
    public function second() {
        return $x;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "first", "x"), vec!["App\\Subject"]);
        let second = resolve_last_read(source, "second", "x");
        assert_eq!(second, vec!["unknown<Variable>"]);
    }

    #[test]
    fn foreach_binds_element_and_key_types() {
        let source = r#"<?php
namespace App;
class Subject {
    /** @param array<string, Subject> $items */
    public function run(array $items) {
        foreach ($items as $key => $item) {
            $k = $key;
            $i = $item;
        }
        return [$k, $i];
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "i"), vec!["App\\Subject"]);
        assert_eq!(resolve_last_read(source, "run", "k"), vec!["string"]);
    }

    #[test]
    fn foreach_without_declared_key_uses_int_or_string() {
        let source = r#"<?php
namespace App;
class Subject {
    /** @var Subject[] */
    private array $items = [];
    public function run() {
        foreach ($this->items as $key => $item) {
            return $key;
        }
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "key"), vec!["int", "string"]);
    }

    #[test]
    fn appends_build_element_types() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        $list = [];
        $list[] = new Subject();
        foreach ($list as $entry) {
            return $entry;
        }
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "entry"), vec!["App\\Subject"]);
    }

    #[test]
    fn inline_var_annotations_override_inference() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run($factory) {
        /** @var Subject $made */
        $made = $factory->make();
        /** @var Subject */
        $other = $factory->make();
        return [$made, $other];
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "made"), vec!["App\\Subject"]);
        assert_eq!(resolve_last_read(source, "run", "other"), vec!["App\\Subject"]);
    }

    #[test]
    fn catch_variables_take_caught_types() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        try {
            return 1;
        } catch (\InvalidArgumentException | \RuntimeException $e) {
            return $e;
        }
    }
}
"#;
        assert_eq!(
            resolve_last_read(source, "run", "e"),
            vec!["InvalidArgumentException", "RuntimeException"]
        );
    }

    #[test]
    fn closures_capture_outer_values_and_arrow_functions_share_scope() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        $subject = new Subject();
        $f = function () use ($subject) {
            return $subject;
        };
        $g = fn (int $n) => $subject;
        return $g;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "subject"), vec!["App\\Subject"]);
        assert_eq!(resolve_last_read(source, "run", "g"), vec!["Closure"]);
    }

    #[test]
    fn destructuring_binds_element_types() {
        let source = r#"<?php
namespace App;
class Subject {
    /** @return Subject[] */
    public function pair(): array { return []; }
    public function run() {
        [$a, $b] = $this->pair();
        return $b;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "b"), vec!["App\\Subject"]);
    }

    #[test]
    fn this_is_the_enclosing_class() {
        let source = r#"<?php
namespace App;
class Subject {
    public function run() {
        return $this;
    }
}
"#;
        assert_eq!(resolve_last_read(source, "run", "this"), vec!["App\\Subject"]);
    }
}
