//! Property typing in two phases.
//!
//! Phase 1 scans every method of a class-like for writes to `$this->p`,
//! `$this->p[]` and `self::$p` / `static::$p`, accumulating them per name in
//! a [`PropertyBuffer`]. Phase 2 hands each declared property its writes;
//! writes to undeclared properties stay with the class as dynamic sites.
//! A property declaration only resolves after both phases ran for its class.

use eventlens_core::types::{NodeId, Type, TypeCollection};
use eventlens_php_ast::{DocBlock, Forest, NodeKind};

use super::buffers::{PropertyBuffer, PropertySite};
use super::{ResolveError, TypeResolver};
use crate::hierarchy;

impl TypeResolver<'_> {
    // ------------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------------

    /// Run both phases for `class` once.
    pub(super) fn collect_properties(&mut self, class: NodeId) {
        if !self.collected.insert(class) {
            return;
        }
        let forest = self.forest();
        let mut buffer = PropertyBuffer::new();
        let methods = forest
            .members(class)
            .filter(|m| matches!(forest.kind(*m), NodeKind::Method { .. }));
        for method in methods {
            scan_writes(forest, method, &mut buffer);
        }

        for decl in hierarchy::own_properties(forest, class) {
            let Some(name) = forest.kind(decl).name() else {
                continue;
            };
            let sites = buffer.take(name);
            if !sites.is_empty() {
                self.injected.entry(decl).or_default().extend(sites);
            }
        }
        if !buffer.is_empty() {
            tracing::trace!(
                class = forest.node(class).resolved_name.as_deref().unwrap_or(""),
                dynamic = ?buffer.names().collect::<Vec<_>>(),
                "undeclared property writes"
            );
            self.dynamic.insert(class, buffer);
        }
    }

    fn resolve_site(&mut self, site: PropertySite) -> Result<TypeCollection, ResolveError> {
        match site {
            PropertySite::Assigned(value) | PropertySite::Compound(value) => {
                self.resolve_unless_resolving(value)
            }
            PropertySite::Appended(value) => {
                let elements = self.resolve_unless_resolving(value)?.known();
                if elements.is_empty() {
                    return Ok(TypeCollection::singleton(Type::named("array")));
                }
                Ok(elements.iter().cloned().map(Type::array_of).collect())
            }
        }
    }

    /// Known types of the writes injected into a declaration.
    pub(super) fn injected_types(&mut self, decl: NodeId) -> Result<TypeCollection, ResolveError> {
        let sites = self.injected.get(&decl).cloned().unwrap_or_default();
        let mut types = TypeCollection::new();
        for site in sites {
            types.extend(&self.resolve_site(site)?.known());
        }
        Ok(types)
    }

    // ------------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------------

    /// Declared type ∪ `@var` ∪ default ∪ injected writes.
    pub(super) fn resolve_property(
        &mut self,
        decl: NodeId,
        name: &str,
    ) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        if let Some(class) = forest.parent(decl) {
            self.collect_properties(class);
        }
        let mut types = TypeCollection::new();
        if let Some(hint) = forest.type_hint(decl) {
            types.extend(&self.resolve(hint)?);
        }
        if let Some(doc) = forest.doc_comment(decl) {
            let block = DocBlock::parse(doc);
            if let Some(ty) = block.var_type(Some(name)) {
                types.extend(&self.lower_doc(decl, ty));
            }
        }
        if let Some(default) = forest.default_value(decl) {
            types.extend(&self.resolve(default)?);
        }
        types.extend(&self.injected_types(decl)?);
        Ok(types)
    }

    /// Property reads resolve through the sibling collection of each
    /// receiver class; assignment targets take the assigned value.
    pub(super) fn resolve_property_fetch(
        &mut self,
        fetch: NodeId,
        name: &str,
    ) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        if let Some(parent) = forest.parent(fetch) {
            let children = forest.children(parent);
            if matches!(forest.kind(parent), NodeKind::Assign { .. })
                && children.first() == Some(&fetch)
            {
                return match children.get(1) {
                    Some(value) => self.resolve_unless_resolving(*value),
                    None => Ok(TypeCollection::new()),
                };
            }
        }
        let Some(receiver) = forest.first_child(fetch) else {
            return Ok(TypeCollection::new());
        };
        let receivers = self.resolve(receiver)?;
        let classes: Vec<NodeId> = receivers.iter().filter_map(|t| self.class_node(t)).collect();
        let mut types = TypeCollection::new();
        for class in classes {
            types.extend(&self.sibling(class, name)?);
        }
        Ok(types)
    }

    /// Union over the parent chain, used traits and the class itself of the
    /// declarations named `name` and the undeclared writes to it.
    ///
    /// Declarations being resolved are left out, so a property never lists
    /// itself.
    fn sibling(&mut self, class: NodeId, name: &str) -> Result<TypeCollection, ResolveError> {
        let forest = self.forest();
        let mut types = TypeCollection::new();
        for owner in hierarchy::property_order(forest, class) {
            self.collect_properties(owner);
            for decl in hierarchy::own_property_declarations(forest, owner, name) {
                if self.is_resolving(decl) {
                    continue;
                }
                types.extend(&self.resolve(decl)?.known());
            }
            let sites: Vec<PropertySite> = self
                .dynamic
                .get(&owner)
                .map(|buffer| buffer.sites(name).to_vec())
                .unwrap_or_default();
            for site in sites {
                types.extend(&self.resolve_site(site)?.known());
            }
        }
        Ok(types)
    }
}

/// Record the property writes made inside `method`, skipping nested
/// class-likes (their `$this` is another object).
fn scan_writes(forest: &Forest, method: NodeId, buffer: &mut PropertyBuffer) {
    let mut stack: Vec<NodeId> = forest.children(method).to_vec();
    while let Some(node) = stack.pop() {
        let kind = forest.kind(node);
        if kind.is_class_like() {
            continue;
        }
        let children = forest.children(node);
        match (kind, children.first(), children.get(1)) {
            (NodeKind::Assign { .. }, Some(target), Some(value)) => {
                match written_property(forest, *target) {
                    Some((name, false)) => buffer.add(name, PropertySite::Assigned(*value)),
                    Some((name, true)) => buffer.add(name, PropertySite::Appended(*value)),
                    None => {}
                }
            }
            (NodeKind::CompoundAssign { .. }, Some(target), _) => {
                if let Some((name, _)) = written_property(forest, *target) {
                    buffer.add(name, PropertySite::Compound(node));
                }
            }
            _ => {}
        }
        stack.extend(children.iter().copied());
    }
}

/// Property written by an assignment target, and whether the write appends
/// to it (`$this->p[] = v`, `$this->p[$k] = v`).
fn written_property(forest: &Forest, target: NodeId) -> Option<(&str, bool)> {
    match forest.kind(target) {
        NodeKind::PropertyFetch { name, .. } => {
            let receiver = forest.first_child(target)?;
            matches!(forest.kind(receiver), NodeKind::Variable { name: var } if var == "this")
                .then_some((name.as_str(), false))
        }
        NodeKind::StaticPropertyFetch { name } => {
            let scope = forest.first_child(target)?;
            matches!(
                forest.kind(scope),
                NodeKind::Name { text, .. }
                    if text.eq_ignore_ascii_case("self") || text.eq_ignore_ascii_case("static")
            )
            .then_some((name.as_str(), false))
        }
        NodeKind::ArrayAccess => {
            let base = forest.first_child(target)?;
            match written_property(forest, base)? {
                (name, false) => Some((name, true)),
                (_, true) => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn property_named(index: &crate::index::UnitIndex, fqn: &str, name: &str) -> NodeId {
        let forest = index.forest();
        let unit = index.get(fqn).unwrap();
        hierarchy::own_property_declarations(forest, unit.node, name)[0]
    }

    fn fetches(index: &crate::index::UnitIndex, within: NodeId, name: &str) -> Vec<NodeId> {
        let forest = index.forest();
        forest
            .descendants(within)
            .into_iter()
            .filter(|id| matches!(forest.kind(*id), NodeKind::PropertyFetch { name: n, .. } if n == name))
            .collect()
    }

    #[test]
    fn documented_alternatives_resolve_through_imports() {
        let source = r#"<?php
namespace App;

use Vendor\Mail\Foo;
use Vendor\Mail\Bar;

class Notifier
{
    /** @var Foo|Bar */
    private $transport;
}
"#;
        let index = index(&[("src/Notifier.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let property = property_named(&index, "App\\Notifier", "transport");
        let types = resolver.resolve(property).unwrap();
        assert_eq!(names(&types), vec!["Vendor\\Mail\\Bar", "Vendor\\Mail\\Foo"]);
    }

    #[test]
    fn unimported_doc_names_fall_back_to_the_namespace() {
        let source = r#"<?php
namespace App;
class Holder
{
    /** @var Missing */
    private $thing;
}
"#;
        let index = index(&[("src/Holder.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let property = property_named(&index, "App\\Holder", "thing");
        assert_eq!(names(&resolver.resolve(property).unwrap()), vec!["App\\Missing"]);
    }

    #[test]
    fn property_types_do_not_depend_on_query_order() {
        let source = r#"<?php
namespace App;
class S
{
    public function run()
    {
        $a = $this->get();
        $b = new S();
        $this->p = $b;
        return $a;
    }

    public function get()
    {
        return $this->p;
    }
}
"#;
        let index = index(&[("src/S.php", source)]);
        let run = method(&index, "App\\S", "run");
        let get = method(&index, "App\\S", "get");

        let mut fresh = TypeResolver::new(&index);
        assert_eq!(names(&fresh.resolve(get).unwrap()), vec!["App\\S"]);

        let mut resolver = TypeResolver::new(&index);
        resolver.resolve(run).unwrap();
        assert_eq!(names(&resolver.resolve(get).unwrap()), vec!["App\\S"]);
        let written = variables(&index, run, "b")[1];
        assert_eq!(names(&resolver.resolve(written).unwrap()), vec!["App\\S"]);
    }

    #[test]
    fn writes_anywhere_in_the_class_reach_the_declaration() {
        let source = r#"<?php
namespace App;
class Cart
{
    private $owner;
    private $items = [];

    public function owner()
    {
        return $this->owner;
    }

    public function add(Item $item)
    {
        $this->items[] = $item;
    }

    public function claim()
    {
        $this->owner = new Cart();
    }
}
"#;
        let item = "<?php\nnamespace App;\nclass Item {}\n";
        let index = index(&[("src/Cart.php", source), ("src/Item.php", item)]);
        let mut resolver = TypeResolver::new(&index);
        let owner = method(&index, "App\\Cart", "owner");
        assert_eq!(names(&resolver.resolve(owner).unwrap()), vec!["App\\Cart"]);

        let items = property_named(&index, "App\\Cart", "items");
        assert_eq!(names(&resolver.resolve(items).unwrap()), vec!["App\\Item[]", "array"]);
    }

    #[test]
    fn mutually_assigned_properties_terminate_without_self_reference() {
        let source = r#"<?php
namespace App;
class Loop
{
    private $a;
    private $b;

    public function swap()
    {
        $this->a = $this->b;
        $this->b = $this->a;
        $this->a = new Loop();
        $this->a = $this->a;
    }
}
"#;
        let index = index(&[("src/Loop.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let a = property_named(&index, "App\\Loop", "a");
        let types = resolver.resolve(a).unwrap();
        assert!(types.contains("App\\Loop"));
        assert!(types.iter().all(|t| !t.is_unknown()));
    }

    #[test]
    fn inherited_and_trait_declarations_add_up() {
        let sources = [
            (
                "src/Base.php",
                "<?php\nnamespace App;\nclass Base {\n    /** @var A */\n    protected $item;\n    public function read() { return $this->item; }\n}\n",
            ),
            (
                "src/Holds.php",
                "<?php\nnamespace App;\ntrait Holds {\n    /** @var B */\n    protected $item;\n}\n",
            ),
            (
                "src/Child.php",
                "<?php\nnamespace App;\nclass Child extends Base {\n    use Holds;\n    /** @var C */\n    protected $item;\n    public function get() { return $this->item; }\n}\n",
            ),
            ("src/A.php", "<?php\nnamespace App;\nclass A {}\n"),
            ("src/B.php", "<?php\nnamespace App;\nclass B {}\n"),
            ("src/C.php", "<?php\nnamespace App;\nclass C {}\n"),
        ];
        let index = index(&sources);
        let mut resolver = TypeResolver::new(&index);
        let get = method(&index, "App\\Child", "get");
        assert_eq!(names(&resolver.resolve(get).unwrap()), vec!["App\\A", "App\\B", "App\\C"]);
        let read = method(&index, "App\\Base", "read");
        assert_eq!(names(&resolver.resolve(read).unwrap()), vec!["App\\A"]);
    }

    #[test]
    fn undeclared_properties_use_their_writes() {
        let source = r#"<?php
namespace App;
class Lazy
{
    public function boot()
    {
        $this->cache = new Lazy();
    }

    public function cache()
    {
        return $this->cache;
    }
}
"#;
        let index = index(&[("src/Lazy.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let method = method(&index, "App\\Lazy", "cache");
        let read = *fetches(&index, method, "cache").last().unwrap();
        assert_eq!(names(&resolver.resolve(read).unwrap()), vec!["App\\Lazy"]);
    }

    #[test]
    fn promoted_parameters_are_properties() {
        let source = r#"<?php
namespace App;
class Service
{
    public function __construct(private Service $next) {}

    public function next()
    {
        return $this->next;
    }
}
"#;
        let index = index(&[("src/Service.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let next = method(&index, "App\\Service", "next");
        assert_eq!(names(&resolver.resolve(next).unwrap()), vec!["App\\Service"]);
    }

    #[test]
    fn static_properties_resolve_through_self() {
        let source = r#"<?php
namespace App;
class Registry
{
    private static $instance;

    public static function boot()
    {
        self::$instance = new Registry();
        return self::$instance;
    }
}
"#;
        let index = index(&[("src/Registry.php", source)]);
        let mut resolver = TypeResolver::new(&index);
        let boot = method(&index, "App\\Registry", "boot");
        assert_eq!(names(&resolver.resolve(boot).unwrap()), vec!["App\\Registry"]);
    }
}
