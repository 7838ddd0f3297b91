//! Resolution buffers: scope-lived variable and property tables.
//!
//! A [`VariableBuffer`] lives while one variable scope (method, function,
//! closure or file) is being swept. Bindings follow "last assignment wins";
//! inline `@var` annotations take precedence over inferred bindings for the
//! rest of the scope.
//!
//! A [`PropertyBuffer`] lives while the methods of one class-like are scanned
//! for `$this->p` / `self::$p` assignments. Its entries are handed to the
//! property declarations afterwards.

use std::collections::{BTreeMap, HashMap};

use eventlens_core::types::{NodeId, TypeCollection};

// ============================================================================
// Variable Buffer
// ============================================================================

/// Variable types of one scope, in the state reached by the sweep so far.
#[derive(Debug, Clone)]
pub struct VariableBuffer {
    scope: NodeId,
    bindings: HashMap<String, TypeCollection>,
    /// Inline `@var` annotations (take precedence over bindings).
    annotations: HashMap<String, TypeCollection>,
    /// Unnamed `@var` waiting for the next variable assignment.
    pending: Option<TypeCollection>,
}

impl VariableBuffer {
    /// Create an empty buffer for `scope`.
    pub fn new(scope: NodeId) -> Self {
        VariableBuffer {
            scope,
            bindings: HashMap::new(),
            annotations: HashMap::new(),
            pending: None,
        }
    }

    /// The scope node this buffer belongs to.
    pub fn scope(&self) -> NodeId {
        self.scope
    }

    /// Bind `name` to `types`, replacing the previous binding.
    pub fn bind(&mut self, name: &str, types: TypeCollection) {
        self.bindings.insert(name.to_string(), types);
    }

    /// Pin `name` to an annotated type for the rest of the scope.
    pub fn annotate(&mut self, name: &str, types: TypeCollection) {
        self.annotations.insert(name.to_string(), types);
    }

    /// Current type of `name`.
    pub fn get(&self, name: &str) -> Option<&TypeCollection> {
        self.annotations
            .get(name)
            .or_else(|| self.bindings.get(name))
    }

    /// Current binding of `name`, ignoring annotations.
    pub fn binding(&self, name: &str) -> Option<&TypeCollection> {
        self.bindings.get(name)
    }

    /// Remove the binding of `name`, returning it.
    pub fn unbind(&mut self, name: &str) -> Option<TypeCollection> {
        self.bindings.remove(name)
    }

    pub fn set_pending(&mut self, types: TypeCollection) {
        self.pending = Some(types);
    }

    pub fn take_pending(&mut self) -> Option<TypeCollection> {
        self.pending.take()
    }
}

// ============================================================================
// Scope Stack
// ============================================================================

/// Stack of variable buffers for the scopes currently being swept.
///
/// Sweeps nest when resolving a value in one scope needs the return type of
/// a method in another; every `enter` is matched by a `leave`. Each buffer
/// remembers the resolution stack depth its sweep started at.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<(VariableBuffer, usize)>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh buffer for `scope`, swept from resolution depth `depth`.
    pub fn enter(&mut self, scope: NodeId, depth: usize) {
        self.frames.push((VariableBuffer::new(scope), depth));
    }

    /// Close the innermost buffer, discarding its contents.
    pub fn leave(&mut self) -> Option<VariableBuffer> {
        self.frames.pop().map(|(buffer, _)| buffer)
    }

    /// Innermost buffer.
    pub fn current(&self) -> Option<&VariableBuffer> {
        self.frames.last().map(|(buffer, _)| buffer)
    }

    /// Innermost buffer, mutably.
    pub fn current_mut(&mut self) -> Option<&mut VariableBuffer> {
        self.frames.last_mut().map(|(buffer, _)| buffer)
    }

    /// Buffer of `scope` and the depth its sweep started at, if that scope
    /// is being swept.
    pub fn find(&self, scope: NodeId) -> Option<(&VariableBuffer, usize)> {
        self.frames
            .iter()
            .rev()
            .find(|(buffer, _)| buffer.scope() == scope)
            .map(|(buffer, depth)| (buffer, *depth))
    }

    /// Returns true if `scope` is being swept.
    pub fn contains(&self, scope: NodeId) -> bool {
        self.find(scope).is_some()
    }
}

// ============================================================================
// Property Buffer
// ============================================================================

/// One write to a property found in a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySite {
    /// `$this->p = value`: the property takes the value's type.
    Assigned(NodeId),
    /// `$this->p[] = value`: the property holds arrays of the value's type.
    Appended(NodeId),
    /// `$this->p op= value`: the type of the compound assignment node.
    Compound(NodeId),
}

impl PropertySite {
    /// Node whose resolution feeds this site.
    pub fn node(&self) -> NodeId {
        match self {
            PropertySite::Assigned(n) | PropertySite::Appended(n) | PropertySite::Compound(n) => *n,
        }
    }
}

/// Property writes of one class-like, keyed by property name.
#[derive(Debug, Clone, Default)]
pub struct PropertyBuffer {
    sites: BTreeMap<String, Vec<PropertySite>>,
}

impl PropertyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write to `name`.
    pub fn add(&mut self, name: &str, site: PropertySite) {
        self.sites.entry(name.to_string()).or_default().push(site);
    }

    /// Writes recorded for `name`.
    pub fn sites(&self, name: &str) -> &[PropertySite] {
        self.sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove and return the writes recorded for `name`.
    pub fn take(&mut self, name: &str) -> Vec<PropertySite> {
        self.sites.remove(name).unwrap_or_default()
    }

    /// Property names with at least one write.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlens_core::types::Type;

    fn types(name: &str) -> TypeCollection {
        TypeCollection::singleton(Type::named(name))
    }

    #[test]
    fn last_binding_wins() {
        let mut buffer = VariableBuffer::new(NodeId::new(1));
        buffer.bind("x", types("int"));
        buffer.bind("x", types("string"));
        assert_eq!(buffer.get("x"), Some(&types("string")));
        assert_eq!(buffer.unbind("x"), Some(types("string")));
        assert!(buffer.get("x").is_none());
    }

    #[test]
    fn annotation_shadows_later_bindings() {
        let mut buffer = VariableBuffer::new(NodeId::new(1));
        buffer.annotate("x", types("App\\Foo"));
        buffer.bind("x", types("int"));
        assert_eq!(buffer.get("x"), Some(&types("App\\Foo")));
        assert_eq!(buffer.binding("x"), Some(&types("int")));
    }

    #[test]
    fn pending_annotation_is_taken_once() {
        let mut buffer = VariableBuffer::new(NodeId::new(1));
        buffer.set_pending(types("App\\Foo"));
        assert_eq!(buffer.take_pending(), Some(types("App\\Foo")));
        assert_eq!(buffer.take_pending(), None);
    }

    #[test]
    fn scope_stack_finds_outer_frames() {
        let mut stack = ScopeStack::new();
        stack.enter(NodeId::new(1), 3);
        stack.current_mut().unwrap().bind("outer", types("int"));
        stack.enter(NodeId::new(2), 7);
        assert_eq!(stack.current().unwrap().scope(), NodeId::new(2));
        let (outer, depth) = stack.find(NodeId::new(1)).unwrap();
        assert!(outer.get("outer").is_some());
        assert_eq!(depth, 3);
        assert!(stack.current().unwrap().get("outer").is_none());

        stack.leave();
        stack.leave();
        assert!(!stack.contains(NodeId::new(1)));
        assert!(stack.leave().is_none());
    }

    #[test]
    fn property_buffer_groups_sites_by_name() {
        let mut buffer = PropertyBuffer::new();
        buffer.add("items", PropertySite::Appended(NodeId::new(3)));
        buffer.add("items", PropertySite::Assigned(NodeId::new(4)));
        buffer.add("count", PropertySite::Compound(NodeId::new(5)));
        assert_eq!(buffer.sites("items").len(), 2);
        assert_eq!(buffer.names().collect::<Vec<_>>(), vec!["count", "items"]);
        assert_eq!(buffer.take("count"), vec![PropertySite::Compound(NodeId::new(5))]);
        assert!(buffer.sites("count").is_empty());
        assert_eq!(buffer.sites("items")[0].node(), NodeId::new(3));
    }
}
