//! Type model shared by every analysis layer.
//!
//! This module contains the value types produced by type inference:
//! - [`NodeId`]: stable handle of an AST node inside the forest arena
//! - [`Span`]: byte range and line of a node in its source file
//! - [`Type`]: one resolved type name, optionally bound to its declaration node
//! - [`TypeCollection`]: a deduplicated set of [`Type`]s (the inferred union)
//!
//! ## Identity
//!
//! Two [`Type`]s are equal iff their normalized names are equal. The
//! declaration binding is carried along but never participates in equality,
//! hashing or ordering. A [`TypeCollection`] is keyed by name, so it can never
//! hold two entries with the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Node Handles
// ============================================================================

/// Unique identifier for a node within a parse forest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID.
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// Arena index of this node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Byte range of a node in its source file, plus its 1-indexed start line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: u32,
    /// End byte offset (exclusive).
    pub end: u32,
    /// Line number of `start` (1-indexed).
    pub line: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        debug_assert!(start <= end, "Span start ({start}) must be <= end ({end})");
        Span { start, end, line }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// ============================================================================
// Name Normalization
// ============================================================================

/// Native (scalar and pseudo) type names of the analyzed language.
pub const NATIVE_TYPES: &[&str] = &[
    "array", "bool", "callable", "false", "float", "int", "iterable", "mixed", "never", "null",
    "object", "resource", "string", "true", "void",
];

/// Native type aliases that only appear in documentation comments.
const NATIVE_ALIASES: &[(&str, &str)] = &[
    ("boolean", "bool"),
    ("integer", "int"),
    ("double", "float"),
    ("real", "float"),
    ("list", "array"),
];

/// Returns the canonical native name if `name` denotes a native type.
pub fn native_type_name(name: &str) -> Option<&'static str> {
    let lower = name.trim_start_matches('\\').to_ascii_lowercase();
    if let Some(native) = NATIVE_TYPES.iter().find(|n| **n == lower) {
        return Some(native);
    }
    NATIVE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, native)| *native)
}

/// Returns true if `name` is a native type name (including doc aliases).
pub fn is_native_type(name: &str) -> bool {
    native_type_name(name).is_some()
}

/// Normalize a type or class name.
///
/// Leading namespace separators are stripped and native names are lowercased
/// to their canonical spelling. Class names keep their declared casing.
pub fn normalize_type_name(name: &str) -> String {
    let trimmed = name.trim();
    match native_type_name(trimmed) {
        Some(native) => native.to_string(),
        None => trimmed.trim_start_matches('\\').to_string(),
    }
}

/// Last segment of a namespaced name (`App\Event\OrderPlaced` -> `OrderPlaced`).
pub fn short_name(fqn: &str) -> &str {
    fqn.rsplit('\\').next().unwrap_or(fqn)
}

// ============================================================================
// Type
// ============================================================================

/// A single resolved type.
///
/// Collections (`Foo[]`, `array<int, Foo>`, `Collection<Foo>`) carry their
/// element type and, when declared, their key type. An unknown type carries
/// the node kind it originated from instead of a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    declaration: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    key: Option<Box<Type>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    element: Option<Box<Type>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    unknown_origin: Option<String>,
}

impl Type {
    /// Create an opaque named type (no declaration link).
    pub fn named(name: impl AsRef<str>) -> Self {
        Type {
            name: normalize_type_name(name.as_ref()),
            declaration: None,
            key: None,
            element: None,
            unknown_origin: None,
        }
    }

    /// Create a named type bound to the node that declares it.
    pub fn declared(name: impl AsRef<str>, declaration: NodeId) -> Self {
        Type {
            declaration: Some(declaration),
            ..Type::named(name)
        }
    }

    /// Create the distinguished unknown type for a node kind.
    pub fn unknown(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Type {
            name: format!("unknown<{}>", origin),
            declaration: None,
            key: None,
            element: None,
            unknown_origin: Some(origin),
        }
    }

    /// The `null` type.
    pub fn null() -> Self {
        Type::named("null")
    }

    /// A list-like array of `element` (`Foo[]`).
    pub fn array_of(element: Type) -> Self {
        Type {
            name: format!("{}[]", element.name),
            declaration: None,
            key: None,
            element: Some(Box::new(element)),
            unknown_origin: None,
        }
    }

    /// An array with a declared key type (`array<string, Foo>`).
    pub fn map_of(key: Type, element: Type) -> Self {
        Type {
            name: format!("array<{},{}>", key.name, element.name),
            declaration: None,
            key: Some(Box::new(key)),
            element: Some(Box::new(element)),
            unknown_origin: None,
        }
    }

    /// A generic container (`Collection<Foo>`), bound to the container's declaration.
    pub fn generic(base: Type, key: Option<Type>, element: Type) -> Self {
        let name = match &key {
            Some(k) => format!("{}<{},{}>", base.name, k.name, element.name),
            None => format!("{}<{}>", base.name, element.name),
        };
        Type {
            name,
            declaration: base.declaration,
            key: key.map(Box::new),
            element: Some(Box::new(element)),
            unknown_origin: None,
        }
    }

    /// Normalized name of this type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without generic arguments (`Collection<Foo>` -> `Collection`).
    pub fn base_name(&self) -> &str {
        let name = self.name.split('<').next().unwrap_or(&self.name);
        name.strip_suffix("[]").map(|_| "array").unwrap_or(name)
    }

    /// Last segment of the name (`App\Foo` -> `Foo`).
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Declaration node this type is bound to, if any.
    pub fn declaration(&self) -> Option<NodeId> {
        self.declaration
    }

    /// Element type for collections.
    pub fn element(&self) -> Option<&Type> {
        self.element.as_deref()
    }

    /// Declared key type for collections.
    pub fn key(&self) -> Option<&Type> {
        self.key.as_deref()
    }

    /// Originating node kind for unknown types.
    pub fn unknown_origin(&self) -> Option<&str> {
        self.unknown_origin.as_deref()
    }

    /// Returns true for the distinguished unknown type.
    pub fn is_unknown(&self) -> bool {
        self.unknown_origin.is_some()
    }

    /// Returns true for native types (`int`, `string`, `array`, ...).
    pub fn is_native(&self) -> bool {
        self.element.is_none() && !self.is_unknown() && is_native_type(&self.name)
    }

    /// Returns true for the `null` type.
    pub fn is_null(&self) -> bool {
        self.name == "null"
    }

    /// Returns a copy bound to `declaration`.
    pub fn with_declaration(mut self, declaration: NodeId) -> Self {
        self.declaration = Some(declaration);
        self
    }
}

// Class names are case-insensitive in the analyzed language.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .to_ascii_lowercase()
            .cmp(&other.name.to_ascii_lowercase())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================================================
// Type Collection
// ============================================================================

/// Errors raised by [`TypeCollection`] reductions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeCollectionError {
    /// `unique()` was called on a collection that does not hold exactly one type.
    #[error("expected exactly one type, found {count}: [{}]", .names.join(", "))]
    NotUnique { count: usize, names: Vec<String> },
}

/// The inferred set of possible types of an expression.
///
/// Keyed by type name; iteration is ordered by name so output is deterministic.
/// Names that differ only in ASCII case are the same entry, and the first
/// spelling added is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeCollection {
    types: BTreeMap<String, Type>,
}

impl TypeCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection holding a single type.
    pub fn singleton(ty: Type) -> Self {
        let mut collection = Self::new();
        collection.add(ty);
        collection
    }

    /// Singleton collection holding `Unknown(origin)`.
    pub fn unknown(origin: impl Into<String>) -> Self {
        Self::singleton(Type::unknown(origin))
    }

    /// Add a type. Returns true if the name was not present before.
    ///
    /// Adding a declaration-bound type over an opaque entry of the same name
    /// upgrades the stored binding.
    pub fn add(&mut self, ty: Type) -> bool {
        let key = self.key_of(ty.name()).unwrap_or_else(|| ty.name.clone());
        match self.types.get_mut(&key) {
            Some(existing) => {
                if existing.declaration.is_none() && ty.declaration.is_some() {
                    existing.declaration = ty.declaration;
                }
                false
            }
            None => {
                self.types.insert(ty.name.clone(), ty);
                true
            }
        }
    }

    /// In-place union with another collection.
    pub fn extend(&mut self, other: &TypeCollection) {
        for ty in other.types.values() {
            self.add(ty.clone());
        }
    }

    /// Union of two collections.
    pub fn union(&self, other: &TypeCollection) -> TypeCollection {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    /// Stored key matching `name` regardless of case.
    fn key_of(&self, name: &str) -> Option<String> {
        if self.types.contains_key(name) {
            return Some(name.to_string());
        }
        self.types
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Remove a type by name.
    pub fn remove(&mut self, name: &str) -> Option<Type> {
        let key = self.key_of(&normalize_type_name(name))?;
        self.types.remove(&key)
    }

    /// Returns true if the collection holds no type.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of distinct types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if a type with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.key_of(&normalize_type_name(name)).is_some()
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<&Type> {
        let key = self.key_of(&normalize_type_name(name))?;
        self.types.get(&key)
    }

    /// Iterate over types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    /// Type names in order.
    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Reduce to the single contained type.
    pub fn unique(&self) -> Result<&Type, TypeCollectionError> {
        if self.types.len() == 1 {
            if let Some(ty) = self.types.values().next() {
                return Ok(ty);
            }
        }
        Err(TypeCollectionError::NotUnique {
            count: self.types.len(),
            names: self.types.keys().cloned().collect(),
        })
    }

    /// Copy of this collection without unknown types.
    pub fn known(&self) -> TypeCollection {
        self.iter().filter(|t| !t.is_unknown()).cloned().collect()
    }

    /// Copy of this collection without the `null` type.
    pub fn without_null(&self) -> TypeCollection {
        self.iter().filter(|t| !t.is_null()).cloned().collect()
    }

    /// Returns true if non-empty and every member is unknown.
    pub fn is_unknown(&self) -> bool {
        !self.is_empty() && self.iter().all(Type::is_unknown)
    }

    /// Element types of every collection-typed member.
    pub fn element_types(&self) -> TypeCollection {
        self.iter().filter_map(|t| t.element().cloned()).collect()
    }

    /// Declared key types of every collection-typed member.
    pub fn key_types(&self) -> TypeCollection {
        self.iter().filter_map(|t| t.key().cloned()).collect()
    }
}

impl PartialEq for TypeCollection {
    fn eq(&self, other: &Self) -> bool {
        self.types.len() == other.types.len() && self.types.keys().all(|key| other.contains(key))
    }
}

impl Eq for TypeCollection {}

impl FromIterator<Type> for TypeCollection {
    fn from_iter<I: IntoIterator<Item = Type>>(iter: I) -> Self {
        let mut collection = TypeCollection::new();
        for ty in iter {
            collection.add(ty);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a TypeCollection {
    type Item = &'a Type;
    type IntoIter = std::collections::btree_map::Values<'a, String, Type>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.values()
    }
}

impl fmt::Display for TypeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        let names: Vec<&str> = self.names();
        write!(f, "{}", names.join("|"))
    }
}

// ============================================================================
// Tests
// ============================================================================
