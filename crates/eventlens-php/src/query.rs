//! Query engine over a unit index.
//!
//! A [`Query`] is a list of predicates (AND-ed) over one target: units,
//! methods, method/static call sites or function calls. Queries are built
//! with [`QueryBuilder`], which compiles every pattern up front, and run
//! with [`Query::execute`]. Receiver-type predicates resolve lazily through
//! the [`TypeResolver`] passed to `execute`, so a query can run right after
//! indexing without a whole-tree resolution pass.
//!
//! ```ignore
//! let query = QueryBuilder::new()
//!     .select_units_matching(r"Listener$")
//!     .select_methods(r"^on")
//!     .all()?;
//! for hit in query.execute(&mut resolver)? {
//!     println!("{}", hit.fqn().unwrap_or("-"));
//! }
//! ```

use eventlens_core::types::{NodeId, TypeCollection};
use eventlens_php_ast::NodeKind;
use regex::Regex;
use thiserror::Error;

use crate::hierarchy;
use crate::index::{Unit, UnitIndex, UnitKind};
use crate::resolve::{ResolveError, TypeResolver};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A pattern does not compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The query selects two different kinds of result.
    #[error("query selects both {first} and {second}")]
    ConflictingTargets {
        first: &'static str,
        second: &'static str,
    },
}

// ============================================================================
// Query Model
// ============================================================================

/// How many matches a query yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one match; execution stops at the first.
    First,
    /// Every match, in traversal order.
    All,
}

/// What a query yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Units,
    Methods,
    CallSites,
    FunctionCalls,
}

impl Target {
    fn as_str(&self) -> &'static str {
        match self {
            Target::Units => "units",
            Target::Methods => "methods",
            Target::CallSites => "call sites",
            Target::FunctionCalls => "function calls",
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    UnitMatching(Regex),
    UnitExtending(Regex),
    UnitImplementing(Regex),
    UnitUsingTrait(Regex),
    MethodName(Regex),
    CallSite { receiver: Regex, method: Regex },
    FunctionName(Regex),
}

impl Predicate {
    fn on_unit(&self) -> bool {
        matches!(
            self,
            Predicate::UnitMatching(_)
                | Predicate::UnitExtending(_)
                | Predicate::UnitImplementing(_)
                | Predicate::UnitUsingTrait(_)
        )
    }
}

/// One query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMatch {
    /// A class, interface or trait.
    Unit { fqn: String, node: NodeId },
    /// A method declaration.
    Method {
        fqn: String,
        method: String,
        node: NodeId,
    },
    /// A method call, static call or function call.
    CallSite {
        node: NodeId,
        /// Called method or function.
        called: String,
        /// Unit enclosing the call, if any.
        fqn: Option<String>,
        /// Method or function enclosing the call, if any.
        caller: Option<String>,
    },
}

impl QueryMatch {
    /// Matched node.
    pub fn node(&self) -> NodeId {
        match self {
            QueryMatch::Unit { node, .. }
            | QueryMatch::Method { node, .. }
            | QueryMatch::CallSite { node, .. } => *node,
        }
    }

    /// FQN of the matched or enclosing unit.
    pub fn fqn(&self) -> Option<&str> {
        match self {
            QueryMatch::Unit { fqn, .. } | QueryMatch::Method { fqn, .. } => Some(fqn),
            QueryMatch::CallSite { fqn, .. } => fqn.as_deref(),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent query builder.
///
/// Pattern errors are kept until [`first`](QueryBuilder::first) or
/// [`all`](QueryBuilder::all) is called.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    predicates: Vec<Predicate>,
    error: Option<QueryError>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units whose FQN matches.
    pub fn select_units_matching(self, fqn: &str) -> Self {
        self.with_pattern(fqn, Predicate::UnitMatching)
    }

    /// Units with a parent (transitively) whose FQN matches. For interfaces,
    /// the extended interfaces.
    pub fn select_units_extending(self, fqn: &str) -> Self {
        self.with_pattern(fqn, Predicate::UnitExtending)
    }

    /// Units implementing (directly or through parents) a matching interface.
    pub fn select_units_implementing(self, fqn: &str) -> Self {
        self.with_pattern(fqn, Predicate::UnitImplementing)
    }

    /// Units using (directly or through traits) a matching trait.
    pub fn select_units_using_trait(self, fqn: &str) -> Self {
        self.with_pattern(fqn, Predicate::UnitUsingTrait)
    }

    /// Methods whose name matches; unit predicates apply to the owner.
    pub fn select_methods(self, name: &str) -> Self {
        self.with_pattern(name, Predicate::MethodName)
    }

    /// Method and static calls whose receiver type (or any supertype of it)
    /// and method name match; unit predicates apply to the enclosing unit.
    pub fn select_call_sites(mut self, receiver: &str, method: &str) -> Self {
        match (compile(receiver), compile(method)) {
            (Ok(receiver), Ok(method)) => {
                self.predicates.push(Predicate::CallSite { receiver, method })
            }
            (Err(e), _) | (_, Err(e)) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Function calls whose name (fully qualified or short) matches.
    pub fn select_function_calls(self, name: &str) -> Self {
        self.with_pattern(name, Predicate::FunctionName)
    }

    /// Build a query yielding at most one match.
    pub fn first(self) -> Result<Query, QueryError> {
        self.build(Cardinality::First)
    }

    /// Build a query yielding every match.
    pub fn all(self) -> Result<Query, QueryError> {
        self.build(Cardinality::All)
    }

    fn with_pattern(mut self, pattern: &str, predicate: fn(Regex) -> Predicate) -> Self {
        match compile(pattern) {
            Ok(regex) => self.predicates.push(predicate(regex)),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    fn build(self, cardinality: Cardinality) -> Result<Query, QueryError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut target = Target::Units;
        for predicate in &self.predicates {
            let wanted = match predicate {
                Predicate::MethodName(_) => Target::Methods,
                Predicate::CallSite { .. } => Target::CallSites,
                Predicate::FunctionName(_) => Target::FunctionCalls,
                _ => continue,
            };
            if target != Target::Units && target != wanted {
                return Err(QueryError::ConflictingTargets {
                    first: target.as_str(),
                    second: wanted.as_str(),
                });
            }
            target = wanted;
        }
        Ok(Query {
            target,
            predicates: self.predicates,
            cardinality,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern).map_err(|e| QueryError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

// ============================================================================
// Execution
// ============================================================================

/// A built, reusable query.
#[derive(Debug, Clone)]
pub struct Query {
    target: Target,
    predicates: Vec<Predicate>,
    cardinality: Cardinality,
}

impl Query {
    pub fn target(&self) -> Target {
        self.target
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Run the query against the resolver's index.
    pub fn execute(
        &self,
        resolver: &mut TypeResolver<'_>,
    ) -> Result<Vec<QueryMatch>, ResolveError> {
        let index = resolver.index();
        let mut out = Vec::new();
        match self.target {
            Target::Units => {
                for unit in index.units() {
                    if self.unit_passes(index, unit) {
                        out.push(QueryMatch::Unit {
                            fqn: unit.fqn.clone(),
                            node: unit.node,
                        });
                        if self.is_done(&out) {
                            break;
                        }
                    }
                }
            }
            Target::Methods => self.execute_methods(index, &mut out),
            Target::CallSites | Target::FunctionCalls => self.execute_calls(resolver, &mut out)?,
        }
        Ok(out)
    }

    fn is_done(&self, out: &[QueryMatch]) -> bool {
        self.cardinality == Cardinality::First && !out.is_empty()
    }

    fn unit_passes(&self, index: &UnitIndex, unit: &Unit) -> bool {
        let forest = index.forest();
        self.predicates.iter().filter(|p| p.on_unit()).all(|predicate| match predicate {
            Predicate::UnitMatching(re) => re.is_match(&unit.fqn),
            Predicate::UnitExtending(re) => {
                let names = match unit.kind {
                    UnitKind::Interface => hierarchy::interface_names(forest, unit.node),
                    _ => hierarchy::parent_names(forest, unit.node),
                };
                names.iter().any(|n| re.is_match(n))
            }
            Predicate::UnitImplementing(re) => unit.kind != UnitKind::Interface
                && hierarchy::interface_names(forest, unit.node)
                    .iter()
                    .any(|n| re.is_match(n)),
            Predicate::UnitUsingTrait(re) => hierarchy::trait_names(forest, unit.node)
                .iter()
                .any(|n| re.is_match(n)),
            _ => true,
        })
    }

    fn execute_methods(&self, index: &UnitIndex, out: &mut Vec<QueryMatch>) {
        let forest = index.forest();
        for unit in index.units() {
            if !self.unit_passes(index, unit) {
                continue;
            }
            for member in forest.members(unit.node) {
                let NodeKind::Method { name, .. } = forest.kind(member) else {
                    continue;
                };
                let named = self.predicates.iter().all(|p| match p {
                    Predicate::MethodName(re) => re.is_match(name),
                    _ => true,
                });
                if named {
                    out.push(QueryMatch::Method {
                        fqn: unit.fqn.clone(),
                        method: name.clone(),
                        node: member,
                    });
                    if self.is_done(out) {
                        return;
                    }
                }
            }
        }
    }

    fn execute_calls(
        &self,
        resolver: &mut TypeResolver<'_>,
        out: &mut Vec<QueryMatch>,
    ) -> Result<(), ResolveError> {
        let index = resolver.index();
        let forest = index.forest();
        let has_unit_predicates = self.predicates.iter().any(Predicate::on_unit);
        for file in forest.files() {
            for site in forest.descendants(file.root) {
                let called = match (self.target, forest.kind(site)) {
                    (
                        Target::CallSites,
                        NodeKind::MethodCall { name, .. } | NodeKind::StaticCall { name },
                    ) => name.as_str(),
                    (Target::FunctionCalls, NodeKind::FunctionCall) => {
                        match forest.first_child(site).and_then(|c| forest.name_of(c)) {
                            Some(name) => name,
                            None => continue,
                        }
                    }
                    _ => continue,
                };
                let unit = index.unit_for_node(site);
                if has_unit_predicates && !unit.is_some_and(|u| self.unit_passes(index, u)) {
                    continue;
                }
                if !self.call_passes(resolver, site, called)? {
                    continue;
                }
                let caller = forest
                    .enclosing(site, |k| {
                        matches!(k, NodeKind::Method { .. } | NodeKind::Function { .. })
                    })
                    .and_then(|f| forest.kind(f).name())
                    .map(str::to_string);
                out.push(QueryMatch::CallSite {
                    node: site,
                    called: called.to_string(),
                    fqn: unit.map(|u| u.fqn.clone()),
                    caller,
                });
                if self.is_done(out) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn call_passes(
        &self,
        resolver: &mut TypeResolver<'_>,
        site: NodeId,
        called: &str,
    ) -> Result<bool, ResolveError> {
        let forest = resolver.forest();
        for predicate in &self.predicates {
            match predicate {
                Predicate::CallSite { receiver, method } => {
                    if !method.is_match(called) {
                        return Ok(false);
                    }
                    let Some(receiver_node) = forest.first_child(site) else {
                        return Ok(false);
                    };
                    let candidates = resolver.resolve(receiver_node)?;
                    if !receiver_matches(resolver, &candidates, receiver) {
                        return Ok(false);
                    }
                }
                Predicate::FunctionName(re) => {
                    let short = called.rsplit('\\').next().unwrap_or(called);
                    if !re.is_match(called) && !re.is_match(short) {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }
}

/// A receiver matches when a candidate's name, or any of its supertypes,
/// matches `re`.
fn receiver_matches(resolver: &TypeResolver<'_>, candidates: &TypeCollection, re: &Regex) -> bool {
    let index = resolver.index();
    candidates.known().iter().any(|candidate| {
        if re.is_match(candidate.name()) {
            return true;
        }
        let class = candidate
            .declaration()
            .filter(|d| index.forest().kind(*d).is_class_like())
            .or_else(|| index.declaration(candidate.name()));
        class.is_some_and(|class| {
            hierarchy::supertype_names(index.forest(), class)
                .iter()
                .any(|name| re.is_match(name))
        })
    })
}
