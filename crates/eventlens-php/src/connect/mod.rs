//! Tree connector passes.
//!
//! Three whole-forest passes run once, in this order, before any type is
//! resolved:
//!
//! 1. [`link_parents`]: writes the parent handle of every node.
//! 2. [`resolve_names`]: expands imports and relative names into FQNs and
//!    records the name scope of every file and namespace.
//! 3. [`inject_references`]: links reference sites (`X::f()`, `new X`, type
//!    hints, `$this`, `self`) to the declaration node of their target.
//!
//! The reference pass needs the declaration table of the whole index, so
//! [`connect_forest`] hands the named forest to a collector between the
//! second and third pass.

mod names;
mod parents;
mod references;

use std::collections::HashMap;

use eventlens_core::types::NodeId;
use eventlens_php_ast::Forest;
use thiserror::Error;

pub use names::resolve_names;
pub use parents::link_parents;
pub use references::{inject_references, ReferenceStats};

/// Errors raised by the connector passes.
///
/// Both indicate a malformed forest (a lowering bug or a corrupted snapshot),
/// never a problem in the analyzed sources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// A child handle points outside the arena.
    #[error("node {parent} has dangling child {child}")]
    DanglingChild { parent: NodeId, child: NodeId },

    /// A node is reachable from two parents.
    #[error("node {node} is shared by more than one parent")]
    SharedChild { node: NodeId },
}

/// Run the parent-link and name-resolution passes.
pub fn connect_syntax(forest: &mut Forest) -> Result<(), ConnectError> {
    link_parents(forest)?;
    resolve_names(forest);
    Ok(())
}

/// Run all connector passes.
///
/// `collect` sees the forest after name resolution and returns the
/// declaration table (lowercase FQN without leading `\` to declaration
/// node) that the reference passes link against.
pub fn connect_forest<F>(forest: &mut Forest, collect: F) -> Result<ReferenceStats, ConnectError>
where
    F: FnOnce(&Forest) -> HashMap<String, NodeId>,
{
    connect_syntax(forest)?;
    let declarations = collect(forest);
    let lookup = |fqn: &str| {
        declarations
            .get(&fqn.trim_start_matches('\\').to_ascii_lowercase())
            .copied()
    };
    Ok(inject_references(forest, &lookup))
}
