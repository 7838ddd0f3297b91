//! PHP analysis for eventlens.
//!
//! This crate provides the PHP-specific pipeline:
//! - Unit index over a source tree, with snapshots
//! - Connector passes (parent links, name resolution, declaration links)
//! - Class hierarchy lookups
//! - Lazy, memoized type resolution
//! - Queries over units, methods and call sites
//! - Domain fact extraction driven by collector criteria

pub mod connect;
pub mod extract;
pub mod hierarchy;
pub mod index;
pub mod query;
pub mod resolve;

// Converts the errors above to EventlensError
mod error_bridges;

pub use connect::ConnectError;
pub use extract::{extract_facts, EventArgumentPolicy, ExtractError, FactExtractor, FirstPositional};
pub use index::{IndexError, IndexOptions, ParseErrorPolicy, Unit, UnitIndex, UnitKind};
pub use query::{Cardinality, Query, QueryBuilder, QueryError, QueryMatch, Target};
pub use resolve::{ResolveError, ResolverOptions, TypeResolver};
