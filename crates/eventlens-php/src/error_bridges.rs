//! Error bridge implementations for PHP analysis errors.
//!
//! This module provides `impl From<X> for EventlensError` conversions from
//! the indexing, resolution, query and extraction errors to the unified
//! `EventlensError` type.
//!
//! These bridges live here rather than in `eventlens-core` because core does
//! not know the PHP pipeline types. Syntax errors reach the CLI wrapped in
//! [`IndexError::Parse`].

use eventlens_core::error::EventlensError;

use crate::connect::ConnectError;
use crate::extract::ExtractError;
use crate::index::IndexError;
use crate::query::QueryError;
use crate::resolve::ResolveError;

// ============================================================================
// Bridge: IndexError -> EventlensError
// ============================================================================

impl From<IndexError> for EventlensError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnitNotFound { fqn } => EventlensError::UnitNotFound { fqn },
            IndexError::Workspace(e) => EventlensError::from(e),
            IndexError::Parse { path, source } => EventlensError::ParseError {
                file: path,
                message: source.to_string(),
            },
            IndexError::Read { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                EventlensError::FileNotFound { path }
            }
            err @ (IndexError::SnapshotVersion { .. } | IndexError::Snapshot(_)) => {
                EventlensError::invalid_args(err.to_string())
            }
            err @ (IndexError::Read { .. }
            | IndexError::Grammar { .. }
            | IndexError::Io(_)
            | IndexError::Connect(_)) => EventlensError::internal(err.to_string()),
        }
    }
}

// ============================================================================
// Bridge: ConnectError -> EventlensError
// ============================================================================

impl From<ConnectError> for EventlensError {
    fn from(err: ConnectError) -> Self {
        EventlensError::internal(err.to_string())
    }
}

// ============================================================================
// Bridge: ResolveError -> EventlensError
// ============================================================================

impl From<ResolveError> for EventlensError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Circular { chain } => EventlensError::CircularReference { chain },
            err @ ResolveError::DepthExceeded { .. } => EventlensError::ResolutionError {
                message: err.to_string(),
            },
        }
    }
}

// ============================================================================
// Bridge: QueryError / ExtractError -> EventlensError
// ============================================================================

impl From<QueryError> for EventlensError {
    fn from(err: QueryError) -> Self {
        EventlensError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

impl From<ExtractError> for EventlensError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Query(e) => EventlensError::from(e),
            ExtractError::Resolve(e) => EventlensError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlens_core::error::OutputErrorCode;

    #[test]
    fn circular_references_keep_their_chain() {
        let err = EventlensError::from(ExtractError::Resolve(ResolveError::Circular {
            chain: vec!["ClassConstant(A)".to_string(), "ClassConstantFetch(A)".to_string()],
        }));
        assert!(matches!(&err, EventlensError::CircularReference { chain } if chain.len() == 2));
        assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::ResolutionError);
    }

    #[test]
    fn missing_units_and_bad_patterns_map_to_codes() {
        let err = EventlensError::from(IndexError::UnitNotFound {
            fqn: "App\\Missing".to_string(),
        });
        assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::ResolutionError);

        let err = EventlensError::from(QueryError::InvalidPattern {
            pattern: "(".to_string(),
            message: "unclosed group".to_string(),
        });
        assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::InvalidArguments);
    }
}
