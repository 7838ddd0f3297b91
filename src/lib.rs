//! eventlens: static type inference and architectural fact extraction for PHP.
//!
//! Indexes a PHP code base, infers the possible types of its expressions and
//! extracts domain facts (use cases, listeners, subscribers, event
//! dispatches) selected by configurable collectors.

// Core infrastructure - re-exported from eventlens-core
pub use eventlens_core::error;
pub use eventlens_core::facts;
pub use eventlens_core::filter;
pub use eventlens_core::output;
pub use eventlens_core::types;
pub use eventlens_core::workspace;

// Language layers
pub use eventlens_php as php;
pub use eventlens_php_ast as ast;

// Front door
pub mod cli;
pub mod components;
pub mod config;
