//! Core infrastructure for eventlens.
//!
//! This crate provides the language-agnostic foundation:
//! - Type model (`Type`, `TypeCollection`) and node handles
//! - Domain facts and deduplicating fact sets
//! - Collector criteria and their validation
//! - Error types and error codes
//! - JSON output types for CLI responses
//! - Source discovery and content hashing

pub mod error;
pub mod facts;
pub mod filter;
pub mod output;
pub mod types;
pub mod workspace;
