// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! PHP syntax layer for eventlens.
//!
//! # Overview
//!
//! - **Parsing**: [`PhpParser`] runs tree-sitter-php and lowers the result into
//!   a [`Forest`], an arena of [`Node`]s with a closed [`NodeKind`] set.
//! - **Doc comments**: [`DocBlock`] extracts `@var`, `@param` and `@return`
//!   tags and parses their type expressions with winnow.
//! - **Traversal**: [`walk`] drives a [`Visitor`] over a subtree without
//!   recursion.
//!
//! # Quick Start
//!
//! ```
//! use eventlens_php_ast::{parse_source, NodeKind};
//!
//! let forest = parse_source("src/A.php", "<?php namespace App; class A {}").expect("parse error");
//! let file = forest.files()[0].root;
//! assert!(matches!(forest.kind(file), NodeKind::File));
//! ```

// ============================================================================
// Public modules and re-exports
// ============================================================================

pub mod docblock;
pub mod lower;
pub mod nodes;
pub mod visitor;

pub use docblock::{parse_doc_type, DocBlock, DocTag, DocTagKind, DocType, DocTypeError};
pub use lower::{parse_source, parse_use_text, ParseError, PhpParser};
pub use nodes::{
    Forest, LiteralKind, Modifiers, NameRole, NameScope, Node, NodeKind, SourceFile, UseKind,
    Visibility,
};
pub use visitor::{walk, VisitResult, Visitor};
