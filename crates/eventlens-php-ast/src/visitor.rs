// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Visitor trait and walker for forest traversal.
//!
//! The walker is iterative, so deeply nested expressions cannot overflow the
//! stack. Children are visited in source order.

use eventlens_core::types::NodeId;

use crate::nodes::Forest;

/// Result of visiting a node - controls traversal behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitResult {
    /// Continue traversal into children.
    ///
    /// After visiting children, `leave` will be called for this node.
    Continue,

    /// Skip children, continue with siblings.
    ///
    /// `leave` is still called for this node.
    SkipChildren,

    /// Stop traversal entirely.
    ///
    /// No further `visit` or `leave` calls are made.
    Stop,
}

/// Read-only visitor over forest nodes.
pub trait Visitor {
    /// Called before the children of `id`.
    fn visit(&mut self, forest: &Forest, id: NodeId) -> VisitResult;

    /// Called after the children of `id`.
    fn leave(&mut self, _forest: &Forest, _id: NodeId) {}
}

enum Frame {
    Enter(NodeId),
    Leave(NodeId),
}

/// Walk the subtree rooted at `root`.
///
/// Returns `false` if the visitor stopped the walk.
pub fn walk<V: Visitor + ?Sized>(forest: &Forest, root: NodeId, visitor: &mut V) -> bool {
    let mut stack = vec![Frame::Enter(root)];
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => match visitor.visit(forest, id) {
                VisitResult::Stop => return false,
                VisitResult::SkipChildren => stack.push(Frame::Leave(id)),
                VisitResult::Continue => {
                    stack.push(Frame::Leave(id));
                    stack.extend(forest.children(id).iter().rev().map(|c| Frame::Enter(*c)));
                }
            },
            Frame::Leave(id) => visitor.leave(forest, id),
        }
    }
    true
}
