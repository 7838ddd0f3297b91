//! Parent-link pass.

use eventlens_core::types::NodeId;
use eventlens_php_ast::Forest;

use super::ConnectError;

enum Frame {
    Enter(NodeId),
    Leave,
}

/// Attach a parent handle to every node reachable from a file root.
///
/// Stack-based: entering a node attaches the node on top of the ancestry
/// stack as its parent and pushes it; leaving pops. File roots get no parent.
pub fn link_parents(forest: &mut Forest) -> Result<(), ConnectError> {
    let roots: Vec<NodeId> = forest.files().iter().map(|f| f.root).collect();
    let mut seen = vec![false; forest.len()];

    for root in roots {
        let mut ancestry: Vec<NodeId> = Vec::new();
        let mut work = vec![Frame::Enter(root)];
        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(id) => {
                    let parent = ancestry.last().copied();
                    if id.index() >= seen.len() {
                        return Err(ConnectError::DanglingChild {
                            parent: parent.unwrap_or(root),
                            child: id,
                        });
                    }
                    if seen[id.index()] {
                        return Err(ConnectError::SharedChild { node: id });
                    }
                    seen[id.index()] = true;
                    forest.node_mut(id).parent = parent;
                    ancestry.push(id);
                    work.push(Frame::Leave);
                    work.extend(forest.children(id).iter().rev().map(|c| Frame::Enter(*c)));
                }
                Frame::Leave => {
                    ancestry.pop();
                }
            }
        }
    }
    tracing::debug!(nodes = forest.len(), "linked parents");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlens_core::types::Span;
    use eventlens_core::workspace::ContentHash;
    use eventlens_php_ast::NodeKind;

    fn span() -> Span {
        Span::new(0, 0, 1)
    }

    #[test]
    fn links_every_child_to_its_parent() {
        let mut forest = Forest::new();
        let leaf = forest.push(NodeKind::Return, span(), vec![]);
        let block = forest.push(NodeKind::Block, span(), vec![leaf]);
        let root = forest.push(NodeKind::File, span(), vec![block]);
        forest.add_file("a.php", ContentHash::compute(b""), root);

        link_parents(&mut forest).unwrap();
        assert_eq!(forest.parent(root), None);
        assert_eq!(forest.parent(block), Some(root));
        assert_eq!(forest.parent(leaf), Some(block));
        assert_eq!(forest.ancestors(leaf).collect::<Vec<_>>(), vec![block, root]);
    }

    #[test]
    fn shared_child_is_rejected() {
        let mut forest = Forest::new();
        let leaf = forest.push(NodeKind::Return, span(), vec![]);
        let a = forest.push(NodeKind::Block, span(), vec![leaf]);
        let b = forest.push(NodeKind::Block, span(), vec![leaf]);
        let root = forest.push(NodeKind::File, span(), vec![a, b]);
        forest.add_file("a.php", ContentHash::compute(b""), root);

        assert_eq!(
            link_parents(&mut forest),
            Err(ConnectError::SharedChild { node: leaf })
        );
    }

    #[test]
    fn dangling_child_is_rejected() {
        let mut forest = Forest::new();
        let root = forest.push(NodeKind::File, span(), vec![NodeId::new(42)]);
        forest.add_file("a.php", ContentHash::compute(b""), root);

        assert!(matches!(
            link_parents(&mut forest),
            Err(ConnectError::DanglingChild { .. })
        ));
    }
}
