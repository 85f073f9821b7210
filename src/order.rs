//! Parent-before-child ordering for stores that check foreign keys on insert.

use tracing::debug;

use crate::error::TaxTreeError;
use crate::tree::{NodeRef, Taxonomy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Saved,
}

/// Returns every node exactly once, each after its parent.
///
/// Unsaved ancestors are collected on an explicit stack, so deep trees do not
/// grow the call stack. Meeting a node that is still in progress within the
/// same chain means the parent pointers form a cycle.
pub fn persistence_order(taxonomy: &Taxonomy) -> Result<Vec<NodeRef>, TaxTreeError> {
    let mut marks = vec![Mark::Unvisited; taxonomy.len()];
    let mut order = Vec::with_capacity(taxonomy.len());
    let mut chain = Vec::new();

    for start in taxonomy.refs() {
        if marks[start.index()] == Mark::Saved {
            continue;
        }

        let mut cursor = Some(start);
        while let Some(node) = cursor {
            match marks[node.index()] {
                Mark::Saved => break,
                Mark::InProgress => {
                    return Err(TaxTreeError::CyclicParent {
                        id: taxonomy.node(node).id().to_string(),
                    });
                }
                Mark::Unvisited => {
                    marks[node.index()] = Mark::InProgress;
                    chain.push(node);
                    cursor = taxonomy.parent(node);
                }
            }
        }

        while let Some(node) = chain.pop() {
            marks[node.index()] = Mark::Saved;
            order.push(node);
        }
    }

    debug!(nodes = order.len(), "computed persistence order");
    Ok(order)
}
