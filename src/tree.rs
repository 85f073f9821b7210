//! Reconstruction of the taxonomy tree from flat node records.
//!
//! Nodes live in an arena and point up to their parent by [`NodeRef`]. Records
//! arrive in arbitrary order, so building happens in two passes: every node is
//! created first, then parents are linked through the id index.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::domain::{TaxonId, TaxonRecord};
use crate::error::TaxTreeError;

/// Position of a node inside its [`Taxonomy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TaxonNode {
    id: TaxonId,
    rank: String,
    name: Option<String>,
    parent: Option<NodeRef>,
}

impl TaxonNode {
    pub fn id(&self) -> &TaxonId {
        &self.id
    }

    pub fn rank(&self) -> &str {
        &self.rank
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }
}

impl PartialEq for TaxonNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaxonNode {}

impl Hash for TaxonNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TaxonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.id),
        }
    }
}

/// First pass: one unlinked node per record.
pub struct TreeBuilder {
    nodes: Vec<TaxonNode>,
    declared_parents: Vec<Option<TaxonId>>,
    index: HashMap<TaxonId, NodeRef>,
}

impl TreeBuilder {
    pub fn from_records<I>(records: I) -> Result<Self, TaxTreeError>
    where
        I: IntoIterator<Item = TaxonRecord>,
    {
        let records = records.into_iter();
        let (lower, _) = records.size_hint();
        let mut builder = Self {
            nodes: Vec::with_capacity(lower),
            declared_parents: Vec::with_capacity(lower),
            index: HashMap::with_capacity(lower),
        };

        for record in records {
            let node_ref = NodeRef(builder.nodes.len());
            if builder.index.insert(record.id.clone(), node_ref).is_some() {
                return Err(TaxTreeError::DuplicateTaxon {
                    id: record.id.to_string(),
                });
            }
            builder.nodes.push(TaxonNode {
                id: record.id,
                rank: record.rank,
                name: None,
                parent: None,
            });
            builder.declared_parents.push(record.parent_id);
        }
        Ok(builder)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Second pass: resolve every declared parent id and locate the single root.
    pub fn link(self) -> Result<Taxonomy, TaxTreeError> {
        let TreeBuilder {
            mut nodes,
            declared_parents,
            index,
        } = self;

        let mut roots = Vec::new();
        for (position, declared) in declared_parents.into_iter().enumerate() {
            match declared {
                None => roots.push(NodeRef(position)),
                Some(parent_id) => {
                    let parent = index.get(&parent_id).copied().ok_or_else(|| {
                        TaxTreeError::DanglingParent {
                            id: nodes[position].id.to_string(),
                            parent_id: parent_id.to_string(),
                        }
                    })?;
                    nodes[position].parent = Some(parent);
                }
            }
        }

        let root = match roots.as_slice() {
            [] => return Err(TaxTreeError::MissingRoot),
            [root] => *root,
            _ => {
                let mut ids = roots
                    .iter()
                    .map(|root| nodes[root.0].id.to_string())
                    .collect::<Vec<_>>();
                ids.sort();
                return Err(TaxTreeError::MultipleRoots { ids });
            }
        };

        debug!(nodes = nodes.len(), root = %nodes[root.0].id, "linked taxonomy");
        Ok(Taxonomy { nodes, index, root })
    }
}

/// A fully linked taxonomy with exactly one root.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: Vec<TaxonNode>,
    index: HashMap<TaxonId, NodeRef>,
    root: NodeRef,
}

impl Taxonomy {
    pub fn from_records<I>(records: I) -> Result<Self, TaxTreeError>
    where
        I: IntoIterator<Item = TaxonRecord>,
    {
        TreeBuilder::from_records(records)?.link()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn node(&self, node: NodeRef) -> &TaxonNode {
        &self.nodes[node.0]
    }

    pub(crate) fn node_mut(&mut self, node: NodeRef) -> &mut TaxonNode {
        &mut self.nodes[node.0]
    }

    pub fn get(&self, id: &str) -> Option<NodeRef> {
        self.index.get(id).copied()
    }

    pub fn lookup(&self, id: &str) -> Result<NodeRef, TaxTreeError> {
        self.get(id)
            .ok_or_else(|| TaxTreeError::TaxonNotFound(id.to_string()))
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    pub fn refs(&self) -> impl Iterator<Item = NodeRef> + use<> {
        (0..self.nodes.len()).map(NodeRef)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &TaxonNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (NodeRef(position), node))
    }

    /// Walks from `node` (inclusive) up to the root.
    pub fn ancestors(&self, node: NodeRef) -> Ancestors<'_> {
        Ancestors {
            taxonomy: self,
            next: Some(node),
            remaining: self.nodes.len(),
        }
    }
}

/// Iterator over a node and its ancestors.
///
/// Yields at most as many nodes as the taxonomy holds, so a parent cycle ends
/// the walk instead of spinning forever.
pub struct Ancestors<'a> {
    taxonomy: &'a Taxonomy,
    next: Option<NodeRef>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if self.remaining == 0 {
            self.next = None;
            return None;
        }
        self.remaining -= 1;
        self.next = self.taxonomy.parent(current);
        Some(current)
    }
}
