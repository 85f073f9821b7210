use std::fmt;

use crate::domain::Rank;
use crate::error::TaxTreeError;
use crate::tree::{NodeRef, TaxonNode, Taxonomy};

/// Ancestor of a taxon at each canonical rank, kingdom through species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage<T> {
    slots: [Option<T>; 7],
}

impl<T> Lineage<T> {
    pub fn from_fn(mut resolve: impl FnMut(Rank) -> Option<T>) -> Self {
        Self {
            slots: Rank::ALL.map(&mut resolve),
        }
    }

    /// Builds a lineage from a chain ordered from the taxon itself up to the
    /// root. The first entry of each canonical rank fills its slot.
    pub fn from_chain<I, F>(chain: I, rank_of: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> &str,
    {
        let mut slots: [Option<T>; 7] = Default::default();
        for item in chain {
            let matched = Rank::ALL
                .into_iter()
                .find(|rank| rank.matches(rank_of(&item)));
            if let Some(rank) = matched {
                let slot = &mut slots[rank.index()];
                if slot.is_none() {
                    *slot = Some(item);
                }
            }
        }
        Self { slots }
    }

    pub fn get(&self, rank: Rank) -> Option<&T> {
        self.slots[rank.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, Option<&T>)> {
        Rank::ALL
            .into_iter()
            .zip(self.slots.iter().map(Option::as_ref))
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Lineage<U> {
        Lineage {
            slots: self.slots.map(|slot| slot.map(&mut f)),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Lineage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lineage<")?;
        for (position, (rank, slot)) in self.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            match slot {
                Some(value) => write!(f, "{rank}={value}")?,
                None => write!(f, "{rank}=")?,
            }
        }
        f.write_str(">")
    }
}

impl Taxonomy {
    /// Nearest node at `rank` on the path from `node` (inclusive) to the root.
    pub fn ancestor_at(&self, node: NodeRef, rank: Rank) -> Option<NodeRef> {
        self.ancestors(node)
            .find(|candidate| rank.matches(self.node(*candidate).rank()))
    }

    pub fn lineage(&self, node: NodeRef) -> Lineage<NodeRef> {
        Lineage::from_fn(|rank| self.ancestor_at(node, rank))
    }

    pub fn lineage_of(&self, id: &str) -> Result<Lineage<&TaxonNode>, TaxTreeError> {
        let node = self.lookup(id)?;
        Ok(self.lineage(node).map(|found| self.node(found)))
    }
}
