use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaxTreeError;

/// Identifier of the taxon every dump hangs off.
pub const ROOT_TAXON_ID: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root_sentinel(&self) -> bool {
        self.0 == ROOT_TAXON_ID
    }

    pub(crate) fn from_field(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for TaxonId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for TaxonId {
    type Err = TaxTreeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || ch == '|');
        if !is_valid {
            return Err(TaxTreeError::InvalidTaxonId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    /// Canonical ranks, broadest first.
    pub const ALL: [Rank; 7] = [
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Matches the rank column of a dump row. Non-canonical ranks such as
    /// "no rank" or "subfamily" never match.
    pub fn matches(self, rank: &str) -> bool {
        self.as_str() == rank
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = TaxTreeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Rank::ALL
            .into_iter()
            .find(|rank| rank.as_str() == normalized)
            .ok_or_else(|| TaxTreeError::InvalidRank(value.to_string()))
    }
}

/// One row of `nodes.dmp`, as parsed. `parent_id` is `None` only for the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonRecord {
    pub id: TaxonId,
    pub parent_id: Option<TaxonId>,
    pub rank: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_taxon_id_valid() {
        let id: TaxonId = " 9606 ".parse().unwrap();
        assert_eq!(id.as_str(), "9606");
        assert!(!id.is_root_sentinel());
    }

    #[test]
    fn parse_taxon_id_invalid() {
        let err = "96 06".parse::<TaxonId>().unwrap_err();
        assert_matches!(err, TaxTreeError::InvalidTaxonId(_));
        let err = "".parse::<TaxonId>().unwrap_err();
        assert_matches!(err, TaxTreeError::InvalidTaxonId(_));
    }

    #[test]
    fn rank_order_and_names() {
        assert_eq!(Rank::ALL[0], Rank::Kingdom);
        assert_eq!(Rank::Species.index(), 6);
        assert_eq!("Family".parse::<Rank>().unwrap(), Rank::Family);
        assert_matches!("no rank".parse::<Rank>(), Err(TaxTreeError::InvalidRank(_)));
        assert!(Rank::Genus.matches("genus"));
        assert!(!Rank::Genus.matches("subgenus"));
    }
}
