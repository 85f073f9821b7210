use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::TaxonId;
use crate::parser::NameTable;
use crate::tree::Taxonomy;

/// Outcome of attaching scientific names to a taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameReport {
    pub assigned: usize,
    pub already_named: usize,
    pub missing: Vec<TaxonId>,
}

/// Fills in the name of every unnamed node. Nodes without a scientific name
/// stay unnamed; that is tolerated, not an error.
pub fn resolve_names(taxonomy: &mut Taxonomy, names: &NameTable) -> NameReport {
    let mut report = NameReport::default();
    for node_ref in taxonomy.refs() {
        let node = taxonomy.node_mut(node_ref);
        if node.name().is_some() {
            report.already_named += 1;
            continue;
        }
        match names.get(node.id()) {
            Some(name) => {
                node.set_name(name.to_string());
                report.assigned += 1;
            }
            None => {
                debug!(taxon = %node.id(), rank = node.rank(), "no scientific name");
                report.missing.push(node.id().clone());
            }
        }
    }
    if !report.missing.is_empty() {
        warn!(count = report.missing.len(), "taxa without a scientific name");
    }
    report
}
