use taxtree::domain::{Rank, TaxonRecord};
use taxtree::names::resolve_names;
use taxtree::order::persistence_order;
use taxtree::parser::NameTable;
use taxtree::tree::Taxonomy;

fn record(id: &str, parent: Option<&str>, rank: &str) -> TaxonRecord {
    TaxonRecord {
        id: id.parse().unwrap(),
        parent_id: parent.map(|parent| parent.parse().unwrap()),
        rank: rank.to_string(),
    }
}

fn names(entries: &[(&str, &str)]) -> NameTable {
    let mut table = NameTable::default();
    for (id, name) in entries {
        table.insert(id.parse().unwrap(), name.to_string());
    }
    table
}

#[test]
fn two_node_tree() {
    let mut taxonomy = Taxonomy::from_records(vec![
        record("2", Some("1"), "species"),
        record("1", None, "kingdom"),
    ])
    .unwrap();
    resolve_names(
        &mut taxonomy,
        &names(&[("1", "Animalia"), ("2", "Homo sapiens")]),
    );

    let child = taxonomy.get("2").unwrap();
    let kingdom = taxonomy.ancestor_at(child, Rank::Kingdom).unwrap();
    assert_eq!(taxonomy.node(kingdom).id().as_str(), "1");
    assert_eq!(taxonomy.node(kingdom).name(), Some("Animalia"));
    assert_eq!(taxonomy.ancestor_at(child, Rank::Phylum), None);
    assert_eq!(taxonomy.ancestor_at(child, Rank::Species), Some(child));

    let order = persistence_order(&taxonomy)
        .unwrap()
        .into_iter()
        .map(|node| taxonomy.node(node).id().to_string())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["1", "2"]);
}

#[test]
fn skipped_ranks_stay_empty() {
    let taxonomy = Taxonomy::from_records(vec![
        record("1", None, "kingdom"),
        record("2", Some("1"), "phylum"),
        record("3", Some("2"), "class"),
        record("4", Some("3"), "species"),
    ])
    .unwrap();

    let leaf = taxonomy.get("4").unwrap();
    let lineage = taxonomy.lineage(leaf);
    let present = lineage
        .iter()
        .filter(|(_, slot)| slot.is_some())
        .map(|(rank, _)| rank)
        .collect::<Vec<_>>();
    assert_eq!(
        present,
        vec![Rank::Kingdom, Rank::Phylum, Rank::Class, Rank::Species]
    );
    assert!(lineage.get(Rank::Order).is_none());
    assert!(lineage.get(Rank::Family).is_none());
    assert!(lineage.get(Rank::Genus).is_none());
}

#[test]
fn resolved_ancestor_lies_on_root_path() {
    let taxonomy = Taxonomy::from_records(vec![
        record("1", None, "no rank"),
        record("2", Some("1"), "kingdom"),
        record("3", Some("2"), "family"),
        record("4", Some("3"), "genus"),
        record("5", Some("4"), "species"),
        record("6", Some("2"), "family"),
        record("7", Some("6"), "genus"),
        record("8", Some("4"), "no rank"),
    ])
    .unwrap();

    for node in taxonomy.refs() {
        let path = taxonomy.ancestors(node).collect::<Vec<_>>();
        for rank in Rank::ALL {
            if let Some(found) = taxonomy.ancestor_at(node, rank) {
                assert!(path.contains(&found));
                assert_eq!(taxonomy.node(found).rank(), rank.as_str());
            }
        }
    }

    let lineage = taxonomy.lineage_of("8").unwrap();
    assert_eq!(lineage.get(Rank::Genus).map(|node| node.id().as_str()), Some("4"));
    assert_eq!(lineage.get(Rank::Family).map(|node| node.id().as_str()), Some("3"));
    assert!(lineage.get(Rank::Species).is_none());
}

#[test]
fn lineage_renders_names() {
    let mut taxonomy = Taxonomy::from_records(vec![
        record("1", None, "kingdom"),
        record("2", Some("1"), "species"),
    ])
    .unwrap();
    resolve_names(&mut taxonomy, &names(&[("1", "Animalia")]));

    let lineage = taxonomy.lineage_of("2").unwrap();
    assert_eq!(
        lineage.to_string(),
        "Lineage<kingdom=Animalia, phylum=, class=, order=, family=, genus=, species=2>"
    );
}

#[test]
fn name_resolution_is_idempotent() {
    let mut taxonomy = Taxonomy::from_records(vec![
        record("1", None, "no rank"),
        record("5", Some("1"), "species"),
    ])
    .unwrap();
    let table = names(&[("5", "Panthera leo")]);

    let first = resolve_names(&mut taxonomy, &table);
    let snapshot = taxonomy
        .iter()
        .map(|(_, node)| node.name().map(str::to_string))
        .collect::<Vec<_>>();
    let second = resolve_names(&mut taxonomy, &table);
    let again = taxonomy
        .iter()
        .map(|(_, node)| node.name().map(str::to_string))
        .collect::<Vec<_>>();

    assert_eq!(snapshot, again);
    assert_eq!(first.assigned, 1);
    assert_eq!(first.missing.len(), 1);
    assert_eq!(second.assigned, 0);
    assert_eq!(second.already_named, 1);
    let leo = taxonomy.get("5").unwrap();
    assert_eq!(taxonomy.node(leo).name(), Some("Panthera leo"));
}
