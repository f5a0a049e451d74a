use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{Candidate, CrosswalkEntry, MatchedPair, Method, Record, Relation};
use crate::prelink::{LinkedPair, LINKED_STRENGTH};

/// A system joined onto the crosswalk through a foreign key stored in
/// `Record::link`, pointing at `onto`'s identifiers.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub relation: &'a Relation,
    pub onto: &'a str,
}

/// Everything the consolidator merges into the final relation.
pub struct ConsolidateInput<'a> {
    pub left: &'a Relation,
    pub right: &'a Relation,
    pub attached: Vec<Attachment<'a>>,
    pub linked: &'a [LinkedPair],
    pub exact: Vec<&'a MatchedPair>,
    pub fuzzy: &'a [Candidate],
    /// Right ids a fuzzy pair may claim even though an exact pair already did.
    pub reusable: &'a HashSet<String>,
    pub carry: &'a [String],
}

/// Merge linked, exact and fuzzy pairs, then full-outer-join every system so
/// each identifier shows up, with `no-match` rows for the leftovers.
pub fn consolidate(input: &ConsolidateInput<'_>) -> Vec<CrosswalkEntry> {
    let left_by_id = by_id(input.left);
    let right_by_id = by_id(input.right);

    let mut entries = Vec::new();
    let mut claimed_left: HashSet<&str> = HashSet::new();
    let mut claimed_right: HashSet<&str> = HashSet::new();

    for pair in input.linked {
        let (Some(l), Some(r)) = (
            left_by_id.get(pair.left_id.as_str()),
            right_by_id.get(pair.right_id.as_str()),
        ) else {
            continue;
        };
        let mut entry = paired(input, Method::Linked, l, r);
        entry.strength = Some(LINKED_STRENGTH.to_string());
        entries.push(entry);
        claimed_left.insert(l.id.as_str());
        claimed_right.insert(r.id.as_str());
    }

    for pair in &input.exact {
        let (Some(l), Some(r)) = (
            left_by_id.get(pair.left_id.as_str()),
            right_by_id.get(pair.right_id.as_str()),
        ) else {
            continue;
        };
        let mut entry = paired(input, Method::Exact, l, r);
        entry.strength = Some(pair.strength.clone());
        overlay_joined(&mut entry, &pair.attributes);
        entries.push(entry);
        claimed_left.insert(l.id.as_str());
        claimed_right.insert(r.id.as_str());
    }

    let mut dropped = 0usize;
    for candidate in input.fuzzy {
        let target_taken = claimed_right.contains(candidate.target_id.as_str())
            && !input.reusable.contains(&candidate.target_id);
        if claimed_left.contains(candidate.source_id.as_str()) || target_taken {
            dropped += 1;
            continue;
        }
        let (Some(l), Some(r)) = (
            left_by_id.get(candidate.source_id.as_str()),
            right_by_id.get(candidate.target_id.as_str()),
        ) else {
            continue;
        };
        let mut entry = paired(input, Method::Fuzzy, l, r);
        entry.relevance = Some(candidate.relevance);
        entry.edit_ratio = Some(candidate.edit_ratio);
        entry.token_ratio = Some(candidate.token_ratio);
        entries.push(entry);
        claimed_left.insert(l.id.as_str());
        claimed_right.insert(r.id.as_str());
    }
    if dropped > 0 {
        log::debug!("consolidate: {dropped} fuzzy pairs lost to exact matches");
    }

    for record in &input.left.records {
        if !claimed_left.contains(record.id.as_str()) {
            entries.push(single(input, &input.left.system, record));
        }
    }
    for record in &input.right.records {
        if !claimed_right.contains(record.id.as_str()) {
            entries.push(single(input, &input.right.system, record));
        }
    }

    for attachment in &input.attached {
        entries = attach(entries, attachment, input.carry);
    }

    let order = system_order(input);
    entries.sort_by(|a, b| compare_entries(a, b, &order));
    entries
}

fn by_id(relation: &Relation) -> HashMap<&str, &Record> {
    relation.records.iter().map(|r| (r.id.as_str(), r)).collect()
}

fn system_order(input: &ConsolidateInput<'_>) -> Vec<String> {
    let mut order = vec![input.left.system.clone(), input.right.system.clone()];
    order.extend(input.attached.iter().map(|a| a.relation.system.clone()));
    order
}

/// Row for a left/right pair. Descriptive values come from the right record
/// and fall back to the left.
fn paired(input: &ConsolidateInput<'_>, method: Method, left: &Record, right: &Record) -> CrosswalkEntry {
    let mut entry = CrosswalkEntry::new(method);
    add_identity(&mut entry, &input.left.system, left);
    add_identity(&mut entry, &input.right.system, right);
    fill_from(&mut entry, right, input.carry);
    fill_from(&mut entry, left, input.carry);
    entry
}

fn single(input: &ConsolidateInput<'_>, system: &str, record: &Record) -> CrosswalkEntry {
    let mut entry = CrosswalkEntry::new(Method::NoMatch);
    add_identity(&mut entry, system, record);
    fill_from(&mut entry, record, input.carry);
    entry
}

fn add_identity(entry: &mut CrosswalkEntry, system: &str, record: &Record) {
    entry.ids.insert(system.to_string(), record.id.clone());
    if let Some(name) = &record.name {
        entry.names.insert(system.to_string(), name.clone());
    }
}

/// Fill every still-empty descriptive field from `record`.
fn fill_from(entry: &mut CrosswalkEntry, record: &Record, carry: &[String]) {
    fn coalesce(slot: &mut Option<String>, value: &Option<String>) {
        if slot.is_none() {
            slot.clone_from(value);
        }
    }
    coalesce(&mut entry.address, &record.address);
    coalesce(&mut entry.city, &record.city);
    coalesce(&mut entry.state, &record.state);
    coalesce(&mut entry.state_abbr, &record.state_abbr);
    coalesce(&mut entry.zip, &record.zip);
    if entry.latitude.is_none() && entry.longitude.is_none() {
        entry.latitude = record.latitude;
        entry.longitude = record.longitude;
    }
    for column in carry {
        if entry.extra.contains_key(column) {
            continue;
        }
        if let Some(value) = record.extra.get(column) {
            entry.extra.insert(column.clone(), value.clone());
        }
    }
}

/// The cascade's joined row decides exact-match attributes it carries.
fn overlay_joined(entry: &mut CrosswalkEntry, joined: &BTreeMap<String, String>) {
    let slots = [
        ("address", &mut entry.address),
        ("city", &mut entry.city),
        ("state", &mut entry.state),
        ("state_abbr", &mut entry.state_abbr),
        ("zip", &mut entry.zip),
    ];
    for (key, slot) in slots {
        if let Some(value) = joined.get(key) {
            *slot = Some(value.clone());
        }
    }
}

/// Full outer join of an attached system onto the rows built so far.
///
/// Each attached record whose key names a row's `onto` id produces its own
/// copy of that row. Attached records with a null or unknown key become
/// `no-match` rows.
fn attach(entries: Vec<CrosswalkEntry>, attachment: &Attachment<'_>, carry: &[String]) -> Vec<CrosswalkEntry> {
    let system = attachment.relation.system.as_str();
    let mut by_key: HashMap<&str, Vec<&Record>> = HashMap::new();
    for record in &attachment.relation.records {
        if let Some(key) = record.link.as_deref() {
            by_key.entry(key).or_default().push(record);
        }
    }

    let mut used: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let matches = entry
            .id(attachment.onto)
            .and_then(|key| by_key.get(key))
            .filter(|records| !records.is_empty());
        let Some(records) = matches else {
            out.push(entry);
            continue;
        };
        for record in records {
            let mut row = entry.clone();
            add_identity(&mut row, system, record);
            fill_from(&mut row, record, carry);
            out.push(row);
            used.insert(record.id.as_str());
        }
    }

    let mut orphans = 0usize;
    for record in &attachment.relation.records {
        if used.contains(record.id.as_str()) {
            continue;
        }
        let mut row = CrosswalkEntry::new(Method::NoMatch);
        add_identity(&mut row, system, record);
        fill_from(&mut row, record, carry);
        out.push(row);
        orphans += 1;
    }
    log::info!(
        "attached {}: {} joined, {orphans} without a partner",
        system,
        used.len()
    );
    out
}

/// Ids in system order with nulls last, then method.
fn compare_entries(a: &CrosswalkEntry, b: &CrosswalkEntry, order: &[String]) -> Ordering {
    for system in order {
        let ord = match (a.id(system), b.id(system)) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.method.cmp(&b.method)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, name: &str) -> Record {
        Record {
            name: Some(name.into()),
            ..Record::new(id)
        }
    }

    fn exact(l: &str, r: &str) -> MatchedPair {
        MatchedPair {
            left_id: l.into(),
            right_id: r.into(),
            round: "3".into(),
            strength: "3) name, city, state, state_abbr, zip".into(),
            attributes: BTreeMap::new(),
        }
    }

    fn fuzzy(s: &str, t: &str) -> Candidate {
        Candidate {
            source_id: s.into(),
            target_id: t.into(),
            source_name: None,
            target_name: None,
            relevance: 9.5,
            edit_ratio: 0.8,
            token_ratio: 0.7,
            accepted: true,
        }
    }

    struct Fixture {
        left: Relation,
        right: Relation,
        reusable: HashSet<String>,
    }

    impl Fixture {
        fn new(left: Vec<Record>, right: Vec<Record>) -> Self {
            Self {
                left: Relation::standard("ceeb", left),
                right: Relation::standard("nces", right),
                reusable: HashSet::new(),
            }
        }

        fn run(&self, linked: &[LinkedPair], exact: &[MatchedPair], fuzzy: &[Candidate]) -> Vec<CrosswalkEntry> {
            self.run_attached(linked, exact, fuzzy, vec![])
        }

        fn run_attached(
            &self,
            linked: &[LinkedPair],
            exact: &[MatchedPair],
            fuzzy: &[Candidate],
            attached: Vec<Attachment<'_>>,
        ) -> Vec<CrosswalkEntry> {
            consolidate(&ConsolidateInput {
                left: &self.left,
                right: &self.right,
                attached,
                linked,
                exact: exact.iter().collect(),
                fuzzy,
                reusable: &self.reusable,
                carry: &[],
            })
        }
    }

    fn methods(entries: &[CrosswalkEntry]) -> Vec<(Option<&str>, Option<&str>, Method)> {
        entries
            .iter()
            .map(|e| (e.id("ceeb"), e.id("nces"), e.method))
            .collect()
    }

    #[test]
    fn every_identifier_appears_once() {
        let f = Fixture::new(
            vec![rec("A", "a"), rec("B", "b"), rec("C", "c")],
            vec![rec("X", "x"), rec("Y", "y"), rec("Z", "z")],
        );
        let entries = f.run(&[], &[exact("A", "X")], &[fuzzy("B", "Y")]);
        assert_eq!(
            methods(&entries),
            vec![
                (Some("A"), Some("X"), Method::Exact),
                (Some("B"), Some("Y"), Method::Fuzzy),
                (Some("C"), None, Method::NoMatch),
                (None, Some("Z"), Method::NoMatch),
            ]
        );
        assert_eq!(entries[1].relevance, Some(9.5));
        assert_eq!(entries[0].strength.as_deref(), Some("3) name, city, state, state_abbr, zip"));
    }

    #[test]
    fn exact_wins_over_fuzzy() {
        let f = Fixture::new(vec![rec("A", "a"), rec("B", "b")], vec![rec("X", "x")]);
        let entries = f.run(&[], &[exact("A", "X")], &[fuzzy("B", "X")]);
        assert_eq!(
            methods(&entries),
            vec![
                (Some("A"), Some("X"), Method::Exact),
                (Some("B"), None, Method::NoMatch),
            ]
        );
    }

    #[test]
    fn multi_campus_target_takes_an_extra_row() {
        let mut f = Fixture::new(vec![rec("A", "main"), rec("B", "branch")], vec![rec("X", "x")]);
        f.reusable.insert("X".into());
        let entries = f.run(&[], &[exact("A", "X")], &[fuzzy("B", "X")]);
        assert_eq!(
            methods(&entries),
            vec![
                (Some("A"), Some("X"), Method::Exact),
                (Some("B"), Some("X"), Method::Fuzzy),
            ]
        );
    }

    #[test]
    fn linked_rows_carry_their_label() {
        let f = Fixture::new(vec![rec("A", "a")], vec![rec("X", "x")]);
        let linked = [LinkedPair {
            left_id: "A".into(),
            right_id: "X".into(),
        }];
        let entries = f.run(&linked, &[], &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method, Method::Linked);
        assert_eq!(entries[0].strength.as_deref(), Some("0) linked"));
    }

    #[test]
    fn right_side_values_win() {
        let mut l = rec("A", "left spelling");
        l.address = Some("1 left st".into());
        l.zip = Some("11111".into());
        let mut r = rec("X", "right spelling");
        r.address = Some("1 right st".into());
        r.latitude = Some(40.0);
        r.longitude = Some(-75.0);
        let f = Fixture::new(vec![l], vec![r]);
        let entries = f.run(&[], &[exact("A", "X")], &[]);

        let e = &entries[0];
        assert_eq!(e.address.as_deref(), Some("1 right st"));
        assert_eq!(e.zip.as_deref(), Some("11111"));
        assert_eq!(e.latitude, Some(40.0));
        assert_eq!(e.names.get("ceeb").map(String::as_str), Some("left spelling"));
        assert_eq!(e.names.get("nces").map(String::as_str), Some("right spelling"));
    }

    #[test]
    fn joined_row_overrides_descriptive_values() {
        let mut l = rec("A", "a");
        l.address = Some("left addr".into());
        let mut r = rec("X", "x");
        r.address = Some("right addr".into());
        let f = Fixture::new(vec![l], vec![r]);
        let mut pair = exact("A", "X");
        pair.attributes.insert("address".into(), "left addr".into());
        let entries = f.run(&[], &[pair], &[]);
        assert_eq!(entries[0].address.as_deref(), Some("left addr"));
    }

    #[test]
    fn attached_system_fans_out_and_keeps_orphans() {
        let f = Fixture::new(vec![rec("A", "a"), rec("B", "b")], vec![rec("X", "x"), rec("Y", "y")]);
        let mut n1 = rec("n1", "campus one");
        n1.link = Some("X".into());
        let mut n2 = rec("n2", "campus two");
        n2.link = Some("X".into());
        let mut n3 = rec("n3", "unknown");
        n3.link = Some("Q".into());
        let n4 = rec("n4", "no key");
        let nsc = Relation::standard("nsc", vec![n1, n2, n3, n4]);

        let entries = f.run_attached(
            &[],
            &[exact("A", "X")],
            &[],
            vec![Attachment {
                relation: &nsc,
                onto: "nces",
            }],
        );
        let rows: Vec<_> = entries
            .iter()
            .map(|e| (e.id("ceeb"), e.id("nces"), e.id("nsc"), e.method))
            .collect();
        assert_eq!(
            rows,
            vec![
                (Some("A"), Some("X"), Some("n1"), Method::Exact),
                (Some("A"), Some("X"), Some("n2"), Method::Exact),
                (Some("B"), None, None, Method::NoMatch),
                (None, Some("Y"), None, Method::NoMatch),
                (None, None, Some("n3"), Method::NoMatch),
                (None, None, Some("n4"), Method::NoMatch),
            ]
        );
    }
}
