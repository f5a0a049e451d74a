use std::collections::{HashMap, HashSet};

use crate::model::Record;

/// A left record whose link column named a right record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedPair {
    pub left_id: String,
    pub right_id: String,
}

#[derive(Debug)]
pub struct PrelinkOutput<'a> {
    pub pairs: Vec<LinkedPair>,
    /// Left records left for the cascade.
    pub left: Vec<&'a Record>,
    /// Right records left for the cascade.
    pub right: Vec<&'a Record>,
    /// Links naming a right id that does not exist.
    pub unresolved: usize,
    /// Right ids named by more than one left record; none of them link.
    pub contested: usize,
}

pub const LINKED_STRENGTH: &str = "0) linked";

/// Pair up records that already know each other before any matching runs.
pub fn split_prelinked<'a>(left: &'a [Record], right: &'a [Record]) -> PrelinkOutput<'a> {
    let right_ids: HashSet<&str> = right.iter().map(|r| r.id.as_str()).collect();

    let mut claims: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut unresolved = 0;
    for record in left {
        let Some(link) = record.link.as_deref() else {
            continue;
        };
        if right_ids.contains(link) {
            claims.entry(link).or_default().push(record.id.as_str());
        } else {
            log::debug!("left {} links unknown right id {link}", record.id);
            unresolved += 1;
        }
    }

    let contested = claims.values().filter(|ids| ids.len() > 1).count();
    let mut pairs: Vec<LinkedPair> = claims
        .into_iter()
        .filter_map(|(right_id, left_ids)| match left_ids.as_slice() {
            [left_id] => Some(LinkedPair {
                left_id: left_id.to_string(),
                right_id: right_id.to_string(),
            }),
            _ => None,
        })
        .collect();
    pairs.sort_by(|a, b| a.left_id.cmp(&b.left_id));

    let linked_left: HashSet<&str> = pairs.iter().map(|p| p.left_id.as_str()).collect();
    let linked_right: HashSet<&str> = pairs.iter().map(|p| p.right_id.as_str()).collect();

    if !pairs.is_empty() || unresolved > 0 {
        log::info!(
            "prelink: {} linked, {unresolved} unresolved, {contested} contested",
            pairs.len()
        );
    }

    PrelinkOutput {
        left: left.iter().filter(|r| !linked_left.contains(r.id.as_str())).collect(),
        right: right.iter().filter(|r| !linked_right.contains(r.id.as_str())).collect(),
        pairs,
        unresolved,
        contested,
    }
}
