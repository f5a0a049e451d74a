use std::collections::BTreeMap;

use crate::model::{
    CrosswalkEntry, CrosswalkSummary, FuzzyOutput, FuzzySummary, Relation, RoundResult, RoundSummary,
};
use crate::prelink::PrelinkOutput;

/// Compute run diagnostics from every stage's output.
pub fn compute_summary(
    left: &Relation,
    right: &Relation,
    attached: &[&Relation],
    prelink: &PrelinkOutput<'_>,
    rounds: &[RoundResult],
    fuzzy: &FuzzyOutput,
    entries: &[CrosswalkEntry],
) -> CrosswalkSummary {
    let rounds: Vec<RoundSummary> = rounds
        .iter()
        .map(|r| RoundSummary {
            round: r.round.clone(),
            strength: r.strength.clone(),
            left_in: r.left_in,
            right_in: r.right_in,
            matched: r.matched.len(),
            ambiguous_groups: r.ambiguous_groups,
        })
        .collect();
    let exact_matches: usize = rounds.iter().map(|r| r.matched).sum();

    let smaller = left.records.len().min(right.records.len());
    let exact_match_rate = if smaller == 0 {
        0.0
    } else {
        exact_matches as f64 / smaller as f64
    };

    let mut method_counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        *method_counts.entry(entry.method.to_string()).or_insert(0) += 1;
    }

    CrosswalkSummary {
        left_records: left.records.len(),
        right_records: right.records.len(),
        attached_records: attached
            .iter()
            .map(|r| (r.system.clone(), r.records.len()))
            .collect(),
        linked: prelink.pairs.len(),
        unresolved_links: prelink.unresolved,
        rounds,
        exact_matches,
        exact_match_rate,
        fuzzy: FuzzySummary {
            sources: fuzzy.sources,
            targets: fuzzy.targets,
            candidates: fuzzy.candidates.len(),
            accepted: fuzzy.candidates.iter().filter(|c| c.accepted).count(),
            kept: fuzzy.matches.len(),
        },
        method_counts,
        total_rows: entries.len(),
    }
}
