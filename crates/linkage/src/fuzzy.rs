use std::collections::HashMap;

use rayon::prelude::*;

use crate::index::{IndexOptions, TextIndex};
use crate::model::{Candidate, FuzzyOutput, Record};
use crate::scorer::{best_per_source, best_per_target, score_pair, Thresholds};

#[derive(Debug, Clone)]
pub struct FuzzyOptions {
    /// Hits retrieved per source record.
    pub limit: usize,
    pub index: IndexOptions,
    pub thresholds: Thresholds,
    /// After the per-target reduction, also keep at most one target per source.
    pub one_per_source: bool,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            index: IndexOptions::default(),
            thresholds: Thresholds::default(),
            one_per_source: true,
        }
    }
}

/// Retrieve, score and reduce candidates for the unmatched records.
///
/// Retrieval runs in parallel over `sources`; all ordering happens after the
/// results are collected, so the output does not depend on scheduling.
pub fn match_fuzzy(sources: &[&Record], targets: &[&Record], options: &FuzzyOptions) -> FuzzyOutput {
    if sources.is_empty() || targets.is_empty() {
        log::info!(
            "fuzzy: nothing to do ({} sources, {} targets)",
            sources.len(),
            targets.len()
        );
        return FuzzyOutput {
            sources: sources.len(),
            targets: targets.len(),
            ..FuzzyOutput::default()
        };
    }

    let index = TextIndex::build(targets.iter().copied(), options.index.clone());
    let by_id: HashMap<&str, &Record> = targets.iter().map(|r| (r.id.as_str(), *r)).collect();

    let mut candidates: Vec<Candidate> = sources
        .par_iter()
        .flat_map_iter(|source| {
            let query = source.name.as_deref().unwrap_or_default();
            let region = source.attr(&options.index.region);
            index
                .query(query, region, options.limit)
                .into_iter()
                .filter_map(|hit| {
                    let target = by_id.get(hit.id.as_str())?;
                    Some(score_pair(source, target, hit.score, &options.thresholds))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.target_id
            .cmp(&b.target_id)
            .then_with(|| crate::scorer::rank(a, b))
    });

    let accepted: Vec<Candidate> = candidates.iter().filter(|c| c.accepted).cloned().collect();
    let accepted_count = accepted.len();
    let mut matches = best_per_target(accepted);
    if options.one_per_source {
        matches = best_per_source(matches);
        matches.sort_by(|a, b| a.target_id.cmp(&b.target_id));
    }

    log::info!(
        "fuzzy: {} candidates, {} accepted, {} kept",
        candidates.len(),
        accepted_count,
        matches.len()
    );

    FuzzyOutput {
        candidates,
        matches,
        sources: sources.len(),
        targets: targets.len(),
    }
}
