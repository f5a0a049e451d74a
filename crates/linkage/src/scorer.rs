//! Secondary scoring and acceptance for retrieved candidates.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::model::{Candidate, Record};
use crate::similarity::{edit_ratio, token_ratio};

/// Acceptance thresholds. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Relevance must exceed this no matter what the string ratios say.
    pub floor: f64,
    /// Relevance above this is accepted on its own.
    pub high: f64,
    pub edit_ratio: f64,
    pub token_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            floor: 4.0,
            high: 8.0,
            edit_ratio: 0.9,
            token_ratio: 0.95,
        }
    }
}

impl Thresholds {
    pub fn accepts(&self, relevance: f64, edit: f64, token: f64) -> bool {
        relevance > self.floor
            && (relevance > self.high || edit > self.edit_ratio || token > self.token_ratio)
    }
}

/// `name` and `name city`; just `name` when city is null.
fn augmented(record: &Record) -> Vec<String> {
    let name = record.name.clone().unwrap_or_default();
    match record.city.as_deref() {
        Some(city) => vec![format!("{name} {city}"), name],
        None => vec![name],
    }
}

/// Max edit and token ratio over every augmented-string combination.
pub fn similarity(source: &Record, target: &Record) -> (f64, f64) {
    let sources = augmented(source);
    let targets = augmented(target);
    let mut best_edit = 0.0f64;
    let mut best_token = 0.0f64;
    for s in &sources {
        for t in &targets {
            best_edit = best_edit.max(edit_ratio(s, t));
            best_token = best_token.max(token_ratio(s, t));
        }
    }
    (best_edit, best_token)
}

pub fn score_pair(source: &Record, target: &Record, relevance: f64, thresholds: &Thresholds) -> Candidate {
    let (edit, token) = similarity(source, target);
    Candidate {
        source_id: source.id.clone(),
        target_id: target.id.clone(),
        source_name: source.name.clone(),
        target_name: target.name.clone(),
        relevance,
        edit_ratio: edit,
        token_ratio: token,
        accepted: thresholds.accepts(relevance, edit, token),
    }
}

/// Strongest first: relevance, edit ratio, token ratio, then ids ascending.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    OrderedFloat(b.relevance)
        .cmp(&OrderedFloat(a.relevance))
        .then_with(|| OrderedFloat(b.edit_ratio).cmp(&OrderedFloat(a.edit_ratio)))
        .then_with(|| OrderedFloat(b.token_ratio).cmp(&OrderedFloat(a.token_ratio)))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.target_id.cmp(&b.target_id))
}

/// Keep the strongest candidate per target, ordered by target id.
pub fn best_per_target(candidates: Vec<Candidate>) -> Vec<Candidate> {
    best_by(candidates, |c| c.target_id.clone())
}

/// Keep the strongest candidate per source, ordered by source id.
pub fn best_per_source(candidates: Vec<Candidate>) -> Vec<Candidate> {
    best_by(candidates, |c| c.source_id.clone())
}

fn best_by(candidates: Vec<Candidate>, key: impl Fn(&Candidate) -> String) -> Vec<Candidate> {
    let mut best: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in candidates {
        let slot = key(&candidate);
        match best.get(&slot) {
            Some(current) if rank(current, &candidate) != Ordering::Greater => {}
            _ => {
                best.insert(slot, candidate);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: &str, name: &str, city: Option<&str>) -> Record {
        Record {
            id: id.into(),
            name: Some(name.into()),
            city: city.map(str::to_string),
            ..Record::default()
        }
    }

    fn candidate(source: &str, target: &str, relevance: f64, edit: f64, token: f64) -> Candidate {
        Candidate {
            source_id: source.into(),
            target_id: target.into(),
            source_name: None,
            target_name: None,
            relevance,
            edit_ratio: edit,
            token_ratio: token,
            accepted: true,
        }
    }

    #[test]
    fn high_relevance_carries_weak_strings() {
        assert!(Thresholds::default().accepts(9.0, 0.2, 0.2));
    }

    #[test]
    fn strong_strings_carry_moderate_relevance() {
        assert!(Thresholds::default().accepts(5.0, 0.95, 0.0));
        assert!(Thresholds::default().accepts(5.0, 0.0, 0.96));
    }

    #[test]
    fn floor_blocks_string_rescue() {
        assert!(!Thresholds::default().accepts(3.0, 0.99, 0.99));
        assert!(!Thresholds::default().accepts(4.0, 1.0, 1.0));
    }

    #[test]
    fn moderate_everything_is_rejected() {
        assert!(!Thresholds::default().accepts(6.0, 0.9, 0.95));
    }

    #[test]
    fn city_augmentation_takes_the_best_combination() {
        // Source name already includes the city; target keeps it separate.
        let source = named("s", "springfield central high", None);
        let target = named("t", "central high", Some("springfield"));
        let (edit, token) = similarity(&source, &target);
        assert!(token == 1.0, "token ratio was {token}");
        assert!(edit < 1.0);
    }

    #[test]
    fn missing_name_scores_zero() {
        let source = Record::new("s");
        let target = named("t", "central high", None);
        assert_eq!(similarity(&source, &target), (0.0, 0.0));
    }

    #[test]
    fn score_pair_applies_thresholds() {
        let source = named("s", "st marys academy", Some("troy"));
        let target = named("t", "st marys academy", Some("troy"));
        let c = score_pair(&source, &target, 5.0, &Thresholds::default());
        assert!(c.accepted);
        assert_eq!(c.edit_ratio, 1.0);

        let c = score_pair(&source, &target, 3.5, &Thresholds::default());
        assert!(!c.accepted);
    }

    #[test]
    fn one_letter_spelling_variant_passes_on_edit_ratio() {
        let source = named("s", "saint joseph school", None);
        let target = named("t", "saint josef school", None);
        let c = score_pair(&source, &target, 5.0, &Thresholds::default());
        assert!((c.edit_ratio - 34.0 / 37.0).abs() < 1e-12, "edit ratio was {}", c.edit_ratio);
        assert!(c.token_ratio <= 0.95);
        assert!(c.accepted);
    }

    #[test]
    fn one_winner_per_target() {
        let kept = best_per_target(vec![
            candidate("s1", "t1", 6.0, 0.95, 0.5),
            candidate("s2", "t1", 9.0, 0.1, 0.1),
            candidate("s3", "t2", 5.0, 0.92, 0.3),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].source_id.as_str(), kept[0].target_id.as_str()), ("s2", "t1"));
        assert_eq!((kept[1].source_id.as_str(), kept[1].target_id.as_str()), ("s3", "t2"));
    }

    #[test]
    fn ties_fall_through_to_edit_then_source_id() {
        let kept = best_per_target(vec![
            candidate("s9", "t", 7.0, 0.5, 0.5),
            candidate("s1", "t", 7.0, 0.5, 0.5),
            candidate("s5", "t", 7.0, 0.6, 0.1),
        ]);
        assert_eq!(kept[0].source_id, "s5");

        let kept = best_per_target(vec![
            candidate("s9", "t", 7.0, 0.5, 0.5),
            candidate("s1", "t", 7.0, 0.5, 0.5),
        ]);
        assert_eq!(kept[0].source_id, "s1");
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let mut input = vec![
            candidate("a", "t1", 5.5, 0.91, 0.0),
            candidate("b", "t1", 5.5, 0.93, 0.0),
            candidate("b", "t2", 8.5, 0.0, 0.0),
            candidate("c", "t2", 8.5, 0.0, 0.0),
        ];
        let forward = best_per_target(input.clone());
        input.reverse();
        assert_eq!(forward, best_per_target(input));
    }

    #[test]
    fn per_source_reduction() {
        let kept = best_per_source(vec![
            candidate("a", "t1", 5.5, 0.91, 0.0),
            candidate("a", "t2", 6.5, 0.91, 0.0),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].target_id, "t2");
    }
}
