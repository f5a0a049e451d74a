use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::CrosswalkError;
use crate::model::{Attribute, CascadeOutput, MatchRule, MatchedPair, Record, Relation, RoundResult};

/// Fail before any round runs if a rule, or the fuzzy region filter when one
/// is given, needs an attribute either side lacks.
pub fn check_schema(
    rules: &[MatchRule],
    region: Option<&Attribute>,
    left: &Relation,
    right: &Relation,
) -> Result<(), CrosswalkError> {
    for rule in rules {
        for attribute in &rule.keys {
            for relation in [left, right] {
                if !relation.has(attribute) {
                    return Err(CrosswalkError::MissingAttribute {
                        system: relation.system.clone(),
                        round: rule.id.clone(),
                        attribute: attribute.to_string(),
                    });
                }
            }
        }
    }
    if let Some(attribute) = region {
        for relation in [left, right] {
            if !relation.has(attribute) {
                return Err(CrosswalkError::MissingRegion {
                    system: relation.system.clone(),
                    attribute: attribute.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Run every rule in order, each on the residuals of the one before.
pub fn run_cascade<'a>(
    left: Vec<&'a Record>,
    right: Vec<&'a Record>,
    rules: &[MatchRule],
) -> CascadeOutput<'a> {
    let mut residual_left = left;
    let mut residual_right = right;
    let mut rounds = Vec::with_capacity(rules.len());

    for rule in rules {
        let (result, next_left, next_right) = run_round(rule, &residual_left, &residual_right);
        log::info!(
            "round {}: {} matched, {} ambiguous groups skipped, {} left / {} right remain",
            rule.id,
            result.matched.len(),
            result.ambiguous_groups,
            next_left.len(),
            next_right.len(),
        );
        rounds.push(result);
        residual_left = next_left;
        residual_right = next_right;
    }

    CascadeOutput {
        rounds,
        residual_left,
        residual_right,
    }
}

/// One join round. Returns the matched pairs and both residuals.
///
/// A left/right pair is kept only when its partition group holds exactly one
/// joined row. Records in ambiguous groups stay in the residuals.
pub fn run_round<'a>(
    rule: &MatchRule,
    left: &[&'a Record],
    right: &[&'a Record],
) -> (RoundResult, Vec<&'a Record>, Vec<&'a Record>) {
    let mut right_by_key: HashMap<Vec<&str>, Vec<&'a Record>> = HashMap::new();
    for record in right {
        if let Some(key) = key_of(record, &rule.keys) {
            right_by_key.entry(key).or_default().push(record);
        }
    }

    // Inner join on every key attribute.
    let mut joined: Vec<(&'a Record, &'a Record)> = Vec::new();
    for l in left {
        let Some(key) = key_of(l, &rule.keys) else {
            continue;
        };
        if let Some(partners) = right_by_key.get(&key) {
            joined.extend(partners.iter().map(|r| (*l, *r)));
        }
    }

    // Partition keys are a subset of the join keys, so the left side's values
    // stand for both.
    let mut group_sizes: HashMap<Vec<&str>, usize> = HashMap::new();
    for (l, _) in &joined {
        if let Some(group) = key_of(l, &rule.partition) {
            *group_sizes.entry(group).or_insert(0) += 1;
        }
    }
    let ambiguous_groups = group_sizes.values().filter(|n| **n > 1).count();
    if ambiguous_groups > 0 {
        log::debug!("round {}: {ambiguous_groups} ambiguous groups", rule.id);
    }

    let strength = rule.strength();
    let mut matched: Vec<MatchedPair> = joined
        .into_iter()
        .filter(|(l, _)| {
            key_of(l, &rule.partition)
                .and_then(|group| group_sizes.get(&group))
                .is_some_and(|n| *n == 1)
        })
        .map(|(l, r)| MatchedPair {
            left_id: l.id.clone(),
            right_id: r.id.clone(),
            round: rule.id.clone(),
            strength: strength.clone(),
            attributes: joined_attributes(rule, l, r),
        })
        .collect();
    matched.sort_by(|a, b| a.left_id.cmp(&b.left_id).then_with(|| a.right_id.cmp(&b.right_id)));

    let matched_left: HashSet<&str> = matched.iter().map(|m| m.left_id.as_str()).collect();
    let matched_right: HashSet<&str> = matched.iter().map(|m| m.right_id.as_str()).collect();
    let residual_left: Vec<&'a Record> = left
        .iter()
        .copied()
        .filter(|r| !matched_left.contains(r.id.as_str()))
        .collect();
    let residual_right: Vec<&'a Record> = right
        .iter()
        .copied()
        .filter(|r| !matched_right.contains(r.id.as_str()))
        .collect();

    let result = RoundResult {
        round: rule.id.clone(),
        strength,
        left_in: left.len(),
        right_in: right.len(),
        matched,
        ambiguous_groups,
    };
    (result, residual_left, residual_right)
}

/// Key values in rule order; `None` if any is null (null never joins).
fn key_of<'r>(record: &'r Record, attributes: &[Attribute]) -> Option<Vec<&'r str>> {
    attributes.iter().map(|a| record.attr(a)).collect()
}

/// The widened row for a matched pair: shared key values, then each
/// remaining attribute from the left unless the rule drops it.
fn joined_attributes(rule: &MatchRule, left: &Record, right: &Record) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();
    for attribute in &rule.keys {
        if let Some(value) = left.attr(attribute) {
            row.insert(attribute.to_string(), value.to_string());
        }
    }
    for attribute in Attribute::standard() {
        if rule.keys.contains(&attribute) {
            continue;
        }
        let value = if rule.drop.contains(&attribute) {
            right.attr(&attribute)
        } else {
            left.attr(&attribute).or_else(|| right.attr(&attribute))
        };
        if let Some(value) = value {
            row.insert(attribute.to_string(), value.to_string());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn school(id: &str, name: &str, address: &str, city: &str, state: &str, zip: &str) -> Record {
        Record {
            id: id.into(),
            name: Some(name.into()),
            address: Some(address.into()),
            city: Some(city.into()),
            state: Some(state.into()),
            state_abbr: Some(state.into()),
            zip: Some(zip.into()),
            ..Record::default()
        }
    }

    fn refs(records: &[Record]) -> Vec<&Record> {
        records.iter().collect()
    }

    fn ids(records: &[&Record]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn full_key_matches_only_the_exact_zip() {
        let left = vec![
            school("A", "central high", "1 main st", "springfield", "IL", "62701"),
            school("B", "central high", "1 main st", "springfield", "IL", "62704"),
        ];
        let right = vec![school("X", "central high", "1 main st", "springfield", "IL", "62701")];
        let rule = &MatchRule::default_cascade()[0];

        let (result, rest_left, rest_right) = run_round(rule, &refs(&left), &refs(&right));
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].left_id, "A");
        assert_eq!(result.matched[0].right_id, "X");
        assert_eq!(ids(&rest_left), vec!["B"]);
        assert!(rest_right.is_empty());
        assert_eq!(
            result.matched[0].strength,
            "1) name, address, city, state, state_abbr, zip"
        );
    }

    #[test]
    fn ambiguous_group_is_skipped_and_stays_residual() {
        let left = vec![
            school("A", "lincoln elementary", "9 oak ave", "salem", "OR", "97301"),
            school("B", "lincoln elementary", "9 oak ave", "salem", "OR", "97301"),
        ];
        let right = vec![school("X", "lincoln elementary", "9 oak ave", "salem", "OR", "97301")];
        let rule = MatchRule::new(
            "t",
            vec![Attribute::Name, Attribute::City, Attribute::State, Attribute::Zip],
        );

        let (result, rest_left, rest_right) = run_round(&rule, &refs(&left), &refs(&right));
        assert!(result.matched.is_empty());
        assert_eq!(result.ambiguous_groups, 1);
        assert_eq!(ids(&rest_left), vec!["A", "B"]);
        assert_eq!(ids(&rest_right), vec!["X"]);
    }

    #[test]
    fn location_partition_blocks_two_names_at_one_address() {
        // Two different schools share a campus address; each matches its own
        // name on the full key, but round 1 checks uniqueness by location only.
        let left = vec![
            school("A", "north middle", "5 elm rd", "dover", "DE", "19901"),
            school("B", "north high", "5 elm rd", "dover", "DE", "19901"),
        ];
        let right = vec![
            school("X", "north middle", "5 elm rd", "dover", "DE", "19901"),
            school("Y", "north high", "5 elm rd", "dover", "DE", "19901"),
        ];
        let rule = &MatchRule::default_cascade()[0];
        let (result, _, _) = run_round(rule, &refs(&left), &refs(&right));
        assert!(result.matched.is_empty());
        assert_eq!(result.ambiguous_groups, 1);

        // Round 3 (name, city, state, state_abbr, zip) resolves both.
        let rules = MatchRule::default_cascade();
        let out = run_cascade(refs(&left), refs(&right), &rules);
        let pairs: Vec<(String, String)> = out
            .matched()
            .map(|m| (m.left_id.clone(), m.right_id.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![("A".to_string(), "X".to_string()), ("B".to_string(), "Y".to_string())]
        );
        assert!(out.rounds[2].matched.len() == 2);
    }

    #[test]
    fn null_keys_never_join() {
        let mut l = school("A", "hope academy", "1 a st", "reno", "NV", "89501");
        l.zip = None;
        let mut r = school("X", "hope academy", "1 a st", "reno", "NV", "89501");
        r.zip = None;
        let left = vec![l];
        let right = vec![r];
        let rule = MatchRule::new("z", vec![Attribute::Name, Attribute::Zip]);
        let (result, rest_left, rest_right) = run_round(&rule, &refs(&left), &refs(&right));
        assert!(result.matched.is_empty());
        assert_eq!(rest_left.len(), 1);
        assert_eq!(rest_right.len(), 1);
    }

    #[test]
    fn later_rounds_pick_up_what_earlier_rounds_left() {
        let left = vec![
            school("A", "central high", "1 main st", "springfield", "IL", "62701"),
            school("B", "westside prep", "77 lake dr", "springfield", "IL", "62704"),
        ];
        let right = vec![
            school("X", "central high", "1 main st", "springfield", "IL", "62701"),
            // Same school as B, different address spelling.
            school("Y", "westside prep", "77 lake drive", "springfield", "IL", "62704"),
        ];
        let out = run_cascade(refs(&left), refs(&right), &MatchRule::default_cascade());

        assert_eq!(out.rounds.len(), 6);
        assert_eq!(out.rounds[0].matched.len(), 1);
        assert_eq!(out.rounds[0].matched[0].left_id, "A");
        assert_eq!(out.rounds[1].matched.len(), 0);
        assert_eq!(out.rounds[2].matched.len(), 1);
        assert_eq!(out.rounds[2].matched[0].left_id, "B");
        assert_eq!(out.rounds[2].left_in, 1);
        assert!(out.residual_left.is_empty());
        assert!(out.residual_right.is_empty());
    }

    #[test]
    fn residuals_shrink_monotonically() {
        let left = vec![
            school("A", "a school", "1 st", "x", "IL", "1"),
            school("B", "b school", "2 st", "x", "IL", "2"),
            school("C", "c school", "3 st", "y", "IL", "3"),
        ];
        let right = vec![
            school("X", "a school", "1 st", "x", "IL", "1"),
            school("Y", "b school", "9 st", "x", "IL", "2"),
            school("Z", "q school", "3 st", "q", "IL", "3"),
        ];
        let out = run_cascade(refs(&left), refs(&right), &MatchRule::default_cascade());
        for pair in out.rounds.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert_eq!(next.left_in, prev.left_in - prev.matched.len());
            assert_eq!(next.right_in, prev.right_in - prev.matched.len());
        }
        let mut seen = BTreeSet::new();
        for m in out.matched() {
            assert!(seen.insert(m.left_id.clone()), "left id matched twice");
        }
    }

    #[test]
    fn dropped_attributes_take_the_right_value() {
        let left = vec![school("A", "ceeb spelling", "1 main st", "troy", "NY", "12180")];
        let right = vec![school("X", "registry spelling", "1 main st", "troy", "NY", "12180")];
        let rule = &MatchRule::default_cascade()[1];
        let (result, _, _) = run_round(rule, &refs(&left), &refs(&right));
        assert_eq!(result.matched.len(), 1);
        let row = &result.matched[0].attributes;
        assert_eq!(row.get("name").map(String::as_str), Some("registry spelling"));
        assert_eq!(row.get("address").map(String::as_str), Some("1 main st"));
    }

    #[test]
    fn schema_check_names_the_missing_attribute() {
        let full = Relation::standard("ceeb", vec![]);
        let mut schema: BTreeSet<Attribute> = Attribute::standard().into_iter().collect();
        schema.remove(&Attribute::Address);
        let partial = Relation::new("nces", schema, vec![]);

        let err = check_schema(&MatchRule::default_cascade(), None, &full, &partial).unwrap_err();
        match err {
            CrosswalkError::MissingAttribute { system, round, attribute } => {
                assert_eq!(system, "nces");
                assert_eq!(round, "1");
                assert_eq!(attribute, "address");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(check_schema(&MatchRule::default_cascade(), None, &full, &full).is_ok());
    }

    #[test]
    fn schema_check_covers_the_region_attribute() {
        let rules = vec![MatchRule::new("name", vec![Attribute::Name, Attribute::City])];
        let full = Relation::standard("ceeb", vec![]);
        let schema: BTreeSet<Attribute> =
            [Attribute::Name, Attribute::City, Attribute::State].into_iter().collect();
        let no_abbr = Relation::new("nces", schema, vec![]);

        assert!(check_schema(&rules, None, &full, &no_abbr).is_ok());
        assert!(check_schema(&rules, Some(&Attribute::State), &full, &no_abbr).is_ok());
        let err = check_schema(&rules, Some(&Attribute::StateAbbr), &full, &no_abbr).unwrap_err();
        match err {
            CrosswalkError::MissingRegion { system, attribute } => {
                assert_eq!(system, "nces");
                assert_eq!(attribute, "state_abbr");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn carried_column_can_be_a_key() {
        let mut l = school("A", "st mary", "1 a", "x", "MD", "1");
        l.extra.insert("county_name".into(), "harford".into());
        let mut r1 = school("X", "st mary", "2 b", "y", "MD", "2");
        r1.extra.insert("county_name".into(), "harford".into());
        let mut r2 = school("Y", "st mary", "3 c", "z", "MD", "3");
        r2.extra.insert("county_name".into(), "cecil".into());
        let left = vec![l];
        let right = vec![r1, r2];

        let rule = MatchRule::new(
            "c",
            vec![Attribute::Name, Attribute::State, Attribute::Column("county_name".into())],
        );
        let (result, _, rest_right) = run_round(&rule, &refs(&left), &refs(&right));
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].right_id, "X");
        assert_eq!(ids(&rest_right), vec!["Y"]);
    }
}
