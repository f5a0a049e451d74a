use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::CrosswalkError;
use crate::index::IndexOptions;
use crate::model::{Attribute, MatchRule};
use crate::scorer::Thresholds;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CrosswalkConfig {
    pub name: String,
    pub systems: BTreeMap<String, SystemConfig>,
    pub pair: PairConfig,
    #[serde(default)]
    pub rounds: Vec<RoundConfig>,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    pub file: String,
    #[serde(default)]
    pub columns: ColumnMapping,
    /// Passthrough columns copied into the crosswalk (and joinable by rounds).
    #[serde(default)]
    pub carry: Vec<String>,
    /// Column holding an already-known identifier in the right system.
    #[serde(default)]
    pub link: Option<String>,
    /// Column flagging registry entries that cover several campuses.
    #[serde(default)]
    pub multi_campus: Option<String>,
    #[serde(default)]
    pub attach: Option<AttachConfig>,
}

/// Source column names. Every field defaults to the attribute's own name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub state_abbr: String,
    pub zip: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "id".into(),
            name: "name".into(),
            address: "address".into(),
            city: "city".into(),
            state: "state".into(),
            state_abbr: "state_abbr".into(),
            zip: "zip".into(),
            latitude: "latitude".into(),
            longitude: "longitude".into(),
        }
    }
}

/// Joins a non-paired system onto the crosswalk through a foreign key.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachConfig {
    /// The paired system whose identifier the foreign key holds.
    pub system: String,
    /// Column in the attached system's file holding that identifier.
    pub column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub left: String,
    pub right: String,
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundConfig {
    pub id: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub partition: Option<Vec<String>>,
    #[serde(default)]
    pub drop: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Normalize + Fuzzy + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub fold: bool,
    pub tighten: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            fold: true,
            tighten: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionField {
    State,
    StateAbbr,
}

impl RegionField {
    pub fn attribute(&self) -> Attribute {
        match self {
            Self::State => Attribute::State,
            Self::StateAbbr => Attribute::StateAbbr,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzyConfig {
    pub enabled: bool,
    pub limit: usize,
    pub region: RegionField,
    pub floor: f64,
    pub high: f64,
    pub edit_ratio: f64,
    pub token_ratio: f64,
    pub one_per_source: bool,
    pub reuse_multi_campus: bool,
    pub k1: f64,
    pub b: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        let index = IndexOptions::default();
        Self {
            enabled: true,
            limit: 10,
            region: RegionField::State,
            floor: thresholds.floor,
            high: thresholds.high,
            edit_ratio: thresholds.edit_ratio,
            token_ratio: thresholds.token_ratio,
            one_per_source: true,
            reuse_multi_campus: false,
            k1: index.k1,
            b: index.b,
        }
    }
}

impl FuzzyConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            floor: self.floor,
            high: self.high,
            edit_ratio: self.edit_ratio,
            token_ratio: self.token_ratio,
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            region: self.region.attribute(),
            k1: self.k1,
            b: self.b,
            ..IndexOptions::default()
        }
    }

    /// The attribute both sides must carry for the fuzzy stage; `None` when it is off.
    pub fn required_region(&self) -> Option<Attribute> {
        self.enabled.then(|| self.region.attribute())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub crosswalk: Option<String>,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub candidates: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CrosswalkConfig {
    pub fn from_toml(input: &str) -> Result<Self, CrosswalkError> {
        let config: CrosswalkConfig =
            toml::from_str(input).map_err(|e| CrosswalkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CrosswalkError> {
        let left = &self.pair.left;
        let right = &self.pair.right;

        for system in [left, right] {
            if !self.systems.contains_key(system) {
                return Err(CrosswalkError::UnknownSystem(format!(
                    "pair references '{system}', which is not declared under [systems]"
                )));
            }
        }
        if left == right {
            return Err(CrosswalkError::ConfigValidation(format!(
                "pair must name two different systems, got '{left}' twice"
            )));
        }

        for (name, system) in &self.systems {
            let paired = name == left || name == right;
            match (&system.attach, paired) {
                (Some(_), true) => {
                    return Err(CrosswalkError::ConfigValidation(format!(
                        "system '{name}' is paired and cannot also be attached"
                    )));
                }
                (None, false) => {
                    return Err(CrosswalkError::ConfigValidation(format!(
                        "system '{name}' is neither paired nor attached"
                    )));
                }
                (Some(attach), false) if attach.system != *left && attach.system != *right => {
                    return Err(CrosswalkError::UnknownSystem(format!(
                        "system '{name}' attaches to '{}', which is not a paired system",
                        attach.system
                    )));
                }
                _ => {}
            }
            if system.link.is_some() && name != left {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "system '{name}': link columns are only supported on the left system"
                )));
            }
        }

        let rules = self.rules();
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "duplicate round id '{}'",
                    rule.id
                )));
            }
            self.validate_rule(rule)?;
        }

        self.validate_fuzzy()
    }

    /// Effective cascade: the configured rounds, or the default six.
    pub fn rules(&self) -> Vec<MatchRule> {
        if self.rounds.is_empty() {
            return MatchRule::default_cascade();
        }
        self.rounds
            .iter()
            .map(|round| {
                let keys = parse_attributes(&round.keys);
                let mut rule = MatchRule::new(round.id.clone(), keys);
                if let Some(ref partition) = round.partition {
                    rule = rule.with_partition(parse_attributes(partition));
                }
                if let Some(ref drop) = round.drop {
                    rule = rule.with_drop(parse_attributes(drop));
                }
                rule
            })
            .collect()
    }

    /// Attached systems in name order, with the paired system they hang off.
    pub fn attached(&self) -> Vec<(&str, &SystemConfig)> {
        self.systems
            .iter()
            .filter(|(_, system)| system.attach.is_some())
            .map(|(name, system)| (name.as_str(), system))
            .collect()
    }

    /// Output id column order.
    pub fn system_order(&self) -> Vec<String> {
        let mut order = vec![self.pair.left.clone(), self.pair.right.clone()];
        order.extend(self.attached().into_iter().map(|(name, _)| name.to_string()));
        order
    }

    /// Carried columns across all systems, first-declared first.
    pub fn carry_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for name in self.system_order() {
            if let Some(system) = self.systems.get(&name) {
                for column in &system.carry {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
            }
        }
        columns
    }

    fn validate_rule(&self, rule: &MatchRule) -> Result<(), CrosswalkError> {
        if rule.keys.is_empty() {
            return Err(CrosswalkError::ConfigValidation(format!(
                "round '{}' has no keys",
                rule.id
            )));
        }
        let unique: BTreeSet<&Attribute> = rule.keys.iter().collect();
        if unique.len() != rule.keys.len() {
            return Err(CrosswalkError::ConfigValidation(format!(
                "round '{}' repeats a key attribute",
                rule.id
            )));
        }
        if rule.partition.is_empty() {
            return Err(CrosswalkError::ConfigValidation(format!(
                "round '{}' has an empty partition",
                rule.id
            )));
        }
        if let Some(stray) = rule.partition.iter().find(|a| !rule.keys.contains(a)) {
            return Err(CrosswalkError::ConfigValidation(format!(
                "round '{}': partition attribute '{stray}' is not one of its keys",
                rule.id
            )));
        }
        if let Some(clash) = rule.drop.iter().find(|a| rule.keys.contains(a)) {
            return Err(CrosswalkError::ConfigValidation(format!(
                "round '{}': cannot drop key attribute '{clash}'",
                rule.id
            )));
        }

        // Non-standard attributes must be carried by both sides of the pair.
        let left = &self.systems[&self.pair.left];
        let right = &self.systems[&self.pair.right];
        for attribute in rule.keys.iter().chain(rule.drop.iter()) {
            if let Attribute::Column(column) = attribute {
                if !left.carry.contains(column) || !right.carry.contains(column) {
                    return Err(CrosswalkError::UnknownAttribute {
                        round: rule.id.clone(),
                        attribute: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_fuzzy(&self) -> Result<(), CrosswalkError> {
        let fuzzy = &self.fuzzy;
        if fuzzy.limit == 0 {
            return Err(CrosswalkError::ConfigValidation(
                "fuzzy.limit must be at least 1".into(),
            ));
        }
        if fuzzy.floor > fuzzy.high {
            return Err(CrosswalkError::ConfigValidation(format!(
                "fuzzy.floor ({}) must not exceed fuzzy.high ({})",
                fuzzy.floor, fuzzy.high
            )));
        }
        for (field, value) in [
            ("edit_ratio", fuzzy.edit_ratio),
            ("token_ratio", fuzzy.token_ratio),
            ("b", fuzzy.b),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "fuzzy.{field} must be within [0, 1], got {value}"
                )));
            }
        }
        if fuzzy.k1 < 0.0 {
            return Err(CrosswalkError::ConfigValidation(format!(
                "fuzzy.k1 must not be negative, got {}",
                fuzzy.k1
            )));
        }
        Ok(())
    }
}

fn parse_attributes(raw: &[String]) -> Vec<Attribute> {
    raw.iter().map(|s| Attribute::parse(s)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
