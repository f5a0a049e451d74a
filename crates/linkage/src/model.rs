use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A column the matching stages can compare on.
///
/// The six standard attributes exist in every system's schema contract.
/// `Column` names a carried passthrough column (e.g. `county_name`) that both
/// sides of the pair must declare before a round may join on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Name,
    Address,
    City,
    State,
    StateAbbr,
    Zip,
    Column(String),
}

impl Attribute {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "name" => Self::Name,
            "address" => Self::Address,
            "city" => Self::City,
            "state" => Self::State,
            "state_abbr" => Self::StateAbbr,
            "zip" => Self::Zip,
            other => Self::Column(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::StateAbbr => "state_abbr",
            Self::Zip => "zip",
            Self::Column(name) => name,
        }
    }

    pub fn standard() -> [Attribute; 6] {
        [
            Self::Name,
            Self::Address,
            Self::City,
            Self::State,
            Self::StateAbbr,
            Self::Zip,
        ]
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Column(_))
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One institution as known to one system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub state_abbr: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub multi_campus: Option<bool>,
    /// Pre-linked partner id (left system) or foreign key (attached system).
    pub link: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, attribute: &Attribute) -> Option<&str> {
        match attribute {
            Attribute::Name => self.name.as_deref(),
            Attribute::Address => self.address.as_deref(),
            Attribute::City => self.city.as_deref(),
            Attribute::State => self.state.as_deref(),
            Attribute::StateAbbr => self.state_abbr.as_deref(),
            Attribute::Zip => self.zip.as_deref(),
            Attribute::Column(column) => self.extra.get(column).map(String::as_str),
        }
    }
}

/// All records of one system plus the attributes its source actually carried.
#[derive(Debug, Clone)]
pub struct Relation {
    pub system: String,
    pub schema: BTreeSet<Attribute>,
    pub records: Vec<Record>,
}

impl Relation {
    pub fn new(system: impl Into<String>, schema: BTreeSet<Attribute>, records: Vec<Record>) -> Self {
        Self {
            system: system.into(),
            schema,
            records,
        }
    }

    /// A relation whose schema is the six standard attributes.
    pub fn standard(system: impl Into<String>, records: Vec<Record>) -> Self {
        Self::new(system, Attribute::standard().into_iter().collect(), records)
    }

    pub fn has(&self, attribute: &Attribute) -> bool {
        self.schema.contains(attribute)
    }
}

/// Pre-loaded relations keyed by system name.
pub struct CrosswalkInput {
    pub relations: BTreeMap<String, Relation>,
}

// ---------------------------------------------------------------------------
// Exact cascade
// ---------------------------------------------------------------------------

/// One step of the exact cascade.
///
/// `partition` is the key the uniqueness check groups joined rows by; it must
/// be a subset of `keys`. `drop` lists non-key attributes whose left value is
/// discarded from the joined row in favour of the right value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub id: String,
    pub keys: Vec<Attribute>,
    pub partition: Vec<Attribute>,
    pub drop: Vec<Attribute>,
}

impl MatchRule {
    pub fn new(id: impl Into<String>, keys: Vec<Attribute>) -> Self {
        let drop = Attribute::standard()
            .into_iter()
            .filter(|a| !keys.contains(a))
            .collect();
        Self {
            id: id.into(),
            partition: keys.clone(),
            keys,
            drop,
        }
    }

    pub fn with_partition(mut self, partition: Vec<Attribute>) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_drop(mut self, drop: Vec<Attribute>) -> Self {
        self.drop = drop;
        self
    }

    /// Provenance label, e.g. `"2) address, city, state, state_abbr, zip"`.
    pub fn strength(&self) -> String {
        let keys: Vec<&str> = self.keys.iter().map(Attribute::as_str).collect();
        format!("{}) {}", self.id, keys.join(", "))
    }

    /// The six-round cascade over name, address, city, state, state_abbr, zip.
    ///
    /// Round 1 checks uniqueness on the location key alone so two differently
    /// named institutions at one address never match on the full key.
    pub fn default_cascade() -> Vec<MatchRule> {
        use Attribute::*;
        vec![
            MatchRule::new("1", vec![Name, Address, City, State, StateAbbr, Zip])
                .with_partition(vec![Address, City, State, StateAbbr, Zip]),
            MatchRule::new("2", vec![Address, City, State, StateAbbr, Zip]),
            MatchRule::new("3", vec![Name, City, State, StateAbbr, Zip]),
            MatchRule::new("4", vec![Name, City, State, StateAbbr]),
            MatchRule::new("5", vec![Name, State, StateAbbr, Zip]),
            MatchRule::new("6", vec![Name, State, StateAbbr]),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPair {
    pub left_id: String,
    pub right_id: String,
    pub round: String,
    pub strength: String,
    /// Joined row: key values plus the surviving non-key attributes.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RoundResult {
    pub round: String,
    pub strength: String,
    pub left_in: usize,
    pub right_in: usize,
    pub matched: Vec<MatchedPair>,
    pub ambiguous_groups: usize,
}

#[derive(Debug)]
pub struct CascadeOutput<'a> {
    pub rounds: Vec<RoundResult>,
    pub residual_left: Vec<&'a Record>,
    pub residual_right: Vec<&'a Record>,
}

impl CascadeOutput<'_> {
    pub fn matched(&self) -> impl Iterator<Item = &MatchedPair> {
        self.rounds.iter().flat_map(|r| r.matched.iter())
    }
}

// ---------------------------------------------------------------------------
// Fuzzy fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub source_id: String,
    pub target_id: String,
    pub source_name: Option<String>,
    pub target_name: Option<String>,
    pub relevance: f64,
    pub edit_ratio: f64,
    pub token_ratio: f64,
    pub accepted: bool,
}

#[derive(Debug, Default)]
pub struct FuzzyOutput {
    /// Every scored candidate, accepted or not.
    pub candidates: Vec<Candidate>,
    /// Accepted candidates that survived the per-target reduction.
    pub matches: Vec<Candidate>,
    pub sources: usize,
    pub targets: usize,
}

// ---------------------------------------------------------------------------
// Crosswalk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Linked,
    Exact,
    Fuzzy,
    NoMatch,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::Exact => write!(f, "exact"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::NoMatch => write!(f, "no-match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrosswalkEntry {
    pub method: Method,
    pub strength: Option<String>,
    pub relevance: Option<f64>,
    pub edit_ratio: Option<f64>,
    pub token_ratio: Option<f64>,
    /// System name -> identifier. Absent systems are null in the output.
    pub ids: BTreeMap<String, String>,
    /// System name -> that system's spelling of the institution name.
    pub names: BTreeMap<String, String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub state_abbr: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl CrosswalkEntry {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            strength: None,
            relevance: None,
            edit_ratio: None,
            token_ratio: None,
            ids: BTreeMap::new(),
            names: BTreeMap::new(),
            address: None,
            city: None,
            state: None,
            state_abbr: None,
            zip: None,
            latitude: None,
            longitude: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn id(&self, system: &str) -> Option<&str> {
        self.ids.get(system).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round: String,
    pub strength: String,
    pub left_in: usize,
    pub right_in: usize,
    pub matched: usize,
    pub ambiguous_groups: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FuzzySummary {
    pub sources: usize,
    pub targets: usize,
    pub candidates: usize,
    pub accepted: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosswalkSummary {
    pub left_records: usize,
    pub right_records: usize,
    pub attached_records: BTreeMap<String, usize>,
    pub linked: usize,
    pub unresolved_links: usize,
    pub rounds: Vec<RoundSummary>,
    pub exact_matches: usize,
    /// Exact pairs over the smaller of the two paired systems.
    pub exact_match_rate: f64,
    pub fuzzy: FuzzySummary,
    pub method_counts: BTreeMap<String, usize>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosswalkMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    /// Output id column order: left, right, then attached systems.
    pub systems: Vec<String>,
    pub carry_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosswalkResult {
    pub meta: CrosswalkMeta,
    pub summary: CrosswalkSummary,
    #[serde(skip)]
    pub entries: Vec<CrosswalkEntry>,
    #[serde(skip)]
    pub candidates: Vec<Candidate>,
}
