//! `crosswalk-linkage`: record linkage engine for institution crosswalks.
//!
//! Pure engine crate: receives pre-loaded relations, returns one crosswalk row
//! per identifier plus run diagnostics. Reading CSV text is supported through
//! `load_csv_records`; file IO and output formats live in the CLI.

pub mod cascade;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod model;
pub mod normalize;
pub mod prelink;
pub mod scorer;
pub mod similarity;
pub mod summary;

pub use config::CrosswalkConfig;
pub use engine::{load_csv_records, run};
pub use error::CrosswalkError;
pub use model::{Attribute, CrosswalkEntry, CrosswalkInput, CrosswalkResult, MatchRule, Method, Record, Relation};
pub use normalize::Normalizer;
