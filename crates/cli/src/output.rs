//! Crosswalk, candidate and report writers.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crosswalk_linkage::model::{Candidate, CrosswalkMeta, CrosswalkResult, CrosswalkSummary};

use crate::exit_codes::EXIT_XWALK_RUNTIME;
use crate::CliError;

/// Report written next to the crosswalk: run metadata, diagnostics and a
/// digest of the exact CSV bytes.
#[derive(Serialize)]
pub struct Report<'a> {
    pub meta: &'a CrosswalkMeta,
    pub summary: &'a CrosswalkSummary,
    pub crosswalk_sha256: String,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn score(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_err(e: impl std::fmt::Display) -> CliError {
    CliError {
        code: EXIT_XWALK_RUNTIME,
        message: format!("cannot encode CSV: {e}"),
        hint: None,
    }
}

pub fn crosswalk_header(meta: &CrosswalkMeta) -> Vec<String> {
    let mut header: Vec<String> = ["method", "strength", "relevance", "edit_ratio", "token_ratio"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(meta.systems.iter().map(|s| format!("{s}_id")));
    header.extend(meta.systems.iter().map(|s| format!("{s}_name")));
    header.extend(
        ["address", "city", "state", "state_abbr", "zip", "latitude", "longitude"]
            .iter()
            .map(|s| s.to_string()),
    );
    header.extend(meta.carry_columns.iter().cloned());
    header
}

/// One row per entry, columns per `crosswalk_header`. Nulls are empty cells.
pub fn crosswalk_csv(result: &CrosswalkResult) -> Result<Vec<u8>, CliError> {
    let meta = &result.meta;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(crosswalk_header(meta)).map_err(write_err)?;

    for entry in &result.entries {
        let mut row: Vec<String> = vec![
            entry.method.to_string(),
            entry.strength.clone().unwrap_or_default(),
            score(entry.relevance),
            score(entry.edit_ratio),
            score(entry.token_ratio),
        ];
        row.extend(meta.systems.iter().map(|s| entry.ids.get(s).cloned().unwrap_or_default()));
        row.extend(meta.systems.iter().map(|s| entry.names.get(s).cloned().unwrap_or_default()));
        for value in [
            &entry.address,
            &entry.city,
            &entry.state,
            &entry.state_abbr,
            &entry.zip,
        ] {
            row.push(value.clone().unwrap_or_default());
        }
        row.push(coordinate(entry.latitude));
        row.push(coordinate(entry.longitude));
        row.extend(
            meta.carry_columns
                .iter()
                .map(|c| entry.extra.get(c).cloned().unwrap_or_default()),
        );
        writer.write_record(&row).map_err(write_err)?;
    }

    writer.into_inner().map_err(write_err)
}

/// Every scored candidate, in review order.
pub fn candidates_csv(candidates: &[Candidate]) -> Result<Vec<u8>, CliError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "source_id",
            "target_id",
            "source_name",
            "target_name",
            "relevance",
            "edit_ratio",
            "token_ratio",
            "accepted",
        ])
        .map_err(write_err)?;
    for c in candidates {
        writer
            .write_record([
                c.source_id.clone(),
                c.target_id.clone(),
                c.source_name.clone().unwrap_or_default(),
                c.target_name.clone().unwrap_or_default(),
                format!("{:.6}", c.relevance),
                format!("{:.6}", c.edit_ratio),
                format!("{:.6}", c.token_ratio),
                c.accepted.to_string(),
            ])
            .map_err(write_err)?;
    }
    writer.into_inner().map_err(write_err)
}
