use std::collections::{BTreeSet, HashSet};

use crate::cascade::{check_schema, run_cascade};
use crate::config::{CrosswalkConfig, SystemConfig};
use crate::consolidate::{consolidate, Attachment, ConsolidateInput};
use crate::error::CrosswalkError;
use crate::fuzzy::{match_fuzzy, FuzzyOptions};
use crate::model::{
    Attribute, CrosswalkInput, CrosswalkMeta, CrosswalkResult, FuzzyOutput, Record, Relation,
};
use crate::normalize::{region_code, trim_code, Normalizer};
use crate::prelink::split_prelinked;
use crate::summary::compute_summary;

/// Run the crosswalk per config: prelink, cascade, fuzzy fallback, consolidate.
pub fn run(config: &CrosswalkConfig, input: &CrosswalkInput) -> Result<CrosswalkResult, CrosswalkError> {
    let left = relation(input, &config.pair.left)?;
    let right = relation(input, &config.pair.right)?;

    let rules = config.rules();
    let region = config.fuzzy.required_region();
    check_schema(&rules, region.as_ref(), left, right)?;

    let prelink = split_prelinked(&left.records, &right.records);
    let cascade = run_cascade(prelink.left.clone(), prelink.right.clone(), &rules);
    let exact: Vec<_> = cascade.matched().collect();
    log::info!(
        "cascade: {} exact pairs over {} rounds",
        exact.len(),
        cascade.rounds.len()
    );

    // Multi-campus registry entries stay available to the fuzzy stage even
    // after an exact match.
    let mut reusable: HashSet<String> = HashSet::new();
    let mut targets: Vec<&Record> = cascade.residual_right.clone();
    if config.fuzzy.reuse_multi_campus {
        let exact_right: HashSet<&str> = exact.iter().map(|m| m.right_id.as_str()).collect();
        for record in &right.records {
            if exact_right.contains(record.id.as_str()) && record.multi_campus != Some(false) {
                reusable.insert(record.id.clone());
                targets.push(record);
            }
        }
        log::info!("fuzzy: {} multi-campus targets reopened", reusable.len());
    }

    let fuzzy = if config.fuzzy.enabled {
        let options = FuzzyOptions {
            limit: config.fuzzy.limit,
            index: config.fuzzy.index_options(),
            thresholds: config.fuzzy.thresholds(),
            one_per_source: config.fuzzy.one_per_source,
        };
        match_fuzzy(&cascade.residual_left, &targets, &options)
    } else {
        FuzzyOutput {
            sources: cascade.residual_left.len(),
            targets: targets.len(),
            ..FuzzyOutput::default()
        }
    };

    let mut attached_relations = Vec::new();
    let mut attachments = Vec::new();
    for (name, system) in config.attached() {
        let Some(attach) = &system.attach else {
            continue;
        };
        let attached = relation(input, name)?;
        attached_relations.push(attached);
        attachments.push(Attachment {
            relation: attached,
            onto: attach.system.as_str(),
        });
    }

    let carry = config.carry_columns();
    let entries = consolidate(&ConsolidateInput {
        left,
        right,
        attached: attachments,
        linked: &prelink.pairs,
        exact: exact.clone(),
        fuzzy: &fuzzy.matches,
        reusable: &reusable,
        carry: &carry,
    });

    let summary = compute_summary(
        left,
        right,
        &attached_relations,
        &prelink,
        &cascade.rounds,
        &fuzzy,
        &entries,
    );
    log::info!(
        "crosswalk: {} rows ({})",
        summary.total_rows,
        summary
            .method_counts
            .iter()
            .map(|(method, n)| format!("{method}={n}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let candidates = fuzzy.candidates;
    Ok(CrosswalkResult {
        meta: CrosswalkMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            systems: config.system_order(),
            carry_columns: carry,
        },
        summary,
        entries,
        candidates,
    })
}

fn relation<'a>(input: &'a CrosswalkInput, system: &str) -> Result<&'a Relation, CrosswalkError> {
    input
        .relations
        .get(system)
        .ok_or_else(|| CrosswalkError::UnknownSystem(format!("no records loaded for system '{system}'")))
}

/// Load one system's CSV into a relation, applying the column mapping and
/// text normalization.
///
/// Only the id column is required among the standard columns; a missing
/// standard column just leaves that attribute out of the schema. Columns the
/// config names explicitly (carry, link, multi-campus flag, attach key) must
/// exist.
pub fn load_csv_records(
    system_name: &str,
    csv_data: &str,
    system: &SystemConfig,
    normalizer: &Normalizer,
) -> Result<Relation, CrosswalkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CrosswalkError::Io(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |name: &str| headers.iter().position(|h| h == name);
    let require = |name: &str| -> Result<usize, CrosswalkError> {
        find(name).ok_or_else(|| CrosswalkError::MissingColumn {
            system: system_name.into(),
            column: name.into(),
        })
    };

    let col = &system.columns;
    let id_idx = require(&col.id)?;
    let name_idx = find(&col.name);
    let address_idx = find(&col.address);
    let city_idx = find(&col.city);
    let state_idx = find(&col.state);
    let state_abbr_idx = find(&col.state_abbr);
    let zip_idx = find(&col.zip);
    let latitude_idx = find(&col.latitude);
    let longitude_idx = find(&col.longitude);

    let carry_idx: Vec<(String, usize)> = system
        .carry
        .iter()
        .map(|column| require(column).map(|idx| (column.clone(), idx)))
        .collect::<Result<_, _>>()?;
    let link_column = match (&system.link, &system.attach) {
        (Some(column), _) => Some(column.as_str()),
        (None, Some(attach)) => Some(attach.column.as_str()),
        (None, None) => None,
    };
    let link_idx = link_column.map(require).transpose()?;
    let multi_campus_idx = system.multi_campus.as_deref().map(require).transpose()?;

    let mut schema: BTreeSet<Attribute> = BTreeSet::new();
    for (attribute, idx) in [
        (Attribute::Name, name_idx),
        (Attribute::Address, address_idx),
        (Attribute::City, city_idx),
        (Attribute::State, state_idx),
        (Attribute::StateAbbr, state_abbr_idx),
        (Attribute::Zip, zip_idx),
    ] {
        if idx.is_some() {
            schema.insert(attribute);
        }
    }
    for (column, _) in &carry_idx {
        schema.insert(Attribute::Column(column.clone()));
    }

    let mut records = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = 0usize;

    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| CrosswalkError::Io(e.to_string()))?;
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i));
        let text = |idx: Option<usize>| cell(idx).and_then(|v| normalizer.text(v));
        let code = |idx: Option<usize>| cell(idx).and_then(trim_code);
        let number = |idx: Option<usize>| cell(idx).and_then(|v| v.trim().parse::<f64>().ok());

        let Some(id) = code(Some(id_idx)) else {
            log::warn!("{system_name}: row {} has no identifier, skipped", line + 2);
            skipped += 1;
            continue;
        };
        if !seen.insert(id.clone()) {
            return Err(CrosswalkError::DuplicateId {
                system: system_name.into(),
                id,
            });
        }

        let mut record = Record::new(id);
        record.name = text(name_idx);
        record.address = text(address_idx);
        record.city = text(city_idx);
        record.state = cell(state_idx).and_then(region_code);
        record.state_abbr = cell(state_abbr_idx).and_then(region_code);
        record.zip = code(zip_idx);
        record.latitude = number(latitude_idx).filter(|v| v.is_finite());
        record.longitude = number(longitude_idx).filter(|v| v.is_finite());
        record.link = code(link_idx);
        record.multi_campus = cell(multi_campus_idx).and_then(parse_flag);
        for (column, idx) in &carry_idx {
            if let Some(value) = code(Some(*idx)) {
                record.extra.insert(column.clone(), value);
            }
        }
        records.push(record);
    }

    log::info!(
        "loaded {system_name}: {} records ({skipped} skipped), attributes: {}",
        records.len(),
        schema.iter().map(Attribute::as_str).collect::<Vec<_>>().join(", ")
    );
    Ok(Relation::new(system_name, schema, records))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}
