//! `xwalk run | validate | rounds`: config-driven crosswalk builds.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crosswalk_linkage::cascade::check_schema;
use crosswalk_linkage::config::CrosswalkConfig;
use crosswalk_linkage::engine::load_csv_records;
use crosswalk_linkage::model::{CrosswalkInput, CrosswalkResult, MatchRule};
use crosswalk_linkage::Normalizer;

use crate::exit_codes::{crosswalk_exit_code, EXIT_USAGE, EXIT_XWALK_RUNTIME};
use crate::output::{candidates_csv, crosswalk_csv, sha256_hex, Report};
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub candidates: Option<PathBuf>,
    pub json: bool,
    pub threads: Option<usize>,
}

fn xwalk_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: crosswalk_linkage::CrosswalkError) -> CliError {
    let hint = if err.is_schema() {
        Some("check the [systems.*.columns] mapping against the CSV header".to_string())
    } else {
        None
    };
    CliError { code: crosswalk_exit_code(&err), message: err.to_string(), hint }
}

/// Parse and validate the config. Returns it with the directory its relative
/// file paths resolve against.
fn load_config(path: &Path) -> Result<(CrosswalkConfig, PathBuf), CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        xwalk_err(EXIT_XWALK_RUNTIME, format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = CrosswalkConfig::from_toml(&text).map_err(engine_err)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base_dir))
}

fn load_input(config: &CrosswalkConfig, base_dir: &Path) -> Result<CrosswalkInput, CliError> {
    let normalizer = Normalizer::new(&config.normalize);
    let mut relations = BTreeMap::new();
    for (name, system) in &config.systems {
        let csv_path = base_dir.join(&system.file);
        let csv_data = std::fs::read_to_string(&csv_path).map_err(|e| {
            xwalk_err(EXIT_XWALK_RUNTIME, format!("cannot read {}: {e}", csv_path.display()))
        })?;
        let relation = load_csv_records(name, &csv_data, system, &normalizer).map_err(engine_err)?;
        relations.insert(name.clone(), relation);
    }
    Ok(CrosswalkInput { relations })
}

/// Flag path as given; config path relative to the config file.
fn resolve(flag: Option<PathBuf>, configured: Option<&String>, base_dir: &Path) -> Option<PathBuf> {
    flag.or_else(|| configured.map(|p| base_dir.join(p)))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|e| {
        xwalk_err(EXIT_XWALK_RUNTIME, format!("cannot write {}: {e}", path.display()))
    })?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err(xwalk_err(EXIT_USAGE, "--threads must be at least 1"));
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| xwalk_err(EXIT_XWALK_RUNTIME, format!("cannot start worker pool: {e}")))?;
    }

    let (config, base_dir) = load_config(&args.config)?;
    let input = load_input(&config, &base_dir)?;
    let result = crosswalk_linkage::run(&config, &input).map_err(engine_err)?;

    let csv_bytes = crosswalk_csv(&result)?;
    let digest = sha256_hex(&csv_bytes);

    let output = resolve(args.output, config.output.crosswalk.as_ref(), &base_dir);
    match &output {
        Some(path) => write_file(path, &csv_bytes)?,
        // Stdout carries the CSV unless it is reserved for the JSON report.
        None if !args.json => std::io::stdout()
            .write_all(&csv_bytes)
            .map_err(|e| xwalk_err(EXIT_XWALK_RUNTIME, format!("cannot write stdout: {e}")))?,
        None => {}
    }

    if let Some(path) = resolve(args.candidates, config.output.candidates.as_ref(), &base_dir) {
        write_file(&path, &candidates_csv(&result.candidates)?)?;
    }

    let report = Report {
        meta: &result.meta,
        summary: &result.summary,
        crosswalk_sha256: digest,
    };
    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| xwalk_err(EXIT_XWALK_RUNTIME, format!("JSON serialization error: {e}")))?;
    if let Some(path) = resolve(args.report, config.output.report.as_ref(), &base_dir) {
        write_file(&path, json_str.as_bytes())?;
    }
    if args.json {
        println!("{json_str}");
    }

    eprintln!("{}", summary_line(&result));
    Ok(())
}

/// One-line human summary for stderr.
fn summary_line(result: &CrosswalkResult) -> String {
    let s = &result.summary;
    let count = |method: &str| s.method_counts.get(method).copied().unwrap_or(0);
    format!(
        "crosswalk {}: {} rows ({} linked, {} exact, {} fuzzy, {} no-match), exact rate {:.1}%",
        result.meta.config_name,
        s.total_rows,
        count("linked"),
        count("exact"),
        count("fuzzy"),
        count("no-match"),
        s.exact_match_rate * 100.0,
    )
}

/// Parse, validate, load every input, and check the rounds against what
/// the pair actually carries. Nothing is matched.
pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, base_dir) = load_config(&config_path)?;
    let input = load_input(&config, &base_dir)?;

    let rules = config.rules();
    let left = &input.relations[&config.pair.left];
    let right = &input.relations[&config.pair.right];
    let region = config.fuzzy.required_region();
    check_schema(&rules, region.as_ref(), left, right).map_err(engine_err)?;

    print_rounds(&rules)?;
    let sizes: Vec<String> = input
        .relations
        .iter()
        .map(|(name, rel)| format!("{name}={}", rel.records.len()))
        .collect();
    eprintln!("config ok: {} ({})", config.name, sizes.join(", "));
    Ok(())
}

pub fn cmd_rounds(config_path: PathBuf) -> Result<(), CliError> {
    let (config, _) = load_config(&config_path)?;
    print_rounds(&config.rules())
}

fn print_rounds(rules: &[MatchRule]) -> Result<(), CliError> {
    let join = |attrs: &[crosswalk_linkage::Attribute]| {
        if attrs.is_empty() {
            "-".to_string()
        } else {
            attrs.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let io_err = |e: std::io::Error| xwalk_err(EXIT_XWALK_RUNTIME, e.to_string());
    writeln!(out, "round\tkeys\tpartition\tdrop").map_err(io_err)?;
    for rule in rules {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            rule.id,
            join(&rule.keys),
            join(&rule.partition),
            join(&rule.drop)
        )
        .map_err(io_err)?;
    }
    Ok(())
}
