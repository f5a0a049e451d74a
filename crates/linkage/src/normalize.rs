//! Free-text cleanup applied to names, addresses and cities at load time.
//!
//! Equality joins in the cascade only work if both systems spell a value the
//! same way, so everything here is a pure `&str -> String` function.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizeConfig;

/// Strip diacritics, lowercase, and collapse runs of whitespace.
/// Returns `None` when nothing but whitespace remains.
pub fn fold(raw: &str) -> Option<String> {
    let stripped: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    let folded = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if folded.is_empty() {
        None
    } else {
        Some(folded)
    }
}

/// Join runs of two or more single-character words: `"u s a academy"` → `"usa academy"`.
///
/// Abbreviations are spelled both ways across systems (`"A B C Charter"` vs
/// `"ABC Charter"`). A lone initial is left alone.
pub fn tighten(raw: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for word in raw.split_whitespace() {
        if is_single_char(word) {
            run.push(word);
            continue;
        }
        flush_run(&mut run, &mut out);
        out.push(word.to_string());
    }
    flush_run(&mut run, &mut out);

    out.join(" ")
}

fn is_single_char(word: &str) -> bool {
    let mut chars = word.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphanumeric())
}

fn flush_run(run: &mut Vec<&str>, out: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => out.push(run[0].to_string()),
        _ => out.push(run.concat()),
    }
    run.clear();
}

/// Trim a coded value (state, zip, id); empty becomes `None`.
pub fn trim_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A trimmed region code, uppercased so exact joins agree with the
/// case-insensitive region filter.
pub fn region_code(raw: &str) -> Option<String> {
    trim_code(raw).map(|code| code.to_uppercase())
}

/// Region codes compare case-insensitively.
pub fn region_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The configured text pipeline, applied to free-text columns.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    fold: bool,
    tighten: bool,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            fold: config.fold,
            tighten: config.tighten,
        }
    }

    /// Only trims; used when the input is already normalized upstream.
    pub fn passthrough() -> Self {
        Self {
            fold: false,
            tighten: false,
        }
    }

    pub fn text(&self, raw: &str) -> Option<String> {
        let folded = if self.fold { fold(raw)? } else { trim_code(raw)? };
        if self.tighten {
            Some(tighten(&folded))
        } else {
            Some(folded)
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}
