//! In-memory BM25 index over target records.
//!
//! Built once per run over the fuzzy target pool, then queried read-only from
//! worker threads. Tokens are folded and split on anything that is not
//! alphanumeric; there is no stemming and no stopword list, so short
//! identifiers like `"ps"` or `"st"` stay searchable.

use std::collections::{BTreeSet, HashMap};

use ordered_float::OrderedFloat;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::model::{Attribute, Record};
use crate::normalize::region_key;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Fields concatenated into the indexed document, in order.
    pub text_fields: Vec<Attribute>,
    /// Attribute used for the hard region filter.
    pub region: Attribute,
    pub k1: f64,
    pub b: f64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            text_fields: vec![Attribute::Name, Attribute::City],
            region: Attribute::State,
            k1: 1.2,
            b: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub score: f64,
}

#[derive(Debug)]
struct Document {
    id: String,
    region: Option<String>,
    len: usize,
}

#[derive(Debug)]
pub struct TextIndex {
    options: IndexOptions,
    docs: Vec<Document>,
    /// term -> (doc index, term frequency), doc indices ascending.
    postings: HashMap<String, Vec<(usize, u32)>>,
    avg_len: f64,
}

/// Lowercased, accent-free alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl TextIndex {
    pub fn build<'a, I>(records: I, options: IndexOptions) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut docs = Vec::new();
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut total_len = 0usize;

        for record in records {
            let text: Vec<&str> = options
                .text_fields
                .iter()
                .filter_map(|field| record.attr(field))
                .collect();
            let tokens = tokenize(&text.join(" "));

            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            let doc = docs.len();
            for (term, freq) in tf {
                postings.entry(term.to_string()).or_default().push((doc, freq));
            }

            total_len += tokens.len();
            docs.push(Document {
                id: record.id.clone(),
                region: record.attr(&options.region).map(region_key),
                len: tokens.len(),
            });
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };
        log::info!("index built: {} documents, {} terms", docs.len(), postings.len());

        Self {
            options,
            docs,
            postings,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Top `limit` documents in `region` that share at least one term with
    /// `text`, best first, ties by id. A `None` region matches nothing.
    pub fn query(&self, text: &str, region: Option<&str>, limit: usize) -> Vec<Hit> {
        let Some(region) = region.map(region_key) else {
            return Vec::new();
        };
        if limit == 0 || self.docs.is_empty() {
            return Vec::new();
        }

        let terms: BTreeSet<String> = tokenize(text).into_iter().collect();
        let n = self.docs.len() as f64;
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in &terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for &(doc, tf) in posting {
                if self.docs[doc].region.as_deref() != Some(region.as_str()) {
                    continue;
                }
                *scores.entry(doc).or_insert(0.0) += idf * self.term_weight(doc, tf);
            }
        }

        let mut hits: Vec<Hit> = scores
            .into_iter()
            .map(|(doc, score)| Hit {
                id: self.docs[doc].id.clone(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            OrderedFloat(b.score)
                .cmp(&OrderedFloat(a.score))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }

    fn term_weight(&self, doc: usize, tf: u32) -> f64 {
        let IndexOptions { k1, b, .. } = self.options;
        let tf = f64::from(tf);
        let len = self.docs[doc].len as f64;
        let norm = if self.avg_len > 0.0 {
            1.0 - b + b * len / self.avg_len
        } else {
            1.0
        };
        tf * (k1 + 1.0) / (tf + k1 * norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, name: &str, city: &str, state: &str) -> Record {
        Record {
            id: id.into(),
            name: Some(name.into()),
            city: Some(city.into()),
            state: Some(state.into()),
            ..Record::default()
        }
    }

    fn corpus() -> Vec<Record> {
        vec![
            target("1", "lincoln high school", "omaha", "NE"),
            target("2", "lincoln elementary", "lincoln", "NE"),
            target("3", "washington high school", "omaha", "NE"),
            target("4", "lincoln high school", "portland", "OR"),
        ]
    }

    #[test]
    fn tokenize_splits_and_folds() {
        assert_eq!(tokenize("St. Mary's-Académie"), vec!["st", "mary", "s", "academie"]);
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn region_is_a_hard_filter() {
        let records = corpus();
        let index = TextIndex::build(&records, IndexOptions::default());
        let hits = index.query("lincoln high school", Some("OR"), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "4");
    }

    #[test]
    fn region_match_ignores_case() {
        let records = corpus();
        let index = TextIndex::build(&records, IndexOptions::default());
        assert_eq!(index.query("lincoln", Some("ne"), 10).len(), 2);
    }

    #[test]
    fn null_region_gets_nothing() {
        let records = corpus();
        let index = TextIndex::build(&records, IndexOptions::default());
        assert!(index.query("lincoln high school", None, 10).is_empty());
    }

    #[test]
    fn no_overlap_is_excluded() {
        let records = corpus();
        let index = TextIndex::build(&records, IndexOptions::default());
        let hits = index.query("jefferson academy", Some("NE"), 10);
        assert!(hits.is_empty());
    }

    #[test]
    fn best_match_ranks_first() {
        let records = corpus();
        let index = TextIndex::build(&records, IndexOptions::default());
        let hits = index.query("lincoln high school", Some("NE"), 10);
        assert_eq!(hits[0].id, "1");
        assert!(hits.iter().all(|h| h.score > 0.0));
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Washington shares "high school"; Lincoln Elementary shares "lincoln" twice.
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"2"));
        assert!(ids.contains(&"3"));
    }

    #[test]
    fn limit_truncates_and_ties_break_by_id() {
        let records = vec![
            target("b", "oak school", "x", "TX"),
            target("a", "oak school", "x", "TX"),
            target("c", "oak school", "x", "TX"),
        ];
        let index = TextIndex::build(&records, IndexOptions::default());
        let hits = index.query("oak", Some("TX"), 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn single_term_score_matches_formula() {
        let records = vec![target("1", "alpha", "", "CA"), target("2", "beta", "", "CA")];
        let options = IndexOptions {
            text_fields: vec![Attribute::Name],
            ..IndexOptions::default()
        };
        let index = TextIndex::build(&records, options);
        let hits = index.query("alpha", Some("CA"), 10);
        // N = 2, df = 1, tf = 1, len = avg_len = 1.
        let idf = (1.0f64 + (2.0 - 1.0 + 0.5) / 1.5).ln();
        let expected = idf * (1.0 * 2.2) / (1.0 + 1.2);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = TextIndex::build(std::iter::empty(), IndexOptions::default());
        assert!(index.is_empty());
        assert!(index.query("anything", Some("CA"), 10).is_empty());
    }
}
