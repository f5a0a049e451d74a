//! String similarity ratios in `[0, 1]`.
//!
//! Both ratios are Indel similarities: `2 * lcs / (len_a + len_b)` over
//! chars, where `lcs` is the longest common subsequence. Insertions and
//! deletions cost one, a substitution costs two.

/// Indel similarity. Empty on either side scores 0.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * lcs_length(&a, &b) as f64 / (a.len() + b.len()) as f64
}

/// Order-insensitive ratio: both sides are lowercased, punctuation becomes
/// whitespace, tokens are sorted, and the rejoined strings are compared.
/// Reported in whole percent, so `0.94` and not `0.9361`.
pub fn token_ratio(a: &str, b: &str) -> f64 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    (edit_ratio(&a, &b) * 100.0).round() / 100.0
}

/// Two-row dynamic program; O(len_a * len_b) time, O(len_b) space.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn sorted_tokens(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
