//! Legal-entity name normalisation and sequence similarity.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Corporate-form suffixes removed before comparing names, longest forms
/// first so "s.a. de c.v." is not left as "de c.v.".
static CORPORATE_SUFFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bs\.?a\.?\s+de\s+c\.?v\.?\b",
        r"(?i)\bsociedad\s+anonima\b",
        r"(?i)\bsociedad\s+de\s+responsabilidad\s+limitada\b",
        r"(?i)\bs\.?\s+de\s+r\.?l\.?\s+de\s+c\.?v\.?\b",
        r"(?i)\bsapi\s+de\s+c\.?v\.?\b",
        r"(?i)\bde\s+c\.?v\.?\b",
        r"(?i)\bs\.?a\.?\b",
        r"(?i)\bs\.?\s+de\s+r\.?l\.?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Fold a company name to a comparable form: ASCII, lowercase, without
/// corporate suffixes or punctuation, single-spaced.
pub fn normalize_name(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let mut s = ascii.to_lowercase();
    for re in CORPORATE_SUFFIXES.iter() {
        s = re.replace_all(&s, "").into_owned();
    }
    let s = NON_ALNUM.replace_all(&s, " ");
    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Ratcliff/Obershelp similarity: twice the number of matching characters
/// divided by the total length. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_match(a, b);
    if size == 0 {
        return 0;
    }
    size + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + size..], &b[j + size..])
}

/// Longest common block; ties resolve to the earliest start in `a`, then in `b`.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j + 1] = length of the common suffix ending at a[i], b[j]
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let len = curr[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}
