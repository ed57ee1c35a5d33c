use std::collections::HashMap;

/// Label used when a text yields no usable tokens.
pub const FALLBACK_ANCHOR: &str = "general";

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "because",
    "been", "before", "being", "below", "between", "both", "but", "can", "could", "did", "does",
    "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has", "have",
    "having", "her", "here", "hers", "herself", "him", "himself", "his", "how", "into", "its",
    "itself", "just", "let", "more", "most", "much", "must", "myself", "nor", "not", "now", "off",
    "once", "only", "other", "our", "ours", "ourselves", "out", "over", "own", "please", "same",
    "she", "should", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "until", "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "yes", "you", "your", "yours", "yourself", "yourselves",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Lowercased alphanumeric tokens of at least three characters, stopwords
/// removed, in text order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Anchor label for `text`: its `k` most frequent tokens joined by spaces.
/// Ties keep first-occurrence order.
pub fn extract_anchor(text: &str, k: usize) -> String {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, token) in tokenize(text).into_iter().enumerate() {
        counts.entry(token).or_insert((0, pos)).0 += 1;
    }
    if counts.is_empty() || k == 0 {
        return FALLBACK_ANCHOR.to_string();
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(k)
        .map(|(token, _)| token)
        .collect::<Vec<_>>()
        .join(" ")
}
