use std::borrow::Cow;
use std::collections::HashSet;

/// `text` cut to at most `max_chars` characters, marked with `...` when
/// anything was dropped. Borrows when the text already fits.
#[must_use]
pub fn clip(text: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return Cow::Borrowed(text);
    };
    let mut out = text[..cut].trim_end().to_string();
    out.push_str("...");
    Cow::Owned(out)
}

/// Estimate token count from text using the chars/4 heuristic.
///
/// Uses ceiling division to avoid underestimating by a fraction.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased word set used for near-duplicate detection. Words shorter than
/// three characters are ignored.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() >= 3)
        .collect()
}

/// Jaccard similarity of two word sets. Two empty sets are dissimilar.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    #[allow(clippy::cast_precision_loss)]
    let sim = intersection as f64 / union as f64;
    sim
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_borrows_when_text_fits() {
        assert!(matches!(clip("hello", 5), Cow::Borrowed("hello")));
        assert_eq!(clip("", 3), "");
    }

    #[test]
    fn clip_marks_dropped_text() {
        assert_eq!(clip("hello world", 6), "hello...");
        assert_eq!(clip("naïve café résumé", 4), "naïv...");
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn collapse_whitespace_joins_lines() {
        assert_eq!(collapse_whitespace("  a\n\n b\t c  "), "a b c");
    }

    #[test]
    fn word_set_drops_short_words_and_punctuation() {
        let set = word_set("The cat, an OWL! ox");
        assert!(set.contains("the"));
        assert!(set.contains("cat"));
        assert!(set.contains("owl"));
        assert!(!set.contains("an"));
        assert!(!set.contains("ox"));
    }

    #[test]
    fn jaccard_bounds() {
        let a = word_set("alpha beta gamma");
        let b = word_set("alpha beta gamma");
        let c = word_set("delta epsilon");
        assert!((jaccard(&a, &b) - 1.0).abs() < f64::EPSILON);
        assert!(jaccard(&a, &c).abs() < f64::EPSILON);
        assert!(jaccard(&HashSet::new(), &HashSet::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = word_set("alpha beta gamma delta");
        let b = word_set("alpha beta gamma epsilon");
        // 3 shared of 5 distinct
        assert!((jaccard(&a, &b) - 0.6).abs() < 1e-9);
    }
}
