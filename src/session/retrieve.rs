//! Per-turn retrieval: pull history relevant to an incoming prompt back into
//! context as one capped block.

use crate::concept::tokenize;
use crate::config::RetrievalConfig;
use crate::search::SearchHit;
use crate::utils::text::clip;

pub const RETRIEVED_HEADER: &str = "[Retrieved from session history]";

/// Conversational filler that says nothing about what to look up.
const PROMPT_FILLER: &[&str] = &[
    "every", "give", "going", "keep", "make", "may", "might", "really", "shall", "show", "tell",
];

/// Distinct search keywords from a prompt, in prompt order.
pub fn prompt_keywords(prompt: &str, max: usize) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(prompt) {
        if keywords.len() == max {
            break;
        }
        if PROMPT_FILLER.contains(&token.as_str()) || keywords.contains(&token) {
            continue;
        }
        keywords.push(token);
    }
    keywords
}

/// Render hits under [`RETRIEVED_HEADER`], one line each, stopping before the
/// block would exceed `max_block_chars`. `None` when no line fits.
pub fn format_retrieved(hits: &[SearchHit], config: &RetrievalConfig) -> Option<String> {
    let mut block = RETRIEVED_HEADER.to_string();
    let mut used = block.chars().count();
    let mut lines = 0;
    for hit in hits {
        let label = hit.role.as_deref().unwrap_or(&hit.event_type);
        let line = format!("\n- [{label}] {}", clip(&hit.text, config.max_hit_chars));
        let cost = line.chars().count();
        if used + cost > config.max_block_chars {
            break;
        }
        block.push_str(&line);
        used += cost;
        lines += 1;
    }
    (lines > 0).then_some(block)
}
