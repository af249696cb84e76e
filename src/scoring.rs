//! Relevance scoring: pure function of (item, query), no I/O.
//!
//! The weight table is load-bearing: both sources' items are ranked against
//! each other with it, so any change to a weight changes visible ordering.
//! Ties are broken by merge order in the engine, which is why this module
//! never reorders anything.

use crate::types::CanonicalItem;

const PHRASE_IN_NAME: f64 = 1000.0;
const PHRASE_PREFIX_BONUS: f64 = 500.0;
const PHRASE_IN_TAGS: f64 = 800.0;
const ALL_WORDS_IN_NAME: f64 = 600.0;
const WORD_ORDER_BONUS: f64 = 300.0;
const ALL_WORDS_IN_TAGS: f64 = 500.0;
const WORD_IN_DESCRIPTION: f64 = 20.0;
const POPULARITY_CAP: f64 = 50.0;

/// Score `item` against a free-text query. Zero for an empty query; zero
/// also means "no textual relationship found" and relevance-sorted output
/// excludes such items entirely.
pub fn relevance_score(item: &CanonicalItem, query: &str) -> f64 {
    let phrase = query.trim().to_lowercase();
    if phrase.is_empty() {
        return 0.0;
    }
    let words: Vec<&str> = phrase.split_whitespace().collect();

    let name = item.name.to_lowercase();
    let description = item.description.to_lowercase();
    let tag_text = item.tag_text();

    let mut score = 0.0;

    // Full-phrase matches dominate everything else.
    if name.contains(&phrase) {
        score += PHRASE_IN_NAME;
        if name.starts_with(&phrase) {
            score += PHRASE_PREFIX_BONUS;
        }
    }
    if tag_text.contains(&phrase) {
        score += PHRASE_IN_TAGS;
    }

    // All words present, order-insensitive; extra bonus when they appear in
    // the query's left-to-right order across the name's tokens.
    if words.iter().all(|word| name.contains(word)) {
        score += ALL_WORDS_IN_NAME;
        if words_in_order(&name, &words) {
            score += WORD_ORDER_BONUS;
        }
    }
    if words.iter().all(|word| tag_text.contains(word)) {
        score += ALL_WORDS_IN_TAGS;
    }

    // Per-word hits with positional decay: earlier query words weigh more.
    for (index, word) in words.iter().enumerate() {
        if name.contains(word) {
            score += 100.0 - 10.0 * index as f64;
        }
        if tag_text.contains(word) {
            score += 80.0 - 8.0 * index as f64;
        }
        if description.contains(word) {
            score += WORD_IN_DESCRIPTION;
        }
    }

    // Popularity and quality nudge ties apart without drowning text matches.
    score += (item.download_count as f64 / 100.0).min(POPULARITY_CAP);
    if let Some(quality) = item.average_quality {
        score += f64::from(quality) * 10.0;
    }

    // Positional decay can go negative past the tenth word; the contract is
    // a non-negative score.
    score.max(0.0)
}

/// True when every query word matches some name token at or after the token
/// matched by the previous word (substring match per token, cursor only
/// advances).
fn words_in_order(name: &str, words: &[&str]) -> bool {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let mut cursor = 0;
    for word in words {
        match tokens[cursor..].iter().position(|token| token.contains(word)) {
            Some(offset) => cursor += offset + 1,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemSource, TagRef};
    use chrono::Utc;

    fn item(name: &str) -> CanonicalItem {
        CanonicalItem {
            id: "t1".into(),
            source: ItemSource::Local,
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            thumbnail_url: None,
            download_count: 0,
            average_quality: None,
            is_free: true,
            created_at: Utc::now(),
            source_external_url: None,
        }
    }

    #[test]
    fn empty_query_scores_zero() {
        assert_eq!(relevance_score(&item("Dragon Statue"), ""), 0.0);
        assert_eq!(relevance_score(&item("Dragon Statue"), "   "), 0.0);
    }

    #[test]
    fn unrelated_item_scores_zero() {
        assert_eq!(relevance_score(&item("Benchy"), "dragon"), 0.0);
    }

    #[test]
    fn phrase_prefix_match_full_weights() {
        // phrase 1000 + prefix 500 + all-words 600 + order 300
        // + word hits 100, 90
        let score = relevance_score(&item("Dragon Statue"), "dragon statue");
        assert_eq!(score, 2590.0);
    }

    #[test]
    fn phrase_not_at_start_loses_prefix_bonus() {
        let prefix = relevance_score(&item("Dragon Statue"), "dragon");
        let infix = relevance_score(&item("Cool Dragon Statue"), "dragon");
        assert_eq!(prefix - infix, 500.0);
    }

    #[test]
    fn out_of_order_words_lose_order_bonus() {
        // all-words 600 + word hits 100 + 90, no phrase, no order bonus
        let score = relevance_score(&item("Statue Dragon"), "dragon statue");
        assert_eq!(score, 790.0);
    }

    #[test]
    fn tag_matches_weigh_in() {
        let mut tagged = item("Kitty Figurine");
        tagged.tags = vec![TagRef::new("Cat")];
        // tag phrase 800 + all-words-in-tags 500 + word-in-tag 80
        assert_eq!(relevance_score(&tagged, "cat"), 1380.0);
    }

    #[test]
    fn description_hits_are_flat() {
        let mut described = item("Mystery Box");
        described.description = "a dragon hides inside the dragon box".into();
        assert_eq!(relevance_score(&described, "dragon"), 20.0);
    }

    #[test]
    fn popularity_boost_is_capped() {
        let mut popular = item("Dragon");
        popular.download_count = 1_000_000;
        let mut modest = item("Dragon");
        modest.download_count = 5_000;
        // both hit the 50-point cap
        assert_eq!(
            relevance_score(&popular, "dragon"),
            relevance_score(&modest, "dragon")
        );

        let mut small = item("Dragon");
        small.download_count = 500;
        assert_eq!(
            relevance_score(&modest, "dragon") - relevance_score(&small, "dragon"),
            45.0
        );
    }

    #[test]
    fn quality_boost_applies_only_when_reviewed() {
        let plain = item("Dragon");
        let mut reviewed = item("Dragon");
        reviewed.average_quality = Some(4.5);
        assert_eq!(
            relevance_score(&reviewed, "dragon") - relevance_score(&plain, "dragon"),
            45.0
        );
    }

    #[test]
    fn exact_phrase_strictly_increases_score() {
        // monotonicity: appending the phrase to the name must strictly
        // increase the score relative to an otherwise-identical item
        let without = item("Garden Gnome");
        let with = item("Garden Gnome dragon statue");
        let query = "dragon statue";
        assert!(relevance_score(&with, query) > relevance_score(&without, query));
    }

    #[test]
    fn order_cursor_does_not_rewind() {
        // "red dragon": "red" matches token 1, cursor passes it, "dragon"
        // must then match at token 2 or later; token 0 is behind the cursor
        assert!(words_in_order("dragon red dragon", &["red", "dragon"]));
        assert!(!words_in_order("dragon red", &["red", "dragon"]));
    }
}
