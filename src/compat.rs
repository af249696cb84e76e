//! Material / printer compatibility heuristic.
//!
//! Text-based filter over name + description + tags. It is deliberately
//! permissive for items that already match the user's query: those are only
//! rejected on an explicit "other material only" marker. Rule words live in
//! [`MaterialRules`] so tests and callers can tune them without touching the
//! control flow.

use crate::types::CanonicalItem;

/// Word lists driving [`MaterialRules::is_compatible`].
#[derive(Debug, Clone)]
pub struct MaterialRules {
    /// Positive markers that the item prints in the store's base material.
    pub markers: Vec<String>,
    /// Printer-family hints treated as positive evidence.
    pub printer_hints: Vec<String>,
    /// "This process only" phrases; always disqualifying.
    pub exclusive: Vec<String>,
    /// Exclusivity phrases forgiven when the base material is also mentioned.
    pub guarded_exclusive: Vec<String>,
    /// Competing material or process words.
    pub conflicts: Vec<String>,
    /// Mentioning this word neutralizes a conflict.
    pub base_material: String,
}

impl Default for MaterialRules {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|word| word.to_string()).collect()
        }
        Self {
            markers: owned(&["pla", "polylactic acid"]),
            printer_hints: owned(&["bambu", "p1s", "p2s", "x1", "fdm", "fused deposition"]),
            exclusive: owned(&["resin only", "sla only", "dlp only", "sls only"]),
            guarded_exclusive: owned(&["abs only", "petg only"]),
            conflicts: owned(&["abs", "petg", "tpu", "resin", "sla", "dlp", "sls"]),
            base_material: "pla".to_string(),
        }
    }
}

impl MaterialRules {
    /// Decide whether `item` should survive the compatibility filter for the
    /// given free-text query. When `enabled` is false this is a no-op.
    pub fn is_compatible(&self, item: &CanonicalItem, query: &str, enabled: bool) -> bool {
        if !enabled {
            return true;
        }

        let name = item.name.to_lowercase();
        let description = item.description.to_lowercase();
        let tag_text = item.tag_text();

        // Relaxed path: the user asked for this thing by name. Keep it unless
        // the listing explicitly rules the base material out.
        if self.matches_query(&name, &description, &tag_text, query) {
            return !self.explicitly_excluded(&name, &description, &tag_text);
        }

        let corpus = format!("{name} {description} {tag_text}");
        let has_marker = self.markers.iter().any(|word| corpus.contains(word));
        let has_hint = self.printer_hints.iter().any(|word| corpus.contains(word))
            || !self.exclusive.iter().any(|word| corpus.contains(word));
        let has_conflict = self.conflicts.iter().any(|word| corpus.contains(word))
            && !corpus.contains(&self.base_material);

        has_marker && (has_hint || !has_conflict)
    }

    /// Any query word substring-matches name, description, or tags. Fields
    /// are checked separately so a word cannot match across a field boundary.
    fn matches_query(&self, name: &str, description: &str, tag_text: &str, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return false;
        }
        query.split_whitespace().any(|word| {
            name.contains(word) || description.contains(word) || tag_text.contains(word)
        })
    }

    fn explicitly_excluded(&self, name: &str, description: &str, tag_text: &str) -> bool {
        let corpus = format!("{name} {description} {tag_text}");
        if self.exclusive.iter().any(|word| corpus.contains(word)) {
            return true;
        }
        self.guarded_exclusive.iter().any(|word| corpus.contains(word))
            && !corpus.contains(&self.base_material)
    }
}
