pub mod compose;
pub mod expr;
pub mod paging;
pub mod signals;
pub mod weights;

pub use compose::{compose, recommend};
pub use expr::{BoostClause, BoostTarget, CombinationMode, DocField, Fuzziness, MatchClause, ScoringExpression};
pub use signals::{rank_categories, rank_terms, Signal};
pub use weights::{WeightConfig, WeightError, WeightedSignal};

/// Trim a raw query string. Returns `None` when nothing is left to search for.
pub fn normalize_query(input: &str) -> Option<&str> {
    let q = input.trim();
    if q.is_empty() {
        None
    } else {
        Some(q)
    }
}

/// Split a query into signal terms: whitespace split, lower-cased.
/// No stemming, no stopword removal, punctuation is kept as part of the term.
pub fn tokenize(input: &str) -> impl Iterator<Item = String> + '_ {
    input.split_whitespace().map(|raw| raw.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_blank_queries() {
        assert_eq!(normalize_query(""), None);
        assert_eq!(normalize_query("   \t\n"), None);
        assert_eq!(normalize_query("  rust  "), Some("rust"));
    }

    #[test]
    fn tokenize_splits_on_whitespace_and_lowercases() {
        let terms: Vec<String> = tokenize("  AI\tChips\nstock-Market, ").collect();
        assert_eq!(terms, vec!["ai", "chips", "stock-market,"]);
    }
}
