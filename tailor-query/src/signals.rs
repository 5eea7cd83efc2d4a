use std::cmp::Ordering;
use std::collections::HashMap;

use crate::tokenize;

/// One behavioral data point with the count that feeds its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub key: String,
    pub count: u64,
}

impl Signal {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Ranking order for every signal list: count descending, then key ascending
/// (byte-wise lexicographic) so equal counts always come out in the same order.
fn by_rank(a: &Signal, b: &Signal) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key))
}

/// Rank per-category click counters. `limit = None` keeps every category.
/// Duplicate categories are summed; zero counts are dropped.
pub fn rank_categories<I, K>(counters: I, limit: Option<usize>) -> Vec<Signal>
where
    I: IntoIterator<Item = (K, u64)>,
    K: Into<String>,
{
    let mut merged: HashMap<String, u64> = HashMap::new();
    for (category, count) in counters {
        let category = category.into();
        if category.is_empty() || count == 0 {
            continue;
        }
        *merged.entry(category).or_insert(0) += count;
    }
    finish(merged, limit)
}

/// Count term frequencies across a window of raw queries and keep the `limit`
/// most frequent ones. A term repeated inside one query counts every time.
pub fn rank_terms<'a, I>(queries: I, limit: usize) -> Vec<Signal>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut freq: HashMap<String, u64> = HashMap::new();
    for query in queries {
        for term in tokenize(query) {
            *freq.entry(term).or_insert(0) += 1;
        }
    }
    finish(freq, Some(limit))
}

fn finish(counts: HashMap<String, u64>, limit: Option<usize>) -> Vec<Signal> {
    let mut out: Vec<Signal> = counts
        .into_iter()
        .map(|(key, count)| Signal { key, count })
        .collect();
    out.sort_by(by_rank);
    if let Some(limit) = limit {
        out.truncate(limit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_sorted_by_count_then_name() {
        let ranked = rank_categories(
            vec![("tech", 1), ("sports", 3), ("arts", 3), ("food", 2)],
            None,
        );
        let keys: Vec<&str> = ranked.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["arts", "sports", "food", "tech"]);
    }

    #[test]
    fn categories_respect_limit_and_skip_empty() {
        let ranked = rank_categories(vec![("a", 5), ("", 9), ("b", 0), ("c", 1)], Some(1));
        assert_eq!(ranked, vec![Signal::new("a", 5)]);
        assert!(rank_categories(Vec::<(String, u64)>::new(), Some(3)).is_empty());
    }

    #[test]
    fn terms_counted_across_window() {
        let queries = ["ai chips", "AI Chips", "stock market"];
        let ranked = rank_terms(queries.iter().copied(), 10);
        assert_eq!(
            ranked,
            vec![
                Signal::new("ai", 2),
                Signal::new("chips", 2),
                Signal::new("market", 1),
                Signal::new("stock", 1),
            ]
        );
    }

    #[test]
    fn terms_limit_zero_and_empty_history() {
        assert!(rank_terms(["a b"].iter().copied(), 0).is_empty());
        assert!(rank_terms(std::iter::empty(), 5).is_empty());
    }

    #[test]
    fn terms_never_exceed_limit_and_stay_sorted() {
        let queries = ["x y z", "y z", "z", "w"];
        let ranked = rank_terms(queries.iter().copied(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0], Signal::new("z", 3));
        assert_eq!(ranked[1], Signal::new("y", 2));
        assert!(ranked.windows(2).all(|w| w[0].count >= w[1].count));
    }
}
