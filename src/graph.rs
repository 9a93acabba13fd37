use crate::extract::Post;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use strum::Display;

/// How repeated (tweet, source, target) edges are handled on reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum EdgePolicy {
    /// Every write adds a row, so repeat deliveries count as extra weight.
    #[strum(serialize = "accumulate")]
    Accumulate,
    /// An edge already stored for the same tweet is not written again.
    #[strum(serialize = "skip_existing")]
    SkipExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge<'a> {
    pub source: &'a str,
    pub target: &'a str,
}

fn non_alpha() -> &'static Regex {
    static NON_ALPHA: OnceLock<Regex> = OnceLock::new();
    NON_ALPHA.get_or_init(|| Regex::new("[^a-zA-Z]+").expect("static pattern"))
}

/// Strips everything but ASCII letters and uppercases the rest.
pub fn normalize_search_term(term: &str) -> String {
    non_alpha().replace_all(term, "").to_uppercase()
}

/// Edges from `source` to each symbol of `post`, minus self-loops.
///
/// Retweets never produce edges.
pub fn edges<'a>(post: &'a Post, source: &'a str) -> Vec<GraphEdge<'a>> {
    if post.is_retweet {
        return Vec::new();
    }
    post.symbols
        .iter()
        .map(String::as_str)
        .filter(|target| *target != source)
        .map(|target| GraphEdge { source, target })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(symbols: &[&str]) -> Post {
        Post {
            id: "1".into(),
            created_at: Utc.with_ymd_and_hms(2020, 3, 9, 14, 30, 0).unwrap(),
            text: "markets".into(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            is_retweet: false,
        }
    }

    #[test]
    fn test_normalize_drops_non_letters() {
        assert_eq!(normalize_search_term("apple stock"), "APPLESTOCK");
        assert_eq!(normalize_search_term("$tsla, 2020!"), "TSLA");
        assert_eq!(normalize_search_term("123"), "");
    }

    #[test]
    fn test_edges_per_symbol_in_order() {
        let p = post(&["AAPL", "TSLA"]);
        let got = edges(&p, "APPLESTOCK");
        assert_eq!(
            got,
            vec![
                GraphEdge { source: "APPLESTOCK", target: "AAPL" },
                GraphEdge { source: "APPLESTOCK", target: "TSLA" },
            ]
        );
    }

    #[test]
    fn test_self_loop_suppressed() {
        let p = post(&["TSLA"]);
        assert!(edges(&p, "TSLA").is_empty());
    }

    #[test]
    fn test_duplicate_symbols_yield_duplicate_edges() {
        let p = post(&["AAPL", "AAPL"]);
        assert_eq!(edges(&p, "APPLE").len(), 2);
    }

    #[test]
    fn test_retweet_yields_no_edges() {
        let mut p = post(&["AAPL"]);
        p.is_retweet = true;
        assert!(edges(&p, "APPLE").is_empty());
    }
}
