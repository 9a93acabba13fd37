use crate::extract::Post;
use strum::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    Pass,
    Reject(Filter),
}

#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum Filter {
    #[strum(serialize = "retweet")]
    Retweet,
    #[strum(serialize = "empty-text")]
    EmptyText,
}

pub fn apply_filters(post: &Post) -> FilterResult {
    if post.is_retweet {
        return FilterResult::Reject(Filter::Retweet);
    }

    if post.text.is_empty() {
        return FilterResult::Reject(Filter::EmptyText);
    }

    FilterResult::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(text: &str, is_retweet: bool) -> Post {
        Post {
            id: "99".into(),
            created_at: Utc::now(),
            text: text.into(),
            symbols: vec!["AAPL".into()],
            is_retweet,
        }
    }

    #[test]
    fn test_filter_retweet() {
        let result = apply_filters(&post("rt of something", true));
        assert_eq!(result, FilterResult::Reject(Filter::Retweet));
    }

    #[test]
    fn test_filter_empty_text() {
        let result = apply_filters(&post("", false));
        assert_eq!(result, FilterResult::Reject(Filter::EmptyText));
    }

    #[test]
    fn test_filter_pass() {
        assert_eq!(apply_filters(&post("$AAPL to the moon", false)), FilterResult::Pass);
    }

    #[test]
    fn test_filter_labels() {
        assert_eq!(Filter::Retweet.to_string(), "retweet");
        assert_eq!(Filter::EmptyText.to_string(), "empty-text");
    }
}
