use crate::error::ConfigError;
use crate::graph::normalize_search_term;
use std::fmt;

/// Upstream API credentials.
///
/// Requests are OAuth1-signed with all four keys. A preset `bearer_token` is
/// used only when the user-context set is incomplete.
#[derive(Clone, Default)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub bearer_token: Option<String>,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .field("bearer_token", &self.bearer_token.as_deref().map(redact))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl ApiCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let bearer_token = get("BEARER_TOKEN");

        let creds = Self {
            api_key: get("API_KEY").unwrap_or_default(),
            api_secret: get("API_SECRET_KEY").unwrap_or_default(),
            access_token: get("ACCESS_TOKEN_KEY").unwrap_or_default(),
            access_token_secret: get("ACCESS_TOKEN_SECRET").unwrap_or_default(),
            bearer_token,
        };

        if creds.bearer_token.is_none() {
            if let Some(missing) = creds.first_missing() {
                return Err(ConfigError::Missing(missing));
            }
        }
        Ok(creds)
    }

    fn first_missing(&self) -> Option<&'static str> {
        [
            ("API_KEY", &self.api_key),
            ("API_SECRET_KEY", &self.api_secret),
            ("ACCESS_TOKEN_KEY", &self.access_token),
            ("ACCESS_TOKEN_SECRET", &self.access_token_secret),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// All four OAuth1 keys are present.
    pub fn has_user_context(&self) -> bool {
        self.first_missing().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub database_url: String,
}

impl StoreCredentials {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "tweets.db".to_string()),
        }
    }
}

/// Everything the pipeline needs from the outside world. Built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    search_term: String,
    /// Reserved for a downstream fan-out consumer.
    queue_url: String,
    pub api: ApiCredentials,
    pub store: StoreCredentials,
}

impl PipelineConfig {
    pub fn new(
        search_term: &str,
        queue_url: &str,
        api: ApiCredentials,
        store: StoreCredentials,
    ) -> Result<Self, ConfigError> {
        if search_term.trim().is_empty() {
            return Err(ConfigError::Missing("search term"));
        }
        if queue_url.trim().is_empty() {
            return Err(ConfigError::Missing("queue url"));
        }
        if normalize_search_term(search_term).is_empty() {
            return Err(ConfigError::InvalidSearchTerm(search_term.to_string()));
        }

        Ok(Self {
            search_term: search_term.to_string(),
            queue_url: queue_url.to_string(),
            api,
            store,
        })
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Graph edge source for every post of this run.
    pub fn edge_source(&self) -> String {
        normalize_search_term(&self.search_term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn store() -> StoreCredentials {
        StoreCredentials {
            database_url: "test.db".into(),
        }
    }

    #[test]
    fn test_user_context_required_without_bearer() {
        let err = ApiCredentials::from_lookup(lookup(&[("API_KEY", "k")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("API_SECRET_KEY"));

        let err = ApiCredentials::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("API_KEY"));

        let err = ApiCredentials::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("API_SECRET_KEY", "s"),
            ("ACCESS_TOKEN_KEY", "t"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("ACCESS_TOKEN_SECRET"));
    }

    #[test]
    fn test_all_four_keys_give_user_context() {
        let creds = ApiCredentials::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("API_SECRET_KEY", "s"),
            ("ACCESS_TOKEN_KEY", "t"),
            ("ACCESS_TOKEN_SECRET", "ts"),
        ]))
        .unwrap();
        assert!(creds.has_user_context());
        assert_eq!(creds.access_token_secret, "ts");
    }

    #[test]
    fn test_bearer_alone_is_enough() {
        let creds = ApiCredentials::from_lookup(lookup(&[("BEARER_TOKEN", "abc")])).unwrap();
        assert_eq!(creds.bearer_token.as_deref(), Some("abc"));
        assert!(creds.api_key.is_empty());
        assert!(!creds.has_user_context());
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let creds = ApiCredentials::from_lookup(lookup(&[
            ("API_KEY", "key-123"),
            ("API_SECRET_KEY", "secret-456"),
            ("ACCESS_TOKEN_KEY", "token-789"),
            ("ACCESS_TOKEN_SECRET", "token-secret-0"),
        ]))
        .unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("key-123"));
        assert!(!rendered.contains("secret-456"));
        assert!(!rendered.contains("token-secret-0"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_config_requires_search_term_and_queue() {
        let api = ApiCredentials::default();
        assert_eq!(
            PipelineConfig::new(" ", "q", api.clone(), store()).unwrap_err(),
            ConfigError::Missing("search term")
        );
        assert_eq!(
            PipelineConfig::new("apple", "", api.clone(), store()).unwrap_err(),
            ConfigError::Missing("queue url")
        );
        assert_eq!(
            PipelineConfig::new("2024", "q", api, store()).unwrap_err(),
            ConfigError::InvalidSearchTerm("2024".into())
        );
    }

    #[test]
    fn test_edge_source_is_normalized() {
        let config =
            PipelineConfig::new("apple stock", "sqs://q", ApiCredentials::default(), store())
                .unwrap();
        assert_eq!(config.edge_source(), "APPLESTOCK");
        assert_eq!(config.search_term(), "apple stock");
        assert_eq!(config.queue_url(), "sqs://q");
    }
}
