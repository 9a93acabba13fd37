use crate::backoff::Backoff;
use crate::graph::EdgePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub stream: Stream,
    pub auth: Auth,
    pub reconnect: Backoff,
    pub store: Store,
    pub graph: Graph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub url: String,
    pub language: String,
    /// Bounds the TCP connect and the wait for response headers.
    pub connect_timeout_secs: u64,
    /// Initial line buffer capacity. Read sizes follow the HTTP body.
    pub chunk_size: usize,
    pub max_line_bytes: usize,
    /// Zero disables the stall check.
    pub stall_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub pool_size: u32,
    pub pool_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub edge_policy: EdgePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stream: Stream {
                url: "https://stream.twitter.com/1.1/statuses/filter.json".to_string(),
                language: "en".to_string(),
                connect_timeout_secs: 60,
                chunk_size: 10_000,
                max_line_bytes: 1024 * 1024,
                stall_timeout_secs: 90,
            },
            auth: Auth {
                backoff: Backoff {
                    max_attempts: 5,
                    initial_delay_ms: 1_000,
                    max_delay_ms: 60_000,
                },
            },
            reconnect: Backoff {
                max_attempts: 8,
                initial_delay_ms: 250,
                max_delay_ms: 16_000,
            },
            store: Store {
                pool_size: 30,
                pool_timeout_secs: 30,
                busy_timeout_ms: 2_000,
            },
            graph: Graph {
                edge_policy: EdgePolicy::Accumulate,
            },
        }
    }
}

impl Stream {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_secs > 0).then(|| Duration::from_secs(self.stall_timeout_secs))
    }
}

impl Settings {
    pub fn load() -> &'static Settings {
        SETTINGS.get_or_init(Self::load_from_files)
    }

    fn load_from_files() -> Settings {
        Self::load_from_paths(
            Path::new("settings.default.ron"),
            Path::new("settings.ron"),
        )
    }

    fn load_from_paths(default_path: &Path, override_path: &Path) -> Settings {
        let mut settings = if default_path.exists() {
            fs::read_to_string(default_path)
                .ok()
                .and_then(|content| ron::from_str(&content).ok())
                .unwrap_or_default()
        } else {
            Settings::default()
        };

        if override_path.exists() {
            if let Ok(content) = fs::read_to_string(override_path) {
                if let Ok(overrides) = ron::from_str::<Settings>(&content) {
                    settings = overrides;
                }
            }
        }

        settings
    }
}

pub fn settings() -> &'static Settings {
    Settings::load()
}
