use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::SyncError;

/// Everything the sync pipeline needs to know about its environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Indexing service host, with or without a scheme (`http://` is assumed).
    #[serde(default = "default_server_host")]
    pub server_host: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Encoded API key sent as `Authorization: ApiKey ...`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Username whose permissions decide which users are visible to the index.
    #[serde(default = "default_indexing_viewer")]
    pub indexing_viewer: String,

    /// Fragments at or below this many words are "short".
    #[serde(default = "default_wordiness_threshold")]
    pub wordiness_threshold: usize,

    /// Words that mark a short fragment as a salutation.
    #[serde(default = "default_skip_words")]
    pub skip_words: Vec<String>,

    /// Index names are `{index_prefix}-users`, `-posts` and `-tags`.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_server_host() -> String {
    "http://localhost".to_string()
}

fn default_server_port() -> u16 {
    9200
}

fn default_indexing_viewer() -> String {
    "system".to_string()
}

fn default_wordiness_threshold() -> usize {
    5
}

fn default_skip_words() -> Vec<String> {
    vec!["thanks".to_string()]
}

fn default_index_prefix() -> String {
    "discourse".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            api_key: None,
            indexing_viewer: default_indexing_viewer(),
            wordiness_threshold: default_wordiness_threshold(),
            skip_words: default_skip_words(),
            index_prefix: default_index_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: SyncConfig = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.server_host.trim().is_empty() {
            return Err(SyncError::Config("server_host is empty".into()));
        }
        if host_has_port(&self.server_host) {
            return Err(SyncError::Config(format!(
                "server_host {} carries a port; set server_port instead",
                self.server_host
            )));
        }
        if self.index_prefix.trim().is_empty() {
            return Err(SyncError::Config("index_prefix is empty".into()));
        }
        Ok(())
    }

    /// Base URL of the indexing service, e.g. `http://localhost:9200`.
    pub fn server_url(&self) -> String {
        let host = self.server_host.trim().trim_end_matches('/');
        if host.contains("://") {
            format!("{}:{}", host, self.server_port)
        } else {
            format!("http://{}:{}", host, self.server_port)
        }
    }

    /// Skip words, lowercased for comparison against normalized tokens.
    pub fn skip_word_set(&self) -> HashSet<String> {
        self.skip_words.iter().map(|w| w.to_lowercase()).collect()
    }
}

/// Whether the authority part of `host` already ends in `:port`.
fn host_has_port(host: &str) -> bool {
    let host = host.trim();
    let rest = host.split_once("://").map_or(host, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    // bracketed IPv6 literals contain colons of their own
    let after_address = match authority.rfind(']') {
        Some(end) => &authority[end + 1..],
        None => authority,
    };
    after_address.contains(':')
}
