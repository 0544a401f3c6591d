use crate::matching::MatchConfig;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // path to the credential store
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// setlist.fm API key; SETLIST_FM_API_KEY is used when unset.
    #[serde(default)]
    pub setlistfm_api_key: Option<String>,

    /// Spotify app credentials; when unset they are read from the DB.
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,

    // Matching
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_search_concurrency")]
    pub search_concurrency: usize,

    #[serde(default = "default_max_batch_spotify")]
    pub max_batch_size_spotify: usize,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("setlist-sync")
        .join("setlist-sync.db")
}
fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("setlist-sync")
        .join("logs")
}
fn default_similarity_threshold() -> f64 { 0.8 }
fn default_candidate_limit() -> usize { 10 }
fn default_search_concurrency() -> usize { 1 }
fn default_max_batch_spotify() -> usize { 100 }
fn default_listen_addr() -> String { "127.0.0.1:8888".into() }

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            setlistfm_api_key: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            similarity_threshold: default_similarity_threshold(),
            candidate_limit: default_candidate_limit(),
            search_concurrency: default_search_concurrency(),
            max_batch_size_spotify: default_max_batch_spotify(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// `$XDG_CONFIG_HOME/setlist-sync/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("setlist-sync").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(anyhow!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            ));
        }
        if !(1..=50).contains(&self.candidate_limit) {
            return Err(anyhow!(
                "candidate_limit must be within 1..=50, got {}",
                self.candidate_limit
            ));
        }
        if self.search_concurrency == 0 {
            return Err(anyhow!("search_concurrency must be at least 1"));
        }
        if !(1..=100).contains(&self.max_batch_size_spotify) {
            return Err(anyhow!(
                "max_batch_size_spotify must be within 1..=100, got {}",
                self.max_batch_size_spotify
            ));
        }
        Ok(())
    }

    /// Matching tunables for the engine. Fails when the config does not validate.
    pub fn match_config(&self) -> Result<MatchConfig> {
        self.validate()?;
        Ok(MatchConfig {
            similarity_threshold: self.similarity_threshold,
            candidate_limit: self.candidate_limit,
            search_concurrency: self.search_concurrency,
        })
    }

    pub fn setlistfm_api_key(&self) -> Option<String> {
        self.setlistfm_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("SETLIST_FM_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}
