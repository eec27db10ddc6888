// src/feed/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::feed::visibility::VisibilityPolicy;

pub const ENV_CONFIG_PATH: &str = "ACTIVITY_FEED_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/activity_feed.toml";
pub const DEFAULT_JSON_PATH: &str = "config/activity_feed.json";

fn default_per_source_cap() -> usize {
    50
}
fn default_default_limit() -> usize {
    50
}
fn default_min_limit() -> usize {
    1
}
fn default_max_limit() -> usize {
    200
}
fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Most recent records each source window holds.
    #[serde(default = "default_per_source_cap")]
    pub per_source_cap: usize,
    /// Limit used when the caller gives none.
    #[serde(default = "default_default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_min_limit")]
    pub min_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Capacity of the adapter → aggregator channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            per_source_cap: default_per_source_cap(),
            default_limit: default_default_limit(),
            min_limit: default_min_limit(),
            max_limit: default_max_limit(),
            channel_capacity: default_channel_capacity(),
            visibility: VisibilityPolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Clamps a requested output limit into the configured bounds.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(self.min_limit, self.max_limit)
    }

    // Keeps numbers usable even when a file sets them to nonsense.
    fn sanitize(mut self) -> Self {
        self.per_source_cap = self.per_source_cap.max(1);
        self.channel_capacity = self.channel_capacity.max(1);
        self.min_limit = self.min_limit.max(1);
        if self.min_limit > self.max_limit {
            std::mem::swap(&mut self.min_limit, &mut self.max_limit);
        }
        self.visibility = self.visibility.merged_over_defaults();
        self
    }
}

/// Load config from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<FeedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing feed config {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $ACTIVITY_FEED_CONFIG_PATH
/// 2) config/activity_feed.toml
/// 3) config/activity_feed.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<FeedConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(FeedConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<FeedConfig> {
    let cfg: FeedConfig = match hint_ext {
        "json" => serde_json::from_str(s)?,
        "toml" => toml::from_str(s)?,
        _ => match serde_json::from_str(s) {
            Ok(v) => v,
            Err(_) => toml::from_str(s).map_err(|e| anyhow!("unsupported feed config format: {e}"))?,
        },
    };
    Ok(cfg.sanitize())
}
