//! `config.json` loading.
//!
//! ```json
//! {
//!     "token": "123456:ABC...",
//!     "interval": 300,
//!     "admins": [123456],
//!     "data_dir": "/var/lib/sslv-watch"
//! }
//! ```
//!
//! `token` and `interval` are required.  `admins` and `channel_preferences`
//! are accepted for compatibility with existing config files but nothing
//! acts on them yet.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::extract::DEFAULT_PRICE_FIELD;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Telegram bot token.
    pub token: String,
    /// Seconds between poll cycles.
    pub interval: u64,
    #[serde(default, deserialize_with = "ids")]
    pub admins: BTreeSet<String>,
    #[serde(default)]
    pub channel_preferences: Map<String, Value>,
    /// Directory holding `data.json` and `sslv.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Attribute label the price is read from.
    #[serde(default = "default_price_field")]
    pub price_field: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_price_field() -> String {
    DEFAULT_PRICE_FIELD.to_string()
}

/// Chat ids show up both as JSON numbers and strings.
fn ids<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Number(n) => n.to_string(),
            Id::Text(s) => s,
        })
        .collect())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!(
                "config file {} not found; create it based on config.json.example",
                path.display()
            )
        })?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        if config.token.trim().is_empty() {
            bail!("bot token not specified");
        }
        if config.interval == 0 {
            bail!("interval must be at least one second");
        }
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(r#"{ "token": "abc", "interval": 60 }"#).unwrap();

        assert_eq!(config.interval(), Duration::from_secs(60));
        assert!(config.admins.is_empty());
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(15));
        assert_eq!(config.price_field, "Цена");
    }

    #[test]
    fn full_config() {
        let config = Config::parse(
            r#"{
                "token": "abc",
                "interval": 300,
                "admins": [123, "456"],
                "channel_preferences": { "-100": { "silent": true } },
                "data_dir": "/tmp/sslv",
                "fetch_timeout_secs": 5,
                "price_field": "Cena"
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.admins.iter().cloned().collect::<Vec<_>>(),
            vec!["123".to_string(), "456".to_string()]
        );
        assert!(config.channel_preferences.contains_key("-100"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sslv"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.price_field, "Cena");
    }

    #[test]
    fn token_and_interval_are_required() {
        assert!(Config::parse(r#"{ "interval": 60 }"#).is_err());
        assert!(Config::parse(r#"{ "token": "abc" }"#).is_err());
        assert!(Config::parse(r#"{ "token": " ", "interval": 60 }"#).is_err());
        assert!(Config::parse(r#"{ "token": "abc", "interval": 0 }"#).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
