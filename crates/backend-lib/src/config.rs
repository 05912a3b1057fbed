// ============================
// relay-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Result};
use axum::http::HeaderValue;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of environment overrides, e.g. `RELAY_FANOUT__VOTES=split`
pub const ENV_PREFIX: &str = "RELAY_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level, used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Origins allowed by CORS; empty or `"*"` allows any origin
    pub cors_allowed_origins: Vec<String>,
    /// Broadcast shape per event category
    pub fanout: FanoutSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// How an event reaches a community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fanout {
    /// One unflagged copy to every member, sender included
    Room,
    /// Peer-flagged copy to everyone but the sender, self-flagged copy to
    /// the sender
    Split,
}

/// Fan-out per broadcast category. Chat messages always use
/// [`Fanout::Split`] and are not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutSettings {
    /// `vote_update` broadcasts
    pub votes: Fanout,
    /// `poll_update` echoes of explicit poll creation
    pub poll_updates: Fanout,
    /// `document_shared` broadcasts
    pub documents: Fanout,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            votes: Fanout::Room,
            poll_updates: Fanout::Room,
            documents: Fanout::Room,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            fanout: FanoutSettings::default(),
        }
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load defaults, then the TOML file at `path` if it exists, then
    /// `RELAY_`-prefixed environment variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!(
                "invalid log level {:?}, expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        for origin in &self.cors_allowed_origins {
            if origin.trim().is_empty() {
                bail!("empty CORS origin");
            }
            if origin != "*" && HeaderValue::from_str(origin).is_err() {
                bail!("invalid CORS origin {origin:?}");
            }
        }
        Ok(())
    }

    /// Whether CORS should accept any origin
    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.is_empty() || self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(settings.fanout.votes, Fanout::Room);
        assert!(!settings.allows_any_origin());
    }

    #[test]
    fn test_settings_validation() {
        let mut invalid = Settings::default();
        invalid.log_level = "loud".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = Settings::default();
        invalid.cors_allowed_origins = vec![" ".to_string()];
        assert!(invalid.validate().is_err());

        let mut invalid = Settings::default();
        invalid.cors_allowed_origins = vec!["http://bad\norigin".to_string()];
        assert!(invalid.validate().is_err());

        let mut wildcard = Settings::default();
        wildcard.cors_allowed_origins = vec!["*".to_string()];
        assert!(wildcard.validate().is_ok());
        assert!(wildcard.allows_any_origin());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "0.0.0.0:4000"
log_format = "json"
cors_allowed_origins = []

[fanout]
votes = "split"
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.bind_addr.port(), 4000);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.allows_any_origin());
        assert_eq!(settings.fanout.votes, Fanout::Split);
        // untouched keys keep their defaults
        assert_eq!(settings.fanout.documents, Fanout::Room);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.bind_addr, Settings::default().bind_addr);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"log_level = "shouting""#).unwrap();
        assert!(Settings::load_from(file.path()).is_err());
    }
}
