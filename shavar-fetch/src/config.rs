use std::path::Path;
use std::time::Duration;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_BASE_URL: &str = "http://safebrowsing.clients.google.com/safebrowsing/";
pub const DEFAULT_CLIENT: &str = "api";
pub const PROTOCOL_VERSION: &str = "2.2";
pub const DEFAULT_LISTS: &[&str] = &["goog-malware-shavar", "googpub-phish-shavar"];

/// Client configuration. Every field has a default, so a JSON config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub client: String,
    pub app_version: String,
    pub protocol_version: String,
    /// Endpoint functions (`list`, `downloads`, `gethash`) are appended to this.
    pub base_url: String,
    /// Lists to replicate, in lookup priority order.
    pub lists: Vec<CompactString>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Redirect bodies fetched at once during a sync.
    pub redirect_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            client: DEFAULT_CLIENT.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            lists: DEFAULT_LISTS.iter().map(|&l| l.into()).collect(),
            timeout_secs: 30,
            max_retries: 3,
            redirect_concurrency: 4,
        }
    }
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.lists.is_empty() {
            return Err(Error::Config("no lists configured".to_string()));
        }
        if let Some(list) = self.lists.iter().find(|l| l.is_empty() || l.contains([';', ':', '\n'])) {
            return Err(Error::Config(format!("invalid list name '{list}'")));
        }
        if self.redirect_concurrency == 0 {
            return Err(Error::Config("redirect_concurrency must be at least 1".to_string()));
        }
        if self.base_url.is_empty() {
            return Err(Error::Config("base_url is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol_version, "2.2");
        assert_eq!(config.lists, vec!["goog-malware-shavar", "googpub-phish-shavar"]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_key": "k3y", "lists": ["test-list"], "timeout_secs": 5}}"#).unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.api_key, "k3y");
        assert_eq!(config.lists, vec!["test-list"]);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.client, DEFAULT_CLIENT);
        assert_eq!(config.redirect_concurrency, 4);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(Config::from_json_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects() {
        let no_lists = Config { lists: vec![], ..Config::default() };
        assert!(no_lists.validate().is_err());

        let bad_name = Config { lists: vec!["a;b".into()], ..Config::default() };
        assert!(bad_name.validate().is_err());

        let no_concurrency = Config { redirect_concurrency: 0, ..Config::default() };
        assert!(no_concurrency.validate().is_err());
    }
}
