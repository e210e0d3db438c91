//! Configuration file handling.
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depshield/config.toml`
//! - macOS: `~/Library/Application Support/depshield/config.toml`
//! - Windows: `%APPDATA%\depshield\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! concurrency = 8
//! query_timeout_secs = 10
//! retry_backoff_ms = 1000
//! osv_endpoint = "https://api.osv.dev/v1/query"
//! default_format = "table"
//! skip_directories = ["node_modules/", "vendor/"]
//!
//! [ignore]
//! packages = ["@types/*", "left-pad"]
//! vulnerabilities = ["CVE-2021-23337", "GHSA-35jh-r3h4-6jhm"]
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::checker::DEFAULT_OSV_ENDPOINT;

/// Directory prefixes never searched for manifests.
pub const DEFAULT_SKIP_DIRECTORIES: &[&str] = &[
    "node_modules/",
    "vendor/",
    "__pycache__/",
    ".venv/",
    "venv/",
    "test/",
    "tests/",
    "example/",
    "examples/",
    "docs/",
    "testdata/",
    "_examples/",
    "benchmarks/",
    ".github/",
];

/// Application configuration.
///
/// Loaded from TOML; every field falls back to its default when absent.
///
/// ```no_run
/// use depshield::Config;
///
/// let config = Config::load().unwrap();
/// println!("{} concurrent queries", config.concurrency);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of vulnerability queries in flight at once.
    pub concurrency: usize,

    /// Per-query timeout, in seconds.
    pub query_timeout_secs: u64,

    /// Backoff before retrying a rate-limited query, in milliseconds.
    pub retry_backoff_ms: u64,

    pub osv_endpoint: String,

    /// Valid values: "table", "json", "csv"
    pub default_format: String,

    /// Directory prefixes skipped when walking a local checkout.
    pub skip_directories: Vec<String>,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Packages and advisories to suppress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names never queried. `*` matches any run of characters,
    /// e.g. `"@types/*"`.
    pub packages: Vec<String>,

    /// Advisory ids or aliases never reported.
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    pub fn should_ignore_package(&self, name: &str) -> bool {
        self.packages.iter().any(|pattern| glob_match(pattern, name))
    }
}

/// Wildcard match where `*` stands for any (possibly empty) substring.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(head) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(head) else {
        return false;
    };

    let middle: Vec<&str> = parts.collect();
    let Some((tail, middle)) = middle.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };

    for part in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(tail)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            query_timeout_secs: 10,
            retry_backoff_ms: 1000,
            osv_endpoint: DEFAULT_OSV_ENDPOINT.to_string(),
            default_format: "table".to_string(),
            skip_directories: DEFAULT_SKIP_DIRECTORIES
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.query_timeout_secs == 0 {
            bail!("query_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// ```
    /// use depshield::Config;
    ///
    /// assert!(Config::config_path().ends_with("depshield/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depshield")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}
