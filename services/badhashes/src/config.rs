use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hierarchy::{Endpoints, Hash, RetryPolicy};
use serde::Deserialize;
use thiserror::Error;

/// Genesis of the observed deployment
pub const DEFAULT_GENESIS_HASH: &str =
    "0x4c35b1216decc6aa2431fa2d2a1c68f15d70f83a309041ed1bfef5ad6592a3d4";

const CONFIG_PATH_VAR: &str = "BADHASHES_CONFIG";
const SEARCH_PATHS: [&str; 2] = ["config/config.toml", "config.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found (searched {})", join_paths(.searched))]
    Missing { searched: Vec<PathBuf> },

    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConfigError::Invalid(format!("unknown output format {other:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    top_url: String,
    region_urls: Vec<String>,
    zone_urls: Vec<Vec<String>>,
    #[serde(default)]
    genesis_hash: Option<String>,
    #[serde(default = "default_max_walk_steps")]
    max_walk_steps: usize,
    #[serde(default = "default_call_timeout_secs")]
    call_timeout_secs: u64,
    #[serde(default)]
    output: OutputFormat,
    #[serde(default)]
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetryConfig {
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    max_sweeps: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 30_000,
            max_sweeps: None,
        }
    }
}

fn default_max_walk_steps() -> usize {
    1_000_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub endpoints: Endpoints,
    pub genesis: Hash,
    pub max_walk_steps: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub output: OutputFormat,
}

impl AppConfig {
    /// Locate, parse and validate the config, then apply env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = locate(std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))?;
        let mut cfg = Self::from_file(&path)?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        for url in std::iter::once(&file.top_url)
            .chain(file.region_urls.iter())
            .chain(file.zone_urls.iter().flatten())
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {url} must start with http:// or https://"
                )));
            }
        }

        let endpoints = Endpoints::new(file.top_url, file.region_urls, file.zone_urls)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let genesis = parse_genesis(file.genesis_hash.as_deref().unwrap_or(DEFAULT_GENESIS_HASH))?;

        if file.max_walk_steps == 0 {
            return Err(ConfigError::Invalid("max_walk_steps must be positive".into()));
        }
        if file.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be positive".into()));
        }

        Ok(Self {
            endpoints,
            genesis,
            max_walk_steps: file.max_walk_steps,
            call_timeout: Duration::from_secs(file.call_timeout_secs),
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(file.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(file.retry.max_backoff_ms),
                max_sweeps: file.retry.max_sweeps,
            },
            output: file.output,
        })
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("BADHASHES_GENESIS_HASH") {
            self.genesis = parse_genesis(&v)?;
        }
        if let Some(v) = var("BADHASHES_CALL_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("BADHASHES_CALL_TIMEOUT_SECS={v} is not a number")))?;
            if secs == 0 {
                return Err(ConfigError::Invalid("BADHASHES_CALL_TIMEOUT_SECS must be positive".into()));
            }
            self.call_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = var("BADHASHES_OUTPUT") {
            self.output = v.parse()?;
        }
        Ok(())
    }
}

fn parse_genesis(s: &str) -> Result<Hash, ConfigError> {
    s.parse()
        .map_err(|e| ConfigError::Invalid(format!("genesis_hash: {e}")))
}

/// Explicit path first, else the first existing entry of the search list
fn locate(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::Missing { searched: vec![path] });
    }

    let searched: Vec<PathBuf> = SEARCH_PATHS.iter().map(PathBuf::from).collect();
    searched
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or(ConfigError::Missing { searched })
}
