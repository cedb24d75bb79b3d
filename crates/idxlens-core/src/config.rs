use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "IDXLENS_CONFIG";

/// Runtime settings. Precedence: defaults, then the JSON file named by
/// `IDXLENS_CONFIG`, then `IDXLENS_*` variables; CLI flags are applied last
/// by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway_url: Option<String>,
    #[serde(skip_serializing)]
    pub gateway_token: Option<String>,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// MAD threshold used by the fund scatter analysis.
    pub outlier_threshold: f64,
    pub max_codes: usize,
    pub rate_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            gateway_token: None,
            timeout_ms: 10_000,
            cache_ttl_secs: 300,
            cache_capacity: 256,
            outlier_threshold: 5.0,
            max_codes: 8,
            rate_per_minute: 120,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{name} has an invalid value '{raw}'")))
}

impl AppConfig {
    /// Loads from the process environment.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Loads using `lookup` in place of the process environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CoreError> {
        if let Some(url) = lookup("IDXLENS_GATEWAY_URL") {
            self.gateway_url = Some(url.trim().to_owned()).filter(|url| !url.is_empty());
        }
        if let Some(token) = lookup("IDXLENS_GATEWAY_TOKEN") {
            self.gateway_token = Some(token.trim().to_owned()).filter(|token| !token.is_empty());
        }
        if let Some(raw) = lookup("IDXLENS_TIMEOUT_MS") {
            self.timeout_ms = parse_var("IDXLENS_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("IDXLENS_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_var("IDXLENS_CACHE_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("IDXLENS_CACHE_CAPACITY") {
            self.cache_capacity = parse_var("IDXLENS_CACHE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("IDXLENS_OUTLIER_THRESHOLD") {
            self.outlier_threshold = parse_var("IDXLENS_OUTLIER_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("IDXLENS_MAX_CODES") {
            self.max_codes = parse_var("IDXLENS_MAX_CODES", &raw)?;
        }
        if let Some(raw) = lookup("IDXLENS_RATE_PER_MINUTE") {
            self.rate_per_minute = parse_var("IDXLENS_RATE_PER_MINUTE", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(CoreError::Config(String::from(
                "outlier_threshold must be a positive number",
            )));
        }
        if self.max_codes == 0 {
            return Err(CoreError::Config(String::from("max_codes must be at least 1")));
        }
        if self.timeout_ms == 0 {
            return Err(CoreError::Config(String::from("timeout_ms must be at least 1")));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
