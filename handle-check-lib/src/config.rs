//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files, reading `HC_*`
//! environment variables, and merging configurations with proper precedence
//! rules.

use crate::error::HandleCheckError;
use crate::types::{Strategy, MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// concurrency = 50
/// timeout = "8s"
/// catalog = "~/sites/data.json"
/// exclude = "~/sites/false_positives.txt"
/// strategy_order = ["message", "status_code", "response_url", "errorUrl"]
///
/// [output]
/// default_format = "json"
/// print_all = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Output formatting preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Default concurrency ceiling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-probe timeout, e.g. "5s", "2m", "500ms"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// User-Agent sent with every probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Skip TLS certificate validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Default site catalog file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    /// Default exclusion list file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Strategy evaluation order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_order: Option<Vec<String>>,

    /// Keywords looked up in claimed profiles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Default output format: "text", "json" or "csv"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    /// Print every outcome, not only claimed ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_all: Option<bool>,

    /// Grouped output with section headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<bool>,
}

impl DefaultsConfig {
    /// The configured strategy order, if any.
    pub fn strategy_order(&self) -> Option<Vec<Strategy>> {
        self.strategy_order
            .as_ref()
            .map(|names| names.iter().map(|n| Strategy::from(n.as_str())).collect())
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which config files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// `FileError` when the file is missing or unreadable, `ConfigError`
    /// when it is not valid TOML or holds invalid values.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, HandleCheckError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(HandleCheckError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            HandleCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            HandleCheckError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is applied first, then the global file in `$HOME`, then a
    /// file in the current directory. Later files win field by field.
    pub fn discover_and_load(&self) -> Result<FileConfig, HandleCheckError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping config file"),
            }
        }

        if self.verbose {
            for path in &loaded_files {
                info!(path = %path.display(), "loaded config file");
            }
        }

        Ok(merged_config)
    }

    /// Looks for configuration files in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./handle-check.toml", "./.handle-check.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Looks for configuration files in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".handle-check.toml", "handle-check.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("handle-check").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations. Values from `higher` take precedence.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower), Some(higher)) => Some(DefaultsConfig {
                    concurrency: higher.concurrency.or(lower.concurrency),
                    timeout: higher.timeout.or(lower.timeout),
                    user_agent: higher.user_agent.or(lower.user_agent),
                    insecure: higher.insecure.or(lower.insecure),
                    catalog: higher.catalog.or(lower.catalog),
                    exclude: higher.exclude.or(lower.exclude),
                    strategy_order: higher.strategy_order.or(lower.strategy_order),
                    keywords: higher.keywords.or(lower.keywords),
                }),
                (lower, higher) => higher.or(lower),
            },
            output: match (lower.output, higher.output) {
                (Some(lower), Some(higher)) => Some(OutputConfig {
                    default_format: higher.default_format.or(lower.default_format),
                    print_all: higher.print_all.or(lower.print_all),
                    pretty: higher.pretty.or(lower.pretty),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), HandleCheckError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                if concurrency == 0 || concurrency > MAX_CONCURRENCY {
                    return Err(HandleCheckError::config(format!(
                        "Concurrency must be between 1 and {}",
                        MAX_CONCURRENCY
                    )));
                }
            }

            if let Some(timeout_str) = &defaults.timeout {
                if parse_timeout_string(timeout_str).is_none() {
                    return Err(HandleCheckError::config(format!(
                        "Invalid timeout format '{}'. Use format like '5s', '30s', '2m'",
                        timeout_str
                    )));
                }
            }

            if let Some(order) = defaults.strategy_order() {
                if let Some(bad) = order.iter().find(|s| !s.is_recognized()) {
                    return Err(HandleCheckError::config(format!(
                        "Unknown strategy '{}' in strategy_order",
                        bad
                    )));
                }
            }
        }

        if let Some(format) = config.output.as_ref().and_then(|o| o.default_format.as_deref()) {
            if !matches!(format, "text" | "json" | "csv") {
                return Err(HandleCheckError::config(format!(
                    "Invalid default_format '{}'. Use text, json or csv",
                    format
                )));
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via `HC_*`
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<String>,
    pub catalog: Option<String>,
    pub exclude: Option<String>,
    pub insecure: Option<bool>,
    pub user_agent: Option<String>,
    pub json: Option<bool>,
    pub csv: Option<bool>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Check if output format conflicts exist (JSON and CSV both set).
    pub fn has_output_format_conflict(&self) -> bool {
        matches!((self.json, self.csv), (Some(true), Some(true)))
    }
}

/// Load configuration from environment variables.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    load_env_config_from(verbose, |key| env::var(key).ok())
}

/// Same as [`load_env_config`] with a custom variable lookup.
pub fn load_env_config_from<F>(verbose: bool, lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    let announce = |key: &str, value: &str| {
        if verbose {
            info!("Using {}={}", key, value);
        }
    };

    if let Some(val) = lookup("HC_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if (1..=MAX_CONCURRENCY).contains(&concurrency) => {
                env_config.concurrency = Some(concurrency);
                announce("HC_CONCURRENCY", &val);
            }
            _ => warn!(
                "Invalid HC_CONCURRENCY='{}', must be 1-{}",
                val, MAX_CONCURRENCY
            ),
        }
    }

    if let Some(timeout_str) = lookup("HC_TIMEOUT") {
        if parse_timeout_string(&timeout_str).is_some() {
            announce("HC_TIMEOUT", &timeout_str);
            env_config.timeout = Some(timeout_str);
        } else {
            warn!(
                "Invalid HC_TIMEOUT='{}', use format like '5s', '30s', '2m'",
                timeout_str
            );
        }
    }

    env_config.catalog = non_empty(&lookup, "HC_CATALOG");
    if let Some(path) = &env_config.catalog {
        announce("HC_CATALOG", path);
    }

    env_config.exclude = non_empty(&lookup, "HC_EXCLUDE");
    if let Some(path) = &env_config.exclude {
        announce("HC_EXCLUDE", path);
    }

    env_config.user_agent = non_empty(&lookup, "HC_USER_AGENT");
    if let Some(agent) = &env_config.user_agent {
        announce("HC_USER_AGENT", agent);
    }

    env_config.config = non_empty(&lookup, "HC_CONFIG");
    if let Some(path) = &env_config.config {
        announce("HC_CONFIG", path);
    }

    env_config.insecure = env_bool(&lookup, "HC_INSECURE");
    env_config.json = env_bool(&lookup, "HC_JSON");
    env_config.csv = env_bool(&lookup, "HC_CSV");

    env_config
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn env_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(key)?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!("Invalid {}='{}', use true/false", key, val);
            None
        }
    }
}

/// Parse a timeout string like "500ms", "5s", "30s", "2m".
///
/// A bare number is taken as seconds. Returns `None` for anything else,
/// including a zero duration.
pub fn parse_timeout_string(timeout_str: &str) -> Option<Duration> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let duration = if let Some(ms) = timeout_str.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = timeout_str.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = timeout_str.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        timeout_str.parse::<u64>().ok().map(Duration::from_secs)
    }?;

    (!duration.is_zero()).then_some(duration)
}
