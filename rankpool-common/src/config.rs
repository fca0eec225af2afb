//! Configuration loading and config file resolution
//!
//! Missing config files never abort startup: a warning is logged and the
//! compiled defaults are used. Command-line flags are applied on top by the
//! service binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RANKPOOL_CONFIG";

/// Image extensions accepted by the pool catalog when none are configured
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Largest batch that can still be labelled `A..Z`
pub const MAX_SET_SIZE: usize = 26;

/// Logging section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// On-disk configuration (`config.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory holding the image pool
    pub image_root: PathBuf,
    /// Accepted file extensions (case-insensitive, leading dot optional)
    pub allowed_extensions: Vec<String>,
    /// Descend into subdirectories of `image_root`
    pub recursive: bool,
    /// Images assigned to each session
    pub n_total: usize,
    /// Images shown (and ranked) together
    pub set_size: usize,
    /// Global sampling seed, mixed with each session token
    pub seed: u64,
    /// SQLite database holding claims and assignments
    pub database_path: PathBuf,
    /// Directory receiving exported result files
    pub output_dir: PathBuf,
    /// HTTP listen address
    pub bind_addr: String,
    /// Per-statement SQLite busy timeout
    pub busy_timeout_ms: u64,
    /// Total time an allocation keeps retrying a locked store
    pub max_lock_wait_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            image_root: PathBuf::from("./sampled_arts"),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            recursive: false,
            n_total: 25,
            set_size: 5,
            seed: 123,
            database_path: PathBuf::from("./assignments.db"),
            output_dir: PathBuf::from("./outputs"),
            bind_addr: "127.0.0.1:5730".to_string(),
            busy_timeout_ms: 250,
            max_lock_wait_ms: 5000,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Check cross-field constraints
    ///
    /// Batches must partition the assignment exactly and each batch must
    /// fit the `A..Z` label range.
    pub fn validate(&self) -> Result<()> {
        if self.n_total == 0 {
            return Err(Error::Config("n_total must be greater than 0".to_string()));
        }
        if self.set_size == 0 || self.set_size > MAX_SET_SIZE {
            return Err(Error::Config(format!(
                "set_size must be between 1 and {}, got {}",
                MAX_SET_SIZE, self.set_size
            )));
        }
        if self.n_total % self.set_size != 0 {
            return Err(Error::Config(format!(
                "n_total must be a multiple of set_size. n_total={}, set_size={}",
                self.n_total, self.set_size
            )));
        }
        if self.normalized_extensions().is_empty() {
            return Err(Error::Config(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Lowercase extensions without the leading dot, deduplicated
    pub fn normalized_extensions(&self) -> Vec<String> {
        normalize_extensions(&self.allowed_extensions)
    }

    /// Number of batches a full assignment splits into
    pub fn num_sets(&self) -> usize {
        if self.set_size == 0 {
            return 0;
        }
        self.n_total.div_ceil(self.set_size)
    }
}

/// Lowercase, strip a leading dot, drop empties, sort and deduplicate
pub fn normalize_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut exts: Vec<String> = extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    exts.sort();
    exts.dedup();
    exts
}

/// Resolve which config file to read
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `RANKPOOL_CONFIG` environment variable
/// 3. `<config dir>/rankpool/config.toml` if it exists
///
/// Returns `None` when nothing applies; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("rankpool").join("config.toml"))
        .filter(|p| p.exists())
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// This file was requested but does not exist; defaults apply
    Missing(PathBuf),
    /// No file requested or found; defaults apply
    Defaults,
}

impl ConfigSource {
    /// Log how the configuration was obtained
    ///
    /// Call once logging is set up; a missing file is reported at warn.
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file {} not found, using defaults",
                path.display()
            ),
            ConfigSource::Defaults => info!("No config file found, using defaults"),
        }
    }
}

/// Load a config file with graceful degradation
///
/// A missing file yields defaults plus a warning. A file that exists but
/// cannot be parsed is a hard error, since silently ignoring it would
/// allocate with the wrong pool parameters.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let (config, source) = load_toml_config_with_source(path)?;
    source.log();
    Ok(config)
}

/// Load a config file without logging, returning where it came from
///
/// For callers that load configuration before the tracing subscriber
/// exists and report [`ConfigSource::log`] afterwards.
pub fn load_toml_config_with_source(path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let Some(path) = path else {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    };

    if !path.exists() {
        return Ok((TomlConfig::default(), ConfigSource::Missing(path.to_path_buf())));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok((config, ConfigSource::File(path.to_path_buf())))
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp = target.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        config.validate().unwrap();
        assert_eq!(config.num_sets(), 5);
    }

    #[test]
    fn test_set_size_must_divide_n_total() {
        let config = TomlConfig {
            n_total: 12,
            set_size: 5,
            ..TomlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_size_bounds() {
        let zero = TomlConfig {
            set_size: 0,
            ..TomlConfig::default()
        };
        assert!(zero.validate().is_err());

        let too_big = TomlConfig {
            n_total: 54,
            set_size: 27,
            ..TomlConfig::default()
        };
        assert!(too_big.validate().is_err());
    }

    #[test]
    fn test_extensions_are_normalized() {
        let config = TomlConfig {
            allowed_extensions: vec![".JPG".into(), "png".into(), " .Png ".into(), "".into()],
            ..TomlConfig::default()
        };
        assert_eq!(config.normalized_extensions(), vec!["jpg", "png"]);
    }

    #[test]
    fn test_normalize_extensions_helper() {
        assert_eq!(
            normalize_extensions(["PNG", ".png", ".Jpeg", "  "]),
            vec!["jpeg", "png"]
        );
    }

    #[test]
    fn test_empty_extensions_rejected() {
        let config = TomlConfig {
            allowed_extensions: vec![".".into()],
            ..TomlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
