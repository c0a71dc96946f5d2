//! CLI settings – reads/writes `~/.skelfuse/config.toml`.
//!
//! Only the CLI's own settings live here.  Calibration files are produced
//! elsewhere and are only read.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// JSON calibration file describing the rig.
    #[serde(default = "default_calibration_path")]
    pub calibration_path: PathBuf,

    /// Drop unregistered feeds instead of failing their frame.
    #[serde(default)]
    pub skip_unknown_feeds: bool,

    /// Abort the stream on the first frame that cannot be fused.
    #[serde(default)]
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calibration_path: default_calibration_path(),
            skip_unknown_feeds: false,
            strict: false,
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_calibration_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".skelfuse").join("calibration.json")
}

/// Path of the config file: `$SKELFUSE_CONFIG` or `~/.skelfuse/config.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var("SKELFUSE_CONFIG") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => config_path_for_home(&home_dir()),
    }
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".skelfuse").join("config.toml")
}

/// Load the config from disk and apply env overrides.  Returns `None` if the
/// file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load the config, falling back to defaults (plus env overrides) when the
/// file is absent.
pub fn load_or_default() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `SKELFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SKELFUSE_CALIBRATION` | `calibration_path` |
/// | `SKELFUSE_SKIP_UNKNOWN` | `skip_unknown_feeds` |
/// | `SKELFUSE_STRICT` | `strict` |
///
/// Boolean variables accept `1/0`, `true/false`, `yes/no`; anything else is
/// ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SKELFUSE_CALIBRATION")
        && !v.is_empty()
    {
        cfg.calibration_path = PathBuf::from(v);
    }
    if let Some(b) = env_bool("SKELFUSE_SKIP_UNKNOWN") {
        cfg.skip_unknown_feeds = b;
    }
    if let Some(b) = env_bool("SKELFUSE_STRICT") {
        cfg.strict = b;
    }
}

fn env_bool(key: &str) -> Option<bool> {
    parse_bool(&std::env::var(key).ok()?)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.skelfuse/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
