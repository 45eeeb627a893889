//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location:
//! `/etc/modpatch/environment`, so every modpatch component shares the
//! same configuration. Call `load_environment()` early in main().

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Paths to check, in order of priority
pub const ENV_FILE_PATHS: &[&str] = &["/etc/modpatch/environment", "/etc/modpatch.env", ".env"];

/// Default directory for persisted daemon state (setup status file).
pub const DEFAULT_DATA_DIR: &str = "/var/lib/modpatch";

/// Default location of the diff index resource.
pub const DEFAULT_DIFF_INDEX: &str = "/usr/share/modpatch/diff-index.json";

/// Load environment variables from the canonical configuration file.
///
/// Checks `MP_ENV_FILE` first, then the system-wide paths, then `.env`
/// in the current directory. Existing environment variables are never
/// overridden. Returns the path that was loaded, if any.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("MP_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    if !Path::new(path).exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => {
            let mut loaded = 0usize;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded += 1;
                    }
                }
            }
            info!("Loaded {} environment variables from {}", loaded, path);
            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single `KEY=VALUE` line, stripping surrounding quotes.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the daemon data directory (`MP_DATA_DIR` or the default).
pub fn data_dir() -> PathBuf {
    PathBuf::from(get_config("MP_DATA_DIR", DEFAULT_DATA_DIR))
}
