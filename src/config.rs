//! Configuration for the sniffer.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SNIFFER_HOME, SNIFFER_QUEUE)
//! 2. Config file (.sniffer/config.yaml)
//! 3. Defaults (~/.sniffer, ~/.sniffer/queue.jsonl)
//!
//! Config file discovery:
//! - Searches current directory and parents for .sniffer/config.yaml
//! - Paths in config file are relative to the .sniffer/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sniffer::SnifferConfig;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const HOME_ENV: &str = "SNIFFER_HOME";
const QUEUE_ENV: &str = "SNIFFER_QUEUE";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: SnifferConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Sniffer state directory
    pub home: Option<String>,
    /// Queue spool file
    pub queue: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Sniffer state directory
    pub home: PathBuf,
    /// JSONL queue spool
    pub queue_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Pipeline settings
    pub pipeline: SnifferConfig,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".sniffer").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Combine defaults, an optional config file and env overrides
fn resolve_config(
    config_file: Option<PathBuf>,
    env_home: Option<String>,
    env_queue: Option<String>,
) -> Result<ResolvedConfig> {
    let file = config_file.as_deref().map(load_config_file).transpose()?;

    // Relative paths in the file are anchored at .sniffer/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = match (env_home, file.as_ref().and_then(|f| f.paths.home.as_deref())) {
        (Some(env), _) => PathBuf::from(env),
        (None, Some(home)) => resolve_path(base_dir, home),
        (None, None) => dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".sniffer"),
    };

    let queue_path = match (env_queue, file.as_ref().and_then(|f| f.paths.queue.as_deref())) {
        (Some(env), _) => PathBuf::from(env),
        (None, Some(queue)) => resolve_path(base_dir, queue),
        (None, None) => home.join("queue.jsonl"),
    };

    Ok(ResolvedConfig {
        home,
        queue_path,
        pipeline: file.map(|f| f.pipeline).unwrap_or_default(),
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    resolve_config(
        find_config_file(),
        std::env::var(HOME_ENV).ok(),
        std::env::var(QUEUE_ENV).ok(),
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the queue spool path
pub fn queue_path() -> Result<PathBuf> {
    Ok(config()?.queue_path.clone())
}
