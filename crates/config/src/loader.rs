use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ParaboxConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "parabox.toml",
    "parabox.yaml",
    "parabox.yml",
    "parabox.json",
];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "parabox")
}

/// Use `dir` instead of the platform config directory.
pub fn set_config_dir(dir: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner()) = None;
}

/// Use `dir` instead of the platform data directory.
pub fn set_data_dir(dir: PathBuf) {
    *DATA_DIR_OVERRIDE.write().unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

pub fn clear_data_dir() {
    *DATA_DIR_OVERRIDE.write().unwrap_or_else(|e| e.into_inner()) = None;
}

/// The config directory: the override if set, else `~/.config/parabox/` or
/// its platform equivalent.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return Some(dir);
    }
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// The data directory holding the database and installed extensions.
/// Falls back to `.` when the platform has no home directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return dir;
    }
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ParaboxConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./parabox.{toml,yaml,yml,json}` (project-local)
/// 2. `<config_dir>/parabox.{toml,yaml,yml,json}`
///
/// Returns `ParaboxConfig::default()` if no file is found or the file
/// cannot be loaded.
pub fn discover_and_load() -> ParaboxConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return ParaboxConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(config) => {
            for alias in config.duplicate_aliases() {
                warn!(alias, "connection alias configured more than once");
            }
            config
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            ParaboxConfig::default()
        },
    }
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parabox.toml")
}

/// Serialize `config` in the format of `path`'s extension and write it.
///
/// Creates parent directories if needed.
pub fn save_config(config: &ParaboxConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let rendered = match ext {
        "toml" => toml::to_string_pretty(config)
            .map_err(|e| anyhow::anyhow!("serialize config: {e}"))?,
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    };
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ParaboxConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
