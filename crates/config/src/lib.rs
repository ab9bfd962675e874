//! Configuration loading and env substitution.
//!
//! Config files: `parabox.toml`, `parabox.yaml`, `parabox.yml`, or `parabox.json`.
//! Searched in `./` then the user config directory (`~/.config/parabox/` on Linux).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, clear_data_dir, config_dir, data_dir, discover_and_load,
        find_or_default_config_path, load_config, save_config, set_config_dir, set_data_dir,
    },
    schema::{
        ConnectionEntry, DatabaseConfig, ExtensionsConfig, ParaboxConfig, RuntimeConfig,
    },
};
