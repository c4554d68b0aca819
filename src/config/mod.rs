//! Tool configuration
//!
//! Settings are merged from four layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Host/user config (`$XDG_CONFIG_HOME/flagmerge/config.toml`)
//! 3. Repo config (`.flagmerge.toml`, or `--config`)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    default_host_config_path, BatchSettings, ConfigError, ConfigOrigin, ConfigSource,
    DeletionSettings, EffectiveConfig, Settings, DEFAULT_REPO_CONFIG,
};
pub use merge::{deep_merge, merge_layers};
