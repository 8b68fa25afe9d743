use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides, e.g. `PDFHARVEST_FETCH__THREAD_COUNT=64`.
pub const ENV_PREFIX: &str = "PDFHARVEST_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(defaults().merge(Toml::file(path)).merge(env()))
}

/// Load defaults with environment variable overrides, without a file
pub fn load_env_config() -> Result<Config, ConfigError> {
    extract(defaults().merge(env()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
}

fn env() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}
