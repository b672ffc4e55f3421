mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config.apply_env_overrides();
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config.
///
/// Environment overrides (`IMAGEMILL_MAX_UPLOAD_MB`, `IMAGEMILL_TIMEOUT_SECS`,
/// `IMAGEMILL_TEMP_DIR`, `TEMP_DIR`) are applied on top of whatever source
/// was used.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./imagemill.toml",
        "~/.config/imagemill/config.toml",
        "/etc/imagemill/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration.
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.limits.max_upload_mb == 0 {
        anyhow::bail!("limits.max_upload_mb cannot be 0");
    }

    if config.limits.timeout_secs == 0 {
        anyhow::bail!("limits.timeout_secs cannot be 0");
    }

    if let Some(ref path) = config.tools.magick_path {
        if !path.exists() {
            tracing::warn!("Configured magick path does not exist: {:?}", path);
        }
    }

    Ok(())
}
