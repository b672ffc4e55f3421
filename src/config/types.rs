use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Apply environment variable overrides on top of the loaded values.
    ///
    /// `TEMP_DIR` is honored as a fallback for `IMAGEMILL_TEMP_DIR` for
    /// compatibility with common container setups.
    pub fn apply_env_overrides(&mut self) {
        if let Some(mb) = env_parse::<u64>("IMAGEMILL_MAX_UPLOAD_MB") {
            self.limits.max_upload_mb = mb;
        }
        if let Some(secs) = env_parse::<u64>("IMAGEMILL_TIMEOUT_SECS") {
            self.limits.timeout_secs = secs;
        }
        if let Ok(dir) = std::env::var("IMAGEMILL_TEMP_DIR") {
            self.limits.temp_dir = PathBuf::from(dir);
        } else if let Ok(dir) = std::env::var("TEMP_DIR") {
            self.limits.temp_dir = PathBuf::from(dir);
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Resource limits applied to each conversion request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,

    /// Wall-clock timeout for a single `magick` invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Root directory under which per-request workspaces are created.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl LimitsConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_upload_mb() -> u64 {
    200
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            timeout_secs: default_timeout_secs(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Paths to external CLI tools, preferred over PATH lookup when set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub magick_path: Option<PathBuf>,

    #[serde(default)]
    pub heif_enc_path: Option<PathBuf>,
}
