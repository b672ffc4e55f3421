//! External tool detection and management.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ToolsConfig;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Check if a tool is available using a custom version argument.
pub fn check_tool_with_arg(name: &Path, version_arg: &str) -> ToolInfo {
    let display_name = name
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string_lossy().to_string());

    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok().or_else(|| Some(name.to_path_buf()));

            ToolInfo {
                name: display_name,
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: display_name,
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the external tools the service depends on.
///
/// Returns information about `magick` (required) and `heif-enc` (optional,
/// needed only for AVIF/HEIF targets).
pub fn check_tools(config: &ToolsConfig) -> Vec<ToolInfo> {
    let magick = config
        .magick_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("magick"));
    let heif_enc = config
        .heif_enc_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("heif-enc"));

    vec![
        check_tool_with_arg(&magick, "--version"),
        check_tool_with_arg(&heif_enc, "--version"),
    ]
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
fn resolve_tool(name: &str, config_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("Configured path for {} does not exist: {:?}", name, path);
    }

    which::which(name).ok()
}

/// Resolved external tool paths, discovered once at startup and shared
/// across requests.
#[derive(Debug, Clone, Default)]
pub struct Tools {
    /// Path to the ImageMagick `magick` binary, if found.
    pub magick: Option<PathBuf>,
    /// Path to the libheif `heif-enc` encoder, if found.
    pub heif_encoder: Option<PathBuf>,
}

impl Tools {
    /// Resolve tool paths from config overrides and PATH.
    pub fn discover(config: &ToolsConfig) -> Self {
        let magick = resolve_tool("magick", config.magick_path.as_deref());
        let heif_encoder = resolve_tool("heif-enc", config.heif_enc_path.as_deref());

        if magick.is_none() {
            tracing::warn!("ImageMagick not found; conversions will fail until it is installed");
        }
        if heif_encoder.is_none() {
            tracing::info!("heif-enc not found; AVIF/HEIF targets will be unavailable");
        }

        Self {
            magick,
            heif_encoder,
        }
    }
}
