//! Conversion orchestration.
//!
//! Sequences validation, parameter mapping, and external process execution
//! for a single request: validate the upload, build the `magick` argument
//! list from the mapper, run the converter inside an isolated workspace
//! under a hard timeout, and hand the output back for streaming.

pub mod command;
pub mod tools;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use tools::{check_tools, ToolInfo, Tools};
pub use workspace::Workspace;

use std::path::Path;
use std::sync::Arc;

use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::mapping::{self, ConversionMode, TargetFormat};

/// File extensions accepted for upload (lowercase, no dot).
pub const ALLOWED_EXTENSIONS: [&str; 11] = [
    "jpg", "jpeg", "png", "gif", "webp", "avif", "heif", "heic", "bmp", "tiff", "tif",
];

/// Validated source file name, split into stem and extension.
#[derive(Debug, Clone)]
pub struct SourceName {
    /// Original filename without the extension.
    pub stem: String,
    /// Lowercase extension without the dot.
    pub ext: String,
}

impl SourceName {
    /// Download filename for the converted result: original stem plus the
    /// target format's extension.
    pub fn download_name(&self, format: TargetFormat) -> String {
        format!("{}.{}", self.stem, format.as_str())
    }
}

/// Validate an uploaded filename against the extension allow-list.
pub fn validate_filename(filename: Option<&str>) -> Result<SourceName> {
    let filename = match filename {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(Error::InvalidInput("filename is required".into())),
    };

    let path = Path::new(filename);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::InvalidInput(format!(
            "unsupported file format: .{ext}; allowed formats: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("converted")
        .to_string();

    Ok(SourceName { stem, ext })
}

/// Validate the 0-100 setting dial.
pub fn validate_setting(setting: u16) -> Result<u8> {
    if setting > 100 {
        return Err(Error::InvalidParameter(format!(
            "invalid setting {setting}, must be between 0 and 100"
        )));
    }
    Ok(setting as u8)
}

/// Runs conversions against the external `magick` binary.
#[derive(Clone)]
pub struct Converter {
    limits: LimitsConfig,
    tools: Arc<Tools>,
}

impl Converter {
    pub fn new(limits: LimitsConfig, tools: Arc<Tools>) -> Self {
        Self { limits, tools }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    /// Fail fast when a target needs an encoder that is not installed.
    ///
    /// Must run before any workspace is created so an unavailable encoder
    /// leaves no side effect beyond the check itself.
    pub fn ensure_encoder(&self, format: TargetFormat) -> Result<()> {
        if format.requires_heif_encoder() && self.tools.heif_encoder.is_none() {
            return Err(Error::EncoderUnavailable(format!(
                "heif-enc encoder not found; {format} encoding is not available"
            )));
        }
        Ok(())
    }

    /// Create the per-request workspace for a validated source file.
    pub fn workspace_for(&self, source: &SourceName) -> Result<Workspace> {
        Workspace::create(&self.limits.temp_dir, &source.ext)
    }

    /// Run `magick` over the workspace input, producing the workspace output.
    ///
    /// Expects the uploaded bytes to already be at [`Workspace::input`].
    pub async fn run(
        &self,
        workspace: &Workspace,
        source: &SourceName,
        format: TargetFormat,
        mode: ConversionMode,
        setting: u8,
    ) -> Result<()> {
        let magick = self
            .tools
            .magick
            .as_ref()
            .ok_or_else(|| Error::EncoderUnavailable("magick binary not found".into()))?;

        let encoder_args = mapping::build_encoder_args(
            format,
            mode,
            setting,
            mapping::is_likely_animated(&source.ext),
        );

        let output = workspace.output_for(format);

        tracing::info!(
            "Converting {}.{} -> {} ({} mode, setting {})",
            source.stem,
            source.ext,
            format,
            mode,
            setting
        );

        ToolCommand::new(magick.clone())
            .arg(workspace.input().to_string_lossy())
            .args(encoder_args)
            .arg(output.to_string_lossy())
            .timeout(self.limits.timeout())
            .execute()
            .await?;

        if !output.exists() {
            return Err(Error::conversion_failed(
                "magick",
                "command succeeded but no output file was produced",
            ));
        }

        Ok(())
    }
}
