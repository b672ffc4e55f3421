//! Parameter-to-encoder-option mapping.
//!
//! Translates the API surface (target format, conversion mode, a normalized
//! 0-100 setting) into the exact ordered ImageMagick argument list. This is a
//! pure function: no I/O, no side effects, deterministic for a given input.
//!
//! The setting dial means different things per mode:
//! - lossy: quality, 0 = worst, 100 = best
//! - lossless: compression speed, 0 = slowest/best compression, 100 = fastest

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Error;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Avif,
    Webp,
    Jpeg,
    Png,
    Gif,
    Heif,
}

impl TargetFormat {
    /// All supported formats, for error messages.
    pub const ALL: [TargetFormat; 6] = [
        TargetFormat::Avif,
        TargetFormat::Webp,
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Gif,
        TargetFormat::Heif,
    ];

    /// Canonical lowercase name, also used as the output file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Avif => "avif",
            TargetFormat::Webp => "webp",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Gif => "gif",
            TargetFormat::Heif => "heif",
        }
    }

    /// MIME type for the converted response body.
    pub fn media_type(&self) -> &'static str {
        match self {
            TargetFormat::Avif => "image/avif",
            TargetFormat::Webp => "image/webp",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::Gif => "image/gif",
            TargetFormat::Heif => "image/heif",
        }
    }

    /// AVIF and HEIF encoding go through libheif's `heif-enc`, which is an
    /// optional ImageMagick delegate and may not be installed.
    pub fn requires_heif_encoder(&self) -> bool {
        matches!(self, TargetFormat::Avif | TargetFormat::Heif)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avif" => Ok(TargetFormat::Avif),
            "webp" => Ok(TargetFormat::Webp),
            "jpeg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "gif" => Ok(TargetFormat::Gif),
            "heif" => Ok(TargetFormat::Heif),
            other => Err(Error::InvalidParameter(format!(
                "invalid target_format '{other}', must be one of: avif, webp, jpeg, png, gif, heif"
            ))),
        }
    }
}

/// Conversion mode selecting how the 0-100 setting is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    Lossy,
    Lossless,
}

impl ConversionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionMode::Lossy => "lossy",
            ConversionMode::Lossless => "lossless",
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lossy" => Ok(ConversionMode::Lossy),
            "lossless" => Ok(ConversionMode::Lossless),
            other => Err(Error::InvalidParameter(format!(
                "invalid mode '{other}', must be 'lossy' or 'lossless'"
            ))),
        }
    }
}

/// Source container extensions that may hold multiple frames.
const ANIMATED_EXTENSIONS: [&str; 4] = ["gif", "webp", "apng", "png"];

/// Whether a source file extension (lowercase, no dot) suggests an animated
/// container.
pub fn is_likely_animated(extension: &str) -> bool {
    ANIMATED_EXTENSIONS.contains(&extension)
}

/// Build the ordered encoder argument list for a conversion.
///
/// The returned arguments go between the input path and the output path on
/// the `magick` command line. `setting` is clamped to [0, 100]; callers
/// validate the range before reaching this point.
pub fn build_encoder_args(
    format: TargetFormat,
    mode: ConversionMode,
    setting: u8,
    source_likely_animated: bool,
) -> Vec<String> {
    let setting = setting.min(100) as u32;
    let mut args: Vec<String> = Vec::new();

    // Multi-frame sources must be merged into independent frames before
    // re-encoding, or animated output ends up frame-misaligned.
    if source_likely_animated || matches!(format, TargetFormat::Gif | TargetFormat::Webp) {
        args.push("-coalesce".into());
    }

    match mode {
        ConversionMode::Lossless => match format {
            TargetFormat::Avif => {
                // speed 0-10, 0 = slowest/best
                let speed = (setting / 10).min(10);
                push_define(&mut args, "avif:lossless=true");
                push_define(&mut args, &format!("avif:speed={speed}"));
            }
            TargetFormat::Heif => {
                let speed = (setting / 10).min(10);
                push_define(&mut args, "heif:lossless=true");
                push_define(&mut args, &format!("heif:speed={speed}"));
            }
            TargetFormat::Webp => {
                // method 0-6, 6 = slowest/best; inverse of the setting dial
                let method = (6.0 - setting as f64 / 100.0 * 6.0).round() as u32;
                push_define(&mut args, "webp:lossless=true");
                push_define(&mut args, &format!("webp:method={method}"));
                args.push("-quality".into());
                args.push("100".into());
            }
            TargetFormat::Jpeg => {
                // JPEG has no true lossless mode; quality 100 is the closest
                // approximation.
                args.push("-quality".into());
                args.push("100".into());
            }
            TargetFormat::Png => {
                // setting(0) -> compression level 9, setting(100) -> level 0.
                // ImageMagick's -quality scale maps 91 to level 0 .. 100 to
                // level 9.
                let level = (((100 - setting) as f64) * 0.09).floor() as u32;
                let level = level.min(9);
                args.push("-quality".into());
                args.push((91 + level).to_string());
            }
            TargetFormat::Gif => {
                // Palette-based and inherently lossless; just optimize frames.
                args.push("-layers".into());
                args.push("optimize".into());
            }
        },
        ConversionMode::Lossy => match format {
            TargetFormat::Avif => {
                // cq-level 0-63, 0 = best; setting(100) -> 0, setting(0) -> 63
                let cq = (63.0 * (1.0 - setting as f64 / 100.0))
                    .round()
                    .clamp(0.0, 63.0) as u32;
                push_define(&mut args, &format!("avif:cq-level={cq}"));
                push_define(&mut args, "avif:speed=4");
            }
            TargetFormat::Heif => {
                args.push("-quality".into());
                args.push(setting.to_string());
            }
            TargetFormat::Webp => {
                args.push("-quality".into());
                args.push(setting.to_string());
                push_define(&mut args, "webp:method=4");
            }
            TargetFormat::Jpeg => {
                args.push("-quality".into());
                args.push(setting.to_string());
            }
            TargetFormat::Png => {
                // PNG is lossless by nature; approximate lossy output by
                // quantizing the palette. setting(100) -> 256 colors,
                // setting(0) -> 2 colors.
                let colors = palette_size(setting);
                args.push("-colors".into());
                args.push(colors.to_string());
                args.push("+dither".into());
            }
            TargetFormat::Gif => {
                let colors = palette_size(setting);
                args.push("-colors".into());
                args.push(colors.to_string());
                args.push("+dither".into());
                args.push("-layers".into());
                args.push("optimize".into());
            }
        },
    }

    args
}

fn push_define(args: &mut Vec<String>, value: &str) {
    args.push("-define".into());
    args.push(value.into());
}

fn palette_size(setting: u32) -> u32 {
    ((256.0 * setting as f64 / 100.0).round() as u32).max(2)
}
