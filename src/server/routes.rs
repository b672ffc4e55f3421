//! Conversion route handlers.
//!
//! Three request surfaces share one pipeline: validate, map parameters, run
//! the converter in a workspace, stream the result back. The workspace rides
//! along inside the response body stream so it is deleted only after the
//! last byte has been sent; every failure path drops it immediately.

use std::path::Path as FsPath;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, Response};
use axum::Json;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::convert::{self, SourceName, Workspace};
use crate::error::Error;
use crate::mapping::{ConversionMode, TargetFormat};
use crate::server::{ApiError, AppContext};

/// GET / - the HTML upload form.
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// Service health report.
///
/// Runs a live `magick --version` check, looks for the optional `heif-enc`
/// encoder, and reports free disk space at the temp root plus the configured
/// resource limits.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health, tool availability and resource limits")
    )
)]
pub async fn health(State(ctx): State<AppContext>) -> Result<Json<serde_json::Value>, ApiError> {
    let tools_config = ctx.config.tools.clone();
    let infos = tokio::task::spawn_blocking(move || convert::check_tools(&tools_config))
        .await
        .map_err(|e| Error::Internal(format!("health check task failed: {e}")))?;

    let magick = &infos[0];
    let heif = &infos[1];

    let limits = &ctx.config.limits;

    Ok(Json(json!({
        "status": "healthy",
        "imagemagick": magick
            .version
            .clone()
            .unwrap_or_else(|| "not available".to_string()),
        "heif_encoder": heif
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not available (AVIF/HEIF conversion will fail)".to_string()),
        "disk_space": {
            "free_mb": free_space_mb(&limits.temp_dir),
            "temp_dir": limits.temp_dir.display().to_string(),
        },
        "resource_limits": {
            "max_file_size_mb": limits.max_upload_mb,
            "timeout_seconds": limits.timeout_secs,
        },
    })))
}

#[cfg(unix)]
fn free_space_mb(path: &FsPath) -> Option<u64> {
    nix::sys::statvfs::statvfs(path)
        .ok()
        .map(|s| (s.blocks_available() as u64).saturating_mul(s.fragment_size() as u64) / (1024 * 1024))
}

#[cfg(not(unix))]
fn free_space_mb(_path: &FsPath) -> Option<u64> {
    None
}

/// POST / - form-encoded upload.
///
/// Multipart fields: `file` (required), `target_format` (default heif),
/// `mode` (default lossless), `setting` (default 0). Field order is not
/// significant.
#[utoipa::path(
    post,
    path = "/",
    responses(
        (status = 200, description = "Converted image file"),
        (status = 400, description = "Bad filename, extension or size"),
        (status = 422, description = "Invalid format, mode or setting"),
        (status = 500, description = "Conversion failed"),
        (status = 503, description = "Required encoder missing"),
        (status = 504, description = "Conversion timed out"),
    )
)]
pub async fn convert_form(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut target_format: Option<String> = None;
    let mut mode: Option<String> = None;
    let mut setting: Option<String> = None;
    let mut upload: Option<(SourceName, Workspace)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let source = convert::validate_filename(field.file_name())?;
                let workspace = ctx.converter.workspace_for(&source)?;
                save_field(
                    &mut field,
                    workspace.input(),
                    ctx.converter.limits().max_upload_bytes(),
                    ctx.converter.limits().max_upload_mb,
                )
                .await?;
                upload = Some((source, workspace));
            }
            Some("target_format") => {
                target_format = Some(field.text().await.map_err(multipart_error)?)
            }
            Some("mode") => mode = Some(field.text().await.map_err(multipart_error)?),
            Some("setting") => setting = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let format: TargetFormat = target_format.as_deref().unwrap_or("heif").trim().parse()?;
    let mode: ConversionMode = mode.as_deref().unwrap_or("lossless").trim().parse()?;
    let setting = parse_setting(setting.as_deref())?;

    ctx.converter.ensure_encoder(format)?;

    let (source, workspace) =
        upload.ok_or_else(|| Error::InvalidInput("missing 'file' field".to_string()))?;

    run_and_stream(&ctx, workspace, source, format, mode, setting).await
}

/// POST /convert/{target_format}/{mode}/{setting} - path-parameterized
/// variant with identical semantics.
///
/// Parameters are validated before the body is read, so an out-of-range
/// setting or a missing encoder is rejected without touching the upload.
#[utoipa::path(
    post,
    path = "/convert/{target_format}/{mode}/{setting}",
    params(
        ("target_format" = String, Path, description = "avif, webp, jpeg, png, gif or heif"),
        ("mode" = String, Path, description = "lossy or lossless"),
        ("setting" = u16, Path, description = "Quality (lossy) or compression speed (lossless), 0-100"),
    ),
    responses(
        (status = 200, description = "Converted image file"),
        (status = 400, description = "Bad filename, extension or size"),
        (status = 422, description = "Invalid format, mode or setting"),
        (status = 500, description = "Conversion failed"),
        (status = 503, description = "Required encoder missing"),
        (status = 504, description = "Conversion timed out"),
    )
)]
pub async fn convert_path(
    State(ctx): State<AppContext>,
    Path((target_format, mode, setting)): Path<(String, String, u16)>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let format: TargetFormat = target_format.parse()?;
    let mode: ConversionMode = mode.parse()?;
    let setting = convert::validate_setting(setting)?;

    ctx.converter.ensure_encoder(format)?;

    let mut upload: Option<(SourceName, Workspace)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string());
        if name.as_deref() == Some("file") {
            let source = convert::validate_filename(field.file_name())?;
            let workspace = ctx.converter.workspace_for(&source)?;
            save_field(
                &mut field,
                workspace.input(),
                ctx.converter.limits().max_upload_bytes(),
                ctx.converter.limits().max_upload_mb,
            )
            .await?;
            upload = Some((source, workspace));
            break;
        }
    }

    let (source, workspace) =
        upload.ok_or_else(|| Error::InvalidInput("missing 'file' field".to_string()))?;

    run_and_stream(&ctx, workspace, source, format, mode, setting).await
}

fn parse_setting(raw: Option<&str>) -> Result<u8, Error> {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return Ok(0),
    };

    let value: u16 = raw
        .parse()
        .map_err(|_| Error::InvalidParameter(format!("invalid setting '{raw}', must be an integer 0-100")))?;

    convert::validate_setting(value)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Error {
    Error::InvalidInput(format!("failed to read multipart body: {e}"))
}

/// Stream a multipart field to disk, enforcing the upload cap without ever
/// buffering the whole file in memory.
async fn save_field(
    field: &mut Field<'_>,
    dest: &FsPath,
    max_bytes: u64,
    max_mb: u64,
) -> Result<u64, Error> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(Error::InvalidInput(format!(
                "file too large; max size is {max_mb} MB"
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

/// Run the conversion and build the streamed file response.
///
/// The workspace is moved into the response stream on success so it outlives
/// the transfer; any error before that point drops it here, removing the
/// directory.
async fn run_and_stream(
    ctx: &AppContext,
    workspace: Workspace,
    source: SourceName,
    format: TargetFormat,
    mode: ConversionMode,
    setting: u8,
) -> Result<Response, ApiError> {
    let job_id = Uuid::new_v4();
    tracing::info!(%job_id, %format, %mode, setting, "starting conversion");

    ctx.converter
        .run(&workspace, &source, format, mode, setting)
        .await?;

    let output = workspace.output_for(format);
    let file = tokio::fs::File::open(&output).await.map_err(Error::from)?;
    let len = file.metadata().await.map_err(Error::from)?.len();
    tracing::info!(%job_id, bytes = len, "conversion finished");

    let download_name = source
        .download_name(format)
        .replace(['"', '\r', '\n'], "_");

    let stream = ResponseStream {
        inner: ReaderStream::new(file),
        _workspace: workspace,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.media_type())
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::from(Error::Internal(e.to_string())))
}

/// File stream that keeps the request workspace alive until the body has
/// been fully sent (or the connection dropped), then releases it.
struct ResponseStream {
    inner: ReaderStream<tokio::fs::File>,
    _workspace: Workspace,
}

impl futures::Stream for ResponseStream {
    type Item = std::io::Result<bytes::Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setting_defaults_and_bounds() {
        assert_eq!(parse_setting(None).unwrap(), 0);
        assert_eq!(parse_setting(Some("")).unwrap(), 0);
        assert_eq!(parse_setting(Some("42")).unwrap(), 42);
        assert!(matches!(
            parse_setting(Some("150")),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_setting(Some("abc")),
            Err(Error::InvalidParameter(_))
        ));
    }
}
