//! Server end-to-end tests
//!
//! Drives the full router with in-memory requests. External-tool behavior is
//! exercised through stub executables (unix only), so no real ImageMagick is
//! needed.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use imagemill::config::Config;
use imagemill::convert::Tools;
use imagemill::server::{create_router, AppContext};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "imagemill-test-boundary";

/// Helper to get response body as string
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Build a multipart/form-data body. Each entry is (field name, optional
/// filename, data).
fn multipart_body(fields: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(fname) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{fname}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Create a test context with an isolated temp root and the given tools.
fn test_context(temp_root: &Path, tools: Tools, timeout_secs: u64) -> AppContext {
    let mut config = Config::default();
    config.limits.max_upload_mb = 8;
    config.limits.timeout_secs = timeout_secs;
    config.limits.temp_dir = temp_root.to_path_buf();
    AppContext::new(config, tools)
}

fn workspace_count(temp_root: &Path) -> usize {
    std::fs::read_dir(temp_root).map(|d| d.count()).unwrap_or(0)
}

/// Write an executable shell script and return its path (unix only).
#[cfg(unix)]
fn stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stub `magick` that copies its input (first arg) to its output (last arg).
#[cfg(unix)]
fn copying_magick(dir: &Path) -> PathBuf {
    stub_tool(
        dir,
        "magick",
        "#!/bin/sh\nfor last; do :; done\ncp \"$1\" \"$last\"\n",
    )
}

#[tokio::test]
async fn health_reports_limits() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);
    let app = create_router(ctx);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["resource_limits"]["max_file_size_mb"], 8);
    assert_eq!(json["resource_limits"]["timeout_seconds"], 300);
}

#[tokio::test]
async fn index_serves_upload_form() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);
    let app = create_router(ctx);

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<form"));
    assert!(body.contains("target_format"));
}

#[tokio::test]
async fn rejects_disallowed_extension() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("malware.exe"), b"MZ")]);
    let response = app.oneshot(multipart_request("/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("unsupported file format"));
    assert_eq!(workspace_count(temp.path()), 0);
}

#[tokio::test]
async fn rejects_missing_file_field() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("target_format", None, b"jpeg")]);
    let response = app.oneshot(multipart_request("/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn path_endpoint_rejects_out_of_range_setting() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"fake png")]);
    let response = app
        .oneshot(multipart_request("/convert/webp/lossless/150", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    // Parameter validation happens before any file processing.
    assert_eq!(workspace_count(temp.path()), 0);
}

#[tokio::test]
async fn path_endpoint_rejects_unknown_format_and_mode() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(temp.path(), Tools::default(), 300);

    let body = multipart_body(&[("file", Some("photo.png"), b"fake png")]);
    let response = create_router(ctx.clone())
        .oneshot(multipart_request("/convert/bmp/lossy/50", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = multipart_body(&[("file", Some("photo.png"), b"fake png")]);
    let response = create_router(ctx)
        .oneshot(multipart_request("/convert/webp/fast/50", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn avif_without_encoder_returns_503() {
    let temp = TempDir::new().unwrap();
    let tools = Tools {
        magick: Some(PathBuf::from("/usr/bin/true")),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"fake png")]);
    let response = app
        .oneshot(multipart_request("/convert/avif/lossy/50", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("heif-enc"));
    // The availability check must not leave a workspace behind.
    assert_eq!(workspace_count(temp.path()), 0);
}

#[tokio::test]
async fn form_default_target_is_heif() {
    // With no target_format field the default is heif, which needs the
    // optional encoder.
    let temp = TempDir::new().unwrap();
    let tools = Tools {
        magick: Some(PathBuf::from("/usr/bin/true")),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"fake png")]);
    let response = app.oneshot(multipart_request("/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(workspace_count(temp.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn successful_conversion_streams_file() {
    let tool_dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let tools = Tools {
        magick: Some(copying_magick(tool_dir.path())),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let payload = b"not really a png but good enough";
    let body = multipart_body(&[("file", Some("photo.png"), payload)]);
    let response = app
        .oneshot(multipart_request("/convert/webp/lossy/80", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "image/webp"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("photo.webp"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], payload);

    // Deferred cleanup runs once the body has been fully consumed.
    assert_eq!(workspace_count(temp.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn form_endpoint_converts_with_explicit_fields() {
    let tool_dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let tools = Tools {
        magick: Some(copying_magick(tool_dir.path())),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let body = multipart_body(&[
        ("file", Some("cat.gif"), b"GIF89a...".as_slice()),
        ("target_format", None, b"jpeg"),
        ("mode", None, b"lossy"),
        ("setting", None, b"50"),
    ]);
    let response = app.oneshot(multipart_request("/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "image/jpeg"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("cat.jpeg"));

    let _ = response.into_body().collect().await.unwrap();
    assert_eq!(workspace_count(temp.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_tool_returns_500_with_diagnostics() {
    let tool_dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let magick = stub_tool(
        tool_dir.path(),
        "magick",
        "#!/bin/sh\necho 'magick: decode error' >&2\nexit 1\n",
    );
    let tools = Tools {
        magick: Some(magick),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"junk")]);
    let response = app
        .oneshot(multipart_request("/convert/webp/lossy/80", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("decode error"), "body: {body}");
    assert_eq!(workspace_count(temp.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn missing_output_artifact_returns_500() {
    let tool_dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let magick = stub_tool(tool_dir.path(), "magick", "#!/bin/sh\nexit 0\n");
    let tools = Tools {
        magick: Some(magick),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 300);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"junk")]);
    let response = app
        .oneshot(multipart_request("/convert/png/lossless/0", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("no output"), "body: {body}");
    assert_eq!(workspace_count(temp.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn hung_tool_times_out() {
    let tool_dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let magick = stub_tool(tool_dir.path(), "magick", "#!/bin/sh\nsleep 30\n");
    let tools = Tools {
        magick: Some(magick),
        heif_encoder: None,
    };
    let ctx = test_context(temp.path(), tools, 1);
    let app = create_router(ctx);

    let body = multipart_body(&[("file", Some("photo.png"), b"junk")]);
    let response = app
        .oneshot(multipart_request("/convert/webp/lossy/80", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    // The workspace must be released even when the child was killed.
    assert_eq!(workspace_count(temp.path()), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.limits.max_upload_mb = 1;
    config.limits.temp_dir = temp.path().to_path_buf();
    let ctx = AppContext::new(config, Tools::default());
    let app = create_router(ctx);

    // 1.5 MB payload: above the per-file cap, below the outer body limit.
    let payload = vec![0u8; 3 * 512 * 1024];
    let body = multipart_body(&[("file", Some("big.png"), payload.as_slice())]);
    let response = app.oneshot(multipart_request("/", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("too large"));
    assert_eq!(workspace_count(temp.path()), 0);
}
