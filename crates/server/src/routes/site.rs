//! Static serving of the client-rendered application.
//!
//! Files under the static directory are served as-is. Paths without an
//! extension that match no file get `index.html`, so client-side routes load
//! the application shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};

const INDEX: &str = "index.html";

/// Fallback handler serving `root`.
pub async fn serve_site(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let Some(relative) = resolve(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let candidate = root.join(&relative);
    if let Some(response) = read_file(&candidate).await {
        return response;
    }

    if relative.extension().is_some() {
        return StatusCode::NOT_FOUND.into_response();
    }
    read_file(&root.join(INDEX))
        .await
        .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

/// Relative file path for a request path, `None` if it escapes the root.
fn resolve(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.split('/').any(|segment| segment == ".." || segment.contains('\\')) {
        return None;
    }
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return Some(Path::new(trimmed).join(INDEX));
    }
    Some(PathBuf::from(trimmed))
}

async fn read_file(path: &Path) -> Option<Response> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => Some(build_response(path, bytes)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read static file: {e}");
            Some(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

fn build_response(path: &Path, bytes: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    response
}
