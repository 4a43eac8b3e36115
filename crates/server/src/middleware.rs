//! Cache-aside request interception.
//!
//! Serves prerendered html for eligible GET requests and schedules a render
//! after a miss that produced a successful html page. Install with
//! `axum::middleware::from_fn_with_state`.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use tracing::{debug, instrument};

use crate::Prerender;

/// Middleware answering from the html cache.
///
/// A hit is written as the whole response and the inner service never runs.
/// A miss is forwarded untouched. When the inner response is a 2xx html page a
/// background render is triggered for it, without delaying that response.
/// Errors, redirects and non-html bodies are never captured.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn prerender_layer(State(prerender): State<Prerender>, request: Request, next: Next) -> Response {
    if !prerender.is_eligible(&request) {
        return next.run(request).await;
    }

    let key = match prerender.canonical_url(&request) {
        Ok(key) => key,
        Err(e) => {
            debug!("cannot map request to a canonical url, passing through: {e}");
            return next.run(request).await;
        }
    };

    if let Some(html) = prerender.lookup(&key).await {
        debug!(url = %key, outcome = "hit", "serving prerendered page");
        return Html(html).into_response();
    }

    debug!(url = %key, outcome = "miss", "passing request through");
    let response = next.run(request).await;
    if is_renderable(&response) {
        prerender.trigger_render(&key);
    } else {
        debug!(url = %key, status = %response.status(), "response is not a renderable page");
    }
    response
}

fn is_renderable(response: &Response) -> bool {
    response.status().is_success()
        && response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
}
