//! `/_prerender` admin routes.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use prerender_client::canonical_key;

use crate::Prerender;
use crate::error::ApiError;

/// Pipeline state as reported by `GET /_prerender/status`.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub cache_mode: &'static str,
    pub in_flight: usize,
    pub pool_size: usize,
    pub pool_idle: usize,
    pub accepting: bool,
}

pub async fn status(State(prerender): State<Prerender>) -> Json<StatusBody> {
    Json(StatusBody {
        cache_mode: prerender.cache().mode().as_str(),
        in_flight: prerender.in_flight(),
        pool_size: prerender.pool().size(),
        pool_idle: prerender.pool().idle(),
        accepting: prerender.is_accepting(),
    })
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateBody {
    pub url: String,
    pub invalidated: bool,
}

/// `DELETE /_prerender/cache?url=...`
pub async fn invalidate(
    State(prerender): State<Prerender>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateBody>, ApiError> {
    let raw = query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidInput("url query parameter is required".into()))?;

    let url = canonical_key(&raw)?;
    let invalidated = prerender.invalidate(&url).await?;
    Ok(Json(InvalidateBody { url, invalidated }))
}
