//! HTTP surface of the bundled server.
//!
//! The static application sits behind [`prerender_layer`]; the admin routes
//! are merged in afterwards so the middleware never sees them.

pub mod admin;
pub mod site;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get};

use prerender_core::AppConfig;

use crate::Prerender;
use crate::middleware::prerender_layer;

/// Build the application router.
pub fn router(config: &AppConfig, prerender: Prerender) -> Router {
    let site = Router::new()
        .fallback(site::serve_site)
        .with_state(Arc::new(config.static_dir.clone()))
        .layer(from_fn_with_state(prerender.clone(), prerender_layer));

    if !config.admin_enabled {
        return site;
    }

    let admin = Router::new()
        .route("/_prerender/status", get(admin::status))
        .route("/_prerender/cache", delete(admin::invalidate))
        .with_state(prerender);
    site.merge(admin)
}
