//! Cache-aside prerendering for client-rendered web applications.
//!
//! This crate provides:
//! - The axum middleware that serves captured html and schedules renders
//! - In-flight render tracking and the render watchdog
//! - Request URL mapping and eligible path patterns
//! - The router of the bundled `prerender` server, admin routes included

pub mod error;
pub mod mapper;
pub mod middleware;
pub mod patterns;
pub mod prerender;
pub mod routes;
pub mod tracker;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use error::ApiError;
pub use mapper::{SelfUrlMapper, UrlMapper};
pub use middleware::prerender_layer;
pub use patterns::UrlPatterns;
pub use prerender::Prerender;
pub use routes::router;
