//! Rendering client for prerender.
//!
//! This crate provides the renderer abstraction, the headless browser
//! implementation, the bounded renderer pool, and URL canonicalization
//! shared by the server.

pub mod render;
pub mod url;

pub use render::pool::{PooledRenderer, RendererPool};
pub use render::{RenderError, RenderOptions, RenderedPage, Renderer};
#[cfg(feature = "render")]
pub use render::HeadlessRenderer;
pub use self::url::{UrlError, canonical_key, canonicalize};
