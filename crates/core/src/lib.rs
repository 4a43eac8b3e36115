//! Core types and shared functionality for prerender.
//!
//! This crate provides:
//! - Rendered-page cache with SQLite, in-memory and filesystem backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, FileCache, HtmlCache, MemoryCache};
pub use config::{AppConfig, CacheMode, ConfigError};
pub use error::Error;
