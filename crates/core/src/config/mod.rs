//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRERENDER_*)
//! 2. TOML config file (if PRERENDER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Storage strategy behind the html cache.
///
/// Chosen once at start-up; the cache never switches backend afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// SQLite database at `db_path`.
    #[default]
    Sqlite,
    /// Process-local map, lost on restart.
    Memory,
    /// One file per page under `cache_directory`.
    File,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Sqlite => "sqlite",
            CacheMode::Memory => "memory",
            CacheMode::File => "file",
        }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRERENDER_*)
/// 2. TOML config file (if PRERENDER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the bundled server binds to.
    ///
    /// Set via PRERENDER_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory of the client-rendered application served by the binary.
    ///
    /// Set via PRERENDER_STATIC_DIR environment variable.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Public base URL replacing the request's scheme and authority.
    ///
    /// Set via PRERENDER_BASE_URL environment variable.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Path patterns eligible for interception (`/*`, `/prefix/*`, `*.ext` or exact).
    ///
    /// Set via PRERENDER_URL_PATTERNS environment variable (TOML array).
    #[serde(default = "default_url_patterns")]
    pub url_patterns: Vec<String>,

    /// Number of browser instances kept in the renderer pool.
    ///
    /// Set via PRERENDER_RENDERER_INSTANCES environment variable.
    #[serde(default = "default_renderer_instances")]
    pub renderer_instances: usize,

    /// Maximum number of render jobs running at once.
    ///
    /// Set via PRERENDER_WORKER_POOL_SIZE environment variable.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Maximum render duration in milliseconds before a job is reaped.
    ///
    /// Set via PRERENDER_RENDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Time given to page scripts before the DOM is captured, in milliseconds.
    ///
    /// Set via PRERENDER_RENDER_SETTLE_MS environment variable.
    #[serde(default = "default_render_settle_ms")]
    pub render_settle_ms: u64,

    /// CSS selector to wait for instead of the settle delay.
    ///
    /// Set via PRERENDER_RENDER_WAIT_FOR environment variable.
    #[serde(default)]
    pub render_wait_for: Option<String>,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Explicit Chrome/Chromium executable; auto-detected when unset.
    ///
    /// Set via PRERENDER_CHROME_EXECUTABLE environment variable.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Cache backend selection.
    ///
    /// Set via PRERENDER_CACHE_MODE environment variable.
    #[serde(default)]
    pub cache_mode: CacheMode,

    /// Path to SQLite cache database (sqlite mode).
    ///
    /// Set via PRERENDER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root directory of the file cache (file mode).
    ///
    /// Set via PRERENDER_CACHE_DIRECTORY environment variable.
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,

    /// Keep only the newest N pages (sqlite mode).
    ///
    /// Set via PRERENDER_CACHE_MAX_ENTRIES environment variable.
    #[serde(default)]
    pub cache_max_entries: Option<usize>,

    /// Grace period for in-flight captures at shutdown, in milliseconds.
    ///
    /// Set via PRERENDER_SHUTDOWN_GRACE_MS environment variable.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Whether the `/_prerender` admin routes are mounted.
    ///
    /// Set via PRERENDER_ADMIN_ENABLED environment variable.
    #[serde(default)]
    pub admin_enabled: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./public")
}

fn default_url_patterns() -> Vec<String> {
    vec!["/*".into()]
}

fn default_renderer_instances() -> usize {
    1
}

fn default_worker_pool_size() -> usize {
    64
}

fn default_render_timeout_ms() -> u64 {
    18_000
}

fn default_render_settle_ms() -> u64 {
    2_000
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    720
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./prerender-cache.sqlite")
}

fn default_shutdown_grace_ms() -> u64 {
    60_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            static_dir: default_static_dir(),
            base_url: None,
            url_patterns: default_url_patterns(),
            renderer_instances: default_renderer_instances(),
            worker_pool_size: default_worker_pool_size(),
            render_timeout_ms: default_render_timeout_ms(),
            render_settle_ms: default_render_settle_ms(),
            render_wait_for: None,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            chrome_executable: None,
            cache_mode: CacheMode::default(),
            db_path: default_db_path(),
            cache_directory: None,
            cache_max_entries: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            admin_enabled: false,
        }
    }
}

impl AppConfig {
    /// Render timeout as Duration for the watchdog.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PRERENDER_`
    /// 2. TOML file from `PRERENDER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PRERENDER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PRERENDER_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Cache directory for file mode (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no cache directory is configured.
    pub fn require_cache_directory(&self) -> Result<&PathBuf, ConfigError> {
        self.cache_directory.as_ref().ok_or_else(|| ConfigError::Missing {
            field: "cache_directory".into(),
            hint: "Set PRERENDER_CACHE_DIRECTORY environment variable".into(),
        })
    }
}
