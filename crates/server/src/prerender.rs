//! The cache-aside render coordinator.
//!
//! [`Prerender`] is the cloneable handle the middleware and admin routes
//! share. It owns the cache, the renderer pool, the in-flight tracker and the
//! watchdog, and runs render jobs:
//!
//! ```text
//! miss -> try_register(key) -> spawn job
//!   job: worker permit -> pool slot -> still owned? -> render -> release slot
//!        -> put_if_absent -> drop guard (key back to NONE)
//! ```
//!
//! Every exit of a job drops its [`InFlightGuard`], which frees the key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::Request;
use axum::http::Method;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use url::Url;

use prerender_client::{RenderOptions, RendererPool, UrlError};
use prerender_core::{AppConfig, ConfigError, Error, HtmlCache};

use crate::mapper::{SelfUrlMapper, UrlMapper};
use crate::patterns::UrlPatterns;
use crate::tracker::{InFlightGuard, InFlightTracker};
use crate::watchdog::Watchdog;

/// Shared handle to the render pipeline.
#[derive(Clone)]
pub struct Prerender {
    inner: Arc<Inner>,
}

struct Inner {
    cache: HtmlCache,
    pool: RendererPool,
    tracker: Arc<InFlightTracker>,
    mapper: Box<dyn UrlMapper>,
    patterns: UrlPatterns,
    workers: Semaphore,
    options: RenderOptions,
    running: AtomicBool,
    stop: watch::Sender<bool>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl Prerender {
    /// Build the pipeline and start its watchdog, mapping requests with
    /// [`SelfUrlMapper`].
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: &AppConfig, cache: HtmlCache, pool: RendererPool) -> Result<Self, ConfigError> {
        let mapper = SelfUrlMapper::new(config.base_url.as_deref()).map_err(|e| ConfigError::Invalid {
            field: "base_url".into(),
            reason: e.to_string(),
        })?;
        Self::with_mapper(config, cache, pool, mapper)
    }

    /// Like [`Prerender::new`] with a host-supplied URL mapper.
    pub fn with_mapper(
        config: &AppConfig,
        cache: HtmlCache,
        pool: RendererPool,
        mapper: impl UrlMapper + 'static,
    ) -> Result<Self, ConfigError> {
        let patterns = UrlPatterns::new(&config.url_patterns).map_err(|e| ConfigError::Invalid {
            field: "url_patterns".into(),
            reason: e.to_string(),
        })?;

        let tracker = Arc::new(InFlightTracker::new());
        let (stop, stop_rx) = watch::channel(false);
        let watchdog = Watchdog::new(Arc::clone(&tracker), config.render_timeout()).spawn(stop_rx);

        tracing::info!(
            cache_mode = cache.mode().as_str(),
            pool_size = pool.size(),
            worker_pool_size = config.worker_pool_size,
            render_timeout_ms = config.render_timeout_ms,
            "prerender pipeline started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                pool,
                tracker,
                mapper: Box::new(mapper),
                patterns,
                workers: Semaphore::new(config.worker_pool_size),
                options: RenderOptions::from(config),
                running: AtomicBool::new(true),
                stop,
                watchdog: Mutex::new(Some(watchdog)),
                shutdown_grace: config.shutdown_grace(),
            }),
        })
    }

    /// Whether `request` is a candidate for lookup and population.
    pub fn is_eligible(&self, request: &Request) -> bool {
        request.method() == Method::GET && self.inner.patterns.is_match(request.uri().path())
    }

    pub fn canonical_url(&self, request: &Request) -> Result<String, UrlError> {
        self.inner.mapper.to_canonical_url(request)
    }

    /// Cached html for `key`. A failing backend reads as a miss.
    pub async fn lookup(&self, key: &str) -> Option<String> {
        match self.inner.cache.get(key).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %key, "cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Start a background render for `key` unless one is already in flight
    /// or the pipeline is shutting down.
    ///
    /// Returns whether a job was submitted. Never waits on the render.
    pub fn trigger_render(&self, key: &str) -> bool {
        if !self.is_accepting() {
            tracing::debug!(url = %key, "shutting down, render dropped");
            return false;
        }

        let Some(guard) = self.inner.tracker.try_register(key) else {
            tracing::debug!(url = %key, "render already in flight");
            return false;
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_job(guard).await });
        true
    }

    /// Drop the cached page for a canonical URL.
    pub async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        let removed = self.inner.cache.invalidate(key).await?;
        tracing::info!(url = %key, removed, "cache entry invalidated");
        Ok(removed)
    }

    /// Number of render jobs currently tracked.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &HtmlCache {
        &self.inner.cache
    }

    pub fn pool(&self) -> &RendererPool {
        &self.inner.pool
    }

    /// Stop taking renders, stop the watchdog, then shut the pool down
    /// within the configured grace period.
    ///
    /// Jobs already running may finish and populate the cache. Only the
    /// first call does anything.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(in_flight = self.in_flight(), "prerender pipeline shutting down");

        self.inner.stop.send_replace(true);
        let watchdog = self.inner.watchdog.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = watchdog
            && let Err(e) = handle.await
        {
            tracing::warn!("watchdog task failed: {e}");
        }

        self.inner.pool.shutdown(self.inner.shutdown_grace).await;
    }
}

impl Inner {
    async fn run_job(&self, guard: InFlightGuard) {
        let key = guard.key();

        let Ok(_worker) = self.workers.acquire().await else {
            return;
        };

        let url = match Url::parse(key) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %key, "cannot render unparsable url: {e}");
                return;
            }
        };

        let rendered = {
            let renderer = match self.pool.acquire().await {
                Ok(renderer) => renderer,
                Err(e) => {
                    tracing::debug!(url = %key, "no renderer: {e}");
                    return;
                }
            };
            if !self.tracker.owns(key, guard.id()) {
                tracing::debug!(url = %key, job = guard.id(), "job reaped while queued, skipping capture");
                return;
            }
            renderer.render(&url, &self.options).await
        };

        let page = match rendered {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %key, "render failed: {e}");
                return;
            }
        };

        match self.cache.put_if_absent(key, &page.html).await {
            Ok(true) => {
                tracing::info!(url = %key, render_time_ms = page.render_time_ms, "cached rendered page");
            }
            Ok(false) => tracing::debug!(url = %key, "page already cached, keeping stored copy"),
            Err(e) => tracing::warn!(url = %key, "failed to store rendered page: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, prerender_with, settle};
    use axum::body::Body;

    const KEY: &str = "http://localhost/a";

    #[tokio::test]
    async fn test_concurrent_triggers_start_one_capture() {
        let script = Script::gated();
        let prerender = prerender_with(&script, 2);

        let submitted = (0..32).filter(|_| prerender.trigger_render(KEY)).count();
        assert_eq!(submitted, 1);

        script.wait_for_captures(1).await;
        assert_eq!(prerender.in_flight(), 1);
        assert!(!prerender.trigger_render(KEY));

        script.open();
        settle(&prerender).await;

        assert_eq!(script.captures(), 1);
        assert_eq!(prerender.lookup(KEY).await.as_deref(), Some(script.html()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_across_tasks() {
        let script = Script::gated();
        let prerender = prerender_with(&script, 4);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let prerender = prerender.clone();
                tokio::spawn(async move { prerender.trigger_render(KEY) })
            })
            .collect();
        let mut submitted = 0;
        for task in tasks {
            submitted += usize::from(task.await.unwrap());
        }
        assert_eq!(submitted, 1);

        script.open();
        settle(&prerender).await;
        assert_eq!(script.captures(), 1);
    }

    #[tokio::test]
    async fn test_failed_capture_frees_key() {
        let script = Script::failing();
        let prerender = prerender_with(&script, 1);

        assert!(prerender.trigger_render(KEY));
        settle(&prerender).await;

        assert!(prerender.lookup(KEY).await.is_none());
        assert_eq!(prerender.pool().checked_out(), 0);
        assert!(prerender.trigger_render(KEY));
        settle(&prerender).await;
        assert_eq!(script.captures(), 2);
    }

    #[tokio::test]
    async fn test_existing_entry_is_kept() {
        let script = Script::new();
        let prerender = prerender_with(&script, 1);
        assert!(prerender.cache().put_if_absent(KEY, "<p>first</p>").await.unwrap());

        assert!(prerender.trigger_render(KEY));
        settle(&prerender).await;

        assert_eq!(script.captures(), 1);
        assert_eq!(prerender.lookup(KEY).await.as_deref(), Some("<p>first</p>"));
    }

    #[tokio::test]
    async fn test_reaped_job_allows_new_render() {
        let script = Script::gated();
        let config = AppConfig { render_timeout_ms: 100, ..crate::testing::config() };
        let prerender = crate::testing::prerender_from(&config, &script, 1);

        assert!(prerender.trigger_render(KEY));
        script.wait_for_captures(1).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while prerender.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(prerender.trigger_render(KEY));
        assert_eq!(script.captures(), 1, "second job waits for the only renderer");

        script.open();
        settle(&prerender).await;
        script.wait_for_captures(2).await;
        assert!(prerender.lookup(KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_job_reaped_while_queued_never_captures() {
        let script = Script::gated();
        let config = AppConfig { render_timeout_ms: 100, ..crate::testing::config() };
        let prerender = crate::testing::prerender_from(&config, &script, 1);
        let a = "http://localhost/a";
        let b = "http://localhost/b";

        assert!(prerender.trigger_render(a));
        script.wait_for_captures(1).await;
        assert!(prerender.trigger_render(b));

        tokio::time::timeout(Duration::from_secs(2), async {
            while prerender.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(script.captures(), 1);

        assert!(prerender.trigger_render(b));
        script.open();
        settle(&prerender).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(script.captures(), 2);
        assert_eq!(prerender.pool().checked_out(), 0);
        assert!(prerender.lookup(a).await.is_some());
        assert!(prerender.lookup(b).await.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_drops_new_renders_and_closes_pool() {
        let script = Script::new();
        let prerender = prerender_with(&script, 2);

        prerender.shutdown().await;

        assert!(!prerender.is_accepting());
        assert!(!prerender.trigger_render(KEY));
        assert_eq!(prerender.in_flight(), 0);
        assert!(prerender.pool().is_closed());
        assert_eq!(script.closed(), 2);

        prerender.shutdown().await;
        assert_eq!(script.closed(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_capture_finish() {
        let script = Script::gated();
        let prerender = prerender_with(&script, 1);

        assert!(prerender.trigger_render(KEY));
        script.wait_for_captures(1).await;

        let shutdown = {
            let prerender = prerender.clone();
            tokio::spawn(async move { prerender.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());

        script.open();
        tokio::time::timeout(Duration::from_secs(2), shutdown).await.unwrap().unwrap();
        assert_eq!(script.closed(), 1);
    }

    #[tokio::test]
    async fn test_eligibility() {
        let config = AppConfig { url_patterns: vec!["/app/*".into()], ..crate::testing::config() };
        let prerender = crate::testing::prerender_from(&config, &Script::new(), 1);

        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();
        assert!(prerender.is_eligible(&get("/app/users?page=2")));
        assert!(!prerender.is_eligible(&get("/assets/main.js")));

        let post = Request::builder().method(Method::POST).uri("/app/users").body(Body::empty()).unwrap();
        assert!(!prerender.is_eligible(&post));
    }

    #[tokio::test]
    async fn test_invalid_base_url_rejected() {
        let config = AppConfig { base_url: Some("ftp://example.com".into()), ..crate::testing::config() };
        let result = Prerender::new(&config, HtmlCache::Memory(prerender_core::MemoryCache::new()), Script::new().pool(1));
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "base_url"));
    }
}
