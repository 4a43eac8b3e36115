//! Test support: a scripted renderer standing in for the browser.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use url::Url;

use prerender_client::{RenderError, RenderOptions, RenderedPage, Renderer, RendererPool};
use prerender_core::{AppConfig, CacheMode, HtmlCache, MemoryCache};

use crate::Prerender;

const HTML: &str = "<html><body><h1>rendered</h1></body></html>";

/// Controls and observes every renderer built from it.
pub(crate) struct Script {
    captures: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    gate: watch::Sender<bool>,
    fail: bool,
}

impl Script {
    /// Captures succeed immediately.
    pub(crate) fn new() -> Self {
        Self::build(true, false)
    }

    /// Captures block until [`Script::open`] is called.
    pub(crate) fn gated() -> Self {
        Self::build(false, false)
    }

    /// Captures fail with a navigation error.
    pub(crate) fn failing() -> Self {
        Self::build(true, true)
    }

    fn build(open: bool, fail: bool) -> Self {
        let (gate, _) = watch::channel(open);
        Self { captures: Arc::new(AtomicUsize::new(0)), closed: Arc::new(AtomicUsize::new(0)), gate, fail }
    }

    pub(crate) fn open(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn html(&self) -> &'static str {
        HTML
    }

    /// Captures started so far, finished or not.
    pub(crate) fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_captures(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.captures() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("captures did not start in time");
    }

    pub(crate) fn pool(&self, size: usize) -> RendererPool {
        let renderers = (0..size)
            .map(|_| {
                Box::new(ScriptedRenderer {
                    captures: Arc::clone(&self.captures),
                    closed: Arc::clone(&self.closed),
                    gate: self.gate.subscribe(),
                    fail: self.fail,
                }) as Box<dyn Renderer>
            })
            .collect();
        RendererPool::new(renderers).expect("non-empty pool")
    }
}

struct ScriptedRenderer {
    captures: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    gate: watch::Receiver<bool>,
    fail: bool,
}

#[async_trait::async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        self.captures.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.clone();
        let _ = gate.wait_for(|open| *open).await;

        if self.fail {
            return Err(RenderError::Navigation(format!("scripted failure for {url}")));
        }
        Ok(RenderedPage { html: HTML.into(), final_url: url.clone(), render_time_ms: 1 })
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn config() -> AppConfig {
    AppConfig { cache_mode: CacheMode::Memory, shutdown_grace_ms: 2_000, ..Default::default() }
}

pub(crate) fn prerender_from(config: &AppConfig, script: &Script, pool_size: usize) -> Prerender {
    Prerender::new(config, HtmlCache::Memory(MemoryCache::new()), script.pool(pool_size)).expect("valid config")
}

pub(crate) fn prerender_with(script: &Script, pool_size: usize) -> Prerender {
    prerender_from(&config(), script, pool_size)
}

/// Wait until no render job is tracked.
pub(crate) async fn settle(prerender: &Prerender) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while prerender.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("render jobs did not settle");
}
