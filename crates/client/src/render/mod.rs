//! Headless browser rendering for client-rendered pages.
//!
//! This module provides the renderer trait, a chromiumoxide-backed
//! implementation (feature `render`), and the pool that hands renderers
//! out for exclusive use.

pub mod pool;

use std::time::Duration;
use thiserror::Error;
use url::Url;

use prerender_core::AppConfig;

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Wait selector not found.
    #[error("wait_for selector not found: {0}")]
    SelectorNotFound(String),

    /// Browser closed unexpectedly.
    #[error("browser closed unexpectedly")]
    BrowserClosed,

    /// The renderer pool is shut down and hands out no more renderers.
    #[error("renderer pool is closed")]
    PoolClosed,
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Upper bound for the whole capture, in milliseconds.
    pub timeout_ms: u64,

    /// Time given to page scripts when no selector is awaited.
    pub settle_ms: u64,

    /// Optional CSS selector to wait for before extracting content.
    pub wait_for: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { timeout_ms: 18_000, settle_ms: 2_000, wait_for: None }
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_ms: config.render_timeout_ms,
            settle_ms: config.render_settle_ms,
            wait_for: config.render_wait_for.clone(),
        }
    }
}

impl RenderOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Rendered HTML content.
    pub html: String,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Renderer trait for headless browser page rendering.
///
/// A renderer is used by one caller at a time; the pool enforces this.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL to HTML via headless browser.
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError>;

    /// Release the underlying resource. Called once, when the pool shuts down.
    async fn close(&self) {}
}

#[cfg(feature = "render")]
pub use headless::HeadlessRenderer;

#[cfg(feature = "render")]
mod headless {
    use std::time::{Duration, Instant};

    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::page::Page;
    use futures_util::StreamExt;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use url::Url;

    use super::{RenderError, RenderOptions, RenderedPage, Renderer};
    use prerender_core::AppConfig;

    const SELECTOR_POLL: Duration = Duration::from_millis(250);

    /// Headless Chrome/Chromium renderer using chromiumoxide.
    ///
    /// Owns one browser process for its whole lifetime.
    pub struct HeadlessRenderer {
        browser: Mutex<Browser>,
        events: JoinHandle<()>,
    }

    impl HeadlessRenderer {
        /// Launch a headless browser configured from `config`.
        ///
        /// The browser uses a background task to handle Chrome DevTools
        /// Protocol events.
        pub async fn launch(config: &AppConfig) -> Result<Self, RenderError> {
            let mut builder = BrowserConfig::builder().window_size(config.viewport_width, config.viewport_height);
            if let Some(executable) = &config.chrome_executable {
                builder = builder.chrome_executable(executable);
            }

            let (browser, mut handler) = Browser::launch(builder.build().map_err(RenderError::BrowserLaunch)?)
                .await
                .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

            let events = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        tracing::debug!("browser handler event error: {e}");
                        break;
                    }
                }
            });

            Ok(Self { browser: Mutex::new(browser), events })
        }

        async fn settle(page: &Page, opts: &RenderOptions) -> Result<(), RenderError> {
            match &opts.wait_for {
                Some(selector) => loop {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        return Ok(());
                    }
                    tokio::time::sleep(SELECTOR_POLL).await;
                },
                None => {
                    tokio::time::sleep(Duration::from_millis(opts.settle_ms)).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl Renderer for HeadlessRenderer {
        async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            let start = Instant::now();
            let browser = self.browser.lock().await;

            let page = tokio::time::timeout(opts.timeout(), browser.new_page(url.as_str()))
                .await
                .map_err(|_| RenderError::Timeout(opts.timeout_ms))?
                .map_err(|e| RenderError::Navigation(e.to_string()))?;

            let remaining = opts.timeout().saturating_sub(start.elapsed());
            let captured = match tokio::time::timeout(remaining, Self::settle(&page, opts)).await {
                Ok(Ok(())) => page
                    .content()
                    .await
                    .map_err(|e| RenderError::ContentRetrieval(e.to_string())),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(match &opts.wait_for {
                    Some(selector) => RenderError::SelectorNotFound(selector.clone()),
                    None => RenderError::Timeout(opts.timeout_ms),
                }),
            };

            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());

            page.close().await.ok();

            Ok(RenderedPage { html: captured?, final_url, render_time_ms: start.elapsed().as_millis() as u64 })
        }

        async fn close(&self) {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                tracing::warn!("failed to close browser: {e}");
            }
            if let Err(e) = browser.wait().await {
                tracing::debug!("failed to reap browser process: {e}");
            }
            self.events.abort();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        #[ignore = "requires Chrome/Chromium installation"]
        async fn test_headless_renderer_launch() {
            let renderer = HeadlessRenderer::launch(&AppConfig::default()).await;
            assert!(renderer.is_ok());
            renderer.unwrap().close().await;
        }

        #[tokio::test]
        #[ignore = "requires network and Chrome/Chromium"]
        async fn test_render_simple_page() {
            let renderer = HeadlessRenderer::launch(&AppConfig::default()).await.unwrap();
            let url = Url::parse("https://example.com").unwrap();
            let opts = RenderOptions { settle_ms: 200, ..Default::default() };

            let page = renderer.render(&url, &opts).await.unwrap();
            assert!(page.html.contains("<html"));
            assert_eq!(page.final_url.as_str(), "https://example.com/");
            renderer.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_from_config() {
        let config = AppConfig {
            render_timeout_ms: 5_000,
            render_settle_ms: 100,
            render_wait_for: Some("#app".into()),
            ..Default::default()
        };
        let opts = RenderOptions::from(&config);
        assert_eq!(opts.timeout(), Duration::from_secs(5));
        assert_eq!(opts.settle_ms, 100);
        assert_eq!(opts.wait_for.as_deref(), Some("#app"));
    }

    #[test]
    fn test_render_error_display() {
        assert_eq!(RenderError::Timeout(250).to_string(), "render timeout after 250ms");
        assert_eq!(RenderError::PoolClosed.to_string(), "renderer pool is closed");
    }
}
