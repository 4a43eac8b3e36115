//! Fixed-size pool of renderers.
//!
//! A semaphore with one permit per renderer bounds checkouts; the idle list
//! holds the renderers not currently checked out. A checkout pops a renderer
//! only after winning a permit, and [`PooledRenderer`] pushes it back before
//! releasing that permit, so the idle list is never empty for a permit holder
//! and no renderer is ever held by two callers.

use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, SemaphorePermit};

use super::{RenderError, Renderer};

/// Bounded set of renderers handed out for exclusive use.
pub struct RendererPool {
    idle: Mutex<Vec<Box<dyn Renderer>>>,
    permits: Semaphore,
    returned: Notify,
    checked_out: AtomicUsize,
    drained: AtomicBool,
    size: usize,
}

impl RendererPool {
    /// Build a pool from already provisioned renderers.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::BrowserLaunch` if `renderers` is empty.
    pub fn new(renderers: Vec<Box<dyn Renderer>>) -> Result<Self, RenderError> {
        if renderers.is_empty() {
            return Err(RenderError::BrowserLaunch("renderer pool needs at least one renderer".into()));
        }

        let size = renderers.len();
        Ok(Self {
            idle: Mutex::new(renderers),
            permits: Semaphore::new(size),
            returned: Notify::new(),
            checked_out: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
            size,
        })
    }

    /// Provision `size` renderers with `factory` and pool them.
    ///
    /// Fails as a whole if any renderer cannot be created; the ones already
    /// created are closed first.
    pub async fn launch<F, Fut>(size: usize, factory: F) -> Result<Self, RenderError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<Box<dyn Renderer>, RenderError>>,
    {
        let mut renderers: Vec<Box<dyn Renderer>> = Vec::with_capacity(size);
        for index in 0..size {
            match factory(index).await {
                Ok(renderer) => renderers.push(renderer),
                Err(e) => {
                    tracing::error!(index, "failed to provision renderer: {e}");
                    for renderer in &renderers {
                        renderer.close().await;
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(size, "renderer pool ready");
        Self::new(renderers)
    }

    /// Wait for a free renderer and check it out.
    ///
    /// Waiters are queued by the semaphore, so every waiter is served as
    /// renderers come back. Fails once the pool is shut down.
    pub async fn acquire(&self) -> Result<PooledRenderer<'_>, RenderError> {
        let permit = self.permits.acquire().await.map_err(|_| RenderError::PoolClosed)?;
        let renderer = self.lock_idle().pop().ok_or(RenderError::PoolClosed)?;
        self.checked_out.fetch_add(1, Ordering::SeqCst);

        Ok(PooledRenderer { pool: self, renderer: Some(renderer), _permit: permit })
    }

    /// Configured number of renderers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Renderers currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.lock_idle().len()
    }

    /// Renderers currently checked out.
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Stop handing out renderers, wait up to `grace` for checkouts to come
    /// back, then close every renderer in the pool.
    ///
    /// In-progress captures are not interrupted. Renderers still checked out
    /// when the grace period ends are closed in the background once returned.
    pub async fn shutdown(&self, grace: Duration) {
        self.permits.close();

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let returned = self.returned.notified();
            if self.checked_out() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, returned).await.is_err() {
                tracing::warn!(
                    checked_out = self.checked_out(),
                    grace_ms = grace.as_millis() as u64,
                    "renderer pool shutdown grace elapsed"
                );
                break;
            }
        }

        let renderers: Vec<Box<dyn Renderer>> = {
            let mut idle = self.lock_idle();
            self.drained.store(true, Ordering::SeqCst);
            std::mem::take(&mut *idle)
        };
        let closed = renderers.len();
        for renderer in renderers {
            renderer.close().await;
        }
        tracing::info!(closed, "renderer pool shut down");
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Box<dyn Renderer>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_in(&self, renderer: Box<dyn Renderer>) {
        let late = {
            let mut idle = self.lock_idle();
            if self.drained.load(Ordering::SeqCst) {
                Some(renderer)
            } else {
                idle.push(renderer);
                None
            }
        };
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
        self.returned.notify_waiters();

        if let Some(renderer) = late {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    tracing::debug!("renderer returned after pool shutdown; closing it");
                    handle.spawn(async move { renderer.close().await });
                }
                Err(_) => tracing::warn!("renderer returned outside a runtime after pool shutdown; dropping it"),
            }
        }
    }
}

/// A renderer checked out of the pool.
///
/// Returned to the pool when dropped, on every exit path of the holder.
pub struct PooledRenderer<'a> {
    pool: &'a RendererPool,
    renderer: Option<Box<dyn Renderer>>,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledRenderer<'_> {
    type Target = dyn Renderer;

    fn deref(&self) -> &Self::Target {
        self.renderer.as_deref().expect("renderer present until drop")
    }
}

impl Drop for PooledRenderer<'_> {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            self.pool.check_in(renderer);
        }
    }
}
