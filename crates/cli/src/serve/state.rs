//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use bondflow_storage::InMemoryDealStore;
use bondflow_workflow::{MoveExecutor, WorkflowError};
use tokio::sync::{Mutex, MutexGuard};

use super::RATE_LIMIT_WINDOW_SECS;
use crate::store::Session;

/// Requests seen from one IP in the current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Fixed-window per-IP rate limiter.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    limit: u64,
    span: Duration,
}

impl RateLimiter {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            span: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        }
    }

    /// Count a request from `ip`. `Err` carries the seconds until its
    /// window resets.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.span);

        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        window.count += 1;
        if window.count <= self.limit {
            return Ok(());
        }
        let elapsed = now.saturating_duration_since(window.started);
        Err(self.span.saturating_sub(elapsed).as_secs().max(1))
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    session: Session,
    /// Held from a write through its save, so a rollback never undoes
    /// another request's write.
    write_lock: Mutex<()>,
    /// Per-IP rate limiter.
    pub(crate) rate_limiter: RateLimiter,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(session: Session, rate_limit: u64, api_key: Option<String>) -> Self {
        Self {
            session,
            write_lock: Mutex::new(()),
            rate_limiter: RateLimiter::new(rate_limit),
            api_key,
        }
    }

    pub(crate) fn executor(&self) -> &MoveExecutor<InMemoryDealStore> {
        &self.session.executor
    }

    /// Take the write lock. Hold it until [`AppState::persist`] returns.
    pub(crate) async fn begin_write(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Save the store after a successful write. A failed save has already
    /// rolled the write back.
    pub(crate) async fn persist(&self) -> Result<(), WorkflowError> {
        self.session
            .save()
            .await
            .map_err(WorkflowError::PersistFailure)
    }
}
