use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// How many requests a key may make per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_requests: u32,
    pub window: Duration,
}

impl Budget {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

const SIGN_IN: Budget = Budget::new(5, 60);
const SIGN_UP: Budget = Budget::new(5, 60 * 60);
const CONFIRM: Budget = Budget::new(10, 10 * 60);
const RESEND_CODE: Budget = Budget::new(3, 10 * 60);
const REFRESH: Budget = Budget::new(30, 60);

/// Guesses at one account's confirmation code, from any address.
pub const CONFIRM_PER_ACCOUNT: Budget = Budget::new(10, 10 * 60);

/// Per-IP budget for an auth endpoint.
pub fn budget_for(path: &str) -> Budget {
    match path.trim_end_matches('/').rsplit('/').next() {
        Some("register") => SIGN_UP,
        Some("confirm") => CONFIRM,
        Some("resend-code") => RESEND_CODE,
        Some("refresh") => REFRESH,
        _ => SIGN_IN,
    }
}

struct Window {
    used: u32,
    started: Instant,
    length: Duration,
}

/// Fixed-window counters keyed by caller (IP and path, or account).
/// State is per process.
#[derive(Clone, Default)]
pub struct RateLimitState {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend one request from `key`'s budget. Returns what is left, or how
    /// long until the window resets.
    pub async fn check(&self, key: &str, budget: Budget) -> Result<u32, Duration> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        let window = windows.entry(key.to_string()).or_insert(Window {
            used: 0,
            started: now,
            length: budget.window,
        });

        if now.duration_since(window.started) > budget.window {
            window.used = 0;
            window.started = now;
        }
        window.length = budget.window;

        if window.used >= budget.max_requests {
            return Err(budget
                .window
                .saturating_sub(now.duration_since(window.started)));
        }

        window.used += 1;
        Ok(budget.max_requests - window.used)
    }

    /// Drop windows that ended a full window ago.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .lock()
            .await
            .retain(|_, w| now.duration_since(w.started) < w.length * 2);
    }

    /// Prune stale windows for the life of the process.
    pub fn spawn_cleanup_worker(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                tracing::debug!("Rate limit windows pruned");
            }
        })
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Per-IP limit on the sign-up, confirm and sign-in endpoints.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip();
    let path = req.uri().path().to_string();
    let budget = budget_for(&path);

    match state.rate_limiter.check(&format!("{}:{}", ip, path), budget).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, path = %path, remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}
