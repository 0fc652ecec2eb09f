//! Fixed-window request throttling, keyed per client identity.
//!
//! Each key gets a window anchored at its first request; the counter lives
//! for the full window regardless of traffic, then resets on the next
//! request after expiry. A request at the cap is denied without touching
//! the counter, so denials never extend the window's occupancy.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{ApiError, AppState};
use crate::constants::audit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
    },
    /// `first` marks the first denial of the key's current window, so
    /// callers can record the event without amplifying it per request.
    Denied {
        retry_after: Duration,
        first: bool,
    },
}

struct Window {
    started: Instant,
    count: u32,
    denied: bool,
}

pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    quota: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            quota,
            window,
        }
    }

    /// Record one request for `key` at `now` and decide its fate.
    ///
    /// The `DashMap` entry lock makes the read-check-write atomic per key;
    /// concurrent requests for the same key serialize here and the counter
    /// never overshoots the quota.
    pub fn check(&self, key: &str, now: Instant) -> RateDecision {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                started: now,
                count: 0,
                denied: false,
            });

        // duration_since saturates to zero if now predates the anchor.
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
            entry.denied = false;
        }

        if entry.count >= self.quota {
            let first = !entry.denied;
            entry.denied = true;
            let elapsed = now.duration_since(entry.started);
            return RateDecision::Denied {
                retry_after: self.window.saturating_sub(elapsed),
                first,
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.quota - entry.count,
        }
    }

    /// Drop windows that expired; called periodically so idle keys do not
    /// accumulate forever.
    pub fn prune(&self, now: Instant) {
        let window = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Identity key for throttling: the forwarded client address when the peer
/// is a trusted proxy, otherwise the peer address itself.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxies: &[String]) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match peer {
        Some(addr) => {
            let peer_ip = addr.ip().to_string();
            if let Some(client) = forwarded {
                if trusted_proxies.iter().any(|p| p == &peer_ip) {
                    return client;
                }
            }
            peer_ip
        }
        // No socket info (e.g. served through a test harness); fall back to
        // whatever the request carries.
        None => forwarded.unwrap_or_else(|| "local".to_string()),
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trusted = {
        let config = state.config.read().await;
        config.rate_limit.trusted_proxy_ips.clone()
    };

    let peer = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    let key = client_key(request.headers(), peer, &trusted);

    match state.limiter.check(&key, Instant::now()) {
        RateDecision::Allowed { remaining } => {
            debug!(key = %key, remaining, "Request admitted");
            Ok(next.run(request).await)
        }
        RateDecision::Denied { retry_after, first } => {
            metrics::counter!("rate_limit_denials_total").increment(1);
            tracing::warn!(
                event = audit::RATE_LIMIT_EVENT,
                key = %key,
                "Request denied by rate limiter"
            );
            // One audit row per key per window; the write must never turn a
            // denial into a 500.
            if first {
                if let Err(e) = state
                    .store
                    .add_audit(
                        audit::RATE_LIMIT_EVENT,
                        "warn",
                        &key,
                        "Rate limit exceeded",
                        None,
                    )
                    .await
                {
                    tracing::warn!("Failed to write audit entry: {e}");
                }
            }
            Err(ApiError::RateLimited(retry_after.as_secs().max(1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_quota_then_denies() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert_eq!(
            limiter.check("k", t0),
            RateDecision::Allowed { remaining: 2 }
        );
        assert_eq!(
            limiter.check("k", t0),
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check("k", t0),
            RateDecision::Allowed { remaining: 0 }
        );
        assert!(matches!(
            limiter.check("k", t0),
            RateDecision::Denied { .. }
        ));
    }

    #[test]
    fn window_is_anchored_at_first_request() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check("k", t0);
        limiter.check("k", t0 + Duration::from_secs(30));
        // Still inside the window that started at t0.
        assert!(matches!(
            limiter.check("k", t0 + Duration::from_secs(59)),
            RateDecision::Denied { .. }
        ));
        // Window lapsed; counter resets and the request is admitted.
        assert_eq!(
            limiter.check("k", t0 + Duration::from_secs(61)),
            RateDecision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn denied_requests_do_not_consume_quota() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check("k", t0);
        for i in 1..10 {
            assert!(matches!(
                limiter.check("k", t0 + Duration::from_secs(i)),
                RateDecision::Denied { .. }
            ));
        }
        // After reset exactly the quota is available again, proving the
        // denials above never incremented the counter.
        assert_eq!(
            limiter.check("k", t0 + Duration::from_secs(61)),
            RateDecision::Allowed { remaining: 0 }
        );
    }

    #[test]
    fn only_the_first_denial_per_window_is_flagged() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check("k", t0);
        assert!(matches!(
            limiter.check("k", t0),
            RateDecision::Denied { first: true, .. }
        ));
        assert!(matches!(
            limiter.check("k", t0 + Duration::from_secs(1)),
            RateDecision::Denied { first: false, .. }
        ));

        // A new window re-arms the flag.
        limiter.check("k", t0 + Duration::from_secs(61));
        assert!(matches!(
            limiter.check("k", t0 + Duration::from_secs(61)),
            RateDecision::Denied { first: true, .. }
        ));
    }

    #[test]
    fn keys_are_throttled_independently() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check("a", t0);
        assert!(matches!(
            limiter.check("a", t0),
            RateDecision::Denied { .. }
        ));
        assert_eq!(
            limiter.check("b", t0),
            RateDecision::Allowed { remaining: 0 }
        );
    }

    #[test]
    fn prune_drops_expired_windows_only() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check("old", t0);
        limiter.check("fresh", t0 + Duration::from_secs(50));
        limiter.prune(t0 + Duration::from_secs(70));

        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn forwarded_header_is_ignored_from_untrusted_peers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        let peer: SocketAddr = "10.0.0.5:9999".parse().unwrap();

        let untrusted = client_key(&headers, Some(peer), &[]);
        assert_eq!(untrusted, "10.0.0.5");

        let trusted = client_key(&headers, Some(peer), &["10.0.0.5".to_string()]);
        assert_eq!(trusted, "203.0.113.9");
    }
}
