//! Security headers and a per-client rate limiter, composed as
//! `axum::middleware::from_fn`/`from_fn_with_state` layers the same way
//! the teacher composes `TraceLayer` onto `build_router` — these just add
//! two more links in that chain rather than introducing a new composition
//! style.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

/// Fixed set of response headers applied to every route. Matches what a
/// loopback-only single-user gateway needs: no framing, no MIME sniffing,
/// no leaking referrers or touching device sensors, and no advertising the
/// server stack to whatever ends up on the other end of the socket.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'self'; connect-src 'self' ws://127.0.0.1:* ws://localhost:*",
        ),
    );
    headers.remove("server");
    res
}

/// Sliding-window limiter keyed by peer address. Each request's timestamp
/// is pushed onto that address's bucket, and entries older than `window`
/// are evicted from the front before the count is checked, so the budget
/// always reflects the last `window` of wall-clock time rather than
/// resetting in a burst at a fixed boundary.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: DashMap<SocketAddr, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: DashMap::new(),
        }
    }

    fn allow(&self, addr: SocketAddr) -> bool {
        let entry = self.buckets.entry(addr).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut bucket = entry.lock().unwrap();
        let now = Instant::now();
        while let Some(&front) = bucket.front() {
            if now.duration_since(front) > self.window {
                bucket.pop_front();
            } else {
                break;
            }
        }
        if bucket.len() as u32 >= self.max_requests {
            return false;
        }
        bucket.push_back(now);
        true
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.allow(addr) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        assert!(limiter.allow(addr));
        assert!(limiter.allow(addr));
        assert!(!limiter.allow(addr));
    }

    #[test]
    fn separate_addresses_have_separate_budgets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        assert!(limiter.allow(a));
        assert!(limiter.allow(b));
        assert!(!limiter.allow(a));
    }
}
