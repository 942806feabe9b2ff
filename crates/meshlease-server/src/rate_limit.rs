//! Per-source token bucket rate limiter.
//!
//! Buckets are created lazily, one per source IP, in a shared map guarded
//! by an `RwLock`, with a double-checked insert so a lost-race creation is
//! discarded in favor of the winning entry. A janitor
//! periodically purges the whole table; refilling a bucket from empty is
//! cheap, so coarse cleanup is an acceptable tradeoff against the
//! complexity of per-entry LRU eviction.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use ipnet::IpNet;
use tokio::sync::watch;

/// Outcome of a rate-limit check.
pub struct Decision {
    pub allowed: bool,
    pub retry_after: Duration,
    pub remaining: u32,
    pub limit: u32,
    pub reset_unix_secs: u64,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self { tokens: capacity, last_refill: Instant::now() }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// A shared, lazily-populated table of per-source token buckets.
pub struct RateLimiter {
    buckets: RwLock<HashMap<IpAddr, TokenBucket>>,
    capacity: f64,
    refill_per_sec: f64,
    requests_per_minute: u32,
    trusted_proxies: Vec<IpNet>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_minute: u32, burst: u32, trusted_proxies: &[String]) -> Self {
        let trusted_proxies = trusted_proxies
            .iter()
            .filter_map(|raw| parse_trusted_proxy(raw))
            .collect();

        Self {
            buckets: RwLock::new(HashMap::new()),
            capacity: f64::from(burst),
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            requests_per_minute,
            trusted_proxies,
        }
    }

    /// Determine the source IP for rate-limiting purposes, honoring
    /// proxy headers only when `remote` is itself a trusted proxy.
    #[must_use]
    pub fn source_ip(&self, remote: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.trusted_proxies.iter().any(|net| net.contains(&remote)) {
            return remote;
        }

        if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()).and_then(|v| IpAddr::from_str(v.trim()).ok()) {
            return real_ip;
        }

        if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = forwarded.split(',').next() {
                if let Ok(ip) = IpAddr::from_str(first.trim()) {
                    return ip;
                }
            }
        }

        remote
    }

    /// Check and consume one token for `ip`, creating its bucket on first
    /// use.
    #[must_use]
    pub fn allow(&self, ip: IpAddr) -> Decision {
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let bucket = buckets.entry(ip).or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.refill(self.capacity, self.refill_per_sec, now);

        let reset_unix_secs = next_minute_boundary();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision {
                allowed: true,
                retry_after: Duration::ZERO,
                remaining: bucket.tokens.floor() as u32,
                limit: self.requests_per_minute,
                reset_unix_secs,
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = if self.refill_per_sec > 0.0 { deficit / self.refill_per_sec } else { 60.0 };
            Decision {
                allowed: false,
                retry_after: Duration::from_secs_f64(wait_secs),
                remaining: 0,
                limit: self.requests_per_minute,
                reset_unix_secs,
            }
        }
    }

    fn bucket_count(&self) -> usize {
        self.buckets.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    fn purge(&self) {
        self.buckets.write().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }
}

fn parse_trusted_proxy(raw: &str) -> Option<IpNet> {
    if let Ok(net) = raw.parse::<IpNet>() {
        return Some(net);
    }
    raw.parse::<IpAddr>().ok().map(IpNet::from)
}

fn next_minute_boundary() -> u64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    (now / 60 + 1) * 60
}

/// Background janitor that periodically clears the whole bucket table.
pub async fn run_janitor(limiter: std::sync::Arc<RateLimiter>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {
                let count = limiter.bucket_count();
                limiter.purge();
                tracing::debug!(purged = count, "rate limiter janitor swept bucket table");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("rate limiter janitor stopping on shutdown signal");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_burst_then_denies() {
        let limiter = RateLimiter::new(60, 2, &[]);
        let ip = IpAddr::from_str("203.0.113.1").unwrap();

        assert!(limiter.allow(ip).allowed);
        assert!(limiter.allow(ip).allowed);
        assert!(!limiter.allow(ip).allowed);
    }

    #[test]
    fn untrusted_remote_ignores_proxy_headers() {
        let limiter = RateLimiter::new(60, 10, &[]);
        let remote = IpAddr::from_str("198.51.100.5").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());

        assert_eq!(limiter.source_ip(remote, &headers), remote);
    }

    #[test]
    fn trusted_remote_honors_x_real_ip() {
        let limiter = RateLimiter::new(60, 10, &["198.51.100.0/24".to_owned()]);
        let remote = IpAddr::from_str("198.51.100.5").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());

        assert_eq!(limiter.source_ip(remote, &headers), IpAddr::from_str("203.0.113.9").unwrap());
    }

    #[test]
    fn invalid_proxy_header_falls_through_to_remote() {
        let limiter = RateLimiter::new(60, 10, &["198.51.100.0/24".to_owned()]);
        let remote = IpAddr::from_str("198.51.100.5").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "not-an-ip".parse().unwrap());

        assert_eq!(limiter.source_ip(remote, &headers), remote);
    }
}
