//! Per-source-address auth rate limiting (spec §4.5): 5 failed attempts
//! inside a rolling window blocks that source for a cooldown period,
//! cleared immediately on the next successful auth. Grounded on the
//! `RateLimiter`/`TokenBucket` shape used for HTTP middleware elsewhere
//! in the workspace, adapted here to a failed-attempt counter instead of
//! a request-volume bucket.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use multisig_common::config::AuthRateLimitConfig;

struct SourceRecord {
    failures: Vec<Instant>,
    blocked_until: Option<Instant>,
}

pub struct AuthRateLimiter {
    config: AuthRateLimitConfig,
    sources: Mutex<HashMap<IpAddr, SourceRecord>>,
}

impl AuthRateLimiter {
    pub fn new(config: AuthRateLimitConfig) -> Self {
        Self {
            config,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// `Some(remaining)` if `addr` is currently blocked.
    pub fn check(&self, addr: IpAddr) -> Option<Duration> {
        let sources = self.sources.lock().expect("rate limiter mutex poisoned");
        let record = sources.get(&addr)?;
        let blocked_until = record.blocked_until?;
        let now = Instant::now();
        if now < blocked_until {
            Some(blocked_until - now)
        } else {
            None
        }
    }

    /// Record a failed auth attempt, blocking `addr` once it crosses
    /// `max_attempts` within `window_ms`.
    pub fn record_failure(&self, addr: IpAddr) {
        let window = Duration::from_millis(self.config.window_ms);
        let block_duration = Duration::from_millis(self.config.block_duration_ms);
        let now = Instant::now();

        let mut sources = self.sources.lock().expect("rate limiter mutex poisoned");
        let record = sources.entry(addr).or_insert_with(|| SourceRecord {
            failures: Vec::new(),
            blocked_until: None,
        });
        record.failures.retain(|t| now.duration_since(*t) <= window);
        record.failures.push(now);
        if record.failures.len() as u32 >= self.config.max_attempts {
            record.blocked_until = Some(now + block_duration);
        }
    }

    /// Clear any failure history for `addr` after a successful auth.
    pub fn record_success(&self, addr: IpAddr) {
        let mut sources = self.sources.lock().expect("rate limiter mutex poisoned");
        sources.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthRateLimitConfig {
        AuthRateLimitConfig {
            max_attempts: 3,
            window_ms: 60_000,
            block_duration_ms: 1_000,
        }
    }

    #[test]
    fn blocks_after_max_attempts() {
        let limiter = AuthRateLimiter::new(config());
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(addr).is_none());
        for _ in 0..3 {
            limiter.record_failure(addr);
        }
        assert!(limiter.check(addr).is_some());
    }

    #[test]
    fn success_clears_history() {
        let limiter = AuthRateLimiter::new(config());
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        limiter.record_failure(addr);
        limiter.record_failure(addr);
        limiter.record_success(addr);
        limiter.record_failure(addr);
        assert!(limiter.check(addr).is_none());
    }

    #[test]
    fn different_sources_are_independent() {
        let limiter = AuthRateLimiter::new(config());
        let a: IpAddr = "192.168.0.1".parse().unwrap();
        let b: IpAddr = "192.168.0.2".parse().unwrap();
        for _ in 0..3 {
            limiter.record_failure(a);
        }
        assert!(limiter.check(a).is_some());
        assert!(limiter.check(b).is_none());
    }
}
