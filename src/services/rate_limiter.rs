//! Rate limiting for login and password-reset attempts
//!
//! - Failed logins per email: 5 per 15 minutes
//! - Wrong password-reset codes per email: 5 per 15 minutes
//! - Auth requests per IP address: 10 per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps per key, counted over a sliding window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let hits = self.hits.read().await;
        hits.get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    /// Drop expired timestamps and empty keys; returns the keys left
    async fn prune(&self) -> usize {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        hits.len()
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    emails: SlidingWindow<String>,
    resets: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(5, Duration::minutes(15), 10, Duration::minutes(1))
    }

    pub fn with_limits(
        email_limit: usize,
        email_window: Duration,
        ip_limit: usize,
        ip_window: Duration,
    ) -> Self {
        Self {
            emails: SlidingWindow::new(email_limit, email_window),
            resets: SlidingWindow::new(email_limit, email_window),
            ips: SlidingWindow::new(ip_limit, ip_window),
        }
    }

    /// Too many recent failures for this email
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.emails.is_limited(&email.trim().to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.emails.record(email.trim().to_lowercase()).await;
    }

    /// Clear failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.emails.clear(&email.trim().to_lowercase()).await;
    }

    /// Too many wrong reset codes for this email
    pub async fn is_reset_limited(&self, email: &str) -> bool {
        self.resets.is_limited(&email.trim().to_lowercase()).await
    }

    pub async fn record_failed_reset(&self, email: &str) {
        self.resets.record(email.trim().to_lowercase()).await;
    }

    pub async fn clear_reset_attempts(&self, email: &str) {
        self.resets.clear(&email.trim().to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip).await;
    }

    /// Forget stale entries; called from the periodic cleanup task
    pub async fn cleanup(&self) {
        let emails = self.emails.prune().await;
        let resets = self.resets.prune().await;
        let ips = self.ips.prune().await;
        tracing::debug!(emails, resets, ips, "Rate limiter pruned");
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_email_rate_limit() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..4 {
            limiter.record_failed_attempt("juan@example.ph").await;
            assert!(!limiter.is_email_limited("juan@example.ph").await);
        }
        limiter.record_failed_attempt("juan@example.ph").await;
        assert!(limiter.is_email_limited("juan@example.ph").await);

        limiter.clear_email_attempts("juan@example.ph").await;
        assert!(!limiter.is_email_limited("juan@example.ph").await);
    }

    #[tokio::test]
    async fn test_email_key_ignores_case_and_spaces() {
        let limiter = LoginRateLimiter::new();
        for email in ["A@x.ph", "a@x.ph ", "A@X.PH", "a@x.ph", "a@X.ph"] {
            limiter.record_failed_attempt(email).await;
        }
        assert!(limiter.is_email_limited("a@x.ph").await);
    }

    #[tokio::test]
    async fn test_reset_guesses_counted_apart_from_logins() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failed_reset("Maria@example.ph").await;
        }
        assert!(limiter.is_reset_limited("maria@example.ph").await);
        assert!(!limiter.is_email_limited("maria@example.ph").await);

        limiter.clear_reset_attempts("maria@example.ph").await;
        assert!(!limiter.is_reset_limited("maria@example.ph").await);
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("10.0.0.7").unwrap();

        for _ in 0..9 {
            limiter.record_ip_request(ip).await;
        }
        assert!(!limiter.is_ip_limited(ip).await);
        limiter.record_ip_request(ip).await;
        assert!(limiter.is_ip_limited(ip).await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = LoginRateLimiter::with_limits(1, Duration::milliseconds(20), 1, Duration::milliseconds(20));
        let ip = IpAddr::from_str("10.0.0.8").unwrap();
        limiter.record_failed_attempt("b@x.ph").await;
        limiter.record_ip_request(ip).await;
        assert!(limiter.is_email_limited("b@x.ph").await);

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(!limiter.is_email_limited("b@x.ph").await);
        assert!(!limiter.is_ip_limited(ip).await);

        limiter.cleanup().await;
        assert_eq!(limiter.emails.prune().await, 0);
    }
}
