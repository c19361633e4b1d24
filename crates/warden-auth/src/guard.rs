//! Abuse controls: fixed-window rate limiting and failed-login lockout.
//!
//! Both are plain counters in the [`CounterStore`]. Decisions are made
//! on the value returned by the increment itself, never on a separate
//! read, so concurrent requests cannot both slip under a threshold.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};
use warden_core::error::{WardenError, WardenResult};
use warden_core::store::CounterStore;

use crate::config::{AuthConfig, RateLimitPolicy};

/// Endpoint classes with their own rate-limit buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Login,
    Register,
    Refresh,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Login => "login",
            RateLimitScope::Register => "register",
            RateLimitScope::Refresh => "refresh",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Result of recording one failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    /// Failures in the current window, including this one.
    pub attempts: i64,
    /// Whether the account is now locked.
    pub locked: bool,
}

pub fn rate_key(scope: &str, client: &str) -> String {
    format!("rate:{scope}:{client}")
}

pub fn fail_key(email: &str) -> String {
    format!("login_fail:{email}")
}

pub fn lock_key(email: &str) -> String {
    format!("login_lock:{email}")
}

/// Whole seconds for a `Retry-After` hint, never zero.
fn retry_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[derive(Clone)]
pub struct AbuseGuard<S: CounterStore> {
    store: S,
    max_failed_logins: u32,
    fail_window: Duration,
    lock_duration: Duration,
}

impl<S: CounterStore> AbuseGuard<S> {
    pub fn new(
        store: S,
        max_failed_logins: u32,
        fail_window: Duration,
        lock_duration: Duration,
    ) -> Self {
        Self {
            store,
            max_failed_logins,
            fail_window,
            lock_duration,
        }
    }

    pub fn from_config(store: S, config: &AuthConfig) -> Self {
        Self::new(
            store,
            config.max_failed_logins,
            config.fail_window,
            config.lock_duration,
        )
    }

    /// Count one request against `rate:{scope}:{client}`.
    ///
    /// The window starts at the first request and is never extended.
    pub async fn check_rate_limit(
        &self,
        scope: &str,
        client: &str,
        policy: RateLimitPolicy,
    ) -> WardenResult<RateLimitDecision> {
        let key = rate_key(scope, client);
        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, policy.window).await?;
        }
        if count <= i64::from(policy.max) {
            return Ok(RateLimitDecision::Allowed);
        }

        let retry_after = match self.store.ttl(&key).await? {
            Some(remaining) => remaining,
            None => {
                // First-request EXPIRE was lost; restart the window.
                self.store.expire(&key, policy.window).await?;
                policy.window
            }
        };
        debug!(scope, count, ?retry_after, "Rate limit exceeded");
        Ok(RateLimitDecision::Limited { retry_after })
    }

    /// Like [`check_rate_limit`](Self::check_rate_limit) but turns a deny
    /// into `WardenError::RateLimited`.
    pub async fn enforce(
        &self,
        scope: RateLimitScope,
        client: &str,
        policy: RateLimitPolicy,
    ) -> WardenResult<()> {
        match self.check_rate_limit(scope.as_str(), client, policy).await? {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited { retry_after } => Err(WardenError::RateLimited {
                retry_after_secs: retry_secs(retry_after),
            }),
        }
    }

    /// Lock state is the presence of the lock key, not the counter value.
    pub async fn is_locked(&self, email: &str) -> WardenResult<bool> {
        self.store.exists(&lock_key(email)).await
    }

    pub async fn record_failed_login(&self, email: &str) -> WardenResult<FailedLogin> {
        let key = fail_key(email);
        let attempts = self.store.incr(&key).await?;
        if attempts == 1 {
            self.store.expire(&key, self.fail_window).await?;
        }

        let locked = attempts >= i64::from(self.max_failed_logins);
        if locked {
            self.store
                .set_with_ttl(&lock_key(email), "1", self.lock_duration)
                .await?;
            warn!(
                attempts,
                lock_secs = self.lock_duration.as_secs(),
                "Account locked after repeated failures"
            );
        }
        Ok(FailedLogin { attempts, locked })
    }

    /// Reset the failure counter and any lock. Called on successful login.
    pub async fn clear_failed_login(&self, email: &str) -> WardenResult<()> {
        self.store
            .delete(&[fail_key(email), lock_key(email)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_kv::MemoryCounterStore;

    fn guard(store: MemoryCounterStore) -> AbuseGuard<MemoryCounterStore> {
        AbuseGuard::new(store, 3, Duration::from_secs(600), Duration::from_secs(900))
    }

    #[test]
    fn retry_hint_rounds_up() {
        assert_eq!(retry_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_secs(Duration::ZERO), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_window_denies_after_max_then_resets() {
        let guard = guard(MemoryCounterStore::new());
        let policy = RateLimitPolicy::new(2, Duration::from_secs(60));

        for _ in 0..2 {
            assert_eq!(
                guard.check_rate_limit("login", "1.2.3.4", policy).await.unwrap(),
                RateLimitDecision::Allowed
            );
        }
        let denied = guard.check_rate_limit("login", "1.2.3.4", policy).await.unwrap();
        assert!(matches!(
            denied,
            RateLimitDecision::Limited { retry_after } if retry_after <= Duration::from_secs(60)
        ));

        // Other clients and scopes have their own buckets.
        assert_eq!(
            guard.check_rate_limit("login", "5.6.7.8", policy).await.unwrap(),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            guard.check_rate_limit("register", "1.2.3.4", policy).await.unwrap(),
            RateLimitDecision::Allowed
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            guard.check_rate_limit("login", "1.2.3.4", policy).await.unwrap(),
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_not_extended_by_later_requests() {
        let store = MemoryCounterStore::new();
        let guard = guard(store.clone());
        let policy = RateLimitPolicy::new(10, Duration::from_secs(60));

        guard.check_rate_limit("login", "c", policy).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        guard.check_rate_limit("login", "c", policy).await.unwrap();

        let ttl = store.ttl(&rate_key("login", "c")).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn enforce_maps_deny_to_rate_limited() {
        let guard = guard(MemoryCounterStore::new());
        let policy = RateLimitPolicy::new(1, Duration::from_secs(30));

        guard.enforce(RateLimitScope::Refresh, "ip", policy).await.unwrap();
        let err = guard
            .enforce(RateLimitScope::Refresh, "ip", policy)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WardenError::RateLimited { retry_after_secs } if (1..=30).contains(&retry_after_secs)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_after_threshold_until_ttl() {
        let guard = guard(MemoryCounterStore::new());

        let first = guard.record_failed_login("a@b.c").await.unwrap();
        assert_eq!(first, FailedLogin { attempts: 1, locked: false });
        guard.record_failed_login("a@b.c").await.unwrap();
        assert!(!guard.is_locked("a@b.c").await.unwrap());

        let third = guard.record_failed_login("a@b.c").await.unwrap();
        assert!(third.locked);
        assert!(guard.is_locked("a@b.c").await.unwrap());

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(!guard.is_locked("a@b.c").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_window_start_over() {
        let guard = guard(MemoryCounterStore::new());

        guard.record_failed_login("a@b.c").await.unwrap();
        guard.record_failed_login("a@b.c").await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;

        let next = guard.record_failed_login("a@b.c").await.unwrap();
        assert_eq!(next.attempts, 1);
        assert!(!guard.is_locked("a@b.c").await.unwrap());
    }

    #[tokio::test]
    async fn clear_resets_counter_and_lock() {
        let store = MemoryCounterStore::new();
        let guard = guard(store.clone());

        for _ in 0..3 {
            guard.record_failed_login("a@b.c").await.unwrap();
        }
        guard.clear_failed_login("a@b.c").await.unwrap();

        assert!(!guard.is_locked("a@b.c").await.unwrap());
        assert!(!store.exists(&fail_key("a@b.c")).await.unwrap());
        assert_eq!(guard.record_failed_login("a@b.c").await.unwrap().attempts, 1);
    }
}
