//! Credential lifecycle tests against the in-memory counter store.
//!
//! Time-dependent tests run with a paused tokio clock, which drives
//! key expiry in `MemoryCounterStore`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;
use warden_auth::{
    AuditSink, AuthConfig, ClientContext, CredentialIssuer, JwtCodec, RateLimitPolicy, TokenPair,
};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::account::{Account, CreateAccount, Role};
use warden_core::models::audit::{AuditAction, AuditEvent};
use warden_core::models::session::{Browser, Os};
use warden_core::repository::AccountRepository;
use warden_core::store::{CounterStore, WriteBatch};
use warden_kv::MemoryCounterStore;

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "correct horse battery";
const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct InMemoryAccounts {
    rows: Arc<Mutex<Vec<Account>>>,
}

impl AccountRepository for InMemoryAccounts {
    async fn create(&self, input: CreateAccount) -> WardenResult<Account> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|a| a.email == input.email) {
            return Err(WardenError::AccountExists);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: input.email,
            password_hash: input.password_hash,
            role: input.role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        rows.push(account.clone());
        Ok(account)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Account> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(WardenError::NotFound {
                entity: "account".into(),
                id: id.to_string(),
            })
    }

    async fn find_by_email(&self, email: &str) -> WardenResult<Option<Account>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: String) -> WardenResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let account = rows
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(WardenError::NotFound {
                entity: "account".into(),
                id: id.to_string(),
            })?;
        account.password_hash = password_hash;
        Ok(())
    }

    async fn list_all(&self) -> WardenResult<Vec<Account>> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn list_by_role(&self, role: Role) -> WardenResult<Vec<Account>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.role == role)
            .cloned()
            .collect())
    }
}

/// A store whose backend is unreachable.
#[derive(Clone)]
struct DownStore;

fn down<T>() -> WardenResult<T> {
    Err(WardenError::StoreUnavailable("connection refused".into()))
}

impl CounterStore for DownStore {
    async fn get(&self, _key: &str) -> WardenResult<Option<String>> {
        down()
    }
    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> WardenResult<()> {
        down()
    }
    async fn incr(&self, _key: &str) -> WardenResult<i64> {
        down()
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> WardenResult<bool> {
        down()
    }
    async fn ttl(&self, _key: &str) -> WardenResult<Option<Duration>> {
        down()
    }
    async fn add_to_set(&self, _key: &str, _member: &str) -> WardenResult<()> {
        down()
    }
    async fn remove_from_set(&self, _key: &str, _member: &str) -> WardenResult<()> {
        down()
    }
    async fn members(&self, _key: &str) -> WardenResult<Vec<String>> {
        down()
    }
    async fn delete(&self, _keys: &[String]) -> WardenResult<u64> {
        down()
    }
    async fn exists(&self, _key: &str) -> WardenResult<bool> {
        down()
    }
    async fn take(&self, _key: &str) -> WardenResult<Option<String>> {
        down()
    }
    async fn apply(&self, _batch: WriteBatch) -> WardenResult<()> {
        down()
    }
    async fn take_and_apply(&self, _key: &str, _batch: WriteBatch) -> WardenResult<Option<String>> {
        down()
    }
}

/// Healthy for reads and single-key writes; atomic multi-key writes fail
/// while `failing` is set.
#[derive(Clone, Default)]
struct FlakyBatchStore {
    inner: MemoryCounterStore,
    failing: Arc<AtomicBool>,
}

impl FlakyBatchStore {
    fn check(&self) -> WardenResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            down()
        } else {
            Ok(())
        }
    }
}

impl CounterStore for FlakyBatchStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        self.inner.get(key).await
    }
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        self.inner.set_with_ttl(key, value, ttl).await
    }
    async fn incr(&self, key: &str) -> WardenResult<i64> {
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> WardenResult<bool> {
        self.inner.expire(key, ttl).await
    }
    async fn ttl(&self, key: &str) -> WardenResult<Option<Duration>> {
        self.inner.ttl(key).await
    }
    async fn add_to_set(&self, key: &str, member: &str) -> WardenResult<()> {
        self.inner.add_to_set(key, member).await
    }
    async fn remove_from_set(&self, key: &str, member: &str) -> WardenResult<()> {
        self.inner.remove_from_set(key, member).await
    }
    async fn members(&self, key: &str) -> WardenResult<Vec<String>> {
        self.inner.members(key).await
    }
    async fn delete(&self, keys: &[String]) -> WardenResult<u64> {
        self.inner.delete(keys).await
    }
    async fn exists(&self, key: &str) -> WardenResult<bool> {
        self.inner.exists(key).await
    }
    async fn take(&self, key: &str) -> WardenResult<Option<String>> {
        self.inner.take(key).await
    }
    async fn apply(&self, batch: WriteBatch) -> WardenResult<()> {
        self.check()?;
        self.inner.apply(batch).await
    }
    async fn take_and_apply(&self, key: &str, batch: WriteBatch) -> WardenResult<Option<String>> {
        self.check()?;
        self.inner.take_and_apply(key, batch).await
    }
}

fn config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "test-access-secret".into(),
        refresh_token_secret: "test-refresh-secret".into(),
        jwt_issuer: "warden-test".into(),
        max_failed_logins: 5,
        fail_window: Duration::from_secs(10 * 60),
        lock_duration: Duration::from_secs(15 * 60),
        login_rate_limit: RateLimitPolicy::new(1000, Duration::from_secs(60)),
        register_rate_limit: RateLimitPolicy::new(1000, Duration::from_secs(60)),
        refresh_rate_limit: RateLimitPolicy::new(1000, Duration::from_secs(60)),
        ..Default::default()
    }
}

struct Harness {
    issuer: CredentialIssuer<InMemoryAccounts, MemoryCounterStore>,
    audit: mpsc::Receiver<AuditEvent>,
    codec: JwtCodec,
}

impl Harness {
    fn with_config(config: AuthConfig) -> Self {
        let (sink, audit) = AuditSink::channel(256);
        let codec = JwtCodec::from_config(&config);
        let issuer = CredentialIssuer::new(
            InMemoryAccounts::default(),
            MemoryCounterStore::new(),
            sink,
            config,
        )
        .unwrap();
        Self {
            issuer,
            audit,
            codec,
        }
    }

    fn new() -> Self {
        Self::with_config(config())
    }

    async fn register_alice(&mut self) -> Account {
        let account = self
            .issuer
            .register(EMAIL, PASSWORD, Role::User, &client())
            .await
            .unwrap();
        self.drain_audit();
        account
    }

    fn sid(&self, pair: &TokenPair) -> Uuid {
        self.codec.decode_refresh(&pair.refresh_token).unwrap().sid
    }

    fn drain_audit(&mut self) -> Vec<AuditAction> {
        let mut actions = Vec::new();
        while let Ok(event) = self.audit.try_recv() {
            actions.push(event.action);
        }
        actions
    }

    async fn indexed(&self, user_id: Uuid) -> HashSet<String> {
        self.issuer
            .sessions()
            .indexed_ids(user_id)
            .await
            .unwrap()
            .into_iter()
            .collect()
    }
}

fn client() -> ClientContext {
    ClientContext::new("203.0.113.7", CHROME_MAC)
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_creates_exactly_one_indexed_session() {
    let mut h = Harness::new();
    let account = h.register_alice().await;

    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let sid = h.sid(&pair);

    assert_eq!(pair.expires_in, 15 * 60);
    assert_eq!(pair.refresh_ttl, 7 * 24 * 60 * 60);
    assert_eq!(
        h.issuer.sessions().get_owner(sid).await.unwrap(),
        Some(account.id)
    );
    assert_eq!(h.indexed(account.id).await, HashSet::from([sid.to_string()]));
    assert_eq!(h.drain_audit(), vec![AuditAction::LoginSuccess]);
}

#[tokio::test]
async fn login_normalizes_email() {
    let mut h = Harness::new();
    h.register_alice().await;

    assert!(
        h.issuer
            .login("  ALICE@Example.com ", PASSWORD, &client())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn login_rejects_empty_fields() {
    let h = Harness::new();

    let err = h.issuer.login("  ", PASSWORD, &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));
    let err = h.issuer.login(EMAIL, "", &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));
}

#[tokio::test]
async fn wrong_password_and_unknown_account_look_the_same() {
    let mut h = Harness::new();
    h.register_alice().await;

    let wrong = h.issuer.login(EMAIL, "nope", &client()).await.unwrap_err();
    let unknown = h
        .issuer
        .login("bob@example.com", PASSWORD, &client())
        .await
        .unwrap_err();

    assert!(matches!(wrong, WardenError::InvalidCredentials));
    assert!(matches!(unknown, WardenError::InvalidCredentials));
    assert_eq!(
        h.drain_audit(),
        vec![AuditAction::LoginFailed, AuditAction::LoginFailed]
    );
}

#[tokio::test]
async fn session_records_client_metadata() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();

    let sessions = h.issuer.list_sessions(account.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(sessions[0].browser, Browser::Chrome);
    assert_eq!(sessions[0].os, Os::MacOs);
}

// ---------------------------------------------------------------------------
// Lockout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fifth_failure_locks_even_correct_password() {
    let mut h = Harness::new();
    h.register_alice().await;

    for _ in 0..5 {
        let err = h.issuer.login(EMAIL, "wrong", &client()).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidCredentials));
    }
    let audit = h.drain_audit();
    assert_eq!(
        audit
            .iter()
            .filter(|a| **a == AuditAction::LoginFailed)
            .count(),
        5
    );
    assert_eq!(audit.last(), Some(&AuditAction::AccountLocked));

    let err = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::AccountLocked));
    assert!(err.is_authentication_failure());
    assert_eq!(h.drain_audit(), vec![AuditAction::AccountLocked]);

    tokio::time::advance(Duration::from_secs(14 * 60)).await;
    let err = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::AccountLocked));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(h.issuer.login(EMAIL, PASSWORD, &client()).await.is_ok());
}

#[tokio::test]
async fn success_before_threshold_resets_failures() {
    let mut h = Harness::new();
    h.register_alice().await;

    for _ in 0..4 {
        h.issuer.login(EMAIL, "wrong", &client()).await.unwrap_err();
    }
    h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    for _ in 0..4 {
        h.issuer.login(EMAIL, "wrong", &client()).await.unwrap_err();
    }

    assert!(!h.issuer.guard().is_locked(EMAIL).await.unwrap());
    assert!(h.issuer.login(EMAIL, PASSWORD, &client()).await.is_ok());
}

#[tokio::test]
async fn unknown_accounts_lock_too() {
    let h = Harness::new();
    for _ in 0..5 {
        h.issuer
            .login("ghost@example.com", "guess", &client())
            .await
            .unwrap_err();
    }
    assert!(h.issuer.guard().is_locked("ghost@example.com").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn failures_spread_beyond_window_do_not_lock() {
    let mut h = Harness::new();
    h.register_alice().await;

    for _ in 0..4 {
        h.issuer.login(EMAIL, "wrong", &client()).await.unwrap_err();
    }
    tokio::time::advance(Duration::from_secs(10 * 60 + 1)).await;
    h.issuer.login(EMAIL, "wrong", &client()).await.unwrap_err();

    assert!(!h.issuer.guard().is_locked(EMAIL).await.unwrap());
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn login_rate_limit_uses_fixed_window() {
    let mut config = config();
    config.login_rate_limit = RateLimitPolicy::new(3, Duration::from_secs(60));
    let h = Harness::with_config(config);

    for _ in 0..3 {
        let err = h
            .issuer
            .login("x@example.com", "pw", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidCredentials));
    }
    let err = h
        .issuer
        .login("x@example.com", "pw", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::RateLimited { retry_after_secs } if retry_after_secs <= 60));

    // A different client has its own bucket.
    let other = ClientContext::new("198.51.100.1", "curl/8");
    assert!(matches!(
        h.issuer.login("x@example.com", "pw", &other).await,
        Err(WardenError::InvalidCredentials)
    ));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(matches!(
        h.issuer.login("y@example.com", "pw", &client()).await,
        Err(WardenError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn missing_ip_shares_one_bucket() {
    let mut config = config();
    config.login_rate_limit = RateLimitPolicy::new(1, Duration::from_secs(60));
    let h = Harness::with_config(config);
    let anonymous = ClientContext::default();

    h.issuer
        .login("x@example.com", "pw", &anonymous)
        .await
        .unwrap_err();
    let err = h
        .issuer
        .login("y@example.com", "pw", &anonymous)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::RateLimited { .. }));
}

// ---------------------------------------------------------------------------
// Refresh rotation and reuse detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_rotates_and_detects_reuse() {
    let mut h = Harness::new();
    let account = h.register_alice().await;

    let first = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let second = h.issuer.refresh(&first.refresh_token, &client()).await.unwrap();
    let (sid1, sid2) = (h.sid(&first), h.sid(&second));

    assert_ne!(sid1, sid2);
    assert!(h.issuer.sessions().get(sid1).await.unwrap().is_none());
    assert!(h.issuer.sessions().get(sid2).await.unwrap().is_some());
    assert_eq!(h.indexed(account.id).await, HashSet::from([sid2.to_string()]));
    h.drain_audit();

    let err = h
        .issuer
        .refresh(&first.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
    assert_eq!(
        h.drain_audit(),
        vec![AuditAction::RefreshTokenReuseDetected]
    );
    assert!(h.issuer.sessions().get(sid2).await.unwrap().is_some());

    // The rotated token keeps working.
    let third = h.issuer.refresh(&second.refresh_token, &client()).await.unwrap();
    assert!(h.issuer.verify_access(&third.access_token).is_ok());
}

#[tokio::test]
async fn concurrent_refresh_of_one_token_rotates_once() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.drain_audit();

    let ctx = client();
    let (a, b) = tokio::join!(
        h.issuer.refresh(&pair.refresh_token, &ctx),
        h.issuer.refresh(&pair.refresh_token, &ctx),
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    assert_eq!(h.indexed(account.id).await.len(), 1);
    assert_eq!(
        h.drain_audit(),
        vec![AuditAction::RefreshTokenReuseDetected]
    );
}

#[tokio::test]
async fn forged_or_mistyped_refresh_tokens_are_invalid_credentials() {
    let mut h = Harness::new();
    h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();

    for token in ["garbage", pair.access_token.as_str()] {
        let err = h.issuer.refresh(token, &client()).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidCredentials));
    }

    let foreign = JwtCodec::new(
        "attacker-access",
        "attacker-refresh",
        "warden-test",
        Duration::from_secs(60),
        Duration::from_secs(60),
    )
    .issue_refresh(Uuid::new_v4(), h.sid(&pair))
    .unwrap();
    let err = h.issuer.refresh(&foreign, &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
}

#[tokio::test]
async fn empty_refresh_token_is_invalid_input() {
    let h = Harness::new();
    let err = h.issuer.refresh("", &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_is_idempotent() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.drain_audit();

    h.issuer.logout(&pair.refresh_token, &client()).await.unwrap();
    assert!(h.indexed(account.id).await.is_empty());
    assert_eq!(h.drain_audit(), vec![AuditAction::Logout]);

    h.issuer.logout(&pair.refresh_token, &client()).await.unwrap();
    assert!(h.indexed(account.id).await.is_empty());
    assert!(h.drain_audit().is_empty());

    h.issuer.logout("not-a-token", &client()).await.unwrap();

    let err = h
        .issuer
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
}

#[tokio::test]
async fn logout_all_keeps_current_session() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pairs: Vec<TokenPair> = {
        let mut pairs = Vec::new();
        for _ in 0..3 {
            pairs.push(h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap());
        }
        pairs
    };
    h.drain_audit();

    let removed = h
        .issuer
        .logout_all_sessions(account.id, Some(&pairs[2].refresh_token), &client())
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(
        h.indexed(account.id).await,
        HashSet::from([h.sid(&pairs[2]).to_string()])
    );
    assert_eq!(h.drain_audit(), vec![AuditAction::LogoutAll]);
    assert!(h.issuer.refresh(&pairs[0].refresh_token, &client()).await.is_err());
    assert!(h.issuer.refresh(&pairs[2].refresh_token, &client()).await.is_ok());
}

#[tokio::test]
async fn logout_all_ignores_foreign_current_token() {
    let mut h = Harness::new();
    let alice = h.register_alice().await;
    h.issuer
        .register("bob@example.com", PASSWORD, Role::User, &client())
        .await
        .unwrap();

    h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let bob = h
        .issuer
        .login("bob@example.com", PASSWORD, &client())
        .await
        .unwrap();

    let removed = h
        .issuer
        .logout_all_sessions(alice.id, Some(&bob.refresh_token), &client())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(h.indexed(alice.id).await.is_empty());
    assert!(h.issuer.refresh(&bob.refresh_token, &client()).await.is_ok());
}

// ---------------------------------------------------------------------------
// Index consistency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn index_matches_live_sessions_after_mixed_operations() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let mut seen = Vec::new();

    let a = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let b = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let c = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    seen.extend([h.sid(&a), h.sid(&b), h.sid(&c)]);

    let a2 = h.issuer.refresh(&a.refresh_token, &client()).await.unwrap();
    seen.push(h.sid(&a2));
    h.issuer.logout(&b.refresh_token, &client()).await.unwrap();
    let c2 = h.issuer.refresh(&c.refresh_token, &client()).await.unwrap();
    seen.push(h.sid(&c2));
    h.issuer
        .refresh(&a.refresh_token, &client())
        .await
        .unwrap_err();
    let a3 = h.issuer.refresh(&a2.refresh_token, &client()).await.unwrap();
    seen.push(h.sid(&a3));

    let mut live = HashSet::new();
    for sid in &seen {
        if h.issuer.sessions().get(*sid).await.unwrap().is_some() {
            live.insert(sid.to_string());
        }
    }

    assert_eq!(h.indexed(account.id).await, live);
    assert_eq!(live.len(), 2);
    assert_eq!(h.issuer.list_sessions(account.id).await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Registration, listing, access tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_validates_and_rejects_duplicates() {
    let mut h = Harness::new();
    h.register_alice().await;

    let err = h
        .issuer
        .register("Alice@Example.com", PASSWORD, Role::User, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AccountExists));

    let err = h
        .issuer
        .register("carol@example.com", "short", Role::User, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));

    let err = h
        .issuer
        .register("not-an-email", PASSWORD, Role::User, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));
}

#[tokio::test]
async fn register_audits_and_stores_hash_only() {
    let mut h = Harness::new();
    let account = h
        .issuer
        .register(EMAIL, PASSWORD, Role::Admin, &client())
        .await
        .unwrap();

    assert_eq!(account.email, EMAIL);
    assert!(account.password_hash.starts_with("$argon2id$"));
    assert_eq!(h.drain_audit(), vec![AuditAction::Registered]);
}

#[tokio::test]
async fn accounts_can_be_listed_by_role() {
    let mut h = Harness::new();
    h.register_alice().await;
    h.issuer
        .register("root@example.com", PASSWORD, Role::Admin, &client())
        .await
        .unwrap();

    assert_eq!(h.issuer.list_accounts().await.unwrap().len(), 2);
    let admins = h.issuer.list_accounts_by_role(Role::Admin).await.unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].email, "root@example.com");
}

#[tokio::test]
async fn access_token_carries_identity_and_role() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();

    let claims = h.issuer.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.sub, account.id);
    assert_eq!(claims.email, EMAIL);
    assert!(claims.has_role(&[Role::User]));
    assert!(!claims.has_role(&[Role::Admin]));

    let err = h.issuer.verify_access(&pair.refresh_token).unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn password_reset_revokes_sessions_and_is_single_use() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.drain_audit();

    let token = h
        .issuer
        .request_password_reset(EMAIL)
        .await
        .unwrap()
        .unwrap();
    h.issuer
        .reset_password(&token, "a brand new passphrase", &client())
        .await
        .unwrap();

    assert!(h.indexed(account.id).await.is_empty());
    assert_eq!(h.drain_audit(), vec![AuditAction::PasswordReset]);
    assert!(h.issuer.refresh(&pair.refresh_token, &client()).await.is_err());
    assert!(h.issuer.login(EMAIL, PASSWORD, &client()).await.is_err());
    assert!(
        h.issuer
            .login(EMAIL, "a brand new passphrase", &client())
            .await
            .is_ok()
    );

    let err = h
        .issuer
        .reset_password(&token, "yet another passphrase", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
}

#[tokio::test]
async fn reset_for_unknown_email_issues_nothing() {
    let h = Harness::new();
    assert!(
        h.issuer
            .request_password_reset("ghost@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn weak_reset_password_keeps_token() {
    let mut h = Harness::new();
    h.register_alice().await;
    let token = h
        .issuer
        .request_password_reset(EMAIL)
        .await
        .unwrap()
        .unwrap();

    let err = h
        .issuer
        .reset_password(&token, "short", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidInput { .. }));
    assert!(
        h.issuer
            .reset_password(&token, "long enough now", &client())
            .await
            .is_ok()
    );
}

// ---------------------------------------------------------------------------
// Single-session revoke
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revoke_session_ends_only_that_session() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let laptop = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let phone = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.drain_audit();

    h.issuer
        .revoke_session(account.id, h.sid(&laptop), &client())
        .await
        .unwrap();

    assert_eq!(h.indexed(account.id).await, HashSet::from([h.sid(&phone).to_string()]));
    assert_eq!(h.drain_audit(), vec![AuditAction::Logout]);

    let err = h
        .issuer
        .refresh(&laptop.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));
    h.issuer.refresh(&phone.refresh_token, &client()).await.unwrap();
}

#[tokio::test]
async fn revoke_session_rejects_foreign_session() {
    let mut h = Harness::new();
    let alice = h.register_alice().await;
    let bob = h
        .issuer
        .register("bob@example.com", PASSWORD, Role::User, &client())
        .await
        .unwrap();
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.drain_audit();

    let err = h
        .issuer
        .revoke_session(bob.id, h.sid(&pair), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidCredentials));

    assert_eq!(h.indexed(alice.id).await, HashSet::from([h.sid(&pair).to_string()]));
    assert!(h.drain_audit().is_empty());
    h.issuer.refresh(&pair.refresh_token, &client()).await.unwrap();
}

#[tokio::test]
async fn revoke_of_unknown_session_is_not_found() {
    let mut h = Harness::new();
    let account = h.register_alice().await;
    let pair = h.issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    h.issuer
        .revoke_session(account.id, h.sid(&pair), &client())
        .await
        .unwrap();

    let err = h
        .issuer
        .revoke_session(account.id, h.sid(&pair), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let err = h
        .issuer
        .revoke_session(account.id, Uuid::new_v4(), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
    assert!(h.indexed(account.id).await.is_empty());
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_rotation_keeps_session_and_can_be_retried() {
    let store = FlakyBatchStore::default();
    let (sink, mut audit) = AuditSink::channel(64);
    let issuer =
        CredentialIssuer::new(InMemoryAccounts::default(), store.clone(), sink, config()).unwrap();
    let codec = JwtCodec::from_config(&config());
    let account = issuer
        .register(EMAIL, PASSWORD, Role::User, &client())
        .await
        .unwrap();
    let pair = issuer.login(EMAIL, PASSWORD, &client()).await.unwrap();
    let sid = codec.decode_refresh(&pair.refresh_token).unwrap().sid;
    while audit.try_recv().is_ok() {}

    store.failing.store(true, Ordering::SeqCst);
    let err = issuer
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::StoreUnavailable(_)));
    assert!(issuer.sessions().get(sid).await.unwrap().is_some());
    assert_eq!(
        issuer.sessions().indexed_ids(account.id).await.unwrap(),
        vec![sid.to_string()]
    );

    store.failing.store(false, Ordering::SeqCst);
    let rotated = issuer.refresh(&pair.refresh_token, &client()).await.unwrap();
    let new_sid = codec.decode_refresh(&rotated.refresh_token).unwrap().sid;
    assert!(issuer.sessions().get(sid).await.unwrap().is_none());
    assert_eq!(
        issuer.sessions().indexed_ids(account.id).await.unwrap(),
        vec![new_sid.to_string()]
    );

    let mut actions = Vec::new();
    while let Ok(event) = audit.try_recv() {
        actions.push(event.action);
    }
    assert!(!actions.contains(&AuditAction::RefreshTokenReuseDetected));
}

#[tokio::test]
async fn store_outage_is_not_an_auth_failure() {
    let accounts = InMemoryAccounts::default();
    let healthy = CredentialIssuer::new(
        accounts.clone(),
        MemoryCounterStore::new(),
        AuditSink::disabled(),
        config(),
    )
    .unwrap();
    healthy
        .register(EMAIL, PASSWORD, Role::User, &client())
        .await
        .unwrap();
    let pair = healthy.login(EMAIL, PASSWORD, &client()).await.unwrap();

    let broken =
        CredentialIssuer::new(accounts, DownStore, AuditSink::disabled(), config()).unwrap();

    let err = broken.login(EMAIL, PASSWORD, &client()).await.unwrap_err();
    assert!(matches!(err, WardenError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    let err = broken
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::StoreUnavailable(_)));

    let err = broken
        .logout(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::StoreUnavailable(_)));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let result = CredentialIssuer::new(
        InMemoryAccounts::default(),
        MemoryCounterStore::new(),
        AuditSink::disabled(),
        AuthConfig::default(),
    );
    assert!(matches!(result, Err(WardenError::InvalidInput { .. })));
}
