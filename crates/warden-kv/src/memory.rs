//! Process-local counter store.
//!
//! Mirrors the Redis semantics the auth layer relies on: lazy expiry,
//! `INCR` from zero, sets that vanish when emptied, and all-or-nothing
//! batches. Expiry uses [`tokio::time::Instant`] so tests can drive it
//! with a paused clock.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use warden_core::error::WardenResult;
use warden_core::store::{CounterStore, WriteBatch, WriteOp};

use crate::error::KvError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Set,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn kind(&self) -> Kind {
        match self.value {
            Value::Str(_) => Kind::Str,
            Value::Set(_) => Kind::Set,
        }
    }
}

type Map = HashMap<String, Entry>;

/// In-memory [`CounterStore`]. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    entries: Arc<RwLock<Map>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|_, e| e.is_live(now));
        before - map.len()
    }
}

fn purge_if_expired(map: &mut Map, key: &str, now: Instant) {
    if map.get(key).is_some_and(|e| !e.is_live(now)) {
        map.remove(key);
    }
}

/// Remove `key` if it has expired; return the live entry otherwise.
fn live_mut<'a>(map: &'a mut Map, key: &str, now: Instant) -> Option<&'a mut Entry> {
    purge_if_expired(map, key, now);
    map.get_mut(key)
}

fn live<'a>(map: &'a Map, key: &str, now: Instant) -> Option<&'a Entry> {
    map.get(key).filter(|e| e.is_live(now))
}

fn set_string(map: &mut Map, key: &str, value: String, ttl: Duration, now: Instant) {
    map.insert(
        key.to_string(),
        Entry {
            value: Value::Str(value),
            expires_at: Some(now + ttl),
        },
    );
}

fn set_expiry(map: &mut Map, key: &str, ttl: Duration, now: Instant) -> bool {
    match live_mut(map, key, now) {
        Some(entry) => {
            entry.expires_at = Some(now + ttl);
            true
        }
        None => false,
    }
}

fn set_add(map: &mut Map, key: &str, member: &str, now: Instant) -> Result<(), KvError> {
    match live_mut(map, key, now) {
        Some(Entry {
            value: Value::Set(set),
            ..
        }) => {
            set.insert(member.to_string());
            Ok(())
        }
        Some(_) => Err(KvError::WrongType(key.to_string())),
        None => {
            map.insert(
                key.to_string(),
                Entry {
                    value: Value::Set(BTreeSet::from([member.to_string()])),
                    expires_at: None,
                },
            );
            Ok(())
        }
    }
}

fn set_remove(map: &mut Map, key: &str, member: &str, now: Instant) -> Result<(), KvError> {
    let emptied = match live_mut(map, key, now) {
        Some(Entry {
            value: Value::Set(set),
            ..
        }) => {
            set.remove(member);
            set.is_empty()
        }
        Some(_) => return Err(KvError::WrongType(key.to_string())),
        None => false,
    };
    if emptied {
        map.remove(key);
    }
    Ok(())
}

fn remove(map: &mut Map, key: &str, now: Instant) -> bool {
    map.remove(key).is_some_and(|e| e.is_live(now))
}

/// Reject a batch up front if any op would hit a wrong-typed key, so
/// that applying it afterwards cannot fail halfway.
fn check_batch(map: &Map, ops: &[WriteOp], now: Instant) -> Result<(), KvError> {
    let mut kinds: HashMap<&str, Option<Kind>> = HashMap::new();
    for op in ops {
        let key = match op {
            WriteOp::SetWithTtl { key, .. }
            | WriteOp::Expire { key, .. }
            | WriteOp::AddToSet { key, .. }
            | WriteOp::RemoveFromSet { key, .. }
            | WriteOp::Delete { key } => key.as_str(),
        };
        let current = *kinds
            .entry(key)
            .or_insert_with(|| live(map, key, now).map(Entry::kind));
        let next = match op {
            WriteOp::SetWithTtl { .. } => Some(Kind::Str),
            WriteOp::Delete { .. } => None,
            WriteOp::Expire { .. } => current,
            WriteOp::AddToSet { .. } | WriteOp::RemoveFromSet { .. } => {
                if current == Some(Kind::Str) {
                    return Err(KvError::WrongType(key.to_string()));
                }
                // A remove may empty the set; treat it as still possibly present.
                Some(Kind::Set)
            }
        };
        kinds.insert(key, next);
    }
    Ok(())
}

/// Apply ops already accepted by [`check_batch`].
fn apply_ops(map: &mut Map, ops: Vec<WriteOp>, now: Instant) -> Result<(), KvError> {
    for op in ops {
        match op {
            WriteOp::SetWithTtl { key, value, ttl } => set_string(map, &key, value, ttl, now),
            WriteOp::Expire { key, ttl } => {
                set_expiry(map, &key, ttl, now);
            }
            WriteOp::AddToSet { key, member } => set_add(map, &key, &member, now)?,
            WriteOp::RemoveFromSet { key, member } => set_remove(map, &key, &member, now)?,
            WriteOp::Delete { key } => {
                remove(map, &key, now);
            }
        }
    }
    Ok(())
}

impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        let now = Instant::now();
        let map = self.entries.read().await;
        match live(&map, key, now) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(KvError::WrongType(key.to_string()).into()),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        set_string(&mut map, key, value.to_string(), ttl, now);
        Ok(())
    }

    async fn incr(&self, key: &str) -> WardenResult<i64> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        purge_if_expired(&mut map, key, now);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Str("0".into()),
            expires_at: None,
        });
        let Value::Str(raw) = &mut entry.value else {
            return Err(KvError::WrongType(key.to_string()).into());
        };
        let next = raw
            .parse::<i64>()
            .map_err(|_| KvError::NotAnInteger(key.to_string()))?
            + 1;
        *raw = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> WardenResult<bool> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        Ok(set_expiry(&mut map, key, ttl, now))
    }

    async fn ttl(&self, key: &str) -> WardenResult<Option<Duration>> {
        let now = Instant::now();
        let map = self.entries.read().await;
        Ok(live(&map, key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn add_to_set(&self, key: &str, member: &str) -> WardenResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        set_add(&mut map, key, member, now)?;
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> WardenResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        set_remove(&mut map, key, member, now)?;
        Ok(())
    }

    async fn members(&self, key: &str) -> WardenResult<Vec<String>> {
        let now = Instant::now();
        let map = self.entries.read().await;
        match live(&map, key, now) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(KvError::WrongType(key.to_string()).into()),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, keys: &[String]) -> WardenResult<u64> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        Ok(keys.iter().filter(|k| remove(&mut map, k, now)).count() as u64)
    }

    async fn exists(&self, key: &str) -> WardenResult<bool> {
        let now = Instant::now();
        let map = self.entries.read().await;
        Ok(live(&map, key, now).is_some())
    }

    async fn take(&self, key: &str) -> WardenResult<Option<String>> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        purge_if_expired(&mut map, key, now);
        match map.get(key).map(Entry::kind) {
            Some(Kind::Str) => match map.remove(key) {
                Some(Entry {
                    value: Value::Str(s),
                    ..
                }) => Ok(Some(s)),
                _ => Ok(None),
            },
            Some(Kind::Set) => Err(KvError::WrongType(key.to_string()).into()),
            None => Ok(None),
        }
    }

    async fn apply(&self, batch: WriteBatch) -> WardenResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        check_batch(&map, batch.ops(), now)?;
        apply_ops(&mut map, batch.into_ops(), now)?;
        Ok(())
    }

    async fn take_and_apply(&self, key: &str, batch: WriteBatch) -> WardenResult<Option<String>> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        purge_if_expired(&mut map, key, now);
        match map.get(key).map(Entry::kind) {
            Some(Kind::Str) => {}
            Some(Kind::Set) => return Err(KvError::WrongType(key.to_string()).into()),
            None => return Ok(None),
        }
        check_batch(&map, batch.ops(), now)?;

        let taken = match map.remove(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => s,
            _ => return Ok(None),
        };
        apply_ops(&mut map, batch.into_ops(), now)?;
        Ok(Some(taken))
    }
}
