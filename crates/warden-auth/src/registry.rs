//! Server-side session records and the per-user session index.
//!
//! Layout: `session:{sid}` holds the JSON-encoded [`Session`] with the
//! refresh lifetime as TTL; `user_sessions:{uid}` is the set of that
//! user's session IDs. Every mutation touching both goes through one
//! atomic [`WriteBatch`].

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::session::{ClientInfo, Session, SessionSummary};
use warden_core::store::{CounterStore, WriteBatch};

pub fn session_key(session_id: impl fmt::Display) -> String {
    format!("session:{session_id}")
}

pub fn index_key(user_id: Uuid) -> String {
    format!("user_sessions:{user_id}")
}

fn encode(session: &Session) -> WardenResult<String> {
    serde_json::to_string(session)
        .map_err(|e| WardenError::Internal(format!("session encode: {e}")))
}

fn decode(raw: &str) -> WardenResult<Session> {
    serde_json::from_str(raw).map_err(|e| WardenError::Internal(format!("session decode: {e}")))
}

/// Outcome of [`SessionRegistry::rotate`].
#[derive(Debug, Clone)]
pub enum Rotation {
    Rotated(Session),
    /// The old session was already gone: expired, revoked or rotated.
    Missing,
    /// The old record belonged to another user. Nothing remains of the
    /// new session.
    OwnerMismatch,
}

#[derive(Clone)]
pub struct SessionRegistry<S: CounterStore> {
    store: S,
}

impl<S: CounterStore> SessionRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn insert_ops(
        batch: WriteBatch,
        session: &Session,
        raw: String,
        ttl: Duration,
    ) -> WriteBatch {
        let index = index_key(session.user_id);
        batch
            .set_with_ttl(session_key(session.id), raw, ttl)
            .add_to_set(index.clone(), session.id.to_string())
            .expire(index, ttl)
    }

    /// Write the session record and index it, refreshing the index TTL.
    pub async fn create(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        ttl: Duration,
        client: ClientInfo,
    ) -> WardenResult<Session> {
        let session = Session {
            id: session_id,
            user_id,
            created_at: Utc::now(),
            client,
        };
        let raw = encode(&session)?;
        self.store
            .apply(Self::insert_ops(WriteBatch::new(), &session, raw, ttl))
            .await?;
        debug!(user_id = %user_id, session_id = %session_id, "Session created");
        Ok(session)
    }

    /// `Ok(None)` if the session is absent or expired.
    pub async fn get(&self, session_id: Uuid) -> WardenResult<Option<Session>> {
        match self.store.get(&session_key(session_id)).await? {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_owner(&self, session_id: Uuid) -> WardenResult<Option<Uuid>> {
        Ok(self.get(session_id).await?.map(|s| s.user_id))
    }

    /// Replace session `old_id` of `user_id` with a fresh session
    /// `new_id` in one atomic store step.
    ///
    /// Of several concurrent callers for the same `old_id` at most one
    /// gets [`Rotation::Rotated`]; the rest see [`Rotation::Missing`] and
    /// nothing is written for them. A failed call changes nothing.
    pub async fn rotate(
        &self,
        old_id: Uuid,
        user_id: Uuid,
        new_id: Uuid,
        ttl: Duration,
        client: ClientInfo,
    ) -> WardenResult<Rotation> {
        let session = Session {
            id: new_id,
            user_id,
            created_at: Utc::now(),
            client,
        };
        let raw = encode(&session)?;
        let batch = WriteBatch::new().remove_from_set(index_key(user_id), old_id.to_string());
        let batch = Self::insert_ops(batch, &session, raw, ttl);

        let Some(taken) = self
            .store
            .take_and_apply(&session_key(old_id), batch)
            .await?
        else {
            return Ok(Rotation::Missing);
        };

        let old = decode(&taken)?;
        if old.user_id != user_id {
            // Undo: the new session must not outlive a mismatched claim.
            let undo = WriteBatch::new()
                .delete(session_key(new_id))
                .remove_from_set(index_key(user_id), new_id.to_string())
                .remove_from_set(index_key(old.user_id), old_id.to_string());
            self.store.apply(undo).await?;
            return Ok(Rotation::OwnerMismatch);
        }

        debug!(
            user_id = %user_id,
            old_session_id = %old_id,
            session_id = %new_id,
            "Session rotated"
        );
        Ok(Rotation::Rotated(session))
    }

    /// Remove one session. Returns `true` if a live record was removed;
    /// deleting an absent session is not an error and still clears any
    /// leftover index entry.
    pub async fn delete(&self, session_id: Uuid, user_id: Uuid) -> WardenResult<bool> {
        let index = index_key(user_id);
        let member = session_id.to_string();
        let unindex = WriteBatch::new().remove_from_set(index.clone(), member.clone());

        let removed = self
            .store
            .take_and_apply(&session_key(session_id), unindex)
            .await?
            .is_some();
        if !removed {
            self.store.remove_from_set(&index, &member).await?;
        }
        Ok(removed)
    }

    /// Remove every indexed session of `user_id` except `keep`.
    /// Returns how many index entries were removed.
    pub async fn delete_all_for_user(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
    ) -> WardenResult<usize> {
        let index = index_key(user_id);
        let keep = keep.map(|k| k.to_string());

        let mut batch = WriteBatch::new();
        let mut removed = 0;
        for member in self.store.members(&index).await? {
            if keep.as_deref() == Some(member.as_str()) {
                continue;
            }
            batch = batch
                .delete(session_key(&member))
                .remove_from_set(index.clone(), member);
            removed += 1;
        }
        self.store.apply(batch).await?;
        debug!(user_id = %user_id, removed, "Sessions revoked");
        Ok(removed)
    }

    /// Live sessions of `user_id` in index order.
    ///
    /// IDs whose record has already expired are skipped and pruned from
    /// the index.
    pub async fn list_for_user(&self, user_id: Uuid) -> WardenResult<Vec<SessionSummary>> {
        let index = index_key(user_id);
        let mut sessions = Vec::new();
        let mut stale = WriteBatch::new();

        for member in self.store.members(&index).await? {
            let Ok(session_id) = Uuid::parse_str(&member) else {
                stale = stale.remove_from_set(index.clone(), member);
                continue;
            };
            match self.get(session_id).await? {
                Some(session) => sessions.push(SessionSummary::from(session)),
                None => stale = stale.remove_from_set(index.clone(), member),
            }
        }

        if !stale.is_empty() {
            debug!(
                user_id = %user_id,
                stale = stale.len(),
                "Pruning expired sessions from index"
            );
            self.store.apply(stale).await?;
        }
        Ok(sessions)
    }

    /// Raw index members, for consistency checks.
    pub async fn indexed_ids(&self, user_id: Uuid) -> WardenResult<Vec<String>> {
        self.store.members(&index_key(user_id)).await
    }
}
