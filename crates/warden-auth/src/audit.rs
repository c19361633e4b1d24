//! Non-blocking audit sink.
//!
//! Events go into a bounded queue drained by one background task.
//! Submission never waits and never fails: a full or closed queue, or a
//! writer error, is logged and the event is dropped.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditAction, AuditEvent};
use warden_core::repository::AuditLogRepository;

use crate::device::ClientContext;

/// Destination for drained audit events.
pub trait AuditWriter: Send + Sync + 'static {
    fn write(&self, event: AuditEvent) -> impl Future<Output = WardenResult<()>> + Send;
}

/// Emits each event as an `info` record on target `warden::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditWriter;

impl AuditWriter for TracingAuditWriter {
    async fn write(&self, event: AuditEvent) -> WardenResult<()> {
        info!(
            target: "warden::audit",
            action = %event.action,
            user_id = ?event.user_id,
            ip = ?event.ip_address,
            user_agent = ?event.user_agent,
            timestamp = %event.timestamp,
            "audit"
        );
        Ok(())
    }
}

/// Persists events through an [`AuditLogRepository`].
#[derive(Clone)]
pub struct RepositoryAuditWriter<R: AuditLogRepository> {
    repo: R,
}

impl<R: AuditLogRepository> RepositoryAuditWriter<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

impl<R: AuditLogRepository + 'static> AuditWriter for RepositoryAuditWriter<R> {
    async fn write(&self, event: AuditEvent) -> WardenResult<()> {
        self.repo.append(event).await.map(|_| ())
    }
}

#[derive(Clone)]
pub struct AuditSink {
    tx: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditSink {
    /// Start a drain task feeding `writer`. The task ends once every
    /// clone of the sink is dropped and the queue is empty.
    pub fn spawn<W: AuditWriter>(writer: W, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sink, mut rx) = Self::channel(capacity);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let action = event.action;
                if let Err(e) = writer.write(event).await {
                    warn!(action = %action, error = %e, "Audit write failed, event dropped");
                }
            }
        });
        (sink, handle)
    }

    /// A sink whose queue the caller drains directly.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn submit(&self, event: AuditEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(action = %event.action, "Audit queue full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(action = %event.action, "Audit queue closed, event dropped");
            }
        }
    }

    pub fn log(&self, action: AuditAction, user_id: Option<Uuid>, client: &ClientContext) {
        self.submit(AuditEvent::new(
            action,
            user_id,
            client.ip.clone(),
            client.user_agent.clone(),
        ));
    }
}
