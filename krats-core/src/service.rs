//! The core service: a single worker that owns encryption and audit calls
//! made on behalf of background tasks.
//!
//! Background tasks hold a cloneable [`CoreHandle`] and talk to the worker
//! over a bounded channel; replies come back on a oneshot per request.
//! The worker runs on tokio's blocking pool because every request ends in
//! CPU-bound cipher work or a synchronous SQLite write.

use crate::error::{ServiceError, ServiceResult};
use krats_crypto::{EncryptedField, EncryptionResult, FieldEncryptor};
use krats_types::{ActorId, AuditAction, AuditEntry, AuditOutcome, AuditSink, AuditWriteError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// A request to the core service.
#[derive(Debug)]
pub enum CoreRequest {
    Encrypt {
        plaintext: String,
        reply: oneshot::Sender<EncryptionResult<EncryptedField>>,
    },
    Decrypt {
        field: EncryptedField,
        reply: oneshot::Sender<EncryptionResult<String>>,
    },
    Audit {
        entry: AuditEntry,
        reply: oneshot::Sender<Result<u64, AuditWriteError>>,
    },
    /// A session went idle; audited and broadcast as [`CoreEvent::SessionExpired`].
    SessionExpired { actor: ActorId },
}

/// Notifications broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    SessionExpired { actor: ActorId },
}

/// The worker side of the channel.
pub struct CoreService {
    rx: mpsc::Receiver<CoreRequest>,
    encryptor: std::sync::Arc<dyn FieldEncryptor>,
    audit: std::sync::Arc<dyn AuditSink>,
    events: broadcast::Sender<CoreEvent>,
}

impl CoreService {
    /// Creates the service and its first handle. The service stops once
    /// every handle has been dropped.
    #[must_use]
    pub fn new(
        encryptor: std::sync::Arc<dyn FieldEncryptor>,
        audit: std::sync::Arc<dyn AuditSink>,
        capacity: usize,
    ) -> (Self, CoreHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = CoreHandle {
            tx,
            events: events.clone(),
        };
        (
            Self {
                rx,
                encryptor,
                audit,
                events,
            },
            handle,
        )
    }

    /// Creates a service over a bootstrapped context.
    #[must_use]
    pub fn for_context(context: &crate::TrustContext) -> (Self, CoreHandle) {
        Self::new(
            context.encryption().clone(),
            context.audit_sink(),
            context.config().service.channel_capacity,
        )
    }

    /// Runs the worker on the blocking pool until every handle is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run_blocking())
    }

    fn run_blocking(mut self) {
        info!("Core service started");
        while let Some(request) = self.rx.blocking_recv() {
            self.handle(request);
        }
        info!("Core service stopped");
    }

    fn handle(&self, request: CoreRequest) {
        match request {
            CoreRequest::Encrypt { plaintext, reply } => {
                let _ = reply.send(self.encryptor.encrypt_field(&plaintext));
            }
            CoreRequest::Decrypt { field, reply } => {
                let _ = reply.send(self.encryptor.decrypt_field(&field));
            }
            CoreRequest::Audit { entry, reply } => {
                let _ = reply.send(self.audit.record(entry));
            }
            CoreRequest::SessionExpired { actor } => {
                info!("Session expired for {}", actor);
                let entry = AuditEntry::new(
                    actor.clone(),
                    AuditAction::SessionExpired,
                    actor.as_str(),
                    AuditOutcome::Success,
                );
                if let Err(e) = self.audit.record(entry) {
                    warn!("Audit write failed, continuing: {}", e);
                }
                if self.events.send(CoreEvent::SessionExpired { actor }).is_err() {
                    debug!("No subscribers for session expiry");
                }
            }
        }
    }
}

/// Client side of the core service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CoreHandle {
    tx: mpsc::Sender<CoreRequest>,
    events: broadcast::Sender<CoreEvent>,
}

impl CoreHandle {
    /// Encrypts `plaintext` on the service worker.
    pub async fn encrypt(&self, plaintext: impl Into<String>) -> ServiceResult<EncryptedField> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreRequest::Encrypt {
            plaintext: plaintext.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| ServiceError::Closed)?
            .map_err(ServiceError::from)
    }

    /// Decrypts `field` on the service worker.
    pub async fn decrypt(&self, field: EncryptedField) -> ServiceResult<String> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreRequest::Decrypt { field, reply }).await?;
        rx.await
            .map_err(|_| ServiceError::Closed)?
            .map_err(ServiceError::from)
    }

    /// Appends `entry` to the audit log and returns its sequence number.
    pub async fn audit(&self, entry: AuditEntry) -> ServiceResult<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreRequest::Audit { entry, reply }).await?;
        rx.await
            .map_err(|_| ServiceError::Closed)?
            .map_err(ServiceError::from)
    }

    /// Reports that `actor`'s session timed out.
    pub async fn session_expired(&self, actor: ActorId) -> ServiceResult<()> {
        self.send(CoreRequest::SessionExpired { actor }).await
    }

    /// Subscribes to core events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, request: CoreRequest) -> ServiceResult<()> {
        self.tx.send(request).await.map_err(|_| ServiceError::Closed)
    }
}
