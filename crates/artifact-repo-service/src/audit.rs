//! Audit trail for content mutations
//!
//! Every mutating content operation produces an [`AuditEvent`] naming the
//! acting principal. The principal travels with the task that performs the
//! operation (see [`with_principal`]) rather than through every signature.

use artifact_repo_core::{AuditAction, AuditEvent, RepositoryId, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Principal recorded when no user is attached to the current task
pub const GUEST_PRINCIPAL: &str = "guest";

tokio::task_local! {
    static PRINCIPAL: String;
}

/// Run `fut` with `principal` as the acting user for audit events
pub async fn with_principal<F>(principal: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    PRINCIPAL.scope(principal.into(), fut).await
}

/// The acting user of the current task
pub fn current_principal() -> String {
    PRINCIPAL
        .try_with(|p| p.clone())
        .unwrap_or_else(|_| GUEST_PRINCIPAL.to_string())
}

/// Receiver of audit events
#[async_trait]
pub trait AuditListener: Send + Sync {
    async fn audit_event(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes audit events to the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuditListener;

#[async_trait]
impl AuditListener for LoggingAuditListener {
    async fn audit_event(&self, event: &AuditEvent) -> Result<()> {
        info!(
            target: "audit",
            repository = %event.repository_id,
            principal = %event.principal,
            action = %event.action,
            path = %event.resource_path,
            "{}",
            event
        );
        Ok(())
    }
}

/// Fans audit events out to the registered listeners
#[derive(Default)]
pub struct AuditDispatcher {
    listeners: RwLock<Vec<Arc<dyn AuditListener>>>,
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl AuditDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn AuditListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver to every listener; a failing listener does not fail the
    /// operation that produced the event
    pub async fn dispatch(&self, event: AuditEvent) {
        let listeners: Vec<Arc<dyn AuditListener>> = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.audit_event(&event).await {
                warn!(error = %e, event = %event, "Audit listener failed");
            }
        }
    }

    /// Record `action` on `path` by the current principal
    pub async fn emit(&self, repository: &RepositoryId, path: &str, action: AuditAction) {
        let event = AuditEvent::new(repository.clone(), current_principal(), path, action);
        self.dispatch(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_repo_core::RepositoryError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<AuditEvent>>);

    #[async_trait]
    impl AuditListener for Recording {
        async fn audit_event(&self, event: &AuditEvent) -> Result<()> {
            self.0.lock().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl AuditListener for Failing {
        async fn audit_event(&self, _event: &AuditEvent) -> Result<()> {
            Err(RepositoryError::Internal("listener down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_principal_defaults_to_guest() {
        assert_eq!(current_principal(), GUEST_PRINCIPAL);
        let inside = with_principal("alice", async { current_principal() }).await;
        assert_eq!(inside, "alice");
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let dispatcher = AuditDispatcher::new();
        let recording = Arc::new(Recording::default());
        dispatcher.add_listener(Arc::new(Failing));
        dispatcher.add_listener(recording.clone());

        let repo = RepositoryId::new("internal").unwrap();
        with_principal(
            "deployer",
            dispatcher.emit(&repo, "com/example/foo.jar", AuditAction::UploadFile),
        )
        .await;

        let events = recording.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].principal, "deployer");
        assert_eq!(events[0].action, AuditAction::UploadFile);
    }
}
