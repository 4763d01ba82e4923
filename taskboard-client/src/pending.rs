use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskboard_core::{BoardError, BoardResult, EntityRef};
use tokio::task::JoinHandle;

enum PendingState<T> {
    Settled(BoardResult<T>),
    Spawned(JoinHandle<BoardResult<T>>),
}

/// Handle to an operation whose local effect is already applied.
///
/// Awaiting [`Pending::confirmed`] yields the outcome of the remote round
/// trip. Dropping the handle does not cancel anything.
pub struct Pending<T> {
    state: PendingState<T>,
    alert: Arc<AtomicBool>,
    entity: Option<EntityRef>,
}

impl<T> Pending<T> {
    /// An operation that needed no remote call.
    pub(crate) fn settled(value: T) -> Self {
        Self {
            state: PendingState::Settled(Ok(value)),
            alert: Arc::new(AtomicBool::new(false)),
            entity: None,
        }
    }

    pub(crate) fn spawned(
        handle: JoinHandle<BoardResult<T>>,
        alert: Arc<AtomicBool>,
        entity: EntityRef,
    ) -> Self {
        Self {
            state: PendingState::Spawned(handle),
            alert,
            entity: Some(entity),
        }
    }

    /// The entity the operation applied to locally. For creations this is
    /// the provisional id; `None` for operations that made no change.
    pub fn entity(&self) -> Option<EntityRef> {
        self.entity
    }

    /// True when no remote call was made.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, PendingState::Settled(_))
    }

    /// Lets the operation finish in the background without raising a
    /// notification if it fails. Rollback still happens.
    pub fn detach(self) {
        self.alert.store(false, Ordering::SeqCst);
    }

    pub async fn confirmed(self) -> BoardResult<T> {
        match self.state {
            PendingState::Settled(result) => result,
            PendingState::Spawned(handle) => handle
                .await
                .map_err(|e| BoardError::InvalidState(format!("confirmation task failed: {}", e)))?,
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("entity", &self.entity)
            .field("settled", &self.is_settled())
            .field("alert", &self.alert.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settled_resolves_immediately() {
        let pending = Pending::settled(5);
        assert!(pending.is_settled());
        assert_eq!(pending.entity(), None);
        assert_eq!(pending.confirmed().await, Ok(5));
    }

    #[tokio::test]
    async fn test_detach_clears_alert() {
        let alert = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(async { Ok::<_, BoardError>(()) });
        let entity = EntityRef::List(taskboard_core::ListId(-1));
        let pending = Pending::spawned(handle, alert.clone(), entity);
        assert!(!pending.is_settled());
        assert_eq!(pending.entity(), Some(entity));

        pending.detach();
        assert!(!alert.load(Ordering::SeqCst));
    }
}
