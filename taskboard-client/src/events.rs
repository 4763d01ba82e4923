//! Event dispatch for UI consumers.
//!
//! Events can be emitted from any thread or spawned task, but callbacks run
//! only inside `process_events()` on the thread that registered them.

use std::sync::{mpsc, Mutex};
use std::thread::{self, ThreadId};
use taskboard_core::EntityRef;

use crate::errors::{ClientError, ClientResult};
use crate::notifications::{MutationKind, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    BoardChanged,
    EntityReconciled,
    SyncConfirmed,
    RolledBack,
    SyncFailed,
    RefreshDeferred,
    RefreshCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Local state changed; re-render from the store.
    BoardChanged { revision: u64 },
    /// A provisional id was replaced by the server-assigned id.
    EntityReconciled {
        provisional: EntityRef,
        confirmed: EntityRef,
    },
    SyncConfirmed {
        operation: MutationKind,
        entity: EntityRef,
    },
    RolledBack {
        operation: MutationKind,
        entity: EntityRef,
        error: String,
    },
    SyncFailed { notification: Notification },
    RefreshDeferred,
    RefreshCompleted { list_count: usize },
}

impl BoardEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            BoardEvent::BoardChanged { .. } => EventType::BoardChanged,
            BoardEvent::EntityReconciled { .. } => EventType::EntityReconciled,
            BoardEvent::SyncConfirmed { .. } => EventType::SyncConfirmed,
            BoardEvent::RolledBack { .. } => EventType::RolledBack,
            BoardEvent::SyncFailed { .. } => EventType::SyncFailed,
            BoardEvent::RefreshDeferred => EventType::RefreshDeferred,
            BoardEvent::RefreshCompleted { .. } => EventType::RefreshCompleted,
        }
    }
}

struct CallbackEntry {
    callback: Box<dyn Fn(&BoardEvent) + Send>,
    event_filter: Option<EventType>,
}

pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
    event_queue: Mutex<mpsc::Receiver<BoardEvent>>,
    event_sender: mpsc::Sender<BoardEvent>,
    callback_thread_id: Mutex<Option<ThreadId>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            callbacks: Mutex::new(Vec::new()),
            event_queue: Mutex::new(receiver),
            event_sender: sender,
            callback_thread_id: Mutex::new(None),
        }
    }

    fn ensure_callback_thread(&self) -> ClientResult<()> {
        let mut thread_id = self
            .callback_thread_id
            .lock()
            .map_err(|_| ClientError::LockError("thread ID".into()))?;
        if thread_id.is_none() {
            *thread_id = Some(thread::current().id());
            tracing::info!(
                "Board event callbacks will be processed on thread: {:?}",
                thread::current().id()
            );
        }
        Ok(())
    }

    pub fn register_callback<F>(&self, callback: F) -> ClientResult<()>
    where
        F: Fn(&BoardEvent) + Send + 'static,
    {
        self.push_callback(Box::new(callback), None)
    }

    /// Registers a callback that only receives events of `event_filter`.
    pub fn register_callback_filtered<F>(&self, callback: F, event_filter: EventType) -> ClientResult<()>
    where
        F: Fn(&BoardEvent) + Send + 'static,
    {
        self.push_callback(Box::new(callback), Some(event_filter))
    }

    fn push_callback(
        &self,
        callback: Box<dyn Fn(&BoardEvent) + Send>,
        event_filter: Option<EventType>,
    ) -> ClientResult<()> {
        self.ensure_callback_thread()?;
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?;
        callbacks.push(CallbackEntry {
            callback,
            event_filter,
        });
        Ok(())
    }

    pub fn emit(&self, event: BoardEvent) {
        tracing::trace!("Queueing {:?}", event.event_type());
        if self.event_sender.send(event).is_err() {
            tracing::error!("Failed to queue event - receiver may have been dropped");
        }
    }

    /// Delivers every queued event. Must be called on the registration thread.
    pub fn process_events(&self) -> ClientResult<usize> {
        {
            let thread_id = self
                .callback_thread_id
                .lock()
                .map_err(|_| ClientError::LockError("thread ID".into()))?;
            match *thread_id {
                Some(expected) if thread::current().id() != expected => {
                    return Err(ClientError::ThreadSafetyViolation)
                }
                Some(_) => {}
                None => return Err(ClientError::NoCallbacksRegistered),
            }
        }

        let callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?;
        let receiver = self
            .event_queue
            .lock()
            .map_err(|_| ClientError::LockError("event queue".into()))?;

        let mut processed_count = 0;
        while let Ok(event) = receiver.try_recv() {
            let event_type = event.event_type();
            for entry in callbacks.iter() {
                if entry.event_filter.map_or(true, |filter| filter == event_type) {
                    (entry.callback)(&event);
                }
            }
            processed_count += 1;
        }
        Ok(processed_count)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskboard_core::ListId;

    #[test]
    fn test_callback_receives_events_in_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        dispatcher
            .register_callback(move |event| seen_clone.lock().unwrap().push(event.event_type()))
            .unwrap();

        dispatcher.emit(BoardEvent::BoardChanged { revision: 1 });
        dispatcher.emit(BoardEvent::RefreshCompleted { list_count: 2 });

        assert_eq!(dispatcher.process_events().unwrap(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventType::BoardChanged, EventType::RefreshCompleted]
        );
    }

    #[test]
    fn test_filtered_callback() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        dispatcher
            .register_callback_filtered(
                move |event| seen_clone.lock().unwrap().push(event.clone()),
                EventType::SyncConfirmed,
            )
            .unwrap();

        dispatcher.emit(BoardEvent::BoardChanged { revision: 1 });
        dispatcher.emit(BoardEvent::SyncConfirmed {
            operation: MutationKind::AddList,
            entity: EntityRef::List(ListId(4)),
        });

        assert_eq!(dispatcher.process_events().unwrap(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_events_rejects_other_threads() {
        let dispatcher = Arc::new(EventDispatcher::new());
        assert!(matches!(
            dispatcher.process_events(),
            Err(ClientError::NoCallbacksRegistered)
        ));

        dispatcher.register_callback(|_| {}).unwrap();
        let dispatcher_clone = dispatcher.clone();
        let result = std::thread::spawn(move || dispatcher_clone.process_events())
            .join()
            .unwrap();
        assert!(matches!(result, Err(ClientError::ThreadSafetyViolation)));

        dispatcher.emit(BoardEvent::RefreshDeferred);
        assert_eq!(dispatcher.process_events().unwrap(), 1);
    }
}
