//! Taskboard - hierarchical to-do board with optimistic synchronization
//!
//! This crate provides a unified API over the board model and the client store.
//!
//! # Example
//!
//! ```ignore
//! use taskboard::{BoardStore, ClientConfig};
//!
//! let store = BoardStore::connect(&ClientConfig::from_env()?).await?;
//! store.load().await?;
//! let list = store.add_list("Groceries")?.confirmed().await?;
//! store.add_task(list, None, "Milk")?.detach();
//! ```

// Re-export client types
pub use taskboard_client::{
    init_tracing, BoardEvent, BoardStore, ClientConfig, DragReorderEngine, DragSubject,
    DropOutcome, DropTarget, EventType, HttpSyncClient, LocalCache, MemoryCache, MutationKind,
    Notification, Pending, RefreshOutcome, SqliteCache, SyncClient,
};

// Re-export core types that external applications may need
pub use taskboard_core::errors::{BoardError, ErrorKind};
pub use taskboard_core::models::{Board, EntityRef, List, ListId, Placement, Task, TaskId};
pub use taskboard_core::tree::{Completion, ViewFlags};
pub use taskboard_core::BoardResult;
