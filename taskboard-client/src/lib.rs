pub mod cache;
pub mod config;
pub mod drag;
pub mod errors;
pub mod events;
pub mod http;
pub mod journal;
pub mod logging;
pub mod notifications;
pub mod pending;
pub mod queries;
pub mod store;
pub mod sync_client;

// Scripted server for tests
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{LocalCache, MemoryCache, SqliteCache};
pub use config::ClientConfig;
pub use drag::{DragOrigin, DragReorderEngine, DragSession, DragState, DragSubject, DropOutcome, DropTarget};
pub use errors::{ClientError, ClientResult};
pub use events::{BoardEvent, EventDispatcher, EventType};
pub use http::HttpSyncClient;
pub use logging::init_tracing;
pub use notifications::{MutationKind, Notification};
pub use pending::Pending;
pub use store::{BoardStore, RefreshOutcome};
pub use sync_client::SyncClient;
