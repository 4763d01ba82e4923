#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskboard_client::testing::MockSyncClient;
use taskboard_client::{BoardEvent, BoardStore, ClientConfig, MemoryCache};
use taskboard_core::{BoardPayload, ListId, ListPayload, TaskId, TaskPayload};

pub struct TestBoard {
    pub store: BoardStore,
    pub server: Arc<MockSyncClient>,
    pub cache: Arc<MemoryCache>,
}

pub fn task(id: i64, name: &str, list_id: i64, is_completed: bool, subtasks: Vec<TaskPayload>) -> TaskPayload {
    TaskPayload {
        id: TaskId(id),
        name: name.to_string(),
        list_id: ListId(list_id),
        parent_id: None,
        is_completed,
        task_depth: 0,
        order_index: None,
        subtasks: subtasks
            .into_iter()
            .map(|mut subtask| {
                subtask.parent_id = Some(TaskId(id));
                subtask
            })
            .collect(),
    }
}

pub fn list(id: i64, name: &str, order_index: usize, tasks: Vec<TaskPayload>) -> ListPayload {
    ListPayload {
        id: ListId(id),
        name: name.to_string(),
        order_index,
        tasks,
    }
}

/// "To Do" (1): 10 with subtasks 11 (done) and 12, then 20.
/// "Done" (2): 30 (done). "Later" (3): empty.
pub fn sample_board() -> BoardPayload {
    BoardPayload {
        lists: vec![
            list(
                1,
                "To Do",
                0,
                vec![
                    task(
                        10,
                        "Write report",
                        1,
                        false,
                        vec![task(11, "Outline", 1, true, vec![]), task(12, "Draft", 1, false, vec![])],
                    ),
                    task(20, "Review", 1, false, vec![]),
                ],
            ),
            list(2, "Done", 1, vec![task(30, "Ship", 2, true, vec![])]),
            list(3, "Later", 2, vec![]),
        ],
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::default()
}

/// A store loaded with `sample_board()` from the mock server.
pub async fn setup_board() -> TestBoard {
    setup_board_with(test_config(), MemoryCache::new()).await
}

pub async fn setup_board_with(config: ClientConfig, cache: MemoryCache) -> TestBoard {
    let board = unloaded_board(config, cache);
    board.store.refresh().await.expect("initial refresh");
    board
}

/// A store that has not fetched anything yet. Needs a running runtime.
pub fn unloaded_board(config: ClientConfig, cache: MemoryCache) -> TestBoard {
    let server = Arc::new(MockSyncClient::with_board(sample_board()));
    let cache = Arc::new(cache);
    let store = BoardStore::new(server.clone(), cache.clone(), &config);
    TestBoard { store, server, cache }
}

/// Collects every event the store emits. Call `drain` to run the callbacks.
pub struct EventLog {
    events: Arc<Mutex<Vec<BoardEvent>>>,
    store: BoardStore,
}

impl EventLog {
    pub fn attach(store: &BoardStore) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store
            .events()
            .register_callback(move |event| sink.lock().unwrap().push(event.clone()))
            .unwrap();
        Self {
            events,
            store: store.clone(),
        }
    }

    pub fn drain(&self) -> Vec<BoardEvent> {
        self.store.events().process_events().unwrap();
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

/// Polls `condition` until it holds, yielding to spawned tasks in between.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 2s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn with_timeout<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}
