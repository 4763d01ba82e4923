//! A scripted in-process [`SyncClient`] for tests.
//!
//! Every call is recorded on arrival. Scripts registered with
//! [`MockSyncClient::fail_next`] or [`MockSyncClient::hold_next`] apply to
//! the first matching call only.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use taskboard_core::{
    BoardError, BoardPayload, BoardResult, CreateListRequest, CreateTaskRequest, ListId,
    ListPayload, MoveTaskRequest, RenameListRequest, ReorderListRequest, TaskId, TaskPayload,
    UpdateTaskRequest,
};
use tokio::sync::oneshot;

use crate::sync_client::SyncClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    FetchBoard,
    CreateList,
    RenameList,
    DeleteList,
    ReorderList,
    CreateTask,
    UpdateTask,
    MoveTask,
    DeleteTask,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncCall {
    FetchBoard,
    CreateList(CreateListRequest),
    RenameList(RenameListRequest),
    DeleteList(ListId),
    ReorderList(ListId, ReorderListRequest),
    CreateTask(CreateTaskRequest),
    UpdateTask(TaskId, UpdateTaskRequest),
    MoveTask(TaskId, MoveTaskRequest),
    DeleteTask(TaskId),
}

impl SyncCall {
    pub fn kind(&self) -> CallKind {
        match self {
            SyncCall::FetchBoard => CallKind::FetchBoard,
            SyncCall::CreateList(_) => CallKind::CreateList,
            SyncCall::RenameList(_) => CallKind::RenameList,
            SyncCall::DeleteList(_) => CallKind::DeleteList,
            SyncCall::ReorderList(..) => CallKind::ReorderList,
            SyncCall::CreateTask(_) => CallKind::CreateTask,
            SyncCall::UpdateTask(..) => CallKind::UpdateTask,
            SyncCall::MoveTask(..) => CallKind::MoveTask,
            SyncCall::DeleteTask(_) => CallKind::DeleteTask,
        }
    }
}

/// Holds a scripted call until released. Releasing before the call arrives
/// lets it through immediately; dropping the gate releases it too.
#[derive(Debug)]
pub struct Gate {
    sender: Option<oneshot::Sender<()>>,
}

impl Gate {
    pub fn release(mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
    }
}

type Matcher = Box<dyn Fn(&SyncCall) -> bool + Send + Sync>;

struct Script {
    matcher: Matcher,
    gate: Option<oneshot::Receiver<()>>,
    failure: Option<String>,
}

/// Server ids handed out by the mock start here.
pub const FIRST_SERVER_ID: i64 = 1000;

pub struct MockSyncClient {
    board: Mutex<BoardPayload>,
    calls: Mutex<Vec<SyncCall>>,
    scripts: Mutex<Vec<Script>>,
    next_id: AtomicI64,
}

impl Default for MockSyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSyncClient {
    pub fn new() -> Self {
        Self::with_board(BoardPayload::default())
    }

    pub fn with_board(board: BoardPayload) -> Self {
        Self {
            board: Mutex::new(board),
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(FIRST_SERVER_ID),
        }
    }

    /// Replaces what `fetch_board` returns.
    pub fn set_board(&self, board: BoardPayload) {
        if let Ok(mut current) = self.board.lock() {
            *current = board;
        }
    }

    /// Fails the next call of `kind` with a transport error.
    pub fn fail_next(&self, kind: CallKind, message: &str) {
        self.push_script(Script {
            matcher: Box::new(move |call| call.kind() == kind),
            gate: None,
            failure: Some(message.to_string()),
        });
    }

    /// Holds the next call of `kind` until the gate is released.
    pub fn hold_next(&self, kind: CallKind) -> Gate {
        self.hold_next_matching(move |call| call.kind() == kind, None)
    }

    /// Holds the next call accepted by `matcher`; once released it fails with
    /// `failure` when one is given.
    pub fn hold_next_matching(
        &self,
        matcher: impl Fn(&SyncCall) -> bool + Send + Sync + 'static,
        failure: Option<&str>,
    ) -> Gate {
        let (sender, receiver) = oneshot::channel();
        self.push_script(Script {
            matcher: Box::new(matcher),
            gate: Some(receiver),
            failure: failure.map(str::to_string),
        });
        Gate {
            sender: Some(sender),
        }
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<SyncCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind() == kind)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    fn push_script(&self, script: Script) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(script);
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn record(&self, call: SyncCall) -> BoardResult<()> {
        let script = {
            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| BoardError::LockError("mock scripts".into()))?;
            let position = scripts.iter().position(|script| (script.matcher)(&call));
            self.calls
                .lock()
                .map_err(|_| BoardError::LockError("mock calls".into()))?
                .push(call);
            position.map(|position| scripts.remove(position))
        };
        let Some(script) = script else {
            return Ok(());
        };
        if let Some(gate) = script.gate {
            let _ = gate.await;
        }
        match script.failure {
            Some(message) => Err(BoardError::Transport(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SyncClient for MockSyncClient {
    async fn fetch_board(&self) -> BoardResult<BoardPayload> {
        self.record(SyncCall::FetchBoard).await?;
        self.board
            .lock()
            .map(|board| board.clone())
            .map_err(|_| BoardError::LockError("mock board".into()))
    }

    async fn create_list(&self, request: CreateListRequest) -> BoardResult<ListPayload> {
        let name = request.name.clone();
        self.record(SyncCall::CreateList(request)).await?;
        Ok(ListPayload {
            id: ListId(self.next_id()),
            name,
            order_index: 0,
            tasks: vec![],
        })
    }

    async fn rename_list(&self, request: RenameListRequest) -> BoardResult<()> {
        self.record(SyncCall::RenameList(request)).await
    }

    async fn delete_list(&self, id: ListId) -> BoardResult<()> {
        self.record(SyncCall::DeleteList(id)).await
    }

    async fn reorder_list(&self, id: ListId, request: ReorderListRequest) -> BoardResult<()> {
        self.record(SyncCall::ReorderList(id, request)).await
    }

    async fn create_task(&self, request: CreateTaskRequest) -> BoardResult<TaskPayload> {
        let created = request.clone();
        self.record(SyncCall::CreateTask(request)).await?;
        Ok(TaskPayload {
            id: TaskId(self.next_id()),
            name: created.name,
            list_id: created.list_id,
            parent_id: created.parent_id,
            is_completed: false,
            task_depth: 0,
            order_index: None,
            subtasks: vec![],
        })
    }

    async fn update_task(&self, id: TaskId, request: UpdateTaskRequest) -> BoardResult<()> {
        self.record(SyncCall::UpdateTask(id, request)).await
    }

    async fn move_task(&self, id: TaskId, request: MoveTaskRequest) -> BoardResult<()> {
        self.record(SyncCall::MoveTask(id, request)).await
    }

    async fn delete_task(&self, id: TaskId) -> BoardResult<()> {
        self.record(SyncCall::DeleteTask(id)).await
    }
}
