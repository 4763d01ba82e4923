use async_trait::async_trait;
use taskboard_core::{
    BoardPayload, BoardResult, CreateListRequest, CreateTaskRequest, ListId, ListPayload,
    MoveTaskRequest, RenameListRequest, ReorderListRequest, TaskId, TaskPayload,
    UpdateTaskRequest,
};

/// The remote board API. Every id passed in is a server id.
#[async_trait]
pub trait SyncClient: Send + Sync {
    async fn fetch_board(&self) -> BoardResult<BoardPayload>;

    async fn create_list(&self, request: CreateListRequest) -> BoardResult<ListPayload>;

    async fn rename_list(&self, request: RenameListRequest) -> BoardResult<()>;

    async fn delete_list(&self, id: ListId) -> BoardResult<()>;

    async fn reorder_list(&self, id: ListId, request: ReorderListRequest) -> BoardResult<()>;

    async fn create_task(&self, request: CreateTaskRequest) -> BoardResult<TaskPayload>;

    async fn update_task(&self, id: TaskId, request: UpdateTaskRequest) -> BoardResult<()>;

    async fn move_task(&self, id: TaskId, request: MoveTaskRequest) -> BoardResult<()>;

    async fn delete_task(&self, id: TaskId) -> BoardResult<()>;
}
