//! The board store: authoritative in-memory state and the optimistic
//! update protocol.
//!
//! Every mutation validates, applies locally under the state lock, signals a
//! re-render, queues a cache snapshot and then confirms with the server in a
//! spawned task. A failed confirmation rolls back exactly the fields the
//! operation still owns (see [`crate::journal`]).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use taskboard_core::tree::{self, Completion, ViewFlags, ViewState};
use taskboard_core::{
    Board, BoardError, BoardPayload, BoardResult, CreateListRequest, CreateTaskRequest,
    EntityRef, List, ListId, MoveTaskRequest, Placement, RenameListRequest, ReorderListRequest,
    Task, TaskId, UpdateTaskRequest,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::cache::{spawn_cache_writer, CacheCommand, LocalCache, SqliteCache};
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::events::{BoardEvent, EventDispatcher};
use crate::http::HttpSyncClient;
use crate::journal::{apply_undos, Aliases, Field, Journal, Undo};
use crate::notifications::{MutationKind, Notification, NotificationCenter};
use crate::pending::Pending;
use crate::sync_client::SyncClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Creation {
    Pending,
    Confirmed(i64),
    Failed,
}

/// Creation status of every provisional entity. Senders are never removed so
/// late callers holding a provisional id still resolve it.
#[derive(Default)]
struct Creations {
    lists: HashMap<ListId, watch::Sender<Creation>>,
    tasks: HashMap<TaskId, watch::Sender<Creation>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { list_count: usize },
    /// A drag or an unconfirmed mutation is in progress; the refresh runs later.
    Deferred,
}

struct StoreState {
    board: Board,
    view: ViewState,
    journal: Journal,
    aliases: Aliases,
    creations: Creations,
    notifications: NotificationCenter,
    revision: u64,
    next_provisional: i64,
    drag_locked: bool,
    refresh_deferred: bool,
}

impl StoreState {
    fn new(max_notifications: usize) -> Self {
        Self {
            board: Board::new(),
            view: ViewState::new(),
            journal: Journal::new(),
            aliases: Aliases::default(),
            creations: Creations::default(),
            notifications: NotificationCenter::new(max_notifications),
            revision: 0,
            next_provisional: -1,
            drag_locked: false,
            refresh_deferred: false,
        }
    }

    fn provisional_id(&mut self) -> i64 {
        let id = self.next_provisional;
        self.next_provisional -= 1;
        id
    }

    fn refresh_blocked(&self) -> bool {
        self.drag_locked || !self.journal.is_idle()
    }

    fn take_deferred_refresh(&mut self) -> bool {
        if self.refresh_deferred && !self.refresh_blocked() {
            self.refresh_deferred = false;
            return true;
        }
        false
    }

    fn commit(&mut self) -> (u64, BoardPayload) {
        debug_assert!(self.board.check_invariants().is_ok());
        self.revision += 1;
        (self.revision, BoardPayload::from_board(&self.board))
    }
}

struct StoreInner {
    state: Mutex<StoreState>,
    client: Arc<dyn SyncClient>,
    cache: Arc<dyn LocalCache>,
    cache_key: String,
    cache_tx: mpsc::UnboundedSender<CacheCommand>,
    events: Arc<EventDispatcher>,
}

/// Cloneable handle to the shared board state.
#[derive(Clone)]
pub struct BoardStore {
    inner: Arc<StoreInner>,
}

fn validated_name(name: &str) -> BoardResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardError::validation("name must not be empty"));
    }
    Ok(name.to_string())
}

impl BoardStore {
    /// Must be called from within a tokio runtime: the cache writer is spawned here.
    pub fn new(client: Arc<dyn SyncClient>, cache: Arc<dyn LocalCache>, config: &ClientConfig) -> Self {
        let cache_tx = spawn_cache_writer(cache.clone(), config.cache_key.clone());
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::new(config.max_notifications)),
                client,
                cache,
                cache_key: config.cache_key.clone(),
                cache_tx,
                events: Arc::new(EventDispatcher::new()),
            }),
        }
    }

    /// Builds a store backed by the HTTP API and the SQLite snapshot cache.
    pub async fn connect(config: &ClientConfig) -> BoardResult<Self> {
        config.validate()?;
        let client = Arc::new(HttpSyncClient::from_config(config)?);
        let cache = Arc::new(SqliteCache::new(&config.cache_url).await?);
        info!("Board store using {}", config.server_url);
        Ok(Self::new(client, cache, config))
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        self.inner.events.clone()
    }

    // ---- lists ----------------------------------------------------------

    /// Appends a list. The returned handle resolves to the server id.
    pub fn add_list(&self, name: &str) -> BoardResult<Pending<ListId>> {
        let name = validated_name(name)?;
        let (id, seq) = self.inner.apply(|state| {
            let id = ListId(state.provisional_id());
            let index = state.board.list_count();
            state.board.insert_list(id, name.clone(), index)?;
            let entity = EntityRef::List(id);
            let seq = state.journal.begin(
                MutationKind::AddList,
                entity,
                vec![(Field::Existence(entity), Undo::RemoveList(id))],
            );
            state
                .creations
                .lists
                .insert(id, watch::channel(Creation::Pending).0);
            Ok((id, seq))
        })?;
        info!("Added list {} {:?}", id, name);

        Ok(self.launch(seq, MutationKind::AddList, EntityRef::List(id), move |inner| async move {
            match inner.client.create_list(CreateListRequest { name }).await {
                Ok(created) => inner.reconcile_list(id, created.id),
                Err(e) => {
                    inner.mark_creation(EntityRef::List(id), Creation::Failed);
                    Err(e)
                }
            }
        }))
    }

    pub fn rename_list(&self, id: ListId, name: &str) -> BoardResult<Pending<()>> {
        let name = validated_name(name)?;
        let applied = self.inner.mutate(|state| {
            let id = state.aliases.list(id);
            if state.board.require_list(id)?.name == name {
                return Ok(None);
            }
            let previous = state.board.rename_list(id, name.clone())?;
            let seq = state.journal.begin(
                MutationKind::RenameList,
                EntityRef::List(id),
                vec![(Field::ListName(id), Undo::ListName { id, name: previous })],
            );
            Ok(Some((id, seq)))
        })?;
        let Some((id, seq)) = applied else {
            return Ok(Pending::settled(()));
        };
        debug!("Renamed list {} to {:?}", id, name);

        Ok(self.launch(seq, MutationKind::RenameList, EntityRef::List(id), move |inner| async move {
            let id = inner.server_list(id).await?;
            inner.client.rename_list(RenameListRequest { id, name }).await
        }))
    }

    /// Removes a list and every task it contains.
    pub fn delete_list(&self, id: ListId) -> BoardResult<Pending<()>> {
        let (id, seq) = self.inner.apply(|state| {
            let id = state.aliases.list(id);
            let removed = state.board.remove_list(id)?;
            state.view.prune(&state.board);
            let entity = EntityRef::List(id);
            let seq = state.journal.begin(
                MutationKind::DeleteList,
                entity,
                vec![(Field::Existence(entity), Undo::RestoreList(removed))],
            );
            Ok((id, seq))
        })?;
        info!("Deleted list {}", id);

        Ok(self.launch(seq, MutationKind::DeleteList, EntityRef::List(id), move |inner| async move {
            let id = inner.server_list(id).await?;
            inner.client.delete_list(id).await
        }))
    }

    /// Moves a list to `new_index`. An index equal to the list count appends.
    pub fn reorder_list(&self, id: ListId, new_index: usize) -> BoardResult<Pending<()>> {
        let applied = self.inner.mutate(|state| {
            let id = state.aliases.list(id);
            let previous = state.board.list_position(id)?;
            let count = state.board.list_count();
            if new_index > count {
                return Err(BoardError::validation(format!(
                    "list index {} out of range (0..={})",
                    new_index, count
                )));
            }
            let index = new_index.min(count.saturating_sub(1));
            if index == previous {
                return Ok(None);
            }
            state.board.move_list(id, index)?;
            let seq = state.journal.begin(
                MutationKind::ReorderList,
                EntityRef::List(id),
                vec![(Field::ListPosition(id), Undo::ListPosition { id, index: previous })],
            );
            Ok(Some((id, index, seq)))
        })?;
        let Some((id, index, seq)) = applied else {
            return Ok(Pending::settled(()));
        };
        debug!("Moved list {} to position {}", id, index);

        Ok(self.launch(seq, MutationKind::ReorderList, EntityRef::List(id), move |inner| async move {
            let id = inner.server_list(id).await?;
            inner
                .client
                .reorder_list(id, ReorderListRequest { order_index: index })
                .await
        }))
    }

    // ---- tasks ----------------------------------------------------------

    /// Appends a task to a list or below a parent task. The returned handle
    /// resolves to the server id.
    pub fn add_task(&self, list_id: ListId, parent_id: Option<TaskId>, name: &str) -> BoardResult<Pending<TaskId>> {
        let name = validated_name(name)?;
        let (id, placement, seq) = self.inner.apply(|state| {
            let list_id = state.aliases.list(list_id);
            let parent_id = parent_id.map(|id| state.aliases.task(id));
            state.board.require_list(list_id)?;
            if let Some(parent_id) = parent_id {
                let parent = state.board.require_task(parent_id)?;
                if parent.list_id != list_id {
                    return Err(BoardError::validation(format!(
                        "parent task {} belongs to list {}, not list {}",
                        parent_id, parent.list_id, list_id
                    )));
                }
            }
            let index = state.board.siblings(list_id, parent_id)?.len();
            let id = TaskId(state.provisional_id());
            let placement = Placement {
                list_id,
                parent_id,
                index,
            };
            state.board.insert_task(id, name.clone(), false, placement)?;
            if let Some(parent_id) = parent_id {
                state.view.reveal_children(parent_id);
            }
            let entity = EntityRef::Task(id);
            let seq = state.journal.begin(
                MutationKind::AddTask,
                entity,
                vec![(Field::Existence(entity), Undo::RemoveTask(id))],
            );
            state
                .creations
                .tasks
                .insert(id, watch::channel(Creation::Pending).0);
            Ok((id, placement, seq))
        })?;
        info!("Added task {} {:?} to list {}", id, name, placement.list_id);

        Ok(self.launch(seq, MutationKind::AddTask, EntityRef::Task(id), move |inner| async move {
            let created = async {
                let list_id = inner.server_list(placement.list_id).await?;
                let parent_id = match placement.parent_id {
                    Some(parent_id) => Some(inner.server_task(parent_id).await?),
                    None => None,
                };
                inner
                    .client
                    .create_task(CreateTaskRequest {
                        name,
                        list_id,
                        parent_id,
                    })
                    .await
            }
            .await;
            match created {
                Ok(created) => inner.reconcile_task(id, created.id),
                Err(e) => {
                    inner.mark_creation(EntityRef::Task(id), Creation::Failed);
                    Err(e)
                }
            }
        }))
    }

    pub fn rename_task(&self, id: TaskId, name: &str) -> BoardResult<Pending<()>> {
        let name = validated_name(name)?;
        let applied = self.inner.mutate(|state| {
            let id = state.aliases.task(id);
            if state.board.require_task(id)?.name == name {
                return Ok(None);
            }
            let previous = state.board.rename_task(id, name.clone())?;
            let seq = state.journal.begin(
                MutationKind::RenameTask,
                EntityRef::Task(id),
                vec![(Field::TaskName(id), Undo::TaskName { id, name: previous })],
            );
            Ok(Some((state.board.require_task(id)?.clone(), seq)))
        })?;
        let Some((task, seq)) = applied else {
            return Ok(Pending::settled(()));
        };
        debug!("Renamed task {} to {:?}", task.id, task.name);

        Ok(self.launch(seq, MutationKind::RenameTask, EntityRef::Task(task.id), move |inner| {
            inner.push_task_update(task)
        }))
    }

    /// Sets the completion flag of one task. Other tasks are never touched.
    pub fn toggle_completion(&self, id: TaskId, is_completed: bool) -> BoardResult<Pending<()>> {
        let applied = self.inner.mutate(|state| {
            let id = state.aliases.task(id);
            if state.board.require_task(id)?.is_completed == is_completed {
                return Ok(None);
            }
            let previous = state.board.set_completed(id, is_completed)?;
            let seq = state.journal.begin(
                MutationKind::ToggleCompletion,
                EntityRef::Task(id),
                vec![(
                    Field::TaskCompletion(id),
                    Undo::TaskCompletion {
                        id,
                        is_completed: previous,
                    },
                )],
            );
            Ok(Some((state.board.require_task(id)?.clone(), seq)))
        })?;
        let Some((task, seq)) = applied else {
            return Ok(Pending::settled(()));
        };
        debug!("Task {} completed: {}", task.id, task.is_completed);

        Ok(self.launch(seq, MutationKind::ToggleCompletion, EntityRef::Task(task.id), move |inner| {
            inner.push_task_update(task)
        }))
    }

    /// Removes a task together with its subtasks.
    pub fn delete_task(&self, id: TaskId) -> BoardResult<Pending<()>> {
        let (id, seq) = self.inner.apply(|state| {
            let id = state.aliases.task(id);
            let removed = state.board.remove_task(id)?;
            state.view.prune(&state.board);
            let entity = EntityRef::Task(id);
            let seq = state.journal.begin(
                MutationKind::DeleteTask,
                entity,
                vec![(Field::Existence(entity), Undo::RestoreTask(removed))],
            );
            Ok((id, seq))
        })?;
        info!("Deleted task {}", id);

        Ok(self.launch(seq, MutationKind::DeleteTask, EntityRef::Task(id), move |inner| async move {
            let id = inner.server_task(id).await?;
            inner.client.delete_task(id).await
        }))
    }

    /// Re-parents a task, with its subtree, to `target_index` in the target group.
    pub fn move_task(
        &self,
        id: TaskId,
        target_list: ListId,
        target_parent: Option<TaskId>,
        target_index: usize,
    ) -> BoardResult<Pending<()>> {
        let applied = self.inner.mutate(|state| {
            let id = state.aliases.task(id);
            let target = Placement {
                list_id: state.aliases.list(target_list),
                parent_id: target_parent.map(|parent| state.aliases.task(parent)),
                index: target_index,
            };
            let origin = state.board.placement(id)?;
            let target = state.board.normalize_move(id, target)?;
            if target == origin {
                return Ok(None);
            }
            state.board.move_task(id, target)?;
            let seq = state.journal.begin(
                MutationKind::MoveTask,
                EntityRef::Task(id),
                vec![(Field::TaskPlacement(id), Undo::TaskPlacement { id, placement: origin })],
            );
            Ok(Some((id, target, seq)))
        })?;
        let Some((id, target, seq)) = applied else {
            debug!("Move of task {} is a no-op", id);
            return Ok(Pending::settled(()));
        };
        debug!("Moved task {} to {:?}", id, target);

        Ok(self.launch(seq, MutationKind::MoveTask, EntityRef::Task(id), move |inner| async move {
            let id = inner.server_task(id).await?;
            let list_id = inner.server_list(target.list_id).await?;
            let parent_id = match target.parent_id {
                Some(parent_id) => Some(inner.server_task(parent_id).await?),
                None => None,
            };
            let request = MoveTaskRequest::from(Placement {
                list_id,
                parent_id,
                index: target.index,
            });
            inner.client.move_task(id, request).await
        }))
    }

    // ---- loading --------------------------------------------------------

    /// Renders the cached snapshot, if any, then refreshes from the server.
    pub async fn load(&self) -> BoardResult<RefreshOutcome> {
        match self.inner.cache.get(&self.inner.cache_key).await {
            Ok(Some(snapshot)) => match snapshot.into_board() {
                Ok(board) => self.inner.hydrate(board)?,
                Err(e) => warn!("Ignoring unreadable cached board: {}", e),
            },
            Ok(None) => debug!("No cached board under {:?}", self.inner.cache_key),
            Err(e) => warn!("Failed to read cached board: {}", e),
        }
        self.inner.refresh().await
    }

    /// Replaces the model with the server's board.
    pub async fn refresh(&self) -> BoardResult<RefreshOutcome> {
        self.inner.refresh().await
    }

    /// Waits until every queued snapshot write has reached the cache.
    pub async fn flush_cache(&self) -> BoardResult<()> {
        let (done, flushed) = oneshot::channel();
        self.inner
            .cache_tx
            .send(CacheCommand::Flush(done))
            .map_err(|_| ClientError::ChannelClosed)?;
        flushed.await.map_err(|_| ClientError::ChannelClosed)?;
        Ok(())
    }

    // ---- drag lock ------------------------------------------------------

    pub(crate) fn acquire_drag_lock(&self) -> BoardResult<()> {
        let mut state = self.inner.lock()?;
        if state.drag_locked {
            return Err(BoardError::InvalidState("a drag is already in progress".into()));
        }
        state.drag_locked = true;
        Ok(())
    }

    pub(crate) fn release_drag_lock(&self) {
        let rerun = match self.inner.lock() {
            Ok(mut state) => {
                state.drag_locked = false;
                state.take_deferred_refresh()
            }
            Err(e) => {
                error!("Failed to release drag lock: {}", e);
                false
            }
        };
        if rerun {
            self.inner.spawn_refresh();
        }
    }

    pub fn is_drag_locked(&self) -> bool {
        self.inner.lock().map(|state| state.drag_locked).unwrap_or(false)
    }

    /// Resolves a drop onto a task group: an index past the end appends.
    pub(crate) fn task_drop_placement(&self, id: TaskId, target: Placement) -> BoardResult<Placement> {
        let state = self.inner.lock()?;
        let id = state.aliases.task(id);
        let target = Placement {
            list_id: state.aliases.list(target.list_id),
            parent_id: target.parent_id.map(|parent| state.aliases.task(parent)),
            index: target.index,
        };
        let len = state.board.siblings(target.list_id, target.parent_id)?.len();
        state.board.normalize_move(
            id,
            Placement {
                index: target.index.min(len),
                ..target
            },
        )
    }

    // ---- reads ----------------------------------------------------------

    /// A copy of the current board.
    pub fn board(&self) -> BoardResult<Board> {
        Ok(self.inner.lock()?.board.clone())
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().map(|state| state.revision).unwrap_or(0)
    }

    pub fn list(&self, id: ListId) -> Option<List> {
        let state = self.inner.lock().ok()?;
        state.board.list(state.aliases.list(id)).cloned()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        let state = self.inner.lock().ok()?;
        state.board.task(state.aliases.task(id)).cloned()
    }

    pub fn lists_in_order(&self) -> Vec<List> {
        self.inner
            .lock()
            .map(|state| state.board.lists().cloned().collect())
            .unwrap_or_default()
    }

    pub fn placement(&self, id: TaskId) -> BoardResult<Placement> {
        let state = self.inner.lock()?;
        state.board.placement(state.aliases.task(id))
    }

    pub fn list_position(&self, id: ListId) -> BoardResult<usize> {
        let state = self.inner.lock()?;
        state.board.list_position(state.aliases.list(id))
    }

    /// Completed and total subtasks of a task, at every depth.
    pub fn completion(&self, id: TaskId) -> BoardResult<Completion> {
        let state = self.inner.lock()?;
        tree::count_completion(&state.board, state.aliases.task(id))
    }

    pub fn list_completion(&self, id: ListId) -> BoardResult<Completion> {
        let state = self.inner.lock()?;
        tree::list_completion(&state.board, state.aliases.list(id))
    }

    /// Server id for an entity created this session, or the id itself.
    pub fn resolve(&self, entity: EntityRef) -> EntityRef {
        self.inner
            .lock()
            .map(|state| state.aliases.entity(entity))
            .unwrap_or(entity)
    }

    pub fn pending_operations(&self) -> usize {
        self.inner.lock().map(|state| state.journal.len()).unwrap_or(0)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .map(|state| state.notifications.list())
            .unwrap_or_default()
    }

    pub fn dismiss_notification(&self, id: u64) -> bool {
        self.inner
            .lock()
            .map(|mut state| state.notifications.dismiss(id))
            .unwrap_or(false)
    }

    // ---- view state -----------------------------------------------------

    pub fn view_flags(&self, id: TaskId) -> ViewFlags {
        self.inner
            .lock()
            .map(|state| state.view.flags(state.aliases.task(id)))
            .unwrap_or_default()
    }

    pub fn set_expanded(&self, id: TaskId, expanded: bool) -> BoardResult<()> {
        self.with_view(id, |view, _, id| {
            view.set_expanded(id, expanded);
            Ok(())
        })
    }

    pub fn set_visible(&self, id: TaskId, visible: bool) -> BoardResult<()> {
        self.with_view(id, |view, _, id| {
            view.set_visible(id, visible);
            Ok(())
        })
    }

    /// Flips `expanded`; no-op for a task without subtasks.
    pub fn toggle_expanded(&self, id: TaskId) -> BoardResult<bool> {
        self.with_view(id, |view, board, id| view.toggle_expanded(board, id))
    }

    pub fn toggle_visibility(&self, id: TaskId) -> BoardResult<bool> {
        self.with_view(id, |view, _, id| Ok(view.toggle_visibility(id)))
    }

    pub fn is_rendered(&self, id: TaskId) -> bool {
        self.inner
            .lock()
            .map(|state| state.view.is_rendered(&state.board, state.aliases.task(id)))
            .unwrap_or(false)
    }

    fn with_view<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut ViewState, &Board, TaskId) -> BoardResult<R>,
    ) -> BoardResult<R> {
        let mut guard = self.inner.lock()?;
        let state = &mut *guard;
        let id = state.aliases.task(id);
        state.board.require_task(id)?;
        f(&mut state.view, &state.board, id)
    }

    // ---- plumbing -------------------------------------------------------

    fn launch<T, F, Fut>(&self, seq: u64, kind: MutationKind, entity: EntityRef, remote: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<StoreInner>) -> Fut + Send + 'static,
        Fut: Future<Output = BoardResult<T>> + Send + 'static,
    {
        let alert = Arc::new(AtomicBool::new(true));
        let notify = alert.clone();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            match remote(inner.clone()).await {
                Ok(value) => {
                    inner.settle_confirmed(seq);
                    Ok(value)
                }
                Err(e) => {
                    let e = e.into_sync();
                    inner.settle_failed(seq, kind, entity, &e, notify.load(Ordering::SeqCst));
                    Err(e)
                }
            }
        });
        Pending::spawned(handle, alert, entity)
    }
}

impl StoreInner {
    fn lock(&self) -> BoardResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| BoardError::LockError("board state".into()))
    }

    /// Runs a local mutation under the lock and publishes the new board.
    fn apply<R>(&self, f: impl FnOnce(&mut StoreState) -> BoardResult<R>) -> BoardResult<R> {
        let mut state = self.lock()?;
        let result = f(&mut *state)?;
        let (revision, payload) = state.commit();
        self.publish(revision, payload);
        Ok(result)
    }

    /// Like `apply`, for mutations that may turn out to be no-ops.
    /// `Ok(None)` means nothing changed and nothing is published.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoreState) -> BoardResult<Option<R>>,
    ) -> BoardResult<Option<R>> {
        let mut state = self.lock()?;
        let Some(result) = f(&mut *state)? else {
            return Ok(None);
        };
        let (revision, payload) = state.commit();
        self.publish(revision, payload);
        Ok(Some(result))
    }

    /// Signals a re-render and queues the snapshot. Called with the state
    /// lock held so snapshots reach the cache writer in commit order.
    fn publish(&self, revision: u64, payload: BoardPayload) {
        self.events.emit(BoardEvent::BoardChanged { revision });
        if self.cache_tx.send(CacheCommand::Write(payload)).is_err() {
            warn!("Cache writer is gone; snapshot for revision {} not saved", revision);
        }
    }

    /// Shows a cached board. Entities the server never confirmed are dropped:
    /// nothing in this session is waiting on them any more.
    fn hydrate(&self, mut board: Board) -> BoardResult<()> {
        let dropped = board.remove_provisional();
        if dropped > 0 {
            warn!("Dropped {} unconfirmed entities from the cached board", dropped);
        }
        let revision = {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            if !state.journal.is_idle() {
                debug!("Skipping cached board: local changes are pending");
                return Ok(());
            }
            state.board = board;
            state.view.prune(&state.board);
            state.revision += 1;
            state.revision
        };
        info!("Rendered cached board");
        self.events.emit(BoardEvent::BoardChanged { revision });
        Ok(())
    }

    fn defer_refresh_if_blocked(&self) -> BoardResult<bool> {
        let blocked = {
            let mut state = self.lock()?;
            let blocked = state.refresh_blocked();
            if blocked {
                state.refresh_deferred = true;
            }
            blocked
        };
        if blocked {
            debug!("Refresh deferred until the board settles");
            self.events.emit(BoardEvent::RefreshDeferred);
        }
        Ok(blocked)
    }

    async fn refresh(&self) -> BoardResult<RefreshOutcome> {
        if self.defer_refresh_if_blocked()? {
            return Ok(RefreshOutcome::Deferred);
        }
        let payload = self.client.fetch_board().await.map_err(BoardError::into_sync)?;
        let board = payload.into_board()?;

        let applied = {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            if state.refresh_blocked() {
                state.refresh_deferred = true;
                None
            } else {
                state.board = board;
                state.refresh_deferred = false;
                state.view.prune(&state.board);
                let list_count = state.board.list_count();
                let (revision, payload) = state.commit();
                self.publish(revision, payload);
                Some(list_count)
            }
        };

        match applied {
            Some(list_count) => {
                info!("Refreshed board: {} lists", list_count);
                self.events.emit(BoardEvent::RefreshCompleted { list_count });
                Ok(RefreshOutcome::Applied { list_count })
            }
            None => {
                debug!("Discarding fetched board: the board changed while loading");
                self.events.emit(BoardEvent::RefreshDeferred);
                Ok(RefreshOutcome::Deferred)
            }
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to run the deferred refresh on");
            if let Ok(mut state) = self.lock() {
                state.refresh_deferred = true;
            }
            return;
        };
        let inner = self.clone();
        runtime.spawn(async move {
            if let Err(e) = inner.refresh().await {
                warn!("Deferred refresh failed: {}", e);
            }
        });
    }

    async fn await_creation(&self, entity: EntityRef) -> BoardResult<i64> {
        let mut status = {
            let state = self.lock()?;
            let sender = match entity {
                EntityRef::List(id) => state.creations.lists.get(&id),
                EntityRef::Task(id) => state.creations.tasks.get(&id),
            };
            match sender {
                Some(sender) => sender.subscribe(),
                None => return Err(BoardError::Sync(format!("{} was never created", entity))),
            }
        };
        loop {
            let current = *status.borrow_and_update();
            match current {
                Creation::Confirmed(id) => return Ok(id),
                Creation::Failed => {
                    return Err(BoardError::Sync(format!("{} could not be created", entity)))
                }
                Creation::Pending => status
                    .changed()
                    .await
                    .map_err(|_| BoardError::Sync(format!("creation of {} was abandoned", entity)))?,
            }
        }
    }

    /// The server id to use for a remote call, waiting for a pending creation.
    async fn server_list(&self, id: ListId) -> BoardResult<ListId> {
        if !id.is_provisional() {
            return Ok(id);
        }
        self.await_creation(EntityRef::List(id)).await.map(ListId)
    }

    async fn server_task(&self, id: TaskId) -> BoardResult<TaskId> {
        if !id.is_provisional() {
            return Ok(id);
        }
        self.await_creation(EntityRef::Task(id)).await.map(TaskId)
    }

    async fn push_task_update(self: Arc<Self>, task: Task) -> BoardResult<()> {
        let id = self.server_task(task.id).await?;
        let list_id = self.server_list(task.list_id).await?;
        let parent_id = match task.parent_id {
            Some(parent_id) => Some(self.server_task(parent_id).await?),
            None => None,
        };
        self.client
            .update_task(
                id,
                UpdateTaskRequest {
                    name: task.name,
                    is_completed: task.is_completed,
                    list_id,
                    parent_id,
                },
            )
            .await
    }

    fn mark_creation(&self, entity: EntityRef, creation: Creation) {
        let state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to record creation of {}: {}", entity, e);
                return;
            }
        };
        let sender = match entity {
            EntityRef::List(id) => state.creations.lists.get(&id),
            EntityRef::Task(id) => state.creations.tasks.get(&id),
        };
        if let Some(sender) = sender {
            sender.send_replace(creation);
        }
    }

    fn reconcile_list(&self, provisional: ListId, confirmed: ListId) -> BoardResult<ListId> {
        {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            state.aliases.insert_list(provisional, confirmed);
            state
                .journal
                .rekey(EntityRef::List(provisional), EntityRef::List(confirmed));
            if let Some(sender) = state.creations.lists.get(&provisional) {
                sender.send_replace(Creation::Confirmed(confirmed.0));
            }
            if state.board.contains_list(provisional) {
                if state.board.contains_list(confirmed) {
                    warn!("List {} already loaded; dropping provisional {}", confirmed, provisional);
                    state.board.remove_list(provisional)?;
                    state.view.prune(&state.board);
                } else {
                    state.board.rekey_list(provisional, confirmed)?;
                }
                let (revision, payload) = state.commit();
                self.publish(revision, payload);
            }
        }
        self.finish_reconcile(EntityRef::List(provisional), EntityRef::List(confirmed));
        Ok(confirmed)
    }

    fn reconcile_task(&self, provisional: TaskId, confirmed: TaskId) -> BoardResult<TaskId> {
        {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            state.aliases.insert_task(provisional, confirmed);
            state
                .journal
                .rekey(EntityRef::Task(provisional), EntityRef::Task(confirmed));
            if let Some(sender) = state.creations.tasks.get(&provisional) {
                sender.send_replace(Creation::Confirmed(confirmed.0));
            }
            if state.board.contains_task(provisional) {
                if state.board.contains_task(confirmed) {
                    warn!("Task {} already loaded; dropping provisional {}", confirmed, provisional);
                    state.board.remove_task(provisional)?;
                    state.view.prune(&state.board);
                } else {
                    state.board.rekey_task(provisional, confirmed)?;
                    state.view.rekey(provisional, confirmed);
                }
                let (revision, payload) = state.commit();
                self.publish(revision, payload);
            }
        }
        self.finish_reconcile(EntityRef::Task(provisional), EntityRef::Task(confirmed));
        Ok(confirmed)
    }

    fn finish_reconcile(&self, provisional: EntityRef, confirmed: EntityRef) {
        debug!("Reconciled {} as {}", provisional, confirmed);
        self.events.emit(BoardEvent::EntityReconciled {
            provisional,
            confirmed,
        });
    }

    fn settle_confirmed(self: &Arc<Self>, seq: u64) {
        let (settled, rerun) = match self.lock() {
            Ok(mut state) => {
                let settled = state.journal.confirm(seq);
                (settled, state.take_deferred_refresh())
            }
            Err(e) => {
                error!("Failed to settle operation {}: {}", seq, e);
                return;
            }
        };
        if let Some((operation, entity)) = settled {
            debug!("Server confirmed {} on {}", operation, entity);
            self.events.emit(BoardEvent::SyncConfirmed { operation, entity });
        }
        if rerun {
            self.spawn_refresh();
        }
    }

    fn settle_failed(
        self: &Arc<Self>,
        seq: u64,
        operation: MutationKind,
        entity: EntityRef,
        error: &BoardError,
        alert: bool,
    ) {
        let settled = match self.lock() {
            Ok(mut guard) => {
                let state = &mut *guard;
                let undos = state.journal.fail(seq);
                if !apply_undos(&mut state.board, &mut state.journal, &state.aliases, undos) {
                    state.refresh_deferred = true;
                }
                state.view.prune(&state.board);
                let entity = state.aliases.entity(entity);
                let notification =
                    alert.then(|| state.notifications.raise(entity, operation, error.to_string()));
                let (revision, payload) = state.commit();
                self.publish(revision, payload);
                (entity, notification, state.take_deferred_refresh())
            }
            Err(e) => {
                error!("Failed to roll back operation {}: {}", seq, e);
                return;
            }
        };
        let (entity, notification, rerun) = settled;

        warn!("Rolled back {} on {}: {}", operation, entity, error);
        self.events.emit(BoardEvent::RolledBack {
            operation,
            entity,
            error: error.to_string(),
        });
        if let Some(notification) = notification {
            self.events.emit(BoardEvent::SyncFailed { notification });
        }
        if rerun {
            self.spawn_refresh();
        }
    }
}
