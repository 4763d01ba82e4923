//! Bookkeeping for optimistic operations that have not been confirmed yet.
//!
//! Each pending operation records, per field it wrote, the value it replaced.
//! The most recent writer of a field owns it. When an operation fails it only
//! restores the fields it still owns; for the others, the next writer in the
//! chain inherits its last-known-good value.

use std::collections::{BTreeMap, HashMap};
use taskboard_core::{
    Board, BoardError, BoardResult, EntityRef, ListId, Placement, RemovedList, RemovedTask, Task,
    TaskId,
};

use crate::notifications::MutationKind;

/// A single piece of state an operation can overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ListName(ListId),
    ListPosition(ListId),
    TaskName(TaskId),
    TaskCompletion(TaskId),
    TaskPlacement(TaskId),
    Existence(EntityRef),
}

impl Field {
    fn rekey(self, old: EntityRef, new: EntityRef) -> Self {
        match (self, old, new) {
            (Field::ListName(id), EntityRef::List(o), EntityRef::List(n)) if id == o => {
                Field::ListName(n)
            }
            (Field::ListPosition(id), EntityRef::List(o), EntityRef::List(n)) if id == o => {
                Field::ListPosition(n)
            }
            (Field::TaskName(id), EntityRef::Task(o), EntityRef::Task(n)) if id == o => {
                Field::TaskName(n)
            }
            (Field::TaskCompletion(id), EntityRef::Task(o), EntityRef::Task(n)) if id == o => {
                Field::TaskCompletion(n)
            }
            (Field::TaskPlacement(id), EntityRef::Task(o), EntityRef::Task(n)) if id == o => {
                Field::TaskPlacement(n)
            }
            (Field::Existence(entity), _, _) if entity == old => Field::Existence(new),
            (field, _, _) => field,
        }
    }
}

/// The value an operation replaced, and how to put it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    RemoveList(ListId),
    RestoreList(RemovedList),
    ListName { id: ListId, name: String },
    ListPosition { id: ListId, index: usize },
    RemoveTask(TaskId),
    RestoreTask(RemovedTask),
    TaskName { id: TaskId, name: String },
    TaskCompletion { id: TaskId, is_completed: bool },
    TaskPlacement { id: TaskId, placement: Placement },
}

impl Undo {
    /// Applies the undo to `board`, translating provisional ids that have
    /// since been confirmed.
    pub fn apply(self, board: &mut Board, aliases: &Aliases) -> BoardResult<()> {
        match self {
            Undo::RemoveList(id) => board.remove_list(aliases.list(id)).map(|_| ()),
            Undo::RestoreList(removed) => {
                board.restore_list(removed.remap(|id| aliases.list(id), |id| aliases.task(id)))
            }
            Undo::ListName { id, name } => board.rename_list(aliases.list(id), name).map(|_| ()),
            Undo::ListPosition { id, index } => {
                let last = board.list_count().saturating_sub(1);
                board.move_list(aliases.list(id), index.min(last)).map(|_| ())
            }
            Undo::RemoveTask(id) => board.remove_task(aliases.task(id)).map(|_| ()),
            Undo::RestoreTask(removed) => {
                board.restore_task(removed.remap(|id| aliases.list(id), |id| aliases.task(id)))
            }
            Undo::TaskName { id, name } => board.rename_task(aliases.task(id), name).map(|_| ()),
            Undo::TaskCompletion { id, is_completed } => board
                .set_completed(aliases.task(id), is_completed)
                .map(|_| ()),
            Undo::TaskPlacement { id, placement } => {
                let id = aliases.task(id);
                let placement = placement.remap(|id| aliases.list(id), |id| aliases.task(id));
                let placement = board.clamp_placement(id, placement)?;
                board.move_task(id, placement).map(|_| ())
            }
        }
    }
}

/// Provisional id → server id, kept for every entity confirmed this session.
#[derive(Debug, Default)]
pub struct Aliases {
    lists: HashMap<ListId, ListId>,
    tasks: HashMap<TaskId, TaskId>,
}

impl Aliases {
    pub fn list(&self, id: ListId) -> ListId {
        self.lists.get(&id).copied().unwrap_or(id)
    }

    pub fn task(&self, id: TaskId) -> TaskId {
        self.tasks.get(&id).copied().unwrap_or(id)
    }

    pub fn entity(&self, entity: EntityRef) -> EntityRef {
        match entity {
            EntityRef::List(id) => EntityRef::List(self.list(id)),
            EntityRef::Task(id) => EntityRef::Task(self.task(id)),
        }
    }

    pub fn insert_list(&mut self, provisional: ListId, confirmed: ListId) {
        self.lists.insert(provisional, confirmed);
    }

    pub fn insert_task(&mut self, provisional: TaskId, confirmed: TaskId) {
        self.tasks.insert(provisional, confirmed);
    }
}

#[derive(Debug)]
struct Record {
    field: Field,
    undo: Undo,
    predecessor: Option<u64>,
}

#[derive(Debug)]
struct PendingOp {
    kind: MutationKind,
    entity: EntityRef,
    records: Vec<Record>,
}

#[derive(Debug, Default)]
pub struct Journal {
    next_seq: u64,
    pending: BTreeMap<u64, PendingOp>,
    owners: HashMap<Field, u64>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an applied operation and takes ownership of every field it wrote.
    pub fn begin(&mut self, kind: MutationKind, entity: EntityRef, changes: Vec<(Field, Undo)>) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let records = changes
            .into_iter()
            .map(|(field, undo)| Record {
                field,
                undo,
                predecessor: self.owners.insert(field, seq),
            })
            .collect();
        self.pending.insert(
            seq,
            PendingOp {
                kind,
                entity,
                records,
            },
        );
        seq
    }

    /// Releases the operation's fields. Later writers keep their own undo values.
    pub fn confirm(&mut self, seq: u64) -> Option<(MutationKind, EntityRef)> {
        let op = self.pending.remove(&seq)?;
        for record in op.records {
            if self.owners.get(&record.field) == Some(&seq) {
                self.owners.remove(&record.field);
            } else if let Some(successor) = self.successor_mut(record.field, seq) {
                successor.predecessor = None;
            }
        }
        Some((op.kind, op.entity))
    }

    /// Removes a failed operation and returns the undos to apply, in order.
    pub fn fail(&mut self, seq: u64) -> Vec<Undo> {
        let Some(op) = self.pending.remove(&seq) else {
            return Vec::new();
        };
        let mut undos = Vec::new();
        for record in op.records.into_iter().rev() {
            if self.owners.get(&record.field) == Some(&seq) {
                match record.predecessor.filter(|p| self.pending.contains_key(p)) {
                    Some(predecessor) => self.owners.insert(record.field, predecessor),
                    None => self.owners.remove(&record.field),
                };
                undos.push(record.undo);
            } else if let Some(successor) = self.successor_mut(record.field, seq) {
                successor.undo = record.undo;
                successor.predecessor = record.predecessor;
            }
        }
        undos
    }

    fn successor_mut(&mut self, field: Field, seq: u64) -> Option<&mut Record> {
        self.pending
            .values_mut()
            .flat_map(|op| op.records.iter_mut())
            .find(|record| record.field == field && record.predecessor == Some(seq))
    }

    /// Follows a provisional id being replaced by its server id.
    pub fn rekey(&mut self, old: EntityRef, new: EntityRef) {
        self.owners = self
            .owners
            .drain()
            .map(|(field, seq)| (field.rekey(old, new), seq))
            .collect();
        for op in self.pending.values_mut() {
            if op.entity == old {
                op.entity = new;
            }
            for record in op.records.iter_mut() {
                record.field = record.field.rekey(old, new);
            }
        }
    }

    /// Carries a name or completion undo into the snapshot of a pending
    /// deletion when the entity itself is currently off the board.
    pub fn patch_removed(&mut self, undo: &Undo, aliases: &Aliases) -> bool {
        let mut patched = false;
        for record in self.pending.values_mut().flat_map(|op| op.records.iter_mut()) {
            let tasks = match &mut record.undo {
                Undo::RestoreList(removed) => {
                    if let Undo::ListName { id, name } = undo {
                        if aliases.list(removed.list.id) == aliases.list(*id) {
                            removed.list.name = name.clone();
                            patched = true;
                        }
                    }
                    &mut removed.tasks
                }
                Undo::RestoreTask(removed) => {
                    if let Undo::TaskPlacement { id, placement } = undo {
                        if removed.root_id().map(|root| aliases.task(root)) == Some(aliases.task(*id)) {
                            removed.placement = *placement;
                            patched = true;
                        }
                    }
                    &mut removed.tasks
                }
                _ => continue,
            };
            for task in tasks.iter_mut() {
                match undo {
                    Undo::TaskName { id, name } if aliases.task(task.id) == aliases.task(*id) => {
                        task.name = name.clone();
                        patched = true;
                    }
                    Undo::TaskCompletion { id, is_completed }
                        if aliases.task(task.id) == aliases.task(*id) =>
                    {
                        task.is_completed = *is_completed;
                        patched = true;
                    }
                    _ => {}
                }
            }
        }
        patched
    }

    fn snapshots_mut(&mut self) -> impl Iterator<Item = &mut Undo> {
        self.pending
            .values_mut()
            .flat_map(|op| op.records.iter_mut())
            .map(|record| &mut record.undo)
            .filter(|undo| matches!(undo, Undo::RestoreList(_) | Undo::RestoreTask(_)))
    }

    /// Detaches a task subtree from the pending deletion that swallowed it.
    pub fn take_removed(&mut self, id: TaskId, aliases: &Aliases) -> Option<Vec<Task>> {
        for undo in self.snapshots_mut() {
            let taken = match undo {
                Undo::RestoreList(removed) => {
                    snapshot_id(&removed.tasks, id, aliases).and_then(|raw| removed.take_task(raw))
                }
                Undo::RestoreTask(removed) => {
                    snapshot_id(&removed.tasks, id, aliases).and_then(|raw| removed.take_task(raw))
                }
                _ => None,
            };
            if taken.is_some() {
                return taken;
            }
        }
        None
    }

    /// Places a task subtree at `placement` inside the pending deletion that
    /// holds that spot. Hands the tasks back when no snapshot does.
    pub fn graft_removed(&mut self, placement: Placement, tasks: Vec<Task>, aliases: &Aliases) -> Result<(), Vec<Task>> {
        let mut tasks = tasks;
        for undo in self.snapshots_mut() {
            tasks = match (undo, placement.parent_id) {
                (Undo::RestoreList(removed), None) => {
                    if aliases.list(removed.list.id) != placement.list_id {
                        continue;
                    }
                    return removed.graft_task(None, placement.index, tasks);
                }
                (Undo::RestoreList(removed), Some(parent_id)) => {
                    match snapshot_id(&removed.tasks, parent_id, aliases) {
                        Some(raw) => return removed.graft_task(Some(raw), placement.index, tasks),
                        None => tasks,
                    }
                }
                (Undo::RestoreTask(removed), Some(parent_id)) => {
                    match snapshot_id(&removed.tasks, parent_id, aliases) {
                        Some(raw) => return removed.graft_task(raw, placement.index, tasks),
                        None => tasks,
                    }
                }
                _ => tasks,
            };
        }
        Err(tasks)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn owner(&self, field: Field) -> Option<u64> {
        self.owners.get(&field).copied()
    }
}

/// The id a snapshot uses for `id`, which may still be the provisional one.
fn snapshot_id(tasks: &[Task], id: TaskId, aliases: &Aliases) -> Option<TaskId> {
    tasks
        .iter()
        .find(|task| aliases.task(task.id) == id)
        .map(|task| task.id)
}

/// Applies rollback undos, falling back to pending deletions when the entity
/// or its old position is currently off the board. Returns `false` when a
/// step had to be skipped and the board may no longer match the server.
pub fn apply_undos(board: &mut Board, journal: &mut Journal, aliases: &Aliases, undos: Vec<Undo>) -> bool {
    let mut consistent = true;
    for undo in undos {
        let fallback = undo.clone();
        let Err(e) = undo.apply(board, aliases) else {
            continue;
        };
        if matches!(e, BoardError::NotFound(_)) {
            match recover_removed(board, journal, aliases, &fallback) {
                Ok(true) => {
                    tracing::debug!("Rollback carried across a pending deletion: {:?}", fallback);
                    continue;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to carry rollback step {:?}: {}", fallback, e),
            }
        }
        tracing::warn!("Skipping rollback step {:?}: {}", fallback, e);
        consistent = false;
    }
    consistent
}

fn recover_removed(board: &mut Board, journal: &mut Journal, aliases: &Aliases, undo: &Undo) -> BoardResult<bool> {
    if journal.patch_removed(undo, aliases) {
        return Ok(true);
    }
    let Undo::TaskPlacement { id, placement } = undo else {
        return Ok(false);
    };
    let id = aliases.task(*id);
    let mut placement = placement.remap(|id| aliases.list(id), |id| aliases.task(id));
    if let Some(parent) = placement.parent_id.and_then(|parent| board.task(parent)) {
        placement.list_id = parent.list_id;
    }
    let target_on_board = board.siblings(placement.list_id, placement.parent_id).is_ok();

    if board.contains_task(id) {
        if target_on_board {
            return Ok(false);
        }
        // The old position went away with a pending deletion: follow it there.
        let removed = board.remove_task(id)?;
        return match journal.graft_removed(placement, removed.tasks, aliases) {
            Ok(()) => Ok(true),
            Err(tasks) => {
                board.restore_task(RemovedTask {
                    placement: removed.placement,
                    tasks,
                })?;
                Ok(false)
            }
        };
    }

    let Some(tasks) = journal.take_removed(id, aliases) else {
        return Ok(false);
    };
    if target_on_board {
        let removed = RemovedTask { placement, tasks }.remap(|id| aliases.list(id), |id| aliases.task(id));
        board.restore_task(removed)?;
        return Ok(true);
    }
    Ok(journal.graft_removed(placement, tasks, aliases).is_ok())
}
