//! Turns a drag gesture into a committed move through the [`BoardStore`].
//!
//! `Idle → Dragging → Resolving → Idle`, or `Idle → Dragging → Idle` for a
//! cancelled drop. While not idle the engine holds the store's drag lock,
//! which defers server refreshes.

use taskboard_core::{BoardError, BoardResult, ListId, Placement, TaskId};
use tracing::debug;

use crate::pending::Pending;
use crate::store::BoardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSubject {
    Task(TaskId),
    List(ListId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOrigin {
    Task(Placement),
    Board { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub subject: DragSubject,
    pub origin: DragOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging(DragSession),
    Resolving(DragSession),
}

/// Where the drop landed, as reported by the drag-and-drop layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Task {
        list_id: ListId,
        parent_id: Option<TaskId>,
        index: usize,
    },
    Board {
        index: usize,
    },
}

#[derive(Debug)]
pub enum DropOutcome {
    /// Dropped outside any droppable.
    Cancelled,
    /// Dropped back where it started.
    Unchanged,
    /// Applied locally; the handle resolves once the server confirms.
    Committed(Pending<()>),
}

pub struct DragReorderEngine {
    store: BoardStore,
    state: DragState,
}

impl DragReorderEngine {
    pub fn new(store: BoardStore) -> Self {
        Self {
            store,
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn begin(&mut self, subject: DragSubject) -> BoardResult<()> {
        if self.state != DragState::Idle {
            return Err(BoardError::InvalidState("a drag is already in progress".into()));
        }
        let origin = match subject {
            DragSubject::Task(id) => DragOrigin::Task(self.store.placement(id)?),
            DragSubject::List(id) => DragOrigin::Board {
                index: self.store.list_position(id)?,
            },
        };
        self.store.acquire_drag_lock()?;
        debug!("Dragging {:?} from {:?}", subject, origin);
        self.state = DragState::Dragging(DragSession { subject, origin });
        Ok(())
    }

    /// Abandons the current drag. Returns false when nothing was being dragged.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            DragState::Dragging(session) => {
                debug!("Cancelled drag of {:?}", session.subject);
                self.finish();
                true
            }
            DragState::Idle | DragState::Resolving(_) => false,
        }
    }

    /// Resolves the drop. The engine is back to `Idle` whatever the result.
    pub fn drop_on(&mut self, target: Option<DropTarget>) -> BoardResult<DropOutcome> {
        let DragState::Dragging(session) = self.state else {
            return Err(BoardError::InvalidState("no drag in progress".into()));
        };
        let Some(target) = target else {
            self.cancel();
            return Ok(DropOutcome::Cancelled);
        };

        self.state = DragState::Resolving(session);
        let outcome = self.resolve(session, target);
        self.finish();
        outcome
    }

    fn resolve(&self, session: DragSession, target: DropTarget) -> BoardResult<DropOutcome> {
        match (session.subject, target) {
            (
                DragSubject::Task(id),
                DropTarget::Task {
                    list_id,
                    parent_id,
                    index,
                },
            ) => {
                let placement = self.store.task_drop_placement(
                    id,
                    Placement {
                        list_id,
                        parent_id,
                        index,
                    },
                )?;
                if session.origin == DragOrigin::Task(placement) {
                    return Ok(DropOutcome::Unchanged);
                }
                let pending =
                    self.store
                        .move_task(id, placement.list_id, placement.parent_id, placement.index)?;
                Ok(committed(pending))
            }
            (DragSubject::List(id), DropTarget::Board { index }) => {
                let last = self.store.lists_in_order().len().saturating_sub(1);
                let index = index.min(last);
                if session.origin == (DragOrigin::Board { index }) {
                    return Ok(DropOutcome::Unchanged);
                }
                Ok(committed(self.store.reorder_list(id, index)?))
            }
            (DragSubject::Task(id), DropTarget::Board { .. }) => Err(BoardError::validation(format!(
                "task {} cannot be dropped between lists",
                id
            ))),
            (DragSubject::List(id), DropTarget::Task { .. }) => Err(BoardError::validation(format!(
                "list {} cannot be dropped into a list",
                id
            ))),
        }
    }

    fn finish(&mut self) {
        self.state = DragState::Idle;
        self.store.release_drag_lock();
    }
}

fn committed(pending: Pending<()>) -> DropOutcome {
    if pending.is_settled() {
        DropOutcome::Unchanged
    } else {
        DropOutcome::Committed(pending)
    }
}

impl Drop for DragReorderEngine {
    fn drop(&mut self) {
        if self.state != DragState::Idle {
            self.finish();
        }
    }
}
