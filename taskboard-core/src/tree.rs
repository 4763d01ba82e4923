//! Recursive operations over a task's descendants, plus the ephemeral
//! expand/visibility flags the UI keeps for each task.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::{Board, ListId, TaskId};
use crate::BoardResult;

/// Completed and total counts over a set of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Completion {
    pub completed: usize,
    pub total: usize,
}

impl Completion {
    pub fn is_fully_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    fn add(&mut self, is_completed: bool) {
        self.total += 1;
        if is_completed {
            self.completed += 1;
        }
    }
}

impl std::ops::AddAssign for Completion {
    fn add_assign(&mut self, other: Self) {
        self.completed += other.completed;
        self.total += other.total;
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Counts completed descendants of `task` at every depth. The task itself is not counted.
pub fn count_completion(board: &Board, task: TaskId) -> BoardResult<Completion> {
    let mut completion = Completion::default();
    for id in subtree(board, task)?.into_iter().skip(1) {
        if let Some(descendant) = board.task(id) {
            completion.add(descendant.is_completed);
        }
    }
    Ok(completion)
}

/// Aggregates a whole list: every top-level task counts itself plus its descendants.
pub fn list_completion(board: &Board, list: ListId) -> BoardResult<Completion> {
    let mut completion = Completion::default();
    for root in &board.require_list(list)?.task_ids {
        let task = board.require_task(*root)?;
        completion.add(task.is_completed);
        completion += count_completion(board, *root)?;
    }
    Ok(completion)
}

pub fn collect_descendant_ids(board: &Board, task: TaskId) -> BoardResult<HashSet<TaskId>> {
    Ok(subtree(board, task)?.into_iter().skip(1).collect())
}

/// Pre-order walk of the subtree rooted at `task`, root first.
pub fn subtree(board: &Board, task: TaskId) -> BoardResult<Vec<TaskId>> {
    board.require_task(task)?;
    let mut order = Vec::new();
    let mut stack = vec![task];
    while let Some(id) = stack.pop() {
        if let Some(node) = board.task(id) {
            order.push(id);
            stack.extend(node.child_ids.iter().rev().copied());
        }
    }
    Ok(order)
}

/// True when `candidate` sits somewhere below `ancestor`.
pub fn is_descendant(board: &Board, ancestor: TaskId, candidate: TaskId) -> bool {
    let mut current = board.task(candidate).and_then(|task| task.parent_id);
    // A well-formed board never needs more steps than it has tasks.
    let mut steps = board.task_count();
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        if steps == 0 {
            return false;
        }
        steps -= 1;
        current = board.task(id).and_then(|task| task.parent_id);
    }
    false
}

/// Depth of a task, 0 for top-level tasks.
pub fn task_depth(board: &Board, task: TaskId) -> BoardResult<usize> {
    let mut depth = 0;
    let mut current = board.require_task(task)?.parent_id;
    while let Some(id) = current {
        depth += 1;
        if depth > board.task_count() {
            break;
        }
        current = board.task(id).and_then(|task| task.parent_id);
    }
    Ok(depth)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFlags {
    pub expanded: bool,
    pub visible: bool,
}

impl Default for ViewFlags {
    fn default() -> Self {
        Self {
            expanded: false,
            visible: true,
        }
    }
}

/// Per-task UI flags. Never persisted and never sent to the server.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    flags: HashMap<TaskId, ViewFlags>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self, task: TaskId) -> ViewFlags {
        self.flags.get(&task).copied().unwrap_or_default()
    }

    pub fn set_expanded(&mut self, task: TaskId, expanded: bool) {
        self.flags.entry(task).or_default().expanded = expanded;
    }

    pub fn set_visible(&mut self, task: TaskId, visible: bool) {
        self.flags.entry(task).or_default().visible = visible;
    }

    /// Flips `expanded`, only for tasks that have subtasks. Returns the new value.
    pub fn toggle_expanded(&mut self, board: &Board, task: TaskId) -> BoardResult<bool> {
        let has_subtasks = board.require_task(task)?.has_subtasks();
        let flags = self.flags.entry(task).or_default();
        if has_subtasks {
            flags.expanded = !flags.expanded;
        }
        Ok(flags.expanded)
    }

    /// Flips `visible`; a task that becomes visible is also expanded.
    pub fn toggle_visibility(&mut self, task: TaskId) -> bool {
        let flags = self.flags.entry(task).or_default();
        flags.visible = !flags.visible;
        if flags.visible {
            flags.expanded = true;
        }
        flags.visible
    }

    pub fn reveal_children(&mut self, task: TaskId) {
        let flags = self.flags.entry(task).or_default();
        flags.expanded = true;
        flags.visible = true;
    }

    /// A task is rendered when it is visible and every ancestor is expanded and visible.
    pub fn is_rendered(&self, board: &Board, task: TaskId) -> bool {
        let Some(node) = board.task(task) else {
            return false;
        };
        if !self.flags(task).visible {
            return false;
        }
        let mut current = node.parent_id;
        let mut steps = board.task_count();
        while let Some(id) = current {
            let flags = self.flags(id);
            if !flags.expanded || !flags.visible || steps == 0 {
                return false;
            }
            steps -= 1;
            current = board.task(id).and_then(|parent| parent.parent_id);
        }
        true
    }

    /// Drops flags of tasks no longer on the board.
    pub fn prune(&mut self, board: &Board) {
        self.flags.retain(|id, _| board.contains_task(*id));
    }

    pub fn rekey(&mut self, old: TaskId, new: TaskId) {
        if let Some(flags) = self.flags.remove(&old) {
            self.flags.insert(new, flags);
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
