use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::errors::BoardError;
use crate::tree;
use crate::BoardResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl ListId {
    /// Provisional ids are negative and only exist until the server confirms the list.
    pub fn is_provisional(self) -> bool {
        self.0 < 0
    }
}

impl TaskId {
    pub fn is_provisional(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to either kind of board entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    List(ListId),
    Task(TaskId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::List(id) => write!(f, "list {}", id),
            EntityRef::Task(id) => write!(f, "task {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    pub name: String,
    pub order_index: usize,
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub is_completed: bool,
    pub list_id: ListId,
    pub parent_id: Option<TaskId>,
    pub order_index: usize,
    pub child_ids: Vec<TaskId>,
}

impl Task {
    pub fn has_subtasks(&self) -> bool {
        !self.child_ids.is_empty()
    }
}

/// A list or a task, tagged with its kind when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    List(List),
    Task(Task),
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Entity::List(list) => EntityRef::List(list.id),
            Entity::Task(task) => EntityRef::Task(task.id),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::List(list) => &list.name,
            Entity::Task(task) => &task.name,
        }
    }
}

/// Where a task sits: its list, its parent (None for top-level) and its rank among siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub list_id: ListId,
    pub parent_id: Option<TaskId>,
    pub index: usize,
}

impl Placement {
    pub fn top_level(list_id: ListId, index: usize) -> Self {
        Self {
            list_id,
            parent_id: None,
            index,
        }
    }

    pub fn nested(list_id: ListId, parent_id: TaskId, index: usize) -> Self {
        Self {
            list_id,
            parent_id: Some(parent_id),
            index,
        }
    }

    pub fn remap(self, lists: impl Fn(ListId) -> ListId, tasks: impl Fn(TaskId) -> TaskId) -> Self {
        Self {
            list_id: lists(self.list_id),
            parent_id: self.parent_id.map(tasks),
            index: self.index,
        }
    }
}

/// A list taken off the board together with every task it contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedList {
    pub list: List,
    pub index: usize,
    pub tasks: Vec<Task>,
}

impl RemovedList {
    pub fn remap(mut self, lists: impl Fn(ListId) -> ListId, tasks: impl Fn(TaskId) -> TaskId) -> Self {
        self.list.id = lists(self.list.id);
        for id in self.list.task_ids.iter_mut() {
            *id = tasks(*id);
        }
        for task in self.tasks.iter_mut() {
            remap_task(task, &lists, &tasks);
        }
        self
    }

    /// Detaches a task and its descendants from the snapshot.
    pub fn take_task(&mut self, id: TaskId) -> Option<Vec<Task>> {
        detach_subtree(&mut self.tasks, Some(&mut self.list.task_ids), id)
    }

    /// Inserts a subtree into the snapshot, at the top level or below `parent_id`.
    /// Hands the tasks back when the parent is not part of the snapshot.
    pub fn graft_task(&mut self, parent_id: Option<TaskId>, index: usize, tasks: Vec<Task>) -> Result<(), Vec<Task>> {
        let list_id = self.list.id;
        attach_subtree(&mut self.tasks, Some(&mut self.list.task_ids), list_id, parent_id, index, tasks)
    }
}

/// A task subtree taken off the board. `tasks[0]` is the subtree root, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTask {
    pub placement: Placement,
    pub tasks: Vec<Task>,
}

impl RemovedTask {
    pub fn root_id(&self) -> Option<TaskId> {
        self.tasks.first().map(|task| task.id)
    }

    pub fn remap(mut self, lists: impl Fn(ListId) -> ListId, tasks: impl Fn(TaskId) -> TaskId) -> Self {
        self.placement = self.placement.remap(&lists, &tasks);
        for task in self.tasks.iter_mut() {
            remap_task(task, &lists, &tasks);
        }
        self
    }

    /// Detaches a descendant of the root from the snapshot. The root itself
    /// cannot be taken.
    pub fn take_task(&mut self, id: TaskId) -> Option<Vec<Task>> {
        if self.root_id() == Some(id) {
            return None;
        }
        detach_subtree(&mut self.tasks, None, id)
    }

    pub fn graft_task(&mut self, parent_id: TaskId, index: usize, tasks: Vec<Task>) -> Result<(), Vec<Task>> {
        let list_id = self.placement.list_id;
        attach_subtree(&mut self.tasks, None, list_id, Some(parent_id), index, tasks)
    }
}

fn detach_subtree(tasks: &mut Vec<Task>, roots: Option<&mut Vec<TaskId>>, id: TaskId) -> Option<Vec<Task>> {
    let parent_id = tasks.iter().find(|task| task.id == id)?.parent_id;
    let siblings = match parent_id {
        Some(parent_id) => &mut tasks.iter_mut().find(|task| task.id == parent_id)?.child_ids,
        None => roots?,
    };
    siblings.retain(|sibling| *sibling != id);
    let ranks = siblings.clone();
    rerank_snapshot(tasks, &ranks);

    let mut taken = Vec::new();
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        if let Some(position) = tasks.iter().position(|task| task.id == next) {
            let task = tasks.remove(position);
            stack.extend(task.child_ids.iter().rev().copied());
            taken.push(task);
        }
    }
    Some(taken)
}

fn attach_subtree(
    tasks: &mut Vec<Task>,
    roots: Option<&mut Vec<TaskId>>,
    list_id: ListId,
    parent_id: Option<TaskId>,
    index: usize,
    mut subtree: Vec<Task>,
) -> Result<(), Vec<Task>> {
    let Some(root_id) = subtree.first().map(|task| task.id) else {
        return Err(subtree);
    };
    let siblings = match parent_id {
        Some(parent_id) => match tasks.iter_mut().find(|task| task.id == parent_id) {
            Some(parent) => &mut parent.child_ids,
            None => return Err(subtree),
        },
        None => match roots {
            Some(roots) => roots,
            None => return Err(subtree),
        },
    };
    let index = index.min(siblings.len());
    siblings.insert(index, root_id);
    let ranks = siblings.clone();

    for task in subtree.iter_mut() {
        task.list_id = list_id;
    }
    if let Some(root) = subtree.first_mut() {
        root.parent_id = parent_id;
    }
    tasks.extend(subtree);
    rerank_snapshot(tasks, &ranks);
    Ok(())
}

fn rerank_snapshot(tasks: &mut [Task], siblings: &[TaskId]) {
    for task in tasks.iter_mut() {
        if let Some(index) = siblings.iter().position(|id| *id == task.id) {
            task.order_index = index;
        }
    }
}

fn remap_task(task: &mut Task, lists: &impl Fn(ListId) -> ListId, tasks: &impl Fn(TaskId) -> TaskId) {
    task.id = tasks(task.id);
    task.list_id = lists(task.list_id);
    task.parent_id = task.parent_id.map(tasks);
    for child in task.child_ids.iter_mut() {
        *child = tasks(*child);
    }
}

/// The board arena: ordered lists plus id-indexed list and task records.
///
/// Every mutating method keeps sibling `order_index` values dense and keeps
/// `list_id` consistent across a subtree, so the board is valid between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    pub(crate) order: Vec<ListId>,
    pub(crate) lists: HashMap<ListId, List>,
    pub(crate) tasks: HashMap<TaskId, Task>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_ids(&self) -> &[ListId] {
        &self.order
    }

    pub fn lists(&self) -> impl Iterator<Item = &List> {
        self.order.iter().filter_map(move |id| self.lists.get(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn list(&self, id: ListId) -> Option<&List> {
        self.lists.get(&id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn list_count(&self) -> usize {
        self.order.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn contains_list(&self, id: ListId) -> bool {
        self.lists.contains_key(&id)
    }

    pub fn contains_task(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn require_list(&self, id: ListId) -> BoardResult<&List> {
        self.lists
            .get(&id)
            .ok_or(BoardError::NotFound(EntityRef::List(id)))
    }

    pub fn require_task(&self, id: TaskId) -> BoardResult<&Task> {
        self.tasks
            .get(&id)
            .ok_or(BoardError::NotFound(EntityRef::Task(id)))
    }

    pub fn entity(&self, entity: EntityRef) -> BoardResult<Entity> {
        match entity {
            EntityRef::List(id) => self.require_list(id).cloned().map(Entity::List),
            EntityRef::Task(id) => self.require_task(id).cloned().map(Entity::Task),
        }
    }

    /// The ordered sibling group a task with this list/parent belongs to.
    pub fn siblings(&self, list_id: ListId, parent_id: Option<TaskId>) -> BoardResult<&[TaskId]> {
        match parent_id {
            Some(parent_id) => Ok(&self.require_task(parent_id)?.child_ids),
            None => Ok(&self.require_list(list_id)?.task_ids),
        }
    }

    fn siblings_mut(
        &mut self,
        list_id: ListId,
        parent_id: Option<TaskId>,
    ) -> BoardResult<&mut Vec<TaskId>> {
        match parent_id {
            Some(parent_id) => self
                .tasks
                .get_mut(&parent_id)
                .map(|task| &mut task.child_ids)
                .ok_or(BoardError::NotFound(EntityRef::Task(parent_id))),
            None => self
                .lists
                .get_mut(&list_id)
                .map(|list| &mut list.task_ids)
                .ok_or(BoardError::NotFound(EntityRef::List(list_id))),
        }
    }

    fn rerank(&mut self, list_id: ListId, parent_id: Option<TaskId>) -> BoardResult<()> {
        let ids = self.siblings(list_id, parent_id)?.to_vec();
        for (index, id) in ids.iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(id) {
                task.order_index = index;
            }
        }
        Ok(())
    }

    fn rerank_lists(&mut self) {
        for (index, id) in self.order.iter().enumerate() {
            if let Some(list) = self.lists.get_mut(id) {
                list.order_index = index;
            }
        }
    }

    pub fn placement(&self, id: TaskId) -> BoardResult<Placement> {
        let task = self.require_task(id)?;
        Ok(Placement {
            list_id: task.list_id,
            parent_id: task.parent_id,
            index: task.order_index,
        })
    }

    pub fn list_position(&self, id: ListId) -> BoardResult<usize> {
        self.require_list(id).map(|list| list.order_index)
    }

    // ---- lists ----------------------------------------------------------

    pub fn insert_list(&mut self, id: ListId, name: impl Into<String>, index: usize) -> BoardResult<()> {
        if self.lists.contains_key(&id) {
            return Err(BoardError::InvalidState(format!("list {} already exists", id)));
        }
        let index = index.min(self.order.len());
        self.order.insert(index, id);
        self.lists.insert(
            id,
            List {
                id,
                name: name.into(),
                order_index: index,
                task_ids: Vec::new(),
            },
        );
        self.rerank_lists();
        Ok(())
    }

    /// Renames a list and returns its previous name.
    pub fn rename_list(&mut self, id: ListId, name: impl Into<String>) -> BoardResult<String> {
        let list = self
            .lists
            .get_mut(&id)
            .ok_or(BoardError::NotFound(EntityRef::List(id)))?;
        Ok(std::mem::replace(&mut list.name, name.into()))
    }

    /// Moves a list to `index` and returns its previous position.
    pub fn move_list(&mut self, id: ListId, index: usize) -> BoardResult<usize> {
        let previous = self.list_position(id)?;
        if index >= self.order.len() {
            return Err(BoardError::validation(format!(
                "list index {} out of range (0..{})",
                index,
                self.order.len()
            )));
        }
        if index != previous {
            self.order.remove(previous);
            self.order.insert(index, id);
            self.rerank_lists();
        }
        Ok(previous)
    }

    /// Removes a list and every task it contains.
    pub fn remove_list(&mut self, id: ListId) -> BoardResult<RemovedList> {
        let index = self.list_position(id)?;
        let list = self
            .lists
            .remove(&id)
            .ok_or(BoardError::NotFound(EntityRef::List(id)))?;
        self.order.remove(index);
        self.rerank_lists();

        let mut tasks = Vec::new();
        for root in &list.task_ids {
            tasks.extend(self.take_subtree(*root));
        }
        let strays: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|task| task.list_id == id)
            .map(|task| task.id)
            .collect();
        for stray in strays {
            tracing::warn!("Task {} claimed list {} without being reachable from it", stray, id);
            tasks.extend(self.take_subtree(stray));
        }

        Ok(RemovedList { list, index, tasks })
    }

    pub fn restore_list(&mut self, removed: RemovedList) -> BoardResult<()> {
        let RemovedList { list, index, tasks } = removed;
        if self.lists.contains_key(&list.id) {
            return Err(BoardError::InvalidState(format!("list {} already exists", list.id)));
        }
        if let Some(task) = tasks.iter().find(|task| self.tasks.contains_key(&task.id)) {
            return Err(BoardError::InvalidState(format!("task {} already exists", task.id)));
        }
        let index = index.min(self.order.len());
        self.order.insert(index, list.id);
        self.lists.insert(list.id, list);
        for task in tasks {
            self.tasks.insert(task.id, task);
        }
        self.rerank_lists();
        Ok(())
    }

    pub fn rekey_list(&mut self, old: ListId, new: ListId) -> BoardResult<()> {
        if old == new {
            return Ok(());
        }
        if self.lists.contains_key(&new) {
            return Err(BoardError::InvalidState(format!("list {} already exists", new)));
        }
        let mut list = self
            .lists
            .remove(&old)
            .ok_or(BoardError::NotFound(EntityRef::List(old)))?;
        list.id = new;
        self.lists.insert(new, list);
        for id in self.order.iter_mut().filter(|id| **id == old) {
            *id = new;
        }
        for task in self.tasks.values_mut().filter(|task| task.list_id == old) {
            task.list_id = new;
        }
        Ok(())
    }

    // ---- tasks ----------------------------------------------------------

    pub fn insert_task(
        &mut self,
        id: TaskId,
        name: impl Into<String>,
        is_completed: bool,
        placement: Placement,
    ) -> BoardResult<()> {
        if self.tasks.contains_key(&id) {
            return Err(BoardError::InvalidState(format!("task {} already exists", id)));
        }
        self.check_parent(placement)?;
        let siblings = self.siblings_mut(placement.list_id, placement.parent_id)?;
        let index = placement.index.min(siblings.len());
        siblings.insert(index, id);
        self.tasks.insert(
            id,
            Task {
                id,
                name: name.into(),
                is_completed,
                list_id: placement.list_id,
                parent_id: placement.parent_id,
                order_index: index,
                child_ids: Vec::new(),
            },
        );
        self.rerank(placement.list_id, placement.parent_id)
    }

    fn check_parent(&self, placement: Placement) -> BoardResult<()> {
        self.require_list(placement.list_id)?;
        if let Some(parent_id) = placement.parent_id {
            let parent = self.require_task(parent_id)?;
            if parent.list_id != placement.list_id {
                return Err(BoardError::validation(format!(
                    "parent task {} belongs to list {}, not list {}",
                    parent_id, parent.list_id, placement.list_id
                )));
            }
        }
        Ok(())
    }

    /// Renames a task and returns its previous name.
    pub fn rename_task(&mut self, id: TaskId, name: impl Into<String>) -> BoardResult<String> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(BoardError::NotFound(EntityRef::Task(id)))?;
        Ok(std::mem::replace(&mut task.name, name.into()))
    }

    /// Sets the completion flag of a single task and returns the previous value.
    pub fn set_completed(&mut self, id: TaskId, is_completed: bool) -> BoardResult<bool> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(BoardError::NotFound(EntityRef::Task(id)))?;
        Ok(std::mem::replace(&mut task.is_completed, is_completed))
    }

    /// Highest index a task may take in the given sibling group.
    fn move_limit(&self, id: TaskId, target: Placement) -> BoardResult<usize> {
        let origin = self.placement(id)?;
        let len = self.siblings(target.list_id, target.parent_id)?.len();
        let same_group = origin.list_id == target.list_id && origin.parent_id == target.parent_id;
        Ok(if same_group { len.saturating_sub(1) } else { len })
    }

    /// Validates a move target and resolves an index equal to the group's
    /// current length to an append.
    pub fn normalize_move(&self, id: TaskId, target: Placement) -> BoardResult<Placement> {
        self.require_task(id)?;
        self.require_list(target.list_id)?;
        if let Some(parent_id) = target.parent_id {
            if parent_id == id {
                return Err(BoardError::validation(format!(
                    "task {} cannot become its own parent",
                    id
                )));
            }
            self.require_task(parent_id)?;
            if tree::is_descendant(self, id, parent_id) {
                return Err(BoardError::validation(format!(
                    "task {} cannot move into its own subtask {}",
                    id, parent_id
                )));
            }
        }
        self.check_parent(target)?;

        let len = self.siblings(target.list_id, target.parent_id)?.len();
        if target.index > len {
            return Err(BoardError::validation(format!(
                "task index {} out of range (0..={})",
                target.index, len
            )));
        }
        let limit = self.move_limit(id, target)?;
        Ok(Placement {
            index: target.index.min(limit),
            ..target
        })
    }

    /// Clamps a placement into the range currently available, for restoring
    /// a task to where it used to be.
    pub fn clamp_placement(&self, id: TaskId, placement: Placement) -> BoardResult<Placement> {
        let limit = self.move_limit(id, placement)?;
        Ok(Placement {
            index: placement.index.min(limit),
            ..placement
        })
    }

    /// Re-parents a task (with its subtree) and returns where it was before.
    pub fn move_task(&mut self, id: TaskId, target: Placement) -> BoardResult<Placement> {
        let origin = self.placement(id)?;
        let target = self.normalize_move(id, target)?;
        if target == origin {
            return Ok(origin);
        }

        self.siblings_mut(origin.list_id, origin.parent_id)?
            .retain(|sibling| *sibling != id);
        self.rerank(origin.list_id, origin.parent_id)?;

        if origin.list_id != target.list_id {
            let mut moved = tree::collect_descendant_ids(self, id)?;
            moved.insert(id);
            for task_id in moved {
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.list_id = target.list_id;
                }
            }
        }
        if let Some(task) = self.tasks.get_mut(&id) {
            task.parent_id = target.parent_id;
        }

        self.siblings_mut(target.list_id, target.parent_id)?
            .insert(target.index, id);
        self.rerank(target.list_id, target.parent_id)?;
        Ok(origin)
    }

    /// Removes a task and all of its descendants.
    pub fn remove_task(&mut self, id: TaskId) -> BoardResult<RemovedTask> {
        let placement = self.placement(id)?;
        self.siblings_mut(placement.list_id, placement.parent_id)?
            .retain(|sibling| *sibling != id);
        self.rerank(placement.list_id, placement.parent_id)?;
        let tasks = self.take_subtree(id);
        Ok(RemovedTask { placement, tasks })
    }

    pub fn restore_task(&mut self, removed: RemovedTask) -> BoardResult<()> {
        let RemovedTask {
            placement,
            mut tasks,
        } = removed;
        let Some(root_id) = tasks.first().map(|task| task.id) else {
            return Err(BoardError::InvalidState("cannot restore an empty subtree".into()));
        };
        if let Some(task) = tasks.iter().find(|task| self.tasks.contains_key(&task.id)) {
            return Err(BoardError::InvalidState(format!("task {} already exists", task.id)));
        }
        self.check_parent(placement)?;

        for task in tasks.iter_mut() {
            task.list_id = placement.list_id;
        }
        if let Some(root) = tasks.first_mut() {
            root.parent_id = placement.parent_id;
        }

        let siblings = self.siblings_mut(placement.list_id, placement.parent_id)?;
        let index = placement.index.min(siblings.len());
        siblings.insert(index, root_id);
        for task in tasks {
            self.tasks.insert(task.id, task);
        }
        self.rerank(placement.list_id, placement.parent_id)
    }

    pub fn rekey_task(&mut self, old: TaskId, new: TaskId) -> BoardResult<()> {
        if old == new {
            return Ok(());
        }
        if self.tasks.contains_key(&new) {
            return Err(BoardError::InvalidState(format!("task {} already exists", new)));
        }
        let mut task = self
            .tasks
            .remove(&old)
            .ok_or(BoardError::NotFound(EntityRef::Task(old)))?;
        task.id = new;
        let (list_id, parent_id) = (task.list_id, task.parent_id);
        let children = task.child_ids.clone();
        self.tasks.insert(new, task);

        for child in children {
            if let Some(child) = self.tasks.get_mut(&child) {
                child.parent_id = Some(new);
            }
        }
        for id in self
            .siblings_mut(list_id, parent_id)?
            .iter_mut()
            .filter(|id| **id == old)
        {
            *id = new;
        }
        Ok(())
    }

    /// Drops every list and task still carrying a provisional id, together
    /// with whatever they contain. Returns how many entities were dropped.
    pub fn remove_provisional(&mut self) -> usize {
        let mut dropped = 0;
        let lists: Vec<ListId> = self
            .order
            .iter()
            .copied()
            .filter(|id| id.is_provisional())
            .collect();
        for id in lists {
            if let Ok(removed) = self.remove_list(id) {
                dropped += 1 + removed.tasks.len();
            }
        }
        while let Some(id) = self.tasks.keys().copied().find(|id| id.is_provisional()) {
            match self.remove_task(id) {
                Ok(removed) => dropped += removed.tasks.len(),
                Err(e) => {
                    tracing::warn!("Dropping unreachable task {}: {}", id, e);
                    self.tasks.remove(&id);
                    dropped += 1;
                }
            }
        }
        dropped
    }

    fn take_subtree(&mut self, root: TaskId) -> Vec<Task> {
        let mut taken = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(task) = self.tasks.remove(&id) {
                stack.extend(task.child_ids.iter().rev().copied());
                taken.push(task);
            }
        }
        taken
    }

    /// Verifies the structural invariants of the board.
    pub fn check_invariants(&self) -> BoardResult<()> {
        let invalid = |message: String| Err(BoardError::InvalidState(message));

        if self.order.len() != self.lists.len() {
            return invalid(format!(
                "{} lists ordered but {} stored",
                self.order.len(),
                self.lists.len()
            ));
        }

        let mut seen = HashSet::new();
        for (index, list_id) in self.order.iter().enumerate() {
            let Some(list) = self.lists.get(list_id) else {
                return invalid(format!("list {} is ordered but missing", list_id));
            };
            if list.order_index != index {
                return invalid(format!(
                    "list {} has order_index {} at position {}",
                    list_id, list.order_index, index
                ));
            }

            let mut stack: Vec<(TaskId, Option<TaskId>, usize)> = list
                .task_ids
                .iter()
                .enumerate()
                .map(|(rank, id)| (*id, None, rank))
                .collect();
            while let Some((id, parent_id, rank)) = stack.pop() {
                if !seen.insert(id) {
                    return invalid(format!("task {} is referenced more than once", id));
                }
                let Some(task) = self.tasks.get(&id) else {
                    return invalid(format!("task {} is referenced but missing", id));
                };
                if task.list_id != *list_id {
                    return invalid(format!(
                        "task {} carries list {} inside list {}",
                        id, task.list_id, list_id
                    ));
                }
                if task.parent_id != parent_id {
                    return invalid(format!("task {} has a stale parent_id", id));
                }
                if task.order_index != rank {
                    return invalid(format!(
                        "task {} has order_index {} at position {}",
                        id, task.order_index, rank
                    ));
                }
                stack.extend(
                    task.child_ids
                        .iter()
                        .enumerate()
                        .map(|(child_rank, child)| (*child, Some(id), child_rank)),
                );
            }
        }

        if seen.len() != self.tasks.len() {
            return invalid(format!(
                "{} tasks stored but only {} reachable",
                self.tasks.len(),
                seen.len()
            ));
        }
        Ok(())
    }
}
