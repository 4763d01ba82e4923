//! JSON shapes exchanged with the board server and written to the local cache.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Board, ListId, Placement, TaskId};
use crate::BoardResult;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardPayload {
    pub lists: Vec<ListPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPayload {
    pub id: ListId,
    pub name: String,
    pub order_index: usize,
    #[serde(default)]
    pub tasks: Vec<TaskPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: TaskId,
    pub name: String,
    pub list_id: ListId,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub is_completed: bool,
    /// Derived from the tree on output; ignored on input.
    #[serde(default)]
    pub task_depth: usize,
    /// Missing values are filled from the position in the enclosing array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<usize>,
    #[serde(default)]
    pub subtasks: Vec<TaskPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateListRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameListRequest {
    pub id: ListId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderListRequest {
    pub order_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    /// The server expects the owning list under `id`.
    #[serde(rename = "id")]
    pub list_id: ListId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub name: String,
    pub is_completed: bool,
    pub list_id: ListId,
    pub parent_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTaskRequest {
    pub list_id: ListId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub order_index: usize,
}

impl From<Placement> for MoveTaskRequest {
    fn from(placement: Placement) -> Self {
        Self {
            list_id: placement.list_id,
            parent_id: placement.parent_id,
            order_index: placement.index,
        }
    }
}

struct FlatTask {
    name: String,
    is_completed: bool,
    list_id: ListId,
    parent_id: Option<TaskId>,
    rank: (usize, usize),
    nested: bool,
}

impl BoardPayload {
    pub fn from_board(board: &Board) -> Self {
        let lists = board
            .lists()
            .map(|list| ListPayload {
                id: list.id,
                name: list.name.clone(),
                order_index: list.order_index,
                tasks: list
                    .task_ids
                    .iter()
                    .filter_map(|id| task_payload(board, *id, 0))
                    .collect(),
            })
            .collect();
        Self { lists }
    }

    /// Rebuilds a board from a server or cache snapshot.
    ///
    /// Tasks may arrive nested under `subtasks`, flat with a `parent_id`, or
    /// both; a nested occurrence wins over a flat one with the same id.
    pub fn into_board(self) -> BoardResult<Board> {
        let mut lists: Vec<(usize, usize, ListPayload)> = self
            .lists
            .into_iter()
            .enumerate()
            .map(|(position, list)| (list.order_index, position, list))
            .collect();
        lists.sort_by_key(|(order_index, position, _)| (*order_index, *position));

        let mut board = Board::new();
        let mut flat: HashMap<TaskId, FlatTask> = HashMap::new();
        for (index, (_, _, list)) in lists.into_iter().enumerate() {
            board.insert_list(list.id, list.name, index)?;
            for (position, task) in list.tasks.into_iter().enumerate() {
                flatten(&mut flat, list.id, task, None, position);
            }
        }

        let mut groups: HashMap<(ListId, Option<TaskId>), Vec<TaskId>> = HashMap::new();
        for (id, task) in &flat {
            let parent_id = task
                .parent_id
                .filter(|parent| flat.get(parent).is_some_and(|p| p.list_id == task.list_id));
            groups.entry((task.list_id, parent_id)).or_default().push(*id);
        }
        for ids in groups.values_mut() {
            ids.sort_by_key(|id| flat.get(id).map(|task| task.rank));
        }

        let roots: Vec<ListId> = board.list_ids().to_vec();
        for list_id in roots {
            let mut stack: Vec<(Option<TaskId>, TaskId)> = groups
                .get(&(list_id, None))
                .map(|ids| ids.iter().rev().map(|id| (None, *id)).collect())
                .unwrap_or_default();
            while let Some((parent_id, id)) = stack.pop() {
                let Some(task) = flat.remove(&id) else {
                    continue;
                };
                let index = board.siblings(list_id, parent_id)?.len();
                let placement = Placement {
                    list_id,
                    parent_id,
                    index,
                };
                board.insert_task(id, task.name, task.is_completed, placement)?;
                if let Some(children) = groups.get(&(list_id, Some(id))) {
                    stack.extend(children.iter().rev().map(|child| (Some(id), *child)));
                }
            }
        }

        for (id, task) in &flat {
            tracing::warn!(
                "Dropping task {} from snapshot: not reachable from list {}",
                id,
                task.list_id
            );
        }
        Ok(board)
    }
}

fn flatten(
    flat: &mut HashMap<TaskId, FlatTask>,
    list_id: ListId,
    task: TaskPayload,
    structural_parent: Option<TaskId>,
    position: usize,
) {
    let nested = structural_parent.is_some();
    let keep = match flat.get(&task.id) {
        Some(existing) => nested && !existing.nested,
        None => true,
    };
    if keep {
        flat.insert(
            task.id,
            FlatTask {
                name: task.name,
                is_completed: task.is_completed,
                list_id,
                parent_id: structural_parent.or(task.parent_id),
                rank: (task.order_index.unwrap_or(position), position),
                nested,
            },
        );
    }
    for (position, subtask) in task.subtasks.into_iter().enumerate() {
        flatten(flat, list_id, subtask, Some(task.id), position);
    }
}

fn task_payload(board: &Board, id: TaskId, depth: usize) -> Option<TaskPayload> {
    let task = board.task(id)?;
    Some(TaskPayload {
        id: task.id,
        name: task.name.clone(),
        list_id: task.list_id,
        parent_id: task.parent_id,
        is_completed: task.is_completed,
        task_depth: depth,
        order_index: Some(task.order_index),
        subtasks: task
            .child_ids
            .iter()
            .filter_map(|child| task_payload(board, *child, depth + 1))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_server_board() {
        let payload: BoardPayload = serde_json::from_value(json!({
            "lists": [
                { "id": 2, "name": "Later", "order_index": 1, "tasks": [] },
                { "id": 1, "name": "Now", "order_index": 0, "tasks": [
                    { "id": 10, "name": "Parent", "list_id": 1, "parent_id": null,
                      "is_completed": false, "task_depth": 0, "subtasks": [
                        { "id": 11, "name": "Child", "list_id": 1, "parent_id": 10,
                          "is_completed": true, "task_depth": 1, "subtasks": [] }
                    ]},
                    { "id": 12, "name": "Other", "list_id": 1, "is_completed": false }
                ]}
            ]
        }))
        .unwrap();

        let board = payload.into_board().unwrap();
        assert_eq!(board.list_ids(), &[ListId(1), ListId(2)]);
        assert_eq!(
            board.list(ListId(1)).unwrap().task_ids,
            vec![TaskId(10), TaskId(12)]
        );
        assert_eq!(board.task(TaskId(11)).unwrap().parent_id, Some(TaskId(10)));
        assert!(board.task(TaskId(11)).unwrap().is_completed);
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_flat_duplicate_of_nested_task_is_merged() {
        let payload: BoardPayload = serde_json::from_value(json!({
            "lists": [
                { "id": 1, "name": "Now", "order_index": 0, "tasks": [
                    { "id": 10, "name": "Parent", "list_id": 1, "subtasks": [
                        { "id": 11, "name": "Child", "list_id": 1, "parent_id": 10 }
                    ]},
                    { "id": 11, "name": "Child", "list_id": 1, "parent_id": 10 }
                ]}
            ]
        }))
        .unwrap();

        let board = payload.into_board().unwrap();
        assert_eq!(board.task_count(), 2);
        assert_eq!(board.list(ListId(1)).unwrap().task_ids, vec![TaskId(10)]);
        assert_eq!(board.task(TaskId(10)).unwrap().child_ids, vec![TaskId(11)]);
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_explicit_order_index_wins_over_position() {
        let payload: BoardPayload = serde_json::from_value(json!({
            "lists": [
                { "id": 1, "name": "Now", "order_index": 0, "tasks": [
                    { "id": 10, "name": "B", "list_id": 1, "order_index": 1 },
                    { "id": 11, "name": "A", "list_id": 1, "order_index": 0 }
                ]}
            ]
        }))
        .unwrap();

        let board = payload.into_board().unwrap();
        assert_eq!(
            board.list(ListId(1)).unwrap().task_ids,
            vec![TaskId(11), TaskId(10)]
        );
    }

    #[test]
    fn test_snapshot_carries_task_depth() {
        let mut board = Board::new();
        board.insert_list(ListId(1), "Now", 0).unwrap();
        board
            .insert_task(TaskId(10), "Parent", false, Placement::top_level(ListId(1), 0))
            .unwrap();
        board
            .insert_task(TaskId(11), "Child", true, Placement::nested(ListId(1), TaskId(10), 0))
            .unwrap();

        let payload = BoardPayload::from_board(&board);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["lists"][0]["tasks"][0]["task_depth"], 0);
        assert_eq!(json["lists"][0]["tasks"][0]["subtasks"][0]["task_depth"], 1);

        assert_eq!(payload.into_board().unwrap(), board);
    }

    #[test]
    fn test_create_task_request_names_list_as_id() {
        let request = CreateTaskRequest {
            name: "Milk".into(),
            list_id: ListId(3),
            parent_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "name": "Milk", "id": 3 })
        );

        let request = MoveTaskRequest::from(Placement::nested(ListId(3), TaskId(7), 2));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "list_id": 3, "parent_id": 7, "order_index": 2 })
        );
    }
}
