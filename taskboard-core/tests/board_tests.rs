use taskboard_core::tree::{collect_descendant_ids, count_completion, list_completion};
use taskboard_core::{Board, BoardError, BoardPayload, Completion, ListId, Placement, TaskId};

fn two_lists() -> Board {
    let mut board = Board::new();
    board.insert_list(ListId(1), "A", 0).unwrap();
    board.insert_list(ListId(2), "B", 1).unwrap();
    board
        .insert_task(TaskId(1), "Task1", false, Placement::top_level(ListId(1), 0))
        .unwrap();
    board
}

fn assert_dense(board: &Board) {
    for (index, list) in board.lists().enumerate() {
        assert_eq!(list.order_index, index);
        for (rank, id) in list.task_ids.iter().enumerate() {
            assert_eq!(board.task(*id).unwrap().order_index, rank);
        }
    }
    for task in board.tasks() {
        for (rank, id) in task.child_ids.iter().enumerate() {
            assert_eq!(board.task(*id).unwrap().order_index, rank);
        }
    }
    board.check_invariants().unwrap();
}

#[test]
fn move_top_level_task_to_empty_list() {
    let mut board = two_lists();
    board
        .move_task(TaskId(1), Placement::top_level(ListId(2), 0))
        .unwrap();

    assert!(board.list(ListId(1)).unwrap().task_ids.is_empty());
    assert_eq!(board.list(ListId(2)).unwrap().task_ids, vec![TaskId(1)]);
    assert_eq!(board.task(TaskId(1)).unwrap().list_id, ListId(2));
    assert_dense(&board);
}

#[test]
fn completion_counts_subtasks_only() {
    let mut board = two_lists();
    board
        .insert_task(TaskId(2), "Sub1", true, Placement::nested(ListId(1), TaskId(1), 0))
        .unwrap();
    board
        .insert_task(TaskId(3), "Sub2", false, Placement::nested(ListId(1), TaskId(1), 1))
        .unwrap();

    let completion = count_completion(&board, TaskId(1)).unwrap();
    assert_eq!(completion, Completion { completed: 1, total: 2 });
    assert!(completion.completed <= completion.total);

    board.set_completed(TaskId(3), true).unwrap();
    assert!(count_completion(&board, TaskId(1)).unwrap().is_fully_complete());
    // The parent's own flag is untouched by aggregation.
    assert!(!board.task(TaskId(1)).unwrap().is_completed);
    assert_eq!(
        list_completion(&board, ListId(1)).unwrap(),
        Completion { completed: 2, total: 3 }
    );
}

#[test]
fn deleting_a_list_leaves_no_reachable_tasks() {
    let mut board = two_lists();
    board
        .insert_task(TaskId(2), "Sub", false, Placement::nested(ListId(1), TaskId(1), 0))
        .unwrap();
    board
        .insert_task(TaskId(3), "Deep", false, Placement::nested(ListId(1), TaskId(2), 0))
        .unwrap();

    let removed = board.remove_list(ListId(1)).unwrap();
    assert_eq!(removed.tasks.len(), 3);
    assert!(board.tasks().all(|task| task.list_id != ListId(1)));
    assert!(matches!(
        board.require_task(TaskId(3)),
        Err(BoardError::NotFound(_))
    ));
    assert_dense(&board);
}

#[test]
fn ranks_stay_dense_through_a_mixed_sequence() {
    let mut board = two_lists();
    for (offset, name) in ["b", "c", "d"].iter().enumerate() {
        board
            .insert_task(
                TaskId(10 + offset as i64),
                *name,
                false,
                Placement::top_level(ListId(1), 0),
            )
            .unwrap();
    }
    board
        .move_task(TaskId(10), Placement::nested(ListId(1), TaskId(11), 0))
        .unwrap();
    board
        .move_task(TaskId(11), Placement::top_level(ListId(2), 0))
        .unwrap();
    board.remove_task(TaskId(12)).unwrap();
    board.move_list(ListId(2), 0).unwrap();
    assert_dense(&board);

    assert_eq!(
        collect_descendant_ids(&board, TaskId(11)).unwrap().len(),
        1
    );
    assert_eq!(board.task(TaskId(10)).unwrap().list_id, ListId(2));
}

#[test]
fn snapshot_survives_json() {
    let mut board = two_lists();
    board
        .insert_task(TaskId(2), "Sub", true, Placement::nested(ListId(1), TaskId(1), 0))
        .unwrap();

    let json = serde_json::to_string(&BoardPayload::from_board(&board)).unwrap();
    let parsed: BoardPayload = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.into_board().unwrap(), board);
}
