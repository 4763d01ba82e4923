use serde_json::json;
use std::time::Duration;
use taskboard_client::{HttpSyncClient, SyncClient};
use taskboard_core::{
    BoardError, CreateListRequest, CreateTaskRequest, ListId, MoveTaskRequest, RenameListRequest,
    ReorderListRequest, TaskId, UpdateTaskRequest,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpSyncClient {
    HttpSyncClient::new(server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_fetch_board_parses_nested_tasks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lists": [{
                "id": 1,
                "name": "To Do",
                "order_index": 0,
                "tasks": [{
                    "id": 5,
                    "name": "Parent",
                    "list_id": 1,
                    "parent_id": null,
                    "is_completed": false,
                    "task_depth": 0,
                    "subtasks": [{
                        "id": 6,
                        "name": "Child",
                        "list_id": 1,
                        "parent_id": 5,
                        "is_completed": true,
                        "task_depth": 1,
                        "subtasks": []
                    }]
                }]
            }]
        })))
        .mount(&mock_server)
        .await;

    let payload = client_for(&mock_server).fetch_board().await.unwrap();
    let board = payload.into_board().unwrap();
    assert_eq!(board.list(ListId(1)).unwrap().task_ids, vec![TaskId(5)]);
    assert_eq!(board.task(TaskId(6)).unwrap().parent_id, Some(TaskId(5)));
}

#[tokio::test]
async fn test_create_list_posts_name() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lists"))
        .and(body_json(json!({ "name": "Backlog" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 7,
            "name": "Backlog",
            "order_index": 3,
            "tasks": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = client_for(&mock_server)
        .create_list(CreateListRequest {
            name: "Backlog".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.id, ListId(7));
}

#[tokio::test]
async fn test_create_task_sends_list_id_as_id() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/add_task"))
        .and(body_json(json!({ "name": "Child", "id": 1, "parent_id": 5 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 8,
            "name": "Child",
            "list_id": 1,
            "parent_id": 5,
            "is_completed": false,
            "task_depth": 1,
            "subtasks": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = client_for(&mock_server)
        .create_task(CreateTaskRequest {
            name: "Child".into(),
            list_id: ListId(1),
            parent_id: Some(TaskId(5)),
        })
        .await
        .unwrap();
    assert_eq!(created.id, TaskId(8));
    assert_eq!(created.parent_id, Some(TaskId(5)));
}

#[tokio::test]
async fn test_mutation_routes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/update_list_name"))
        .and(body_json(json!({ "id": 1, "name": "Today" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/delete_list/2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/lists/3/move"))
        .and(body_json(json!({ "order_index": 0 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/tasks/4/update"))
        .and(body_json(json!({
            "name": "Draft",
            "is_completed": true,
            "list_id": 1,
            "parent_id": null
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/tasks/4/move"))
        .and(body_json(json!({ "list_id": 2, "parent_id": 9, "order_index": 1 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/4/delete"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .rename_list(RenameListRequest {
            id: ListId(1),
            name: "Today".into(),
        })
        .await
        .unwrap();
    client.delete_list(ListId(2)).await.unwrap();
    client
        .reorder_list(ListId(3), ReorderListRequest { order_index: 0 })
        .await
        .unwrap();
    client
        .update_task(
            TaskId(4),
            UpdateTaskRequest {
                name: "Draft".into(),
                is_completed: true,
                list_id: ListId(1),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    client
        .move_task(
            TaskId(4),
            MoveTaskRequest {
                list_id: ListId(2),
                parent_id: Some(TaskId(9)),
                order_index: 1,
            },
        )
        .await
        .unwrap();
    client.delete_task(TaskId(4)).await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_a_transport_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/delete_list/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database locked"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server).delete_list(ListId(1)).await.unwrap_err();
    match err {
        BoardError::Transport(message) => {
            assert!(message.contains("/delete_list/1"));
            assert!(message.contains("500"));
            assert!(message.contains("database locked"));
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let client = HttpSyncClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    assert!(matches!(
        client.fetch_board().await,
        Err(BoardError::Transport(_))
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_serialization_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    assert!(matches!(
        client_for(&mock_server).fetch_board().await,
        Err(BoardError::Serialization(_))
    ));
}
