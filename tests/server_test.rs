mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rusqlite::types::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use heirloom::chat::ChatService;
use heirloom::chat::FALLBACK_REPLY;
use heirloom::index::SemanticIndex;
use heirloom::records::RecordStore;
use heirloom::server::{cors_layer, router, AppState, DEGRADED_HEADER};

use helpers::{blob, insert_located, insert_memorial, insert_relationship, FakeGeocoder, FakeModel, KeywordEmbedder};

struct TestApp {
    app: Router,
    _tmp: TempDir,
}

fn test_app(model: FakeModel) -> TestApp {
    let conn = helpers::test_db();
    insert_memorial(&conn, 7, "We went to the park on Sunday", blob(&[0xff, 0xd8, 0xff]));
    insert_memorial(&conn, 8, "Dinner by the beach", Value::Null);
    insert_relationship(&conn, 1, 2, "mother", "mom");
    insert_located(&conn, 20, 35.6, 139.7, None);
    let (store, _) = helpers::store(conn);
    let store: Arc<dyn RecordStore> = store;

    let tmp = TempDir::new().unwrap();
    let index = Arc::new(
        SemanticIndex::open(tmp.path().join("vector_store.db"), Arc::new(KeywordEmbedder)).unwrap(),
    );
    let chat = ChatService::new(store.clone(), index.clone(), Arc::new(model));

    let state = AppState {
        store,
        index,
        chat,
        geocoder: Some(Arc::new(FakeGeocoder)),
    };
    TestApp {
        app: router(state, cors_layer(None).unwrap()),
        _tmp: tmp,
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn update_vector_then_chat_returns_photo() {
    let t = test_app(FakeModel::replying("Yes, the park!"));

    let response = t.app.clone().oneshot(post_empty("/update-vector")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"message": "vector store updated (3 entries)"})
    );

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/chat",
            serde_json::json!({"user_input": "did we go to the park?", "family_id": 1, "user_id": 2}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(DEGRADED_HEADER).is_none());
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"response": "Yes, the park!", "photo": "data:image/jpeg;base64,/9j/"})
    );
}

#[tokio::test]
async fn chat_with_failing_model_is_still_ok() {
    let t = test_app(FakeModel::failing());

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/chat",
            serde_json::json!({"user_input": "hello", "family_id": 1, "user_id": 2}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(DEGRADED_HEADER).unwrap(), "model");
    let body = json_body(response).await;
    assert_eq!(body["response"], FALLBACK_REPLY);
    assert_eq!(body["photo"], "no photo");
}

#[tokio::test]
async fn family_info_lists_members() {
    let t = test_app(FakeModel::replying("hi"));

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/family-info",
            serde_json::json!({"family_id": 1, "user_id": 2}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"family": [{"relation": "mother", "calling_name": "mom"}]})
    );
}

#[tokio::test]
async fn update_location_reports_count() {
    let t = test_app(FakeModel::replying("hi"));

    let response = t.app.clone().oneshot(post_empty("/update-location")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"message": "updated 1 entries"})
    );
}
