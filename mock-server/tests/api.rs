use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Item, ServerStatus};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- status ---

#[tokio::test]
async fn status_reports_ok() {
    let resp = app().oneshot(empty_request("GET", "/status")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let status: ServerStatus = body_json(resp).await;
    assert_eq!(status.status, "ok");
    assert_eq!(status.items, 0);
}

// --- create ---

#[tokio::test]
async fn create_item_returns_201() {
    let resp = app()
        .oneshot(json_request("POST", "/items", r#"{"name":"demo"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let item: Item = body_json(resp).await;
    assert_eq!(item.id, 1);
    assert_eq!(item.name, "demo");
    assert!(!item.done);
}

#[tokio::test]
async fn create_item_requires_json_content_type() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/items")
                .header(http::header::CONTENT_TYPE, "text/plain")
                .body(r#"{"name":"demo"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn create_item_missing_name_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/items", r#"{"done":true}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- lookups ---

#[tokio::test]
async fn get_item_not_found() {
    let resp = app().oneshot(empty_request("GET", "/items/7")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_item_bad_id_returns_400() {
    let resp = app().oneshot(empty_request("GET", "/items/seven")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_missing_item() {
    let resp = app()
        .oneshot(json_request("PUT", "/items/7", r#"{"name":"x"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app().oneshot(empty_request("DELETE", "/items/7")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full CRUD lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/items", r#"{"name":"sensor"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Item = body_json(resp).await;
    let id = created.id;

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/status"))
        .await
        .unwrap();
    let status: ServerStatus = body_json(resp).await;
    assert_eq!(status.items, 1);

    // partial update keeps the name
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("PUT", &format!("/items/{id}"), r#"{"done":true}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Item = body_json(resp).await;
    assert_eq!(updated.name, "sensor");
    assert!(updated.done);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/items"))
        .await
        .unwrap();
    let items: Vec<Item> = body_json(resp).await;
    assert_eq!(items, vec![updated]);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("DELETE", &format!("/items/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", &format!("/items/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // ids are not reused
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/items", r#"{"name":"next"}"#))
        .await
        .unwrap();
    let next: Item = body_json(resp).await;
    assert_eq!(next.id, id + 1);
}
