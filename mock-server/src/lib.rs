//! Host-side stand-ins for the two ends an ESP-01 talks to.
//!
//! - [`app`] is the remote HTTP server a device reports to: a `/status`
//!   probe and an `/items` collection with CRUD.
//! - [`modem::SimModem`] plays the ESP-01 itself, answering AT commands on
//!   a background thread and bridging its socket commands to real TCP.

pub mod modem;

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub done: bool,
}

#[derive(Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub done: Option<bool>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub status: String,
    pub items: usize,
}

#[derive(Default)]
pub struct Store {
    next_id: u32,
    items: BTreeMap<u32, Item>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/status", get(status))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(get_item).put(update_item).delete(delete_item))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn status(State(db): State<Db>) -> Json<ServerStatus> {
    let store = db.read().await;
    Json(ServerStatus {
        status: "ok".to_string(),
        items: store.items.len(),
    })
}

async fn list_items(State(db): State<Db>) -> Json<Vec<Item>> {
    let store = db.read().await;
    Json(store.items.values().cloned().collect())
}

async fn create_item(
    State(db): State<Db>,
    Json(input): Json<NewItem>,
) -> (StatusCode, Json<Item>) {
    let mut store = db.write().await;
    store.next_id += 1;
    let item = Item {
        id: store.next_id,
        name: input.name,
        done: input.done,
    };
    store.items.insert(item.id, item.clone());
    log::debug!("created item {}", item.id);
    (StatusCode::CREATED, Json(item))
}

async fn get_item(State(db): State<Db>, Path(id): Path<u32>) -> Result<Json<Item>, StatusCode> {
    let store = db.read().await;
    store.items.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_item(
    State(db): State<Db>,
    Path(id): Path<u32>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<Item>, StatusCode> {
    let mut store = db.write().await;
    let item = store.items.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = patch.name {
        item.name = name;
    }
    if let Some(done) = patch.done {
        item.done = done;
    }
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(db): State<Db>,
    Path(id): Path<u32>,
) -> Result<StatusCode, StatusCode> {
    let mut store = db.write().await;
    store
        .items
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_defaults_done_to_false() {
        let input: NewItem = serde_json::from_str(r#"{"name":"demo"}"#).unwrap();
        assert_eq!(input.name, "demo");
        assert!(!input.done);
    }

    #[test]
    fn new_item_rejects_missing_name() {
        let result: Result<NewItem, _> = serde_json::from_str(r#"{"done":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn patch_fields_are_optional() {
        let patch: ItemPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.name.is_none());
        assert!(patch.done.is_none());
    }

    #[test]
    fn status_serializes_flat() {
        let json = serde_json::to_value(ServerStatus {
            status: "ok".to_string(),
            items: 2,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok", "items": 2}));
    }
}
