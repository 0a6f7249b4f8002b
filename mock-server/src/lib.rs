use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub item_id: Uuid,
    pub display_name: String,
    pub done: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of POST and PUT: every field is replaced.
#[derive(Deserialize)]
pub struct ItemInput {
    pub display_name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of PATCH: only the fields present are applied.
#[derive(Deserialize)]
pub struct ItemPatch {
    pub display_name: Option<String>,
    pub done: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemPage {
    pub results: Vec<Item>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub done: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Item>>>;

type ApiError = (StatusCode, Json<ErrorBody>);

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not found".to_string(),
        }),
    )
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route(
            "/api/items/{id}",
            get(get_item)
                .put(replace_item)
                .patch(patch_item)
                .delete(delete_item),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_items(State(db): State<Db>, Query(query): Query<ListQuery>) -> Json<ItemPage> {
    let items = db.read().await;
    let mut results: Vec<Item> = items
        .values()
        .filter(|item| query.done.is_none_or(|done| item.done == done))
        .cloned()
        .collect();
    results.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Json(ItemPage {
        count: results.len(),
        results,
    })
}

async fn create_item(
    State(db): State<Db>,
    Json(input): Json<ItemInput>,
) -> (StatusCode, Json<Item>) {
    let item = Item {
        item_id: Uuid::new_v4(),
        display_name: input.display_name,
        done: input.done,
        tags: input.tags,
    };
    debug!(id = %item.item_id, "created item");
    db.write().await.insert(item.item_id, item.clone());
    (StatusCode::CREATED, Json(item))
}

async fn get_item(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Item>, ApiError> {
    let items = db.read().await;
    items.get(&id).cloned().map(Json).ok_or_else(not_found)
}

async fn replace_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<ItemInput>,
) -> Result<Json<Item>, ApiError> {
    let mut items = db.write().await;
    let item = items.get_mut(&id).ok_or_else(not_found)?;
    item.display_name = input.display_name;
    item.done = input.done;
    item.tags = input.tags;
    Ok(Json(item.clone()))
}

async fn patch_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<ItemPatch>,
) -> Result<Json<Item>, ApiError> {
    let mut items = db.write().await;
    let item = items.get_mut(&id).ok_or_else(not_found)?;
    if let Some(display_name) = input.display_name {
        item.display_name = display_name;
    }
    if let Some(done) = input.done {
        item.done = done;
    }
    if let Some(tags) = input.tags {
        item.tags = tags;
    }
    Ok(Json(item.clone()))
}

async fn delete_item(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let mut items = db.write().await;
    items
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(not_found)
}
