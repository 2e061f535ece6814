//! Mock pet store REST API served by axum on an ephemeral port

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Store {
    pets: BTreeMap<i64, Value>,
    orders: BTreeMap<i64, Value>,
    users: BTreeMap<String, Value>,
    /// `x-run-tag` header of every request that carried one
    tags: Vec<String>,
}

type Shared = Arc<Mutex<Store>>;

/// Running mock server; stopped on drop
pub struct PetstoreServer {
    pub base_url: String,
    store: Shared,
    handle: JoinHandle<()>,
}

impl PetstoreServer {
    /// Start with two available pets (ids 1 and 2) already listed
    pub async fn start() -> Self {
        let store = Shared::default();
        {
            let mut seeded = store.lock().expect("store lock");
            for (id, name) in [(1, "Rex"), (2, "Tom")] {
                seeded.pets.insert(
                    id,
                    json!({"id": id, "name": name, "photoUrls": [], "status": "available"}),
                );
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock petstore");
        let addr: SocketAddr = listener.local_addr().expect("Failed to read local address");
        let app = router(Arc::clone(&store));
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}/v2", addr),
            store,
            handle,
        }
    }

    pub fn pet_ids(&self) -> Vec<i64> {
        self.store.lock().expect("store lock").pets.keys().copied().collect()
    }

    pub fn user_count(&self) -> usize {
        self.store.lock().expect("store lock").users.len()
    }

    pub fn order_ids(&self) -> Vec<i64> {
        self.store.lock().expect("store lock").orders.keys().copied().collect()
    }

    pub fn run_tags(&self) -> Vec<String> {
        self.store.lock().expect("store lock").tags.clone()
    }
}

impl Drop for PetstoreServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(store: Shared) -> Router {
    let api = Router::new()
        .route("/pet", post(put_pet).put(put_pet))
        .route("/pet/findByStatus", get(find_by_status))
        .route("/pet/:id", get(get_pet).delete(delete_pet))
        .route("/store/inventory", get(inventory))
        .route("/store/order", post(place_order))
        .route("/store/order/:id", get(get_order).delete(delete_order))
        .route("/user", post(put_user))
        .route("/user/login", get(login))
        .route("/user/logout", get(logout))
        .route("/user/:username", get(get_user).put(put_user_named).delete(delete_user))
        .with_state(store);
    Router::new().nest("/v2", api)
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    let kind = if status.is_success() { "unknown" } else { "error" };
    (
        status,
        Json(json!({"code": status.as_u16(), "type": kind, "message": text.into()})),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    message(StatusCode::NOT_FOUND, format!("{} not found", what))
}

fn record_tag(store: &mut Store, headers: &HeaderMap) {
    if let Some(tag) = headers.get("x-run-tag").and_then(|v| v.to_str().ok()) {
        store.tags.push(tag.to_string());
    }
}

async fn put_pet(State(store): State<Shared>, headers: HeaderMap, Json(pet): Json<Value>) -> Response {
    let Some(id) = pet.get("id").and_then(Value::as_i64) else {
        return message(StatusCode::BAD_REQUEST, "Invalid ID supplied");
    };
    let mut store = store.lock().expect("store lock");
    record_tag(&mut store, &headers);
    store.pets.insert(id, pet.clone());
    Json(pet).into_response()
}

async fn get_pet(State(store): State<Shared>, Path(id): Path<String>) -> Response {
    let store = store.lock().expect("store lock");
    match id.parse::<i64>().ok().and_then(|id| store.pets.get(&id)) {
        Some(pet) => Json(pet.clone()).into_response(),
        None => not_found("Pet"),
    }
}

async fn delete_pet(State(store): State<Shared>, Path(id): Path<String>) -> Response {
    let mut store = store.lock().expect("store lock");
    match id.parse::<i64>().ok().and_then(|id| store.pets.remove(&id)) {
        Some(_) => message(StatusCode::OK, id),
        None => not_found("Pet"),
    }
}

async fn find_by_status(
    State(store): State<Shared>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let status = query.get("status").cloned().unwrap_or_default();
    let store = store.lock().expect("store lock");
    let pets: Vec<Value> = store
        .pets
        .values()
        .filter(|pet| pet.get("status").and_then(Value::as_str) == Some(status.as_str()))
        .cloned()
        .collect();
    Json(pets).into_response()
}

async fn inventory(State(store): State<Shared>) -> Response {
    let store = store.lock().expect("store lock");
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for pet in store.pets.values() {
        let status = pet.get("status").and_then(Value::as_str).unwrap_or("unknown");
        *counts.entry(status.to_string()).or_default() += 1;
    }
    Json(counts).into_response()
}

async fn place_order(State(store): State<Shared>, Json(order): Json<Value>) -> Response {
    let Some(id) = order.get("id").and_then(Value::as_i64) else {
        return message(StatusCode::BAD_REQUEST, "Invalid Order");
    };
    store.lock().expect("store lock").orders.insert(id, order.clone());
    Json(order).into_response()
}

async fn get_order(State(store): State<Shared>, Path(id): Path<String>) -> Response {
    let store = store.lock().expect("store lock");
    match id.parse::<i64>().ok().and_then(|id| store.orders.get(&id)) {
        Some(order) => Json(order.clone()).into_response(),
        None => not_found("Order"),
    }
}

async fn delete_order(State(store): State<Shared>, Path(id): Path<String>) -> Response {
    let mut store = store.lock().expect("store lock");
    match id.parse::<i64>().ok().and_then(|id| store.orders.remove(&id)) {
        Some(_) => message(StatusCode::OK, id),
        None => not_found("Order"),
    }
}

async fn put_user(State(store): State<Shared>, Json(user): Json<Value>) -> Response {
    let Some(username) = user.get("username").and_then(Value::as_str).map(str::to_string) else {
        return message(StatusCode::BAD_REQUEST, "Invalid user");
    };
    let id = user.get("id").cloned().unwrap_or(Value::Null);
    store.lock().expect("store lock").users.insert(username, user);
    message(StatusCode::OK, display(&id))
}

async fn put_user_named(
    State(store): State<Shared>,
    Path(username): Path<String>,
    Json(user): Json<Value>,
) -> Response {
    let mut store = store.lock().expect("store lock");
    if !store.users.contains_key(&username) {
        return not_found("User");
    }
    let id = user.get("id").cloned().unwrap_or(Value::Null);
    store.users.insert(username, user);
    message(StatusCode::OK, display(&id))
}

async fn get_user(State(store): State<Shared>, Path(username): Path<String>) -> Response {
    let store = store.lock().expect("store lock");
    match store.users.get(&username) {
        Some(user) => Json(user.clone()).into_response(),
        None => not_found("User"),
    }
}

async fn delete_user(State(store): State<Shared>, Path(username): Path<String>) -> Response {
    let mut store = store.lock().expect("store lock");
    match store.users.remove(&username) {
        Some(_) => message(StatusCode::OK, username),
        None => not_found("User"),
    }
}

async fn login(Query(query): Query<BTreeMap<String, String>>) -> Response {
    if !query.contains_key("username") || !query.contains_key("password") {
        return message(StatusCode::BAD_REQUEST, "Invalid username/password supplied");
    }
    message(StatusCode::OK, "logged in user session:1700000000000")
}

async fn logout() -> Response {
    message(StatusCode::OK, "ok")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
