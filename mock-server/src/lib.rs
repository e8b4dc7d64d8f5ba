use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    pub location: String,
    pub organizer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub going_count: u64,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub going_by: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub organizer: String,
    pub image_url: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationBody {
    pub user_id: String,
    pub on: Option<bool>,
}

/// A scripted misbehavior applied to the next incoming request.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Answer with this status instead of routing the request.
    Status(u16),
    /// Hold the request this long before routing it.
    Delay(Duration),
}

#[derive(Default)]
struct Store {
    events: Vec<StoredEvent>,
    users: HashMap<String, Map<String, Value>>,
}

struct StoredEvent {
    event: Event,
    liked_by: BTreeSet<String>,
    going_by: BTreeSet<String>,
}

impl StoredEvent {
    fn view(&self) -> Event {
        Event {
            likes_count: self.liked_by.len() as u64,
            going_count: self.going_by.len() as u64,
            liked_by: self.liked_by.iter().cloned().collect(),
            going_by: self.going_by.iter().cloned().collect(),
            ..self.event.clone()
        }
    }

    fn members_mut(&mut self, kind: &str) -> Option<&mut BTreeSet<String>> {
        match kind {
            "like" | "likes" | "liked" => Some(&mut self.liked_by),
            "going" => Some(&mut self.going_by),
            _ => None,
        }
    }

    fn members(&self, kind: &str) -> Option<&BTreeSet<String>> {
        match kind {
            "like" | "likes" | "liked" => Some(&self.liked_by),
            "going" => Some(&self.going_by),
            _ => None,
        }
    }
}

/// Shared server state: the in-memory store plus the fault script.
#[derive(Clone, Default)]
pub struct AppState {
    db: Arc<RwLock<Store>>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
    requests: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault. Queued faults apply to incoming requests in order.
    pub fn push_fault(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(fault);
    }

    /// Requests received so far, faulted ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn seed_event(&self, event: Event) {
        let stored = StoredEvent {
            liked_by: event.liked_by.iter().cloned().collect(),
            going_by: event.going_by.iter().cloned().collect(),
            event,
        };
        self.db.write().await.events.push(stored);
    }

    fn next_fault(&self) -> Option<Fault> {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

pub fn app() -> Router {
    app_with_state(AppState::new())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/list", get(list_events_enveloped))
        .route("/events/mine/list", get(mine_list))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).patch(update_event),
        )
        .route(
            "/events/{id}/{kind}",
            post(add_relation).delete(remove_relation),
        )
        .route("/users/{id}", get(get_user).put(put_user))
        .route("/users/{id}/{kind}", get(user_relation_list))
        .layer(middleware::from_fn_with_state(state.clone(), inject_faults))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn inject_faults(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    match state.next_fault() {
        Some(Fault::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::info!(%status, uri = %request.uri(), "injecting status fault");
            (status, "injected failure").into_response()
        }
        Some(Fault::Delay(delay)) => {
            tracing::info!(?delay, uri = %request.uri(), "injecting delay");
            tokio::time::sleep(delay).await;
            next.run(request).await
        }
        None => next.run(request).await,
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<Event>> {
    let db = state.db.read().await;
    let owner = params.get("ownerId");
    Json(
        db.events
            .iter()
            .filter(|e| owner.is_none() || e.event.owner_id.as_ref() == owner)
            .map(StoredEvent::view)
            .collect(),
    )
}

async fn list_events_enveloped(State(state): State<AppState>) -> Json<Value> {
    let db = state.db.read().await;
    let events: Vec<Event> = db.events.iter().map(StoredEvent::view).collect();
    Json(json!({ "data": events }))
}

async fn create_event(
    State(state): State<AppState>,
    Json(input): Json<CreateEvent>,
) -> Result<(StatusCode, Json<Event>), (StatusCode, Json<Value>)> {
    let required = [
        ("title", &input.title),
        ("date", &input.date),
        ("location", &input.location),
        ("organizer", &input.organizer),
    ];
    if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(bad_request(&format!("{name} is required")));
    }
    let event = Event {
        id: Uuid::new_v4().to_string(),
        title: input.title,
        description: input.description,
        date: input.date,
        location: input.location,
        organizer: input.organizer,
        image_url: input.image_url,
        owner_id: input.owner_id,
        likes_count: 0,
        going_count: 0,
        liked_by: Vec::new(),
        going_by: Vec::new(),
    };
    state.seed_event(event.clone()).await;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Event>, StatusCode> {
    let db = state.db.read().await;
    db.events
        .iter()
        .find(|e| e.event.id == id)
        .map(|e| Json(e.view()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateEvent>,
) -> Result<Json<Event>, StatusCode> {
    let mut db = state.db.write().await;
    let stored = db
        .events
        .iter_mut()
        .find(|e| e.event.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let event = &mut stored.event;
    if let Some(title) = input.title {
        event.title = title;
    }
    if let Some(description) = input.description {
        event.description = description;
    }
    if let Some(date) = input.date {
        event.date = date;
    }
    if let Some(location) = input.location {
        event.location = location;
    }
    if input.image_url.is_some() {
        event.image_url = input.image_url;
    }
    if input.owner_id.is_some() {
        event.owner_id = input.owner_id;
    }
    Ok(Json(stored.view()))
}

async fn add_relation(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
    Json(body): Json<RelationBody>,
) -> Result<Json<Event>, StatusCode> {
    set_relation(&state, &id, &kind, &body.user_id, body.on.unwrap_or(true)).await
}

async fn remove_relation(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Event>, StatusCode> {
    let user_id = params.get("userId").ok_or(StatusCode::BAD_REQUEST)?;
    set_relation(&state, &id, &kind, user_id, false).await
}

async fn set_relation(
    state: &AppState,
    id: &str,
    kind: &str,
    user_id: &str,
    on: bool,
) -> Result<Json<Event>, StatusCode> {
    if !matches!(kind, "like" | "going") {
        return Err(StatusCode::NOT_FOUND);
    }
    if user_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut db = state.db.write().await;
    let stored = db
        .events
        .iter_mut()
        .find(|e| e.event.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let members = stored.members_mut(kind).ok_or(StatusCode::NOT_FOUND)?;
    if on {
        members.insert(user_id.to_string());
    } else {
        members.remove(user_id);
    }
    Ok(Json(stored.view()))
}

async fn mine_list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user_id = params
        .get("userId")
        .filter(|u| !u.is_empty())
        .ok_or_else(|| bad_request("userId is required"))?;
    let kind = params
        .get("type")
        .or_else(|| params.get("status"))
        .ok_or_else(|| bad_request("type or status is required"))?;
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
    let limit: usize = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(100).max(1);

    let db = state.db.read().await;
    let mut matching = Vec::new();
    for stored in &db.events {
        let members = stored
            .members(kind)
            .ok_or_else(|| bad_request("unknown relation"))?;
        if members.contains(user_id) {
            matching.push(stored.view());
        }
    }
    let total = matching.len();
    let pages = total.div_ceil(limit).max(1);
    let items: Vec<Event> = matching
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": page,
        "pages": pages,
    })))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Map<String, Value>>, StatusCode> {
    let db = state.db.read().await;
    db.users.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn put_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<Map<String, Value>>,
) -> Json<Map<String, Value>> {
    let mut db = state.db.write().await;
    let user = db.users.entry(id.clone()).or_default();
    user.extend(input);
    user.insert("_id".to_string(), Value::String(id));
    Json(user.clone())
}

async fn user_relation_list(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    if !matches!(kind.as_str(), "likes" | "going") {
        return Err(StatusCode::NOT_FOUND);
    }
    let db = state.db.read().await;
    Ok(Json(
        db.events
            .iter()
            .filter(|e| e.members(&kind).is_some_and(|m| m.contains(&id)))
            .map(StoredEvent::view)
            .collect(),
    ))
}
