//! Domain DTOs for the events API.
//!
//! # Design
//! Wire names follow the backend (`_id`, camelCase). The backend is not
//! consistent about a few names (`_id` vs `id`, `likesCount` vs `likeCount`,
//! `organizerName` vs `organizer`), so `Event` is decoded through
//! `EventWire`, which accepts every spelling, including several at once,
//! and treats null counts as zero. List items go through
//! `EventSummary::from_value`, which tolerates the wider set of names seen
//! across list endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// The two per-viewer relations a user can hold with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Like,
    Going,
}

impl RelationKind {
    pub const ALL: [RelationKind; 2] = [RelationKind::Like, RelationKind::Going];

    /// Path segment under `/events/{id}/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Going => "going",
        }
    }

    /// Filter value for `/events/mine/list`.
    pub fn list_filter(&self) -> &'static str {
        match self {
            RelationKind::Like => "liked",
            RelationKind::Going => "going",
        }
    }

    /// Path segment under `/users/{id}/`.
    pub fn user_segment(&self) -> &'static str {
        match self {
            RelationKind::Like => "likes",
            RelationKind::Going => "going",
        }
    }
}

/// Viewer flags plus aggregate counters for one event.
///
/// Flags describe the current viewer only; counters aggregate over all users.
/// They are not kept arithmetically consistent with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationState {
    pub liked: bool,
    pub going: bool,
    pub like_count: u64,
    pub going_count: u64,
}

impl RelationState {
    pub fn flag(&self, kind: RelationKind) -> bool {
        match kind {
            RelationKind::Like => self.liked,
            RelationKind::Going => self.going,
        }
    }

    pub fn count(&self, kind: RelationKind) -> u64 {
        match kind {
            RelationKind::Like => self.like_count,
            RelationKind::Going => self.going_count,
        }
    }

    /// Set the flag for `kind` and move its counter by one, never below zero.
    pub fn apply(&mut self, kind: RelationKind, on: bool) {
        let (flag, count) = self.slots_mut(kind);
        *flag = on;
        *count = if on {
            count.saturating_add(1)
        } else {
            count.saturating_sub(1)
        };
    }

    /// Copy the flag and counter for `kind` from `snapshot`, leaving the other kind alone.
    pub fn restore(&mut self, kind: RelationKind, snapshot: &RelationState) {
        let (flag, count) = self.slots_mut(kind);
        *flag = snapshot.flag(kind);
        *count = snapshot.count(kind);
    }

    fn slots_mut(&mut self, kind: RelationKind) -> (&mut bool, &mut u64) {
        match kind {
            RelationKind::Like => (&mut self.liked, &mut self.like_count),
            RelationKind::Going => (&mut self.going, &mut self.going_count),
        }
    }
}

/// Full event as returned by `GET /events/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EventWire")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teaser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ISO-8601 start, as sent by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickets_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    /// Semicolon-separated keywords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(rename = "likesCount")]
    pub like_count: u64,
    pub going_count: u64,
}

/// Every spelling of an event the backend has been seen to send.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventWire {
    #[serde(rename = "_id")]
    underscore_id: Option<Value>,
    id: Option<Value>,
    title: Option<String>,
    teaser: Option<String>,
    description: Option<String>,
    date: Option<String>,
    location: Option<String>,
    organizer_name: Option<String>,
    organizer: Option<String>,
    organization_name: Option<String>,
    image_url: Option<String>,
    tickets_url: Option<String>,
    website_url: Option<String>,
    keywords_raw: Option<String>,
    owner_id: Option<String>,
    likes_count: Option<u64>,
    like_count: Option<u64>,
    going_count: Option<u64>,
}

impl TryFrom<EventWire> for Event {
    type Error = String;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        let id = [wire.underscore_id, wire.id]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| "missing field `_id`".to_string())?;
        Ok(Self {
            id,
            title: wire.title,
            teaser: wire.teaser,
            description: wire.description,
            date: wire.date,
            location: wire.location,
            organizer_name: wire.organizer_name.or(wire.organizer),
            organization_name: wire.organization_name,
            image_url: wire.image_url,
            tickets_url: wire.tickets_url,
            website_url: wire.website_url,
            keywords_raw: wire.keywords_raw,
            owner_id: wire.owner_id,
            like_count: wire.likes_count.or(wire.like_count).unwrap_or(0),
            going_count: wire.going_count.unwrap_or(0),
        })
    }
}

impl Event {
    pub fn keywords(&self) -> Vec<&str> {
        self.keywords_raw
            .as_deref()
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.teaser.as_deref())
            .unwrap_or(UNTITLED)
    }
}

const UNTITLED: &str = "Untitled";

/// One row of an event listing, normalized from heterogeneous item shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub image_url: Option<String>,
    pub like_count: u64,
    pub going_count: u64,
    /// User ids found in a like-membership array on the item, if any.
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub going_by: Vec<String>,
}

impl EventSummary {
    /// Map one list item. Returns `None` for items without a usable id.
    pub fn from_value(item: &Value) -> Option<Self> {
        let id = first_id(item, &["_id", "id", "uuid", "eventId"])?;
        let title = first_str(item, &["title", "name", "teaser"]).unwrap_or(UNTITLED);
        let description = first_str(item, &["description", "details"]).unwrap_or("");
        let date = first_str(item, &["date", "startDate", "startsAt", "createdAt"]);
        let image_url = first_str(item, &["imageUrl", "cover", "banner"]);

        let liked_by = members(item, &["likedBy", "likes"]);
        let going_by = members(item, &["goingBy", "attendees", "going"]);
        let like_count = first_count(item, &["likeCount", "likesCount", "likes"])
            .unwrap_or(liked_by.len() as u64);
        let going_count = first_count(item, &["goingCount", "going", "attending"])
            .unwrap_or(going_by.len() as u64);

        Some(Self {
            id,
            title: title.to_string(),
            description: description.to_string(),
            date: date.map(str::to_string),
            image_url: image_url.map(str::to_string),
            like_count,
            going_count,
            liked_by,
            going_by,
        })
    }

    /// Relation state for `user_id` from membership arrays on the item.
    pub fn relation_for(&self, user_id: &str) -> RelationState {
        RelationState {
            liked: self.liked_by.iter().any(|u| u == user_id),
            going: self.going_by.iter().any(|u| u == user_id),
            like_count: self.like_count,
            going_count: self.going_count,
        }
    }
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn first_id(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_count(item: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| item.get(*k)?.as_u64())
}

fn members(item: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| item.get(*k)?.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| match m {
                    Value::String(s) => Some(s.clone()),
                    other => first_id(other, &["_id", "id"]),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Payload for `POST /events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
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
}

impl CreateEvent {
    /// The backend rejects events without title, date, location or organizer.
    pub fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("title", &self.title),
            ("date", &self.date),
            ("location", &self.location),
            ("organizer", &self.organizer),
        ];
        match required.iter().find(|(_, v)| v.trim().is_empty()) {
            Some((name, _)) => Err(ApiError::InvalidInput(format!("{name} is required"))),
            None => Ok(()),
        }
    }
}

/// Payload for `PUT|PATCH /events/{id}`. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Body of a relation mutation. `on` is absent under the POST/DELETE convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationBody {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
}

/// A page of results from `/events/mine/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub pages: u32,
}

/// Parameters for `/events/mine/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineListQuery {
    pub user_id: String,
    pub kind: RelationKind,
    pub page: u32,
    pub limit: u32,
}

impl MineListQuery {
    pub fn new(user_id: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            page: 1,
            limit: 100,
        }
    }
}

/// User profile from `GET /users/{id}`. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for `PUT /users/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
