//! Typed client for the events backend.
//!
//! # Design
//! Each operation is split the same way throughout: a `build_*` method
//! produces a `RequestDescriptor` (pure, no I/O), the request client sends
//! it, and a `parse_*` function maps the returned `Payload` into domain
//! types. The async methods just chain the two, so the wire contract can be
//! tested without a network and the I/O path stays in one place.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use urlencoding::encode;

use crate::config::{ClientConfig, MutationConvention};
use crate::envelope::{normalize_events, normalize_page, normalize_single};
use crate::error::ApiError;
use crate::http::{HttpMethod, Transport};
use crate::request::{Payload, RequestClient, RequestDescriptor};
use crate::types::{
    CreateEvent, Event, EventSummary, MineListQuery, Page, RelationBody, RelationKind,
    UpdateEvent, UpdateUser, UserProfile,
};

/// Client for the events REST API.
#[derive(Debug, Clone)]
pub struct EventsClient<T> {
    http: RequestClient<T>,
}

impl<T> EventsClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            http: RequestClient::new(config, transport),
        }
    }

    pub fn from_request_client(http: RequestClient<T>) -> Self {
        Self { http }
    }

    pub fn request_client(&self) -> &RequestClient<T> {
        &self.http
    }

    pub fn config(&self) -> &ClientConfig {
        self.http.config()
    }

    pub fn build_list_events(&self) -> RequestDescriptor {
        RequestDescriptor::get("/events")
    }

    /// Alternate listing path some deployments expose.
    pub fn build_list_events_fallback(&self) -> RequestDescriptor {
        RequestDescriptor::get("/events/list")
    }

    pub fn build_list_events_by_owner(&self, owner_id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/events?ownerId={}", encode(owner_id)))
    }

    pub fn build_get_event(&self, id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/events/{}", encode(id)))
    }

    pub fn build_create_event(&self, input: &CreateEvent) -> Result<RequestDescriptor, ApiError> {
        input.validate()?;
        Ok(RequestDescriptor::new(HttpMethod::Post, "/events").with_body(to_json(input)?))
    }

    /// `method` must be `Put` or `Patch`.
    pub fn build_update_event(
        &self,
        id: &str,
        input: &UpdateEvent,
        method: HttpMethod,
    ) -> Result<RequestDescriptor, ApiError> {
        if !matches!(method, HttpMethod::Put | HttpMethod::Patch) {
            return Err(ApiError::InvalidInput(format!(
                "event updates use PUT or PATCH, not {}",
                method.as_str()
            )));
        }
        Ok(
            RequestDescriptor::new(method, format!("/events/{}", encode(id)))
                .with_body(to_json(input)?),
        )
    }

    /// Turn `kind` on or off for `user_id`, following the configured convention.
    pub fn build_set_relation(
        &self,
        kind: RelationKind,
        event_id: &str,
        user_id: &str,
        on: bool,
    ) -> Result<RequestDescriptor, ApiError> {
        let path = format!("/events/{}/{}", encode(event_id), kind.as_str());
        let descriptor = match (self.config().convention, on) {
            (MutationConvention::OnFlag, _) => {
                RequestDescriptor::new(HttpMethod::Post, path).with_body(to_json(&RelationBody {
                    user_id: user_id.to_string(),
                    on: Some(on),
                })?)
            }
            (MutationConvention::PostDelete, true) => RequestDescriptor::new(HttpMethod::Post, path)
                .with_body(to_json(&RelationBody {
                    user_id: user_id.to_string(),
                    on: None,
                })?),
            (MutationConvention::PostDelete, false) => RequestDescriptor::new(
                HttpMethod::Delete,
                format!("{path}?userId={}", encode(user_id)),
            ),
        };
        Ok(descriptor)
    }

    pub fn build_mine_list(&self, query: &MineListQuery) -> RequestDescriptor {
        RequestDescriptor::get(format!(
            "/events/mine/list?userId={}&{}={}&page={}&limit={}",
            encode(&query.user_id),
            self.config().relation_param.as_str(),
            query.kind.list_filter(),
            query.page,
            query.limit
        ))
    }

    /// Per-user relation listing used when `/events/mine/list` is unavailable.
    pub fn build_user_relation_list(&self, user_id: &str, kind: RelationKind) -> RequestDescriptor {
        RequestDescriptor::get(format!("/users/{}/{}", encode(user_id), kind.user_segment()))
    }

    pub fn build_get_user(&self, id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/users/{}", encode(id)))
    }

    pub fn build_update_user(&self, id: &str, input: &UpdateUser) -> Result<RequestDescriptor, ApiError> {
        Ok(RequestDescriptor::new(HttpMethod::Put, format!("/users/{}", encode(id)))
            .with_body(to_json(input)?))
    }
}

impl<T: Transport> EventsClient<T> {
    /// List all events. An empty `/events` result falls back to `/events/list`.
    pub async fn list_events(&self) -> Result<Vec<EventSummary>, ApiError> {
        let events = parse_events(self.http.request(self.build_list_events()).await?)?;
        if !events.is_empty() {
            return Ok(events);
        }
        tracing::debug!("/events returned no items, trying /events/list");
        parse_events(self.http.request(self.build_list_events_fallback()).await?)
    }

    pub async fn list_events_by_owner(&self, owner_id: &str) -> Result<Vec<EventSummary>, ApiError> {
        parse_events(self.http.request(self.build_list_events_by_owner(owner_id)).await?)
    }

    pub async fn get_event(&self, id: &str) -> Result<Event, ApiError> {
        parse_event(self.http.request(self.build_get_event(id)).await?)
    }

    /// Returns the stored event when the backend echoes it back.
    pub async fn create_event(&self, input: &CreateEvent) -> Result<Option<Event>, ApiError> {
        parse_saved_event(self.http.request(self.build_create_event(input)?).await?)
    }

    pub async fn update_event(
        &self,
        id: &str,
        input: &UpdateEvent,
        method: HttpMethod,
    ) -> Result<Option<Event>, ApiError> {
        parse_saved_event(
            self.http
                .request(self.build_update_event(id, input, method)?)
                .await?,
        )
    }

    pub async fn set_relation(
        &self,
        kind: RelationKind,
        event_id: &str,
        user_id: &str,
        on: bool,
    ) -> Result<(), ApiError> {
        let descriptor = self.build_set_relation(kind, event_id, user_id, on)?;
        self.http.request(descriptor).await?;
        Ok(())
    }

    pub async fn mine_list(&self, query: &MineListQuery) -> Result<Page<EventSummary>, ApiError> {
        parse_page(self.http.request(self.build_mine_list(query)).await?)
    }

    /// Ids of events the user holds `kind` on.
    ///
    /// Tries `/events/mine/list` first, then `/users/{id}/{likes|going}`.
    /// Fails only when both do.
    pub async fn relation_ids(
        &self,
        user_id: &str,
        kind: RelationKind,
    ) -> Result<HashSet<String>, ApiError> {
        let query = MineListQuery::new(user_id, kind);
        match self.mine_list(&query).await {
            Ok(page) => Ok(page.items.into_iter().map(|e| e.id).collect()),
            Err(primary) => {
                tracing::debug!(kind = kind.as_str(), "mine list failed, trying user listing: {primary}");
                let payload = self
                    .http
                    .request(self.build_user_relation_list(user_id, kind))
                    .await?;
                Ok(parse_events(payload)?.into_iter().map(|e| e.id).collect())
            }
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<UserProfile, ApiError> {
        parse_user(self.http.request(self.build_get_user(id)).await?)
    }

    pub async fn update_user(&self, id: &str, input: &UpdateUser) -> Result<UserProfile, ApiError> {
        parse_user(self.http.request(self.build_update_user(id, input)?).await?)
    }
}

pub fn parse_events(payload: Payload) -> Result<Vec<EventSummary>, ApiError> {
    normalize_events(structured(payload)?)
}

pub fn parse_page(payload: Payload) -> Result<Page<EventSummary>, ApiError> {
    normalize_page(structured(payload)?)
}

pub fn parse_event(payload: Payload) -> Result<Event, ApiError> {
    let value = normalize_single(structured(payload)?)?;
    serde_json::from_value(value).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Like `parse_event`, but an empty or non-JSON body means "saved, nothing echoed".
pub fn parse_saved_event(payload: Payload) -> Result<Option<Event>, ApiError> {
    match payload {
        Payload::Json(_) => parse_event(payload).map(Some),
        Payload::Text(_) | Payload::Empty => Ok(None),
    }
}

pub fn parse_user(payload: Payload) -> Result<UserProfile, ApiError> {
    let value = normalize_single(structured(payload)?)?;
    serde_json::from_value(value).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

fn structured(payload: Payload) -> Result<Value, ApiError> {
    match payload {
        Payload::Json(value) => Ok(value),
        Payload::Empty => Err(ApiError::DeserializationError(
            "expected JSON body, got empty response".to_string(),
        )),
        Payload::Text(text) => Err(ApiError::DeserializationError(format!(
            "expected JSON body, got text: {text}"
        ))),
    }
}

fn to_json<S: Serialize>(input: &S) -> Result<Value, ApiError> {
    serde_json::to_value(input).map_err(|e| ApiError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RelationParam;

    fn client() -> EventsClient<()> {
        EventsClient::new(ClientConfig::new("http://localhost:3000").unwrap(), ())
    }

    fn client_with(convention: MutationConvention) -> EventsClient<()> {
        let config = ClientConfig::new("http://localhost:3000")
            .unwrap()
            .with_convention(convention);
        EventsClient::new(config, ())
    }

    #[test]
    fn build_list_events_produces_correct_request() {
        let c = client();
        let desc = c.build_list_events();
        assert_eq!(desc.method, HttpMethod::Get);
        assert_eq!(c.request_client().url_for(&desc.path), "http://localhost:3000/events");
        assert!(desc.body.is_none());
        assert_eq!(c.build_list_events_fallback().path, "/events/list");
    }

    #[test]
    fn ids_and_query_values_are_percent_encoded() {
        let c = client();
        assert_eq!(c.build_get_event("a b/c").path, "/events/a%20b%2Fc");
        assert_eq!(
            c.build_list_events_by_owner("u&1").path,
            "/events?ownerId=u%261"
        );
    }

    #[test]
    fn build_create_event_validates_and_serializes() {
        let c = client();
        let input = CreateEvent {
            title: "Jazz night".to_string(),
            description: "Live".to_string(),
            date: "2025-08-27T20:00".to_string(),
            location: "Ghent".to_string(),
            organizer: "Jazz Club".to_string(),
            image_url: None,
            owner_id: Some("u1".to_string()),
        };
        let desc = c.build_create_event(&input).unwrap();
        assert_eq!(desc.method, HttpMethod::Post);
        assert_eq!(desc.path, "/events");
        let body = desc.body.unwrap();
        assert_eq!(body["title"], "Jazz night");
        assert_eq!(body["ownerId"], "u1");
        assert!(body.get("imageUrl").is_none());

        let invalid = CreateEvent {
            location: String::new(),
            ..input
        };
        assert!(matches!(
            c.build_create_event(&invalid).unwrap_err(),
            ApiError::InvalidInput(_)
        ));
    }

    #[test]
    fn build_update_event_accepts_put_and_patch_only() {
        let c = client();
        let input = UpdateEvent {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let put = c.build_update_event("e1", &input, HttpMethod::Put).unwrap();
        assert_eq!(put.method, HttpMethod::Put);
        assert_eq!(put.path, "/events/e1");
        assert_eq!(put.body.unwrap(), json!({"title": "Renamed"}));

        let patch = c.build_update_event("e1", &input, HttpMethod::Patch).unwrap();
        assert_eq!(patch.method, HttpMethod::Patch);

        assert!(c.build_update_event("e1", &input, HttpMethod::Post).is_err());
    }

    #[test]
    fn on_flag_convention_posts_both_directions() {
        let c = client_with(MutationConvention::OnFlag);
        let on = c.build_set_relation(RelationKind::Like, "e1", "u1", true).unwrap();
        assert_eq!(on.method, HttpMethod::Post);
        assert_eq!(on.path, "/events/e1/like");
        assert_eq!(on.body.unwrap(), json!({"userId": "u1", "on": true}));

        let off = c.build_set_relation(RelationKind::Going, "e1", "u1", false).unwrap();
        assert_eq!(off.method, HttpMethod::Post);
        assert_eq!(off.path, "/events/e1/going");
        assert_eq!(off.body.unwrap(), json!({"userId": "u1", "on": false}));
    }

    #[test]
    fn post_delete_convention_deletes_to_turn_off() {
        let c = client_with(MutationConvention::PostDelete);
        let on = c.build_set_relation(RelationKind::Like, "e1", "u1", true).unwrap();
        assert_eq!(on.method, HttpMethod::Post);
        assert_eq!(on.body.unwrap(), json!({"userId": "u1"}));

        let off = c.build_set_relation(RelationKind::Like, "e1", "u 1", false).unwrap();
        assert_eq!(off.method, HttpMethod::Delete);
        assert_eq!(off.path, "/events/e1/like?userId=u%201");
        assert!(off.body.is_none());
    }

    #[test]
    fn build_mine_list_uses_configured_param() {
        let query = MineListQuery::new("u1", RelationKind::Like);
        assert_eq!(
            client().build_mine_list(&query).path,
            "/events/mine/list?userId=u1&type=liked&page=1&limit=100"
        );

        let config = ClientConfig::new("http://localhost:3000")
            .unwrap()
            .with_relation_param(RelationParam::Status);
        let c = EventsClient::new(config, ());
        let query = MineListQuery {
            page: 2,
            limit: 20,
            ..MineListQuery::new("u1", RelationKind::Going)
        };
        assert_eq!(
            c.build_mine_list(&query).path,
            "/events/mine/list?userId=u1&status=going&page=2&limit=20"
        );
    }

    #[test]
    fn build_user_endpoints() {
        let c = client();
        assert_eq!(c.build_get_user("u1").path, "/users/u1");
        assert_eq!(
            c.build_user_relation_list("u1", RelationKind::Like).path,
            "/users/u1/likes"
        );
        let update = UpdateUser {
            name: Some("Ada".to_string()),
            ..Default::default()
        };
        let desc = c.build_update_user("u1", &update).unwrap();
        assert_eq!(desc.method, HttpMethod::Put);
        assert_eq!(desc.body.unwrap(), json!({"name": "Ada"}));
    }

    #[test]
    fn parse_event_accepts_wrapped_shapes() {
        let raw = json!({"_id": "e1", "title": "Jazz", "likesCount": 2});
        for payload in [
            Payload::Json(raw.clone()),
            Payload::Json(json!({"data": raw})),
            Payload::Json(json!([raw])),
        ] {
            let event = parse_event(payload).unwrap();
            assert_eq!(event.id, "e1");
            assert_eq!(event.like_count, 2);
        }
    }

    #[test]
    fn parse_events_rejects_text_and_unknown_shapes() {
        assert!(matches!(
            parse_events(Payload::Text("oops".to_string())).unwrap_err(),
            ApiError::DeserializationError(_)
        ));
        assert!(matches!(
            parse_events(Payload::Json(json!({"rows": []}))).unwrap_err(),
            ApiError::UnrecognizedEnvelope(_)
        ));
    }

    #[test]
    fn parse_saved_event_tolerates_empty_body() {
        assert_eq!(parse_saved_event(Payload::Empty).unwrap(), None);
        let saved = parse_saved_event(Payload::Json(json!({"_id": "e2"}))).unwrap();
        assert_eq!(saved.unwrap().id, "e2");
    }
}
