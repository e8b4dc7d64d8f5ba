//! Request client: URL building, per-attempt timeout, fixed-backoff retry and
//! lenient response normalization.
//!
//! # Design
//! Every attempt runs under its own `tokio::time::timeout`. When the timer
//! wins, the transport future is dropped, which abandons the exchange. The
//! timer lives only as long as the attempt, so it cannot fire after the
//! attempt has settled. Failed attempts are retried uniformly (network,
//! timeout and HTTP status failures alike) up to `retries` times, sleeping a
//! fixed backoff in between. An upstream `CancellationToken` aborts the
//! current attempt or backoff and is never retried.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// One logical request against the backend, relative to the base address.
///
/// `timeout` and `retries` fall back to the client configuration when unset.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub cancel: Option<CancellationToken>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            retries: None,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Chain an upstream cancellation signal into every attempt.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Best-effort body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// The body was not valid JSON.
    Text(String),
    Empty,
}

impl Payload {
    fn from_body(body: String) -> Self {
        if body.trim().is_empty() {
            return Payload::Empty;
        }
        match serde_json::from_str(&body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(body),
        }
    }

    /// Collapse into a JSON value: text becomes a JSON string, empty becomes `{}`.
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
            Payload::Empty => Value::Object(Default::default()),
        }
    }

    /// Deserialize a structured payload into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            Payload::Text(text) => Err(ApiError::DeserializationError(format!(
                "expected JSON body, got text: {text}"
            ))),
            other => serde_json::from_value(other.into_json())
                .map_err(|e| ApiError::DeserializationError(e.to_string())),
        }
    }
}

/// Sends `RequestDescriptor`s over a `Transport`.
#[derive(Debug, Clone)]
pub struct RequestClient<T> {
    config: ClientConfig,
    transport: T,
}

impl<T> RequestClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute URL for `path`, with exactly one `/` after the base address.
    pub fn url_for(&self, path: &str) -> String {
        join_url(self.config.base_url(), path)
    }

    /// Turn a descriptor into the wire request sent on every attempt.
    pub fn prepare(&self, descriptor: &RequestDescriptor) -> Result<HttpRequest, ApiError> {
        let body = descriptor
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        let mut headers = Vec::new();
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        for (name, value) in &descriptor.headers {
            headers.retain(|(existing, _): &(String, String)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        Ok(HttpRequest {
            method: descriptor.method,
            url: self.url_for(&descriptor.path),
            headers,
            body,
        })
    }
}

impl<T: Transport> RequestClient<T> {
    pub async fn request(&self, descriptor: RequestDescriptor) -> Result<Payload, ApiError> {
        let request = self.prepare(&descriptor)?;
        let timeout = descriptor.timeout.unwrap_or(self.config.timeout);
        let retries = descriptor.retries.unwrap_or(self.config.retries);
        let cancel = descriptor.cancel.as_ref();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                attempt,
                method = request.method.as_str(),
                url = %request.url,
                "sending request"
            );
            let err = match self.attempt(request.clone(), timeout, cancel).await {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };
            if matches!(err, ApiError::Cancelled) || attempt > retries {
                return Err(err);
            }
            tracing::warn!(
                attempt,
                retries,
                url = %request.url,
                "request failed, retrying in {:?}: {err}",
                self.config.backoff
            );
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(ApiError::Cancelled),
                        _ = tokio::time::sleep(self.config.backoff) => {}
                    }
                }
                None => tokio::time::sleep(self.config.backoff).await,
            }
        }
    }

    async fn attempt(
        &self,
        request: HttpRequest,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Payload, ApiError> {
        let exchange = tokio::time::timeout(timeout, self.transport.execute(request));
        let outcome = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ApiError::Cancelled),
                    outcome = exchange => outcome,
                }
            }
            None => exchange.await,
        };
        let response = outcome.map_err(|_| ApiError::Timeout { after: timeout })??;
        into_payload(response)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Map a raw response to a payload, or to `ApiError::Http` for non-2xx.
fn into_payload(response: HttpResponse) -> Result<Payload, ApiError> {
    if !response.is_success() {
        return Err(ApiError::Http {
            status: response.status,
            status_text: response.status_text().to_string(),
            body: response.body,
        });
    }
    Ok(Payload::from_body(response.body))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;

    enum Step {
        Respond(HttpResponse),
        Fail(ApiError),
        Hang,
    }

    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(
            &self,
            request: HttpRequest,
        ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
            self.seen.lock().unwrap().push(request);
            let step = self.steps.lock().unwrap().pop_front();
            async move {
                match step {
                    Some(Step::Respond(response)) => Ok(response),
                    Some(Step::Fail(err)) => Err(err),
                    Some(Step::Hang) | None => std::future::pending().await,
                }
            }
        }
    }

    fn ok(body: &str) -> Step {
        Step::Respond(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn status(code: u16, body: &str) -> Step {
        Step::Respond(HttpResponse {
            status: code,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn assert_elapsed(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    fn client(steps: Vec<Step>) -> RequestClient<ScriptedTransport> {
        let config = ClientConfig::new("http://localhost:3000").unwrap();
        RequestClient::new(config, ScriptedTransport::new(steps))
    }

    #[test]
    fn url_join_inserts_exactly_one_slash() {
        let c = client(Vec::new());
        assert_eq!(c.url_for("events"), "http://localhost:3000/events");
        assert_eq!(c.url_for("/events"), "http://localhost:3000/events");
        assert_eq!(c.url_for("//events/e1"), "http://localhost:3000/events/e1");
        assert_eq!(c.url_for(""), "http://localhost:3000/");
    }

    #[test]
    fn url_join_holds_for_many_shapes() {
        for base in ["http://a.test", "https://api.example.com:8443/v1"] {
            for path in ["x", "events/e1", "events/mine/list?userId=u1"] {
                let expected = format!("{base}/{path}");
                assert_eq!(join_url(base, path), expected);
                assert_eq!(join_url(&format!("{base}/"), &format!("/{path}")), expected);
            }
        }
    }

    #[test]
    fn prepare_sets_json_content_type_and_caller_wins() {
        let c = client(Vec::new());
        let desc = RequestDescriptor::new(HttpMethod::Post, "/events")
            .with_body(json!({"title": "Jazz"}))
            .with_header("Content-Type", "application/vnd.events+json")
            .with_header("x-trace", "abc");
        let req = c.prepare(&desc).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/events");
        assert_eq!(req.header("content-type"), Some("application/vnd.events+json"));
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(
            req.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("content-type")).count(),
            1
        );
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"title": "Jazz"}));
    }

    #[test]
    fn prepare_without_body_has_no_content_type() {
        let c = client(Vec::new());
        let req = c.prepare(&RequestDescriptor::get("events")).unwrap();
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_parsed_json() {
        let c = client(vec![ok(r#"[{"_id":"e1"}]"#)]);
        let payload = c.request(RequestDescriptor::get("/events")).await.unwrap();
        assert_eq!(payload, Payload::Json(json!([{"_id": "e1"}])));
        assert_eq!(c.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lenient_bodies_do_not_fail() {
        let c = client(vec![ok(""), ok("plain text")]);
        let empty = c.request(RequestDescriptor::get("/a")).await.unwrap();
        assert_eq!(empty, Payload::Empty);
        assert_eq!(empty.into_json(), json!({}));

        let text = c.request(RequestDescriptor::get("/b")).await.unwrap();
        assert_eq!(text, Payload::Text("plain text".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_after_fixed_backoff() {
        let c = client(vec![status(503, "busy"), ok(r#"{"ok":true}"#)]);
        let started = Instant::now();
        let payload = c.request(RequestDescriptor::get("/events")).await.unwrap();
        assert_eq!(payload, Payload::Json(json!({"ok": true})));
        assert_eq!(c.transport().calls(), 2);
        assert_elapsed(started, Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_propagates() {
        let c = client(vec![
            Step::Fail(ApiError::Network("refused".to_string())),
            status(500, "still broken"),
        ]);
        let err = c.request(RequestDescriptor::get("/events")).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("still broken"));
        assert_eq!(c.transport().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_fails_fast() {
        let c = client(vec![status(500, ""), ok("{}")]);
        let err = c
            .request(RequestDescriptor::get("/events").with_retries(0))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(c.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_a_loop_bound() {
        let c = client(vec![
            status(500, ""),
            status(500, ""),
            status(500, ""),
            ok("{}"),
        ]);
        let started = Instant::now();
        c.request(RequestDescriptor::get("/events").with_retries(3))
            .await
            .unwrap();
        assert_eq!(c.transport().calls(), 4);
        assert_elapsed(started, Duration::from_millis(3 * 1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempts_time_out_within_bound() {
        let c = client(vec![Step::Hang, Step::Hang]);
        let timeout = Duration::from_millis(1_000);
        let started = Instant::now();
        let err = c
            .request(RequestDescriptor::get("/events").with_timeout(timeout))
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(err.name(), "AbortError");
        assert_eq!(c.transport().calls(), 2);
        assert_elapsed(started, 2 * timeout + Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_success_on_retry() {
        let c = client(vec![Step::Hang, ok(r#"{"_id":"e1"}"#)]);
        let payload = c
            .request(RequestDescriptor::get("/events/e1").with_timeout(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(payload, Payload::Json(json!({"_id": "e1"})));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_without_retry() {
        let c = client(vec![Step::Hang, ok("{}")]);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = c
            .request(RequestDescriptor::get("/events").with_cancel(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert_eq!(err.name(), "AbortError");
        assert_eq!(c.transport().calls(), 1);
    }

    #[test]
    fn decode_rejects_text_payload() {
        let err = Payload::Text("<html>".to_string())
            .decode::<Value>()
            .unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }
}
