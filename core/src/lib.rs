//! Client core for the events backend.
//!
//! # Overview
//! Sends requests to the events REST API with a bounded per-attempt timeout
//! and a fixed-backoff retry, maps the backend's loosely shaped responses
//! into typed values, and drives optimistic like/going toggles that roll
//! back when the backend rejects them.
//!
//! # Design
//! - `RequestClient` owns the resolved `ClientConfig` and a `Transport`; it
//!   is the only place that awaits the network.
//! - `EventsClient` splits every operation into `build_*` (descriptor) and
//!   `parse_*` (payload mapping), so the wire contract is testable without
//!   I/O.
//! - `ToggleController` holds one view's relation state and talks to the
//!   backend only through `RelationMutator`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod request;
pub mod session;
pub mod toggle;
pub mod types;

pub use client::EventsClient;
pub use config::{ClientConfig, MutationConvention, Platform, RelationParam};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use request::{Payload, RequestClient, RequestDescriptor};
pub use session::{KeyValueStore, MemoryStore, SessionStore};
pub use toggle::{ErrorSink, RelationMutator, ToggleController, ToggleOutcome, TracingSink};
pub use types::{
    CreateEvent, Event, EventSummary, MineListQuery, Page, RelationBody, RelationKind,
    RelationState, UpdateEvent, UpdateUser, UserProfile,
};
