//! Optimistic like/going toggles with rollback.
//!
//! # Design
//! `toggle` flips the flag and moves the counter before the first await, so
//! the caller sees the new state immediately. The mutation is then sent
//! through a `RelationMutator`. Success keeps the optimistic state and
//! notifies the observer; failure restores the toggled kind from its
//! pre-toggle snapshot and reports the error to the `ErrorSink`.
//!
//! Each kind has its own pending marker. A second toggle of a kind that is
//! already in flight is ignored without a network call; the other kind is
//! unaffected and may be in flight at the same time. The state mutex is
//! never held across an await.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::EventsClient;
use crate::error::ApiError;
use crate::http::Transport;
use crate::types::{RelationKind, RelationState};

/// Sends a relation change to the backend.
pub trait RelationMutator: Send + Sync {
    fn set_relation(
        &self,
        kind: RelationKind,
        event_id: &str,
        user_id: &str,
        on: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: Transport> RelationMutator for EventsClient<T> {
    fn set_relation(
        &self,
        kind: RelationKind,
        event_id: &str,
        user_id: &str,
        on: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        EventsClient::set_relation(self, kind, event_id, user_id, on)
    }
}

/// Receives failures after a rollback; the user-visible notification seam.
pub trait ErrorSink: Send + Sync {
    fn notify(&self, kind: RelationKind, error: &ApiError);
}

/// Logs rollbacks at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn notify(&self, kind: RelationKind, error: &ApiError) {
        tracing::warn!(kind = kind.as_str(), error = %error, "relation update failed, rolled back");
    }
}

type Observer = Box<dyn Fn(RelationState) + Send + Sync>;

/// Result of one `toggle` call.
#[derive(Debug, Clone)]
pub enum ToggleOutcome {
    /// A toggle of the same kind was already in flight; nothing was sent.
    Ignored,
    /// The backend accepted the change; carries the reconciled state.
    Confirmed(RelationState),
    /// The backend call failed and the kind was restored.
    RolledBack(ApiError),
}

#[derive(Debug, Default)]
struct Inner {
    state: RelationState,
    pending_like: bool,
    pending_going: bool,
    /// Bumped by `reset`; a rollback only applies within the generation it started in.
    generation: u64,
}

impl Inner {
    fn pending_mut(&mut self, kind: RelationKind) -> &mut bool {
        match kind {
            RelationKind::Like => &mut self.pending_like,
            RelationKind::Going => &mut self.pending_going,
        }
    }
}

/// Per-view owner of one event's relation state for one viewer.
pub struct ToggleController<M> {
    mutator: M,
    event_id: String,
    user_id: String,
    inner: Mutex<Inner>,
    observer: Option<Observer>,
    sink: Box<dyn ErrorSink>,
}

impl<M: RelationMutator> ToggleController<M> {
    pub fn new(
        mutator: M,
        event_id: impl Into<String>,
        user_id: impl Into<String>,
        initial: RelationState,
    ) -> Self {
        Self {
            mutator,
            event_id: event_id.into(),
            user_id: user_id.into(),
            inner: Mutex::new(Inner {
                state: initial,
                ..Default::default()
            }),
            observer: None,
            sink: Box::new(TracingSink),
        }
    }

    /// Called with the reconciled state after every confirmed toggle.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(RelationState) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_error_sink<S: ErrorSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn state(&self) -> RelationState {
        self.lock().state
    }

    pub fn is_pending(&self, kind: RelationKind) -> bool {
        *self.lock().pending_mut(kind)
    }

    /// Replace the state after a full reload.
    ///
    /// Pending markers are kept: an in-flight toggle still clears its own
    /// marker when it settles, but a failure no longer restores its
    /// pre-reload snapshot over the reloaded state.
    pub fn reset(&self, state: RelationState) {
        let mut inner = self.lock();
        inner.state = state;
        inner.generation += 1;
    }

    pub async fn toggle(&self, kind: RelationKind) -> ToggleOutcome {
        let Some((snapshot, on, generation)) = self.begin(kind) else {
            tracing::debug!(kind = kind.as_str(), event_id = %self.event_id, "toggle already pending");
            return ToggleOutcome::Ignored;
        };
        let mut in_flight = InFlight {
            controller: self,
            kind,
            snapshot,
            generation,
            settled: false,
        };

        let result = self
            .mutator
            .set_relation(kind, &self.event_id, &self.user_id, on)
            .await;

        in_flight.settled = true;
        match result {
            Ok(()) => {
                let state = self.finish(kind, None, generation);
                if let Some(observer) = &self.observer {
                    observer(state);
                }
                ToggleOutcome::Confirmed(state)
            }
            Err(err) => {
                self.finish(kind, Some(&snapshot), generation);
                self.sink.notify(kind, &err);
                ToggleOutcome::RolledBack(err)
            }
        }
    }

    /// Mark `kind` pending and apply the optimistic flip. `None` if already pending.
    fn begin(&self, kind: RelationKind) -> Option<(RelationState, bool, u64)> {
        let mut inner = self.lock();
        let pending = inner.pending_mut(kind);
        if *pending {
            return None;
        }
        *pending = true;
        let snapshot = inner.state;
        let on = !snapshot.flag(kind);
        inner.state.apply(kind, on);
        Some((snapshot, on, inner.generation))
    }

    /// Clear the pending marker, restoring `kind` from `rollback` if given and
    /// no reset happened since `generation`.
    fn finish(
        &self,
        kind: RelationKind,
        rollback: Option<&RelationState>,
        generation: u64,
    ) -> RelationState {
        let mut inner = self.lock();
        *inner.pending_mut(kind) = false;
        match rollback {
            Some(snapshot) if inner.generation == generation => {
                inner.state.restore(kind, snapshot);
            }
            Some(_) => {
                tracing::debug!(kind = kind.as_str(), event_id = %self.event_id, "state reloaded mid-toggle, skipping rollback");
            }
            None => {}
        }
        inner.state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rolls back an optimistic flip if the toggle future is dropped before settling.
struct InFlight<'a, M: RelationMutator> {
    controller: &'a ToggleController<M>,
    kind: RelationKind,
    snapshot: RelationState,
    generation: u64,
    settled: bool,
}

impl<M: RelationMutator> Drop for InFlight<'_, M> {
    fn drop(&mut self) {
        if !self.settled {
            self.controller
                .finish(self.kind, Some(&self.snapshot), self.generation);
        }
    }
}
