//! Signed-in user identity.
//!
//! The device key-value store and the OAuth browser flow are external; this
//! module only reads and writes the stored user id through `KeyValueStore`
//! and pulls the id out of the OAuth callback URL.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use url::Url;

use crate::error::ApiError;

/// Storage key holding the user id, written as a JSON string.
pub const USER_ID_KEY: &str = "userId";

/// Callback query parameter carrying the user id after OAuth.
pub const CALLBACK_USER_PARAM: &str = "user";

/// Minimal string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;
    fn remove(&self, key: &str) -> Result<(), ApiError>;
}

/// In-process store, for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Reads and writes the signed-in user id.
#[derive(Debug)]
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The stored user id, if any.
    pub fn user_id(&self) -> Result<Option<String>, ApiError> {
        Ok(self
            .store
            .get(USER_ID_KEY)?
            .and_then(|raw| parse_stored_user(&raw)))
    }

    pub fn sign_in(&self, user_id: &str) -> Result<(), ApiError> {
        if user_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("user id is empty".to_string()));
        }
        tracing::debug!(user_id, "storing signed-in user");
        let encoded = serde_json::to_string(user_id)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        self.store.set(USER_ID_KEY, &encoded)
    }

    /// Store the user carried by an OAuth callback URL and return its id.
    pub fn sign_in_from_callback(&self, callback_url: &str) -> Result<String, ApiError> {
        let user_id = user_id_from_callback(callback_url)?;
        self.sign_in(&user_id)?;
        Ok(user_id)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.remove(USER_ID_KEY)
    }
}

/// Interpret a stored value.
///
/// `sign_in` writes a JSON string. Values written by older clients may be a
/// JSON `{id}` / `{_id}` object or bare text; anything else that is not a
/// JSON string or object is taken verbatim, so numeric-looking ids keep
/// every digit.
pub fn parse_stored_user(raw: &str) -> Option<String> {
    let id = match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => Some(s),
        Ok(Value::Object(map)) => ["id", "_id"].iter().find_map(|k| match map.get(*k)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        Ok(Value::Null) => None,
        _ => Some(raw.to_string()),
    };
    id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Extract the `user` query parameter from an OAuth redirect URL.
pub fn user_id_from_callback(callback_url: &str) -> Result<String, ApiError> {
    let url = Url::parse(callback_url)
        .map_err(|e| ApiError::InvalidInput(format!("invalid callback url: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == CALLBACK_USER_PARAM)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("callback url carries no user".to_string()))
}
