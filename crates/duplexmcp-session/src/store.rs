//! Pluggable persistence of per-session state.
//!
//! Stream-oriented transports key session state by an opaque session ID that
//! outlives any single network connection; a [`SessionStore`] lets that state
//! survive process restarts. The in-memory default is a mutex-guarded map.

use async_trait::async_trait;
use duplexmcp_protocol::types::LoggingLevel;
use duplexmcp_protocol::types::initialization::InitializeParams;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from session-state storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No state exists for the given session ID.
    #[error("session state not found")]
    NotFound,
    /// The backend failed.
    #[error("session store backend error: {0}")]
    Backend(String),
}

/// Durable per-session state.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionState {
    /// The initialize parameters the client sent, once received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialize_params: Option<InitializeParams>,
    /// The minimum log level the client asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LoggingLevel>,
}

/// Storage backend for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load state for a session; [`StoreError::NotFound`] for unknown IDs.
    async fn load(&self, session_id: &str) -> Result<SessionState, StoreError>;

    /// Store (or replace) state for a session.
    async fn store(&self, session_id: &str, state: SessionState) -> Result<(), StoreError>;

    /// Delete state for a session; deleting an unknown ID is a no-op.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}

/// In-memory session store: a mutex-guarded map.
#[derive(Default)]
pub struct MemorySessionStore {
    states: Mutex<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<SessionState, StoreError> {
        self.states
            .lock()
            .get(session_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn store(&self, session_id: &str, state: SessionState) -> Result<(), StoreError> {
        self.states.lock().insert(session_id.to_string(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.states.lock().remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_unknown_is_not_found() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load("missing").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_store_load_delete_cycle() {
        let store = MemorySessionStore::new();
        let state = SessionState {
            initialize_params: None,
            log_level: Some(LoggingLevel::Warning),
        };
        store.store("s1", state.clone()).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), state);

        store.delete("s1").await.unwrap();
        assert_eq!(store.load("s1").await, Err(StoreError::NotFound));

        // Deleting again is a no-op.
        store.delete("s1").await.unwrap();
    }
}
