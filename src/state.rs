// src/state.rs

use crate::{database::MessageStore, relay::Relay};
use std::sync::Arc;

/// The application's shared state, accessible from all request handlers.
/// Created once at startup and shared across all connections via Axum's state management.
#[derive(Clone)]
pub struct ChatState {
    pub relay: Arc<Relay>,
    pub store: Arc<dyn MessageStore>,
}

impl ChatState {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            relay: Arc::new(Relay::new(store.clone())),
            store,
        }
    }
}
