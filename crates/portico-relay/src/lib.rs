//! Subscriber-facing half of the relay: the WebSocket listener, the live
//! subscription registry, the presence roster cache, snapshot building, and
//! the delta loop that pumps upstream events out to subscribers.

pub mod events;
mod handler;
pub mod presence;
pub mod registry;
pub mod snapshot;

use std::sync::Arc;

use axum::extract::{ws::WebSocketUpgrade, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use portico_upstream::{BindingSlot, UpstreamEvents};

use crate::presence::PresenceCache;
use crate::registry::SubscriptionRegistry;

pub const DEFAULT_HISTORY_LIMIT: u8 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// How many recent messages a snapshot carries.
    pub history_limit: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Shared state behind every subscriber connection and the event loop.
#[derive(Clone)]
pub struct RelayState {
    pub slot: Arc<BindingSlot>,
    pub events: UpstreamEvents,
    pub registry: Arc<SubscriptionRegistry>,
    pub presence: Arc<PresenceCache>,
    pub config: RelayConfig,
}

impl RelayState {
    pub fn new(slot: Arc<BindingSlot>, events: UpstreamEvents, config: RelayConfig) -> Self {
        Self {
            slot,
            events,
            registry: Arc::new(SubscriptionRegistry::new()),
            presence: Arc::new(PresenceCache::new()),
            config,
        }
    }
}

/// Router for the subscriber listener; upgrades at the root path.
pub fn live_router() -> Router<RelayState> {
    Router::new().route("/", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state))
}
