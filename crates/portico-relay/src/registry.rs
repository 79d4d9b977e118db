//! Live subscriber registry: which connection watches which (guild, channel),
//! and the per-connection sender frames are pushed into.

use dashmap::DashMap;
use portico_models::payload::ServerPayload;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub guild_id: String,
    pub channel_id: String,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: DashMap<Uuid, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers what `conn_id` is watching. A connection that subscribes
    /// again simply replaces its previous entry.
    pub fn add(
        &self,
        conn_id: Uuid,
        guild_id: String,
        channel_id: String,
        sender: mpsc::UnboundedSender<String>,
    ) {
        self.inner.insert(
            conn_id,
            Subscription {
                guild_id,
                channel_id,
                sender,
            },
        );
    }

    /// Idempotent; unknown ids are a no-op.
    pub fn remove(&self, conn_id: &Uuid) {
        self.inner.remove(conn_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether anyone is watching `channel_id`. Checked before doing
    /// per-event upstream fetches that nobody would receive.
    pub fn watches_channel(&self, channel_id: &str) -> bool {
        self.inner.iter().any(|s| s.channel_id == channel_id)
    }

    /// Sends `frame` to every subscriber of `guild_id`, serializing once.
    /// Returns how many subscribers it reached.
    pub fn broadcast_guild(&self, guild_id: &str, frame: &ServerPayload) -> usize {
        self.broadcast(|s| s.guild_id == guild_id, frame)
    }

    /// Sends `frame` to every subscriber of `channel_id`.
    pub fn broadcast_channel(&self, channel_id: &str, frame: &ServerPayload) -> usize {
        self.broadcast(|s| s.channel_id == channel_id, frame)
    }

    fn broadcast<F>(&self, matches: F, frame: &ServerPayload) -> usize
    where
        F: Fn(&Subscription) -> bool,
    {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize outbound frame: {e}");
                return 0;
            }
        };
        let mut sent = 0;
        for entry in self.inner.iter() {
            if matches(&entry) {
                // A closed sender means the connection is tearing down; its
                // entry goes away with the socket task.
                if entry.sender.send(text.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }
}
