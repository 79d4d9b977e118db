//! The boundary to the upstream chat platform: the [`UpstreamBinding`]
//! contract the relay programs against, the event hub upstream events are
//! published on, and the [`BindingSlot`] that holds the binding once the
//! credential has arrived.

pub mod bootstrap;
pub mod discord;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use portico_models::message::{AttachmentInfo, EmbedInfo, EmojiInfo, ReactionUser};
use portico_models::presence::PresenceStatus;
use portico_models::upstream::{GuildInfo, GuildMember, RawMessage};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream binding is not ready")]
    NotReady,
    #[error("guild {0} is not available")]
    GuildUnavailable(String),
    #[error("invalid upstream id: {0}")]
    InvalidId(String),
    #[error("upstream request failed: {0}")]
    Request(String),
}

/// Read surface of the single upstream connection. Every fetch can fail
/// (network, permissions); callers degrade and log, they never crash on it.
#[async_trait]
pub trait UpstreamBinding: Send + Sync {
    fn ready(&self) -> bool;

    fn guild(&self, guild_id: &str) -> Option<GuildInfo>;

    /// Bulk members + presences for a guild, with role ids and the channels
    /// each member may view already resolved.
    async fn guild_roster(&self, guild_id: &str) -> Result<Vec<GuildMember>, UpstreamError>;

    /// The channel's most recent messages, in whatever order the platform
    /// returns them.
    async fn recent_messages(
        &self,
        guild_id: &str,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RawMessage>, UpstreamError>;

    async fn message(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, UpstreamError>;

    async fn reaction_users(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: &str,
        emoji: &EmojiInfo,
    ) -> Result<Vec<ReactionUser>, UpstreamError>;
}

/// One upstream gateway event, already translated out of platform types.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    PresenceChanged {
        guild_id: String,
        user_id: String,
        status: PresenceStatus,
        /// Rebuilt member record carrying the new presence; `None` when the
        /// member is unknown (left the guild, or went offline).
        member: Option<GuildMember>,
    },
    MessageCreated {
        guild_id: Option<String>,
        message: RawMessage,
    },
    MessageEdited {
        channel_id: String,
        message_id: String,
        /// The platform delivered an edit for a message it has not fully
        /// loaded; such edits are skipped.
        partial: bool,
        new_content: String,
        edited_at: Option<DateTime<Utc>>,
        attachments: Vec<AttachmentInfo>,
        embeds: Vec<EmbedInfo>,
    },
    MessageDeleted {
        channel_id: String,
        message_id: String,
    },
    ReactionAdded {
        guild_id: Option<String>,
        channel_id: String,
        message_id: String,
    },
    ReactionRemoved {
        guild_id: Option<String>,
        channel_id: String,
        message_id: String,
    },
    ReactionsCleared {
        channel_id: String,
        message_id: String,
    },
}

/// Broadcast hub the upstream adapter publishes into and the relay
/// subscribes to.
#[derive(Clone)]
pub struct UpstreamEvents {
    sender: broadcast::Sender<UpstreamEvent>,
}

impl UpstreamEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: UpstreamEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent> {
        self.sender.subscribe()
    }
}

impl Default for UpstreamEvents {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// Shared slot for the upstream binding. Empty at process start when the
/// credential has not arrived yet; filled by the adapter once the gateway
/// reports ready, and cleared again on a forced rebuild.
#[derive(Default)]
pub struct BindingSlot {
    inner: RwLock<Option<Arc<dyn UpstreamBinding>>>,
}

impl BindingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, binding: Arc<dyn UpstreamBinding>) {
        *self.inner.write().await = Some(binding);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn get(&self) -> Option<Arc<dyn UpstreamBinding>> {
        self.inner.read().await.clone()
    }

    pub async fn ready(&self) -> bool {
        match self.inner.read().await.as_ref() {
            Some(binding) => binding.ready(),
            None => false,
        }
    }
}
