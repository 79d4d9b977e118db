use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{AttachmentInfo, EmbedInfo, NormalizedMessage, ReactionInfo};
use crate::presence::PresenceEntry;

/// The one message a subscriber sends: which (guild, channel) it is viewing.
/// Fields default to `None` so a frame missing either one deserializes and
/// can be ignored instead of erroring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl SubscribeRequest {
    /// Returns the (guild_id, channel_id) pair when both are present and
    /// non-empty.
    pub fn target(&self) -> Option<(&str, &str)> {
        match (self.guild_id.as_deref(), self.channel_id.as_deref()) {
            (Some(g), Some(c)) if !g.is_empty() && !c.is_empty() => Some((g, c)),
            _ => None,
        }
    }
}

/// Every frame pushed to a subscriber, discriminated by the `payload` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum ServerPayload {
    Presence {
        data: Vec<PresenceEntry>,
    },
    Message(NormalizedMessage),
    MessageEdit {
        message_id: String,
        new_content: String,
        edited_at: Option<DateTime<Utc>>,
        #[serde(rename = "hasEmbed")]
        has_embed: bool,
        attachments: Vec<AttachmentInfo>,
        embeds: Vec<EmbedInfo>,
    },
    MessageDelete {
        message_id: String,
        deleted_at: DateTime<Utc>,
    },
    ReactionUpdate {
        message_id: String,
        channel_id: String,
        reactions: Vec<ReactionInfo>,
    },
    ReactionClear {
        message_id: String,
        channel_id: String,
    },
}
