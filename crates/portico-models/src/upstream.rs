//! Shapes handed from the upstream platform adapter to the relay. These are
//! already platform-neutral but not yet enriched: replies and reaction user
//! lists still need best-effort fetches before a message goes on the wire.

use chrono::{DateTime, Utc};

use crate::message::{AttachmentInfo, EmbedInfo, EmojiInfo};
use crate::presence::{ChannelInfo, PresenceStatus};

#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Playing,
    Listening,
    Watching,
    Custom,
    Other,
}

#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub kind: ActivityKind,
    pub name: String,
    /// The text of a custom status lives here, not in `name`.
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PresenceInfo {
    pub status: PresenceStatus,
    pub activities: Vec<ActivityInfo>,
}

/// A guild member plus everything the roster needs: roles, the channels the
/// member may view, and their live presence (absent when offline).
#[derive(Debug, Clone)]
pub struct GuildMember {
    pub user_id: String,
    pub display_name: String,
    pub username: String,
    pub avatar_url: String,
    pub is_bot: bool,
    pub role_ids: Vec<String>,
    pub viewable_channels: Vec<ChannelInfo>,
    pub presence: Option<PresenceInfo>,
}

/// Reaction state as the platform reports it on a message: emoji and count,
/// without the user list (that costs one fetch per reaction).
#[derive(Debug, Clone)]
pub struct ReactionSeed {
    pub emoji: EmojiInfo,
    pub amount: u64,
}

/// An unenriched message from the upstream platform.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub channel_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
    pub author_displayname: String,
    pub author_pfp: String,
    pub bot: bool,
    pub attachments: Vec<AttachmentInfo>,
    pub embeds: Vec<EmbedInfo>,
    pub reactions: Vec<ReactionSeed>,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
}
