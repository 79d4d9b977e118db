use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub size: u64,
}

/// Custom emoji carry an id; unicode emoji only a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionUser {
    pub id: String,
    pub displayname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionInfo {
    pub users: Vec<ReactionUser>,
    pub emoji: EmojiInfo,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepliedTo {
    pub message_id: String,
    pub author_id: String,
    pub displayname: String,
    pub content: String,
    pub pfp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedFieldInfo {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedMediaInfo {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedInfo {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedFieldInfo>,
    pub image: Option<EmbedMediaInfo>,
    pub video: Option<EmbedMediaInfo>,
    pub url: Option<String>,
    /// Footer text only; the client does not render footer icons.
    pub footer: String,
    pub timestamp: Option<String>,
    pub color: Option<u32>,
}

/// The single message shape shared by the snapshot path and live deltas,
/// so the client never has to care where a message came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub message_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
    pub author_displayname: String,
    pub author_pfp: String,
    pub bot: bool,
    pub attachments: Vec<AttachmentInfo>,
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(rename = "hasEmbed")]
    pub has_embed: bool,
    pub embeds: Vec<EmbedInfo>,
    pub replied_to: Option<RepliedTo>,
    pub reactions: Vec<ReactionInfo>,
}
