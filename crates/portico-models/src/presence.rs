use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    Dnd,
    Offline,
}

impl PresenceStatus {
    pub fn is_offline(self) -> bool {
        matches!(self, Self::Offline)
    }
}

/// The user half of a roster entry, in the exact shape clients render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUser {
    pub id: String,
    pub display_name: String,
    pub username: String,
    /// Avatar URL.
    pub icon: String,
    pub status: PresenceStatus,
    #[serde(rename = "statusText")]
    pub status_text: String,
}

/// A channel reference carried inside roster entries so the client can
/// gate which channels each user may be shown in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// One entry of a guild's online roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user: PresenceUser,
    pub role_ids: Vec<String>,
    pub accessible_channels: Vec<ChannelInfo>,
}
