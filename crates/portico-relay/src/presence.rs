//! Per-guild online roster cache. A guild's roster is built lazily on the
//! first subscription that names it and then maintained from presence
//! deltas; members going offline are removed, never marked.

use std::collections::HashMap;

use dashmap::DashMap;
use portico_models::presence::{PresenceEntry, PresenceStatus, PresenceUser};
use portico_models::upstream::{ActivityInfo, ActivityKind, GuildMember};
use portico_upstream::{UpstreamBinding, UpstreamError};

#[derive(Default)]
pub struct PresenceCache {
    guilds: DashMap<String, HashMap<String, PresenceEntry>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self, guild_id: &str) -> bool {
        self.guilds.contains_key(guild_id)
    }

    /// Returns the roster for `guild_id`, building it from a full member
    /// fetch when this is the first subscriber to name the guild.
    pub async fn get_or_build(
        &self,
        guild_id: &str,
        binding: &dyn UpstreamBinding,
    ) -> Result<Vec<PresenceEntry>, UpstreamError> {
        if let Some(roster) = self.roster(guild_id) {
            return Ok(roster);
        }

        let members = binding.guild_roster(guild_id).await?;
        let online: HashMap<String, PresenceEntry> = members
            .iter()
            .filter_map(roster_entry)
            .map(|entry| (entry.user.id.clone(), entry))
            .collect();
        let roster = online.values().cloned().collect();
        self.guilds.insert(guild_id.to_string(), online);
        Ok(roster)
    }

    /// Current roster, or `None` when no subscriber has built this guild yet.
    pub fn roster(&self, guild_id: &str) -> Option<Vec<PresenceEntry>> {
        self.guilds
            .get(guild_id)
            .map(|online| online.values().cloned().collect())
    }

    /// Applies one presence delta. Guilds nobody has subscribed to are left
    /// unbuilt; their events are dropped here. Returns `true` when the
    /// roster changed and subscribers should receive a fresh copy.
    pub fn apply_update(
        &self,
        guild_id: &str,
        user_id: &str,
        status: PresenceStatus,
        member: Option<&GuildMember>,
    ) -> bool {
        let Some(mut online) = self.guilds.get_mut(guild_id) else {
            return false;
        };

        if status.is_offline() {
            return online.remove(user_id).is_some();
        }
        match member.and_then(roster_entry) {
            Some(entry) => {
                online.insert(user_id.to_string(), entry);
                true
            }
            // No member record to rebuild from; an entry we cannot refresh
            // is dropped rather than served stale.
            None => online.remove(user_id).is_some(),
        }
    }

    pub fn invalidate(&self, guild_id: &str) {
        self.guilds.remove(guild_id);
    }
}

/// Builds the wire-shaped roster entry for one member. Offline members (and
/// members with no presence at all) yield `None`.
fn roster_entry(member: &GuildMember) -> Option<PresenceEntry> {
    let presence = member.presence.as_ref()?;
    if presence.status.is_offline() {
        return None;
    }
    Some(PresenceEntry {
        user: PresenceUser {
            id: member.user_id.clone(),
            display_name: member.display_name.clone(),
            username: member.username.clone(),
            icon: member.avatar_url.clone(),
            status: presence.status,
            status_text: status_text(&presence.activities),
        },
        role_ids: member.role_ids.clone(),
        accessible_channels: member.viewable_channels.clone(),
    })
}

/// A custom status wins; otherwise the first game/music/video activity is
/// rendered with its verb. Anything else shows no text.
fn status_text(activities: &[ActivityInfo]) -> String {
    let custom = activities
        .iter()
        .find(|a| a.kind == ActivityKind::Custom)
        .and_then(|a| a.state.clone())
        .filter(|state| !state.is_empty());
    if let Some(text) = custom {
        return text;
    }

    activities
        .iter()
        .find_map(|a| match a.kind {
            ActivityKind::Playing => Some(format!("Playing {}", a.name)),
            ActivityKind::Listening => Some(format!("Listening to {}", a.name)),
            ActivityKind::Watching => Some(format!("Watching {}", a.name)),
            _ => None,
        })
        .unwrap_or_default()
}
