//! Builds the frames a fresh subscriber receives: the guild's presence
//! roster first, then the channel's recent history oldest-first, one frame
//! per message.

use chrono::{DateTime, Utc};
use portico_models::message::{NormalizedMessage, ReactionInfo, RepliedTo};
use portico_models::payload::ServerPayload;
use portico_models::upstream::RawMessage;
use portico_upstream::{UpstreamBinding, UpstreamError};
use tracing::{debug, warn};

use crate::presence::PresenceCache;

pub async fn build(
    binding: &dyn UpstreamBinding,
    presence: &PresenceCache,
    guild_id: &str,
    channel_id: &str,
    history_limit: u8,
) -> Result<Vec<ServerPayload>, UpstreamError> {
    let mut frames = Vec::new();

    match presence.get_or_build(guild_id, binding).await {
        Ok(data) => frames.push(ServerPayload::Presence { data }),
        // History is still worth sending when the roster fetch fails.
        Err(e) => warn!(guild_id, "failed to build presence roster: {e}"),
    }

    let mut history = binding
        .recent_messages(guild_id, channel_id, history_limit)
        .await?;
    history.sort_by_key(|msg| msg.timestamp);

    for raw in history {
        let normalized = normalize_message(binding, guild_id, raw).await;
        frames.push(ServerPayload::Message(normalized));
    }
    Ok(frames)
}

/// Enriches one raw message into the wire shape: reply context and reaction
/// user lists are fetched best-effort, and empty content falls back to the
/// attachment URLs.
pub async fn normalize_message(
    binding: &dyn UpstreamBinding,
    guild_id: &str,
    raw: RawMessage,
) -> NormalizedMessage {
    let replied_to = match &raw.reply_to {
        Some(parent_id) => resolve_reply(binding, guild_id, &raw.channel_id, parent_id).await,
        None => None,
    };
    let reactions =
        resolve_reactions(binding, guild_id, &raw.channel_id, &raw.message_id, &raw).await;

    NormalizedMessage {
        message_id: raw.message_id,
        content: content_or_attachments(&raw.content, &raw.attachments),
        timestamp: raw.timestamp,
        author_id: raw.author_id,
        author_displayname: raw.author_displayname,
        author_pfp: raw.author_pfp,
        bot: raw.bot,
        has_embed: !raw.embeds.is_empty(),
        attachments: raw.attachments,
        edited_at: raw.edited_at,
        embeds: raw.embeds,
        replied_to,
        reactions,
    }
}

async fn resolve_reply(
    binding: &dyn UpstreamBinding,
    guild_id: &str,
    channel_id: &str,
    parent_id: &str,
) -> Option<RepliedTo> {
    match binding.message(guild_id, channel_id, parent_id).await {
        Ok(parent) => Some(RepliedTo {
            message_id: parent.message_id,
            author_id: parent.author_id,
            displayname: parent.author_displayname,
            content: parent.content,
            pfp: parent.author_pfp,
        }),
        // Deleted parents are common; the reply renders without context.
        Err(e) => {
            debug!(parent_id, "could not resolve reply target: {e}");
            None
        }
    }
}

/// Expands reaction seeds (emoji + count) into full user lists. A failed
/// fetch keeps the reaction with an empty user list.
pub async fn resolve_reactions(
    binding: &dyn UpstreamBinding,
    guild_id: &str,
    channel_id: &str,
    message_id: &str,
    raw: &RawMessage,
) -> Vec<ReactionInfo> {
    let mut reactions = Vec::with_capacity(raw.reactions.len());
    for seed in &raw.reactions {
        let users = match binding
            .reaction_users(guild_id, channel_id, message_id, &seed.emoji)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                warn!(message_id, "failed to fetch reaction users: {e}");
                Vec::new()
            }
        };
        reactions.push(ReactionInfo {
            users,
            emoji: seed.emoji.clone(),
            amount: seed.amount,
        });
    }
    reactions
}

pub(crate) fn content_or_attachments(
    content: &str,
    attachments: &[portico_models::message::AttachmentInfo],
) -> String {
    if !content.trim().is_empty() {
        return content.to_string();
    }
    attachments
        .iter()
        .map(|a| a.url.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Current timestamp helper for deletion frames, kept here so the event
/// loop and tests stamp deletes the same way.
pub fn deleted_now() -> DateTime<Utc> {
    Utc::now()
}
