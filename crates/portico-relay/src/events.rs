//! The delta loop: drains the upstream event hub and fans frames out to
//! whoever is subscribed. Each event kind has its own handler; a failed
//! upstream fetch degrades that one event, never the loop.

use portico_models::payload::ServerPayload;
use portico_upstream::UpstreamEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::snapshot;
use crate::RelayState;

/// Spawns the dispatch loop on the runtime. Runs until the hub is dropped.
pub fn attach(state: RelayState) -> JoinHandle<()> {
    let mut rx = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => dispatch(&state, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event loop lagged behind the upstream hub");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn dispatch(state: &RelayState, event: UpstreamEvent) {
    match event {
        UpstreamEvent::PresenceChanged {
            guild_id,
            user_id,
            status,
            member,
        } => {
            // Only guilds somebody has already subscribed to carry a roster;
            // everything else is dropped here.
            if !state
                .presence
                .apply_update(&guild_id, &user_id, status, member.as_ref())
            {
                return;
            }
            // Subscribers always get the full rebuilt roster, not a diff.
            if let Some(data) = state.presence.roster(&guild_id) {
                state
                    .registry
                    .broadcast_guild(&guild_id, &ServerPayload::Presence { data });
            }
        }

        UpstreamEvent::MessageCreated { guild_id, message } => {
            // Direct messages carry no guild and are never relayed.
            let Some(guild_id) = guild_id else { return };
            if !state.registry.watches_channel(&message.channel_id) {
                return;
            }
            let Some(binding) = state.slot.get().await else {
                warn!("message event with no upstream binding, dropping");
                return;
            };
            let channel_id = message.channel_id.clone();
            let normalized = snapshot::normalize_message(binding.as_ref(), &guild_id, message).await;
            state
                .registry
                .broadcast_channel(&channel_id, &ServerPayload::Message(normalized));
        }

        UpstreamEvent::MessageEdited {
            channel_id,
            message_id,
            partial,
            new_content,
            edited_at,
            attachments,
            embeds,
        } => {
            // An edit for a message the platform has not fully loaded has
            // nothing renderable in it.
            if partial {
                debug!(message_id, "skipping partial message edit");
                return;
            }
            let frame = ServerPayload::MessageEdit {
                message_id,
                new_content: snapshot::content_or_attachments(&new_content, &attachments),
                edited_at,
                has_embed: !embeds.is_empty(),
                attachments,
                embeds,
            };
            state.registry.broadcast_channel(&channel_id, &frame);
        }

        UpstreamEvent::MessageDeleted {
            channel_id,
            message_id,
        } => {
            let frame = ServerPayload::MessageDelete {
                message_id,
                deleted_at: snapshot::deleted_now(),
            };
            state.registry.broadcast_channel(&channel_id, &frame);
        }

        UpstreamEvent::ReactionAdded {
            guild_id,
            channel_id,
            message_id,
        }
        | UpstreamEvent::ReactionRemoved {
            guild_id,
            channel_id,
            message_id,
        } => {
            reaction_update(state, guild_id.as_deref(), &channel_id, &message_id).await;
        }

        UpstreamEvent::ReactionsCleared {
            channel_id,
            message_id,
        } => {
            let frame = ServerPayload::ReactionClear {
                message_id,
                channel_id: channel_id.clone(),
            };
            state.registry.broadcast_channel(&channel_id, &frame);
        }
    }
}

/// Adds and removals both resend the message's complete reaction list; the
/// client replaces, never patches.
async fn reaction_update(
    state: &RelayState,
    guild_id: Option<&str>,
    channel_id: &str,
    message_id: &str,
) {
    if !state.registry.watches_channel(channel_id) {
        return;
    }
    let Some(binding) = state.slot.get().await else {
        warn!("reaction event with no upstream binding, dropping");
        return;
    };

    let guild_id = guild_id.unwrap_or_default();
    let raw = match binding.message(guild_id, channel_id, message_id).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(message_id, "failed to refetch message for reactions: {e}");
            return;
        }
    };
    let reactions =
        snapshot::resolve_reactions(binding.as_ref(), guild_id, channel_id, message_id, &raw).await;

    let frame = ServerPayload::ReactionUpdate {
        message_id: message_id.to_string(),
        channel_id: channel_id.to_string(),
        reactions,
    };
    state.registry.broadcast_channel(channel_id, &frame);
}
