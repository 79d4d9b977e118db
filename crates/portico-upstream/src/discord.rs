//! Discord adapter: wraps serenity's HTTP client and gateway cache behind
//! [`UpstreamBinding`], and translates gateway events into [`UpstreamEvent`]s
//! on the hub. The relay never sees a serenity type.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::GetMessages;
use serenity::cache::Cache;
use serenity::client::{Client, Context, EventHandler};
use serenity::http::Http;
use serenity::model::channel::{
    Attachment, ChannelType, Embed, GuildChannel, Message, Reaction, ReactionType,
};
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::{ActivityType, GatewayIntents, Presence, Ready};
use serenity::model::guild::{Guild, Member};
use serenity::model::id::{ChannelId, EmojiId, GuildId, MessageId, UserId};
use serenity::model::permissions::Permissions;
use serenity::model::user::{OnlineStatus, User};
use serenity::model::Timestamp;
use tracing::{error, info};

use portico_models::message::{
    AttachmentInfo, EmbedFieldInfo, EmbedInfo, EmbedMediaInfo, EmojiInfo, ReactionUser,
};
use portico_models::presence::{ChannelInfo, PresenceStatus};
use portico_models::upstream::{
    ActivityInfo, ActivityKind, GuildInfo, GuildMember, PresenceInfo, RawMessage, ReactionSeed,
};

use crate::{BindingSlot, UpstreamBinding, UpstreamError, UpstreamEvent, UpstreamEvents};

/// Everything the relay consumes: guild structure, members, presences,
/// messages, reactions, and message content.
fn relay_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_PRESENCES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT
}

/// Builds a client, starts it on a background task, and lets the
/// [`RelayHandler`] install the binding into `slot` once the gateway
/// reports ready.
pub async fn spawn_client(
    token: &str,
    events: UpstreamEvents,
    slot: Arc<BindingSlot>,
) -> Result<(), UpstreamError> {
    let handler = RelayHandler { events, slot };
    let mut client = Client::builder(token, relay_intents())
        .event_handler(handler)
        .await
        .map_err(request_err)?;

    tokio::spawn(async move {
        if let Err(e) = client.start().await {
            error!("upstream client stopped: {e}");
        }
    });
    Ok(())
}

/// Forced re-initialization: throw the current binding away and start a
/// fresh client from the same token. Used by the bootstrap when the first
/// connection never reports ready.
pub async fn rebase_client(
    token: &str,
    events: UpstreamEvents,
    slot: Arc<BindingSlot>,
) -> Result<(), UpstreamError> {
    slot.clear().await;
    spawn_client(token, events, slot).await
}

pub struct DiscordBinding {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordBinding {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl UpstreamBinding for DiscordBinding {
    fn ready(&self) -> bool {
        // The binding is only installed once the gateway fires READY.
        true
    }

    fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        let gid = parse_id(guild_id).ok().map(GuildId::new)?;
        let guild = self.cache.guild(gid)?;
        Some(GuildInfo {
            id: guild.id.to_string(),
            name: guild.name.clone(),
        })
    }

    async fn guild_roster(&self, guild_id: &str) -> Result<Vec<GuildMember>, UpstreamError> {
        let gid = GuildId::new(parse_id(guild_id)?);
        let guild = self
            .cache
            .guild(gid)
            .ok_or_else(|| UpstreamError::GuildUnavailable(guild_id.to_string()))?;
        Ok(guild
            .members
            .values()
            .map(|member| roster_member(&guild, member))
            .collect())
    }

    async fn recent_messages(
        &self,
        guild_id: &str,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RawMessage>, UpstreamError> {
        let cid = ChannelId::new(parse_id(channel_id)?);
        let gid = parse_id(guild_id).ok().map(GuildId::new);
        let messages = cid
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(request_err)?;
        Ok(messages
            .iter()
            .map(|msg| raw_message(&self.cache, gid, msg))
            .collect())
    }

    async fn message(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, UpstreamError> {
        let cid = ChannelId::new(parse_id(channel_id)?);
        let mid = MessageId::new(parse_id(message_id)?);
        let gid = parse_id(guild_id).ok().map(GuildId::new);
        let msg = cid.message(&self.http, mid).await.map_err(request_err)?;
        Ok(raw_message(&self.cache, gid, &msg))
    }

    async fn reaction_users(
        &self,
        guild_id: &str,
        channel_id: &str,
        message_id: &str,
        emoji: &EmojiInfo,
    ) -> Result<Vec<ReactionUser>, UpstreamError> {
        let cid = ChannelId::new(parse_id(channel_id)?);
        let mid = MessageId::new(parse_id(message_id)?);
        let gid = parse_id(guild_id).ok().map(GuildId::new);
        let users = cid
            .reaction_users(&self.http, mid, reaction_type_of(emoji)?, Some(100), None::<UserId>)
            .await
            .map_err(request_err)?;
        Ok(users
            .iter()
            .map(|user| ReactionUser {
                id: user.id.to_string(),
                displayname: display_name_in(&self.cache, gid, user),
            })
            .collect())
    }
}

/// Serenity event handler that feeds the hub. Installs the binding on READY
/// so the bootstrap can observe it.
pub struct RelayHandler {
    pub events: UpstreamEvents,
    pub slot: Arc<BindingSlot>,
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, ctx: Context, data_about_bot: Ready) {
        info!("upstream connected as {}", data_about_bot.user.name);
        self.slot
            .install(Arc::new(DiscordBinding::new(
                ctx.http.clone(),
                ctx.cache.clone(),
            )))
            .await;
    }

    async fn presence_update(&self, ctx: Context, new_data: Presence) {
        let Some(gid) = new_data.guild_id else {
            return;
        };
        let user_id = new_data.user.id;
        let status = status_of(new_data.status);

        // Rebuild the member record with the presence from this event; the
        // cache may not have applied it yet.
        let member = {
            let Some(guild) = ctx.cache.guild(gid) else {
                return;
            };
            guild.members.get(&user_id).map(|member| {
                let mut record = roster_member(&guild, member);
                record.presence = Some(PresenceInfo {
                    status,
                    activities: new_data.activities.iter().map(activity_info).collect(),
                });
                record
            })
        };

        self.events.publish(UpstreamEvent::PresenceChanged {
            guild_id: gid.to_string(),
            user_id: user_id.to_string(),
            status,
            member,
        });
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        let gid = new_message.guild_id;
        self.events.publish(UpstreamEvent::MessageCreated {
            guild_id: gid.map(|id| id.to_string()),
            message: raw_message(&ctx.cache, gid, &new_message),
        });
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        // Without a full message or at least the new content there is
        // nothing meaningful to broadcast.
        let partial = new.is_none() && event.content.is_none();

        let (new_content, edited_at, attachments, embeds) = match &new {
            Some(msg) => (
                msg.content.clone(),
                msg.edited_timestamp.map(to_utc),
                msg.attachments.iter().map(attachment_info).collect(),
                msg.embeds.iter().map(embed_info).collect(),
            ),
            None => (
                event.content.clone().unwrap_or_default(),
                event.edited_timestamp.map(to_utc),
                event
                    .attachments
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(attachment_info)
                    .collect(),
                event
                    .embeds
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(embed_info)
                    .collect(),
            ),
        };

        self.events.publish(UpstreamEvent::MessageEdited {
            channel_id: event.channel_id.to_string(),
            message_id: event.id.to_string(),
            partial,
            new_content,
            edited_at,
            attachments,
            embeds,
        });
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        self.events.publish(UpstreamEvent::MessageDeleted {
            channel_id: channel_id.to_string(),
            message_id: deleted_message_id.to_string(),
        });
    }

    async fn reaction_add(&self, _ctx: Context, add_reaction: Reaction) {
        self.events.publish(UpstreamEvent::ReactionAdded {
            guild_id: add_reaction.guild_id.map(|id| id.to_string()),
            channel_id: add_reaction.channel_id.to_string(),
            message_id: add_reaction.message_id.to_string(),
        });
    }

    async fn reaction_remove(&self, _ctx: Context, removed_reaction: Reaction) {
        self.events.publish(UpstreamEvent::ReactionRemoved {
            guild_id: removed_reaction.guild_id.map(|id| id.to_string()),
            channel_id: removed_reaction.channel_id.to_string(),
            message_id: removed_reaction.message_id.to_string(),
        });
    }

    async fn reaction_remove_all(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        removed_from_message_id: MessageId,
    ) {
        self.events.publish(UpstreamEvent::ReactionsCleared {
            channel_id: channel_id.to_string(),
            message_id: removed_from_message_id.to_string(),
        });
    }
}

fn parse_id(raw: &str) -> Result<u64, UpstreamError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| UpstreamError::InvalidId(raw.to_string()))
}

fn request_err(err: serenity::Error) -> UpstreamError {
    UpstreamError::Request(err.to_string())
}

fn to_utc(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn status_of(status: OnlineStatus) -> PresenceStatus {
    match status {
        OnlineStatus::Online => PresenceStatus::Online,
        OnlineStatus::Idle => PresenceStatus::Idle,
        OnlineStatus::DoNotDisturb => PresenceStatus::Dnd,
        _ => PresenceStatus::Offline,
    }
}

fn activity_info(activity: &serenity::model::gateway::Activity) -> ActivityInfo {
    let kind = match activity.kind {
        ActivityType::Playing => ActivityKind::Playing,
        ActivityType::Listening => ActivityKind::Listening,
        ActivityType::Watching => ActivityKind::Watching,
        ActivityType::Custom => ActivityKind::Custom,
        _ => ActivityKind::Other,
    };
    ActivityInfo {
        kind,
        name: activity.name.clone(),
        state: activity.state.clone(),
    }
}

fn channel_kind(kind: ChannelType) -> u8 {
    match kind {
        ChannelType::Text => 0,
        ChannelType::Voice => 2,
        ChannelType::Category => 4,
        ChannelType::News => 5,
        ChannelType::Stage => 13,
        ChannelType::Forum => 15,
        _ => 0,
    }
}

fn channel_info(channel: &GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id.to_string(),
        name: channel.name.clone(),
        kind: channel_kind(channel.kind),
    }
}

/// Builds a roster record for one member out of the cached guild: roles,
/// the channels the member may view, and their current presence.
fn roster_member(guild: &Guild, member: &Member) -> GuildMember {
    let presence = guild.presences.get(&member.user.id).map(|presence| PresenceInfo {
        status: status_of(presence.status),
        activities: presence.activities.iter().map(activity_info).collect(),
    });

    let viewable_channels = guild
        .channels
        .values()
        .filter(|channel| {
            guild
                .user_permissions_in(channel, member)
                .contains(Permissions::VIEW_CHANNEL)
        })
        .map(channel_info)
        .collect();

    GuildMember {
        user_id: member.user.id.to_string(),
        display_name: member.display_name().to_string(),
        username: member.user.name.clone(),
        avatar_url: member.face(),
        is_bot: member.user.bot,
        role_ids: member.roles.iter().map(|role| role.to_string()).collect(),
        viewable_channels,
        presence,
    }
}

/// Guild nickname when cached, else the global display name, else the
/// username.
fn display_name_in(cache: &Cache, guild_id: Option<GuildId>, user: &User) -> String {
    if let Some(gid) = guild_id {
        if let Some(guild) = cache.guild(gid) {
            if let Some(member) = guild.members.get(&user.id) {
                if let Some(nick) = &member.nick {
                    return nick.clone();
                }
            }
        }
    }
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

fn attachment_info(attachment: &Attachment) -> AttachmentInfo {
    AttachmentInfo {
        id: attachment.id.to_string(),
        name: attachment.filename.clone(),
        url: attachment.url.clone(),
        content_type: attachment.content_type.clone(),
        size: attachment.size as u64,
    }
}

fn embed_info(embed: &Embed) -> EmbedInfo {
    EmbedInfo {
        title: embed.title.clone().unwrap_or_default(),
        description: embed.description.clone().unwrap_or_default(),
        fields: embed
            .fields
            .iter()
            .map(|field| EmbedFieldInfo {
                name: field.name.clone(),
                value: field.value.clone(),
                inline: field.inline,
            })
            .collect(),
        image: embed.image.as_ref().map(|image| EmbedMediaInfo {
            url: image.url.clone(),
            width: image.width,
            height: image.height,
        }),
        video: embed.video.as_ref().map(|video| EmbedMediaInfo {
            url: video.url.clone(),
            width: video.width,
            height: video.height,
        }),
        url: embed.url.clone(),
        footer: embed
            .footer
            .as_ref()
            .map(|footer| footer.text.clone())
            .unwrap_or_default(),
        timestamp: embed.timestamp.map(|ts| to_utc(ts).to_rfc3339()),
        color: embed.colour.map(|colour| colour.0),
    }
}

fn emoji_info(reaction_type: &ReactionType) -> EmojiInfo {
    match reaction_type {
        ReactionType::Custom { animated, id, name } => EmojiInfo {
            id: Some(id.to_string()),
            name: name.clone(),
            animated: *animated,
        },
        ReactionType::Unicode(name) => EmojiInfo {
            id: None,
            name: Some(name.clone()),
            animated: false,
        },
        _ => EmojiInfo {
            id: None,
            name: None,
            animated: false,
        },
    }
}

fn reaction_type_of(emoji: &EmojiInfo) -> Result<ReactionType, UpstreamError> {
    match &emoji.id {
        Some(id) => Ok(ReactionType::Custom {
            animated: emoji.animated,
            id: EmojiId::new(parse_id(id)?),
            name: emoji.name.clone(),
        }),
        None => Ok(ReactionType::Unicode(
            emoji.name.clone().unwrap_or_default(),
        )),
    }
}

fn raw_message(cache: &Cache, guild_id: Option<GuildId>, msg: &Message) -> RawMessage {
    RawMessage {
        message_id: msg.id.to_string(),
        channel_id: msg.channel_id.to_string(),
        content: msg.content.clone(),
        timestamp: to_utc(msg.timestamp),
        author_id: msg.author.id.to_string(),
        author_displayname: display_name_in(cache, guild_id, &msg.author),
        author_pfp: msg.author.face(),
        bot: msg.author.bot,
        attachments: msg.attachments.iter().map(attachment_info).collect(),
        embeds: msg.embeds.iter().map(embed_info).collect(),
        reactions: msg
            .reactions
            .iter()
            .map(|reaction| ReactionSeed {
                emoji: emoji_info(&reaction.reaction_type),
                amount: reaction.count,
            })
            .collect(),
        reply_to: msg
            .message_reference
            .as_ref()
            .and_then(|reference| reference.message_id)
            .map(|id| id.to_string()),
        edited_at: msg.edited_timestamp.map(to_utc),
    }
}
