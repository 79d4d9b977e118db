//! End-to-end relay behavior against a scripted upstream: snapshot shape
//! and ordering, then the delta loop fanning events out to subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use portico_models::message::{EmojiInfo, ReactionUser};
use portico_models::presence::PresenceStatus;
use portico_models::upstream::{
    ActivityInfo, ActivityKind, GuildInfo, GuildMember, PresenceInfo, RawMessage, ReactionSeed,
};
use portico_relay::{events, snapshot, RelayConfig, RelayState};
use portico_upstream::{BindingSlot, UpstreamBinding, UpstreamError, UpstreamEvent, UpstreamEvents};

struct MockBinding {
    roster: Vec<GuildMember>,
    history: Vec<RawMessage>,
    by_id: HashMap<String, RawMessage>,
    reactors: Vec<ReactionUser>,
    fail_roster: bool,
}

impl MockBinding {
    fn new(roster: Vec<GuildMember>, history: Vec<RawMessage>) -> Self {
        let by_id = history
            .iter()
            .map(|m| (m.message_id.clone(), m.clone()))
            .collect();
        Self {
            roster,
            history,
            by_id,
            reactors: vec![ReactionUser {
                id: "77".into(),
                displayname: "reactor".into(),
            }],
            fail_roster: false,
        }
    }
}

#[async_trait]
impl UpstreamBinding for MockBinding {
    fn ready(&self) -> bool {
        true
    }

    fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        Some(GuildInfo {
            id: guild_id.to_string(),
            name: "test guild".into(),
        })
    }

    async fn guild_roster(&self, guild_id: &str) -> Result<Vec<GuildMember>, UpstreamError> {
        if self.fail_roster {
            return Err(UpstreamError::GuildUnavailable(guild_id.to_string()));
        }
        Ok(self.roster.clone())
    }

    async fn recent_messages(
        &self,
        _guild_id: &str,
        _channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RawMessage>, UpstreamError> {
        Ok(self.history.iter().take(limit as usize).cloned().collect())
    }

    async fn message(
        &self,
        _guild_id: &str,
        _channel_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, UpstreamError> {
        self.by_id
            .get(message_id)
            .cloned()
            .ok_or_else(|| UpstreamError::Request("unknown message".into()))
    }

    async fn reaction_users(
        &self,
        _guild_id: &str,
        _channel_id: &str,
        _message_id: &str,
        _emoji: &EmojiInfo,
    ) -> Result<Vec<ReactionUser>, UpstreamError> {
        Ok(self.reactors.clone())
    }
}

fn member(user_id: &str, status: PresenceStatus, activities: Vec<ActivityInfo>) -> GuildMember {
    GuildMember {
        user_id: user_id.to_string(),
        display_name: format!("member-{user_id}"),
        username: format!("user{user_id}"),
        avatar_url: "https://cdn.example/a.png".into(),
        is_bot: false,
        role_ids: vec!["5".into()],
        viewable_channels: vec![],
        presence: Some(PresenceInfo { status, activities }),
    }
}

fn message(id: &str, channel_id: &str, content: &str, secs: i64) -> RawMessage {
    RawMessage {
        message_id: id.to_string(),
        channel_id: channel_id.to_string(),
        content: content.to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        author_id: "1".into(),
        author_displayname: "author".into(),
        author_pfp: "https://cdn.example/p.png".into(),
        bot: false,
        attachments: vec![],
        embeds: vec![],
        reactions: vec![],
        reply_to: None,
        edited_at: None,
    }
}

fn parse(frame: &str) -> Value {
    serde_json::from_str(frame).unwrap()
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("channel closed");
    parse(&frame)
}

async fn relay_state(binding: MockBinding) -> RelayState {
    let slot = Arc::new(BindingSlot::new());
    slot.install(Arc::new(binding)).await;
    RelayState::new(slot, UpstreamEvents::default(), RelayConfig::default())
}

#[tokio::test]
async fn snapshot_is_presence_then_history_oldest_first() {
    let roster = vec![
        member("10", PresenceStatus::Online, vec![]),
        member("11", PresenceStatus::Offline, vec![]),
    ];
    // Platform order is newest-first.
    let history = vec![
        message("3", "c1", "third", 300),
        message("2", "c1", "second", 200),
        message("1", "c1", "first", 100),
    ];
    let binding = MockBinding::new(roster, history);
    let state = relay_state(binding).await;
    let slot_binding = state.slot.get().await.unwrap();

    let frames = snapshot::build(slot_binding.as_ref(), &state.presence, "g1", "c1", 100)
        .await
        .unwrap();
    assert_eq!(frames.len(), 4);

    let presence = serde_json::to_value(&frames[0]).unwrap();
    assert_eq!(presence["payload"], "presence");
    // Offline members never appear in the roster.
    assert_eq!(presence["data"].as_array().unwrap().len(), 1);
    assert_eq!(presence["data"][0]["user"]["id"], "10");

    let contents: Vec<String> = frames[1..]
        .iter()
        .map(|f| serde_json::to_value(f).unwrap()["content"]
            .as_str()
            .unwrap()
            .to_string())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn snapshot_resolves_replies_and_reactions() {
    let mut replying = message("2", "c1", "a reply", 200);
    replying.reply_to = Some("1".into());
    replying.reactions = vec![ReactionSeed {
        emoji: EmojiInfo {
            id: None,
            name: Some("👍".into()),
            animated: false,
        },
        amount: 1,
    }];
    let history = vec![replying, message("1", "c1", "the parent", 100)];
    let binding = MockBinding::new(vec![], history);
    let state = relay_state(binding).await;
    let slot_binding = state.slot.get().await.unwrap();

    let frames = snapshot::build(slot_binding.as_ref(), &state.presence, "g1", "c1", 100)
        .await
        .unwrap();
    let reply = serde_json::to_value(&frames[2]).unwrap();
    assert_eq!(reply["message_id"], "2");
    assert_eq!(reply["replied_to"]["message_id"], "1");
    assert_eq!(reply["replied_to"]["content"], "the parent");
    assert_eq!(reply["reactions"][0]["users"][0]["id"], "77");
    assert_eq!(reply["reactions"][0]["amount"], 1);
}

#[tokio::test]
async fn message_created_fans_out_to_channel_watchers() {
    let binding = MockBinding::new(vec![], vec![]);
    let state = relay_state(binding).await;
    events::attach(state.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c1".into(), tx);
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c2".into(), other_tx);

    state.events.publish(UpstreamEvent::MessageCreated {
        guild_id: Some("g1".into()),
        message: message("5", "c1", "hello", 500),
    });

    let frame = recv(&mut rx).await;
    assert_eq!(frame["payload"], "message");
    assert_eq!(frame["message_id"], "5");
    assert_eq!(frame["content"], "hello");
    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn presence_delta_resends_the_full_roster() {
    let roster = vec![
        member("10", PresenceStatus::Online, vec![]),
        member("11", PresenceStatus::Online, vec![]),
    ];
    let binding = MockBinding::new(roster, vec![]);
    let state = relay_state(binding).await;
    let slot_binding = state.slot.get().await.unwrap();

    // First subscriber builds the roster.
    state
        .presence
        .get_or_build("g1", slot_binding.as_ref())
        .await
        .unwrap();

    events::attach(state.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c1".into(), tx);

    state.events.publish(UpstreamEvent::PresenceChanged {
        guild_id: "g1".into(),
        user_id: "11".into(),
        status: PresenceStatus::Offline,
        member: None,
    });

    let frame = recv(&mut rx).await;
    assert_eq!(frame["payload"], "presence");
    let data = frame["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["user"]["id"], "10");
}

#[tokio::test]
async fn presence_delta_for_unbuilt_guild_sends_nothing() {
    let binding = MockBinding::new(vec![], vec![]);
    let state = relay_state(binding).await;
    events::attach(state.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g9".into(), "c9".into(), tx);

    let m = member("10", PresenceStatus::Online, vec![]);
    state.events.publish(UpstreamEvent::PresenceChanged {
        guild_id: "g9".into(),
        user_id: "10".into(),
        status: PresenceStatus::Online,
        member: Some(m),
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn reaction_add_resends_the_complete_reaction_list() {
    let mut msg = message("7", "c1", "reacted", 700);
    msg.reactions = vec![ReactionSeed {
        emoji: EmojiInfo {
            id: Some("123".into()),
            name: Some("blob".into()),
            animated: true,
        },
        amount: 3,
    }];
    let binding = MockBinding::new(vec![], vec![msg]);
    let state = relay_state(binding).await;
    events::attach(state.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c1".into(), tx);

    state.events.publish(UpstreamEvent::ReactionAdded {
        guild_id: Some("g1".into()),
        channel_id: "c1".into(),
        message_id: "7".into(),
    });

    let frame = recv(&mut rx).await;
    assert_eq!(frame["payload"], "reaction_update");
    assert_eq!(frame["message_id"], "7");
    assert_eq!(frame["channel_id"], "c1");
    assert_eq!(frame["reactions"][0]["emoji"]["id"], "123");
    assert_eq!(frame["reactions"][0]["amount"], 3);
    assert_eq!(frame["reactions"][0]["users"][0]["displayname"], "reactor");

    // Removals also resend the recomputed list, never a diff.
    state.events.publish(UpstreamEvent::ReactionRemoved {
        guild_id: Some("g1".into()),
        channel_id: "c1".into(),
        message_id: "7".into(),
    });
    let after_remove = recv(&mut rx).await;
    assert_eq!(after_remove["payload"], "reaction_update");
    assert_eq!(after_remove["message_id"], "7");
}

#[tokio::test]
async fn failed_roster_fetch_skips_presence_but_not_history() {
    let mut binding = MockBinding::new(vec![], vec![message("1", "c1", "still here", 100)]);
    binding.fail_roster = true;
    let state = relay_state(binding).await;
    let slot_binding = state.slot.get().await.unwrap();

    let frames = snapshot::build(slot_binding.as_ref(), &state.presence, "g1", "c1", 100)
        .await
        .unwrap();
    assert_eq!(frames.len(), 1);
    let frame = serde_json::to_value(&frames[0]).unwrap();
    assert_eq!(frame["payload"], "message");
    assert_eq!(frame["content"], "still here");
}

#[tokio::test]
async fn edits_and_deletes_reach_only_the_channel() {
    let binding = MockBinding::new(vec![], vec![]);
    let state = relay_state(binding).await;
    events::attach(state.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c1".into(), tx);

    state.events.publish(UpstreamEvent::MessageEdited {
        channel_id: "c1".into(),
        message_id: "8".into(),
        partial: false,
        new_content: "edited".into(),
        edited_at: Some(Utc.timestamp_opt(800, 0).unwrap()),
        attachments: vec![],
        embeds: vec![],
    });
    let edit = recv(&mut rx).await;
    assert_eq!(edit["payload"], "message_edit");
    assert_eq!(edit["new_content"], "edited");
    assert_eq!(edit["hasEmbed"], false);

    state.events.publish(UpstreamEvent::MessageDeleted {
        channel_id: "c1".into(),
        message_id: "8".into(),
    });
    let delete = recv(&mut rx).await;
    assert_eq!(delete["payload"], "message_delete");
    assert_eq!(delete["message_id"], "8");

    state.events.publish(UpstreamEvent::ReactionsCleared {
        channel_id: "c1".into(),
        message_id: "8".into(),
    });
    let clear = recv(&mut rx).await;
    assert_eq!(clear["payload"], "reaction_clear");
}

#[tokio::test]
async fn partial_edits_are_skipped() {
    let binding = MockBinding::new(vec![], vec![]);
    let state = relay_state(binding).await;
    events::attach(state.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .add(Uuid::new_v4(), "g1".into(), "c1".into(), tx);

    state.events.publish(UpstreamEvent::MessageEdited {
        channel_id: "c1".into(),
        message_id: "9".into(),
        partial: true,
        new_content: String::new(),
        edited_at: None,
        attachments: vec![],
        embeds: vec![],
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn custom_status_appears_in_the_roster() {
    let activities = vec![ActivityInfo {
        kind: ActivityKind::Custom,
        name: "Custom Status".into(),
        state: Some("do not perceive me".into()),
    }];
    let roster = vec![member("10", PresenceStatus::Dnd, activities)];
    let binding = MockBinding::new(roster, vec![]);
    let state = relay_state(binding).await;
    let slot_binding = state.slot.get().await.unwrap();

    let entries = state
        .presence
        .get_or_build("g1", slot_binding.as_ref())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let value = serde_json::to_value(&entries[0]).unwrap();
    assert_eq!(value["user"]["status"], "dnd");
    assert_eq!(value["user"]["statusText"], "do not perceive me");
}
