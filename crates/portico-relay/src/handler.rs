use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use portico_models::payload::SubscribeRequest;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{snapshot, RelayState};

/// One subscriber connection. Inbound frames are subscribe requests;
/// everything outbound is either a snapshot (written here) or a delta
/// (pushed through the registry channel by the event loop).
pub(crate) async fn handle_connection(socket: WebSocket, state: RelayState) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();

    // The registry gets a fresh channel per subscribe so deltas buffered for
    // a previous target never flush into the new one. The spare sender keeps
    // `rx` open before the first subscribe arrives.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut _keepalive = tx;
    debug!(%conn_id, "subscriber connected");

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<SubscribeRequest>(text.as_str()) else {
                        warn!(%conn_id, "unparseable subscribe frame, ignoring");
                        continue;
                    };
                    let Some((guild_id, channel_id)) = request.target() else {
                        continue;
                    };

                    let (tx, fresh_rx) = mpsc::unbounded_channel();
                    rx = fresh_rx;
                    state.registry.add(
                        conn_id,
                        guild_id.to_string(),
                        channel_id.to_string(),
                        tx.clone(),
                    );
                    _keepalive = tx;
                    debug!(%conn_id, guild_id, channel_id, "subscribed");

                    // Deltas for the new target queue in `rx` while the
                    // snapshot goes out, so the client sees snapshot first.
                    if send_snapshot(&mut sink, &state, guild_id, channel_id)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%conn_id, "socket error: {e}");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Some(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    state.registry.remove(&conn_id);
    debug!(%conn_id, "subscriber disconnected");
}

/// Writes the snapshot frames straight to the socket. Upstream failures
/// degrade to fewer frames; only a dead socket is an error.
async fn send_snapshot(
    sink: &mut SplitSink<WebSocket, Message>,
    state: &RelayState,
    guild_id: &str,
    channel_id: &str,
) -> Result<(), axum::Error> {
    let Some(binding) = state.slot.get().await else {
        warn!(guild_id, channel_id, "subscribe before upstream is bound, no snapshot");
        return Ok(());
    };

    let frames = match snapshot::build(
        binding.as_ref(),
        &state.presence,
        guild_id,
        channel_id,
        state.config.history_limit,
    )
    .await
    {
        Ok(frames) => frames,
        Err(e) => {
            warn!(guild_id, channel_id, "failed to build snapshot: {e}");
            return Ok(());
        }
    };

    for frame in frames {
        match serde_json::to_string(&frame) {
            Ok(text) => sink.send(Message::Text(text.into())).await?,
            Err(e) => error!("failed to serialize snapshot frame: {e}"),
        }
    }
    Ok(())
}
