//! One attached transport: HELLO handshake, a single reader and a
//! single writer per session, room fan-in, sync reads.
//!
//! Sessions never mutate match state directly; player input is turned
//! into event-bus frames and the authoritative answers come back
//! through the room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use dork_api::engine::SPECTATOR;
use dork_core::chain::match_id_bytes32;
use dork_core::credentials::verify_player_auth;
use dork_core::error::{Error, Result};
use dork_core::frame::{
    ChatPayload, DepositRequiredPayload, ErrorPayload, Frame, FrameType, HelloPayload,
    SyncRequestPayload, SyncResponsePayload,
};
use dork_core::types::{current_timestamp, MatchStatus};

use crate::context::ApplicationContext;
use crate::frame::{Audience, RoomEvent};
use crate::room::SessionRole;
use crate::view::SharedMatchView;

const HELLO_GRACE: Duration = Duration::from_secs(10);
const CHAT_HISTORY_LIMIT: u32 = 50;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

async fn send_frame(sink: &mut WsSink, frame: &Frame) {
    if let Ok(text) = serde_json::to_string(frame) {
        let _ = sink.send(Message::Text(text.into())).await;
    }
}

async fn send_error(sink: &mut WsSink, match_id: &str, error: &Error) {
    let frame = Frame::new(
        FrameType::Error,
        match_id,
        json!(ErrorPayload::from_error(error)),
    );
    send_frame(sink, &frame).await;
}

/// Read frames until one parses; `None` on close.
async fn next_frame(stream: &mut WsStream) -> Option<Frame> {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(text.as_str()) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    debug!("Discarding unparseable frame: {e}");
                }
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// HELLO authentication: a single-use token on first attach, a signed
/// proof on reattach.  A signed HELLO is accepted any time.
async fn authenticate_hello(
    ctx: &ApplicationContext,
    match_id: &str,
    payload: HelloPayload,
) -> Result<String> {
    let now = current_timestamp();
    if let Some(token) = payload.token {
        let stored = ctx
            .coord
            .take_ws_token(&token)
            .await?
            .ok_or(Error::InvalidToken)?;
        if stored.match_id != match_id || stored.is_expired(now) {
            return Err(Error::InvalidToken);
        }
        if let Some(claimed) = payload.player_id {
            if dork_core::credentials::canonicalize_address(&claimed)? != stored.player {
                return Err(Error::InvalidToken);
            }
        }
        return Ok(stored.player);
    }
    match (payload.player_id, payload.signature, payload.timestamp) {
        (Some(player_id), Some(signature), Some(timestamp)) => {
            verify_player_auth(&player_id, &signature, timestamp, now)
        }
        _ => Err(Error::AuthMissingSignature),
    }
}

fn stamp(view: &SharedMatchView, mut frame: Frame) -> Frame {
    if let Ok(view) = view.read() {
        frame = frame.with_transcript(view.sequence, &view.root_hash);
    }
    frame
}

fn should_deliver(
    event: &RoomEvent,
    role: SessionRole,
    player: Option<&str>,
    session_id: u64,
) -> bool {
    if event.except == Some(session_id) {
        return false;
    }
    match (&event.audience, role) {
        (Audience::All, _) => true,
        (Audience::Players, SessionRole::Player) => true,
        (Audience::Players, SessionRole::Spectator) => false,
        (Audience::Spectators, SessionRole::Spectator) => true,
        (Audience::Spectators, SessionRole::Player) => false,
        (Audience::Player(target), SessionRole::Player) => player == Some(target.as_str()),
        (Audience::Player(_), SessionRole::Spectator) => false,
    }
}

async fn send_attach_frames(
    ctx: &ApplicationContext,
    sink: &mut WsSink,
    match_id: &str,
    view: &SharedMatchView,
    module: &Arc<dyn dork_api::engine::GameModule>,
    viewer: &str,
    role: SessionRole,
) {
    let (payload, staked_waiting, stake) = match view.read() {
        Ok(view) => (
            view.game_state_payload(module.as_ref(), viewer),
            view.record.is_staked() && view.record.status == MatchStatus::Waiting,
            view.record.stake.clone(),
        ),
        Err(_) => return,
    };
    let frame_type = match role {
        SessionRole::Player => FrameType::GameState,
        SessionRole::Spectator => FrameType::SpectateState,
    };
    let frame = stamp(view, Frame::new(frame_type, match_id, json!(payload)));
    send_frame(sink, &frame).await;

    match ctx.storage.load_chat(match_id, CHAT_HISTORY_LIMIT).await {
        Ok(messages) => {
            let frame = stamp(
                view,
                Frame::new(FrameType::ChatHistory, match_id, json!({ "messages": messages })),
            );
            send_frame(sink, &frame).await;
        }
        Err(e) => warn!("Failed to load chat history for {match_id}: {e}"),
    }

    if staked_waiting && role == SessionRole::Player {
        let payload = DepositRequiredPayload {
            escrow_address: ctx.config.escrow_address.clone().unwrap_or_default(),
            stake_wei: stake,
            match_id_bytes32: format!("{}", match_id_bytes32(match_id)),
        };
        let frame = stamp(view, Frame::new(FrameType::DepositRequired, match_id, json!(payload)));
        send_frame(sink, &frame).await;
    }
}

async fn handle_sync_request(
    sink: &mut WsSink,
    match_id: &str,
    view: &SharedMatchView,
    module: &Arc<dyn dork_api::engine::GameModule>,
    viewer: &str,
    payload: SyncRequestPayload,
) {
    let Ok(snapshot) = view.read().map(|v| v.clone()) else {
        return;
    };
    let your_turn = snapshot.current_player.as_deref() == Some(viewer);
    let divergent = payload.client_is_my_turn != your_turn;
    let response = SyncResponsePayload {
        your_turn,
        status: snapshot.record.status.to_string(),
        current_player: snapshot.current_player.clone(),
        sequence: snapshot.sequence,
        divergent,
    };
    let frame = stamp(view, Frame::new(FrameType::SyncResponse, match_id, json!(response)));
    send_frame(sink, &frame).await;

    // The server's view wins: a divergent client gets the full state.
    if divergent {
        let payload = snapshot.game_state_payload(module.as_ref(), viewer);
        let frame = stamp(view, Frame::new(FrameType::GameState, match_id, json!(payload)));
        send_frame(sink, &frame).await;
    }
}

pub async fn run_game_session(socket: WebSocket, ctx: Arc<ApplicationContext>, match_id: String) {
    run_session(socket, ctx, match_id, SessionRole::Player).await;
}

pub async fn run_spectator_session(
    socket: WebSocket,
    ctx: Arc<ApplicationContext>,
    match_id: String,
) {
    run_session(socket, ctx, match_id, SessionRole::Spectator).await;
}

async fn run_session(
    socket: WebSocket,
    ctx: Arc<ApplicationContext>,
    match_id: String,
    role: SessionRole,
) {
    let (mut sink, mut stream) = socket.split();

    let Some((view, module)) = ctx.match_manager.session_anchor(&match_id).await else {
        send_error(&mut sink, &match_id, &Error::MatchNotFound).await;
        let _ = sink.close().await;
        return;
    };

    // HELLO within the grace window or the socket closes.
    let hello = match timeout(HELLO_GRACE, next_frame(&mut stream)).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(_) => {
            send_error(&mut sink, &match_id, &Error::HelloTimeout).await;
            let _ = sink.close().await;
            return;
        }
    };

    let player = match role {
        SessionRole::Player => {
            if hello.frame_type != FrameType::Hello {
                send_error(&mut sink, &match_id, &Error::AuthMissingSignature).await;
                let _ = sink.close().await;
                return;
            }
            let payload: HelloPayload =
                serde_json::from_value(hello.payload).unwrap_or_default();
            match authenticate_hello(&ctx, &match_id, payload).await {
                Ok(player) => {
                    let is_member = view
                        .read()
                        .map(|v| v.record.has_player(&player))
                        .unwrap_or(false);
                    if !is_member {
                        send_error(&mut sink, &match_id, &Error::PlayerNotInMatch).await;
                        let _ = sink.close().await;
                        return;
                    }
                    Some(player)
                }
                Err(e) => {
                    send_error(&mut sink, &match_id, &e).await;
                    let _ = sink.close().await;
                    return;
                }
            }
        }
        // Spectators open with HELLO or SPECTATE_JOIN, unauthenticated.
        SessionRole::Spectator => match hello.frame_type {
            FrameType::Hello | FrameType::SpectateJoin => None,
            _ => {
                send_error(&mut sink, &match_id, &Error::SpectatorReadOnly).await;
                let _ = sink.close().await;
                return;
            }
        },
    };

    let Some(mut room_rx) = ctx.room_manager.join(&match_id, role) else {
        send_error(&mut sink, &match_id, &Error::MatchNotFound).await;
        let _ = sink.close().await;
        return;
    };
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let viewer = player.clone().unwrap_or_else(|| SPECTATOR.to_owned());
    info!("Session {session_id} attached to {match_id} as {viewer}");

    send_attach_frames(&ctx, &mut sink, &match_id, &view, &module, &viewer, role).await;

    loop {
        tokio::select! {
            inbound = next_frame(&mut stream) => {
                let Some(frame) = inbound else {
                    break;
                };
                match role {
                    SessionRole::Player => {
                        let player = viewer.as_str();
                        match frame.frame_type {
                            FrameType::ActionCommit | FrameType::ActionReveal => {
                                let action = frame
                                    .payload
                                    .get("action")
                                    .cloned()
                                    .unwrap_or(frame.payload.clone());
                                if let Err(e) =
                                    ctx.apply_action(&match_id, player, action).await
                                {
                                    send_error(&mut sink, &match_id, &e).await;
                                }
                            }
                            FrameType::Forfeit => {
                                if let Err(e) = ctx.forfeit(&match_id, player).await {
                                    send_error(&mut sink, &match_id, &e).await;
                                }
                            }
                            FrameType::Chat => {
                                let payload: Option<ChatPayload> =
                                    serde_json::from_value(frame.payload).ok();
                                match payload {
                                    Some(chat) => {
                                        if let Err(e) =
                                            ctx.chat(&match_id, player, &chat.message).await
                                        {
                                            send_error(&mut sink, &match_id, &e).await;
                                        }
                                    }
                                    None => {
                                        send_error(
                                            &mut sink,
                                            &match_id,
                                            &Error::InvalidRequest("bad chat payload".into()),
                                        )
                                        .await;
                                    }
                                }
                            }
                            FrameType::SyncRequest => {
                                let payload: SyncRequestPayload =
                                    serde_json::from_value(frame.payload).unwrap_or(
                                        SyncRequestPayload {
                                            client_is_my_turn: false,
                                        },
                                    );
                                handle_sync_request(
                                    &mut sink, &match_id, &view, &module, player, payload,
                                )
                                .await;
                            }
                            FrameType::Hello => {
                                // Already attached; ignore.
                            }
                            _ => {
                                send_error(
                                    &mut sink,
                                    &match_id,
                                    &Error::InvalidRequest("unexpected frame".into()),
                                )
                                .await;
                            }
                        }
                    }
                    SessionRole::Spectator => match frame.frame_type {
                        FrameType::SpectateJoin | FrameType::Hello => {}
                        FrameType::SyncRequest => {
                            handle_sync_request(
                                &mut sink,
                                &match_id,
                                &view,
                                &module,
                                SPECTATOR,
                                SyncRequestPayload {
                                    client_is_my_turn: false,
                                },
                            )
                            .await;
                        }
                        _ => {
                            send_error(&mut sink, &match_id, &Error::SpectatorReadOnly).await;
                        }
                    },
                }
            }
            event = room_rx.recv() => {
                match event {
                    Ok(event) => {
                        if should_deliver(&event, role, player.as_deref(), session_id) {
                            send_frame(&mut sink, &event.frame).await;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Session {session_id} lagged, skipped {skipped} events");
                        // Resync on the next SYNC_REQUEST; the view wins.
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        // Match unloaded; the session ends with it.
                        break;
                    }
                }
            }
        }
    }

    ctx.room_manager.leave(&match_id, role);
    let _ = sink.close().await;
    info!("Session {session_id} detached from {match_id}");
}
