mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use dork_core::frame::{Frame, FrameType};
use dork_core::types::current_timestamp;
use dork_server::server::build_router;
use dork_server::service::JoinQueueOutcome;
use dork_test::TestClient;

use common::{test_app, wait_until};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(ctx: std::sync::Arc<dork_server::context::ApplicationContext>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(ctx)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("ws connect");
    ws
}

async fn send(ws: &mut Ws, frame: &Frame) {
    let text = serde_json::to_string(frame).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn recv_type(ws: &mut Ws, frame_type: FrameType) -> Frame {
    timeout(Duration::from_secs(5), async {
        loop {
            let message = ws
                .next()
                .await
                .unwrap_or_else(|| panic!("socket closed waiting for {frame_type:?}"))
                .unwrap();
            if let Message::Text(text) = message {
                if let Ok(frame) = serde_json::from_str::<Frame>(text.as_str()) {
                    if frame.frame_type == frame_type {
                        return frame;
                    }
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {frame_type:?}"))
}

async fn pair_via_service(
    app: &common::TestApp,
    a: &TestClient,
    b: &TestClient,
) -> (String, String, String) {
    let queued = app.ctx.join_queue(&a.addr(), "tictactoe", "0").await.unwrap();
    assert!(matches!(queued, JoinQueueOutcome::Queued { .. }));
    let matched = app.ctx.join_queue(&b.addr(), "tictactoe", "0").await.unwrap();
    let (match_id, token_b) = match matched {
        JoinQueueOutcome::Matched {
            match_id, ws_token, ..
        } => (match_id, ws_token),
        other => panic!("expected match, got {other:?}"),
    };
    let token_a = match app.ctx.join_queue(&a.addr(), "tictactoe", "0").await.unwrap() {
        JoinQueueOutcome::Matched { ws_token, .. } => ws_token,
        other => panic!("expected pending match, got {other:?}"),
    };
    (match_id, token_a, token_b)
}

#[tokio::test]
async fn test_full_session_lifecycle_with_reconnect() {
    let app = test_app();
    let addr = spawn_server(app.ctx.clone()).await;
    let a = TestClient::from_seed(31);
    let b = TestClient::from_seed(32);
    let (match_id, token_a, token_b) = pair_via_service(&app, &a, &b).await;
    let game_path = format!("/ws/game/{match_id}");

    // First attach with single-use tokens.
    let mut ws_a = connect(addr, &game_path).await;
    send(&mut ws_a, &a.hello_with_token(&match_id, &token_a)).await;
    let state_a = recv_type(&mut ws_a, FrameType::GameState).await;
    assert_eq!(state_a.payload["yourTurn"], json!(true));
    recv_type(&mut ws_a, FrameType::ChatHistory).await;

    let mut ws_b = connect(addr, &game_path).await;
    send(&mut ws_b, &b.hello_with_token(&match_id, &token_b)).await;
    let state_b = recv_type(&mut ws_b, FrameType::GameState).await;
    assert_eq!(state_b.payload["yourTurn"], json!(false));

    // A spectator watches through the read-only path.
    let mut ws_watch = connect(addr, &format!("/ws/spectate/{match_id}")).await;
    send(
        &mut ws_watch,
        &Frame::new(FrameType::SpectateJoin, &match_id, json!({})),
    )
    .await;
    recv_type(&mut ws_watch, FrameType::SpectateState).await;

    // One move flows to both players and the spectator.
    let mut commit = Frame::new(FrameType::ActionCommit, &match_id, json!({"action": {"cell": 0}}));
    commit.timestamp = current_timestamp();
    send(&mut ws_a, &commit).await;
    let step_a = recv_type(&mut ws_a, FrameType::StepResult).await;
    assert_eq!(step_a.sequence, 0);
    let step_b = recv_type(&mut ws_b, FrameType::StepResult).await;
    assert_eq!(step_b.payload["currentPlayer"], json!(b.addr()));
    recv_type(&mut ws_watch, FrameType::SpectateState).await;

    // B vanishes and reattaches with a signed HELLO.
    drop(ws_b);
    let mut ws_b = connect(addr, &game_path).await;
    send(&mut ws_b, &b.hello_signed(&match_id, current_timestamp())).await;
    recv_type(&mut ws_b, FrameType::GameState).await;

    // The server view wins on sync: it is B's turn even though the
    // client believes otherwise.
    send(
        &mut ws_b,
        &Frame::new(
            FrameType::SyncRequest,
            &match_id,
            json!({"clientIsMyTurn": false}),
        ),
    )
    .await;
    let sync = recv_type(&mut ws_b, FrameType::SyncResponse).await;
    assert_eq!(sync.payload["yourTurn"], json!(true));
    assert_eq!(sync.payload["divergent"], json!(true));
    assert_eq!(sync.payload["sequence"], json!(1));
    recv_type(&mut ws_b, FrameType::GameState).await;

    // Reconnection appended nothing.
    assert_eq!(app.ctx.storage.load_moves(&match_id).await.unwrap().len(), 1);

    // Spectators are read-only.
    send(
        &mut ws_watch,
        &Frame::new(FrameType::Chat, &match_id, json!({"message": "hi"})),
    )
    .await;
    let err = recv_type(&mut ws_watch, FrameType::Error).await;
    assert_eq!(err.payload["code"], "transport_read_only");

    // B forfeits over the wire; everyone sees GAME_OVER.
    send(&mut ws_b, &Frame::new(FrameType::Forfeit, &match_id, json!({}))).await;
    let over_a = recv_type(&mut ws_a, FrameType::GameOver).await;
    assert_eq!(over_a.payload["outcome"]["winner"], json!(a.addr()));
    assert_eq!(over_a.payload["outcome"]["reason"], "forfeit");
    recv_type(&mut ws_b, FrameType::GameOver).await;
    recv_type(&mut ws_watch, FrameType::GameOver).await;

    wait_until(|| async {
        app.ctx.check_active_match(&a.addr()).await.unwrap().is_none()
    })
    .await;
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = test_app();
    let addr = spawn_server(app.ctx.clone()).await;
    let a = TestClient::from_seed(33);
    let b = TestClient::from_seed(34);
    let (match_id, token_a, _) = pair_via_service(&app, &a, &b).await;

    let mut ws = connect(addr, &format!("/ws/game/{match_id}")).await;
    send(&mut ws, &a.hello_with_token(&match_id, "not-a-token")).await;
    let err = recv_type(&mut ws, FrameType::Error).await;
    assert_eq!(err.payload["code"], "transport_invalid_token");

    // A consumed token does not authorize a second attach.
    let mut ws = connect(addr, &format!("/ws/game/{match_id}")).await;
    send(&mut ws, &a.hello_with_token(&match_id, &token_a)).await;
    recv_type(&mut ws, FrameType::GameState).await;

    let mut ws_again = connect(addr, &format!("/ws/game/{match_id}")).await;
    send(&mut ws_again, &a.hello_with_token(&match_id, &token_a)).await;
    let err = recv_type(&mut ws_again, FrameType::Error).await;
    assert_eq!(err.payload["code"], "transport_invalid_token");
}

#[tokio::test]
async fn test_outsider_signed_hello_is_rejected() {
    let app = test_app();
    let addr = spawn_server(app.ctx.clone()).await;
    let a = TestClient::from_seed(35);
    let b = TestClient::from_seed(36);
    let (match_id, _, _) = pair_via_service(&app, &a, &b).await;

    let outsider = TestClient::from_seed(37);
    let mut ws = connect(addr, &format!("/ws/game/{match_id}")).await;
    send(&mut ws, &outsider.hello_signed(&match_id, current_timestamp())).await;
    let err = recv_type(&mut ws, FrameType::Error).await;
    assert_eq!(err.payload["code"], "match_not_a_player");
}

#[tokio::test]
async fn test_http_surface() {
    let app = test_app();
    let addr = spawn_server(app.ctx.clone()).await;
    let client = reqwest_like_get(addr, "/health/check").await;
    assert_eq!(client["ok"], json!(true));
    assert_eq!(client["emergency"], json!(false));

    let games = reqwest_like_get(addr, "/api/games").await;
    assert_eq!(games["games"][0]["gameId"], "tictactoe");
}

/// Tiny GET helper over the raw socket; avoids pulling an HTTP client
/// into the dev-dependencies.
async fn reqwest_like_get(addr: SocketAddr, path: &str) -> serde_json::Value {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let text = String::from_utf8_lossy(&response);
    let body = text.split("\r\n\r\n").nth(1).expect("http body");
    // Tolerate chunked transfer encoding by scraping the JSON object.
    let start = body.find('{').expect("json start");
    let end = body.rfind('}').expect("json end");
    serde_json::from_str(&body[start..=end]).expect("json body")
}
