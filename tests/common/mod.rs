#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use colabri_sheet::build_app;
use colabri_sheet::config::{Config, SyncSettings};
use colabri_sheet::db::{DragItemRow, MemoryStore};
use colabri_sheet::state::AppState;
use colabri_sheet::ws::spawn_lock_sweeper;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "integration-secret";
pub const LOCK_TTL: Duration = Duration::from_millis(300);
pub const DRAG_ITEM: i64 = 42;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

pub fn test_state() -> Arc<AppState> {
    test_state_with(|_| {})
}

/// Test state with sync settings adjusted by `tune`.
pub fn test_state_with(tune: impl FnOnce(&mut SyncSettings)) -> Arc<AppState> {
    let store = MemoryStore::new();
    store.insert_user(1, "alice").unwrap();
    store.insert_user(2, "bob").unwrap();
    store.insert_user(3, "carol").unwrap();
    store
        .insert_drag_item(DragItemRow { id: DRAG_ITEM, content: "Physics".into(), creator_id: 1 })
        .unwrap();

    let config = Config { auth_jwt_secret: Some(SECRET.to_string()), ..Config::default() };
    let mut settings = SyncSettings {
        lock_ttl: LOCK_TTL,
        lock_sweep_interval: Duration::from_millis(100),
        ..config.sync_settings()
    };
    tune(&mut settings);
    Arc::new(AppState::with_settings(config, settings, Arc::new(store)))
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(|_| {}).await
}

pub async fn spawn_server_with(tune: impl FnOnce(&mut SyncSettings)) -> TestServer {
    let state = test_state_with(tune);
    spawn_lock_sweeper(state.hub.locks.clone(), state.settings.lock_sweep_interval);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer { addr, state }
}

pub fn token_for(user_id: i64) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub async fn try_connect(addr: SocketAddr, sheet_id: i64, token: Option<&str>) -> Result<Client, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/ws/sheets/{sheet_id}").into_client_request()?;
    if let Some(token) = token {
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    }
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

pub async fn connect(addr: SocketAddr, sheet_id: i64, user_id: i64) -> Client {
    try_connect(addr, sheet_id, Some(&token_for(user_id))).await.unwrap()
}

pub async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

pub async fn send_raw(ws: &mut Client, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

/// Next JSON frame from the server, skipping control frames.
pub async fn recv(ws: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let frame = ws.next().await.expect("stream ended").expect("read failed");
            if frame.is_text() {
                return serde_json::from_str(frame.to_text().unwrap()).unwrap();
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Asserts that no text frame arrives within `wait`.
pub async fn expect_silence(ws: &mut Client, wait: Duration) {
    let outcome = tokio::time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(frame)) if frame.is_text() => return frame,
                Some(Ok(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    if let Ok(frame) = outcome {
        panic!("unexpected frame: {frame:?}");
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(check: impl FnMut() -> bool) -> bool {
    eventually_within(Duration::from_secs(1), check).await
}

pub async fn eventually_within(wait: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Waits until `sessions` sessions have joined the sheet's room.
pub async fn wait_for_room(server: &TestServer, sheet_id: i64, sessions: usize) {
    let hub = server.state.hub.clone();
    assert!(
        eventually(|| hub.rooms.room_size(sheet_id) == sessions).await,
        "room {sheet_id} never reached {sessions} session(s)"
    );
}

/// Asserts that the upgrade is refused with the given HTTP status.
pub fn assert_refused(outcome: Result<Client, tokio_tungstenite::tungstenite::Error>, status: u16) {
    match outcome {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => assert_eq!(response.status(), status),
        Err(e) => panic!("expected HTTP {status}, got {e}"),
        Ok(_) => panic!("expected HTTP {status}, but the upgrade succeeded"),
    }
}
