//! Shared helpers for the integration tests: an in-process server backed
//! by the memory store, token minting, and a thin WebSocket client.

#![allow(dead_code)]

use cortexflow_sync::{
    config::Config,
    db::MemoryStore,
    routes::create_app,
    services::auth_service::Claims,
    ws::UserCtx,
    AppState,
};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "integration-secret";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: Some(SECRET.to_string()),
        user_cache_ttl_secs: 0,
        outbound_queue_capacity: 64,
        ..Config::default()
    }
}

pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol"), ("root", "Root")] {
        store
            .seed_user(UserCtx {
                id: id.to_string(),
                name: name.to_string(),
                email: format!("{id}@example.com"),
            })
            .unwrap();
    }
    store
}

pub fn test_state() -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = seeded_store();
    let state = Arc::new(AppState::with_store(test_config(), store.clone()));
    (state, store)
}

/// Start the full application on an ephemeral port
pub async fn start_server() -> TestServer {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> TestServer {
    let store = seeded_store();
    let state = Arc::new(AppState::with_store(config, store.clone()));
    serve(state, store).await
}

/// Serve an already wired state; `store` is the backing memory store
pub async fn serve(state: Arc<AppState>, store: Arc<MemoryStore>) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer { addr, state, store }
}

pub fn token(sub: &str, roles: &[&str]) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 600) as usize,
        roles: roles.iter().map(|r| r.to_string()).collect(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub async fn connect_raw(addr: SocketAddr, token: Option<&str>) -> Client {
    let url = match token {
        Some(t) => format!("ws://{addr}/ws?token={t}"),
        None => format!("ws://{addr}/ws"),
    };
    let (ws, _) = connect_async(url).await.expect("WebSocket upgrade should succeed");
    ws
}

/// Connect as `user` and wait until the server has registered the connection
pub async fn connect(server: &TestServer, user: &str) -> Client {
    let mut ws = connect_raw(server.addr, Some(&token(user, &[]))).await;
    barrier(&mut ws).await;
    ws
}

pub async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next JSON frame, or None if nothing arrives within `wait`
pub async fn recv_within(ws: &mut Client, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, ws.next()).await {
            Err(_) => return None,
            Ok(None) => return None,
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("server frames are JSON"))
            }
            Ok(Some(Ok(Message::Close(_)))) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => panic!("WebSocket error: {e}"),
        }
    }
}

pub async fn recv(ws: &mut Client) -> Value {
    recv_within(ws, Duration::from_secs(2))
        .await
        .expect("expected a frame from the server")
}

/// Send a ping and wait for the pong. Frames are processed in order, so
/// everything sent before the ping has been handled when this returns.
pub async fn barrier(ws: &mut Client) {
    send(ws, serde_json::json!({"type": "ping"})).await;
    let frame = recv(ws).await;
    assert_eq!(frame["type"], "pong", "unexpected frame before pong: {frame}");
}

pub async fn expect_silence(ws: &mut Client) {
    if let Some(frame) = recv_within(ws, Duration::from_millis(150)).await {
        panic!("expected no frame, got {frame}");
    }
}

/// Poll until `check` holds or a second passes
pub async fn eventually(check: impl FnMut() -> bool) -> bool {
    eventually_within(Duration::from_secs(1), check).await
}

pub async fn eventually_within(wait: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
