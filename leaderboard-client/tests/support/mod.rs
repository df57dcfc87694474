#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use leaderboard_client::protocol::encode_event;
use leaderboard_client::{CHANNEL_PLAYER_COUNT, CHANNEL_SIMULATE};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const PLAYER_TOTAL: usize = 250;
const PING_INTERVAL_MS: u64 = 250;
const PING_TIMEOUT_MS: u64 = 250;

/// In-process fake of the leaderboard backend: REST routes plus a
/// Socket.IO websocket endpoint that fans out server events.
pub struct TestServer {
    base_url: String,
    backend: Arc<Backend>,
    handle: JoinHandle<()>,
}

struct Backend {
    events: broadcast::Sender<String>,
    reset_succeeds: AtomicBool,
    simulate_status: AtomicUsize,
    sockets: AtomicUsize,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let (events, _) = broadcast::channel(64);
        let backend = Arc::new(Backend {
            events,
            reset_succeeds: AtomicBool::new(true),
            simulate_status: AtomicUsize::new(200),
            sockets: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/api/players", get(players))
            .route("/api/players/reset", get(reset))
            .route("/api/players/simulate", get(simulate))
            .route("/api/players/calculate-prize-pool", get(prize_pool))
            .route("/socket.io/", get(socket))
            .with_state(Arc::clone(&backend));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server");
        });

        Self {
            base_url: format!("http://{}", addr),
            backend,
            handle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pushes an event to every connected socket.
    pub fn emit(&self, name: &str, data: Value) {
        let _ = self.backend.events.send(encode_event(name, &data));
    }

    pub fn fail_resets(&self) {
        self.backend.reset_succeeds.store(false, Ordering::SeqCst);
    }

    pub fn fail_simulations(&self) {
        self.backend.simulate_status.store(500, Ordering::SeqCst);
    }

    pub fn socket_count(&self) -> usize {
        self.backend.sockets.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn username(index: usize) -> String {
    format!("player{:03}", index)
}

fn money(index: usize) -> f64 {
    10_000.0 - index as f64 * 10.0
}

fn players_info(range: std::ops::Range<usize>) -> Value {
    let info: serde_json::Map<String, Value> = range
        .map(|index| {
            let country = if index % 2 == 0 { "US" } else { "DE" };
            (
                username(index),
                json!({ "country": country, "dailydiff": index as f64 - 5.0 }),
            )
        })
        .collect();
    Value::Object(info)
}

fn page_range(params: &HashMap<String, String>) -> std::ops::Range<usize> {
    let top = params
        .get("top")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(100);
    let offset = params
        .get("offset")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let start = offset.min(PLAYER_TOTAL);
    let end = (offset + top).min(PLAYER_TOTAL);
    start..end
}

async fn players(
    State(backend): State<Arc<Backend>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let range = page_range(&params);
    let mut flattened = Vec::new();
    for index in range.clone() {
        flattened.push(json!(username(index)));
        // Redis replies carry scores as strings.
        flattened.push(json!(money(index).to_string()));
    }
    let _ = backend
        .events
        .send(encode_event(CHANNEL_PLAYER_COUNT, &json!(PLAYER_TOTAL)));
    Json(json!({
        "players": flattened,
        "playersInfo": players_info(range),
        "fromRedis": true
    }))
}

async fn reset(State(backend): State<Arc<Backend>>) -> Json<Value> {
    Json(json!({ "success": backend.reset_succeeds.load(Ordering::SeqCst) }))
}

async fn simulate(State(backend): State<Arc<Backend>>) -> Response {
    let status = backend.simulate_status.load(Ordering::SeqCst) as u16;
    if status != 200 {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, "simulation unavailable").into_response();
    }

    let events = backend.events.clone();
    tokio::spawn(async move {
        for day in 1..=7u8 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let tick = json!({
                "day": day,
                "players": [username(0), money(0)],
                "playersInfo": players_info(0..1)
            });
            let _ = events.send(encode_event(CHANNEL_SIMULATE, &tick));
        }
    });
    Json(json!({ "message": "simulation started" })).into_response()
}

async fn prize_pool(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let ratio = params
        .get("ratio")
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(2.0);
    let players: Vec<Value> = (0..100)
        .map(|index| json!({ "username": username(index), "money": money(index) * ratio }))
        .collect();
    Json(json!({
        "players": players,
        "playersInfo": players_info(0..100)
    }))
}

async fn socket(ws: WebSocketUpgrade, State(backend): State<Arc<Backend>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, backend))
}

async fn serve_socket(mut socket: WebSocket, backend: Arc<Backend>) {
    let open = json!({
        "sid": "engine-test",
        "upgrades": [],
        "pingInterval": PING_INTERVAL_MS,
        "pingTimeout": PING_TIMEOUT_MS,
        "maxPayload": 1_000_000
    });
    if socket
        .send(Message::Text(format!("0{}", open)))
        .await
        .is_err()
    {
        return;
    }

    match socket.recv().await {
        Some(Ok(Message::Text(text))) if text == "40" => {}
        _ => return,
    }

    let mut events = backend.events.subscribe();
    if socket
        .send(Message::Text(r#"40{"sid":"socket-test"}"#.to_string()))
        .await
        .is_err()
    {
        return;
    }
    backend.sockets.fetch_add(1, Ordering::SeqCst);

    let mut ping = tokio::time::interval(Duration::from_millis(PING_INTERVAL_MS));
    ping.tick().await;
    loop {
        tokio::select! {
            _ = ping.tick() => {
                if socket.send(Message::Text("2".to_string())).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                let frame = match event {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text == "3" => {}
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    backend.sockets.fetch_sub(1, Ordering::SeqCst);
}
