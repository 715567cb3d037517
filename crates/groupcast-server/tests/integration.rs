//! End-to-end integration tests using a real WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use groupcast_server::GroupcastServer;
use groupcast_settings::GroupcastSettings;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server on an ephemeral port.
async fn boot_server() -> (SocketAddr, GroupcastServer) {
    let mut settings = GroupcastSettings::default();
    settings.server.port = 0;
    settings.server.shutdown_timeout_secs = 5;
    let server = GroupcastServer::new(settings);
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}/ws")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Next JSON text frame, skipping control frames.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn greeting_then_echo() {
    let (addr, _server) = boot_server().await;
    let mut ws = connect(addr).await;

    assert_eq!(next_json(&mut ws).await, json!({"message": "hello bibek"}));

    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_json(&mut ws).await, json!({"message": "You said: ping"}));

    ws.send(Message::text("second")).await.unwrap();
    assert_eq!(next_json(&mut ws).await, json!({"message": "You said: second"}));
}

#[tokio::test]
async fn trigger_reaches_every_member() {
    let (addr, server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = next_json(&mut a).await;
    let _ = next_json(&mut b).await;
    wait_for(|| server.hub().members_of("demo").len() == 2).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/add"))
        .body(r#"{"data": 42}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"result": 42}));

    assert_eq!(next_json(&mut a).await, json!({"added": 42}));
    assert_eq!(next_json(&mut b).await, json!({"added": 42}));
}

#[tokio::test]
async fn trigger_rejects_bad_requests() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/add");

    let resp = client.post(&url).body("not json").send().await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "Invalid JSON"})
    );

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "POST request required"})
    );
}

#[tokio::test]
async fn disconnect_removes_membership() {
    let (addr, server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = next_json(&mut a).await;
    let _ = next_json(&mut b).await;
    wait_for(|| server.hub().members_of("demo").len() == 2).await;

    a.close(None).await.unwrap();
    wait_for(|| server.hub().connection_count() == 1).await;
    assert_eq!(server.hub().members_of("demo").len(), 1);

    drop(b);
    wait_for(|| server.hub().connection_count() == 0).await;
    assert_eq!(server.hub().group_count(), 0);
}

#[tokio::test]
async fn health_reports_connections_and_groups() {
    let (addr, server) = boot_server().await;
    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;
    wait_for(|| server.hub().connection_count() == 1).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["groups"], 1);
}

#[tokio::test]
async fn home_page() {
    let (addr, _server) = boot_server().await;
    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Home page");
}

#[tokio::test]
async fn graceful_shutdown_closes_clients() {
    let (addr, server) = boot_server().await;
    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;
    wait_for(|| server.hub().connection_count() == 1).await;

    let shutdown = tokio::spawn(async move {
        let clean = server.shutdown_gracefully().await;
        (clean, server)
    });

    let close = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("read failed: {e}"),
                None => panic!("stream ended without close frame"),
            }
        }
    })
    .await
    .expect("no close frame");
    assert_eq!(close.map(|f| u16::from(f.code)), Some(1000));

    let (clean, server) = shutdown.await.unwrap();
    assert!(clean);
    assert_eq!(server.hub().connection_count(), 0);
}
