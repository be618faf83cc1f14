//! End-to-end tests over real loopback WebSocket channels

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brick_core::{Envelope, Sender};
use brick_gateway::{Gateway, GatewayConfig, RouterSettings};
use brick_responder::KeywordResponder;
use brick_session::MemoryStorage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn config(liveness_interval: Duration, max_connections: usize) -> GatewayConfig {
    GatewayConfig {
        bind: "127.0.0.1:0".to_string(),
        path: "/ws".to_string(),
        max_connections,
        liveness_interval,
        router: RouterSettings {
            reply_delay_min: Duration::from_millis(10),
            reply_delay_max: Duration::from_millis(30),
            ..RouterSettings::default()
        },
    }
}

async fn start(config: GatewayConfig) -> (Gateway, SocketAddr) {
    let gateway = Gateway::new(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(KeywordResponder::new()),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = gateway.clone();
    tokio::spawn(async move { server.serve(listener).await });
    (gateway, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, envelope: Envelope) {
    ws.send(Message::Text(envelope.encode().unwrap()))
        .await
        .unwrap();
}

/// Next envelope, skipping transport-level ping/pong frames
async fn recv(ws: &mut Client) -> Option<Envelope> {
    let deadline = Duration::from_secs(5);
    loop {
        let frame = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for frame");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(Envelope::decode(&text).unwrap()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(other)) => panic!("unexpected frame {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_join_then_chat_round_trip() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 10)).await;
    let mut ws = connect(addr).await;

    send(&mut ws, Envelope::join("u1")).await;
    assert_eq!(recv(&mut ws).await, Some(Envelope::history(vec![])));

    send(
        &mut ws,
        Envelope::chat("What is the market trend?", Some("u1".into()), None),
    )
    .await;

    let echo = match recv(&mut ws).await {
        Some(Envelope::Message(m)) => m,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(echo.sender, Sender::User);
    assert_eq!(echo.message, "What is the market trend?");

    let reply = match recv(&mut ws).await {
        Some(Envelope::Message(m)) => m,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(reply.sender, Sender::Ai);
    assert!(reply.created_at >= echo.created_at);

    assert_eq!(gateway.stats().joined_users, 1);
    gateway.shutdown();
}

#[tokio::test]
async fn test_rejoin_receives_persisted_history() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 10)).await;

    let mut first = connect(addr).await;
    send(&mut first, Envelope::join("u7")).await;
    recv(&mut first).await;
    send(&mut first, Envelope::chat("hello", Some("u7".into()), None)).await;
    recv(&mut first).await;
    recv(&mut first).await;
    first.close(None).await.unwrap();

    let mut second = connect(addr).await;
    send(&mut second, Envelope::join("u7")).await;
    match recv(&mut second).await {
        Some(Envelope::History(history)) => {
            assert_eq!(history.messages.len(), 2);
            assert_eq!(history.messages[0].message, "hello");
        }
        other => panic!("unexpected {:?}", other),
    }
    gateway.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_keeps_channel_open() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 10)).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    assert!(matches!(recv(&mut ws).await, Some(Envelope::Error(_))));

    send(&mut ws, Envelope::Ping).await;
    assert_eq!(recv(&mut ws).await, Some(Envelope::Pong));
    gateway.shutdown();
}

#[tokio::test]
async fn test_wrong_path_is_refused() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 10)).await;
    let result = connect_async(format!("ws://{}/other", addr)).await;
    assert!(result.is_err());
    gateway.shutdown();
}

#[tokio::test]
async fn test_capacity_rejection_sends_error_then_closes() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 1)).await;

    let mut first = connect(addr).await;
    send(&mut first, Envelope::join("u1")).await;
    recv(&mut first).await;

    let mut second = connect(addr).await;
    match recv(&mut second).await {
        Some(Envelope::Error(e)) => assert!(e.message.contains("capacity")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(recv(&mut second).await, None);
    gateway.shutdown();
}

#[tokio::test]
async fn test_simultaneous_connects_respect_capacity() {
    let (gateway, addr) = start(config(Duration::from_secs(60), 1)).await;

    let (mut a, mut b) = tokio::join!(connect(addr), connect(addr));
    // The refused side may already be closing, so its join can fail.
    let _ = a.send(Message::Text(Envelope::join("a").encode().unwrap())).await;
    let _ = b.send(Message::Text(Envelope::join("b").encode().unwrap())).await;

    let (first_a, first_b) = tokio::join!(recv(&mut a), recv(&mut b));
    let histories = [&first_a, &first_b]
        .iter()
        .filter(|e| matches!(e, Some(Envelope::History(_))))
        .count();
    let refusals = [&first_a, &first_b]
        .iter()
        .filter(|e| matches!(e, Some(Envelope::Error(err)) if err.message.contains("capacity")))
        .count();
    assert_eq!((histories, refusals), (1, 1));
    assert_eq!(gateway.stats().active_connections, 1);
    gateway.shutdown();
}

#[tokio::test]
async fn test_responsive_client_survives_sweeps() {
    let (gateway, addr) = start(config(Duration::from_millis(50), 10)).await;
    let mut ws = connect(addr).await;
    send(&mut ws, Envelope::join("u1")).await;
    recv(&mut ws).await;

    // Reading lets tungstenite answer each probe with a pong.
    let polling = tokio::time::timeout(Duration::from_millis(300), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    assert!(polling.is_err());

    send(&mut ws, Envelope::Ping).await;
    assert_eq!(recv(&mut ws).await, Some(Envelope::Pong));
    assert_eq!(gateway.stats().active_connections, 1);
    gateway.shutdown();
}

#[tokio::test]
async fn test_silent_client_is_evicted() {
    let (gateway, addr) = start(config(Duration::from_millis(50), 10)).await;
    let mut ws = connect(addr).await;
    send(&mut ws, Envelope::join("u1")).await;

    // Never read, so probes go unanswered.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(gateway.stats().active_connections, 0);
    assert_eq!(gateway.stats().joined_users, 0);
    gateway.shutdown();
}
