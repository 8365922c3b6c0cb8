//! Integration tests for the ackwire server and client over real sockets.

use std::time::Duration;

use ackwire::prelude::*;
use ackwire_transport::tls;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const TEXT_TYPE: &str = "ackwire.message.TextMessage";
const ACK_TYPE: &str = "ackwire.message.AckTextMessage";
const DISCONNECT_TYPE: &str = "ackwire.message.DisconnectMessage";

/// Starts a plain server on a random port and returns its address.
async fn start_server() -> String {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .expect("should connect");
    ws
}

fn text_envelope(text: &str) -> WsMessage {
    WsMessage::Text(json!({ "type": TEXT_TYPE, "text": text }).to_string().into())
}

/// Next frame from the server, failing the test after one second.
async fn next(ws: &mut ClientWs) -> Option<WsMessage> {
    tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("server should answer in time")
        .map(|msg| msg.expect("frame should be readable"))
}

fn as_json(msg: WsMessage) -> Value {
    match msg {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).expect("valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

fn port_of(addr: &str) -> u16 {
    addr.rsplit(':').next().unwrap().parse().unwrap()
}

// =========================================================================
// Server scenarios
// =========================================================================

#[tokio::test]
async fn test_text_message_is_acknowledged() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(text_envelope("hello")).await.unwrap();

    let ack = as_json(next(&mut ws).await.expect("an ack"));
    assert_eq!(ack, json!({ "type": ACK_TYPE, "text": "hello", "accepted": true }));
}

#[tokio::test]
async fn test_acks_follow_message_order() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    for text in ["one", "two", "three"] {
        ws.send(text_envelope(text)).await.unwrap();
    }
    for text in ["one", "two", "three"] {
        let ack = as_json(next(&mut ws).await.unwrap());
        assert_eq!(ack["text"], text);
    }
}

#[tokio::test]
async fn test_disconnect_closes_without_reply() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(WsMessage::Text(json!({ "type": DISCONNECT_TYPE }).to_string().into()))
        .await
        .unwrap();

    // No message comes back, only the close handshake and a clean end.
    match next(&mut ws).await {
        Some(WsMessage::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected a close frame, got {other:?}"),
    }
    assert!(next(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_ping_gets_exactly_one_pong() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(WsMessage::Ping(vec![8, 1, 8, 1].into())).await.unwrap();
    ws.send(text_envelope("marker")).await.unwrap();

    let pong = next(&mut ws).await.unwrap();
    assert_eq!(pong, WsMessage::Pong(vec![8, 1, 8, 1].into()));

    // Next is the ack for the marker, not a second pong.
    let ack = as_json(next(&mut ws).await.unwrap());
    assert_eq!(ack["text"], "marker");
}

#[tokio::test]
async fn test_undecodable_text_is_dropped_and_connection_stays_open() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(WsMessage::Text("not-json".into())).await.unwrap();
    ws.send(WsMessage::Text(r#"{"type":"ackwire.message.Unknown"}"#.into()))
        .await
        .unwrap();
    ws.send(WsMessage::Text(r#"{"text":"no discriminator"}"#.into()))
        .await
        .unwrap();
    ws.send(text_envelope("still here")).await.unwrap();

    let ack = as_json(next(&mut ws).await.unwrap());
    assert_eq!(ack["type"], ACK_TYPE);
    assert_eq!(ack["text"], "still here");
}

#[tokio::test]
async fn test_binary_frame_gets_no_response() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(WsMessage::Binary(vec![0xde, 0xad].into())).await.unwrap();
    ws.send(text_envelope("after binary")).await.unwrap();

    let ack = as_json(next(&mut ws).await.unwrap());
    assert_eq!(ack["text"], "after binary");
}

#[tokio::test]
async fn test_close_frame_closes_the_connection() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let registry = server.registry();
    tokio::spawn(server.run());

    let mut ws = connect(&addr).await;
    ws.send(text_envelope("warm up")).await.unwrap();
    next(&mut ws).await.unwrap();
    assert_eq!(registry.len().await, 1);

    ws.send(WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .await
    .unwrap();

    match next(&mut ws).await {
        Some(WsMessage::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected the close reply, got {other:?}"),
    }
    // The server finished the handshake, so the stream ends without a reset.
    assert!(next(&mut ws).await.is_none());

    // The connection task removes itself from the registry when it ends.
    tokio::time::timeout(Duration::from_secs(1), async {
        while !registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection should be unregistered");
}

#[tokio::test]
async fn test_silent_peer_is_dropped_after_handshake_timeout() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .handshake_timeout(Duration::from_millis(200))
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let registry = server.registry();
    tokio::spawn(server.run());

    // Opens TCP but never sends an upgrade request.
    let mut socket = tokio::net::TcpStream::connect(&addr).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection should be registered");

    tokio::time::timeout(Duration::from_secs(2), async {
        while !registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("silent connection should be dropped");

    // The server hung up on us.
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(1), socket.read(&mut buf))
        .await
        .expect("socket should be closed");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_wrong_path_gets_404() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .path("/chat")
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .expect_err("wrong path must be refused");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        other => panic!("expected HTTP 404, got {other:?}"),
    }

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/chat"))
        .await
        .expect("configured path should upgrade");
    ws.send(text_envelope("hi")).await.unwrap();
    assert_eq!(as_json(next(&mut ws).await.unwrap())["text"], "hi");
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let running = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));

    let mut ws = connect(&addr).await;
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();

    // Open connections are torn down with the server.
    let ended = tokio::time::timeout(Duration::from_secs(1), ws.next()).await;
    assert!(matches!(ended, Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(WsMessage::Close(_))))));
}

// =========================================================================
// Client
// =========================================================================

#[tokio::test]
async fn test_client_receives_ack() {
    let addr = start_server().await;

    let mut client = AckwireClient::builder()
        .endpoint(Scheme::Ws, "127.0.0.1", port_of(&addr))
        .connect()
        .await
        .expect("handshake should complete");
    assert!(client.is_open());

    client.send(&Message::text("hello")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(1), client.next_message())
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(Message::AckText(AckTextMessage {
            text: "hello".into(),
            accepted: true,
        }))
    );

    client.finish().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_client_session_disconnects() {
    let addr = start_server().await;

    let client = AckwireClient::builder()
        .endpoint(Scheme::Ws, "127.0.0.1", port_of(&addr))
        .connect()
        .await
        .unwrap();

    let end = client
        .session()
        .run(&b"hello\nping\ndeconnection\n"[..])
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::Disconnected);
    assert!(!client.is_open());

    // Sending after the close fails cleanly instead of panicking.
    let err = client.send(&Message::text("late")).await.unwrap_err();
    assert!(err.is_connection_fatal());
}

#[tokio::test]
async fn test_client_wrong_path_fails_handshake() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .path("/chat")
        .build()
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(server.run());

    let err = AckwireClient::builder()
        .endpoint(Scheme::Ws, "127.0.0.1", port)
        .path("/")
        .connect()
        .await
        .err()
        .expect("handshake must fail");
    assert!(matches!(err, AckwireError::Handshake(_)));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_client_times_out_on_silent_server() {
    // Accepts TCP but never answers the upgrade request.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await;
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        AckwireClient::builder()
            .endpoint(Scheme::Ws, "127.0.0.1", port)
            .handshake_timeout(Duration::from_millis(200))
            .connect(),
    )
    .await;
    assert!(result.is_ok(), "connect must not hang past its timeout");
    assert!(matches!(result.unwrap(), Err(AckwireError::Handshake(_))));
}

#[tokio::test]
async fn test_client_wss_requires_trust() {
    let err = AckwireClient::builder()
        .endpoint(Scheme::Wss, "localhost", 1)
        .connect()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AckwireError::Argument(_)));
}

#[tokio::test]
async fn test_wss_end_to_end_with_self_signed_certificate() {
    let server = AckwireServer::builder()
        .bind("127.0.0.1:0")
        .tls(ServerTls::SelfSigned { export: None })
        .build()
        .await
        .expect("self-signed server should build");
    let port = server.local_addr().unwrap().port();
    let pem = server.self_signed_pem().expect("generated certificate").to_string();
    assert_eq!(server.scheme(), Scheme::Wss);
    tokio::spawn(server.run());

    let connector = tls::connector_from_pem(pem.as_bytes()).unwrap();
    let mut client = AckwireClient::builder()
        .endpoint(Scheme::Wss, "localhost", port)
        .tls(ClientTls::Connector(connector))
        .connect()
        .await
        .expect("wss handshake should complete");
    assert!(client.connection().is_secure());

    client.send(&Message::text("over tls")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), client.next_message())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.kind(), MessageKind::AckText);
}
