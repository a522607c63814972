//! Relay and peers talking over real WebSocket connections on localhost

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use clipbridge::{
    clipboard::{ClipboardEntry, Metadata, MemoryClipboard},
    shutdown::Shutdown,
    sync::{DetectorConfig, PeerSession, Relay, SyncTiming},
    transport::websocket::{self, channel_url, WebSocketConfig},
    transport::{ConnectionState, TransportError, WsListener},
    Error,
};

fn fast_timing() -> SyncTiming {
    SyncTiming {
        detector: DetectorConfig {
            poll_interval: Duration::from_millis(20),
            error_backoff: Duration::from_millis(100),
        },
        keepalive_interval: Duration::from_millis(200),
        pong_timeout: Duration::from_millis(300),
        shutdown_grace: Duration::from_millis(300),
    }
}

struct RunningRelay {
    relay: Arc<Relay>,
    clipboard: Arc<MemoryClipboard>,
    url: String,
    shutdown: Shutdown,
    task: JoinHandle<clipbridge::Result<()>>,
}

async fn start_relay() -> RunningRelay {
    let listener = WsListener::bind("127.0.0.1:0", WebSocketConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let clipboard = Arc::new(MemoryClipboard::new());
    let relay = Arc::new(Relay::new(clipboard.clone(), fast_timing()));
    let shutdown = Shutdown::new();

    let task = tokio::spawn(relay.clone().serve(listener, shutdown.clone()));

    RunningRelay {
        relay,
        clipboard,
        url: channel_url("127.0.0.1", addr.port(), "/ws"),
        shutdown,
        task,
    }
}

struct RunningPeer {
    session: Arc<PeerSession>,
    clipboard: Arc<MemoryClipboard>,
    shutdown: Shutdown,
    task: JoinHandle<clipbridge::Result<()>>,
}

async fn start_peer(relay: &RunningRelay) -> RunningPeer {
    let clipboard = Arc::new(MemoryClipboard::new());
    let session = Arc::new(PeerSession::new(clipboard.clone(), fast_timing(), 10));
    let shutdown = Shutdown::new();

    let before = relay.relay.registry().len().await;
    let task = {
        let session = session.clone();
        let url = relay.url.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            session
                .run(&url, &WebSocketConfig::default(), &shutdown)
                .await
        })
    };

    for _ in 0..200 {
        if session.is_connected() && relay.relay.registry().len().await > before {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.is_connected(), "peer did not connect");
    // Let the peer's detector take its initial reading.
    tokio::time::sleep(Duration::from_millis(60)).await;

    RunningPeer {
        session,
        clipboard,
        shutdown,
        task,
    }
}

async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn current(clipboard: &MemoryClipboard) -> Option<ClipboardEntry> {
    clipboard.current()
}

#[tokio::test]
async fn test_peer_copy_reaches_relay() {
    let relay = start_relay().await;
    let peer = start_peer(&relay).await;

    peer.clipboard
        .set(Some(ClipboardEntry::text("Hello from Windows 👋")));

    eventually("relay clipboard to update", || {
        current(&relay.clipboard) == Some(ClipboardEntry::text("Hello from Windows 👋"))
    })
    .await;

    peer.shutdown.trigger();
    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_relay_copy_reaches_every_peer() {
    let relay = start_relay().await;
    let first = start_peer(&relay).await;
    let second = start_peer(&relay).await;

    relay
        .clipboard
        .set(Some(ClipboardEntry::text("Hello from the Mac 你好")));

    let expected = Some(ClipboardEntry::text("Hello from the Mac 你好"));
    eventually("first peer to update", || current(&first.clipboard) == expected).await;
    eventually("second peer to update", || current(&second.clipboard) == expected).await;

    // Nothing bounces back to the relay.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(relay.clipboard.writes().is_empty());

    first.shutdown.trigger();
    second.shutdown.trigger();
    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_peer_to_peer_through_relay() {
    let relay = start_relay().await;
    let first = start_peer(&relay).await;
    let second = start_peer(&relay).await;

    let mut metadata = Metadata::new();
    metadata.insert("format".into(), json!("PNG"));
    metadata.insert("size".into(), json!([1, 1]));
    let image = ClipboardEntry::image(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3], metadata);
    first.clipboard.set(Some(image.clone()));

    eventually("second peer to receive the image", || {
        current(&second.clipboard) == Some(image.clone())
    })
    .await;
    assert_eq!(current(&relay.clipboard), Some(image.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(first.clipboard.writes().is_empty());
    assert_eq!(second.clipboard.writes().len(), 1);

    first.shutdown.trigger();
    second.shutdown.trigger();
    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_disconnect_is_cleaned_up() {
    let relay = start_relay().await;
    let peer = start_peer(&relay).await;
    assert_eq!(relay.relay.registry().len().await, 1);

    peer.shutdown.trigger();
    let result = timeout(Duration::from_secs(2), peer.task).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(!peer.session.is_connected());

    for _ in 0..100 {
        if relay.relay.registry().is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(relay.relay.registry().is_empty().await);

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_relay_shutdown_closes_peers() {
    let relay = start_relay().await;
    let peer = start_peer(&relay).await;

    relay.shutdown.trigger();
    timeout(Duration::from_secs(2), relay.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let result = timeout(Duration::from_secs(2), peer.task).await.unwrap().unwrap();
    assert!(result.is_ok() || result.as_ref().is_err_and(|e| e.is_disconnect()));
    assert!(!peer.session.is_connected());
}

#[tokio::test]
async fn test_updates_made_offline_are_sent_after_reconnect() {
    let relay = start_relay().await;
    let peer = start_peer(&relay).await;

    peer.shutdown.trigger();
    timeout(Duration::from_secs(2), peer.task).await.unwrap().unwrap().unwrap();

    assert!(!peer.session.send_clipboard_update("queued while offline").await);
    assert_eq!(peer.session.pending().len(), 1);

    let shutdown = Shutdown::new();
    let task = {
        let session = peer.session.clone();
        let url = relay.url.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { session.run(&url, &WebSocketConfig::default(), &shutdown).await })
    };

    eventually("relay to apply the queued update", || {
        current(&relay.clipboard) == Some(ClipboardEntry::text("queued while offline"))
    })
    .await;
    assert!(peer.session.pending().is_empty());

    shutdown.trigger();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap().unwrap();
    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_wrong_path_is_refused() {
    let relay = start_relay().await;
    let addr = relay.url.trim_start_matches("ws://").trim_end_matches("/ws").to_string();

    let result = websocket::connect(&format!("ws://{}/other", addr), &WebSocketConfig::default()).await;

    assert!(result.is_err());
    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_connect_to_missing_relay_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let session = Arc::new(PeerSession::new(
        Arc::new(MemoryClipboard::new()),
        fast_timing(),
        10,
    ));
    let result = session
        .run(
            &channel_url("127.0.0.1", port, "/ws"),
            &WebSocketConfig::default(),
            &Shutdown::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_silent_relay_is_detected() {
    // Accepts the handshake, then stops reading so pings are never answered.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let silent = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(ws_stream);
    });

    let session = Arc::new(PeerSession::new(
        Arc::new(MemoryClipboard::new()),
        fast_timing(),
        10,
    ));
    let task = {
        let session = session.clone();
        let url = channel_url("127.0.0.1", port, "/ws");
        tokio::spawn(async move {
            session
                .run(&url, &WebSocketConfig::default(), &Shutdown::new())
                .await
        })
    };

    let result = timeout(Duration::from_secs(5), task)
        .await
        .expect("peer should notice the silent relay")
        .unwrap();
    assert!(matches!(result, Err(Error::Transport(TransportError::Timeout))));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.is_connected());

    // Updates made afterwards wait for the next connection.
    assert!(!session.send_clipboard_update("after the relay went quiet").await);
    assert_eq!(session.pending().len(), 1);

    silent.abort();
}
