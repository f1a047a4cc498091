// Push stream tests against a local WebSocket server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;

use deconz_api::{ChangeScope, EventStream, StreamConfig, StreamEvent};

// ── Helpers ─────────────────────────────────────────────────────────

async fn bind() -> (TcpListener, url::Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}").parse().unwrap();
    (listener, url)
}

async fn next(rx: &mut broadcast::Receiver<Arc<StreamEvent>>) -> StreamEvent {
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream event")
        .unwrap();
    (*event).clone()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_are_normalized() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let frames = [
            json!({"t": "event", "e": "changed", "r": "groups", "id": "65520", "state": {"all_on": false}}),
            json!({"t": "event", "e": "deleted", "r": "sensors", "id": "7"}),
        ];
        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }
        ws.send(Message::Text("{broken".into())).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let mut config = StreamConfig::new(url.clone());
    config.retry_time = Duration::ZERO;
    let stream = EventStream::new(config);
    let mut rx = stream.subscribe();
    stream.listen().await;

    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Listening {
            url: url.to_string()
        }
    );
    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Changed {
            rtype: "groups".into(),
            id: "0".into(),
            scope: ChangeScope::State,
            body: json!({"all_on": false}),
        }
    );
    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Deleted {
            rtype: "sensors".into(),
            id: "7".into(),
        }
    );
    assert!(matches!(next(&mut rx).await, StreamEvent::Error { .. }));
    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Closed {
            url: url.to_string(),
            retry_in: Duration::ZERO,
        }
    );

    stream.close().await;
}

#[tokio::test]
async fn test_reconnects_after_retry_time() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        for _ in 0..2 {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
        }
    });

    let mut config = StreamConfig::new(url.clone());
    config.retry_time = Duration::from_millis(20);
    let stream = EventStream::new(config);
    let mut rx = stream.subscribe();
    stream.listen().await;

    assert!(matches!(next(&mut rx).await, StreamEvent::Listening { .. }));
    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Closed {
            url: url.to_string(),
            retry_in: Duration::from_millis(20),
        }
    );
    assert!(matches!(next(&mut rx).await, StreamEvent::Listening { .. }));

    stream.close().await;
}

#[tokio::test]
async fn test_close_sends_close_frame_and_stops() {
    let (listener, url) = bind().await;
    let (saw_close_tx, saw_close_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                let _ = saw_close_tx.send(());
                return;
            }
        }
    });

    let stream = EventStream::new(StreamConfig::new(url.clone()));
    let mut rx = stream.subscribe();
    stream.listen().await;
    assert!(matches!(next(&mut rx).await, StreamEvent::Listening { .. }));

    stream.close().await;

    tokio::time::timeout(Duration::from_secs(5), saw_close_rx)
        .await
        .expect("server never saw a close frame")
        .unwrap();

    // A deliberate close never schedules a reconnect.
    assert_eq!(
        next(&mut rx).await,
        StreamEvent::Closed {
            url: url.to_string(),
            retry_in: Duration::ZERO,
        }
    );
}
