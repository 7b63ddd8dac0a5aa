//! WebSocket subscriber server over real sockets

use crate::support::{pipeline_config, Answer, FakeSource};
use futures_util::{SinkExt, StreamExt};
use jlp_relay::data::MemoryStore;
use jlp_relay::pipeline::{LifecycleState, Pipeline, ServerMessage};
use jlp_relay::ws::{ServerOptions, SubscriberServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error, Message};

const ALLOWED: &str = "http://localhost:5173";

struct Running {
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn start() -> Running {
    let mut config = pipeline_config();
    config.poll_interval = Duration::from_millis(50);
    config.flush_interval = Duration::from_millis(200);

    let pipeline = Arc::new(Pipeline::new(
        config,
        FakeSource::new(Answer::JlpOnly),
        Arc::new(MemoryStore::new()),
    ));

    let options = ServerOptions::new(SocketAddr::from(([127, 0, 0, 1], 0))).allow_origin(ALLOWED);
    let server = SubscriberServer::bind(options, pipeline.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .run(async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });

    Running {
        addr,
        pipeline,
        stop,
        handle,
    }
}

fn request(addr: SocketAddr, origin: Option<&'static str>) -> Request {
    let mut request = format!("ws://{}/", addr).into_client_request().unwrap();
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert(ORIGIN, HeaderValue::from_static(origin));
    }
    request
}

async fn wait_for_idle(pipeline: &Pipeline) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.state().await != LifecycleState::Idle {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline did not stop");
}

#[tokio::test]
async fn test_allowed_origin_receives_updates() {
    let running = start().await;

    let (mut ws, _) = connect_async(request(running.addr, Some(ALLOWED)))
        .await
        .unwrap();

    let text = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no update received");

    let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(raw["type"], "PRICE_UPDATE");

    let ServerMessage::PriceUpdate(payload) = serde_json::from_str(&text).unwrap();
    assert_eq!(payload.len(), 1);
    assert_eq!(payload[0].symbol, "JLP");
    assert_eq!(running.pipeline.subscriber_count().await, 1);

    ws.close(None).await.unwrap();
    wait_for_idle(&running.pipeline).await;
    assert_eq!(running.pipeline.subscriber_count().await, 0);

    let stats = running.pipeline.stats().await;
    assert_eq!(stats.samples_written, stats.samples_produced);

    running.stop.send(()).unwrap();
    running.handle.await.unwrap();
}

#[tokio::test]
async fn test_inbound_text_is_ignored() {
    let running = start().await;

    let (mut ws, _) = connect_async(request(running.addr, Some(ALLOWED)))
        .await
        .unwrap();
    ws.send(Message::Text("hello".to_string())).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no message received");
    assert!(matches!(next, Some(Ok(_))));
    assert_eq!(running.pipeline.state().await, LifecycleState::Running);

    drop(ws);
    wait_for_idle(&running.pipeline).await;

    running.stop.send(()).unwrap();
    running.handle.await.unwrap();
}

#[tokio::test]
async fn test_unknown_origin_rejected() {
    let running = start().await;

    let err = connect_async(request(running.addr, Some("https://evil.example")))
        .await
        .unwrap_err();
    match err {
        Error::Http(response) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(running.pipeline.subscriber_count().await, 0);
    assert_eq!(running.pipeline.state().await, LifecycleState::Idle);

    running.stop.send(()).unwrap();
    running.handle.await.unwrap();
}

#[tokio::test]
async fn test_missing_origin_rejected() {
    let running = start().await;

    let err = connect_async(request(running.addr, None)).await.unwrap_err();
    assert!(matches!(err, Error::Http(ref response) if response.status() == StatusCode::FORBIDDEN));

    running.stop.send(()).unwrap();
    running.handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let running = start().await;

    let (mut ws, _) = connect_async(request(running.addr, Some(ALLOWED)))
        .await
        .unwrap();

    running.stop.send(()).unwrap();
    running.handle.await.unwrap();
    running.pipeline.shutdown().await;
    assert_eq!(running.pipeline.state().await, LifecycleState::Idle);

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    assert!(ended.is_ok());
}
