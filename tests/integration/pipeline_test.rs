//! Pipeline behaviour under virtual time

use crate::support::{pipeline_config, Answer, FakeSource};
use jlp_relay::data::MemoryStore;
use jlp_relay::feed::UpstreamError;
use jlp_relay::pipeline::{ChannelSink, LifecycleState, Pipeline, ServerMessage};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn pipeline(answer: Answer) -> (Pipeline, Arc<FakeSource>, Arc<MemoryStore>) {
    let source = FakeSource::new(answer);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    (pipeline, source, store)
}

#[tokio::test(start_paused = true)]
async fn test_every_produced_sample_written_once() {
    let (pipeline, _, store) = pipeline(Answer::Both);
    let (sink, _rx) = ChannelSink::new(1024);

    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_millis(23_500)).await;
    pipeline.disconnect(id).await;

    let stats = pipeline.stats().await;
    let written = store.samples().await;
    assert!(stats.samples_produced >= 40);
    assert_eq!(written.len() as u64, stats.samples_produced);
    assert_eq!(stats.samples_written, stats.samples_produced);

    // JLP prices encode the fetch number, so duplicates would collide
    let jlp: Vec<Decimal> = written
        .iter()
        .filter(|s| s.symbol == "JLP")
        .map(|s| s.price)
        .collect();
    let unique: HashSet<_> = jlp.iter().collect();
    assert_eq!(unique.len(), jlp.len());
    assert!(pipeline.buffer().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_drops_batch_and_recovers() {
    let (pipeline, _, store) = pipeline(Answer::Both);
    let (sink, _rx) = ChannelSink::new(1024);

    store.set_available(false);
    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let dropped = pipeline.stats().await.samples_dropped;
    assert!(dropped > 0);
    assert!(store.samples().await.is_empty());

    store.set_available(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    pipeline.disconnect(id).await;

    let stats = pipeline.stats().await;
    assert_eq!(stats.samples_dropped, dropped);
    assert_eq!(stats.samples_written + stats.samples_dropped, stats.samples_produced);
    assert_eq!(store.samples().await.len() as u64, stats.samples_written);
}

#[tokio::test(start_paused = true)]
async fn test_jlp_only_update_reaches_subscriber() {
    let (pipeline, _, store) = pipeline(Answer::JlpOnly);
    let (sink, mut rx) = ChannelSink::new(16);

    let id = pipeline.connect(Arc::new(sink)).await;
    let message = rx.recv().await.unwrap();
    let ServerMessage::PriceUpdate(payload) = serde_json::from_str(&message).unwrap();

    assert_eq!(payload.len(), 1);
    assert_eq!(payload[0].symbol, "JLP");
    assert_eq!(payload[0].source_key, "27G8MtK7VtTcCHkpASjSDdkWWYfoqT6ggEuKidVJidD4");

    pipeline.disconnect(id).await;
    let written = store.samples().await;
    assert!(written.iter().all(|s| s.symbol == "JLP"));
    assert_eq!(pipeline.cache().get("SOL").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_skipped_without_sol() {
    let (pipeline, _, store) = pipeline(Answer::JlpOnly);
    let (sink, _rx) = ChannelSink::new(1024);

    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    pipeline.disconnect(id).await;

    assert!(store.snapshots().await.is_empty());
    // One timer tick plus the final flush
    assert_eq!(pipeline.stats().await.snapshots_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_written_each_minute() {
    let (pipeline, _, store) = pipeline(Answer::Both);
    let (sink, _rx) = ChannelSink::new(1024);

    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_secs(121)).await;
    pipeline.disconnect(id).await;

    let snapshots = store.snapshots().await;
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0].values["SOL"], Decimal::new(14250, 2));
    assert!(snapshots.iter().all(|s| s.values.len() == 2));
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_subscriber_presence() {
    let (pipeline, source, _) = pipeline(Answer::Both);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), 0);

    let (a, _rx_a) = ChannelSink::new(1024);
    let (b, _rx_b) = ChannelSink::new(1024);
    let first = pipeline.connect(Arc::new(a)).await;
    let second = pipeline.connect(Arc::new(b)).await;
    assert_eq!(pipeline.state().await, LifecycleState::Running);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    pipeline.disconnect(first).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pipeline.state().await, LifecycleState::Running);

    pipeline.disconnect(second).await;
    assert_eq!(pipeline.state().await, LifecycleState::Idle);
    let calls = source.calls();
    assert!(calls >= 4);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_upstream_publishes_nothing() {
    let (pipeline, source, store) = pipeline(Answer::Fail(UpstreamError::RateLimited));
    let (sink, mut rx) = ChannelSink::new(16);

    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_millis(62_500)).await;

    assert_eq!(source.calls(), 5);
    assert!(rx.try_recv().is_err());
    assert_eq!(pipeline.stats().await.cycles_failed, 1);

    pipeline.disconnect(id).await;
    assert!(store.samples().await.is_empty());
    assert_eq!(store.sample_writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_backoff_and_flushes() {
    let (pipeline, source, _) = pipeline(Answer::Fail(UpstreamError::Unavailable(
        "connection reset".to_string(),
    )));
    let (sink, _rx) = ChannelSink::new(16);

    pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    pipeline.shutdown().await;
    assert_eq!(pipeline.state().await, LifecycleState::Idle);
    assert_eq!(pipeline.subscriber_count().await, 1);

    let calls = source.calls();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(source.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_disconnect_keeps_final_flush() {
    let source = FakeSource::slow(Answer::Both, Duration::from_secs(3));
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(Pipeline::new(pipeline_config(), source, store.clone()));
    let (sink, _rx) = ChannelSink::new(16);

    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(pipeline.buffer().len().await, 2);
    assert!(store.samples().await.is_empty());

    // Second fetch is still in flight when the disconnect is abandoned
    let disconnecting = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.disconnect(id).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    disconnecting.abort();
    let _ = disconnecting.await;

    pipeline.shutdown().await;

    let stats = pipeline.stats().await;
    assert_eq!(pipeline.state().await, LifecycleState::Idle);
    assert!(pipeline.buffer().is_empty().await);
    assert!(stats.samples_written >= 2);
    assert_eq!(store.samples().await.len() as u64, stats.samples_produced);
}
