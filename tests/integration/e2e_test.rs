//! End-to-end: Jupiter HTTP mock through the pipeline into Parquet files

use jlp_relay::config::Config;
use jlp_relay::data::{ParquetReader, ParquetStore, SAMPLES_PREFIX, SNAPSHOTS_PREFIX};
use jlp_relay::feed::{JupiterClient, JupiterConfig};
use jlp_relay::pipeline::{ChannelSink, LifecycleState, Pipeline, ServerMessage};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JLP: &str = "27G8MtK7VtTcCHkpASjSDdkWWYfoqT6ggEuKidVJidD4";
const SOL: &str = "So11111111111111111111111111111111111111112";
const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

async fn upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price/v2"))
        .and(query_param("ids", format!("{},{},{}", JLP, SOL, USDC)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                JLP: {"id": JLP, "type": "derivedPrice", "price": "4.2318"},
                SOL: {"id": SOL, "type": "derivedPrice", "price": "142.5"},
                USDC: null
            },
            "timeTaken": 0.002
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_config_example_runs_end_to_end() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();

    let mut config = Config::parse(jlp_relay::config::EXAMPLE_CONFIG).unwrap();
    config.upstream.base_url = format!("{}/price/v2", server.uri());
    config.poller.interval_ms = 50;
    config.persistence.flush_interval_ms = 200;
    config.persistence.output_dir = dir.path().to_path_buf();
    config.validate().unwrap();

    let source = Arc::new(JupiterClient::with_config(config.upstream.client_config()).unwrap());
    let store = Arc::new(ParquetStore::new(config.persistence.output_dir.clone()));
    let pipeline = Pipeline::new(config.pipeline(), source, store.clone());

    let (sink, mut rx) = ChannelSink::new(64);
    let id = pipeline.connect(Arc::new(sink)).await;

    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no update received")
        .unwrap();
    let ServerMessage::PriceUpdate(payload) = serde_json::from_str(&message).unwrap();
    let symbols: Vec<_> = payload.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["JLP", "SOL"]);
    assert_eq!(payload[0].price, dec!(4.2318));

    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.disconnect(id).await;
    assert_eq!(pipeline.state().await, LifecycleState::Idle);

    // The example config persists JLP only
    let stats = pipeline.stats().await;
    assert!(stats.samples_written > 0);
    assert_eq!(stats.samples_written, stats.samples_buffered);

    let mut read_back = Vec::new();
    for file in store.files(SAMPLES_PREFIX).unwrap() {
        read_back.extend(ParquetReader::new(file).read_samples().unwrap());
    }
    assert_eq!(read_back.len() as u64, stats.samples_written);
    assert!(read_back.iter().all(|s| s.symbol == "JLP" && s.price == dec!(4.2318)));
    assert!(read_back.iter().all(|s| s.source_key == JLP));

    // Final snapshot on stop has both JLP and SOL cached
    assert_eq!(store.files(SNAPSHOTS_PREFIX).unwrap().len(), 1);
}

#[tokio::test]
async fn test_upstream_error_status_skips_cycles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.poller.interval_ms = 50;

    let source = Arc::new(
        JupiterClient::with_config(JupiterConfig {
            base_url: format!("{}/price/v2", server.uri()),
            timeout: Duration::from_secs(1),
        })
        .unwrap(),
    );
    let store = Arc::new(ParquetStore::new(dir.path().to_path_buf()));
    let pipeline = Pipeline::new(config.pipeline(), source, store.clone());

    let (sink, mut rx) = ChannelSink::new(64);
    let id = pipeline.connect(Arc::new(sink)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.disconnect(id).await;

    let stats = pipeline.stats().await;
    assert!(stats.cycles_failed >= 2);
    assert_eq!(stats.cycles_failed, stats.poll_cycles);
    assert!(rx.try_recv().is_err());
    assert!(store.files(SAMPLES_PREFIX).unwrap().is_empty());
    assert!(store.files(SNAPSHOTS_PREFIX).unwrap().is_empty());
}
