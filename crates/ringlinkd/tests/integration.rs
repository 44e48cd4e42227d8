//! Integration tests for ringlinkd
//!
//! These drive the bridge the way the service loop does, over a real display
//! link socket where it matters.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use ringlink_adapter_api::{MockSource, MockTransport, SourceError};
use ringlink_api::{available_key, fallback_key, keys, Endpoint};
use ringlink_config::ServiceConfig;
use ringlink_core::{Bridge, CycleOutcome, FollowUp};
use ringlink_ipc::{DisplayClient, DisplayServer, ServerMessage};
use ringlink_store::{keys as store_keys, SqliteStore, Store};
use ringlink_util::RinglinkError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn at() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    at().date_naive()
}

fn yesterday() -> NaiveDate {
    today().pred_opt().unwrap()
}

async fn display_server(dir: &TempDir) -> Arc<DisplayServer> {
    let mut server = DisplayServer::new(dir.path().join("ringlink.sock"), Duration::from_secs(5));
    server.start().await.unwrap();
    let server = Arc::new(server);
    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });
    server
}

async fn display_client(dir: &TempDir) -> DisplayClient {
    let mut client = DisplayClient::connect(dir.path().join("ringlink.sock"))
        .await
        .unwrap();
    client.expect_hello().await.unwrap();
    client
}

fn mock_bridge(store: Arc<dyn Store>, source: Arc<MockSource>) -> (Arc<Bridge>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let bridge = Bridge::new(store, source, transport.clone(), &ServiceConfig::default());
    (Arc::new(bridge), transport)
}

#[tokio::test]
async fn test_cycle_over_display_link() {
    let dir = tempdir().unwrap();
    let server = display_server(&dir).await;
    let mut client = display_client(&dir).await;

    let source = Arc::new(MockSource::new());
    source.respond(
        Endpoint::DailyReadiness,
        today(),
        vec![json!({"day": "2025-06-10", "score": 88, "temperature_deviation": -0.2})],
    );
    // Sleep is only scored for the previous night
    source.respond(
        Endpoint::DailySleep,
        yesterday(),
        vec![json!({"day": "2025-06-09", "score": 72, "total_sleep_duration": 27000})],
    );

    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let bridge = Arc::new(Bridge::new(
        store,
        source.clone(),
        server.clone(),
        &ServiceConfig::default(),
    ));

    let outcome = bridge.apply_settings_at(Some(r#"{"access_token": "tok"}"#), at());
    assert_eq!(outcome.follow_up, FollowUp::Refresh);

    let runner = bridge.clone();
    let cycle = tokio::spawn(async move { runner.refresh_at(at()).await });

    let (seq, msg) = client.next_display().await.unwrap();
    client.ack(seq).await.unwrap();

    let outcome = cycle.await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Delivered { attempts: 1, .. }));

    assert_eq!(msg.get_int(keys::CONFIGURED), Some(1));
    assert_eq!(msg.get_int(keys::PAYLOAD_COMPLETE), Some(1));
    assert_eq!(msg.get_int(keys::READINESS_SCORE), Some(88));
    assert_eq!(msg.get_int(keys::TEMPERATURE_DEVIATION), Some(-20));
    assert_eq!(msg.get_int(&fallback_key(keys::READINESS)), Some(0));
    assert_eq!(msg.get_int(keys::SLEEP_SCORE), Some(72));
    assert_eq!(msg.get_int(keys::TOTAL_SLEEP_TIME), Some(450));
    assert_eq!(msg.get_int(&fallback_key(keys::SLEEP)), Some(1));
    assert_eq!(msg.get_int(&available_key(keys::STRESS)), Some(0));

    assert_eq!(bridge.last_update(), Some(at()));
    assert_eq!(source.call_count(), 9);
}

#[tokio::test]
async fn test_rejected_frame_is_retried() {
    let dir = tempdir().unwrap();
    let server = display_server(&dir).await;
    let mut client = display_client(&dir).await;

    let source = Arc::new(MockSource::new());
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let bridge = Arc::new(Bridge::new(
        store,
        source,
        server.clone(),
        &ServiceConfig::default(),
    ));
    bridge.apply_settings_at(Some(r#"{"access_token": "tok"}"#), at());

    let runner = bridge.clone();
    let cycle = tokio::spawn(async move { runner.refresh_at(at()).await });

    let (first, _) = client.next_display().await.unwrap();
    client.nack(first, "busy").await.unwrap();

    let (second, msg) = client.next_display().await.unwrap();
    assert!(second > first);
    client.ack(second).await.unwrap();

    let outcome = cycle.await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Delivered { attempts: 2, .. }));
    assert_eq!(msg.get_int(keys::CONFIGURED), Some(1));
}

#[tokio::test]
async fn test_display_events_reach_the_service() {
    let dir = tempdir().unwrap();
    let server = display_server(&dir).await;
    let mut messages = server.take_message_receiver().unwrap();
    let mut client = display_client(&dir).await;

    assert!(matches!(
        messages.recv().await,
        Some(ServerMessage::DisplayConnected { .. })
    ));

    client.request_data().await.unwrap();
    assert!(matches!(
        messages.recv().await,
        Some(ServerMessage::RequestData { .. })
    ));

    client
        .configuration_closed(Some(
            r#"{"access_token": "tok", "refresh_frequency_minutes": 30}"#.into(),
        ))
        .await
        .unwrap();
    let Some(ServerMessage::ConfigurationClosed { response, .. }) = messages.recv().await else {
        panic!("expected configuration closed");
    };

    let (bridge, _transport) = mock_bridge(
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(MockSource::new()),
    );
    let outcome = bridge.apply_settings_at(response.as_deref(), at());
    assert!(outcome.change.frequency_changed);
    assert_eq!(outcome.follow_up, FollowUp::Refresh);
    assert_eq!(bridge.refresh_period(), Duration::from_secs(1800));

    drop(client);
    assert!(matches!(
        messages.recv().await,
        Some(ServerMessage::DisplayDisconnected { .. })
    ));
}

#[tokio::test]
async fn test_cached_scores_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ringlink.db");

    {
        let source = Arc::new(MockSource::new());
        source.respond(
            Endpoint::DailySleep,
            today(),
            vec![json!({"day": "2025-06-10", "score": 80})],
        );
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).unwrap());
        let (bridge, transport) = mock_bridge(store, source);

        bridge.apply_settings_at(Some(r#"{"access_token": "tok"}"#), at());
        assert!(bridge.refresh_at(at()).await.is_delivered());
        assert_eq!(
            transport.delivered()[0].get_int(&fallback_key(keys::SLEEP)),
            Some(0)
        );
    }

    // Upstream is down after the restart
    let source = Arc::new(MockSource::new());
    source.fail_everything(SourceError::Network("connection refused".into()));
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).unwrap());
    let (bridge, transport) = mock_bridge(store, source);

    assert!(bridge.refresh_at(at()).await.is_delivered());

    let msg = &transport.delivered()[0];
    assert_eq!(msg.get_int(keys::SLEEP_SCORE), Some(80));
    assert_eq!(msg.get_int(&available_key(keys::SLEEP)), Some(1));
    assert_eq!(msg.get_int(&fallback_key(keys::SLEEP)), Some(1));
    assert_eq!(msg.get_int(&available_key(keys::READINESS)), Some(0));
    assert_eq!(msg.get_int(keys::PAYLOAD_COMPLETE), Some(1));
}

#[tokio::test]
async fn test_legacy_cache_document_is_used() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    store
        .set(
            store_keys::SCORE_CACHE,
            r#"{"sleep_score": 75, "readiness_score": "81", "cache_date": "2025-06-10"}"#,
        )
        .unwrap();

    let source = Arc::new(MockSource::new());
    source.fail_everything(SourceError::Timeout);
    let (bridge, transport) = mock_bridge(store, source);

    bridge.apply_settings_at(Some(r#"{"access_token": "tok"}"#), at());
    assert!(bridge.refresh_at(at()).await.is_delivered());

    let msg = &transport.delivered()[0];
    assert_eq!(msg.get_int(keys::SLEEP_SCORE), Some(75));
    assert_eq!(msg.get_int(keys::READINESS_SCORE), Some(81));
}

#[tokio::test]
async fn test_expired_token_skips_network() {
    let source = Arc::new(MockSource::new());
    let (bridge, transport) = mock_bridge(
        Arc::new(SqliteStore::in_memory().unwrap()),
        source.clone(),
    );

    bridge.apply_settings_at(Some(r#"{"access_token": "tok", "expires_in": 60}"#), at());

    let later = at() + chrono::Duration::hours(2);
    let outcome = bridge.refresh_at(later).await;
    assert!(matches!(
        outcome,
        CycleOutcome::NotConfigured(RinglinkError::TokenExpired)
    ));
    assert_eq!(source.call_count(), 0);

    transport.wait_for_delivered(1).await;
    assert_eq!(transport.delivered()[0].get_int(keys::CONFIGURED), Some(0));
}
