//! `/health` transitions driven by probes, relay outcomes and the store.

use std::time::Duration;

use serde_json::Value;

mod common;

#[tokio::test]
async fn becomes_ready_after_first_probe() {
    let upstream = common::start_echo_backend("u1", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let relay = common::start_relay(common::test_config(&[upstream], dir.path())).await;

    let body = common::wait_for_health(&relay, "ready", Duration::from_secs(5)).await;
    assert_eq!(body["ready"], true);
    assert!(body["last_check"].is_string());

    let res = common::client().get(relay.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    relay.stop().await;
}

#[tokio::test]
async fn repeated_timeouts_degrade_and_a_success_recovers() {
    let upstream = common::start_echo_backend("u1", Duration::from_secs(3)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(&[upstream], dir.path());
    config.timeouts.request_secs = 1;
    config.health_check.degraded_threshold = 5;
    let relay = common::start_relay(config).await;
    common::wait_for_health(&relay, "ready", Duration::from_secs(5)).await;

    let client = common::client();
    let slow = (0..5).map(|_| {
        let client = client.clone();
        let url = relay.url("/slow");
        tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
    });
    for task in slow.collect::<Vec<_>>() {
        assert_eq!(task.await.unwrap(), 504);
    }

    let res = client.get(relay.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200, "degraded still serves");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["state"], "degraded");
    assert!(body["detail"].as_str().unwrap().contains("relay failures"));

    let res = client.get(relay.url("/fast")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = client
        .get(relay.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "ready");

    relay.stop().await;
}

#[tokio::test]
async fn unreachable_targets_make_relay_unready() {
    let dead = common::closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(&[dead], dir.path());
    config.health_check.unready_threshold = 2;
    let relay = common::start_relay(config).await;

    common::wait_for_health(&relay, "unready", Duration::from_secs(6)).await;
    let res = common::client().get(relay.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    relay.stop().await;
}

#[tokio::test]
async fn corrupt_store_reports_unready_but_keeps_relaying() {
    let upstream = common::start_echo_backend("u1", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sessions.json"), "[[[").unwrap();
    let relay = common::start_relay(common::test_config(&[upstream], dir.path())).await;
    let client = common::client();

    let res = client.get(relay.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["state"], "unready");
    assert!(body["detail"].as_str().unwrap().contains("state store"));

    // Successful probes do not clear a store failure.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let body: Value = client
        .get(relay.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "unready");

    let res = client.get(relay.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    relay.stop().await;
    assert_eq!(
        std::fs::read_to_string(dir.path().join("sessions.json")).unwrap(),
        "[[["
    );
}
