//! Admin API over a running relay.

use std::time::Duration;

use serde_json::Value;

mod common;

const KEY: &str = "test-admin-key";

async fn start() -> (common::RunningRelay, tempfile::TempDir) {
    let upstream = common::start_echo_backend("u1", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(&[upstream], dir.path());
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    (common::start_relay(config).await, dir)
}

#[tokio::test]
async fn rejects_missing_or_wrong_key() {
    let (relay, _dir) = start().await;
    let client = common::client();

    let res = client.get(relay.url("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(relay.url("/admin/status"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    relay.stop().await;
}

#[tokio::test]
async fn admin_routes_are_relayed_when_disabled() {
    let upstream = common::start_echo_backend("u1", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let relay = common::start_relay(common::test_config(&[upstream], dir.path())).await;

    let res = common::client()
        .get(relay.url("/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["upstream"], "u1");
    assert_eq!(body["uri"], "/admin/status");

    relay.stop().await;
}

#[tokio::test]
async fn lists_closes_and_sweeps_sessions() {
    let (relay, dir) = start().await;
    let client = common::client();

    for key in ["alpha", "beta"] {
        let res = client
            .get(relay.url("/"))
            .header("x-session-id", key)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let sessions: Vec<Value> = client
        .get(relay.url("/admin/sessions"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let keys: Vec<&str> = sessions.iter().filter_map(|s| s["key"].as_str()).collect();
    assert_eq!(keys, ["alpha", "beta"]);
    assert_eq!(sessions[0]["status"], "active");

    let res = client
        .delete(relay.url("/admin/sessions/alpha"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    assert_eq!(common::read_sessions(dir.path())["alpha"]["status"], "closed");

    let res = client
        .delete(relay.url("/admin/sessions/missing"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let report: Value = client
        .post(relay.url("/admin/sweep"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["closed"], 1);
    assert_eq!(report["expired"], 0);
    assert!(common::read_sessions(dir.path()).get("alpha").is_none());

    let status: Value = client
        .get(relay.url("/admin/status"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["persistent"], true);
    assert_eq!(status["targets"].as_array().unwrap().len(), 1);

    relay.stop().await;
}
