use crate::fixtures::{audio, test_app::TestApp};
use serde_json::{Value, json};

#[tokio::test]
async fn fresh_pool_is_empty() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/api/pool")).send().await.unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["shut_down"], false);
    assert_eq!(json["single"]["mode"], "single");
    assert_eq!(json["single"]["capacity"], 2);
    assert_eq!(json["single"]["live_workers"], 0);
    assert_eq!(json["multi"]["mode"], "multi");
    assert_eq!(json["multi"]["capacity"], 1);
    assert_eq!(json["multi"]["devices"], json!([0, 1]));
}

#[tokio::test]
async fn worker_is_kept_warm_between_requests() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    for _ in 0..3 {
        let resp = app.transcribe(json!({ "path": path })).await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    let status: Value = app
        .client
        .get(app.url("/api/pool"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["single"]["live_workers"], 1);
    assert_eq!(status["single"]["idle_workers"], 1);
    assert_eq!(status["single"]["leased_workers"], 0);
    assert_eq!(status["single"]["created_total"], 1);
    assert_eq!(status["single"]["configs"], json!(["tiny/int8"]));
    assert_eq!(app.factory.loads(), 1);
}

#[tokio::test]
async fn multi_device_request_builds_one_worker_per_device() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let resp = app
        .transcribe(json!({ "path": path, "multi_device": true }))
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let status: Value = app
        .client
        .get(app.url("/api/pool"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["multi"]["live_workers"], 2);
    assert_eq!(status["single"]["live_workers"], 0);
    assert_eq!(app.factory.loads(), 2);
}

#[tokio::test]
async fn shut_down_pool_refuses_work() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());
    app.service.shutdown();

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 503);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "service_unavailable");
}
