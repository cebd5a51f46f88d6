use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/api/nope")).send().await.unwrap();

    assert_eq!(resp.status().as_u16(), 404);
}
