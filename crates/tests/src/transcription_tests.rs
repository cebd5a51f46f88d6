use crate::fixtures::{audio, test_app::TestApp};
use serde_json::{Value, json};

#[tokio::test]
async fn transcribes_wav_into_global_segments() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["outcome"], "transcribed");

    let segments = json["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 2);
    // Bursts start at 0.5s and 5.5s; padding moves each start slightly earlier.
    let first_start = segments[0]["start"].as_f64().unwrap();
    let second_start = segments[1]["start"].as_f64().unwrap();
    assert!((0.3..=0.5).contains(&first_start), "first start {}", first_start);
    assert!((5.3..=5.5).contains(&second_start), "second start {}", second_start);
    for segment in segments {
        assert!(segment["end"].as_f64().unwrap() > segment["start"].as_f64().unwrap());
        assert!(segment["end"].as_f64().unwrap() <= 8.0);
    }

    let stats = &json["stats"];
    assert_eq!(stats["chunk_count"], 2);
    assert_eq!(stats["failed_count"], 0);
    assert_eq!(stats["segment_count"], 2);
    assert_eq!(stats["device_mode"], "single");
    assert_eq!(stats["devices"], json!([0]));
    assert!(stats["session_id"].as_str().is_some());
    assert!((stats["audio_duration_secs"].as_f64().unwrap() - 8.0).abs() < 1e-3);
    assert!(json["failures"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn configured_language_applies_when_request_omits_it() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let json: Value = app
        .transcribe(json!({ "path": path }))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(json["segments"][0]["text"], "en:transcribe");
}

#[tokio::test]
async fn auto_language_reaches_recognizer_as_no_hint() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let json: Value = app
        .transcribe(json!({ "path": path, "language": "auto" }))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(json["segments"][0]["text"], "auto:transcribe");
}

#[tokio::test]
async fn explicit_language_and_translate_task_are_forwarded() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let json: Value = app
        .transcribe(json!({ "path": path, "language": "de", "task": "Translate" }))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(json["segments"][0]["text"], "de:translate");
    assert_eq!(json["segments"][1]["text"], "de:translate");
}

#[tokio::test]
async fn multi_device_spreads_chunks_round_robin() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let resp = app
        .transcribe(json!({ "path": path, "multi_device": true }))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["stats"]["device_mode"], "multi");
    assert_eq!(json["stats"]["devices"], json!([0, 1]));
    assert_eq!(json["stats"]["chunk_count"], 2);
    assert_eq!(json["segments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn long_speech_is_split_under_max_chunk() {
    let app = TestApp::spawn().await;
    let path = app.wav("long.wav", &audio::tone_pattern(&[(12.0, 0.5)]));

    let json: Value = app
        .transcribe(json!({ "path": path }))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(json["outcome"], "transcribed");
    assert_eq!(json["stats"]["chunk_count"], 3);
    let segments = json["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 3);
    for segment in segments {
        let length = segment["end"].as_f64().unwrap() - segment["start"].as_f64().unwrap();
        assert!(length <= 5.0 + 1e-6, "segment length {}", length);
    }
}

#[tokio::test]
async fn silent_audio_reports_no_speech() {
    let app = TestApp::spawn().await;
    let path = app.wav("silence.wav", &audio::tone_pattern(&[(3.0, 0.0)]));

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["outcome"], "no_speech");
    assert!(json["segments"].as_array().unwrap().is_empty());
    assert_eq!(json["stats"]["chunk_count"], 0);
    assert!(json["stats"]["session_id"].is_null());
    assert_eq!(app.factory.loads(), 0);
}

#[tokio::test]
async fn session_scratch_is_removed_after_request() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(app.scratch_entries(), 0);
}

#[tokio::test]
async fn concurrent_requests_get_separate_sessions() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let (a, b) = tokio::join!(
        app.transcribe(json!({ "path": path })),
        app.transcribe(json!({ "path": path }))
    );
    let a: Value = a.json().await.unwrap();
    let b: Value = b.json().await.unwrap();

    assert_eq!(a["outcome"], "transcribed");
    assert_eq!(b["outcome"], "transcribed");
    assert_ne!(a["stats"]["session_id"], b["stats"]["session_id"]);
    assert_eq!(a["segments"], b["segments"]);
}

#[tokio::test]
async fn unknown_task_is_bad_request() {
    let app = TestApp::spawn().await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    let resp = app
        .transcribe(json!({ "path": path, "task": "summarize" }))
        .await;

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "bad_request");
    assert!(json["message"].as_str().unwrap().contains("summarize"));
}

#[tokio::test]
async fn missing_file_is_bad_request() {
    let app = TestApp::spawn().await;
    let path = app.workdir.path().join("nope.wav");

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn blank_path_is_bad_request() {
    let app = TestApp::spawn().await;

    let resp = app.transcribe(json!({ "path": "  " })).await;

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn exhausted_pool_is_service_unavailable() {
    let app = TestApp::spawn_with_settings(|s| {
        s.transcription.max_workers = 1;
        s.transcription.acquire_timeout_secs = 1;
    })
    .await;
    let path = app.wav("speech.wav", &audio::two_bursts());

    // Hold the only single-device worker.
    let model = app.service.config().model_config();
    let _held = app.service.pool().acquire_single(&model).await.unwrap();

    let resp = app.transcribe(json!({ "path": path })).await;

    assert_eq!(resp.status().as_u16(), 503);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "service_unavailable");
}
