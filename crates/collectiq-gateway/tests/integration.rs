//! Gateway integration tests: start a real server and talk to it over HTTP
//! and the media-stream websocket.
//!
//! Run with: `cargo test -p collectiq-gateway --test integration`

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use collectiq_core::config::Config;
use collectiq_gateway::GatewayState;

use common::{Fakes, settings, wait_until};

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_test_gateway(fakes: &Fakes) -> (Arc<GatewayState>, u16) {
    let port = find_free_port();
    let state = Arc::new(GatewayState::new(
        Config::default(),
        fakes.services(settings()),
    ));

    let state_clone = state.clone();
    tokio::spawn(async move {
        let _ = collectiq_gateway::start_gateway(state_clone, port).await;
    });

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    (state, port)
}

#[tokio::test]
async fn test_health_endpoint() {
    let fakes = Fakes::new(Duration::from_millis(10));
    let (_state, port) = start_test_gateway(&fakes).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .expect("Health request failed");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["active_calls"], 0);
}

#[tokio::test]
async fn test_voice_webhook_connects_stream() {
    let fakes = Fakes::new(Duration::from_millis(10));
    let (_state, port) = start_test_gateway(&fakes).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/collect-iq/voice?payerId=1003"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["content-type"], "text/xml");

    let body = resp.text().await.unwrap();
    assert!(body.contains(&format!(
        r#"<Stream url="wss://127.0.0.1:{port}/collect-iq/media-stream?payerId=1003">"#
    )));
    assert!(body.contains(r#"<Parameter name="payerId" value="1003"/>"#));
}

#[tokio::test]
async fn test_voice_webhook_without_payer_hangs_up() {
    let fakes = Fakes::new(Duration::from_millis(10));
    let (_state, port) = start_test_gateway(&fakes).await;

    let body = reqwest::get(format!("http://127.0.0.1:{port}/collect-iq/voice"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("<Hangup/>"));
    assert!(!body.contains("<Stream"));
}

#[tokio::test]
async fn test_media_stream_greets_and_logs_on_stop() {
    let fakes = Fakes::new(Duration::from_millis(10));
    let (state, port) = start_test_gateway(&fakes).await;

    let url = format!("ws://127.0.0.1:{port}/collect-iq/media-stream?payerId=1003");
    let (mut ws, _) = connect_async(&url).await.expect("WS connect failed");

    ws.send(Message::Text(
        r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        r#"{"event":"start","streamSid":"MZ9","start":{"streamSid":"MZ9","callSid":"CA9","customParameters":{}}}"#.into(),
    ))
    .await
    .unwrap();

    // The greeting arrives as paced media frames on our stream.
    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.to_string(),
                Some(Ok(_)) => continue,
                other => panic!("stream ended early: {other:?}"),
            }
        }
    })
    .await
    .expect("no media frame");
    let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["event"], "media");
    assert_eq!(frame["streamSid"], "MZ9");
    assert_eq!(state.active_calls(), 1);

    ws.send(Message::Text(
        r#"{"event":"stop","streamSid":"MZ9","stop":{"callSid":"CA9"}}"#.into(),
    ))
    .await
    .unwrap();

    let store = fakes.store.clone();
    wait_until(move || store.transcript_count() == 1).await;
    let state_check = state.clone();
    wait_until(move || state_check.active_calls() == 0).await;
    assert_eq!(state.total_calls(), 1);
    assert_eq!(fakes.store.transcripts.lock().unwrap()[0].call_id, "CA9");
}
