use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use recon::extension_bridge::ExtensionBridge;
use recon::ReconError;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::test]
async fn extension_bridge_roundtrip() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let bridge = ExtensionBridge::start("127.0.0.1:0").await.expect("bind");

    // Connect a fake extension client
    let (mut ws, _) = connect_async(format!("ws://{}", bridge.local_addr()))
        .await
        .expect("ws connect");
    ws.send(Message::Text(r#"{"type":"hello","from":"test"}"#.into()))
        .await
        .expect("send hello");
    let (mut writer, mut reader) = ws.split();

    bridge
        .wait_for_client(Duration::from_secs(5))
        .await
        .expect("client registered");

    let bridge_for_task = bridge.clone();
    let eval_handle = tokio::spawn(async move {
        let ok = bridge_for_task
            .eval("(()=>({answer: 42}))()", Duration::from_secs(3))
            .await;
        let failed = bridge_for_task
            .eval("(()=>{throw new Error('boom')})()", Duration::from_secs(3))
            .await;
        (ok, failed)
    });

    // Answer the first request with a value and the second with an error.
    for reply_ok in [true, false] {
        let msg = tokio::time::timeout(Duration::from_secs(3), reader.next())
            .await
            .expect("request in time")
            .expect("stream open")
            .expect("valid frame");
        let request: serde_json::Value =
            serde_json::from_str(&msg.into_text().unwrap()).expect("json request");
        assert_eq!(request["action"], "eval");
        let id = request["id"].as_str().expect("request id");
        let reply = if reply_ok {
            serde_json::json!({ "id": id, "ok": true, "result": { "answer": 42 } })
        } else {
            serde_json::json!({ "id": id, "ok": false, "error": "Error: boom" })
        };
        writer
            .send(Message::Text(reply.to_string()))
            .await
            .expect("send result");
    }

    let (ok, failed) = eval_handle.await.expect("eval task join");
    assert_eq!(ok.expect("bridge eval")["answer"], 42);
    match failed {
        Err(ReconError::Script(message)) => assert_eq!(message, "Error: boom"),
        other => panic!("Expected a script error, got {other:?}"),
    }
}

#[tokio::test]
async fn eval_without_extension_is_a_fatal_bridge_error() {
    let bridge = ExtensionBridge::start("127.0.0.1:0").await.expect("bind");
    assert!(!bridge.is_client_connected().await);

    let err = bridge
        .eval("1 + 1", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconError::Bridge(_)));
    assert!(err.is_fatal());
}
