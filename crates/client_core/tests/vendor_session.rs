use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use client_core::{
    payload, CommandError, ConnectError, ControllerHandle, DeviceController, OvenPreset, Settings,
};
use serde_json::{json, Value};
use shared::domain::{Device, DeviceFamily, DeviceId};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct VendorState {
    query: Arc<Mutex<Option<HashMap<String, String>>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn vendor_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<VendorState>,
) -> impl IntoResponse {
    *state.query.lock().await = Some(query);
    ws.on_upgrade(move |socket| serve_vendor(socket, state))
}

async fn serve_vendor(mut socket: WebSocket, state: VendorState) {
    let greeting = [
        json!({ "command": "EVENT_USER_STATE", "payload": { "isConnectedToAlexa": false } }).to_string(),
        "this is not json".to_string(),
        json!({
            "command": "EVENT_APO_WIFI_LIST",
            "payload": [{ "cookerId": "oven-7", "name": "Test Oven", "type": "oven_v2" }]
        })
        .to_string(),
    ];
    for frame in greeting {
        if socket.send(WsMessage::Text(frame)).await.is_err() {
            return;
        }
    }

    while let Some(Ok(message)) = socket.recv().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let replies = [
            json!({ "command": "CMD_STATE_APO", "payload": { "state": "cooking" } }),
            json!({ "command": "RESPONSE", "requestId": frame["requestId"], "payload": { "status": "ok" } }),
        ];
        state.received.lock().await.push(frame);
        for reply in replies {
            if socket.send(WsMessage::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

async fn hang_up(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        let _ = socket.send(WsMessage::Close(None)).await;
    })
}

async fn spawn_vendor() -> Result<(String, VendorState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = VendorState::default();
    let app = Router::new()
        .route("/", get(vendor_socket))
        .route("/hangup", get(hang_up))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("ws://{addr}"), state))
}

fn settings_for(endpoint: String) -> Settings {
    Settings {
        endpoint,
        connect_timeout: Duration::from_secs(2),
        discovery_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
        ..Settings::default()
    }
}

#[tokio::test]
async fn connect_discover_command_and_close() {
    let (endpoint, vendor) = spawn_vendor().await.expect("spawn vendor");
    let controller = DeviceController::new(settings_for(format!("{endpoint}/")));

    controller.connect("anova-test-token").await.expect("connect");
    let query = vendor.query.lock().await.clone().expect("query recorded");
    assert_eq!(query.get("token").map(String::as_str), Some("anova-test-token"));
    assert_eq!(
        query.get("supportedAccessories").map(String::as_str),
        Some("APC,APO")
    );

    let device = controller
        .discover_and_select_device()
        .await
        .expect("oven discovered");
    assert_eq!(device.id, DeviceId::from("oven-7"));
    assert_eq!(device.family, DeviceFamily::Apo);
    assert_eq!(device.protocol_version, "oven_v2");

    let response = controller
        .start_oven(OvenPreset::Roast, 200.0, Duration::from_secs(1800))
        .await
        .expect("roast acknowledged");
    assert_eq!(response.command, "RESPONSE");

    let received = vendor.received.lock().await.clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["command"], "CMD_APO_START");
    assert_eq!(received[0]["payload"]["payload"]["cookerId"], "oven-7");

    // The malformed greeting frame was skipped; the rest are in receipt order.
    let commands: Vec<_> = controller
        .messages_since(0)
        .await
        .into_iter()
        .map(|m| m.command)
        .collect();
    assert_eq!(
        commands,
        vec!["EVENT_USER_STATE", "EVENT_APO_WIFI_LIST", "CMD_STATE_APO", "RESPONSE"]
    );

    let started = std::time::Instant::now();
    controller.close().await;
    controller.close().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(controller.recent_messages(10).await.is_empty());
}

#[tokio::test]
async fn malformed_token_is_rejected_before_connecting() {
    let controller = DeviceController::new(settings_for("ws://127.0.0.1:1/".into()));
    assert!(matches!(
        controller.connect("").await,
        Err(ConnectError::EmptyToken)
    ));
    assert!(matches!(
        controller.connect("not-a-vendor-token").await,
        Err(ConnectError::MalformedToken { .. })
    ));
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let controller = DeviceController::new(settings_for(format!("ws://{addr}/")));
    let result = controller.connect("anova-test-token").await;
    assert!(matches!(
        result,
        Err(ConnectError::Handshake(_) | ConnectError::Timeout(_))
    ));
}

#[tokio::test]
async fn server_hang_up_ends_the_session() {
    let (endpoint, _vendor) = spawn_vendor().await.expect("spawn vendor");
    let controller = DeviceController::new(settings_for(format!("{endpoint}/hangup")));
    controller.connect("anova-test-token").await.expect("connect");

    let stop = payload::stop(&Device {
        id: DeviceId::from("apc-1"),
        name: "Cooker".into(),
        family: DeviceFamily::Apc,
        protocol_version: "a6".into(),
    });
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        match controller
            .issue_command(stop.clone(), Duration::from_millis(100), false)
            .await
        {
            Err(CommandError::NotConnected) => break,
            other => assert!(
                std::time::Instant::now() < deadline,
                "session still alive: {other:?}"
            ),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    controller.close().await;
}
