use super::*;

use chrono::Utc;
use shared::protocol::{EVENT_APC_WIFI_LIST, EVENT_APO_WIFI_LIST};

fn event(command: &str, payload: serde_json::Value) -> Message {
    Message::from_frame(
        serde_json::json!({ "command": command, "payload": payload }).to_string(),
        Utc::now(),
    )
    .expect("frame")
}

#[tokio::test]
async fn duplicate_identifiers_keep_first_descriptor() {
    let registry = DeviceRegistry::new();
    let added = registry
        .observe(&event(
            EVENT_APO_WIFI_LIST,
            serde_json::json!([
                { "cookerId": "oven-1", "name": "Kitchen", "type": "oven_v2" },
                { "cookerId": "oven-1", "name": "Renamed", "type": "oven_v1" }
            ]),
        ))
        .await;
    assert_eq!(added, 1);

    let added = registry
        .observe(&event(
            EVENT_APO_WIFI_LIST,
            serde_json::json!([{ "cookerId": "oven-1", "name": "Again" }]),
        ))
        .await;
    assert_eq!(added, 0);

    let devices = registry.devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Kitchen");
    assert_eq!(devices[0].protocol_version, "oven_v2");
    assert_eq!(devices[0].family, DeviceFamily::Apo);
}

#[tokio::test]
async fn missing_descriptor_fields_fall_back_to_family_defaults() {
    let registry = DeviceRegistry::new();
    registry
        .observe(&event(
            EVENT_APC_WIFI_LIST,
            serde_json::json!([{ "cookerId": "apc-9" }]),
        ))
        .await;

    let device = registry
        .get(&DeviceId::from("apc-9"))
        .await
        .expect("device");
    assert_eq!(device.name, "Anova Precision Cooker");
    assert_eq!(device.family, DeviceFamily::Apc);
    assert_eq!(device.protocol_version, UNKNOWN_DEVICE_TYPE);
}

#[tokio::test]
async fn malformed_descriptors_and_other_events_are_ignored() {
    let registry = DeviceRegistry::new();
    assert_eq!(
        registry
            .observe(&event(
                EVENT_APO_WIFI_LIST,
                serde_json::json!([{ "name": "no id" }, { "cookerId": "oven-2" }]),
            ))
            .await,
        1
    );
    assert_eq!(
        registry
            .observe(&event(EVENT_APO_WIFI_LIST, serde_json::json!({ "cookerId": "x" })))
            .await,
        0
    );
    assert_eq!(
        registry
            .observe(&event(
                "EVENT_APO_STATE",
                serde_json::json!([{ "cookerId": "state" }]),
            ))
            .await,
        0
    );
    assert_eq!(registry.devices().await.len(), 1);
}

#[tokio::test]
async fn discover_returns_as_soon_as_a_device_appears() {
    let log = MessageLog::new();
    let registry = DeviceRegistry::new();
    let writer = log.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        writer
            .append(event(
                EVENT_APC_WIFI_LIST,
                serde_json::json!([{ "cookerId": "apc-1", "type": "a6" }]),
            ))
            .await;
    });

    let started = std::time::Instant::now();
    let devices = registry
        .discover(&log, Duration::from_secs(5), Duration::from_millis(100))
        .await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, DeviceId::from("apc-1"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn discover_collects_both_families_from_history() {
    let log = MessageLog::new();
    log.append(event("EVENT_USER_STATE", serde_json::json!({}))).await;
    log.append(event(
        EVENT_APC_WIFI_LIST,
        serde_json::json!([{ "cookerId": "apc-1" }]),
    ))
    .await;
    log.append(event(
        EVENT_APO_WIFI_LIST,
        serde_json::json!([{ "cookerId": "oven-1", "type": "oven_v2" }]),
    ))
    .await;

    let registry = DeviceRegistry::new();
    let devices = registry
        .discover(&log, Duration::from_secs(5), Duration::from_millis(100))
        .await;
    let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["apc-1", "oven-1"]);
}

#[tokio::test(start_paused = true)]
async fn discover_without_devices_returns_empty_after_timeout() {
    let log = MessageLog::new();
    let registry = DeviceRegistry::new();

    let started = Instant::now();
    let devices = registry
        .discover(&log, Duration::from_secs(5), Duration::from_millis(100))
        .await;
    assert!(devices.is_empty());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_millis(5200));
}
