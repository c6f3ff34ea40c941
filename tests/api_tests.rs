mod common;

use std::net::IpAddr;
use std::time::Duration;

use axum::http::StatusCode;
use common::{app, get_json, get_raw, post_form, test_config, ScriptedProber, PEER};
use lan_sentry::decoy::{DecoyState, DECOY_PAGE};
use lan_sentry::range::RangePolicy;
use lan_sentry::store::JsonStore;
use serde_json::json;

#[tokio::test]
async fn ping_unreachable_host_reports_zero_received() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (status, body) = post_form(&router, "/api/network/ping", "host=10.0.0.9&count=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["packetsSent"], json!(5));
    assert_eq!(body["packetsReceived"], json!(0));
    assert_eq!(body["avgTime"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn ping_reachable_host_and_missing_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber::with_alive(&["10.0.0.7"]);
    let (_, router) = app(&test_config(dir.path()), prober, None);

    let (status, body) = post_form(&router, "/api/network/ping", "host=10.0.0.7&count=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["packetsReceived"], json!(3));
    assert_eq!(body["avgTime"].as_f64(), Some(3.0));

    let (status, body) = post_form(&router, "/api/network/ping", "count=3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing host parameter"));
}

#[tokio::test]
async fn scan_lists_reachable_hosts_and_hides_blocked_ones() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber::with_alive(&["10.0.0.2", "10.0.0.3"]);
    let (_, router) = app(&test_config(dir.path()), prober.clone(), None);

    let (status, _) = post_form(&router, "/api/network/block", "ip=10.0.0.3&reason=noisy").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        post_form(&router, "/api/network/scan", "startIP=10.0.0.1&endIP=10.0.0.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["devices"],
        json!([{ "ip": "10.0.0.2", "mac": "Unknown", "reachable": true, "responseTime": 3.0 }])
    );
    assert_eq!(body["truncated"], json!(false));
    assert!(!prober.probed().contains(&"10.0.0.3".parse::<IpAddr>().unwrap()));
    assert_eq!(prober.probed().len(), 4);
}

#[tokio::test]
async fn oversized_scan_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber::default();
    let (_, router) = app(&test_config(dir.path()), prober.clone(), None);

    let (status, body) =
        post_form(&router, "/api/network/scan", "startIP=10.0.0.1&endIP=10.0.3.255").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["truncated"], json!(true));
    let probed = prober.probed();
    assert_eq!(probed.len(), 254);
    assert_eq!(probed.last().unwrap().to_string(), "10.0.0.254");
}

#[tokio::test]
async fn oversized_scan_is_rejected_under_reject_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.scan.range_policy = RangePolicy::Reject;
    let prober = ScriptedProber::default();
    let (_, router) = app(&config, prober.clone(), None);

    let (status, body) =
        post_form(&router, "/api/network/scan", "startIP=10.0.0.1&endIP=10.0.3.255").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(prober.probed().is_empty());
}

#[tokio::test]
async fn scan_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (status, body) = post_form(&router, "/api/network/scan", "startIP=10.0.0.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing IP range parameters"));

    let (status, body) =
        post_form(&router, "/api/network/scan", "startIP=10.0.0.300&endIP=10.0.0.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid IP format"));

    let (status, _) =
        post_form(&router, "/api/network/scan", "startIP=10.0.0.9&endIP=10.0.0.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scan_cancel_without_running_sweep_reports_false() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);
    let (status, body) = post_form(&router, "/api/network/scan/cancel", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": false }));
}

#[tokio::test]
async fn port_scan_reports_open_ports_with_service_names() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber {
        open_ports: [22].into_iter().collect(),
        ..ScriptedProber::default()
    };
    let (_, router) = app(&test_config(dir.path()), prober, None);

    let (status, body) = post_form(
        &router,
        "/api/network/ports",
        "host=10.0.0.1&startPort=20&endPort=25",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ports"], json!([{ "port": 22, "open": true, "service": "SSH" }]));
    assert_eq!(body["truncated"], json!(false));
}

#[tokio::test]
async fn port_scan_of_blocked_host_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);
    post_form(&router, "/api/network/block", "ip=10.0.0.1").await;

    let (status, body) = post_form(
        &router,
        "/api/network/ports",
        "host=10.0.0.1&startPort=20&endPort=25",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn block_unblock_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (_, body) = post_form(&router, "/api/network/block", "ip=10.0.0.5").await;
    assert_eq!(body, json!({ "success": true, "ip": "10.0.0.5" }));
    let (_, body) = post_form(&router, "/api/network/block", "ip=10.0.0.5").await;
    assert_eq!(body["success"], json!(false));

    let (_, body) = get_json(&router, "/api/network/blocked").await;
    let list = body["blockedIPs"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["ip"], json!("10.0.0.5"));
    assert_eq!(list[0]["reason"], json!("Manual block"));

    let (_, body) = post_form(&router, "/api/network/unblock", "ip=10.0.0.5").await;
    assert_eq!(body["success"], json!(true));
    let (_, body) = post_form(&router, "/api/network/unblock", "ip=10.0.0.5").await;
    assert_eq!(body["success"], json!(false));

    let (status, body) = post_form(&router, "/api/network/block", "ip=not-an-ip").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid IP format"));
}

#[tokio::test]
async fn blocking_requires_ap_mode_or_active_decoy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.network.ap_mode = false;
    let (_, router) = app(&config, ScriptedProber::default(), None);

    let (status, body) = post_form(&router, "/api/network/block", "ip=10.0.0.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("IP blocking is only available in AP mode"));

    post_form(&router, "/api/honeypot/toggle", "active=true").await;
    let (status, body) = post_form(&router, "/api/network/block", "ip=10.0.0.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn decoy_records_only_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (_, body) = post_form(&router, "/api/honeypot/toggle", "active=true&ssid=Test").await;
    assert_eq!(body, json!({ "success": true, "active": true }));

    let (status, page) = get_raw(&router, "/anything?x=1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("This is a test page."));

    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["ip"], json!(PEER.ip().to_string()));
    assert_eq!(logs[0]["port"], json!(PEER.port()));
    let data = logs[0]["data"].as_str().unwrap();
    assert!(data.starts_with("GET /anything?x=1 HTTP/1.1\n"));
    assert!(data.contains("user-agent: probe/1.0"));

    let (_, body) = post_form(&router, "/api/honeypot/toggle", "active=false").await;
    assert_eq!(body, json!({ "success": true, "active": false }));

    let (status, _) = get_raw(&router, "/anything").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);

    let (_, body) = post_form(&router, "/api/honeypot/clear", "").await;
    assert_eq!(body, json!({ "success": true }));
    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    assert!(body["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn blocked_source_is_refused_by_decoy() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);
    post_form(&router, "/api/honeypot/toggle", "active=true").await;
    post_form(&router, "/api/network/block", &format!("ip={}", PEER.ip())).await;

    let (status, _) = get_raw(&router, "/login").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    assert!(body["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ledger_keeps_only_the_newest_events() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.decoy.ledger_capacity = 3;
    let (_, router) = app(&config, ScriptedProber::default(), None);
    post_form(&router, "/api/honeypot/toggle", "active=true").await;

    for i in 0..5 {
        get_raw(&router, &format!("/probe/{i}")).await;
    }
    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    let targets: Vec<String> = body["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["data"].as_str().unwrap().lines().next().unwrap().to_owned())
        .collect();
    assert_eq!(
        targets,
        vec![
            "GET /probe/2 HTTP/1.1",
            "GET /probe/3 HTTP/1.1",
            "GET /probe/4 HTTP/1.1"
        ]
    );
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = JsonStore::new(&config.general.data_dir);

    {
        let (state, router) = app(&config, ScriptedProber::default(), Some(store.clone()));
        post_form(&router, "/api/network/block", "ip=10.0.0.8&reason=scanner").await;
        post_form(&router, "/api/honeypot/toggle", "active=true").await;
        get_raw(&router, "/wp-login.php").await;
        state.shutdown().await;
    }

    let (_, router) = app(&config, ScriptedProber::default(), Some(store));
    let (_, body) = get_json(&router, "/api/network/blocked").await;
    assert_eq!(body["blockedIPs"][0]["ip"], json!("10.0.0.8"));
    assert_eq!(body["blockedIPs"][0]["reason"], json!("scanner"));
    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_method_on_api_path_is_captured_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let (_, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (status, _) = get_raw(&router, "/api/network/ping").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    post_form(&router, "/api/honeypot/toggle", "active=true&ssid=Test").await;
    let (status, page) = get_raw(&router, "/api/network/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page, DECOY_PAGE);

    let (_, body) = get_json(&router, "/api/honeypot/logs").await;
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0]["data"]
        .as_str()
        .unwrap()
        .starts_with("GET /api/network/ping HTTP/1.1\n"));
}

#[tokio::test]
async fn malformed_numbers_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (state, router) = app(&test_config(dir.path()), ScriptedProber::default(), None);

    let (status, body) = post_form(&router, "/api/network/ping", "host=10.0.0.9&count=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["packetsSent"], json!(5));

    let (status, body) = post_form(&router, "/api/honeypot/toggle", "active=true&channel=x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "active": true }));
    assert_eq!(
        state.decoy().state().await,
        DecoyState::Active {
            ssid: "HoneypotAP".into(),
            channel: 1
        }
    );
}

fn paced_config(dir: &std::path::Path) -> lan_sentry::config::Config {
    let mut config = test_config(dir);
    config.scan.inter_probe_delay_ms = 10;
    config
}

#[tokio::test]
async fn api_stays_responsive_and_cancel_stops_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber::default();
    let (_, router) = app(&paced_config(dir.path()), prober.clone(), None);

    let sweep_router = router.clone();
    let sweep = tokio::spawn(async move {
        post_form(&sweep_router, "/api/network/scan", "startIP=10.0.0.1&endIP=10.0.0.254").await
    });
    tokio::time::sleep(Duration::from_millis(60)).await;

    let (status, body) = get_json(&router, "/api/network/blocked").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["blockedIPs"].as_array().unwrap().is_empty());
    assert!(!sweep.is_finished());

    let (_, body) = post_form(&router, "/api/network/scan/cancel", "").await;
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = sweep.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], json!(true));
    let probed = prober.probed().len();
    assert!(probed > 0 && probed < 254, "probed {probed}");
}

#[tokio::test]
async fn new_sweep_cancels_the_running_one() {
    let dir = tempfile::tempdir().unwrap();
    let prober = ScriptedProber::with_alive(&["10.0.1.2"]);
    let (_, router) = app(&paced_config(dir.path()), prober, None);

    let first_router = router.clone();
    let first = tokio::spawn(async move {
        post_form(&first_router, "/api/network/scan", "startIP=10.0.0.1&endIP=10.0.0.254").await
    });
    tokio::time::sleep(Duration::from_millis(60)).await;

    let (status, body) =
        post_form(&router, "/api/network/scan", "startIP=10.0.1.1&endIP=10.0.1.3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], json!(false));
    assert_eq!(body["devices"][0]["ip"], json!("10.0.1.2"));

    let (_, body) = first.await.unwrap();
    assert_eq!(body["cancelled"], json!(true));
}
