//! Lifecycle Integration Tests
//!
//! Exercises the coordinator end to end with a stub signaling engine:
//! startup ordering, the two fatal startup failures, and interrupt-driven
//! teardown that releases every bound socket.

use gateway_config::{GatewayConfig, HttpOptions, RelayEndpoints};
use rtc_gateway::{
    ApiTable, GatewayError, LifecycleCoordinator, RunState, SignalingConfig, SignalingEngine,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Engine stub with a scripted initialization outcome
struct StubEngine {
    init_ok: bool,
    initialized: Arc<AtomicBool>,
}

impl SignalingEngine for StubEngine {
    fn initialize(&mut self) -> bool {
        self.initialized.store(true, Ordering::SeqCst);
        self.init_ok
    }

    fn http_api(&self) -> ApiTable {
        let mut table = ApiTable::new();
        table.insert(
            "version".to_string(),
            Arc::new(|_req| serde_json::json!({ "version": "test" })),
        );
        table
    }
}

fn free_tcp_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

fn free_udp_port() -> u16 {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

fn test_config(http_port: u16) -> GatewayConfig {
    GatewayConfig {
        http: HttpOptions {
            listening_address: format!("127.0.0.1:{}", http_port),
            document_root: ".".to_string(),
            ..HttpOptions::default()
        },
        ..GatewayConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_engine_initialization_binds_nothing() {
    let http_port = free_tcp_port();
    let initialized = Arc::new(AtomicBool::new(false));

    let coordinator = LifecycleCoordinator::new();
    let flag = initialized.clone();
    let result = coordinator
        .run(test_config(http_port), move |_signaling: SignalingConfig| {
            Box::new(StubEngine {
                init_ok: false,
                initialized: flag,
            })
        })
        .await;

    assert!(matches!(result, Err(GatewayError::SignalingInitFailed)));
    assert!(initialized.load(Ordering::SeqCst));

    // The HTTP port was never bound.
    let addr: SocketAddr = format!("127.0.0.1:{}", http_port).parse().unwrap();
    std::net::TcpListener::bind(addr).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_bind_conflict_is_fatal() {
    // Occupy the port the surface wants.
    let guard = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let http_port = guard.local_addr().unwrap().port();

    let coordinator = LifecycleCoordinator::new();
    let result = coordinator
        .run(test_config(http_port), |_signaling| {
            Box::new(StubEngine {
                init_ok: true,
                initialized: Arc::new(AtomicBool::new(false)),
            })
        })
        .await;

    match result {
        Err(GatewayError::HttpStartupFailed(reason)) => {
            assert!(reason.contains(&http_port.to_string()));
        }
        other => panic!("expected HTTP startup failure, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interrupt_stops_gateway_and_releases_sockets() {
    let http_port = free_tcp_port();
    let stun_port = free_udp_port();
    let turn_port = free_udp_port();

    let mut config = test_config(http_port);
    config.relay = RelayEndpoints {
        stun_url: "stun.l.google.com:19302".to_string(),
        turn_url: format!("turn:turn@127.0.0.1:{}", turn_port),
        local_stun_url: Some(format!("127.0.0.1:{}", stun_port)),
        local_turn_url: Some(format!("turn:turn@127.0.0.1:{}", turn_port)),
        udp_port_range: "0:65535".to_string(),
    };

    let coordinator = LifecycleCoordinator::new();
    let token = coordinator.shutdown_token();
    let mut state = coordinator.state();

    let handle = tokio::spawn(coordinator.run(config, |_signaling| {
        Box::new(StubEngine {
            init_ok: true,
            initialized: Arc::new(AtomicBool::new(false)),
        })
    }));

    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == RunState::Running))
        .await
        .unwrap()
        .unwrap();

    // The surface serves the engine's API while running.
    let response = reqwest::get(format!("http://127.0.0.1:{}/api/version", http_port))
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["version"], "test");

    // An interrupt only trips the token; teardown happens on the run loop.
    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(*state.borrow(), RunState::Stopped);

    // Teardown released the HTTP listener.
    let addr: SocketAddr = format!("127.0.0.1:{}", http_port).parse().unwrap();
    std::net::TcpListener::bind(addr).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_relay_descriptors_do_not_stop_startup() {
    let http_port = free_tcp_port();

    let mut config = test_config(http_port);
    config.relay.local_stun_url = Some("not a bind address".to_string());
    config.relay.local_turn_url = Some("turn:turn@".to_string());
    config.relay.turn_url = "turn:turn@127.0.0.1:3478".to_string();

    let coordinator = LifecycleCoordinator::new();
    let token = coordinator.shutdown_token();
    let mut state = coordinator.state();

    let handle = tokio::spawn(coordinator.run(config, |_signaling| {
        Box::new(StubEngine {
            init_ok: true,
            initialized: Arc::new(AtomicBool::new(false)),
        })
    }));

    // Both relay descriptors are malformed, yet the gateway reaches the
    // run loop and shuts down cleanly.
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == RunState::Running))
        .await
        .unwrap()
        .unwrap();

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
