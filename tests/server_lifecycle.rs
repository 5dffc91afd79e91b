//! Live-socket startup, traffic and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use request_gate::activity::{MemorySink, Outcome};
use request_gate::auth::{InMemoryPrincipalStore, Principal, Role, TokenVerifier};
use request_gate::lifecycle;
use request_gate::{GateServer, Shutdown};

mod common;

#[tokio::test]
async fn serves_until_shutdown_then_drains_activity() {
    let mut config = common::config();
    config.timeouts.shutdown_grace_secs = 2;

    let shutdown = Shutdown::new();
    let sink = Arc::new(MemorySink::new());
    let principals = Arc::new(InMemoryPrincipalStore::from_seed(&config.principals));
    let gate = lifecycle::start(&config, principals, sink.clone(), &shutdown)
        .await
        .expect("gate starts on the memory store");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = GateServer::new(&config, gate.state.clone());
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move { server.run(listener, &server_shutdown).await });

    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["store"], "memory");

    let token = TokenVerifier::new(&config.auth)
        .issue(&Principal::new("editor-1", "editor-1@cms.test", Role::Editor))
        .unwrap();
    let res = client
        .get(format!("{base}/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert!(res.headers().contains_key("ratelimit-limit"));

    let res = client.get(format!("{base}/auth/me")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server stops within the grace period")
        .unwrap()
        .unwrap();
    gate.join().await;

    let events = sink.events().await;
    assert!(events
        .iter()
        .any(|e| e.action == "authenticate:bearer" && e.outcome == Outcome::Allowed));
    assert!(events
        .iter()
        .any(|e| e.action == "authenticate" && matches!(e.outcome, Outcome::Denied(_))));
    assert!(events.iter().any(|e| e.action.starts_with("rate_limit:")));
}
