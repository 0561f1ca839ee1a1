//! End-to-end tests: real front server, real upstream sockets, reqwest client.

use std::net::SocketAddr;
use std::time::Duration;

use pooled_proxy::admin::setup_admin_router;
use pooled_proxy::config::ProxyConfig;
use pooled_proxy::http::{AppState, HttpServer};
use pooled_proxy::lifecycle::Shutdown;
use pooled_proxy::load_balancer::ServerSpec;
use pooled_proxy::proxy::ServerPoolSpec;
use pooled_proxy::routing::{RequestMatcherSpec, StringMatcherSpec};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod common;

struct RunningProxy {
    addr: SocketAddr,
    state: AppState,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<ProxyConfig>,
    server: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningProxy {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn config(main: &str, canary: Option<&str>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.proxy.borrow_timeout_ms = 300;
    config.proxy.pools.push(ServerPoolSpec {
        servers: vec![ServerSpec::new(main)],
        ..Default::default()
    });
    if let Some(canary) = canary {
        let mut filter = RequestMatcherSpec::default();
        filter.headers.insert("X-Canary".into(), StringMatcherSpec::exact("true"));
        config.proxy.pools.push(ServerPoolSpec {
            servers: vec![ServerSpec::new(canary)],
            filter: Some(filter),
            ..Default::default()
        });
    }
    config
}

async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let state = AppState::new(&config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();

    let server = HttpServer::new(state.clone());
    let server = tokio::spawn(server.run(listener, config_updates, shutdown.clone()));

    RunningProxy { addr, state, shutdown, updates, server }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_routes_by_header_and_forwards_client_ip() {
    let main = common::start_programmable_backend(|head| async move {
        let forwarded = common::header(&head, "x-forwarded-for").unwrap_or("").to_string();
        (200, format!("main {} {}", common::path(&head), forwarded))
    })
    .await;
    let canary = common::start_mock_backend("canary").await;
    let proxy = start_proxy(config(&main.url(), Some(&canary.url()))).await;

    let res = client().get(proxy.url("/items?page=2")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "main /items?page=2 127.0.0.1");

    let res = client().get(proxy.url("/")).header("X-Canary", "true").send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "canary");

    proxy.shutdown.trigger();
    proxy.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_upstream_connections_are_pooled() {
    let backend = common::start_mock_backend("ok").await;
    let proxy = start_proxy(config(&backend.url(), None)).await;
    let client = client();

    for _ in 0..5 {
        let res = client.post(proxy.url("/submit")).body("payload").send().await.unwrap();
        assert_eq!(res.status(), 200);
    }
    assert_eq!(backend.requests(), 5);
    assert_eq!(backend.connections(), 1);

    let stats = proxy.state.proxy().pool_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].key, backend.addr.to_string());

    proxy.shutdown.trigger();
    proxy.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_upstream_error_status_is_passed_through() {
    let backend = common::start_programmable_backend(|_| async { (503, "busy".to_string()) }).await;
    let proxy = start_proxy(config(&backend.url(), None)).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "busy");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let proxy = start_proxy(config(&dead, None)).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 504);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_reload_switches_main_pool() {
    let old = common::start_mock_backend("old").await;
    let new = common::start_mock_backend("new").await;
    let proxy = start_proxy(config(&old.url(), None)).await;
    let client = client();

    assert_eq!(client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap(), "old");

    proxy.updates.send(config(&new.url(), None)).unwrap();
    let mut body = String::new();
    for _ in 0..40 {
        body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
        if body == "new" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(body, "new");

    // The old upstream's pool survives the reload.
    let keys: Vec<String> = proxy.state.proxy().pool_stats().into_iter().map(|s| s.key).collect();
    assert!(keys.contains(&old.addr.to_string()));
    assert!(keys.contains(&new.addr.to_string()));

    // An invalid update is rejected and the current generation keeps serving.
    proxy.updates.send(ProxyConfig::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap(), "new");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_admin_endpoints_require_key() {
    let backend = common::start_mock_backend("ok").await;
    let proxy = start_proxy(config(&backend.url(), None)).await;
    client().get(proxy.url("/")).send().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = listener.local_addr().unwrap();
    let app = setup_admin_router(proxy.state.clone(), "secret");
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = client();
    let res = client.get(format!("http://{admin_addr}/admin/pools")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("http://{admin_addr}/admin/pools"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let pools: serde_json::Value = res.json().await.unwrap();
    assert_eq!(pools[0]["key"], backend.addr.to_string());
    assert_eq!(pools[0]["live"], 1);

    let res = client
        .get(format!("http://{admin_addr}/admin/status"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    let status: serde_json::Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["proxy"]["main_pool"]["name"], "proxy#proxy#main");

    proxy.shutdown.trigger();
}
