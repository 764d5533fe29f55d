//! Integration tests for lbcore.
//!
//! These tests drive the public API end to end: configuration, dispatch,
//! live health probing against real sockets, and the metrics endpoint.

use lbcore::backend::{DispatchError, Dispatcher, RequestContext};
use lbcore::config::{Algorithm, Config, load_config, parse_config};
use lbcore::health::{
    HealthCheckSettings, HealthChecker, HealthPolicy, HealthStatus, HttpProbe, Outcome, TcpProbe,
};
use lbcore::metrics::{MetricsCollector, MetricsServer};
use lbcore::util::ShutdownSignal;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Helper to create a TCP server that accepts and drops connections.
async fn start_tcp_server() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            count.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    (addr, accepted)
}

/// Helper to create an HTTP server answering 200 or 503 depending on `up`.
async fn start_http_server(up: Arc<AtomicBool>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let up = Arc::clone(&up);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let status = if up.load(Ordering::SeqCst) {
                    "200 OK"
                } else {
                    "503 Service Unavailable"
                };
                let response =
                    format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

/// An address nobody listens on.
async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn pool_yaml(algorithm: &str, endpoints: &[(SocketAddr, u32)]) -> String {
    let mut yaml = format!("pool:\n  algorithm: {algorithm}\n  endpoints:\n");
    for (address, weight) in endpoints {
        yaml.push_str(&format!("    - address: \"{address}\"\n      weight: {weight}\n"));
    }
    yaml
}

fn fast_settings() -> HealthCheckSettings {
    HealthCheckSettings {
        interval: Duration::from_millis(50),
        timeout: Duration::from_millis(40),
        policy: HealthPolicy {
            suspect_after: 1,
            down_after: 1,
            recover_after: 2,
        },
    }
}

/// Poll until `check` holds or a second has passed.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[test]
fn test_config_file_round_trip() {
    let yaml = r#"
global:
  log_level: debug
  log_format: pretty
pool:
  algorithm: affinity
  endpoints:
    - address: "10.0.0.1:8080"
    - address: "10.0.0.2:8080"
      weight: 4
health_check:
  type: http
  path: /healthz
  interval: 5s
  timeout: 500ms
failover:
  max_retries: 2
affinity:
  virtual_nodes: 64
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config: Config = load_config(file.path()).unwrap();
    assert_eq!(config.pool.algorithm, Algorithm::Affinity);
    assert_eq!(config.pool.endpoints[1].weight, 4);
    assert_eq!(config.health_check.timeout, Duration::from_millis(500));
    assert_eq!(config.failover.max_retries, 2);
    assert!(config.failover.probe_on_failure);

    let dispatcher = Dispatcher::from_config(&config).unwrap();
    assert_eq!(dispatcher.algorithm(), Algorithm::Affinity);
    assert_eq!(dispatcher.failover().max_retries, 2);
}

#[test]
fn test_config_validation_reports_every_problem() {
    let yaml = r#"
pool:
  endpoints:
    - address: "10.0.0.1:8080"
      weight: 0
    - address: "10.0.0.1:8080"
health_check:
  interval: 1s
  timeout: 2s
"#;
    let message = parse_config(yaml).unwrap_err().to_string();
    assert!(message.contains("weight"), "{message}");
    assert!(message.contains("duplicate"), "{message}");
    assert!(message.contains("timeout"), "{message}");
}

#[test]
fn test_weighted_distribution_from_config() {
    let a: SocketAddr = "10.0.0.1:80".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:80".parse().unwrap();
    let config = parse_config(&pool_yaml("weighted", &[(a, 3), (b, 1)])).unwrap();
    let dispatcher = Dispatcher::from_config(&config).unwrap();

    let mut counts: HashMap<SocketAddr, u32> = HashMap::new();
    for _ in 0..400 {
        let id = dispatcher.select(&RequestContext::new()).unwrap();
        *counts.entry(id).or_default() += 1;
        dispatcher.report_outcome(id, Outcome::Success).unwrap();
    }

    assert_eq!(counts[&a], 300);
    assert_eq!(counts[&b], 100);
    assert_eq!(dispatcher.status().active_connections(), 0);
}

#[test]
fn test_affinity_survives_unrelated_failures() {
    let endpoints: Vec<(SocketAddr, u32)> = (1..=4)
        .map(|i| (format!("10.0.0.{i}:80").parse().unwrap(), 1))
        .collect();
    let config = parse_config(&pool_yaml("affinity", &endpoints)).unwrap();
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    let client: SocketAddr = "192.168.1.100:40000".parse().unwrap();

    let home = dispatcher
        .select(&RequestContext::from_client_addr(client))
        .unwrap();

    // Take down one endpoint that is not this client's
    let other = endpoints.iter().map(|(a, _)| *a).find(|&a| a != home).unwrap();
    dispatcher.pool().mark_health(other, HealthStatus::Down).unwrap();

    // A new connection from the same client lands on the same endpoint
    let again: SocketAddr = "192.168.1.100:40001".parse().unwrap();
    assert_eq!(
        dispatcher
            .select(&RequestContext::from_client_addr(again))
            .unwrap(),
        home
    );
}

#[tokio::test]
async fn test_concurrent_dispatch_keeps_counts_consistent() {
    let endpoints: Vec<(SocketAddr, u32)> = (1..=3)
        .map(|i| (format!("10.0.0.{i}:80").parse().unwrap(), 1))
        .collect();
    let config = parse_config(&pool_yaml("round_robin", &endpoints)).unwrap();
    let dispatcher = Arc::new(Dispatcher::from_config(&config).unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                for _ in 0..300 {
                    let id = dispatcher.select(&RequestContext::new()).unwrap();
                    tokio::task::yield_now().await;
                    dispatcher.report_outcome(id, Outcome::Success).unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let status = dispatcher.status();
    assert_eq!(status.total_selected(), 2400);
    assert_eq!(status.active_connections(), 0);
    for endpoint in status.endpoints() {
        assert_eq!(endpoint.selected, 800);
    }
}

#[tokio::test]
async fn test_health_checker_takes_dead_endpoint_out_of_rotation() {
    let (live, accepted) = start_tcp_server().await;
    let dead = dead_address().await;

    let config = parse_config(&pool_yaml("round_robin", &[(live, 1), (dead, 1)])).unwrap();
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    let pool = Arc::clone(dispatcher.pool());

    let checker = HealthChecker::new(Arc::clone(&pool), TcpProbe, fast_settings());
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(checker.run(shutdown.subscribe()));

    let pool_ref = Arc::clone(&pool);
    assert!(eventually(move || pool_ref.get(dead).unwrap().health() == HealthStatus::Down).await);
    assert_eq!(pool.get(live).unwrap().health(), HealthStatus::Healthy);
    assert!(accepted.load(Ordering::SeqCst) > 0);

    for _ in 0..20 {
        let id = dispatcher.select(&RequestContext::new()).unwrap();
        assert_eq!(id, live);
        dispatcher.report_outcome(id, Outcome::Success).unwrap();
    }

    shutdown.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_http_probe_recovery() {
    let up = Arc::new(AtomicBool::new(false));
    let addr = start_http_server(Arc::clone(&up)).await;

    let config = parse_config(&pool_yaml("least_connections", &[(addr, 1)])).unwrap();
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    let pool = Arc::clone(dispatcher.pool());

    let checker = HealthChecker::new(
        Arc::clone(&pool),
        HttpProbe::new("/healthz", 200),
        fast_settings(),
    );
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(checker.run(shutdown.subscribe()));

    let pool_ref = Arc::clone(&pool);
    assert!(eventually(move || pool_ref.get(addr).unwrap().health() == HealthStatus::Down).await);
    assert_eq!(
        dispatcher.select(&RequestContext::new()),
        Err(DispatchError::AllEndpointsDown)
    );

    up.store(true, Ordering::SeqCst);
    let pool_ref = Arc::clone(&pool);
    assert!(
        eventually(move || pool_ref.get(addr).unwrap().health() == HealthStatus::Healthy).await
    );
    assert_eq!(dispatcher.select(&RequestContext::new()).unwrap(), addr);

    shutdown.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_request_failure_triggers_fast_detection() {
    let (live, _) = start_tcp_server().await;
    let dead = dead_address().await;

    let config = parse_config(&pool_yaml("round_robin", &[(dead, 1), (live, 1)])).unwrap();
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    let pool = Arc::clone(dispatcher.pool());

    // Scheduled probes are far apart; only the trigger can catch the failure
    let mut settings = fast_settings();
    settings.interval = Duration::from_secs(3600);
    settings.timeout = Duration::from_millis(200);
    let checker = HealthChecker::new(Arc::clone(&pool), TcpProbe, settings);
    let dispatcher = dispatcher.with_passive_health(checker.passive());

    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(checker.run(shutdown.subscribe()));

    // Let the startup probe land, then reset so the test starts clean
    let pool_ref = Arc::clone(&pool);
    assert!(
        eventually(move || pool_ref.get(dead).unwrap().health() == HealthStatus::Suspect).await
    );
    pool.mark_health(dead, HealthStatus::Healthy).unwrap();

    let ctx = RequestContext::new();
    let first = dispatcher.select(&ctx).unwrap();
    assert_eq!(first, dead);
    dispatcher.report_outcome(first, Outcome::Failure).unwrap();

    let second = dispatcher.retry(&ctx, &[first]).unwrap();
    assert_eq!(second, live);
    dispatcher.report_outcome(second, Outcome::Success).unwrap();

    let pool_ref = Arc::clone(&pool);
    assert!(
        eventually(move || pool_ref.get(dead).unwrap().health() == HealthStatus::Suspect).await
    );

    shutdown.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let endpoints: [(SocketAddr, u32); 1] = [("10.0.0.1:80".parse().unwrap(), 1)];
    let config = parse_config(&pool_yaml("round_robin", &endpoints)).unwrap();
    let metrics = MetricsCollector::new();
    let dispatcher = Dispatcher::from_config(&config)
        .unwrap()
        .with_metrics(metrics.clone());
    dispatcher.select(&RequestContext::new()).unwrap();

    let server = MetricsServer::new(
        "127.0.0.1:0".parse().unwrap(),
        "/metrics".to_string(),
        metrics,
    )
    .with_pool(Arc::clone(dispatcher.pool()));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(server.serve(listener, shutdown.subscribe()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("lbcore_selections_total"));
    assert!(response.contains(r#"lbcore_active_connections{endpoint="10.0.0.1:80"} 1"#));

    shutdown.shutdown();
    handle.await.unwrap();
}

#[test]
fn test_request_contexts_get_distinct_ids() {
    let first = RequestContext::new();
    let second = RequestContext::with_client_key("10.0.0.1");

    assert_ne!(first.id(), second.id());
    for ctx in [&first, &second] {
        let id = ctx.id().as_str();
        assert!(id.starts_with("req-"));
        assert_eq!(id.len(), 20);
    }
}
