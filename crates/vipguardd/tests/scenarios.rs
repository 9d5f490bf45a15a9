//! End-to-end scenarios over real loopback HTTP.
//!
//! The container runtime is the in-memory fake; everything else (probes,
//! config export, fan-out, secondary pull) goes through the real hyper
//! client and axum router.

use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use tower::ServiceExt;

use vipguard_api::{ApiState, build_router};
use vipguard_arp::{Announcer, ArpError};
use vipguard_core::http::Endpoint;
use vipguard_core::{MacAddress, Role, VipClaim};
use vipguard_docker::ProcessMonitor;
use vipguard_docker::testing::FakeRuntime;
use vipguard_health::{FailoverCoordinator, HttpHealthProbe, TickOutcome};
use vipguard_rollout::{
    ConfigChangeDetector, ConfigWatcher, HttpNotifier, RolloutOutcome, RolloutSequencer,
    SecondaryNotifier, SecondarySync,
};

// ── Helpers ────────────────────────────────────────────────────

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::parse(&format!("http://{addr}")).unwrap()
}

fn touch(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

#[derive(Default)]
struct CountingAnnouncer {
    sent: AtomicUsize,
}

impl Announcer for CountingAnnouncer {
    fn announce(&self, _claim: &VipClaim) -> Result<(), ArpError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn claim() -> VipClaim {
    VipClaim {
        address: Ipv4Addr::new(10, 0, 0, 100),
        mac: MacAddress([0x02, 0x42, 0xac, 0x11, 0x00, 0x02]),
        interface: "eth0".to_string(),
    }
}

/// A secondary that only counts `POST /update-config` calls.
async fn counting_secondary() -> (Endpoint, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/update-config",
            post(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }),
        )
        .with_state(hits.clone());
    (endpoint(serve(router).await), hits)
}

fn monitor(runtime: &Arc<FakeRuntime>) -> ProcessMonitor {
    ProcessMonitor::new(runtime.clone(), "traefik").with_poll_interval(Duration::from_millis(20))
}

// ── Scenario A: healthy primary, no announcements ──────────────

#[tokio::test]
async fn scenario_a_healthy_primary_never_announces() {
    let primary = serve(Router::new().route("/health", get(|| async { StatusCode::OK }))).await;
    let announcer = Arc::new(CountingAnnouncer::default());
    let coordinator = FailoverCoordinator::new(
        Role::Secondary,
        Arc::new(HttpHealthProbe::new(endpoint(primary), Duration::from_secs(2))),
        announcer.clone(),
        claim(),
        Duration::from_secs(10),
    );

    for _ in 0..3 {
        assert_eq!(coordinator.tick().await, TickOutcome::Standby);
    }
    assert_eq!(announcer.sent.load(Ordering::SeqCst), 0);
}

// ── Scenario B: primary times out twice ────────────────────────

#[tokio::test]
async fn scenario_b_two_timeouts_two_announcements() {
    let primary = serve(Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    ))
    .await;
    let announcer = Arc::new(CountingAnnouncer::default());
    let coordinator = FailoverCoordinator::new(
        Role::Secondary,
        Arc::new(HttpHealthProbe::new(endpoint(primary), Duration::from_millis(200))),
        announcer.clone(),
        claim(),
        Duration::from_secs(10),
    );

    assert_eq!(coordinator.tick().await, TickOutcome::Claiming { announced: true });
    assert_eq!(coordinator.tick().await, TickOutcome::Claiming { announced: true });
    assert_eq!(announcer.sent.load(Ordering::SeqCst), 2);
}

// ── Scenario C: change detected, healthy rollout, N pushes ─────

#[tokio::test]
async fn scenario_c_change_rolls_out_to_every_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let dynamic = dir.path().join("dynamic.yml");
    std::fs::write(&dynamic, "http: {}\n").unwrap();
    touch(&dynamic, 1_000);

    let mut secondaries = Vec::new();
    let mut counters = Vec::new();
    for _ in 0..3 {
        let (endpoint, hits) = counting_secondary().await;
        secondaries.push(endpoint);
        counters.push(hits);
    }

    let runtime = Arc::new(FakeRuntime::with_proxy());
    let sequencer = Arc::new(RolloutSequencer::new(
        monitor(&runtime),
        Arc::new(HttpNotifier::new(Duration::from_secs(5))),
        secondaries,
        Duration::from_secs(60),
    ));
    let watcher = ConfigWatcher::new(dir.path(), &["yml".to_string(), "yaml".to_string()]);
    let mut detector = ConfigChangeDetector::new(watcher, sequencer);

    // t0: baseline only.
    assert!(detector.tick().await.is_none());
    assert_eq!(runtime.restarts(), 0);

    // t1 > t0: one rollout.
    std::fs::write(&dynamic, "http:\n  routers: {}\n").unwrap();
    touch(&dynamic, 2_000);
    let outcome = detector.tick().await.unwrap();

    let RolloutOutcome::Propagated { results } = outcome else {
        panic!("expected propagation");
    };
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.ok));
    assert_eq!(runtime.restarts(), 1);
    for hits in &counters {
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // Nothing new: no second rollout.
    assert!(detector.tick().await.is_none());
}

// ── Scenario D: restart never healthy, zero pushes ─────────────

#[tokio::test]
async fn scenario_d_unhealthy_restart_pushes_nothing() {
    let (secondary, hits) = counting_secondary().await;
    let runtime = Arc::new(FakeRuntime::with_proxy().always("starting"));
    let sequencer = RolloutSequencer::new(
        monitor(&runtime),
        Arc::new(HttpNotifier::new(Duration::from_secs(5))),
        vec![secondary],
        Duration::from_millis(300),
    );

    let outcome = sequencer
        .execute(&[std::path::PathBuf::from("dynamic.yml")])
        .await;

    assert_eq!(outcome, RolloutOutcome::Unhealthy);
    assert_eq!(runtime.restarts(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// ── Primary → secondary sync over loopback ─────────────────────

fn api_state(role: Role, primary: Option<Endpoint>, runtime: &Arc<FakeRuntime>, dir: &Path) -> ApiState {
    let monitor = monitor(runtime);
    let sync = SecondarySync::new(
        role,
        primary,
        monitor.clone(),
        dir.join("dynamic.yml"),
        dir.join("traefik.yml"),
    )
    .with_request_timeout(Duration::from_secs(2))
    .with_health_timeout(Duration::from_secs(2));
    ApiState {
        role,
        monitor,
        dynamic_path: dir.join("dynamic.yml"),
        static_path: dir.join("traefik.yml"),
        sync: Arc::new(sync),
    }
}

#[tokio::test]
async fn rollout_converges_secondary_files() {
    let primary_dir = tempfile::tempdir().unwrap();
    let secondary_dir = tempfile::tempdir().unwrap();
    std::fs::write(primary_dir.path().join("dynamic.yml"), "http:\n  routers:\n    web: {}\n").unwrap();
    std::fs::write(primary_dir.path().join("traefik.yml"), "entryPoints:\n  web: {}\n").unwrap();
    std::fs::write(secondary_dir.path().join("dynamic.yml"), "stale\n").unwrap();

    let primary_runtime = Arc::new(FakeRuntime::with_proxy());
    let secondary_runtime = Arc::new(FakeRuntime::with_proxy());

    let primary_addr = serve(build_router(api_state(
        Role::Primary,
        None,
        &primary_runtime,
        primary_dir.path(),
    )))
    .await;
    let secondary_addr = serve(build_router(api_state(
        Role::Secondary,
        Some(endpoint(primary_addr)),
        &secondary_runtime,
        secondary_dir.path(),
    )))
    .await;

    let sequencer = RolloutSequencer::new(
        monitor(&primary_runtime),
        Arc::new(HttpNotifier::new(Duration::from_secs(10))),
        vec![endpoint(secondary_addr)],
        Duration::from_secs(2),
    );
    let outcome = sequencer
        .execute(&[primary_dir.path().join("dynamic.yml")])
        .await;

    let RolloutOutcome::Propagated { results } = outcome else {
        panic!("expected propagation");
    };
    assert!(results[0].ok, "secondary failed: {:?}", results[0].error);
    for file in ["dynamic.yml", "traefik.yml"] {
        assert_eq!(
            std::fs::read_to_string(secondary_dir.path().join(file)).unwrap(),
            std::fs::read_to_string(primary_dir.path().join(file)).unwrap(),
        );
    }
    assert_eq!(primary_runtime.restarts(), 1);
    assert_eq!(secondary_runtime.restarts(), 1);
}

#[tokio::test]
async fn secondary_refuses_to_pull_from_unhealthy_primary() {
    let primary_dir = tempfile::tempdir().unwrap();
    let secondary_dir = tempfile::tempdir().unwrap();
    std::fs::write(primary_dir.path().join("dynamic.yml"), "new\n").unwrap();
    std::fs::write(primary_dir.path().join("traefik.yml"), "new\n").unwrap();

    let primary_runtime = Arc::new(FakeRuntime::with_proxy().always("unhealthy"));
    let secondary_runtime = Arc::new(FakeRuntime::with_proxy());
    let primary_addr = serve(build_router(api_state(
        Role::Primary,
        None,
        &primary_runtime,
        primary_dir.path(),
    )))
    .await;
    let secondary_addr = serve(build_router(api_state(
        Role::Secondary,
        Some(endpoint(primary_addr)),
        &secondary_runtime,
        secondary_dir.path(),
    )))
    .await;

    let resp = vipguard_core::http::post(
        &endpoint(secondary_addr),
        "/update-config",
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.text().contains("not healthy"));
    assert!(!secondary_dir.path().join("dynamic.yml").exists());
    assert_eq!(secondary_runtime.restarts(), 0);
}

#[tokio::test]
async fn secondary_sync_survives_push_timeout() {
    let primary_dir = tempfile::tempdir().unwrap();
    let secondary_dir = tempfile::tempdir().unwrap();
    std::fs::write(primary_dir.path().join("dynamic.yml"), "http: {}\n").unwrap();
    std::fs::write(primary_dir.path().join("traefik.yml"), "entryPoints: {}\n").unwrap();

    let primary_runtime = Arc::new(FakeRuntime::with_proxy());
    // ~1s of "starting" at a 20ms poll, then healthy.
    let mut script = vec![Some("starting"); 50];
    script.push(Some("healthy"));
    let secondary_runtime = Arc::new(FakeRuntime::with_proxy().health_sequence(script));

    let primary_addr = serve(build_router(api_state(
        Role::Primary,
        None,
        &primary_runtime,
        primary_dir.path(),
    )))
    .await;
    let secondary_addr = serve(build_router(api_state(
        Role::Secondary,
        Some(endpoint(primary_addr)),
        &secondary_runtime,
        secondary_dir.path(),
    )))
    .await;

    let notifier = HttpNotifier::new(Duration::from_millis(300));
    let err = notifier.notify(&endpoint(secondary_addr)).await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "unexpected: {err}");
    let at_timeout = secondary_runtime.inspections();
    assert!(at_timeout < 51);

    // The caller is gone; the secondary still waits for its proxy.
    tokio::time::timeout(Duration::from_secs(3), async {
        while secondary_runtime.inspections() < 51 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("secondary stopped polling its proxy after the push timed out");

    assert_eq!(secondary_runtime.restarts(), 1);
    assert_eq!(
        std::fs::read_to_string(secondary_dir.path().join("traefik.yml")).unwrap(),
        "entryPoints: {}\n"
    );
}

#[tokio::test]
async fn health_reports_missing_proxy_as_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::empty());
    let router = build_router(api_state(Role::Secondary, None, &runtime, dir.path()));

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
