//! Test utilities for integration tests.
//!
//! This module provides a fake spatial engine with call-count
//! instrumentation, plus helpers that wire it into a pool, a tile service
//! and a router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use mvt_streamer::engine::{
    ConnectionManager, FeatureLayout, QueryOrchestrator, SpatialConnection, TileParams, TileQuery,
};
use mvt_streamer::error::EngineError;
use mvt_streamer::pool::ConnectionPool;
use mvt_streamer::server::{create_router, RouterConfig};
use mvt_streamer::tile::{TileService, ZoomRange};

// =============================================================================
// Fake Engine
// =============================================================================

/// State shared by every connection of one fake engine.
#[derive(Default)]
pub struct EngineState {
    /// Tiles (z, x, y) that contain features
    populated: HashSet<(i32, i32, i32)>,

    /// Number of `fetch_tile` calls
    pub fetches: AtomicUsize,

    /// Number of `ping` calls
    pub pings: AtomicUsize,

    /// Connections opened / closed
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,

    /// Fail every query while set
    pub failing: AtomicBool,

    /// Artificial query latency in milliseconds
    pub delay_ms: AtomicU64,

    /// Queries currently running, and the highest value seen
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl EngineState {
    /// An engine where exactly the given tiles have features.
    pub fn with_tiles(tiles: &[(i32, i32, i32)]) -> Arc<Self> {
        Arc::new(Self {
            populated: tiles.iter().copied().collect(),
            ..Self::default()
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// Deterministic payload for a populated tile.
pub fn payload_for(z: i32, x: i32, y: i32) -> Vec<u8> {
    // Layer tag followed by the coordinate, repeated so the body is large
    // enough for the compression layer to bother with
    let mut data = vec![0x1A];
    for _ in 0..8 {
        data.extend_from_slice(format!("cadastre/{}/{}/{};", z, x, y).as_bytes());
    }
    data
}

/// A fake engine connection.
pub struct FakeConnection {
    state: Arc<EngineState>,
}

#[async_trait]
impl SpatialConnection for FakeConnection {
    async fn fetch_tile(
        &mut self,
        _query: &TileQuery,
        params: &TileParams,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let state = &self.state;
        state.fetches.fetch_add(1, Ordering::SeqCst);

        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if state.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Query("canceling statement due to statement timeout".into()));
        }

        let key = (params.z, params.x, params.y);
        if state.populated.contains(&key) {
            Ok(Some(payload_for(params.z, params.x, params.y)))
        } else {
            Ok(None)
        }
    }

    async fn ping(&mut self) -> Result<(), EngineError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Connection("server closed the connection".into()));
        }
        Ok(())
    }

    async fn close(self) -> Result<(), EngineError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection manager for the fake engine.
pub struct FakeManager {
    pub state: Arc<EngineState>,

    /// Fail the capability check with this message
    pub check_failure: Option<String>,
}

impl FakeManager {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self {
            state,
            check_failure: None,
        }
    }
}

#[async_trait]
impl ConnectionManager for FakeManager {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, EngineError> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
        })
    }

    async fn check(&self, _conn: &mut FakeConnection) -> Result<(), EngineError> {
        match &self.check_failure {
            Some(msg) => Err(EngineError::Capability(msg.clone())),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Service and Router Helpers
// =============================================================================

/// Tiles with features in the default fixture (downtown Mexico City).
pub const POPULATED: &[(i32, i32, i32)] = &[(14, 3680, 7300), (14, 3681, 7300), (16, 14720, 29200)];

/// Default cache version used by the fixtures.
pub const TEST_VERSION: &str = "test-v1";

/// Build a tile service over a fresh fake engine.
pub async fn fake_service(pool_size: usize) -> (Arc<TileService<FakeConnection>>, Arc<EngineState>) {
    let state = EngineState::with_tiles(POPULATED);
    let service = fake_service_with(pool_size, Arc::clone(&state), |s| s).await;
    (service, state)
}

/// Build a tile service over the given engine, letting the caller adjust it.
pub async fn fake_service_with(
    pool_size: usize,
    state: Arc<EngineState>,
    customize: impl FnOnce(TileService<FakeConnection>) -> TileService<FakeConnection>,
) -> Arc<TileService<FakeConnection>> {
    let manager = FakeManager::new(state);
    let pool = ConnectionPool::initialize(pool_size, &manager)
        .await
        .expect("fake pool should initialize");

    let service = TileService::new(
        pool,
        QueryOrchestrator::new(&FeatureLayout::default()),
        ZoomRange::default(),
        TEST_VERSION,
    );

    Arc::new(customize(service))
}

/// Build a router over a fake engine, without request tracing.
pub async fn fake_router(pool_size: usize) -> (Router, Arc<TileService<FakeConnection>>, Arc<EngineState>) {
    let (service, state) = fake_service(pool_size).await;
    let router = create_router(Arc::clone(&service), RouterConfig::new().with_tracing(false));
    (router, service, state)
}

/// Send a GET request through a clone of the router.
pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}
