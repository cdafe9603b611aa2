//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                  GET /tiles/{z}/{x}/{y}.pbf                     │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐   │
//! │  │         handlers         │  │           routes           │   │
//! │  │ (requests, status codes) │  │ (CORS, gzip, tracing)      │   │
//! │  └──────────────────────────┘  └────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, index_handler, tile_handler, AppState, ErrorResponse, HandlerError,
    HealthResponse, InfoResponse, TilePathParams, TileQueryParams, MVT_CONTENT_TYPE,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE};
