//! # oncall-stub -- In-memory schedule API server
//!
//! Serves the `/api/v2/schedules` surface `oncall-client` talks to, backed
//! by DashMap storage with no persistence. It rewrites stored values the
//! way the production service does, which is what the engine's drift
//! normalizer is tested against, and can be told to fail specific
//! operations with chosen HTTP statuses.

pub mod routes;
pub mod store;

pub use routes::router;
pub use store::AppState;

/// Default listen port of the standalone binary.
pub const DEFAULT_PORT: u16 = 8095;
