//! HTTP polling API used by game servers.

pub mod error;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::discord::ConnectionState;
use crate::relay::{OutboundRelay, TenantRegistry};

pub use routes::create_router;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TenantRegistry>,
    pub relay: Arc<OutboundRelay>,
    pub connection: ConnectionState,
}
