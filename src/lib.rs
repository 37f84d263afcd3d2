//! Order lifecycle synchronization engine.
//!
//! Keeps a shared, server-authoritative `Order` collection consistent
//! across independently polling display surfaces (kitchen, waiter,
//! delivery, order management): read-through resource caching with
//! explicit invalidation, a central status-transition table branching on
//! order type, optimistic mutation with rollback on failure, debounced
//! refresh, and per-surface polling with clean teardown.
//!
//! The engine never computes server-owned fields and never merges
//! concurrent edits; conflicts resolve as last-write-wins with the server
//! as the source of truth.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cache;
mod coordinator;
mod engine;
mod error;
mod models;
mod poller;
mod projection;
mod routes;
mod transitions;

pub use api::{normalize_base_url, HttpBackend, RemoteBackend};
pub use cache::ResourceCache;
pub use coordinator::{FetchCoordinator, DEBOUNCE_WINDOW};
pub use engine::{EngineEvent, OrderEngine};
pub use error::SyncError;
pub use models::{
    decode_order, decode_orders, Fulfillment, NewOrderItem, Order, OrderId, OrderItem,
    OrderPatch, OrderStatus, OrderType,
};
pub use poller::{PollingScheduler, DEFAULT_POLL_PERIOD};
pub use projection::{
    delivery_lanes, kitchen_queue, kitchen_stats, management_view, project, unique_tables,
    waiter_lanes, DeliveryLanes, KitchenStats, OrderFilter, Surface, WaiterLanes,
};
pub use routes::Routes;
pub use transitions::{allowed_transitions, is_revert, is_terminal, validate_transition};

/// Connection settings for one tenant system on the admin backend.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Admin backend base URL; scheme and trailing `/api` are normalised.
    pub base_url: String,
    /// Sent as `X-POS-API-Key` on every request.
    pub api_key: String,
    /// Resource domain, e.g. `restaurant`.
    pub domain: String,
    /// Tenant system id scoping every path.
    pub system_id: String,
}

/// Build an engine over HTTP using the process-wide shared cache.
pub fn connect(config: &SyncConfig) -> Result<OrderEngine<HttpBackend>, SyncError> {
    let backend = HttpBackend::new(config)?;
    let routes = Routes::new(&config.domain, &config.system_id);
    info!(
        base_url = backend.base_url(),
        domain = %config.domain,
        system_id = %config.system_id,
        "order sync engine connected"
    );
    Ok(OrderEngine::new(backend, ResourceCache::shared(), routes))
}

/// Install the default tracing subscriber: `RUST_LOG` when set, otherwise
/// `info` globally with debug output for this crate. Safe to call when a
/// subscriber is already installed.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dinesync=debug"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .try_init();
}
