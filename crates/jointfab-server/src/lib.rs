//! Joint fabric node server library logic.

pub mod api;
pub mod api_datastore;
pub mod background;
pub mod config;
pub mod middleware;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use jointfab_access::{AccessControl, GroupKeyStore};
use jointfab_admin::{
    Advertiser, AdvertiserListener, CommissioningWindowManager, JointFabricAdministrator,
    NodeServices,
};
use jointfab_certs::CredentialIssuer;
use jointfab_datastore::{Datastore, NoopConfigurator};
use jointfab_fabric::FabricTable;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::api::ApiError;
use crate::config::Config;

/// The coordinator and every service it operates on.
pub struct NodeState {
    pub administrator: JointFabricAdministrator,
    pub services: NodeServices,
}

impl NodeState {
    /// Wires a node from configuration. The datastore restarts advertising
    /// whenever its member list changes.
    pub fn from_config(
        config: &Config,
        fabrics: FabricTable,
        issuer: Box<dyn CredentialIssuer>,
        advertiser: Arc<dyn Advertiser>,
    ) -> Self {
        let mut services = NodeServices::new(fabrics, advertiser.clone());
        services.access_control = AccessControl::new(config.access.max_entries_per_fabric);
        services.group_keys = GroupKeyStore::default();
        services.commissioning_window = CommissioningWindowManager::new(
            Duration::from_secs(config.commissioning.min_timeout_secs),
            Duration::from_secs(config.commissioning.max_timeout_secs),
        );
        services.datastore = Datastore::new(config.datastore.capacity, Box::new(NoopConfigurator));
        services
            .datastore
            .add_listener(Arc::new(AdvertiserListener::new(advertiser)));

        let mut administrator = JointFabricAdministrator::new()
            .with_issuer(issuer)
            .with_fail_safe_timeout(Duration::from_secs(config.fabric.fail_safe_timeout_secs));
        if let Some(index) = config.fabric.ecosystem_fabric_index {
            administrator = administrator.with_ecosystem_fabric_index(index);
        }
        if config.fabric.administrator_fabric_index.is_some() {
            administrator.set_administrator_fabric_index(config.fabric.administrator_fabric_index);
        }

        Self {
            administrator,
            services,
        }
    }
}

/// Application state shared across all request handlers.
///
/// Node state sits behind one `std::sync::Mutex`, so commands run one at a
/// time. Handlers take the lock only inside `spawn_blocking` and never hold
/// it across an `.await`.
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Mutex<NodeState>>,
}

impl AppState {
    pub fn new(node: NodeState) -> Self {
        Self {
            node: Arc::new(Mutex::new(node)),
        }
    }
}

/// Runs `f` against the locked node state on the blocking pool.
pub(crate) async fn with_node<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut NodeState) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let node = state.node.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = node
            .lock()
            .map_err(|_| ApiError::InternalServerError("node state lock poisoned".to_string()))?;
        f(&mut *guard)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

/// Maximum request body size (64 KiB). Certificates and keys are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/api/pki/authority-csr", post(api::authority_csr_handler))
        .route("/api/pki/authority-signing", post(api::authority_signing_handler))
        .route("/api/admin/admit", post(api::admit_handler))
        .route(
            "/api/admin/commissioning-window",
            post(api::commissioning_window_handler),
        )
        .layer(axum::middleware::from_fn(middleware::session_middleware));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/admin/administrator-fabric-index",
            get(api::get_administrator_fabric_index_handler)
                .put(api::set_administrator_fabric_index_handler),
        )
        .route("/api/fabrics", get(api::list_fabrics_handler))
        .route(
            "/api/datastore/nodes",
            get(api_datastore::list_nodes_handler).post(api_datastore::add_node_handler),
        )
        .route(
            "/api/datastore/nodes/{nodeId}",
            patch(api_datastore::update_node_handler).delete(api_datastore::remove_node_handler),
        )
        .route(
            "/api/datastore/nodes/{nodeId}/refresh",
            post(api_datastore::refresh_node_handler),
        )
        .route(
            "/api/datastore/nodes/{nodeId}/key-sets",
            post(api_datastore::attach_key_set_handler),
        )
        .route(
            "/api/datastore/nodes/{nodeId}/acl",
            post(api_datastore::attach_acl_handler),
        )
        .route(
            "/api/datastore/key-sets",
            get(api_datastore::list_key_sets_handler).post(api_datastore::add_key_set_handler),
        )
        .route(
            "/api/datastore/key-sets/{keySetId}",
            put(api_datastore::update_key_set_handler)
                .delete(api_datastore::remove_key_set_handler),
        )
        .route(
            "/api/datastore/admins",
            get(api_datastore::list_admins_handler).post(api_datastore::add_admin_handler),
        )
        .route(
            "/api/datastore/admins/{nodeId}",
            patch(api_datastore::update_admin_handler).delete(api_datastore::remove_admin_handler),
        )
        .merge(session_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
