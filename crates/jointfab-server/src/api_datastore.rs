//! Membership datastore API handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jointfab_datastore::{AdminRecord, DatastoreError, MemberNode};
use jointfab_types::{AccessEntry, FabricIndex, GroupKeySet, NodeId, VendorId};
use serde::{Deserialize, Serialize};

use crate::api::{decode_base64, ApiError};
use crate::{with_node, AppState};

#[derive(Debug, Deserialize)]
pub struct AddNodeBody {
    pub fabric_index: FabricIndex,
    pub node_id: NodeId,
    #[serde(default)]
    pub friendly_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FriendlyNameBody {
    pub friendly_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachKeySetBody {
    pub group_key_set_id: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AclCreatedResponse {
    pub list_id: u16,
}

/// Outcome of a refresh cycle. Entries whose push failed stay pending and
/// are retried by the next refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub committed: bool,
    pub pending: usize,
}

/// Handler for `GET /api/datastore/nodes`.
pub async fn list_nodes_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<MemberNode>>, ApiError> {
    with_node(&state, |node| Ok(Json(node.services.datastore.nodes().to_vec()))).await
}

/// Handler for `POST /api/datastore/nodes`.
pub async fn add_node_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<AddNodeBody>,
) -> Result<(StatusCode, Json<MemberNode>), ApiError> {
    with_node(&state, move |node| {
        let datastore = &mut node.services.datastore;
        datastore.add_pending_node(body.fabric_index, body.node_id, &body.friendly_name)?;
        let created = datastore
            .node(body.node_id)
            .cloned()
            .ok_or_else(|| ApiError::InternalServerError("added node not found".to_string()))?;
        Ok((StatusCode::CREATED, Json(created)))
    })
    .await
}

/// Handler for `PATCH /api/datastore/nodes/{nodeId}`.
pub async fn update_node_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
    Json(body): Json<FriendlyNameBody>,
) -> Result<Json<MemberNode>, ApiError> {
    let node_id = NodeId(node_id);
    with_node(&state, move |node| {
        let datastore = &mut node.services.datastore;
        datastore.update_node(node_id, &body.friendly_name)?;
        let updated = datastore
            .node(node_id)
            .cloned()
            .ok_or(DatastoreError::NodeNotFound(node_id))?;
        Ok(Json(updated))
    })
    .await
}

/// Handler for `DELETE /api/datastore/nodes/{nodeId}`.
pub async fn remove_node_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
) -> Result<Json<MemberNode>, ApiError> {
    with_node(&state, move |node| {
        Ok(Json(node.services.datastore.remove_node(NodeId(node_id))?))
    })
    .await
}

/// Handler for `POST /api/datastore/nodes/{nodeId}/refresh`.
pub async fn refresh_node_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
) -> Result<Json<RefreshResponse>, ApiError> {
    with_node(&state, move |node| {
        match node.services.datastore.refresh_node(NodeId(node_id)) {
            Ok(()) => Ok(Json(RefreshResponse {
                committed: true,
                pending: 0,
            })),
            Err(DatastoreError::PushIncomplete { pending }) => Ok(Json(RefreshResponse {
                committed: false,
                pending,
            })),
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Handler for `POST /api/datastore/nodes/{nodeId}/key-sets`.
pub async fn attach_key_set_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
    Json(body): Json<AttachKeySetBody>,
) -> Result<StatusCode, ApiError> {
    with_node(&state, move |node| {
        node.services
            .datastore
            .add_key_set_to_node(NodeId(node_id), body.group_key_set_id)?;
        Ok(StatusCode::CREATED)
    })
    .await
}

/// Handler for `POST /api/datastore/nodes/{nodeId}/acl`.
pub async fn attach_acl_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
    Json(entry): Json<AccessEntry>,
) -> Result<(StatusCode, Json<AclCreatedResponse>), ApiError> {
    with_node(&state, move |node| {
        let list_id = node
            .services
            .datastore
            .add_acl_to_node(NodeId(node_id), entry)?;
        Ok((StatusCode::CREATED, Json(AclCreatedResponse { list_id })))
    })
    .await
}

/// Handler for `GET /api/datastore/key-sets`.
pub async fn list_key_sets_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<GroupKeySet>>, ApiError> {
    with_node(&state, |node| {
        Ok(Json(node.services.datastore.group_key_sets().to_vec()))
    })
    .await
}

/// Handler for `POST /api/datastore/key-sets`.
pub async fn add_key_set_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(key_set): Json<GroupKeySet>,
) -> Result<StatusCode, ApiError> {
    with_node(&state, move |node| {
        node.services.datastore.add_group_key_set_entry(key_set)?;
        Ok(StatusCode::CREATED)
    })
    .await
}

/// Handler for `PUT /api/datastore/key-sets/{keySetId}`.
///
/// A changed key set is pushed to every member node referencing it. Nodes
/// whose push failed stay pending; the response reports how many entries.
pub async fn update_key_set_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key_set_id): Path<u16>,
    Json(key_set): Json<GroupKeySet>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if key_set.group_key_set_id != key_set_id {
        return Err(ApiError::BadRequest(format!(
            "body key set id {} does not match path {}",
            key_set.group_key_set_id, key_set_id
        )));
    }
    with_node(&state, move |node| {
        match node.services.datastore.update_group_key_set_entry(key_set) {
            Ok(()) => Ok(Json(RefreshResponse {
                committed: true,
                pending: 0,
            })),
            Err(DatastoreError::PushIncomplete { pending }) => Ok(Json(RefreshResponse {
                committed: false,
                pending,
            })),
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Handler for `DELETE /api/datastore/key-sets/{keySetId}`.
pub async fn remove_key_set_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key_set_id): Path<u16>,
) -> Result<Json<GroupKeySet>, ApiError> {
    with_node(&state, move |node| {
        Ok(Json(
            node.services
                .datastore
                .remove_group_key_set_entry(key_set_id)?,
        ))
    })
    .await
}

/// An administrator record with its certificate base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminView {
    pub node_id: NodeId,
    pub friendly_name: String,
    pub vendor_id: VendorId,
    pub icac: String,
}

impl From<&AdminRecord> for AdminView {
    fn from(record: &AdminRecord) -> Self {
        Self {
            node_id: record.node_id,
            friendly_name: record.friendly_name.clone(),
            vendor_id: record.vendor_id,
            icac: STANDARD.encode(&record.icac),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddAdminBody {
    pub node_id: NodeId,
    #[serde(default)]
    pub friendly_name: String,
    pub vendor_id: VendorId,
    /// Base64 intermediate certificate.
    pub icac: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminBody {
    pub friendly_name: String,
    /// Base64 intermediate certificate.
    pub icac: String,
}

/// Handler for `GET /api/datastore/admins`.
pub async fn list_admins_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<AdminView>>, ApiError> {
    with_node(&state, |node| {
        Ok(Json(
            node.services
                .datastore
                .admins()
                .iter()
                .map(AdminView::from)
                .collect(),
        ))
    })
    .await
}

/// Handler for `POST /api/datastore/admins`.
pub async fn add_admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<AddAdminBody>,
) -> Result<(StatusCode, Json<AdminView>), ApiError> {
    let icac = decode_base64("icac", &body.icac)?;
    with_node(&state, move |node| {
        let record = AdminRecord::new(body.node_id, &body.friendly_name, body.vendor_id, icac);
        let view = AdminView::from(&record);
        node.services.datastore.add_admin(record)?;
        Ok((StatusCode::CREATED, Json(view)))
    })
    .await
}

/// Handler for `PATCH /api/datastore/admins/{nodeId}`.
pub async fn update_admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
    Json(body): Json<UpdateAdminBody>,
) -> Result<Json<AdminView>, ApiError> {
    let icac = decode_base64("icac", &body.icac)?;
    let node_id = NodeId(node_id);
    with_node(&state, move |node| {
        let datastore = &mut node.services.datastore;
        datastore.update_admin(node_id, &body.friendly_name, icac)?;
        let record = datastore
            .admin(node_id)
            .ok_or(DatastoreError::AdminNotFound(node_id))?;
        Ok(Json(AdminView::from(record)))
    })
    .await
}

/// Handler for `DELETE /api/datastore/admins/{nodeId}`.
pub async fn remove_admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(node_id): Path<u64>,
) -> Result<Json<AdminView>, ApiError> {
    with_node(&state, move |node| {
        let removed = node.services.datastore.remove_admin(NodeId(node_id))?;
        Ok(Json(AdminView::from(&removed)))
    })
    .await
}
