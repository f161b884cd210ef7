//! Coordinator and fabric API handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jointfab_admin::{
    truncate_utf8, AdmissionResponse, AdmitRequest, AuthoritySigningRequest, CommandContext,
    JointWindowParams, MAX_DEBUG_TEXT_LENGTH,
};
use jointfab_datastore::DatastoreError;
use jointfab_types::{
    CommissioningWindowStatus, FabricId, FabricIndex, ImStatus, NodeId, VendorId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::middleware::SessionContext;
use crate::{with_node, AppState};

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InsufficientStorage(msg) => (StatusCode::INSUFFICIENT_STORAGE, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DatastoreError> for ApiError {
    fn from(e: DatastoreError) -> Self {
        let message = e.to_string();
        if e.is_not_found() {
            return ApiError::NotFound(message);
        }
        if e.is_conflict() {
            return ApiError::Conflict(message);
        }
        match e {
            DatastoreError::ResourceExhausted { .. } => ApiError::InsufficientStorage(message),
            DatastoreError::InvalidArgument(_) => ApiError::BadRequest(message),
            _ => ApiError::InternalServerError(message),
        }
    }
}

pub(crate) fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    STANDARD
        .decode(value)
        .map_err(|e| ApiError::BadRequest(format!("{field} is not valid base64: {e}")))
}

/// Response body for `POST /api/pki/authority-csr`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorityCsrResponse {
    pub status: ImStatus,
    /// Base64 signing request, on success.
    pub csr: Option<String>,
    pub debug_text: Option<String>,
}

/// Handler for `POST /api/pki/authority-csr`.
///
/// The protocol status is carried in the body; the HTTP status is 200
/// whenever the command ran.
pub async fn authority_csr_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(_session)): Extension<SessionContext>,
) -> Result<Json<AuthorityCsrResponse>, ApiError> {
    with_node(&state, |node| {
        let response = match node.administrator.issue_authority_csr() {
            Ok(csr) => AuthorityCsrResponse {
                status: ImStatus::Success,
                csr: Some(STANDARD.encode(csr)),
                debug_text: None,
            },
            Err(e) => {
                tracing::warn!(status = %e.im_status(), error = %e, "authority CSR not issued");
                AuthorityCsrResponse {
                    status: e.im_status(),
                    csr: None,
                    debug_text: Some(truncate_utf8(e.to_string(), MAX_DEBUG_TEXT_LENGTH)),
                }
            }
        };
        Ok(Json(response))
    })
    .await
}

/// Request body for `POST /api/pki/authority-signing`.
#[derive(Debug, Deserialize)]
pub struct AuthoritySigningBody {
    /// Base64 intermediate certificate signed from this node's CSR,
    /// compact encoding.
    pub icac: String,
    pub node_id: NodeId,
    pub fabric_id: FabricId,
    pub admin_vendor_id: VendorId,
    pub case_admin_subject: NodeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthoritySigningResponse {
    #[serde(flatten)]
    pub admission: AdmissionResponse,
    pub ecosystem_fabric_index: Option<FabricIndex>,
}

/// Handler for `POST /api/pki/authority-signing`: commits the operational
/// certificate signed under this node's returned intermediate.
pub async fn authority_signing_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Json(body): Json<AuthoritySigningBody>,
) -> Result<Json<AuthoritySigningResponse>, ApiError> {
    let request = AuthoritySigningRequest {
        icac: decode_base64("icac", &body.icac)?,
        node_id: body.node_id,
        fabric_id: body.fabric_id,
        admin_vendor_id: body.admin_vendor_id,
        case_admin_subject: body.case_admin_subject,
    };

    with_node(&state, move |node| {
        let mut ctx = CommandContext::new(session);
        let result = node.administrator.complete_authority_signing(
            &mut ctx,
            &mut node.services,
            &request,
        );
        Ok(Json(AuthoritySigningResponse {
            admission: AdmissionResponse::from_result(&result),
            ecosystem_fabric_index: node.administrator.ecosystem_fabric_index(),
        }))
    })
    .await
}

/// Request body for administrator admission.
#[derive(Debug, Deserialize)]
pub struct AdmitBody {
    /// Base64 intermediate certificate, compact encoding.
    pub icac: String,
    pub case_admin_subject: NodeId,
}

/// Handler for `POST /api/admin/admit`.
pub async fn admit_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Json(body): Json<AdmitBody>,
) -> Result<Json<AdmissionResponse>, ApiError> {
    let request = AdmitRequest {
        icac: decode_base64("icac", &body.icac)?,
        case_admin_subject: body.case_admin_subject,
    };

    with_node(&state, move |node| {
        let mut ctx = CommandContext::new(session);
        let result = node.administrator.admit_new_administrator(
            &mut ctx,
            &mut node.services,
            &request,
        );
        Ok(Json(AdmissionResponse::from_result(&result)))
    })
    .await
}

/// Request body for opening a joint commissioning window.
#[derive(Debug, Deserialize)]
pub struct CommissioningWindowBody {
    pub timeout_secs: u64,
    pub discriminator: u16,
    /// Base64 passcode verifier.
    pub verifier: String,
    pub iterations: u32,
    /// Base64 PBKDF salt.
    pub salt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommissioningWindowResponse {
    pub status: ImStatus,
    pub cluster_status: Option<CommissioningWindowStatus>,
    pub debug_text: Option<String>,
}

/// Handler for `POST /api/admin/commissioning-window`.
pub async fn commissioning_window_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Json(body): Json<CommissioningWindowBody>,
) -> Result<Json<CommissioningWindowResponse>, ApiError> {
    let params = JointWindowParams {
        timeout: Duration::from_secs(body.timeout_secs),
        discriminator: body.discriminator,
        verifier: decode_base64("verifier", &body.verifier)?,
        iterations: body.iterations,
        salt: decode_base64("salt", &body.salt)?,
    };

    with_node(&state, move |node| {
        let ctx = CommandContext::new(session);
        let response = match node.administrator.open_joint_commissioning_window(
            &ctx,
            &mut node.services,
            params,
            Instant::now(),
        ) {
            Ok(()) => CommissioningWindowResponse {
                status: ImStatus::Success,
                cluster_status: None,
                debug_text: None,
            },
            Err(e) => CommissioningWindowResponse {
                status: e.im_status(),
                cluster_status: e.cluster_status(),
                debug_text: Some(truncate_utf8(e.to_string(), MAX_DEBUG_TEXT_LENGTH)),
            },
        };
        Ok(Json(response))
    })
    .await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdministratorFabricIndexBody {
    pub administrator_fabric_index: Option<FabricIndex>,
}

/// Handler for `GET /api/admin/administrator-fabric-index`.
pub async fn get_administrator_fabric_index_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AdministratorFabricIndexBody>, ApiError> {
    with_node(&state, |node| {
        Ok(Json(AdministratorFabricIndexBody {
            administrator_fabric_index: node.administrator.administrator_fabric_index(),
        }))
    })
    .await
}

/// Handler for `PUT /api/admin/administrator-fabric-index`.
///
/// A non-null index must name a committed fabric.
pub async fn set_administrator_fabric_index_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<AdministratorFabricIndexBody>,
) -> Result<Json<AdministratorFabricIndexBody>, ApiError> {
    with_node(&state, move |node| {
        if let Some(index) = body.administrator_fabric_index {
            if node.services.fabrics.find_fabric_with_index(index).is_none() {
                return Err(ApiError::NotFound(format!("no fabric at index {index}")));
            }
        }
        node.administrator
            .set_administrator_fabric_index(body.administrator_fabric_index);
        Ok(Json(body))
    })
    .await
}

/// One committed fabric as listed by `GET /api/fabrics`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FabricSummary {
    pub fabric_index: FabricIndex,
    pub vendor_id: VendorId,
    pub fabric_id: FabricId,
    pub node_id: NodeId,
    /// Upper-case hex.
    pub compressed_fabric_id: String,
}

/// Handler for `GET /api/fabrics`.
pub async fn list_fabrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<FabricSummary>>, ApiError> {
    with_node(&state, |node| {
        let fabrics = node
            .services
            .fabrics
            .fabrics()
            .map(|f| FabricSummary {
                fabric_index: f.fabric_index,
                vendor_id: f.vendor_id,
                fabric_id: f.fabric_id,
                node_id: f.node_id,
                compressed_fabric_id: hex::encode_upper(f.compressed_fabric_id),
            })
            .collect();
        Ok(Json(fabrics))
    })
    .await
}
