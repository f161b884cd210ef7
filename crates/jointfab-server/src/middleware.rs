use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use jointfab_access::SecureSession;
use jointfab_types::{CatValues, FabricIndex, NodeId};

pub const SESSION_TYPE_HEADER: &str = "X-Jointfab-Session";
pub const FABRIC_INDEX_HEADER: &str = "X-Jointfab-Fabric-Index";
pub const PEER_NODE_ID_HEADER: &str = "X-Jointfab-Peer-Node-Id";

/// The secure session a command arrived on, stored in request extensions.
#[derive(Clone, Debug)]
pub struct SessionContext(pub SecureSession);

/// Builds the invoking session from the transport headers.
///
/// `X-Jointfab-Session` is `case` or `pase`. CASE sessions require
/// `X-Jointfab-Fabric-Index` and `X-Jointfab-Peer-Node-Id`; a PASE session
/// may carry a fabric index it adopted earlier in commissioning.
pub async fn session_middleware(mut req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let session = session_from_headers(req.headers())?;
    req.extensions_mut().insert(SessionContext(session));
    Ok(next.run(req).await)
}

fn session_from_headers(headers: &HeaderMap) -> Result<SecureSession, StatusCode> {
    let kind = header_str(headers, SESSION_TYPE_HEADER)?.ok_or(StatusCode::UNAUTHORIZED)?;
    let fabric_index = header_str(headers, FABRIC_INDEX_HEADER)?
        .map(|v| {
            v.parse::<u8>()
                .ok()
                .and_then(FabricIndex::new)
                .ok_or(StatusCode::BAD_REQUEST)
        })
        .transpose()?;

    match kind.to_ascii_lowercase().as_str() {
        "case" => {
            let fabric_index = fabric_index.ok_or(StatusCode::UNAUTHORIZED)?;
            let peer = header_str(headers, PEER_NODE_ID_HEADER)?
                .ok_or(StatusCode::UNAUTHORIZED)
                .and_then(|v| parse_node_id(v).ok_or(StatusCode::BAD_REQUEST))?;
            Ok(SecureSession::case(fabric_index, peer, CatValues::new()))
        }
        "pase" => {
            let mut session = SecureSession::pase();
            if let Some(index) = fabric_index {
                session
                    .adopt_fabric_index(index)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            }
            Ok(session)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, StatusCode> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| StatusCode::BAD_REQUEST))
        .transpose()
}

/// Accepts decimal or `0x`-prefixed hex.
pub(crate) fn parse_node_id(value: &str) -> Option<NodeId> {
    let value = value.trim();
    let raw = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => value.parse().ok()?,
    };
    Some(NodeId(raw))
}
