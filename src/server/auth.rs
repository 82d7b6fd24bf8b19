//extraction du DID et autorisation via le registre local, aucune signature vérifiée
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use std::sync::Arc;

use crate::error::AidError;
use crate::state::AppState;

//en-tête porteur du DID; le champ de corps encoder_did reste accepté pour les anciens encodeurs
pub const ENCODER_DID_HEADER: &str = "x-encoder-did";
const LEGACY_DID_FIELD: &str = "encoder_did";

pub async fn identity(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AidError> {
    //l'en-tête fait foi; le corps n'est relu que s'il est absent
    let mut did = req
        .headers()
        .get(ENCODER_DID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if did.is_none() {
        let (parts, body) = req.into_parts();
        let bytes = hyper::body::to_bytes(body)
            .await
            .map_err(|_| AidError::invalid_request("unreadable request body"))?;
        did = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|v| {
                v.get(LEGACY_DID_FIELD)
                    .and_then(|d| d.as_str())
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty());
        //le corps est reposé tel quel pour les extracteurs aval
        req = Request::from_parts(parts, Body::from(bytes));
    }

    let Some(did) = did else {
        tracing::warn!("dispatch request without encoder DID");
        return Err(AidError::invalid_request("missing encoder DID"));
    };

    let encoder = state
        .registry
        .authorize(&did, Utc::now().timestamp_millis())
        .await
        .map_err(|err| {
            tracing::warn!(%did, code = ?err.code(), "encoder rejected");
            err
        })?;

    req.extensions_mut().insert(encoder);
    Ok(next.run(req).await)
}
