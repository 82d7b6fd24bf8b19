//points d'entrée du plan Aid: chaque mutation délègue un seul appel atomique au magasin
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::LIST_JOBS_CAP;
use crate::encoders::Encoder;
use crate::error::AidError;
use crate::jobs::{JobProgress, JobResult, JobStatus, JobSummary};
use crate::state::AppState;
use crate::store::{CompleteOutcome, JobStore, MutateOutcome};

//probe de santé, seul point sans authentification
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store_connected = match state.store.get().await {
        Some(store) => store.ping().await,
        None => false,
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store_connected": store_connected,
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

//le magasin indisponible est un échec franc, jamais de données de démonstration
async fn store_or_unavailable(state: &AppState) -> Result<JobStore, AidError> {
    state
        .store
        .get()
        .await
        .ok_or_else(AidError::store_unavailable)
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Extension(encoder): Extension<Encoder>,
) -> Result<Json<serde_json::Value>, AidError> {
    let store = store_or_unavailable(&state).await?;
    let jobs = store
        .list_unassigned(LIST_JOBS_CAP)
        .await
        .map_err(AidError::internal)?;
    let summaries: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();
    tracing::debug!(encoder = %encoder.encoder_id, count = summaries.len(), "listed available jobs");
    Ok(Json(json!({ "success": true, "jobs": summaries })))
}

#[derive(Deserialize)]
pub struct ClaimBody {
    pub job_id: Option<String>,
}

pub async fn claim_job(
    State(state): State<Arc<AppState>>,
    Extension(encoder): Extension<Encoder>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<serde_json::Value>, AidError> {
    let job_id = required_job_id(body.job_id)?;
    let store = store_or_unavailable(&state).await?;
    let now = Utc::now().timestamp_millis();

    let claimed = store
        .claim_atomic(&job_id, &encoder.encoder_id, now)
        .await
        .map_err(AidError::internal)?;

    let Some(job) = claimed else {
        //la ligne existe mais n'était plus libre: la course est perdue proprement
        return match store.get_job(&job_id).await.map_err(AidError::internal)? {
            Some(_) => Err(AidError::already_assigned()),
            None => Err(AidError::job_not_found()),
        };
    };

    tracing::info!(%job_id, encoder = %encoder.encoder_id, "job claimed through aid dispatch");
    state
        .alerts
        .fallback_activated(&format!(
            "encoder {} ({}) claimed job {job_id}",
            encoder.name, encoder.encoder_id
        ))
        .await;

    Ok(Json(json!({
        "success": true,
        "job_id": job.id,
        "assigned_to": job.assigned_to,
        "assigned_at": job.assigned_date,
        "job_details": job,
    })))
}

#[derive(Deserialize)]
pub struct UpdateBody {
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<JobProgress>,
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Extension(encoder): Extension<Encoder>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<serde_json::Value>, AidError> {
    let job_id = required_job_id(body.job_id)?;
    let status = body
        .status
        .as_deref()
        .and_then(JobStatus::parse)
        .filter(JobStatus::accepted_from_update)
        .ok_or_else(|| {
            AidError::invalid_request("status must be one of assigned, running, failed")
        })?;
    let progress = body
        .progress
        .filter(JobProgress::is_valid)
        .ok_or_else(|| AidError::invalid_request("progress percentages must be within [0,100]"))?;

    let store = store_or_unavailable(&state).await?;
    let now = Utc::now().timestamp_millis();
    let outcome = store
        .update_progress(&job_id, &encoder.encoder_id, status, progress, now)
        .await
        .map_err(AidError::internal)?;

    match outcome {
        MutateOutcome::Updated => Ok(Json(json!({
            "success": true,
            "job_id": job_id,
            "status": status,
            "updated_at": now,
        }))),
        MutateOutcome::AlreadyComplete => Err(AidError::already_completed()),
        //l'existence du job n'est pas divulguée aux non-propriétaires
        MutateOutcome::NotOwner | MutateOutcome::Missing => Err(AidError::job_not_found()),
    }
}

#[derive(Deserialize)]
pub struct CompleteBody {
    pub job_id: Option<String>,
    pub result: Option<serde_json::Value>,
}

pub async fn complete_job(
    State(state): State<Arc<AppState>>,
    Extension(encoder): Extension<Encoder>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<serde_json::Value>, AidError> {
    let job_id = required_job_id(body.job_id)?;
    let result: JobResult = body
        .result
        .and_then(|raw| serde_json::from_value(raw).ok())
        .filter(|r: &JobResult| !r.cid.trim().is_empty())
        .ok_or_else(AidError::invalid_cid)?;

    let store = store_or_unavailable(&state).await?;
    let now = Utc::now().timestamp_millis();
    let outcome = store
        .complete_job(&job_id, &encoder.encoder_id, &result, now)
        .await
        .map_err(AidError::internal)?;

    match outcome {
        CompleteOutcome::Completed { completed_at } => {
            tracing::info!(%job_id, encoder = %encoder.encoder_id, cid = %result.cid, "job completed");
            Ok(Json(json!({
                "success": true,
                "job_id": job_id,
                "completed_at": completed_at,
            })))
        }
        //rejouer une complétion déjà actée répond comme la première fois
        CompleteOutcome::AlreadyComplete { completed_at } => Ok(Json(json!({
            "success": true,
            "job_id": job_id,
            "completed_at": completed_at,
        }))),
        CompleteOutcome::NotOwner => Err(AidError::job_not_found()),
    }
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Extension(encoder): Extension<Encoder>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AidError> {
    let store = store_or_unavailable(&state).await?;
    let job = store
        .get_job(&job_id)
        .await
        .map_err(AidError::internal)?
        .ok_or_else(AidError::job_not_found)?;

    let is_owned = job.assigned_to.as_deref() == Some(encoder.encoder_id.as_str());
    //nom d'affichage du propriétaire courant, via la projection du répertoire de nœuds
    let assigned_to_name = match (&job.assigned_to, is_owned) {
        (Some(owner_did), false) => state
            .directory
            .lookup(owner_did)
            .await
            .and_then(|d| d.name),
        (Some(_), true) => Some(encoder.name.clone()),
        (None, _) => None,
    };

    Ok(Json(json!({
        "success": true,
        "job": job,
        "is_owned_by_requester": is_owned,
        "assigned_to_name": assigned_to_name,
    })))
}

fn required_job_id(job_id: Option<String>) -> Result<String, AidError> {
    job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AidError::invalid_request("job_id is required"))
}
