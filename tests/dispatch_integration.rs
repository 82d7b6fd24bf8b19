//scénarios de bout en bout du plan Aid: routeur réel + magasin en mémoire
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use aid_controller::config::Config;
use aid_controller::encoders::{Encoder, EncoderRegistry};
use aid_controller::monitor::TimeoutMonitor;
use aid_controller::server;
use aid_controller::state::AppState;
use aid_controller::store::{JobStore, StoreHandle};

const E1: &str = "did:key:z6MkEncoderOne";
const E2: &str = "did:key:z6MkEncoderTwo";
const PARKED: &str = "did:key:z6MkParkedEncoder";

fn encoder(did: &str, active: bool) -> Encoder {
    Encoder {
        encoder_id: did.to_string(),
        name: format!("node-{}", &did[did.len() - 3..]),
        owner: "ops".to_string(),
        is_active: active,
        created_at: 1000,
        last_seen: None,
    }
}

async fn state_with_store() -> Arc<AppState> {
    let store = JobStore::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory store");
    let registry = EncoderRegistry::from_encoders(vec![
        encoder(E1, true),
        encoder(E2, true),
        encoder(PARKED, false),
    ]);
    AppState::with_store(
        Config::default(),
        registry,
        StoreHandle::preconnected(store),
    )
}

async fn job_store(state: &Arc<AppState>) -> JobStore {
    state.store.get().await.expect("store connected")
}

async fn seed_unassigned(store: &JobStore, id: &str, created_at: i64) {
    sqlx::query(
        "INSERT INTO jobs (id, status, created_at, video_owner, video_permlink, input_uri, input_size)
         VALUES (?, 'unassigned', ?, 'alice', ?, 'ipfs://source-blob', 2048)",
    )
    .bind(id)
    .bind(created_at)
    .bind(format!("video-{id}"))
    .execute(store.pool())
    .await
    .expect("seed job");
}

async fn seed_assigned(store: &JobStore, id: &str, did: &str, last_pinged: i64) {
    seed_unassigned(store, id, last_pinged - 1000).await;
    sqlx::query(
        "UPDATE jobs SET status = 'assigned', assigned_to = ?, assigned_date = ?, last_pinged = ?
         WHERE id = ?",
    )
    .bind(did)
    .bind(last_pinged)
    .bind(last_pinged)
    .bind(id)
    .execute(store.pool())
    .await
    .expect("seed assignment");
}

async fn send(
    state: &Arc<AppState>,
    method: &str,
    path: &str,
    did: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let app = server::build_router(state.clone());
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(did) = did {
        builder = builder.header("x-encoder-did", did);
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).expect("request")).await.expect("response");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn post(
    state: &Arc<AppState>,
    path: &str,
    did: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    send(state, "POST", path, did, Some(body)).await
}

//scénario 1: liste, revendique, progresse, complète, relit
#[tokio::test]
async fn happy_path_claim_update_complete() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    seed_unassigned(&store, "j1", 1000).await;

    let (status, body) = post(&state, "/aid/v1/list-jobs", Some(E1), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["jobs"][0]["id"], json!("j1"));
    assert_eq!(body["jobs"][0]["input"]["uri"], json!("ipfs://source-blob"));

    let (status, body) = post(&state, "/aid/v1/claim-job", Some(E1), json!({"job_id": "j1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_to"], json!(E1));
    assert!(body["assigned_at"].is_i64());
    assert_eq!(body["job_details"]["metadata"]["video_owner"], json!("alice"));

    let (status, body) = post(
        &state,
        "/aid/v1/update-job",
        Some(E1),
        json!({"job_id": "j1", "status": "running", "progress": {"download_pct": 100.0, "pct": 50.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("running"));

    let (status, body) = post(
        &state,
        "/aid/v1/complete-job",
        Some(E1),
        json!({"job_id": "j1", "result": {"cid": "bafy-artifact-1"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["completed_at"].is_i64());

    //relecture: le résultat fourni à la complétion revient tel quel
    let (status, body) = send(&state, "GET", "/aid/v1/job/j1", Some(E1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], json!("complete"));
    assert_eq!(body["job"]["result"]["cid"], json!("bafy-artifact-1"));
    assert_eq!(body["is_owned_by_requester"], json!(true));

    let row = store.get_job("j1").await.unwrap().unwrap();
    assert_eq!(row.assigned_to.as_deref(), Some(E1));
    assert!(row.completed_at.is_some());
}

//scénario 2: deux revendications concurrentes, un seul gagnant par paire
#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let state = state_with_store().await;
    let store = job_store(&state).await;

    for round in 0..10 {
        let job_id = format!("race-{round}");
        seed_unassigned(&store, &job_id, 1000 + round).await;

        let (a, b) = tokio::join!(
            post(&state, "/aid/v1/claim-job", Some(E1), json!({"job_id": &job_id})),
            post(&state, "/aid/v1/claim-job", Some(E2), json!({"job_id": &job_id})),
        );
        let statuses = [a.0, b.0];
        assert!(
            statuses.contains(&StatusCode::OK) && statuses.contains(&StatusCode::CONFLICT),
            "round {round}: expected one 200 and one 409, got {statuses:?}"
        );
        let loser = if a.0 == StatusCode::CONFLICT { &a.1 } else { &b.1 };
        assert_eq!(loser["code"], json!("JOB_ALREADY_ASSIGNED"));

        //le gagnant est bien celui enregistré comme propriétaire
        let winner_did = if a.0 == StatusCode::OK { E1 } else { E2 };
        let row = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(row.assigned_to.as_deref(), Some(winner_did));
    }
}

//scénario 3: complétion par un non-propriétaire, existence masquée
#[tokio::test]
async fn hijacked_complete_is_masked_as_not_found() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    let now = Utc::now().timestamp_millis();
    seed_assigned(&store, "j3", E1, now).await;

    let (status, body) = post(
        &state,
        "/aid/v1/complete-job",
        Some(E2),
        json!({"job_id": "j3", "result": {"cid": "bafy-steal"}}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("JOB_NOT_FOUND"));
    assert_eq!(body["success"], json!(false));

    let row = store.get_job("j3").await.unwrap().unwrap();
    assert_eq!(row.status, aid_controller::jobs::JobStatus::Assigned);
    assert!(row.result.is_none());

    //l'update non-propriétaire est masqué de la même façon
    let (status, _) = post(
        &state,
        "/aid/v1/update-job",
        Some(E2),
        json!({"job_id": "j3", "status": "running", "progress": {"download_pct": 1.0, "pct": 1.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//scénario 4 + R2: récupération après timeout puis nouvelle revendication
#[tokio::test]
async fn timed_out_claim_is_released_then_reclaimable() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    let now = Utc::now().timestamp_millis();
    seed_assigned(&store, "j4", E1, now - 61 * 60 * 1000).await;

    let monitor = TimeoutMonitor::new(state.store.clone(), state.alerts.clone());
    monitor.tick().await;

    let row = store.get_job("j4").await.unwrap().unwrap();
    assert_eq!(row.status, aid_controller::jobs::JobStatus::Unassigned);
    assert!(row.assigned_to.is_none());

    let (status, body) = post(&state, "/aid/v1/claim-job", Some(E2), json!({"job_id": "j4"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_to"], json!(E2));
}

//scénario 5: le verrou d'activation saute à la première revendication servie
#[tokio::test]
async fn first_claim_latches_fallback_activation() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    seed_unassigned(&store, "first", 1000).await;
    seed_unassigned(&store, "second", 2000).await;

    assert!(!state.alerts.latched());
    let (status, _) = post(&state, "/aid/v1/claim-job", Some(E1), json!({"job_id": "first"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.alerts.latched());

    //une seconde revendication ne redéclenche rien, le verrou tient
    let (status, _) = post(&state, "/aid/v1/claim-job", Some(E2), json!({"job_id": "second"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.alerts.latched());
}

//P7: aucun point d'entrée hors santé ne sert sans DID actif enregistré
#[tokio::test]
async fn auth_closure_over_all_dispatch_endpoints() {
    let state = state_with_store().await;

    let (status, body) = post(&state, "/aid/v1/list-jobs", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_REQUEST"));

    let (status, body) = post(&state, "/aid/v1/claim-job", Some("did:key:unknown"), json!({"job_id": "x"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("ENCODER_NOT_AUTHORIZED"));

    let (status, body) = post(&state, "/aid/v1/list-jobs", Some(PARKED), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("ENCODER_INACTIVE"));

    let (status, _) = send(&state, "GET", "/aid/v1/job/any", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    //la santé reste ouverte
    let (status, body) = send(&state, "GET", "/aid/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["store_connected"], json!(true));
}

//compatibilité: DID dans le corps pour les anciens encodeurs, l'en-tête fait foi sinon
#[tokio::test]
async fn legacy_body_did_is_accepted_but_header_wins() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    seed_unassigned(&store, "legacy", 1000).await;
    seed_unassigned(&store, "modern", 2000).await;

    let (status, body) = post(
        &state,
        "/aid/v1/claim-job",
        None,
        json!({"job_id": "legacy", "encoder_did": E1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_to"], json!(E1));

    let (status, body) = post(
        &state,
        "/aid/v1/claim-job",
        Some(E2),
        json!({"job_id": "modern", "encoder_did": E1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_to"], json!(E2));
}

#[tokio::test]
async fn validation_rejects_malformed_mutations() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    let now = Utc::now().timestamp_millis();
    seed_assigned(&store, "j5", E1, now).await;

    //progression hors bornes
    let (status, body) = post(
        &state,
        "/aid/v1/update-job",
        Some(E1),
        json!({"job_id": "j5", "status": "running", "progress": {"download_pct": 100.0, "pct": 150.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_REQUEST"));

    //statut hors de l'ensemble autorisé
    let (status, _) = post(
        &state,
        "/aid/v1/update-job",
        Some(E1),
        json!({"job_id": "j5", "status": "complete", "progress": {"download_pct": 1.0, "pct": 1.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    //cid vide
    let (status, body) = post(
        &state,
        "/aid/v1/complete-job",
        Some(E1),
        json!({"job_id": "j5", "result": {"cid": ""}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_CID"));

    //job_id manquant
    let (status, _) = post(&state, "/aid/v1/claim-job", Some(E1), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//rejouer une complétion répond comme la première fois, sans retoucher la ligne
#[tokio::test]
async fn complete_is_idempotent_for_the_owner() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    let now = Utc::now().timestamp_millis();
    seed_assigned(&store, "j6", E1, now).await;

    let (status, first) = post(
        &state,
        "/aid/v1/complete-job",
        Some(E1),
        json!({"job_id": "j6", "result": {"cid": "bafy-final"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = post(
        &state,
        "/aid/v1/complete-job",
        Some(E1),
        json!({"job_id": "j6", "result": {"cid": "bafy-final"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["completed_at"], second["completed_at"]);

    let row = store.get_job("j6").await.unwrap().unwrap();
    assert_eq!(row.result_cid(), Some("bafy-final"));
}

#[tokio::test]
async fn get_job_reports_ownership_to_each_caller() {
    let state = state_with_store().await;
    let store = job_store(&state).await;
    let now = Utc::now().timestamp_millis();
    seed_assigned(&store, "j7", E1, now).await;

    let (status, body) = send(&state, "GET", "/aid/v1/job/j7", Some(E1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_owned_by_requester"], json!(true));

    let (_, body) = send(&state, "GET", "/aid/v1/job/j7", Some(E2), None).await;
    assert_eq!(body["is_owned_by_requester"], json!(false));

    let (status, body) = send(&state, "GET", "/aid/v1/job/ghost", Some(E1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("JOB_NOT_FOUND"));
}

//magasin injoignable: échec franc en 500, la santé le signale
#[tokio::test]
async fn unavailable_store_fails_hard_and_shows_in_health() {
    let registry = EncoderRegistry::from_encoders(vec![encoder(E1, true)]);
    let state = AppState::with_store(Config::default(), registry, StoreHandle::empty());

    let (status, body) = send(&state, "GET", "/aid/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store_connected"], json!(false));

    let (status, body) = post(&state, "/aid/v1/list-jobs", Some(E1), json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], json!("INTERNAL_ERROR"));
    assert_eq!(body["success"], json!(false));
}
