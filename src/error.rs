//erreur unique du plan Aid: un code, un message, un statut HTTP dérivé
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

//codes exposés sur le fil (enveloppe d'erreur)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EncoderNotAuthorized,
    EncoderInactive,
    JobNotFound,
    JobAlreadyAssigned,
    JobAlreadyCompleted,
    JobNotOwned,
    InvalidCid,
    InvalidRequest,
    InternalError,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AidError {
    code: ErrorCode,
    message: String,
}

impl AidError {
    pub fn not_authorized(did: &str) -> Self {
        Self {
            code: ErrorCode::EncoderNotAuthorized,
            message: format!("encoder {did} is not registered"),
        }
    }

    pub fn inactive(did: &str) -> Self {
        Self {
            code: ErrorCode::EncoderInactive,
            message: format!("encoder {did} is deactivated"),
        }
    }

    //masque l'existence du job pour tout appelant non propriétaire
    pub fn job_not_found() -> Self {
        Self {
            code: ErrorCode::JobNotFound,
            message: "job not found".to_string(),
        }
    }

    pub fn already_assigned() -> Self {
        Self {
            code: ErrorCode::JobAlreadyAssigned,
            message: "job is already assigned".to_string(),
        }
    }

    pub fn already_completed() -> Self {
        Self {
            code: ErrorCode::JobAlreadyCompleted,
            message: "job is already completed".to_string(),
        }
    }

    pub fn invalid_cid() -> Self {
        Self {
            code: ErrorCode::InvalidCid,
            message: "result cid is missing or empty".to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequest,
            message: message.into(),
        }
    }

    //les détails internes restent dans les logs, jamais sur le fil
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal dispatch error");
        Self {
            code: ErrorCode::InternalError,
            message: "internal error".to_string(),
        }
    }

    pub fn store_unavailable() -> Self {
        Self::internal("job store is not connected")
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn http_status(&self) -> StatusCode {
        match self.code {
            ErrorCode::EncoderNotAuthorized | ErrorCode::EncoderInactive => StatusCode::FORBIDDEN,
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::JobAlreadyAssigned | ErrorCode::JobAlreadyCompleted => StatusCode::CONFLICT,
            ErrorCode::JobNotOwned => StatusCode::NOT_FOUND,
            ErrorCode::InvalidCid | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    //seules les erreurs transitoires du magasin valent un retry côté encodeur
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::InternalError)
    }
}

impl IntoResponse for AidError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        (self.http_status(), Json(body)).into_response()
    }
}
