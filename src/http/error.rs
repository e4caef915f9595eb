//! Error responses for the REST surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::host::HostError;
use crate::ledger::LedgerError;
use crate::reconcile::ReconcileError;
use crate::store::StoreError;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// An error ready to be rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid API key")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = self.code, message = %self.message, "Request failed");
        }
        let body = ErrorBody { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::StaleVersion { .. } => Self::new(StatusCode::CONFLICT, "version_conflict", message),
            StoreError::Duplicate(_) => Self::new(StatusCode::CONFLICT, "duplicate", message),
            StoreError::NotFound(_) => Self::not_found(message),
            StoreError::Unavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        match e {
            LedgerError::Unavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, "ledger_unavailable", message),
            LedgerError::Serialization { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "ledger_corrupt", message)
            }
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Store(e) => e.into(),
            ReconcileError::Ledger(e) => e.into(),
        }
    }
}

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        let message = e.to_string();
        match e {
            HostError::NotFound(_) => Self::not_found(message),
            // Reported like a missing host so the route does not confirm which ids exist.
            HostError::TokenMismatch(id) => Self::not_found(HostError::NotFound(id).to_string()),
            HostError::WrongProject { .. } => Self::new(StatusCode::FORBIDDEN, "wrong_project", message),
            HostError::Invalid(_) | HostError::EmptySelection => Self::bad_request(message),
            HostError::WrongClass { .. } => Self::new(StatusCode::BAD_REQUEST, "wrong_class", message),
            HostError::DuplicateName(_) | HostError::DuplicateAddress { .. } => {
                Self::new(StatusCode::CONFLICT, "duplicate", message)
            }
            HostError::Referenced(_) => Self::new(StatusCode::CONFLICT, "referenced", message),
            HostError::Store(e) => e.into(),
            HostError::Reconcile(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::validation::FieldError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (HostError::Invalid(vec![FieldError::EmptyName]), StatusCode::BAD_REQUEST),
            (HostError::NotFound(1), StatusCode::NOT_FOUND),
            (HostError::TokenMismatch(1), StatusCode::NOT_FOUND),
            (HostError::WrongProject { id: 1, project_id: 2 }, StatusCode::FORBIDDEN),
            (HostError::Referenced(1), StatusCode::CONFLICT),
            (HostError::DuplicateName("a".into()), StatusCode::CONFLICT),
            (
                HostError::Store(StoreError::StaleVersion { id: 1, expected: 1, actual: 2 }),
                StatusCode::CONFLICT,
            ),
            (
                HostError::Reconcile(ReconcileError::Ledger(LedgerError::Unavailable("down".into()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error.clone()).status(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn test_body_shape() {
        let response = ApiError::from(HostError::Referenced(9)).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "referenced");
        assert_eq!(body["message"], "host 9 is referenced by a deployment job");
    }
}
