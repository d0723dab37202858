//! API error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formforge_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("billing platform error: {0}")]
    BadGateway(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client.
    fn public_message(&self) -> String {
        match self {
            // Internal details stay in the logs.
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = Json(serde_json::json!({
            "error": self.public_message(),
            "retryable": matches!(self, ApiError::ServiceUnavailable(_)),
        }));
        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::UnknownPlanOrInterval(msg) => ApiError::BadRequest(msg),
            BillingError::NoChangeRequested => ApiError::Conflict(err.to_string()),
            BillingError::NotPendingCancellation => ApiError::Conflict(err.to_string()),
            BillingError::NoActiveSubscription(_) | BillingError::CustomerNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            BillingError::ProviderUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            BillingError::ProviderRejected(msg) => ApiError::BadGateway(msg),
            BillingError::Database(msg) | BillingError::Config(msg) | BillingError::Internal(msg) => {
                ApiError::Internal(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_errors_map_to_expected_statuses() {
        let cases = [
            (
                ApiError::from(BillingError::UnknownPlanOrInterval("gold/weekly".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(BillingError::NoChangeRequested),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(BillingError::NoActiveSubscription("c1".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(BillingError::NotPendingCancellation),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(BillingError::ProviderUnavailable("io".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(BillingError::ProviderRejected("no".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(BillingError::Internal("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let err = ApiError::Internal("database password rejected".into());
        assert_eq!(err.public_message(), "internal server error");
    }
}
