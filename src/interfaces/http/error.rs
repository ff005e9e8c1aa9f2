use crate::error::MarketError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

impl MarketError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            MarketError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            MarketError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            MarketError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            MarketError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            MarketError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            MarketError::InsufficientBalance { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
            }
            MarketError::InvalidTransition { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_STATE_TRANSITION")
            }
            MarketError::SignatureError(_) => (StatusCode::BAD_REQUEST, "SIGNATURE_ERROR"),
            MarketError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            MarketError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            MarketError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                "An internal error occurred".to_string()
            }
            MarketError::Upstream(msg) => {
                tracing::error!(error = %msg, "Payment provider error");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_balance_is_distinguishable() {
        let err = MarketError::InsufficientBalance {
            wallet: "w".to_string(),
            required: dec!(150),
            available: dec!(20),
        };
        assert_eq!(
            err.status_and_code(),
            (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (MarketError::not_found("Session", 1), StatusCode::NOT_FOUND),
            (MarketError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (MarketError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                MarketError::InvalidTransition {
                    from: SessionStatus::Completed,
                    action: "start",
                    reason: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (MarketError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
