use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway::GatewayError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("{0} is not configured")]
    MissingCredential(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Payment required. Please add credits to continue.")]
    PaymentRequired,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Reply arrived but held no usable JSON; `fallback` keeps the client usable
    #[error("{message}")]
    Malformed { message: String, fallback: Value },
}

impl FunctionError {
    pub fn malformed(err: GatewayError, fallback: Value) -> Self {
        match err {
            GatewayError::Serde(message) => Self::Malformed { message, fallback },
            other => other.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::Upstream { status, .. } => *status,
            Self::MissingCredential(_) | Self::Malformed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<GatewayError> for FunctionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MissingApiKey(var) => Self::MissingCredential(var),
            GatewayError::RateLimited => Self::RateLimited,
            GatewayError::PaymentRequired => Self::PaymentRequired,
            GatewayError::Serde(message) => Self::Malformed {
                message,
                fallback: json!({}),
            },
            other => Self::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("AI gateway error: {other}"),
            },
        }
    }
}

impl IntoResponse for FunctionError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("Function failed with {}: {}", status, self);

        let mut body = match &self {
            Self::Malformed { fallback, .. } if fallback.is_object() => fallback.clone(),
            _ => json!({}),
        };
        body["error"] = Value::String(self.to_string());

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn render(err: FunctionError) -> (StatusCode, Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_reply_keeps_fallback_payload() {
        let err = FunctionError::malformed(
            GatewayError::Serde("no JSON".to_string()),
            json!({"medicines": []}),
        );

        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["medicines"], json!([]));
        assert_eq!(body["error"], "no JSON");
    }

    #[tokio::test]
    async fn quota_errors_keep_upstream_status() {
        let (status, body) = render(GatewayError::PaymentRequired.into()).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"], "Payment required. Please add credits to continue.");

        let (status, _) = render(GatewayError::RateLimited.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }
}
