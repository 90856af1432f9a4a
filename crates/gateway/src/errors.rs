use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    MissingApiKey(&'static str),

    #[error("network error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("payment required")]
    PaymentRequired,

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("json error: {0}")]
    Serde(String),

    #[error("no content in reply")]
    EmptyReply,
}

impl GatewayError {
    /// Upstream status worth passing through to our own callers verbatim
    pub fn passthrough_status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::PaymentRequired => Some(402),
            _ => None,
        }
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}
