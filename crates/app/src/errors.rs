use gateway::sse::StreamError;
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("A request is already in progress")]
    Busy,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Domain(#[from] domain::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
