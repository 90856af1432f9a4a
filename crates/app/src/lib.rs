//! Client-side core of the app: backend access, session state and the
//! screen flows built on top of them.

/// Backend interface
pub mod backend;

/// Backend over the api and functions lambdas
pub mod http;

/// In-process backend
pub mod memory;

/// Session context
pub mod session;

/// Prescription upload and extraction
pub mod upload;

/// Streamed drug information
pub mod drug_info;

/// Debounced medicine name suggestions
pub mod autocomplete;

/// Prescription chat
pub mod chat;

/// Insights dashboard
pub mod insights;

/// Saved prescriptions
pub mod prescriptions;

/// Delivery checkout
pub mod checkout;

/// Mapbox geocoding
pub mod geocode;

/// Named routes
pub mod routes;

/// App errors
pub mod errors;

pub use backend::{Backend, BackendError, FunctionReply, Session, Table};
pub use errors::AppError;
pub use session::{AuthEvent, SessionContext, Subscription};
