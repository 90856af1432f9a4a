//! Medication domain models

/// Prescription aggregate
pub mod prescriptions;

/// Pharmacy availability
pub mod pharmacies;

/// Simulated delivery orders
pub mod orders;

/// Chat transcript types
pub mod chat;

/// AI insight reports
pub mod insights;

/// Per-user settings
pub mod settings;

/// Domain errors
pub mod errors;

pub use errors::Error;
pub use prescriptions::{Medicine, Prescription};
