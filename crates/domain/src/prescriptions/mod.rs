/// Prescription aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs
pub mod inputs;

/// View (read model)
pub mod view;

/// Per-user index (read model)
pub mod index;

/// CQRS setup
pub mod cqrs;

pub use aggregate::{Medicine, Prescription, Services, AGGREGATE_TYPE, UNNAMED_PRESCRIPTION};
pub use commands::Command;
pub use events::Event;
pub use index::{PrescriptionRow, UserIndex};
pub use view::{Query, View};
