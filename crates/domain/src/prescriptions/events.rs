use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::Medicine;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    PrescriptionSaved {
        id: String,
        user_id: String,
        prescription_name: String,
        medicines: Vec<Medicine>,
        notes: Option<String>,
        prescription_image_url: Option<String>,
        created_at: DateTime<Utc>,
    },

    PrescriptionDeleted {
        id: String,
        user_id: String,
        deleted_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::PrescriptionSaved { .. } => "Prescription:Saved".to_string(),
            Event::PrescriptionDeleted { .. } => "Prescription:Deleted".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
