use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{
    persist::{PersistenceError, ViewContext, ViewRepository},
    Aggregate, EventEnvelope, View as CqrsView,
};
use serde::{Deserialize, Serialize};

use super::{Prescription, AGGREGATE_TYPE};

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct View {
    pub aggregate_type: String,
    pub command_id: String,
    pub id: String,
    pub prescription: Prescription,
}

impl CqrsView<Prescription> for View {
    fn update(&mut self, event: &EventEnvelope<Prescription>) {
        self.id.clone_from(&event.aggregate_id);
        self.aggregate_type = AGGREGATE_TYPE.to_string();
        self.command_id = event
            .metadata
            .get("command_id")
            .cloned()
            .unwrap_or_default();
        self.prescription.apply(event.payload.clone());
    }
}

pub struct Query {
    repo: Arc<Box<dyn ViewRepository<View, Prescription>>>,
}

impl Query {
    pub fn new(repo: Arc<Box<dyn ViewRepository<View, Prescription>>>) -> Self {
        Self { repo }
    }

    async fn update(
        &self,
        prescription_id: &str,
        events: &[EventEnvelope<Prescription>],
    ) -> Result<(), PersistenceError> {
        let (mut view, view_context) = match self.repo.load_with_context(prescription_id).await? {
            None => {
                let view_context = ViewContext::new(prescription_id.to_string(), 0);
                (Default::default(), view_context)
            }
            Some((view, context)) => (view, context),
        };

        for event in events {
            view.update(event);
        }

        self.repo.update_view(view, view_context).await
    }
}

#[async_trait]
impl cqrs_es::Query<Prescription> for Query {
    async fn dispatch(&self, prescription_id: &str, events: &[EventEnvelope<Prescription>]) {
        if let Err(err) = self.update(prescription_id, events).await {
            tracing::error!("PrescriptionQuery error for {}: {}", prescription_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::prescriptions::{Event, Medicine};

    fn envelope(sequence: usize, payload: Event) -> EventEnvelope<Prescription> {
        let mut metadata = HashMap::new();
        metadata.insert("command_id".to_string(), format!("cmd-{sequence}"));
        EventEnvelope {
            aggregate_id: "01J0".to_string(),
            sequence,
            payload,
            metadata,
        }
    }

    #[test]
    fn view_follows_saved_then_deleted() {
        let mut view = View::default();

        view.update(&envelope(
            1,
            Event::PrescriptionSaved {
                id: "01J0".to_string(),
                user_id: "user-1".to_string(),
                prescription_name: "Clinic visit".to_string(),
                medicines: vec![Medicine::new("Metformin", "500mg")],
                notes: None,
                prescription_image_url: None,
                created_at: Utc::now(),
            },
        ));
        assert_eq!(view.id, "01J0");
        assert_eq!(view.aggregate_type, AGGREGATE_TYPE);
        assert_eq!(view.command_id, "cmd-1");
        assert_eq!(view.prescription.prescription_name, "Clinic visit");
        assert!(!view.prescription.deleted);

        view.update(&envelope(
            2,
            Event::PrescriptionDeleted {
                id: "01J0".to_string(),
                user_id: "user-1".to_string(),
                deleted_at: Utc::now(),
            },
        ));
        assert_eq!(view.command_id, "cmd-2");
        assert!(view.prescription.deleted);
    }
}
