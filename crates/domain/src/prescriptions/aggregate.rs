use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{inputs::SavePrescriptionInput, Command, Event};

pub const AGGREGATE_TYPE: &str = "Prescription";

/// Display name used when the owner leaves the name blank
pub const UNNAMED_PRESCRIPTION: &str = "Unnamed prescription";

/// One drug entry on a prescription
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Medicine {
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    /// UI selection state, never persisted
    #[serde(skip)]
    pub selected: bool,
}

impl Medicine {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            ..Default::default()
        }
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }
}

/// Prescription aggregate
///
/// Saved once as an immutable snapshot of its medicines, then only ever deleted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub user_id: String,
    pub prescription_name: String,
    pub medicines: Vec<Medicine>,
    pub notes: Option<String>,
    pub prescription_image_url: Option<String>,
    pub created_at: DateTime<Utc>,

    pub deleted: bool,
}

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for Prescription {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::SavePrescription {
                id,
                user_id,
                prescription_name,
                medicines,
                notes,
                image_key,
            } => {
                self.validate_new()?;

                let draft = Prescription::draft(
                    id,
                    user_id,
                    SavePrescriptionInput {
                        prescription_name,
                        medicines,
                        notes,
                        prescription_image_url: image_key,
                    },
                )?;

                Ok(vec![Event::PrescriptionSaved {
                    id: draft.id,
                    user_id: draft.user_id,
                    prescription_name: draft.prescription_name,
                    medicines: draft.medicines,
                    notes: draft.notes,
                    prescription_image_url: draft.prescription_image_url,
                    created_at: draft.created_at,
                }])
            }

            Command::DeletePrescription { user_id } => {
                self.validate_existing()?;

                if !self.is_owned_by(&user_id) {
                    return Err(Error::Forbidden);
                }

                Ok(vec![Event::PrescriptionDeleted {
                    id: self.id.clone(),
                    user_id,
                    deleted_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::PrescriptionSaved {
                id,
                user_id,
                prescription_name,
                medicines,
                notes,
                prescription_image_url,
                created_at,
            } => {
                self.id = id;
                self.user_id = user_id;
                self.prescription_name = prescription_name;
                self.medicines = medicines;
                self.notes = notes;
                self.prescription_image_url = prescription_image_url;
                self.created_at = created_at;
            }

            Event::PrescriptionDeleted { .. } => {
                self.deleted = true;
            }
        }
    }
}

impl Prescription {
    /// Validated, normalized prescription ready to be saved
    pub fn draft(id: String, user_id: String, input: SavePrescriptionInput) -> Result<Self, Error> {
        validate_medicines(&input.medicines)?;

        if user_id.trim().is_empty() {
            return Err(Error::validation("Prescription must have an owner"));
        }

        Ok(Self {
            id,
            user_id,
            prescription_name: non_blank(input.prescription_name)
                .unwrap_or_else(|| UNNAMED_PRESCRIPTION.to_string()),
            medicines: input.medicines,
            notes: non_blank(input.notes),
            prescription_image_url: non_blank(input.prescription_image_url),
            created_at: Utc::now(),
            deleted: false,
        })
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !self.user_id.is_empty() && self.user_id == user_id
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness {
                field: "id".to_string(),
            });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound {
                entity: AGGREGATE_TYPE.to_string(),
            });
        }
        if self.deleted {
            return Err(Error::Forbidden);
        }
        Ok(())
    }
}

fn validate_medicines(medicines: &[Medicine]) -> Result<(), Error> {
    if medicines.is_empty() {
        return Err(Error::validation(
            "Cannot save a prescription without medicines",
        ));
    }
    if medicines.iter().any(|m| m.name.trim().is_empty()) {
        return Err(Error::validation("Every medicine needs a name"));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(id: &str, user_id: &str, medicines: Vec<Medicine>) -> Command {
        Command::SavePrescription {
            id: id.to_string(),
            user_id: user_id.to_string(),
            prescription_name: Some("  ".to_string()),
            medicines,
            notes: Some(" take after meals ".to_string()),
            image_key: None,
        }
    }

    async fn saved(user_id: &str) -> Prescription {
        let mut prescription = Prescription::default();
        let events = prescription
            .handle(
                save("01J0", user_id, vec![Medicine::new("Amoxicillin", "500mg")]),
                &Services::default(),
            )
            .await
            .unwrap();
        for event in events {
            prescription.apply(event);
        }
        prescription
    }

    #[tokio::test]
    async fn save_defaults_blank_name_and_trims_notes() {
        let prescription = saved("user-1").await;

        assert_eq!(prescription.id, "01J0");
        assert_eq!(prescription.prescription_name, UNNAMED_PRESCRIPTION);
        assert_eq!(prescription.notes.as_deref(), Some("take after meals"));
        assert_eq!(prescription.medicines.len(), 1);
        assert!(prescription.is_owned_by("user-1"));
    }

    #[tokio::test]
    async fn save_requires_medicines() {
        let err = Prescription::default()
            .handle(save("01J0", "user-1", vec![]), &Services::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn second_save_is_rejected() {
        let prescription = saved("user-1").await;

        let err = prescription
            .handle(
                save("01J0", "user-1", vec![Medicine::new("Ibuprofen", "200mg")]),
                &Services::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Uniqueness { .. }));
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let prescription = saved("user-1").await;

        let err = prescription
            .handle(
                Command::DeletePrescription {
                    user_id: "user-2".to_string(),
                },
                &Services::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Forbidden));
    }

    #[tokio::test]
    async fn deleted_prescription_cannot_be_deleted_again() {
        let mut prescription = saved("user-1").await;
        let delete = Command::DeletePrescription {
            user_id: "user-1".to_string(),
        };

        let events = prescription
            .handle(delete.clone(), &Services::default())
            .await
            .unwrap();
        for event in events {
            prescription.apply(event);
        }
        assert!(prescription.deleted);

        let err = prescription
            .handle(delete, &Services::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[tokio::test]
    async fn delete_of_unknown_prescription_is_not_found() {
        let err = Prescription::default()
            .handle(
                Command::DeletePrescription {
                    user_id: "user-1".to_string(),
                },
                &Services::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn selection_flag_is_not_serialized() {
        let medicine = Medicine::new("Paracetamol", "1g").selected();
        let json = serde_json::to_value(&medicine).unwrap();

        assert!(json.get("selected").is_none());

        let back: Medicine = serde_json::from_value(json).unwrap();
        assert!(!back.selected);
    }
}
