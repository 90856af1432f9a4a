//! Prescription upload: photo in, editable medicine list out, saved
//! prescription at the end.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use domain::{
    pharmacies::{availability::AvailabilityProvider, Pharmacy},
    prescriptions::{inputs::SavePrescriptionInput, PrescriptionRow},
    Medicine,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    backend::{Backend, BackendError, Table},
    errors::AppError,
};

pub const EXTRACT_FUNCTION: &str = "extract-prescription";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Empty,
    Extracting,
    Editing,
    Saving,
    Saved(String),
    /// Last step failed; editing is still possible
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct Extraction {
    #[serde(default)]
    medicines: Vec<Medicine>,
}

pub struct UploadFlow {
    backend: Arc<dyn Backend>,
    stage: Stage,
    medicines: Vec<Medicine>,
    image_key: Option<String>,
    notice: Option<String>,
}

impl UploadFlow {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            stage: Stage::Empty,
            medicines: Vec::new(),
            image_key: None,
            notice: None,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn medicines(&self) -> &[Medicine] {
        &self.medicines
    }

    pub fn image_key(&self) -> Option<&str> {
        self.image_key.as_deref()
    }

    /// Message for the user after extraction
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Upload the photo and extract its medicines; they start selected
    pub async fn accept_image(
        &mut self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        if !content_type.starts_with("image/") {
            return Err(AppError::validation("Please upload an image file"));
        }

        self.stage = Stage::Extracting;
        self.notice = None;

        match self.extract(file_name, content_type, bytes).await {
            Ok(medicines) => {
                self.notice = Some(if medicines.is_empty() {
                    "No medicines found. Please add medicines manually".to_string()
                } else {
                    format!(
                        "Extracted {} medicine(s) from prescription",
                        medicines.len()
                    )
                });
                self.medicines = medicines;
                self.stage = Stage::Editing;
                Ok(())
            }
            Err(err) => {
                tracing::error!("Error processing prescription: {}", err);
                self.stage =
                    Stage::Failed("Failed to process prescription. Please try again.".to_string());
                Err(err)
            }
        }
    }

    async fn extract(
        &mut self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<Medicine>, AppError> {
        let image = format!("data:{};base64,{}", content_type, STANDARD.encode(&bytes));

        let key = self
            .backend
            .upload_object(file_name, content_type, bytes)
            .await?;
        self.image_key = Some(key);

        let extraction: Extraction = self
            .backend
            .invoke_function(EXTRACT_FUNCTION, json!({ "imageBase64": image }))
            .await?
            .json()?;

        Ok(extraction
            .medicines
            .into_iter()
            .map(Medicine::selected)
            .collect())
    }

    /// Add a medicine by hand; it starts selected
    pub fn add_medicine(&mut self, name: &str, dosage: &str) -> Result<(), AppError> {
        let (name, dosage) = (name.trim(), dosage.trim());
        if name.is_empty() || dosage.is_empty() {
            return Err(AppError::validation(
                "Please enter both medicine name and dosage",
            ));
        }

        self.medicines.push(Medicine::new(name, dosage).selected());
        self.stage = Stage::Editing;
        Ok(())
    }

    pub fn toggle(&mut self, index: usize) {
        if let Some(medicine) = self.medicines.get_mut(index) {
            medicine.selected = !medicine.selected;
        }
    }

    /// Medicines chosen for the pharmacy search
    pub fn selected(&self) -> Result<Vec<Medicine>, AppError> {
        let selected: Vec<Medicine> = self
            .medicines
            .iter()
            .filter(|m| m.selected)
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(AppError::validation("Please select at least one medicine"));
        }
        Ok(selected)
    }

    pub async fn find_pharmacies(
        &self,
        provider: &dyn AvailabilityProvider,
    ) -> Result<Vec<Pharmacy>, AppError> {
        let selected = self.selected()?;
        Ok(provider.find(&selected).await?)
    }

    pub async fn save(
        &mut self,
        prescription_name: Option<&str>,
        notes: Option<&str>,
    ) -> Result<PrescriptionRow, AppError> {
        if self.medicines.is_empty() {
            return Err(AppError::validation("Please add at least one medicine"));
        }

        let input = SavePrescriptionInput {
            prescription_name: prescription_name.map(str::to_string),
            medicines: self.medicines.clone(),
            notes: notes.map(str::to_string),
            prescription_image_url: self.image_key.clone(),
        };

        self.stage = Stage::Saving;
        let result = self.insert(&input).await;

        match result {
            Ok(saved) => {
                tracing::info!("Saved prescription {}", saved.id);
                self.stage = Stage::Saved(saved.id.clone());
                Ok(saved)
            }
            Err(err) => {
                self.stage = Stage::Failed(err.to_string());
                Err(err.into())
            }
        }
    }

    async fn insert(&self, input: &SavePrescriptionInput) -> Result<PrescriptionRow, BackendError> {
        let row = serde_json::to_value(input).map_err(|e| BackendError::Decode(e.to_string()))?;
        let saved = self.backend.insert_row(Table::Prescriptions, row).await?;
        serde_json::from_value(saved).map_err(|e| BackendError::Decode(e.to_string()))
    }
}
