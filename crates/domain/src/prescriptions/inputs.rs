use serde::{Deserialize, Serialize};

use super::aggregate::Medicine;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SavePrescriptionInput {
    #[serde(default)]
    pub prescription_name: Option<String>,
    pub medicines: Vec<Medicine>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Object key returned by the image upload
    #[serde(default)]
    pub prescription_image_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadImageInput {
    pub file_name: String,
    pub content_type: String,
}
