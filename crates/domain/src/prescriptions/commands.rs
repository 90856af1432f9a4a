use serde::{Deserialize, Serialize};

use super::aggregate::Medicine;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Save a new prescription snapshot
    SavePrescription {
        id: String,
        user_id: String,
        prescription_name: Option<String>,
        medicines: Vec<Medicine>,
        notes: Option<String>,
        image_key: Option<String>,
    },

    /// Delete the prescription (owner only)
    DeletePrescription {
        user_id: String,
    },
}
