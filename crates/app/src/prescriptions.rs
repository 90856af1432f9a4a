use std::sync::Arc;

use domain::prescriptions::PrescriptionRow;

use crate::{
    backend::{decode_rows, Backend, BackendError, Table},
    errors::AppError,
};

/// The signed-in user's saved prescriptions
pub struct PrescriptionStore {
    backend: Arc<dyn Backend>,
}

impl PrescriptionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Newest first
    pub async fn list(&self) -> Result<Vec<PrescriptionRow>, AppError> {
        let rows = self.backend.query_table(Table::Prescriptions).await?;
        let mut prescriptions: Vec<PrescriptionRow> = decode_rows(rows)?;
        prescriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prescriptions)
    }

    pub async fn get(&self, id: &str) -> Result<PrescriptionRow, AppError> {
        self.list()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()).into())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.backend.delete_row(Table::Prescriptions, id).await?;
        tracing::info!("Deleted prescription {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::{signed_in, MemoryBackend};

    async fn store_with(names: &[&str]) -> PrescriptionStore {
        let backend = Arc::new(MemoryBackend::new(signed_in("user-1")));
        for name in names {
            backend
                .insert_row(
                    Table::Prescriptions,
                    json!({"prescription_name": name, "medicines": [{"name": "Zinc", "dosage": "20mg"}]}),
                )
                .await
                .unwrap();
        }
        PrescriptionStore::new(backend)
    }

    #[tokio::test]
    async fn load_one_and_delete() {
        let store = store_with(&["Malaria", "Blood pressure"]).await;

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);

        let one = store.get(&all[1].id).await.unwrap();
        assert_eq!(one, all[1]);

        store.delete(&one.id).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(matches!(
            store.get(&one.id).await,
            Err(AppError::Backend(BackendError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_prescription_cannot_be_deleted() {
        let store = store_with(&[]).await;

        assert!(store.delete("missing").await.is_err());
    }
}
