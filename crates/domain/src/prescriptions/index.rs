use std::{collections::HashMap, future::Future};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use cqrs_es::{Aggregate, EventEnvelope};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{Event, Medicine, Prescription};

/// Row of the per-user prescriptions table.
///
/// Keyed by `user_id` (partition) and `id` (sort). Ids are ULIDs, so a
/// descending scan lists the newest prescriptions first.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PrescriptionRow {
    pub user_id: String,
    pub id: String,
    pub prescription_name: String,
    pub medicines: Vec<Medicine>,
    pub notes: Option<String>,
    pub prescription_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Prescription> for PrescriptionRow {
    fn from(p: &Prescription) -> Self {
        Self {
            user_id: p.user_id.clone(),
            id: p.id.clone(),
            prescription_name: p.prescription_name.clone(),
            medicines: p.medicines.clone(),
            notes: p.notes.clone(),
            prescription_image_url: p.prescription_image_url.clone(),
            created_at: p.created_at,
        }
    }
}

#[derive(Clone)]
pub struct UserIndex {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl UserIndex {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Prescriptions owned by `user_id`, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<PrescriptionRow>, Error> {
        let items = collect_pages(|start_key| async move {
            let output = self
                .client
                .query()
                .table_name(&self.table)
                .key_condition_expression("user_id = :user_id")
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(Error::storage)?;

            Ok((output.items.unwrap_or_default(), output.last_evaluated_key))
        })
        .await?;

        serde_dynamo::from_items(items).map_err(Error::storage)
    }

    async fn put(&self, row: &PrescriptionRow) -> Result<(), Error> {
        let item: HashMap<String, AttributeValue> =
            serde_dynamo::to_item(row).map_err(Error::storage)?;

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(Error::storage)?;

        Ok(())
    }

    async fn remove(&self, user_id: &str, id: &str) -> Result<(), Error> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(Error::storage)?;

        Ok(())
    }
}

type Item = HashMap<String, AttributeValue>;

/// Follow `last_evaluated_key` until the query is exhausted
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<Item>, Error>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<(Vec<Item>, Option<Item>), Error>>,
{
    let mut items = Vec::new();
    let mut start_key = None;

    loop {
        let (page, last_key) = fetch(start_key).await?;
        items.extend(page);

        match last_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => return Ok(items),
        }
    }
}

#[async_trait]
impl cqrs_es::Query<Prescription> for UserIndex {
    async fn dispatch(&self, prescription_id: &str, events: &[EventEnvelope<Prescription>]) {
        for envelope in events {
            let result = match &envelope.payload {
                Event::PrescriptionSaved { .. } => {
                    let mut prescription = Prescription::default();
                    prescription.apply(envelope.payload.clone());
                    self.put(&PrescriptionRow::from(&prescription)).await
                }
                Event::PrescriptionDeleted { user_id, .. } => {
                    self.remove(user_id, prescription_id).await
                }
            };

            if let Err(err) = result {
                tracing::error!("UserIndex error for {}: {}", prescription_id, err);
            }
        }
    }
}
