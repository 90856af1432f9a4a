use std::{env, sync::Arc};

use cqrs_es::{
    persist::{PersistedEventStore, ViewRepository},
    CqrsFramework, Query as CqrsQuery,
};
use dynamo_es::{DynamoEventRepository, DynamoViewRepository};

use super::{Prescription, Query, Services, UserIndex, View};

pub type PrescriptionCqrs =
    CqrsFramework<Prescription, PersistedEventStore<DynamoEventRepository, Prescription>>;

pub type PrescriptionViews = Arc<Box<dyn ViewRepository<View, Prescription>>>;

pub fn init(
    client: aws_sdk_dynamodb::Client,
    repo: PrescriptionViews,
    index: UserIndex,
) -> Arc<PrescriptionCqrs> {
    let event_log_table = env::var("DYNAMODB_EVENT_LOG_TABLE")
        .unwrap_or("medpal-event-log".to_string());

    let event_snapshots_table = env::var("DYNAMODB_EVENT_SNAPSHOTS_TABLE")
        .unwrap_or("medpal-event-snapshots".to_string());

    // Two events per aggregate at most, snapshots would never pay off.
    let store: PersistedEventStore<DynamoEventRepository, Prescription> =
        PersistedEventStore::new_event_store(
            DynamoEventRepository::new(client)
                .with_tables(&event_log_table, &event_snapshots_table),
        );

    let queries: Vec<Box<dyn CqrsQuery<Prescription>>> =
        vec![Box::new(Query::new(repo)), Box::new(index)];

    Arc::new(CqrsFramework::new(store, queries, Services::default()))
}

pub fn init_repo(client: aws_sdk_dynamodb::Client) -> PrescriptionViews {
    let view_table = env::var("DYNAMODB_PRESCRIPTIONS_VIEW_TABLE")
        .unwrap_or("medpal-prescriptions-view".to_string());

    Arc::new(Box::new(DynamoViewRepository::new(&view_table, client)))
}

pub fn init_index(client: aws_sdk_dynamodb::Client) -> UserIndex {
    let table = env::var("DYNAMODB_PRESCRIPTIONS_TABLE")
        .unwrap_or("medpal-prescriptions".to_string());

    UserIndex::new(client, table)
}
