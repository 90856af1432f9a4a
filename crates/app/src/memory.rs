//! In-process backend holding everything in memory.
//!
//! Writes go through the same domain rules as the api lambda. Functions are
//! registered as closures so flows can run without the AI gateway.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use domain::{
    orders::{self, PlaceOrderInput},
    prescriptions::{inputs::SavePrescriptionInput, PrescriptionRow},
    settings::UserSettings,
    Prescription,
};
use serde_json::Value;

use crate::{
    backend::{Backend, BackendError, FunctionReply, Session, Table},
    session::SessionContext,
};

type Handler = Box<dyn Fn(Value) -> Result<FunctionReply, BackendError> + Send + Sync>;

#[derive(Default)]
struct State {
    prescriptions: Vec<PrescriptionRow>,
    settings: HashMap<String, UserSettings>,
    objects: BTreeMap<String, (String, Vec<u8>)>,
    invocations: Vec<(String, Value)>,
    next_id: u64,
}

pub struct MemoryBackend {
    session: SessionContext,
    functions: HashMap<String, Handler>,
    latency: Option<Duration>,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            functions: HashMap::new(),
            latency: None,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_function(
        mut self,
        name: &str,
        handler: impl Fn(Value) -> Result<FunctionReply, BackendError> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.to_string(), Box::new(handler));
        self
    }

    /// Delay every function call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Function calls so far, oldest first
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.lock().invocations.clone()
    }

    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.lock().objects.get(key).cloned()
    }

    fn user(&self) -> Result<Session, BackendError> {
        self.session.current().ok_or(BackendError::Unauthenticated)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn rejected(err: domain::Error) -> BackendError {
    let status = match err {
        domain::Error::NotFound { .. } => 404,
        domain::Error::Forbidden => 403,
        domain::Error::Uniqueness { .. } => 409,
        domain::Error::Validation { .. } => 400,
        domain::Error::Storage { .. } => 500,
    };
    BackendError::Status {
        status,
        message: err.to_string(),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, BackendError> {
    serde_json::to_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.current())
    }

    async fn query_table(&self, table: Table) -> Result<Vec<Value>, BackendError> {
        let user = self.user()?;
        let state = self.lock();

        match table {
            Table::Prescriptions => {
                let mut rows: Vec<&PrescriptionRow> = state
                    .prescriptions
                    .iter()
                    .filter(|row| row.user_id == user.user_id)
                    .collect();
                rows.sort_by(|a, b| b.id.cmp(&a.id));
                rows.into_iter().map(to_value).collect()
            }
            Table::UserSettings => state
                .settings
                .get(&user.user_id)
                .map(to_value)
                .into_iter()
                .collect(),
            Table::Orders => Err(BackendError::Unsupported("orders query")),
        }
    }

    async fn insert_row(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let user = self.user()?;

        match table {
            Table::Prescriptions => {
                let input: SavePrescriptionInput = from_value(row)?;
                let mut state = self.lock();
                state.next_id += 1;
                let id = format!("{:08}", state.next_id);

                let draft =
                    Prescription::draft(id, user.user_id.clone(), input).map_err(rejected)?;
                let saved = PrescriptionRow::from(&draft);
                state.prescriptions.push(saved.clone());
                to_value(&saved)
            }
            Table::UserSettings => {
                let token = row
                    .get("mapbox_token")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let settings = UserSettings::with_token(&user.user_id, token).map_err(rejected)?;
                self.lock()
                    .settings
                    .insert(user.user_id.clone(), settings.clone());
                to_value(&settings)
            }
            Table::Orders => {
                let input: PlaceOrderInput = from_value(row)?;
                let confirmation = orders::place(&input).map_err(rejected)?;
                to_value(&confirmation)
            }
        }
    }

    async fn delete_row(&self, table: Table, id: &str) -> Result<(), BackendError> {
        let user = self.user()?;
        if table != Table::Prescriptions {
            return Err(BackendError::Unsupported("row deletion"));
        }

        let mut state = self.lock();
        let position = state
            .prescriptions
            .iter()
            .position(|row| row.id == id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        if state.prescriptions[position].user_id != user.user_id {
            return Err(rejected(domain::Error::Forbidden));
        }
        state.prescriptions.remove(position);
        Ok(())
    }

    async fn upload_object(
        &self,
        _file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        let user = self.user()?;
        let mut state = self.lock();
        state.next_id += 1;

        let key = format!("prescriptions/{}/{:08}", user.user_id, state.next_id);
        state
            .objects
            .insert(key.clone(), (content_type.to_string(), bytes));
        Ok(key)
    }

    async fn invoke_function(&self, name: &str, body: Value) -> Result<FunctionReply, BackendError> {
        self.user()?;
        self.lock()
            .invocations
            .push((name.to_string(), body.clone()));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let handler = self.functions.get(name).ok_or(BackendError::Status {
            status: 404,
            message: format!("Function {name} not found"),
        })?;
        handler(body)
    }
}

/// Session context already signed in as `user_id`
#[cfg(test)]
pub(crate) fn signed_in(user_id: &str) -> SessionContext {
    let session = SessionContext::new();
    session.sign_in(Session {
        user_id: user_id.to_string(),
        email: None,
        access_token: "token".to_string(),
        expires_at: None,
    });
    session
}
