//! Medicine name suggestions while the user types.
//!
//! Every call takes a new generation number. A call that is overtaken during
//! the debounce, or whose reply arrives after a newer call started, resolves
//! to `None` so its result never replaces fresher suggestions.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use gateway::prompts::MIN_AUTOCOMPLETE_CHARS;
use serde::Deserialize;
use serde_json::json;

use crate::{backend::Backend, errors::AppError};

pub const AUTOCOMPLETE_FUNCTION: &str = "drug-autocomplete";
pub const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
struct Suggestions {
    #[serde(default)]
    suggestions: Vec<String>,
}

pub struct Autocomplete {
    backend: Arc<dyn Backend>,
    generation: AtomicU64,
}

impl Autocomplete {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            generation: AtomicU64::new(0),
        }
    }

    /// Suggestions for `query`, or `None` when a newer query superseded it
    pub async fn suggest(&self, query: &str) -> Result<Option<Vec<String>>, AppError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let query = query.trim();
        if query.chars().count() < MIN_AUTOCOMPLETE_CHARS {
            return Ok(Some(Vec::new()));
        }

        tokio::time::sleep(DEBOUNCE).await;
        if !self.is_current(generation) {
            return Ok(None);
        }

        let reply = self
            .backend
            .invoke_function(AUTOCOMPLETE_FUNCTION, json!({ "query": query }))
            .await;

        if !self.is_current(generation) {
            tracing::debug!("Dropping stale suggestions for {}", query);
            return Ok(None);
        }

        let Suggestions { suggestions } = reply?.json()?;
        Ok(Some(suggestions))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}
