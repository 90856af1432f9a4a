use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use domain::{chat::ChatMessage, prescriptions::PrescriptionRow};
use gateway::prompts::PrescriptionContext;
use serde::Deserialize;
use serde_json::json;

use crate::{backend::Backend, errors::AppError};

pub const CHAT_FUNCTION: &str = "prescription-chat";

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

/// Conversation about the user's prescriptions, kept in memory only
pub struct Chat {
    backend: Arc<dyn Backend>,
    prescriptions: Vec<PrescriptionContext>,
    history: Mutex<Vec<ChatMessage>>,
    sending: AtomicBool,
}

/// Clears the in-flight flag however `send` exits
struct Sending<'a>(&'a AtomicBool);

impl Drop for Sending<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Chat {
    pub fn new(backend: Arc<dyn Backend>, prescriptions: &[PrescriptionRow]) -> Self {
        Self {
            backend,
            prescriptions: prescriptions.iter().map(context).collect(),
            history: Mutex::new(Vec::new()),
            sending: AtomicBool::new(false),
        }
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Send `input` and return the assistant's reply
    pub async fn send(&self, input: &str) -> Result<ChatMessage, AppError> {
        let message = input.trim();
        if message.is_empty() {
            return Err(AppError::validation("Please enter a message"));
        }
        if self.sending.swap(true, Ordering::SeqCst) {
            return Err(AppError::Busy);
        }
        let _sending = Sending(&self.sending);

        let prior = {
            let mut history = self.lock();
            let prior = history.clone();
            history.push(ChatMessage::user(message));
            prior
        };

        let reply: ChatReply = self
            .backend
            .invoke_function(
                CHAT_FUNCTION,
                json!({
                    "message": message,
                    "prescriptions": self.prescriptions,
                    "conversationHistory": prior,
                }),
            )
            .await
            .and_then(|reply| reply.json())
            .inspect_err(|err| tracing::error!("Error sending message: {}", err))?;

        let answer = ChatMessage::assistant(reply.response);
        self.lock().push(answer.clone());
        Ok(answer)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn context(row: &PrescriptionRow) -> PrescriptionContext {
    PrescriptionContext {
        prescription_name: Some(row.prescription_name.clone()),
        created_at: Some(row.created_at),
        medicines: row.medicines.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::chat::Role;
    use serde_json::Value;

    use super::*;
    use crate::{
        backend::{BackendError, FunctionReply},
        memory::{signed_in, MemoryBackend},
    };

    fn reply(body: Value) -> Result<FunctionReply, BackendError> {
        let turns = body["conversationHistory"].as_array().map_or(0, Vec::len);
        Ok(FunctionReply::Json(
            json!({ "response": format!("seen {turns} earlier turns") }),
        ))
    }

    fn memory() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new(signed_in("user-1"))
                .with_function(CHAT_FUNCTION, reply)
                .with_latency(Duration::from_millis(50)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn history_grows_and_is_sent_with_each_turn() {
        let backend = memory();
        let chat = Chat::new(backend.clone(), &[]);

        chat.send("  Hello ").await.unwrap();
        let answer = chat.send("Side effects?").await.unwrap();

        assert_eq!(answer.content, "seen 2 earlier turns");
        let history = chat.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[3].role, Role::Assistant);
        assert_eq!(backend.invocations()[1].1["message"], "Side effects?");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_and_concurrent_sends_are_rejected() {
        let chat = Chat::new(memory(), &[]);

        assert!(matches!(
            chat.send("   ").await,
            Err(AppError::Validation(_))
        ));

        let (first, second) = tokio::join!(chat.send("one"), chat.send("two"));
        assert!(first.is_ok());
        assert!(matches!(second, Err(AppError::Busy)));
        assert!(!chat.is_sending());
        assert_eq!(chat.history().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_keeps_the_question() {
        let backend = Arc::new(MemoryBackend::new(signed_in("user-1")));
        let chat = Chat::new(backend, &[]);

        assert!(chat.send("Hello").await.is_err());
        assert_eq!(chat.history().len(), 1);
        assert!(!chat.is_sending());
    }
}
