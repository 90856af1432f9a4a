use std::sync::Arc;

use gateway::sse;
use serde_json::{json, Value};

use crate::{
    backend::{Backend, BackendError, FunctionReply},
    errors::AppError,
};

pub const DRUG_INFO_FUNCTION: &str = "drug-info";

pub struct DrugInfoLookup {
    backend: Arc<dyn Backend>,
}

impl DrugInfoLookup {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Describe `medicine_name`, publishing the text as it arrives.
    ///
    /// On a dropped connection the error carries whatever text was already
    /// shown, see [`sse::StreamError::partial`].
    pub async fn lookup(
        &self,
        medicine_name: &str,
        mut on_update: impl FnMut(&str),
    ) -> Result<String, AppError> {
        let name = medicine_name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Please enter a medicine name"));
        }

        let reply = self
            .backend
            .invoke_function(
                DRUG_INFO_FUNCTION,
                json!({ "medicineName": name, "stream": true }),
            )
            .await?;

        match reply {
            FunctionReply::Stream(stream) => Ok(sse::consume(stream, on_update).await?),
            FunctionReply::Json(body) => {
                let info = body
                    .get("drugInfo")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BackendError::Decode("missing drugInfo".to_string()))?;
                on_update(info);
                Ok(info.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};
    use gateway::GatewayError;

    use super::*;
    use crate::memory::{signed_in, MemoryBackend};

    fn frame(content: &str) -> Vec<u8> {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": content}}]})
        )
        .into_bytes()
    }

    fn lookup(
        reply: impl Fn(Value) -> Result<FunctionReply, BackendError> + Send + Sync + 'static,
    ) -> DrugInfoLookup {
        DrugInfoLookup::new(Arc::new(
            MemoryBackend::new(signed_in("user-1")).with_function(DRUG_INFO_FUNCTION, reply),
        ))
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let err = lookup(|_| Ok(FunctionReply::Json(json!({}))))
            .lookup("  ", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn streamed_reply_publishes_every_update() {
        let flow = lookup(|_| {
            let chunks = vec![
                Ok(frame("Ibuprofen ")),
                Ok(frame("reduces pain.")),
                Ok(b"data: [DONE]\n\n".to_vec()),
            ];
            Ok(FunctionReply::Stream(stream::iter(chunks).boxed()))
        });
        let mut updates = Vec::new();

        let text = flow
            .lookup("Ibuprofen", |t| updates.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(text, "Ibuprofen reduces pain.");
        assert_eq!(updates, vec!["Ibuprofen ", "Ibuprofen reduces pain."]);
    }

    #[tokio::test]
    async fn dropped_stream_keeps_partial_text() {
        let flow = lookup(|_| {
            let chunks = vec![
                Ok(frame("Take with food")),
                Err(GatewayError::Transport("connection reset".to_string())),
            ];
            Ok(FunctionReply::Stream(stream::iter(chunks).boxed()))
        });

        let err = flow.lookup("Metformin", |_| {}).await.unwrap_err();

        match err {
            AppError::Stream(err) => assert_eq!(err.partial(), Some("Take with food")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn whole_reply_is_published_once() {
        let flow = lookup(|body| {
            assert_eq!(body["medicineName"], "Aspirin");
            Ok(FunctionReply::Json(json!({"drugInfo": "Aspirin thins the blood."})))
        });
        let mut updates = 0;

        let text = flow.lookup(" Aspirin ", |_| updates += 1).await.unwrap();

        assert_eq!(text, "Aspirin thins the blood.");
        assert_eq!(updates, 1);
    }
}
