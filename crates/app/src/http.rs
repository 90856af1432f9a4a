use std::{env, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use gateway::GatewayError;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    backend::{Backend, BackendError, FunctionReply, Session, Table},
    session::SessionContext,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_FUNCTIONS_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub api_url: String,
    pub functions_url: String,
}

impl HttpConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("MEDPAL_API_URL").unwrap_or(DEFAULT_API_URL.to_string()),
            functions_url: env::var("MEDPAL_FUNCTIONS_URL")
                .unwrap_or(DEFAULT_FUNCTIONS_URL.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadUrl {
    upload_url: String,
    key: String,
}

/// Backend over the api and functions lambdas
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    config: HttpConfig,
    session: SessionContext,
}

impl HttpBackend {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Whole-request deadline for everything except streamed function replies
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(config: HttpConfig, session: SessionContext) -> Result<Self, BackendError> {
        let http = Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            config,
            session,
        })
    }

    fn api(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        Ok(self
            .authorized(method, format!("{}{}", self.config.api_url, path))?
            .timeout(Self::REQUEST_TIMEOUT))
    }

    /// Calls that ask for `"stream": true` get no overall deadline
    fn function(&self, name: &str, body: &Value) -> Result<RequestBuilder, BackendError> {
        let url = format!("{}/{}", self.config.functions_url, name);
        let request = self.authorized(Method::POST, url)?.json(body);

        if body.get("stream").and_then(Value::as_bool).unwrap_or(false) {
            Ok(request)
        } else {
            Ok(request.timeout(Self::REQUEST_TIMEOUT))
        }
    }

    fn authorized(&self, method: Method, url: String) -> Result<RequestBuilder, BackendError> {
        let session = self.session.current().ok_or(BackendError::Unauthenticated)?;

        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&session.access_token)
            .header("x-user-id", &session.user_id))
    }

    async fn json(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let res = send(request).await?;
        res.json().await.map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let res = request.send().await.map_err(transport)?;
    check_status(res).await
}

async fn check_status(res: Response) -> Result<Response, BackendError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthenticated);
    }

    let body = res.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        message: error_message(&body, status),
    })
}

/// `error` field of a JSON body, else the raw body
fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| status.to_string())
}

fn is_event_stream(res: &Response) -> bool {
    res.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.current())
    }

    async fn query_table(&self, table: Table) -> Result<Vec<Value>, BackendError> {
        match table {
            Table::Prescriptions => {
                let rows = self.json(self.api(Method::GET, "/prescriptions")?).await?;
                match rows {
                    Value::Array(rows) => Ok(rows),
                    other => Err(BackendError::Decode(format!("expected rows, got {other}"))),
                }
            }
            Table::UserSettings => {
                let settings = self.json(self.api(Method::GET, "/settings")?).await?;
                Ok(vec![settings])
            }
            Table::Orders => Err(BackendError::Unsupported("orders query")),
        }
    }

    async fn insert_row(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let request = match table {
            Table::Prescriptions => self.api(Method::POST, "/prescriptions")?,
            Table::UserSettings => self.api(Method::PUT, "/settings")?,
            Table::Orders => self.api(Method::POST, "/orders")?,
        };

        self.json(request.json(&row)).await
    }

    async fn delete_row(&self, table: Table, id: &str) -> Result<(), BackendError> {
        if table != Table::Prescriptions {
            return Err(BackendError::Unsupported("row deletion"));
        }

        let request = self.api(Method::DELETE, &format!("/prescriptions/{id}"))?;
        match send(request).await {
            Err(BackendError::Status { status: 404, .. }) => {
                Err(BackendError::NotFound(id.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    async fn upload_object(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        let request = self
            .api(Method::POST, "/prescriptions/image/upload-url")?
            .json(&json!({ "file_name": file_name, "content_type": content_type }));
        let target: UploadUrl = send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        // The presigned URL carries its own credentials.
        send(
            self.http
                .put(&target.upload_url)
                .timeout(Self::REQUEST_TIMEOUT)
                .header(header::CONTENT_TYPE, content_type)
                .body(bytes),
        )
        .await?;

        tracing::info!("Uploaded {} as {}", file_name, target.key);
        Ok(target.key)
    }

    async fn invoke_function(&self, name: &str, body: Value) -> Result<FunctionReply, BackendError> {
        let res = send(self.function(name, &body)?).await?;

        if is_event_stream(&res) {
            let stream = res
                .bytes_stream()
                .map_ok(|chunk| chunk.to_vec())
                .map_err(|e| GatewayError::Transport(e.to_string()))
                .boxed();
            return Ok(FunctionReply::Stream(stream));
        }

        let value = res
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(FunctionReply::Json(value))
    }
}
