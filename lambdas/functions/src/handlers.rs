use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::{chat::ChatMessage, insights::InsightReport, Medicine};
use gateway::{
    extract,
    prompts::{self, PrescriptionContext, MIN_AUTOCOMPLETE_CHARS},
    speech::{self, DEFAULT_VOICE},
    GatewayError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{error::FunctionError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    #[serde(default)]
    image_base64: Option<String>,
}

impl ImageInput {
    fn image(&self) -> Result<&str, FunctionError> {
        self.image_base64
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| FunctionError::BadRequest("No image provided".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub medicines: Vec<Medicine>,
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteInput {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Suggestions {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugInfoInput {
    #[serde(default)]
    medicine_name: String,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    #[serde(default)]
    message: String,
    #[serde(default)]
    prescriptions: Vec<PrescriptionContext>,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsInput {
    #[serde(default)]
    prescriptions: Vec<PrescriptionContext>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechInput {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice: Option<String>,
}

// Image -> free-text medication description
pub async fn analyze_medication(
    State(state): State<AppState>,
    Json(input): Json<ImageInput>,
) -> Result<impl IntoResponse, FunctionError> {
    let image = input.image()?;
    let completions = state.completions()?;

    tracing::info!("Analyzing medication image");
    let info = completions
        .complete(&prompts::analyze_medication(image))
        .await?;

    Ok(Json(json!({ "medicationInfo": info })))
}

// Image -> structured medicine list
pub async fn extract_prescription(
    State(state): State<AppState>,
    Json(input): Json<ImageInput>,
) -> Result<impl IntoResponse, FunctionError> {
    let image = input.image()?;
    let completions = state.completions()?;

    let reply = completions
        .complete(&prompts::extract_prescription(image))
        .await?;

    let extraction: Extraction = extract::parse_object(&reply)
        .map_err(|e| FunctionError::malformed(e, json!({ "medicines": [] })))?;

    tracing::info!("Extracted {} medicines", extraction.medicines.len());
    Ok(Json(extraction))
}

// Partial name -> suggestions; every failure still answers with a list
pub async fn drug_autocomplete(
    State(state): State<AppState>,
    Json(input): Json<AutocompleteInput>,
) -> Response {
    let query = input.query.trim();
    if query.chars().count() < MIN_AUTOCOMPLETE_CHARS {
        return Json(Suggestions::default()).into_response();
    }

    let completions = match state.completions() {
        Ok(completions) => completions,
        Err(err) => {
            tracing::error!("Autocomplete unavailable: {}", err);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(Suggestions::default()))
                .into_response();
        }
    };

    let reply = match completions.complete(&prompts::drug_autocomplete(query)).await {
        Ok(reply) => reply,
        Err(err) => {
            let status = err
                .passthrough_status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::error!("Autocomplete failed: {}", err);
            return (status, Json(Suggestions::default())).into_response();
        }
    };

    let suggestions = extract::parse_array::<String>(&reply).unwrap_or_else(|err| {
        tracing::warn!("Error parsing suggestions: {}", err);
        Vec::new()
    });

    Json(Suggestions { suggestions }).into_response()
}

// Medicine name -> description, whole or streamed as server-sent events
pub async fn drug_info(
    State(state): State<AppState>,
    Json(input): Json<DrugInfoInput>,
) -> Result<Response, FunctionError> {
    let name = input.medicine_name.trim();
    if name.is_empty() {
        return Err(FunctionError::BadRequest(
            "Please enter a medicine name".to_string(),
        ));
    }

    let completions = state.completions()?;
    let request = prompts::drug_info(name);

    if input.stream {
        let stream = completions.stream(&request).await?;
        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(stream),
        )
            .into_response());
    }

    let info = completions.complete(&request).await?;
    Ok(Json(json!({ "drugInfo": info })).into_response())
}

pub async fn prescription_chat(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> Result<impl IntoResponse, FunctionError> {
    let message = input.message.trim();
    if message.is_empty() {
        return Err(FunctionError::BadRequest("Message is required".to_string()));
    }

    let completions = state.completions()?;
    let reply = completions
        .complete(&prompts::prescription_chat(
            message,
            &input.prescriptions,
            &input.conversation_history,
        ))
        .await?;

    Ok(Json(json!({ "response": reply })))
}

pub async fn prescription_insights(
    State(state): State<AppState>,
    Json(input): Json<InsightsInput>,
) -> Result<Json<InsightReport>, FunctionError> {
    if input.prescriptions.is_empty() {
        return Ok(Json(InsightReport::no_prescriptions()));
    }

    let completions = state.completions()?;
    let reply = completions
        .complete(&prompts::prescription_insights(&input.prescriptions))
        .await?;

    let report: InsightReport = extract::parse_object(&reply).map_err(|e| {
        let fallback = serde_json::to_value(InsightReport::default()).unwrap_or_default();
        FunctionError::malformed(e, fallback)
    })?;

    Ok(Json(report.clamped()))
}

pub async fn text_to_speech(
    State(state): State<AppState>,
    Json(input): Json<SpeechInput>,
) -> Result<impl IntoResponse, FunctionError> {
    if input.text.trim().is_empty() {
        return Err(FunctionError::BadRequest("Text is required".to_string()));
    }

    let speech = state.speech()?;
    let voice = input.voice.as_deref().unwrap_or(DEFAULT_VOICE);

    let audio = speech
        .synthesize(&input.text, voice)
        .await
        .map_err(|err| match err {
            GatewayError::Http { status, .. } => FunctionError::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message: "Failed to generate speech".to_string(),
            },
            other => other.into(),
        })?;

    Ok(Json(json!({ "audioContent": speech::encode_audio(&audio) })))
}
