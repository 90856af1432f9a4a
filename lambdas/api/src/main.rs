use aws_config::BehaviorVersion;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cqrs_es::AggregateError;
use domain::{
    errors::Error,
    orders::{self, PlaceOrderInput},
    prescriptions::{
        self,
        cqrs::{PrescriptionCqrs, PrescriptionViews},
        inputs::{SavePrescriptionInput, UploadImageInput},
        PrescriptionRow, UserIndex,
    },
    settings::{SettingsRepo, UserSettings},
};
use serde::Deserialize;
use std::{collections::HashMap, env, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use ulid::Ulid;

/// Header set by the authorizer in front of the api
const USER_ID_HEADER: &str = "x-user-id";

const UPLOAD_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct AppState {
    prescriptions_repo: PrescriptionViews,
    prescriptions_cqrs: Arc<PrescriptionCqrs>,
    prescriptions_index: UserIndex,
    settings_repo: SettingsRepo,
    s3_client: aws_sdk_s3::Client,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
struct UserId(String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or((StatusCode::UNAUTHORIZED, "Not signed in".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SettingsInput {
    mapbox_token: String,
}

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);
    let s3_client = aws_sdk_s3::Client::new(&config);

    let prescriptions_repo = prescriptions::cqrs::init_repo(dynamodb_client.clone());
    let prescriptions_index = prescriptions::cqrs::init_index(dynamodb_client.clone());
    let prescriptions_cqrs = prescriptions::cqrs::init(
        dynamodb_client.clone(),
        prescriptions_repo.clone(),
        prescriptions_index.clone(),
    );

    let state = AppState {
        prescriptions_repo,
        prescriptions_cqrs,
        prescriptions_index,
        settings_repo: SettingsRepo::new(dynamodb_client),
        s3_client,
    };

    let app = router(state);

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default())
            .service(app);

        lambda_http::run(app).await?;
    } else {
        let address = format!("0.0.0.0:{}", env::var("PORT").unwrap_or("3000".to_string()));
        let listener = TcpListener::bind(&address).await?;
        tracing::info!("Api listening on {}", address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", err);
                }
            })
            .await?;
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/prescriptions",
            post(save_prescription).get(list_prescriptions),
        )
        .route(
            "/prescriptions/:id",
            get(get_prescription).delete(delete_prescription),
        )
        .route("/prescriptions/image/upload-url", post(get_upload_url))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/orders", post(place_order))
        .with_state(state)
}

fn command_metadata() -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("command_id".to_string(), Ulid::new().to_string());
    metadata
}

fn domain_status(err: &Error) -> StatusCode {
    match err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Forbidden => StatusCode::FORBIDDEN,
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::Uniqueness { .. } => StatusCode::CONFLICT,
        Error::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn domain_error(err: Error) -> (StatusCode, String) {
    (domain_status(&err), err.to_string())
}

fn command_error(err: AggregateError<Error>) -> (StatusCode, String) {
    match err {
        AggregateError::UserError(err) => domain_error(err),
        AggregateError::AggregateConflict => (
            StatusCode::CONFLICT,
            "Prescription was modified concurrently".to_string(),
        ),
        other => {
            tracing::error!("Command failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

async fn load_owned(
    state: &AppState,
    id: &str,
    user: &UserId,
) -> Result<PrescriptionRow, (StatusCode, String)> {
    let view = state
        .prescriptions_repo
        .load(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .filter(|view| !view.prescription.deleted)
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;

    if !view.prescription.is_owned_by(&user.0) {
        return Err(domain_error(Error::Forbidden));
    }

    Ok(PrescriptionRow::from(&view.prescription))
}

// Save prescription
async fn save_prescription(
    user: UserId,
    State(state): State<AppState>,
    Json(input): Json<SavePrescriptionInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let aggregate_id = Ulid::new().to_string();

    let command = prescriptions::Command::SavePrescription {
        id: aggregate_id.clone(),
        user_id: user.0.clone(),
        prescription_name: input.prescription_name,
        medicines: input.medicines,
        notes: input.notes,
        image_key: input.prescription_image_url,
    };

    state
        .prescriptions_cqrs
        .execute_with_metadata(&aggregate_id, command, command_metadata())
        .await
        .map_err(command_error)?;

    tracing::info!("Saved prescription {} for {}", aggregate_id, user.0);
    let row = load_owned(&state, &aggregate_id, &user).await?;

    Ok((StatusCode::CREATED, Json(row)))
}

// List prescriptions, newest first
async fn list_prescriptions(
    user: UserId,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .prescriptions_index
        .list(&user.0)
        .await
        .map_err(domain_error)?;

    Ok(Json(rows))
}

// Get prescription
async fn get_prescription(
    user: UserId,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    Ok(Json(load_owned(&state, &id, &user).await?))
}

// Delete prescription
async fn delete_prescription(
    user: UserId,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let command = prescriptions::Command::DeletePrescription { user_id: user.0 };

    state
        .prescriptions_cqrs
        .execute_with_metadata(&id, command, command_metadata())
        .await
        .map_err(command_error)?;

    Ok(StatusCode::NO_CONTENT)
}

// Get S3 presigned URL for the prescription image
async fn get_upload_url(
    user: UserId,
    State(state): State<AppState>,
    Json(input): Json<UploadImageInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !input.content_type.starts_with("image/") {
        return Err(domain_error(Error::validation("Please select an image file")));
    }

    let bucket = env::var("PRESCRIPTIONS_BUCKET").unwrap_or("medpal-prescriptions".to_string());
    let key = format!("prescriptions/{}/{}", user.0, Ulid::new());

    let presigning = aws_sdk_s3::presigning::PresigningConfig::expires_in(UPLOAD_URL_TTL)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let presigned = state
        .s3_client
        .put_object()
        .bucket(&bucket)
        .key(&key)
        .content_type(&input.content_type)
        .presigned(presigning)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!("Issued upload url for {}", input.file_name);

    Ok(Json(serde_json::json!({
        "upload_url": presigned.uri(),
        "key": key,
    })))
}

// Get settings, empty when never saved
async fn get_settings(
    user: UserId,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let settings = state
        .settings_repo
        .load(&user.0)
        .await
        .map_err(domain_error)?
        .unwrap_or(UserSettings {
            user_id: user.0,
            mapbox_token: None,
        });

    Ok(Json(settings))
}

// Save settings
async fn put_settings(
    user: UserId,
    State(state): State<AppState>,
    Json(input): Json<SettingsInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let settings = UserSettings::with_token(user.0, &input.mapbox_token).map_err(domain_error)?;

    state
        .settings_repo
        .upsert(&settings)
        .await
        .map_err(domain_error)?;

    Ok(Json(settings))
}

// Place a simulated delivery order
async fn place_order(
    user: UserId,
    Json(input): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let confirmation = orders::place(&input).map_err(domain_error)?;

    tracing::info!(
        "Order {} placed by {} at {}",
        confirmation.order_id,
        user.0,
        confirmation.pharmacy_name
    );

    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt;

    use super::*;

    async fn whoami(user: UserId) -> String {
        user.0
    }

    async fn call(request: Request<Body>) -> (StatusCode, String) {
        let app = Router::new().route("/whoami", get(whoami));
        let res = app.oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn caller_is_read_from_header() {
        let (status, body) = call(
            Request::get("/whoami")
                .header(USER_ID_HEADER, " user-1 ")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-1");
    }

    #[tokio::test]
    async fn missing_caller_is_unauthorized() {
        let (status, _) = call(Request::get("/whoami").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            Request::get("/whoami")
                .header(USER_ID_HEADER, "")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        let not_found = Error::NotFound {
            entity: "Prescription".to_string(),
        };
        assert_eq!(domain_status(&not_found), StatusCode::NOT_FOUND);
        assert_eq!(domain_status(&Error::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            domain_status(&Error::validation("no medicines")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            domain_status(&Error::Uniqueness {
                field: "id".to_string()
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn aggregate_user_errors_keep_their_status() {
        let (status, message) = command_error(AggregateError::UserError(Error::Forbidden));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, "Forbidden action");

        let (status, _) = command_error(AggregateError::AggregateConflict);
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
