use std::{env, sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::post,
    Router,
};
use gateway::{Completions, GatewayClient, GatewayConfig, GatewayError, Speech, SpeechClient};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod error;
mod handlers;

use error::FunctionError;

#[derive(Clone)]
pub struct AppState {
    /// Why the client could not be built, when it could not
    completions: Result<Arc<dyn Completions>, GatewayError>,
    speech: Result<Arc<dyn Speech>, GatewayError>,
}

impl AppState {
    fn from_env() -> Self {
        let completions = match GatewayClient::new(GatewayConfig::from_env()) {
            Ok(client) => {
                tracing::info!("AI gateway ready with model {}", client.model());
                Ok(Arc::new(client) as Arc<dyn Completions>)
            }
            Err(err) => {
                tracing::warn!("AI gateway disabled: {}", err);
                Err(err)
            }
        };

        let speech = match SpeechClient::from_env() {
            Ok(client) => Ok(Arc::new(client) as Arc<dyn Speech>),
            Err(err) => {
                tracing::warn!("Speech synthesis disabled: {}", err);
                Err(err)
            }
        };

        Self {
            completions,
            speech,
        }
    }

    // A missing key only fails the request that needs it.
    fn completions(&self) -> Result<&dyn Completions, FunctionError> {
        self.completions.as_deref().map_err(|err| err.clone().into())
    }

    fn speech(&self) -> Result<&dyn Speech, FunctionError> {
        self.speech.as_deref().map_err(|err| err.clone().into())
    }
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/analyze-medication", post(handlers::analyze_medication))
        .route("/extract-prescription", post(handlers::extract_prescription))
        .route("/drug-autocomplete", post(handlers::drug_autocomplete))
        .route("/drug-info", post(handlers::drug_info))
        .route("/prescription-chat", post(handlers::prescription_chat))
        .route("/prescription-insights", post(handlers::prescription_insights))
        .route("/text-to-speech", post(handlers::text_to_speech))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let app = router(AppState::from_env());

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default())
            .service(app);

        lambda_http::run(app).await?;
    } else {
        serve_local(app).await?;
    }

    Ok(())
}

async fn serve_local(app: Router) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{}", env::var("PORT").unwrap_or("3001".to_string()));
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Functions listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
