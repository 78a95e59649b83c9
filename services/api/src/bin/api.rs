//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, FrameDirectoryCameraFactory, InMemorySink, OpenAiChatAdapter,
        OpenAiEmotionAdapter, OpenAiSstAdapter,
    },
    config::Config,
    error::ApiError,
    session::{SessionRegistry, SessionServices},
    web::{self, ApiDoc, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use companion_core::{
    AffectAnalyzer, CaptureDeviceFactory, Classifiers, FallbackReplyGenerator, PersistenceSink,
    ReplyGenerator, RuleBasedResponder, StdRandom,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Choose the Persistence Sink ---
    let sink: Arc<dyn PersistenceSink> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set. Emotional history is kept in memory only.");
            Arc::new(InMemorySink::new())
        }
    };

    // --- 3. Initialize Model Adapters ---
    let (classifiers, chat_adapter) = match &config.openai_api_key {
        Some(api_key) => {
            let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            let emotion_adapter = Arc::new(OpenAiEmotionAdapter::new(
                openai_client.clone(),
                config.emotion_model.clone(),
            ));
            let sst_adapter = Arc::new(OpenAiSstAdapter::new(
                openai_client.clone(),
                config.sst_model.clone(),
            ));
            let chat_adapter: Arc<dyn ReplyGenerator> = Arc::new(OpenAiChatAdapter::new(
                openai_client,
                config.chat_model.clone(),
            ));
            let classifiers = Classifiers {
                text: Some(emotion_adapter.clone()),
                image: Some(emotion_adapter),
                speech: Some(sst_adapter),
            };
            (classifiers, Some(chat_adapter))
        }
        None => {
            warn!("OPENAI_API_KEY is not set. Classifiers report 'unknown' and replies are rule-based.");
            (Classifiers::default(), None)
        }
    };

    let random = Arc::new(StdRandom::from_entropy());
    let responder = Arc::new(FallbackReplyGenerator::new(
        chat_adapter,
        Arc::new(RuleBasedResponder::new(random.clone())),
    ));
    let capture = config.capture_frames_dir.clone().map(|dir| {
        info!("Background capture reads frames from {}", dir.display());
        Arc::new(FrameDirectoryCameraFactory::new(dir)) as Arc<dyn CaptureDeviceFactory>
    });

    // --- 4. Build the Session Registry & Shared AppState ---
    let analyzer = Arc::new(AffectAnalyzer::new(
        classifiers,
        sink,
        config.scoring_policy.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new(SessionServices {
        analyzer,
        responder,
        random,
        capture,
        settings: config.session.clone(),
    }));
    let shutdown_token = CancellationToken::new();
    let sweeper = registry.clone().spawn_sweeper(shutdown_token.clone());
    let app_state = Arc::new(AppState::new(registry.clone()));

    // --- 5. Create the Web Router ---
    let frontend_origin = "http://localhost:3000"
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received.");
        })
        .await?;

    // --- 7. Stop Background Work ---
    shutdown_token.cancel();
    if let Err(e) = sweeper.await {
        warn!("Session sweeper ended abnormally: {}", e);
    }
    registry.shutdown().await;
    info!("Server stopped.");

    Ok(())
}
