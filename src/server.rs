//! # Server Configuration
//!
//! This module contains application state, router construction, and the
//! server entry point that wires the HTTP API together with the background
//! poller, executor and token refresh services under one shutdown token.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::AdapterRegistry;
use crate::ai::AiGatewayClient;
use crate::auth::auth_middleware;
use crate::cache::PersonaCache;
use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::executor::ResponseExecutor;
use crate::handlers;
use crate::poller::ResponsePoller;
use crate::repositories::ConnectionRepository;
use crate::token_refresh::TokenRefreshService;

/// TTL for cached persona profiles
const PERSONA_CACHE_TTL: Duration = Duration::from_secs(60);

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub registry: Arc<AdapterRegistry>,
    pub ai: Arc<AiGatewayClient>,
    pub persona_cache: Arc<PersonaCache>,
    pub token_refresh: Arc<TokenRefreshService>,
}

/// Builds application state from configuration and an established database
/// connection.
pub fn create_app_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    let crypto_key = config
        .crypto_key
        .clone()
        .and_then(|bytes| CryptoKey::new(bytes).ok())
        .unwrap_or_else(|| CryptoKey::new(vec![0u8; 32]).expect("32-byte key"));

    let config = Arc::new(config);
    let registry = Arc::new(AdapterRegistry::from_config(&config));
    let ai = Arc::new(AiGatewayClient::new(&config.ai).expect("AI gateway client builds"));
    let persona_cache = Arc::new(PersonaCache::new(PERSONA_CACHE_TTL));

    let connection_repo = Arc::new(ConnectionRepository::new(
        Arc::new(db.clone()),
        crypto_key.clone(),
    ));
    let token_refresh = Arc::new(TokenRefreshService::new(
        config.clone(),
        Arc::new(db.clone()),
        connection_repo,
        registry.clone(),
    ));

    AppState {
        config,
        db,
        crypto_key,
        registry,
        ai,
        persona_cache,
        token_refresh,
    }
}

/// Test-friendly state constructor used by handler unit tests.
pub fn create_test_app_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    create_app_state(config, db)
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/actions", post(handlers::actions::execute_action))
        .route("/platforms", get(handlers::platforms::list_platforms))
        .route("/connect/{platform}", get(handlers::connect::authorize))
        .route(
            "/connections",
            get(handlers::connections::list_connections),
        )
        .route(
            "/connections/{id}",
            delete(handlers::connections::revoke_connection),
        )
        .route(
            "/conversations",
            get(handlers::conversations::list_conversations),
        )
        .route(
            "/conversations/{id}",
            patch(handlers::conversations::update_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversations::list_messages),
        )
        .route(
            "/conversations/{id}/reply",
            post(handlers::conversations::reply),
        )
        .route(
            "/personas",
            get(handlers::personas::get_persona).put(handlers::personas::put_persona),
        )
        .route("/responder", post(handlers::responder::toggle_responder))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route("/jobs/{id}/retry", post(handlers::jobs::retry_job))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/connect/{platform}/callback",
            get(handlers::connect::callback),
        )
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server and background services with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = create_app_state(config, db);
    let shutdown = CancellationToken::new();

    // Background poller: enqueues response jobs on each connection's cadence
    let poller = ResponsePoller::new(state.config.clone(), Arc::new(state.db.clone()));
    let poller_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = poller.run(poller_shutdown).await {
            error!(error = ?err, "Response poller exited with error");
        }
    });

    // Background executor: claims jobs and runs the responder pipeline
    let classifier = Classifier::new(state.ai.clone(), state.config.ai.context_turns);
    let executor = ResponseExecutor::new(
        Arc::new(state.db.clone()),
        state.registry.clone(),
        classifier,
        state.persona_cache.clone(),
        state.crypto_key.clone(),
        state.config.executor.clone(),
        state.config.rate_limit_policy.clone(),
    );
    let executor_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = executor.run(executor_shutdown).await {
            error!(error = ?err, "Response executor exited with error");
        }
    });

    // Background token refresh
    let token_refresh = state.token_refresh.clone();
    let refresh_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = token_refresh.run(refresh_shutdown).await {
            error!(error = ?err, "Token refresh service exited with error");
        }
    });

    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, profile = %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::actions::execute_action,
        crate::handlers::platforms::list_platforms,
        crate::handlers::connect::authorize,
        crate::handlers::connect::callback,
        crate::handlers::connections::list_connections,
        crate::handlers::connections::revoke_connection,
        crate::handlers::conversations::list_conversations,
        crate::handlers::conversations::list_messages,
        crate::handlers::conversations::reply,
        crate::handlers::conversations::update_conversation,
        crate::handlers::personas::get_persona,
        crate::handlers::personas::put_persona,
        crate::handlers::responder::toggle_responder,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::retry_job,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::PlatformErrorInfo,
            crate::handlers::types::ActionRequest,
            crate::handlers::types::ActionResponse,
            crate::handlers::platforms::PlatformInfo,
            crate::handlers::platforms::PlatformsResponse,
            crate::handlers::connect::AuthorizeResponse,
            crate::handlers::connect::CallbackResponse,
            crate::handlers::connections::ConnectionInfo,
            crate::handlers::connections::ConnectionsResponse,
            crate::handlers::conversations::ConversationInfo,
            crate::handlers::conversations::ConversationsResponse,
            crate::handlers::conversations::MessageInfo,
            crate::handlers::conversations::MessagesResponse,
            crate::handlers::conversations::ReplyRequest,
            crate::handlers::conversations::UpdateConversationRequest,
            crate::handlers::personas::PersonaInfo,
            crate::handlers::personas::PersonaRequest,
            crate::handlers::responder::ResponderToggleRequest,
            crate::handlers::responder::ResponderStateResponse,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
        )
    ),
    info(
        title = "Engage API",
        description = "Social engagement auto-responder service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
