mod error;
mod routes;
mod storage;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    /// Accept the fixed `000000` escape code during second-factor
    /// verification. Development only; off unless DUECAL_2FA_BYPASS is set.
    pub allow_code_bypass: bool,
    pub canvas_base_url: String,
    pub google_base_url: String,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duecal_server=info,tower_http=info".into()),
        )
        .init();

    // Data directory
    let data_dir = std::env::var("DUECAL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));

    tracing::info!("data directory: {}", data_dir.display());

    let db = storage::init_db(&data_dir)?;
    tracing::info!("database initialized");

    let allow_code_bypass = env_flag("DUECAL_2FA_BYPASS");
    if allow_code_bypass {
        tracing::warn!("second-factor escape code enabled — development use only");
    }

    let config = AppConfig {
        allow_code_bypass,
        canvas_base_url: env_or("CANVAS_BASE_URL", duecal_providers::canvas::CANVAS_BASE_URL),
        google_base_url: env_or("GOOGLE_BASE_URL", duecal_providers::google::GOOGLE_BASE_URL),
    };

    let state = AppState { db, config };

    // Build API routes
    let api = Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/verify-2fa", post(routes::auth::verify_2fa))
        .route("/auth/setup-2fa", post(routes::auth::setup_2fa))
        .route("/auth/2fa-qr", get(routes::auth::provisioning))
        // Users
        .route("/user/{id}", get(routes::users::get_user))
        // External account linking + sync
        .route("/canvas/link", post(routes::link::canvas_link))
        .route("/canvas/courses", get(routes::link::list_courses))
        .route("/google/link", post(routes::link::google_link))
        .route("/accounts/connect", post(routes::accounts::connect_account))
        // Calendar events
        .route(
            "/calendar/events",
            get(routes::events::list_events).post(routes::events::add_event),
        )
        .route(
            "/calendar/events/{id}",
            axum::routing::put(routes::events::update_event).delete(routes::events::delete_event),
        )
        // Settings
        .route(
            "/settings",
            get(routes::settings::get_settings).put(routes::settings::update_settings),
        );

    let app = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let host = env_or("HOST", "127.0.0.1");
    let port = env_or("PORT", "3001");
    tracing::info!("starting server at http://{host}:{port}");

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
