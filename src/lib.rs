use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use auth::rate_limit::RateLimitState;
use config::Config;
use services::events::SyncEvent;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub ws_tx: Option<broadcast::Sender<SyncEvent>>,
    pub rate_limiter: RateLimitState,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let (ws_tx, _) = broadcast::channel::<SyncEvent>(256);
        Self {
            db,
            config: Arc::new(config),
            ws_tx: Some(ws_tx),
            rate_limiter: RateLimitState::new(),
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = config.frontend_url.parse::<HeaderValue>().into_iter().collect();
    // e.g. testing from another device on the LAN
    if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
        origins.extend(extra.split(',').filter_map(|o| o.trim().parse().ok()));
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/confirm", post(handlers::auth::confirm))
        .route("/api/auth/resend-code", post(handlers::auth::resend_code))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        // Profile & preferences
        .route(
            "/api/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route("/api/timezones", get(handlers::profile::list_timezones))
        // Actions
        .route(
            "/api/actions",
            get(handlers::actions::list_actions).post(handlers::actions::create_action),
        )
        .route(
            "/api/actions/:id",
            get(handlers::actions::get_action)
                .put(handlers::actions::update_action)
                .delete(handlers::actions::delete_action),
        )
        .route(
            "/api/actions/:id/history",
            get(handlers::actions::action_history),
        )
        // Daily logs
        .route(
            "/api/daily-logs",
            get(handlers::daily_logs::list_daily_logs).post(handlers::daily_logs::set_count),
        )
        .route(
            "/api/daily-logs/adjust",
            post(handlers::daily_logs::adjust_count),
        )
        .route(
            "/api/daily-logs/:id",
            delete(handlers::daily_logs::delete_daily_log),
        )
        // Scores
        .route("/api/stats/summary", get(handlers::stats::get_summary))
        .route("/api/stats/weekly", get(handlers::stats::get_weekly_trend))
        // Danger zone
        .route("/api/data", delete(handlers::data::clear_all_data))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
