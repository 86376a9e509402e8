use kinisi_api::{build_router, config::Config, db, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinisi_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env();

    let pool = db::create_pool(&config.database_url).await;

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let addr = config.listen_addr();
    let state = AppState::new(pool, config);

    state.rate_limiter.spawn_cleanup_worker();

    let app = build_router(state);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    // Client IP is needed for auth rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
