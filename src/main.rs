use std::{net::Ipv4Addr, sync::Arc};

use tracing::info;

use ordo::{config::Config, create_app, db, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("reading configuration");

    let db = db::init_db(&config.database_path).expect("initializing database");
    match db::cleanup_expired_sessions(&db) {
        Ok(removed) => info!(removed, "Removed expired sessions"),
        Err(err) => tracing::warn!(%err, "Failed to remove expired sessions"),
    }

    let state = AppState {
        db,
        base_path: Arc::new(config.base_path.clone()),
        session_days: config.session_days,
    };
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("binding listener");

    info!(database = %config.database_path, "running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}
