pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod search;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub base_path: Arc<String>,
    pub session_days: i64,
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.base_path.clone();

    let api_routes = Router::new()
        .route("/api/register", post(handlers::auth::register))
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route(
            "/api/user",
            get(handlers::auth::current_user).put(handlers::auth::update_profile),
        )
        .route(
            "/api/tokens",
            get(handlers::auth::list_tokens).post(handlers::auth::create_token),
        )
        .route("/api/tokens/{id}", delete(handlers::auth::revoke_token))
        .route(
            "/api/todos",
            get(handlers::todos::list_all_todos).post(handlers::todos::create_new_todo),
        )
        .route("/api/todos/order", put(handlers::todos::reorder))
        .route("/api/todos/search", get(handlers::todos::search_todos))
        .route("/api/todos-deleted", get(handlers::trash::list_deleted))
        .route(
            "/api/todos/{id}",
            get(handlers::todos::get_single_todo)
                .put(handlers::todos::update_existing_todo)
                .delete(handlers::todos::delete_existing_todo),
        )
        .route(
            "/api/todos/{id}/restore",
            post(handlers::trash::restore_deleted_todo),
        )
        .route(
            "/api/todos/{id}/details/{detail_id}/restore",
            post(handlers::trash::restore_deleted_detail),
        )
        .route(
            "/api/todoDetails/{id}/order",
            put(handlers::details::reorder),
        )
        .route("/api/tododetails", post(handlers::details::create_new_detail))
        .route(
            "/api/tododetails/{id}",
            get(handlers::details::get_single_detail)
                .put(handlers::details::update_existing_detail)
                .delete(handlers::details::delete_existing_detail),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        api_routes
    } else {
        Router::new().nest(&*base_path, api_routes)
    }
}
