use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use crate::db::lifecycle::{restore_detail, restore_todo, trash};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{TodoWithDetails, Trash};
use crate::AppState;

pub async fn list_deleted(
    auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<Trash>, AppError> {
    let trash = trash(&state.db, auth.user_id)?;
    info!(
        user_id = auth.user_id,
        deleted_todos = trash.deleted_todos.len(),
        todos_with_deleted_details = trash.todos_with_deleted_details.len(),
        "Listed trash"
    );
    Ok(Json(trash))
}

pub async fn restore_deleted_todo(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TodoWithDetails>, AppError> {
    Ok(Json(restore_todo(&state.db, auth.user_id, id)?))
}

pub async fn restore_deleted_detail(
    auth: Auth,
    State(state): State<AppState>,
    Path((todo_id, detail_id)): Path<(i64, i64)>,
) -> Result<Json<TodoWithDetails>, AppError> {
    Ok(Json(restore_detail(&state.db, auth.user_id, todo_id, detail_id)?))
}
