use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde_json::Value;

use crate::db::lifecycle::delete_detail;
use crate::db::ordering::{reorder_details, OrderSequence};
use crate::db::todos::{create_detail, get_detail, update_detail};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{CreateTodoDetail, Message, TodoDetail, UpdateTodoDetail};
use crate::AppState;

pub async fn create_new_detail(
    auth: Auth,
    State(state): State<AppState>,
    Json(req): Json<CreateTodoDetail>,
) -> Result<(StatusCode, Json<TodoDetail>), AppError> {
    let detail = create_detail(
        &state.db,
        auth.user_id,
        req.todo_id,
        req.description.as_deref(),
        req.completed.unwrap_or(false),
    )?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_single_detail(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TodoDetail>, AppError> {
    Ok(Json(get_detail(&state.db, auth.user_id, id)?))
}

pub async fn update_existing_detail(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTodoDetail>,
) -> Result<Json<TodoDetail>, AppError> {
    let detail = update_detail(
        &state.db,
        auth.user_id,
        id,
        req.description.as_deref(),
        req.completed,
    )?;
    Ok(Json(detail))
}

pub async fn delete_existing_detail(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Message>, AppError> {
    delete_detail(&state.db, auth.user_id, id)?;
    Ok(Json(Message {
        message: "Todo detail deleted.".to_string(),
    }))
}

pub async fn reorder(
    auth: Auth,
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
    Json(payload): Json<Value>,
) -> Result<Json<Vec<TodoDetail>>, AppError> {
    let sequence = OrderSequence::from_order_payload(&payload)?;
    let details = reorder_details(&state.db, auth.user_id, todo_id, &sequence)?;
    Ok(Json(details))
}
