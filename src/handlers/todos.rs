use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::db::lifecycle::delete_todo;
use crate::db::ordering::{reorder_todos, OrderSequence};
use crate::db::todos::{create_todo, get_todo, list_todos, update_todo};
use crate::error::{AppError, FieldErrors};
use crate::middleware::Auth;
use crate::models::{CreateTodo, TodoWithDetails, UpdateTodo};
use crate::search::{search, SearchResults};
use crate::AppState;

const MAX_QUERY_LEN: usize = 200;

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "title",
            "The title field is required.",
        )));
    }
    Ok(())
}

pub async fn list_all_todos(
    auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<TodoWithDetails>>, AppError> {
    let todos = list_todos(&state.db, auth.user_id)?;
    info!(user_id = auth.user_id, count = todos.len(), "Listed todos");
    Ok(Json(todos))
}

pub async fn create_new_todo(
    auth: Auth,
    State(state): State<AppState>,
    Json(req): Json<CreateTodo>,
) -> Result<(StatusCode, Json<TodoWithDetails>), AppError> {
    validate_title(&req.title)?;

    let todo = create_todo(&state.db, auth.user_id, &req.title, req.description.as_deref())?;
    info!(id = todo.todo.id, title = %todo.todo.title, order = todo.todo.position, "Created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_single_todo(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TodoWithDetails>, AppError> {
    Ok(Json(get_todo(&state.db, auth.user_id, id)?))
}

pub async fn update_existing_todo(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTodo>,
) -> Result<Json<TodoWithDetails>, AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }

    let todo = update_todo(&state.db, auth.user_id, id, req.title.as_deref())?;
    info!(id, "Updated todo");
    Ok(Json(todo))
}

pub async fn delete_existing_todo(
    auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_todo(&state.db, auth.user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder(
    auth: Auth,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Vec<TodoWithDetails>>, AppError> {
    let sequence = OrderSequence::from_todos_payload(&payload)?;
    let todos = reorder_todos(&state.db, auth.user_id, &sequence)?;
    Ok(Json(todos))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_todos(
    auth: Auth,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, AppError> {
    if params.q.chars().count() > MAX_QUERY_LEN {
        return Err(AppError::BadRequest("Search query is too long"));
    }
    let results = search(&state.db, auth.user_id, &params.q)?;
    info!(
        user_id = auth.user_id,
        matches = results.results.len(),
        "Searched todos"
    );
    Ok(Json(results))
}
