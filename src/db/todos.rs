use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use super::ordering::{next_position, Scope};
use super::{lock, now, DbPool};
use crate::error::AppError;
use crate::models::{Todo, TodoDetail, TodoWithDetails};

pub(crate) const TODO_COLUMNS: &str =
    "id, user_id, title, position, created_at, updated_at, deleted_at";
pub(crate) const DETAIL_COLUMNS: &str =
    "id, todo_id, description, completed, position, created_at, updated_at, deleted_at";

pub(crate) fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
    })
}

pub(crate) fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<TodoDetail> {
    Ok(TodoDetail {
        id: row.get(0)?,
        todo_id: row.get(1)?,
        description: row.get(2)?,
        completed: row.get::<_, i32>(3)? != 0,
        position: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
    })
}

/// Which details of a todo a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailFilter {
    Active,
    Trashed,
    All,
}

impl DetailFilter {
    fn clause(self) -> &'static str {
        match self {
            DetailFilter::Active => "AND deleted_at IS NULL",
            DetailFilter::Trashed => "AND deleted_at IS NOT NULL",
            DetailFilter::All => "",
        }
    }
}

// Lookups. Everything here sees soft-deleted rows; callers decide what state they need.

pub(crate) fn find_todo(conn: &Connection, id: i64) -> Result<Option<Todo>, AppError> {
    let todo = conn
        .query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            [id],
            todo_from_row,
        )
        .optional()?;
    Ok(todo)
}

pub(crate) fn find_detail(conn: &Connection, id: i64) -> Result<Option<TodoDetail>, AppError> {
    let detail = conn
        .query_row(
            &format!("SELECT {DETAIL_COLUMNS} FROM todo_details WHERE id = ?1"),
            [id],
            detail_from_row,
        )
        .optional()?;
    Ok(detail)
}

/// The todo `id` in any state, provided `user_id` owns it.
pub(crate) fn owned_todo(conn: &Connection, user_id: i64, id: i64) -> Result<Todo, AppError> {
    match find_todo(conn, id)? {
        None => Err(AppError::NotFound),
        Some(todo) if todo.user_id != user_id => Err(AppError::OwnershipViolation),
        Some(todo) => Ok(todo),
    }
}

pub(crate) fn active_owned_todo(
    conn: &Connection,
    user_id: i64,
    id: i64,
) -> Result<Todo, AppError> {
    let todo = owned_todo(conn, user_id, id)?;
    if todo.deleted_at.is_some() {
        return Err(AppError::NotFound);
    }
    Ok(todo)
}

/// The detail `id` in any state together with its parent, provided `user_id` owns the parent.
pub(crate) fn owned_detail(
    conn: &Connection,
    user_id: i64,
    id: i64,
) -> Result<(Todo, TodoDetail), AppError> {
    let detail = find_detail(conn, id)?.ok_or(AppError::NotFound)?;
    let todo = owned_todo(conn, user_id, detail.todo_id)?;
    Ok((todo, detail))
}

pub(crate) fn details_of(
    conn: &Connection,
    todo_id: i64,
    filter: DetailFilter,
) -> Result<Vec<TodoDetail>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DETAIL_COLUMNS} FROM todo_details WHERE todo_id = ?1 {}
         ORDER BY position ASC, id ASC",
        filter.clause()
    ))?;
    let details = stmt
        .query_map([todo_id], detail_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(details)
}

pub(crate) fn with_details(
    conn: &Connection,
    todo: Todo,
    filter: DetailFilter,
) -> Result<TodoWithDetails, AppError> {
    let todo_details = details_of(conn, todo.id, filter)?;
    Ok(TodoWithDetails { todo, todo_details })
}

/// The active listing: active todos of `user_id`, each with its active details.
pub(crate) fn list_todos_internal(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<TodoWithDetails>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TODO_COLUMNS} FROM todos
         WHERE user_id = ?1 AND deleted_at IS NULL
         ORDER BY position ASC, id ASC"
    ))?;
    let todos = stmt
        .query_map([user_id], todo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    // A detail only shows up when both it and its parent are active.
    let mut stmt = conn.prepare(
        "SELECT d.id, d.todo_id, d.description, d.completed, d.position,
                d.created_at, d.updated_at, d.deleted_at
         FROM todo_details d
         JOIN todos t ON t.id = d.todo_id
         WHERE t.user_id = ?1 AND t.deleted_at IS NULL AND d.deleted_at IS NULL
         ORDER BY d.position ASC, d.id ASC",
    )?;
    let mut grouped: HashMap<i64, Vec<TodoDetail>> = HashMap::new();
    for detail in stmt.query_map([user_id], detail_from_row)? {
        let detail = detail?;
        grouped.entry(detail.todo_id).or_default().push(detail);
    }

    Ok(todos
        .into_iter()
        .map(|todo| TodoWithDetails {
            todo_details: grouped.remove(&todo.id).unwrap_or_default(),
            todo,
        })
        .collect())
}

// Todo operations
pub fn create_todo(
    pool: &DbPool,
    user_id: i64,
    title: &str,
    description: Option<&str>,
) -> Result<TodoWithDetails, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    let position = next_position(&tx, Scope::Owner(user_id))?;
    tx.execute(
        "INSERT INTO todos (user_id, title, position) VALUES (?1, ?2, ?3)",
        (user_id, title, position),
    )?;
    let todo_id = tx.last_insert_rowid();

    // Every new todo starts with one detail carrying the submitted description.
    let detail_position = next_position(&tx, Scope::Todo(todo_id))?;
    tx.execute(
        "INSERT INTO todo_details (todo_id, description, completed, position)
         VALUES (?1, ?2, 0, ?3)",
        (todo_id, description, detail_position),
    )?;

    let todo = find_todo(&tx, todo_id)?.ok_or(AppError::NotFound)?;
    let todo = with_details(&tx, todo, DetailFilter::Active)?;
    tx.commit()?;

    Ok(todo)
}

pub fn list_todos(pool: &DbPool, user_id: i64) -> Result<Vec<TodoWithDetails>, AppError> {
    let conn = lock(pool)?;
    list_todos_internal(&conn, user_id)
}

pub fn get_todo(pool: &DbPool, user_id: i64, id: i64) -> Result<TodoWithDetails, AppError> {
    let conn = lock(pool)?;
    let todo = active_owned_todo(&conn, user_id, id)?;
    with_details(&conn, todo, DetailFilter::Active)
}

pub fn update_todo(
    pool: &DbPool,
    user_id: i64,
    id: i64,
    title: Option<&str>,
) -> Result<TodoWithDetails, AppError> {
    let conn = lock(pool)?;
    active_owned_todo(&conn, user_id, id)?;

    if let Some(title) = title {
        conn.execute(
            "UPDATE todos SET title = ?1, updated_at = ?2 WHERE id = ?3",
            (title, now(), id),
        )?;
    }

    let todo = active_owned_todo(&conn, user_id, id)?;
    with_details(&conn, todo, DetailFilter::Active)
}

// TodoDetail operations
pub fn create_detail(
    pool: &DbPool,
    user_id: i64,
    todo_id: i64,
    description: Option<&str>,
    completed: bool,
) -> Result<TodoDetail, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    active_owned_todo(&tx, user_id, todo_id)?;
    let position = next_position(&tx, Scope::Todo(todo_id))?;
    tx.execute(
        "INSERT INTO todo_details (todo_id, description, completed, position)
         VALUES (?1, ?2, ?3, ?4)",
        (todo_id, description, completed as i32, position),
    )?;
    let id = tx.last_insert_rowid();

    let detail = find_detail(&tx, id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    info!(id, todo_id, position, "Created todo detail");
    Ok(detail)
}

pub fn get_detail(pool: &DbPool, user_id: i64, id: i64) -> Result<TodoDetail, AppError> {
    let conn = lock(pool)?;
    let (_, detail) = owned_detail(&conn, user_id, id)?;
    if detail.deleted_at.is_some() {
        return Err(AppError::NotFound);
    }
    Ok(detail)
}

pub fn update_detail(
    pool: &DbPool,
    user_id: i64,
    id: i64,
    description: Option<&str>,
    completed: Option<bool>,
) -> Result<TodoDetail, AppError> {
    let conn = lock(pool)?;
    let (_, detail) = owned_detail(&conn, user_id, id)?;
    if detail.deleted_at.is_some() {
        return Err(AppError::NotFound);
    }

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(d) = description {
        updates.push("description = ?");
        params.push(Box::new(d.to_string()));
    }
    if let Some(c) = completed {
        updates.push("completed = ?");
        params.push(Box::new(c as i32));
    }

    if updates.is_empty() {
        return Ok(detail);
    }

    updates.push("updated_at = ?");
    params.push(Box::new(now()));
    params.push(Box::new(id));

    let query = format!(
        "UPDATE todo_details SET {} WHERE id = ?",
        updates.join(", ")
    );

    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    conn.execute(&query, params_refs.as_slice())?;

    find_detail(&conn, id)?.ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::lifecycle::{delete_detail, delete_todo};
    use crate::db::test_support::{pool, user};

    #[test]
    fn create_todo_adds_an_initial_detail() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "Groceries", Some("milk")).unwrap();

        assert_eq!(todo.todo.title, "Groceries");
        assert_eq!(todo.todo.position, 1);
        assert_eq!(todo.todo_details.len(), 1);
        assert_eq!(todo.todo_details[0].description.as_deref(), Some("milk"));
        assert!(!todo.todo_details[0].completed);
    }

    #[test]
    fn listing_hides_deleted_todos_and_details() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let keep = create_todo(&pool, alice, "keep", Some("a")).unwrap();
        let gone = create_todo(&pool, alice, "gone", None).unwrap();
        let hidden = create_detail(&pool, alice, keep.todo.id, Some("b"), false).unwrap();

        delete_todo(&pool, alice, gone.todo.id).unwrap();
        delete_detail(&pool, alice, hidden.id).unwrap();

        let listed = list_todos(&pool, alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].todo.id, keep.todo.id);
        assert_eq!(listed[0].todo_details.len(), 1);
    }

    #[test]
    fn foreign_todos_are_forbidden_and_missing_ones_not_found() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let bob = user(&pool, "bob@example.com");
        let todo = create_todo(&pool, alice, "mine", None).unwrap();

        assert!(matches!(
            get_todo(&pool, bob, todo.todo.id),
            Err(AppError::OwnershipViolation)
        ));
        assert!(matches!(get_todo(&pool, alice, 404), Err(AppError::NotFound)));
        assert!(matches!(
            create_detail(&pool, bob, todo.todo.id, None, false),
            Err(AppError::OwnershipViolation)
        ));
    }

    #[test]
    fn update_detail_changes_only_given_fields() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "todo", Some("before")).unwrap();
        let id = todo.todo_details[0].id;

        let detail = update_detail(&pool, alice, id, None, Some(true)).unwrap();
        assert!(detail.completed);
        assert_eq!(detail.description.as_deref(), Some("before"));
        assert_eq!(detail.todo_id, todo.todo.id);

        let detail = update_detail(&pool, alice, id, Some("after"), None).unwrap();
        assert!(detail.completed);
        assert_eq!(detail.description.as_deref(), Some("after"));
    }
}
