//! Positions within an ordering scope.
//!
//! New rows are placed after everything ever created in their scope, soft-deleted rows
//! included, so a later restore can never land on a position already handed out. Reorders
//! rewrite a whole scope inside one transaction: either every submitted id gets its new
//! position or nothing changes.

use std::collections::{BTreeSet, HashSet};

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};

use super::todos::{active_owned_todo, details_of, list_todos_internal, DetailFilter};
use super::{lock, now, DbPool};
use crate::error::{AppError, FieldErrors};
use crate::models::{TodoDetail, TodoWithDetails};

/// The set of siblings whose positions are compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// All todos of one user.
    Owner(i64),
    /// All details of one todo.
    Todo(i64),
}

impl Scope {
    fn table(self) -> &'static str {
        match self {
            Scope::Owner(_) => "todos",
            Scope::Todo(_) => "todo_details",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Scope::Owner(_) => "user_id",
            Scope::Todo(_) => "todo_id",
        }
    }

    fn id(self) -> i64 {
        match self {
            Scope::Owner(id) | Scope::Todo(id) => id,
        }
    }
}

/// Position for a row about to be inserted into `scope`.
///
/// Deleted rows count: taking the maximum over active rows only would hand out a position a
/// trashed sibling still holds.
pub fn next_position(conn: &Connection, scope: Scope) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM {} WHERE {} = ?1",
            scope.table(),
            scope.column()
        ),
        [scope.id()],
        |row| row.get(0),
    )
}

/// A validated, duplicate-free sequence of ids in their desired display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSequence(Vec<i64>);

impl OrderSequence {
    /// Parses `{ "order": [id, ...] }`.
    pub fn from_order_payload(payload: &Value) -> Result<Self, AppError> {
        match payload.get("order") {
            Some(order) => Self::from_id_list(order),
            None => Err(AppError::Validation(FieldErrors::single(
                "order",
                "The order field is required.",
            ))),
        }
    }

    /// Parses `{ "order": [id, ...] }` or `{ "todos": [{ "id": .., "order": .. }, ...] }`.
    ///
    /// The second form is sorted by the submitted `order` values (ties keep their submission
    /// position) and from then on behaves exactly like the first.
    pub fn from_todos_payload(payload: &Value) -> Result<Self, AppError> {
        if payload.get("order").is_some() {
            return Self::from_order_payload(payload);
        }
        let Some(todos) = payload.get("todos") else {
            return Err(AppError::Validation(FieldErrors::single(
                "order",
                "The order field is required.",
            )));
        };
        let Some(entries) = todos.as_array() else {
            return Err(AppError::Validation(FieldErrors::single(
                "todos",
                "The todos field must be an array.",
            )));
        };

        let mut errors = FieldErrors::new();
        let mut pairs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let id = entry.get("id").and_then(Value::as_i64);
            let order = entry.get("order").and_then(Value::as_i64);
            if id.is_none() {
                errors.add(format!("todos.{index}.id"), "The id must be an integer.");
            }
            if order.is_none() {
                errors.add(format!("todos.{index}.order"), "The order must be an integer.");
            }
            if let (Some(id), Some(order)) = (id, order) {
                pairs.push((order, id));
            }
        }
        errors.into_result()?;

        pairs.sort_by_key(|(order, _)| *order);
        Self::from_ids(pairs.into_iter().map(|(_, id)| id).collect(), "todos")
    }

    fn from_id_list(order: &Value) -> Result<Self, AppError> {
        let Some(elements) = order.as_array() else {
            return Err(AppError::Validation(FieldErrors::single(
                "order",
                "The order field must be an array.",
            )));
        };

        let mut errors = FieldErrors::new();
        let mut ids = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            match element.as_i64() {
                Some(id) => ids.push(id),
                None => errors.add(format!("order.{index}"), "The id must be an integer."),
            }
        }
        errors.into_result()?;

        Self::from_ids(ids, "order")
    }

    fn from_ids(ids: Vec<i64>, field: &str) -> Result<Self, AppError> {
        if ids.is_empty() {
            return Err(AppError::Validation(FieldErrors::single(
                field,
                "At least one id is required.",
            )));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let mut errors = FieldErrors::new();
        for (index, id) in ids.iter().enumerate() {
            if !seen.insert(*id) {
                errors.add(format!("{field}.{index}"), format!("Duplicate id {id}."));
            }
        }
        errors.into_result()?;

        Ok(OrderSequence(ids))
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }
}

/// Rewrites the order of the caller's todos and returns the full active listing.
pub fn reorder_todos(
    pool: &DbPool,
    user_id: i64,
    sequence: &OrderSequence,
) -> Result<Vec<TodoWithDetails>, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    let scope = Scope::Owner(user_id);
    apply_order(&tx, scope, sequence.ids())
        .inspect_err(|err| warn!(?scope, %err, "Rejected reorder batch"))?;
    let todos = list_todos_internal(&tx, user_id)?;
    tx.commit()?;

    info!(user_id, count = sequence.ids().len(), "Reordered todos");
    Ok(todos)
}

/// Rewrites the order of one todo's details and returns that todo's active details.
pub fn reorder_details(
    pool: &DbPool,
    user_id: i64,
    todo_id: i64,
    sequence: &OrderSequence,
) -> Result<Vec<TodoDetail>, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    active_owned_todo(&tx, user_id, todo_id)?;
    let scope = Scope::Todo(todo_id);
    apply_order(&tx, scope, sequence.ids())
        .inspect_err(|err| warn!(?scope, %err, "Rejected reorder batch"))?;
    let details = details_of(&tx, todo_id, DetailFilter::Active)?;
    tx.commit()?;

    info!(todo_id, count = sequence.ids().len(), "Reordered todo details");
    Ok(details)
}

// Every check runs before the first write, so an error leaves the scope untouched even
// before the surrounding transaction is rolled back.
fn apply_order(conn: &Connection, scope: Scope, ids: &[i64]) -> Result<(), AppError> {
    let (table, column) = (scope.table(), scope.column());

    for id in ids {
        let row: Option<(i64, Option<i64>)> = conn
            .query_row(
                &format!("SELECT {column}, deleted_at FROM {table} WHERE id = ?1"),
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => return Err(AppError::ForeignReference(*id)),
            Some((owner, _)) if owner != scope.id() => return Err(AppError::OwnershipViolation),
            Some((_, Some(_))) => return Err(AppError::ForeignReference(*id)),
            Some(_) => {}
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {table} WHERE {column} = ?1 AND deleted_at IS NULL"
    ))?;
    let active = stmt
        .query_map([scope.id()], |row| row.get::<_, i64>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    let submitted: HashSet<i64> = ids.iter().copied().collect();
    let missing: Vec<String> = active
        .iter()
        .filter(|id| !submitted.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "order",
            format!(
                "The order must list every active item; missing ids: {}.",
                missing.join(", ")
            ),
        )));
    }

    let updated_at = now();
    let mut update = conn.prepare(&format!(
        "UPDATE {table} SET position = ?1, updated_at = ?2
         WHERE id = ?3 AND {column} = ?4 AND deleted_at IS NULL"
    ))?;
    for (index, id) in ids.iter().enumerate() {
        update.execute((index as i64 + 1, updated_at, id, scope.id()))?;
    }

    Ok(())
}
