//! Soft deletion and restoration of todos and their details.
//!
//! Nothing here removes rows. A todo and its details are deleted independently: deleting
//! a todo leaves its details untouched, so either can be restored first. Restoring a todo
//! brings back every trashed detail with it; restoring a detail never touches its parent.

use tracing::info;

use super::todos::{
    details_of, find_detail, owned_detail, owned_todo, todo_from_row, with_details, DetailFilter,
    TODO_COLUMNS,
};
use super::{lock, now, DbPool};
use crate::error::AppError;
use crate::models::{
    DeletedTodo, DeletionType, Todo, TodoDetail, TodoWithDeletedDetails, TodoWithDetails, Trash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Deleted { at: i64 },
}

impl Lifecycle {
    pub fn from_deleted_at(deleted_at: Option<i64>) -> Self {
        match deleted_at {
            Some(at) => Lifecycle::Deleted { at },
            None => Lifecycle::Active,
        }
    }

    pub fn deleted_at(self) -> Option<i64> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(at),
        }
    }

    pub fn is_active(self) -> bool {
        self == Lifecycle::Active
    }

    /// The state after a delete at `now`, or `None` when already deleted.
    pub fn delete(self, now: i64) -> Option<Lifecycle> {
        match self {
            Lifecycle::Active => Some(Lifecycle::Deleted { at: now }),
            Lifecycle::Deleted { .. } => None,
        }
    }

    /// The state after a restore, or `None` when already active.
    pub fn restore(self) -> Option<Lifecycle> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { .. } => Some(Lifecycle::Active),
        }
    }
}

impl Todo {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_deleted_at(self.deleted_at)
    }
}

impl TodoDetail {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_deleted_at(self.deleted_at)
    }
}

/// What a restore actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub todo_restored: bool,
    pub details_restored: Vec<i64>,
}

/// A todo with every one of its details, trashed ones included.
#[derive(Debug, Clone)]
pub struct TodoAggregate {
    pub todo: Todo,
    pub details: Vec<TodoDetail>,
}

impl TodoAggregate {
    /// Restores the todo and, with it, each trashed detail. An active todo is left as is,
    /// details included.
    pub fn restore(&mut self) -> RestoreReport {
        let Some(next) = self.todo.lifecycle().restore() else {
            return RestoreReport::default();
        };
        self.todo.deleted_at = next.deleted_at();

        let mut details_restored = Vec::new();
        for detail in &mut self.details {
            if let Some(next) = detail.lifecycle().restore() {
                detail.deleted_at = next.deleted_at();
                details_restored.push(detail.id);
            }
        }

        RestoreReport {
            todo_restored: true,
            details_restored,
        }
    }
}

/// Soft-deletes a todo. Returns `false` when it was already deleted.
pub fn delete_todo(pool: &DbPool, user_id: i64, id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let todo = owned_todo(&conn, user_id, id)?;

    let Some(next) = todo.lifecycle().delete(now()) else {
        return Ok(false);
    };
    conn.execute(
        "UPDATE todos SET deleted_at = ?1 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
        (next.deleted_at(), id, user_id),
    )?;

    info!(id, user_id, "Deleted todo");
    Ok(true)
}

/// Soft-deletes a detail. Returns `false` when it was already deleted.
pub fn delete_detail(pool: &DbPool, user_id: i64, id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let (_, detail) = owned_detail(&conn, user_id, id)?;

    let Some(next) = detail.lifecycle().delete(now()) else {
        return Ok(false);
    };
    conn.execute(
        "UPDATE todo_details SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        (next.deleted_at(), id),
    )?;

    info!(id, todo_id = detail.todo_id, "Deleted todo detail");
    Ok(true)
}

/// Restores a todo and all of its trashed details in one transaction.
pub fn restore_todo(pool: &DbPool, user_id: i64, id: i64) -> Result<TodoWithDetails, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    let todo = owned_todo(&tx, user_id, id)?;
    let details = details_of(&tx, id, DetailFilter::All)?;
    let mut aggregate = TodoAggregate { todo, details };
    let report = aggregate.restore();

    if report.todo_restored {
        let restored_at = now();
        tx.execute(
            "UPDATE todos SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NOT NULL",
            (restored_at, id),
        )?;
        tx.execute(
            "UPDATE todo_details SET deleted_at = NULL, updated_at = ?1
             WHERE todo_id = ?2 AND deleted_at IS NOT NULL",
            (restored_at, id),
        )?;
    }
    let todo = owned_todo(&tx, user_id, id)?;
    let todo = with_details(&tx, todo, DetailFilter::Active)?;
    tx.commit()?;

    if report.todo_restored {
        info!(
            id,
            user_id,
            details = report.details_restored.len(),
            "Restored todo"
        );
    }
    Ok(todo)
}

/// Restores one detail and answers with its parent. The parent keeps whatever state it
/// has; a detail restored under a deleted todo stays out of the listing until the todo
/// itself is restored.
pub fn restore_detail(
    pool: &DbPool,
    user_id: i64,
    todo_id: i64,
    detail_id: i64,
) -> Result<TodoWithDetails, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    let todo = owned_todo(&tx, user_id, todo_id)?;
    let detail = find_detail(&tx, detail_id)?
        .filter(|detail| detail.todo_id == todo_id)
        .ok_or(AppError::NotFound)?;

    let restored = detail.lifecycle().restore().is_some();
    if restored {
        tx.execute(
            "UPDATE todo_details SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NOT NULL",
            (now(), detail_id),
        )?;
    }
    let todo = with_details(&tx, todo, DetailFilter::Active)?;
    tx.commit()?;

    if restored {
        info!(id = detail_id, todo_id, "Restored todo detail");
    }
    Ok(todo)
}

/// Everything of `user_id` that can be restored.
pub fn trash(pool: &DbPool, user_id: i64) -> Result<Trash, AppError> {
    let conn = lock(pool)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {TODO_COLUMNS} FROM todos
         WHERE user_id = ?1 AND deleted_at IS NOT NULL
         ORDER BY deleted_at DESC, id DESC"
    ))?;
    let deleted = stmt
        .query_map([user_id], todo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let deleted_todos = deleted
        .into_iter()
        .map(|todo| {
            let todo_details = details_of(&conn, todo.id, DetailFilter::All)?;
            Ok(DeletedTodo {
                todo,
                todo_details,
                deletion_type: DeletionType::TodoDeleted,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {TODO_COLUMNS} FROM todos t
         WHERE user_id = ?1 AND deleted_at IS NULL
           AND EXISTS (
               SELECT 1 FROM todo_details d
               WHERE d.todo_id = t.id AND d.deleted_at IS NOT NULL
           )
         ORDER BY position ASC, id ASC"
    ))?;
    let with_trashed = stmt
        .query_map([user_id], todo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let todos_with_deleted_details = with_trashed
        .into_iter()
        .map(|todo| {
            Ok(TodoWithDeletedDetails {
                todo_details: details_of(&conn, todo.id, DetailFilter::Active)?,
                deleted_todo_details: details_of(&conn, todo.id, DetailFilter::Trashed)?,
                todo,
                deletion_type: DeletionType::DetailsDeleted,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Trash {
        deleted_todos,
        todos_with_deleted_details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{pool, user};
    use crate::db::todos::{create_detail, create_todo, get_detail, list_todos};

    #[test]
    fn lifecycle_transitions() {
        let active = Lifecycle::Active;
        let deleted = active.delete(10).unwrap();
        assert_eq!(deleted, Lifecycle::Deleted { at: 10 });
        assert_eq!(deleted.delete(20), None);
        assert_eq!(deleted.restore(), Some(Lifecycle::Active));
        assert_eq!(active.restore(), None);
        assert_eq!(Lifecycle::from_deleted_at(Some(3)).deleted_at(), Some(3));
        assert!(Lifecycle::from_deleted_at(None).is_active());
    }

    #[test]
    fn aggregate_restore_of_active_todo_changes_nothing() {
        let todo = Todo {
            id: 1,
            user_id: 1,
            title: "t".to_string(),
            position: 1,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        let detail = TodoDetail {
            id: 2,
            todo_id: 1,
            description: None,
            completed: false,
            position: 1,
            created_at: 0,
            updated_at: 0,
            deleted_at: Some(5),
        };
        let mut aggregate = TodoAggregate {
            todo,
            details: vec![detail],
        };

        assert_eq!(aggregate.restore(), RestoreReport::default());
        assert_eq!(aggregate.details[0].deleted_at, Some(5));
    }

    #[test]
    fn deleting_a_todo_keeps_its_details() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "t", Some("d")).unwrap();
        let detail_id = todo.todo_details[0].id;

        assert!(delete_todo(&pool, alice, todo.todo.id).unwrap());
        assert!(list_todos(&pool, alice).unwrap().is_empty());

        // the detail itself is still active and addressable
        let detail = get_detail(&pool, alice, detail_id).unwrap();
        assert_eq!(detail.deleted_at, None);
        assert_eq!(detail.todo_id, todo.todo.id);
    }

    #[test]
    fn delete_and_restore_are_idempotent() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "t", None).unwrap();
        let id = todo.todo.id;

        assert!(delete_todo(&pool, alice, id).unwrap());
        assert!(!delete_todo(&pool, alice, id).unwrap());

        let first = restore_todo(&pool, alice, id).unwrap();
        let second = restore_todo(&pool, alice, id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.todo.deleted_at, None);

        let detail = todo.todo_details[0].id;
        assert!(delete_detail(&pool, alice, detail).unwrap());
        assert!(!delete_detail(&pool, alice, detail).unwrap());
        let first = restore_detail(&pool, alice, id, detail).unwrap();
        let second = restore_detail(&pool, alice, id, detail).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn restoring_a_todo_cascades_to_trashed_details() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "t", Some("d1")).unwrap();
        let d1 = todo.todo_details[0].id;
        let d2 = create_detail(&pool, alice, todo.todo.id, Some("d2"), false)
            .unwrap()
            .id;

        delete_detail(&pool, alice, d2).unwrap();
        delete_todo(&pool, alice, todo.todo.id).unwrap();
        let restored = restore_todo(&pool, alice, todo.todo.id).unwrap();

        assert_eq!(restored.todo.deleted_at, None);
        let ids: Vec<i64> = restored.todo_details.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![d1, d2]);
        assert!(restored.todo_details.iter().all(|d| d.deleted_at.is_none()));
        assert!(trash(&pool, alice).unwrap().todos_with_deleted_details.is_empty());
    }

    #[test]
    fn restoring_a_todo_stamps_updated_at() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "t", Some("d1")).unwrap();
        let id = todo.todo.id;
        delete_todo(&pool, alice, id).unwrap();
        lock(&pool)
            .unwrap()
            .execute_batch(&format!(
                "UPDATE todos SET updated_at = 0 WHERE id = {id};
                 UPDATE todo_details SET updated_at = 0 WHERE todo_id = {id};"
            ))
            .unwrap();

        let restored = restore_todo(&pool, alice, id).unwrap();
        assert!(restored.todo.updated_at > 0);

        // restoring an active todo writes nothing
        lock(&pool)
            .unwrap()
            .execute("UPDATE todos SET updated_at = 0 WHERE id = ?1", [id])
            .unwrap();
        let again = restore_todo(&pool, alice, id).unwrap();
        assert_eq!(again.todo.updated_at, 0);
    }

    #[test]
    fn restoring_a_detail_leaves_a_deleted_parent_deleted() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let todo = create_todo(&pool, alice, "t", Some("d")).unwrap();
        let detail = todo.todo_details[0].id;

        delete_detail(&pool, alice, detail).unwrap();
        delete_todo(&pool, alice, todo.todo.id).unwrap();

        let parent = restore_detail(&pool, alice, todo.todo.id, detail).unwrap();
        assert!(parent.todo.deleted_at.is_some());
        assert_eq!(parent.todo_details.len(), 1);

        // active but invisible until the todo comes back
        assert!(list_todos(&pool, alice).unwrap().is_empty());
        restore_todo(&pool, alice, todo.todo.id).unwrap();
        assert_eq!(list_todos(&pool, alice).unwrap()[0].todo_details.len(), 1);
    }

    #[test]
    fn restore_checks_ownership_and_parentage() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let bob = user(&pool, "bob@example.com");
        let first = create_todo(&pool, alice, "first", Some("a")).unwrap();
        let second = create_todo(&pool, alice, "second", Some("b")).unwrap();
        let detail = first.todo_details[0].id;
        delete_todo(&pool, alice, first.todo.id).unwrap();
        delete_detail(&pool, alice, detail).unwrap();

        assert!(matches!(
            restore_todo(&pool, bob, first.todo.id),
            Err(AppError::OwnershipViolation)
        ));
        assert!(matches!(restore_todo(&pool, alice, 999), Err(AppError::NotFound)));
        assert!(matches!(
            restore_detail(&pool, alice, second.todo.id, detail),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            restore_detail(&pool, bob, first.todo.id, detail),
            Err(AppError::OwnershipViolation)
        ));
    }

    #[test]
    fn trash_lists_both_kinds_of_deletion() {
        let pool = pool();
        let alice = user(&pool, "alice@example.com");
        let gone = create_todo(&pool, alice, "gone", Some("g")).unwrap();
        let partial = create_todo(&pool, alice, "partial", Some("keep")).unwrap();
        let trashed = create_detail(&pool, alice, partial.todo.id, Some("drop"), false).unwrap();

        delete_todo(&pool, alice, gone.todo.id).unwrap();
        delete_detail(&pool, alice, trashed.id).unwrap();

        let trash = trash(&pool, alice).unwrap();
        assert_eq!(trash.deleted_todos.len(), 1);
        assert_eq!(trash.deleted_todos[0].todo.id, gone.todo.id);
        assert!(trash.deleted_todos[0].todo.deleted_at.is_some());
        assert_eq!(trash.deleted_todos[0].todo_details.len(), 1);

        assert_eq!(trash.todos_with_deleted_details.len(), 1);
        let entry = &trash.todos_with_deleted_details[0];
        assert_eq!(entry.todo.id, partial.todo.id);
        assert_eq!(entry.todo_details.len(), 1);
        assert_eq!(entry.deleted_todo_details.len(), 1);
        assert_eq!(entry.deleted_todo_details[0].id, trashed.id);
    }
}
