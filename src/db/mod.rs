pub mod lifecycle;
pub mod ordering;
pub mod todos;

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Result};
use tracing::info;

use crate::error::{AppError, FieldErrors};
use crate::models::{ApiToken, Session, User};
use ordering::{next_position, Scope};

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS api_tokens (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token TEXT UNIQUE NOT NULL,
        name TEXT,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        position INTEGER DEFAULT 0,
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        updated_at INTEGER DEFAULT (strftime('%s', 'now')),
        deleted_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS todos_user_position ON todos (user_id, position);

    CREATE TABLE IF NOT EXISTS todo_details (
        id INTEGER PRIMARY KEY,
        todo_id INTEGER NOT NULL REFERENCES todos(id) ON DELETE RESTRICT,
        description TEXT,
        completed INTEGER DEFAULT 0,
        position INTEGER DEFAULT 0,
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        updated_at INTEGER DEFAULT (strftime('%s', 'now')),
        deleted_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS todo_details_todo_position ON todo_details (todo_id, position);
";

pub fn init_db(path: &str) -> Result<DbPool> {
    let conn = Connection::open(path)?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Creates missing tables and gives every unpositioned row a place in its scope.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let todos = backfill_positions(conn, "todos", "user_id", Scope::Owner)?;
    let details = backfill_positions(conn, "todo_details", "todo_id", Scope::Todo)?;
    if todos + details > 0 {
        info!(todos, details, "Assigned positions to unordered rows");
    }

    Ok(())
}

// Rows created before ordering existed carry position 0 or NULL. They are appended to
// their scope in creation order, after everything that already has a position.
fn backfill_positions(
    conn: &Connection,
    table: &str,
    scope_column: &str,
    scope: fn(i64) -> Scope,
) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {scope_column} FROM {table}
         WHERE position IS NULL OR position = 0
         ORDER BY created_at ASC, id ASC"
    ))?;
    let pending = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>>>()?;

    for (id, scope_id) in &pending {
        let position = next_position(conn, scope(*scope_id))?;
        conn.execute(
            &format!("UPDATE {table} SET position = ?1 WHERE id = ?2"),
            (position, id),
        )?;
    }

    Ok(pending.len())
}

pub fn lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, AppError> {
    pool.lock()
        .map_err(|_| AppError::Database("database lock poisoned".to_string()))
}

pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// User operations
pub fn create_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, AppError> {
    let conn = lock(pool)?;

    let taken = conn
        .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
        .optional()?
        .is_some();
    if taken {
        return Err(AppError::Validation(FieldErrors::single(
            "email",
            "The email has already been taken.",
        )));
    }

    conn.execute(
        "INSERT INTO users (name, email, password_hash) VALUES (?1, ?2, ?3)",
        (name, email, password_hash),
    )?;
    let id = conn.last_insert_rowid();

    let user = conn.query_row(
        "SELECT id, name, email, created_at FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )?;
    Ok(user)
}

pub fn get_user(pool: &DbPool, id: i64) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// The user registered under `email` along with the stored password hash.
pub fn get_user_credentials(
    pool: &DbPool,
    email: &str,
) -> Result<Option<(User, String)>, AppError> {
    let conn = lock(pool)?;
    let found = conn
        .query_row(
            "SELECT id, name, email, created_at, password_hash FROM users WHERE email = ?1",
            [email],
            |row| Ok((user_from_row(row)?, row.get(4)?)),
        )
        .optional()?;
    Ok(found)
}

pub fn get_password_hash(pool: &DbPool, user_id: i64) -> Result<Option<String>, AppError> {
    let conn = lock(pool)?;
    let hash = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

/// Changes the given account fields. The email must not belong to another user.
pub fn update_user(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> Result<User, AppError> {
    let conn = lock(pool)?;

    if let Some(email) = email {
        let taken = conn
            .query_row(
                "SELECT 1 FROM users WHERE email = ?1 AND id != ?2",
                (email, id),
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(AppError::Validation(FieldErrors::single(
                "email",
                "The email has already been taken.",
            )));
        }
    }

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(n) = name {
        updates.push("name = ?");
        params.push(Box::new(n.to_string()));
    }
    if let Some(e) = email {
        updates.push("email = ?");
        params.push(Box::new(e.to_string()));
    }
    if let Some(h) = password_hash {
        updates.push("password_hash = ?");
        params.push(Box::new(h.to_string()));
    }

    if !updates.is_empty() {
        params.push(Box::new(id));
        let sql = format!("UPDATE users SET {} WHERE id = ?", updates.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;
    }

    conn.query_row(
        "SELECT id, name, email, created_at FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
        (&session.id, session.user_id, session.expires_at),
    )?;
    Ok(())
}

pub fn get_session(pool: &DbPool, id: &str) -> Result<Option<Session>, AppError> {
    let conn = lock(pool)?;
    let session = conn
        .query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
            [id],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool) -> Result<usize, AppError> {
    let conn = lock(pool)?;
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now()])?;
    Ok(removed)
}

// API Token operations
pub fn create_api_token(
    pool: &DbPool,
    user_id: i64,
    token: &str,
    name: Option<&str>,
) -> Result<ApiToken, AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO api_tokens (user_id, token, name) VALUES (?1, ?2, ?3)",
        (user_id, token, name),
    )?;
    let id = conn.last_insert_rowid();

    let token = conn.query_row(
        "SELECT id, user_id, token, name, created_at FROM api_tokens WHERE id = ?1",
        [id],
        api_token_from_row,
    )?;
    Ok(token)
}

pub fn get_api_token_by_value(pool: &DbPool, token: &str) -> Result<Option<ApiToken>, AppError> {
    let conn = lock(pool)?;
    let token = conn
        .query_row(
            "SELECT id, user_id, token, name, created_at FROM api_tokens WHERE token = ?1",
            [token],
            api_token_from_row,
        )
        .optional()?;
    Ok(token)
}

pub fn list_api_tokens(pool: &DbPool, user_id: i64) -> Result<Vec<ApiToken>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, token, name, created_at FROM api_tokens
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let tokens = stmt
        .query_map([user_id], api_token_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

pub fn delete_api_token(pool: &DbPool, user_id: i64, id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute(
        "DELETE FROM api_tokens WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;
    Ok(rows > 0)
}

pub fn delete_api_token_by_value(pool: &DbPool, token: &str) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute("DELETE FROM api_tokens WHERE token = ?1", [token])?;
    Ok(rows > 0)
}

fn api_token_from_row(row: &rusqlite::Row<'_>) -> Result<ApiToken> {
    Ok(ApiToken {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: row.get(2)?,
        name: row.get(3)?,
        created_at: row.get(4)?,
    })
}
