//! CRUD operations for [`User`] records.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use quiniela_shared::EntityKind;

use crate::database::Database;
use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{format_date, parse_date, parse_timestamp, NewUser, User};

const USER_COLUMNS: &str = "id, user_id, display_name, first_name, last_name, email,
     birth_date, phone, address, event_tickets, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a new user with a zero ticket balance.
    pub fn register_user(&self, new: &NewUser) -> Result<User> {
        let user_id = new.user_id.trim();
        if user_id.is_empty() {
            return Err(StoreError::InvalidInput("user_id is required".into()));
        }

        let now = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO users (user_id, display_name, first_name, last_name, email,
                                    birth_date, phone, address, event_tickets, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
                params![
                    user_id,
                    new.display_name,
                    new.first_name,
                    new.last_name,
                    new.email,
                    new.birth_date.map(format_date),
                    new.phone,
                    new.address,
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists(EntityKind::User)
                } else {
                    StoreError::Sqlite(e)
                }
            })?;

        tracing::info!(user = %user_id, "user registered");
        self.get_user(user_id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a user by login key.
    pub fn get_user(&self, user_id: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                row_to_user,
            )
            .map_err(StoreError::not_found_as(EntityKind::User))
    }

    /// Current ticket balance, read fresh from the database.
    pub fn ticket_balance(&self, user_id: &str) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT event_tickets FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(StoreError::not_found_as(EntityKind::User))
    }

    /// Users whose login key or phone number contains `query`, ordered by
    /// login key.  An empty query lists everyone.  `%` and `_` in the query
    /// match literally.
    pub fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE user_id LIKE ?1 ESCAPE '\\' OR IFNULL(phone, '') LIKE ?1 ESCAPE '\\'
             ORDER BY user_id ASC"
        ))?;

        let rows = stmt.query_map(params![pattern], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user.  Predictions and participations go with it.
    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        if affected == 0 {
            return Err(StoreError::NotFound(EntityKind::User));
        }
        tracing::info!(user = %user_id, "user deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve a login key to its row id.
pub(crate) fn user_row_id(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM users WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::NotFound(EntityKind::User))
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let birth_date = row
        .get::<_, Option<String>>(6)?
        .map(|s| parse_date(6, &s))
        .transpose()?;
    let created_str: String = row.get(10)?;

    Ok(User {
        id: row.get(0)?,
        user_id: row.get(1)?,
        display_name: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        birth_date,
        phone: row.get(7)?,
        address: row.get(8)?,
        event_tickets: row.get(9)?,
        created_at: parse_timestamp(10, &created_str)?,
    })
}
