//! Team-name table: numeric codes mapped to display names, per event.

use rusqlite::{params, Connection, OptionalExtension};

use quiniela_shared::EntityKind;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::{current_event_in, event_in};
use crate::models::TeamName;

impl Database {
    /// Set (or rename) the team with code `value` in `event_id`.
    ///
    /// Matches created earlier keep the name they were created with.
    pub fn set_team_name(&self, event_id: i64, value: i64, name: &str) -> Result<TeamName> {
        event_in(self.conn(), event_id)?;
        upsert_team_name_in(self.conn(), event_id, value, name)?;

        tracing::debug!(event_id, value, name = %name.trim(), "team name set");
        Ok(TeamName {
            event_id,
            value,
            name: name.trim().to_string(),
        })
    }

    /// Display name for team code `value` in `event_id`.
    pub fn resolve_team(&self, event_id: i64, value: i64) -> Result<String> {
        resolve_team_in(self.conn(), event_id, value)
    }

    /// Display name for team code `value` in the current event.
    pub fn resolve_current_team(&self, value: i64) -> Result<String> {
        let event = current_event_in(self.conn())?;
        resolve_team_in(self.conn(), event.id, value)
    }

    /// All team names of an event, ordered by code.
    pub fn list_team_names(&self, event_id: i64) -> Result<Vec<TeamName>> {
        event_in(self.conn(), event_id)?;

        let mut stmt = self.conn().prepare(
            "SELECT event_id, value, name FROM team_names
             WHERE event_id = ?1
             ORDER BY value ASC",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(TeamName {
                event_id: row.get(0)?,
                value: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

pub(crate) fn upsert_team_name_in(
    conn: &Connection,
    event_id: i64,
    value: i64,
    name: &str,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidInput("team name is required".into()));
    }

    conn.execute(
        "INSERT INTO team_names (event_id, value, name) VALUES (?1, ?2, ?3)
         ON CONFLICT (event_id, value) DO UPDATE SET name = excluded.name",
        params![event_id, value, name],
    )?;
    Ok(())
}

pub(crate) fn resolve_team_in(conn: &Connection, event_id: i64, value: i64) -> Result<String> {
    conn.query_row(
        "SELECT name FROM team_names WHERE event_id = ?1 AND value = ?2",
        params![event_id, value],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::NotFound(EntityKind::TeamName))
}
