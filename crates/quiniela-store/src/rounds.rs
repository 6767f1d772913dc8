//! Rounds and matches.

use rusqlite::{params, Connection};

use quiniela_shared::{EntityKind, TeamRef};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::event_in;
use crate::models::{parse_result, Match, Round};
use crate::teams::resolve_team_in;

pub(crate) const MATCH_SELECT: &str = "SELECT m.id, m.round_id, r.event_id, m.team1, m.team2, m.result
     FROM matches m JOIN rounds r ON r.id = m.round_id";

impl Database {
    /// Get the round numbered `number` in `event_id`, creating it if needed.
    pub fn add_round(&self, event_id: i64, number: i64) -> Result<Round> {
        event_in(self.conn(), event_id)?;
        get_or_create_round_in(self.conn(), event_id, number)
    }

    /// Rounds of an event in number order.
    pub fn list_rounds(&self, event_id: i64) -> Result<Vec<Round>> {
        event_in(self.conn(), event_id)?;
        let mut stmt = self.conn().prepare(
            "SELECT id, event_id, number FROM rounds WHERE event_id = ?1 ORDER BY number ASC",
        )?;
        let rows = stmt.query_map(params![event_id], row_to_round)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Add a match to a round.  Team codes are resolved against the round's
    /// event now, and the resolved names are stored on the match.
    pub fn add_match(&mut self, round_id: i64, team1: &TeamRef, team2: &TeamRef) -> Result<Match> {
        let tx = self.write_tx()?;
        let round = round_in(&tx, round_id)?;
        let id = insert_match_in(&tx, &round, team1, team2)?;
        let m = match_in(&tx, id)?;
        tx.commit()?;

        tracing::info!(
            match_id = m.id,
            round_id,
            team1 = %m.team1,
            team2 = %m.team2,
            "match added"
        );
        Ok(m)
    }

    pub fn get_match(&self, id: i64) -> Result<Match> {
        match_in(self.conn(), id)
    }

    /// Matches of an event, by round number then creation order.
    pub fn list_matches(&self, event_id: i64) -> Result<Vec<Match>> {
        event_in(self.conn(), event_id)?;
        let mut stmt = self.conn().prepare(&format!(
            "{MATCH_SELECT} WHERE r.event_id = ?1 ORDER BY r.number ASC, m.id ASC"
        ))?;
        let rows = stmt.query_map(params![event_id], row_to_match)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert-or-ignore on the `(event_id, number)` unique key, then read back,
/// so a repeated number never forks a second round.
pub(crate) fn get_or_create_round_in(conn: &Connection, event_id: i64, number: i64) -> Result<Round> {
    conn.execute(
        "INSERT OR IGNORE INTO rounds (event_id, number) VALUES (?1, ?2)",
        params![event_id, number],
    )?;
    Ok(conn.query_row(
        "SELECT id, event_id, number FROM rounds WHERE event_id = ?1 AND number = ?2",
        params![event_id, number],
        row_to_round,
    )?)
}

/// Returns the new match id.
pub(crate) fn insert_match_in(
    conn: &Connection,
    round: &Round,
    team1: &TeamRef,
    team2: &TeamRef,
) -> Result<i64> {
    let team1 = team_display_name(conn, round.event_id, team1)?;
    let team2 = team_display_name(conn, round.event_id, team2)?;

    conn.execute(
        "INSERT INTO matches (round_id, team1, team2) VALUES (?1, ?2, ?3)",
        params![round.id, team1, team2],
    )?;
    Ok(conn.last_insert_rowid())
}

fn team_display_name(conn: &Connection, event_id: i64, team: &TeamRef) -> Result<String> {
    match team {
        TeamRef::Code(value) => resolve_team_in(conn, event_id, *value),
        TeamRef::Name(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(StoreError::InvalidInput("team name is required".into()));
            }
            Ok(name.to_string())
        }
    }
}

fn round_in(conn: &Connection, id: i64) -> Result<Round> {
    conn.query_row(
        "SELECT id, event_id, number FROM rounds WHERE id = ?1",
        params![id],
        row_to_round,
    )
    .map_err(StoreError::not_found_as(EntityKind::Round))
}

pub(crate) fn match_in(conn: &Connection, id: i64) -> Result<Match> {
    conn.query_row(
        &format!("{MATCH_SELECT} WHERE m.id = ?1"),
        params![id],
        row_to_match,
    )
    .map_err(StoreError::not_found_as(EntityKind::Match))
}

fn row_to_round(row: &rusqlite::Row<'_>) -> rusqlite::Result<Round> {
    Ok(Round {
        id: row.get(0)?,
        event_id: row.get(1)?,
        number: row.get(2)?,
    })
}

/// Map a row of [`MATCH_SELECT`] to a [`Match`].
pub(crate) fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    let result: String = row.get(5)?;
    Ok(Match {
        id: row.get(0)?,
        round_id: row.get(1)?,
        event_id: row.get(2)?,
        team1: row.get(3)?,
        team2: row.get(4)?,
        result: parse_result(5, &result)?,
    })
}
