//! Events: authoring, the single-current invariant and visibility flags.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use quiniela_shared::protocol::{EventView, MatchView, RoundView};
use quiniela_shared::EntityKind;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_date, parse_date, parse_result, Event, NewEvent};
use crate::rounds::{get_or_create_round_in, insert_match_in};
use crate::teams::upsert_team_name_in;

const EVENT_COLUMNS: &str =
    "id, name, date, location, current, results_visible, ranking_visible";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create an event together with any team names, rounds and matches it
    /// carries.
    ///
    /// The whole tree is written in one transaction.  Rounds with a repeated
    /// number merge into the same round.
    pub fn create_event(&mut self, new: &NewEvent) -> Result<Event> {
        if new.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("event name is required".into()));
        }

        let tx = self.write_tx()?;
        tx.execute(
            "INSERT INTO events (name, date, location, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                new.name.trim(),
                format_date(new.date),
                new.location,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let event_id = tx.last_insert_rowid();

        for team in &new.teams {
            upsert_team_name_in(&tx, event_id, team.value, &team.name)?;
        }

        let mut match_count = 0usize;
        for round in &new.rounds {
            let round_row = get_or_create_round_in(&tx, event_id, round.number)?;
            for m in &round.matches {
                insert_match_in(&tx, &round_row, &m.team1, &m.team2)?;
                match_count += 1;
            }
        }

        let event = event_in(&tx, event_id)?;
        tx.commit()?;

        tracing::info!(
            event_id,
            name = %event.name,
            teams = new.teams.len(),
            rounds = new.rounds.len(),
            matches = match_count,
            "event created"
        );
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_event(&self, id: i64) -> Result<Event> {
        event_in(self.conn(), id)
    }

    /// All events, most recent date first.
    pub fn list_events(&self) -> Result<Vec<Event>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY date DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], row_to_event)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// The event currently open for entry.
    pub fn current_event(&self) -> Result<Event> {
        current_event_in(self.conn())
    }

    /// Full tree of an event: rounds in number order, matches in creation
    /// order.
    pub fn event_view(&self, id: i64) -> Result<EventView> {
        let event = self.get_event(id)?;
        build_view(self.conn(), event)
    }

    /// Full tree of the current event.
    pub fn current_event_view(&self) -> Result<EventView> {
        let event = self.current_event()?;
        build_view(self.conn(), event)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flip the `current` flag of an event.  Returns the new value.
    ///
    /// Making an event current clears the flag on every other event in the
    /// same transaction.
    pub fn toggle_current(&mut self, id: i64) -> Result<bool> {
        let tx = self.write_tx()?;
        let event = event_in(&tx, id)?;
        let now_current = !event.current;
        set_current_in(&tx, id, now_current)?;
        tx.commit()?;

        tracing::info!(event_id = id, current = now_current, "event current flag toggled");
        Ok(now_current)
    }

    /// Set the `current` flag of an event explicitly.
    pub fn set_current(&mut self, id: i64, current: bool) -> Result<()> {
        let tx = self.write_tx()?;
        event_in(&tx, id)?;
        set_current_in(&tx, id, current)?;
        tx.commit()?;

        tracing::info!(event_id = id, current, "event current flag set");
        Ok(())
    }

    /// Flip whether users may see their per-match results.  Returns the new
    /// value.
    pub fn toggle_results_visible(&mut self, id: i64) -> Result<bool> {
        self.toggle_flag(id, "results_visible")
    }

    /// Flip whether the standings are published.  Returns the new value.
    pub fn toggle_ranking_visible(&mut self, id: i64) -> Result<bool> {
        self.toggle_flag(id, "ranking_visible")
    }

    fn toggle_flag(&mut self, id: i64, column: &'static str) -> Result<bool> {
        let tx = self.write_tx()?;
        event_in(&tx, id)?;
        tx.execute(
            &format!("UPDATE events SET {column} = 1 - {column} WHERE id = ?1"),
            params![id],
        )?;
        let value: bool = tx.query_row(
            &format!("SELECT {column} FROM events WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        tracing::info!(event_id = id, flag = column, value, "event visibility toggled");
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an event.  ON DELETE CASCADE removes its team names, rounds,
    /// matches, predictions and participations.
    pub fn delete_event(&self, id: i64) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound(EntityKind::Event));
        }
        tracing::info!(event_id = id, "event deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn event_in(conn: &Connection, id: i64) -> Result<Event> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
        params![id],
        row_to_event,
    )
    .map_err(StoreError::not_found_as(EntityKind::Event))
}

/// The unique index allows at most one row with `current = 1`; ordering by
/// `current_since` still picks the latest one should that ever not hold.
pub(crate) fn current_event_in(conn: &Connection) -> Result<Event> {
    conn.query_row(
        &format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE current = 1
             ORDER BY current_since DESC, id DESC
             LIMIT 1"
        ),
        [],
        row_to_event,
    )
    .optional()?
    .ok_or(StoreError::NotFound(EntityKind::Event))
}

/// Clear-others-then-set.  Must run inside a write transaction.
fn set_current_in(conn: &Connection, id: i64, current: bool) -> Result<()> {
    if current {
        conn.execute(
            "UPDATE events SET current = 0, current_since = NULL
             WHERE current = 1 AND id != ?1",
            params![id],
        )?;
        conn.execute(
            "UPDATE events SET current = 1, current_since = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
    } else {
        conn.execute(
            "UPDATE events SET current = 0, current_since = NULL WHERE id = ?1",
            params![id],
        )?;
    }
    Ok(())
}

fn build_view(conn: &Connection, event: Event) -> Result<EventView> {
    let mut round_stmt =
        conn.prepare("SELECT id, number FROM rounds WHERE event_id = ?1 ORDER BY number ASC")?;
    let mut match_stmt = conn.prepare(
        "SELECT id, team1, team2, result FROM matches WHERE round_id = ?1 ORDER BY id ASC",
    )?;

    let round_rows = round_stmt
        .query_map(params![event.id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut rounds = Vec::with_capacity(round_rows.len());
    for (round_id, number) in round_rows {
        let matches = match_stmt
            .query_map(params![round_id], |row| {
                let result: String = row.get(3)?;
                Ok(MatchView {
                    id: row.get(0)?,
                    team1: row.get(1)?,
                    team2: row.get(2)?,
                    result: parse_result(3, &result)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rounds.push(RoundView {
            id: round_id,
            number,
            matches,
        });
    }

    Ok(EventView {
        id: event.id,
        name: event.name,
        date: event.date,
        location: event.location,
        rounds,
        results_visible: event.results_visible,
        ranking_visible: event.ranking_visible,
    })
}

/// Map a `rusqlite::Row` to an [`Event`].
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let date_str: String = row.get(2)?;
    Ok(Event {
        id: row.get(0)?,
        name: row.get(1)?,
        date: parse_date(2, &date_str)?,
        location: row.get(3)?,
        current: row.get(4)?,
        results_visible: row.get(5)?,
        ranking_visible: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use quiniela_shared::{Outcome, TeamRef};

    use super::*;
    use crate::models::{NewMatch, NewRound, NewTeam, NewUser, PredictionInput};

    pub(crate) fn new_event(name: &str) -> NewEvent {
        NewEvent {
            name: name.into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: "Arena".into(),
            teams: Vec::new(),
            rounds: Vec::new(),
        }
    }

    /// Current event with one team name and one match; `ana` has joined and
    /// submitted a prediction.
    pub(crate) fn seeded_entry() -> (Database, i64) {
        let mut db = Database::open_in_memory().unwrap();
        let mut new = new_event("Velada");
        new.teams = vec![NewTeam {
            value: 1,
            name: "Leones".into(),
        }];
        new.rounds = vec![NewRound {
            number: 1,
            matches: vec![NewMatch {
                team1: TeamRef::Code(1),
                team2: TeamRef::from("Tigres"),
            }],
        }];
        let e = db.create_event(&new).unwrap();
        db.set_current(e.id, true).unwrap();

        db.register_user(&NewUser::new("ana")).unwrap();
        db.credit_ticket("ana", 1).unwrap();
        db.join_event("ana", e.id).unwrap();
        let match_id = db.list_matches(e.id).unwrap()[0].id;
        db.submit_predictions("ana", e.id, &[PredictionInput::new(match_id, "team1")])
            .unwrap();
        (db, e.id)
    }

    pub(crate) fn row_count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn count_current(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM events WHERE current = 1", [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn create_event_with_tree() {
        let mut db = Database::open_in_memory().unwrap();
        let mut new = new_event("Velada");
        new.rounds = vec![
            NewRound {
                number: 2,
                matches: vec![NewMatch {
                    team1: TeamRef::from("C"),
                    team2: TeamRef::from("D"),
                }],
            },
            NewRound {
                number: 1,
                matches: vec![NewMatch {
                    team1: TeamRef::from("A"),
                    team2: TeamRef::from("B"),
                }],
            },
            // Same number again: merges into round 1.
            NewRound {
                number: 1,
                matches: vec![NewMatch {
                    team1: TeamRef::from("E"),
                    team2: TeamRef::from("F"),
                }],
            },
        ];

        let event = db.create_event(&new).unwrap();
        assert!(!event.current);
        assert!(!event.results_visible);
        assert!(!event.ranking_visible);

        let view = db.event_view(event.id).unwrap();
        assert_eq!(view.rounds.len(), 2);
        assert_eq!(view.rounds[0].number, 1);
        assert_eq!(view.rounds[0].matches.len(), 2);
        assert_eq!(view.rounds[0].matches[0].team1, "A");
        assert_eq!(view.rounds[0].matches[1].team1, "E");
        assert_eq!(view.rounds[1].number, 2);
        assert_eq!(view.rounds[1].matches[0].result, None::<Outcome>);
    }

    #[test]
    fn tree_matches_may_use_team_codes() {
        let mut db = Database::open_in_memory().unwrap();
        let mut new = new_event("Velada");
        new.teams = vec![
            NewTeam {
                value: 1,
                name: "Leones".into(),
            },
            NewTeam {
                value: 2,
                name: "Toros".into(),
            },
        ];
        new.rounds = vec![NewRound {
            number: 1,
            matches: vec![NewMatch {
                team1: TeamRef::Code(1),
                team2: TeamRef::Code(2),
            }],
        }];

        let event = db.create_event(&new).unwrap();
        let view = db.event_view(event.id).unwrap();
        let m = &view.rounds[0].matches[0];
        assert_eq!((m.team1.as_str(), m.team2.as_str()), ("Leones", "Toros"));
    }

    #[test]
    fn failed_tree_leaves_no_event() {
        let mut db = Database::open_in_memory().unwrap();
        let mut new = new_event("Velada");
        new.rounds = vec![NewRound {
            number: 1,
            matches: vec![NewMatch {
                // No team names registered yet, so the code cannot resolve.
                team1: TeamRef::Code(1),
                team2: TeamRef::from("B"),
            }],
        }];

        assert!(matches!(
            db.create_event(&new),
            Err(StoreError::NotFound(EntityKind::TeamName))
        ));
        assert!(db.list_events().unwrap().is_empty());
    }

    #[test]
    fn single_current_invariant() {
        let mut db = Database::open_in_memory().unwrap();
        let a = db.create_event(&new_event("A")).unwrap();
        let b = db.create_event(&new_event("B")).unwrap();
        let c = db.create_event(&new_event("C")).unwrap();

        assert!(matches!(
            db.current_event(),
            Err(StoreError::NotFound(EntityKind::Event))
        ));

        assert!(db.toggle_current(a.id).unwrap());
        assert_eq!(count_current(&db), 1);

        assert!(db.toggle_current(b.id).unwrap());
        assert_eq!(count_current(&db), 1);
        assert_eq!(db.current_event().unwrap().id, b.id);
        assert!(!db.get_event(a.id).unwrap().current);

        db.set_current(c.id, true).unwrap();
        assert_eq!(count_current(&db), 1);
        assert_eq!(db.current_event().unwrap().id, c.id);

        assert!(!db.toggle_current(c.id).unwrap());
        assert_eq!(count_current(&db), 0);
    }

    #[test]
    fn schema_rejects_second_current_event() {
        let mut db = Database::open_in_memory().unwrap();
        let a = db.create_event(&new_event("A")).unwrap();
        let b = db.create_event(&new_event("B")).unwrap();
        db.set_current(a.id, true).unwrap();

        let err = db
            .conn()
            .execute("UPDATE events SET current = 1 WHERE id = ?1", params![b.id])
            .unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[test]
    fn visibility_toggles() {
        let mut db = Database::open_in_memory().unwrap();
        let e = db.create_event(&new_event("A")).unwrap();

        assert!(db.toggle_ranking_visible(e.id).unwrap());
        assert!(db.toggle_results_visible(e.id).unwrap());
        let event = db.get_event(e.id).unwrap();
        assert!(event.ranking_visible && event.results_visible);

        assert!(!db.toggle_ranking_visible(e.id).unwrap());
        assert!(!db.get_event(e.id).unwrap().ranking_visible);

        assert!(matches!(
            db.toggle_results_visible(999),
            Err(StoreError::NotFound(EntityKind::Event))
        ));
    }

    #[test]
    fn current_view_and_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let e = db.create_event(&new_event("A")).unwrap();
        db.set_current(e.id, true).unwrap();

        let view = db.current_event_view().unwrap();
        assert_eq!(view.id, e.id);
        assert_eq!(view.name, "A");

        db.delete_event(e.id).unwrap();
        assert!(matches!(
            db.current_event_view(),
            Err(StoreError::NotFound(EntityKind::Event))
        ));
        assert!(matches!(
            db.delete_event(e.id),
            Err(StoreError::NotFound(EntityKind::Event))
        ));
    }

    #[test]
    fn delete_event_removes_its_tree() {
        let (db, event_id) = seeded_entry();
        assert_eq!(row_count(&db, "predictions"), 1);
        assert_eq!(row_count(&db, "participations"), 1);

        db.delete_event(event_id).unwrap();
        for table in [
            "team_names",
            "rounds",
            "matches",
            "predictions",
            "participations",
        ] {
            assert_eq!(row_count(&db, table), 0, "{table} not emptied");
        }
        // The user and their spent ticket are untouched.
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
    }
}
