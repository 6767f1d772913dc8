//! Participation gate: one ticket buys one entry into the current event.
//!
//! The existence check, the ticket debit and the insert run in a single
//! `BEGIN IMMEDIATE` transaction, and `UNIQUE (user_id, event_id)` backs the
//! check.  Concurrent joins for the same user and event therefore produce
//! exactly one participation and one debit; the others see
//! `AlreadyParticipated` (or `InsufficientTickets`).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use quiniela_shared::EntityKind;

use crate::database::Database;
use crate::error::{is_unique_violation, Result, StoreError};
use crate::events::event_in;
use crate::ledger::debit_ticket_in;
use crate::models::{parse_timestamp, Participation};
use crate::users::user_row_id;

impl Database {
    /// Spend one ticket to enter `event_id`.
    ///
    /// Checks run in this order: the event must be the current one, the
    /// user must not have joined already, and the user must hold a ticket.
    pub fn join_event(&mut self, user_id: &str, event_id: i64) -> Result<Participation> {
        let tx = self.write_tx()?;
        let user_row = user_row_id(&tx, user_id)?;
        let event = event_in(&tx, event_id)?;

        if !event.current {
            return Err(StoreError::EventNotCurrent);
        }
        if participation_row(&tx, user_row, event_id)?.is_some() {
            return Err(StoreError::AlreadyParticipated);
        }

        let balance = debit_ticket_in(&tx, user_row)?;

        tx.execute(
            "INSERT INTO participations (user_id, event_id, total_points, joined_at)
             VALUES (?1, ?2, 0, ?3)",
            params![user_row, event_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyParticipated
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        let participation = participation_in(&tx, user_id, user_row, event_id)?;
        tx.commit()?;

        tracing::info!(user = %user_id, event_id, balance, "user joined event");
        Ok(participation)
    }

    /// Whether `user_id` has entered `event_id`.  Both must exist.
    pub fn has_participated(&self, user_id: &str, event_id: i64) -> Result<bool> {
        let user_row = user_row_id(self.conn(), user_id)?;
        event_in(self.conn(), event_id)?;
        Ok(participation_row(self.conn(), user_row, event_id)?.is_some())
    }

    /// The entry record of `user_id` in `event_id`.
    pub fn participation(&self, user_id: &str, event_id: i64) -> Result<Participation> {
        let user_row = user_row_id(self.conn(), user_id)?;
        event_in(self.conn(), event_id)?;
        participation_in(self.conn(), user_id, user_row, event_id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn participation_row(conn: &Connection, user_row: i64, event_id: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM participations WHERE user_id = ?1 AND event_id = ?2",
            params![user_row, event_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn participation_in(
    conn: &Connection,
    user_id: &str,
    user_row: i64,
    event_id: i64,
) -> Result<Participation> {
    conn.query_row(
        "SELECT total_points, joined_at FROM participations
         WHERE user_id = ?1 AND event_id = ?2",
        params![user_row, event_id],
        |row| {
            let joined: String = row.get(1)?;
            Ok(Participation {
                user_id: user_id.to_string(),
                event_id,
                total_points: row.get(0)?,
                joined_at: parse_timestamp(1, &joined)?,
            })
        },
    )
    .map_err(StoreError::not_found_as(EntityKind::Participation))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;
    use crate::events::tests::new_event;
    use crate::models::NewUser;

    fn setup(tickets: i64) -> (Database, i64) {
        let mut db = Database::open_in_memory().unwrap();
        db.register_user(&NewUser::new("ana")).unwrap();
        if tickets > 0 {
            db.credit_ticket("ana", tickets).unwrap();
        }
        let e = db.create_event(&new_event("Velada")).unwrap();
        db.set_current(e.id, true).unwrap();
        (db, e.id)
    }

    #[test]
    fn join_then_rejoin() {
        let (mut db, event_id) = setup(1);

        let p = db.join_event("ana", event_id).unwrap();
        assert_eq!(p.total_points, 0);
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
        assert!(db.has_participated("ana", event_id).unwrap());

        assert!(matches!(
            db.join_event("ana", event_id),
            Err(StoreError::AlreadyParticipated)
        ));
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
    }

    #[test]
    fn rejoin_with_spare_tickets_keeps_them() {
        let (mut db, event_id) = setup(3);
        db.join_event("ana", event_id).unwrap();
        assert!(matches!(
            db.join_event("ana", event_id),
            Err(StoreError::AlreadyParticipated)
        ));
        assert_eq!(db.ticket_balance("ana").unwrap(), 2);
    }

    #[test]
    fn join_without_tickets() {
        let (mut db, event_id) = setup(0);
        assert!(matches!(
            db.join_event("ana", event_id),
            Err(StoreError::InsufficientTickets)
        ));
        assert!(!db.has_participated("ana", event_id).unwrap());
    }

    #[test]
    fn join_requires_current_event() {
        let (mut db, _) = setup(2);
        let other = db.create_event(&new_event("Otra")).unwrap();

        assert!(matches!(
            db.join_event("ana", other.id),
            Err(StoreError::EventNotCurrent)
        ));
        assert_eq!(db.ticket_balance("ana").unwrap(), 2);

        assert!(matches!(
            db.join_event("ana", 999),
            Err(StoreError::NotFound(EntityKind::Event))
        ));
        assert!(matches!(
            db.join_event("nadie", other.id),
            Err(StoreError::NotFound(EntityKind::User))
        ));
    }

    #[test]
    fn participation_lookup() {
        let (mut db, event_id) = setup(1);
        assert!(matches!(
            db.participation("ana", event_id),
            Err(StoreError::NotFound(EntityKind::Participation))
        ));
        db.join_event("ana", event_id).unwrap();
        let p = db.participation("ana", event_id).unwrap();
        assert_eq!(p.user_id, "ana");
        assert_eq!(p.event_id, event_id);
    }

    #[test]
    fn concurrent_joins_create_one_participation() {
        const JOINERS: usize = 8;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");

        let event_id = {
            let mut db = Database::open_at(&path).unwrap();
            db.register_user(&NewUser::new("ana")).unwrap();
            db.credit_ticket("ana", 5).unwrap();
            let e = db.create_event(&new_event("Velada")).unwrap();
            db.set_current(e.id, true).unwrap();
            e.id
        };

        let barrier = Arc::new(Barrier::new(JOINERS));
        let handles: Vec<_> = (0..JOINERS)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut db = Database::open_at(&path).unwrap();
                    barrier.wait();
                    db.join_event("ana", event_id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for r in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(r, Err(StoreError::AlreadyParticipated)));
        }

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.ticket_balance("ana").unwrap(), 4);
        let rows: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM participations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
