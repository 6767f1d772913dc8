//! Ticket ledger: the per-user balance that gates event entry.
//!
//! A debit is a single conditional `UPDATE` (`event_tickets >= 1` in the
//! `WHERE` clause), so two concurrent debits can never both succeed on a
//! balance of one.  The `CHECK (event_tickets >= 0)` constraint backs this at
//! the schema level.  The ledger does not roll anything back on its own;
//! callers that pair a debit with other writes run both in one transaction.

use rusqlite::{params, Connection};

use quiniela_shared::constants::TICKETS_PER_ENTRY;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::users::user_row_id;

impl Database {
    /// Take one ticket from `user_id`.  Returns the new balance.
    pub fn debit_ticket(&mut self, user_id: &str) -> Result<i64> {
        let tx = self.write_tx()?;
        let row_id = user_row_id(&tx, user_id)?;
        let balance = debit_ticket_in(&tx, row_id)?;
        tx.commit()?;

        tracing::info!(user = %user_id, balance, "ticket debited");
        Ok(balance)
    }

    /// Give `amount` tickets to `user_id`.  Returns the new balance.
    pub fn credit_ticket(&mut self, user_id: &str, amount: i64) -> Result<i64> {
        if amount < 1 {
            return Err(StoreError::InvalidInput(format!(
                "ticket credit must be positive, got {amount}"
            )));
        }

        let tx = self.write_tx()?;
        let row_id = user_row_id(&tx, user_id)?;
        let affected = tx.execute(
            "UPDATE users SET event_tickets = event_tickets + ?1
             WHERE id = ?2 AND event_tickets <= ?3",
            params![amount, row_id, i64::MAX - amount],
        )?;
        if affected == 0 {
            return Err(StoreError::InvalidInput(format!(
                "ticket credit of {amount} would overflow the balance"
            )));
        }
        let balance = balance_of(&tx, row_id)?;
        tx.commit()?;

        tracing::info!(user = %user_id, amount, balance, "tickets credited");
        Ok(balance)
    }
}

/// Debit one entry's worth of tickets from the user row `row_id`.
///
/// Fails with [`StoreError::InsufficientTickets`] and changes nothing when
/// the balance is too low.
pub(crate) fn debit_ticket_in(conn: &Connection, row_id: i64) -> Result<i64> {
    let affected = conn.execute(
        "UPDATE users SET event_tickets = event_tickets - ?1
         WHERE id = ?2 AND event_tickets >= ?1",
        params![TICKETS_PER_ENTRY, row_id],
    )?;
    if affected == 0 {
        return Err(StoreError::InsufficientTickets);
    }
    balance_of(conn, row_id)
}

fn balance_of(conn: &Connection, row_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT event_tickets FROM users WHERE id = ?1",
        params![row_id],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use quiniela_shared::EntityKind;

    use super::*;
    use crate::models::NewUser;

    fn db_with_user(tickets: i64) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.register_user(&NewUser::new("ana")).unwrap();
        if tickets > 0 {
            db.credit_ticket("ana", tickets).unwrap();
        }
        db
    }

    #[test]
    fn debit_decrements_balance() {
        let mut db = db_with_user(2);
        assert_eq!(db.debit_ticket("ana").unwrap(), 1);
        assert_eq!(db.debit_ticket("ana").unwrap(), 0);
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
    }

    #[test]
    fn debit_on_zero_balance_fails_and_leaves_balance() {
        let mut db = db_with_user(0);
        assert!(matches!(
            db.debit_ticket("ana"),
            Err(StoreError::InsufficientTickets)
        ));
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
    }

    #[test]
    fn balance_never_goes_negative() {
        let mut db = db_with_user(1);
        // Interleave credits and more debits than there are tickets.
        let ops: [i64; 9] = [-1, -1, 3, -1, -1, -1, -1, 1, -1];
        for op in ops {
            let _ = if op < 0 {
                db.debit_ticket("ana")
            } else {
                db.credit_ticket("ana", op)
            };
            assert!(db.ticket_balance("ana").unwrap() >= 0);
        }
        assert_eq!(db.ticket_balance("ana").unwrap(), 0);
    }

    #[test]
    fn credit_rejects_non_positive_amounts() {
        let mut db = db_with_user(0);
        assert!(matches!(
            db.credit_ticket("ana", 0),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            db.credit_ticket("ana", -3),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn credit_past_max_balance_is_rejected() {
        let mut db = db_with_user(0);
        assert_eq!(db.credit_ticket("ana", i64::MAX).unwrap(), i64::MAX);
        assert!(matches!(
            db.credit_ticket("ana", 1),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(db.ticket_balance("ana").unwrap(), i64::MAX);
        assert_eq!(db.debit_ticket("ana").unwrap(), i64::MAX - 1);
    }

    #[test]
    fn unknown_user() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.debit_ticket("ghost"),
            Err(StoreError::NotFound(EntityKind::User))
        ));
        assert!(matches!(
            db.credit_ticket("ghost", 1),
            Err(StoreError::NotFound(EntityKind::User))
        ));
    }

    #[test]
    fn schema_rejects_negative_balance() {
        let db = db_with_user(0);
        let err = db
            .conn()
            .execute("UPDATE users SET event_tickets = -1 WHERE user_id = 'ana'", [])
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(_, _)));
    }
}
