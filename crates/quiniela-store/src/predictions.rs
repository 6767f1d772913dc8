//! Prediction submission.
//!
//! A participant submits their predictions for an event once.  The batch is
//! validated in full before anything is written; any bad entry rejects the
//! whole batch.  The stored batch and the score recount commit together.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use quiniela_shared::protocol::SubmissionReceipt;
use quiniela_shared::Outcome;

use crate::database::Database;
use crate::error::{is_unique_violation, Result, StoreError};
use crate::events::event_in;
use crate::models::{parse_outcome, parse_timestamp, Prediction, PredictionInput};
use crate::participation::participation_row;
use crate::rounds::match_in;
use crate::scoring::{compute_score_in, store_score_in};
use crate::users::user_row_id;

impl Database {
    /// Store `user_id`'s predictions for `event_id` and return the count
    /// saved with the resulting score.
    ///
    /// Fails with `NotParticipating` before the user has joined,
    /// `AlreadySubmitted` once any prediction exists for this event,
    /// `InvalidOutcome` for a token outside team1 / team2 / tie (aliases
    /// accepted), `NotFound(Match)` / `MatchNotInEvent` for a match id
    /// that is unknown or belongs to another event, and `InvalidInput` for
    /// an empty batch.  When the same match
    /// appears twice in one batch, the later entry wins.
    pub fn submit_predictions(
        &mut self,
        user_id: &str,
        event_id: i64,
        inputs: &[PredictionInput],
    ) -> Result<SubmissionReceipt> {
        let tx = self.write_tx()?;
        let user_row = user_row_id(&tx, user_id)?;
        event_in(&tx, event_id)?;

        if participation_row(&tx, user_row, event_id)?.is_none() {
            return Err(StoreError::NotParticipating);
        }
        if has_predictions_in(&tx, user_row, event_id)? {
            return Err(StoreError::AlreadySubmitted);
        }

        if inputs.is_empty() {
            return Err(StoreError::InvalidInput("no predictions submitted".into()));
        }
        let batch = validate_batch(&tx, event_id, inputs)?;

        let now = Utc::now().to_rfc3339();
        {
            let mut insert = tx.prepare(
                "INSERT INTO predictions (user_id, match_id, outcome, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (match_id, outcome) in &batch {
                insert
                    .execute(params![user_row, match_id, outcome.as_str(), now])
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            StoreError::AlreadySubmitted
                        } else {
                            StoreError::Sqlite(e)
                        }
                    })?;
            }
        }

        let total_points = compute_score_in(&tx, user_row, event_id)?;
        store_score_in(&tx, user_row, event_id, total_points)?;
        tx.commit()?;

        tracing::info!(
            user = %user_id,
            event_id,
            saved = batch.len(),
            total_points,
            "predictions submitted"
        );

        Ok(SubmissionReceipt {
            saved_count: batch.len(),
            total_points,
        })
    }

    /// Whether `user_id` has already submitted predictions for `event_id`.
    pub fn has_submitted(&self, user_id: &str, event_id: i64) -> Result<bool> {
        let user_row = user_row_id(self.conn(), user_id)?;
        event_in(self.conn(), event_id)?;
        has_predictions_in(self.conn(), user_row, event_id)
    }

    /// `user_id`'s stored predictions for `event_id`, by match id.
    pub fn predictions_for(&self, user_id: &str, event_id: i64) -> Result<Vec<Prediction>> {
        let user_row = user_row_id(self.conn(), user_id)?;
        event_in(self.conn(), event_id)?;

        let mut stmt = self.conn().prepare(
            "SELECT p.match_id, p.outcome, p.created_at
             FROM predictions p
             JOIN matches m ON m.id = p.match_id
             JOIN rounds r ON r.id = m.round_id
             WHERE p.user_id = ?1 AND r.event_id = ?2
             ORDER BY p.match_id ASC",
        )?;
        let rows = stmt.query_map(params![user_row, event_id], |row| {
            let outcome: String = row.get(1)?;
            let created: String = row.get(2)?;
            Ok(Prediction {
                match_id: row.get(0)?,
                outcome: parse_outcome(1, &outcome)?,
                created_at: parse_timestamp(2, &created)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn has_predictions_in(conn: &Connection, user_row: i64, event_id: i64) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1
             FROM predictions p
             JOIN matches m ON m.id = p.match_id
             JOIN rounds r ON r.id = m.round_id
             WHERE p.user_id = ?1 AND r.event_id = ?2
             LIMIT 1",
            params![user_row, event_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Canonicalize every outcome and check every match belongs to `event_id`.
fn validate_batch(
    conn: &Connection,
    event_id: i64,
    inputs: &[PredictionInput],
) -> Result<BTreeMap<i64, Outcome>> {
    let mut batch = BTreeMap::new();
    for input in inputs {
        let outcome = Outcome::parse(&input.outcome).map_err(|source| StoreError::InvalidOutcome {
            match_id: input.match_id,
            source,
        })?;

        let m = match_in(conn, input.match_id)?;
        if m.event_id != event_id {
            return Err(StoreError::MatchNotInEvent(input.match_id));
        }

        batch.insert(input.match_id, outcome);
    }
    Ok(batch)
}
