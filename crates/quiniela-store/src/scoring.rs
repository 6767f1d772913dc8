//! Scoring engine.
//!
//! A user's score in an event is the number of their predictions whose
//! outcome equals the recorded result of the match; unresolved matches do not
//! count.  The score cached on the participation is always overwritten with a
//! full recount, never incremented, so recomputing is idempotent and a result
//! that changes twice leaves the same state as one that changed once.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use quiniela_shared::Outcome;

use crate::database::Database;
use crate::error::Result;
use crate::events::event_in;
use crate::models::{parse_outcome, parse_result};
use crate::rounds::match_in;
use crate::users::user_row_id;

/// Summary of a result change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultUpdate {
    pub match_id: i64,
    pub event_id: i64,
    pub result: Option<Outcome>,
    /// Users whose score was recounted.
    pub rescored_users: usize,
}

impl Database {
    /// Count `user_id`'s correct predictions in `event_id` without writing.
    pub fn score(&self, user_id: &str, event_id: i64) -> Result<i64> {
        let user_row = user_row_id(self.conn(), user_id)?;
        event_in(self.conn(), event_id)?;
        compute_score_in(self.conn(), user_row, event_id)
    }

    /// Recount `user_id`'s score in `event_id` and store it on their
    /// participation.  Returns the new score.
    pub fn recompute_score(&mut self, user_id: &str, event_id: i64) -> Result<i64> {
        let tx = self.write_tx()?;
        let user_row = user_row_id(&tx, user_id)?;
        event_in(&tx, event_id)?;
        let points = compute_score_in(&tx, user_row, event_id)?;
        store_score_in(&tx, user_row, event_id, points)?;
        tx.commit()?;

        tracing::debug!(user = %user_id, event_id, points, "score recomputed");
        Ok(points)
    }

    /// Record (or clear) the result of a match and recount the score of
    /// every user who predicted it, all in one transaction.
    pub fn set_match_result(&mut self, match_id: i64, result: Option<Outcome>) -> Result<ResultUpdate> {
        let tx = self.write_tx()?;
        let m = match_in(&tx, match_id)?;

        tx.execute(
            "UPDATE matches SET result = ?1 WHERE id = ?2",
            params![result.map(Outcome::as_str).unwrap_or(""), match_id],
        )?;

        // Snapshot of affected users, taken inside the write lock.
        let users: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT user_id FROM predictions WHERE match_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![match_id], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        for &user_row in &users {
            let points = compute_score_in(&tx, user_row, m.event_id)?;
            store_score_in(&tx, user_row, m.event_id, points)?;
        }
        tx.commit()?;

        tracing::info!(
            match_id,
            event_id = m.event_id,
            result = result.map(Outcome::as_str).unwrap_or("unresolved"),
            rescored = users.len(),
            "match result recorded"
        );

        Ok(ResultUpdate {
            match_id,
            event_id: m.event_id,
            result,
            rescored_users: users.len(),
        })
    }
}

/// Count correct predictions of the user row `user_row` in `event_id`.
///
/// Both tokens go through [`Outcome`] parsing before they are compared.
pub(crate) fn compute_score_in(conn: &Connection, user_row: i64, event_id: i64) -> Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT p.outcome, m.result
         FROM predictions p
         JOIN matches m ON m.id = p.match_id
         JOIN rounds r ON r.id = m.round_id
         WHERE p.user_id = ?1 AND r.event_id = ?2",
    )?;
    let rows = stmt.query_map(params![user_row, event_id], |row| {
        let predicted: String = row.get(0)?;
        let result: String = row.get(1)?;
        Ok((parse_outcome(0, &predicted)?, parse_result(1, &result)?))
    })?;

    let mut points = 0;
    for row in rows {
        let (predicted, result) = row?;
        if predicted.matches(result) == Some(true) {
            points += 1;
        }
    }
    Ok(points)
}

/// Overwrite the cached score.  A user without a participation row has no
/// score to store.
pub(crate) fn store_score_in(conn: &Connection, user_row: i64, event_id: i64, points: i64) -> Result<()> {
    conn.execute(
        "UPDATE participations SET total_points = ?1 WHERE user_id = ?2 AND event_id = ?3",
        params![points, user_row, event_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use quiniela_shared::{EntityKind, TeamRef};

    use super::*;
    use crate::error::StoreError;
    use crate::events::tests::new_event;
    use crate::models::{NewUser, PredictionInput};

    struct Fixture {
        db: Database,
        event_id: i64,
        matches: Vec<i64>,
    }

    fn fixture(users: &[&str]) -> Fixture {
        let mut db = Database::open_in_memory().unwrap();
        let e = db.create_event(&new_event("Velada")).unwrap();
        db.set_current(e.id, true).unwrap();
        let round = db.add_round(e.id, 1).unwrap();
        let matches = (0..3)
            .map(|i| {
                db.add_match(
                    round.id,
                    &TeamRef::Name(format!("Rojo {i}")),
                    &TeamRef::Name(format!("Azul {i}")),
                )
                .unwrap()
                .id
            })
            .collect();

        for user in users {
            db.register_user(&NewUser::new(*user)).unwrap();
            db.credit_ticket(user, 1).unwrap();
            db.join_event(user, e.id).unwrap();
        }

        Fixture {
            db,
            event_id: e.id,
            matches,
        }
    }

    #[test]
    fn unresolved_match_scores_nothing_until_result() {
        let mut f = fixture(&["ana"]);
        let m = f.matches[0];
        f.db
            .submit_predictions("ana", f.event_id, &[PredictionInput::new(m, "equipo1")])
            .unwrap();

        assert_eq!(f.db.recompute_score("ana", f.event_id).unwrap(), 0);

        f.db.set_match_result(m, Some(Outcome::Team1)).unwrap();
        assert_eq!(f.db.recompute_score("ana", f.event_id).unwrap(), 1);
        assert_eq!(f.db.participation("ana", f.event_id).unwrap().total_points, 1);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut f = fixture(&["ana"]);
        let preds: Vec<_> = f
            .matches
            .iter()
            .map(|&m| PredictionInput::new(m, "team2"))
            .collect();
        f.db.submit_predictions("ana", f.event_id, &preds).unwrap();
        f.db.set_match_result(f.matches[0], Some(Outcome::Team2)).unwrap();
        f.db.set_match_result(f.matches[1], Some(Outcome::Tie)).unwrap();

        let first = f.db.recompute_score("ana", f.event_id).unwrap();
        let second = f.db.recompute_score("ana", f.event_id).unwrap();
        assert_eq!(first, 1);
        assert_eq!(first, second);
        assert_eq!(f.db.score("ana", f.event_id).unwrap(), 1);
    }

    #[test]
    fn tie_prediction_in_old_vocabulary_scores() {
        let mut f = fixture(&["ana"]);
        let m = f.matches[2];
        f.db
            .submit_predictions("ana", f.event_id, &[PredictionInput::new(m, "empate")])
            .unwrap();
        let update = f.db.set_match_result(m, Some(Outcome::Tie)).unwrap();
        assert_eq!(update.rescored_users, 1);
        assert_eq!(f.db.participation("ana", f.event_id).unwrap().total_points, 1);
    }

    #[test]
    fn result_change_recounts_every_predictor() {
        let mut f = fixture(&["ana", "beto", "caro"]);
        let (m0, m1) = (f.matches[0], f.matches[1]);

        f.db.submit_predictions(
            "ana",
            f.event_id,
            &[PredictionInput::new(m0, "team1"), PredictionInput::new(m1, "team1")],
        )
        .unwrap();
        f.db.submit_predictions("beto", f.event_id, &[PredictionInput::new(m0, "team2")])
            .unwrap();
        // caro predicts only m1, so a change on m0 leaves caro alone.
        f.db.submit_predictions("caro", f.event_id, &[PredictionInput::new(m1, "team1")])
            .unwrap();

        f.db.set_match_result(m1, Some(Outcome::Team1)).unwrap();
        let update = f.db.set_match_result(m0, Some(Outcome::Team1)).unwrap();
        assert_eq!(update.rescored_users, 2);

        let points = |db: &Database, u: &str| db.participation(u, f.event_id).unwrap().total_points;
        assert_eq!(points(&f.db, "ana"), 2);
        assert_eq!(points(&f.db, "beto"), 0);
        assert_eq!(points(&f.db, "caro"), 1);

        // Correcting the result moves the point from ana to beto.
        f.db.set_match_result(m0, Some(Outcome::Team2)).unwrap();
        assert_eq!(points(&f.db, "ana"), 1);
        assert_eq!(points(&f.db, "beto"), 1);

        // Clearing it removes the point again.
        f.db.set_match_result(m0, None).unwrap();
        assert_eq!(points(&f.db, "beto"), 0);
        assert_eq!(f.db.get_match(m0).unwrap().result, None);
    }

    #[test]
    fn unknown_match() {
        let mut f = fixture(&[]);
        assert!(matches!(
            f.db.set_match_result(12345, Some(Outcome::Tie)),
            Err(StoreError::NotFound(EntityKind::Match))
        ));
    }
}
