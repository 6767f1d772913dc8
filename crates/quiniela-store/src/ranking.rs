//! Standings and per-user results, gated by the event's visibility flags.

use rusqlite::{params, OptionalExtension};

use quiniela_shared::constants::RANKING_LIMIT;
use quiniela_shared::protocol::{PredictionResult, RankingEntry, UserResults};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::event_in;
use crate::models::{parse_outcome, parse_result};
use crate::users::user_row_id;

impl Database {
    /// Top participants of `event_id` by points.
    ///
    /// Fails with `Hidden` until the organizer publishes the ranking.  Equal
    /// scores keep the order in which users joined.
    pub fn rankings(&self, event_id: i64) -> Result<Vec<RankingEntry>> {
        let event = event_in(self.conn(), event_id)?;
        if !event.ranking_visible {
            return Err(StoreError::Hidden("Ranking"));
        }

        let mut stmt = self.conn().prepare(
            "SELECT u.user_id,
                    COALESCE(NULLIF(TRIM(u.display_name), ''), u.user_id),
                    p.total_points
             FROM participations p
             JOIN users u ON u.id = p.user_id
             WHERE p.event_id = ?1
             ORDER BY p.total_points DESC, p.id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![event_id, RANKING_LIMIT as i64], |row| {
            Ok(RankingEntry {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                points: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// `user_id`'s predictions in `event_id` next to the recorded results.
    ///
    /// While results are hidden this returns an empty, non-visible payload
    /// instead of failing.
    pub fn user_results(&self, user_id: &str, event_id: i64) -> Result<UserResults> {
        let user_row = user_row_id(self.conn(), user_id)?;
        let event = event_in(self.conn(), event_id)?;
        if !event.results_visible {
            return Ok(UserResults::hidden());
        }

        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.team1, m.team2, p.outcome, m.result
             FROM predictions p
             JOIN matches m ON m.id = p.match_id
             JOIN rounds r ON r.id = m.round_id
             WHERE p.user_id = ?1 AND r.event_id = ?2
             ORDER BY r.number ASC, m.id ASC",
        )?;
        let rows = stmt.query_map(params![user_row, event_id], |row| {
            let predicted: String = row.get(3)?;
            let result: String = row.get(4)?;
            let prediction = parse_outcome(3, &predicted)?;
            let result = parse_result(4, &result)?;
            Ok(PredictionResult {
                match_id: row.get(0)?,
                team1: row.get(1)?,
                team2: row.get(2)?,
                prediction,
                result,
                correct: prediction.matches(result),
            })
        })?;
        let predictions = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        let total_points = self
            .conn()
            .query_row(
                "SELECT total_points FROM participations WHERE user_id = ?1 AND event_id = ?2",
                params![user_row, event_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        Ok(UserResults {
            results_visible: true,
            predictions,
            total_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use quiniela_shared::{EntityKind, Outcome};

    use super::*;
    use crate::events::tests::new_event;
    use crate::models::{NewUser, PredictionInput};

    fn setup() -> (Database, i64, Vec<i64>) {
        let mut db = Database::open_in_memory().unwrap();
        let e = db.create_event(&new_event("Velada")).unwrap();
        db.set_current(e.id, true).unwrap();
        let round = db.add_round(e.id, 1).unwrap();
        let m1 = db.add_match(round.id, &"Rojo".into(), &"Azul".into()).unwrap();
        let m2 = db.add_match(round.id, &"Verde".into(), &"Negro".into()).unwrap();
        (db, e.id, vec![m1.id, m2.id])
    }

    fn enter(db: &mut Database, user: &str, display: Option<&str>, event_id: i64) {
        let mut new = NewUser::new(user);
        new.display_name = display.map(str::to_string);
        db.register_user(&new).unwrap();
        db.credit_ticket(user, 1).unwrap();
        db.join_event(user, event_id).unwrap();
    }

    #[test]
    fn hidden_until_published_then_ordered() {
        let (mut db, event_id, m) = setup();
        enter(&mut db, "ana", Some("Ana"), event_id);
        enter(&mut db, "beto", None, event_id);
        db.submit_predictions("ana", event_id, &[PredictionInput::new(m[0], "team2")])
            .unwrap();
        db.submit_predictions(
            "beto",
            event_id,
            &[
                PredictionInput::new(m[0], "team1"),
                PredictionInput::new(m[1], "tie"),
            ],
        )
        .unwrap();
        db.set_match_result(m[0], Some(Outcome::Team1)).unwrap();
        db.set_match_result(m[1], Some(Outcome::Tie)).unwrap();

        assert!(matches!(db.rankings(event_id), Err(StoreError::Hidden(_))));

        db.toggle_ranking_visible(event_id).unwrap();
        let table = db.rankings(event_id).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].user_id, "beto");
        assert_eq!(table[0].display_name, "beto");
        assert_eq!(table[0].points, 2);
        assert_eq!(table[1].display_name, "Ana");
        assert_eq!(table[1].points, 0);
    }

    #[test]
    fn ties_keep_join_order_and_table_is_capped() {
        let (mut db, event_id, _) = setup();
        let users: Vec<String> = (0..12).map(|i| format!("u{i:02}")).collect();
        for user in &users {
            enter(&mut db, user, None, event_id);
        }
        db.toggle_ranking_visible(event_id).unwrap();

        let table = db.rankings(event_id).unwrap();
        assert_eq!(table.len(), RANKING_LIMIT);
        let ids: Vec<_> = table.iter().map(|e| e.user_id.as_str()).collect();
        let expected: Vec<_> = users.iter().take(RANKING_LIMIT).map(String::as_str).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn rankings_of_missing_event() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.rankings(42),
            Err(StoreError::NotFound(EntityKind::Event))
        ));
    }

    #[test]
    fn user_results_follow_visibility() {
        let (mut db, event_id, m) = setup();
        enter(&mut db, "ana", None, event_id);
        db.submit_predictions(
            "ana",
            event_id,
            &[
                PredictionInput::new(m[0], "equipo2"),
                PredictionInput::new(m[1], "team1"),
            ],
        )
        .unwrap();
        db.set_match_result(m[0], Some(Outcome::Team2)).unwrap();

        let hidden = db.user_results("ana", event_id).unwrap();
        assert_eq!(hidden, UserResults::hidden());

        db.toggle_results_visible(event_id).unwrap();
        let shown = db.user_results("ana", event_id).unwrap();
        assert!(shown.results_visible);
        assert_eq!(shown.total_points, 1);
        assert_eq!(shown.predictions.len(), 2);

        let first = &shown.predictions[0];
        assert_eq!(first.team1, "Rojo");
        assert_eq!(first.prediction, Outcome::Team2);
        assert_eq!(first.correct, Some(true));

        let second = &shown.predictions[1];
        assert_eq!(second.result, None);
        assert_eq!(second.correct, None);
    }

    #[test]
    fn user_results_without_entry_is_empty() {
        let (mut db, event_id, _) = setup();
        db.register_user(&NewUser::new("beto")).unwrap();
        db.toggle_results_visible(event_id).unwrap();

        let results = db.user_results("beto", event_id).unwrap();
        assert!(results.results_visible);
        assert!(results.predictions.is_empty());
        assert_eq!(results.total_points, 0);
    }
}
