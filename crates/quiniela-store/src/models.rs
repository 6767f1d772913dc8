//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quiniela_shared::{Outcome, TeamRef};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Row id.
    #[serde(skip)]
    pub id: i64,
    /// Login key, unique and immutable.
    pub user_id: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Ticket balance, never negative.
    pub event_tickets: i64,
    pub created_at: DateTime<Utc>,
}

/// Registration payload.  Profile fields are opaque to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewUser {
    pub user_id: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl NewUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One prediction contest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
    /// At most one event is current at any time.
    pub current: bool,
    pub results_visible: bool,
    pub ranking_visible: bool,
}

/// Event creation payload, optionally carrying its team names, rounds and
/// matches.  Team names are stored first so matches may refer to them by
/// code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub teams: Vec<NewTeam>,
    #[serde(default)]
    pub rounds: Vec<NewRound>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTeam {
    pub value: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRound {
    pub number: i64,
    #[serde(default)]
    pub matches: Vec<NewMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub team1: TeamRef,
    pub team2: TeamRef,
}

// ---------------------------------------------------------------------------
// Round / Match / TeamName
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: i64,
    pub event_id: i64,
    pub number: i64,
}

/// A two-team contest.  Team names are snapshots taken at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: i64,
    pub round_id: i64,
    pub event_id: i64,
    pub team1: String,
    pub team2: String,
    pub result: Option<Outcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamName {
    pub event_id: i64,
    pub value: i64,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Prediction / Participation
// ---------------------------------------------------------------------------

/// One entry of a prediction batch, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionInput {
    pub match_id: i64,
    pub outcome: String,
}

impl PredictionInput {
    pub fn new(match_id: i64, outcome: impl Into<String>) -> Self {
        Self {
            match_id,
            outcome: outcome.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub match_id: i64,
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
}

/// A user's entry into an event.  `total_points` is a cache, always
/// recomputed from predictions and results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub user_id: String,
    pub event_id: i64,
    pub total_points: i64,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Column parsing helpers
// ---------------------------------------------------------------------------

fn conversion_failure<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parse_outcome(idx: usize, s: &str) -> rusqlite::Result<Outcome> {
    Outcome::parse(s).map_err(|e| conversion_failure(idx, e))
}

/// `''` in the `result` column means unresolved.
pub(crate) fn parse_result(idx: usize, s: &str) -> rusqlite::Result<Option<Outcome>> {
    Outcome::parse_result(s).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
