//! JSON payloads exchanged with clients.
//!
//! Field names are camelCase on the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// Full event tree: rounds in number order, matches in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
    pub rounds: Vec<RoundView>,
    pub results_visible: bool,
    pub ranking_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub id: i64,
    pub number: i64,
    pub matches: Vec<MatchView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: i64,
    pub team1: String,
    pub team2: String,
    /// `null` until the organizer records a result.
    pub result: Option<Outcome>,
}

/// One line of the standings table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: String,
    pub display_name: String,
    pub points: i64,
}

/// A user's prediction next to the actual result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub match_id: i64,
    pub team1: String,
    pub team2: String,
    pub prediction: Outcome,
    pub result: Option<Outcome>,
    /// `null` while the match is unresolved.
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResults {
    pub results_visible: bool,
    pub predictions: Vec<PredictionResult>,
    pub total_points: i64,
}

impl UserResults {
    pub fn hidden() -> Self {
        Self {
            results_visible: false,
            predictions: Vec::new(),
            total_points: 0,
        }
    }
}

/// Returned after a prediction batch is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub saved_count: usize,
    pub total_points: i64,
}
