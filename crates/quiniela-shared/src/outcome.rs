//! Match outcomes and their canonical vocabulary.
//!
//! Predictions were historically submitted with `empate` for a tie while
//! results were recorded with `tie`, and team sides appear both as
//! `team1`/`team2` and `equipo1`/`equipo2`.  Every token goes through
//! [`Outcome::parse`] before it is stored or compared, so two outcomes are
//! only ever compared as enum values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OutcomeError;

/// The closed set of outcomes a match can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Outcome {
    Team1,
    Team2,
    Tie,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Team1, Outcome::Team2, Outcome::Tie];

    /// Canonical token, as stored in the database and emitted in JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Team1 => "team1",
            Outcome::Team2 => "team2",
            Outcome::Tie => "tie",
        }
    }

    /// Parse any accepted spelling of an outcome.
    ///
    /// Matching ignores case and surrounding whitespace.  An empty token is
    /// rejected with [`OutcomeError::Empty`]; use [`Outcome::parse_result`]
    /// where empty means "not decided yet".
    pub fn parse(raw: &str) -> Result<Self, OutcomeError> {
        let token = raw.trim().to_ascii_lowercase();
        match token.as_str() {
            "" => Err(OutcomeError::Empty),
            "team1" | "equipo1" => Ok(Outcome::Team1),
            "team2" | "equipo2" => Ok(Outcome::Team2),
            "tie" | "empate" => Ok(Outcome::Tie),
            _ => Err(OutcomeError::Unknown(raw.to_string())),
        }
    }

    /// Parse a match result column, where an empty value means unresolved.
    pub fn parse_result(raw: &str) -> Result<Option<Self>, OutcomeError> {
        match Self::parse(raw) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(OutcomeError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether this prediction agrees with `result`.
    ///
    /// `None` while the match is unresolved.
    pub fn matches(self, result: Option<Outcome>) -> Option<bool> {
        result.map(|r| r == self)
    }
}

/// Compare a raw predicted token with a raw result token.
///
/// Returns `None` when the result is empty or unreadable (the match counts as
/// unresolved) and `Some(false)` when the prediction itself is not a valid
/// outcome.
pub fn is_correct(predicted: &str, result: &str) -> Option<bool> {
    let result = Outcome::parse_result(result).ok().flatten()?;
    match Outcome::parse(predicted) {
        Ok(p) => p.matches(Some(result)),
        Err(_) => Some(false),
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = OutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Outcome {
    type Error = OutcomeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Outcome> for String {
    fn from(value: Outcome) -> Self {
        value.as_str().to_string()
    }
}
