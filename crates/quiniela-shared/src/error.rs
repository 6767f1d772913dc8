use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("Unknown outcome: {0:?} (expected team1, team2 or tie)")]
    Unknown(String),

    #[error("Outcome is empty")]
    Empty,
}
