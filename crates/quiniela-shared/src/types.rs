use serde::{Deserialize, Serialize};

/// Kind of record a lookup can fail to find.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Event,
    Round,
    Match,
    TeamName,
    Participation,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Event => "event",
            EntityKind::Round => "round",
            EntityKind::Match => "match",
            EntityKind::TeamName => "team name",
            EntityKind::Participation => "participation",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a match author names one side.
///
/// A numeric code is looked up in the event's team-name table when the match
/// is created; the resolved display name is copied onto the match, so later
/// renames leave existing matches untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TeamRef {
    Code(i64),
    Name(String),
}

impl From<&str> for TeamRef {
    fn from(value: &str) -> Self {
        TeamRef::Name(value.to_string())
    }
}

impl From<i64> for TeamRef {
    fn from(value: i64) -> Self {
        TeamRef::Code(value)
    }
}
