//! v001 -- Initial schema creation.
//!
//! Creates `users`, `events`, `team_names`, `rounds`, `matches`,
//! `predictions` and `participations`.  The uniqueness rules the core relies
//! on are enforced here as constraints, not only in application code.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT NOT NULL UNIQUE,         -- login key, immutable
    display_name  TEXT,
    first_name    TEXT,
    last_name     TEXT,
    email         TEXT,
    birth_date    TEXT,                         -- YYYY-MM-DD
    phone         TEXT,
    address       TEXT,
    event_tickets INTEGER NOT NULL DEFAULT 0 CHECK (event_tickets >= 0),
    created_at    TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    date            TEXT NOT NULL,              -- YYYY-MM-DD
    location        TEXT NOT NULL,
    current         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    current_since   TEXT,                       -- RFC-3339, set with current
    results_visible INTEGER NOT NULL DEFAULT 0,
    ranking_visible INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

-- At most one current event.
CREATE UNIQUE INDEX IF NOT EXISTS idx_events_single_current
    ON events(current) WHERE current = 1;

-- ----------------------------------------------------------------
-- Team names (numeric code -> display name, per event)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS team_names (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    value    INTEGER NOT NULL,
    name     TEXT NOT NULL,

    UNIQUE (event_id, value),
    FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Rounds
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rounds (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    number   INTEGER NOT NULL,

    UNIQUE (event_id, number),
    FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Matches (team names are copied at creation time)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    round_id INTEGER NOT NULL,
    team1    TEXT NOT NULL,
    team2    TEXT NOT NULL,
    result   TEXT NOT NULL DEFAULT ''
             CHECK (result IN ('', 'team1', 'team2', 'tie')),

    FOREIGN KEY (round_id) REFERENCES rounds(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_matches_round ON matches(round_id);

-- ----------------------------------------------------------------
-- Predictions (canonical outcome tokens only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS predictions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL,
    match_id   INTEGER NOT NULL,
    outcome    TEXT NOT NULL CHECK (outcome IN ('team1', 'team2', 'tie')),
    created_at TEXT NOT NULL,

    UNIQUE (user_id, match_id),
    FOREIGN KEY (user_id)  REFERENCES users(id)   ON DELETE CASCADE,
    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id);

-- ----------------------------------------------------------------
-- Participations (entry record, one per user and event)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL,
    event_id     INTEGER NOT NULL,
    total_points INTEGER NOT NULL DEFAULT 0,
    joined_at    TEXT NOT NULL,

    UNIQUE (user_id, event_id),
    FOREIGN KEY (user_id)  REFERENCES users(id)  ON DELETE CASCADE,
    FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participations_ranking
    ON participations(event_id, total_points DESC, id ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
