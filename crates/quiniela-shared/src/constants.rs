/// Application name
pub const APP_NAME: &str = "Quiniela";

/// Number of participants returned by a ranking query. Fixed display limit.
pub const RANKING_LIMIT: usize = 10;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default SQLite database file, relative to the working directory
pub const DEFAULT_DATABASE_FILE: &str = "quiniela.db";

/// How long a connection waits on a locked database before giving up
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Tickets debited by a single event entry
pub const TICKETS_PER_ENTRY: i64 = 1;
