//! # quiniela-store
//!
//! Durable state for prediction contests, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`.  Plain CRUD helpers live next to the consistency
//! core: the ticket ledger, the participation gate, prediction submission,
//! scoring and the ranking / visibility gate.  Every operation that touches
//! more than one row runs inside its own `BEGIN IMMEDIATE` transaction, so
//! several processes may share one database file.

pub mod database;
pub mod events;
pub mod ledger;
pub mod migrations;
pub mod models;
pub mod participation;
pub mod predictions;
pub mod ranking;
pub mod rounds;
pub mod scoring;
pub mod teams;
pub mod users;

mod error;

pub use database::Database;
pub use error::{ErrorKind, StoreError};
pub use models::*;
