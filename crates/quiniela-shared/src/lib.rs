//! # quiniela-shared
//!
//! Vocabulary shared by the store and the HTTP server: match outcomes and
//! their canonical form, entity kinds, and the JSON payload shapes handed to
//! clients.

pub mod constants;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod types;

pub use error::OutcomeError;
pub use outcome::{is_correct, Outcome};
pub use types::{EntityKind, TeamRef};
