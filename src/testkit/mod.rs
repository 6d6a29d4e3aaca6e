//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`clock`] — [`ManualClock`](clock::ManualClock), an advanceable
//!   [`Clock`](crate::clock::Clock) so delay-sensitive tests never wait
//!   on the wall clock.
//! - [`log`] — [`ScriptedLog`](log::ScriptedLog), a fake transaction log
//!   with scripted batches/errors and a live append mode.
//! - [`session`] — [`FakeSession`](session::FakeSession), a
//!   [`DatabaseSession`](crate::session::DatabaseSession) with close
//!   counting and scripted tenant records.
//! - [`domain`] — Builders for domain primitives: ids, change records,
//!   tenant records.

pub mod clock;
pub mod domain;
pub mod log;
pub mod session;
