//! Nightwatch: autonomous issue-fixing supervisor.
//!
//! Scans a repository's assigned issues, hands each one to a developer role
//! and a QA role, and reviews the resulting pull requests against a quality
//! gate before reporting.

pub mod ci;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod github;
pub mod logging;
pub mod roles;
pub mod sandbox;
pub mod sequencer;
pub mod util;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
