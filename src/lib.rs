//! Quorum: fan one coding request out to several AI agents, have the agents
//! score each other's answers, and apply the winner to the working tree with
//! a snapshot to roll back to.
//!
//! The pipeline is split into independent engines:
//! - [`dispatch`]: concurrent fan-out with per-agent timeouts
//! - [`evaluate`]: all-pairs peer scoring and ranking
//! - [`extract`] and [`diff`]: file edits recovered from free text and diffed against disk
//! - [`backup`] and [`workspace`]: snapshot, apply, restore
//!
//! [`coder::Coder`] wires dispatch and evaluation into one query.

pub mod agent;
pub mod backup;
pub mod coder;
pub mod config;
pub mod context;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod log;
pub mod summary;
pub mod util;
pub mod workspace;

pub use error::{Error, Result};
