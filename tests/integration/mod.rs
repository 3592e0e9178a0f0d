//! Integration test suite for quorum.
//!
//! These tests drive the public API end to end: fan-out to several agents,
//! cross-evaluation, extraction of file edits from the winning answer, and
//! the backup/apply/restore cycle against a temporary working tree.
//!
//! # Test Categories
//!
//! - `parallel_dispatch`: concurrency, timeouts and partial failure
//! - `query_pipeline`: prompt to applied files and back
//! - `recovery`: snapshots, restore and pruning under failure
//!
//! # CI Compatibility
//!
//! All agents are scripted in-process; no CLI tools or network are needed.

mod fixtures;

mod parallel_dispatch;
mod query_pipeline;
mod recovery;
