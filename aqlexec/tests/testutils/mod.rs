//! Test utilities for aqlexec integration tests
//!
//! - TestFixture: in-memory data set plus helpers to run plans against it
//! - FlakyShard: shard connection that answers every other request with
//!   "waiting"

#![allow(dead_code)]

pub mod flaky_shard;
pub mod test_fixture;
