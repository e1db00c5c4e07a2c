// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for aqlexec
//!
//! Loads a plan and a data set from JSON files, executes the plan and
//! prints the result.

pub mod commands;
pub mod output;
pub mod run;

pub use commands::{Cli, Commands};
pub use run::handle_run;
