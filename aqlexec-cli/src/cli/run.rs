// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handler for `run`

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use super::commands::RunArgs;
use super::output::ResultFormatter;
use aqlexec::{ExecutionEngine, MemoryStore, QueryContext, QueryOptions, QueryPlan, QueryResult};

/// Handle the run command
pub fn handle_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    match execute(&args) {
        Ok(result) => {
            println!("{}", ResultFormatter::format(&result, args.format));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            Err(e)
        }
    }
}

/// Build options from the arguments, load plan and data, and run the query
pub fn execute(args: &RunArgs) -> Result<QueryResult, Box<dyn std::error::Error>> {
    let options = query_options(args)?;

    let plan = QueryPlan::from_json(&read_json(&args.plan)?)?;
    let store = MemoryStore::from_json(&read_json(&args.data)?)?;
    log::debug!(
        "loaded plan with {} nodes from {:?}",
        plan.node_count(),
        args.plan
    );

    let mut ctx = QueryContext::new(options);
    store.register(&mut ctx);

    let mut engine = ExecutionEngine::instantiate(Arc::new(plan), Arc::new(ctx))?;
    Ok(engine.run()?)
}

fn query_options(args: &RunArgs) -> Result<QueryOptions, Box<dyn std::error::Error>> {
    let mut options = QueryOptions {
        full_count: args.full_count,
        ..QueryOptions::default()
    };
    if let Some(profile) = &args.profile {
        options.profile = profile.parse()?;
    }
    if let Some(limit) = args.memory_limit {
        options.memory_limit = limit;
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    options.validate()?;
    Ok(options)
}

fn read_json(path: &Path) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in {:?}: {}", path, e).into())
}
