// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde_json::Value as JsonValue;

use super::commands::OutputFormat;
use aqlexec::QueryResult;

/// Result formatter for different output formats
pub struct ResultFormatter;

impl ResultFormatter {
    /// Format query results in the specified format
    pub fn format(result: &QueryResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(result),
            OutputFormat::Json => Self::format_json(result),
        }
    }

    /// Format results as a table using comfy-table
    fn format_table(result: &QueryResult) -> String {
        let mut output = String::new();

        if result.is_empty() {
            output.push_str(&format!("{}\n", "No results found".yellow()));
        } else {
            output.push_str(&format!("{}\n", "Query Results".bold().green()));
            output.push_str(&format!(
                "Execution time: {:.3} ms\n",
                result.stats.execution_time * 1000.0
            ));
            output.push_str(&format!("Rows returned: {}\n", result.row_count()));
            if let Some(full_count) = result.full_count() {
                output.push_str(&format!("Full count: {}\n", full_count));
            }
            output.push('\n');

            let columns = Self::columns(&result.rows);
            let object_rows = result.rows.iter().all(JsonValue::is_object);
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(
                columns
                    .iter()
                    .map(|col| Cell::new(col).fg(Color::Green))
                    .collect::<Vec<_>>(),
            );
            for row in &result.rows {
                let cells: Vec<String> = match row {
                    JsonValue::Object(map) if object_rows => columns
                        .iter()
                        .map(|col| {
                            map.get(col)
                                .map(Self::value_to_string)
                                .unwrap_or_else(|| "NULL".to_string())
                        })
                        .collect(),
                    other => vec![Self::value_to_string(other)],
                };
                table.add_row(cells);
            }
            output.push_str(&table.to_string());
            output.push('\n');
        }

        if result.profile.enabled() {
            output.push_str(&Self::format_profile(result));
        }

        output
    }

    /// Per-node statistics, ordered by node id
    fn format_profile(result: &QueryResult) -> String {
        let mut nodes: Vec<_> = result.stats.nodes().iter().collect();
        nodes.sort_by_key(|(id, _)| id.0);

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["Node", "Calls", "Items", "Filtered", "Runtime (s)"]
                .into_iter()
                .map(|col| Cell::new(col).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
        for (id, stats) in nodes {
            table.add_row(vec![
                id.0.to_string(),
                stats.calls.to_string(),
                stats.items.to_string(),
                stats.filtered.to_string(),
                format!("{:.6}", stats.runtime),
            ]);
        }

        format!(
            "\n{} ({})\n{}\n",
            "Profile".bold().cyan(),
            result.profile,
            table
        )
    }

    /// Format results as the cursor-style JSON document
    fn format_json(result: &QueryResult) -> String {
        serde_json::to_string_pretty(&result.to_json()).unwrap_or_else(|_| {
            "{\"error\": \"Could not serialize results to JSON\"}".to_string()
        })
    }

    /// Column names: the attributes of object rows in first-seen order, or a
    /// single `value` column when any row is not an object
    fn columns(rows: &[JsonValue]) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            match row {
                JsonValue::Object(map) => {
                    for key in map.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
                _ => return vec!["value".to_string()],
            }
        }
        if columns.is_empty() {
            columns.push("value".to_string());
        }
        columns
    }

    /// Convert a value to a display string
    fn value_to_string(value: &JsonValue) -> String {
        match value {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
