// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! COLLECT: grouping with aggregates

use super::{skip_amount, ProduceResult, SkipResult};
use crate::exec::aggregation::{AggregationMethod, AggregationOptions};
use crate::exec::block::ExecutorState;
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::expression::Expression;
use crate::exec::item_block::{DataRange, OutputRows, Row};
use crate::exec::resource_monitor::ResourceUsageScope;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    /// Aggregated expression; COUNT without one counts rows
    #[serde(default)]
    pub expression: Option<Expression>,
}

impl AggregateSpec {
    pub fn count() -> Self {
        Self {
            function: AggregateFunction::Count,
            expression: None,
        }
    }

    pub fn of(function: AggregateFunction, expression: Expression) -> Self {
        Self {
            function,
            expression: Some(expression),
        }
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Count(u64),
    Sum { int: Option<i64>, double: f64 },
    Min(Option<Value>),
    Max(Option<Value>),
    Average { sum: f64, count: u64 },
}

impl Accumulator {
    fn new(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum => Accumulator::Sum {
                int: Some(0),
                double: 0.0,
            },
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
            AggregateFunction::Average => Accumulator::Average { sum: 0.0, count: 0 },
        }
    }

    /// Feed one value; `None` for a row-counting COUNT
    fn add(&mut self, value: Option<Value>) {
        match (self, value) {
            (Accumulator::Count(n), None) => *n += 1,
            (Accumulator::Count(n), Some(v)) => {
                if !v.is_null() {
                    *n += 1;
                }
            }
            (Accumulator::Sum { int, double }, Some(v)) => match v {
                Value::Int(i) => {
                    *int = int.and_then(|acc| acc.checked_add(i));
                    *double += i as f64;
                }
                Value::Double(d) => {
                    *int = None;
                    *double += d;
                }
                _ => {}
            },
            (Accumulator::Min(current), Some(v)) if !v.is_null() => {
                if current.as_ref().map_or(true, |c| v < *c) {
                    *current = Some(v);
                }
            }
            (Accumulator::Max(current), Some(v)) if !v.is_null() => {
                if current.as_ref().map_or(true, |c| v > *c) {
                    *current = Some(v);
                }
            }
            (Accumulator::Average { sum, count }, Some(v)) => {
                if let Some(n) = v.as_f64() {
                    *sum += n;
                    *count += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            Accumulator::Sum { int: Some(i), .. } => Value::Int(i),
            Accumulator::Sum { double, .. } if double.is_finite() => Value::Double(double),
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
            Accumulator::Average { count: 0, .. } => Value::Null,
            Accumulator::Average { sum, count } => Value::Double(sum / count as f64),
            Accumulator::Sum { .. } => Value::Null,
        }
    }
}

type Group = (Vec<Value>, Vec<Accumulator>);

/// Groups all input rows by the group expressions
///
/// Output rows hold the group values followed by the aggregate results.
/// The hash method emits groups ordered by their values; the sorted
/// method relies on input sorted by the group values and emits groups in
/// input order. Without group expressions a single row is produced, even
/// for empty input.
#[derive(Debug)]
pub struct CollectExecutor {
    groups: Vec<Expression>,
    aggregates: Vec<AggregateSpec>,
    options: AggregationOptions,
    collected: Vec<Group>,
    index: HashMap<Vec<Value>, usize>,
    output: Option<VecDeque<Row>>,
    memory: Option<ResourceUsageScope>,
}

impl CollectExecutor {
    pub fn new(groups: Vec<Expression>, aggregates: Vec<AggregateSpec>, options: AggregationOptions) -> Self {
        Self {
            groups,
            aggregates,
            options,
            collected: Vec::new(),
            index: HashMap::new(),
            output: None,
            memory: None,
        }
    }

    pub fn method(&self) -> AggregationMethod {
        match self.options.method() {
            AggregationMethod::Sorted => AggregationMethod::Sorted,
            _ => AggregationMethod::Hash,
        }
    }

    fn new_group(&self, key: Vec<Value>) -> Group {
        let accumulators = self.aggregates.iter().map(|a| Accumulator::new(a.function)).collect();
        (key, accumulators)
    }

    fn group_slot(&mut self, key: Vec<Value>, ctx: &QueryContext) -> Result<usize, ExecutionError> {
        let existing = match self.method() {
            AggregationMethod::Sorted => self
                .collected
                .last()
                .filter(|(last, _)| *last == key)
                .map(|_| self.collected.len() - 1),
            _ => self.index.get(&key).copied(),
        };
        if let Some(slot) = existing {
            return Ok(slot);
        }

        let bytes = key.iter().map(Value::memory_usage).sum::<u64>()
            + (self.aggregates.len() * std::mem::size_of::<Accumulator>()) as u64;
        self.memory
            .get_or_insert_with(|| ResourceUsageScope::new(ctx.monitor().clone()))
            .increase(bytes)?;

        if self.method() == AggregationMethod::Hash {
            self.index.insert(key.clone(), self.collected.len());
        }
        let group = self.new_group(key);
        self.collected.push(group);
        Ok(self.collected.len() - 1)
    }

    fn consume(&mut self, input: &mut DataRange, ctx: &QueryContext) -> Result<bool, ExecutionError> {
        if self.output.is_some() {
            return Ok(true);
        }
        while let Some(row) = input.next_data_row() {
            let key = self
                .groups
                .iter()
                .map(|g| g.evaluate(&row))
                .collect::<Result<Vec<_>, _>>()?;
            let slot = self.group_slot(key, ctx)?;
            for (i, spec) in self.aggregates.iter().enumerate() {
                let value = spec.expression.as_ref().map(|e| e.evaluate(&row)).transpose()?;
                self.collected[slot].1[i].add(value);
            }
        }
        if !input.upstream_done() {
            return Ok(false);
        }

        let mut groups = std::mem::take(&mut self.collected);
        self.index.clear();
        if groups.is_empty() && self.groups.is_empty() {
            groups.push(self.new_group(Vec::new()));
        }
        if self.method() == AggregationMethod::Hash {
            groups.sort_by(|(a, _), (b, _)| a.cmp(b));
        }
        log::debug!("collected {} groups using {} method", groups.len(), self.method());

        self.output = Some(
            groups
                .into_iter()
                .map(|(mut key, accumulators)| {
                    key.extend(accumulators.into_iter().map(Accumulator::finish));
                    key
                })
                .collect(),
        );
        self.memory = None;
        Ok(true)
    }

    fn state(&self) -> ExecutorState {
        match &self.output {
            Some(rows) if rows.is_empty() => ExecutorState::Done,
            _ => ExecutorState::HasMore,
        }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut DataRange,
        output: &mut OutputRows,
        ctx: &QueryContext,
    ) -> ProduceResult {
        if self.consume(input, ctx)? {
            while !output.is_full() {
                let Some(row) = self.output.as_mut().and_then(VecDeque::pop_front) else {
                    break;
                };
                output.add_row(row)?;
            }
        }
        Ok((self.state(), AqlCall::new()))
    }

    pub fn skip_rows_range(
        &mut self,
        input: &mut DataRange,
        call: &mut AqlCall,
        ctx: &QueryContext,
    ) -> SkipResult {
        let mut skipped = 0;
        if self.consume(input, ctx)? {
            if let Some(rows) = self.output.as_mut() {
                skipped = skip_amount(call, rows.len());
                rows.drain(..skipped);
                call.did_skip(skipped);
            }
        }
        Ok((self.state(), skipped, AqlCall::new()))
    }
}
