// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Appends a computed register to every row

use super::{input_state, pass_through_skip_call, ProduceResult, SkipResult};
use crate::exec::call::AqlCall;
use crate::exec::expression::Expression;
use crate::exec::item_block::{DataRange, OutputRows};

#[derive(Debug)]
pub struct CalculationExecutor {
    expression: Expression,
}

impl CalculationExecutor {
    pub fn new(expression: Expression) -> Self {
        Self { expression }
    }

    pub fn produce_rows(&mut self, input: &mut DataRange, output: &mut OutputRows) -> ProduceResult {
        while !output.is_full() {
            let Some(mut row) = input.next_data_row() else {
                break;
            };
            let value = self.expression.evaluate(&row)?;
            row.push(value);
            output.add_row(row)?;
        }
        Ok((
            input_state(input),
            AqlCall::simulate_get_some(output.num_rows_left()),
        ))
    }

    /// Rows map one to one, so skipping is delegated upstream whenever
    /// possible
    pub fn skip_rows_range(&mut self, input: &mut DataRange, call: &mut AqlCall) -> SkipResult {
        let mut skipped = input.take_skipped();
        call.did_skip(skipped);
        while call.need_skip_more() && input.next_data_row().is_some() {
            call.did_skip(1);
            skipped += 1;
        }
        Ok((input_state(input), skipped, pass_through_skip_call(call)))
    }
}
