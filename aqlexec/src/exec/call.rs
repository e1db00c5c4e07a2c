// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row demand descriptor passed between operators
//!
//! An [`AqlCall`] says how many rows a consumer still wants: an offset to
//! skip, at most one finite soft or hard limit, and whether rows past the
//! limit must be counted (fullCount). Every operator level owns a private
//! copy and adjusts it as it skips and produces.

use crate::exec::error::ExecutionError;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt;

const KEY_LIMIT: &str = "limit";
const KEY_LIMIT_TYPE: &str = "limitType";
const KEY_FULL_COUNT: &str = "fullCount";
const KEY_OFFSET: &str = "offset";

/// Wire sentinel for an infinite limit
pub const INFINITY: &str = "infinity";

/// A row limit, either a finite count or unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    Finite(usize),
    Infinity,
}

impl Limit {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Limit::Infinity)
    }

    pub fn is_finite(&self) -> bool {
        !self.is_infinite()
    }

    /// Count represented by this limit, `usize::MAX` if infinite
    pub fn value(&self) -> usize {
        match self {
            Limit::Finite(n) => *n,
            Limit::Infinity => usize::MAX,
        }
    }

    fn consume(&mut self, n: usize) {
        if let Limit::Finite(remaining) = self {
            debug_assert!(*remaining >= n, "produced more rows than allowed");
            *remaining = remaining.saturating_sub(n);
        }
    }
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Infinity
    }
}

impl From<usize> for Limit {
    fn from(n: usize) -> Self {
        Limit::Finite(n)
    }
}

impl Ord for Limit {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Limit::Finite(a), Limit::Finite(b)) => a.cmp(b),
            (Limit::Finite(_), Limit::Infinity) => Ordering::Less,
            (Limit::Infinity, Limit::Finite(_)) => Ordering::Greater,
            (Limit::Infinity, Limit::Infinity) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Limit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(n) => write!(f, "{}", n),
            Limit::Infinity => write!(f, "{}", INFINITY),
        }
    }
}

/// Whether a finite limit is soft (stop for now) or hard (never more)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitType {
    Soft,
    Hard,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Soft => "soft",
            LimitType::Hard => "hard",
        }
    }
}

/// A request for rows from a child operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AqlCall {
    /// Rows to skip before producing any
    offset: usize,
    // At most one of the two limits is finite
    soft_limit: Limit,
    hard_limit: Limit,
    /// Count every row that would have matched, ignoring the limit
    full_count: bool,
    /// Rows skipped so far on behalf of this call
    skipped_rows: usize,
}

impl Default for AqlCall {
    fn default() -> Self {
        Self {
            offset: 0,
            soft_limit: Limit::Infinity,
            hard_limit: Limit::Infinity,
            full_count: false,
            skipped_rows: 0,
        }
    }
}

impl AqlCall {
    /// Produce everything, skip nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// A call with an offset and one finite limit of the given type
    pub fn with_limit(offset: usize, limit: usize, limit_type: LimitType, full_count: bool) -> Self {
        let mut call = Self {
            offset,
            full_count,
            ..Self::default()
        };
        match limit_type {
            LimitType::Soft => call.soft_limit = Limit::Finite(limit),
            LimitType::Hard => call.hard_limit = Limit::Finite(limit),
        }
        call
    }

    /// Build a call from raw parts, rejecting two finite limits
    pub fn try_new(
        offset: usize,
        soft_limit: Limit,
        hard_limit: Limit,
        full_count: bool,
    ) -> Result<Self, ExecutionError> {
        if soft_limit.is_finite() && hard_limit.is_finite() {
            return Err(ExecutionError::BadParameter(format!(
                "AqlCall cannot carry both a soft limit ({}) and a hard limit ({})",
                soft_limit, hard_limit
            )));
        }
        Ok(Self {
            offset,
            soft_limit,
            hard_limit,
            full_count,
            skipped_rows: 0,
        })
    }

    /// Equivalent of the classic `skipSome(n)`
    pub fn simulate_skip_some(n: usize) -> Self {
        Self {
            offset: n,
            soft_limit: Limit::Finite(0),
            ..Self::default()
        }
    }

    /// Equivalent of the classic `getSome(n)`
    pub fn simulate_get_some(n: usize) -> Self {
        Self {
            soft_limit: Limit::Finite(n),
            ..Self::default()
        }
    }

    /// Consume everything upstream without producing or counting
    pub fn fast_forward() -> Self {
        Self {
            hard_limit: Limit::Finite(0),
            ..Self::default()
        }
    }

    /// Consume everything upstream, counting the rows as skipped
    pub fn full_count_only() -> Self {
        Self {
            hard_limit: Limit::Finite(0),
            full_count: true,
            ..Self::default()
        }
    }

    pub fn get_offset(&self) -> usize {
        self.offset
    }

    /// The effective limit: the smaller of soft and hard
    pub fn limit(&self) -> Limit {
        self.soft_limit.min(self.hard_limit)
    }

    /// The effective limit as a count (`usize::MAX` if unbounded)
    pub fn get_limit(&self) -> usize {
        self.limit().value()
    }

    /// Type of the finite limit, if any
    pub fn limit_type(&self) -> Option<LimitType> {
        debug_assert!(
            !(self.soft_limit.is_finite() && self.hard_limit.is_finite()),
            "AqlCall with both a soft and a hard limit"
        );
        if self.hard_limit.is_finite() {
            Some(LimitType::Hard)
        } else if self.soft_limit.is_finite() {
            Some(LimitType::Soft)
        } else {
            None
        }
    }

    pub fn has_hard_limit(&self) -> bool {
        self.hard_limit.is_finite()
    }

    pub fn has_soft_limit(&self) -> bool {
        self.soft_limit.is_finite()
    }

    pub fn needs_full_count(&self) -> bool {
        self.full_count
    }

    /// Record `n` skipped rows: first against the offset, beyond that as
    /// rows counted for fullCount
    pub fn did_skip(&mut self, n: usize) {
        if n <= self.offset {
            self.offset -= n;
        } else {
            debug_assert!(
                self.full_count && self.get_limit() == 0,
                "skipped {} rows past offset {} without fullCount",
                n,
                self.offset
            );
            self.offset = 0;
        }
        self.skipped_rows += n;
    }

    /// Record `n` produced rows against the limits
    pub fn did_produce(&mut self, n: usize) {
        self.soft_limit.consume(n);
        self.hard_limit.consume(n);
    }

    pub fn get_skip_count(&self) -> usize {
        self.skipped_rows
    }

    pub fn reset_skip_count(&mut self) {
        self.skipped_rows = 0;
    }

    /// Whether there are still rows to skip or to count
    pub fn need_skip_more(&self) -> bool {
        self.offset > 0 || (self.get_limit() == 0 && self.needs_full_count())
    }

    /// Whether the next action on this call is skipping rather than producing
    pub fn should_skip(&self) -> bool {
        self.offset > 0 || (self.get_limit() == 0 && self.has_hard_limit())
    }

    /// True if this call asks for no more rows than `other`
    ///
    /// A call covered by an earlier one may be answered by continuing the
    /// earlier call.
    pub fn request_less_data_than(&self, other: &AqlCall) -> bool {
        self.offset <= other.offset
            && self.limit() <= other.limit()
            && self.full_count == other.full_count
    }

    /// Decode a call from its wire object
    pub fn from_wire(slice: &JsonValue) -> Result<Self, ExecutionError> {
        let object = slice.as_object().ok_or_else(|| {
            ExecutionError::TypeError(format!(
                "When deserializing AqlCall: expected object, got {}",
                json_type_name(slice)
            ))
        })?;

        let mut limit: Option<Limit> = None;
        let mut limit_type: Option<Option<LimitType>> = None;
        let mut full_count: Option<bool> = None;
        let mut offset: Option<usize> = None;

        for (key, value) in object {
            match key.as_str() {
                KEY_LIMIT => {
                    limit = Some(if let Some(n) = value.as_u64() {
                        Limit::Finite(to_usize(n, KEY_LIMIT)?)
                    } else if value.as_str() == Some(INFINITY) {
                        Limit::Infinity
                    } else {
                        return Err(ExecutionError::type_mismatch(
                            KEY_LIMIT,
                            "a non-negative integer or \"infinity\"",
                        ));
                    });
                }
                KEY_LIMIT_TYPE => {
                    limit_type = Some(match value {
                        JsonValue::Null => None,
                        JsonValue::String(s) if s == "soft" => Some(LimitType::Soft),
                        JsonValue::String(s) if s == "hard" => Some(LimitType::Hard),
                        _ => {
                            return Err(ExecutionError::type_mismatch(
                                KEY_LIMIT_TYPE,
                                "null, \"soft\" or \"hard\"",
                            ))
                        }
                    });
                }
                KEY_FULL_COUNT => {
                    full_count = Some(
                        value
                            .as_bool()
                            .ok_or_else(|| ExecutionError::type_mismatch(KEY_FULL_COUNT, "a boolean"))?,
                    );
                }
                KEY_OFFSET => {
                    let n = value.as_u64().ok_or_else(|| {
                        ExecutionError::type_mismatch(KEY_OFFSET, "a non-negative integer")
                    })?;
                    offset = Some(to_usize(n, KEY_OFFSET)?);
                }
                other => {
                    log::warn!("When deserializing AqlCall: unexpected key '{}'", other);
                    debug_assert!(false, "unexpected key '{}' in AqlCall", other);
                }
            }
        }

        let limit = limit.ok_or_else(|| ExecutionError::missing_key(KEY_LIMIT))?;
        let limit_type = limit_type.ok_or_else(|| ExecutionError::missing_key(KEY_LIMIT_TYPE))?;
        let full_count = full_count.ok_or_else(|| ExecutionError::missing_key(KEY_FULL_COUNT))?;
        let offset = offset.ok_or_else(|| ExecutionError::missing_key(KEY_OFFSET))?;

        let mut call = AqlCall {
            offset,
            full_count,
            ..AqlCall::default()
        };
        match limit_type {
            Some(LimitType::Soft) => call.soft_limit = limit,
            Some(LimitType::Hard) => call.hard_limit = limit,
            None => {
                if limit.is_finite() {
                    return Err(ExecutionError::TypeError(
                        "When deserializing AqlCall: limit set, but limitType is missing".to_string(),
                    ));
                }
            }
        }
        Ok(call)
    }

    /// Encode this call as its wire object
    pub fn to_wire(&self) -> JsonValue {
        let mut object = Map::new();
        let (limit, limit_type) = match self.limit_type() {
            Some(LimitType::Hard) => (self.hard_limit, Some(LimitType::Hard)),
            Some(LimitType::Soft) => (self.soft_limit, Some(LimitType::Soft)),
            None => (Limit::Infinity, None),
        };
        let limit = match limit {
            Limit::Finite(n) => JsonValue::from(n as u64),
            Limit::Infinity => JsonValue::from(INFINITY),
        };
        object.insert(KEY_LIMIT.to_string(), limit);
        object.insert(
            KEY_LIMIT_TYPE.to_string(),
            limit_type.map_or(JsonValue::Null, |t| JsonValue::from(t.as_str())),
        );
        object.insert(KEY_FULL_COUNT.to_string(), JsonValue::from(self.full_count));
        object.insert(KEY_OFFSET.to_string(), JsonValue::from(self.offset as u64));
        JsonValue::Object(object)
    }
}

impl fmt::Display for AqlCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ skip: {}, softLimit: {}, hardLimit: {}, fullCount: {}, skipCount: {} }}",
            self.offset, self.soft_limit, self.hard_limit, self.full_count, self.skipped_rows
        )
    }
}

fn to_usize(n: u64, key: &str) -> Result<usize, ExecutionError> {
    usize::try_from(n).map_err(|_| ExecutionError::type_mismatch(key, "an integer within range"))
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
