// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row-level expressions used by calculation, filter, sort and collect nodes

use crate::exec::error::ExecutionError;
use crate::exec::item_block::{RegisterId, Row};
use crate::exec::projections::{deserialize_path, AttributePath};
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

/// Expression tree evaluated against one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expression {
    Constant {
        value: Value,
    },
    Register {
        register: RegisterId,
    },
    /// Attribute path inside a register; missing attributes are null
    Attribute {
        register: RegisterId,
        #[serde(deserialize_with = "deserialize_path")]
        path: AttributePath,
    },
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And {
        operands: Vec<Expression>,
    },
    Or {
        operands: Vec<Expression>,
    },
    Not {
        operand: Box<Expression>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant { value: value.into() }
    }

    pub fn register(register: RegisterId) -> Self {
        Expression::Register { register }
    }

    pub fn attribute(register: RegisterId, dotted: &str) -> Self {
        Expression::Attribute {
            register,
            path: dotted.split('.').map(str::to_string).collect(),
        }
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expression, right: Expression) -> Self {
        Expression::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, row: &Row) -> Result<Value, ExecutionError> {
        match self {
            Expression::Constant { value } => Ok(value.clone()),
            Expression::Register { register } => register_value(row, *register).cloned(),
            Expression::Attribute { register, path } => Ok(register_value(row, *register)?
                .lookup(path)
                .found()
                .cloned()
                .unwrap_or(Value::Null)),
            Expression::Compare { op, left, right } => {
                let left = left.evaluate(row)?;
                let right = right.evaluate(row)?;
                Ok(Value::Bool(op.matches(left.aql_compare(&right))))
            }
            Expression::And { operands } => {
                for operand in operands {
                    if !operand.evaluate(row)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expression::Or { operands } => {
                for operand in operands {
                    if operand.evaluate(row)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expression::Not { operand } => Ok(Value::Bool(!operand.evaluate(row)?.is_truthy())),
            Expression::Arithmetic { op, left, right } => {
                Ok(arithmetic(*op, &left.evaluate(row)?, &right.evaluate(row)?))
            }
        }
    }

    /// Highest register read by this expression
    pub fn max_register(&self) -> Option<RegisterId> {
        match self {
            Expression::Constant { .. } => None,
            Expression::Register { register } | Expression::Attribute { register, .. } => Some(*register),
            Expression::Compare { left, right, .. } | Expression::Arithmetic { left, right, .. } => {
                left.max_register().max(right.max_register())
            }
            Expression::And { operands } | Expression::Or { operands } => {
                operands.iter().filter_map(Expression::max_register).max()
            }
            Expression::Not { operand } => operand.max_register(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant { value } => write!(f, "{}", value),
            Expression::Register { register } => write!(f, "#{}", register),
            Expression::Attribute { register, path } => write!(f, "#{}.{}", register, path.join(".")),
            Expression::Compare { op, left, right } => write!(f, "({} {:?} {})", left, op, right),
            Expression::And { operands } => write!(f, "AND({} operands)", operands.len()),
            Expression::Or { operands } => write!(f, "OR({} operands)", operands.len()),
            Expression::Not { operand } => write!(f, "NOT {}", operand),
            Expression::Arithmetic { op, left, right } => write!(f, "({} {:?} {})", left, op, right),
        }
    }
}

pub(crate) fn register_value(row: &Row, register: RegisterId) -> Result<&Value, ExecutionError> {
    row.get(register).ok_or_else(|| {
        ExecutionError::Internal(format!(
            "register {} out of range for row with {} registers",
            register,
            row.len()
        ))
    })
}

/// AQL numeric conversion
fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int(n) => *n as f64,
        Value::Double(n) => *n,
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Array(items) if items.len() == 1 => to_number(&items[0]),
        _ => 0.0,
    }
}

/// Integer arithmetic stays integral unless it overflows; division,
/// modulo by zero and non-finite results yield null.
fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let exact = match op {
            ArithmeticOp::Add => a.checked_add(*b),
            ArithmeticOp::Sub => a.checked_sub(*b),
            ArithmeticOp::Mul => a.checked_mul(*b),
            ArithmeticOp::Mod if *b != 0 => a.checked_rem(*b),
            ArithmeticOp::Div if *b != 0 && a % b == 0 => a.checked_div(*b),
            _ => None,
        };
        if let Some(result) = exact {
            return Value::Int(result);
        }
    }

    let a = to_number(left);
    let b = to_number(right);
    let result = match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div if b == 0.0 => return Value::Null,
        ArithmeticOp::Div => a / b,
        ArithmeticOp::Mod if b == 0.0 => return Value::Null,
        ArithmeticOp::Mod => a % b,
    };
    if result.is_finite() {
        Value::Double(result)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> Row {
        vec![
            Value::from_json(&json!({"age": 30, "name": "ann", "tags": ["x"]})),
            Value::Int(7),
        ]
    }

    #[test]
    fn test_attribute_and_compare() {
        let expr = Expression::compare(CompareOp::Ge, Expression::attribute(0, "age"), Expression::constant(30i64));
        assert_eq!(expr.evaluate(&row()).unwrap(), Value::Bool(true));

        let missing = Expression::attribute(0, "address.city");
        assert_eq!(missing.evaluate(&row()).unwrap(), Value::Null);
    }

    #[test]
    fn test_logic() {
        let yes = Expression::constant(true);
        let no = Expression::constant(0i64);
        let and = Expression::And {
            operands: vec![yes.clone(), no.clone()],
        };
        let or = Expression::Or {
            operands: vec![no.clone(), yes.clone()],
        };
        let not = Expression::Not { operand: Box::new(no) };

        assert_eq!(and.evaluate(&row()).unwrap(), Value::Bool(false));
        assert_eq!(or.evaluate(&row()).unwrap(), Value::Bool(true));
        assert_eq!(not.evaluate(&row()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_arithmetic() {
        let eval = |op, a: Value, b: Value| arithmetic(op, &a, &b);
        assert_eq!(eval(ArithmeticOp::Add, Value::Int(2), Value::Int(3)), Value::Int(5));
        assert_eq!(eval(ArithmeticOp::Div, Value::Int(6), Value::Int(3)), Value::Int(2));
        assert_eq!(eval(ArithmeticOp::Div, Value::Int(7), Value::Int(2)), Value::Double(3.5));
        assert_eq!(eval(ArithmeticOp::Div, Value::Int(1), Value::Int(0)), Value::Null);
        assert_eq!(eval(ArithmeticOp::Mod, Value::Int(7), Value::Int(0)), Value::Null);
        assert_eq!(eval(ArithmeticOp::Add, Value::from("1.5"), Value::Null), Value::Double(1.5));
        assert_eq!(
            eval(ArithmeticOp::Mul, Value::Int(i64::MAX), Value::Int(2)),
            Value::Double(i64::MAX as f64 * 2.0)
        );
    }

    #[test]
    fn test_register_out_of_range() {
        let err = Expression::register(5).evaluate(&row()).unwrap_err();
        assert!(matches!(err, ExecutionError::Internal(_)));
    }

    #[test]
    fn test_max_register() {
        let expr = Expression::compare(CompareOp::Eq, Expression::register(1), Expression::attribute(3, "a"));
        assert_eq!(expr.max_register(), Some(3));
        assert_eq!(Expression::constant(1i64).max_register(), None);
    }

    #[test]
    fn test_deserialize() {
        let expr: Expression = serde_json::from_value(json!({
            "type": "compare",
            "op": "<",
            "left": {"type": "attribute", "register": 0, "path": "age"},
            "right": {"type": "constant", "value": 40}
        }))
        .unwrap();
        assert_eq!(expr.evaluate(&row()).unwrap(), Value::Bool(true));

        let nested: Expression = serde_json::from_value(json!({
            "type": "attribute", "register": 0, "path": ["tags"]
        }))
        .unwrap();
        assert_eq!(nested.evaluate(&row()).unwrap(), Value::from_json(&json!(["x"])));
    }
}
