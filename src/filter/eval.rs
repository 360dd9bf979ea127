//! Tree-walking evaluator.
//!
//! Equality is type-coercing the way the legacy backend compared values:
//! a number and its string form are equal, booleans compare as 0/1, and null
//! only equals null. A property missing from the record evaluates to null.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

use super::ast::{BinaryOp, Expr, Function};

/// Evaluate `expr` against one record. Total over any parsed tree.
pub fn evaluate(expr: &Expr, record: &Map<String, Value>) -> Value {
  match expr {
    Expr::Literal(value) => value.clone(),
    Expr::Property(path) => resolve(record, path).cloned().unwrap_or(Value::Null),
    Expr::Not(inner) => Value::Bool(!truthy(&evaluate(inner, record))),
    Expr::Binary { op, lhs, rhs } => Value::Bool(eval_binary(*op, lhs, rhs, record)),
    Expr::Call { function, args } => {
      let values: Vec<Value> = args.iter().map(|a| evaluate(a, record)).collect();
      call(*function, &values)
    }
  }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, record: &Map<String, Value>) -> bool {
  let operands = || (evaluate(lhs, record), evaluate(rhs, record));
  match op {
    // Short-circuit like the remote side does
    BinaryOp::And => truthy(&evaluate(lhs, record)) && truthy(&evaluate(rhs, record)),
    BinaryOp::Or => truthy(&evaluate(lhs, record)) || truthy(&evaluate(rhs, record)),
    BinaryOp::Eq => {
      let (l, r) = operands();
      loose_eq(&l, &r)
    }
    BinaryOp::Ne => {
      let (l, r) = operands();
      !loose_eq(&l, &r)
    }
    BinaryOp::Gt => {
      let (l, r) = operands();
      compare(&l, &r) == Some(Ordering::Greater)
    }
    BinaryOp::Ge => {
      let (l, r) = operands();
      matches!(compare(&l, &r), Some(Ordering::Greater | Ordering::Equal))
    }
    BinaryOp::Lt => {
      let (l, r) = operands();
      compare(&l, &r) == Some(Ordering::Less)
    }
    BinaryOp::Le => {
      let (l, r) = operands();
      matches!(compare(&l, &r), Some(Ordering::Less | Ordering::Equal))
    }
  }
}

fn resolve<'r>(record: &'r Map<String, Value>, path: &[String]) -> Option<&'r Value> {
  let (first, rest) = path.split_first()?;
  let mut current = record.get(first)?;
  for segment in rest {
    current = current.as_object()?.get(segment)?;
  }
  Some(current)
}

fn call(function: Function, args: &[Value]) -> Value {
  let text = |i: usize| args.get(i).map(to_text).unwrap_or_default();

  match function {
    Function::SubstringOf => Value::Bool(text(1).contains(&text(0))),
    Function::StartsWith => Value::Bool(text(0).starts_with(&text(1))),
    Function::EndsWith => Value::Bool(text(0).ends_with(&text(1))),
    Function::ToLower => Value::String(text(0).to_lowercase()),
    Function::ToUpper => Value::String(text(0).to_uppercase()),
    Function::IndexOf => {
      let haystack = text(0);
      let index = haystack
        .find(&text(1))
        .map(|byte| haystack[..byte].chars().count() as i64)
        .unwrap_or(-1);
      Value::from(index)
    }
  }
}

/// Integral values become JSON integers so they print without a fraction.
pub fn number_value(n: f64) -> Value {
  if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
    Value::from(n as i64)
  } else {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
  }
}

pub fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// String form used by the string functions. Null becomes the empty string.
pub fn to_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => match n.as_f64() {
      Some(f) if !n.is_i64() && !n.is_u64() => match number_value(f) {
        Value::Number(int) if int.is_i64() => int.to_string(),
        _ => f.to_string(),
      },
      _ => n.to_string(),
    },
    other => other.to_string(),
  }
}

/// Numeric view of a primitive. Empty or blank strings are 0, unparseable
/// strings are NaN. Arrays, objects and null have none.
fn to_number(value: &Value) -> Option<f64> {
  match value {
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    Value::Number(n) => n.as_f64(),
    Value::String(s) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        return Some(0.0);
      }
      let numeric_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
      Some(if numeric_chars {
        trimmed.parse().unwrap_or(f64::NAN)
      } else {
        f64::NAN
      })
    }
    Value::Null | Value::Array(_) | Value::Object(_) => None,
  }
}

pub fn loose_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Null, Value::Null) => true,
    (Value::Null, _) | (_, Value::Null) => false,
    (Value::String(x), Value::String(y)) => x == y,
    (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
    _ => match (to_number(a), to_number(b)) {
      (Some(x), Some(y)) => x == y,
      _ => false,
    },
  }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Null, _) | (_, Value::Null) => None,
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    _ => to_number(a)?.partial_cmp(&to_number(b)?),
  }
}
