//! `$filter` expressions: tokenizer, parser and evaluator.
//!
//! Supports the subset of the remote query language the app actually uses:
//! comparisons (`eq ne gt ge lt le`), `and`/`or`/`not`, parentheses, and the
//! string functions `substringof`, `startswith`, `endswith`, `tolower`,
//! `toupper` and `indexof`.
//!
//! A filter that fails to parse must never widen a result set. Callers that
//! get a [`FilterError`] return zero records.

mod ast;
mod eval;
mod lexer;
mod parser;

use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

pub use ast::{BinaryOp, Expr, Function};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
  #[error("empty filter expression")]
  Empty,
  #[error("unexpected character '{ch}' at offset {offset}")]
  UnexpectedChar { ch: char, offset: usize },
  #[error("unterminated string literal starting at offset {offset}")]
  UnterminatedString { offset: usize },
  #[error("invalid number '{text}' at offset {offset}")]
  InvalidNumber { text: String, offset: usize },
  #[error("unexpected {found} at offset {offset}, expected {expected}")]
  Unexpected {
    found: String,
    expected: &'static str,
    offset: usize,
  },
  #[error("filter ended early, expected {expected}")]
  UnexpectedEnd { expected: &'static str },
  #[error("unknown function '{name}' at offset {offset}")]
  UnknownFunction { name: String, offset: usize },
  #[error("{name} takes {expected} argument(s), got {found}")]
  Arity {
    name: &'static str,
    expected: usize,
    found: usize,
  },
}

/// A parsed `$filter` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  expr: Expr,
}

impl Filter {
  pub fn parse(source: &str) -> Result<Self, FilterError> {
    let tokens = lexer::tokenize(source)?;
    let expr = parser::parse(&tokens)?;
    Ok(Self { expr })
  }

  /// Parse several filter strings and require all of them to hold.
  pub fn parse_all<'a, I>(sources: I) -> Result<Option<Self>, FilterError>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut combined: Option<Expr> = None;
    for source in sources {
      let expr = Self::parse(source)?.expr;
      combined = Some(match combined {
        Some(prev) => Expr::binary(BinaryOp::And, prev, expr),
        None => expr,
      });
    }
    Ok(combined.map(|expr| Self { expr }))
  }

  pub fn expr(&self) -> &Expr {
    &self.expr
  }

  /// Whether `record` satisfies the predicate.
  pub fn matches(&self, record: &Map<String, Value>) -> bool {
    eval::truthy(&eval::evaluate(&self.expr, record))
  }
}

impl FromStr for Filter {
  type Err = FilterError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

/// Type-coercing equality shared with single-entity key lookup.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
  eval::loose_eq(a, b)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn records() -> Vec<Map<String, Value>> {
    let people = json!([
      {"Username": "alice", "Name": "Alice A", "Age": 34, "Active": true, "Address": {"City": "Oslo"}},
      {"Username": "bob", "Name": "Bob B", "Age": "27", "Active": false, "Address": {"City": "Bergen"}},
      {"Username": "carol", "Name": "Carol O'Neil", "Age": 41, "Active": true},
      {"Username": "dave", "Name": null, "Age": 19}
    ]);
    people
      .as_array()
      .unwrap()
      .iter()
      .map(|r| r.as_object().unwrap().clone())
      .collect()
  }

  /// Run the filter and compare with a native predicate over the same rows.
  fn check<P>(source: &str, native: P)
  where
    P: Fn(&Map<String, Value>) -> bool,
  {
    let filter = Filter::parse(source).unwrap();
    for record in records() {
      assert_eq!(
        filter.matches(&record),
        native(&record),
        "filter {} disagrees on {:?}",
        source,
        record.get("Username")
      );
    }
  }

  fn text<'a>(r: &'a Map<String, Value>, field: &str) -> &'a str {
    r.get(field).and_then(Value::as_str).unwrap_or("")
  }

  fn age(r: &Map<String, Value>) -> f64 {
    match r.get("Age") {
      Some(Value::Number(n)) => n.as_f64().unwrap(),
      Some(Value::String(s)) => s.parse().unwrap(),
      _ => f64::NAN,
    }
  }

  #[test]
  fn test_substringof_matches_contains() {
    check("substringof('A',Name)", |r| text(r, "Name").contains('A'));
  }

  #[test]
  fn test_equality_and_inequality() {
    check("Username eq 'bob'", |r| text(r, "Username") == "bob");
    check("Username ne 'bob'", |r| text(r, "Username") != "bob");
  }

  #[test]
  fn test_coercing_equality_on_numeric_strings() {
    check("Age eq 27", |r| age(r) == 27.0);
    check("Age eq '34'", |r| age(r) == 34.0);
  }

  #[test]
  fn test_numeric_ordering() {
    check("Age gt 30", |r| age(r) > 30.0);
    check("Age le 27", |r| age(r) <= 27.0);
  }

  #[test]
  fn test_boolean_logic() {
    check("Active eq true and Age ge 40", |r| {
      r.get("Active") == Some(&json!(true)) && age(r) >= 40.0
    });
    check("Username eq 'bob' or Username eq 'dave'", |r| {
      matches!(text(r, "Username"), "bob" | "dave")
    });
    check("not (Age gt 30)", |r| !(age(r) > 30.0));
  }

  #[test]
  fn test_missing_property_is_null() {
    check("Active eq null", |r| {
      r.get("Active").map(Value::is_null).unwrap_or(true)
    });
    check("Name eq null", |r| r.get("Name") == Some(&Value::Null));
  }

  #[test]
  fn test_string_functions() {
    check("startswith(tolower(Name), 'car')", |r| {
      text(r, "Name").to_lowercase().starts_with("car")
    });
    check("endswith(Name, 'B')", |r| text(r, "Name").ends_with('B'));
    check("toupper(Username) eq 'ALICE'", |r| text(r, "Username") == "alice");
    check("indexof(Name, 'O''Neil') eq 6", |r| text(r, "Username") == "carol");
  }

  #[test]
  fn test_nested_path() {
    check("Address/City eq 'Oslo'", |r| text(r, "Username") == "alice");
    check("Address.City eq 'Bergen'", |r| text(r, "Username") == "bob");
  }

  #[test]
  fn test_parse_all_conjoins() {
    let filter = Filter::parse_all(["Age gt 20", "Active eq true"])
      .unwrap()
      .unwrap();
    let hits: Vec<String> = records()
      .iter()
      .filter(|r| filter.matches(r))
      .map(|r| text(r, "Username").to_string())
      .collect();
    assert_eq!(hits, vec!["alice", "carol"]);
  }

  #[test]
  fn test_parse_all_empty_is_none() {
    assert_eq!(Filter::parse_all(std::iter::empty()).unwrap(), None);
  }

  #[test]
  fn test_parse_all_fails_if_any_fails() {
    assert!(Filter::parse_all(["Age gt 20", "Age gt"]).is_err());
  }

  #[test]
  fn test_from_str() {
    let filter: Filter = "Age lt 20".parse().unwrap();
    assert!(matches!(filter.expr(), Expr::Binary { op: BinaryOp::Lt, .. }));
  }
}
