//! Recursive-descent parser.
//!
//! ```text
//! expr    := and ('or' and)*
//! and     := cmp ('and' cmp)*
//! cmp     := unary (op unary)?
//! unary   := 'not' unary | primary
//! primary := literal | property | call | '(' expr ')'
//! ```

use serde_json::Value;

use super::ast::{BinaryOp, Expr, Function};
use super::eval::number_value;
use super::lexer::{Keyword, Spanned, Token};
use super::FilterError;

pub fn parse(tokens: &[Spanned]) -> Result<Expr, FilterError> {
  if tokens.is_empty() {
    return Err(FilterError::Empty);
  }

  let mut parser = Parser { tokens, pos: 0 };
  let expr = parser.parse_or()?;

  match parser.peek() {
    None => Ok(expr),
    Some(extra) => Err(FilterError::Unexpected {
      found: extra.token.describe(),
      expected: "end of filter",
      offset: extra.offset,
    }),
  }
}

struct Parser<'a> {
  tokens: &'a [Spanned],
  pos: usize,
}

impl<'a> Parser<'a> {
  fn peek(&self) -> Option<&'a Spanned> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Option<&'a Spanned> {
    let token = self.tokens.get(self.pos);
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn eat_keyword(&mut self, keyword: Keyword) -> bool {
    if matches!(self.peek(), Some(Spanned { token: Token::Keyword(k), .. }) if *k == keyword) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn expect(&mut self, wanted: Token, expected: &'static str) -> Result<(), FilterError> {
    match self.next() {
      Some(s) if s.token == wanted => Ok(()),
      Some(s) => Err(FilterError::Unexpected {
        found: s.token.describe(),
        expected,
        offset: s.offset,
      }),
      None => Err(FilterError::UnexpectedEnd { expected }),
    }
  }

  fn parse_or(&mut self) -> Result<Expr, FilterError> {
    let mut lhs = self.parse_and()?;
    while self.eat_keyword(Keyword::Or) {
      let rhs = self.parse_and()?;
      lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
  }

  fn parse_and(&mut self) -> Result<Expr, FilterError> {
    let mut lhs = self.parse_comparison()?;
    while self.eat_keyword(Keyword::And) {
      let rhs = self.parse_comparison()?;
      lhs = Expr::binary(BinaryOp::And, lhs, rhs);
    }
    Ok(lhs)
  }

  fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
    let lhs = self.parse_unary()?;

    let op = match self.peek().map(|s| &s.token) {
      Some(Token::Keyword(Keyword::Eq)) => BinaryOp::Eq,
      Some(Token::Keyword(Keyword::Ne)) => BinaryOp::Ne,
      Some(Token::Keyword(Keyword::Gt)) => BinaryOp::Gt,
      Some(Token::Keyword(Keyword::Ge)) => BinaryOp::Ge,
      Some(Token::Keyword(Keyword::Lt)) => BinaryOp::Lt,
      Some(Token::Keyword(Keyword::Le)) => BinaryOp::Le,
      _ => return Ok(lhs),
    };
    self.pos += 1;

    let rhs = self.parse_unary()?;
    Ok(Expr::binary(op, lhs, rhs))
  }

  fn parse_unary(&mut self) -> Result<Expr, FilterError> {
    if self.eat_keyword(Keyword::Not) {
      let operand = self.parse_unary()?;
      return Ok(Expr::Not(Box::new(operand)));
    }
    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<Expr, FilterError> {
    let expected = "a literal, property, function call or '('";
    let Some(spanned) = self.next() else {
      return Err(FilterError::UnexpectedEnd { expected });
    };

    match &spanned.token {
      Token::Str(s) => Ok(Expr::Literal(Value::String(s.clone()))),
      Token::Number(n) => Ok(Expr::Literal(number_value(*n))),
      Token::Keyword(Keyword::True) => Ok(Expr::Literal(Value::Bool(true))),
      Token::Keyword(Keyword::False) => Ok(Expr::Literal(Value::Bool(false))),
      Token::Keyword(Keyword::Null) => Ok(Expr::Literal(Value::Null)),
      Token::LParen => {
        let inner = self.parse_or()?;
        self.expect(Token::RParen, "')'")?;
        Ok(inner)
      }
      Token::Ident(name) => {
        if matches!(self.peek(), Some(Spanned { token: Token::LParen, .. })) {
          self.pos += 1;
          self.parse_call(name, spanned.offset)
        } else {
          Ok(Expr::Property(
            name.split(['.', '/']).map(String::from).collect(),
          ))
        }
      }
      other => Err(FilterError::Unexpected {
        found: other.describe(),
        expected,
        offset: spanned.offset,
      }),
    }
  }

  /// Arguments of a call; the opening parenthesis is already consumed.
  fn parse_call(&mut self, name: &str, offset: usize) -> Result<Expr, FilterError> {
    let function = Function::from_name(name).ok_or_else(|| FilterError::UnknownFunction {
      name: name.to_string(),
      offset,
    })?;

    let mut args = Vec::new();
    if matches!(self.peek(), Some(Spanned { token: Token::RParen, .. })) {
      self.pos += 1;
    } else {
      loop {
        args.push(self.parse_or()?);
        match self.next() {
          Some(Spanned { token: Token::Comma, .. }) => continue,
          Some(Spanned { token: Token::RParen, .. }) => break,
          Some(s) => {
            return Err(FilterError::Unexpected {
              found: s.token.describe(),
              expected: "',' or ')'",
              offset: s.offset,
            })
          }
          None => return Err(FilterError::UnexpectedEnd { expected: "')'" }),
        }
      }
    }

    if args.len() != function.arity() {
      return Err(FilterError::Arity {
        name: function.name(),
        expected: function.arity(),
        found: args.len(),
      });
    }

    Ok(Expr::Call { function, args })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::lexer::tokenize;
  use serde_json::json;

  fn parse_str(input: &str) -> Result<Expr, FilterError> {
    parse(&tokenize(input)?)
  }

  fn prop(name: &str) -> Expr {
    Expr::Property(vec![name.to_string()])
  }

  #[test]
  fn test_simple_comparison() {
    assert_eq!(
      parse_str("Age gt 30").unwrap(),
      Expr::binary(BinaryOp::Gt, prop("Age"), Expr::Literal(json!(30)))
    );
  }

  #[test]
  fn test_and_binds_tighter_than_or() {
    let expr = parse_str("A eq 1 or B eq 2 and C eq 3").unwrap();
    let Expr::Binary { op, rhs, .. } = expr else {
      panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Or);
    assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
  }

  #[test]
  fn test_parentheses_override_precedence() {
    let expr = parse_str("(A eq 1 or B eq 2) and C eq 3").unwrap();
    assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
  }

  #[test]
  fn test_not_applies_to_primary() {
    let expr = parse_str("not substringof('x', Name)").unwrap();
    assert!(matches!(expr, Expr::Not(inner) if matches!(*inner, Expr::Call { .. })));
  }

  #[test]
  fn test_nested_property_path() {
    assert_eq!(
      parse_str("Address/City eq 'Oslo'").unwrap(),
      Expr::binary(
        BinaryOp::Eq,
        Expr::Property(vec!["Address".to_string(), "City".to_string()]),
        Expr::Literal(json!("Oslo"))
      )
    );
  }

  #[test]
  fn test_function_with_nested_call() {
    let expr = parse_str("startswith(tolower(Name), 'al')").unwrap();
    let Expr::Call { function, args } = expr else {
      panic!("expected call");
    };
    assert_eq!(function, Function::StartsWith);
    assert!(matches!(
      &args[0],
      Expr::Call {
        function: Function::ToLower,
        ..
      }
    ));
  }

  #[test]
  fn test_literals() {
    assert_eq!(parse_str("null").unwrap(), Expr::Literal(Value::Null));
    assert_eq!(parse_str("true").unwrap(), Expr::Literal(json!(true)));
    assert_eq!(parse_str("-2.5").unwrap(), Expr::Literal(json!(-2.5)));
  }

  #[test]
  fn test_unknown_function_rejected() {
    assert!(matches!(
      parse_str("length(Name) eq 3"),
      Err(FilterError::UnknownFunction { .. })
    ));
  }

  #[test]
  fn test_wrong_arity_rejected() {
    assert!(matches!(
      parse_str("substringof('A')"),
      Err(FilterError::Arity {
        name: "substringof",
        expected: 2,
        found: 1
      })
    ));
    assert!(matches!(
      parse_str("tolower()"),
      Err(FilterError::Arity { found: 0, .. })
    ));
  }

  #[test]
  fn test_syntax_errors_abort_whole_filter() {
    for bad in [
      "Name eq",
      "Name eq 'a' and",
      "(Name eq 'a'",
      "Name eq 'a')",
      "eq 'a'",
      "Name eq 'a' Age",
      "substringof('a' Name)",
      "",
    ] {
      assert!(parse_str(bad).is_err(), "accepted: {}", bad);
    }
  }

  #[test]
  fn test_chained_comparison_is_rejected() {
    assert!(parse_str("A eq B eq C").is_err());
  }
}
