use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
  And,
  Or,
}

/// The supported string functions and their argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
  /// `substringof(needle, haystack)`
  SubstringOf,
  /// `startswith(haystack, needle)`
  StartsWith,
  /// `endswith(haystack, needle)`
  EndsWith,
  ToLower,
  ToUpper,
  /// `indexof(haystack, needle)`
  IndexOf,
}

impl Function {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "substringof" => Self::SubstringOf,
      "startswith" => Self::StartsWith,
      "endswith" => Self::EndsWith,
      "tolower" => Self::ToLower,
      "toupper" => Self::ToUpper,
      "indexof" => Self::IndexOf,
      _ => return None,
    })
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::SubstringOf => "substringof",
      Self::StartsWith => "startswith",
      Self::EndsWith => "endswith",
      Self::ToLower => "tolower",
      Self::ToUpper => "toupper",
      Self::IndexOf => "indexof",
    }
  }

  pub fn arity(self) -> usize {
    match self {
      Self::ToLower | Self::ToUpper => 1,
      _ => 2,
    }
  }
}

/// Parsed filter expression. Built per request, evaluated per record.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Value),
  /// Path segments, e.g. `Address/City` -> `["Address", "City"]`
  Property(Vec<String>),
  Not(Box<Expr>),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    function: Function,
    args: Vec<Expr>,
  },
}

impl Expr {
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}
