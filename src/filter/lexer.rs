//! Tokenizer for `$filter` expressions.

use super::FilterError;

/// Reserved words. Matching is case-sensitive, as on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
  And,
  Or,
  Not,
  True,
  False,
  Null,
}

impl Keyword {
  fn from_word(word: &str) -> Option<Self> {
    Some(match word {
      "eq" => Self::Eq,
      "ne" => Self::Ne,
      "gt" => Self::Gt,
      "ge" => Self::Ge,
      "lt" => Self::Lt,
      "le" => Self::Le,
      "and" => Self::And,
      "or" => Self::Or,
      "not" => Self::Not,
      "true" => Self::True,
      "false" => Self::False,
      "null" => Self::Null,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  LParen,
  RParen,
  Comma,
  Str(String),
  Number(f64),
  Keyword(Keyword),
  /// Identifier or property path, separators kept verbatim (`Address/City`)
  Ident(String),
}

impl Token {
  /// Short human description for error messages.
  pub fn describe(&self) -> String {
    match self {
      Token::LParen => "'('".to_string(),
      Token::RParen => "')'".to_string(),
      Token::Comma => "','".to_string(),
      Token::Str(s) => format!("string '{}'", s),
      Token::Number(n) => format!("number {}", n),
      Token::Keyword(k) => format!("keyword {:?}", k).to_lowercase(),
      Token::Ident(name) => format!("identifier {}", name),
    }
  }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
  pub token: Token,
  pub offset: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, FilterError> {
  let chars: Vec<(usize, char)> = input.char_indices().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    let (offset, ch) = chars[i];

    if ch.is_whitespace() {
      i += 1;
      continue;
    }

    let single = match ch {
      '(' => Some(Token::LParen),
      ')' => Some(Token::RParen),
      ',' => Some(Token::Comma),
      _ => None,
    };
    if let Some(token) = single {
      tokens.push(Spanned { token, offset });
      i += 1;
      continue;
    }

    if ch == '\'' {
      let (text, next) = lex_string(&chars, i)?;
      tokens.push(Spanned {
        token: Token::Str(text),
        offset,
      });
      i = next;
      continue;
    }

    if starts_number(&chars, i) {
      let (value, next) = lex_number(input, &chars, i)?;
      tokens.push(Spanned {
        token: Token::Number(value),
        offset,
      });
      i = next;
      continue;
    }

    if ch.is_alphabetic() || ch == '_' {
      let (word, next) = lex_word(&chars, i);
      let token = match Keyword::from_word(&word) {
        Some(keyword) => Token::Keyword(keyword),
        None => Token::Ident(word),
      };
      tokens.push(Spanned { token, offset });
      i = next;
      continue;
    }

    return Err(FilterError::UnexpectedChar { ch, offset });
  }

  Ok(tokens)
}

/// Single-quoted string; `''` inside stands for one quote.
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), FilterError> {
  let mut text = String::new();
  let mut i = start + 1;

  while i < chars.len() {
    let ch = chars[i].1;
    if ch == '\'' {
      if chars.get(i + 1).map(|(_, c)| *c) == Some('\'') {
        text.push('\'');
        i += 2;
        continue;
      }
      return Ok((text, i + 1));
    }
    text.push(ch);
    i += 1;
  }

  Err(FilterError::UnterminatedString {
    offset: chars[start].0,
  })
}

fn starts_number(chars: &[(usize, char)], i: usize) -> bool {
  let digit_at = |j: usize| chars.get(j).is_some_and(|(_, c)| c.is_ascii_digit());
  let dot_digit_at = |j: usize| chars.get(j).is_some_and(|(_, c)| *c == '.') && digit_at(j + 1);

  match chars[i].1 {
    '+' | '-' => digit_at(i + 1) || dot_digit_at(i + 1),
    '.' => digit_at(i + 1),
    c => c.is_ascii_digit(),
  }
}

fn lex_number(
  input: &str,
  chars: &[(usize, char)],
  start: usize,
) -> Result<(f64, usize), FilterError> {
  let mut i = start;
  if matches!(chars[i].1, '+' | '-') {
    i += 1;
  }

  let mut seen_dot = false;
  while let Some(&(_, ch)) = chars.get(i) {
    if ch.is_ascii_digit() {
      i += 1;
    } else if ch == '.' && !seen_dot {
      seen_dot = true;
      i += 1;
    } else {
      break;
    }
  }

  let begin = chars[start].0;
  let end = chars.get(i).map(|(o, _)| *o).unwrap_or(input.len());
  let text = &input[begin..end];

  // Reject things like `12abc` rather than splitting them into two tokens.
  if chars
    .get(i)
    .is_some_and(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
  {
    return Err(FilterError::InvalidNumber {
      text: text.to_string(),
      offset: begin,
    });
  }

  text
    .parse::<f64>()
    .map(|value| (value, i))
    .map_err(|_| FilterError::InvalidNumber {
      text: text.to_string(),
      offset: begin,
    })
}

/// Identifier, possibly a path joined by `.` or `/`.
fn lex_word(chars: &[(usize, char)], start: usize) -> (String, usize) {
  let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
  let mut word = String::new();
  let mut i = start;

  while let Some(&(_, ch)) = chars.get(i) {
    if is_word_char(ch) {
      word.push(ch);
      i += 1;
    } else if (ch == '.' || ch == '/')
      && chars
        .get(i + 1)
        .is_some_and(|(_, c)| c.is_alphabetic() || *c == '_')
    {
      word.push(ch);
      i += 1;
    } else {
      break;
    }
  }

  (word, i)
}
