//! Lexical analysis: turns per-file raw lines into one flat token stream.
//!
//! Lines are cleaned first (comments dropped, whitespace collapsed) and then
//! split at signs and keywords. Every token keeps the file it came from and
//! the physical line number it was written on. Multi-character signs are
//! matched before single-character ones to avoid ambiguity.

use std::fmt;
use std::sync::Arc;

use crate::lang::{self, Language};
use crate::source::{SourceFile, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  Int,
  Void,
  Return,
  While,
  If,
  Else,
}

impl Keyword {
  fn from_text(text: &str) -> Option<Self> {
    Some(match text {
      "int" => Self::Int,
      "void" => Self::Void,
      "return" => Self::Return,
      "while" => Self::While,
      "if" => Self::If,
      "else" => Self::Else,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  LParen,
  RParen,
  Comma,
  Semi,
  Plus,
  Minus,
  Star,
  Slash,
  Lt,
  Gt,
  Le,
  Ge,
  EqEq,
  Ne,
  Assign,
}

impl Punct {
  fn from_text(text: &str) -> Option<Self> {
    Some(match text {
      "{" => Self::LBrace,
      "}" => Self::RBrace,
      "[" => Self::LBracket,
      "]" => Self::RBracket,
      "(" => Self::LParen,
      ")" => Self::RParen,
      "," => Self::Comma,
      ";" => Self::Semi,
      "+" => Self::Plus,
      "-" => Self::Minus,
      "*" => Self::Star,
      "/" => Self::Slash,
      "<" => Self::Lt,
      ">" => Self::Gt,
      "<=" => Self::Le,
      ">=" => Self::Ge,
      "==" => Self::EqEq,
      "!=" => Self::Ne,
      "=" => Self::Assign,
      _ => return None,
    })
  }

  pub fn is_open(self) -> bool {
    matches!(self, Self::LBrace | Self::LBracket | Self::LParen)
  }

  pub fn is_close(self) -> bool {
    matches!(self, Self::RBrace | Self::RBracket | Self::RParen)
  }

  /// Closing counterpart of an opening bracket.
  pub fn closer(self) -> Option<Self> {
    match self {
      Self::LBrace => Some(Self::RBrace),
      Self::LBracket => Some(Self::RBracket),
      Self::LParen => Some(Self::RParen),
      _ => None,
    }
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Keyword(Keyword),
  Punct(Punct),
  Ident,
  Num(i64),
  /// A whole `#` line. A `#` anywhere else is `Invalid`.
  Directive,
  /// Text the validator will reject: bad names, overflowing numbers.
  Invalid,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Keyword(_) => "keyword",
      Self::Punct(_) => "sign",
      Self::Ident => "ident",
      Self::Num(_) => "number",
      Self::Directive => "directive",
      Self::Invalid => "invalid",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub file: Arc<SourceId>,
  /// 1-based physical line in `file`.
  pub line: usize,
}

impl Token {
  pub fn new(text: impl Into<String>, file: Arc<SourceId>, line: usize, lang: &Language) -> Self {
    let text = text.into();
    Self {
      kind: classify(&text, lang),
      text,
      file,
      line,
    }
  }

  /// A whole cleaned `#` line.
  pub fn directive(text: impl Into<String>, file: Arc<SourceId>, line: usize) -> Self {
    Self {
      kind: TokenKind::Directive,
      text: text.into(),
      file,
      line,
    }
  }

  pub fn is(&self, punct: Punct) -> bool {
    self.kind == TokenKind::Punct(punct)
  }

  pub fn is_keyword(&self, keyword: Keyword) -> bool {
    self.kind == TokenKind::Keyword(keyword)
  }

  pub fn punct(&self) -> Option<Punct> {
    match self.kind {
      TokenKind::Punct(punct) => Some(punct),
      _ => None,
    }
  }

  pub fn is_ident(&self) -> bool {
    self.kind == TokenKind::Ident
  }

  pub fn same_file(&self, other: &Token) -> bool {
    self.file == other.file
  }
}

fn classify(text: &str, lang: &Language) -> TokenKind {
  if let Some(punct) = Punct::from_text(text) {
    return TokenKind::Punct(punct);
  }
  if lang.keywords.contains(&text)
    && let Some(keyword) = Keyword::from_text(text)
  {
    return TokenKind::Keyword(keyword);
  }
  if lang::is_number(text) {
    return text.parse::<i64>().map_or(TokenKind::Invalid, TokenKind::Num);
  }
  if lang::is_identifier(text) {
    return TokenKind::Ident;
  }
  TokenKind::Invalid
}

/// A source line after cleaning, still carrying its physical number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
  pub text: String,
  pub number: usize,
}

/// Drop a `//` comment, turn tabs into spaces and collapse whitespace runs.
pub fn clean_line(raw: &str) -> String {
  let code = match raw.find("//") {
    Some(idx) => &raw[..idx],
    None => raw,
  };
  code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean every line of a file, dropping the ones left empty.
pub fn clean_lines(lines: &[String]) -> Vec<Line> {
  lines
    .iter()
    .enumerate()
    .filter_map(|(idx, raw)| {
      let text = clean_line(raw);
      (!text.is_empty()).then_some(Line {
        text,
        number: idx + 1,
      })
    })
    .collect()
}

/// Split one cleaned line into token texts. `#` lines stay whole.
pub fn split_line<'a>(line: &'a str, lang: &Language) -> Vec<&'a str> {
  if line.starts_with('#') {
    return vec![line];
  }

  let mut parts = Vec::new();
  let mut rest = line.trim_start();

  while !rest.is_empty() {
    let len = match lang.sign_at(rest).or_else(|| lang.keyword_at(rest)) {
      Some(matched) => matched.len(),
      None => rest
        .char_indices()
        .find(|&(idx, c)| c.is_whitespace() || lang.sign_at(&rest[idx..]).is_some())
        .map_or(rest.len(), |(idx, _)| idx),
    };
    parts.push(&rest[..len]);
    rest = rest[len..].trim_start();
  }

  parts
}

/// Lex the files, in the given order, into a single token sequence.
pub fn tokenize(files: &[&SourceFile], lang: &Language) -> Vec<Token> {
  let mut tokens = Vec::new();

  for file in files {
    for line in clean_lines(&file.lines) {
      if line.text.starts_with('#') {
        tokens.push(Token::directive(line.text, Arc::clone(&file.id), line.number));
        continue;
      }
      tokens.extend(
        split_line(&line.text, lang)
          .into_iter()
          .map(|text| Token::new(text, Arc::clone(&file.id), line.number, lang)),
      );
    }
  }

  tokens
}
