//! Shared diagnostics used across the compilation pipeline.
//!
//! Every diagnostic is located: it names the source file and the 1-based line
//! of the token that triggered it. The first diagnostic aborts the run, so
//! there is no collection type here.

use snafu::Snafu;

use crate::tokenizer::Token;

pub type CompileResult<T> = Result<T, CompileError>;

/// Stage that raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Bracket,
  Syntax,
  Directive,
  Source,
}

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("Brackets: File {file}: line {line}: {message}"))]
  Bracket {
    file: String,
    line: usize,
    message: String,
  },

  #[snafu(display("Syntax: File {file}: line {line}: {message}"))]
  Syntax {
    file: String,
    line: usize,
    message: String,
  },

  #[snafu(display("Directive: File {file}: line {line}: {message}"))]
  Directive {
    file: String,
    line: usize,
    message: String,
  },

  #[snafu(display("Source: File {file}: line {line}: {message}"))]
  Source {
    file: String,
    line: usize,
    message: String,
  },
}

impl CompileError {
  /// Unmatched, mismatched or cross-file bracket at `token`.
  pub fn bracket(token: &Token, message: impl Into<String>) -> Self {
    BracketSnafu {
      file: token.file.name.clone(),
      line: token.line,
      message: message.into(),
    }
    .build()
  }

  /// Token sequence that does not match the expected production.
  pub fn syntax(token: &Token, message: impl Into<String>) -> Self {
    SyntaxSnafu {
      file: token.file.name.clone(),
      line: token.line,
      message: message.into(),
    }
    .build()
  }

  pub fn directive(token: &Token, message: impl Into<String>) -> Self {
    DirectiveSnafu {
      file: token.file.name.clone(),
      line: token.line,
      message: message.into(),
    }
    .build()
  }

  /// Structural problem with the set of source files.
  pub fn source(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
    SourceSnafu {
      file: file.into(),
      line,
      message: message.into(),
    }
    .build()
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Bracket { .. } => ErrorKind::Bracket,
      Self::Syntax { .. } => ErrorKind::Syntax,
      Self::Directive { .. } => ErrorKind::Directive,
      Self::Source { .. } => ErrorKind::Source,
    }
  }

  pub fn line(&self) -> usize {
    match self {
      Self::Bracket { line, .. }
      | Self::Syntax { line, .. }
      | Self::Directive { line, .. }
      | Self::Source { line, .. } => *line,
    }
  }

  pub fn file(&self) -> &str {
    match self {
      Self::Bracket { file, .. }
      | Self::Syntax { file, .. }
      | Self::Directive { file, .. }
      | Self::Source { file, .. } => file,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::Bracket { message, .. }
      | Self::Syntax { message, .. }
      | Self::Directive { message, .. }
      | Self::Source { message, .. } => message,
    }
  }
}
