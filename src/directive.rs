//! `#` lines: compiler instructions kept whole by the tokenizer.

use snafu::{Snafu, ensure};

use crate::lang::Language;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
  /// `#include "<path>"`, path without the quotes.
  Include(String),
  /// `#test`, accepted and ignored.
  Test,
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum DirectiveError {
  #[snafu(display("Compiler command \"#{command}\" not found"))]
  Unknown { command: String },

  #[snafu(display("Compiler statement \"{statement}\" missing arguments"))]
  MissingArgument { statement: String },

  #[snafu(display("Compiler statement \"{statement}\" has too many arguments"))]
  TooManyArguments { statement: String },

  #[snafu(display("Cannot read expression: {argument}."))]
  MalformedArgument { argument: String },
}

impl Directive {
  /// Parse a whole directive line (leading `#` included, whitespace collapsed).
  pub fn parse(line: &str, lang: &Language) -> Result<Self, DirectiveError> {
    let statement = line.strip_prefix('#').unwrap_or(line);
    let mut words = statement.split(' ');
    let command = words.next().unwrap_or_default();

    ensure!(
      lang.is_directive(command),
      UnknownSnafu {
        command: command.to_string()
      }
    );

    if command != "include" {
      return Ok(Self::Test);
    }

    let arguments: Vec<&str> = words.collect();
    match arguments.as_slice() {
      [] => MissingArgumentSnafu { statement }.fail(),
      [argument] => {
        let path = argument
          .strip_prefix('"')
          .and_then(|rest| rest.strip_suffix('"'))
          .filter(|path| !path.is_empty());
        match path {
          Some(path) => Ok(Self::Include(path.to_string())),
          None => MalformedArgumentSnafu {
            argument: *argument,
          }
          .fail(),
        }
      }
      _ => TooManyArgumentsSnafu { statement }.fail(),
    }
  }
}
