//! Crate root: wires together the compilation pipeline.
//!
//! - `source` loads files and orders them from the entry point along `#include`s.
//! - `tokenizer` turns the ordered files into one flat token stream.
//! - `parser` validates the grammar and hands each expression to `postfix`.
//! - `error` holds the located diagnostics shared by every stage.
//!
//! The first diagnostic stops the run.

pub mod directive;
pub mod error;
pub mod lang;
pub mod parser;
pub mod postfix;
pub mod source;
pub mod tokenizer;
pub mod ty;

use tracing::{debug, info};

pub use error::{CompileError, CompileResult, ErrorKind};
pub use lang::{CLC, Language};
pub use parser::{Expression, Program, Site};
pub use postfix::Instr;
pub use source::{LoadError, SourceFile, SourceSet};

/// Compile a set of source files with the default language tables.
pub fn compile(sources: &SourceSet) -> CompileResult<Program> {
  compile_with(sources, &CLC)
}

pub fn compile_with(sources: &SourceSet, lang: &Language) -> CompileResult<Program> {
  let files = sources.compose(lang)?;
  debug!(
    order = ?files.iter().map(|file| file.id.name.as_str()).collect::<Vec<_>>(),
    "composed sources"
  );

  let tokens = tokenizer::tokenize(&files, lang);
  debug!(tokens = tokens.len(), "tokenized");

  let program = parser::parse(tokens, lang)?;
  info!("all files parsed successfully");
  Ok(program)
}

/// Render every expression as a commented header followed by its markers.
pub fn listing(program: &Program) -> String {
  let mut out = String::new();

  for expr in &program.expressions {
    if let Some(token) = program.location(expr) {
      out.push_str(&format!(
        "# {}:{}: {}\n",
        token.file.name,
        token.line,
        program.source_text(expr)
      ));
    }
    for instr in &expr.postfix {
      out.push_str(&format!("{instr}\n"));
    }
    if let Some(value) = postfix::evaluate(&expr.postfix) {
      out.push_str(&format!("# = {value}\n"));
    }
  }

  out
}

/// One `file:line kind text` row per token.
pub fn token_listing(program: &Program) -> String {
  let mut out = String::new();
  for token in &program.tokens {
    out.push_str(&format!(
      "{}:{} {} {}\n",
      token.file.name, token.line, token.kind, token.text
    ));
  }
  out
}
