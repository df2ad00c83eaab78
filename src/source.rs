//! Source files and the order they are compiled in.
//!
//! Files are keyed by path in a `BTreeMap`. The compilation order starts at
//! the single file that defines `int main()` and follows `#include`
//! directives depth-first: an included file precedes the file including it,
//! and every file appears once.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

use crate::directive::Directive;
use crate::error::{CompileError, CompileResult};
use crate::lang::Language;
use crate::tokenizer::{Line, clean_lines};

/// Identity of a source file, shared by every token lexed from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
  /// File name used in diagnostics.
  pub name: String,
  pub path: PathBuf,
}

impl SourceId {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.to_string_lossy().into_owned());
    Self { name, path }
  }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
  pub id: Arc<SourceId>,
  /// Raw lines, exactly as read.
  pub lines: Vec<String>,
}

impl SourceFile {
  pub fn new(path: impl Into<PathBuf>, lines: Vec<String>) -> Self {
    Self {
      id: Arc::new(SourceId::new(path)),
      lines,
    }
  }

  /// Build a file from one string, splitting it into lines.
  pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
    Self::new(path, text.lines().map(str::to_string).collect())
  }
}

#[derive(Debug, Snafu)]
pub enum LoadError {
  #[snafu(display("could not read {}: {source}", path.display()))]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// All files handed to one compilation.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
  files: BTreeMap<PathBuf, SourceFile>,
}

impl SourceSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Read every path from disk.
  pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, LoadError> {
    let mut set = Self::new();
    for path in paths {
      let path = path.as_ref();
      let text = fs::read_to_string(path).context(ReadSnafu { path })?;
      set.insert(SourceFile::from_text(path, &text));
    }
    Ok(set)
  }

  pub fn insert(&mut self, file: SourceFile) {
    self.files.insert(file.id.path.clone(), file);
  }

  pub fn with_file(mut self, path: impl Into<PathBuf>, text: &str) -> Self {
    self.insert(SourceFile::from_text(path, text));
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// The one file whose cleaned text contains the entry marker.
  pub fn entry_file(&self, lang: &Language) -> CompileResult<&SourceFile> {
    let mut entry: Option<&SourceFile> = None;

    for file in self.files.values() {
      for line in clean_lines(&file.lines) {
        if !line.text.contains(lang.entry_marker) {
          continue;
        }
        match entry {
          None => entry = Some(file),
          Some(first) => {
            return Err(CompileError::source(
              file.id.name.clone(),
              line.number,
              format!(
                "Found multiple entry points: \"{}\" and \"{}\".",
                first.id.name, file.id.name
              ),
            ));
          }
        }
      }
    }

    entry.ok_or_else(|| CompileError::source("N.A.", 0, "No entry point was found."))
  }

  /// Files in compilation order, rooted at the entry file.
  pub fn compose(&self, lang: &Language) -> CompileResult<Vec<&SourceFile>> {
    let entry = self.entry_file(lang)?;
    debug!(entry = %entry.id.name, "found entry point");

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    self.visit(entry, lang, &mut visited, &mut order)?;

    for file in self.files.values() {
      if !visited.contains(&file.id.path) {
        warn!(file = %file.id.name, "not reachable from the entry point, skipped");
      }
    }

    Ok(order)
  }

  fn visit<'a>(
    &'a self,
    file: &'a SourceFile,
    lang: &Language,
    visited: &mut HashSet<PathBuf>,
    order: &mut Vec<&'a SourceFile>,
  ) -> CompileResult<()> {
    if !visited.insert(file.id.path.clone()) {
      return Ok(());
    }

    for line in clean_lines(&file.lines) {
      // Malformed directives are left for the validator to report.
      if let Some(target) = include_target(&line, lang) {
        let included = self.resolve_include(file, &line, &target)?;
        debug!(from = %file.id.name, to = %included.id.name, "include");
        self.visit(included, lang, visited, order)?;
      }
    }

    order.push(file);
    Ok(())
  }

  fn resolve_include(
    &self,
    from: &SourceFile,
    line: &Line,
    target: &str,
  ) -> CompileResult<&SourceFile> {
    let target_path = Path::new(target);
    let mut matches = self
      .files
      .values()
      .filter(|file| file.id.path.ends_with(target_path) || file.id.name == target);

    match (matches.next(), matches.next()) {
      (Some(file), None) => Ok(file),
      (None, _) => Err(CompileError::source(
        from.id.name.clone(),
        line.number,
        format!("Included file \"{target}\" was not found."),
      )),
      (Some(first), Some(second)) => Err(CompileError::source(
        from.id.name.clone(),
        line.number,
        format!(
          "Ambiguous include \"{target}\": matches \"{}\" and \"{}\".",
          first.id.path.display(),
          second.id.path.display()
        ),
      )),
    }
  }
}

fn include_target(line: &Line, lang: &Language) -> Option<String> {
  if !line.text.starts_with('#') {
    return None;
  }
  match Directive::parse(&line.text, lang) {
    Ok(Directive::Include(path)) => Some(path),
    _ => None,
  }
}
