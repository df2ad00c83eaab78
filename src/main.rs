use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing::{Level, info};

use clc::{SourceSet, compile, listing, token_listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
  Tokens,
  Postfix,
}

/// Validate clc sources and print the postfix form of every expression.
#[derive(Debug, Parser)]
#[command(name = "clc", version)]
struct Cli {
  /// Source files; exactly one must define `int main()`.
  #[arg(required = true)]
  files: Vec<PathBuf>,

  /// Write the listing here instead of stdout.
  #[arg(short, long)]
  output: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Emit::Postfix)]
  emit: Emit,

  #[arg(short, long)]
  verbose: bool,
}

fn main() {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
    .with_writer(std::io::stderr)
    .init();

  let sources = match SourceSet::load(&cli.files) {
    Ok(sources) => sources,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  info!(files = sources.len(), "loaded sources");

  let started = Instant::now();
  let program = match compile(&sources) {
    Ok(program) => program,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };
  info!(
    "Took {:.3} seconds to compile",
    started.elapsed().as_secs_f64()
  );

  let text = match cli.emit {
    Emit::Tokens => token_listing(&program),
    Emit::Postfix => listing(&program),
  };

  match cli.output {
    Some(path) => {
      if let Err(err) = fs::write(&path, text) {
        eprintln!("could not write {}: {err}", path.display());
        process::exit(1);
      }
    }
    None => print!("{text}"),
  }
}
