use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;

use ybc::{codegen, parser, tokenizer};

const DEFAULT_INPUT: &str = "test.yb";

#[derive(Parser, Debug)]
#[command(
  name = "ybc",
  version,
  about = "Compile YB source into a NASM x86-64 assembly file"
)]
struct Cli {
  /// Path to the YB source file.
  input: Option<PathBuf>,
  /// Where the generated assembly is written.
  #[arg(short, long, default_value = "out.asm")]
  output: PathBuf,
  /// Print the token stream to stderr after lexing.
  #[arg(long)]
  dump_tokens: bool,
}

fn main() {
  if let Err(err) = run() {
    eprintln!("{err:#}");
    process::exit(1);
  }
}

fn run() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let input = cli.input.unwrap_or_else(|| {
    eprintln!("no input file given, falling back to {DEFAULT_INPUT}");
    PathBuf::from(DEFAULT_INPUT)
  });

  let source =
    fs::read_to_string(&input).with_context(|| format!("cannot read {}", input.display()))?;

  let lexed = tokenizer::tokenize(&source);
  for warning in &lexed.warnings {
    eprintln!("warning: {warning}");
  }
  if cli.dump_tokens {
    for token in &lexed.tokens {
      eprintln!("{:?} \"{}\"", token.kind, tokenizer::token_text(token, &source));
    }
  }

  let program = parser::parse(lexed.tokens, &source)?;
  let asm = codegen::generate(&program, &lexed.warnings);

  fs::write(&cli.output, &asm)
    .with_context(|| format!("cannot write {}", cli.output.display()))?;
  println!("wrote {}", cli.output.display());
  Ok(())
}
