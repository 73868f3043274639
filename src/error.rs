//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are kept lightweight on purpose – the formatter locates the
//! offending source line and points at the failing column with a caret.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("line {line}: {text}\n{marker} {message}"))]
  WithLocation {
    line: usize,
    text: String,
    marker: String,
    message: String,
  },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[safe_loc..]
      .find('\n')
      .map(|i| safe_loc + i)
      .unwrap_or(source.len());
    let line = source[..safe_loc].matches('\n').count() + 1;
    let text = source[line_start..line_end].to_string();
    // the caret must clear the "line N: " prefix as well as the column
    let prefix_width = format!("line {line}: ").chars().count();
    let column = source[line_start..safe_loc].chars().count();
    let marker = format!("{}^", " ".repeat(prefix_width + column));
    Self::WithLocation {
      line,
      text,
      marker,
      message: message.into(),
    }
  }
}
