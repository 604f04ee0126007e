//! Terminal-oriented error formatting.
//!
//! The teacher's `lib/formatting` renders HTML `<span>`s for a web
//! dashboard; `quadsync` is a CLI, so this is repurposed to render an
//! `anyhow::Error` chain to the terminal with `colored`, keeping the same
//! "ERROR: cause\n\nTRACE:\n\t1: ...\n\t2: ..." shape.

use colored::Colorize;

pub fn format_error_chain(err: &anyhow::Error) -> String {
  let mut chain = err.chain();
  let head = match chain.next() {
    Some(head) => head.to_string(),
    None => return String::new(),
  };

  let rest: Vec<_> = chain.map(|e| e.to_string()).collect();
  if rest.is_empty() {
    format!("{}: {head}", "ERROR".red().bold())
  } else {
    let mut out =
      format!("{}: {head}\n\n{}:", "ERROR".red().bold(), "CAUSED BY".dimmed());
    for (i, msg) in rest.iter().enumerate() {
      out.push_str(&format!("\n  {}: {msg}", (i + 1).to_string().dimmed()));
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_error_has_no_trace_section() {
    let err = anyhow::anyhow!("boom");
    let out = format_error_chain(&err);
    assert!(out.contains("boom"));
    assert!(!out.contains("CAUSED BY"));
  }

  #[test]
  fn context_chain_is_rendered_in_order() {
    let err = anyhow::Error::new(std::io::Error::other("root"))
      .context("middle")
      .context("top");
    let out = format_error_chain(&err);
    assert!(out.contains("top"));
    assert!(out.contains("middle"));
    assert!(out.contains("root"));
  }
}
