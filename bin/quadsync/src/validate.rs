//! L1 sort/validate helpers (`spec.md` §2, §4.4, §8 property 10):
//! unit-name character validation and path-containment checks used by
//! the translator and the service-manager client.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("unit name {0:?} contains characters outside [A-Za-z0-9._@:-] or exceeds 256 characters")]
  UnsafeUnitName(String),
}

fn unit_name_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._@:-]+$").unwrap())
}

/// Validates a unit name before it is ever passed to an out-of-process
/// invocation (the control bus, or the journal CLI for diagnostics).
pub fn validate_unit_name(name: &str) -> Result<(), ValidationError> {
  if name.is_empty() || name.len() > 256 || !unit_name_re().is_match(name) {
    return Err(ValidationError::UnsafeUnitName(name.to_string()));
  }
  Ok(())
}

/// True iff `candidate` resolves (lexically, without touching the
/// filesystem) to a path under `root`. Used to decide whether a bind
/// mount's source participates in content hashing (§4.3).
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
  let root = normalize(root);
  let candidate = normalize(candidate);
  candidate.starts_with(&root)
}

fn normalize(path: &Path) -> std::path::PathBuf {
  let mut out = std::path::PathBuf::new();
  for component in path.components() {
    match component {
      std::path::Component::ParentDir => {
        out.pop();
      }
      std::path::Component::CurDir => {}
      other => out.push(other.as_os_str()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_shell_metacharacters() {
    for bad in [
      "proj-web;rm", "a|b", "a&b", "a$b", "a`b", "a b",
    ] {
      assert!(validate_unit_name(bad).is_err(), "{bad:?} should be rejected");
    }
  }

  #[test]
  fn rejects_overlong_names() {
    let long = "a".repeat(257);
    assert!(validate_unit_name(&long).is_err());
  }

  #[test]
  fn accepts_ordinary_unit_names() {
    assert!(validate_unit_name("myproj-web.service").is_ok());
    assert!(validate_unit_name("myproj-web.container").is_ok());
  }

  #[test]
  fn containment_check_rejects_traversal_outside_root() {
    let root = Path::new("/srv/project");
    assert!(is_contained(root, Path::new("/srv/project/Caddyfile")));
    assert!(!is_contained(root, Path::new("/srv/project/../secrets")));
    assert!(!is_contained(root, Path::new("/etc/passwd")));
  }
}
