//! # quadsync config
//!
//! Parses the `quadsync` YAML config file, interpolating environment
//! variables (`${VAR}` syntax). Trimmed from the teacher's `lib/config`:
//! the teacher supports merging an arbitrary set of wildcard-matched files
//! across directories (for a multi-tenant server with includes); `spec.md`
//! §6 names a single config file, so that machinery is dropped here.

use std::path::Path;

use serde::de::DeserializeOwned;

mod error;
mod load;

pub use error::Error;

pub type Result<T> = ::core::result::Result<T, Error>;

/// Loads `path` as YAML into `T`, applying `${VAR}` environment
/// interpolation first. Returns `Ok(None)` if `path` does not exist so
/// callers can fall back to defaults, matching the teacher's "no config
/// paths found, using default config" behavior.
pub fn load_config<T: DeserializeOwned>(
  path: &Path,
) -> Result<Option<T>> {
  if !path.is_file() {
    return Ok(None);
  }
  load::load_parse_config_file(path).map(Some)
}
