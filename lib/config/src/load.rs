use std::{fs::File, io::Read, path::Path};

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Loads and parses a single YAML config file, interpolating `${VAR}`
/// environment variable references before parsing.
pub fn load_parse_config_file<T: DeserializeOwned>(
  file: &Path,
) -> Result<T> {
  let mut file_handle = File::open(file).map_err(|e| Error::FileOpen {
    e,
    path: file.to_path_buf(),
  })?;
  let mut contents = String::new();
  file_handle.read_to_string(&mut contents).map_err(|e| {
    Error::ReadFileContents {
      e,
      path: file.to_path_buf(),
    }
  })?;
  let contents = interpolate_env(&contents);
  serde_yaml_ng::from_str(&contents).map_err(|e| Error::ParseYaml {
    e,
    path: file.to_path_buf(),
  })
}

/// Only supports `${VAR}` syntax, expanded up to twice so a variable's
/// value may itself reference another `${VAR}`.
fn interpolate_env(input: &str) -> String {
  let re = regex::Regex::new(r"\$\{([A-Za-z0-9_]+)\}").unwrap();
  let first_pass = re
    .replace_all(input, |caps: &regex::Captures| {
      std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned();
  re.replace_all(&first_pass, |caps: &regex::Captures| {
    std::env::var(&caps[1]).unwrap_or_default()
  })
  .into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interpolates_env_vars() {
    // SAFETY: test-only, single-threaded access to this specific var.
    unsafe { std::env::set_var("QUADSYNC_TEST_VAR", "value") };
    let out = interpolate_env("port: ${QUADSYNC_TEST_VAR}");
    assert_eq!(out, "port: value");
  }

  #[test]
  fn missing_env_var_becomes_empty_string() {
    let out = interpolate_env("x: ${QUADSYNC_TEST_VAR_NOT_SET}");
    assert_eq!(out, "x: ");
  }
}
