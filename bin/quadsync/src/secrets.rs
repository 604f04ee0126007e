//! Secret Availability Probe (`spec.md` §4.5 step 2b, §6 "Secret probe").
//!
//! Invokes the container engine's secret-listing CLI once per reconcile
//! pass and filters services whose declared secrets are missing.
//! Grounded on the teacher's `command::run_logged_command` invocation
//! style (`lib/command/src/lib.rs`).

use std::collections::HashSet;

use command::run_logged_command;

use crate::model::Service;

/// The set of secret names the container engine currently knows about.
/// Unavailability of the listing CLI is non-fatal (§6): callers treat an
/// empty set as "no known secrets", surfaced as a warning by the caller.
pub async fn list_available_secrets(engine: &str) -> HashSet<String> {
  let log = run_logged_command(
    "SecretList",
    None,
    format!("{engine} secret ls --format '{{{{.Name}}}}'"),
  )
  .await;
  if !log.success {
    return HashSet::new();
  }
  log
    .stdout
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .map(str::to_string)
    .collect()
}

/// The secret names `service` declares via `x-quad-ops-env-secrets`.
pub fn declared_secrets(service: &Service) -> impl Iterator<Item = &str> {
  service.env_secrets.keys().map(String::as_str)
}

/// Names of secrets `service` declares but that are not in `available`.
pub fn missing_secrets(service: &Service, available: &HashSet<String>) -> Vec<String> {
  declared_secrets(service)
    .filter(|name| !available.contains(*name))
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use indexmap::IndexMap;

  fn service_with_secrets(names: &[&str]) -> Service {
    let mut env_secrets = IndexMap::new();
    for n in names {
      env_secrets.insert(n.to_string(), n.to_uppercase());
    }
    Service {
      env_secrets,
      ..Default::default()
    }
  }

  #[test]
  fn service_with_all_secrets_available_has_none_missing() {
    let svc = service_with_secrets(&["db_password"]);
    let available: HashSet<String> = ["db_password".to_string()].into_iter().collect();
    assert!(missing_secrets(&svc, &available).is_empty());
  }

  #[test]
  fn service_with_unavailable_secret_is_flagged() {
    let svc = service_with_secrets(&["db_password", "api_key"]);
    let available: HashSet<String> = ["db_password".to_string()].into_iter().collect();
    assert_eq!(missing_secrets(&svc, &available), vec!["api_key".to_string()]);
  }

  #[test]
  fn empty_available_set_flags_everything() {
    let svc = service_with_secrets(&["db_password"]);
    let available = HashSet::new();
    assert_eq!(missing_secrets(&svc, &available), vec!["db_password".to_string()]);
  }
}
