use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("failed to open config file at {path:?} | {e}")]
  FileOpen { e: std::io::Error, path: PathBuf },

  #[error("failed to read contents of config file at {path:?} | {e}")]
  ReadFileContents { e: std::io::Error, path: PathBuf },

  #[error("failed to parse yaml config at {path:?} | {e}")]
  ParseYaml {
    e: serde_yaml_ng::Error,
    path: PathBuf,
  },
}
