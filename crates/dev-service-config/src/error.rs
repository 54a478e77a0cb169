use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No package.json found (searched upwards from {0})")]
    ManifestNotFound(PathBuf),

    #[error("Project root {0} does not contain a package.json")]
    InvalidProjectRoot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
