use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No package.json found at {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid package.json: {path}\nReason: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("No services defined")]
    NoServicesDefined,

    #[error("Invalid custom services:\n{0}")]
    InvalidCustomServices(String),

    #[error("Unsupported services: {0}")]
    UnsupportedServices(String),

    #[error("No services found. Try running `service install`")]
    NoServicesInstalled,

    #[error("Service `{0}` is not installed. Try running `service install`")]
    ServiceNotInstalled(String),

    #[error("Invalid options file: {path}\nReason: {message}")]
    InvalidOptions { path: PathBuf, message: String },

    #[error("Invalid compose file: {path}\nReason: {message}")]
    InvalidComposeFile { path: PathBuf, message: String },

    #[error("Failed to render template for service `{service}`: {message}")]
    TemplateRender { service: String, message: String },

    #[error("Failed to create volume `{name}`: {message}")]
    VolumeCreation { name: String, message: String },

    #[error("IO error: {path}\nReason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// パス付きの IO エラーを作る
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
