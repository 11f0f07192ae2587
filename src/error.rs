use crate::providers::catalog::CatalogError;
use thiserror::Error;

/// Bootstrap and serving errors; per-request failures are
/// [`AdapterError`](crate::adapter::AdapterError)s
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Model catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Default model `{model}` for {purpose} is not in the catalog")]
    UnknownDefaultModel { model: String, purpose: &'static str },

    #[error("Logging initialisation failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
