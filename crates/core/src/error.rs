use thiserror::Error;

pub type HbResult<T> = Result<T, HbError>;

#[derive(Error, Debug)]
pub enum HbError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid slot configuration: {0}")]
    InvalidSlot(String),
}
