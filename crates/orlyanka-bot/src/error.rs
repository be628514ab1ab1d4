//! Error types for the game application.

use thiserror::Error;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not hand out a connection.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A statement failed.
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Errors from the coin ledger service.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The HTTP request itself failed.
    #[error("ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The ledger answered with an error envelope.
    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

/// Configuration loading/validation errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mandatory value is missing or a value failed to parse.
    #[error("configuration error: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// Values parsed but do not make sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for handler and loop bodies.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Api(#[from] orlyanka_vk::ApiError),
}

/// Result type for handler and loop bodies.
pub type BotResult<T> = Result<T, BotError>;
