//! Error types for the weibo-harvester application.

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Network and session errors
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run interrupted before completion")]
    Interrupted,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const NETWORK_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const STORAGE_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
}

impl Error {
    /// Exit code reported by the CLI for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::ConfigValidation { .. }
            | Error::MissingConfig(_)
            | Error::TomlParse(_) => exit_codes::CONFIG_ERROR,
            Error::Client(_) | Error::LoginRequired(_) | Error::Http(_) => {
                exit_codes::NETWORK_ERROR
            }
            Error::Storage(_) | Error::Io(_) | Error::Csv(_) => exit_codes::STORAGE_ERROR,
            Error::Interrupted => exit_codes::ABORT,
            Error::Json(_) => exit_codes::UNEXPECTED_ERROR,
        }
    }
}
