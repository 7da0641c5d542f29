//! Error types and exit codes for the command-line front end.

use wbiis::VisionError;

/// Process exit codes.
pub mod exit_codes {
    pub const FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_LOADED: i32 = 3;
    pub const CANCELLED: i32 = 4;
    pub const DATA_ERROR: i32 = 65;
    pub const IO_ERROR: i32 = 74;
}

/// All errors that can occur in the front end.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No database loaded. Load one first.")]
    NotLoaded,

    #[error("No query results to save")]
    NoResults,

    #[error("Search error: {0}")]
    Vision(#[from] VisionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;
        match self {
            CliError::InvalidParams(_) | CliError::Config(_) => USAGE,
            CliError::NotLoaded | CliError::NoResults => NOT_LOADED,
            CliError::Vision(VisionError::Cancelled) => CANCELLED,
            CliError::Vision(VisionError::InvalidParameter(_)) => USAGE,
            CliError::Vision(VisionError::Io(_)) | CliError::Io(_) => IO_ERROR,
            CliError::Vision(VisionError::Image(_))
            | CliError::Vision(VisionError::Dimension(_))
            | CliError::Vision(VisionError::EmptyInput(_)) => DATA_ERROR,
            CliError::Vision(_) | CliError::Json(_) => FAILURE,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::NotLoaded.exit_code(), exit_codes::NOT_LOADED);
        assert_eq!(
            CliError::from(VisionError::Cancelled).exit_code(),
            exit_codes::CANCELLED
        );
        assert_eq!(
            CliError::from(VisionError::Dimension("x".into())).exit_code(),
            exit_codes::DATA_ERROR
        );
        assert_eq!(CliError::Config("x".into()).exit_code(), exit_codes::USAGE);
    }
}
