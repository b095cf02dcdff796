use thiserror::Error;

/// Failure taxonomy for a restore run. Fatal variants bubble up to the
/// caller unchanged; a degraded auth scope is not an error and never
/// appears here.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Scope resolution failed: {0}")]
    ScopeResolution(String),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Command execution failed: {stderr}")]
    Command { stdout: String, stderr: String },
}
