#[derive(Debug, thiserror::Error)]
pub enum AffectError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unsupported rule table version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AffectError>;
