use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The frozen data was written by a different format or version.
    #[error("format mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
