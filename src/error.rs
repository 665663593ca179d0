use std::error::Error as StdError;

use thiserror::Error;

/// elablog's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// elablog's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so the library can be embedded in other
/// front-ends without forcing `anyhow` into their public APIs. The binary wraps these
/// errors with `anyhow` context for user-facing messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// The notebook service answered with a non-success status.
    #[error("eLabFTW request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid short name {0:?}: use lowercase letters, digits and underscores, starting with a letter")]
    InvalidShortName(String),

    #[error("no key file found for user '{0}'")]
    UnknownUser(String),

    #[error("incorrect PIN or corrupted key file")]
    WrongPin,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("no {0} selected")]
    NoSelection(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Other(Box::new(err))
    }
}
