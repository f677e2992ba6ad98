//! Error types for gator.

use thiserror::Error;

/// Errors produced while retrieving or decoding a feed document.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode feed from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("fetch of {url} was cancelled")]
    Cancelled { url: String },
}

/// Common error type for gator.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid polling interval or configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The feed table is empty at selection time.
    #[error("no feeds available to fetch")]
    NoFeedsAvailable,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A feed item carried a publication date that is not an HTTP-date.
    #[error("invalid publication date {value:?} on item {link}: {source}")]
    DateParse {
        link: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("no user is logged in; run `gator login <name>` first")]
    NotLoggedIn,
}

pub type Result<T> = std::result::Result<T, Error>;
