//! Error types for the conversation core.

/// Failure contacting or parsing the completion endpoint.
///
/// Messages never include the API credential.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("API key not configured")]
    MissingKey,
    #[error("API error: {0}")]
    Status(u16),
    #[error("unexpected response body: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest errors can carry the request URL, never headers
        RemoteError::Network(err.without_url().to_string())
    }
}

/// Failure reading, writing or deleting a persisted value.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
