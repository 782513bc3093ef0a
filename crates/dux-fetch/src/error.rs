use thiserror::Error;

/// Failure of one upstream read.
///
/// Cloneable so a single failure can be handed to every consumer attached
/// to the same request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("HTTP error {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }
}
