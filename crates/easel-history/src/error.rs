/// Errors returned by history stores
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// HTTP transport or connection error
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Record store returned a non-success status
    #[error("history API error ({status}): {message}")]
    Api {
        /// HTTP status from the store
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// Store URL could not be built
    #[error("invalid history URL: {0}")]
    InvalidUrl(String),

    /// Insert succeeded but no row was returned
    #[error("history store returned no record for the insert")]
    EmptyInsert,

    /// History is not configured
    #[error("history is not configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, HistoryError>;
