use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromError>;

#[derive(Debug, Error)]
pub enum PromError {
    /// The request never produced a response (build failure, connect error, timeout).
    #[error("query error: '{message}' fetching query '{query}'")]
    Request { query: String, message: String },

    /// Communication error: the backend answered with a non-success status.
    #[error("{0}")]
    Status(String),

    /// The backend reported that some federated stores were skipped.
    #[error("Error: {warning}, Body: {body}, Query: {query}")]
    StorePartialFailure {
        warning: String,
        body: String,
        query: String,
    },

    #[error("Unmarshal Error: {source}\nQuery: {query}")]
    Decode {
        query: String,
        #[source]
        source: serde_json::Error,
    },

    /// Well formed body whose result structure signals a failure.
    #[error("result error for query '{query}': {message}")]
    Result { query: String, message: String },

    /// A label looked up on a decoded result is absent.
    #[error("'{0}' field does not exist in data result vector")]
    MissingField(String),

    #[error("query task for '{query}' failed: {message}")]
    TaskFailed { query: String, message: String },

    #[error("unable to parse the address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PromError {
    /// Communication errors are the ones raised by the backend itself rather than by
    /// the local transport or decoding.
    pub fn is_comm_error(&self) -> bool {
        matches!(
            self,
            PromError::Status(_) | PromError::StorePartialFailure { .. }
        )
    }

    /// The query text attached to the error, when the variant carries one.
    pub fn query(&self) -> Option<&str> {
        match self {
            PromError::Request { query, .. }
            | PromError::StorePartialFailure { query, .. }
            | PromError::Decode { query, .. }
            | PromError::Result { query, .. }
            | PromError::TaskFailed { query, .. } => Some(query),
            _ => None,
        }
    }
}
