//! Client error type.

/// Errors surfaced by the REST client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level HTTP failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The server answered with an error envelope.
    #[error("{message}")]
    Api { code: i64, message: String },

    /// A response body or event payload did not decode.
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// WebSocket failure on the event stream.
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The service URL could not be parsed.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// `wait` was cancelled; server-side cancellation was requested.
    #[error("Operation cancelled")]
    OperationCancelled,

    /// `wait` hit its deadline; server-side cancellation was requested.
    #[error("Operation timeout")]
    OperationTimeout,

    /// The remote operation finished with an error.
    #[error("{0}")]
    Operation(String),

    /// The handler token does not belong to this listener.
    #[error("Couldn't find this handler")]
    HandlerNotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
