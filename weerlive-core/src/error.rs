use thiserror::Error;

pub type Result<T, E = WeerliveError> = std::result::Result<T, E>;

/// Every failure the client can surface.
#[derive(Debug, Error)]
pub enum WeerliveError {
    /// Missing API key, or the API rejected the one we sent.
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    RateLimit(String),

    /// Timeout, DNS failure, refused connection or a non-success status.
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The API answered with something we do not understand.
    #[error("{message} (content type: {content_type:?})")]
    Protocol {
        message: String,
        content_type: String,
        body: String,
    },

    #[error("failed to decode weather report: {0}")]
    Format(#[from] FormatError),

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl WeerliveError {
    pub(crate) fn connection(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connection { message: message.into(), source: Some(source) }
    }

    pub(crate) fn protocol(
        message: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Decoding failures for a single report object.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("missing field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' is not a valid {expected}: {value}")]
    InvalidValue { field: String, expected: &'static str, value: String },

    #[error("report does not match the weather model: {0}")]
    Shape(#[from] serde_json::Error),
}
