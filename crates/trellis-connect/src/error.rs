//! Typed errors for the connectors crate.

use thiserror::Error;

/// Errors raised while resolving bindings or reading datasets.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Neither an engine URL nor a resolvable reference was available.
    #[error("unresolvable dataset: {0}")]
    Unresolvable(String),
    /// The engine URL's scheme matches no registered connector.
    #[error("unknown engine in url: {0}")]
    UnknownEngine(String),
    /// The connector does not offer this capability.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// A line or message payload could not be decoded into a record.
    #[error("malformed record at {location}: {reason}")]
    MalformedRecord { location: String, reason: String },
    /// An engine URL did not follow its expected grammar.
    #[error("parse error: {0}")]
    ParseError(String),
    /// A record was asked for a field it does not have.
    #[error("missing field: {0}")]
    MissingField(String),
    /// A relayed parameter was not claimed, or carries a value the connector rejects.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A job was asked for a dataset it does not declare.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),
    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Failed to talk to the backing store or broker.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Schema inference failed.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

impl From<object_store::Error> for ConnectorError {
    fn from(e: object_store::Error) -> Self {
        ConnectorError::Connection(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for ConnectorError {
    fn from(e: arrow::error::ArrowError) -> Self {
        ConnectorError::Schema(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ConnectorError {
    fn from(e: tokio::task::JoinError) -> Self {
        ConnectorError::Connection(format!("background reader failed: {}", e))
    }
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for ConnectorError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        ConnectorError::Connection(e.to_string())
    }
}
