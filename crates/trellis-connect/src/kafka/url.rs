//! `kafka://` engine URL grammar.

use chrono::NaiveDateTime;

use crate::error::{ConnectorError, Result};
use crate::params::{parse_url_params, split_scheme};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A decoded `kafka://<bootstrap>/topic=<t>;start=@(<dt>);end=@(<dt>);` URL.
///
/// Datetimes are read as UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaEngineUrl {
    pub bootstrap_server: String,
    pub topic: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl KafkaEngineUrl {
    pub fn parse(engine_url: &str) -> Result<Self> {
        let error = |reason: String| {
            ConnectorError::ParseError(format!("{} in '{}'", reason, engine_url))
        };

        let rest = match split_scheme(engine_url) {
            Some(("kafka://", rest)) => rest,
            _ => return Err(error("expected kafka:// scheme".to_string())),
        };
        let (bootstrap_server, params) = rest
            .split_once('/')
            .ok_or_else(|| error("expected <bootstrap>/<params>".to_string()))?;
        if bootstrap_server.is_empty() {
            return Err(error("missing bootstrap server".to_string()));
        }

        let mut params = parse_url_params(params)?;
        let mut required = |key: &str| {
            params
                .remove(key)
                .ok_or_else(|| error(format!("missing '{}'", key)))
        };
        let topic = required("topic")?;
        let start = parse_datetime(&required("start")?).map_err(error)?;
        let end = parse_datetime(&required("end")?).map_err(error)?;
        if let Some(unknown) = params.keys().next() {
            return Err(error(format!("unknown parameter '{}'", unknown)));
        }

        if topic.is_empty() {
            return Err(error("empty topic".to_string()));
        }
        if start > end {
            return Err(error(format!("start {} is after end {}", start, end)));
        }

        Ok(Self {
            bootstrap_server: bootstrap_server.to_string(),
            topic,
            start,
            end,
        })
    }

    /// Start of the window in milliseconds since the epoch.
    pub fn start_ms(&self) -> i64 {
        self.start.and_utc().timestamp_millis()
    }

    /// End of the window in milliseconds since the epoch.
    pub fn end_ms(&self) -> i64 {
        self.end.and_utc().timestamp_millis()
    }
}

/// Parse an `@(<datetime>)` literal.
fn parse_datetime(literal: &str) -> std::result::Result<NaiveDateTime, String> {
    let inner = literal
        .strip_prefix("@(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("expected @(<datetime>), found '{}'", literal))?;
    NaiveDateTime::parse_from_str(inner, DATETIME_FORMAT)
        .map_err(|e| format!("bad datetime '{}': {}", inner, e))
}
