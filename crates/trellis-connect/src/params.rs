//! Binding parameters relayed to connectors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// Whether a job reads from or writes to a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
        }
    }
}

/// Everything a binding knows about its dataset.
///
/// `reference` is only used to discover an engine URL through a catalogue;
/// it is never passed on. Everything else is relayed to the connector, which
/// must claim every entry of `options` or fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub reference: Option<String>,
    pub engine_url: Option<String>,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ConnectParams {
    pub fn engine_url(url: impl Into<String>) -> Self {
        Self {
            engine_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            reference: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Relayed options, ready to be claimed one by one.
    pub fn relayed_options(&self) -> Options {
        Options(self.options.clone())
    }
}

/// Relayed options a connector claims with [`Options::take`]; whatever is
/// left at [`Options::finish`] is an error, so typos never pass silently.
#[derive(Debug, Clone, Default)]
pub struct Options(BTreeMap<String, String>);

impl Options {
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let unclaimed: Vec<&str> = self.0.keys().map(String::as_str).collect();
        Err(ConnectorError::InvalidParameter(format!(
            "unexpected options: {}",
            unclaimed.join(", ")
        )))
    }
}

/// Reject write access for a read-only connector.
pub(crate) fn require_read(access: AccessMode, engine: &str) -> Result<()> {
    match access {
        AccessMode::Read => Ok(()),
        AccessMode::Write => Err(ConnectorError::InvalidParameter(format!(
            "{} datasets are read-only",
            engine
        ))),
    }
}

/// Split an engine URL into its scheme tag (including `://`) and the rest.
pub fn split_scheme(engine_url: &str) -> Option<(&str, &str)> {
    let idx = engine_url.find("://")?;
    Some(engine_url.split_at(idx + 3))
}

/// Parse `key=value;key=value;` segments, as used by the `kafka://` and
/// `bigquery://` engine URLs. Empty segments are ignored; duplicate keys and
/// segments without `=` are rejected.
pub fn parse_url_params(segment: &str) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for part in segment.split(';').filter(|p| !p.trim().is_empty()) {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            ConnectorError::ParseError(format!("expected key=value, found '{}'", part))
        })?;
        let key = key.trim();
        if params.insert(key.to_string(), value.to_string()).is_some() {
            return Err(ConnectorError::ParseError(format!(
                "duplicate parameter '{}'",
                key
            )));
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scheme() {
        assert_eq!(
            split_scheme("fake://bugsDB"),
            Some(("fake://", "bugsDB"))
        );
        assert_eq!(
            split_scheme("gs+flowerpot://bucket/a://b"),
            Some(("gs+flowerpot://", "bucket/a://b"))
        );
        assert_eq!(split_scheme("no-scheme-here"), None);
    }

    #[test]
    fn test_parse_url_params() {
        let params =
            parse_url_params("projectId=my_project;datasetId=nice_food;tableId=cakes;").unwrap();
        assert_eq!(params["projectId"], "my_project");
        assert_eq!(params["datasetId"], "nice_food");
        assert_eq!(params["tableId"], "cakes");
    }

    #[test]
    fn test_parse_url_params_keeps_equals_in_values() {
        let params = parse_url_params("start=@(2019-05-15 08:00:00);q=a=b").unwrap();
        assert_eq!(params["start"], "@(2019-05-15 08:00:00)");
        assert_eq!(params["q"], "a=b");
    }

    #[test]
    fn test_parse_url_params_rejects_bad_segments() {
        assert!(matches!(
            parse_url_params("topic"),
            Err(ConnectorError::ParseError(_))
        ));
        assert!(matches!(
            parse_url_params("a=1;a=2"),
            Err(ConnectorError::ParseError(_))
        ));
    }

    #[test]
    fn test_options_must_all_be_claimed() {
        let params = ConnectParams::engine_url("fake://foo")
            .with_option("credentials", "hello_world")
            .with_option("doesntexist", "oh dear");
        let mut options = params.relayed_options();
        assert_eq!(options.take("credentials").as_deref(), Some("hello_world"));
        let err = options.finish().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter: unexpected options: doesntexist"
        );
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: ConnectParams =
            serde_json::from_str(r#"{"reference": null, "engine_url": "fake://x"}"#).unwrap();
        assert_eq!(params.access, AccessMode::Read);
        assert!(params.options.is_empty());
    }
}
