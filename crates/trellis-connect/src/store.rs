//! Object storage access for archived datasets.
//!
//! Provides `S3Config` (credentials / endpoint), `parse_bucket_url` (bucket/key
//! extraction) and `build_store`, which turns them into an `ObjectStore` for
//! S3-compatible storage or Google Cloud Storage.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use url::Url;

use crate::error::{ConnectorError, Result};

/// Which object storage service holds the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Gcs,
    S3,
}

impl StoreKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            StoreKind::Gcs => "gs+flowerpot",
            StoreKind::S3 => "s3+flowerpot",
        }
    }
}

/// Configuration for connecting to S3-compatible storage.
///
/// Secrets (`access_key_id`, `secret_access_key`) are redacted in `Debug`
/// output.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct S3Config {
    /// AWS region (e.g. "us-east-1")
    pub region: String,
    /// Access key id (redacted in Debug output)
    pub access_key_id: String,
    /// Secret access key (redacted in Debug output)
    pub secret_access_key: String,
    /// Optional custom endpoint URL (for MinIO / LocalStack)
    pub endpoint_url: Option<String>,
    /// Allow HTTP (non-TLS) connections, for local MinIO
    pub allow_http: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("access_key_id", &"***")
            .field("secret_access_key", &"***")
            .field("endpoint_url", &self.endpoint_url)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

fn required_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConnectorError::Config(format!("{} not set", key)))
}

impl S3Config {
    /// Build an S3Config from environment variables:
    ///   AWS_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_ENDPOINT_URL
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: required_var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required_var("AWS_SECRET_ACCESS_KEY")?,
            endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
            allow_http: std::env::var("AWS_ALLOW_HTTP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// Parse a `<scheme>://bucket/key` URL into (bucket, key).
///
/// The key is percent-decoded, so `my pot.tar` and `my%20pot.tar` name the
/// same object.
pub fn parse_bucket_url(kind: StoreKind, engine_url: &str) -> Result<(String, ObjectPath)> {
    let invalid = |reason: &str| {
        ConnectorError::ParseError(format!("{} in '{}'", reason, engine_url))
    };
    let url = Url::parse(engine_url).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != kind.scheme() {
        return Err(invalid(&format!("URL scheme must be {}://", kind.scheme())));
    }
    let bucket = url
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| invalid("missing bucket"))?
        .to_string();
    let key = ObjectPath::from_url_path(url.path()).map_err(|e| invalid(&e.to_string()))?;
    if key.as_ref().is_empty() {
        return Err(invalid("missing object key"));
    }
    Ok((bucket, key))
}

/// Build the object store holding `bucket`.
///
/// S3 credentials come from [`S3Config::from_env`]. GCS credentials come
/// from the `GOOGLE_*` environment, or from `service_account` (a path to a
/// service account key file) when given.
pub fn build_store(
    kind: StoreKind,
    bucket: &str,
    service_account: Option<&str>,
) -> Result<Arc<dyn ObjectStore>> {
    match kind {
        StoreKind::S3 => {
            let config = S3Config::from_env()?;
            let mut builder = AmazonS3Builder::new()
                .with_region(&config.region)
                .with_bucket_name(bucket)
                .with_access_key_id(&config.access_key_id)
                .with_secret_access_key(&config.secret_access_key);

            if let Some(ref endpoint) = config.endpoint_url {
                builder = builder.with_endpoint(endpoint);
            }
            if config.allow_http {
                builder = builder.with_allow_http(true);
            }
            Ok(Arc::new(builder.build().map_err(|e| {
                ConnectorError::Config(format!("failed to build S3 object store: {}", e))
            })?))
        }
        StoreKind::Gcs => {
            let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
            if let Some(path) = service_account {
                builder = builder.with_service_account_path(path);
            }
            Ok(Arc::new(builder.build().map_err(|e| {
                ConnectorError::Config(format!("failed to build GCS object store: {}", e))
            })?))
        }
    }
}
