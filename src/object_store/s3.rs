//! S3-compatible (MinIO) backends, reached through the AWS SDK.
//!
//! Every backend gets its own SDK client: same region, timeouts and retry policy, but
//! its own endpoint and credentials. Requests are path-style,
//! `{scheme}://{address}/{bucket}/{key}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::Client;
use aws_smithy_types::checksum_config::{RequestChecksumCalculation, ResponseChecksumValidation};
use futures::StreamExt;
use reqwest::Url;
use tracing::{debug, error, info};

use super::{ByteStream, Connector, ObjectBody, ObjectStore, ObjectStoreError};
use crate::registry::BackendDescriptor;

/// Settings shared by every S3 backend client.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    pub secure: bool,
    /// Upper bound on connecting to a backend and on a single backend call.
    pub timeout: Duration,
}

pub struct S3Store {
    name: String,
    bucket: String,
    client: Client,
}

impl S3Store {
    /// Build a client for one backend on top of the shared SDK settings in `base`.
    pub fn new(
        descriptor: &BackendDescriptor,
        base: &SdkConfig,
        options: &S3Options,
    ) -> Result<Self, ObjectStoreError> {
        let endpoint = endpoint_url(&descriptor.address, options.secure)?;

        let credentials = Credentials::new(
            &descriptor.access_key,
            &descriptor.secret_key,
            None,
            None,
            "object-gateway-discovery",
        );
        let config = aws_sdk_s3::config::Builder::from(base)
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        Ok(Self {
            name: descriptor.address.clone(),
            bucket: options.bucket.clone(),
            client: Client::from_conf(config),
        })
    }
}

/// `{scheme}://{address}`, where `address` must be a bare `host[:port]`.
fn endpoint_url(address: &str, secure: bool) -> Result<String, ObjectStoreError> {
    let scheme = if secure { "https" } else { "http" };
    let endpoint = format!("{scheme}://{address}");
    let valid = Url::parse(&endpoint)
        .map(|url| url.host_str().is_some() && url.path() == "/" && url.query().is_none())
        .unwrap_or(false);
    if valid {
        Ok(endpoint)
    } else {
        Err(ObjectStoreError::Backend(format!(
            "invalid backend address '{address}'"
        )))
    }
}

fn sdk_error<E, R>(backend: &str, operation: &str, err: SdkError<E, R>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err {
        SdkError::TimeoutError(_) => ObjectStoreError::Timeout,
        other => ObjectStoreError::Backend(format!(
            "S3 {operation} on {backend} failed: {}",
            DisplayErrorContext(&other)
        )),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_container(&self) -> Result<(), ObjectStoreError> {
        info!(backend = %self.name, bucket = %self.bucket, "Ensuring bucket exists");

        let created = self.client.create_bucket().bucket(&self.bucket).send().await;
        let create_error = match created {
            Ok(_) => {
                info!(backend = %self.name, bucket = %self.bucket, "Created bucket");
                return Ok(());
            }
            Err(e) => sdk_error(&self.name, "create_bucket", e),
        };

        // Creating fails when the bucket is already there; check that we can see it.
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(backend = %self.name, bucket = %self.bucket, "Bucket already owned");
                Ok(())
            }
            Err(_) => {
                error!(backend = %self.name, bucket = %self.bucket, error = %create_error, "Cannot create bucket");
                Err(create_error)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, ObjectStoreError> {
        debug!(backend = %self.name, key = %key, "S3 get_object");

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = match &e {
                    SdkError::ServiceError(context) => {
                        context.err().is_no_such_key() || context.raw().status().as_u16() == 404
                    }
                    _ => false,
                };
                if missing {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    sdk_error(&self.name, "get_object", e)
                }
            })?;

        let content_length = output
            .content_length()
            .and_then(|n| u64::try_from(n).ok());
        let stream = futures::stream::try_unfold(output.body, |mut body| async move {
            let chunk = body.try_next().await.map_err(std::io::Error::other)?;
            Ok::<_, std::io::Error>(chunk.map(|bytes| (bytes, body)))
        })
        .boxed();

        Ok(ObjectBody {
            stream,
            content_length,
        })
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<u64, ObjectStoreError> {
        debug!(backend = %self.name, key = %key, content_length, "S3 put_object");

        let declared = i64::try_from(content_length).map_err(|_| {
            ObjectStoreError::Backend(format!("content length {content_length} out of range"))
        })?;
        let body = SdkByteStream::from_body_1_x(reqwest::Body::wrap_stream(body));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(declared)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| sdk_error(&self.name, "put_object", e))?;

        Ok(content_length)
    }

    async fn list_keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| sdk_error(&self.name, "list_objects_v2", e))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}

/// Builds [`S3Store`]s from one shared SDK configuration.
pub struct S3Connector {
    options: S3Options,
    base: SdkConfig,
}

impl S3Connector {
    /// Load the settings every backend client shares. Credentials come from each
    /// descriptor, so none are resolved here. Calls are never retried.
    pub async fn new(options: S3Options) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(options.timeout)
            .operation_timeout(options.timeout)
            .build();
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()))
            .no_credentials()
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeouts)
            .load()
            .await;

        Self { options, base }
    }
}

impl Connector for S3Connector {
    fn connect(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let store = S3Store::new(descriptor, &self.base, &self.options)?;
        Ok(Arc::new(store))
    }
}
