use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::{StorageBackend, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};

const ACL_HEADER: &str = "x-amz-acl";

/// S3 storage implementation
///
/// Holds two clients over the same bucket: one plain, and one that sends
/// `x-amz-acl: public-read` with every request so uploaded images are readable by URL.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    public_store: AmazonS3,
    bucket: String,
    url_base: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `public_host` - Host used in public URLs; defaults to `s3.<region>.amazonaws.com`
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_host: Option<String>,
    ) -> StorageResult<Self> {
        let store = Self::builder(&bucket, &region, endpoint_url.as_deref())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(ACL_HEADER),
            HeaderValue::from_static("public-read"),
        );
        let public_store = Self::builder(&bucket, &region, endpoint_url.as_deref())
            .with_client_options(ClientOptions::new().with_default_headers(headers))
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let url_base = public_url_base(&region, endpoint_url.as_deref(), public_host.as_deref());

        Ok(S3Storage {
            store,
            public_store,
            bucket,
            url_base,
        })
    }

    fn builder(bucket: &str, region: &str, endpoint_url: Option<&str>) -> AmazonS3Builder {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        builder
    }
}

/// Scheme and host that prefix `<bucket>/<key>` in public URLs.
fn public_url_base(region: &str, endpoint_url: Option<&str>, public_host: Option<&str>) -> String {
    match (public_host, endpoint_url) {
        (Some(host), _) if host.starts_with("http://") || host.starts_with("https://") => {
            host.trim_end_matches('/').to_string()
        }
        (Some(host), _) => format!("https://{}", host.trim_end_matches('/')),
        (None, Some(endpoint)) => endpoint.trim_end_matches('/').to_string(),
        (None, None) => format!("https://s3.{}.amazonaws.com", region),
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let size = data.len() as u64;
        let location = Path::from(key.to_string());
        let store = match visibility {
            Visibility::Private => &self.store,
            Visibility::PublicRead => &self.public_store,
        };

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = store
            .put_opts(&location, PutPayload::from(data), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            visibility = ?visibility,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.url_base, self.bucket, key)
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(bucket = %self.bucket, key = %key, "S3 delete successful");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 delete failed");
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_public_url_uses_regional_host() {
        assert_eq!(
            public_url_base("eu-west-1", None, None),
            "https://s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn custom_endpoint_is_used_for_public_urls() {
        assert_eq!(
            public_url_base("us-east-1", Some("http://localhost:9000/"), None),
            "http://localhost:9000"
        );
    }

    #[test]
    fn explicit_public_host_wins() {
        assert_eq!(
            public_url_base("us-east-1", Some("http://minio:9000"), Some("cdn.example.com")),
            "https://cdn.example.com"
        );
    }

    #[test]
    fn public_url_appends_bucket_and_key() {
        let storage = S3Storage::new(
            "psr-bucket".to_string(),
            "us-east-1".to_string(),
            Some("http://localhost:9000".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(
            storage.public_url("abc.png"),
            "http://localhost:9000/psr-bucket/abc.png"
        );
    }
}
