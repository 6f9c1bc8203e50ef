//! S3 backend over the AWS SDK.
//!
//! A thin mapping of the [`ObjectStore`] contract onto `aws-sdk-s3`. Works
//! against AWS itself and S3-compatible services (MinIO etc) via the
//! `endpoint` field of [`Credentials`].

use aws_sdk_s3::config::{BehaviorVersion, Credentials as AwsCredentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::info;

use crate::client::{BoxFuture, CompletedPart, Credentials, ObjectStore, PartInfo};
use crate::error::{StoreError, StoreResult};

/// Object store backed by an S3-compatible service.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from explicit credentials.
    pub fn connect(credentials: &Credentials) -> Self {
        let provider = AwsCredentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            "chunklift",
        );
        let region = credentials
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(provider);
        if let Some(endpoint) = &credentials.endpoint {
            // Path-style addressing is required for MinIO and most
            // S3-compatible services.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(endpoint = ?credentials.endpoint, "constructed s3 client");
        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Build a client from the ambient environment (profile, env vars, IMDS).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }

    /// Wrap an already-configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn backend_err(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        reason: format!("{}: {}", context, err),
    }
}

impl ObjectStore for S3ObjectStore {
    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let response = self
                .client
                .create_multipart_upload()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| backend_err("create_multipart_upload", e))?;
            response
                .upload_id()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Backend {
                    reason: "store returned no upload id".to_string(),
                })
        })
    }

    fn upload_part<'a>(
        &'a self,
        upload_id: &'a str,
        bucket: &'a str,
        key: &'a str,
        part_number: u32,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let response = self
                .client
                .upload_part()
                .upload_id(upload_id)
                .bucket(bucket)
                .key(key)
                .part_number(part_number as i32)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| backend_err("upload_part", e))?;
            response
                .e_tag()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Backend {
                    reason: format!("store returned no etag for part {}", part_number),
                })
        })
    }

    fn list_parts<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<PartInfo>>> {
        Box::pin(async move {
            let response = self
                .client
                .list_parts()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .send()
                .await
                .map_err(|e| backend_err("list_parts", e))?;
            let parts = response
                .parts()
                .iter()
                .map(|part| PartInfo {
                    part_number: part.part_number().unwrap_or(0) as u32,
                    etag: part.e_tag().unwrap_or_default().to_string(),
                    size: part.size().unwrap_or(0) as u64,
                })
                .collect();
            Ok(parts)
        })
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let completed = parts
                .into_iter()
                .map(|p| {
                    AwsCompletedPart::builder()
                        .part_number(p.part_number as i32)
                        .e_tag(p.etag)
                        .build()
                })
                .collect();
            let response = self
                .client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(completed))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| backend_err("complete_multipart_upload", e))?;
            response
                .e_tag()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Backend {
                    reason: "store returned no etag for completed object".to_string(),
                })
        })
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .send()
                .await
                .map_err(|e| backend_err("abort_multipart_upload", e))?;
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let response = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| backend_err("put_object", e))?;
            response
                .e_tag()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Backend {
                    reason: "store returned no etag for object".to_string(),
                })
        })
    }

    fn delete_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| backend_err("delete_object", e))?;
            Ok(())
        })
    }

    // S3 multipart ETags follow the composite convention for uploads without
    // server-side re-encryption.
    fn composite_etags(&self) -> bool {
        true
    }
}
