use super::{ObjectStore, PartResult};
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_types::region::Region;
use bytes::Bytes;
use s3::primitives::ByteStream;

fn describe<E: std::error::Error>(err: E) -> String {
    DisplayErrorContext(err).to_string()
}

/// [`ObjectStore`] backed by the AWS SDK client.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    pub fn new(client: s3::Client) -> Self {
        Self { client }
    }

    /// Loads credentials from the environment. The region falls back to the
    /// default provider chain, then to us-east-1.
    pub async fn connect(region: Option<String>) -> Self {
        let region_provider = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(Region::new("us-east-1"));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        Self::new(s3::Client::new(&config))
    }

    /// Lists every object in the bucket, following pagination.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<s3::types::Object>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_owned))
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|err| Error::remote("list_objects_v2", bucket, "", describe(err)))?;
            objects.extend_from_slice(page.contents());
        }
        Ok(objects)
    }
}

pub fn display_objects(objects: &[s3::types::Object]) {
    for object in objects {
        println!(
            "{:<40} | {:>20} | {:>10} bytes",
            object.key().unwrap_or("unknown"),
            object
                .last_modified()
                .and_then(|at| at.fmt(s3::primitives::DateTimeFormat::DateTime).ok())
                .unwrap_or_else(|| String::from("unknown")),
            object.size().unwrap_or(0),
        );
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| Error::BucketUnavailable {
                bucket: bucket.to_owned(),
                message: describe(err),
            })?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| Error::remote("put_object", bucket, key, describe(err)))?;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| Error::remote("create_multipart_upload", bucket, key, describe(err)))?;

        response
            .upload_id()
            .map(str::to_owned)
            .ok_or(Error::MissingField {
                operation: "create_multipart_upload",
                field: "upload_id",
            })
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        let response = self
            .client
            .upload_part()
            .body(ByteStream::from(body))
            .bucket(bucket)
            .key(key)
            .part_number(part_number)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| Error::remote("upload_part", bucket, key, describe(err)))?;

        response.e_tag().map(str::to_owned).ok_or(Error::MissingField {
            operation: "upload_part",
            field: "e_tag",
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<()> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .set_part_number(Some(part.part_number))
                    .set_e_tag(Some(part.e_tag.clone()))
                    .build()
            })
            .collect();
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|err| {
                Error::remote("complete_multipart_upload", bucket, key, describe(err))
            })?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| Error::remote("abort_multipart_upload", bucket, key, describe(err)))?;
        Ok(())
    }
}
