pub mod multipart;
pub mod object;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use multipart::{MultipartUploader, UploadOutcome};
pub use object::{display_objects, S3Store};

/// One uploaded part as the remote store needs it back at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    /// Starts at 1, contiguous within one upload session
    pub part_number: i32,
    /// Opaque tag returned by the store, passed back verbatim
    pub e_tag: String,
}

/// The remote-store primitives the uploader drives.
///
/// Implementations own retries and timeouts; the uploader never retries a call.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> Result<()>;

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;

    /// Uploads one part and returns its e-tag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String>;

    /// `parts` must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<()>;
}
