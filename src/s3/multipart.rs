use super::{ObjectStore, PartResult};
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::splitter::ChunkSplitter;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How an object ended up in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// One put request, no multipart session.
    Single { bytes: u64 },
    Multipart { parts: usize, bytes: u64 },
}

impl UploadOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            UploadOutcome::Single { bytes } | UploadOutcome::Multipart { bytes, .. } => *bytes,
        }
    }
}

/// Drives the upload of one object at a time through an [`ObjectStore`].
///
/// Objects that fit in a single chunk are sent with one put. Larger objects go
/// through a multipart session. Each part is spawned as its own task when it is
/// dispatched; once `max_concurrent` parts are in flight the whole batch is
/// awaited before the next chunk is pulled, so at most `max_concurrent` chunks
/// are held in memory.
pub struct MultipartUploader<S: ?Sized> {
    store: Arc<S>,
    config: UploadConfig,
}

impl<S: ?Sized> Clone for MultipartUploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: ObjectStore + ?Sized + 'static> MultipartUploader<S> {
    pub fn new(store: Arc<S>, config: UploadConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Uploads everything `reader` produces to `bucket/key`.
    pub async fn upload_stream<R: AsyncRead + Unpin>(
        &self,
        reader: R,
        bucket: &str,
        key: &str,
    ) -> Result<UploadOutcome> {
        let mut splitter = ChunkSplitter::new(reader, self.config.max_chunk_bytes);
        self.upload(&mut splitter, bucket, key).await
    }

    pub async fn upload<R: AsyncRead + Unpin>(
        &self,
        splitter: &mut ChunkSplitter<R>,
        bucket: &str,
        key: &str,
    ) -> Result<UploadOutcome> {
        let start_time = Instant::now();
        let max_chunk_bytes = splitter.max_chunk_bytes();

        let Some(first) = splitter.next_chunk().await? else {
            return self.put_single(bucket, key, Bytes::new(), start_time).await;
        };
        if first.len() < max_chunk_bytes {
            return self.put_single(bucket, key, first, start_time).await;
        }
        // A full first chunk may still be the whole object.
        let Some(second) = splitter.next_chunk().await? else {
            return self.put_single(bucket, key, first, start_time).await;
        };

        let upload_id = self.store.create_multipart_upload(bucket, key).await?;
        info!(bucket, key, upload_id = %upload_id, "started multipart upload");

        let target = PartTarget {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.as_str().into(),
        };
        match self.send_parts(splitter, &target, [first, second]).await {
            Ok(outcome) => {
                info!(
                    bucket,
                    key,
                    bytes = outcome.bytes(),
                    elapsed = ?start_time.elapsed(),
                    "multipart upload complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.abort(bucket, key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        start_time: Instant,
    ) -> Result<UploadOutcome> {
        let bytes = body.len() as u64;
        self.store.put_object(bucket, key, body).await?;
        info!(bucket, key, bytes, elapsed = ?start_time.elapsed(), "uploaded object");
        Ok(UploadOutcome::Single { bytes })
    }

    /// Parts start uploading as soon as they are dispatched, while the next
    /// chunk is read. A full batch is awaited as a whole before reading on.
    async fn send_parts<R: AsyncRead + Unpin>(
        &self,
        splitter: &mut ChunkSplitter<R>,
        target: &PartTarget,
        pulled: [Bytes; 2],
    ) -> Result<UploadOutcome> {
        let mut pulled = pulled.into_iter();
        let mut completed: Vec<PartResult> = Vec::new();
        let mut batch = Vec::with_capacity(self.config.max_concurrent);
        let max_parts = self.config.max_parts.min(i32::MAX as usize);
        let mut part_number: i32 = 0;
        let mut bytes: u64 = 0;

        loop {
            let next = match pulled.next() {
                Some(chunk) => Ok(Some(chunk)),
                None => splitter.next_chunk().await,
            };
            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    settle(&mut batch).await;
                    return Err(err.into());
                }
            };
            if part_number as usize >= max_parts {
                settle(&mut batch).await;
                return Err(Error::TooManyParts {
                    key: target.key.to_string(),
                    limit: max_parts,
                });
            }
            part_number += 1;
            bytes += chunk.len() as u64;
            batch.push(self.dispatch_part(target, part_number, chunk));

            if batch.len() >= self.config.max_concurrent {
                drain_batch(&mut batch, &mut completed).await?;
            }
        }
        drain_batch(&mut batch, &mut completed).await?;

        completed.sort_by_key(|part| part.part_number);
        self.store
            .complete_multipart_upload(&target.bucket, &target.key, &target.upload_id, &completed)
            .await?;

        Ok(UploadOutcome::Multipart {
            parts: completed.len(),
            bytes,
        })
    }

    fn dispatch_part(
        &self,
        target: &PartTarget,
        part_number: i32,
        chunk: Bytes,
    ) -> JoinHandle<Result<PartResult>> {
        let store = Arc::clone(&self.store);
        let target = target.clone();
        tokio::spawn(async move {
            let size = chunk.len();
            let e_tag = store
                .upload_part(
                    &target.bucket,
                    &target.key,
                    &target.upload_id,
                    part_number,
                    chunk,
                )
                .await?;
            debug!(key = %target.key, part_number, size, "uploaded part");
            Ok::<_, Error>(PartResult { part_number, e_tag })
        })
    }

    /// Best effort: a failed abort is logged so the error that caused it wins.
    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        warn!(bucket, key, upload_id, "aborting multipart upload");
        if let Err(err) = self.store.abort_multipart_upload(bucket, key, upload_id).await {
            error!(bucket, key, upload_id, %err, "failed to abort multipart upload");
        }
    }
}

/// Session coordinates moved into every part task.
#[derive(Clone)]
struct PartTarget {
    bucket: Arc<str>,
    key: Arc<str>,
    upload_id: Arc<str>,
}

/// Waits for every part in the batch, even when one of them fails.
async fn drain_batch(
    batch: &mut Vec<JoinHandle<Result<PartResult>>>,
    completed: &mut Vec<PartResult>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    debug!(parts = batch.len(), "draining batch");
    for joined in join_all(batch.drain(..)).await {
        completed.push(joined??);
    }
    Ok(())
}

/// Lets parts already in flight finish before the session is aborted.
async fn settle(batch: &mut Vec<JoinHandle<Result<PartResult>>>) {
    join_all(batch.drain(..)).await;
}
