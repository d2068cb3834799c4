//! Uploads every regular file under a directory, one object per file.

use crate::error::{Error, Result};
use crate::s3::{MultipartUploader, ObjectStore, UploadOutcome};
use futures::stream::{self, StreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tracing::{error, info};

pub const DEFAULT_FILE_CONCURRENCY: usize = 8;

/// Per-file results of a tree upload.
#[derive(Debug, Default)]
pub struct TreeReport {
    pub uploaded: Vec<(String, UploadOutcome)>,
    pub failed: Vec<(String, Error)>,
}

impl TreeReport {
    pub fn bytes(&self) -> u64 {
        self.uploaded.iter().map(|(_, outcome)| outcome.bytes()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Regular files below `root`, sorted. Symlinks are skipped.
/// A `root` that is itself a file yields just that file.
pub async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if fs::metadata(root).await?.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Object key for `path`: its path relative to `root` joined with `/`,
/// placed under `prefix` when one is given.
pub fn object_key(root: &Path, path: &Path, prefix: Option<&str>) -> Result<String> {
    let relative = match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => path.file_name().map(Path::new),
        Ok(rel) => Some(rel),
        Err(_) => None,
    }
    .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(
                segment
                    .to_str()
                    .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(Error::InvalidPath(path.to_path_buf())),
        }
    }
    if segments.is_empty() {
        return Err(Error::InvalidPath(path.to_path_buf()));
    }

    let relative = segments.join("/");
    Ok(match prefix.map(|p| p.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{relative}"),
        _ => relative,
    })
}

/// Uploads the tree under `root` into `bucket`.
///
/// The bucket is checked first; if it cannot be reached nothing is uploaded.
/// Files are uploaded `file_concurrency` at a time, each through its own
/// session, and a failed file does not stop the others.
pub async fn upload_tree<S: ObjectStore + ?Sized + 'static>(
    uploader: &MultipartUploader<S>,
    root: &Path,
    bucket: &str,
    prefix: Option<&str>,
    file_concurrency: usize,
) -> Result<TreeReport> {
    uploader.config().validate()?;
    uploader.store().head_bucket(bucket).await?;

    let files = collect_files(root).await?;
    info!(bucket, files = files.len(), root = %root.display(), "uploading directory tree");

    let results: Vec<(String, Result<UploadOutcome>)> = stream::iter(files)
        .map(|path| upload_file(uploader, root, path, bucket, prefix))
        .buffer_unordered(file_concurrency.max(1))
        .collect()
        .await;

    let mut report = TreeReport::default();
    for (key, result) in results {
        match result {
            Ok(outcome) => report.uploaded.push((key, outcome)),
            Err(err) => {
                error!(bucket, key = %key, %err, "upload failed");
                report.failed.push((key, err));
            }
        }
    }
    report.uploaded.sort_by(|a, b| a.0.cmp(&b.0));
    info!(
        bucket,
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        bytes = report.bytes(),
        "directory tree upload finished"
    );
    Ok(report)
}

async fn upload_file<S: ObjectStore + ?Sized + 'static>(
    uploader: &MultipartUploader<S>,
    root: &Path,
    path: PathBuf,
    bucket: &str,
    prefix: Option<&str>,
) -> (String, Result<UploadOutcome>) {
    match object_key(root, &path, prefix) {
        Ok(key) => {
            let result = open_and_upload(uploader, &path, bucket, &key).await;
            (key, result)
        }
        Err(err) => (path.display().to_string(), Err(err)),
    }
}

async fn open_and_upload<S: ObjectStore + ?Sized + 'static>(
    uploader: &MultipartUploader<S>,
    path: &Path,
    bucket: &str,
    key: &str,
) -> Result<UploadOutcome> {
    let file = File::open(path).await?;
    uploader.upload_stream(file, bucket, key).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_forward_slashes() {
        let root = Path::new("/data/site");
        let path = root.join("css").join("main.css");
        assert_eq!(object_key(root, &path, None).unwrap(), "css/main.css");
    }

    #[test]
    fn keys_are_placed_under_the_prefix() {
        let root = Path::new("/data/site");
        let path = root.join("index.html");
        assert_eq!(
            object_key(root, &path, Some("backups/2024/")).unwrap(),
            "backups/2024/index.html"
        );
        assert_eq!(object_key(root, &path, Some("/")).unwrap(), "index.html");
    }

    #[test]
    fn single_file_root_uses_its_name() {
        let path = Path::new("/data/report.pdf");
        assert_eq!(object_key(path, path, None).unwrap(), "report.pdf");
    }

    #[test]
    fn paths_outside_the_root_are_rejected() {
        let err = object_key(Path::new("/data/site"), Path::new("/etc/passwd"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn report_sums_uploaded_bytes() {
        let report = TreeReport {
            uploaded: vec![
                ("a".into(), UploadOutcome::Single { bytes: 3 }),
                ("b".into(), UploadOutcome::Multipart { parts: 2, bytes: 9 }),
            ],
            failed: Vec::new(),
        };
        assert_eq!(report.bytes(), 12);
        assert!(report.is_success());
    }
}
