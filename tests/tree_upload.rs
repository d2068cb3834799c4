use async_trait::async_trait;
use bytes::Bytes;
use dirpush::{
    upload_tree, Error, MultipartUploader, ObjectStore, PartResult, Result, UploadConfig,
    UploadOutcome,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps objects in memory and assembles multipart sessions by part number.
#[derive(Default)]
struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    sessions: Mutex<HashMap<String, BTreeMap<i32, Bytes>>>,
    next_session: AtomicUsize,
    aborted: AtomicUsize,
    fail_key: Option<String>,
}

impl MemoryStore {
    fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            ..Default::default()
        }
    }

    fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        if bucket != self.bucket {
            return Err(Error::BucketUnavailable {
                bucket: bucket.to_owned(),
                message: "NoSuchBucket".to_owned(),
            });
        }
        Ok(())
    }

    async fn put_object(&self, _bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_owned(), body.to_vec());
        Ok(())
    }

    async fn create_multipart_upload(&self, _bucket: &str, _key: &str) -> Result<String> {
        let id = format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst));
        self.sessions.lock().unwrap().insert(id.clone(), BTreeMap::new());
        Ok(id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        tokio::task::yield_now().await;
        if self.fail_key.as_deref() == Some(key) && part_number == 2 {
            return Err(Error::Remote {
                operation: "upload_part",
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                message: "SlowDown".to_owned(),
            });
        }
        let mut sessions = self.sessions.lock().unwrap();
        let parts = sessions.get_mut(upload_id).expect("unknown session");
        assert!(parts.insert(part_number, body).is_none(), "duplicate part");
        Ok(format!("\"{upload_id}-{part_number}\""))
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<()> {
        let stored = self
            .sessions
            .lock()
            .unwrap()
            .remove(upload_id)
            .expect("unknown session");
        let numbers: Vec<i32> = parts.iter().map(|part| part.part_number).collect();
        let expected: Vec<i32> = (1..=stored.len() as i32).collect();
        assert_eq!(numbers, expected);

        let data = stored.into_values().flat_map(|body| body.to_vec()).collect();
        self.objects.lock().unwrap().insert(key.to_owned(), data);
        Ok(())
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(upload_id);
        self.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn write(root: &Path, relative: &str, data: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 239) as u8).collect()
}

#[tokio::test]
async fn uploads_every_file_under_its_relative_key() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.txt", b"");
    write(dir.path(), "small.txt", b"hello");
    write(dir.path(), "nested/deeper/large.bin", &pattern(1000));
    write(dir.path(), "nested/exact.bin", &pattern(64));

    let store = Arc::new(MemoryStore::new("photos"));
    let uploader = MultipartUploader::new(Arc::clone(&store), UploadConfig::new(64, 3));
    let report = upload_tree(&uploader, dir.path(), "photos", Some("backup"), 2)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        store.keys(),
        vec![
            "backup/empty.txt",
            "backup/nested/deeper/large.bin",
            "backup/nested/exact.bin",
            "backup/small.txt",
        ]
    );
    assert_eq!(store.object("backup/empty.txt").unwrap(), b"");
    assert_eq!(store.object("backup/small.txt").unwrap(), b"hello");
    assert_eq!(store.object("backup/nested/exact.bin").unwrap(), pattern(64));
    assert_eq!(
        store.object("backup/nested/deeper/large.bin").unwrap(),
        pattern(1000)
    );

    let outcomes: HashMap<&str, &UploadOutcome> = report
        .uploaded
        .iter()
        .map(|(key, outcome)| (key.as_str(), outcome))
        .collect();
    assert_eq!(
        outcomes["backup/nested/deeper/large.bin"],
        &UploadOutcome::Multipart { parts: 16, bytes: 1000 }
    );
    assert_eq!(
        outcomes["backup/nested/exact.bin"],
        &UploadOutcome::Single { bytes: 64 }
    );
    assert_eq!(report.bytes(), 1069);
}

#[tokio::test]
async fn one_failed_file_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.bin", &pattern(300));
    write(dir.path(), "b.bin", &pattern(300));

    let store = Arc::new(MemoryStore {
        fail_key: Some("a.bin".to_owned()),
        ..MemoryStore::new("bucket")
    });
    let uploader = MultipartUploader::new(Arc::clone(&store), UploadConfig::new(100, 2));
    let report = upload_tree(&uploader, dir.path(), "bucket", None, 4)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "a.bin");
    assert!(matches!(report.failed[0].1, Error::Remote { .. }));
    assert_eq!(store.aborted.load(Ordering::SeqCst), 1);
    assert_eq!(store.keys(), vec!["b.bin"]);
    assert!(store.sessions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_bucket_uploads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"data");

    let store = Arc::new(MemoryStore::new("real"));
    let uploader = MultipartUploader::new(Arc::clone(&store), UploadConfig::new(16, 2));
    let err = upload_tree(&uploader, dir.path(), "missing", None, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BucketUnavailable { .. }));
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new("bucket"));
    let uploader = MultipartUploader::new(store, UploadConfig::new(16, 0));
    let err = upload_tree(&uploader, dir.path(), "bucket", None, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
