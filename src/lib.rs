//! Uploads local directory trees to an S3 bucket, switching to concurrent
//! multipart uploads for files larger than one part.

pub mod config;
pub mod error;
pub mod s3;
pub mod splitter;
pub mod tree;

pub use config::UploadConfig;
pub use error::{Error, Result};
pub use s3::{MultipartUploader, ObjectStore, PartResult, S3Store, UploadOutcome};
pub use splitter::ChunkSplitter;
pub use tree::{upload_tree, TreeReport};
