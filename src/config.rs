use crate::error::{Error, Result};

pub const MIN_PART_SIZE_5MB: usize = 5_242_880;
pub const MAX_PART_SIZE_5GB: usize = 5_368_709_120;
pub const DEFAULT_PART_SIZE: usize = 8_388_608;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const MAX_PARTS: usize = 10_000;

/// Tuning knobs consumed by the splitter and the multipart uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    /// Size of every part except possibly the last one
    pub max_chunk_bytes: usize,
    /// Number of part uploads dispatched together in one batch
    pub max_concurrent: usize,
    /// Parts one multipart session may hold before the upload is abandoned
    pub max_parts: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_PART_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_parts: MAX_PARTS,
        }
    }
}

impl UploadConfig {
    pub fn new(max_chunk_bytes: usize, max_concurrent: usize) -> Self {
        Self {
            max_chunk_bytes,
            max_concurrent,
            max_parts: MAX_PARTS,
        }
    }

    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = max_parts;
        self
    }

    /// Rejects values the uploader cannot work with.
    ///
    /// Part sizes outside the S3 limits are accepted with a warning, since other
    /// stores (and tests) happily take smaller parts.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes == 0 {
            return Err(Error::Config("max_chunk_bytes must be at least 1".into()));
        }
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.max_parts == 0 || self.max_parts > i32::MAX as usize {
            return Err(Error::Config(format!(
                "max_parts must be between 1 and {}",
                i32::MAX
            )));
        }
        if self.max_chunk_bytes < MIN_PART_SIZE_5MB {
            tracing::warn!(
                part_size = self.max_chunk_bytes,
                "part size is below the 5MB minimum S3 accepts for non-final parts"
            );
        } else if self.max_chunk_bytes > MAX_PART_SIZE_5GB {
            tracing::warn!(
                part_size = self.max_chunk_bytes,
                "part size is above the 5GB maximum S3 accepts"
            );
        }
        Ok(())
    }

    /// Upper bound on chunk bytes held in memory by one object's upload.
    pub fn peak_buffered_bytes(&self) -> usize {
        self.max_chunk_bytes.saturating_mul(self.max_concurrent)
    }
}
