//! Attachment uploader: local media in, public download URL out.
//!
//! Storage keys are `<prefix>/<owner>_<millis>_<name>`. The millisecond
//! stamp comes from one process-wide clock that never repeats, so two
//! uploads never share a key, whichever uploader made them, and a retry
//! never overwrites an earlier attempt. A key whose upload failed is simply
//! abandoned.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use parley_net::BlobStore;
use parley_shared::constants::DEFAULT_OWNER;
use parley_shared::{MediaKind, UploadError, UserId};

use crate::devices::MediaRef;

/// Last stamp handed out by any uploader in this process.
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock millis, bumped past the previous stamp when the clock has not
/// moved (or moved back).
fn next_stamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_STAMP.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST_STAMP.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

pub struct AttachmentUploader {
    blobs: Arc<dyn BlobStore>,
    max_size: usize,
}

impl AttachmentUploader {
    pub fn new(blobs: Arc<dyn BlobStore>, max_size: usize) -> Self {
        Self { blobs, max_size }
    }

    /// Fresh storage key for `media`. Every call returns a new key.
    pub fn storage_key(&self, media: &MediaRef, kind: MediaKind, owner: &UserId) -> String {
        let owner = if owner.is_empty() {
            DEFAULT_OWNER
        } else {
            owner.as_str()
        };
        let name = match media.file_name() {
            Some(name) => sanitize(name),
            None => generated_name(kind),
        };
        format!(
            "{}/{}_{}_{}",
            kind.storage_prefix(),
            sanitize(owner),
            next_stamp(),
            name
        )
    }

    /// Read `media`, store it and return its download URL.
    pub async fn upload(
        &self,
        media: &MediaRef,
        kind: MediaKind,
        owner: &UserId,
    ) -> Result<String, UploadError> {
        let data = tokio::fs::read(media.path()).await.map_err(|e| {
            warn!(path = %media.path().display(), error = %e, "Failed to read local media");
            UploadError::Read(e)
        })?;

        if data.is_empty() {
            return Err(UploadError::Empty);
        }
        if data.len() > self.max_size {
            return Err(UploadError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let key = self.storage_key(media, kind, owner);
        let size = data.len();

        if let Err(e) = self.blobs.put_object(&key, Bytes::from(data)).await {
            warn!(key = %key, error = %e, "Upload failed, abandoning key");
            return Err(UploadError::Backend(e));
        }
        let url = self.blobs.download_url(&key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Could not resolve download URL, abandoning key");
            UploadError::Backend(e)
        })?;

        info!(key = %key, size, "Attachment uploaded");
        Ok(url)
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn generated_name(kind: MediaKind) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{token}-{}", kind.default_file_name())
}
