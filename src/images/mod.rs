//! Screenshot ingestion.
//!
//! Uploads are checked for an `image/*` media type and a 2 MiB size limit,
//! encoded as `data:` URIs, and appended to the context's image list, which
//! never holds more than [`MAX_IMAGES`] entries.
//!
//! When an upload batch would overflow the cap, images already in the list
//! are kept and the overflowing uploads are dropped in upload order. Every
//! dropped file is reported back in the [`IngestReport`] so callers can tell
//! the user which files did not make it.

use base64::Engine as _;
use std::path::Path;

use crate::errors::{CouncilError, CouncilResult};

/// Maximum number of images attached to one report.
pub const MAX_IMAGES: usize = 5;

/// Maximum size of one image before encoding.
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// A file offered for upload.
#[derive(Clone)]
pub struct ImageUpload {
    /// Name shown back to the user when the file is rejected.
    pub file_name: String,
    /// Declared media type, e.g. `image/png`.
    pub media_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Creates an upload from in-memory bytes.
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> CouncilResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CouncilError::validation(format!("Failed to read {}: {}", path.display(), e)))?;

        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(file_name, media_type, bytes))
    }

    /// Encodes the upload as a `data:<mime>;base64,<payload>` URI.
    pub fn to_data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.media_type, payload)
    }

    fn check(&self) -> Result<(), RejectReason> {
        let is_image = self
            .media_type
            .parse::<mime::Mime>()
            .map(|m| m.type_() == mime::IMAGE)
            .unwrap_or(false);

        if !is_image {
            return Err(RejectReason::UnsupportedType(self.media_type.clone()));
        }

        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(RejectReason::TooLarge {
                size: self.bytes.len(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Why an upload was not attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Media type is not `image/*`.
    UnsupportedType(String),
    /// File exceeds [`MAX_IMAGE_BYTES`].
    TooLarge {
        /// Actual size in bytes.
        size: usize,
    },
    /// The list already holds [`MAX_IMAGES`] images.
    CapacityReached,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnsupportedType(media_type) => {
                write!(f, "unsupported media type {}", media_type)
            }
            RejectReason::TooLarge { size } => {
                write!(f, "{} bytes exceeds the {} byte limit", size, MAX_IMAGE_BYTES)
            }
            RejectReason::CapacityReached => write!(f, "at most {} images are kept", MAX_IMAGES),
        }
    }
}

/// An upload that was not attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedImage {
    /// File name of the upload.
    pub file_name: String,
    /// Why it was rejected.
    pub reason: RejectReason,
}

/// Outcome of one [`ingest`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// File names that were attached, in order.
    pub accepted: Vec<String>,
    /// Uploads that were dropped, in upload order.
    pub rejected: Vec<RejectedImage>,
}

impl IngestReport {
    /// Returns true if every upload was attached.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Appends valid uploads to `images`, keeping at most [`MAX_IMAGES`] entries.
pub fn ingest<I>(images: &mut Vec<String>, uploads: I) -> IngestReport
where
    I: IntoIterator<Item = ImageUpload>,
{
    let mut report = IngestReport::default();

    for upload in uploads {
        let outcome = upload.check().and_then(|()| {
            if images.len() >= MAX_IMAGES {
                Err(RejectReason::CapacityReached)
            } else {
                Ok(())
            }
        });

        match outcome {
            Ok(()) => {
                images.push(upload.to_data_uri());
                report.accepted.push(upload.file_name);
            }
            Err(reason) => {
                tracing::warn!(file = %upload.file_name, %reason, "Image skipped");
                report.rejected.push(RejectedImage {
                    file_name: upload.file_name,
                    reason,
                });
            }
        }
    }

    report
}

/// Removes the image at `index`, returning it if it existed.
pub fn remove_image(images: &mut Vec<String>, index: usize) -> Option<String> {
    if index < images.len() {
        Some(images.remove(index))
    } else {
        None
    }
}

/// A `data:` URI split into its media type and base64 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    /// Media type, e.g. `image/png`.
    pub mime_type: &'a str,
    /// Base64 payload without the header.
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Parses `data:<mime>;base64,<payload>`.
    pub fn parse(uri: &'a str) -> CouncilResult<Self> {
        let malformed = || CouncilError::validation_field("Image is not a base64 data URI", "images");

        let rest = uri.strip_prefix("data:").ok_or_else(malformed)?;
        let (header, data) = rest.split_once(',').ok_or_else(malformed)?;
        let (mime_type, encoding) = header.split_once(';').ok_or_else(malformed)?;

        if encoding != "base64" || mime_type.is_empty() {
            return Err(malformed());
        }

        Ok(Self { mime_type, data })
    }

    /// Reassembles the URI.
    pub fn to_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
