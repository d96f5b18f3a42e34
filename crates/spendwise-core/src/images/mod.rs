//! Receipt image storage with pluggable backends
//!
//! - `ImageStore` trait defines the interface for storage backends
//! - `LocalImageStore` keeps images in a local directory and hands out
//!   `file://` URLs
//!
//! Image names follow `{user_id}/{YYYYmmddHHMMSS}_{uuid}.{ext}`.

use chrono::Utc;

use crate::error::Result;

mod local;

pub use local::LocalImageStore;

/// Storage backend for receipt images
pub trait ImageStore: Send + Sync {
    /// Human-readable name for this store
    fn name(&self) -> &str;

    /// Store image bytes under `name`, returning the image URL
    fn upload(&self, data: &[u8], name: &str) -> Result<String>;

    /// Delete an image by URL
    ///
    /// Returns false if the image didn't exist.
    fn delete(&self, url: &str) -> Result<bool>;

    /// Size in bytes of a stored image, None if it doesn't exist
    fn size(&self, url: &str) -> Result<Option<u64>>;
}

/// Generate a storage name for a user's upload
///
/// The extension comes from the original filename and defaults to `jpg`.
pub fn image_name(user_id: &str, filename: Option<&str>) -> String {
    let ext = filename
        .and_then(|f| f.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());

    let user = sanitize_segment(user_id);
    format!(
        "{}/{}_{}.{}",
        user,
        Utc::now().format("%Y%m%d%H%M%S"),
        uuid::Uuid::new_v4().simple(),
        ext
    )
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}
