//! Content addressing for captured images
//!
//! The digest is the image's sole identity: equal bytes mean equal
//! scenes, so it doubles as the storage key and as the "did this scene
//! change" equality test against a truth run.

use crate::{BlobStore, CaptureError, CapturedImage};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// SHA-256 of the encoded bytes as 64 lowercase hex characters.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Upload an image unless an object with its digest already exists.
///
/// Returns whether an upload happened. The exists/put sequence is not
/// atomic across concurrent identical captures; duplicate uploads of
/// identical bytes under the same key are a harmless race.
pub async fn store_if_new(
    store: &dyn BlobStore,
    image: &CapturedImage,
) -> Result<bool, CaptureError> {
    if store.exists(&image.digest).await? {
        debug!("Image {} already stored, skipping upload", image.digest);
        return Ok(false);
    }

    store
        .put(&image.digest, &image.bytes, IMAGE_CONTENT_TYPE)
        .await?;
    debug!("Stored image {} ({} bytes)", image.digest, image.bytes.len());
    Ok(true)
}
