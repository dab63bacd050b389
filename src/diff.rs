//! Pixel-exact visual diff between two captured images
//!
//! This is an exact, not perceptual, comparison: any single-channel
//! delta of 1 marks the pixel as changed. Alpha is ignored when
//! comparing and forced opaque in the output.

use crate::{BlobStore, CaptureError};
use image::RgbaImage;
use std::io::Cursor;

/// Output color for pixels that differ
const DIFF_SENTINEL: [u8; 4] = [255, 0, 255, 255];

const CHANNELS: usize = 4;

/// Compare two RGBA buffers pixel by pixel.
///
/// The output buffer has the first buffer's length; matching pixels copy
/// the first buffer's color with full opacity, differing pixels become
/// magenta. When the buffers have unequal lengths the comparison covers
/// only the shorter extent; the remainder is left transparent black
/// rather than flagged.
pub fn diff_raw(new_raw: &[u8], old_raw: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; new_raw.len()];
    let extent = new_raw.len().min(old_raw.len());

    let mut i = 0;
    while i + CHANNELS <= extent {
        let matches = new_raw[i] == old_raw[i]
            && new_raw[i + 1] == old_raw[i + 1]
            && new_raw[i + 2] == old_raw[i + 2];

        if matches {
            out[i] = new_raw[i];
            out[i + 1] = new_raw[i + 1];
            out[i + 2] = new_raw[i + 2];
        } else {
            out[i] = DIFF_SENTINEL[0];
            out[i + 1] = DIFF_SENTINEL[1];
            out[i + 2] = DIFF_SENTINEL[2];
        }
        out[i + 3] = 255;

        i += CHANNELS;
    }

    out
}

/// Diff two encoded images, producing an encoded PNG sized like the first.
pub fn diff_encoded(new_bytes: &[u8], old_bytes: &[u8]) -> Result<Vec<u8>, CaptureError> {
    let new_image = image::load_from_memory(new_bytes)?.to_rgba8();
    let old_image = image::load_from_memory(old_bytes)?.to_rgba8();
    let (width, height) = new_image.dimensions();

    let raw = diff_raw(new_image.as_raw(), old_image.as_raw());
    let diff = RgbaImage::from_raw(width, height, raw).ok_or_else(|| {
        CaptureError::Image("diff buffer does not match image dimensions".to_string())
    })?;

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(diff)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Reporting-path entry point: fetch both images by digest and diff them.
pub async fn diff_by_digest(
    store: &dyn BlobStore,
    new_digest: &str,
    old_digest: &str,
) -> Result<Vec<u8>, CaptureError> {
    let new_bytes = store.get(new_digest).await?;
    let old_bytes = store.get(old_digest).await?;
    diff_encoded(&new_bytes, &old_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;
    use image::Rgba;

    fn encode(img: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_diff_of_identical_image_is_the_image() {
        let img = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let bytes = encode(&img);

        let diff = diff_encoded(&bytes, &bytes).unwrap();
        let decoded = image::load_from_memory(&diff).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_single_channel_delta_of_one_is_flagged() {
        let base = RgbaImage::from_pixel(3, 3, Rgba([100, 100, 100, 255]));
        let mut changed = base.clone();
        changed.put_pixel(1, 2, Rgba([100, 101, 100, 255]));

        let diff = diff_encoded(&encode(&changed), &encode(&base)).unwrap();
        let decoded = image::load_from_memory(&diff).unwrap().to_rgba8();

        assert_eq!(*decoded.get_pixel(1, 2), Rgba(DIFF_SENTINEL));
        let flagged = decoded
            .pixels()
            .filter(|p| **p == Rgba(DIFF_SENTINEL))
            .count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn test_alpha_difference_is_ignored() {
        let a = RgbaImage::from_pixel(2, 2, Rgba([5, 6, 7, 255]));
        let b = RgbaImage::from_pixel(2, 2, Rgba([5, 6, 7, 9]));

        let diff = diff_encoded(&encode(&a), &encode(&b)).unwrap();
        let decoded = image::load_from_memory(&diff).unwrap().to_rgba8();
        assert!(decoded.pixels().all(|p| *p == Rgba([5, 6, 7, 255])));
    }

    #[test]
    fn test_mismatched_lengths_compare_over_shorter_extent() {
        // 2 pixels vs 1 pixel: the second output pixel stays transparent black.
        let new_raw = [10, 20, 30, 255, 40, 50, 60, 255];
        let old_raw = [10, 20, 30, 255];

        let out = diff_raw(&new_raw, &old_raw);
        assert_eq!(&out[..4], &[10, 20, 30, 255]);
        assert_eq!(&out[4..], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_diff_by_digest_fetches_from_store() {
        let store = MemoryBlobStore::new();
        let a = encode(&RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255])));
        let b = encode(&RgbaImage::from_pixel(2, 2, Rgba([2, 2, 2, 255])));
        store.put("new", &a, "image/png").await.unwrap();
        store.put("old", &b, "image/png").await.unwrap();

        let diff = diff_by_digest(&store, "new", "old").await.unwrap();
        let decoded = image::load_from_memory(&diff).unwrap().to_rgba8();
        assert!(decoded.pixels().all(|p| *p == Rgba(DIFF_SENTINEL)));

        let missing = diff_by_digest(&store, "new", "gone").await.unwrap_err();
        assert!(matches!(missing, CaptureError::BlobNotFound(_)));
    }
}
