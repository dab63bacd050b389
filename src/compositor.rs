//! Stitches captured tiles into one full-page image
//!
//! The canvas starts as semi-transparent red so any region never covered
//! by a tile is visually obvious in the output. Tiles are composited
//! deepest-first so the upper tile wins overlaps: the top rows of a
//! scrolled tile repeat any sticky header, and the seam must show the
//! upper tile's genuine content instead. Masks are painted as opaque
//! blocks, and an optional crop restricts the result to a single
//! element's bounding box.

use crate::{CaptureError, Tile};
use image::{imageops, Rgba, RgbaImage};
use serde::Deserialize;
use std::io::Cursor;

/// Fill for canvas regions no tile ever covered
const UNCOVERED_SENTINEL: Rgba<u8> = Rgba([255, 0, 0, 128]);

/// Fill for masked regions
const MASK_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// An element bounding box in page pixel coordinates, as reported by the
/// remote browser. Coordinates may be fractional under sub-pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Ceiling-rounded position and size.
    ///
    /// Rounding up guarantees the region fully covers the target element
    /// under sub-pixel layout, at the cost of possibly including a sliver
    /// of adjacent content.
    pub fn to_pixels(&self) -> (u32, u32, u32, u32) {
        (
            self.left.max(0.0).ceil() as u32,
            self.top.max(0.0).ceil() as u32,
            self.width.max(0.0).ceil() as u32,
            self.height.max(0.0).ceil() as u32,
        )
    }
}

/// Composite tiles, masks and an optional crop into an encoded PNG.
///
/// Returns the encoded bytes together with the final dimensions, which
/// equal the crop rectangle's when `only` is present and the full canvas
/// otherwise.
pub fn compose(
    width: u32,
    height: u32,
    tiles: &[Tile],
    masks: &[Rect],
    only: Option<Rect>,
) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    let mut canvas = RgbaImage::from_pixel(width, height, UNCOVERED_SENTINEL);

    // Deepest tile first; where tiles overlap, the upper tile's content
    // covers the sticky-header band repeated at the lower tile's top.
    for tile in tiles.iter().rev() {
        let decoded = image::load_from_memory(&tile.data)?.to_rgba8();
        // Exact pixel overwrite, clipped to the canvas; no alpha blending.
        imageops::replace(&mut canvas, &decoded, 0, i64::from(tile.offset));
    }

    for mask in masks {
        paint_mask(&mut canvas, mask);
    }

    let canvas = match only {
        Some(rect) => {
            let (x, y, w, h) = rect.to_pixels();
            imageops::crop_imm(&canvas, x, y, w, h).to_image()
        }
        None => canvas,
    };

    let (out_width, out_height) = canvas.dimensions();
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;

    Ok((bytes, out_width, out_height))
}

/// Overwrite a rectangle with the opaque mask color.
///
/// Fully replaces pixels rather than blending, so masking is idempotent.
fn paint_mask(canvas: &mut RgbaImage, rect: &Rect) {
    let (left, top, width, height) = rect.to_pixels();
    let (canvas_width, canvas_height) = canvas.dimensions();

    let right = left.saturating_add(width).min(canvas_width);
    let bottom = top.saturating_add(height).min(canvas_height);

    for y in top.min(canvas_height)..bottom {
        for x in left.min(canvas_width)..right {
            canvas.put_pixel(x, y, MASK_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_tile(width: u32, height: u32, offset: u32, color: [u8; 4]) -> Tile {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut data = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        Tile { offset, data }
    }

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    #[test]
    fn test_rect_rounds_up() {
        let rect = Rect {
            left: 10.2,
            top: 0.0,
            width: 99.01,
            height: 49.999,
        };
        assert_eq!(rect.to_pixels(), (11, 0, 100, 50));
    }

    #[test]
    fn test_rect_clamps_negative_coordinates() {
        let rect = Rect {
            left: -3.5,
            top: -0.1,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(rect.to_pixels(), (0, 0, 10, 10));
    }

    #[test]
    fn test_uncovered_region_keeps_sentinel() {
        let tiles = vec![solid_tile(4, 2, 0, [0, 255, 0, 255])];
        let (bytes, w, h) = compose(4, 4, &tiles, &[], None).unwrap();
        assert_eq!((w, h), (4, 4));

        let canvas = decode(&bytes);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*canvas.get_pixel(0, 3), UNCOVERED_SENTINEL);
    }

    #[test]
    fn test_upper_tile_wins_overlap() {
        let tiles = vec![
            solid_tile(2, 4, 0, [10, 10, 10, 255]),
            solid_tile(2, 4, 2, [200, 200, 200, 255]),
        ];
        let (bytes, _, _) = compose(2, 6, &tiles, &[], None).unwrap();
        let canvas = decode(&bytes);

        assert_eq!(*canvas.get_pixel(0, 1), Rgba([10, 10, 10, 255]));
        // Rows 2..4 are covered by both; the upper tile wins.
        assert_eq!(*canvas.get_pixel(0, 3), Rgba([10, 10, 10, 255]));
        assert_eq!(*canvas.get_pixel(0, 5), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_seam_shows_content_not_repeated_header() {
        // 10px tiles under a 2px sticky header: the second tile lands at
        // offset 8 and its top two rows repeat the header. The seam rows
        // must show the first tile's genuine content instead.
        let content = Rgba([40, 120, 200, 255]);
        let header = Rgba([250, 250, 0, 255]);
        let deeper = Rgba([90, 90, 90, 255]);

        let first = solid_tile(2, 10, 0, [40, 120, 200, 255]);
        let second_img =
            RgbaImage::from_fn(2, 10, |_, y| if y < 2 { header } else { deeper });
        let mut data = Vec::new();
        image::DynamicImage::ImageRgba8(second_img)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        let second = Tile { offset: 8, data };

        let (bytes, _, _) = compose(2, 18, &[first, second], &[], None).unwrap();
        let canvas = decode(&bytes);

        assert_eq!(*canvas.get_pixel(0, 8), content);
        assert_eq!(*canvas.get_pixel(0, 9), content);
        // Below the seam the deeper tile shows through untouched.
        assert_eq!(*canvas.get_pixel(0, 10), deeper);
        assert_eq!(*canvas.get_pixel(0, 17), deeper);
    }

    #[test]
    fn test_mask_is_idempotent() {
        let tiles = vec![solid_tile(8, 8, 0, [50, 60, 70, 255])];
        let mask = Rect {
            left: 1.0,
            top: 1.0,
            width: 3.0,
            height: 3.0,
        };

        let (once, _, _) = compose(8, 8, &tiles, &[mask], None).unwrap();
        let (twice, _, _) = compose(8, 8, &tiles, &[mask, mask], None).unwrap();
        assert_eq!(once, twice);

        let canvas = decode(&once);
        assert_eq!(*canvas.get_pixel(2, 2), MASK_COLOR);
        assert_eq!(*canvas.get_pixel(5, 5), Rgba([50, 60, 70, 255]));
    }

    #[test]
    fn test_mask_clipped_to_canvas() {
        let tiles = vec![solid_tile(4, 4, 0, [9, 9, 9, 255])];
        let mask = Rect {
            left: 2.0,
            top: 2.0,
            width: 100.0,
            height: 100.0,
        };
        let (bytes, _, _) = compose(4, 4, &tiles, &[mask], None).unwrap();
        let canvas = decode(&bytes);
        assert_eq!(*canvas.get_pixel(3, 3), MASK_COLOR);
        assert_eq!(*canvas.get_pixel(1, 1), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_crop_defines_output_dimensions() {
        let tiles = vec![solid_tile(100, 50, 0, [1, 2, 3, 255])];
        let only = Rect {
            left: 10.0,
            top: 5.0,
            width: 19.5,
            height: 9.2,
        };
        let (bytes, w, h) = compose(100, 2000, &tiles, &[], Some(only)).unwrap();
        // Ceiling-rounded crop size, regardless of full-page height.
        assert_eq!((w, h), (20, 10));

        let canvas = decode(&bytes);
        assert_eq!(canvas.dimensions(), (20, 10));
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_two_tile_page_shape() {
        // A 2000px page captured with a 1000px viewport: tiles at 0 and 1000.
        let tiles = vec![
            solid_tile(320, 1000, 0, [255, 255, 255, 255]),
            solid_tile(320, 1000, 1000, [255, 255, 255, 255]),
        ];
        let (bytes, w, h) = compose(320, 2000, &tiles, &[], None).unwrap();
        assert_eq!((w, h), (320, 2000));

        let canvas = decode(&bytes);
        // Full coverage: no sentinel pixels anywhere.
        assert!(canvas.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
        assert!(!bytes.is_empty());
    }
}
