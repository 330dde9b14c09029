//! Raster operations used to annotate screenshots

use image::{imageops, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use a11y_types::{BoundingRect, PixelRect};

use super::geometry::{clamp_rect, crop_region};
use crate::error::EvidenceError;

/// Alpha of the white veil laid over the screenshot (20%)
pub const MUTE_ALPHA: u8 = 51;
/// Border thickness drawn around the element, in pixels
pub const BORDER_WIDTH: u32 = 2;
pub const BORDER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Images derived from one screen/element screenshot pair
#[derive(Debug)]
pub struct Annotated {
    pub overlay: RgbaImage,
    /// Element rectangle after clamping to the screen image
    pub element: PixelRect,
    /// Crop region and pixels; `None` when the region has no area. The region
    /// is anchored at `element` and sized from the element screenshot.
    pub crop: Option<(PixelRect, RgbaImage)>,
}

/// Run the full annotation pipeline on PNG-encoded screenshots
pub fn annotate(
    screen_png: &[u8],
    element_png: &[u8],
    rect: &BoundingRect,
) -> Result<Annotated, EvidenceError> {
    let screen = decode_png(screen_png)?;
    let element_image = decode_png(element_png)?;

    let element = clamp_rect(rect, screen.width(), screen.height());
    let overlay = composite(&mute(&screen), &add_border(&element_image), &element);

    // the element screenshot's own size can differ from the rounded rect
    let captured = PixelRect {
        width: element_image.width(),
        height: element_image.height(),
        ..element
    };
    let crop = crop_region(&captured, overlay.width(), overlay.height())
        .map(|region| (region, crop(&overlay, &region)));

    Ok(Annotated {
        overlay,
        element,
        crop,
    })
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, EvidenceError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EvidenceError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Composite a 20%-alpha white layer over the whole image
pub fn mute(base: &RgbaImage) -> RgbaImage {
    let mut muted = base.clone();
    let veil = RgbaImage::from_pixel(base.width(), base.height(), Rgba([255, 255, 255, MUTE_ALPHA]));
    imageops::overlay(&mut muted, &veil, 0, 0);
    muted
}

/// Draw a solid [`BORDER_WIDTH`] border along all four edges
pub fn add_border(element: &RgbaImage) -> RgbaImage {
    let mut bordered = element.clone();
    let (width, height) = bordered.dimensions();
    for (x, y, pixel) in bordered.enumerate_pixels_mut() {
        let on_edge = x < BORDER_WIDTH
            || y < BORDER_WIDTH
            || x >= width.saturating_sub(BORDER_WIDTH)
            || y >= height.saturating_sub(BORDER_WIDTH);
        if on_edge {
            *pixel = BORDER_COLOR;
        }
    }
    bordered
}

/// Place `element` on top of `base` with its top-left corner at the rect origin
pub fn composite(base: &RgbaImage, element: &RgbaImage, at: &PixelRect) -> RgbaImage {
    let mut out = base.clone();
    imageops::overlay(&mut out, element, i64::from(at.x), i64::from(at.y));
    out
}

/// Copy out a region. The region must already be clamped to the image.
pub fn crop(image: &RgbaImage, region: &PixelRect) -> RgbaImage {
    imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}
