//! Pixel geometry for overlays and crops
//!
//! All rounding is ceiling rounding. Rectangles returned from here always lie
//! inside the image they were clamped against.

use a11y_types::{BoundingRect, PixelRect};

/// Fixed margin kept around the element when cropping
pub const CROP_MARGIN: u32 = 25;

/// Convert a viewport rectangle into image pixels.
///
/// `x`/`y` are rounded up and clamped into `[0, image width/height]`; width
/// and height are rounded up and never negative.
pub fn clamp_rect(rect: &BoundingRect, image_width: u32, image_height: u32) -> PixelRect {
    PixelRect {
        x: ceil_clamped(rect.x, image_width),
        y: ceil_clamped(rect.y, image_height),
        width: ceil_clamped(rect.width, u32::MAX),
        height: ceil_clamped(rect.height, u32::MAX),
    }
}

/// Square-ish region around `element` with [`CROP_MARGIN`] on the short side's
/// axis, clamped to the image.
///
/// For a tall element (`width < height`) the height gets the fixed margin and
/// the width is padded until the crop is square; a wide element mirrors this.
/// Returns `None` when the clamped crop has no area.
pub fn crop_region(element: &PixelRect, image_width: u32, image_height: u32) -> Option<PixelRect> {
    let margin = i64::from(CROP_MARGIN);
    let x = i64::from(element.x);
    let y = i64::from(element.y);
    let width = i64::from(element.width);
    let height = i64::from(element.height);

    let (crop_x, crop_y, mut crop_width, mut crop_height) = if width < height {
        let crop_height = height + 2 * margin;
        let side_margin = div_ceil(crop_height - width, 2);
        let crop_width = width + 2 * side_margin;
        ((x - side_margin).max(0), (y - margin).max(0), crop_width, crop_height)
    } else {
        let crop_width = width + 2 * margin;
        let side_margin = div_ceil(crop_width - height, 2);
        let crop_height = height + 2 * side_margin;
        ((x - margin).max(0), (y - side_margin).max(0), crop_width, crop_height)
    };

    let max_width = i64::from(image_width);
    let max_height = i64::from(image_height);
    if crop_x + crop_width > max_width {
        crop_width = max_width - crop_x;
    }
    if crop_y + crop_height > max_height {
        crop_height = max_height - crop_y;
    }

    if crop_width <= 0 || crop_height <= 0 {
        return None;
    }

    // crop_x <= element.x <= image_width, so every value fits in u32 here
    Some(PixelRect {
        x: u32::try_from(crop_x).ok()?,
        y: u32::try_from(crop_y).ok()?,
        width: u32::try_from(crop_width).ok()?,
        height: u32::try_from(crop_height).ok()?,
    })
}

fn ceil_clamped(value: f64, max: u32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let ceiled = value.ceil();
    if ceiled >= f64::from(max) {
        max
    } else {
        ceiled as u32
    }
}

fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1).div_euclid(denominator)
}
