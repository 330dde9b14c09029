//! Page geometry, fonts and colors. All lengths are PDF points.

use a11y_types::Impact;

/// Points per millimetre
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// ISO A4
pub const PAGE_WIDTH: f64 = 595.28;
pub const PAGE_HEIGHT: f64 = 841.89;
/// Half an inch on every side
pub const MARGIN: f64 = 36.0;
pub const WORK_WIDTH: f64 = PAGE_WIDTH - 2.0 * MARGIN;
/// Lowest y (from the top) a block may reach
pub const MAX_Y: f64 = PAGE_HEIGHT - MARGIN;

/// Added to the font size to get one line's advance
pub const LINE_SPACING: f64 = 12.0;
pub const INDENT: f64 = 12.0;

pub const FONT_SIZE_TITLE: f64 = 32.0;
pub const FONT_SIZE_LARGE: f64 = 20.0;
pub const FONT_SIZE_MEDIUM: f64 = 16.0;
pub const FONT_SIZE_SMALL: f64 = 12.0;

pub const HIGHLIGHT_MARGIN_BOTTOM: f64 = 1.5 * PT_PER_MM;
pub const HIGHLIGHT_MARGIN_LEFT: f64 = 1.0 * PT_PER_MM;
pub const HIGHLIGHT_MARGIN_RIGHT: f64 = 2.5 * PT_PER_MM;

/// Edge length of a node thumbnail (15 mm)
pub const THUMBNAIL_SIZE: f64 = 15.0 * PT_PER_MM;
/// Edge length of a legend color square (10 mm)
pub const LEGEND_SQUARE: f64 = 10.0 * PT_PER_MM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];

    /// Resource name used in content streams
    pub fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }

    /// Standard 14 base font
    pub fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Oblique => "Helvetica-Oblique",
        }
    }
}

/// RGB color with 0-255 channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BLACK: Color = Color(0x00, 0x00, 0x00);
    pub const WHITE: Color = Color(0xff, 0xff, 0xff);
    pub const LIGHT_GREY: Color = Color(0xe3, 0xe3, 0xe3);
    pub const MINOR: Color = Color(0x45, 0xff, 0xd4);
    pub const MODERATE: Color = Color(0xc1, 0xff, 0x45);
    pub const SERIOUS: Color = Color(0xff, 0x99, 0x45);
    pub const CRITICAL: Color = Color(0xff, 0x45, 0x45);

    /// Channels scaled to the 0.0-1.0 range used by `rg`
    pub fn components(self) -> [f64; 3] {
        [
            f64::from(self.0) / 255.0,
            f64::from(self.1) / 255.0,
            f64::from(self.2) / 255.0,
        ]
    }
}

/// Highlight color for an impact level. Unspecified impact gets the neutral grey.
pub fn impact_color(impact: Impact) -> Color {
    match impact {
        Impact::Minor => Color::MINOR,
        Impact::Moderate => Color::MODERATE,
        Impact::Serious => Color::SERIOUS,
        Impact::Critical => Color::CRITICAL,
        Impact::Unspecified => Color::LIGHT_GREY,
    }
}
