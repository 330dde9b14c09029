//! Cursor-based page layout
//!
//! Coordinates are points measured from the top-left corner of the page; the
//! renderer flips them into PDF space. Content flows down from the top margin.
//! Before a block is emitted its full height is known, and if it would cross
//! the bottom margin the whole block moves to a fresh page. Blocks are never
//! split.

use crate::metrics::{longest_line, wrap_text};
use crate::style::{
    Color, Font, FONT_SIZE_SMALL, HIGHLIGHT_MARGIN_BOTTOM, HIGHLIGHT_MARGIN_LEFT,
    HIGHLIGHT_MARGIN_RIGHT, LINE_SPACING, MARGIN, MAX_Y, THUMBNAIL_SIZE, WORK_WIDTH,
};

/// Something drawn on a page
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// One line of text; `baseline` is the y of the text baseline
    Text {
        x: f64,
        baseline: f64,
        font: Font,
        size: f64,
        color: Color,
        text: String,
    },
    Fill {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    Image {
        image: ImageId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Clickable area opening `uri`
    Link {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        uri: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub elements: Vec<Element>,
}

impl Page {
    /// Text lines on this page, in drawing order
    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Index of an embedded raster image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub usize);

/// Decoded RGB pixels ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RasterImage {
    /// Decode a PNG, dropping any alpha channel
    pub fn from_png(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgb8();
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            rgb: decoded.into_raw(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
}

/// How a text block is set
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: Font,
    pub size: f64,
    pub color: Color,
    /// Offset from the left margin
    pub indent: f64,
    /// Background drawn behind the block
    pub highlight: Option<Color>,
    /// Makes the block a clickable link
    pub link: Option<String>,
}

impl TextStyle {
    pub fn new(font: Font, size: f64) -> Self {
        Self {
            font,
            size,
            color: Color::BLACK,
            indent: 0.0,
            highlight: None,
            link: None,
        }
    }

    pub fn indent(mut self, indent: f64) -> Self {
        self.indent = indent;
        self
    }

    pub fn highlight(mut self, color: Color) -> Self {
        self.highlight = Some(color);
        self
    }

    pub fn link(mut self, uri: impl Into<String>) -> Self {
        self.link = Some(uri.into());
        self
    }

    /// Vertical advance of one line
    pub fn line_height(&self) -> f64 {
        self.size + LINE_SPACING
    }
}

/// Where a block ended up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Zero-based page index
    pub page: usize,
    pub top: f64,
    pub height: f64,
    pub lines: usize,
}

/// A document under construction
#[derive(Debug, Clone)]
pub struct PageLayout {
    pages: Vec<Page>,
    images: Vec<RasterImage>,
    cursor: f64,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLayout {
    /// Start with one empty page and the cursor at the top margin
    pub fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            images: Vec::new(),
            cursor: MARGIN,
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn images(&self) -> &[RasterImage] {
        &self.images
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn current_page(&self) -> usize {
        self.pages.len() - 1
    }

    /// Begin a new page and reset the cursor
    pub fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = MARGIN;
    }

    /// Move the cursor to an absolute position on the current page
    pub fn move_to(&mut self, y: f64) {
        self.cursor = y;
    }

    /// Advance by `multiplier` small-text lines, breaking the page when the
    /// cursor passes the bottom margin
    pub fn new_line(&mut self, multiplier: f64) {
        self.cursor += (FONT_SIZE_SMALL + LINE_SPACING) * multiplier;
        if self.cursor > MAX_Y {
            self.new_page();
        }
    }

    pub fn add_image(&mut self, image: RasterImage) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() - 1)
    }

    /// Wrap `text` to the width left of the indent and emit it as one block
    pub fn text_block(&mut self, text: &str, style: &TextStyle) -> Placement {
        let lines = wrap_text(text, style.font, style.size, WORK_WIDTH - style.indent);
        let height = style.line_height() * lines.len() as f64;
        self.ensure_room(height);
        self.emit_lines(&lines, style, height)
    }

    /// Emit a text block with a thumbnail to its left, at `image_indent`.
    ///
    /// The pair is one block: its height covers both the text and the image,
    /// and the cursor ends below whichever is taller.
    pub fn text_with_thumbnail(
        &mut self,
        text: &str,
        style: &TextStyle,
        thumbnail: Option<ImageId>,
        image_indent: f64,
    ) -> Placement {
        let lines = wrap_text(text, style.font, style.size, WORK_WIDTH - style.indent);
        let text_height = style.line_height() * lines.len() as f64;
        let height = match thumbnail {
            Some(_) => text_height.max(THUMBNAIL_SIZE + LINE_SPACING / 2.0),
            None => text_height,
        };
        self.ensure_room(height);

        if let Some(image) = thumbnail {
            let top = self.cursor;
            self.push(Element::Image {
                image,
                x: MARGIN + image_indent,
                y: top,
                width: THUMBNAIL_SIZE,
                height: THUMBNAIL_SIZE,
            });
        }
        self.emit_lines(&lines, style, height)
    }

    /// Single line at an absolute baseline. The cursor does not move.
    pub fn text_at(&mut self, text: &str, x: f64, baseline: f64, align: Align, style: &TextStyle) {
        let x = match align {
            Align::Left => x,
            Align::Center => x - crate::metrics::text_width(text, style.font, style.size) / 2.0,
        };
        self.push(Element::Text {
            x,
            baseline,
            font: style.font,
            size: style.size,
            color: style.color,
            text: text.to_string(),
        });
    }

    /// Filled rectangle at an absolute position. The cursor does not move.
    pub fn fill_at(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.push(Element::Fill {
            x,
            y,
            width,
            height,
            color,
        });
    }

    /// Break once per block, and only when the page already holds something
    /// above the cursor
    fn ensure_room(&mut self, height: f64) {
        if self.cursor + height > MAX_Y && self.cursor > MARGIN {
            self.new_page();
        }
    }

    fn emit_lines(&mut self, lines: &[String], style: &TextStyle, height: f64) -> Placement {
        let top = self.cursor;
        let x = MARGIN + style.indent;
        let count = lines.len() as f64;
        let widest = longest_line(lines, style.font, style.size);

        if let Some(color) = style.highlight {
            self.push(Element::Fill {
                x: x - HIGHLIGHT_MARGIN_LEFT,
                y: top,
                width: widest + HIGHLIGHT_MARGIN_RIGHT,
                height: style.size * count + LINE_SPACING * (count - 1.0) + HIGHLIGHT_MARGIN_BOTTOM,
                color,
            });
        }

        let mut line_top = top;
        for line in lines {
            self.push(Element::Text {
                x,
                baseline: line_top + style.size,
                font: style.font,
                size: style.size,
                color: style.color,
                text: line.clone(),
            });
            line_top += style.line_height();
        }

        if let Some(uri) = &style.link {
            self.push(Element::Link {
                x,
                y: top,
                width: widest,
                height: style.line_height() * count - LINE_SPACING,
                uri: uri.clone(),
            });
        }

        self.cursor = top + height;
        Placement {
            page: self.current_page(),
            top,
            height,
            lines: lines.len(),
        }
    }

    fn push(&mut self, element: Element) {
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{FONT_SIZE_MEDIUM, PAGE_HEIGHT};
    use proptest::prelude::*;

    fn small() -> TextStyle {
        TextStyle::new(Font::Regular, FONT_SIZE_SMALL)
    }

    #[test]
    fn test_block_height_is_line_height_times_lines() {
        let mut layout = PageLayout::new();
        let placement = layout.text_block("one\ntwo\nthree", &small());
        assert_eq!(placement.lines, 3);
        assert_eq!(placement.top, MARGIN);
        assert_eq!(placement.height, 3.0 * (FONT_SIZE_SMALL + LINE_SPACING));
        assert_eq!(layout.cursor(), MARGIN + placement.height);
    }

    #[test]
    fn test_overflowing_block_moves_whole_to_next_page() {
        let mut layout = PageLayout::new();
        // 3 lines need 72pt; leave 50pt
        layout.move_to(MAX_Y - 50.0);
        let placement = layout.text_block("a\nb\nc", &small());

        assert_eq!(placement.page, 1);
        assert_eq!(placement.top, MARGIN);
        assert_eq!(layout.pages().len(), 2);
        assert_eq!(layout.pages()[0].elements.len(), 0);
        assert_eq!(layout.pages()[1].text_lines().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_block_that_fits_stays_on_page() {
        let mut layout = PageLayout::new();
        layout.move_to(MAX_Y - 30.0);
        let placement = layout.text_block("fits", &small());
        assert_eq!(placement.page, 0);
    }

    #[test]
    fn test_oversized_block_at_top_does_not_leave_blank_page() {
        let mut layout = PageLayout::new();
        let tall = vec!["line"; 40].join("\n");
        let placement = layout.text_block(&tall, &small());
        assert_eq!(placement.page, 0);
        assert_eq!(placement.top, MARGIN);
    }

    #[test]
    fn test_highlight_is_drawn_before_text() {
        let mut layout = PageLayout::new();
        layout.text_block("note", &small().highlight(Color::LIGHT_GREY));
        let elements = &layout.pages()[0].elements;
        match (&elements[0], &elements[1]) {
            (Element::Fill { x, y, height, color, .. }, Element::Text { .. }) => {
                assert_eq!(*color, Color::LIGHT_GREY);
                assert_eq!(*y, MARGIN);
                assert!((*x - (MARGIN - HIGHLIGHT_MARGIN_LEFT)).abs() < 1e-9);
                assert!((*height - (FONT_SIZE_SMALL + HIGHLIGHT_MARGIN_BOTTOM)).abs() < 1e-9);
            }
            other => panic!("unexpected order: {:?}", other),
        }
    }

    #[test]
    fn test_thumbnail_reserves_its_height() {
        let mut layout = PageLayout::new();
        let id = layout.add_image(RasterImage {
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
        });
        let style = small().indent(144.0);
        let placement = layout.text_with_thumbnail("<a>", &style, Some(id), 48.0);
        assert!(placement.height >= THUMBNAIL_SIZE);
        assert!(layout.cursor() >= MARGIN + THUMBNAIL_SIZE);
        assert!(matches!(layout.pages()[0].elements[0], Element::Image { .. }));

        let without = layout.text_with_thumbnail("<a>", &style, None, 48.0);
        assert_eq!(without.height, FONT_SIZE_SMALL + LINE_SPACING);
    }

    #[test]
    fn test_new_line_breaks_past_bottom() {
        let mut layout = PageLayout::new();
        layout.move_to(MAX_Y - 1.0);
        layout.new_line(1.0);
        assert_eq!(layout.current_page(), 1);
        assert_eq!(layout.cursor(), MARGIN);
    }

    proptest! {
        #[test]
        fn blocks_never_cross_bottom_margin(
            blocks in proptest::collection::vec((1usize..12, prop::bool::ANY), 1..80)
        ) {
            let mut layout = PageLayout::new();
            for (lines, medium) in blocks {
                let size = if medium { FONT_SIZE_MEDIUM } else { FONT_SIZE_SMALL };
                let style = TextStyle::new(Font::Regular, size);
                let text = vec!["word"; lines].join("\n");
                let before = layout.current_page();
                let placement = layout.text_block(&text, &style);

                prop_assert_eq!(placement.lines, lines);
                prop_assert!(placement.top >= MARGIN);
                prop_assert!(placement.top + placement.height <= MAX_Y);
                if placement.page != before {
                    prop_assert_eq!(placement.top, MARGIN);
                }
                // every line of the block is on the same page
                let page = &layout.pages()[placement.page];
                prop_assert!(page.text_lines().count() >= lines);
            }
            prop_assert!(layout.pages().iter().all(|p| !p.elements.is_empty()));
            prop_assert!(MAX_Y < PAGE_HEIGHT);
        }
    }
}
