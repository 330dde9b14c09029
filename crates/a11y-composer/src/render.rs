//! PDF serialization of a [`PageLayout`]
//!
//! Text uses the standard Helvetica faces with WinAnsi encoding, so no fonts
//! are embedded. Thumbnails are embedded as Flate-compressed RGB image
//! XObjects and reference links become URI link annotations.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};
use std::io::Write;

use crate::error::ComposeError;
use crate::layout::{Element, ImageId, Page, PageLayout, RasterImage};
use crate::metrics::encode_win_ansi;
use crate::style::{Color, Font, PAGE_HEIGHT, PAGE_WIDTH};

/// Serialize the laid-out pages into a complete PDF file
pub fn render_pdf(layout: &PageLayout, title: &str) -> Result<Vec<u8>, ComposeError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(font.base_font().as_bytes().to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]));
        fonts.set(font.resource_name(), Object::Reference(font_id));
    }

    let mut xobjects = Dictionary::new();
    for (i, image) in layout.images().iter().enumerate() {
        let image_id = doc.add_object(image_xobject(image)?);
        xobjects.set(image_name(ImageId(i)), Object::Reference(image_id));
    }

    let resources_id = doc.add_object(Dictionary::from_iter(vec![
        ("Font", Object::Dictionary(fonts)),
        ("XObject", Object::Dictionary(xobjects)),
    ]));

    let mut kids = Vec::with_capacity(layout.pages().len());
    for page in layout.pages() {
        let content = page_content(page);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

        let mut page_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_WIDTH as f32),
                    Object::Real(PAGE_HEIGHT as f32),
                ]),
            ),
            ("Resources", Object::Reference(resources_id)),
            ("Contents", Object::Reference(content_id)),
        ]);

        let annots = link_annotations(&mut doc, page);
        if !annots.is_empty() {
            page_dict.set("Annots", Object::Array(annots));
        }
        kids.push(Object::Reference(doc.add_object(page_dict)));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    let info_id = doc.add_object(Dictionary::from_iter(vec![
        ("Title", Object::String(encode_win_ansi(title), StringFormat::Literal)),
        (
            "Producer",
            Object::String(b"a11y-composer".to_vec(), StringFormat::Literal),
        ),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

fn image_name(id: ImageId) -> String {
    format!("Im{}", id.0)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn set_fill(operations: &mut Vec<Operation>, color: Color) {
    let [r, g, b] = color.components();
    operations.push(Operation::new("rg", vec![real(r), real(g), real(b)]));
}

/// Content stream for one page. Layout y runs downwards; PDF y runs upwards.
fn page_content(page: &Page) -> Content {
    let mut operations = Vec::new();

    for element in &page.elements {
        match element {
            Element::Fill {
                x,
                y,
                width,
                height,
                color,
            } => {
                operations.push(Operation::new("q", vec![]));
                set_fill(&mut operations, *color);
                operations.push(Operation::new(
                    "re",
                    vec![real(*x), real(PAGE_HEIGHT - y - height), real(*width), real(*height)],
                ));
                operations.push(Operation::new("f", vec![]));
                operations.push(Operation::new("Q", vec![]));
            }
            Element::Text {
                x,
                baseline,
                font,
                size,
                color,
                text,
            } => {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![
                        Object::Name(font.resource_name().as_bytes().to_vec()),
                        real(*size),
                    ],
                ));
                set_fill(&mut operations, *color);
                operations.push(Operation::new("Td", vec![real(*x), real(PAGE_HEIGHT - baseline)]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            Element::Image {
                image,
                x,
                y,
                width,
                height,
            } => {
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        real(*width),
                        Object::Integer(0),
                        Object::Integer(0),
                        real(*height),
                        real(*x),
                        real(PAGE_HEIGHT - y - height),
                    ],
                ));
                operations.push(Operation::new(
                    "Do",
                    vec![Object::Name(image_name(*image).into_bytes())],
                ));
                operations.push(Operation::new("Q", vec![]));
            }
            Element::Link { .. } => {}
        }
    }

    Content { operations }
}

fn link_annotations(doc: &mut Document, page: &Page) -> Vec<Object> {
    page.elements
        .iter()
        .filter_map(|element| match element {
            Element::Link {
                x,
                y,
                width,
                height,
                uri,
            } => Some((*x, *y, *width, *height, uri)),
            _ => None,
        })
        .map(|(x, y, width, height, uri)| {
            let mut action = Dictionary::new();
            action.set("S", Object::Name(b"URI".to_vec()));
            action.set(
                "URI",
                Object::String(uri.as_bytes().to_vec(), StringFormat::Literal),
            );

            let mut annot = Dictionary::new();
            annot.set("Type", Object::Name(b"Annot".to_vec()));
            annot.set("Subtype", Object::Name(b"Link".to_vec()));
            annot.set(
                "Rect",
                Object::Array(vec![
                    real(x),
                    real(PAGE_HEIGHT - y - height),
                    real(x + width),
                    real(PAGE_HEIGHT - y),
                ]),
            );
            annot.set(
                "Border",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(0),
                ]),
            );
            annot.set("A", Object::Dictionary(action));
            Object::Reference(doc.add_object(Object::Dictionary(annot)))
        })
        .collect()
}

fn image_xobject(image: &RasterImage) -> Result<Stream, ComposeError> {
    validate_image(image)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&image.rgb)?;
    let data = encoder.finish()?;

    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(image.width))),
        ("Height", Object::Integer(i64::from(image.height))),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"FlateDecode".to_vec())),
    ]);
    // already compressed; keep Document::compress from touching it
    Ok(Stream::new(dict, data).with_compression(false))
}

/// Check that an image record holds exactly `width * height` RGB pixels
fn validate_image(image: &RasterImage) -> Result<(), ComposeError> {
    let expected = u64::from(image.width) * u64::from(image.height) * 3;
    if image.rgb.len() as u64 != expected {
        return Err(ComposeError::Image(format!(
            "expected {} bytes of RGB data for {}x{}, got {}",
            expected,
            image.width,
            image.height,
            image.rgb.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextStyle;
    use crate::style::FONT_SIZE_SMALL;

    fn sample_layout() -> PageLayout {
        let mut layout = PageLayout::new();
        let style = TextStyle::new(Font::Bold, FONT_SIZE_SMALL)
            .highlight(Color::CRITICAL)
            .link("https://example.com/rule");
        layout.text_block("Read more (rule)", &style);
        let id = layout.add_image(RasterImage {
            width: 2,
            height: 1,
            rgb: vec![255, 0, 0, 0, 0, 255],
        });
        layout.new_page();
        layout.text_with_thumbnail("<img>", &TextStyle::new(Font::Oblique, 12.0), Some(id), 48.0);
        layout
    }

    #[test]
    fn test_rendered_pdf_loads_with_expected_pages() {
        let bytes = render_pdf(&sample_layout(), "Report").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_link_annotation_on_first_page() {
        let bytes = render_pdf(&sample_layout(), "Report").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();

        let first: lopdf::ObjectId = pages[&1];
        let page = doc.get_dictionary(first).unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);

        let second = doc.get_dictionary(pages[&2]).unwrap();
        assert!(second.get(b"Annots").is_err());
    }

    #[test]
    fn test_page_text_survives_round_trip() {
        let bytes = render_pdf(&sample_layout(), "Report").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let first = doc.get_pages()[&1];
        let content = doc.get_and_decode_page_content(first).unwrap();

        let shown: Vec<Vec<u8>> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands[0].as_str().ok().map(<[u8]>::to_vec))
            .collect();
        assert_eq!(shown, vec![b"Read more (rule)".to_vec()]);
    }

    #[test]
    fn test_content_flips_y_axis() {
        let mut layout = PageLayout::new();
        layout.fill_at(10.0, 20.0, 30.0, 40.0, Color::BLACK);
        let content = page_content(&layout.pages()[0]);
        let re = content
            .operations
            .iter()
            .find(|op| op.operator == "re")
            .unwrap();
        let bottom = re.operands[1].as_float().unwrap();
        assert!((f64::from(bottom) - (PAGE_HEIGHT - 60.0)).abs() < 0.01);
    }

    #[test]
    fn test_validate_image_checks_buffer_size() {
        let ok = RasterImage {
            width: 2,
            height: 2,
            rgb: vec![0; 12],
        };
        assert!(validate_image(&ok).is_ok());
        let short = RasterImage { rgb: vec![0; 5], ..ok };
        assert!(matches!(validate_image(&short), Err(ComposeError::Image(_))));
    }
}
