//! Helvetica metrics and line wrapping
//!
//! Widths are the Adobe AFM advance widths (1/1000 em) for the printable ASCII
//! range. The oblique face shares the regular widths.

use crate::style::Font;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // 'p'..'~'
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Width used for Latin-1 letters outside the table
const FALLBACK_WIDTH: u16 = 556;

/// Encode text for a WinAnsi simple font.
///
/// Latin-1 maps one-to-one, tabs become spaces, anything else becomes `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match c as u32 {
        0x09 => b' ',
        code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
        _ => b'?',
    }
}

fn glyph_width(byte: u8, font: Font) -> u16 {
    let table = match font {
        Font::Bold => &HELVETICA_BOLD,
        Font::Regular | Font::Oblique => &HELVETICA,
    };
    match byte {
        0x20..=0x7e => table[usize::from(byte - 0x20)],
        _ => FALLBACK_WIDTH,
    }
}

/// Rendered width of `text` in points
pub fn text_width(text: &str, font: Font, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| u32::from(glyph_width(win_ansi_byte(c), font)))
        .sum();
    f64::from(units) * size / 1000.0
}

/// Greedy word wrap to `max_width` points.
///
/// Explicit newlines start a new line, runs of whitespace collapse to one
/// space, and words wider than a full line are broken between characters.
/// Always returns at least one (possibly empty) line.
pub fn wrap_text(text: &str, font: Font, size: f64, max_width: f64) -> Vec<String> {
    let fits = |candidate: &str| text_width(candidate, font, size) <= max_width;
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if fits(&candidate) {
                line = candidate;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if fits(word) {
                line.push_str(word);
                continue;
            }
            for c in word.chars() {
                line.push(c);
                if !fits(&line) && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        lines.push(line);
    }
    lines
}

/// Width of the widest line
pub fn longest_line(lines: &[String], font: Font, size: f64) -> f64 {
    lines
        .iter()
        .map(|line| text_width(line, font, size))
        .fold(0.0, f64::max)
}
