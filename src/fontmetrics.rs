//! Base-14 font metrics service (spec §6 "Font metrics" contract).
//!
//! Widths are standard Adobe AFM core-font widths, in 1/1000 em, covering the
//! printable ASCII range (0x20..=0x7E). This is a fixed lookup table, the
//! same sort of data `spec.md` §2 calls out for the paper-size table: not
//! core placement/patching logic.

use crate::error::{Error, Result};
use crate::watermark::FontName;

const FIRST_CHAR: usize = 0x20;
const LAST_CHAR: usize = 0x7E;

#[rustfmt::skip]
const HELVETICA: [u16; LAST_CHAR - FIRST_CHAR + 1] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' .. '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0' .. '?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@' .. 'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P' .. '_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`' .. 'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p' .. '~'
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; LAST_CHAR - FIRST_CHAR + 1] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const COURIER_WIDTH: u16 = 600;

fn unit_width(font: FontName, byte: u8) -> u16 {
    match font {
        FontName::Courier => COURIER_WIDTH,
        _ if !(FIRST_CHAR as u8..=LAST_CHAR as u8).contains(&byte) => {
            // Outside the tabulated printable range: fall back to the space
            // width for the font rather than panic on indexing.
            match font {
                FontName::Helvetica => HELVETICA[0],
                FontName::TimesRoman => TIMES_ROMAN[0],
                FontName::Courier => unreachable!(),
            }
        }
        FontName::Helvetica => HELVETICA[byte as usize - FIRST_CHAR],
        FontName::TimesRoman => TIMES_ROMAN[byte as usize - FIRST_CHAR],
    }
}

/// Returns the names of the fonts this metrics service knows about (spec §6
/// `fontNames()`), used to validate a parsed `fontname:` parameter.
pub fn font_names() -> &'static [&'static str] {
    &["Helvetica", "Times-Roman", "Courier"]
}

pub fn parse_font_name(s: &str) -> Result<FontName> {
    match s {
        "Helvetica" => Ok(FontName::Helvetica),
        "Times-Roman" => Ok(FontName::TimesRoman),
        "Courier" => Ok(FontName::Courier),
        other => Err(Error::UnsupportedFont(other.to_string())),
    }
}

/// Width, in PDF user-space units, of `line` set in `font` at `size` points.
pub fn text_width(line: &str, font: FontName, size: f64) -> f64 {
    let units: u32 = line.bytes().map(|b| unit_width(font, b) as u32).sum();
    units as f64 / 1000.0 * size
}

/// The largest integer point size at which `line` fits within
/// `target_width` PDF user-space units, for `font`.
///
/// AFM widths scale linearly with point size, so this is computed by direct
/// algebraic inversion rather than the binary search design note 9 suggests
/// as a fallback for metrics services that can't be inverted (see DESIGN.md).
pub fn font_size_for_width(line: &str, font: FontName, target_width: f64) -> i64 {
    let units: u32 = line.bytes().map(|b| unit_width(font, b) as u32).sum();
    if units == 0 {
        return 1;
    }
    let size = target_width * 1000.0 / units as f64;
    size.floor().max(1.0) as i64
}
