//! Configuration string parser (spec §4.1).
//!
//! Grammar (spec §6, normative):
//!
//! ```text
//! spec     := content ("," param)*
//! param    := name-prefix ":" value
//! ```
//!
//! Parameter names are matched by unambiguous prefix against the fixed set
//! `{fontname, points, color, rotation, diagonal, opacity, mode, rendermode,
//! position, offset, scalefactor}`; `mode` and `rendermode` are aliases for
//! the same field.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::fontmetrics;
use crate::watermark::{Color, Content, Diagonal, Orientation, Position, RenderMode, WatermarkSpec};

/// The parameter names a key prefix may resolve to, in the order used for
/// "did you mean" style ambiguity errors.
const PARAM_NAMES: &[&str] = &[
    "fontname",
    "points",
    "color",
    "rotation",
    "diagonal",
    "opacity",
    "mode",
    "rendermode",
    "position",
    "offset",
    "scalefactor",
];

fn resolve_param_name(prefix: &str) -> Result<&'static str> {
    let matches: Vec<&'static str> = PARAM_NAMES
        .iter()
        .copied()
        .filter(|name| name.starts_with(prefix))
        .collect();
    match matches.len() {
        0 => Err(Error::Parse(format!("unknown parameter prefix \"{prefix}\""))),
        1 => Ok(matches[0]),
        _ => Err(Error::Parse(format!("ambiguous parameter prefix \"{prefix}\""))),
    }
}

fn canonical_field(name: &str) -> &'static str {
    match name {
        "mode" | "rendermode" => "rendermode",
        other => match other {
            "fontname" => "fontname",
            "points" => "points",
            "color" => "color",
            "rotation" => "rotation",
            "diagonal" => "diagonal",
            "opacity" => "opacity",
            "position" => "position",
            "offset" => "offset",
            "scalefactor" => "scalefactor",
            _ => unreachable!("resolve_param_name only returns names from PARAM_NAMES"),
        },
    }
}

fn parse_f64(value: &str, field: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Parse(format!("invalid {field} value: \"{value}\"")))
}

fn parse_i64(value: &str, field: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::Parse(format!("invalid {field} value: \"{value}\"")))
}

fn lowercase_ext(path: &str) -> String {
    path.rsplit('.').next().unwrap_or("").to_ascii_lowercase()
}

fn is_image_ext(ext: &str) -> bool {
    matches!(ext, "jpg" | "jpeg" | "png" | "tif" | "tiff")
}

/// Split a `path:pageNum` candidate into its path and optional trailing page
/// number, so the extension check below isn't thrown off by the suffix.
fn split_trailing_page(candidate: &str) -> (&str, Option<u32>) {
    if let Some(idx) = candidate.rfind(':') {
        let (path_part, page_part) = candidate.split_at(idx);
        if let Ok(page) = page_part[1..].parse::<u32>() {
            return (path_part, Some(page));
        }
    }
    (candidate, None)
}

/// Resolve the content kind from the first comma-separated element of the
/// spec string (spec §3 invariants: Text/Image/PDFPage resolved from
/// extension; a single-line text that also matches an image/PDF extension
/// is re-classified as file-based).
fn classify_content(raw: &str) -> Result<Content> {
    let lines: Vec<String> = raw.split("\\n").map(|s| s.to_string()).collect();

    if lines.len() == 1 {
        let candidate = lines[0].as_str();
        let (path_part, page) = split_trailing_page(candidate);
        let ext = lowercase_ext(path_part);
        if is_image_ext(&ext) {
            return Ok(Content::Image {
                path: PathBuf::from(candidate),
            });
        }
        if ext == "pdf" {
            return Ok(Content::PdfPage {
                path: PathBuf::from(path_part),
                page: page.unwrap_or(1),
            });
        }
    }

    if lines.is_empty() || lines.iter().all(|l| l.is_empty()) {
        return Err(Error::Parse("empty watermark text".to_string()));
    }

    Ok(Content::Text {
        raw: raw.to_string(),
        lines,
    })
}

fn parse_color(value: &str) -> Result<Color> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::Parse(format!("invalid color value: \"{value}\"")));
    }
    let mut comps = [0.0f64; 3];
    for (i, p) in parts.iter().enumerate() {
        let v = parse_f64(p, "color")?;
        if !(0.0..=1.0).contains(&v) {
            return Err(Error::Parse(format!("color component out of range [0,1]: {v}")));
        }
        comps[i] = v;
    }
    Ok(Color {
        r: comps[0],
        g: comps[1],
        b: comps[2],
    })
}

fn parse_position(value: &str) -> Result<Position> {
    match value.trim() {
        "tl" => Ok(Position::TopLeft),
        "tc" => Ok(Position::TopCenter),
        "tr" => Ok(Position::TopRight),
        "l" => Ok(Position::Left),
        "c" => Ok(Position::Center),
        "r" => Ok(Position::Right),
        "bl" => Ok(Position::BottomLeft),
        "bc" => Ok(Position::BottomCenter),
        "br" => Ok(Position::BottomRight),
        other => Err(Error::Parse(format!("invalid position: \"{other}\""))),
    }
}

fn parse_offset(value: &str) -> Result<(i64, i64)> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(Error::Parse(format!("invalid offset value: \"{value}\"")));
    }
    Ok((parse_i64(parts[0], "offset")?, parse_i64(parts[1], "offset")?))
}

fn parse_scalefactor(value: &str) -> Result<(f64, bool)> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(Error::Parse(format!("invalid scalefactor value: \"{value}\"")));
    }
    let f = parse_f64(parts[0], "scalefactor")?;
    if !(0.0..=1.0).contains(&f) {
        return Err(Error::Parse(format!("scalefactor out of range [0,1]: {f}")));
    }
    let abs = match parts.get(1) {
        None => false,
        Some(&"abs") | Some(&"a") => true,
        Some(&"rel") | Some(&"r") => false,
        Some(other) => return Err(Error::Parse(format!("invalid scalefactor mode: \"{other}\""))),
    };
    Ok((f, abs))
}

/// Parse a comma-separated watermark configuration string into a validated
/// [`WatermarkSpec`] (spec §4.1).
pub fn parse(spec: &str, on_top: bool) -> Result<WatermarkSpec> {
    let mut elements = spec.split(',');
    let content_raw = elements
        .next()
        .ok_or_else(|| Error::Parse("empty watermark spec".to_string()))?;
    let content = classify_content(content_raw)?;

    let mut wm = WatermarkSpec::with_defaults(content, on_top);
    let mut rotation_seen = false;
    let mut diagonal_seen = false;

    for raw_param in elements {
        let raw_param = raw_param.trim();
        if raw_param.is_empty() {
            continue;
        }
        let (key, value) = raw_param
            .split_once(':')
            .ok_or_else(|| Error::Parse(format!("malformed parameter: \"{raw_param}\"")))?;
        let name = resolve_param_name(key)?;
        match canonical_field(name) {
            "fontname" => {
                wm.font_name = fontmetrics::parse_font_name(value.trim())?;
            }
            "points" => {
                wm.font_size = parse_i64(value, "points")?;
            }
            "color" => {
                wm.color = parse_color(value)?;
            }
            "rotation" => {
                let deg = parse_f64(value, "rotation")?;
                if !(-180.0..=180.0).contains(&deg) {
                    return Err(Error::Parse(format!("rotation out of range [-180,180]: {deg}")));
                }
                wm.orientation = Orientation::Rotation(deg);
                wm.user_set_orientation = true;
                rotation_seen = true;
            }
            "diagonal" => {
                let d = parse_i64(value, "diagonal")?;
                let diag = Diagonal::from_i64(d)
                    .filter(|d| *d != Diagonal::None)
                    .ok_or_else(|| Error::Parse(format!("invalid diagonal value: {d}")))?;
                wm.orientation = Orientation::Diagonal(diag);
                wm.user_set_orientation = true;
                diagonal_seen = true;
            }
            "opacity" => {
                let op = parse_f64(value, "opacity")?;
                if !(0.0..=1.0).contains(&op) {
                    return Err(Error::Parse(format!("opacity out of range [0,1]: {op}")));
                }
                wm.opacity = op;
            }
            "rendermode" => {
                let m = parse_i64(value, "mode")?;
                wm.render_mode = RenderMode::from_i64(m)
                    .ok_or_else(|| Error::Parse(format!("invalid render mode: {m}")))?;
            }
            "position" => {
                wm.position = parse_position(value)?;
            }
            "offset" => {
                let (dx, dy) = parse_offset(value)?;
                wm.dx = dx;
                wm.dy = dy;
            }
            "scalefactor" => {
                let (scale, abs) = parse_scalefactor(value)?;
                wm.scale = scale;
                wm.scale_abs = abs;
            }
            _ => unreachable!(),
        }

        if rotation_seen && diagonal_seen {
            return Err(Error::Parse("please specify rotation or diagonal".to_string()));
        }
    }

    Ok(wm)
}
