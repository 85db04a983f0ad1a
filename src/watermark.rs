//! The `Watermark` data model (spec §3), split per design note 9 into an
//! immutable [`WatermarkSpec`] (what the configuration string describes) and
//! a mutable [`WatermarkCtx`] (everything the engine derives while painting
//! pages). Mixing the two, as the source this is modeled on does, makes the
//! single-threaded-per-value invariant in spec §5 implicit; keeping them
//! apart makes it explicit: nothing in `WatermarkSpec` changes once parsed,
//! and `WatermarkCtx` is the only thing a caller must not share across
//! concurrent runs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use lopdf::ObjectId;

use crate::geometry::Rectangle;

/// One of the three PDF standard fonts supported for text overlays (spec §1
/// Non-goals: no arbitrary fonts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontName {
    Helvetica,
    TimesRoman,
    Courier,
}

impl FontName {
    /// The `BaseFont` name used in the generated PDF font dictionary.
    pub fn base_font(&self) -> &'static str {
        match self {
            FontName::Helvetica => "Helvetica",
            FontName::TimesRoman => "Times-Roman",
            FontName::Courier => "Courier",
        }
    }
}

/// Anchor position within the page viewport (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Text rendering mode, matching the PDF `Tr` operand values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Fill = 0,
    Stroke = 1,
    FillAndStroke = 2,
}

impl RenderMode {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(RenderMode::Fill),
            1 => Some(RenderMode::Stroke),
            2 => Some(RenderMode::FillAndStroke),
            _ => None,
        }
    }
}

/// Diagonal shorthand orientation (spec §3, §4.2 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagonal {
    None = 0,
    LLtoUR = 1,
    ULtoLR = 2,
}

impl Diagonal {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Diagonal::None),
            1 => Some(Diagonal::LLtoUR),
            2 => Some(Diagonal::ULtoLR),
            _ => None,
        }
    }
}

/// Exactly one of `Rotation` or `Diagonal` (spec §3 invariant: mutually
/// exclusive, setting one clears the other).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    Rotation(f64),
    Diagonal(Diagonal),
}

/// An RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for Color {
    fn default() -> Self {
        Color { r: 0.5, g: 0.5, b: 0.5 }
    }
}

/// The overlay's content (spec §3: exactly one of Text/Image/PDFPage).
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text { raw: String, lines: Vec<String> },
    Image { path: PathBuf },
    PdfPage { path: PathBuf, page: u32 },
}

/// The immutable, validated description produced by [`crate::config::parse`].
#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub content: Content,
    /// `true` = stamp (painted after page content), `false` = watermark
    /// (painted before).
    pub on_top: bool,
    pub position: Position,
    pub dx: i64,
    pub dy: i64,
    pub font_name: FontName,
    pub font_size: i64,
    pub color: Color,
    pub render_mode: RenderMode,
    pub orientation: Orientation,
    /// Whether the spec string explicitly set `rotation` or `diagonal`
    /// (default is `Diagonal::LLtoUR` when neither is set).
    pub user_set_orientation: bool,
    pub opacity: f64,
    pub scale: f64,
    pub scale_abs: bool,
    pub update: bool,
}

impl WatermarkSpec {
    /// A spec with every default value (spec §3), content filled in by the
    /// caller once the content kind has been resolved.
    pub fn with_defaults(content: Content, on_top: bool) -> Self {
        WatermarkSpec {
            content,
            on_top,
            position: Position::Center,
            dx: 0,
            dy: 0,
            font_name: FontName::Helvetica,
            font_size: 24,
            color: Color::default(),
            render_mode: RenderMode::Fill,
            orientation: Orientation::Diagonal(Diagonal::LLtoUR),
            user_set_orientation: false,
            opacity: 1.0,
            scale: 0.5,
            scale_abs: false,
            update: false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.content, Content::Text { .. })
    }
}

/// Mutable state the engine accumulates while painting a single
/// [`WatermarkSpec`] across pages within one `AddWatermarks`/`RemoveWatermarks`
/// invocation (spec §5: single-threaded, non-reentrant per value).
#[derive(Debug, Default)]
pub struct WatermarkCtx {
    pub ocg: Option<ObjectId>,
    pub ext_gstate: Option<ObjectId>,
    pub font_ref: Option<ObjectId>,
    pub image_ref: Option<ObjectId>,
    /// The migrated Form XObject for `Content::PdfPage` donor content
    /// (spec §4.4), already self-contained with its own `Resources`.
    pub donor_form: Option<ObjectId>,
    pub donor_width: f64,
    pub donor_height: f64,
    pub vp: Option<Rectangle>,
    pub bb: Option<Rectangle>,
    pub page_rotation: i64,
    pub scaled_font_size: f64,
    /// Keyed by the bit patterns of `(width, height)` — see DESIGN.md's
    /// resolution of design note 9's "form cache keyed by pointer identity".
    pub form_cache: HashMap<(u64, u64), ObjectId>,
    pub patched_streams: HashSet<u32>,
}

impl WatermarkCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form_cache_key(width: f64, height: f64) -> (u64, u64) {
        (width.to_bits(), height.to_bits())
    }
}
