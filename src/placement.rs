//! Geometry and placement (spec §4.2): bounding-box computation and the
//! final affine transform applied to the painted form via the page-level
//! `cm` operator.

use crate::fontmetrics;
use crate::geometry::{Matrix, Point, Rectangle};
use crate::watermark::{Content, Diagonal, Orientation, Position, WatermarkCtx, WatermarkSpec};

/// Font-metric-derived descender correction baked into a text bounding box's
/// lower-left `y`, and reused verbatim when painting each line's baseline
/// (spec §4.3). Both call sites in the spec refer to the same quantity.
pub(crate) fn descender_correction(scaled_font_size: f64) -> f64 {
    -(scaled_font_size / 12.0 * 9.47)
}

/// Compute the overlay's bounding box within `vp`, updating
/// `ctx.scaled_font_size` for text content as a side effect (spec §4.2).
pub fn compute_bbox(wm: &WatermarkSpec, ctx: &mut WatermarkCtx) -> Rectangle {
    let vp = ctx.vp.expect("viewport must be set before computing bbox");

    match &wm.content {
        Content::Text { lines, .. } => {
            let (width, scaled_size) = if wm.scale_abs {
                let size = (wm.font_size as f64 * wm.scale).round();
                let width = lines
                    .iter()
                    .map(|l| fontmetrics::text_width(l, wm.font_name, size))
                    .fold(0.0_f64, f64::max);
                (width, size)
            } else {
                let target_width = wm.scale * vp.width();
                let size = lines
                    .iter()
                    .map(|l| fontmetrics::font_size_for_width(l, wm.font_name, target_width))
                    .min()
                    .unwrap_or(1) as f64;
                let width = lines
                    .iter()
                    .map(|l| fontmetrics::text_width(l, wm.font_name, size))
                    .fold(0.0_f64, f64::max);
                (width, size)
            };
            ctx.scaled_font_size = scaled_size;
            let height = lines.len() as f64 * scaled_size;
            let dy = descender_correction(scaled_size);
            Rectangle::new(Point::new(0.0, dy), Point::new(width, dy + height))
        }
        Content::Image { .. } | Content::PdfPage { .. } => {
            let donor_aspect = ctx.donor_width / ctx.donor_height;
            let (width, height) = if wm.scale_abs {
                let width = wm.scale * ctx.donor_width;
                (width, width / donor_aspect)
            } else if donor_aspect >= 1.0 {
                let width = wm.scale * vp.width();
                (width, width / donor_aspect)
            } else {
                let height = wm.scale * vp.height();
                (height * donor_aspect, height)
            };
            Rectangle::from_dims(Point::new(0.0, 0.0), width, height)
        }
    }
}

/// The page-space position of `bb`'s lower-left corner for an unrotated,
/// un-offset placement at `position` within `vp` (spec §4.2 step 4's `ll`).
pub fn lower_left_corner(vp: &Rectangle, bb: &Rectangle, position: Position) -> Point {
    let x_left = 0.0;
    let x_center = (vp.width() - bb.width()) / 2.0;
    let x_right = vp.width() - bb.width();
    let y_bottom = 0.0;
    let y_middle = (vp.height() - bb.height()) / 2.0;
    let y_top = vp.height() - bb.height();

    let (x, y) = match position {
        Position::TopLeft => (x_left, y_top),
        Position::TopCenter => (x_center, y_top),
        Position::TopRight => (x_right, y_top),
        Position::Left => (x_left, y_middle),
        Position::Center => (x_center, y_middle),
        Position::Right => (x_right, y_middle),
        Position::BottomLeft => (x_left, y_bottom),
        Position::BottomCenter => (x_center, y_bottom),
        Position::BottomRight => (x_right, y_bottom),
    };
    Point::new(vp.ll.x + x, vp.ll.y + y)
}

/// Compute the rotation angle in degrees before page rotation is added
/// (spec §4.2 step 1).
fn base_rotation_degrees(wm: &WatermarkSpec, vp: &Rectangle, bb: &Rectangle) -> f64 {
    match wm.orientation {
        Orientation::Rotation(r) => r,
        Orientation::Diagonal(Diagonal::None) => 0.0,
        Orientation::Diagonal(d) => {
            let mut r = (vp.height() / vp.width()).atan().to_degrees();
            if bb.aspect_ratio() < 1.0 {
                r -= 90.0;
            }
            if d == Diagonal::ULtoLR {
                r = -r;
            }
            r
        }
    }
}

/// Compute the final placement matrix applied as the page-level `cm`
/// operand when painting the form (spec §4.2 steps 1-5).
///
/// See DESIGN.md's "Open Question decisions" entry for scenario (f): this
/// implements the formula exactly as specified, which places `bb`'s own
/// center (in form-local space) at `vp`'s center for `Position::Center`,
/// zero rotation, zero offset — the invariant Testable Property 6 names —
/// even though the resulting `tx, ty` are not themselves that center point.
pub fn compute_transform(wm: &WatermarkSpec, ctx: &WatermarkCtx) -> Matrix {
    let vp = ctx.vp.expect("viewport must be set");
    let bb = ctx.bb.expect("bounding box must be set");

    let mut r = base_rotation_degrees(wm, &vp, &bb);
    r += ctx.page_rotation as f64;

    let rad = r.to_radians();
    let (sin, cos) = (rad.sin(), rad.cos());

    let ll = lower_left_corner(&vp, &bb, wm.position);
    let dy = if wm.is_text() { bb.ll.y } else { 0.0 };

    let tx = ll.x + bb.width() / 2.0 + wm.dx as f64 + sin * (bb.height() / 2.0 + dy)
        - cos * (bb.width() / 2.0);
    let ty = ll.y + bb.height() / 2.0 + wm.dy as f64
        - cos * (bb.height() / 2.0 + dy)
        - sin * (bb.width() / 2.0);

    let rotation = Matrix::rotation(r);
    let translation = Matrix::translation(tx, ty);
    rotation.mul(&translation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::{Content, FontName, RenderMode};

    fn spec_with(content: Content, position: Position, orientation: Orientation) -> WatermarkSpec {
        WatermarkSpec {
            content,
            on_top: false,
            position,
            dx: 0,
            dy: 0,
            font_name: FontName::Helvetica,
            font_size: 24,
            color: crate::watermark::Color::default(),
            render_mode: RenderMode::Fill,
            orientation,
            user_set_orientation: true,
            opacity: 1.0,
            scale: 0.5,
            scale_abs: false,
            update: false,
        }
    }

    #[test]
    fn transform_centers_bbox_at_center() {
        // Testable Property 6 / scenario (f).
        let mut ctx = WatermarkCtx::new();
        ctx.vp = Some(Rectangle::new(Point::new(0.0, 0.0), Point::new(100.0, 100.0)));
        ctx.bb = Some(Rectangle::new(Point::new(0.0, 0.0), Point::new(20.0, 10.0)));
        ctx.page_rotation = 0;

        let wm = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::None),
        );
        let m = compute_transform(&wm, &ctx);
        let bb = ctx.bb.unwrap();
        let bb_center = Point::new(bb.width() / 2.0, bb.height() / 2.0);
        let placed = m.apply(bb_center);
        let vp = ctx.vp.unwrap();
        let vp_center = Point::new(
            vp.ll.x + vp.width() / 2.0,
            vp.ll.y + vp.height() / 2.0,
        );
        assert!((placed.x - vp_center.x).abs() < 1e-9);
        assert!((placed.y - vp_center.y).abs() < 1e-9);
    }

    #[test]
    fn diagonal_ll_to_ur_landscape_angle() {
        // Scenario (g).
        let vp = Rectangle::new(Point::new(0.0, 0.0), Point::new(400.0, 300.0));
        let bb = Rectangle::from_dims(Point::new(0.0, 0.0), 200.0, 50.0); // aspect > 1
        let wm = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::LLtoUR),
        );
        let r = base_rotation_degrees(&wm, &vp, &bb);
        assert!((r - 36.8698).abs() < 1e-3);
    }

    #[test]
    fn diagonal_ul_to_lr_negates_angle() {
        let vp = Rectangle::new(Point::new(0.0, 0.0), Point::new(400.0, 300.0));
        let bb = Rectangle::from_dims(Point::new(0.0, 0.0), 200.0, 50.0);
        let wm_ll = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::LLtoUR),
        );
        let wm_ul = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::ULtoLR),
        );
        let r_ll = base_rotation_degrees(&wm_ll, &vp, &bb);
        let r_ul = base_rotation_degrees(&wm_ul, &vp, &bb);
        assert!((r_ll + r_ul).abs() < 1e-9);
    }

    #[test]
    fn portrait_bbox_subtracts_90_degrees() {
        let vp = Rectangle::new(Point::new(0.0, 0.0), Point::new(400.0, 300.0));
        let bb = Rectangle::from_dims(Point::new(0.0, 0.0), 50.0, 200.0); // aspect < 1
        let wm = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::LLtoUR),
        );
        let landscape_bb = Rectangle::from_dims(Point::new(0.0, 0.0), 200.0, 50.0);
        let r_portrait = base_rotation_degrees(&wm, &vp, &bb);
        let r_landscape = base_rotation_degrees(&wm, &vp, &landscape_bb);
        assert!((r_portrait - (r_landscape - 90.0)).abs() < 1e-9);
    }

    #[test]
    fn lower_left_corner_anchors() {
        let vp = Rectangle::new(Point::new(0.0, 0.0), Point::new(100.0, 200.0));
        let bb = Rectangle::from_dims(Point::new(0.0, 0.0), 20.0, 10.0);
        assert_eq!(lower_left_corner(&vp, &bb, Position::BottomLeft), Point::new(0.0, 0.0));
        assert_eq!(lower_left_corner(&vp, &bb, Position::TopRight), Point::new(80.0, 190.0));
        assert_eq!(lower_left_corner(&vp, &bb, Position::Center), Point::new(40.0, 95.0));
    }

    #[test]
    fn text_bbox_height_is_line_count_times_scaled_size() {
        let mut ctx = WatermarkCtx::new();
        ctx.vp = Some(Rectangle::new(Point::new(0.0, 0.0), Point::new(600.0, 800.0)));
        let content = Content::Text {
            raw: "Hello\\nWorld".to_string(),
            lines: vec!["Hello".to_string(), "World".to_string()],
        };
        let mut wm = spec_with(content, Position::Center, Orientation::Diagonal(Diagonal::LLtoUR));
        wm.scale_abs = true;
        wm.scale = 1.0;
        wm.font_size = 24;
        let bb = compute_bbox(&wm, &mut ctx);
        assert_eq!(ctx.scaled_font_size, 24.0);
        assert!((bb.height() - 48.0).abs() < 1e-9);
    }

    #[test]
    fn image_bbox_scale_abs_uses_donor_width() {
        let mut ctx = WatermarkCtx::new();
        ctx.vp = Some(Rectangle::new(Point::new(0.0, 0.0), Point::new(600.0, 800.0)));
        ctx.donor_width = 200.0;
        ctx.donor_height = 100.0;
        let mut wm = spec_with(
            Content::Image { path: "x.png".into() },
            Position::Center,
            Orientation::Diagonal(Diagonal::LLtoUR),
        );
        wm.scale_abs = true;
        wm.scale = 0.5;
        let bb = compute_bbox(&wm, &mut ctx);
        assert!((bb.width() - 100.0).abs() < 1e-9);
        assert!((bb.height() - 50.0).abs() < 1e-9);
    }
}
