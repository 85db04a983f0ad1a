//! Form XObject synthesis (spec §4.3).
//!
//! Every watermark, regardless of content kind, is painted as a single Form
//! XObject whose own `BBox` is the bounding box [`crate::placement`]
//! computed. The page-level placement transform (spec §4.2 step 5) then maps
//! that local box onto the page. This mirrors the isolated-Resources Form
//! XObject approach in overlay.rs, generalized from a fixed crop-mark/footer
//! overlay to the three donor content kinds spec §3 allows.

use lopdf::content::{Content as PdfContent, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;
use crate::geometry::Rectangle;
use crate::watermark::{Content, WatermarkCtx, WatermarkSpec};

/// Build (or reuse a cached) Form XObject for `wm`, returning its object id.
///
/// Caching is keyed by the bounding box's `(width, height)` bit pattern
/// (spec §3 design note 9's form cache), not by pointer identity: two pages
/// whose computed viewport produces the same bbox dimensions paint an
/// identical form and may share it.
pub fn build_form(doc: &mut Document, wm: &WatermarkSpec, ctx: &mut WatermarkCtx) -> Result<ObjectId> {
    let bb = ctx.bb.expect("bounding box must be set before building the form");
    let key = WatermarkCtx::form_cache_key(bb.width(), bb.height());
    if let Some(id) = ctx.form_cache.get(&key) {
        return Ok(*id);
    }

    let id = match &wm.content {
        Content::Text { lines, .. } => build_text_form(doc, wm, ctx, &bb, lines)?,
        Content::Image { .. } => build_image_form(doc, ctx, &bb)?,
        Content::PdfPage { .. } => build_pdfpage_form(doc, ctx, &bb)?,
    };

    ctx.form_cache.insert(key, id);
    Ok(id)
}

/// Identity `Matrix` entry every Form XObject dictionary carries (spec §4.3:
/// `Matrix=identity` — the page-level `cm` does all the placement work, so
/// the form's own matrix never varies).
fn identity_matrix() -> Object {
    Object::Array(vec![1.0.into(), 0.0.into(), 0.0.into(), 1.0.into(), 0.0.into(), 0.0.into()])
}

fn build_text_form(
    doc: &mut Document,
    wm: &WatermarkSpec,
    ctx: &WatermarkCtx,
    bb: &Rectangle,
    lines: &[String],
) -> Result<ObjectId> {
    let font_ref = ctx.font_ref.expect("font must be embedded before building a text form");
    let scaled_size = ctx.scaled_font_size;
    let font_name = wm.font_name.base_font();

    // Graphics-state prelude (spec §4.3): `0 g 0 G 0 i 0 J []0 d 0 j 1 w 10 M
    // 0 Tc 0 Tw 100 Tz 0 TL <RenderMode> Tr 0 Ts`.
    let mut ops = vec![
        Operation::new("g", vec![0.0.into()]),
        Operation::new("G", vec![0.0.into()]),
        Operation::new("i", vec![0.0.into()]),
        Operation::new("J", vec![0.0.into()]),
        Operation::new("d", vec![Object::Array(vec![]), 0.0.into()]),
        Operation::new("j", vec![0.0.into()]),
        Operation::new("w", vec![1.0.into()]),
        Operation::new("M", vec![10.0.into()]),
        Operation::new("Tc", vec![0.0.into()]),
        Operation::new("Tw", vec![0.0.into()]),
        Operation::new("Tz", vec![100.0.into()]),
        Operation::new("TL", vec![0.0.into()]),
        Operation::new("Tr", vec![(wm.render_mode as i64).into()]),
        Operation::new("Ts", vec![0.0.into()]),
    ];

    let (r, g, b) = (wm.color.r, wm.color.g, wm.color.b);
    let dy = crate::placement::descender_correction(scaled_size);

    // Lines painted in reverse order so line 0 ends up on top (spec §4.3):
    // `j` starts at 1 for the last line and grows toward the first.
    for (rank, line) in lines.iter().rev().enumerate() {
        let j = (rank + 1) as f64;
        let text_width = crate::fontmetrics::text_width(line, wm.font_name, scaled_size);
        let dx = bb.width() / 2.0 - text_width / 2.0;
        let ty = dy + j * scaled_size;

        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![font_name.into(), scaled_size.into()]));
        ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        ops.push(Operation::new("Td", vec![dx.into(), ty.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(line.as_bytes().to_vec(), lopdf::StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    let content = PdfContent { operations: ops };
    let font_dict = dictionary! { font_name => font_ref };
    let resources = dictionary! {
        "Font" => font_dict,
        "ProcSet" => vec![Object::Name(b"PDF".to_vec()), Object::Name(b"Text".to_vec())],
    };

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![bb.ll.x.into(), bb.ll.y.into(), bb.ur.x.into(), bb.ur.y.into()],
            "Matrix" => identity_matrix(),
            "Resources" => Object::Dictionary(resources),
        },
        content.encode()?,
    );
    Ok(doc.add_object(stream))
}

fn build_image_form(doc: &mut Document, ctx: &WatermarkCtx, bb: &Rectangle) -> Result<ObjectId> {
    let image_ref = ctx.image_ref.expect("image must be embedded before building an image form");

    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                bb.width().into(),
                0.0.into(),
                0.0.into(),
                bb.height().into(),
                0.0.into(),
                0.0.into(),
            ],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ];
    let content = PdfContent { operations: ops };
    let xobject_dict = dictionary! { "Im0" => image_ref };
    let resources = dictionary! {
        "XObject" => xobject_dict,
        "ProcSet" => vec![Object::Name(b"PDF".to_vec()), Object::Name(b"ImageC".to_vec())],
    };

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.0.into(), 0.0.into(), bb.width().into(), bb.height().into()],
            "Matrix" => identity_matrix(),
            "Resources" => Object::Dictionary(resources),
        },
        content.encode()?,
    );
    Ok(doc.add_object(stream))
}

/// Scales the migrated donor form (spec §4.4) to `bb`'s size and invokes it
/// via `Do`. See DESIGN.md's "Open Question decisions" for why this scales
/// by `bb/donor` rather than §4.3's literal `bb/vp` formula, and why the
/// donor resources are referenced through a nested `Fm0` rather than spliced
/// into this form's own `Resources` verbatim.
fn build_pdfpage_form(doc: &mut Document, ctx: &WatermarkCtx, bb: &Rectangle) -> Result<ObjectId> {
    let donor_form = ctx
        .donor_form
        .expect("donor page must be migrated before building a pdf-page form");
    let sx = bb.width() / ctx.donor_width;
    let sy = bb.height() / ctx.donor_height;

    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new("cm", vec![sx.into(), 0.0.into(), 0.0.into(), sy.into(), 0.0.into(), 0.0.into()]),
        Operation::new("Do", vec!["Fm0".into()]),
        Operation::new("Q", vec![]),
    ];
    let content = PdfContent { operations: ops };
    let xobject_dict = dictionary! { "Fm0" => donor_form };
    let resources = dictionary! { "XObject" => xobject_dict };

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.0.into(), 0.0.into(), bb.width().into(), bb.height().into()],
            "Matrix" => identity_matrix(),
            "Resources" => Object::Dictionary(resources),
        },
        content.encode()?,
    );
    Ok(doc.add_object(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use lopdf::Document;

    fn base_ctx() -> WatermarkCtx {
        let mut ctx = WatermarkCtx::new();
        ctx.bb = Some(Rectangle::from_dims(Point::new(0.0, 0.0), 100.0, 20.0));
        ctx
    }

    #[test]
    fn text_form_is_cached_by_bbox_dims() {
        let mut doc = Document::with_version("1.7");
        let mut ctx = base_ctx();
        ctx.font_ref = Some(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }));
        ctx.scaled_font_size = 20.0;

        let wm = WatermarkSpec::with_defaults(
            Content::Text { raw: "hi".into(), lines: vec!["hi".into()] },
            false,
        );

        let id1 = build_form(&mut doc, &wm, &mut ctx).unwrap();
        let id2 = build_form(&mut doc, &wm, &mut ctx).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(ctx.form_cache.len(), 1);
    }

    #[test]
    fn text_form_paints_lines_in_reverse_with_centering() {
        let mut doc = Document::with_version("1.7");
        let mut ctx = base_ctx();
        ctx.bb = Some(Rectangle::from_dims(Point::new(0.0, 0.0), 200.0, 40.0));
        ctx.font_ref = Some(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }));
        ctx.scaled_font_size = 20.0;

        let wm = WatermarkSpec::with_defaults(
            Content::Text {
                raw: "First\\nSecond".into(),
                lines: vec!["First".into(), "Second".into()],
            },
            false,
        );

        let id = build_form(&mut doc, &wm, &mut ctx).unwrap();
        let obj = doc.get_object(id).unwrap();
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Matrix").unwrap().as_array().unwrap().len(), 6);

        let decoded = PdfContent::decode(&stream.content).unwrap();
        let tj_texts: Vec<String> = decoded
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| match &op.operands[0] {
                Object::String(bytes, _) => String::from_utf8_lossy(bytes).to_string(),
                other => panic!("expected Tj string operand, got {other:?}"),
            })
            .collect();
        // "Second" is painted first (it's the last line, j=1), "First" last (j=2),
        // so it ends up on top (spec §4.3).
        assert_eq!(tj_texts, vec!["Second", "First"]);

        let tz_count = decoded.operations.iter().filter(|op| op.operator == "Tz").count();
        assert_eq!(tz_count, 1);
    }

    #[test]
    fn image_form_references_embedded_image() {
        let mut doc = Document::with_version("1.7");
        let mut ctx = base_ctx();
        ctx.image_ref = Some(doc.add_object(dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 10,
            "Height" => 10,
        }));
        let wm = WatermarkSpec::with_defaults(Content::Image { path: "x.png".into() }, false);
        let id = build_form(&mut doc, &wm, &mut ctx).unwrap();
        let obj = doc.get_object(id).unwrap();
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Form");
    }
}
