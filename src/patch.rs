//! Page patcher (spec §4.5): splice a watermark form's invocation into a
//! single page's content stream.
//!
//! Grounded on overlay.rs's `stamp_page`: a Form XObject gets its own
//! isolated `Resources`, the invoking page's `Resources/XObject` (and, here,
//! `ExtGState`) dictionaries are extended without clobbering what's already
//! there, and the original `Contents` is preserved by wrapping it inside a
//! new `Contents` array rather than decoding and re-encoding it.

use lopdf::content::{Content as PdfContent, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::formbuilder;
use crate::geometry::{Point, Rectangle};
use crate::placement;
use crate::remove;
use crate::watermark::{WatermarkCtx, WatermarkSpec};

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

fn to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

struct PageAttrs {
    media_box: Rectangle,
    crop_box: Option<Rectangle>,
    rotate: i64,
}

fn rect_from_array(doc: &Document, arr: &Object) -> Option<Rectangle> {
    let arr = match arr {
        Object::Array(a) => a,
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Array(a) => a,
            _ => return None,
        },
        _ => return None,
    };
    if arr.len() != 4 {
        return None;
    }
    let x1 = to_f64(&arr[0])?;
    let y1 = to_f64(&arr[1])?;
    let x2 = to_f64(&arr[2])?;
    let y2 = to_f64(&arr[3])?;
    Some(Rectangle::new(
        Point::new(x1.min(x2), y1.min(y2)),
        Point::new(x1.max(x2), y1.max(y2)),
    ))
}

/// Resolve `MediaBox`, `CropBox`, and `Rotate`, walking the `Parent` chain
/// for any not set directly on the page (spec §4.5 step 1: page attributes
/// are inheritable).
fn page_attrs(doc: &Document, page: &Dictionary) -> Result<PageAttrs> {
    let mut media_box = None;
    let mut crop_box = None;
    let mut rotate = None;

    let mut current = page.clone();
    loop {
        if media_box.is_none() {
            if let Ok(mb) = current.get(b"MediaBox") {
                media_box = rect_from_array(doc, mb);
            }
        }
        if crop_box.is_none() {
            if let Ok(cb) = current.get(b"CropBox") {
                crop_box = rect_from_array(doc, cb);
            }
        }
        if rotate.is_none() {
            if let Ok(Object::Integer(r)) = current.get(b"Rotate") {
                rotate = Some(*r);
            }
        }
        if media_box.is_some() && rotate.is_some() && crop_box.is_some() {
            break;
        }
        match current.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p)) {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }

    Ok(PageAttrs {
        media_box: media_box.ok_or(Error::NoContent)?,
        crop_box,
        rotate: rotate.unwrap_or(0).rem_euclid(360),
    })
}

/// Find the smallest unused resource name `prefix{n}` (`n` starting at 0)
/// across the page's existing `category` subdictionary (spec §4.5 step 2:
/// new resource names must not collide with the page's own).
fn next_free_name(doc: &Document, resources: Option<&Dictionary>, category: &str, prefix: &str) -> String {
    let mut used = std::collections::HashSet::new();
    if let Some(res) = resources {
        if let Ok(cat) = res.get(category.as_bytes()) {
            if let Some(dict) = resolve_dict(doc, cat) {
                for (k, _) in dict.iter() {
                    used.insert(String::from_utf8_lossy(k).to_string());
                }
            }
        }
    }
    let mut n = 0u32;
    loop {
        let candidate = format!("{prefix}{n}");
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Merge `entry_name -> entry_id` into the page's `Resources/{category}`
/// subdictionary, preserving whatever was already there (overlay.rs's
/// merge-without-clobber pattern, generalized to any resource category).
fn merge_resource(doc: &mut Document, page: &mut Dictionary, category: &str, entry_name: &str, entry_id: ObjectId) {
    let existing_resources = page.get(b"Resources").ok().cloned();
    let existing_category = existing_resources
        .as_ref()
        .and_then(|r| resolve_dict(doc, r))
        .and_then(|r| r.get(category.as_bytes()).ok())
        .and_then(|c| resolve_dict(doc, c))
        .cloned();

    let mut category_dict = existing_category.unwrap_or_default();
    category_dict.set(entry_name, entry_id);

    let mut new_resources = existing_resources
        .as_ref()
        .and_then(|r| resolve_dict(doc, r))
        .cloned()
        .unwrap_or_default();
    new_resources.set(category, Object::Dictionary(category_dict));
    page.set("Resources", Object::Dictionary(new_resources));
}

/// Object numbers of the stream(s) referenced by a page's `Contents` entry,
/// single reference or array (spec §4.5 step 8's `objs` bookkeeping key).
fn content_stream_numbers(original: Option<&Object>) -> Vec<u32> {
    match original {
        Some(Object::Reference((n, _))) => vec![*n],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| match o {
                Object::Reference((n, _)) => Some(*n),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Patch `page_id` to paint `wm`'s form, using the OCG/ExtGState already
/// prepared on `ctx` by the orchestrator (spec §4.5, §4.7).
///
/// If the page's `Contents` stream(s) were already patched earlier in this
/// same run (the shared-content-stream case spec §4.5 step 8 calls out),
/// this is a no-op: `ctx.patched_streams` is consulted before doing any work
/// and updated with the original (pre-wrap) stream numbers afterward, never
/// the fresh wrapper's, since it's the donor content that must not be
/// wrapped twice (Testable Property 4).
pub fn patch_page(doc: &mut Document, page_id: ObjectId, wm: &WatermarkSpec, ctx: &mut WatermarkCtx) -> Result<()> {
    if wm.update {
        remove::remove_from_page(doc, page_id)?;
    }

    let page = doc.get_object(page_id).and_then(|o| o.as_dict()).map_err(Error::Pdf)?.clone();

    let original_numbers = content_stream_numbers(page.get(b"Contents").ok());
    if !original_numbers.is_empty() && original_numbers.iter().all(|n| ctx.patched_streams.contains(n)) {
        return Ok(());
    }

    let attrs = page_attrs(doc, &page)?;

    let vp = attrs.crop_box.unwrap_or(attrs.media_box);
    ctx.vp = Some(vp);
    ctx.page_rotation = attrs.rotate;

    let bb = placement::compute_bbox(wm, ctx);
    ctx.bb = Some(bb);
    let matrix = placement::compute_transform(wm, ctx);

    let form_id = formbuilder::build_form(doc, wm, ctx)?;
    if let Some(ocg) = ctx.ocg {
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(form_id) {
            stream.dict.set("OC", ocg);
        }
    }

    let mut page = page;
    let resources_snapshot = page.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)).cloned();

    let form_name = next_free_name(doc, resources_snapshot.as_ref(), "XObject", "Fm");
    merge_resource(doc, &mut page, "XObject", &form_name, form_id);

    let mut gs_name = None;
    if let Some(gs) = ctx.ext_gstate {
        let name = next_free_name(doc, resources_snapshot.as_ref(), "ExtGState", "GS");
        merge_resource(doc, &mut page, "ExtGState", &name, gs);
        gs_name = Some(name);
    }

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "BDC",
            vec![
                "Artifact".into(),
                Object::Dictionary(dictionary! {
                    "Type" => "Pagination",
                    "Subtype" => "Watermark",
                }),
            ],
        ),
    ];
    let [a, b, c, d, e, f] = matrix.cm_operands();
    ops.push(Operation::new("cm", vec![a.into(), b.into(), c.into(), d.into(), e.into(), f.into()]));
    if let Some(gs) = &gs_name {
        ops.push(Operation::new("gs", vec![gs.as_str().into()]));
    }
    ops.push(Operation::new("Do", vec![form_name.as_str().into()]));
    ops.push(Operation::new("EMC", vec![]));
    ops.push(Operation::new("Q", vec![]));

    let content = PdfContent { operations: ops };
    let wrapper_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let mut contents_array = Vec::new();
    let original = page.get(b"Contents").ok().cloned();
    if wm.on_top {
        // Stamp: the original paints first, the overlay on top of it. Brace
        // the original in `q`/`Q` so any graphics state it leaves unbalanced
        // (a stray `cm` with no matching `Q`, not uncommon in the wild)
        // can't leak into the overlay's own placement (spec §4.5 step 7).
        if let Some(orig) = &original {
            contents_array.push(Object::Reference(bracket_stream(doc, "q")?));
            push_contents(orig, &mut contents_array);
            contents_array.push(Object::Reference(bracket_stream(doc, "Q")?));
        }
        contents_array.push(Object::Reference(wrapper_id));
    } else {
        contents_array.push(Object::Reference(wrapper_id));
        if let Some(orig) = &original {
            push_contents(orig, &mut contents_array);
        }
    }
    page.set("Contents", Object::Array(contents_array));

    ctx.patched_streams.extend(original_numbers);
    doc.objects.insert(page_id, Object::Dictionary(page));

    Ok(())
}

/// A minimal stream containing only the single operator `op` (`q` or `Q`),
/// used to bracket the original content when stamping on top (spec §4.5
/// step 7). Since the original content stream(s) are never decoded or
/// rewritten here (they're referenced, not mutated, so a stream shared by
/// several pages stays untouched), the enclosing `q`/`Q` the spec prepends
/// and appends textually is instead spliced in as its own array element —
/// content streams in a `Contents` array concatenate, so this is byte-for-
/// byte the same result as prepending/appending the operator to the
/// original stream's own bytes.
fn bracket_stream(doc: &mut Document, op: &str) -> Result<ObjectId> {
    let content = PdfContent { operations: vec![Operation::new(op, vec![])] };
    Ok(doc.add_object(Stream::new(dictionary! {}, content.encode()?)))
}

fn push_contents(original: &Object, out: &mut Vec<Object>) {
    match original {
        Object::Reference(_) => out.push(original.clone()),
        Object::Array(arr) => out.extend(arr.iter().cloned()),
        _ => {}
    }
}
