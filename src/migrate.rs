//! Object-graph migration (spec §4.4): copy a donor PDF page's content and
//! resources into the host document as a single self-contained Form XObject.
//!
//! Grounded on the whole-document renumbering approach in
//! pdf-overlay.rs's `combine_pdfs` (donor ids are reassigned starting from
//! the host's current allocator position), narrowed to a transitive closure
//! over just the page's `Resources` subgraph rather than the whole donor
//! document, since we are embedding one page as an overlay, not merging page
//! trees.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::filters;

fn to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn media_box(doc: &Document, mut page: &Dictionary) -> Result<(f64, f64)> {
    let mut owned;
    loop {
        if let Ok(mb) = page.get(b"MediaBox") {
            if let Some(Object::Array(arr)) = resolve(doc, mb) {
                if arr.len() == 4 {
                    let x1 = to_f64(&arr[0]).ok_or(Error::NoContent)?;
                    let y1 = to_f64(&arr[1]).ok_or(Error::NoContent)?;
                    let x2 = to_f64(&arr[2]).ok_or(Error::NoContent)?;
                    let y2 = to_f64(&arr[3]).ok_or(Error::NoContent)?;
                    return Ok(((x2 - x1).abs(), (y2 - y1).abs()));
                }
            }
        }
        match page.get(b"Parent").ok().and_then(|p| resolve(doc, p)) {
            Some(Object::Dictionary(parent)) => {
                owned = parent.clone();
                page = &owned;
            }
            _ => return Err(Error::NoContent),
        }
    }
}

/// Collect the page's decoded content-stream bytes, concatenated if
/// `Contents` is an array (spec §4.5 treats multi-stream `Contents` as one
/// logical stream; the same holds for a donor page).
fn page_content(doc: &Document, page: &Dictionary) -> Result<Vec<u8>> {
    let contents = page.get(b"Contents").map_err(|_| Error::NoContent)?;
    let mut out = Vec::new();
    match contents {
        Object::Reference(id) => {
            let stream = doc.get_object(*id).ok().and_then(|o| o.as_stream().ok()).ok_or(Error::NoContent)?;
            out.extend(filters::decode(&stream.dict, &stream.content)?);
        }
        Object::Array(arr) => {
            for item in arr {
                if let Object::Reference(id) = item {
                    if let Ok(stream) = doc.get_object(*id).and_then(|o| o.as_stream()) {
                        out.extend(filters::decode(&stream.dict, &stream.content)?);
                        out.push(b'\n');
                    }
                }
            }
        }
        _ => return Err(Error::NoContent),
    }
    if out.is_empty() {
        return Err(Error::NoContent);
    }
    Ok(out)
}

/// Walk the transitive closure of objects reachable from `root`, collecting
/// every `(id, object)` pair encountered (spec §4.4 step 1).
fn collect_closure(doc: &Document, root: ObjectId, out: &mut HashMap<ObjectId, Object>) {
    if out.contains_key(&root) {
        return;
    }
    let Ok(obj) = doc.get_object(root) else { return };
    out.insert(root, obj.clone());
    walk_refs(doc, obj, out);
}

fn walk_refs(doc: &Document, obj: &Object, out: &mut HashMap<ObjectId, Object>) {
    match obj {
        Object::Reference(id) => collect_closure(doc, *id, out),
        Object::Dictionary(dict) => {
            for (_, v) in dict.iter() {
                walk_refs(doc, v, out);
            }
        }
        Object::Stream(stream) => {
            for (_, v) in stream.dict.iter() {
                walk_refs(doc, v, out);
            }
        }
        Object::Array(arr) => {
            for v in arr {
                walk_refs(doc, v, out);
            }
        }
        _ => {}
    }
}

/// Rewrite every `Object::Reference` inside `obj` through `map`, leaving
/// references outside the migrated closure untouched.
fn remap_refs(obj: &Object, map: &HashMap<ObjectId, ObjectId>) -> Object {
    match obj {
        Object::Reference(id) => match map.get(id) {
            Some(new_id) => Object::Reference(*new_id),
            None => obj.clone(),
        },
        Object::Dictionary(dict) => {
            let mut new_dict = Dictionary::new();
            for (k, v) in dict.iter() {
                new_dict.set(k.clone(), remap_refs(v, map));
            }
            Object::Dictionary(new_dict)
        }
        Object::Stream(stream) => {
            let mut new_dict = Dictionary::new();
            for (k, v) in stream.dict.iter() {
                new_dict.set(k.clone(), remap_refs(v, map));
            }
            Object::Stream(Stream::new(new_dict, stream.content.clone()))
        }
        Object::Array(arr) => Object::Array(arr.iter().map(|v| remap_refs(v, map)).collect()),
        other => other.clone(),
    }
}

/// Migrate page `page_number` (1-based) of the PDF at `donor_path` into
/// `host` as a single Form XObject, returning its object id and the donor
/// page's width/height in PDF user-space units.
pub fn migrate_donor_page(
    host: &mut Document,
    donor_path: &Path,
    page_number: u32,
) -> Result<(ObjectId, f64, f64)> {
    let donor = Document::load(donor_path).map_err(Error::Pdf)?;

    let page_id = donor
        .page_iter()
        .nth(page_number.saturating_sub(1) as usize)
        .ok_or(Error::UnknownPage(page_number as i64))?;
    let page = donor
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(Error::Pdf)?
        .clone();

    let (width, height) = media_box(&donor, &page)?;
    let content = page_content(&donor, &page)?;

    let resources = page.get(b"Resources").ok().cloned().unwrap_or(Object::Dictionary(dictionary! {}));

    let mut closure = HashMap::new();
    walk_refs(&donor, &resources, &mut closure);

    let mut id_map: HashMap<ObjectId, ObjectId> = HashMap::new();
    for old_id in closure.keys() {
        id_map.insert(*old_id, host.new_object_id());
    }

    for (old_id, obj) in &closure {
        let remapped = remap_refs(obj, &id_map);
        host.objects.insert(id_map[old_id], remapped);
    }

    let remapped_resources = remap_refs(&resources, &id_map);

    let form_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![0.0.into(), 0.0.into(), width.into(), height.into()],
        "Resources" => remapped_resources,
    };
    let form_id = host.add_object(Stream::new(form_dict, content));

    Ok((form_id, width, height))
}
