//! Watermark remover (spec §4.6).
//!
//! Every watermark this engine paints lives in its own wrapper content
//! stream, marked `/Artifact <</Subtype /Watermark /Type /Pagination>>
//! BDC ... EMC` (spec §4.5 step 4). Removal never decodes or rewrites a
//! stream's *operators* — it only has to recognize which element of a
//! page's `Contents` array is one of these wrapper streams and drop the
//! reference, the mirror image of how patch.rs adds one.

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::warn;

use crate::error::{Error, Result};
use crate::filters;

fn root_dict(doc: &Document) -> Option<lopdf::Dictionary> {
    match doc.trailer.get(b"Root").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok().cloned(),
        Object::Dictionary(d) => Some(d.clone()),
        _ => None,
    }
}

const MARKER_TYPE: &[u8] = b"/Pagination";
const MARKER_SUBTYPE: &[u8] = b"/Watermark";
const MARKER_TAG: &[u8] = b"/Artifact";

/// Decode `stream_id`'s content if it's a watermark wrapper, returning the
/// decoded bytes. An `UnsupportedFilter` hit here is non-fatal (spec §7):
/// logged, and the stream is treated as not-a-wrapper so removal skips it.
fn decode_if_wrapper(doc: &Document, stream_id: ObjectId) -> Option<Vec<u8>> {
    let Ok(Object::Stream(stream)) = doc.get_object(stream_id) else { return None };
    let decoded = match filters::decode(&stream.dict, &stream.content) {
        Ok(d) => d,
        Err(Error::UnsupportedFilter(name)) => {
            warn!(filter = %name, ?stream_id, "unsupported filter on content stream during removal, skipping");
            return None;
        }
        Err(_) => return None,
    };
    if contains(&decoded, MARKER_TAG) && contains(&decoded, MARKER_SUBTYPE) && contains(&decoded, MARKER_TYPE) {
        Some(decoded)
    } else {
        None
    }
}

fn is_watermark_wrapper(doc: &Document, stream_id: ObjectId) -> bool {
    decode_if_wrapper(doc, stream_id).is_some()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Parse the `/GS<n> gs` and `/Fm<n> Do` resource names referenced by a
/// decoded wrapper stream (spec §4.6 step 2), so the caller can free the
/// `ExtGState`/`XObject` entries those names point to.
fn referenced_resource_names(decoded: &[u8]) -> (Vec<String>, Vec<String>) {
    let text = String::from_utf8_lossy(decoded);
    let mut gs_names = Vec::new();
    let mut xobj_names = Vec::new();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for pair in tokens.windows(2) {
        let (name_tok, op) = (pair[0], pair[1]);
        if let Some(name) = name_tok.strip_prefix('/') {
            match op {
                "gs" => gs_names.push(name.to_string()),
                "Do" => xobj_names.push(name.to_string()),
                _ => {}
            }
        }
    }
    (gs_names, xobj_names)
}

/// Remove `names` from the page's `Resources/{category}` subdictionary,
/// freeing the objects they referenced and dropping the subdictionary
/// entirely if it becomes empty (spec §4.6 step 3).
fn free_resource_entries(doc: &mut Document, page: &mut Dictionary, category: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    let Some(resources_obj) = page.get(b"Resources").ok().cloned() else { return };
    let (resources_id, mut resources) = match &resources_obj {
        Object::Dictionary(d) => (None, d.clone()),
        Object::Reference(id) => match doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()) {
            Some(d) => (Some(*id), d.clone()),
            None => return,
        },
        _ => return,
    };

    let Some(cat_obj) = resources.get(category.as_bytes()).ok().cloned() else { return };
    let (cat_id, mut cat_dict) = match &cat_obj {
        Object::Dictionary(d) => (None, d.clone()),
        Object::Reference(id) => match doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()) {
            Some(d) => (Some(*id), d.clone()),
            None => return,
        },
        _ => return,
    };

    for name in names {
        if let Ok(Object::Reference(obj_id)) = cat_dict.get(name.as_bytes()) {
            doc.objects.remove(obj_id);
        }
        cat_dict.remove(name.as_bytes());
    }

    if cat_dict.is_empty() {
        resources.remove(category.as_bytes());
        if let Some(id) = cat_id {
            doc.objects.remove(&id);
        }
    } else if let Some(id) = cat_id {
        doc.objects.insert(id, Object::Dictionary(cat_dict));
    } else {
        resources.set(category, Object::Dictionary(cat_dict));
    }

    if let Some(id) = resources_id {
        doc.objects.insert(id, Object::Dictionary(resources));
    } else {
        page.set("Resources", Object::Dictionary(resources));
    }
}

/// Whether the document has any `OCProperties/OCGs` entries at all — a
/// document with none was never stamped by this engine, so removal can
/// short-circuit (spec §4.6 precondition).
pub fn has_any_ocg(doc: &Document) -> bool {
    let Some(catalog) = root_dict(doc) else { return false };
    let Ok(ocp) = catalog.get(b"OCProperties") else { return false };
    let ocp = match ocp {
        Object::Dictionary(d) => d.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => return false,
        },
        _ => return false,
    };
    matches!(ocp.get(b"OCGs"), Ok(Object::Array(arr)) if !arr.is_empty())
}

/// Remove every watermark wrapper stream from `page_id`'s `Contents`,
/// returning `true` if anything was removed. Also frees the `ExtGState`/
/// `XObject` resource entries those wrappers referenced, removing a
/// subdictionary entirely once it's empty (spec §4.6 steps 2-3).
pub fn remove_from_page(doc: &mut Document, page_id: ObjectId) -> Result<bool> {
    let page = doc.get_object(page_id).and_then(|o| o.as_dict()).map_err(Error::Pdf)?.clone();
    let Ok(contents) = page.get(b"Contents") else { return Ok(false) };

    let mut gs_names = Vec::new();
    let mut xobj_names = Vec::new();

    let (kept, removed_any): (Vec<Object>, bool) = match contents {
        Object::Reference(id) => match decode_if_wrapper(doc, *id) {
            Some(decoded) => {
                let (gs, xo) = referenced_resource_names(&decoded);
                gs_names.extend(gs);
                xobj_names.extend(xo);
                (Vec::new(), true)
            }
            None => (vec![Object::Reference(*id)], false),
        },
        Object::Array(arr) => {
            let mut kept = Vec::new();
            let mut removed_any = false;
            for item in arr {
                match item {
                    Object::Reference(id) => match decode_if_wrapper(doc, *id) {
                        Some(decoded) => {
                            let (gs, xo) = referenced_resource_names(&decoded);
                            gs_names.extend(gs);
                            xobj_names.extend(xo);
                            removed_any = true;
                        }
                        None => kept.push(Object::Reference(*id)),
                    },
                    other => kept.push(other.clone()),
                }
            }
            (kept, removed_any)
        }
        _ => (Vec::new(), false),
    };

    if !removed_any {
        return Ok(false);
    }

    let mut page = page;
    match kept.len() {
        0 => {
            page.remove(b"Contents");
        }
        1 => page.set("Contents", kept.into_iter().next().unwrap()),
        _ => page.set("Contents", Object::Array(kept)),
    }

    free_resource_entries(doc, &mut page, "ExtGState", &gs_names);
    free_resource_entries(doc, &mut page, "XObject", &xobj_names);

    doc.objects.insert(page_id, Object::Dictionary(page));
    Ok(true)
}

/// Remove watermarks from every page in `page_ids`, erroring
/// [`Error::NoWatermarksFound`] if none existed (spec §4.6).
pub fn remove_all(doc: &mut Document, page_ids: &[ObjectId]) -> Result<usize> {
    if !has_any_ocg(doc) {
        return Err(Error::NoWatermarksFound);
    }
    let mut count = 0;
    for &page_id in page_ids {
        if remove_from_page(doc, page_id)? {
            count += 1;
        }
    }
    if count == 0 {
        return Err(Error::NoWatermarksFound);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content as PdfContent, Operation};
    use lopdf::{dictionary, Stream};

    fn marker_stream(doc: &mut Document) -> ObjectId {
        let ops = vec![
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
            Operation::new("Do", vec!["Fm0".into()]),
            Operation::new("EMC", vec![]),
            Operation::new("Q", vec![]),
        ];
        let content = PdfContent { operations: ops }.encode().unwrap();
        doc.add_object(Stream::new(dictionary! {}, content))
    }

    fn plain_stream(doc: &mut Document) -> ObjectId {
        let ops = vec![Operation::new("re", vec![0.into(), 0.into(), 10.into(), 10.into()])];
        let content = PdfContent { operations: ops }.encode().unwrap();
        doc.add_object(Stream::new(dictionary! {}, content))
    }

    #[test]
    fn detects_marker_stream() {
        let mut doc = Document::with_version("1.7");
        let marker = marker_stream(&mut doc);
        assert!(is_watermark_wrapper(&doc, marker));
    }

    #[test]
    fn plain_stream_is_not_a_marker() {
        let mut doc = Document::with_version("1.7");
        let plain = plain_stream(&mut doc);
        assert!(!is_watermark_wrapper(&doc, plain));
    }

    #[test]
    fn remove_from_page_strips_wrapper_from_array() {
        let mut doc = Document::with_version("1.7");
        let marker = marker_stream(&mut doc);
        let original = plain_stream(&mut doc);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => vec![Object::Reference(marker), Object::Reference(original)],
        });

        let removed = remove_from_page(&mut doc, page_id).unwrap();
        assert!(removed);
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        assert_eq!(page.get(b"Contents").unwrap(), &Object::Reference(original));
    }

    #[test]
    fn remove_from_page_is_noop_without_marker() {
        let mut doc = Document::with_version("1.7");
        let original = plain_stream(&mut doc);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => original,
        });
        assert!(!remove_from_page(&mut doc, page_id).unwrap());
    }

    fn marker_stream_with_gs(doc: &mut Document) -> ObjectId {
        let ops = vec![
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
            Operation::new("gs", vec!["GS0".into()]),
            Operation::new("Do", vec!["Fm0".into()]),
            Operation::new("EMC", vec![]),
            Operation::new("Q", vec![]),
        ];
        let content = PdfContent { operations: ops }.encode().unwrap();
        doc.add_object(Stream::new(dictionary! {}, content))
    }

    #[test]
    fn remove_frees_gs_and_form_resource_entries() {
        let mut doc = Document::with_version("1.7");
        let marker = marker_stream_with_gs(&mut doc);
        let form_id = doc.add_object(dictionary! { "Type" => "XObject", "Subtype" => "Form" });
        let gs_id = doc.add_object(dictionary! { "Type" => "ExtGState" });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => vec![Object::Reference(marker)],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Fm0" => form_id },
                "ExtGState" => dictionary! { "GS0" => gs_id },
            },
        });

        assert!(remove_from_page(&mut doc, page_id).unwrap());

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(!resources.has(b"XObject"));
        assert!(!resources.has(b"ExtGState"));
        assert!(doc.get_object(form_id).is_err());
        assert!(doc.get_object(gs_id).is_err());
    }
}
