//! Top-level entry points (spec §4.7): `AddWatermarks` and
//! `RemoveWatermarks`. These own the once-per-document setup (the optional
//! content group, the opacity `ExtGState`, the donor content embedded once
//! and reused across pages) and drive [`patch`]/[`remove`] per page.

use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::info;

use crate::config;
use crate::error::{Error, Result};
use crate::migrate;
use crate::patch;
use crate::raster;
use crate::remove;
use crate::watermark::{Content, WatermarkCtx, WatermarkSpec};

/// Parse a `--pages` selector (`"1,3-5,8"`) into a set of 1-based page
/// numbers. `None` selects every page.
pub fn parse_page_selector(selector: &str) -> Result<Vec<u32>> {
    let mut pages = Vec::new();
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.trim().parse().map_err(|_| Error::Parse(format!("invalid page range: \"{part}\"")))?;
            let hi: u32 = hi.trim().parse().map_err(|_| Error::Parse(format!("invalid page range: \"{part}\"")))?;
            if lo == 0 || hi < lo {
                return Err(Error::Parse(format!("invalid page range: \"{part}\"")));
            }
            pages.extend(lo..=hi);
        } else {
            let n: u32 = part.parse().map_err(|_| Error::Parse(format!("invalid page number: \"{part}\"")))?;
            if n == 0 {
                return Err(Error::Parse(format!("invalid page number: \"{part}\"")));
            }
            pages.push(n);
        }
    }
    Ok(pages)
}

fn selected_page_ids(doc: &Document, selector: Option<&str>) -> Result<Vec<ObjectId>> {
    let all: Vec<ObjectId> = doc.page_iter().collect();
    match selector {
        None => Ok(all),
        Some(s) => {
            let numbers = parse_page_selector(s)?;
            numbers
                .into_iter()
                .map(|n| all.get(n as usize - 1).copied().ok_or(Error::PageNotFound(n)))
                .collect()
        }
    }
}

fn root_dict_id(doc: &Document) -> Result<ObjectId> {
    match doc.trailer.get(b"Root").map_err(Error::Pdf)? {
        Object::Reference(id) => Ok(*id),
        _ => Err(Error::CorruptResourceDict("trailer Root is not an indirect reference".to_string())),
    }
}

/// Ensure `OCProperties` exists in the catalog, returning the overlay's OCG
/// reference (spec §4.7 step 1): if `OCProperties/OCGs` already has at least
/// one entry, reuse its first reference rather than allocating a new OCG;
/// otherwise allocate one (spec §3) and populate `OCProperties` with `AS`
/// entries for the View/Print/Export intents, `ON` listing the OCG, and
/// empty `Order`/`RBGroups`.
fn setup_ocg(doc: &mut Document, name: &str) -> Result<ObjectId> {
    let root_id = root_dict_id(doc)?;
    let existing = doc
        .get_object(root_id)
        .and_then(|o| o.as_dict())
        .ok()
        .and_then(|d| d.get(b"OCProperties").ok())
        .cloned();

    if let Some(existing_obj) = &existing {
        let ocp_dict = match existing_obj {
            Object::Dictionary(d) => Some(d.clone()),
            Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()).cloned(),
            _ => None,
        };
        if let Some(ocp) = ocp_dict {
            if let Ok(Object::Array(ocgs)) = ocp.get(b"OCGs") {
                if let Some(Object::Reference(first)) = ocgs.first() {
                    return Ok(*first);
                }
            }
        }
    }

    let ocg_id = doc.add_object(dictionary! {
        "Type" => "OCG",
        "Name" => Object::String(name.as_bytes().to_vec(), lopdf::StringFormat::Literal),
        "Usage" => dictionary! {
            "View" => dictionary! { "ViewState" => "ON" },
            "Print" => dictionary! { "Subtype" => "Print", "PrintState" => "ON" },
            "Export" => dictionary! { "ExportState" => "ON" },
        },
    });

    let intent_dict = dictionary! {
        "OCGs" => vec![Object::Reference(ocg_id)],
        "P" => "OC",
    };
    let new_ocp = Object::Dictionary(dictionary! {
        "OCGs" => vec![Object::Reference(ocg_id)],
        "D" => dictionary! {
            "Name" => Object::String(b"Default".to_vec(), lopdf::StringFormat::Literal),
            "BaseState" => "ON",
            "AS" => vec![
                Object::Dictionary({
                    let mut d = intent_dict.clone();
                    d.set("Event", "View");
                    d
                }),
                Object::Dictionary({
                    let mut d = intent_dict.clone();
                    d.set("Event", "Print");
                    d
                }),
                Object::Dictionary({
                    let mut d = intent_dict;
                    d.set("Event", "Export");
                    d
                }),
            ],
            "ON" => vec![Object::Reference(ocg_id)],
            "Order" => Vec::<Object>::new(),
            "RBGroups" => Vec::<Object>::new(),
        },
    });

    if let Ok(Object::Dictionary(root)) = doc.get_object_mut(root_id) {
        root.set("OCProperties", new_ocp);
    }

    Ok(ocg_id)
}

/// Bump the document's declared PDF version to at least `1.5`, the first
/// version specifying optional content groups (spec §4.7 last step).
fn bump_version_for_optional_content(doc: &mut Document) {
    let current: f64 = doc.version.parse().unwrap_or(1.0);
    if current < 1.5 {
        doc.version = "1.5".to_string();
    }
}

fn setup_once(doc: &mut Document, wm: &WatermarkSpec, ctx: &mut WatermarkCtx, donor_path: Option<&Path>) -> Result<()> {
    bump_version_for_optional_content(doc);
    ctx.ocg = Some(setup_ocg(doc, "Watermark")?);
    ctx.ext_gstate = Some(doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => wm.opacity,
        "CA" => wm.opacity,
    }));

    match &wm.content {
        Content::Text { .. } => {
            ctx.font_ref = Some(doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => wm.font_name.base_font(),
                "Encoding" => "WinAnsiEncoding",
            }));
        }
        Content::Image { path } => {
            let img = raster::decode_image(path)?;
            let stream = Stream::new(img.dict, img.data);
            ctx.image_ref = Some(doc.add_object(stream));
            ctx.donor_width = img.width;
            ctx.donor_height = img.height;
        }
        Content::PdfPage { page, .. } => {
            let path = donor_path.expect("pdf-page content must carry a donor path");
            let (form_id, w, h) = migrate::migrate_donor_page(doc, path, *page)?;
            ctx.donor_form = Some(form_id);
            ctx.donor_width = w;
            ctx.donor_height = h;
        }
    }

    Ok(())
}

/// `AddWatermarks` (spec §4.7): stamp or watermark every selected page of
/// the PDF at `input_path`, writing the result to `output_path`.
pub fn add_watermarks(
    input_path: &Path,
    output_path: &Path,
    spec_str: &str,
    on_top: bool,
    page_selector: Option<&str>,
) -> Result<()> {
    let mut doc = Document::load(input_path).map_err(Error::Pdf)?;
    info!(input = %input_path.display(), "loaded document");

    let wm = config::parse(spec_str, on_top)?;
    let donor_path = match &wm.content {
        Content::PdfPage { path, .. } => Some(path.clone()),
        _ => None,
    };

    let mut ctx = WatermarkCtx::new();
    setup_once(&mut doc, &wm, &mut ctx, donor_path.as_deref())?;

    let pages = selected_page_ids(&doc, page_selector)?;
    for page_id in pages {
        patch::patch_page(&mut doc, page_id, &wm, &mut ctx)?;
    }

    doc.compress();
    doc.save(output_path).map_err(Error::Pdf)?;
    info!(output = %output_path.display(), "saved document");
    Ok(())
}

/// `RemoveWatermarks` (spec §4.7): strip every watermark this engine added
/// from the selected pages of the PDF at `input_path`.
pub fn remove_watermarks(input_path: &Path, output_path: &Path, page_selector: Option<&str>) -> Result<usize> {
    let mut doc = Document::load(input_path).map_err(Error::Pdf)?;
    let pages = selected_page_ids(&doc, page_selector)?;
    let count = remove::remove_all(&mut doc, &pages)?;

    doc.compress();
    doc.save(output_path).map_err(Error::Pdf)?;
    info!(output = %output_path.display(), removed = count, "saved document");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_selector_parses_mixed_ranges() {
        assert_eq!(parse_page_selector("1,3-5,8").unwrap(), vec![1, 3, 4, 5, 8]);
    }

    #[test]
    fn page_selector_rejects_zero() {
        assert!(parse_page_selector("0").is_err());
    }

    #[test]
    fn page_selector_rejects_descending_range() {
        assert!(parse_page_selector("5-2").is_err());
    }

    #[test]
    fn page_selector_empty_elements_are_skipped() {
        assert_eq!(parse_page_selector("1,,2").unwrap(), vec![1, 2]);
    }

    fn doc_with_catalog() -> Document {
        let mut doc = Document::with_version("1.4");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn setup_ocg_creates_one_when_none_exists() {
        let mut doc = doc_with_catalog();
        let ocg = setup_ocg(&mut doc, "Watermark").unwrap();
        let root_id = root_dict_id(&doc).unwrap();
        let root = doc.get_object(root_id).unwrap().as_dict().unwrap();
        let ocp = root.get(b"OCProperties").unwrap().as_dict().unwrap();
        let ocgs = ocp.get(b"OCGs").unwrap().as_array().unwrap();
        assert_eq!(ocgs, &vec![Object::Reference(ocg)]);
    }

    #[test]
    fn setup_ocg_reuses_existing_first_entry() {
        let mut doc = doc_with_catalog();
        let existing_ocg = doc.add_object(dictionary! { "Type" => "OCG", "Name" => "Background" });
        let root_id = root_dict_id(&doc).unwrap();
        if let Ok(Object::Dictionary(root)) = doc.get_object_mut(root_id) {
            root.set(
                "OCProperties",
                dictionary! { "OCGs" => vec![Object::Reference(existing_ocg)] },
            );
        }

        let reused = setup_ocg(&mut doc, "Watermark").unwrap();
        assert_eq!(reused, existing_ocg);
    }

    #[test]
    fn bump_version_raises_below_1_5() {
        let mut doc = Document::with_version("1.3");
        bump_version_for_optional_content(&mut doc);
        assert_eq!(doc.version, "1.5");
    }

    #[test]
    fn bump_version_leaves_newer_version_alone() {
        let mut doc = Document::with_version("1.7");
        bump_version_for_optional_content(&mut doc);
        assert_eq!(doc.version, "1.7");
    }
}
