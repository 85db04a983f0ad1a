//! Raster image decoder (spec §6 image contract).
//!
//! JPEG is embedded as-is via `DCTDecode` — the PDF image stream format and
//! the JPEG bitstream are the same bytes, so no recompression is needed.
//! PNG and TIFF are decoded to raw samples with the `image` crate and
//! recompressed with `FlateDecode`, since PDF has no native container for
//! either format.

use std::path::Path;

use image::{ColorType, GenericImageView};
use lopdf::{dictionary, Dictionary};

use crate::error::{Error, Result};
use crate::filters;

/// A decoded image ready to be embedded as an `XObject`/`Image` stream.
pub struct DecodedImage {
    pub dict: Dictionary,
    pub data: Vec<u8>,
    pub width: f64,
    pub height: f64,
}

const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];

/// Decode the image at `path` into PDF image-stream form.
pub fn decode_image(path: &Path) -> Result<DecodedImage> {
    let bytes = std::fs::read(path).map_err(Error::Io)?;

    if bytes.starts_with(&JPEG_MAGIC) {
        return decode_jpeg(&bytes);
    }

    let img = image::load_from_memory(&bytes).map_err(|e| Error::Image(e.to_string()))?;
    let (width, height) = img.dimensions();

    let (color_space, bits_per_component, samples) = match img.color() {
        ColorType::L8 | ColorType::L16 => {
            let gray = img.to_luma8();
            ("DeviceGray", 8, gray.into_raw())
        }
        ColorType::La8 | ColorType::La16 => {
            let gray = img.to_luma8();
            ("DeviceGray", 8, gray.into_raw())
        }
        _ => {
            let rgb = img.to_rgb8();
            ("DeviceRGB", 8, rgb.into_raw())
        }
    };

    let compressed = filters::encode_flate(&samples)?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => bits_per_component as i64,
        "Filter" => "FlateDecode",
    };

    Ok(DecodedImage {
        dict,
        data: compressed,
        width: width as f64,
        height: height as f64,
    })
}

fn decode_jpeg(bytes: &[u8]) -> Result<DecodedImage> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    let (width, height) = img.dimensions();
    let color_space = match img.color() {
        ColorType::L8 | ColorType::L16 => "DeviceGray",
        _ => "DeviceRGB",
    };

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8_i64,
        "Filter" => "DCTDecode",
    };

    Ok(DecodedImage {
        dict,
        data: bytes.to_vec(),
        width: width as f64,
        height: height as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_magic_detection() {
        assert!([0xFFu8, 0xD8].starts_with(&JPEG_MAGIC));
    }
}
