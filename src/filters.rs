//! Stream filter layer (spec §6 "Filter" contract).
//!
//! Only `FlateDecode` is implemented; any other named filter is rejected
//! with [`Error::UnsupportedFilter`] rather than silently passed through,
//! since we cannot otherwise guarantee the bytes we hand back are the
//! stream's actual content.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Object};

use crate::error::{Error, Result};

fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| match o {
                Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode `raw` per `dict`'s `Filter` entry. An empty/absent `Filter` is a
/// passthrough.
pub fn decode(dict: &Dictionary, raw: &[u8]) -> Result<Vec<u8>> {
    let names = filter_names(dict);
    if names.is_empty() {
        return Ok(raw.to_vec());
    }
    let mut data = raw.to_vec();
    for name in &names {
        data = match name.as_str() {
            "FlateDecode" | "Fl" => {
                let mut decoder = ZlibDecoder::new(&data[..]);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).map_err(Error::Io)?;
                out
            }
            other => return Err(Error::UnsupportedFilter(other.to_string())),
        };
    }
    Ok(data)
}

/// Compress `raw` with `FlateDecode`, returning the encoded bytes.
pub fn encode_flate(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).map_err(Error::Io)?;
    encoder.finish().map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn passthrough_with_no_filter() {
        let dict = dictionary! {};
        let data = b"hello".to_vec();
        assert_eq!(decode(&dict, &data).unwrap(), data);
    }

    #[test]
    fn flate_round_trips() {
        let raw = b"the quick brown fox jumps over the lazy dog".to_vec();
        let encoded = encode_flate(&raw).unwrap();
        let dict = dictionary! { "Filter" => "FlateDecode" };
        let decoded = decode(&dict, &encoded).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn unknown_filter_errors() {
        let dict = dictionary! { "Filter" => "LZWDecode" };
        assert!(decode(&dict, b"x").is_err());
    }

    #[test]
    fn filter_array_applies_each_stage() {
        let raw = b"chained".to_vec();
        let encoded = encode_flate(&raw).unwrap();
        let dict = dictionary! { "Filter" => vec![Object::Name(b"FlateDecode".to_vec())] };
        assert_eq!(decode(&dict, &encoded).unwrap(), raw);
    }
}
