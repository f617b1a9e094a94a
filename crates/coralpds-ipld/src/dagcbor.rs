//! Deterministic DAG-CBOR encoding.
//!
//! This is a strict subset of CBOR: definite lengths only, smallest-width
//! integer heads, map keys sorted length-then-bytes, and CID links as tag
//! 42 wrapping `0x00 ‖ cid-bytes`. CIDs, signatures, CAR archives, and
//! firehose frames all hash or sign this exact byte output, so the encoder
//! lives in-tree rather than behind a serde layer.

use std::cmp::Ordering;

use crate::cid::Cid;
use crate::error::{IpldError, IpldResult};

/// A value in the DAG-CBOR data model.
///
/// Map entries are kept as a plain vector; the encoder sorts them into the
/// canonical order, so callers may build maps in any order.
#[derive(Debug, Clone, PartialEq)]
pub enum DagValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<DagValue>),
    Map(Vec<(String, DagValue)>),
    Link(Cid),
}

impl DagValue {
    pub fn text(s: impl Into<String>) -> Self {
        DagValue::Text(s.into())
    }

    /// Lower a JSON value into the DAG-CBOR data model.
    ///
    /// Integral numbers become integers, everything else maps structurally.
    /// An object of the single form `{"$link": "<cid>"}` becomes a link,
    /// which is how record JSON references blobs and other records.
    pub fn from_json(value: &serde_json::Value) -> IpldResult<Self> {
        use serde_json::Value;
        Ok(match value {
            Value::Null => DagValue::Null,
            Value::Bool(b) => DagValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DagValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    DagValue::Float(f)
                } else {
                    return Err(IpldError::Encode(format!("unrepresentable number: {n}")));
                }
            }
            Value::String(s) => DagValue::Text(s.clone()),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(DagValue::from_json(item)?);
                }
                DagValue::List(list)
            }
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(s)) = map.get("$link") {
                        let cid = Cid::try_parse(s)
                            .ok_or_else(|| IpldError::InvalidCid(s.clone()))?;
                        return Ok(DagValue::Link(cid));
                    }
                }
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    entries.push((k.clone(), DagValue::from_json(v)?));
                }
                DagValue::Map(entries)
            }
        })
    }
}

/// The canonical map-key order: UTF-8 byte length ascending, then
/// lexicographic byte order. MST keys sort the same way.
pub fn key_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

/// Encode a value to its deterministic DAG-CBOR byte form.
pub fn encode(value: &DagValue) -> IpldResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(&mut buf, value)?;
    Ok(buf)
}

pub fn encode_into(buf: &mut Vec<u8>, value: &DagValue) -> IpldResult<()> {
    match value {
        DagValue::Null => buf.push(0xf6),
        DagValue::Bool(false) => buf.push(0xf4),
        DagValue::Bool(true) => buf.push(0xf5),
        DagValue::Integer(i) => {
            if *i >= 0 {
                write_head(buf, 0, *i as u64);
            } else {
                write_head(buf, 1, -(i + 1) as u64);
            }
        }
        DagValue::Float(f) => {
            // Floats are always 64-bit in DAG-CBOR.
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        DagValue::Bytes(b) => {
            write_head(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        DagValue::Text(s) => {
            write_head(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        DagValue::List(items) => {
            write_head(buf, 4, items.len() as u64);
            for item in items {
                encode_into(buf, item)?;
            }
        }
        DagValue::Map(entries) => {
            let mut sorted: Vec<&(String, DagValue)> = entries.iter().collect();
            sorted.sort_by(|a, b| key_order(&a.0, &b.0));
            for pair in sorted.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(IpldError::Encode(format!("duplicate map key: {}", pair[0].0)));
                }
            }
            write_head(buf, 5, sorted.len() as u64);
            for (key, val) in sorted {
                write_head(buf, 3, key.len() as u64);
                buf.extend_from_slice(key.as_bytes());
                encode_into(buf, val)?;
            }
        }
        DagValue::Link(cid) => {
            write_head(buf, 6, 42);
            write_head(buf, 2, 1 + cid.as_bytes().len() as u64);
            buf.push(0x00);
            buf.extend_from_slice(cid.as_bytes());
        }
    }
    Ok(())
}

/// Write a CBOR head with the smallest argument encoding.
fn write_head(buf: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    if arg < 24 {
        buf.push(major | arg as u8);
    } else if arg <= 0xff {
        buf.push(major | 24);
        buf.push(arg as u8);
    } else if arg <= 0xffff {
        buf.push(major | 25);
        buf.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= 0xffff_ffff {
        buf.push(major | 26);
        buf.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        buf.push(major | 27);
        buf.extend_from_slice(&arg.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enc(value: DagValue) -> String {
        hex::encode(encode(&value).unwrap())
    }

    #[test]
    fn map_keys_sort_length_then_bytes() {
        let v = DagValue::Map(vec![
            ("b".to_string(), DagValue::Integer(1)),
            ("a".to_string(), DagValue::Integer(2)),
        ]);
        assert_eq!(enc(v), "a2616102616201");

        let v = DagValue::Map(vec![
            ("aa".to_string(), DagValue::Integer(1)),
            ("b".to_string(), DagValue::Integer(2)),
        ]);
        assert_eq!(enc(v), "a261620262616101");
    }

    #[test]
    fn integers_use_smallest_width() {
        assert_eq!(enc(DagValue::Integer(0)), "00");
        assert_eq!(enc(DagValue::Integer(23)), "17");
        assert_eq!(enc(DagValue::Integer(24)), "1818");
        assert_eq!(enc(DagValue::Integer(255)), "18ff");
        assert_eq!(enc(DagValue::Integer(256)), "190100");
        assert_eq!(enc(DagValue::Integer(65536)), "1a00010000");
        assert_eq!(enc(DagValue::Integer(-1)), "20");
        assert_eq!(enc(DagValue::Integer(-25)), "3818");
        assert_eq!(enc(DagValue::Integer(i64::MIN)), "3b7fffffffffffffff");
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(DagValue::Null), "f6");
        assert_eq!(enc(DagValue::Bool(false)), "f4");
        assert_eq!(enc(DagValue::Bool(true)), "f5");
        assert_eq!(enc(DagValue::Float(1.5)), "fb3ff8000000000000");
        assert_eq!(enc(DagValue::text("abc")), "63616263");
        assert_eq!(enc(DagValue::Bytes(vec![1, 2, 3])), "43010203");
    }

    #[test]
    fn link_is_tag_42_over_prefixed_bytes() {
        let cid = Cid::from_digest([0x11; 32]);
        let encoded = encode(&DagValue::Link(cid)).unwrap();
        // tag 42, byte string of 37, multibase identity prefix, raw CID
        assert_eq!(&encoded[..4], &[0xd8, 0x2a, 0x58, 0x25]);
        assert_eq!(encoded[4], 0x00);
        assert_eq!(&encoded[5..], cid.as_bytes());
    }

    #[test]
    fn duplicate_map_keys_rejected() {
        let v = DagValue::Map(vec![
            ("a".to_string(), DagValue::Integer(1)),
            ("a".to_string(), DagValue::Integer(2)),
        ]);
        assert!(encode(&v).is_err());
    }

    #[test]
    fn nested_structures() {
        let v = DagValue::List(vec![
            DagValue::Null,
            DagValue::Map(vec![("k".to_string(), DagValue::List(vec![]))]),
        ]);
        assert_eq!(enc(v), "82f6a1616b80");
    }

    #[test]
    fn from_json_lowers_numbers_and_links() {
        let cid = Cid::from_digest([7; 32]);
        let v = DagValue::from_json(&json!({
            "count": 3,
            "ratio": 0.5,
            "ref": {"$link": cid.to_string()},
            "tags": ["a", "b"],
        }))
        .unwrap();
        let DagValue::Map(entries) = v else { panic!("expected map") };
        assert!(entries.contains(&("count".to_string(), DagValue::Integer(3))));
        assert!(entries.contains(&("ratio".to_string(), DagValue::Float(0.5))));
        assert!(entries.contains(&("ref".to_string(), DagValue::Link(cid))));
    }
}
