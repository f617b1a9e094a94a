//! A small targeted CBOR reader.
//!
//! The core only decodes a handful of shapes it wrote itself: MST nodes,
//! commit maps, CAR headers, and firehose frames in tests. A cursor over
//! the strict subset produced by [`crate::dagcbor`] covers all of them;
//! indefinite lengths and unknown simple values are rejected outright.

use crate::cid::Cid;
use crate::error::{IpldError, IpldResult};

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn byte(&mut self) -> IpldResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| IpldError::Decode("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> IpldResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| IpldError::Decode("unexpected end of input".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a CBOR head, returning `(major type, argument)`.
    fn head(&mut self) -> IpldResult<(u8, u64)> {
        let initial = self.byte()?;
        let major = initial >> 5;
        let minor = initial & 0x1f;
        let arg = match minor {
            0..=23 => u64::from(minor),
            24 => u64::from(self.byte()?),
            25 => u16::from_be_bytes(self.take(2)?.try_into().unwrap()).into(),
            26 => u32::from_be_bytes(self.take(4)?.try_into().unwrap()).into(),
            27 => u64::from_be_bytes(self.take(8)?.try_into().unwrap()),
            31 => {
                return Err(IpldError::Decode(
                    "indefinite lengths are not valid DAG-CBOR".to_string(),
                ));
            }
            _ => return Err(IpldError::Decode(format!("reserved minor type {minor}"))),
        };
        Ok((major, arg))
    }

    fn expect(&mut self, major: u8, what: &str) -> IpldResult<u64> {
        let (got, arg) = self.head()?;
        if got != major {
            return Err(IpldError::Decode(format!(
                "expected {what}, found major type {got}"
            )));
        }
        Ok(arg)
    }

    pub fn read_u64(&mut self) -> IpldResult<u64> {
        self.expect(0, "unsigned integer")
    }

    pub fn read_int(&mut self) -> IpldResult<i64> {
        let (major, arg) = self.head()?;
        match major {
            0 => i64::try_from(arg)
                .map_err(|_| IpldError::Decode("integer out of range".to_string())),
            1 => i64::try_from(arg)
                .map(|v| -1 - v)
                .map_err(|_| IpldError::Decode("integer out of range".to_string())),
            other => Err(IpldError::Decode(format!(
                "expected integer, found major type {other}"
            ))),
        }
    }

    pub fn read_bytes(&mut self) -> IpldResult<&'a [u8]> {
        let len = self.expect(2, "byte string")?;
        self.take(len as usize)
    }

    pub fn read_text(&mut self) -> IpldResult<&'a str> {
        let len = self.expect(3, "text string")?;
        let raw = self.take(len as usize)?;
        std::str::from_utf8(raw).map_err(|_| IpldError::Decode("invalid UTF-8 text".to_string()))
    }

    /// Read an array head, returning the element count.
    pub fn read_array(&mut self) -> IpldResult<u64> {
        self.expect(4, "array")
    }

    /// Read a map head, returning the entry count.
    pub fn read_map(&mut self) -> IpldResult<u64> {
        self.expect(5, "map")
    }

    pub fn read_bool(&mut self) -> IpldResult<bool> {
        match self.byte()? {
            0xf4 => Ok(false),
            0xf5 => Ok(true),
            other => Err(IpldError::Decode(format!("expected bool, found 0x{other:02x}"))),
        }
    }

    /// Consume a null if one is next; returns whether it was consumed.
    pub fn read_optional_null(&mut self) -> IpldResult<bool> {
        if self.data.get(self.pos) == Some(&0xf6) {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Read a tag-42 CID link: a byte string of `0x00` followed by the raw
    /// 36 CID bytes.
    pub fn read_link(&mut self) -> IpldResult<Cid> {
        let tag = self.expect(6, "tag")?;
        if tag != 42 {
            return Err(IpldError::Decode(format!("expected tag 42, found tag {tag}")));
        }
        let raw = self.read_bytes()?;
        match raw.split_first() {
            Some((0x00, cid_bytes)) => Cid::from_bytes(cid_bytes).map_err(|e| {
                IpldError::Decode(format!("bad CID in link: {e}"))
            }),
            _ => Err(IpldError::Decode("link missing identity prefix".to_string())),
        }
    }

    /// Read `null` or a tag-42 link.
    pub fn read_optional_link(&mut self) -> IpldResult<Option<Cid>> {
        if self.read_optional_null()? {
            return Ok(None);
        }
        self.read_link().map(Some)
    }

    /// Skip over one complete value of any supported shape.
    pub fn skip_value(&mut self) -> IpldResult<()> {
        // Simple values and floats have no argument payload beyond the head.
        match self.data.get(self.pos) {
            Some(0xf4..=0xf6) => {
                self.pos += 1;
                return Ok(());
            }
            Some(0xfb) => {
                self.pos += 1;
                self.take(8)?;
                return Ok(());
            }
            _ => {}
        }
        let (major, arg) = self.head()?;
        match major {
            0 | 1 => Ok(()),
            2 | 3 => self.take(arg as usize).map(|_| ()),
            4 => {
                for _ in 0..arg {
                    self.skip_value()?;
                }
                Ok(())
            }
            5 => {
                for _ in 0..arg {
                    self.skip_value()?;
                    self.skip_value()?;
                }
                Ok(())
            }
            6 => self.skip_value(),
            other => Err(IpldError::Decode(format!("cannot skip major type {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dagcbor::{DagValue, encode};

    #[test]
    fn reads_back_encoded_values() {
        let cid = Cid::from_digest([9; 32]);
        let value = DagValue::Map(vec![
            ("seq".to_string(), DagValue::Integer(7)),
            ("did".to_string(), DagValue::text("did:plc:abc")),
            ("commit".to_string(), DagValue::Link(cid)),
            ("prev".to_string(), DagValue::Null),
            ("ok".to_string(), DagValue::Bool(true)),
        ]);
        let bytes = encode(&value).unwrap();
        let mut r = Reader::new(&bytes);

        let len = r.read_map().unwrap();
        assert_eq!(len, 5);
        // canonical order: ok, did, seq, prev, commit
        assert_eq!(r.read_text().unwrap(), "ok");
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_text().unwrap(), "did");
        assert_eq!(r.read_text().unwrap(), "did:plc:abc");
        assert_eq!(r.read_text().unwrap(), "seq");
        assert_eq!(r.read_int().unwrap(), 7);
        assert_eq!(r.read_text().unwrap(), "prev");
        assert_eq!(r.read_optional_link().unwrap(), None);
        assert_eq!(r.read_text().unwrap(), "commit");
        assert_eq!(r.read_optional_link().unwrap(), Some(cid));
        assert!(r.is_at_end());
    }

    #[test]
    fn skip_value_covers_nested_shapes() {
        let value = DagValue::List(vec![
            DagValue::Map(vec![("x".to_string(), DagValue::Bytes(vec![1, 2]))]),
            DagValue::Link(Cid::from_digest([3; 32])),
            DagValue::Float(2.25),
            DagValue::Integer(-40),
        ]);
        let bytes = encode(&value).unwrap();
        let mut r = Reader::new(&bytes);
        let len = r.read_array().unwrap();
        for _ in 0..len {
            r.skip_value().unwrap();
        }
        assert!(r.is_at_end());
    }

    #[test]
    fn rejects_indefinite_lengths() {
        // 0x9f is an indefinite-length array head
        let mut r = Reader::new(&[0x9f, 0x01, 0xff]);
        assert!(r.read_array().is_err());
    }

    #[test]
    fn rejects_truncated_text() {
        let mut r = Reader::new(&[0x63, 0x61]);
        assert!(r.read_text().is_err());
    }
}
