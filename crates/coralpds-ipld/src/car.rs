//! CARv1 block-archive framing.
//!
//! ```text
//! car     := varint(len(header)) ‖ header ‖ section*
//! header  := DAG-CBOR({ "roots": [CID, ...], "version": 1 })
//! section := varint(len(cid) + len(block)) ‖ cid-bytes ‖ block-bytes
//! ```
//!
//! The section length covers the raw 36 CID bytes plus the block payload.

use crate::cid::{CID_LEN, Cid};
use crate::dagcbor::{DagValue, encode};
use crate::error::{IpldError, IpldResult};
use crate::reader::Reader;
use crate::varint::{read_uvarint, write_uvarint};

/// Serialize a CARv1 archive with the given roots and blocks, sections in
/// the order supplied. Duplicate blocks are emitted as-is. Block payloads
/// may be any byte container (`Vec<u8>`, `bytes::Bytes`, ...).
pub fn write_car<B: AsRef<[u8]>>(roots: &[Cid], blocks: &[(Cid, B)]) -> IpldResult<Vec<u8>> {
    let header = encode(&DagValue::Map(vec![
        (
            "roots".to_string(),
            DagValue::List(roots.iter().copied().map(DagValue::Link).collect()),
        ),
        ("version".to_string(), DagValue::Integer(1)),
    ]))?;

    let mut out = Vec::with_capacity(header.len() + 16);
    write_uvarint(&mut out, header.len() as u64);
    out.extend_from_slice(&header);

    for (cid, block) in blocks {
        let block = block.as_ref();
        write_uvarint(&mut out, (CID_LEN + block.len()) as u64);
        out.extend_from_slice(cid.as_bytes());
        out.extend_from_slice(block);
    }
    Ok(out)
}

/// A decoded CARv1 archive.
#[derive(Debug, Clone)]
pub struct CarArchive {
    pub roots: Vec<Cid>,
    pub blocks: Vec<(Cid, Vec<u8>)>,
}

/// Parse a CARv1 archive back into its roots and sections.
pub fn read_car(data: &[u8]) -> IpldResult<CarArchive> {
    if data.is_empty() {
        return Err(IpldError::Car("empty archive".to_string()));
    }
    let (header_len, mut pos) = read_uvarint(data, 0)?;
    let header_end = pos
        .checked_add(header_len as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| IpldError::Car("truncated header".to_string()))?;
    let roots = parse_header(&data[pos..header_end])?;
    pos = header_end;

    let mut blocks = Vec::new();
    while pos < data.len() {
        let (section_len, body_start) = read_uvarint(data, pos)?;
        let section_len = section_len as usize;
        if section_len < CID_LEN {
            return Err(IpldError::Car(format!("section of {section_len} bytes cannot hold a CID")));
        }
        let body_end = body_start
            .checked_add(section_len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| IpldError::Car("truncated section".to_string()))?;
        let cid = Cid::from_bytes(&data[body_start..body_start + CID_LEN])
            .map_err(|e| IpldError::Car(format!("bad section CID: {e}")))?;
        blocks.push((cid, data[body_start + CID_LEN..body_end].to_vec()));
        pos = body_end;
    }
    Ok(CarArchive { roots, blocks })
}

fn parse_header(header: &[u8]) -> IpldResult<Vec<Cid>> {
    let mut r = Reader::new(header);
    let entries = r.read_map()?;
    let mut roots = None;
    let mut version = None;
    for _ in 0..entries {
        match r.read_text()? {
            "roots" => {
                let count = r.read_array()?;
                let mut cids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    cids.push(r.read_link()?);
                }
                roots = Some(cids);
            }
            "version" => version = Some(r.read_u64()?),
            _ => r.skip_value()?,
        }
    }
    match version {
        Some(1) => {}
        Some(v) => return Err(IpldError::Car(format!("unsupported CAR version {v}"))),
        None => return Err(IpldError::Car("header missing version".to_string())),
    }
    roots.ok_or_else(|| IpldError::Car("header missing roots".to_string()))
}
