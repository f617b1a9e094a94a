use chrono::{SecondsFormat, Utc};
use coralpds_ipld::{Cid, DagValue, IpldResult, dagcbor};

/// Event type tag carried in every commit frame.
pub const COMMIT_EVENT_TYPE: &str = "com.atproto.sync.subscribeRepos#commit";

/// One commit on the firehose: the sequenced announcement that a
/// repository advanced to a new signed commit, bundling the CAR archive a
/// relay needs to validate it.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub seq: i64,
    pub did: String,
    pub rev: String,
    pub commit: Cid,
    /// CARv1 archive rooted at `commit`: the commit block plus the MST
    /// nodes and records this commit introduced.
    pub blocks: Vec<u8>,
    /// ISO-8601 UTC timestamp with `Z` suffix.
    pub time: String,
}

impl CommitEvent {
    /// Encode the event as a single deterministic DAG-CBOR map frame.
    pub fn encode(&self) -> IpldResult<Vec<u8>> {
        dagcbor::encode(&DagValue::Map(vec![
            ("$type".to_string(), DagValue::text(COMMIT_EVENT_TYPE)),
            ("seq".to_string(), DagValue::Integer(self.seq)),
            ("did".to_string(), DagValue::text(&self.did)),
            ("rev".to_string(), DagValue::text(&self.rev)),
            ("commit".to_string(), DagValue::Link(self.commit)),
            ("blocks".to_string(), DagValue::Bytes(self.blocks.clone())),
            ("time".to_string(), DagValue::text(&self.time)),
        ]))
    }

    /// The wall-clock timestamp format used in frames.
    pub fn now_timestamp() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coralpds_ipld::Reader;

    fn sample() -> CommitEvent {
        CommitEvent {
            seq: 12,
            did: "did:plc:ewvi7nxzyoun6zhxrhs64oiz".to_string(),
            rev: "3kabcdefghijk".to_string(),
            commit: Cid::from_digest([5; 32]),
            blocks: vec![0xde, 0xad],
            time: "2026-08-01T10:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn frame_keys_are_in_canonical_order() {
        let frame = sample().encode().unwrap();
        let mut r = Reader::new(&frame);
        let len = r.read_map().unwrap();
        assert_eq!(len, 7);
        let mut keys = Vec::new();
        for _ in 0..len {
            keys.push(r.read_text().unwrap().to_string());
            r.skip_value().unwrap();
        }
        assert!(r.is_at_end());
        // length-then-bytes: 3-byte keys, then time, $type, then 6-byte keys
        assert_eq!(keys, ["did", "rev", "seq", "time", "$type", "blocks", "commit"]);
    }

    #[test]
    fn frame_fields_roundtrip() {
        let event = sample();
        let frame = event.encode().unwrap();
        let mut r = Reader::new(&frame);
        let len = r.read_map().unwrap();
        let mut seq = None;
        let mut commit = None;
        let mut event_type = None;
        let mut blocks = None;
        for _ in 0..len {
            match r.read_text().unwrap() {
                "seq" => seq = Some(r.read_int().unwrap()),
                "commit" => commit = Some(r.read_link().unwrap()),
                "$type" => event_type = Some(r.read_text().unwrap().to_string()),
                "blocks" => blocks = Some(r.read_bytes().unwrap().to_vec()),
                _ => r.skip_value().unwrap(),
            }
        }
        assert_eq!(seq, Some(12));
        assert_eq!(commit, Some(event.commit));
        assert_eq!(event_type.as_deref(), Some(COMMIT_EVENT_TYPE));
        assert_eq!(blocks, Some(event.blocks));
    }

    #[test]
    fn timestamp_is_utc_with_z_suffix() {
        let ts = CommitEvent::now_timestamp();
        assert!(ts.ends_with('Z'), "expected Z suffix: {ts}");
        assert!(ts.contains('T'));
    }
}
