use coralpds_crypto::TidGenerator;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// A record body with a random payload, so each call produces a distinct
/// CID.
pub fn random_record() -> serde_json::Value {
    serde_json::json!({
        "$type": "com.example.record",
        "text": random_str(24),
        "createdAt": "2026-08-01T00:00:00.000Z",
    })
}

/// `count` distinct MST keys in a single collection, TID-keyed the way
/// real writes are.
pub fn bulk_record_keys(count: usize) -> Vec<String> {
    let tids = TidGenerator::new();
    (0..count)
        .map(|_| {
            let tid = tids.next_tid().expect("wall clock is after the epoch");
            format!("com.example.record/{tid}")
        })
        .collect()
}

pub fn random_str(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
