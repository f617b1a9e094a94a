//! AT-URI component validation.

use std::sync::LazyLock;

use coralpds_core::{PdsError, PdsResult};
use regex::Regex;

static DID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]+$").expect("static regex compiles"));

static COLLECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(\.[a-z][a-z0-9]*)+$").expect("static regex compiles")
});

static RKEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._~-]+$").expect("static regex compiles"));

pub fn ensure_valid_did(did: &str) -> PdsResult<()> {
    if DID_RE.is_match(did) {
        Ok(())
    } else {
        Err(PdsError::InvalidRequest(format!("invalid DID: {did}")))
    }
}

pub fn ensure_valid_collection(collection: &str) -> PdsResult<()> {
    if COLLECTION_RE.is_match(collection) {
        Ok(())
    } else {
        Err(PdsError::InvalidRequest(format!(
            "invalid collection NSID: {collection}"
        )))
    }
}

pub fn ensure_valid_rkey(rkey: &str) -> PdsResult<()> {
    if RKEY_RE.is_match(rkey) && rkey != "." && rkey != ".." {
        Ok(())
    } else {
        Err(PdsError::InvalidRequest(format!("invalid record key: {rkey}")))
    }
}

/// `at://{did}/{collection}/{rkey}`
pub fn at_uri(did: &str, collection: &str, rkey: &str) -> String {
    format!("at://{did}/{collection}/{rkey}")
}

/// The MST key for a record.
pub fn record_path(collection: &str, rkey: &str) -> String {
    format!("{collection}/{rkey}")
}
