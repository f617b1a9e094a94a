pub mod hash;
pub mod signing;
pub mod tid;

pub use hash::{hmac_sha256, sha256};
pub use signing::{PublicKey, SIGNATURE_LEN, SigningKey};
pub use tid::{TID_LEN, TidGenerator};
