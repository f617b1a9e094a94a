pub mod car;
pub mod cid;
pub mod dagcbor;
pub mod error;
pub mod reader;
pub mod varint;

pub use car::{CarArchive, read_car, write_car};
pub use cid::{CID_LEN, CID_PREFIX, Cid};
pub use dagcbor::{DagValue, encode, key_order};
pub use error::{IpldError, IpldResult};
pub use reader::Reader;
