use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpldError {
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("malformed CAR: {0}")]
    Car(String),
}

pub type IpldResult<T> = Result<T, IpldError>;
