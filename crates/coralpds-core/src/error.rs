use coralpds_ipld::IpldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdsError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("missing block: {0}")]
    MissingBlock(String),

    #[error(transparent)]
    Ipld(#[from] IpldError),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type PdsResult<T> = Result<T, PdsError>;
