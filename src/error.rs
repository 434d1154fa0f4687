use thiserror::Error;

/// Error taxonomy shared by the whole crate.
///
/// `Crypto` deliberately carries only a coarse message so that callers can't
/// distinguish which sub-check of a decryption or verification failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad input: {0}")]
    BadInput(&'static str),

    #[error("malformed data: {0}")]
    Malformed(&'static str),

    #[error("{0}")]
    Crypto(&'static str),

    #[error("signatures exhausted")]
    SignaturesExhausted,

    #[error("no such key or algorithm: {0}")]
    Missing(String),

    #[error("{0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("seed source unavailable: {0}")]
    Randomness(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for the CLI layer.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Missing(_) => 2,
            Error::Crypto(_) => 3,
            _ => 1,
        }
    }

    pub fn io(what: impl Into<String>, e: std::io::Error) -> Self {
        Error::Io(what.into(), e)
    }
}
