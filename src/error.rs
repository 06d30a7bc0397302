/// Crate-wide error type.
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("datagram too short for a transfer header ({len} of {expected} bytes)")]
    MalformedHeader { len: usize, expected: usize },

    #[error("unknown transfer kind byte: {0}")]
    UnknownTransferKind(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
