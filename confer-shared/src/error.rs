#![allow(dead_code)]

use std::io;
use std::num::ParseIntError;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //Capability descriptor errors
    #[error("caps: empty descriptor string")]
    ErrCapsEmptyString,
    #[error("caps: unknown field type: {0}")]
    ErrCapsUnknownFieldType(String),
    #[error("caps: malformed field: {0}")]
    ErrCapsMalformedField(String),
    #[error("caps: unterminated quoted string")]
    ErrCapsUnterminatedString,
    #[error("caps: empty int range")]
    ErrCapsEmptyRange,

    //Codec cache errors
    #[error("codecs cache: invalid media type")]
    ErrInvalidMediaType,
    #[error("codecs cache: no home directory and no cache path override")]
    ErrNoCachePath,
    #[error("codecs cache: outdated or does not exist")]
    ErrCacheOutdated,
    #[error("codecs cache: incorrect magic header, file corrupted")]
    ErrCacheBadMagic,
    #[error("codecs cache: truncated, needed {0} more bytes")]
    ErrCacheTruncated(usize),
    #[error("codecs cache: corrupt record: {0}")]
    ErrCacheCorrupt(String),

    //Discovery errors
    #[error("no usable codec capabilities detected")]
    ErrNoCodecCapabilities,

    //Association errors
    #[error("ran out of dynamic payload types")]
    ErrDynamicPayloadTypesExhausted,
    #[error("no local codecs for this media type")]
    ErrNoLocalCodecs,

    //Blueprint store errors
    #[error("blueprint store: close without matching open")]
    ErrStoreNotOpen,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("utf8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Other(e.to_string())
    }
}
