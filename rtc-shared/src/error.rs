#![allow(dead_code)]

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("already closed")]
    ErrAlreadyClosed,
    #[error("mutex poison: {0}")]
    PoisonError(String),

    //CCFB errors
    /// ECN codepoints are two bits wide.
    #[error("ecn value {0:#04b} does not fit in two bits")]
    ErrInvalidEcn(u8),
    #[error("feedback writer: closed")]
    ErrWriterClosed,
    #[error("feedback writer: full")]
    ErrWriterFull,
    #[error("report loop task: {0}")]
    ErrTaskJoin(String),

    //Third Party Error
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Std(#[source] StdError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }
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

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Wraps any error type, e.g. the failure of a feedback writer; recover the
/// concrete type with [`Error::downcast_ref`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}
