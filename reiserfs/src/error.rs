//! Crate-wide error type.

use std::fmt;
use std::io;

/// How serious a condition is, mirroring the severities a caller's exception
/// handler would be asked to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
    Bug,
    NoFeature,
}

/// A reiserfs engine error.
#[derive(Debug)]
pub enum Error {
    /// A device read/write/sync failed.
    Io {
        block: u64,
        source: io::Error,
    },
    /// A value read from disk or given by a caller is malformed (bad magic, bad
    /// block size, bad journal parameters, out-of-range block, invalid offsets).
    Validation(String),
    /// The filesystem's state forbids the requested operation (not `FS_CLEAN`,
    /// unreplayed transactions visible during journal tune, ...).
    Consistency(String),
    /// An on-disk structure violates a structural invariant (bad tree level,
    /// node neither leaf nor internal, item type mismatch).
    Invariant(String),
    /// A key or path component was not found. A control condition, not a hard
    /// error; callers are expected to match on this variant.
    NotFound,
    /// The operation is a stub in this engine (fsck repair, journal replay).
    NotImplemented(&'static str),
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Error::Io { .. } => Severity::Error,
            Error::Validation(_) => Severity::Error,
            Error::Consistency(_) => Severity::Error,
            Error::Invariant(_) => Severity::Bug,
            Error::NotFound => Severity::Information,
            Error::NotImplemented(_) => Severity::NoFeature,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { block, source } => write!(fmt, "block {block}: {source}"),
            Error::Validation(msg) => write!(fmt, "{msg}"),
            Error::Consistency(msg) => write!(fmt, "{msg}"),
            Error::Invariant(msg) => write!(fmt, "{msg}"),
            Error::NotFound => write!(fmt, "not found"),
            Error::NotImplemented(what) => write!(fmt, "{what}: not implemented"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
