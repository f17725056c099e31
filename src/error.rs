use std::fmt::{Display, Formatter};

use nom::error::{ErrorKind, ParseError};

/// Errors surfaced by the decode-state layer.
///
/// Absent headers are not errors: lookups return `Option`/`bool` and the
/// caller branches on them. Everything here is a synchronous, local outcome
/// returned to the immediate caller; nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A reset or append would exceed the state's record limit.
    Capacity { requested: usize, limit: usize },
    /// Caller supplied a record index >= header_count.
    IndexOutOfRange { index: usize, count: usize },
    /// A peer target buffer is too small for a recorded header range.
    Peering {
        offset: usize,
        length: usize,
        available: usize,
    },
    /// A header's decode hook found structurally invalid bytes. The view
    /// stays peered (offset/length known) but is flagged invalid.
    CorruptHeader(&'static str),
    Nom(ErrorKind),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Capacity { requested, limit } => {
                write!(f, "State capacity exceeded ({} > {})", requested, limit)
            }
            Error::IndexOutOfRange { index, count } => {
                write!(f, "Header index {} out of range ({} headers)", index, count)
            }
            Error::Peering {
                offset,
                length,
                available,
            } => write!(
                f,
                "Peer target too small ({} bytes) for range [{}, {})",
                available,
                offset,
                offset + length
            ),
            Error::CorruptHeader(s) => write!(f, "{}", s),
            Error::Nom(_) => write!(f, "Nom parse error"),
        }
    }
}

impl<I> ParseError<I> for Error {
    fn from_error_kind(_: I, kind: ErrorKind) -> Self {
        Error::Nom(kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl std::error::Error for Error {}

impl From<nom::Err<Error>> for Error {
    fn from(e: nom::Err<Error>) -> Self {
        match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
            nom::Err::Incomplete(_) => Error::Nom(ErrorKind::Eof),
        }
    }
}
