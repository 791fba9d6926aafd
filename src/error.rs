use std::{error, fmt, io};

use crate::codec;
use crate::format::Version;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while encoding or decoding a BLT stream.
///
/// Decode failures are fatal for the file; no partial forest is returned.
/// Encode failures surface before any bytes are committed to the stream:
/// the only data-dependent one, [`Error::UnsupportedLiteral`], is raised
/// while the node table is built, ahead of emission.
#[derive(Debug)]
pub enum Error {
    /// The first three bytes are not `BLT`.
    BadMagic([u8; 3]),
    /// The file's version exceeds [`Version::CURRENT`].
    UnsupportedVersion(Version),
    /// Truncated stream, overlong varint, unknown tag, or a body value
    /// outside its domain.
    MalformedInput(&'static str),
    /// A symbol or template reference beyond its table.
    OutOfBoundsIndex {
        table: &'static str,
        index: u64,
        len: usize,
    },
    /// A node reference to a position not yet populated.
    ForwardReference { index: u64, len: usize },
    /// The encoder has no on-disk representation for a literal.
    UnsupportedLiteral(&'static str),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(found) => {
                write!(f, "not a BLT file (magic bytes {found:02x?})")
            }
            Self::UnsupportedVersion(version) => {
                write!(
                    f,
                    "unsupported format version {version} (newest supported is {})",
                    Version::CURRENT
                )
            }
            Self::MalformedInput(what) => write!(f, "malformed input: {what}"),
            Self::OutOfBoundsIndex { table, index, len } => {
                write!(f, "{table} index {index} out of bounds (table holds {len})")
            }
            Self::ForwardReference { index, len } => {
                write!(
                    f,
                    "node reference {index} points past the {len} nodes read so far"
                )
            }
            Self::UnsupportedLiteral(what) => {
                write!(f, "literal cannot be encoded: {what}")
            }
            Self::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        match err {
            codec::Error::UnexpectedEof => Self::MalformedInput("unexpected end of stream"),
            codec::Error::OverlongVarint => Self::MalformedInput("overlong varint"),
            codec::Error::InvalidUtf8 => Self::MalformedInput("invalid utf-8 in symbol"),
            codec::Error::Io(err) => Self::Io(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
