use std::fmt;
use std::io;

use thiserror::Error;

/// Structural failure while segmenting a JPEG stream. Fatal to the current file.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("malformed marker {:02x} {:02x} at offset {offset}", .bytes[0], .bytes[1])]
    MalformedMarker { offset: u64, bytes: [u8; 2] },

    #[error("restart marker 0x{marker:02x} outside entropy-coded data at offset {offset}")]
    UnexpectedRestartMarker { offset: u64, marker: u8 },

    #[error("unhandled segment marker 0x{marker:02x} at offset {offset}")]
    UnhandledMarker { offset: u64, marker: u8 },

    #[error("input truncated at offset {offset}, wanted {wanted} more byte(s)")]
    Truncated { offset: u64, wanted: usize },

    #[error("invalid segment length {length} at offset {offset}")]
    InvalidLength { offset: u64, length: u16 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An Exif segment that cannot contribute any directories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExifError {
    #[error("exif segment header not as expected: {0:02x?}")]
    BadHeader(Vec<u8>),

    #[error("invalid byte order marker {:02x} {:02x}", .0[0], .0[1])]
    BadByteOrder([u8; 2]),

    #[error("tiff region of {0} byte(s) is too short for a header")]
    TooShort(usize),

    #[error("first ifd offset {offset} lies outside the {len} byte tiff region")]
    FirstIfdOutOfBounds { offset: u32, len: usize },
}

/// Errors surfaced by the file-level entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions. Each one is logged when raised and kept on the
/// result that raised it.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    MissingSoi,
    MissingEoi,
    UnexpectedTiffVersion(u16),
    UnimplementedFormat { ifd: String, tag: u16, format: u16, count: u32 },
    UndecodableAscii { tag: u16 },
    ValueOutOfBounds { tag: u16, offset: u32, len: u64 },
    IfdOutOfBounds { name: String, offset: u32 },
    IfdLoop { name: String, offset: u32 },
    ChainedEmbeddedIfd { name: String, next: u32 },
    MalformedRational { field: &'static str },
    IccMultiChunk { sequence: u8, count: u8 },
    MalformedAppHeader { identifier: String, len: usize },
    SkippedExif { offset: u64, reason: ExifError },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Warning::*;
        match *self {
            MissingSoi => f.write_str("start of image marker not found at start of stream"),
            MissingEoi => f.write_str("end of image marker not found"),
            UnexpectedTiffVersion(v) => write!(f, "unexpected tiff version {} (expected 42)", v),
            UnimplementedFormat { ref ifd, tag, format, count } => write!(
                f,
                "ifd data type not implemented: ifd {} tag {} format {} count {}",
                ifd, tag, format, count
            ),
            UndecodableAscii { tag } => write!(f, "tag {} holds non-ascii string data", tag),
            ValueOutOfBounds { tag, offset, len } => write!(
                f,
                "value of tag {} at offset {} ({} bytes) lies outside tiff region",
                tag, offset, len
            ),
            IfdOutOfBounds { ref name, offset } => {
                write!(f, "ifd {} at offset {} lies outside tiff region", name, offset)
            }
            IfdLoop { ref name, offset } => {
                write!(f, "ifd {} at offset {} was already decoded", name, offset)
            }
            ChainedEmbeddedIfd { ref name, next } => {
                write!(f, "unexpected next ifd offset {} in ifd {}", next, name)
            }
            MalformedRational { field } => write!(f, "malformed rational value for {}", field),
            IccMultiChunk { sequence, count } => write!(
                f,
                "icc profile chunk {} of {}, multi-chunk profiles are not reassembled",
                sequence, count
            ),
            MalformedAppHeader { ref identifier, len } => {
                write!(f, "{} segment of {} byte(s) too short for its header", identifier, len)
            }
            SkippedExif { offset, ref reason } => {
                write!(f, "skipping exif segment at offset {}: {}", offset, reason)
            }
        }
    }
}

/// Log `w` and keep it in `sink`.
pub(crate) fn raise(sink: &mut Vec<Warning>, w: Warning) {
    tracing::warn!("{}", w);
    sink.push(w);
}
