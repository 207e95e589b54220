//! Segment-level JPEG scanning and EXIF/TIFF metadata extraction.
//!
//! [`jpeg::scan`] splits a JPEG stream into segments, [`Exif`] decodes the
//! directories held in an APP1 "Exif" payload, and [`summarize`] reduces
//! those directories to a flat [`PropertyRecord`].

pub mod app;
pub mod error;
pub mod jpeg;
pub mod summary;
pub mod tag;

use std::collections::HashSet;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use indexmap::IndexMap;

pub use app::{IccProfileChunk, Jfif};
pub use error::{Error, ExifError, Result, ScanError, Warning};
pub use jpeg::{scan, scan_bytes, Scan, Segment, SegmentDescriptor, SegmentKind, SegmentScanner};
pub use summary::{summarize, PropertyRecord};

use error::raise;

/// Signature that precedes the TIFF region inside an APP1 payload.
pub const EXIF_HEADER: [u8; 6] = [b'E', b'x', b'i', b'f', 0x00, 0x00];
pub const TIFF_VERSION: u16 = 42;
const TIFF_HEADER_LEN: usize = 8;
const IFD_ENTRY_LEN: usize = 12;

/// Decoded directories, keyed by name in discovery order.
pub type Directories = IndexMap<String, Ifd>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match (marker[0], marker[1]) {
            (b'M', b'M') => Some(Endian::Big),
            (b'I', b'I') => Some(Endian::Little),
            _ => None,
        }
    }
}

/// top level data structure representing an entire exif document
#[derive(Clone, Debug)]
pub struct Exif {
    pub endian: Endian,
    pub version: u16,
    pub directories: Directories,
    pub warnings: Vec<Warning>,
}

impl Exif {
    /// Decode the payload of an APP1 segment, "Exif\0\0" signature included.
    pub fn from_app_payload(payload: &[u8]) -> std::result::Result<Self, ExifError> {
        if payload.len() < EXIF_HEADER.len() || payload[..EXIF_HEADER.len()] != EXIF_HEADER {
            let n = payload.len().min(10);
            return Err(ExifError::BadHeader(payload[..n].to_vec()));
        }
        Self::from_tiff(&payload[EXIF_HEADER.len()..])
    }

    /// Decode a TIFF region. All offsets inside it are relative to its start.
    pub fn from_tiff(tiff: &[u8]) -> std::result::Result<Self, ExifError> {
        if tiff.len() < TIFF_HEADER_LEN {
            return Err(ExifError::TooShort(tiff.len()));
        }
        let marker = [tiff[0], tiff[1]];
        match Endian::from_marker(marker) {
            Some(Endian::Big) => Self::decode::<BigEndian>(tiff, Endian::Big),
            Some(Endian::Little) => Self::decode::<LittleEndian>(tiff, Endian::Little),
            None => Err(ExifError::BadByteOrder(marker)),
        }
    }

    fn decode<B: ByteOrder>(tiff: &[u8], endian: Endian) -> std::result::Result<Self, ExifError> {
        let mut warnings = vec![];

        let version = B::read_u16(&tiff[2..4]);
        if version != TIFF_VERSION {
            raise(&mut warnings, Warning::UnexpectedTiffVersion(version));
        }

        let first_ifd = B::read_u32(&tiff[4..8]);
        if first_ifd as usize >= tiff.len() {
            return Err(ExifError::FirstIfdOutOfBounds { offset: first_ifd, len: tiff.len() });
        }

        let mut directories = Directories::new();

        // root chain, terminated by a zero next offset
        let mut visited = HashSet::new();
        let mut offset = first_ifd;
        let mut n = 0;
        while offset != 0 {
            let name = tag::root_ifd_name(n);
            if !visited.insert(offset) {
                raise(&mut warnings, Warning::IfdLoop { name, offset });
                break;
            }
            let ifd = match Ifd::decode::<B>(tiff, offset, &name, &mut warnings) {
                Some(ifd) => ifd,
                None => break,
            };
            tracing::debug!("decoded {} with {} entries", name, ifd.len());
            offset = ifd.next_offset;
            directories.insert(name, ifd);
            n += 1;
        }

        // embedded directories may themselves hold pointers to further
        // directories, keep looking until a pass finds nothing new
        let mut attempted: HashSet<&'static str> = HashSet::new();
        loop {
            let mut found: Vec<(&'static str, u32)> = vec![];
            for ifd in directories.values() {
                for &(ptr_tag, name) in tag::EMBEDDED_IFDS {
                    if attempted.contains(name) || found.iter().any(|&(n, _)| n == name) {
                        continue;
                    }
                    if let Some(off) = ifd.get(ptr_tag).and_then(|e| e.value.as_u32()) {
                        found.push((name, off));
                    }
                }
            }
            if found.is_empty() {
                break;
            }

            for (name, off) in found {
                attempted.insert(name);
                if let Some(ifd) = Ifd::decode::<B>(tiff, off, name, &mut warnings) {
                    if ifd.next_offset != 0 {
                        let w = Warning::ChainedEmbeddedIfd {
                            name: name.to_owned(),
                            next: ifd.next_offset,
                        };
                        raise(&mut warnings, w);
                    }
                    tracing::debug!("decoded embedded {} with {} entries", name, ifd.len());
                    directories.insert(name.to_owned(), ifd);
                }
            }
        }

        Ok(Exif { endian, version, directories, warnings })
    }

    pub fn ifd(&self, name: &str) -> Option<&Ifd> {
        self.directories.get(name)
    }

    /// First entry for `tag` in the directory called `ifd`.
    pub fn get(&self, ifd: &str, tag: u16) -> Option<&Entry> {
        self.ifd(ifd).and_then(|d| d.get(tag))
    }
}

/// Image file directory - container for a collection of Entries
#[derive(Clone, Debug)]
pub struct Ifd {
    pub name: String,
    pub offset: u32,
    /// a tag that recurs keeps every occurrence, in directory order
    pub entries: IndexMap<u16, Vec<Entry>>,
    pub next_offset: u32,
}

impl Ifd {
    fn decode<B: ByteOrder>(
        tiff: &[u8],
        offset: u32,
        name: &str,
        warnings: &mut Vec<Warning>,
    ) -> Option<Self> {
        let start = offset as usize;
        let out_of_bounds = |warnings: &mut Vec<Warning>| -> Option<Self> {
            raise(warnings, Warning::IfdOutOfBounds { name: name.to_owned(), offset });
            None
        };

        if start.checked_add(2).map_or(true, |end| end > tiff.len()) {
            return out_of_bounds(warnings);
        }
        let num_entries = B::read_u16(&tiff[start..]) as usize;

        // entries are contiguous, followed by offset_to_next_ifd
        let table = start + 2;
        let table_end = table + num_entries * IFD_ENTRY_LEN;
        if table_end > tiff.len() {
            return out_of_bounds(warnings);
        }

        let mut entries: IndexMap<u16, Vec<Entry>> = IndexMap::new();
        for (i, raw) in tiff[table..table_end].chunks_exact(IFD_ENTRY_LEN).enumerate() {
            let h = EntryHeader::decode::<B>(raw);
            if let Some(e) = Entry::from_header::<B>(&h, i as u16, tiff, name, warnings) {
                entries.entry(e.tag).or_default().push(e);
            }
        }

        let next_offset = if table_end + 4 <= tiff.len() {
            B::read_u32(&tiff[table_end..])
        } else {
            0
        };

        Some(Ifd { name: name.to_owned(), offset, entries, next_offset })
    }

    /// First entry carrying `tag`.
    pub fn get(&self, tag: u16) -> Option<&Entry> {
        self.entries.get(&tag).and_then(|v| v.first())
    }

    /// Every entry carrying `tag`.
    pub fn get_all(&self, tag: u16) -> &[Entry] {
        self.entries.get(&tag).map_or(&[], |v| v.as_slice())
    }

    /// Number of entries, counting repeats of a tag.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in directory order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        let mut all: Vec<&Entry> = self.entries.values().flatten().collect();
        all.sort_by_key(|e| e.index);
        all.into_iter()
    }
}

/// Field types an IFD entry may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    UByte,
    Ascii,
    UShort,
    ULong,
    URational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
}

impl Format {
    pub fn from_code(code: u16) -> Option<Self> {
        use self::Format::*;
        Some(match code {
            1 => UByte,
            2 => Ascii,
            3 => UShort,
            4 => ULong,
            5 => URational,
            6 => SByte,
            7 => Undefined,
            8 => SShort,
            9 => SLong,
            10 => SRational,
            11 => Float,
            12 => Double,
            _ => return None,
        })
    }

    pub fn code(&self) -> u16 {
        *self as u16 + 1
    }

    pub fn size(&self) -> usize {
        use self::Format::*;
        match *self {
            UByte | Ascii | SByte | Undefined => 1,
            UShort | SShort => 2,
            ULong | SLong | Float => 4,
            URational | SRational | Double => 8,
        }
    }

    /// Formats recognized but never decoded.
    pub fn is_implemented(&self) -> bool {
        !matches!(*self, Format::SByte | Format::SShort | Format::Float | Format::Double)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub denom: u32,
}

impl Rational {
    pub fn to_f64(&self) -> Option<f64> {
        match self.denom {
            0 => None,
            d => Some(self.num as f64 / d as f64),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SRational {
    pub num: i32,
    pub denom: i32,
}

impl SRational {
    pub fn to_f64(&self) -> Option<f64> {
        match self.denom {
            0 => None,
            d => Some(self.num as f64 / d as f64),
        }
    }
}

/// Data associated with an Entry. A single-element list is a scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    UShort(Vec<u16>),
    ULong(Vec<u32>),
    URational(Vec<Rational>),
    SLong(Vec<i32>),
    SRational(Vec<SRational>),
    Undefined(Vec<u8>),
    /// raw value/offset bytes of an entry whose format is not decoded
    Unimplemented([u8; 4]),
}

impl Value {
    /// Unsigned scalar, for single-element integer values.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Byte(ref v) if v.len() == 1 => Some(v[0] as u32),
            Value::UShort(ref v) if v.len() == 1 => Some(v[0] as u32),
            Value::ULong(ref v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::Ascii(ref s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rationals(&self) -> Option<&[Rational]> {
        match *self {
            Value::URational(ref v) => Some(v),
            _ => None,
        }
    }

    /// Number of decoded components (characters for strings).
    pub fn len(&self) -> usize {
        use self::Value::*;
        match *self {
            Byte(ref v) | Undefined(ref v) => v.len(),
            Ascii(ref s) => s.len(),
            UShort(ref v) => v.len(),
            ULong(ref v) => v.len(),
            URational(ref v) => v.len(),
            SLong(ref v) => v.len(),
            SRational(ref v) => v.len(),
            Unimplemented(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw 12-byte directory entry.
#[derive(Debug)]
struct EntryHeader {
    tag: u16,
    format: u16,
    count: u32,
    value_or_offset: [u8; 4],
}

impl EntryHeader {
    fn decode<B: ByteOrder>(raw: &[u8]) -> Self {
        let mut value_or_offset = [0u8; 4];
        value_or_offset.copy_from_slice(&raw[8..12]);
        EntryHeader {
            tag: B::read_u16(&raw[0..2]),
            format: B::read_u16(&raw[2..4]),
            count: B::read_u32(&raw[4..8]),
            value_or_offset,
        }
    }

    /// The bytes holding this entry's value: the inline field when it fits
    /// in 4 bytes, otherwise `count * size` bytes at the offset it names.
    fn data<'a, B: ByteOrder>(
        &'a self,
        fmt: Format,
        tiff: &'a [u8],
    ) -> std::result::Result<&'a [u8], Warning> {
        let sz = fmt.size() as u64 * self.count as u64;
        if sz <= 4 {
            return Ok(&self.value_or_offset[..sz as usize]);
        }

        let offset = B::read_u32(&self.value_or_offset);
        let end = offset as u64 + sz;
        if end > tiff.len() as u64 {
            return Err(Warning::ValueOutOfBounds { tag: self.tag, offset, len: sz });
        }
        Ok(&tiff[offset as usize..end as usize])
    }
}

/// individual entry within an IFD
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub tag: u16,
    /// position within its directory
    pub index: u16,
    pub format_code: u16,
    pub count: u32,
    pub value: Value,
}

impl Entry {
    fn from_header<B: ByteOrder>(
        h: &EntryHeader,
        index: u16,
        tiff: &[u8],
        ifd: &str,
        warnings: &mut Vec<Warning>,
    ) -> Option<Self> {
        let value = match Format::from_code(h.format).filter(Format::is_implemented) {
            Some(fmt) => match h.data::<B>(fmt, tiff) {
                Ok(d) => Value::decode::<B>(fmt, d, h.tag, warnings),
                Err(w) => {
                    raise(warnings, w);
                    return None;
                }
            },
            None => {
                let w = Warning::UnimplementedFormat {
                    ifd: ifd.to_owned(),
                    tag: h.tag,
                    format: h.format,
                    count: h.count,
                };
                raise(warnings, w);
                Value::Unimplemented(h.value_or_offset)
            }
        };

        Some(Entry { tag: h.tag, index, format_code: h.format, count: h.count, value })
    }

    pub fn format(&self) -> Option<Format> {
        Format::from_code(self.format_code)
    }

    pub fn is_implemented(&self) -> bool {
        !matches!(self.value, Value::Unimplemented(_))
    }
}

impl Value {
    fn decode<B: ByteOrder>(fmt: Format, d: &[u8], tag: u16, warnings: &mut Vec<Warning>) -> Self {
        match fmt {
            Format::UByte => Value::Byte(d.to_vec()),
            Format::Ascii => {
                // trailing NUL terminator is not part of the string
                let s = match d.split_last() {
                    Some((&0, rest)) => rest,
                    _ => d,
                };
                if s.is_ascii() {
                    Value::Ascii(String::from_utf8_lossy(s).into_owned())
                } else {
                    raise(warnings, Warning::UndecodableAscii { tag });
                    Value::Ascii(String::new())
                }
            }
            Format::UShort => Value::UShort(d.chunks_exact(2).map(B::read_u16).collect()),
            Format::ULong => Value::ULong(d.chunks_exact(4).map(B::read_u32).collect()),
            Format::SLong => Value::SLong(d.chunks_exact(4).map(B::read_i32).collect()),
            Format::URational => Value::URational(
                d.chunks_exact(8)
                    .map(|c| Rational { num: B::read_u32(&c[..4]), denom: B::read_u32(&c[4..]) })
                    .collect(),
            ),
            Format::SRational => Value::SRational(
                d.chunks_exact(8)
                    .map(|c| SRational { num: B::read_i32(&c[..4]), denom: B::read_i32(&c[4..]) })
                    .collect(),
            ),
            Format::Undefined => Value::Undefined(d.to_vec()),
            // filtered out by Format::is_implemented
            Format::SByte | Format::SShort | Format::Float | Format::Double => {
                Value::Undefined(d.to_vec())
            }
        }
    }
}

/// Everything decoded from one JPEG file.
#[derive(Clone, Debug)]
pub struct Jpeg {
    pub scan: Scan,
    pub exif: Option<Exif>,
    pub jfif: Option<Jfif>,
    pub icc: Option<IccProfileChunk>,
    /// conditions raised while routing APP segments
    pub warnings: Vec<Warning>,
}

impl Jpeg {
    /// Route the APP segments of a completed scan to their decoders.
    pub fn from_scan(scan: Scan) -> Self {
        let mut warnings = vec![];

        let mut exif = None;
        for seg in scan.app_segments("Exif") {
            match Exif::from_app_payload(&seg.payload) {
                Ok(e) => {
                    exif = Some(e);
                    break;
                }
                Err(reason) => {
                    let offset = seg.descriptor.marker_offset;
                    raise(&mut warnings, Warning::SkippedExif { offset, reason });
                }
            }
        }
        let jfif = scan
            .app_segments("JFIF")
            .find_map(|seg| Jfif::from_app_payload(&seg.payload, &mut warnings));
        let icc = scan
            .app_segments("ICC_PROFILE")
            .find_map(|seg| IccProfileChunk::from_app_payload(&seg.payload, &mut warnings));

        for seg in &scan.segments {
            match seg.app_identifier() {
                None | Some("Exif") | Some("JFIF") | Some("ICC_PROFILE") => {}
                Some(other) => tracing::debug!(
                    "not examining {} {} segment at {}",
                    seg.kind(),
                    other,
                    seg.descriptor.marker_offset
                ),
            }
        }

        Jpeg { scan, exif, jfif, icc, warnings }
    }

    /// Summarize into a property record; an image without Exif data yields
    /// a record with only the file fields set.
    pub fn properties(&self, file_name: impl Into<String>, byte_size: u64) -> PropertyRecord {
        match self.exif {
            Some(ref exif) => summarize(file_name, byte_size, &exif.directories),
            None => PropertyRecord::empty(file_name, byte_size),
        }
    }

    /// Every warning raised for this file, scan first.
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        let exif = self.exif.as_ref().map_or(&[][..], |e| e.warnings.as_slice());
        self.scan.warnings.iter().chain(exif).chain(self.warnings.iter())
    }
}

/// Scan a JPEG stream and decode its metadata segments.
pub fn decode_jpeg<R: Read>(rdr: R) -> std::result::Result<Jpeg, ScanError> {
    Ok(Jpeg::from_scan(jpeg::scan(rdr)?))
}

/// Read a JPEG file and summarize its metadata.
pub fn read_properties<P: AsRef<Path>>(path: P) -> Result<PropertyRecord> {
    let path = path.as_ref();
    let f = File::open(path)?;
    let byte_size = f.metadata()?.len();
    let jpeg = decode_jpeg(BufReader::new(f))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(jpeg.properties(file_name, byte_size))
}
