// http://vip.sugovica.hu/Sardi/kepnezo/JPEG%20File%20Layout%20and%20Format.htm
// https://www.imperialviolet.org/binary/jpeg/
// http://dev.exiv2.org/projects/exiv2/wiki/The_Metadata_in_JPEG_files

use std::fmt;
use std::io;
use std::io::prelude::*;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{raise, ScanError, Warning};

/// Marker prefix byte.
pub const FILL: u8 = 0xFF;
/// Byte that follows a stuffed 0xFF inside entropy-coded data.
pub const STUFFING: u8 = 0x00;

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DRI: u8 = 0xDD;
pub const DHT: u8 = 0xC4;
pub const SOF0: u8 = 0xC0;
pub const SOF2: u8 = 0xC2;

// io::Cursor only tracks position over in-memory buffers, we want it over any reader
/// Sequential reader that tracks the absolute offset of everything read through it.
pub struct PosReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> PosReader<R> {
    pub fn new(inner: R) -> Self {
        PosReader { inner, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Fill as much of `buf` as the source allows. Returns fewer bytes than
    /// requested only at end of input.
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut b = [0u8; 1];
        Ok(match self.read_up_to(&mut b)? {
            0 => None,
            _ => Some(b[0]),
        })
    }

    fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, ScanError> {
        let mut buf = vec![0u8; n];
        let got = self.read_up_to(&mut buf)?;
        if got < n {
            return Err(ScanError::Truncated { offset: self.pos, wanted: n - got });
        }
        Ok(buf)
    }
}

impl<R: Read> Read for PosReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Soi,
    Eoi,
    App(u8),
    Dqt,
    Dht,
    Sof0,
    Sof2,
    Sos,
    Dri,
    Unknown,
}

impl SegmentKind {
    pub fn from_marker(marker: u8) -> Self {
        match marker {
            SOI => SegmentKind::Soi,
            EOI => SegmentKind::Eoi,
            0xE0..=0xEF => SegmentKind::App(marker - 0xE0),
            DQT => SegmentKind::Dqt,
            DHT => SegmentKind::Dht,
            SOF0 => SegmentKind::Sof0,
            SOF2 => SegmentKind::Sof2,
            SOS => SegmentKind::Sos,
            DRI => SegmentKind::Dri,
            _ => SegmentKind::Unknown,
        }
    }

    /// SOI and EOI stand alone, everything else we accept carries a length field.
    pub fn is_length_framed(&self) -> bool {
        !matches!(*self, SegmentKind::Soi | SegmentKind::Eoi | SegmentKind::Unknown)
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SegmentKind::Soi => f.write_str("SOI"),
            SegmentKind::Eoi => f.write_str("EOI"),
            SegmentKind::App(n) => write!(f, "APP{}", n),
            SegmentKind::Dqt => f.write_str("DQT"),
            SegmentKind::Dht => f.write_str("DHT"),
            SegmentKind::Sof0 => f.write_str("SOF0"),
            SegmentKind::Sof2 => f.write_str("SOF2"),
            SegmentKind::Sos => f.write_str("SOS"),
            SegmentKind::Dri => f.write_str("DRI"),
            SegmentKind::Unknown => f.write_str("????"),
        }
    }
}

/// Where a segment sits in the file and what it is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub marker: u8,
    pub marker_offset: u64,
    pub payload_offset: u64,
    /// value of the length field, which counts itself; 0 for SOI/EOI
    pub length: u32,
    pub kind: SegmentKind,
    pub app_identifier: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Segment {
    pub descriptor: SegmentDescriptor,
    pub payload: Vec<u8>,
    /// entropy-coded bytes following an SOS header, stuffing and RSTn retained
    pub scan_data: Vec<u8>,
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        self.descriptor.kind
    }

    pub fn app_identifier(&self) -> Option<&str> {
        self.descriptor.app_identifier.as_deref()
    }
}

/// Result of scanning a complete stream.
#[derive(Clone, Debug, Default)]
pub struct Scan {
    pub segments: Vec<Segment>,
    /// opaque bytes found after EOI
    pub trailing: Vec<u8>,
    pub warnings: Vec<Warning>,
    pub bytes_read: u64,
}

impl Scan {
    /// APPn segments whose identifier matches `identifier`, in file order.
    pub fn app_segments<'a>(
        &'a self,
        identifier: &'a str,
    ) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.iter().filter(move |s| {
            matches!(s.kind(), SegmentKind::App(_)) && s.app_identifier() == Some(identifier)
        })
    }
}

#[derive(Clone, Copy)]
enum EntropyState {
    Copying,
    JustSawFf,
}

/// Splits a JPEG byte stream into segments, one `next_segment` call at a time.
pub struct SegmentScanner<R> {
    rdr: PosReader<R>,
    // marker pair already consumed by entropy-coded scanning
    pending: Option<[u8; 2]>,
    first: Option<SegmentKind>,
    eoi_found: bool,
    done: bool,
    trailing: Vec<u8>,
    warnings: Vec<Warning>,
}

impl<R: Read> SegmentScanner<R> {
    pub fn new(rdr: R) -> Self {
        SegmentScanner {
            rdr: PosReader::new(rdr),
            pending: None,
            first: None,
            eoi_found: false,
            done: false,
            trailing: vec![],
            warnings: vec![],
        }
    }

    /// Read the next segment. Returns `Ok(None)` after EOI or at a clean end of input.
    /// A structural error ends the scan, segments returned before it remain valid.
    pub fn next_segment(&mut self) -> Result<Option<Segment>, ScanError> {
        if self.done {
            return Ok(None);
        }
        let res = self.read_segment();
        if res.is_err() {
            self.done = true;
        }
        res
    }

    fn read_segment(&mut self) -> Result<Option<Segment>, ScanError> {
        let (offset, pair) = match self.pending.take() {
            Some(pair) => (self.rdr.position() - 2, pair),
            None => {
                let offset = self.rdr.position();
                let mut pair = [0u8; 2];
                match self.rdr.read_up_to(&mut pair)? {
                    0 => {
                        self.done = true;
                        return Ok(None);
                    }
                    1 => return Err(ScanError::Truncated { offset: offset + 1, wanted: 1 }),
                    _ => (offset, pair),
                }
            }
        };

        if pair[0] != FILL || pair[1] == STUFFING || pair[1] == FILL {
            return Err(ScanError::MalformedMarker { offset, bytes: pair });
        }

        let marker = pair[1];
        let kind = SegmentKind::from_marker(marker);
        let mut seg = match kind {
            SegmentKind::Unknown if (0xD0..=0xD7).contains(&marker) => {
                return Err(ScanError::UnexpectedRestartMarker { offset, marker });
            }
            SegmentKind::Unknown => return Err(ScanError::UnhandledMarker { offset, marker }),
            SegmentKind::Soi | SegmentKind::Eoi => Segment {
                descriptor: SegmentDescriptor {
                    marker,
                    marker_offset: offset,
                    payload_offset: offset + 2,
                    length: 0,
                    kind,
                    app_identifier: None,
                },
                payload: vec![],
                scan_data: vec![],
            },
            _ => self.read_framed(marker, offset, kind)?,
        };

        if self.first.is_none() {
            self.first = Some(kind);
        }
        tracing::debug!(
            "{} segment at {}, length {}",
            kind,
            seg.descriptor.marker_offset,
            seg.descriptor.length
        );

        match kind {
            SegmentKind::Sos => {
                let (data, next) = self.read_entropy_coded()?;
                seg.scan_data = data;
                self.pending = next;
            }
            SegmentKind::Eoi => {
                self.eoi_found = true;
                self.done = true;
                self.rdr.read_to_end(&mut self.trailing)?;
                if !self.trailing.is_empty() {
                    let n = self.trailing.len();
                    tracing::info!("found {} unknown byte(s) after EOI marker", n);
                }
            }
            _ => {}
        }

        Ok(Some(seg))
    }

    fn read_framed(
        &mut self,
        marker: u8,
        offset: u64,
        kind: SegmentKind,
    ) -> Result<Segment, ScanError> {
        let mut len_bytes = [0u8; 2];
        let got = self.rdr.read_up_to(&mut len_bytes)?;
        if got < 2 {
            return Err(ScanError::Truncated { offset: self.rdr.position(), wanted: 2 - got });
        }
        let length = BigEndian::read_u16(&len_bytes);
        if length < 2 {
            return Err(ScanError::InvalidLength { offset: offset + 2, length });
        }

        let payload = self.rdr.read_exactly(length as usize - 2)?;
        let app_identifier = match kind {
            SegmentKind::App(_) => Some(app_identifier(&payload)),
            _ => None,
        };

        Ok(Segment {
            descriptor: SegmentDescriptor {
                marker,
                marker_offset: offset,
                payload_offset: offset + 4,
                length: length as u32,
                kind,
                app_identifier,
            },
            payload,
            scan_data: vec![],
        })
    }

    /// Consume entropy-coded data up to the next marker that is neither
    /// stuffing nor RSTn. Returns the data and that marker pair, if any.
    fn read_entropy_coded(&mut self) -> Result<(Vec<u8>, Option<[u8; 2]>), ScanError> {
        let mut data = vec![];
        let mut state = EntropyState::Copying;
        loop {
            let b = match self.rdr.read_byte()? {
                Some(b) => b,
                None => {
                    if let EntropyState::JustSawFf = state {
                        data.push(FILL);
                    }
                    let at = self.rdr.position();
                    tracing::debug!("premature end of input in entropy-coded data at {}", at);
                    return Ok((data, None));
                }
            };
            state = match (state, b) {
                (EntropyState::Copying, FILL) => EntropyState::JustSawFf,
                (EntropyState::Copying, b) => {
                    data.push(b);
                    EntropyState::Copying
                }
                (EntropyState::JustSawFf, STUFFING) | (EntropyState::JustSawFf, 0xD0..=0xD7) => {
                    data.push(FILL);
                    data.push(b);
                    EntropyState::Copying
                }
                (EntropyState::JustSawFf, b) => return Ok((data, Some([FILL, b]))),
            };
        }
    }

    /// Collect `segments` into a `Scan`, applying the SOI/EOI checks.
    pub fn into_scan(mut self, segments: Vec<Segment>) -> Scan {
        if self.first != Some(SegmentKind::Soi) {
            raise(&mut self.warnings, Warning::MissingSoi);
        }
        if !self.eoi_found {
            raise(&mut self.warnings, Warning::MissingEoi);
        }
        Scan {
            segments,
            trailing: self.trailing,
            warnings: self.warnings,
            bytes_read: self.rdr.position(),
        }
    }
}

/// Segment an entire stream.
pub fn scan<R: Read>(rdr: R) -> Result<Scan, ScanError> {
    let mut scanner = SegmentScanner::new(rdr);
    let mut segments = vec![];
    while let Some(seg) = scanner.next_segment()? {
        segments.push(seg);
    }
    Ok(scanner.into_scan(segments))
}

pub fn scan_bytes(bytes: &[u8]) -> Result<Scan, ScanError> {
    scan(bytes)
}

/// NUL-terminated ASCII prefix of an APPn payload, empty if there is none.
fn app_identifier(payload: &[u8]) -> String {
    match payload.iter().position(|&b| b == 0) {
        Some(n) if n > 0 && payload[..n].is_ascii() => {
            String::from_utf8_lossy(&payload[..n]).into_owned()
        }
        _ => String::new(),
    }
}

/// Remove byte stuffing from entropy-coded data. RSTn markers are left in place.
pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev_ff = false;
    for &b in data {
        if prev_ff && b == STUFFING {
            prev_ff = false;
            continue;
        }
        out.push(b);
        prev_ff = b == FILL;
    }
    out
}
