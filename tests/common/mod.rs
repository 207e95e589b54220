#![allow(dead_code)]

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Assembles a JPEG stream segment by segment.
#[derive(Default)]
pub struct JpegBuilder {
    buf: Vec<u8>,
}

impl JpegBuilder {
    pub fn new() -> Self {
        JpegBuilder::default()
    }

    pub fn soi(self) -> Self {
        self.raw(&[0xFF, 0xD8])
    }

    pub fn eoi(self) -> Self {
        self.raw(&[0xFF, 0xD9])
    }

    /// Length-framed segment; the length field counts itself.
    pub fn segment(mut self, marker: u8, payload: &[u8]) -> Self {
        self.buf.extend_from_slice(&[0xFF, marker]);
        self.buf.write_u16::<BigEndian>(payload.len() as u16 + 2).unwrap();
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub fn jfif_payload() -> Vec<u8> {
    vec![0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]
}

pub fn exif_payload(tiff: &[u8]) -> Vec<u8> {
    let mut p = b"Exif\0\0".to_vec();
    p.extend_from_slice(tiff);
    p
}

pub enum Field {
    Ascii(&'static str),
    Short(u16),
    Long(u32),
    Rationals(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
    /// offset of another directory, by its index in the layout
    Pointer(usize),
}

pub struct Dir {
    pub entries: Vec<(u16, Field)>,
    /// index of the next directory in the chain
    pub next: Option<usize>,
}

/// Lay out a TIFF region: header, then each directory followed by its
/// out-of-line data.
pub fn tiff<B: ByteOrder>(dirs: &[Dir]) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(if is_big::<B>() { b"MM" } else { b"II" });
    buf.write_u16::<B>(42).unwrap();
    buf.write_u32::<B>(8).unwrap();

    let mut offsets = vec![];
    let mut patches = vec![];
    for d in dirs {
        let start = buf.len();
        offsets.push(start as u32);
        let mut data_offset = start + 2 + d.entries.len() * 12 + 4;
        let mut data = vec![];

        buf.write_u16::<B>(d.entries.len() as u16).unwrap();
        for (tag, field) in &d.entries {
            buf.write_u16::<B>(*tag).unwrap();
            let (fmt, count, bytes) = encode::<B>(field);
            buf.write_u16::<B>(fmt).unwrap();
            buf.write_u32::<B>(count).unwrap();
            if let Field::Pointer(target) = *field {
                patches.push((buf.len(), target));
                buf.write_u32::<B>(0).unwrap();
            } else if bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                buf.extend_from_slice(&inline);
            } else {
                buf.write_u32::<B>(data_offset as u32).unwrap();
                data_offset += bytes.len();
                data.extend_from_slice(&bytes);
            }
        }
        match d.next {
            Some(target) => {
                patches.push((buf.len(), target));
                buf.write_u32::<B>(0).unwrap();
            }
            None => buf.write_u32::<B>(0).unwrap(),
        }
        buf.extend_from_slice(&data);
    }

    for (pos, target) in patches {
        B::write_u32(&mut buf[pos..pos + 4], offsets[target]);
    }
    buf
}

fn is_big<B: ByteOrder>() -> bool {
    let mut b = [0u8; 2];
    B::write_u16(&mut b, 1);
    b[1] == 1
}

fn encode<B: ByteOrder>(field: &Field) -> (u16, u32, Vec<u8>) {
    let mut out = vec![];
    match *field {
        Field::Ascii(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
            (2, out.len() as u32, out)
        }
        Field::Short(v) => {
            out.write_u16::<B>(v).unwrap();
            (3, 1, out)
        }
        Field::Long(v) => {
            out.write_u32::<B>(v).unwrap();
            (4, 1, out)
        }
        Field::Rationals(ref v) => {
            for &(n, d) in v {
                out.write_u32::<B>(n).unwrap();
                out.write_u32::<B>(d).unwrap();
            }
            (5, v.len() as u32, out)
        }
        Field::Undefined(ref v) => (7, v.len() as u32, v.clone()),
        Field::Pointer(_) => (4, 1, vec![0; 4]),
    }
}

/// IFD0 -> IFD1 chain, with Exif and GPS directories hanging off IFD0 and
/// an Interoperability directory hanging off Exif.
pub fn camera_tiff<B: ByteOrder>() -> Vec<u8> {
    tiff::<B>(&[
        Dir {
            entries: vec![
                (0x010f, Field::Ascii("Canon")),
                (0x0110, Field::Ascii("Canon EOS 80D")),
                (0x0131, Field::Ascii("Firmware 1.0.2")),
                (0x0132, Field::Ascii("0000:00:00 00:00:00")),
                (0x8769, Field::Pointer(2)),
                (0x8825, Field::Pointer(3)),
            ],
            next: Some(1),
        },
        Dir { entries: vec![(0x0100, Field::Short(160)), (0x0101, Field::Short(120))], next: None },
        Dir {
            entries: vec![
                (0x9003, Field::Ascii("2020:01:01 12:00:00")),
                (0xa002, Field::Long(6000)),
                (0xa003, Field::Long(4000)),
                (0xa005, Field::Pointer(4)),
            ],
            next: None,
        },
        Dir {
            entries: vec![
                (0x0001, Field::Ascii("N")),
                (0x0002, Field::Rationals(vec![(51, 1), (30, 1), (0, 1)])),
                (0x0003, Field::Ascii("W")),
                (0x0004, Field::Rationals(vec![(0, 1), (7, 1), (3960, 100)])),
                (0x0006, Field::Rationals(vec![(2345, 10)])),
                (0x001b, Field::Undefined(b"ASCII\0\0\0GPS".to_vec())),
            ],
            next: None,
        },
        Dir { entries: vec![(0x0001, Field::Ascii("R98"))], next: None },
    ])
}

/// Entropy-coded data with stuffed 0xFF bytes and a restart marker.
pub const SCAN_DATA: [u8; 10] = [0x12, 0x34, 0xFF, 0x00, 0x56, 0xFF, 0xD0, 0x78, 0xFF, 0x00];

pub fn camera_jpeg<B: ByteOrder>() -> Vec<u8> {
    JpegBuilder::new()
        .soi()
        .segment(0xE0, &jfif_payload())
        .segment(0xE1, &exif_payload(&camera_tiff::<B>()))
        .segment(0xDB, &[0u8; 65])
        .segment(0xC0, &[8, 0, 120, 0, 160, 1, 1, 0x11, 0])
        .segment(0xC4, &[0u8; 29])
        .segment(0xDD, &[0x00, 0x00])
        .segment(0xDA, &[1, 1, 0, 0, 63, 0])
        .raw(&SCAN_DATA)
        .eoi()
        .build()
}
