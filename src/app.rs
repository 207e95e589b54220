//! Fixed-layout headers of the JFIF (APP0) and ICC_PROFILE (APP2) segments.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{raise, Warning};

const JFIF_ID: &[u8] = b"JFIF\0";
const ICC_ID: &[u8] = b"ICC_PROFILE\0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Jfif {
    /// (major, minor)
    pub version: (u8, u8),
    /// 0 = aspect ratio only, 1 = dots per inch, 2 = dots per cm
    pub density_units: u8,
    pub x_density: u16,
    pub y_density: u16,
    pub thumbnail_width: u8,
    pub thumbnail_height: u8,
}

impl Jfif {
    const LEN: usize = 9;

    pub fn from_app_payload(payload: &[u8], warnings: &mut Vec<Warning>) -> Option<Self> {
        let d = match payload.strip_prefix(JFIF_ID) {
            Some(d) if d.len() >= Self::LEN => d,
            _ => {
                let w = Warning::MalformedAppHeader {
                    identifier: "JFIF".to_owned(),
                    len: payload.len(),
                };
                raise(warnings, w);
                return None;
            }
        };

        Some(Jfif {
            version: (d[0], d[1]),
            density_units: d[2],
            x_density: BigEndian::read_u16(&d[3..5]),
            y_density: BigEndian::read_u16(&d[5..7]),
            thumbnail_width: d[7],
            thumbnail_height: d[8],
        })
    }
}

/// Header of the first chunk of an embedded ICC profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IccProfileChunk {
    /// 1-based chunk number
    pub sequence: u8,
    pub chunk_count: u8,
    pub profile_size: u32,
    pub cmm: String,
    /// (major, minor, bugfix)
    pub version: (u8, u8, u8),
    pub device_class: String,
    pub colour_space: String,
}

impl IccProfileChunk {
    // sequence and count, then the first 20 bytes of the profile header
    const LEN: usize = 2 + 20;

    pub fn from_app_payload(payload: &[u8], warnings: &mut Vec<Warning>) -> Option<Self> {
        let d = match payload.strip_prefix(ICC_ID) {
            Some(d) if d.len() >= Self::LEN => d,
            _ => {
                let w = Warning::MalformedAppHeader {
                    identifier: "ICC_PROFILE".to_owned(),
                    len: payload.len(),
                };
                raise(warnings, w);
                return None;
            }
        };

        let (sequence, chunk_count) = (d[0], d[1]);
        if chunk_count > 1 {
            raise(warnings, Warning::IccMultiChunk { sequence, count: chunk_count });
        }
        if sequence != 1 {
            // only the first chunk starts with the profile header
            tracing::debug!("skipping icc profile chunk {} of {}", sequence, chunk_count);
            return None;
        }

        let h = &d[2..];
        Some(IccProfileChunk {
            sequence,
            chunk_count,
            profile_size: BigEndian::read_u32(&h[0..4]),
            cmm: four_cc(&h[4..8]),
            version: (h[8], h[9] >> 4, h[9] & 0x0F),
            device_class: four_cc(&h[12..16]),
            colour_space: four_cc(&h[16..20]),
        })
    }
}

fn four_cc(b: &[u8]) -> String {
    String::from_utf8_lossy(b).trim_end_matches(|c: char| c == ' ' || c == '\0').to_owned()
}
