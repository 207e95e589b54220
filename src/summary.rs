//! Reduce decoded directories to a flat set of photo properties.

use std::borrow::Cow;

use crate::error::Warning;
use crate::tag::{self, exif, gps};
use crate::{Directories, Ifd, Rational, Value};

/// Properties of one photo. `None` means the file does not provide the field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyRecord {
    pub file_name: String,
    pub byte_size: u64,
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    /// raw EXIF "YYYY:MM:DD HH:MM:SS" text
    pub timestamp: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// signed decimal degrees, south and west negative
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude_display: Option<String>,
    pub longitude_display: Option<String>,
    /// metres, to the nearest 100
    pub altitude: Option<f64>,
    /// GPS processing method was "GPS", as opposed to a network or manual fix
    pub from_gps: bool,
}

impl PropertyRecord {
    pub fn empty(file_name: impl Into<String>, byte_size: u64) -> Self {
        PropertyRecord { file_name: file_name.into(), byte_size, ..Default::default() }
    }
}

/// Build a property record from `directories`. Missing or malformed tags
/// leave their field unset.
pub fn summarize(
    file_name: impl Into<String>,
    byte_size: u64,
    directories: &Directories,
) -> PropertyRecord {
    let mut p = PropertyRecord::empty(file_name, byte_size);
    let ifd0 = directories.get("IFD0");
    let exif_ifd = directories.get(tag::EXIF_IFD);

    p.width = lookup_u32(ifd0, tag::IMAGE_WIDTH)
        .or_else(|| lookup_u32(exif_ifd, exif::PIXEL_X_DIMENSION));
    p.height = lookup_u32(ifd0, tag::IMAGE_HEIGHT)
        .or_else(|| lookup_u32(exif_ifd, exif::PIXEL_Y_DIMENSION));

    p.timestamp = [(ifd0, tag::MODIFY_DATE), (exif_ifd, exif::DATE_TIME_ORIGINAL)]
        .iter()
        .filter_map(|&(ifd, t)| lookup_str(ifd, t))
        // an undecodable string comes through empty
        .find(|s| !s.is_empty() && !s.starts_with("0000"))
        .map(str::to_owned);

    p.make = lookup_str(ifd0, tag::MAKE).map(str::to_owned);
    p.model = lookup_str(ifd0, tag::MODEL).map(str::to_owned);
    p.software = lookup_str(ifd0, tag::SOFTWARE).map(str::to_owned);

    if let Some(g) = directories.get(tag::GPS_IFD) {
        summarize_gps(&mut p, g);
    }

    p
}

fn summarize_gps(p: &mut PropertyRecord, g: &Ifd) {
    p.from_gps = processing_method_is_gps(g);
    // coordinates not fixed by a receiver are only trusted to 4 places
    let places = if p.from_gps { 5 } else { 4 };

    if let Some(lat) = coordinate(g, gps::LATITUDE_REF, gps::LATITUDE, "S", "latitude") {
        let lat = round_to(lat, places);
        p.latitude = Some(lat);
        p.latitude_display = Some(format!("{:.*}", places as usize, lat));
    }
    if let Some(long) = coordinate(g, gps::LONGITUDE_REF, gps::LONGITUDE, "W", "longitude") {
        let long = round_to(long, places);
        p.longitude = Some(long);
        p.longitude_display = Some(format!("{:.*}", places as usize, long));
    }

    if p.from_gps {
        let altitude = g.get(gps::ALTITUDE).and_then(|e| e.value.as_rationals());
        if let Some(r) = altitude.and_then(|v| v.first()) {
            match r.to_f64() {
                Some(alt) => p.altitude = Some(round_to(alt, -2)),
                None => malformed("altitude"),
            }
        }
    }
}

fn processing_method_is_gps(g: &Ifd) -> bool {
    let text: Cow<str> = match g.get(gps::PROCESSING_METHOD).map(|e| &e.value) {
        Some(Value::Ascii(s)) => Cow::Borrowed(s.as_str()),
        Some(Value::Undefined(b)) => {
            // UNDEFINED text carries an 8 byte character code prefix
            let b: &[u8] = b;
            let b = b.strip_prefix(b"ASCII\0\0\0").unwrap_or(b);
            String::from_utf8_lossy(b)
        }
        _ => return false,
    };
    text.trim_end_matches('\0') == "GPS"
}

/// Decimal degrees from a DMS triple, negated when the ref equals `negative_ref`.
fn coordinate(
    g: &Ifd,
    ref_tag: u16,
    dms_tag: u16,
    negative_ref: &str,
    field: &'static str,
) -> Option<f64> {
    let dms = g.get(dms_tag).and_then(|e| e.value.as_rationals())?;
    if dms.len() != 3 {
        malformed(field);
        return None;
    }

    let value = match dms_to_decimal(dms[0], dms[1], dms[2]) {
        Some(v) => v,
        None => {
            malformed(field);
            return None;
        }
    };

    let negative = lookup_str(Some(g), ref_tag).map_or(false, |r| r.trim() == negative_ref);
    Some(if negative { -value } else { value })
}

/// Degrees and minutes must be whole numbers with a unit denominator.
fn dms_to_decimal(degrees: Rational, minutes: Rational, seconds: Rational) -> Option<f64> {
    if degrees.denom != 1 || minutes.denom != 1 {
        return None;
    }
    let seconds = seconds.to_f64()?;
    Some(degrees.num as f64 + minutes.num as f64 / 60.0 + seconds / 3600.0)
}

/// Round to `places` decimal places; negative places round to tens, hundreds...
fn round_to(v: f64, places: i32) -> f64 {
    if places >= 0 {
        let f = 10f64.powi(places);
        (v * f).round() / f
    } else {
        let f = 10f64.powi(-places);
        (v / f).round() * f
    }
}

fn malformed(field: &'static str) {
    tracing::warn!("{}", Warning::MalformedRational { field });
}

fn lookup_u32(ifd: Option<&Ifd>, tag: u16) -> Option<u32> {
    ifd?.get(tag)?.value.as_u32()
}

/// String value with any NUL padding after the terminator removed.
fn lookup_str(ifd: Option<&Ifd>, tag: u16) -> Option<&str> {
    ifd?.get(tag)?.value.as_str().map(|s| s.trim_end_matches('\0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entry;
    use indexmap::IndexMap;

    fn ifd(name: &str, entries: Vec<(u16, Value)>) -> Ifd {
        let mut map: IndexMap<u16, Vec<Entry>> = IndexMap::new();
        for (i, (tag, value)) in entries.into_iter().enumerate() {
            let format_code = match value {
                Value::Ascii(_) => 2,
                Value::UShort(_) => 3,
                Value::ULong(_) => 4,
                Value::URational(_) => 5,
                _ => 7,
            };
            let count = value.len() as u32;
            let e = Entry { tag, index: i as u16, format_code, count, value };
            map.entry(tag).or_default().push(e);
        }
        Ifd { name: name.to_owned(), offset: 8, entries: map, next_offset: 0 }
    }

    fn dirs(ifds: Vec<Ifd>) -> Directories {
        ifds.into_iter().map(|d| (d.name.clone(), d)).collect()
    }

    fn ascii(s: &str) -> Value {
        Value::Ascii(s.to_owned())
    }

    fn rationals(v: &[(u32, u32)]) -> Value {
        Value::URational(v.iter().map(|&(num, denom)| Rational { num, denom }).collect())
    }

    #[test]
    fn camera_fields_and_dimensions() {
        let d = dirs(vec![ifd(
            "IFD0",
            vec![
                (tag::MAKE, ascii("Canon")),
                (tag::MODEL, ascii("EOS 5D")),
                (tag::IMAGE_WIDTH, Value::UShort(vec![4000])),
                (tag::IMAGE_HEIGHT, Value::ULong(vec![3000])),
            ],
        )]);
        let p = summarize("a.jpg", 1234, &d);
        assert_eq!(p.file_name, "a.jpg");
        assert_eq!(p.byte_size, 1234);
        assert_eq!(p.make.as_deref(), Some("Canon"));
        assert_eq!(p.model.as_deref(), Some("EOS 5D"));
        assert_eq!(p.software, None);
        assert_eq!((p.width, p.height), (Some(4000), Some(3000)));
        assert_eq!(p.timestamp, None);
        assert_eq!(p.latitude, None);
        assert!(!p.from_gps);
    }

    #[test]
    fn dimensions_fall_back_to_exif_directory() {
        let d = dirs(vec![
            ifd("IFD0", vec![(tag::IMAGE_WIDTH, Value::UShort(vec![640]))]),
            ifd(
                "Exif",
                vec![
                    (exif::PIXEL_X_DIMENSION, Value::ULong(vec![1])),
                    (exif::PIXEL_Y_DIMENSION, Value::UShort(vec![480])),
                ],
            ),
        ]);
        let p = summarize("a.jpg", 0, &d);
        assert_eq!((p.width, p.height), (Some(640), Some(480)));
    }

    #[test]
    fn zeroed_timestamp_is_rejected() {
        let d = dirs(vec![
            ifd("IFD0", vec![(tag::MODIFY_DATE, ascii("0000:00:00 00:00:00"))]),
            ifd("Exif", vec![(exif::DATE_TIME_ORIGINAL, ascii("2020:01:01 12:00:00"))]),
        ]);
        assert_eq!(summarize("a.jpg", 0, &d).timestamp.as_deref(), Some("2020:01:01 12:00:00"));

        let zeroed = ascii("0000:00:00 00:00:00");
        let d = dirs(vec![ifd("Exif", vec![(exif::DATE_TIME_ORIGINAL, zeroed)])]);
        assert_eq!(summarize("a.jpg", 0, &d).timestamp, None);

        let d = dirs(vec![
            ifd("IFD0", vec![(tag::MODIFY_DATE, ascii("2019:05:04 10:00:00"))]),
            ifd("Exif", vec![(exif::DATE_TIME_ORIGINAL, ascii("2020:01:01 12:00:00"))]),
        ]);
        assert_eq!(summarize("a.jpg", 0, &d).timestamp.as_deref(), Some("2019:05:04 10:00:00"));
    }

    #[test]
    fn padded_and_undecodable_strings() {
        let d = dirs(vec![
            ifd(
                "IFD0",
                vec![
                    (tag::MAKE, ascii("Canon\0\0")),
                    (tag::MODEL, ascii("")),
                    (tag::MODIFY_DATE, ascii("")),
                ],
            ),
            ifd("Exif", vec![(exif::DATE_TIME_ORIGINAL, ascii("2021:06:30 08:15:00\0"))]),
        ]);
        let p = summarize("a.jpg", 0, &d);
        assert_eq!(p.make.as_deref(), Some("Canon"));
        assert_eq!(p.model.as_deref(), Some(""));
        assert_eq!(p.timestamp.as_deref(), Some("2021:06:30 08:15:00"));
    }

    #[test]
    fn gps_fix_from_receiver() {
        let d = dirs(vec![ifd(
            "GPS",
            vec![
                (gps::LATITUDE_REF, ascii("N")),
                (gps::LATITUDE, rationals(&[(51, 1), (30, 1), (0, 1)])),
                (gps::LONGITUDE_REF, ascii("W")),
                (gps::LONGITUDE, rationals(&[(0, 1), (7, 1), (3960, 100)])),
                (gps::ALTITUDE, rationals(&[(1234, 10)])),
                (gps::PROCESSING_METHOD, Value::Undefined(b"ASCII\0\0\0GPS".to_vec())),
            ],
        )]);
        let p = summarize("a.jpg", 0, &d);
        assert!(p.from_gps);
        assert_eq!(p.latitude, Some(51.5));
        assert_eq!(p.latitude_display.as_deref(), Some("51.50000"));
        assert_eq!(p.longitude, Some(-0.12767));
        assert_eq!(p.longitude_display.as_deref(), Some("-0.12767"));
        assert_eq!(p.altitude, Some(100.0));
    }

    #[test]
    fn inferred_fix_has_lower_precision_and_no_altitude() {
        let d = dirs(vec![ifd(
            "GPS",
            vec![
                (gps::LATITUDE_REF, ascii("S")),
                (gps::LATITUDE, rationals(&[(33, 1), (51, 1), (3540, 100)])),
                (gps::LONGITUDE_REF, ascii("E")),
                (gps::LONGITUDE, rationals(&[(151, 1), (12, 1), (3600, 100)])),
                (gps::ALTITUDE, rationals(&[(250, 1)])),
                (gps::PROCESSING_METHOD, ascii("NETWORK")),
            ],
        )]);
        let p = summarize("a.jpg", 0, &d);
        assert!(!p.from_gps);
        assert_eq!(p.latitude, Some(-33.8598));
        assert_eq!(p.latitude_display.as_deref(), Some("-33.8598"));
        assert_eq!(p.longitude, Some(151.21));
        assert_eq!(p.longitude_display.as_deref(), Some("151.2100"));
        assert_eq!(p.altitude, None);
    }

    #[test]
    fn non_unit_denominator_omits_coordinate() {
        let d = dirs(vec![ifd(
            "GPS",
            vec![
                (gps::LATITUDE_REF, ascii("N")),
                (gps::LATITUDE, rationals(&[(5150, 100), (0, 1), (0, 1)])),
                (gps::LONGITUDE, rationals(&[(1, 1), (30, 1), (0, 1)])),
            ],
        )]);
        let p = summarize("a.jpg", 0, &d);
        assert_eq!(p.latitude, None);
        assert_eq!(p.latitude_display, None);
        assert_eq!(p.longitude, Some(1.5));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(51.500004, 5), 51.5);
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(149.0, -2), 100.0);
        assert_eq!(round_to(151.0, -2), 200.0);
        assert_eq!(round_to(12.3, -2), 0.0);
    }

    #[test]
    fn processing_method_forms() {
        let g = ifd("GPS", vec![(gps::PROCESSING_METHOD, ascii("GPS"))]);
        assert!(processing_method_is_gps(&g));
        let g = ifd("GPS", vec![(gps::PROCESSING_METHOD, Value::Undefined(b"GPS\0".to_vec()))]);
        assert!(processing_method_is_gps(&g));
        let cell = Value::Undefined(b"ASCII\0\0\0CELLID".to_vec());
        let g = ifd("GPS", vec![(gps::PROCESSING_METHOD, cell)]);
        assert!(!processing_method_is_gps(&g));
        assert!(!processing_method_is_gps(&ifd("GPS", vec![])));
    }
}
