// NB: only the tags this crate interprets, add here as needed

pub const IMAGE_WIDTH: u16 = 0x0100;
pub const IMAGE_HEIGHT: u16 = 0x0101;
pub const MAKE: u16 = 0x010f;
pub const MODEL: u16 = 0x0110;
pub const SOFTWARE: u16 = 0x0131;
pub const MODIFY_DATE: u16 = 0x0132;

pub const EXIF_IFD_POINTER: u16 = 0x8769;
pub const GPS_INFO_IFD_POINTER: u16 = 0x8825;
pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xa005;

/// Embedded directories, keyed by the tag that points at them.
pub static EMBEDDED_IFDS: &[(u16, &str)] = &[
    (EXIF_IFD_POINTER, EXIF_IFD),
    (GPS_INFO_IFD_POINTER, GPS_IFD),
    (INTEROPERABILITY_IFD_POINTER, INTEROPERABILITY_IFD),
];

pub const EXIF_IFD: &str = "Exif";
pub const GPS_IFD: &str = "GPS";
pub const INTEROPERABILITY_IFD: &str = "Interoperability";

/// Name of the `n`th directory in the root chain.
pub fn root_ifd_name(n: usize) -> String {
    format!("IFD{}", n)
}

pub mod exif {
    pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
    pub const PIXEL_X_DIMENSION: u16 = 0xa002;
    pub const PIXEL_Y_DIMENSION: u16 = 0xa003;
}

pub mod gps {
    pub const LATITUDE_REF: u16 = 0x0001;
    pub const LATITUDE: u16 = 0x0002;
    pub const LONGITUDE_REF: u16 = 0x0003;
    pub const LONGITUDE: u16 = 0x0004;
    pub const ALTITUDE: u16 = 0x0006;
    pub const PROCESSING_METHOD: u16 = 0x001b;
}
