//! Atom classification tables and MP4 constants.
//!
//! Mirrors `mp4iter::consts::CONTAINER`, generalized to cover every
//! dispatch class the atom tree parser (spec §4.1) needs: containers,
//! atoms with a typed/parsed payload, and opaque leaves that are only
//! ever byte-copied.

use time::{self, Duration, Month, PrimitiveDateTime};

/// Atoms that are containers of further atoms.
/// `meta` additionally carries a 4-byte opaque prefix before its
/// children (spec §3, Atom invariants).
pub const CONTAINER: [&str; 9] = [
    "moov", "trak", "mdia", "minf", "edts", "dinf", "stbl", "udta", "meta",
];

/// Containers that carry a fixed-length opaque prefix before their
/// children.
pub const CONTAINER_PREFIX_LEN: [(&str, usize); 1] = [("meta", 4)];

pub fn container_prefix_len(name: &str) -> usize {
    CONTAINER_PREFIX_LEN
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, len)| *len)
        .unwrap_or(0)
}

/// Leaf atoms with a registered typed parser (spec §4.1).
pub const TYPED: [&str; 10] = [
    "mvhd", "tkhd", "elst", "mdhd", "stco", "stsz", "stsc", "stss", "stts", "stsd",
];

/// Leaf atoms that are recorded (position + size) and skipped.
pub const OPAQUE: [&str; 7] = ["ftyp", "hdlr", "mdat", "vmhd", "dref", "ilst", "free"];

/// 16.16 fixed-point value representing `1.0`.
pub const FIXED_POINT_ONE: u32 = 0x0001_0000;

/// Edit list rate that means "play at normal speed" (`1.0` in 16.16).
pub const ELST_RATE_NORMAL: u32 = FIXED_POINT_ONE;

/// QuickTime/MP4 epoch: 1904-01-01 00:00:00.
pub fn mp4_time_zero() -> PrimitiveDateTime {
    time::Date::from_calendar_date(1904, Month::January, 1)
        .unwrap()
        .with_hms_milli(0, 0, 0, 0)
        .unwrap()
}

/// Converts an `mvhd`/`mdhd` timestamp (seconds since the MP4 epoch)
/// into a calendar date, for log messages only — the core never
/// compares or mutates these as dates, only as opaque `u32` ticks.
pub fn mp4_time_to_datetime(seconds_since_epoch: u32) -> PrimitiveDateTime {
    mp4_time_zero() + Duration::seconds(seconds_since_epoch as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_converts_to_1904() {
        let dt = mp4_time_to_datetime(0);
        assert_eq!(dt.year(), 1904);
    }
}
