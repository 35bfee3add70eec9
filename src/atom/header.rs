//! MP4 atom header: `<u32 size><4-byte FourCC>`.
//!
//! Ported from `mp4iter::atom::AtomHeader`, trimmed to 32-bit sizes
//! only — the 64-bit `largesize` form is an explicit Non-goal (spec
//! §1, §6): `size == 1` is a parse failure here, not a second read.

use crate::fourcc::FourCC;

/// 8-byte atom header: big-endian `u32` total size (header included)
/// followed by a 4-byte type code.
#[derive(Debug, Clone)]
pub struct AtomHeader {
    /// Total atom size in bytes, including this 8-byte header.
    pub size: u64,
    /// Type code.
    pub name: FourCC,
    /// Absolute byte offset of the start of this atom (the size
    /// field) in its source file.
    pub offset: u64,
}

impl AtomHeader {
    pub const LEN: u64 = 8;

    pub fn new(size: u64, name: FourCC, offset: u64) -> Self {
        Self { size, name, offset }
    }

    /// Absolute offset of the byte immediately after the header.
    pub fn payload_offset(&self) -> u64 {
        self.offset + Self::LEN
    }

    /// Size of the payload, excluding the 8-byte header.
    pub fn payload_size(&self) -> u64 {
        self.size - Self::LEN
    }

    /// Absolute offset of the first byte past this atom.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}
