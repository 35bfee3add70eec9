//! Typed leaf atom bodies.
//!
//! Each struct models the payload of one typed leaf atom (spec §3),
//! *excluding* the common 1-byte version + 3-byte flags prefix every
//! typed leaf carries (parsed once by the caller, see
//! [`crate::atom::tree::TypedLeaf`]). Field layout and derive style
//! follow `mp4iter::atom_types` (`#[derive(BinRead)] #[br(big)]`,
//! `#[br(count = ...)]` against a previously-read field), generalized
//! to `#[derive(BinRead, BinWrite)]` so the same struct round-trips
//! (spec §4.2, §8 Round-trip property) instead of only reading.

use binrw::{BinRead, BinWrite};

/// Movie header (`mvhd`). Fields beyond `duration` are never
/// inspected by the engine and are carried as an opaque, fixed-length
/// tail so they survive untouched through a rebuild (spec §3: "opaque
/// tail (fixed length)").
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Mvhd {
    pub creation_time: u32,
    pub modification_time: u32,
    pub time_scale: u32,
    pub duration: u32,
    /// preferred_rate, preferred_volume, reserved, matrix,
    /// preview_time, preview_duration, poster_time, selection_time,
    /// selection_duration, current_time, next_track_id.
    pub opaque_tail: [u8; 84],
}

/// Track header (`tkhd`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Tkhd {
    pub creation_time: u32,
    pub modification_time: u32,
    pub track_id: u32,
    pub reserved: [u8; 4],
    pub duration: u32,
    /// reserved, layer, alternate_group, volume, reserved, matrix.
    pub opaque_middle: [u8; 52],
    /// 16.16 fixed-point track width in pixels.
    pub track_width: u32,
    /// 16.16 fixed-point track height in pixels.
    pub track_height: u32,
}

impl Tkhd {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.track_width, self.track_height)
    }
}

/// One entry of an edit list (`elst`).
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct EditListEntry {
    pub duration: u32,
    pub start_time: u32,
    pub rate: u32,
}

/// Edit list atom (`elst`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Elst {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub entries: Vec<EditListEntry>,
}

/// Media header (`mdhd`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Mdhd {
    pub creation_time: u32,
    pub modification_time: u32,
    pub time_scale: u32,
    pub duration: u32,
    pub language: u16,
    pub quality: u16,
}

/// One sample description entry within `stsd`.
///
/// Layout follows spec §3/§4.2 exactly: a 6-byte format code, a
/// 6-byte reserved run, a `u16` reference index (must be `0`, i.e.
/// file-local, per spec §3 invariants), and an opaque tail sized by
/// the entry's own declared `size`.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct SampleDescription {
    pub size: u32,
    pub format: [u8; 6],
    pub reserved: [u8; 6],
    pub reference_index: u16,
    #[br(count = size - 18)]
    pub tail: Vec<u8>,
}

impl SampleDescription {
    /// Builds a description with `size` derived from `tail.len()`.
    pub fn new(format: [u8; 6], reserved: [u8; 6], reference_index: u16, tail: Vec<u8>) -> Self {
        let size = 18 + tail.len() as u32;
        Self { size, format, reserved, reference_index, tail }
    }
}

/// Sample description atom (`stsd`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stsd {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub entries: Vec<SampleDescription>,
}

/// One run of the time-to-sample table (`stts`).
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct TimeToSampleRun {
    pub sample_count: u32,
    pub sample_duration: u32,
}

/// Time-to-sample atom (`stts`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stts {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub runs: Vec<TimeToSampleRun>,
}

/// Sync sample atom (`stss`): 1-based sample indices marking key
/// frames.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stss {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub sample_numbers: Vec<u32>,
}

/// One run of the sample-to-chunk table (`stsc`).
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct SampleToChunkRun {
    /// 1-based index of the first chunk this run applies to.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    /// 1-based index into `Stsd::entries`.
    pub sample_description_id: u32,
}

/// Sample-to-chunk atom (`stsc`).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stsc {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub runs: Vec<SampleToChunkRun>,
}

/// Sample size atom (`stsz`). `fixed_sample_size` must be `0` (spec
/// §3 invariant; variable sample sizes only).
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stsz {
    pub fixed_sample_size: u32,
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub sample_sizes: Vec<u32>,
}

/// Chunk offset atom (`stco`): absolute file offset per chunk.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Stco {
    pub number_of_entries: u32,
    #[br(count = number_of_entries)]
    pub chunk_offsets: Vec<u32>,
}
