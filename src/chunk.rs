//! Chunk derivation (spec §3 "Chunk", §4.3).

use std::path::PathBuf;

use crate::atom::parse::stss_or_synthesize;
use crate::atom::types::{SampleDescription, SampleToChunkRun, Stsc};
use crate::error::Mp4Error;
use crate::file::Mp4File;
use crate::fourcc::FourCC;

/// One contiguous run of samples in a source file's `mdat`, ready to
/// be spliced into a destination.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source_path: PathBuf,
    pub chunk_index: usize,
    pub offset_in_source: u64,
    pub byte_length: u64,
    pub sample_sizes: Vec<u32>,
    /// 0-based offsets, relative to this chunk's first sample, of
    /// every sync (key frame) sample within it.
    pub local_keyframe_offsets: Vec<u32>,
    pub sample_description: SampleDescription,
    /// `tkhd.track_width`/`track_height` of this chunk's source file,
    /// carried alongside the chunk so the update engine can enforce
    /// spec §3's "all selected chunks share identical pixel
    /// dimensions" invariant without re-opening every source.
    pub dimensions: (u32, u32),
}

/// Derives the ordered chunk list for a parsed file and asserts it
/// tiles the file's `mdat` payload exactly (spec §3 invariants,
/// `ChunkContiguityViolation`).
pub fn chunks_of(file: &Mp4File) -> Result<Vec<Chunk>, Mp4Error> {
    let moov = file
        .moov()
        .ok_or_else(|| Mp4Error::MalformedAtom(format!("'{}' has no moov", file.path.display())))?;
    let mdat = file
        .mdat()
        .ok_or_else(|| Mp4Error::MalformedAtom(format!("'{}' has no mdat", file.path.display())))?;

    let stbl = moov
        .find(&FourCC::Stbl)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing stbl".into()))?;

    let stsc = stbl.as_stsc().ok_or_else(|| Mp4Error::MalformedAtom("missing stsc".into()))?;
    let stsz = stbl.as_stsz().ok_or_else(|| Mp4Error::MalformedAtom("missing stsz".into()))?;
    let stsd = stbl.as_stsd().ok_or_else(|| Mp4Error::MalformedAtom("missing stsd".into()))?;

    let dimensions = moov
        .find(&FourCC::Tkhd)
        .and_then(|a| a.as_tkhd())
        .map(|t| t.dimensions())
        .ok_or_else(|| Mp4Error::MalformedAtom("missing tkhd".into()))?;

    if stsz.fixed_sample_size != 0 {
        return Err(Mp4Error::UnsupportedFeature(
            "stsz.fixed_sample_size must be 0 (variable sample sizes only)".into(),
        ));
    }

    let sample_count = stsz.sample_sizes.len() as u32;
    let stss = stss_or_synthesize(stbl, sample_count);

    let total_samples = stsz.sample_sizes.len();
    let nchunks = stsc_chunk_count(stsc, total_samples)?;

    let mut chunks = Vec::with_capacity(nchunks);
    let mut first_sample = 0usize;
    let mut offset = mdat.header().payload_offset();

    for k in 0..nchunks {
        let run = stsc_run_for(stsc, k)?;
        let samples_per_chunk = run.samples_per_chunk as usize;
        let last_sample = first_sample + samples_per_chunk;
        if last_sample > stsz.sample_sizes.len() {
            return Err(Mp4Error::MalformedAtom(format!(
                "stsc run for chunk {k} overruns stsz (needs sample {last_sample}, have {})",
                stsz.sample_sizes.len()
            )));
        }

        let sample_sizes = stsz.sample_sizes[first_sample..last_sample].to_vec();
        let byte_length: u64 = sample_sizes.iter().map(|s| *s as u64).sum();

        let local_keyframe_offsets = stss
            .sample_numbers
            .iter()
            .filter(|s| {
                let s = **s as usize;
                s > first_sample && s <= last_sample
            })
            .map(|s| (*s as usize - 1 - first_sample) as u32)
            .collect();

        let sample_description = stsd
            .entries
            .get(run.sample_description_id as usize - 1)
            .cloned()
            .ok_or_else(|| {
                Mp4Error::MalformedAtom(format!(
                    "stsc references sample description {} but stsd has {} entries",
                    run.sample_description_id,
                    stsd.entries.len()
                ))
            })?;

        chunks.push(Chunk {
            source_path: file.path.clone(),
            chunk_index: k,
            offset_in_source: offset,
            byte_length,
            sample_sizes,
            local_keyframe_offsets,
            sample_description,
            dimensions,
        });

        offset += byte_length;
        first_sample = last_sample;
    }

    let mdat_end = mdat.header().end();
    if offset != mdat_end {
        return Err(Mp4Error::ChunkContiguityViolation { source: file.path.display().to_string() });
    }

    Ok(chunks)
}

/// Slices a chunk list the way the CLI's `[start:end]` suffix does
/// (spec §6), with Python-style negative-index wraparound. Shared by
/// `cli::parse_spec` callers and tests.
pub fn slice(chunks: &[Chunk], start: Option<i64>, end: Option<i64>) -> Vec<Chunk> {
    let len = chunks.len() as i64;
    let normalize = |idx: i64| -> i64 {
        if idx < 0 { (len + idx).max(0) } else { idx.min(len) }
    };
    let start = start.map(normalize).unwrap_or(0);
    let end = end.map(normalize).unwrap_or(len);
    if start >= end {
        return Vec::new();
    }
    chunks[start as usize..end as usize].to_vec()
}

fn stsc_run_for(stsc: &Stsc, chunk_index: usize) -> Result<SampleToChunkRun, Mp4Error> {
    let chunk_number = chunk_index as u32 + 1;
    stsc.runs
        .iter()
        .filter(|run| run.first_chunk <= chunk_number)
        .max_by_key(|run| run.first_chunk)
        .copied()
        .ok_or_else(|| Mp4Error::MalformedAtom(format!("no stsc run covers chunk {chunk_number}")))
}

fn stsc_chunk_count(stsc: &Stsc, total_samples: usize) -> Result<usize, Mp4Error> {
    let mut n = 0usize;
    let mut covered = 0usize;
    while covered < total_samples {
        let run = stsc_run_for(stsc, n)?;
        covered += run.samples_per_chunk.max(1) as usize;
        n += 1;
        if n > total_samples + 1 {
            return Err(Mp4Error::MalformedAtom("stsc runs do not terminate".into()));
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: usize, len: usize) -> Chunk {
        Chunk {
            source_path: PathBuf::from("x.mp4"),
            chunk_index: index,
            offset_in_source: 0,
            byte_length: 0,
            sample_sizes: vec![0; len],
            local_keyframe_offsets: Vec::new(),
            sample_description: SampleDescription::new([0; 6], [0; 6], 0, Vec::new()),
            dimensions: (1280, 720),
        }
    }

    #[test]
    fn slice_defaults_to_full_range() {
        let chunks = vec![ch(0, 1), ch(1, 1), ch(2, 1)];
        let s = slice(&chunks, None, None);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn slice_drops_trailing_chunks() {
        let chunks = vec![ch(0, 1), ch(1, 1), ch(2, 1)];
        let s = slice(&chunks, None, Some(2));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn slice_negative_index_wraps() {
        let chunks = vec![ch(0, 1), ch(1, 1), ch(2, 1)];
        let s = slice(&chunks, Some(-1), None);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].chunk_index, 2);
    }
}
