//! In-place update engine and full-rewrite/compaction (spec §4.4, §4.5).
//!
//! `apply` rebuilds `moov` for a requested chunk list and rewrites
//! `mdat` without moving it whenever the rebuilt index fits in the
//! space already reserved by the destination's `free` atom.
//! `copy_with_padding` is the fallback: a fresh file with a
//! provisioned `free` atom, written to a temp path for the driver to
//! rename over the destination.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::atom::header::AtomHeader;
use crate::atom::tree::Atom;
use crate::atom::types::{SampleToChunkRun, TimeToSampleRun};
use crate::atom::write::write_atom;
use crate::binio;
use crate::chunk::Chunk;
use crate::consts;
use crate::error::Mp4Error;
use crate::file::{Mp4File, SourceCache};
use crate::fourcc::FourCC;

/// Rebuilds every index field `apply`/`copy_with_padding` touch (spec
/// §4.4 steps 1-5, 7-11), leaving `stco` filled with placeholder zero
/// offsets — the caller fills those in with [`set_chunk_offsets`] once
/// it knows the anchor (`mdat`'s payload offset), since the anchor
/// differs between an in-place update and a full rewrite.
fn rebuild_moov(original: &Atom, chunks: &[Chunk]) -> Result<Atom, Mp4Error> {
    let mut moov = original.clone();

    let stbl = moov
        .find(&FourCC::Stbl)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing stbl".into()))?;
    let original_stts = stbl.as_stts().ok_or_else(|| Mp4Error::MalformedAtom("missing stts".into()))?;
    if original_stts.runs.len() != 1 {
        return Err(Mp4Error::UnsupportedFeature(
            "stts must collapse to a single run before an append".into(),
        ));
    }
    let sample_duration = original_stts.runs[0].sample_duration;

    let mdhd_time_scale = moov
        .find(&FourCC::Mdhd)
        .and_then(|a| a.as_mdhd())
        .ok_or_else(|| Mp4Error::MalformedAtom("missing mdhd".into()))?
        .time_scale;
    let mvhd = moov
        .find(&FourCC::Mvhd)
        .and_then(|a| a.as_mvhd())
        .ok_or_else(|| Mp4Error::MalformedAtom("missing mvhd".into()))?;
    let mvhd_time_scale = mvhd.time_scale;
    debug!(
        created = %consts::mp4_time_to_datetime(mvhd.creation_time),
        chunks = chunks.len(),
        "rebuilding moov"
    );

    let nsamples: u64 = chunks.iter().map(|c| c.sample_sizes.len() as u64).sum();
    let nominal_duration_seconds =
        nsamples as f64 * sample_duration as f64 / mdhd_time_scale as f64;
    let new_mdhd_duration = sample_duration as u64 * nsamples;
    let new_mvhd_duration = (nominal_duration_seconds * mvhd_time_scale as f64).round() as u32;

    moov.find_mut(&FourCC::Mvhd)
        .and_then(Atom::as_mvhd_mut)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing mvhd".into()))?
        .duration = new_mvhd_duration;

    moov.find_mut(&FourCC::Tkhd)
        .and_then(Atom::as_tkhd_mut)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing tkhd".into()))?
        .duration = new_mvhd_duration;

    {
        let elst = moov
            .find_mut(&FourCC::Elst)
            .and_then(Atom::as_elst_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing elst".into()))?;
        if elst.entries.len() != 1 {
            return Err(Mp4Error::UnsupportedFeature(
                "elst must contain exactly one edit entry".into(),
            ));
        }
        if elst.entries[0].rate != consts::ELST_RATE_NORMAL {
            return Err(Mp4Error::UnsupportedFeature(
                "elst edit rate must be 65536 (1.0 in 16.16)".into(),
            ));
        }
        elst.entries[0].duration = new_mvhd_duration;
    }

    moov.find_mut(&FourCC::Mdhd)
        .and_then(Atom::as_mdhd_mut)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing mdhd".into()))?
        .duration = new_mdhd_duration as u32;

    let mut descriptions = Vec::new();
    let mut stsc_runs = Vec::new();
    let mut stsz_sizes = Vec::new();
    let mut stss_numbers = Vec::new();
    let mut base: u32 = 1;

    for chunk in chunks {
        let desc_id = match descriptions
            .iter()
            .position(|d| d == &chunk.sample_description)
        {
            Some(pos) => pos + 1,
            None => {
                descriptions.push(chunk.sample_description.clone());
                descriptions.len()
            }
        } as u32;

        stsc_runs.push(SampleToChunkRun {
            first_chunk: stsc_runs.len() as u32 + 1,
            samples_per_chunk: chunk.sample_sizes.len() as u32,
            sample_description_id: desc_id,
        });
        stsz_sizes.extend(chunk.sample_sizes.iter().copied());
        for local_offset in &chunk.local_keyframe_offsets {
            stss_numbers.push(base + local_offset);
        }
        base += chunk.sample_sizes.len() as u32;
    }

    {
        let stsd = moov
            .find_mut(&FourCC::Stsd)
            .and_then(Atom::as_stsd_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing stsd".into()))?;
        stsd.number_of_entries = descriptions.len() as u32;
        stsd.entries = descriptions;
    }
    {
        let stsc = moov
            .find_mut(&FourCC::Stsc)
            .and_then(Atom::as_stsc_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing stsc".into()))?;
        stsc.number_of_entries = stsc_runs.len() as u32;
        stsc.runs = stsc_runs;
    }
    {
        let stsz = moov
            .find_mut(&FourCC::Stsz)
            .and_then(Atom::as_stsz_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing stsz".into()))?;
        stsz.fixed_sample_size = 0;
        stsz.number_of_entries = stsz_sizes.len() as u32;
        stsz.sample_sizes = stsz_sizes;
    }
    {
        let stss = moov
            .find_mut(&FourCC::Stss)
            .and_then(Atom::as_stss_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing stss".into()))?;
        stss.number_of_entries = stss_numbers.len() as u32;
        stss.sample_numbers = stss_numbers;
    }
    {
        let stts = moov
            .find_mut(&FourCC::Stts)
            .and_then(Atom::as_stts_mut)
            .ok_or_else(|| Mp4Error::MalformedAtom("missing stts".into()))?;
        stts.number_of_entries = 1;
        stts.runs = vec![TimeToSampleRun { sample_count: nsamples as u32, sample_duration }];
    }

    let stco = moov
        .find_mut(&FourCC::Stco)
        .and_then(Atom::as_stco_mut)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing stco".into()))?;
    stco.number_of_entries = chunks.len() as u32;
    stco.chunk_offsets = vec![0; chunks.len()];

    Ok(moov)
}

/// Fills `stco.chunk_offsets` given the absolute offset of `mdat`'s
/// first payload byte (spec §4.4 step 6).
fn set_chunk_offsets(moov: &mut Atom, chunks: &[Chunk], mdat_payload_offset: u64) -> Result<(), Mp4Error> {
    let stco = moov
        .find_mut(&FourCC::Stco)
        .and_then(Atom::as_stco_mut)
        .ok_or_else(|| Mp4Error::MalformedAtom("missing stco".into()))?;
    let mut offset = mdat_payload_offset;
    let mut offsets = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        offsets.push(u32::try_from(offset).map_err(|_| {
            Mp4Error::UnsupportedFeature("chunk offset exceeds 32-bit stco range".into())
        })?);
        offset += chunk.byte_length;
    }
    stco.chunk_offsets = offsets;
    Ok(())
}

/// Converts an atom's total byte length (8-byte header + `payload_len`)
/// into the `u32` this format's size field can hold, erroring instead
/// of silently truncating when `payload_len` pushes it past
/// `u32::MAX` (a multi-gigabyte `mdat`/`free` atom).
fn checked_atom_size(payload_len: u64) -> Result<u32, Mp4Error> {
    u32::try_from(AtomHeader::LEN + payload_len)
        .map_err(|_| Mp4Error::UnsupportedFeature("atom payload too large for a 32-bit size field".into()))
}

fn serialize(atom: &Atom) -> Result<Vec<u8>, Mp4Error> {
    let mut buf = Vec::new();
    write_atom(&mut Cursor::new(&mut buf), atom)?;
    Ok(buf)
}

fn check_dimensions(chunks: &[Chunk], expected: (u32, u32)) -> Result<(), Mp4Error> {
    for chunk in chunks {
        if chunk.dimensions != expected {
            return Err(Mp4Error::DimensionMismatch { expected, got: chunk.dimensions });
        }
    }
    Ok(())
}

/// In-place update (spec §4.4). `destination` must already be open
/// read-write. On `Ok`, `destination` has been reloaded to reflect the
/// new on-disk layout. On `Err(NeedsRewrite)`, no byte of `destination`
/// has been touched.
pub fn apply(
    destination: &mut Mp4File,
    chunks: &[Chunk],
    sources: &mut SourceCache,
) -> Result<(), Mp4Error> {
    if !destination.writable {
        return Err(Mp4Error::NotWritable);
    }
    if destination.free().is_none() {
        return Err(Mp4Error::NeedsRewrite { space_needed: 0 });
    }
    if !destination.is_in_place_layout() {
        return Err(Mp4Error::NeedsRewrite { space_needed: 0 });
    }

    let moov_header = destination.moov().unwrap().header().clone();
    let mdat_header = destination.mdat().unwrap().header().clone();

    let dest_dims = destination
        .moov()
        .and_then(|m| m.find(&FourCC::Tkhd))
        .and_then(|a| a.as_tkhd())
        .map(|t| t.dimensions())
        .ok_or_else(|| Mp4Error::MalformedAtom("missing tkhd".into()))?;
    check_dimensions(chunks, dest_dims)?;

    let original_moov = destination.moov().unwrap().clone();
    let mut moov = rebuild_moov(&original_moov, chunks)?;
    set_chunk_offsets(&mut moov, chunks, mdat_header.payload_offset())?;
    let moov_bytes = serialize(&moov)?;

    let span = mdat_header.offset - moov_header.offset;
    let needed = moov_bytes.len() as u64 + AtomHeader::LEN;
    if needed > span {
        let space_needed = needed - span;
        debug!(space_needed, "rebuilt moov does not fit before mdat");
        return Err(Mp4Error::NeedsRewrite { space_needed: space_needed as i64 });
    }
    let free_len = span - needed;

    let total_byte_length: u64 = chunks.iter().map(|c| c.byte_length).sum();
    let dest_path = destination.path.clone();

    let handle = destination.handle_mut();
    handle.seek(SeekFrom::Start(mdat_header.offset))?;
    binio::write_u32(handle, checked_atom_size(total_byte_length)?)?;
    handle.write_all(&FourCC::Mdat.to_bytes())?;

    let mut cursor_pos = mdat_header.offset + AtomHeader::LEN;
    for chunk in chunks {
        if chunk.source_path == dest_path {
            if cursor_pos != chunk.offset_in_source {
                return Err(Mp4Error::MalformedAtom(format!(
                    "chunk from destination expected at offset {}, media write is at {cursor_pos}",
                    chunk.offset_in_source
                )));
            }
            handle.seek(SeekFrom::Start(cursor_pos + chunk.byte_length))?;
        } else {
            let bytes = sources.read(&chunk.source_path, chunk.offset_in_source, chunk.byte_length)?;
            handle.seek(SeekFrom::Start(cursor_pos))?;
            handle.write_all(&bytes)?;
        }
        cursor_pos += chunk.byte_length;
    }
    handle.set_len(cursor_pos)?;

    handle.seek(SeekFrom::Start(moov_header.offset))?;
    handle.write_all(&moov_bytes)?;
    binio::write_u32(handle, checked_atom_size(free_len)?)?;
    handle.write_all(&FourCC::Free.to_bytes())?;
    handle.write_all(&vec![0u8; free_len as usize])?;

    let end = handle.stream_position()?;
    if end != mdat_header.offset {
        return Err(Mp4Error::MalformedAtom(format!(
            "index write ended at {end}, expected {}",
            mdat_header.offset
        )));
    }

    info!(chunks = chunks.len(), free_len, "applied in-place update");
    destination.reload()
}

/// Full rewrite (spec §4.5). Writes a fresh file to `<dest>-tmp<pid>`
/// and returns its path; the caller (the append driver) closes its
/// handle on the original destination and renames the temp file over
/// it, per spec §3 ("the old file descriptor is closed by the driver
/// before the atomic rename").
pub fn copy_with_padding(
    destination: &mut Mp4File,
    chunks: &[Chunk],
    sources: &mut SourceCache,
    padding: u64,
) -> Result<PathBuf, Mp4Error> {
    let tmp_path = temp_path(&destination.path);
    match copy_with_padding_inner(destination, chunks, sources, padding, &tmp_path) {
        Ok(()) => Ok(tmp_path),
        Err(err) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(err)
        }
    }
}

fn copy_with_padding_inner(
    destination: &mut Mp4File,
    chunks: &[Chunk],
    sources: &mut SourceCache,
    padding: u64,
    tmp_path: &PathBuf,
) -> Result<(), Mp4Error> {
    let ftyp_header = destination
        .ftyp()
        .ok_or_else(|| Mp4Error::MalformedAtom("missing ftyp".into()))?
        .header()
        .clone();
    let ftyp_bytes = destination.read_range(ftyp_header.offset, ftyp_header.size)?;

    let original_moov = destination.moov().unwrap().clone();
    let mut moov = rebuild_moov(&original_moov, chunks)?;
    // Placeholder anchor to learn moov_bytes' length; stco's byte
    // width never depends on the magnitude of its entries.
    set_chunk_offsets(&mut moov, chunks, 0)?;
    let moov_len = serialize(&moov)?.len() as u64;

    let new_mdat_position = ftyp_bytes.len() as u64 + moov_len + AtomHeader::LEN + padding;
    set_chunk_offsets(&mut moov, chunks, new_mdat_position + AtomHeader::LEN)?;
    let moov_bytes = serialize(&moov)?;
    debug_assert_eq!(moov_bytes.len() as u64, moov_len);

    let total_byte_length: u64 = chunks.iter().map(|c| c.byte_length).sum();
    let dest_path = destination.path.clone();

    let mut out = std::fs::File::create(tmp_path)?;
    out.write_all(&ftyp_bytes)?;
    out.write_all(&moov_bytes)?;
    binio::write_u32(&mut out, checked_atom_size(padding)?)?;
    out.write_all(&FourCC::Free.to_bytes())?;
    out.write_all(&vec![0u8; padding as usize])?;
    binio::write_u32(&mut out, checked_atom_size(total_byte_length)?)?;
    out.write_all(&FourCC::Mdat.to_bytes())?;

    for chunk in chunks {
        let bytes = if chunk.source_path == dest_path {
            destination.read_range(chunk.offset_in_source, chunk.byte_length)?
        } else {
            sources.read(&chunk.source_path, chunk.offset_in_source, chunk.byte_length)?
        };
        out.write_all(&bytes)?;
    }
    out.flush()?;

    info!(
        chunks = chunks.len(),
        padding,
        tmp_path = %tmp_path.display(),
        "wrote full rewrite"
    );
    Ok(())
}

fn temp_path(dest: &std::path::Path) -> PathBuf {
    let mut name = dest.to_path_buf().into_os_string();
    name.push(format!("-tmp{}", std::process::id()));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunks_of;
    use crate::fixtures;
    use tempfile::NamedTempFile;

    fn write_fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn identity_append_preserves_media_bytes_and_keeps_free_headroom() {
        let bytes = fixtures::build_file(&[3, 2], (640, 480), Some(4096));
        let tmp = write_fixture(&bytes);

        let mut dest = Mp4File::open_rw(tmp.path()).unwrap();
        let chunks = chunks_of(&dest).unwrap();
        let mdat_before = dest.mdat().unwrap().header().clone();
        let media_before = dest.read_range(mdat_before.payload_offset(), mdat_before.payload_size()).unwrap();

        let mut cache = SourceCache::new();
        engine_apply_ok(&mut dest, &chunks, &mut cache);

        let mdat_after = dest.mdat().unwrap().header().clone();
        let media_after = dest.read_range(mdat_after.payload_offset(), mdat_after.payload_size()).unwrap();
        assert_eq!(media_before, media_after);

        let free_after = dest.free().unwrap().header().payload_size();
        assert_eq!(free_after, 4096);
    }

    fn engine_apply_ok(dest: &mut Mp4File, chunks: &[Chunk], cache: &mut SourceCache) {
        match apply(dest, chunks, cache) {
            Ok(()) => {}
            Err(err) => panic!("expected apply to succeed, got {err}"),
        }
    }

    #[test]
    fn dimension_mismatch_is_rejected_without_mutating_destination() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(4096));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[2], (320, 240), None);
        let source_tmp = write_fixture(&source_bytes);

        let original_on_disk = std::fs::read(dest_tmp.path()).unwrap();

        let mut dest = Mp4File::open_rw(dest_tmp.path()).unwrap();
        let mut chunks = chunks_of(&dest).unwrap();
        let source = Mp4File::open(source_tmp.path()).unwrap();
        chunks.extend(chunks_of(&source).unwrap());

        let mut cache = SourceCache::new();
        let err = apply(&mut dest, &chunks, &mut cache).expect_err("dimension mismatch must be rejected");
        assert!(matches!(err, Mp4Error::DimensionMismatch { .. }));

        let after = std::fs::read(dest_tmp.path()).unwrap();
        assert_eq!(original_on_disk, after, "a rejected apply must not touch the destination's bytes");
    }

    #[test]
    fn needs_rewrite_is_raised_before_any_write_when_there_is_no_headroom() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(0));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[2], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let original_on_disk = std::fs::read(dest_tmp.path()).unwrap();

        let mut dest = Mp4File::open_rw(dest_tmp.path()).unwrap();
        let mut chunks = chunks_of(&dest).unwrap();
        let source = Mp4File::open(source_tmp.path()).unwrap();
        chunks.extend(chunks_of(&source).unwrap());

        let mut cache = SourceCache::new();
        let err = apply(&mut dest, &chunks, &mut cache).expect_err("zero free headroom cannot absorb growth");
        assert!(matches!(err, Mp4Error::NeedsRewrite { .. }));

        let after = std::fs::read(dest_tmp.path()).unwrap();
        assert_eq!(original_on_disk, after, "a failed apply must leave the destination untouched");
    }

    #[test]
    fn identical_sample_descriptions_are_deduplicated_across_sources() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(65536));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[3], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let mut dest = Mp4File::open_rw(dest_tmp.path()).unwrap();
        let mut chunks = chunks_of(&dest).unwrap();
        let source = Mp4File::open(source_tmp.path()).unwrap();
        chunks.extend(chunks_of(&source).unwrap());
        let total_chunks = chunks.len();

        let mut cache = SourceCache::new();
        engine_apply_ok(&mut dest, &chunks, &mut cache);

        let stsd = dest.moov().unwrap().find(&FourCC::Stsd).unwrap().as_stsd().unwrap();
        assert_eq!(stsd.entries.len(), 1, "both sources share one identical sample description");

        let stsc = dest.moov().unwrap().find(&FourCC::Stsc).unwrap().as_stsc().unwrap();
        assert_eq!(stsc.runs.len(), total_chunks);
        assert!(stsc.runs.iter().all(|run| run.sample_description_id == 1));
    }

    #[test]
    fn full_rewrite_reproduces_every_chunks_media_bytes_at_a_new_anchor() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(0));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[3], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let mut dest = Mp4File::open_rw(dest_tmp.path()).unwrap();
        let mut chunks = chunks_of(&dest).unwrap();
        let source = Mp4File::open(source_tmp.path()).unwrap();
        chunks.extend(chunks_of(&source).unwrap());
        let expected_len: u64 = chunks.iter().map(|c| c.byte_length).sum();

        let mut cache = SourceCache::new();
        let rewrite_err = apply(&mut dest, &chunks, &mut cache).expect_err("must need a rewrite");
        let Mp4Error::NeedsRewrite { space_needed } = rewrite_err else {
            panic!("expected NeedsRewrite, got a different error");
        };
        assert!(space_needed > 0);

        let padding = 4096u64;
        let tmp_path = copy_with_padding(&mut dest, &chunks, &mut cache, padding).unwrap();

        let rewritten = Mp4File::open(&tmp_path).unwrap();
        let mdat = rewritten.mdat().unwrap().header().clone();
        assert_eq!(mdat.payload_size(), expected_len);

        let mut rewritten = rewritten;
        let media = rewritten.read_range(mdat.payload_offset(), mdat.payload_size()).unwrap();
        assert_eq!(media.len() as u64, expected_len);

        std::fs::remove_file(&tmp_path).ok();
    }
}
