//! CLI-only helpers: slice-notation parsing and frame dumping (spec
//! §6, §9 "Slice-notation helper"). Not part of the core: `engine` and
//! `driver` take already-resolved chunk lists, never a path string.

use crate::chunk::{chunks_of, Chunk};
use crate::driver::PathSpec;
use crate::error::Mp4Error;
use crate::file::Mp4File;

/// Parses `path[start:end]` into a [`PathSpec`]. A bare path with no
/// trailing `[...]` suffix selects the whole file. `start`/`end` are
/// signed and may be empty (Python-style half-open range, negative
/// indices count from the end) — resolved later by [`crate::chunk::slice`].
pub fn parse_spec(arg: &str) -> Result<PathSpec, Mp4Error> {
    let Some(bracket) = arg.rfind('[') else {
        return Ok(PathSpec::whole(arg.into()));
    };
    if !arg.ends_with(']') {
        return Err(Mp4Error::MalformedAtom(format!("unterminated slice suffix in '{arg}'")));
    }
    let path = &arg[..bracket];
    let body = &arg[bracket + 1..arg.len() - 1];
    let Some(colon) = body.find(':') else {
        return Err(Mp4Error::MalformedAtom(format!(
            "slice suffix '{body}' is missing ':' (expected '[start:end]')"
        )));
    };
    let start = parse_index(&body[..colon])?;
    let end = parse_index(&body[colon + 1..])?;
    Ok(PathSpec { path: path.into(), slice: Some((start, end)) })
}

fn parse_index(s: &str) -> Result<Option<i64>, Mp4Error> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<i64>()
        .map(Some)
        .map_err(|_| Mp4Error::MalformedAtom(format!("'{s}' is not a valid slice index")))
}

/// Prints chunk metadata and a per-frame hex dump for a single file's
/// selected chunks (spec §6 `--dump_frames`), a CLI-only feature with
/// no core counterpart.
pub fn dump_frames(spec: &PathSpec) -> Result<(), Mp4Error> {
    let file = Mp4File::open(&spec.path)?;
    let mut chunks = chunks_of(&file)?;
    if let Some((start, end)) = spec.slice {
        chunks = crate::chunk::slice(&chunks, start, end);
    }

    let mut reader = Mp4File::open(&spec.path)?;
    for chunk in &chunks {
        println!(
            "chunk {} @ {} ({} bytes, {} samples, {} keyframes)",
            chunk.chunk_index,
            chunk.offset_in_source,
            chunk.byte_length,
            chunk.sample_sizes.len(),
            chunk.local_keyframe_offsets.len()
        );
        dump_frame_bytes(&mut reader, chunk)?;
    }
    Ok(())
}

fn dump_frame_bytes(reader: &mut Mp4File, chunk: &Chunk) -> Result<(), Mp4Error> {
    let mut offset = chunk.offset_in_source;
    for (i, size) in chunk.sample_sizes.iter().enumerate() {
        let bytes = reader.read_range(offset, *size as u64)?;
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        println!("  frame {i}: {hex}");
        offset += *size as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_path() {
        let spec = parse_spec("movie.mp4").unwrap();
        assert_eq!(spec.path.to_str().unwrap(), "movie.mp4");
        assert!(spec.slice.is_none());
    }

    #[test]
    fn parses_full_slice() {
        let spec = parse_spec("movie.mp4[1:-1]").unwrap();
        assert_eq!(spec.path.to_str().unwrap(), "movie.mp4");
        assert_eq!(spec.slice, Some((Some(1), Some(-1))));
    }

    #[test]
    fn parses_empty_bounds() {
        let spec = parse_spec("movie.mp4[:2]").unwrap();
        assert_eq!(spec.slice, Some((None, Some(2))));
        let spec = parse_spec("movie.mp4[2:]").unwrap();
        assert_eq!(spec.slice, Some((Some(2), None)));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse_spec("movie.mp4[2]").is_err());
    }
}
