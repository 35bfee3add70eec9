//! Append driver: runs the update-or-rewrite retry loop (spec §4.6).

use std::path::PathBuf;

use tracing::info;

use crate::chunk::{chunks_of, slice};
use crate::engine;
use crate::error::Mp4Error;
use crate::file::{Mp4File, SourceCache};

/// Estimated bytes of index growth per future appended frame, used to
/// size the `free` atom's headroom on a full rewrite (spec §4.6). The
/// estimate is informational only — every append re-checks whether
/// the reserved space still fits (spec §9 Open Questions).
pub const BYTES_PER_FRAME_ESTIMATE: u64 = 6;

/// One positional path argument: a file, with an optional `[start:end]`
/// chunk slice (spec §6).
#[derive(Debug, Clone)]
pub struct PathSpec {
    pub path: PathBuf,
    pub slice: Option<(Option<i64>, Option<i64>)>,
}

impl PathSpec {
    pub fn whole(path: PathBuf) -> Self {
        Self { path, slice: None }
    }
}

/// Appends `sources`' selected chunks onto `destination`'s selected
/// chunks, retrying with a full rewrite whenever the in-place update
/// can't fit (spec §4.6). Each iteration re-opens and re-derives every
/// file's chunks from scratch, matching the reference implementation's
/// retry loop rather than re-using a stale chunk list after a rewrite.
pub fn append(destination: &PathSpec, sources: &[PathSpec], future_frames: u64) -> Result<(), Mp4Error> {
    loop {
        let mut dest_file = Mp4File::open_rw(&destination.path)?;
        let mut chunks = chunks_of(&dest_file)?;
        if let Some((start, end)) = destination.slice {
            chunks = slice(&chunks, start, end);
        }

        let mut cache = SourceCache::new();
        for source in sources {
            let source_file = Mp4File::open(&source.path)?;
            let mut source_chunks = chunks_of(&source_file)?;
            if let Some((start, end)) = source.slice {
                source_chunks = slice(&source_chunks, start, end);
            }
            chunks.extend(source_chunks);
        }

        match engine::apply(&mut dest_file, &chunks, &mut cache) {
            Ok(()) => return Ok(()),
            Err(Mp4Error::NeedsRewrite { space_needed }) => {
                let moov_size = dest_file.moov().map(|m| m.header().size).unwrap_or(0);
                let padding = (future_frames * BYTES_PER_FRAME_ESTIMATE).max(moov_size);
                let free = space_needed.max(0) as u64 + padding;
                info!(space_needed, padding, free, "in-place update needs more room, rewriting");

                let tmp_path = engine::copy_with_padding(&mut dest_file, &chunks, &mut cache, free)?;
                drop(dest_file);
                std::fs::rename(&tmp_path, &destination.path)?;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunks_of;
    use crate::fixtures;
    use tempfile::NamedTempFile;

    fn write_fixture(bytes: &[u8]) -> NamedTempFile {
        use std::io::Write;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn append_falls_back_to_a_rewrite_when_in_place_has_no_room() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(0));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[3], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let destination = PathSpec::whole(dest_tmp.path().to_path_buf());
        let sources = vec![PathSpec::whole(source_tmp.path().to_path_buf())];

        append(&destination, &sources, 1000).expect("append should succeed via a full rewrite");

        let result = Mp4File::open(dest_tmp.path()).unwrap();
        let chunks = chunks_of(&result).unwrap();
        assert_eq!(chunks.len(), 2);
        let total_samples: usize = chunks.iter().map(|c| c.sample_sizes.len()).sum();
        assert_eq!(total_samples, 5);
    }

    #[test]
    fn append_updates_in_place_when_there_is_headroom() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(65536));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[1], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let destination = PathSpec::whole(dest_tmp.path().to_path_buf());
        let sources = vec![PathSpec::whole(source_tmp.path().to_path_buf())];

        append(&destination, &sources, 1000).expect("append should succeed in place");

        let result = Mp4File::open(dest_tmp.path()).unwrap();
        assert!(result.is_in_place_layout(), "an in-place update must preserve ftyp/moov/free/mdat ordering");
        let chunks = chunks_of(&result).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn append_honors_a_slice_on_the_source() {
        let dest_bytes = fixtures::build_file(&[2], (640, 480), Some(65536));
        let dest_tmp = write_fixture(&dest_bytes);
        let source_bytes = fixtures::build_file(&[1, 1, 1], (640, 480), None);
        let source_tmp = write_fixture(&source_bytes);

        let destination = PathSpec::whole(dest_tmp.path().to_path_buf());
        let mut source_spec = PathSpec::whole(source_tmp.path().to_path_buf());
        source_spec.slice = Some((Some(1), None)); // drop the source's first chunk

        append(&destination, &[source_spec], 1000).unwrap();

        let result = Mp4File::open(dest_tmp.path()).unwrap();
        let chunks = chunks_of(&result).unwrap();
        assert_eq!(chunks.len(), 4); // 2 original + 2 of the source's 3 chunks
    }
}
