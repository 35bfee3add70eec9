//! Binary reader/writer primitives.
//!
//! Big-endian integer and fixed-size byte-run helpers, plus stream
//! position bookkeeping, used by the atom tree parser/serializer
//! (spec §4.1, §4.2). `mp4iter` leans on `binrw` for this at the
//! per-atom level (see `atom::types`); this module covers the
//! untyped, whole-stream bookkeeping `binrw` doesn't model: atom
//! header framing, "does current position match expected offset",
//! and verbatim byte-range copying between two streams.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Mp4Error;

/// Returns the current stream position.
pub fn pos<S: Seek>(stream: &mut S) -> Result<u64, Mp4Error> {
    Ok(stream.stream_position()?)
}

/// Seeks to an absolute offset.
pub fn seek_to<S: Seek>(stream: &mut S, offset: u64) -> Result<u64, Mp4Error> {
    Ok(stream.seek(SeekFrom::Start(offset))?)
}

/// Reads a big-endian `u16`.
pub fn read_u16<R: Read>(r: &mut R) -> Result<u16, Mp4Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a big-endian `u32`.
pub fn read_u32<R: Read>(r: &mut R) -> Result<u32, Mp4Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads `n` bytes into a freshly allocated buffer.
pub fn read_exact_vec<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>, Mp4Error> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a big-endian `u16`.
pub fn write_u16<W: Write>(w: &mut W, value: u16) -> Result<(), Mp4Error> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a big-endian `u32`.
pub fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<(), Mp4Error> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Streams `len` bytes from `src` (seeked to `src_offset` first) into
/// `dst` at its current position, in fixed-size chunks so neither side
/// needs to buffer the whole range in memory (`mdat` may be many GiB).
pub fn copy_range<R: Read + Seek, W: Write>(
    src: &mut R,
    src_offset: u64,
    len: u64,
    dst: &mut W,
) -> Result<(), Mp4Error> {
    const CHUNK: usize = 1 << 20; // 1 MiB
    src.seek(SeekFrom::Start(src_offset))?;
    let mut remaining = len;
    let mut buf = vec![0u8; CHUNK.min(len.max(1) as usize)];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        src.read_exact(&mut buf[..take])?;
        dst.write_all(&buf[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_big_endian_integers() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x1234).unwrap();
        write_u32(&mut buf, 0xdead_beef).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u16(&mut cursor).unwrap(), 0x1234);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xdead_beef);
    }

    #[test]
    fn copy_range_streams_a_byte_slice() {
        let mut src = Cursor::new((0u8..=255).collect::<Vec<u8>>());
        let mut dst = Vec::new();
        copy_range(&mut src, 10, 20, &mut dst).unwrap();
        assert_eq!(dst, (10u8..30).collect::<Vec<u8>>());
    }
}
