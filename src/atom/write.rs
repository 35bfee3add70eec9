//! Recursive atom tree serializer (spec §4.2).
//!
//! Mirrors `parse.rs`'s shape in reverse: a typed leaf writes its
//! header, version/flags, and `binrw`-encoded body; a container writes
//! a size placeholder, its prefix, then recurses into its children and
//! backpatches the placeholder; an opaque leaf writes its retained
//! bytes verbatim. `mdat` is never written through this path — the
//! engine streams its payload directly (spec §4.4) since an `Opaque`
//! node for `mdat` carries no in-memory `data`.

use std::io::{Seek, SeekFrom, Write};

use binrw::BinWrite;

use crate::atom::header::AtomHeader;
use crate::atom::tree::{Atom, TypedAtom, TypedLeaf};
use crate::error::Mp4Error;

/// Writes one atom (and, if a container, its full subtree) at the
/// stream's current position. Returns the number of bytes written.
pub fn write_atom<W: Write + Seek>(w: &mut W, atom: &Atom) -> Result<u64, Mp4Error> {
    match atom {
        Atom::Container { header, prefix, children } => write_container(w, header, prefix, children),
        Atom::Typed(leaf) => write_typed(w, leaf),
        Atom::Opaque { header, data } => write_opaque(w, header, data),
    }
}

fn write_opaque<W: Write + Seek>(
    w: &mut W,
    header: &AtomHeader,
    data: &Option<Vec<u8>>,
) -> Result<u64, Mp4Error> {
    match data {
        Some(bytes) => {
            let size = AtomHeader::LEN + bytes.len() as u64;
            w.write_all(&(size as u32).to_be_bytes())?;
            w.write_all(&header.name.to_bytes())?;
            w.write_all(bytes)?;
            Ok(size)
        }
        None => Err(Mp4Error::MalformedAtom(format!(
            "atom '{}' has no retained payload and cannot be written generically",
            header.name
        ))),
    }
}

fn write_container<W: Write + Seek>(
    w: &mut W,
    header: &AtomHeader,
    prefix: &[u8],
    children: &[(crate::fourcc::FourCC, Atom)],
) -> Result<u64, Mp4Error> {
    let start = w.stream_position()?;
    w.write_all(&[0u8; 4])?; // size placeholder, backpatched below
    w.write_all(&header.name.to_bytes())?;
    w.write_all(prefix)?;

    for (_, child) in children {
        write_atom(w, child)?;
    }

    let end = w.stream_position()?;
    let size = end - start;
    w.seek(SeekFrom::Start(start))?;
    w.write_all(&(size as u32).to_be_bytes())?;
    w.seek(SeekFrom::Start(end))?;
    Ok(size)
}

fn write_typed<W: Write + Seek>(w: &mut W, leaf: &TypedLeaf) -> Result<u64, Mp4Error> {
    let start = w.stream_position()?;
    w.write_all(&[0u8; 4])?; // size placeholder, backpatched below
    w.write_all(&leaf.header.name.to_bytes())?;
    w.write_all(&[leaf.version, leaf.flags[0], leaf.flags[1], leaf.flags[2]])?;

    match &leaf.body {
        TypedAtom::Mvhd(v) => v.write(w)?,
        TypedAtom::Tkhd(v) => v.write(w)?,
        TypedAtom::Elst(v) => v.write(w)?,
        TypedAtom::Mdhd(v) => v.write(w)?,
        TypedAtom::Stsd(v) => v.write(w)?,
        TypedAtom::Stts(v) => v.write(w)?,
        TypedAtom::Stss(v) => v.write(w)?,
        TypedAtom::Stsc(v) => v.write(w)?,
        TypedAtom::Stsz(v) => v.write(w)?,
        TypedAtom::Stco(v) => v.write(w)?,
    }

    let end = w.stream_position()?;
    let size = end - start;
    w.seek(SeekFrom::Start(start))?;
    w.write_all(&(size as u32).to_be_bytes())?;
    w.seek(SeekFrom::Start(end))?;
    Ok(size)
}
