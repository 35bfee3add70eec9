//! Recursive-descent atom tree parser (spec §4.1).
//!
//! Dispatch is by type-code string against the three closed sets in
//! [`crate::consts`] — container, typed, opaque — with anything else
//! rejected as `UnknownAtom`. No dynamic dispatch or per-type trait
//! objects: a single `match` drives the whole tree, the way
//! `mp4iter::mp4::Mp4::atom()` walks headers but closed over a fixed
//! set of names.

use std::io::{Read, Seek, SeekFrom};

use binrw::BinRead;

use crate::atom::header::AtomHeader;
use crate::atom::tree::{Atom, TypedAtom, TypedLeaf};
use crate::atom::types::{Elst, Mdhd, Mvhd, Stco, Stsc, Stsd, Stss, Stsz, Stts, Tkhd};
use crate::consts;
use crate::error::Mp4Error;
use crate::fourcc::FourCC;

/// Parses one atom (and, if it is a container, its full subtree)
/// starting at the stream's current position.
pub fn parse_atom<R: Read + Seek>(r: &mut R) -> Result<Atom, Mp4Error> {
    let offset = r.stream_position()?;
    let header = read_header(r, offset)?;
    let name = header.name.to_str();

    if name == "mdat" {
        r.seek(SeekFrom::Start(header.end()))?;
        return Ok(Atom::Opaque { header, data: None });
    }

    if consts::CONTAINER.contains(&name.as_str()) {
        return parse_container(r, header, &name);
    }

    if consts::TYPED.contains(&name.as_str()) {
        return parse_typed(r, header);
    }

    if consts::OPAQUE.contains(&name.as_str()) {
        let data = crate::binio::read_exact_vec(r, header.payload_size() as usize)?;
        return Ok(Atom::Opaque { header, data: Some(data) });
    }

    Err(Mp4Error::UnknownAtom(name))
}

fn read_header<R: Read>(r: &mut R, offset: u64) -> Result<AtomHeader, Mp4Error> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if size == 1 {
        return Err(Mp4Error::MalformedAtom(
            "64-bit largesize atoms are not supported".to_string(),
        ));
    }
    if size < AtomHeader::LEN as u32 {
        return Err(Mp4Error::MalformedAtom(format!(
            "atom at offset {offset} declares size {size}, smaller than an 8-byte header"
        )));
    }
    let name = FourCC::from_bytes([buf[4], buf[5], buf[6], buf[7]]);
    Ok(AtomHeader::new(size as u64, name, offset))
}

fn parse_container<R: Read + Seek>(
    r: &mut R,
    header: AtomHeader,
    name: &str,
) -> Result<Atom, Mp4Error> {
    let prefix_len = consts::container_prefix_len(name);
    let prefix = if prefix_len > 0 {
        let mut buf = vec![0u8; prefix_len];
        r.read_exact(&mut buf)?;
        buf
    } else {
        Vec::new()
    };

    let end = header.end();
    let mut children = Vec::new();
    loop {
        let pos = r.stream_position()?;
        if pos == end {
            break;
        }
        if pos > end {
            return Err(Mp4Error::MalformedAtom(format!(
                "child of '{name}' overran its parent's declared end (at {pos}, end {end})"
            )));
        }
        let child = parse_atom(r)?;
        let child_pos = child.header().offset;
        if child_pos != pos {
            return Err(Mp4Error::MalformedAtom(format!(
                "expected child atom at offset {pos}, parser started at {child_pos}"
            )));
        }
        children.push((child.name().clone(), child));
    }

    Ok(Atom::Container { header, prefix, children })
}

fn parse_typed<R: Read + Seek>(r: &mut R, header: AtomHeader) -> Result<Atom, Mp4Error> {
    let mut vf = [0u8; 4];
    r.read_exact(&mut vf)?;
    let version = vf[0];
    let flags = [vf[1], vf[2], vf[3]];

    let name = header.name.to_str();
    let body = match name.as_str() {
        "mvhd" => TypedAtom::Mvhd(Mvhd::read(r)?),
        "tkhd" => TypedAtom::Tkhd(Tkhd::read(r)?),
        "elst" => TypedAtom::Elst(Elst::read(r)?),
        "mdhd" => TypedAtom::Mdhd(Mdhd::read(r)?),
        "stsd" => TypedAtom::Stsd(Stsd::read(r)?),
        "stts" => TypedAtom::Stts(Stts::read(r)?),
        "stss" => TypedAtom::Stss(Stss::read(r)?),
        "stsc" => TypedAtom::Stsc(Stsc::read(r)?),
        "stsz" => TypedAtom::Stsz(Stsz::read(r)?),
        "stco" => TypedAtom::Stco(Stco::read(r)?),
        other => return Err(Mp4Error::UnknownAtom(other.to_string())),
    };

    let pos = r.stream_position()?;
    let end = header.end();
    if pos != end {
        return Err(Mp4Error::SizeMismatch { got: pos - header.offset, expected: header.size });
    }

    Ok(Atom::Typed(TypedLeaf { header, version, flags, body }))
}

/// Parses `stss` if present among `stbl`'s children, otherwise
/// synthesizes "every sample is a key frame" — `(1..=sample_count)` —
/// per spec §4.1 ("If absent, treat every sample as a key frame").
pub fn stss_or_synthesize(stbl: &Atom, sample_count: u32) -> Stss {
    if let Some(stss) = stbl.as_stss() {
        return stss.clone();
    }
    Stss {
        number_of_entries: sample_count,
        sample_numbers: (1..=sample_count).collect(),
    }
}
