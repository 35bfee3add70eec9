//! Shared in-memory MP4 fixtures for tests. Not part of the public
//! API — built with the crate's own atom tree and serializer rather
//! than a captured real-world file, since no such sample ships with
//! this crate.

use std::io::Cursor;

use crate::atom::header::AtomHeader;
use crate::atom::tree::{Atom, TypedAtom, TypedLeaf};
use crate::atom::types::{
    EditListEntry, Elst, Mdhd, Mvhd, SampleDescription, SampleToChunkRun, Stco, Stsc, Stsd, Stss,
    Stsz, Stts, Tkhd, TimeToSampleRun,
};
use crate::atom::write::write_atom;
use crate::fourcc::FourCC;

pub const SAMPLE_SIZE: u32 = 4;

fn typed(name: FourCC, body: TypedAtom) -> Atom {
    Atom::Typed(TypedLeaf { header: AtomHeader::new(0, name, 0), version: 0, flags: [0, 0, 0], body })
}

fn container(name: FourCC, children: Vec<(FourCC, Atom)>) -> Atom {
    Atom::Container { header: AtomHeader::new(0, name, 0), prefix: Vec::new(), children }
}

fn opaque(name: FourCC, data: Vec<u8>) -> Atom {
    Atom::Opaque { header: AtomHeader::new(0, name, 0), data: Some(data) }
}

fn serialize(atom: &Atom) -> Vec<u8> {
    let mut buf = Vec::new();
    write_atom(&mut Cursor::new(&mut buf), atom).expect("fixture atoms are well-formed");
    buf
}

/// Builds a conformant single-track MP4: one chunk per entry of
/// `chunk_sample_counts`, each sample `SAMPLE_SIZE` bytes patterned
/// with its own global 0-based sample index, and `free_payload_len`
/// bytes of `free` padding (`None` omits the `free` atom, e.g. to
/// exercise the "missing free" `NeedsRewrite` path).
pub fn build_file(chunk_sample_counts: &[usize], dims: (u32, u32), free_payload_len: Option<u64>) -> Vec<u8> {
    let total_samples: usize = chunk_sample_counts.iter().sum();

    let ftyp = opaque(FourCC::Ftyp, b"isomiso2mp41".to_vec());

    let stsd = typed(
        FourCC::Stsd,
        TypedAtom::Stsd(Stsd {
            number_of_entries: 1,
            entries: vec![SampleDescription::new(*b"avc1\0\0", [0; 6], 0, Vec::new())],
        }),
    );
    let stts = typed(
        FourCC::Stts,
        TypedAtom::Stts(Stts {
            number_of_entries: 1,
            runs: vec![TimeToSampleRun { sample_count: total_samples as u32, sample_duration: 1 }],
        }),
    );

    let mut stsc_runs = Vec::new();
    let mut stss_numbers = Vec::new();
    let mut base = 1u32;
    for (i, count) in chunk_sample_counts.iter().enumerate() {
        stsc_runs.push(SampleToChunkRun {
            first_chunk: i as u32 + 1,
            samples_per_chunk: *count as u32,
            sample_description_id: 1,
        });
        stss_numbers.push(base); // first sample of every chunk is a keyframe
        base += *count as u32;
    }
    let stsc = typed(FourCC::Stsc, TypedAtom::Stsc(Stsc { number_of_entries: stsc_runs.len() as u32, runs: stsc_runs }));
    let stsz = typed(
        FourCC::Stsz,
        TypedAtom::Stsz(Stsz {
            fixed_sample_size: 0,
            number_of_entries: total_samples as u32,
            sample_sizes: vec![SAMPLE_SIZE; total_samples],
        }),
    );
    let stss = typed(
        FourCC::Stss,
        TypedAtom::Stss(Stss { number_of_entries: stss_numbers.len() as u32, sample_numbers: stss_numbers }),
    );
    let stco_placeholder = typed(
        FourCC::Stco,
        TypedAtom::Stco(Stco { number_of_entries: chunk_sample_counts.len() as u32, chunk_offsets: vec![0; chunk_sample_counts.len()] }),
    );

    let vmhd = opaque(FourCC::Vmhd, vec![0u8; 12]);
    let dref = opaque(FourCC::Dref, vec![0u8; 16]);
    let dinf = container(FourCC::Dinf, vec![(FourCC::Dref, dref)]);
    let stbl = container(
        FourCC::Stbl,
        vec![
            (FourCC::Stsd, stsd),
            (FourCC::Stts, stts),
            (FourCC::Stss, stss),
            (FourCC::Stsc, stsc),
            (FourCC::Stsz, stsz),
            (FourCC::Stco, stco_placeholder),
        ],
    );
    let minf = container(FourCC::Minf, vec![(FourCC::Vmhd, vmhd), (FourCC::Dinf, dinf), (FourCC::Stbl, stbl)]);
    let mdhd = typed(
        FourCC::Mdhd,
        TypedAtom::Mdhd(Mdhd {
            creation_time: 0,
            modification_time: 0,
            time_scale: 600,
            duration: total_samples as u32,
            language: 0,
            quality: 0,
        }),
    );
    let hdlr = opaque(FourCC::Hdlr, vec![0u8; 24]);
    let mdia = container(FourCC::Mdia, vec![(FourCC::Mdhd, mdhd), (FourCC::Hdlr, hdlr), (FourCC::Minf, minf)]);
    let elst = typed(
        FourCC::Elst,
        TypedAtom::Elst(Elst {
            number_of_entries: 1,
            entries: vec![EditListEntry { duration: total_samples as u32, start_time: 0, rate: 0x0001_0000 }],
        }),
    );
    let edts = container(FourCC::Edts, vec![(FourCC::Elst, elst)]);
    let tkhd = typed(
        FourCC::Tkhd,
        TypedAtom::Tkhd(Tkhd {
            creation_time: 0,
            modification_time: 0,
            track_id: 1,
            reserved: [0; 4],
            duration: total_samples as u32,
            opaque_middle: [0; 52],
            track_width: dims.0 << 16,
            track_height: dims.1 << 16,
        }),
    );
    let trak = container(FourCC::Trak, vec![(FourCC::Tkhd, tkhd), (FourCC::Edts, edts), (FourCC::Mdia, mdia)]);
    let mvhd = typed(
        FourCC::Mvhd,
        TypedAtom::Mvhd(Mvhd {
            creation_time: 0,
            modification_time: 0,
            time_scale: 600,
            duration: total_samples as u32,
            opaque_tail: [0; 84],
        }),
    );
    let mut moov = container(FourCC::Moov, vec![(FourCC::Mvhd, mvhd), (FourCC::Trak, trak)]);

    let ftyp_bytes = serialize(&ftyp);
    let moov_len = serialize(&moov).len() as u64;

    let free_len = free_payload_len.unwrap_or(0);
    let mdat_header_offset = ftyp_bytes.len() as u64
        + moov_len
        + if free_payload_len.is_some() { AtomHeader::LEN + free_len } else { 0 };
    let mdat_payload_offset = mdat_header_offset + AtomHeader::LEN;

    {
        let stco = moov.find_mut(&FourCC::Stco).and_then(Atom::as_stco_mut).unwrap();
        let mut offset = mdat_payload_offset;
        let mut offsets = Vec::with_capacity(chunk_sample_counts.len());
        for count in chunk_sample_counts {
            offsets.push(offset as u32);
            offset += *count as u64 * SAMPLE_SIZE as u64;
        }
        stco.chunk_offsets = offsets;
    }
    let moov_bytes = serialize(&moov);
    assert_eq!(moov_bytes.len() as u64, moov_len, "stco offset values must not change moov's byte length");

    let mut out = Vec::new();
    out.extend_from_slice(&ftyp_bytes);
    out.extend_from_slice(&moov_bytes);
    if let Some(len) = free_payload_len {
        out.extend_from_slice(&((AtomHeader::LEN + len) as u32).to_be_bytes());
        out.extend_from_slice(b"free");
        out.extend(std::iter::repeat(0u8).take(len as usize));
    }
    let mdat_payload_len = total_samples as u64 * SAMPLE_SIZE as u64;
    out.extend_from_slice(&((AtomHeader::LEN + mdat_payload_len) as u32).to_be_bytes());
    out.extend_from_slice(b"mdat");
    for i in 0..total_samples {
        out.extend(std::iter::repeat(i as u8).take(SAMPLE_SIZE as usize));
    }
    out
}
