//! The atom tree model (spec §3, §4.1 "Atom tree model" component).
//!
//! A tagged-variant tree replaces `mp4iter`'s lazy, linear-scan
//! `find_atom()` navigation: the engine needs a materialized,
//! deep-cloneable `moov` subtree so a failed size check
//! (`NeedsRewrite`) can be raised *before* any in-memory state is
//! mutated (spec §9, "Deep copy of the moov subtree").

use std::io::Cursor;

use crate::atom::header::AtomHeader;
use crate::atom::types::{Elst, Mdhd, Mvhd, Stco, Stsc, Stsd, Stss, Stsz, Stts, Tkhd};
use crate::fourcc::FourCC;

/// One parsed typed leaf: its header, the common version/flags prefix
/// every typed leaf carries (spec §3), and its decoded body.
#[derive(Debug, Clone)]
pub struct TypedLeaf {
    pub header: AtomHeader,
    pub version: u8,
    pub flags: [u8; 3],
    pub body: TypedAtom,
}

/// One parsed leaf body, one variant per registered typed leaf parser
/// (spec §4.1). Closed match, no dynamic dispatch by type-code string
/// — the "systems-language rewrite" spec §9 calls for.
#[derive(Debug, Clone)]
pub enum TypedAtom {
    Mvhd(Mvhd),
    Tkhd(Tkhd),
    Elst(Elst),
    Mdhd(Mdhd),
    Stsd(Stsd),
    Stts(Stts),
    Stss(Stss),
    Stsc(Stsc),
    Stsz(Stsz),
    Stco(Stco),
}

/// One node of the atom tree.
#[derive(Debug, Clone)]
pub enum Atom {
    /// A container atom: an ordered, type-addressed list of children.
    /// `prefix` holds the fixed-length opaque header some containers
    /// carry before their children (only `meta`, spec §3); empty for
    /// every other container.
    Container { header: AtomHeader, prefix: Vec<u8>, children: Vec<(FourCC, Atom)> },
    /// A typed leaf whose payload has been decoded.
    Typed(TypedLeaf),
    /// An opaque leaf, retained for later byte-for-byte reproduction.
    /// `data` is `None` for `mdat`: its payload is never pulled into
    /// memory, since the update engine streams chunk bytes directly
    /// between files instead of going through the atom tree for it
    /// (spec §4.4 "Media data write").
    Opaque { header: AtomHeader, data: Option<Vec<u8>> },
}

impl Atom {
    pub fn header(&self) -> &AtomHeader {
        match self {
            Atom::Container { header, .. } => header,
            Atom::Typed(leaf) => &leaf.header,
            Atom::Opaque { header, .. } => header,
        }
    }

    pub fn name(&self) -> &FourCC {
        &self.header().name
    }

    /// Finds the first direct child with the given type code.
    pub fn child(&self, name: &FourCC) -> Option<&Atom> {
        match self {
            Atom::Container { children, .. } => {
                children.iter().find(|(n, _)| n == name).map(|(_, a)| a)
            }
            _ => None,
        }
    }

    pub fn child_mut(&mut self, name: &FourCC) -> Option<&mut Atom> {
        match self {
            Atom::Container { children, .. } => {
                children.iter_mut().find(|(n, _)| n == name).map(|(_, a)| a)
            }
            _ => None,
        }
    }

    /// Finds the first descendant with the given type code anywhere
    /// below this node (depth-first, parse order).
    pub fn find(&self, name: &FourCC) -> Option<&Atom> {
        if self.name() == name {
            return Some(self);
        }
        if let Atom::Container { children, .. } = self {
            for (_, child) in children {
                if let Some(found) = child.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn find_mut(&mut self, name: &FourCC) -> Option<&mut Atom> {
        if self.name() == name {
            return Some(self);
        }
        if let Atom::Container { children, .. } = self {
            for (_, child) in children {
                if let Some(found) = child.find_mut(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn as_typed(&self) -> Option<&TypedAtom> {
        match self {
            Atom::Typed(leaf) => Some(&leaf.body),
            _ => None,
        }
    }

    pub fn as_typed_mut(&mut self) -> Option<&mut TypedAtom> {
        match self {
            Atom::Typed(leaf) => Some(&mut leaf.body),
            _ => None,
        }
    }
}

macro_rules! typed_accessor {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        impl Atom {
            pub fn $get(&self) -> Option<&$ty> {
                match self.as_typed()? {
                    TypedAtom::$variant(v) => Some(v),
                    _ => None,
                }
            }
            pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                match self.as_typed_mut()? {
                    TypedAtom::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

typed_accessor!(as_mvhd, as_mvhd_mut, Mvhd, Mvhd);
typed_accessor!(as_tkhd, as_tkhd_mut, Tkhd, Tkhd);
typed_accessor!(as_elst, as_elst_mut, Elst, Elst);
typed_accessor!(as_mdhd, as_mdhd_mut, Mdhd, Mdhd);
typed_accessor!(as_stsd, as_stsd_mut, Stsd, Stsd);
typed_accessor!(as_stts, as_stts_mut, Stts, Stts);
typed_accessor!(as_stss, as_stss_mut, Stss, Stss);
typed_accessor!(as_stsc, as_stsc_mut, Stsc, Stsc);
typed_accessor!(as_stsz, as_stsz_mut, Stsz, Stsz);
typed_accessor!(as_stco, as_stco_mut, Stco, Stco);

/// An in-memory reader over a leaf's retained opaque bytes, for tests
/// and introspection.
pub fn opaque_cursor(data: &[u8]) -> Cursor<&[u8]> {
    Cursor::new(data)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor as IoCursor;

    use super::*;
    use crate::atom::parse::parse_atom;
    use crate::atom::types::{Mdhd, Stco, Stsc, Stsd, Stss, Stsz, Stts};
    use crate::atom::write::write_atom;

    fn leaf(name: FourCC, body: TypedAtom) -> Atom {
        Atom::Typed(TypedLeaf {
            header: AtomHeader::new(0, name, 0),
            version: 0,
            flags: [0, 0, 0],
            body,
        })
    }

    #[test]
    fn parse_of_write_reproduces_a_typed_leaf() {
        let mdhd = leaf(
            FourCC::Mdhd,
            TypedAtom::Mdhd(Mdhd {
                creation_time: 1,
                modification_time: 2,
                time_scale: 600,
                duration: 1200,
                language: 0,
                quality: 0,
            }),
        );

        let mut buf = Vec::new();
        write_atom(&mut IoCursor::new(&mut buf), &mdhd).unwrap();

        let parsed = parse_atom(&mut IoCursor::new(buf)).unwrap();
        match parsed.as_mdhd() {
            Some(m) => {
                assert_eq!(m.creation_time, 1);
                assert_eq!(m.time_scale, 600);
                assert_eq!(m.duration, 1200);
            }
            None => panic!("expected a decoded mdhd"),
        }
    }

    #[test]
    fn parse_of_write_reproduces_a_container_and_child_order() {
        let stbl = Atom::Container {
            header: AtomHeader::new(0, FourCC::Stbl, 0),
            prefix: Vec::new(),
            children: vec![
                (
                    FourCC::Stsd,
                    leaf(FourCC::Stsd, TypedAtom::Stsd(Stsd { number_of_entries: 0, entries: Vec::new() })),
                ),
                (
                    FourCC::Stts,
                    leaf(FourCC::Stts, TypedAtom::Stts(Stts { number_of_entries: 0, runs: Vec::new() })),
                ),
                (
                    FourCC::Stsc,
                    leaf(FourCC::Stsc, TypedAtom::Stsc(Stsc { number_of_entries: 0, runs: Vec::new() })),
                ),
                (
                    FourCC::Stsz,
                    leaf(
                        FourCC::Stsz,
                        TypedAtom::Stsz(Stsz { fixed_sample_size: 0, number_of_entries: 0, sample_sizes: Vec::new() }),
                    ),
                ),
                (
                    FourCC::Stco,
                    leaf(FourCC::Stco, TypedAtom::Stco(Stco { number_of_entries: 0, chunk_offsets: Vec::new() })),
                ),
                (
                    FourCC::Stss,
                    leaf(
                        FourCC::Stss,
                        TypedAtom::Stss(Stss { number_of_entries: 1, sample_numbers: vec![1] }),
                    ),
                ),
            ],
        };

        let mut buf = Vec::new();
        write_atom(&mut IoCursor::new(&mut buf), &stbl).unwrap();

        let parsed = parse_atom(&mut IoCursor::new(buf)).unwrap();
        let Atom::Container { children, .. } = &parsed else {
            panic!("expected a container");
        };
        let order: Vec<String> = children.iter().map(|(n, _)| n.to_str()).collect();
        assert_eq!(order, vec!["stsd", "stts", "stsc", "stsz", "stco", "stss"]);
    }
}
