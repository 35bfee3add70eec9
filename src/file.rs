//! A parsed MP4/QuickTime file: its top-level atom list plus the open
//! handle used to read payload bytes on demand (spec §3 "Lifecycles").

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::atom::{parse_atom, Atom};
use crate::error::Mp4Error;
use crate::fourcc::FourCC;

/// A file opened for parsing, and optionally for in-place rewriting.
pub struct Mp4File {
    pub path: PathBuf,
    pub top_level: Vec<(FourCC, Atom)>,
    pub writable: bool,
    handle: File,
}

impl Mp4File {
    /// Opens a file read-only and parses its top-level atom list.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Mp4Error> {
        Self::open_impl(path, false)
    }

    /// Opens a file read-write and parses its top-level atom list.
    /// Required for [`crate::engine::apply`] (spec §4.4 precondition
    /// `NotWritable`).
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self, Mp4Error> {
        Self::open_impl(path, true)
    }

    fn open_impl(path: impl AsRef<Path>, writable: bool) -> Result<Self, Mp4Error> {
        let path = path.as_ref().to_path_buf();
        let mut handle = OpenOptions::new().read(true).write(writable).open(&path)?;
        let len = handle.metadata()?.len();
        let top_level = parse_top_level(&mut handle, len)?;
        Ok(Self { path, top_level, writable, handle })
    }

    pub fn child(&self, name: &FourCC) -> Option<&Atom> {
        self.top_level.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn ftyp(&self) -> Option<&Atom> {
        self.child(&FourCC::Ftyp)
    }

    pub fn moov(&self) -> Option<&Atom> {
        self.child(&FourCC::Moov)
    }

    pub fn free(&self) -> Option<&Atom> {
        self.child(&FourCC::Free)
    }

    pub fn mdat(&self) -> Option<&Atom> {
        self.child(&FourCC::Mdat)
    }

    /// True if the top-level order is ftyp, moov, free, mdat by
    /// ascending offset (spec §3 invariant, required for in-place
    /// updates).
    pub fn is_in_place_layout(&self) -> bool {
        let names = [FourCC::Ftyp, FourCC::Moov, FourCC::Free, FourCC::Mdat];
        let offsets: Vec<u64> = names
            .iter()
            .filter_map(|n| self.child(n).map(|a| a.header().offset))
            .collect();
        offsets.len() == names.len() && offsets.windows(2).all(|w| w[0] < w[1])
    }

    pub fn read_range(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, Mp4Error> {
        self.handle.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.handle.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn handle_mut(&mut self) -> &mut File {
        &mut self.handle
    }

    /// Re-parses the top-level atom list from the current on-disk
    /// contents, picking up whatever `engine::apply` just wrote.
    pub fn reload(&mut self) -> Result<(), Mp4Error> {
        let len = self.handle.metadata()?.len();
        self.handle.seek(SeekFrom::Start(0))?;
        self.top_level = parse_top_level(&mut self.handle, len)?;
        Ok(())
    }
}

fn parse_top_level<R: Read + Seek>(r: &mut R, len: u64) -> Result<Vec<(FourCC, Atom)>, Mp4Error> {
    let mut atoms = Vec::new();
    loop {
        let pos = r.stream_position()?;
        if pos == len {
            break;
        }
        if pos > len {
            return Err(Mp4Error::MalformedAtom(format!(
                "top-level atom overran file end (at {pos}, file length {len})"
            )));
        }
        let atom = parse_atom(r)?;
        atoms.push((atom.name().clone(), atom));
    }
    Ok(atoms)
}

/// Lazily-opened read handles for chunk sources other than the
/// destination currently being updated, keyed by path.
#[derive(Default)]
pub struct SourceCache {
    handles: HashMap<PathBuf, File>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, Mp4Error> {
        if !self.handles.contains_key(path) {
            let handle = File::open(path)?;
            self.handles.insert(path.to_path_buf(), handle);
        }
        let handle = self.handles.get_mut(path).expect("just inserted");
        handle.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        handle.read_exact(&mut buf)?;
        Ok(buf)
    }
}
