//! Errors raised while parsing, chunking, or rewriting an MP4 file.

use std::fmt;

/// Errors raised by the atom tree parser/serializer, the chunk model,
/// and the in-place/full-rewrite update engine.
#[derive(Debug)]
pub enum Mp4Error {
    /// IO error.
    IOError(std::io::Error),
    /// Converted `binrw::Error`.
    BinRwError(binrw::Error),
    /// Atom header or payload did not match what the parser expected:
    /// unexpected EOF, a position mismatch between atoms, an unknown
    /// top-level type, or the unsupported 64-bit `largesize` form.
    MalformedAtom(String),
    /// Type is not a recognized container, typed leaf, or opaque leaf.
    UnknownAtom(String),
    /// A feature present in the source file is outside what this
    /// engine supports: `stsz.fixed_sample_size != 0`, a sample
    /// description with `reference_index != 0`, more than one `stts`
    /// run, more than one `elst` edit, or an edit rate != 65536.
    UnsupportedFeature(String),
    /// Chunks drawn from more than one pixel dimension were combined.
    DimensionMismatch { expected: (u32, u32), got: (u32, u32) },
    /// `apply()` was called on a handle that isn't writable.
    NotWritable,
    /// An in-place update cannot proceed; a full rewrite is required.
    /// Carries the number of additional bytes needed between `moov`
    /// and `mdat`, when known (a missing `free` atom or disordered
    /// sections don't have a precise number, so they carry `0` and
    /// rely on the driver's padding heuristic).
    NeedsRewrite { space_needed: i64 },
    /// A source file's chunks do not exactly tile its `mdat` payload.
    ChunkContiguityViolation { source: String },
    /// Atom with the requested FourCC was not found.
    NoSuchAtom(String),
    /// Atom FourCC didn't match what the caller expected.
    AtomMismatch { got: String, expected: String },
    /// A parsed/serialized atom's byte count didn't match its
    /// declared size.
    SizeMismatch { got: u64, expected: u64 },
}

impl std::error::Error for Mp4Error {}

impl fmt::Display for Mp4Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mp4Error::IOError(err) => write!(f, "IO error: {err}"),
            Mp4Error::BinRwError(err) => write!(f, "{err}"),
            Mp4Error::MalformedAtom(msg) => write!(f, "malformed atom: {msg}"),
            Mp4Error::UnknownAtom(name) => write!(f, "unknown atom type '{name}'"),
            Mp4Error::UnsupportedFeature(msg) => write!(f, "unsupported feature: {msg}"),
            Mp4Error::DimensionMismatch { expected, got } => write!(
                f,
                "chunk dimensions {}x{} do not match destination dimensions {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            Mp4Error::NotWritable => write!(f, "destination is not opened writable"),
            Mp4Error::NeedsRewrite { space_needed } => {
                write!(f, "needs full rewrite, {space_needed} additional bytes required")
            }
            Mp4Error::ChunkContiguityViolation { source } => {
                write!(f, "chunks in '{source}' do not tile its mdat payload exactly")
            }
            Mp4Error::NoSuchAtom(name) => write!(f, "no such atom '{name}'"),
            Mp4Error::AtomMismatch { got, expected } => {
                write!(f, "atom mismatch: expected '{expected}', got '{got}'")
            }
            Mp4Error::SizeMismatch { got, expected } => {
                write!(f, "size mismatch: expected {expected} bytes, got {got}")
            }
        }
    }
}

impl From<std::io::Error> for Mp4Error {
    fn from(err: std::io::Error) -> Self {
        Mp4Error::IOError(err)
    }
}

impl From<binrw::Error> for Mp4Error {
    fn from(err: binrw::Error) -> Self {
        Mp4Error::BinRwError(err)
    }
}
