//! The atom tree: model, typed leaf bodies, parser, and serializer
//! (spec §3, §4.1, §4.2).

pub mod header;
pub mod parse;
pub mod tree;
pub mod types;
pub mod write;

pub use header::AtomHeader;
pub use parse::parse_atom;
pub use tree::{Atom, TypedAtom, TypedLeaf};
pub use write::write_atom;
