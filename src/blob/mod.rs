//! Bounds-checked byte access for metadata blobs.
//!
//! - [`io`] - endian-aware primitive reads
//! - [`parser`] - the [`Parser`] cursor with ECMA-335 compressed encodings

pub mod io;
pub mod parser;

pub use parser::Parser;
