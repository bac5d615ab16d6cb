//! In-memory stand-ins for the metadata importer, the symbol reader and the native engine.

mod symbols;

pub use importer::*;
pub use native::*;
pub use symbols::*;
