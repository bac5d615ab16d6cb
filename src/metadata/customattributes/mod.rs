//! Detection of the debugger attributes and decoding of their payloads.
//!
//! The stepper only needs to know whether a method or type carries one of a handful of
//! attributes ([`DebugAttributes`]); presence is answered by the importer's by-name lookup.
//! Payloads are decoded for the three attributes that carry data the debugger shows:
//! `DebuggerDisplay`, `DebuggerTypeProxy` and `DebuggerBrowsable`. General attribute
//! activation is not supported.
//!
//! # Examples
//!
//! ```rust
//! use corscope::metadata::customattributes::parse_debugger_display;
//!
//! let blob = [0x01, 0x00, 0x06, b'{', b'N', b'a', b'm', b'e', b'}', 0x00, 0x00];
//! let display = parse_debugger_display(&blob)?;
//! assert_eq!(display.value.as_deref(), Some("{Name}"));
//! # Ok::<(), corscope::Error>(())
//! ```

mod parser;
mod types;

pub use parser::{
    parse_debugger_browsable, parse_debugger_display, parse_debugger_type_proxy,
    AttributeBlobParser,
};
pub use types::*;

use crate::metadata::{importer::MetadataImporter, token::Token};

/// Collect the debugger markers applied to `owner`.
pub fn probe_debug_attributes(importer: &dyn MetadataImporter, owner: Token) -> DebugAttributes {
    DebugAttributes::NAMES
        .iter()
        .filter(|(_, name)| importer.custom_attribute_by_name(owner, name).is_some())
        .fold(DebugAttributes::empty(), |acc, (flag, _)| acc | *flag)
}
