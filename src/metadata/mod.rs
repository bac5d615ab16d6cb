//! Metadata decoding and the lazy type model.
//!
//! This module turns the raw data a CLR metadata importer hands out into values the debugger
//! can reason about. Nothing here talks to a live process; every input is either a byte blob
//! or a query answered by a [`importer::MetadataImporter`].
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references
//! - [`signatures`] - Type and method signature decoding and encoding
//! - [`typesystem`] - Lazy, token-addressed types, methods, fields and properties
//! - [`customattributes`] - Debugger attribute detection and payload parsing
//! - [`sequencepoints`] - Per-method IL offset to source range tables
//! - [`importer`] - The metadata query capability everything above is built on
//!
//! # Examples
//!
//! ```rust
//! use corscope::metadata::signatures::{decode_method_signature, Instantiation, TypeDescriptor};
//!
//! // static int32 (string)
//! let signature = decode_method_signature(&[0x00, 0x01, 0x08, 0x0E], Instantiation::empty())?;
//! assert_eq!(signature.params.len(), 1);
//! assert!(matches!(signature.return_type, TypeDescriptor::Primitive(_)));
//! # Ok::<(), corscope::Error>(())
//! ```

/// Implementation of custom attribute detection for the debugger markers
pub mod customattributes;
/// The metadata query capability
pub mod importer;
/// Implementation of the per-method sequence point tables
pub mod sequencepoints;
/// Implementation of method and type signatures
pub mod signatures;
/// Implementation of metadata tokens
pub mod token;
/// Implementation of the lazy type model
pub mod typesystem;
