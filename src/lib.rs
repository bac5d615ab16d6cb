// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

//! # corscope
//!
//! The core of a source-level debugger for CLR programs. `corscope` decodes metadata
//! signatures, models types lazily from a metadata importer, maps source positions to IL
//! offsets through per-method sequence points, and drives stepping, breakpoints, exception
//! stops and function evaluation on top of a native debug engine.
//!
//! The crate never talks to a process or a file by itself. Three capabilities are supplied by
//! the embedder:
//!
//! - [`metadata::importer::MetadataImporter`] answers metadata queries for one module
//! - [`debugger::SymbolProvider`] hands out sequence points of one module
//! - [`debugger::NativeDebugControl`] issues commands to the live process
//!
//! ## Quick Start
//!
//! ```rust
//! use corscope::prelude::*;
//!
//! // instance void (int32, string)
//! let signature = decode_method_signature(&[0x20, 0x02, 0x01, 0x08, 0x0E], Instantiation::empty())?;
//! assert!(signature.calling_convention.has_this());
//! assert_eq!(signature.params.len(), 2);
//! # Ok::<(), corscope::Error>(())
//! ```
//!
//! A debugging session is driven from two sides:
//!
//! ```rust,ignore
//! use corscope::prelude::*;
//!
//! let session = DebuggerSession::new(native, SessionOptions::default())?;
//! session.insert_breakpoint(Breakpoint::new("/src/Program.cs", 12, 1));
//!
//! // the engine's callback thread
//! match session.handle_event(event) {
//!     EventDisposition::Continue => engine.resume(),
//!     EventDisposition::Stop => {}
//! }
//!
//! // the front end
//! while let Ok(event) = session.events().recv() {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`blob`] - Bounds-checked readers and writers for ECMA-335 compressed integers
//! - [`metadata`] - Tokens, signatures, the lazy type model, debugger attributes and sequence
//!   points
//! - [`debugger`] - Breakpoint resolution, the stepping policy, evaluation tracking and the
//!   [`debugger::DebuggerSession`] facade
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Module loads and unloads are reported at `info`,
//! recoverable failures at `warn`, dropped work at `error` and every routed callback at
//! `debug`. Install any subscriber to see them.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. Native engine failures are wrapped in
//! [`Error::Native`] unless the session converts them to a breakpoint status or an evaluation
//! outcome.
//!
//! ### Standards Compliance
//!
//! - **ECMA-335 6th Edition**: signature encoding (II.23.2), compressed integers (II.23.2)
//! - **Portable PDB**: sequence point blobs

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use corscope::prelude::*;
///
/// let index = SequencePointIndex::new(Token::new(0x0600_0001), Vec::new());
/// assert!(index.is_empty());
/// ```
pub mod prelude;

/// Compressed integer and blob primitives.
pub mod blob;

/// Metadata decoding: tokens, signatures, the type model, attributes and sequence points.
pub mod metadata;

/// The debugger session and the policies it drives.
pub mod debugger;

/// `corscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `corscope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use corscope::{metadata::signatures::decode_type, Error};
///
/// match decode_type(&[0x11]) {
///     Err(Error::OutOfBounds { .. }) => println!("truncated signature"),
///     Err(e) => println!("Error: {}", e),
///     Ok(ty) => println!("{ty:?}"),
/// }
/// ```
pub use error::Error;
