//! The symbol reader capability of one module.

use std::sync::Arc;

use crate::{
    metadata::{sequencepoints::SequencePointArrays, token::Token},
    Result,
};

/// Source-level symbols of one loaded module.
pub trait SymbolProvider: Send + Sync {
    /// URLs of every document the module was compiled from.
    fn documents(&self) -> Vec<Arc<str>>;

    /// The raw sequence point arrays of `method`, `None` if the method has no symbols.
    fn sequence_points(&self, method: Token) -> Option<SequencePointArrays>;

    /// Methods with code on `line` of `document`.
    fn methods_in_document(&self, document: &str, line: u32) -> Vec<Token>;

    /// The nearest line at or after `line` that carries code.
    ///
    /// # Errors
    /// Fails if `document` has no code at or after `line`.
    fn closest_line(&self, document: &str, line: u32) -> Result<u32>;
}
