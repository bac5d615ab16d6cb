//! # corscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the corscope library. Import this module to get quick access to the essential
//! types for decoding metadata and driving a debugger session.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all corscope operations
pub use crate::Error;

/// The result type used throughout corscope
pub use crate::Result;

// ================================================================================================
// Metadata System - Core Types
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// The metadata query capability supplied by the embedder
pub use crate::metadata::importer::MetadataImporter;

// ================================================================================================
// Signatures
// ================================================================================================

/// Signature decoding entry points
pub use crate::metadata::signatures::{
    decode_field_signature, decode_local_signature, decode_method_signature, decode_type,
    SignatureDecoder,
};

/// Signature encoding entry points
pub use crate::metadata::signatures::{encode_field_signature, encode_method_signature, encode_type};

/// Decoded signature structures
pub use crate::metadata::signatures::{
    CallingConvention, Instantiation, LocalVariable, MethodSignature, TypeDescriptor,
};

// ================================================================================================
// Type System
// ================================================================================================

/// The lazy type model and its values
pub use crate::metadata::typesystem::{
    ElementType, MetadataMethod, MetadataType, MethodRc, TypeModel, TypeRc,
};

/// Debugger attribute markers
pub use crate::metadata::customattributes::DebugAttributes;

// ================================================================================================
// Sequence Points
// ================================================================================================

/// Per-method source tables
pub use crate::metadata::sequencepoints::{SequencePoint, SequencePointArrays, SequencePointIndex};

// ================================================================================================
// Debugger
// ================================================================================================

/// The session facade and its configuration
pub use crate::debugger::{AbortEscalation, DebuggerSession, SessionOptions};

/// Capabilities supplied by the embedder
pub use crate::debugger::{ExpressionEvaluator, NativeDebugControl, SymbolProvider};

/// Events in and out of a session
pub use crate::debugger::{
    EventDisposition, LoadedModule, NativeEvent, SessionEvent, StopReason, ThreadSnapshot,
};

/// Breakpoint requests
pub use crate::debugger::{
    BindingResult, BreakEventId, BreakEventStatus, Breakpoint, Catchpoint, HitAction,
    HitCondition,
};
