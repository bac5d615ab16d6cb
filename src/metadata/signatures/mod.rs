//! Signature blob decoding for the debugger's type model.
//!
//! Signatures encode parameter, return, field and local types in a compact, prefix-tagged byte
//! format (ECMA-335 II.23.2). The decoder turns them into owned [`TypeDescriptor`] trees while
//! substituting generic type arguments from an [`Instantiation`]; method type variables are
//! kept symbolic since the debugger never knows them when it decodes.
//!
//! Besides the standard element types, the decoder accepts the tags that show up in signatures
//! taken from native images: `INTERNAL` and `CANON_ZAPSIG` decode as `System.Object`, the
//! value-type and array-template tags decode as the type that follows them.
//!
//! # Examples
//!
//! ```rust
//! use corscope::metadata::signatures::{decode_method_signature, Instantiation, TypeDescriptor};
//! use corscope::metadata::typesystem::ElementType;
//!
//! // instance string M(int32, object)
//! let signature = decode_method_signature(&[0x20, 0x02, 0x0E, 0x08, 0x1C], Instantiation::empty())?;
//! assert!(signature.calling_convention.has_this());
//! assert_eq!(signature.return_type, TypeDescriptor::Primitive(ElementType::String));
//! assert_eq!(signature.params.len(), 2);
//! # Ok::<(), corscope::Error>(())
//! ```
//!
//! ```rust
//! use corscope::metadata::signatures::{decode_type_with, Instantiation, TypeDescriptor};
//! use corscope::metadata::typesystem::ElementType;
//!
//! // !0[] with !0 bound to int32
//! let instantiation = Instantiation::new(vec![TypeDescriptor::Primitive(ElementType::I4)]);
//! let (ty, consumed) = decode_type_with(&[0x1D, 0x13, 0x00], &instantiation)?;
//! assert_eq!(consumed, 3);
//! assert_eq!(
//!     ty,
//!     TypeDescriptor::SzArray(Box::new(TypeDescriptor::Primitive(ElementType::I4)))
//! );
//! # Ok::<(), corscope::Error>(())
//! ```

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::SignatureDecoder;
pub use types::*;

use crate::Result;

/// Decode a single type with no generic arguments bound.
///
/// # Errors
/// See [`SignatureDecoder::decode_type`].
pub fn decode_type(data: &[u8]) -> Result<TypeDescriptor> {
    SignatureDecoder::new(data).decode_type()
}

/// Decode a single type, returning it together with the number of bytes it occupied.
///
/// # Errors
/// See [`SignatureDecoder::decode_type`].
pub fn decode_type_with(
    data: &[u8],
    instantiation: &Instantiation,
) -> Result<(TypeDescriptor, usize)> {
    let mut decoder = SignatureDecoder::with_instantiation(data, instantiation);
    let ty = decoder.decode_type()?;
    Ok((ty, decoder.consumed()))
}

/// Decode a method signature.
///
/// # Errors
/// See [`SignatureDecoder::decode_method_signature`].
pub fn decode_method_signature(
    data: &[u8],
    instantiation: &Instantiation,
) -> Result<MethodSignature> {
    SignatureDecoder::with_instantiation(data, instantiation).decode_method_signature()
}

/// Decode a field signature.
///
/// # Errors
/// See [`SignatureDecoder::decode_field_signature`].
pub fn decode_field_signature(
    data: &[u8],
    instantiation: &Instantiation,
) -> Result<TypeDescriptor> {
    SignatureDecoder::with_instantiation(data, instantiation).decode_field_signature()
}

/// Decode a local variable signature.
///
/// # Errors
/// See [`SignatureDecoder::decode_local_signature`].
pub fn decode_local_signature(
    data: &[u8],
    instantiation: &Instantiation,
) -> Result<Vec<LocalVariable>> {
    SignatureDecoder::with_instantiation(data, instantiation).decode_local_signature()
}
