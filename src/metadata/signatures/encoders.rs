//! Signature encoders, the inverse of [`crate::metadata::signatures::SignatureDecoder`].
//!
//! The encoders produce ECMA-335 signature blobs from decoded descriptors. They are used to
//! build synthetic signatures for tests and benchmarks and to re-emit signatures that were
//! decoded with an empty instantiation.
//!
//! Descriptors that only the decoder can produce from lossy inputs (an `ARRAY` of rank 0, a
//! native-image tag) have no distinct encoding; they encode as the shape they decoded to.

use crate::{
    metadata::{
        signatures::{CallKind, GenericOwner, MethodSignature, TokenKind, TypeDescriptor},
        token::{TableKind, Token},
        typesystem::ELEMENT_TYPE,
    },
    Error, Result,
};

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Append `value` using the 1, 2 or 4 byte compressed encoding.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) -> Result<()> {
    if value <= 0x7F {
        buffer.push(value as u8);
    } else if value <= 0x3FFF {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else if value <= MAX_COMPRESSED_UINT {
        buffer.push(0xC0 | (value >> 24) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        return Err(malformed_error!(
            "Value 0x{:08X} does not fit a compressed integer",
            value
        ));
    }

    Ok(())
}

/// Append a compressed `TypeDefOrRefOrSpec` token.
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] for tokens outside TypeDef, TypeRef, TypeSpec and
/// the base-type selector.
pub fn write_compressed_token(token: Token, buffer: &mut Vec<u8>) -> Result<()> {
    let tag = match token.kind() {
        TableKind::TypeDef => 0,
        TableKind::TypeRef => 1,
        TableKind::TypeSpec => 2,
        TableKind::BaseType => 3,
        _ => return Err(Error::InvalidToken(token)),
    };

    write_compressed_uint((token.row() << 2) | tag, buffer)
}

/// Append one type.
///
/// # Errors
/// Propagates integer and token encoding errors.
pub fn encode_type(ty: &TypeDescriptor, buffer: &mut Vec<u8>) -> Result<()> {
    match ty {
        TypeDescriptor::Primitive(element) => buffer.push(*element as u8),
        TypeDescriptor::ByToken(kind, token) => {
            buffer.push(match kind {
                TokenKind::Class => ELEMENT_TYPE::CLASS,
                TokenKind::ValueType => ELEMENT_TYPE::VALUETYPE,
                TokenKind::Modifier { required: true } => ELEMENT_TYPE::CMOD_REQD,
                TokenKind::Modifier { required: false } => ELEMENT_TYPE::CMOD_OPT,
            });
            write_compressed_token(*token, buffer)?;
        }
        TypeDescriptor::Array(shape) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type(&shape.element, buffer)?;
            write_compressed_uint(shape.rank, buffer)?;
            write_compressed_uint(shape.sizes.len() as u32, buffer)?;
            for size in &shape.sizes {
                write_compressed_uint(*size, buffer)?;
            }
            write_compressed_uint(shape.lower_bounds.len() as u32, buffer)?;
            for bound in &shape.lower_bounds {
                write_compressed_uint(*bound, buffer)?;
            }
        }
        TypeDescriptor::SzArray(element) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type(element, buffer)?;
        }
        TypeDescriptor::Pointer(element) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_type(element, buffer)?;
        }
        TypeDescriptor::ByRef(element) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type(element, buffer)?;
        }
        TypeDescriptor::Generic { base, args } => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type(base, buffer)?;
            write_compressed_uint(args.len() as u32, buffer)?;
            for arg in args {
                encode_type(arg, buffer)?;
            }
        }
        TypeDescriptor::GenericParam { index, owner } => {
            buffer.push(match owner {
                GenericOwner::Type => ELEMENT_TYPE::VAR,
                GenericOwner::Method => ELEMENT_TYPE::MVAR,
            });
            write_compressed_uint(*index, buffer)?;
        }
        TypeDescriptor::FunctionPointer(signature) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            write_method_signature(signature, buffer)?;
        }
    }

    Ok(())
}

/// Encode a method signature into a fresh blob.
///
/// A standalone `SENTINEL` byte is written in front of the parameter at `sentinel_index`.
///
/// # Errors
/// Propagates integer and token encoding errors.
pub fn encode_method_signature(signature: &MethodSignature) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(8 + signature.params.len());
    write_method_signature(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encode a field signature (`0x06` prolog) into a fresh blob.
///
/// # Errors
/// Propagates integer and token encoding errors.
pub fn encode_field_signature(ty: &TypeDescriptor) -> Result<Vec<u8>> {
    let mut buffer = vec![CallKind::Field as u8];
    encode_type(ty, &mut buffer)?;
    Ok(buffer)
}

fn write_method_signature(signature: &MethodSignature, buffer: &mut Vec<u8>) -> Result<()> {
    let calling_convention = signature.calling_convention;
    buffer.push(calling_convention.to_byte());

    if calling_convention.is_generic() {
        write_compressed_uint(signature.generic_arity, buffer)?;
    }

    if calling_convention.kind != CallKind::Field {
        write_compressed_uint(signature.params.len() as u32, buffer)?;
    }

    encode_type(&signature.return_type, buffer)?;

    for (index, param) in signature.params.iter().enumerate() {
        if signature.sentinel_index == Some(index) {
            buffer.push(ELEMENT_TYPE::SENTINEL);
        }
        encode_type(param, buffer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{ArrayShape, CallingConvention, SignatureDecoder},
        typesystem::ElementType,
    };

    #[test]
    fn every_primitive_roundtrips() {
        use strum::IntoEnumIterator;

        let primitives: Vec<ElementType> =
            ElementType::iter().filter(|element| element.is_primitive()).collect();
        assert_eq!(primitives.len(), 18);

        for element in primitives {
            let ty = TypeDescriptor::Primitive(element);
            let mut blob = Vec::new();
            encode_type(&ty, &mut blob).unwrap();
            assert_eq!(blob, vec![element as u8], "{element}");

            let mut decoder = SignatureDecoder::new(&blob);
            assert_eq!(decoder.decode_type().unwrap(), ty, "{element}");
            assert_eq!(decoder.consumed(), 1);

            let signature = MethodSignature {
                calling_convention: CallingConvention::DEFAULT,
                generic_arity: 0,
                return_type: ty.clone(),
                params: Vec::new(),
                sentinel_index: None,
            };
            let encoded = encode_method_signature(&signature).unwrap();
            let decoded = SignatureDecoder::new(&encoded).decode_method_signature().unwrap();
            assert_eq!(decoded.return_type, ty, "{element}");
        }
    }

    #[test]
    fn compressed_uint_boundaries() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, &[0xDF, 0xFF, 0xFF, 0xFF]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            write_compressed_uint(*value, &mut buffer).unwrap();
            assert_eq!(&buffer[..], *expected, "value 0x{:X}", value);
        }

        assert!(write_compressed_uint(0x2000_0000, &mut Vec::new()).is_err());
    }

    #[test]
    fn compressed_token_rejects_non_type_tables() {
        let mut buffer = Vec::new();
        write_compressed_token(Token::new(0x0100_0012), &mut buffer).unwrap();
        assert_eq!(buffer, vec![0x49]);

        assert!(matches!(
            write_compressed_token(Token::new(0x0600_0001), &mut Vec::new()),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn nested_type_roundtrip() {
        // Dictionary<T, int*[,]>[]
        let ty = TypeDescriptor::SzArray(Box::new(TypeDescriptor::Generic {
            base: Box::new(TypeDescriptor::ByToken(
                TokenKind::Class,
                Token::new(0x0100_0040),
            )),
            args: vec![
                TypeDescriptor::GenericParam {
                    index: 0,
                    owner: GenericOwner::Type,
                },
                TypeDescriptor::Array(ArrayShape {
                    element: Box::new(TypeDescriptor::Pointer(Box::new(
                        TypeDescriptor::Primitive(ElementType::I4),
                    ))),
                    rank: 2,
                    sizes: vec![],
                    lower_bounds: vec![0, 0],
                }),
            ],
        }));

        let mut buffer = Vec::new();
        encode_type(&ty, &mut buffer).unwrap();
        let mut decoder = SignatureDecoder::new(&buffer);
        assert_eq!(decoder.decode_type().unwrap(), ty);
        assert_eq!(decoder.consumed(), buffer.len());
    }

    #[test]
    fn vararg_signature_roundtrip() {
        let signature = MethodSignature {
            calling_convention: CallingConvention::from_byte(0x25).unwrap(),
            generic_arity: 0,
            return_type: TypeDescriptor::Primitive(ElementType::Void),
            params: vec![
                TypeDescriptor::Primitive(ElementType::String),
                TypeDescriptor::Primitive(ElementType::I4),
                TypeDescriptor::Primitive(ElementType::R8),
            ],
            sentinel_index: Some(1),
        };

        let blob = encode_method_signature(&signature).unwrap();
        assert_eq!(blob[4], ELEMENT_TYPE::SENTINEL);
        let decoded = SignatureDecoder::new(&blob)
            .decode_method_signature()
            .unwrap();
        assert_eq!(decoded, signature);
    }

    #[test]
    fn field_signature_prolog() {
        let blob = encode_field_signature(&TypeDescriptor::Primitive(ElementType::I8)).unwrap();
        assert_eq!(blob, vec![0x06, ELEMENT_TYPE::I8]);
    }
}
