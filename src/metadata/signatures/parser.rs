use crate::{
    blob::Parser,
    metadata::{
        signatures::{
            ArrayShape, CallKind, CallingConvention, GenericOwner, Instantiation, LocalVariable,
            MethodSignature, TokenKind, TypeDescriptor,
        },
        token::Token,
        typesystem::{ElementType, ELEMENT_TYPE},
    },
    Error::{RecursionLimit, UnsupportedSignatureElement},
    Result,
};

const MAX_RECURSION_DEPTH: usize = 50;

/// Recursive decoder over a signature blob.
///
/// The decoder reads from a [`Parser`] cursor and substitutes `VAR` positions from the active
/// [`Instantiation`]. `MVAR` positions always stay symbolic.
pub struct SignatureDecoder<'a, 'i> {
    parser: Parser<'a>,
    instantiation: &'i Instantiation,
    depth: usize,
}

impl<'a> SignatureDecoder<'a, 'static> {
    /// Create a decoder with the empty instantiation.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureDecoder::with_instantiation(data, Instantiation::empty())
    }
}

impl<'a, 'i> SignatureDecoder<'a, 'i> {
    /// Create a decoder that substitutes type variables from `instantiation`.
    #[must_use]
    pub fn with_instantiation(data: &'a [u8], instantiation: &'i Instantiation) -> Self {
        SignatureDecoder {
            parser: Parser::new(data),
            instantiation,
            depth: 0,
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.parser.pos()
    }

    /// Decode one type at the cursor.
    ///
    /// A tag carrying the sentinel bits is cleaned before dispatch.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedSignatureElement`] for tags that have no meaning in
    /// a type position, [`crate::Error::RecursionLimit`] for pathological nesting, and cursor
    /// errors for truncated blobs.
    pub fn decode_type(&mut self) -> Result<TypeDescriptor> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.decode_type_inner();
        self.depth -= 1;
        result
    }

    fn decode_type_inner(&mut self) -> Result<TypeDescriptor> {
        let mut tag = self.parser.read_le::<u8>()?;
        if (tag & ELEMENT_TYPE::SENTINEL) == ELEMENT_TYPE::SENTINEL {
            tag ^= ELEMENT_TYPE::SENTINEL;
        }

        let element = ElementType::try_from(tag)?;
        if element.is_primitive() {
            return Ok(TypeDescriptor::Primitive(element));
        }

        match element {
            ElementType::Internal | ElementType::CanonZapSig => {
                Ok(TypeDescriptor::Primitive(ElementType::Object))
            }
            ElementType::NativeValueTypeZapSig | ElementType::NativeArrayTemplateZapSig => {
                self.decode_type()
            }
            ElementType::Var => {
                let index = self.parser.read_compressed_uint()?;
                match self.instantiation.get(index) {
                    Some(bound) => Ok(bound.clone()),
                    None => Ok(TypeDescriptor::GenericParam {
                        index,
                        owner: GenericOwner::Type,
                    }),
                }
            }
            ElementType::MVar => Ok(TypeDescriptor::GenericParam {
                index: self.parser.read_compressed_uint()?,
                owner: GenericOwner::Method,
            }),
            ElementType::GenericInst => {
                let base = self.decode_type()?;
                let arg_count = self.parser.read_compressed_uint()?;

                let mut args = Vec::with_capacity(arg_count.min(64) as usize);
                for _ in 0..arg_count {
                    args.push(self.decode_type()?);
                }

                Ok(TypeDescriptor::Generic {
                    base: Box::new(base),
                    args,
                })
            }
            ElementType::Ptr => Ok(TypeDescriptor::Pointer(Box::new(self.decode_type()?))),
            ElementType::ByRef => Ok(TypeDescriptor::ByRef(Box::new(self.decode_type()?))),
            ElementType::SzArray => Ok(TypeDescriptor::SzArray(Box::new(self.decode_type()?))),
            ElementType::Array => self.decode_array(),
            ElementType::Class => Ok(TypeDescriptor::ByToken(
                TokenKind::Class,
                self.parser.read_compressed_token()?,
            )),
            ElementType::ValueType => Ok(TypeDescriptor::ByToken(
                TokenKind::ValueType,
                self.parser.read_compressed_token()?,
            )),
            ElementType::CModReqd | ElementType::CModOpt => Ok(TypeDescriptor::ByToken(
                TokenKind::Modifier {
                    required: element == ElementType::CModReqd,
                },
                self.parser.read_compressed_token()?,
            )),
            ElementType::FnPtr => Ok(TypeDescriptor::FunctionPointer(Box::new(
                self.decode_method_signature()?,
            ))),
            _ => Err(UnsupportedSignatureElement(tag)),
        }
    }

    fn decode_array(&mut self) -> Result<TypeDescriptor> {
        let element = self.decode_type()?;
        let rank = self.parser.read_compressed_uint()?;
        if rank == 0 {
            return Ok(TypeDescriptor::SzArray(Box::new(element)));
        }

        let num_sizes = self.parser.read_compressed_uint()?;
        let mut sizes = Vec::with_capacity(num_sizes.min(rank) as usize);
        for _ in 0..num_sizes.min(rank) {
            sizes.push(self.parser.read_compressed_uint()?);
        }

        let num_lo_bounds = self.parser.read_compressed_uint()?;
        let mut lower_bounds = Vec::with_capacity(num_lo_bounds.min(rank) as usize);
        for _ in 0..num_lo_bounds.min(rank) {
            lower_bounds.push(self.parser.read_compressed_uint()?);
        }

        Ok(TypeDescriptor::Array(ArrayShape {
            element: Box::new(element),
            rank,
            sizes,
            lower_bounds,
        }))
    }

    /// Custom modifiers in front of a parameter, return, field or local type.
    fn skip_custom_mods(&mut self) -> Result<Vec<Token>> {
        let mut mods = Vec::new();

        while self.parser.has_more_data() {
            let next_byte = self.parser.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_OPT && next_byte != ELEMENT_TYPE::CMOD_REQD {
                break;
            }

            self.parser.advance()?;
            mods.push(self.parser.read_compressed_token()?);
        }

        Ok(mods)
    }

    fn decode_param(&mut self) -> Result<TypeDescriptor> {
        self.skip_custom_mods()?;
        self.decode_type()
    }

    /// Decode a method or function-pointer signature at the cursor.
    ///
    /// The calling convention byte comes first, then the generic arity when the `GENERIC` flag
    /// is set, then the argument count (absent for `Field`), the return type and the
    /// arguments. A standalone `SENTINEL` byte is consumed and marks the vararg boundary; a
    /// sentinel bit OR'd onto an argument's own tag marks it without consuming a byte.
    ///
    /// # Errors
    /// See [`SignatureDecoder::decode_type`].
    pub fn decode_method_signature(&mut self) -> Result<MethodSignature> {
        let calling_convention = CallingConvention::from_byte(self.parser.read_le::<u8>()?)?;

        let generic_arity = if calling_convention.is_generic() {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = if calling_convention.kind == CallKind::Field {
            0
        } else {
            self.parser.read_compressed_uint()?
        };

        let return_type = self.decode_param()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        let mut sentinel_index = None;
        for n in 0..param_count as usize {
            let tag = self.parser.peek_byte()?;
            if tag == ELEMENT_TYPE::SENTINEL {
                sentinel_index = Some(n);
                self.parser.advance()?;
            } else if (tag & ELEMENT_TYPE::SENTINEL) == ELEMENT_TYPE::SENTINEL {
                sentinel_index = Some(n);
            }

            params.push(self.decode_param()?);
        }

        Ok(MethodSignature {
            calling_convention,
            generic_arity,
            return_type,
            params,
            sentinel_index,
        })
    }

    /// Decode a field signature (`0x06` prolog).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the prolog is wrong, otherwise see
    /// [`SignatureDecoder::decode_type`].
    pub fn decode_field_signature(&mut self) -> Result<TypeDescriptor> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte & 0x0f != CallKind::Field as u8 {
            return Err(malformed_error!(
                "Field signature - invalid start - {}",
                head_byte
            ));
        }

        self.decode_param()
    }

    /// Decode a local variable signature (`0x07` prolog).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the prolog is wrong, otherwise see
    /// [`SignatureDecoder::decode_type`].
    pub fn decode_local_signature(&mut self) -> Result<Vec<LocalVariable>> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != CallKind::LocalSig as u8 {
            return Err(malformed_error!(
                "Local signature - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            let mut modifiers = Vec::new();
            let mut pinned = false;

            while self.parser.has_more_data() {
                match self.parser.peek_byte()? {
                    ELEMENT_TYPE::CMOD_OPT | ELEMENT_TYPE::CMOD_REQD => {
                        self.parser.advance()?;
                        modifiers.push(self.parser.read_compressed_token()?);
                    }
                    ELEMENT_TYPE::PINNED => {
                        self.parser.advance()?;
                        pinned = true;
                    }
                    _ => break,
                }
            }

            locals.push(LocalVariable {
                modifiers,
                pinned,
                ty: self.decode_type()?,
            });
        }

        Ok(locals)
    }
}
