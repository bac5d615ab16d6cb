//! Decoded signature shapes.
//!
//! [`TypeDescriptor`] owns its nested descriptors by value; types referenced by token are kept
//! symbolic ([`TypeDescriptor::ByToken`]) and resolved lazily through the type model.

use bitflags::bitflags;
use strum::Display;

use crate::{
    metadata::{token::Token, typesystem::ElementType},
    Result,
};

/// How a token-addressed type was introduced in the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TokenKind {
    /// `CLASS <token>`
    Class,
    /// `VALUETYPE <token>`
    ValueType,
    /// `CMOD_REQD <token>` or `CMOD_OPT <token>`
    Modifier {
        /// True for `CMOD_REQD`
        required: bool,
    },
}

/// Whether a generic parameter belongs to a type or to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum GenericOwner {
    /// `VAR` - a parameter of the enclosing type
    Type,
    /// `MVAR` - a parameter of the enclosing method
    Method,
}

/// A multi-dimensional array shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    /// Element type
    pub element: Box<TypeDescriptor>,
    /// Number of dimensions
    pub rank: u32,
    /// Declared sizes, at most `rank` entries
    pub sizes: Vec<u32>,
    /// Declared lower bounds, at most `rank` entries
    pub lower_bounds: Vec<u32>,
}

/// A decoded type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A primitive that needs no further bytes
    Primitive(ElementType),
    /// A type defined, referenced or specified elsewhere in metadata
    ByToken(TokenKind, Token),
    /// A general array
    Array(ArrayShape),
    /// A single-dimension, zero-based array
    SzArray(Box<TypeDescriptor>),
    /// An unmanaged pointer
    Pointer(Box<TypeDescriptor>),
    /// A managed reference
    ByRef(Box<TypeDescriptor>),
    /// A generic instantiation
    Generic {
        /// The open generic type
        base: Box<TypeDescriptor>,
        /// Type arguments, in declaration order
        args: Vec<TypeDescriptor>,
    },
    /// A generic parameter that was not substituted
    GenericParam {
        /// Position in the owner's parameter list
        index: u32,
        /// Type or method parameter
        owner: GenericOwner,
    },
    /// A function pointer
    FunctionPointer(Box<MethodSignature>),
}

impl TypeDescriptor {
    /// Shorthand for `TypeDescriptor::Primitive`.
    #[must_use]
    pub fn primitive(element: ElementType) -> Self {
        TypeDescriptor::Primitive(element)
    }

    /// Returns the token of a token-addressed type.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            TypeDescriptor::ByToken(_, token) => Some(*token),
            TypeDescriptor::Generic { base, .. } => base.token(),
            _ => None,
        }
    }

    /// Returns the primitive element type, if this is one.
    #[must_use]
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            TypeDescriptor::Primitive(element) => Some(*element),
            _ => None,
        }
    }

    /// Returns true for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(ElementType::Void))
    }
}

/// The calling convention kind held in the low nibble of the leading signature byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum CallKind {
    Default = 0x0,
    C = 0x1,
    StdCall = 0x2,
    ThisCall = 0x3,
    FastCall = 0x4,
    VarArg = 0x5,
    Field = 0x6,
    LocalSig = 0x7,
    Property = 0x8,
    Unmanaged = 0x9,
    GenericInst = 0xa,
    NativeVarArg = 0xb,
}

bitflags! {
    /// Modifier bits in the high nibble of the leading signature byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        /// A generic arity follows the calling convention byte
        const GENERIC = 0x10;
        /// The method has an implicit `this`
        const HAS_THIS = 0x20;
        /// `this` is passed explicitly as the first parameter
        const EXPLICIT_THIS = 0x40;
    }
}

/// The full calling convention of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallingConvention {
    /// Convention kind
    pub kind: CallKind,
    /// Modifier bits
    pub flags: CallFlags,
}

impl CallingConvention {
    /// A plain static method.
    pub const DEFAULT: CallingConvention = CallingConvention {
        kind: CallKind::Default,
        flags: CallFlags::empty(),
    };

    /// Split a leading signature byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved kinds `0xc..=0xf`.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let kind = match byte & 0x0f {
            0x0 => CallKind::Default,
            0x1 => CallKind::C,
            0x2 => CallKind::StdCall,
            0x3 => CallKind::ThisCall,
            0x4 => CallKind::FastCall,
            0x5 => CallKind::VarArg,
            0x6 => CallKind::Field,
            0x7 => CallKind::LocalSig,
            0x8 => CallKind::Property,
            0x9 => CallKind::Unmanaged,
            0xa => CallKind::GenericInst,
            0xb => CallKind::NativeVarArg,
            other => return Err(malformed_error!("Invalid calling convention - {}", other)),
        };

        Ok(CallingConvention {
            kind,
            flags: CallFlags::from_bits_truncate(byte),
        })
    }

    /// Pack back into a single byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.kind as u8 | self.flags.bits()
    }

    /// Returns true if the generic arity field is present.
    #[must_use]
    pub fn is_generic(self) -> bool {
        self.flags.contains(CallFlags::GENERIC)
    }

    /// Returns true if the method has an implicit `this`.
    #[must_use]
    pub fn has_this(self) -> bool {
        self.flags.contains(CallFlags::HAS_THIS)
    }
}

/// A decoded method (or function pointer) signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Number of generic parameters; 0 unless the `GENERIC` flag is set
    pub generic_arity: u32,
    /// Return type
    pub return_type: TypeDescriptor,
    /// Parameters, fixed and variadic
    pub params: Vec<TypeDescriptor>,
    /// Index into `params` where the variadic arguments begin
    pub sentinel_index: Option<usize>,
}

impl MethodSignature {
    /// The fixed parameters, before the vararg boundary.
    #[must_use]
    pub fn fixed_params(&self) -> &[TypeDescriptor] {
        match self.sentinel_index {
            Some(index) if index <= self.params.len() => &self.params[..index],
            _ => &self.params,
        }
    }

    /// The variadic parameters, after the vararg boundary.
    #[must_use]
    pub fn vararg_params(&self) -> &[TypeDescriptor] {
        match self.sentinel_index {
            Some(index) if index <= self.params.len() => &self.params[index..],
            _ => &[],
        }
    }
}

/// A decoded local variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    /// Custom modifiers preceding the type
    pub modifiers: Vec<Token>,
    /// The local is pinned
    pub pinned: bool,
    /// Local type
    pub ty: TypeDescriptor,
}

/// The generic arguments substituted for `VAR` positions while decoding.
///
/// The empty instantiation is a shared singleton, see [`Instantiation::empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Instantiation {
    type_args: Vec<TypeDescriptor>,
}

static EMPTY_INSTANTIATION: Instantiation = Instantiation {
    type_args: Vec::new(),
};

impl Instantiation {
    /// Create an instantiation from concrete type arguments.
    #[must_use]
    pub fn new(type_args: Vec<TypeDescriptor>) -> Self {
        Instantiation { type_args }
    }

    /// The shared empty instantiation.
    #[must_use]
    pub fn empty() -> &'static Instantiation {
        &EMPTY_INSTANTIATION
    }

    /// The type arguments.
    #[must_use]
    pub fn type_args(&self) -> &[TypeDescriptor] {
        &self.type_args
    }

    /// The argument at `index`, if bound.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&TypeDescriptor> {
        self.type_args.get(index as usize)
    }

    /// Returns true if no arguments are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty()
    }
}
