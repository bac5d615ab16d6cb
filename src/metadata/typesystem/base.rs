//! Element type tags and the primitive lookup table.
//!
//! [`ELEMENT_TYPE`] holds the raw signature tag bytes (including the three native-image tags the
//! runtime emits in precompiled signatures). [`ElementType`] is the closed, typed view of those
//! tags; its [`ElementType::clr_name`] is the process-wide element-type to CLR type-name map.

use strum::{Display, EnumIter};

use crate::{Error, Result};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Possible bytes that represent the element types of a signature - from coreclr
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter of the enclosing type, followed by its index
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter of the enclosing method, followed by its index
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    // Native image only: value type wrapper, followed by type
    pub const NATIVE_VALUETYPE_ZAPSIG: u8 = 0x3c;
    // Native image only: array template, followed by type
    pub const NATIVE_ARRAY_TEMPLATE_ZAPSIG: u8 = 0x3d;
    // Native image only: the shared-generics canonical type
    pub const CANON_ZAPSIG: u8 = 0x3e;
    // Or’d with following element types
    pub const MODIFIER: u8 = 0x40;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

/// The closed set of element types a signature can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ElementType {
    Void = ELEMENT_TYPE::VOID,
    Boolean = ELEMENT_TYPE::BOOLEAN,
    Char = ELEMENT_TYPE::CHAR,
    I1 = ELEMENT_TYPE::I1,
    U1 = ELEMENT_TYPE::U1,
    I2 = ELEMENT_TYPE::I2,
    U2 = ELEMENT_TYPE::U2,
    I4 = ELEMENT_TYPE::I4,
    U4 = ELEMENT_TYPE::U4,
    I8 = ELEMENT_TYPE::I8,
    U8 = ELEMENT_TYPE::U8,
    R4 = ELEMENT_TYPE::R4,
    R8 = ELEMENT_TYPE::R8,
    String = ELEMENT_TYPE::STRING,
    Ptr = ELEMENT_TYPE::PTR,
    ByRef = ELEMENT_TYPE::BYREF,
    ValueType = ELEMENT_TYPE::VALUETYPE,
    Class = ELEMENT_TYPE::CLASS,
    Var = ELEMENT_TYPE::VAR,
    Array = ELEMENT_TYPE::ARRAY,
    GenericInst = ELEMENT_TYPE::GENERICINST,
    TypedByRef = ELEMENT_TYPE::TYPEDBYREF,
    I = ELEMENT_TYPE::I,
    U = ELEMENT_TYPE::U,
    FnPtr = ELEMENT_TYPE::FNPTR,
    Object = ELEMENT_TYPE::OBJECT,
    SzArray = ELEMENT_TYPE::SZARRAY,
    MVar = ELEMENT_TYPE::MVAR,
    CModReqd = ELEMENT_TYPE::CMOD_REQD,
    CModOpt = ELEMENT_TYPE::CMOD_OPT,
    Internal = ELEMENT_TYPE::INTERNAL,
    NativeValueTypeZapSig = ELEMENT_TYPE::NATIVE_VALUETYPE_ZAPSIG,
    NativeArrayTemplateZapSig = ELEMENT_TYPE::NATIVE_ARRAY_TEMPLATE_ZAPSIG,
    CanonZapSig = ELEMENT_TYPE::CANON_ZAPSIG,
    Sentinel = ELEMENT_TYPE::SENTINEL,
    Pinned = ELEMENT_TYPE::PINNED,
}

impl ElementType {
    /// Returns true for tags that stand on their own and need no further bytes.
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ElementType::Void
                | ElementType::Boolean
                | ElementType::Char
                | ElementType::I1
                | ElementType::U1
                | ElementType::I2
                | ElementType::U2
                | ElementType::I4
                | ElementType::U4
                | ElementType::I8
                | ElementType::U8
                | ElementType::R4
                | ElementType::R8
                | ElementType::String
                | ElementType::I
                | ElementType::U
                | ElementType::Object
                | ElementType::TypedByRef
        )
    }

    /// Returns true for the integral types an enum may be backed by.
    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ElementType::Boolean
                | ElementType::Char
                | ElementType::I1
                | ElementType::U1
                | ElementType::I2
                | ElementType::U2
                | ElementType::I4
                | ElementType::U4
                | ElementType::I8
                | ElementType::U8
                | ElementType::I
                | ElementType::U
        )
    }

    /// Full CLR type name of a primitive element type.
    #[must_use]
    pub fn clr_name(self) -> Option<&'static str> {
        let name = match self {
            ElementType::Void => "System.Void",
            ElementType::Boolean => "System.Boolean",
            ElementType::Char => "System.Char",
            ElementType::I1 => "System.SByte",
            ElementType::U1 => "System.Byte",
            ElementType::I2 => "System.Int16",
            ElementType::U2 => "System.UInt16",
            ElementType::I4 => "System.Int32",
            ElementType::U4 => "System.UInt32",
            ElementType::I8 => "System.Int64",
            ElementType::U8 => "System.UInt64",
            ElementType::R4 => "System.Single",
            ElementType::R8 => "System.Double",
            ElementType::String => "System.String",
            ElementType::I => "System.IntPtr",
            ElementType::U => "System.UIntPtr",
            ElementType::Object => "System.Object",
            ElementType::TypedByRef => "System.TypedReference",
            _ => return None,
        };
        Some(name)
    }

    /// Width in bytes of a fixed-size primitive, as stored in a constant blob.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            ElementType::Boolean | ElementType::I1 | ElementType::U1 => Some(1),
            ElementType::Char | ElementType::I2 | ElementType::U2 => Some(2),
            ElementType::I4 | ElementType::U4 | ElementType::R4 => Some(4),
            ElementType::I8 | ElementType::U8 | ElementType::R8 => Some(8),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ElementType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        let element = match value {
            ELEMENT_TYPE::VOID => ElementType::Void,
            ELEMENT_TYPE::BOOLEAN => ElementType::Boolean,
            ELEMENT_TYPE::CHAR => ElementType::Char,
            ELEMENT_TYPE::I1 => ElementType::I1,
            ELEMENT_TYPE::U1 => ElementType::U1,
            ELEMENT_TYPE::I2 => ElementType::I2,
            ELEMENT_TYPE::U2 => ElementType::U2,
            ELEMENT_TYPE::I4 => ElementType::I4,
            ELEMENT_TYPE::U4 => ElementType::U4,
            ELEMENT_TYPE::I8 => ElementType::I8,
            ELEMENT_TYPE::U8 => ElementType::U8,
            ELEMENT_TYPE::R4 => ElementType::R4,
            ELEMENT_TYPE::R8 => ElementType::R8,
            ELEMENT_TYPE::STRING => ElementType::String,
            ELEMENT_TYPE::PTR => ElementType::Ptr,
            ELEMENT_TYPE::BYREF => ElementType::ByRef,
            ELEMENT_TYPE::VALUETYPE => ElementType::ValueType,
            ELEMENT_TYPE::CLASS => ElementType::Class,
            ELEMENT_TYPE::VAR => ElementType::Var,
            ELEMENT_TYPE::ARRAY => ElementType::Array,
            ELEMENT_TYPE::GENERICINST => ElementType::GenericInst,
            ELEMENT_TYPE::TYPEDBYREF => ElementType::TypedByRef,
            ELEMENT_TYPE::I => ElementType::I,
            ELEMENT_TYPE::U => ElementType::U,
            ELEMENT_TYPE::FNPTR => ElementType::FnPtr,
            ELEMENT_TYPE::OBJECT => ElementType::Object,
            ELEMENT_TYPE::SZARRAY => ElementType::SzArray,
            ELEMENT_TYPE::MVAR => ElementType::MVar,
            ELEMENT_TYPE::CMOD_REQD => ElementType::CModReqd,
            ELEMENT_TYPE::CMOD_OPT => ElementType::CModOpt,
            ELEMENT_TYPE::INTERNAL => ElementType::Internal,
            ELEMENT_TYPE::NATIVE_VALUETYPE_ZAPSIG => ElementType::NativeValueTypeZapSig,
            ELEMENT_TYPE::NATIVE_ARRAY_TEMPLATE_ZAPSIG => ElementType::NativeArrayTemplateZapSig,
            ELEMENT_TYPE::CANON_ZAPSIG => ElementType::CanonZapSig,
            ELEMENT_TYPE::SENTINEL => ElementType::Sentinel,
            ELEMENT_TYPE::PINNED => ElementType::Pinned,
            other => return Err(Error::UnsupportedSignatureElement(other)),
        };
        Ok(element)
    }
}
