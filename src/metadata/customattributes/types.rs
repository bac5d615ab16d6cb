//! Debugger-relevant attribute markers and their decoded payloads.

use bitflags::bitflags;
use strum::{Display, EnumIter};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Serialization type tags of named custom attribute arguments (ECMA-335 II.23.3)
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const TYPE: u8 = 0x50;
    pub const ENUM: u8 = 0x55;
}

/// Named argument marker for fields.
pub const NAMED_FIELD: u8 = 0x53;
/// Named argument marker for properties.
pub const NAMED_PROPERTY: u8 = 0x54;

bitflags! {
    /// The fixed set of attributes the stepper and the value formatter look for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugAttributes: u16 {
        /// `System.Diagnostics.DebuggerTypeProxyAttribute`
        const TYPE_PROXY = 0x0001;
        /// `System.Diagnostics.DebuggerDisplayAttribute`
        const DISPLAY = 0x0002;
        /// `System.Diagnostics.DebuggerBrowsableAttribute`
        const BROWSABLE = 0x0004;
        /// `System.Runtime.CompilerServices.CompilerGeneratedAttribute`
        const COMPILER_GENERATED = 0x0008;
        /// `System.Diagnostics.DebuggerHiddenAttribute`
        const HIDDEN = 0x0010;
        /// `System.Diagnostics.DebuggerStepThroughAttribute`
        const STEP_THROUGH = 0x0020;
        /// `System.Diagnostics.DebuggerNonUserCodeAttribute`
        const NON_USER_CODE = 0x0040;
        /// `System.Diagnostics.DebuggerStepperBoundaryAttribute`
        const STEPPER_BOUNDARY = 0x0080;
    }
}

impl DebugAttributes {
    /// Every marker with its attribute's full type name.
    pub const NAMES: [(DebugAttributes, &'static str); 8] = [
        (
            DebugAttributes::TYPE_PROXY,
            "System.Diagnostics.DebuggerTypeProxyAttribute",
        ),
        (
            DebugAttributes::DISPLAY,
            "System.Diagnostics.DebuggerDisplayAttribute",
        ),
        (
            DebugAttributes::BROWSABLE,
            "System.Diagnostics.DebuggerBrowsableAttribute",
        ),
        (
            DebugAttributes::COMPILER_GENERATED,
            "System.Runtime.CompilerServices.CompilerGeneratedAttribute",
        ),
        (
            DebugAttributes::HIDDEN,
            "System.Diagnostics.DebuggerHiddenAttribute",
        ),
        (
            DebugAttributes::STEP_THROUGH,
            "System.Diagnostics.DebuggerStepThroughAttribute",
        ),
        (
            DebugAttributes::NON_USER_CODE,
            "System.Diagnostics.DebuggerNonUserCodeAttribute",
        ),
        (
            DebugAttributes::STEPPER_BOUNDARY,
            "System.Diagnostics.DebuggerStepperBoundaryAttribute",
        ),
    ];

    /// The attribute type name of a single marker.
    #[must_use]
    pub fn attribute_name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map(|(_, name)| *name)
    }
}

/// A scalar value of a named argument.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// `bool`
    Bool(bool),
    /// Any integral type, or the underlying value of an enum
    Int(i64),
    /// `float` or `double`
    Float(f64),
    /// `string` or `System.Type`; `None` for a null string
    String(Option<String>),
}

/// A named field or property assignment in an attribute blob.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    /// True for a field, false for a property
    pub is_field: bool,
    /// Member name
    pub name: String,
    /// Assigned value
    pub value: AttributeValue,
}

/// Decoded `DebuggerDisplayAttribute`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebuggerDisplay {
    /// The display format string
    pub value: Option<String>,
    /// `Name` named argument
    pub name: Option<String>,
    /// `Type` named argument
    pub type_name: Option<String>,
}

/// Decoded `DebuggerTypeProxyAttribute`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebuggerTypeProxy {
    /// Assembly-qualified name of the proxy type
    pub proxy_type_name: Option<String>,
    /// `TargetTypeName` named argument, or the name from `Target`
    pub target_type_name: Option<String>,
}

/// `System.Diagnostics.DebuggerBrowsableState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum DebuggerBrowsableState {
    /// Never show the element
    Never,
    /// Show the element collapsed
    Collapsed,
    /// Show the element's children instead of the element
    RootHidden,
}

impl DebuggerBrowsableState {
    /// Map the serialized value; unknown values are rejected.
    #[must_use]
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(DebuggerBrowsableState::Never),
            2 => Some(DebuggerBrowsableState::Collapsed),
            3 => Some(DebuggerBrowsableState::RootHidden),
            _ => None,
        }
    }
}
