//! Metadata tokens.
//!
//! A token is a 32-bit row reference: the high byte selects the metadata table, the low 24 bits
//! carry the 1-based row id. Everything the debugger core needs to know about a token (its
//! table, whether it is the "not found" sentinel, whether it names the synthetic global type)
//! is computable from the raw value alone.
//!
//! # Examples
//!
//! ```rust
//! use corscope::metadata::token::{TableKind, Token};
//!
//! let token = Token::new(0x0600_0012);
//! assert_eq!(token.kind(), TableKind::MethodDef);
//! assert_eq!(token.row(), 0x12);
//! assert!(Token::NOT_FOUND.is_not_found());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use strum::{Display, EnumIter};

/// The metadata tables a debugger core deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TableKind {
    /// `0x00` - the Module table; row 0 doubles as the global type.
    Module,
    /// `0x01`
    TypeRef,
    /// `0x02`
    TypeDef,
    /// `0x04`
    FieldDef,
    /// `0x06`
    MethodDef,
    /// `0x08`
    ParamDef,
    /// `0x09`
    InterfaceImpl,
    /// `0x0A`
    MemberRef,
    /// `0x0C`
    CustomAttribute,
    /// `0x11`
    Signature,
    /// `0x17`
    Property,
    /// `0x1B`
    TypeSpec,
    /// `0x2A`
    GenericParam,
    /// `0x2B`
    MethodSpec,
    /// `0x72` - the synthetic base-type selector of compressed tokens.
    BaseType,
    /// Any other table.
    Other(u8),
}

/// A metadata token.
///
/// The default token is [`Token::GLOBAL`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Token(pub u32);

impl Token {
    /// Table prefix of TypeRef tokens.
    pub const TYPE_REF: u32 = 0x0100_0000;
    /// Table prefix of TypeDef tokens.
    pub const TYPE_DEF: u32 = 0x0200_0000;
    /// Table prefix of FieldDef tokens.
    pub const FIELD_DEF: u32 = 0x0400_0000;
    /// Table prefix of MethodDef tokens.
    pub const METHOD_DEF: u32 = 0x0600_0000;
    /// Table prefix of Property tokens.
    pub const PROPERTY: u32 = 0x1700_0000;
    /// Table prefix of TypeSpec tokens.
    pub const TYPE_SPEC: u32 = 0x1B00_0000;
    /// Table prefix of the base-type selector used in compressed tokens.
    pub const BASE_TYPE: u32 = 0x7200_0000;

    /// Sentinel returned by lookups that are expected to miss.
    pub const NOT_FOUND: Token = Token(0xFFFF_FFFF);
    /// The synthetic global type (`<Module>`).
    pub const GLOBAL: Token = Token(0);

    /// Create a token from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table prefix (for example [`Token::TYPE_DEF`]) and a row id.
    #[must_use]
    pub const fn from_parts(table: u32, row: u32) -> Self {
        Token(table | (row & 0x00FF_FFFF))
    }

    /// The raw 32-bit value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The row id.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true for the null token.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true for the [`Token::NOT_FOUND`] sentinel.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.0 == Self::NOT_FOUND.0
    }

    /// Returns true if the token has a table prefix but no row, as in `0x01000000`.
    #[must_use]
    pub const fn is_nil_row(&self) -> bool {
        self.row() == 0
    }

    /// Classify the token by its table byte.
    #[must_use]
    pub fn kind(&self) -> TableKind {
        match self.table() {
            0x00 => TableKind::Module,
            0x01 => TableKind::TypeRef,
            0x02 => TableKind::TypeDef,
            0x04 => TableKind::FieldDef,
            0x06 => TableKind::MethodDef,
            0x08 => TableKind::ParamDef,
            0x09 => TableKind::InterfaceImpl,
            0x0A => TableKind::MemberRef,
            0x0C => TableKind::CustomAttribute,
            0x11 => TableKind::Signature,
            0x17 => TableKind::Property,
            0x1B => TableKind::TypeSpec,
            0x2A => TableKind::GenericParam,
            0x2B => TableKind::MethodSpec,
            0x72 => TableKind::BaseType,
            other => TableKind::Other(other),
        }
    }

    /// Returns true if the token is a TypeDef.
    #[must_use]
    pub fn is_type_def(&self) -> bool {
        self.kind() == TableKind::TypeDef
    }

    /// Returns true if the token is a TypeRef.
    #[must_use]
    pub fn is_type_ref(&self) -> bool {
        self.kind() == TableKind::TypeRef
    }

    /// Returns true if the token is a TypeSpec.
    #[must_use]
    pub fn is_type_spec(&self) -> bool {
        self.kind() == TableKind::TypeSpec
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: {}, row: {})",
            self.0,
            self.kind(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_and_row() {
        let token = Token(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);

        let token = Token(0x06FF_FFFF);
        assert_eq!(token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn classification() {
        assert_eq!(Token(0x0200_0005).kind(), TableKind::TypeDef);
        assert_eq!(Token(0x0100_0005).kind(), TableKind::TypeRef);
        assert_eq!(Token(0x1B00_0001).kind(), TableKind::TypeSpec);
        assert_eq!(Token(0x0400_0001).kind(), TableKind::FieldDef);
        assert_eq!(Token(0x1700_0001).kind(), TableKind::Property);
        assert_eq!(Token(0x7200_0001).kind(), TableKind::BaseType);
        assert_eq!(Token(0x2300_0001).kind(), TableKind::Other(0x23));
        assert!(Token(0x0200_0001).is_type_def());
        assert!(!Token(0x0200_0001).is_type_ref());
    }

    #[test]
    fn sentinels() {
        assert!(Token::NOT_FOUND.is_not_found());
        assert!(!Token::NOT_FOUND.is_null());
        assert!(Token::GLOBAL.is_null());
        assert!(Token(0x0100_0000).is_nil_row());
        assert!(!Token(0x0100_0001).is_nil_row());
    }

    #[test]
    fn default_rows_point_at_the_global_type() {
        assert_eq!(Token::default(), Token::GLOBAL);

        let method = crate::metadata::importer::MethodProps::default();
        assert!(method.declaring_type.is_null());
        let property = crate::metadata::importer::PropertyProps::default();
        assert!(property.getter.is_null() && property.setter.is_null());
    }

    #[test]
    fn from_parts_masks_row() {
        let token = Token::from_parts(Token::TYPE_DEF, 0x0100_0003);
        assert_eq!(token.value(), 0x0200_0003);
    }

    #[test]
    fn conversions() {
        let value = 0x0600_0001u32;
        let token: Token = value.into();
        let back: u32 = token.into();
        assert_eq!(back, value);
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{}", Token(0x0600_0001)), "0x06000001");
        assert_eq!(
            format!("{:?}", Token(0x0200_0003)),
            "Token(0x02000003, table: TypeDef, row: 3)"
        );
    }

    #[test]
    fn hashing_uses_raw_value() {
        let mut set = HashSet::new();
        set.insert(Token(0x0600_0001));
        set.insert(Token(0x0600_0001));
        set.insert(Token(0x0600_0002));
        assert_eq!(set.len(), 2);
    }
}
