//! The metadata importer capability.
//!
//! The debugger core never reads metadata tables itself. Every row it needs is fetched by raw
//! token through [`MetadataImporter`], which the host implements over whatever metadata source
//! it has (a live runtime's importer interface, a parsed PE image, or a test fake). The property
//! records below carry exactly the columns the type model consumes.

use crate::{metadata::token::Token, Result};

/// Columns of a `TypeDef` row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDefProps {
    /// Namespace-qualified name as stored by the importer (`Namespace.Name`).
    pub name: String,
    /// Raw `TypeAttributes`.
    pub flags: u32,
    /// The `extends` token (TypeDef, TypeRef or TypeSpec), or a nil row.
    pub extends: Token,
}

/// Columns of a `TypeRef` row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRefProps {
    /// Namespace-qualified name.
    pub name: String,
    /// Module, assembly or enclosing type reference.
    pub resolution_scope: Token,
}

/// Columns of a `MethodDef` row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodProps {
    /// Owning type.
    pub declaring_type: Token,
    /// Simple name.
    pub name: String,
    /// Raw `MethodAttributes`.
    pub flags: u32,
    /// Method signature blob.
    pub signature: Vec<u8>,
}

/// A default value stored in the `Constant` table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstantBlob {
    /// `ELEMENT_TYPE` tag of the value.
    pub element_type: u8,
    /// Little-endian value bytes; UTF-16LE for strings.
    pub data: Vec<u8>,
}

/// Columns of a `Field` row, with its default value if it has one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldProps {
    /// Owning type.
    pub declaring_type: Token,
    /// Simple name.
    pub name: String,
    /// Raw `FieldAttributes`.
    pub flags: u32,
    /// Field signature blob.
    pub signature: Vec<u8>,
    /// Default value for literal fields.
    pub constant: Option<ConstantBlob>,
}

/// Columns of a `Property` row and its accessors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyProps {
    /// Owning type.
    pub declaring_type: Token,
    /// Simple name.
    pub name: String,
    /// Property signature blob.
    pub signature: Vec<u8>,
    /// `get_` accessor, or [`Token::NOT_FOUND`].
    pub getter: Token,
    /// `set_` accessor, or [`Token::NOT_FOUND`].
    pub setter: Token,
}

/// Token-addressed access to one module's metadata.
///
/// Lookups that assume validity (`*_props`) fail with [`crate::Error::InvalidToken`] or
/// [`crate::Error::NotFound`]; lookups that are expected to miss return `None`.
pub trait MetadataImporter: Send + Sync {
    /// Returns true if `token` names an existing row.
    fn is_valid_token(&self, token: Token) -> bool;

    /// Read a `TypeDef` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn type_def_props(&self, token: Token) -> Result<TypeDefProps>;

    /// Read a `TypeRef` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn type_ref_props(&self, token: Token) -> Result<TypeRefProps>;

    /// Read the signature blob of a `TypeSpec` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn type_spec_blob(&self, token: Token) -> Result<Vec<u8>>;

    /// The enclosing type of a nested `TypeDef`, if any.
    fn enclosing_class(&self, token: Token) -> Option<Token>;

    /// Read a `MethodDef` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn method_props(&self, token: Token) -> Result<MethodProps>;

    /// Read a `Field` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn field_props(&self, token: Token) -> Result<FieldProps>;

    /// Read a `Property` row.
    ///
    /// # Errors
    /// Fails if the row does not exist.
    fn property_props(&self, token: Token) -> Result<PropertyProps>;

    /// Fields declared by a type, in table order.
    fn enum_fields(&self, type_token: Token) -> Vec<Token>;

    /// Methods declared by a type, in table order.
    fn enum_methods(&self, type_token: Token) -> Vec<Token>;

    /// Properties declared by a type, in table order.
    fn enum_properties(&self, type_token: Token) -> Vec<Token>;

    /// Interfaces a type implements directly.
    fn enum_interfaces(&self, type_token: Token) -> Vec<Token>;

    /// Names of the generic parameters of a type or method, in position order.
    fn enum_generic_params(&self, owner: Token) -> Vec<String>;

    /// The value blob of the custom attribute `attribute_name` applied to `owner`.
    fn custom_attribute_by_name(&self, owner: Token, attribute_name: &str) -> Option<Vec<u8>>;

    /// Find a `TypeDef` by namespace-qualified name inside `enclosing` ([`Token::GLOBAL`] for
    /// top-level types).
    fn find_type_def_by_name(&self, name: &str, enclosing: Token) -> Option<Token>;
}
