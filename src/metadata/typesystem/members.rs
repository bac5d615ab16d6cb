//! Methods, fields and properties of a [`crate::metadata::typesystem::MetadataType`].

use std::sync::Arc;

use widestring::U16String;

use crate::{
    blob::Parser,
    metadata::{
        customattributes::{probe_debug_attributes, DebugAttributes},
        importer::{ConstantBlob, FieldProps, MetadataImporter, MethodProps, PropertyProps},
        signatures::{
            decode_field_signature, decode_method_signature, Instantiation, MethodSignature,
            TypeDescriptor,
        },
        token::Token,
        typesystem::{FieldAttributes, MethodAttributes, ELEMENT_TYPE},
    },
    Result,
};

/// Name prefixes of compiler-emitted accessors and operators.
const ACCESSOR_PREFIXES: [&str; 3] = ["get_", "set_", "op_"];

/// A reference-counted method.
pub type MethodRc = Arc<MetadataMethod>;

/// A method definition.
pub struct MetadataMethod {
    token: Token,
    props: MethodProps,
    importer: Arc<dyn MetadataImporter>,
}

impl MetadataMethod {
    /// Read a method row.
    ///
    /// # Errors
    /// Propagates the importer's error for unknown rows.
    pub fn load(importer: &Arc<dyn MetadataImporter>, token: Token) -> Result<Self> {
        Ok(MetadataMethod {
            token,
            props: importer.method_props(token)?,
            importer: importer.clone(),
        })
    }

    /// The `MethodDef` token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.props.name
    }

    /// The declaring type's token.
    #[must_use]
    pub fn declaring_type(&self) -> Token {
        self.props.declaring_type
    }

    /// Attribute flags.
    #[must_use]
    pub fn flags(&self) -> MethodAttributes {
        MethodAttributes::from_bits_retain(self.props.flags)
    }

    /// Returns true for public methods.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags().is_public()
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags().contains(MethodAttributes::STATIC)
    }

    /// Returns true if the `SpecialName` flag is set.
    #[must_use]
    pub fn is_special_name(&self) -> bool {
        self.flags().contains(MethodAttributes::SPECIAL_NAME)
    }

    /// Returns true for special-name methods named like a property accessor or operator.
    #[must_use]
    pub fn is_property_or_operator(&self) -> bool {
        self.is_special_name()
            && ACCESSOR_PREFIXES
                .iter()
                .any(|prefix| self.props.name.starts_with(prefix))
    }

    /// The raw signature blob.
    #[must_use]
    pub fn signature_blob(&self) -> &[u8] {
        &self.props.signature
    }

    /// Decode the signature in the given generic context.
    ///
    /// # Errors
    /// Propagates decode errors.
    pub fn signature(&self, instantiation: &Instantiation) -> Result<MethodSignature> {
        decode_method_signature(&self.props.signature, instantiation)
    }

    /// Debugger markers on the method itself.
    #[must_use]
    pub fn debug_attributes(&self) -> DebugAttributes {
        probe_debug_attributes(self.importer.as_ref(), self.token)
    }
}

impl std::fmt::Debug for MetadataMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataMethod")
            .field("token", &self.token)
            .field("name", &self.props.name)
            .field("flags", &self.flags())
            .finish()
    }
}

/// A decoded default value.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ConstantValue {
    Bool(bool),
    Char(char),
    I1(i8),
    U1(u8),
    I2(i16),
    U2(u16),
    I4(i32),
    U4(u32),
    I8(i64),
    U8(u64),
    R4(f32),
    R8(f64),
    String(String),
    /// A null object reference
    Null,
}

impl ConstantValue {
    /// Decode a `Constant` table value.
    ///
    /// # Errors
    /// Returns an error if the value bytes are too short, or
    /// [`crate::Error::Malformed`] for a tag that cannot carry a constant.
    pub fn from_blob(blob: &ConstantBlob) -> Result<Self> {
        let mut parser = Parser::new(&blob.data);
        let value = match blob.element_type {
            ELEMENT_TYPE::BOOLEAN => ConstantValue::Bool(parser.read_le::<u8>()? != 0),
            ELEMENT_TYPE::CHAR => {
                let unit = parser.read_le::<u16>()?;
                ConstantValue::Char(
                    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
                )
            }
            ELEMENT_TYPE::I1 => ConstantValue::I1(parser.read_le::<i8>()?),
            ELEMENT_TYPE::U1 => ConstantValue::U1(parser.read_le::<u8>()?),
            ELEMENT_TYPE::I2 => ConstantValue::I2(parser.read_le::<i16>()?),
            ELEMENT_TYPE::U2 => ConstantValue::U2(parser.read_le::<u16>()?),
            ELEMENT_TYPE::I4 => ConstantValue::I4(parser.read_le::<i32>()?),
            ELEMENT_TYPE::U4 => ConstantValue::U4(parser.read_le::<u32>()?),
            ELEMENT_TYPE::I8 => ConstantValue::I8(parser.read_le::<i64>()?),
            ELEMENT_TYPE::U8 => ConstantValue::U8(parser.read_le::<u64>()?),
            ELEMENT_TYPE::R4 => ConstantValue::R4(parser.read_le::<f32>()?),
            ELEMENT_TYPE::R8 => ConstantValue::R8(parser.read_le::<f64>()?),
            ELEMENT_TYPE::STRING => {
                let mut units = Vec::with_capacity(blob.data.len() / 2);
                while parser.remaining() >= 2 {
                    units.push(parser.read_le::<u16>()?);
                }
                ConstantValue::String(U16String::from_vec(units).to_string_lossy())
            }
            ELEMENT_TYPE::CLASS => ConstantValue::Null,
            other => {
                return Err(malformed_error!(
                    "Constant of element type 0x{:02X} is not supported",
                    other
                ))
            }
        };

        Ok(value)
    }

    /// The value widened to `i128`, for integral and character constants.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ConstantValue::Bool(value) => Some(i128::from(*value)),
            ConstantValue::Char(value) => Some(i128::from(u32::from(*value))),
            ConstantValue::I1(value) => Some(i128::from(*value)),
            ConstantValue::U1(value) => Some(i128::from(*value)),
            ConstantValue::I2(value) => Some(i128::from(*value)),
            ConstantValue::U2(value) => Some(i128::from(*value)),
            ConstantValue::I4(value) => Some(i128::from(*value)),
            ConstantValue::U4(value) => Some(i128::from(*value)),
            ConstantValue::I8(value) => Some(i128::from(*value)),
            ConstantValue::U8(value) => Some(i128::from(*value)),
            _ => None,
        }
    }
}

/// A field definition.
pub struct MetadataField {
    token: Token,
    props: FieldProps,
}

impl MetadataField {
    /// Read a field row.
    ///
    /// # Errors
    /// Propagates the importer's error for unknown rows.
    pub fn load(importer: &Arc<dyn MetadataImporter>, token: Token) -> Result<Self> {
        Ok(MetadataField {
            token,
            props: importer.field_props(token)?,
        })
    }

    /// The `Field` token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.props.name
    }

    /// Attribute flags.
    #[must_use]
    pub fn flags(&self) -> FieldAttributes {
        FieldAttributes::from_bits_retain(self.props.flags)
    }

    /// Returns true for public fields.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags().is_public()
    }

    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags().contains(FieldAttributes::STATIC)
    }

    /// Returns true for compile-time constants.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags().contains(FieldAttributes::LITERAL)
    }

    /// Decode the field type in the given generic context.
    ///
    /// # Errors
    /// Propagates decode errors.
    pub fn field_type(&self, instantiation: &Instantiation) -> Result<TypeDescriptor> {
        decode_field_signature(&self.props.signature, instantiation)
    }

    /// Decode the default value, if the field has one.
    ///
    /// # Errors
    /// See [`ConstantValue::from_blob`].
    pub fn constant(&self) -> Result<Option<ConstantValue>> {
        self.props
            .constant
            .as_ref()
            .map(ConstantValue::from_blob)
            .transpose()
    }
}

impl std::fmt::Debug for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataField")
            .field("token", &self.token)
            .field("name", &self.props.name)
            .field("flags", &self.flags())
            .finish()
    }
}

/// A property definition with its accessors.
#[derive(Debug)]
pub struct MetadataProperty {
    token: Token,
    props: PropertyProps,
    getter: Option<MetadataMethod>,
    setter: Option<MetadataMethod>,
}

impl MetadataProperty {
    /// Read a property row and its accessor methods.
    ///
    /// # Errors
    /// Propagates the importer's error for unknown rows.
    pub fn load(importer: &Arc<dyn MetadataImporter>, token: Token) -> Result<Self> {
        let props = importer.property_props(token)?;
        let accessor = |token: Token| -> Result<Option<MetadataMethod>> {
            if token.is_not_found() || token.is_nil_row() {
                Ok(None)
            } else {
                MetadataMethod::load(importer, token).map(Some)
            }
        };

        Ok(MetadataProperty {
            token,
            getter: accessor(props.getter)?,
            setter: accessor(props.setter)?,
            props,
        })
    }

    /// The `Property` token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.props.name
    }

    /// The getter, if declared.
    #[must_use]
    pub fn getter(&self) -> Option<&MetadataMethod> {
        self.getter.as_ref()
    }

    /// The setter, if declared.
    #[must_use]
    pub fn setter(&self) -> Option<&MetadataMethod> {
        self.setter.as_ref()
    }

    fn accessors(&self) -> impl Iterator<Item = &MetadataMethod> {
        self.getter.iter().chain(self.setter.iter())
    }

    /// Public if any accessor is public.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.accessors().any(MetadataMethod::is_public)
    }

    /// Static if any accessor is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.accessors().any(MetadataMethod::is_static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(element_type: u8, data: &[u8]) -> ConstantBlob {
        ConstantBlob {
            element_type,
            data: data.to_vec(),
        }
    }

    #[test]
    fn integral_constants() {
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::I4, &[0xFE, 0xFF, 0xFF, 0xFF])).unwrap(),
            ConstantValue::I4(-2)
        );
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::U1, &[0x80])).unwrap(),
            ConstantValue::U1(0x80)
        );
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::U8, &[0xFF; 8]))
                .unwrap()
                .as_i128(),
            Some(i128::from(u64::MAX))
        );
    }

    #[test]
    fn utf16_constants() {
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::CHAR, &[0x41, 0x00])).unwrap(),
            ConstantValue::Char('A')
        );
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::STRING, &[0x68, 0x00, 0x69, 0x00]))
                .unwrap(),
            ConstantValue::String("hi".to_string())
        );
    }

    #[test]
    fn null_and_unsupported() {
        assert_eq!(
            ConstantValue::from_blob(&blob(ELEMENT_TYPE::CLASS, &[0, 0, 0, 0])).unwrap(),
            ConstantValue::Null
        );
        assert!(ConstantValue::from_blob(&blob(ELEMENT_TYPE::SZARRAY, &[])).is_err());
        assert!(ConstantValue::from_blob(&blob(ELEMENT_TYPE::I8, &[0x01])).is_err());
    }
}
