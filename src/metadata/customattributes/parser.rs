//! Payload parsing for the debugger display attributes.
//!
//! Only the constructor shapes the runtime defines for these attributes are understood: a
//! single `string` (or `System.Type`, which serializes as its name) for `DebuggerDisplay` and
//! `DebuggerTypeProxy`, and a single `DebuggerBrowsableState` for `DebuggerBrowsable`.

use crate::{
    blob::Parser,
    metadata::customattributes::{
        AttributeValue, DebuggerBrowsableState, DebuggerDisplay, DebuggerTypeProxy,
        NamedArgument, NAMED_FIELD, NAMED_PROPERTY, SERIALIZATION_TYPE,
    },
    Error::MalformedAttribute,
    Result,
};

const PROLOG: u16 = 0x0001;

/// Cursor over one custom attribute value blob.
pub struct AttributeBlobParser<'a> {
    parser: Parser<'a>,
}

impl<'a> AttributeBlobParser<'a> {
    /// Check the prolog and position the cursor on the first fixed argument.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedAttribute`] carrying the prolog value if it is not
    /// `0x0001`.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let prolog = parser.read_le::<u16>()?;
        if prolog != PROLOG {
            return Err(MalformedAttribute(prolog));
        }

        Ok(AttributeBlobParser { parser })
    }

    /// Read a fixed `string` or `System.Type` argument.
    ///
    /// # Errors
    /// Returns an error on truncated data or invalid UTF-8.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        self.parser.read_ser_string()
    }

    /// Read a fixed `int32`-backed argument.
    ///
    /// # Errors
    /// Returns an error on truncated data.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.parser.read_le::<i32>()
    }

    /// Read the named argument list that follows the fixed arguments.
    ///
    /// A blob that ends right after the fixed arguments has no named arguments.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown markers or value types.
    pub fn read_named_arguments(&mut self) -> Result<Vec<NamedArgument>> {
        if !self.parser.has_more_data() {
            return Ok(Vec::new());
        }

        let count = self.parser.read_le::<u16>()?;
        let mut named = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let is_field = match self.parser.read_le::<u8>()? {
                NAMED_FIELD => true,
                NAMED_PROPERTY => false,
                other => {
                    return Err(malformed_error!(
                        "Invalid field/property indicator: 0x{:02X}",
                        other
                    ))
                }
            };

            let mut type_tag = self.parser.read_le::<u8>()?;
            if type_tag == SERIALIZATION_TYPE::ENUM {
                // Enum type name, then an int32 underlying value
                self.parser.read_ser_string()?;
                type_tag = SERIALIZATION_TYPE::I4;
            }

            let name = self.parser.read_ser_string()?.unwrap_or_default();
            let value = self.read_value(type_tag)?;
            named.push(NamedArgument {
                is_field,
                name,
                value,
            });
        }

        Ok(named)
    }

    fn read_value(&mut self, type_tag: u8) -> Result<AttributeValue> {
        let value = match type_tag {
            SERIALIZATION_TYPE::BOOLEAN => AttributeValue::Bool(self.parser.read_le::<u8>()? != 0),
            SERIALIZATION_TYPE::I1 => AttributeValue::Int(i64::from(self.parser.read_le::<i8>()?)),
            SERIALIZATION_TYPE::U1 => AttributeValue::Int(i64::from(self.parser.read_le::<u8>()?)),
            SERIALIZATION_TYPE::I2 => AttributeValue::Int(i64::from(self.parser.read_le::<i16>()?)),
            SERIALIZATION_TYPE::CHAR | SERIALIZATION_TYPE::U2 => {
                AttributeValue::Int(i64::from(self.parser.read_le::<u16>()?))
            }
            SERIALIZATION_TYPE::I4 => AttributeValue::Int(i64::from(self.parser.read_le::<i32>()?)),
            SERIALIZATION_TYPE::U4 => AttributeValue::Int(i64::from(self.parser.read_le::<u32>()?)),
            SERIALIZATION_TYPE::I8 => AttributeValue::Int(self.parser.read_le::<i64>()?),
            SERIALIZATION_TYPE::U8 => AttributeValue::Int(self.parser.read_le::<u64>()? as i64),
            SERIALIZATION_TYPE::R4 => AttributeValue::Float(f64::from(self.parser.read_le::<f32>()?)),
            SERIALIZATION_TYPE::R8 => AttributeValue::Float(self.parser.read_le::<f64>()?),
            SERIALIZATION_TYPE::STRING | SERIALIZATION_TYPE::TYPE => {
                AttributeValue::String(self.parser.read_ser_string()?)
            }
            other => {
                return Err(malformed_error!(
                    "Unsupported named argument type: 0x{:02X}",
                    other
                ))
            }
        };

        Ok(value)
    }
}

fn named_string(named: &[NamedArgument], name: &str) -> Option<String> {
    named
        .iter()
        .find(|argument| argument.name == name)
        .and_then(|argument| match &argument.value {
            AttributeValue::String(value) => value.clone(),
            _ => None,
        })
}

/// Decode a `DebuggerDisplayAttribute` blob.
///
/// # Errors
/// Returns [`crate::Error::MalformedAttribute`] for a bad prolog, or a parse error.
pub fn parse_debugger_display(data: &[u8]) -> Result<DebuggerDisplay> {
    let mut blob = AttributeBlobParser::new(data)?;
    let value = blob.read_string()?;
    let named = blob.read_named_arguments()?;

    Ok(DebuggerDisplay {
        value,
        name: named_string(&named, "Name"),
        type_name: named_string(&named, "Type"),
    })
}

/// Decode a `DebuggerTypeProxyAttribute` blob.
///
/// # Errors
/// Returns [`crate::Error::MalformedAttribute`] for a bad prolog, or a parse error.
pub fn parse_debugger_type_proxy(data: &[u8]) -> Result<DebuggerTypeProxy> {
    let mut blob = AttributeBlobParser::new(data)?;
    let proxy_type_name = blob.read_string()?;
    let named = blob.read_named_arguments()?;

    Ok(DebuggerTypeProxy {
        proxy_type_name,
        target_type_name: named_string(&named, "TargetTypeName")
            .or_else(|| named_string(&named, "Target")),
    })
}

/// Decode a `DebuggerBrowsableAttribute` blob.
///
/// # Errors
/// Returns [`crate::Error::MalformedAttribute`] for a bad prolog, or
/// [`crate::Error::Malformed`] for a state value outside the enum.
pub fn parse_debugger_browsable(data: &[u8]) -> Result<DebuggerBrowsableState> {
    let mut blob = AttributeBlobParser::new(data)?;
    let state = blob.read_i32()?;

    DebuggerBrowsableState::from_value(state)
        .ok_or_else(|| malformed_error!("Invalid DebuggerBrowsableState - {}", state))
}
