//! Lazy, token-addressed type model.
//!
//! A [`MetadataType`] is a view over one `TypeDef`/`TypeRef` token (plus generic arguments for
//! instantiated types). Its row is fetched from the [`MetadataImporter`] on first access and
//! kept for the lifetime of the view; members are enumerated on demand. The [`TypeModel`]
//! caches resolved types, methods and method signatures per module, keyed by token.
//!
//! Only the parts of reflection the breakpoint binder and the stepper need are modelled:
//! names, base types, member enumeration with visibility filtering, enum introspection and
//! detection of the debugger attributes.
//!
//! # Examples
//!
//! ```rust,ignore
//! use corscope::metadata::typesystem::{BindingFlags, TypeModel};
//!
//! let model = TypeModel::new(importer);
//! let ty = model.resolve_type(token)?;
//! println!("{}", ty.full_name()?);
//! for method in ty.methods(BindingFlags::PUBLIC | BindingFlags::INSTANCE)? {
//!     println!("  {}", method.name());
//! }
//! ```

mod base;
mod flags;
mod members;
mod registry;

use std::sync::{Arc, OnceLock};

pub use base::{ElementType, ELEMENT_TYPE};
pub use flags::{BindingFlags, FieldAttributes, MethodAttributes, TypeAttributes};
pub use members::{
    ConstantValue, MetadataField, MetadataMethod, MetadataProperty, MethodRc,
};
pub use registry::TypeModel;

use crate::{
    metadata::{
        customattributes::{
            parse_debugger_display, parse_debugger_type_proxy, probe_debug_attributes,
            DebugAttributes, DebuggerDisplay, DebuggerTypeProxy,
        },
        importer::MetadataImporter,
        signatures::{decode_type_with, GenericOwner, Instantiation, TypeDescriptor},
        token::{TableKind, Token},
    },
    Error::{InvalidToken, NotSupported, RecursionLimit},
    Result,
};

/// Full name of the base class of every enum.
pub const ENUM_BASE_TYPE: &str = "System.Enum";
/// Full name of the base class of every value type.
pub const VALUE_TYPE_BASE_TYPE: &str = "System.ValueType";
/// Attribute marking flags enums.
pub const FLAGS_ATTRIBUTE: &str = "System.FlagsAttribute";

const MAX_NESTING_DEPTH: usize = 64;

/// A reference-counted type view.
pub type TypeRc = Arc<MetadataType>;

/// One named value of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    /// Field name
    pub name: String,
    /// Literal value
    pub value: ConstantValue,
}

struct TypeInfo {
    name: String,
    namespace: String,
    flags: TypeAttributes,
    extends: Token,
    enclosing: Option<Token>,
}

/// A lazy view over a type token.
pub struct MetadataType {
    token: Token,
    type_args: Vec<TypeDescriptor>,
    importer: Arc<dyn MetadataImporter>,
    info: OnceLock<TypeInfo>,
}

impl MetadataType {
    /// Create a view over a `TypeDef` or `TypeRef` token, or [`Token::GLOBAL`].
    #[must_use]
    pub fn new(token: Token, importer: Arc<dyn MetadataImporter>) -> Self {
        MetadataType::instantiated(token, Vec::new(), importer)
    }

    /// Create a view over a generic type definition bound to `type_args`.
    #[must_use]
    pub fn instantiated(
        token: Token,
        type_args: Vec<TypeDescriptor>,
        importer: Arc<dyn MetadataImporter>,
    ) -> Self {
        MetadataType {
            token,
            type_args,
            importer,
            info: OnceLock::new(),
        }
    }

    /// Create a view over a decoded type, as found in a `TypeSpec`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for shapes that have no definition token, such
    /// as arrays and pointers.
    pub fn from_descriptor(
        descriptor: TypeDescriptor,
        importer: Arc<dyn MetadataImporter>,
    ) -> Result<Self> {
        match descriptor {
            TypeDescriptor::ByToken(_, token) => Ok(MetadataType::new(token, importer)),
            TypeDescriptor::Generic { base, args } => match base.token() {
                Some(token) => Ok(MetadataType::instantiated(token, args, importer)),
                None => Err(NotSupported(format!("generic base {:?}", base))),
            },
            other => Err(NotSupported(format!("type view over {:?}", other))),
        }
    }

    /// The definition or reference token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Returns true for the synthetic global type.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.token.is_null()
    }

    fn info(&self) -> Result<&TypeInfo> {
        if let Some(info) = self.info.get() {
            return Ok(info);
        }

        let info = self.load_info()?;
        Ok(self.info.get_or_init(|| info))
    }

    fn load_info(&self) -> Result<TypeInfo> {
        let (qualified, flags, extends, enclosing) = match self.token.kind() {
            TableKind::Module if self.token.is_null() => {
                (String::new(), TypeAttributes::empty(), Token::NOT_FOUND, None)
            }
            TableKind::TypeDef => {
                let props = self.importer.type_def_props(self.token)?;
                let flags = TypeAttributes::from_bits_retain(props.flags);
                let mut name = props.name;
                if name.is_empty() {
                    if let Ok(reference) = self.importer.type_ref_props(self.token) {
                        name = reference.name;
                    }
                }
                let enclosing = if flags.is_nested() {
                    self.importer.enclosing_class(self.token)
                } else {
                    None
                };
                (name, flags, props.extends, enclosing)
            }
            TableKind::TypeRef => {
                let props = self.importer.type_ref_props(self.token)?;
                let enclosing = props
                    .resolution_scope
                    .is_type_ref()
                    .then_some(props.resolution_scope);
                (props.name, TypeAttributes::empty(), Token::NOT_FOUND, enclosing)
            }
            _ => return Err(InvalidToken(self.token)),
        };

        let (namespace, name) = match qualified.rfind('.') {
            Some(split) if enclosing.is_none() => (
                qualified[..split].to_string(),
                qualified[split + 1..].to_string(),
            ),
            _ => (String::new(), qualified),
        };

        Ok(TypeInfo {
            name,
            namespace,
            flags,
            extends,
            enclosing,
        })
    }

    /// Simple name, without namespace or enclosing type.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn name(&self) -> Result<&str> {
        Ok(&self.info()?.name)
    }

    /// Namespace; nested types report their outermost type's namespace.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn namespace(&self) -> Result<String> {
        let info = self.info()?;
        match info.enclosing {
            Some(outer) => self.view(outer).namespace(),
            None => Ok(info.namespace.clone()),
        }
    }

    /// Type attribute flags (empty for references).
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn flags(&self) -> Result<TypeAttributes> {
        Ok(self.info()?.flags)
    }

    /// The enclosing type of a nested type.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn declaring_type(&self) -> Result<Option<MetadataType>> {
        Ok(self.info()?.enclosing.map(|outer| self.view(outer)))
    }

    /// Full name: namespace, enclosing types joined with `+`, and generic arguments.
    ///
    /// # Errors
    /// Propagates importer errors, or [`crate::Error::RecursionLimit`] for a cyclic nesting
    /// chain.
    pub fn full_name(&self) -> Result<String> {
        let mut full_name = self.definition_name(0)?;
        if !self.type_args.is_empty() {
            let args = self
                .type_args
                .iter()
                .map(|arg| type_name(&self.importer, arg))
                .collect::<Result<Vec<_>>>()?;
            full_name.push('<');
            full_name.push_str(&args.join(","));
            full_name.push('>');
        }

        Ok(full_name)
    }

    fn definition_name(&self, depth: usize) -> Result<String> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }

        let info = self.info()?;
        Ok(match info.enclosing {
            Some(outer) => format!(
                "{}+{}",
                self.view(outer).definition_name(depth + 1)?,
                info.name
            ),
            None if info.namespace.is_empty() => info.name.clone(),
            None => format!("{}.{}", info.namespace, info.name),
        })
    }

    /// Bound generic arguments of an instantiated type.
    #[must_use]
    pub fn generic_arguments(&self) -> &[TypeDescriptor] {
        &self.type_args
    }

    /// Declared generic parameter names.
    #[must_use]
    pub fn generic_parameter_names(&self) -> Vec<String> {
        self.importer.enum_generic_params(self.token)
    }

    /// The base type, following `TypeDef`, `TypeRef` and `TypeSpec` extends tokens.
    ///
    /// References and the global type have no known base type.
    ///
    /// # Errors
    /// Propagates importer and decode errors.
    pub fn base_type(&self) -> Result<Option<MetadataType>> {
        let extends = self.info()?.extends;
        if extends.is_nil_row() || extends.is_not_found() {
            return Ok(None);
        }

        match extends.kind() {
            TableKind::TypeDef | TableKind::TypeRef => Ok(Some(self.view(extends))),
            TableKind::TypeSpec => {
                let blob = self.importer.type_spec_blob(extends)?;
                let instantiation = Instantiation::new(self.type_args.clone());
                let (descriptor, _) = decode_type_with(&blob, &instantiation)?;
                MetadataType::from_descriptor(descriptor, self.importer.clone()).map(Some)
            }
            _ => Err(InvalidToken(extends)),
        }
    }

    fn base_type_name(&self) -> Result<Option<String>> {
        self.base_type()?
            .map(|base| base.full_name())
            .transpose()
    }

    /// Fields passing `filter`.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn fields(&self, filter: BindingFlags) -> Result<Vec<MetadataField>> {
        let mut fields = Vec::new();
        for token in self.importer.enum_fields(self.token) {
            let field = MetadataField::load(&self.importer, token)?;
            if filter.accepts(field.is_public(), field.is_static()) {
                fields.push(field);
            }
        }
        Ok(fields)
    }

    /// Methods passing `filter`.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn methods(&self, filter: BindingFlags) -> Result<Vec<MetadataMethod>> {
        let mut methods = Vec::new();
        for token in self.importer.enum_methods(self.token) {
            let method = MetadataMethod::load(&self.importer, token)?;
            if filter.accepts(method.is_public(), method.is_static()) {
                methods.push(method);
            }
        }
        Ok(methods)
    }

    /// Properties passing `filter`, judged by their accessors.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn properties(&self, filter: BindingFlags) -> Result<Vec<MetadataProperty>> {
        let mut properties = Vec::new();
        for token in self.importer.enum_properties(self.token) {
            let property = MetadataProperty::load(&self.importer, token)?;
            if filter.accepts(property.is_public(), property.is_static()) {
                properties.push(property);
            }
        }
        Ok(properties)
    }

    /// Directly implemented interfaces.
    ///
    /// # Errors
    /// Propagates importer and decode errors.
    pub fn interfaces(&self) -> Result<Vec<MetadataType>> {
        self.importer
            .enum_interfaces(self.token)
            .into_iter()
            .map(|token| match token.kind() {
                TableKind::TypeSpec => {
                    let blob = self.importer.type_spec_blob(token)?;
                    let instantiation = Instantiation::new(self.type_args.clone());
                    let (descriptor, _) = decode_type_with(&blob, &instantiation)?;
                    MetadataType::from_descriptor(descriptor, self.importer.clone())
                }
                _ => Ok(self.view(token)),
            })
            .collect()
    }

    /// Returns true for interfaces.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn is_interface(&self) -> Result<bool> {
        Ok(self.info()?.flags.contains(TypeAttributes::INTERFACE))
    }

    /// Returns true if the base type is `System.Enum`.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn is_enum(&self) -> Result<bool> {
        Ok(self.base_type_name()?.as_deref() == Some(ENUM_BASE_TYPE))
    }

    /// Returns true for enums and other value types.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn is_value_type(&self) -> Result<bool> {
        match self.base_type_name()?.as_deref() {
            Some(ENUM_BASE_TYPE) => Ok(true),
            Some(VALUE_TYPE_BASE_TYPE) => Ok(self.full_name()? != ENUM_BASE_TYPE),
            _ => Ok(false),
        }
    }

    /// Returns true for reference types that are not interfaces.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn is_class(&self) -> Result<bool> {
        Ok(!self.is_interface()? && !self.is_value_type()?)
    }

    /// Returns true for enums marked with `System.FlagsAttribute`.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn is_flags_enum(&self) -> Result<bool> {
        Ok(self.is_enum()?
            && self
                .importer
                .custom_attribute_by_name(self.token, FLAGS_ATTRIBUTE)
                .is_some())
    }

    /// The primitive storage type of an enum, read from its single instance field.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type has no instance field or the field is
    /// not a primitive.
    pub fn enum_underlying_type(&self) -> Result<ElementType> {
        let instance_fields = self.fields(BindingFlags::PUBLIC
            | BindingFlags::NON_PUBLIC
            | BindingFlags::INSTANCE)?;
        let field = instance_fields.first().ok_or_else(|| {
            malformed_error!("Type {} has no instance field", self.token)
        })?;

        match field.field_type(Instantiation::empty())? {
            TypeDescriptor::Primitive(element) => Ok(element),
            other => Err(malformed_error!(
                "Enum storage field {} is not a primitive - {:?}",
                field.name(),
                other
            )),
        }
    }

    /// Literal static fields with their values, sorted ascending by numeric value.
    ///
    /// # Errors
    /// Propagates importer and constant decoding errors.
    pub fn enum_values(&self) -> Result<Vec<EnumValue>> {
        let mut values = Vec::new();
        for field in self.fields(BindingFlags::ALL)? {
            if !field.is_static() || !field.is_literal() {
                continue;
            }
            if let Some(value) = field.constant()? {
                values.push(EnumValue {
                    name: field.name().to_string(),
                    value,
                });
            }
        }

        values.sort_by_key(|entry| entry.value.as_i128().unwrap_or(i128::MAX));
        Ok(values)
    }

    /// Debugger markers on the type.
    #[must_use]
    pub fn debug_attributes(&self) -> DebugAttributes {
        probe_debug_attributes(self.importer.as_ref(), self.token)
    }

    /// Decoded `DebuggerDisplayAttribute`, if applied.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedAttribute`] for a bad blob.
    pub fn debugger_display(&self) -> Result<Option<DebuggerDisplay>> {
        self.attribute_payload(DebugAttributes::DISPLAY, parse_debugger_display)
    }

    /// Decoded `DebuggerTypeProxyAttribute`, if applied.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedAttribute`] for a bad blob.
    pub fn debugger_type_proxy(&self) -> Result<Option<DebuggerTypeProxy>> {
        self.attribute_payload(DebugAttributes::TYPE_PROXY, parse_debugger_type_proxy)
    }

    fn attribute_payload<T>(
        &self,
        attribute: DebugAttributes,
        parse: fn(&[u8]) -> Result<T>,
    ) -> Result<Option<T>> {
        let Some(name) = attribute.attribute_name() else {
            return Ok(None);
        };

        self.importer
            .custom_attribute_by_name(self.token, name)
            .map(|blob| parse(&blob))
            .transpose()
    }

    fn view(&self, token: Token) -> MetadataType {
        MetadataType::new(token, self.importer.clone())
    }
}

impl std::fmt::Debug for MetadataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataType")
            .field("token", &self.token)
            .field("type_args", &self.type_args)
            .finish()
    }
}

/// Render a decoded type the way the debugger displays it.
///
/// Primitives use their CLR names; arrays, pointers and references use C# suffix syntax;
/// unbound generic parameters render as `!n` (type) and `!!n` (method).
///
/// # Errors
/// Propagates importer errors for token-addressed types.
pub fn type_name(importer: &Arc<dyn MetadataImporter>, ty: &TypeDescriptor) -> Result<String> {
    Ok(match ty {
        TypeDescriptor::Primitive(element) => element
            .clr_name()
            .map_or_else(|| element.to_string(), str::to_string),
        TypeDescriptor::ByToken(_, token) => {
            MetadataType::new(*token, importer.clone()).full_name()?
        }
        TypeDescriptor::SzArray(element) => format!("{}[]", type_name(importer, element)?),
        TypeDescriptor::Array(shape) => format!(
            "{}[{}]",
            type_name(importer, &shape.element)?,
            ",".repeat(shape.rank.saturating_sub(1) as usize)
        ),
        TypeDescriptor::Pointer(element) => format!("{}*", type_name(importer, element)?),
        TypeDescriptor::ByRef(element) => format!("{}&", type_name(importer, element)?),
        TypeDescriptor::Generic { base, args } => {
            let args = args
                .iter()
                .map(|arg| type_name(importer, arg))
                .collect::<Result<Vec<_>>>()?;
            format!("{}<{}>", type_name(importer, base)?, args.join(","))
        }
        TypeDescriptor::GenericParam { index, owner } => match owner {
            GenericOwner::Type => format!("!{}", index),
            GenericOwner::Method => format!("!!{}", index),
        },
        TypeDescriptor::FunctionPointer(signature) => {
            let params = signature
                .params
                .iter()
                .map(|param| type_name(importer, param))
                .collect::<Result<Vec<_>>>()?;
            format!(
                "method {} *({})",
                type_name(importer, &signature.return_type)?,
                params.join(",")
            )
        }
    })
}
