//! Per-module cache of resolved types, methods and method signatures.
//!
//! The [`TypeModel`] owns the module's importer and hands out reference-counted views. Entries
//! are created on first request and live until the module unloads ([`TypeModel::clear`]).
//! All caches are `DashMap`s so the callback thread and the helper thread can resolve
//! concurrently.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    metadata::{
        customattributes::DebugAttributes,
        importer::MetadataImporter,
        signatures::{decode_type_with, Instantiation, MethodSignature, TypeDescriptor},
        token::{TableKind, Token},
        typesystem::{type_name, ElementType, MetadataMethod, MetadataType, MethodRc, TypeRc},
    },
    Error::InvalidToken,
    Result,
};

/// Lazily populated type model of one module.
pub struct TypeModel {
    importer: Arc<dyn MetadataImporter>,
    types: DashMap<Token, TypeRc>,
    methods: DashMap<Token, MethodRc>,
    signatures: DashMap<Token, Arc<MethodSignature>>,
}

impl TypeModel {
    /// Create an empty model over `importer`.
    #[must_use]
    pub fn new(importer: Arc<dyn MetadataImporter>) -> Self {
        TypeModel {
            importer,
            types: DashMap::new(),
            methods: DashMap::new(),
            signatures: DashMap::new(),
        }
    }

    /// The backing importer.
    #[must_use]
    pub fn importer(&self) -> &Arc<dyn MetadataImporter> {
        &self.importer
    }

    /// Resolve a `TypeDef`, `TypeRef` or `TypeSpec` token, or [`Token::GLOBAL`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the importer does not know the token or the
    /// token is not a type token, and decode errors for malformed `TypeSpec` blobs.
    pub fn resolve_type(&self, token: Token) -> Result<TypeRc> {
        if let Some(existing) = self.types.get(&token) {
            return Ok(existing.clone());
        }

        if !token.is_null() && !self.importer.is_valid_token(token) {
            return Err(InvalidToken(token));
        }

        let resolved = match token.kind() {
            TableKind::Module if token.is_null() => MetadataType::new(token, self.importer.clone()),
            TableKind::TypeDef | TableKind::TypeRef => {
                MetadataType::new(token, self.importer.clone())
            }
            TableKind::TypeSpec => {
                let blob = self.importer.type_spec_blob(token)?;
                let (descriptor, _) = decode_type_with(&blob, Instantiation::empty())?;
                MetadataType::from_descriptor(descriptor, self.importer.clone())?
            }
            _ => return Err(InvalidToken(token)),
        };

        let resolved = Arc::new(resolved);
        self.types.insert(token, resolved.clone());
        Ok(resolved)
    }

    /// Resolve a `MethodDef` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] for unknown or non-method tokens.
    pub fn resolve_method(&self, token: Token) -> Result<MethodRc> {
        if let Some(existing) = self.methods.get(&token) {
            return Ok(existing.clone());
        }

        if token.kind() != TableKind::MethodDef || !self.importer.is_valid_token(token) {
            return Err(InvalidToken(token));
        }

        let method = Arc::new(MetadataMethod::load(&self.importer, token)?);
        self.methods.insert(token, method.clone());
        Ok(method)
    }

    /// The decoded signature of a method, outside any generic context.
    ///
    /// # Errors
    /// See [`TypeModel::resolve_method`] and the signature decoder.
    pub fn method_signature(&self, token: Token) -> Result<Arc<MethodSignature>> {
        if let Some(existing) = self.signatures.get(&token) {
            return Ok(existing.clone());
        }

        let method = self.resolve_method(token)?;
        let signature = Arc::new(method.signature(Instantiation::empty())?);
        self.signatures.insert(token, signature.clone());
        Ok(signature)
    }

    /// Render a decoded type with names resolved through this module.
    ///
    /// # Errors
    /// Propagates importer errors.
    pub fn describe(&self, ty: &TypeDescriptor) -> Result<String> {
        type_name(&self.importer, ty)
    }

    /// Storage type of the enum named by `token`.
    ///
    /// # Errors
    /// See [`MetadataType::enum_underlying_type`].
    pub fn enum_underlying_type(&self, token: Token) -> Result<ElementType> {
        self.resolve_type(token)?.enum_underlying_type()
    }

    /// Debugger markers of a method merged with those of its declaring type.
    ///
    /// # Errors
    /// See [`TypeModel::resolve_method`].
    pub fn method_debug_attributes(&self, token: Token) -> Result<DebugAttributes> {
        let method = self.resolve_method(token)?;
        let declaring = method.declaring_type();
        let mut attributes = method.debug_attributes();
        if !declaring.is_nil_row() && !declaring.is_not_found() {
            attributes |= self.resolve_type(declaring)?.debug_attributes();
        }
        Ok(attributes)
    }

    /// Returns true if the stepper must never stop inside `method`.
    ///
    /// `DebuggerHidden` and `DebuggerStepThrough` always count; with
    /// `project_assemblies_only` set, `DebuggerNonUserCode` counts too.
    ///
    /// # Errors
    /// See [`TypeModel::resolve_method`].
    pub fn is_step_through(&self, method: Token, project_assemblies_only: bool) -> Result<bool> {
        let mut hiding = DebugAttributes::HIDDEN | DebugAttributes::STEP_THROUGH;
        if project_assemblies_only {
            hiding |= DebugAttributes::NON_USER_CODE;
        }

        Ok(self.method_debug_attributes(method)?.intersects(hiding))
    }

    /// Find a `TypeDef` by full name, following `Outer+Inner` nesting.
    ///
    /// Returns [`Token::NOT_FOUND`] if no such type is defined in this module.
    #[must_use]
    pub fn type_token_from_name(&self, name: &str) -> Token {
        if let Some(token) = self.importer.find_type_def_by_name(name, Token::GLOBAL) {
            return token;
        }

        let mut parts = name.split('+');
        let Some(outermost) = parts.next() else {
            return Token::NOT_FOUND;
        };

        let Some(mut current) = self.importer.find_type_def_by_name(outermost, Token::GLOBAL)
        else {
            return Token::NOT_FOUND;
        };

        for part in parts {
            match self.importer.find_type_def_by_name(part, current) {
                Some(nested) => current = nested,
                None => return Token::NOT_FOUND,
            }
        }

        current
    }

    /// Number of cached types.
    #[must_use]
    pub fn cached_types(&self) -> usize {
        self.types.len()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.types.clear();
        self.methods.clear();
        self.signatures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            importer::ConstantBlob,
            typesystem::{BindingFlags, ConstantValue},
        },
        test::{FakeImporter, FieldRow, MethodRow, TypeRow},
        Error,
    };

    const OBJECT: u32 = 0x0100_0001;
    const ENUM: u32 = 0x0100_0002;
    const COLORS: u32 = 0x0200_0002;
    const WORKER: u32 = 0x0200_0003;
    const NESTED: u32 = 0x0200_0004;

    fn model() -> TypeModel {
        let mut fake = FakeImporter::new();
        fake.add_type_ref(OBJECT, "System.Object");
        fake.add_type_ref(ENUM, "System.Enum");

        fake.add_type(TypeRow::new(COLORS, "Demo.Colors").flags(0x101).extends(ENUM));
        fake.add_field(FieldRow::new(0x0400_0001, COLORS, "value__").flags(0x0606).signature(&[0x06, 0x08]));
        for (row, name, value) in [(2u32, "Blue", 4i32), (3, "Red", 1), (4, "Green", 2)] {
            fake.add_field(
                FieldRow::new(0x0400_0000 | row, COLORS, name)
                    .flags(0x8056)
                    .signature(&[0x06, 0x11, 0x08])
                    .constant(ConstantBlob {
                        element_type: 0x08,
                        data: value.to_le_bytes().to_vec(),
                    }),
            );
        }
        fake.add_attribute(COLORS, "System.FlagsAttribute", vec![0x01, 0x00, 0x00, 0x00]);

        fake.add_type(TypeRow::new(WORKER, "Demo.Worker").flags(0x1).extends(OBJECT));
        fake.add_type(
            TypeRow::new(NESTED, "Job")
                .flags(0x2)
                .extends(OBJECT)
                .enclosing(WORKER),
        );
        fake.add_method(MethodRow::new(0x0600_0001, WORKER, "Run").flags(0x0086).signature(&[0x20, 0x00, 0x01]));
        fake.add_method(MethodRow::new(0x0600_0002, WORKER, "get_Count").flags(0x0886).signature(&[0x20, 0x00, 0x08]));
        fake.add_method(MethodRow::new(0x0600_0003, WORKER, "Helper").flags(0x0091).signature(&[0x00, 0x00, 0x01]));
        fake.add_attribute(0x0600_0003, "System.Diagnostics.DebuggerNonUserCodeAttribute", vec![0x01, 0x00, 0x00, 0x00]);
        fake.add_attribute(NESTED, "System.Diagnostics.DebuggerHiddenAttribute", vec![0x01, 0x00, 0x00, 0x00]);

        TypeModel::new(Arc::new(fake))
    }

    #[test]
    fn resolve_caches_by_token() {
        let model = model();
        let first = model.resolve_type(Token::new(WORKER)).unwrap();
        let second = model.resolve_type(Token::new(WORKER)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(model.cached_types(), 1);

        model.clear();
        assert_eq!(model.cached_types(), 0);
    }

    #[test]
    fn describes_decoded_types() {
        let model = model();
        let jobs = TypeDescriptor::SzArray(Box::new(TypeDescriptor::ByToken(
            crate::metadata::signatures::TokenKind::Class,
            Token::new(NESTED),
        )));
        assert_eq!(model.describe(&jobs).unwrap(), "Demo.Worker+Job[]");

        let count = model.method_signature(Token::new(0x0600_0002)).unwrap();
        assert_eq!(model.describe(&count.return_type).unwrap(), "System.Int32");
    }

    #[test]
    fn invalid_tokens_fail() {
        let model = model();
        assert!(matches!(
            model.resolve_type(Token::new(0x0200_0099)),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            model.resolve_method(Token::new(0x0200_0003)),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn enum_introspection() {
        let model = model();
        let colors = model.resolve_type(Token::new(COLORS)).unwrap();
        assert!(colors.is_enum().unwrap());
        assert!(colors.is_flags_enum().unwrap());
        assert_eq!(
            model.enum_underlying_type(Token::new(COLORS)).unwrap(),
            ElementType::I4
        );

        let values = colors.enum_values().unwrap();
        let names: Vec<_> = values.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Red", "Green", "Blue"]);
        assert_eq!(values[2].value, ConstantValue::I4(4));
    }

    #[test]
    fn non_flags_class_is_not_enum() {
        let model = model();
        let worker = model.resolve_type(Token::new(WORKER)).unwrap();
        assert!(!worker.is_enum().unwrap());
        assert!(!worker.is_flags_enum().unwrap());
    }

    #[test]
    fn method_filters() {
        let model = model();
        let worker = model.resolve_type(Token::new(WORKER)).unwrap();

        let public_instance = worker
            .methods(BindingFlags::PUBLIC | BindingFlags::INSTANCE)
            .unwrap();
        let names: Vec<_> = public_instance.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Run", "get_Count"]);

        let non_public_static = worker
            .methods(BindingFlags::NON_PUBLIC | BindingFlags::STATIC)
            .unwrap();
        assert_eq!(non_public_static.len(), 1);
        assert_eq!(non_public_static[0].name(), "Helper");

        assert!(worker.methods(BindingFlags::PUBLIC).unwrap().is_empty());
    }

    #[test]
    fn accessor_detection() {
        let model = model();
        let getter = model.resolve_method(Token::new(0x0600_0002)).unwrap();
        assert!(getter.is_property_or_operator());
        let run = model.resolve_method(Token::new(0x0600_0001)).unwrap();
        assert!(!run.is_property_or_operator());

        let signature = model.method_signature(Token::new(0x0600_0002)).unwrap();
        assert_eq!(signature.return_type, TypeDescriptor::Primitive(ElementType::I4));
    }

    #[test]
    fn step_through_depends_on_project_option() {
        let model = model();
        let helper = Token::new(0x0600_0003);
        assert!(model.is_step_through(helper, true).unwrap());
        assert!(!model.is_step_through(helper, false).unwrap());
        assert!(!model.is_step_through(Token::new(0x0600_0001), true).unwrap());
    }

    #[test]
    fn type_lookup_by_name() {
        let model = model();
        assert_eq!(model.type_token_from_name("Demo.Worker"), Token::new(WORKER));
        assert_eq!(model.type_token_from_name("Demo.Worker+Job"), Token::new(NESTED));
        assert_eq!(model.type_token_from_name("Demo.Missing"), Token::NOT_FOUND);
        assert_eq!(model.type_token_from_name("Demo.Worker+Nope"), Token::NOT_FOUND);
    }
}
