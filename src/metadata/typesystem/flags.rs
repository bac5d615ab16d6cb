//! Attribute flags of types and members, and the member binding filter.

use bitflags::bitflags;

bitflags! {
    /// `TypeAttributes` (ECMA-335 II.23.1.15), reduced to the bits the type model reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Visibility bits
        const VISIBILITY_MASK = 0x0000_0007;
        /// Top-level, not public
        const NOT_PUBLIC = 0x0000_0000;
        /// Top-level, public
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Interface semantics
        const INTERFACE = 0x0000_0020;
        /// Abstract
        const ABSTRACT = 0x0000_0080;
        /// Sealed
        const SEALED = 0x0000_0100;
        /// Special name
        const SPECIAL_NAME = 0x0000_0400;
    }
}

impl TypeAttributes {
    /// Returns true if the visibility bits mark a nested type.
    #[must_use]
    pub fn is_nested(self) -> bool {
        (self.bits() & Self::VISIBILITY_MASK.bits()) >= Self::NESTED_PUBLIC.bits()
    }

    /// Returns true for public and nested-public types.
    #[must_use]
    pub fn is_public(self) -> bool {
        let visibility = self.bits() & Self::VISIBILITY_MASK.bits();
        visibility == Self::PUBLIC.bits() || visibility == Self::NESTED_PUBLIC.bits()
    }
}

bitflags! {
    /// `MethodAttributes` (ECMA-335 II.23.1.10), reduced to the bits the type model reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u32 {
        /// Member access bits
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Private
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Static
        const STATIC = 0x0010;
        /// Final
        const FINAL = 0x0020;
        /// Virtual
        const VIRTUAL = 0x0040;
        /// Abstract
        const ABSTRACT = 0x0400;
        /// Special name (accessors, operators, constructors)
        const SPECIAL_NAME = 0x0800;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Returns true if the access bits are exactly `Public`.
    #[must_use]
    pub fn is_public(self) -> bool {
        (self.bits() & Self::MEMBER_ACCESS_MASK.bits()) == Self::PUBLIC.bits()
    }
}

bitflags! {
    /// `FieldAttributes` (ECMA-335 II.23.1.5), reduced to the bits the type model reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u32 {
        /// Member access bits
        const FIELD_ACCESS_MASK = 0x0007;
        /// Private
        const PRIVATE = 0x0001;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Public
        const PUBLIC = 0x0006;
        /// Static
        const STATIC = 0x0010;
        /// Read-only after initialization
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

impl FieldAttributes {
    /// Returns true if the access bits are exactly `Public`.
    #[must_use]
    pub fn is_public(self) -> bool {
        (self.bits() & Self::FIELD_ACCESS_MASK.bits()) == Self::PUBLIC.bits()
    }
}

bitflags! {
    /// Member filter of the `fields`/`methods`/`properties` queries.
    ///
    /// A member matches only if both axes accept it: its visibility must be allowed by
    /// `PUBLIC`/`NON_PUBLIC` and its staticness by `STATIC`/`INSTANCE`. A filter that names
    /// neither flag of an axis matches nothing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindingFlags: u32 {
        /// Instance members
        const INSTANCE = 0x04;
        /// Static members
        const STATIC = 0x08;
        /// Public members
        const PUBLIC = 0x10;
        /// Non-public members
        const NON_PUBLIC = 0x20;
        /// Everything
        const ALL = Self::INSTANCE.bits() | Self::STATIC.bits() | Self::PUBLIC.bits() | Self::NON_PUBLIC.bits();
    }
}

impl BindingFlags {
    /// Returns true if a member with the given visibility and staticness passes the filter.
    #[must_use]
    pub fn accepts(self, is_public: bool, is_static: bool) -> bool {
        let visibility = if is_public {
            self.contains(BindingFlags::PUBLIC)
        } else {
            self.contains(BindingFlags::NON_PUBLIC)
        };
        let storage = if is_static {
            self.contains(BindingFlags::STATIC)
        } else {
            self.contains(BindingFlags::INSTANCE)
        };

        visibility && storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_visibility() {
        assert!(!TypeAttributes::from_bits_retain(0x0010_0001).is_nested());
        assert!(TypeAttributes::from_bits_retain(0x0000_0002).is_nested());
        assert!(TypeAttributes::from_bits_retain(0x0000_0007).is_nested());
        assert!(TypeAttributes::from_bits_retain(0x0000_0002).is_public());
    }

    #[test]
    fn access_masks() {
        assert!(MethodAttributes::from_bits_retain(0x0886).is_public());
        assert!(!MethodAttributes::from_bits_retain(0x0007).is_public());
        assert!(FieldAttributes::from_bits_retain(0x8056).is_public());
    }

    #[test]
    fn binding_filter_needs_both_axes() {
        let all = BindingFlags::ALL;
        assert!(all.accepts(true, true));
        assert!(all.accepts(false, false));

        let public_only = BindingFlags::PUBLIC;
        assert!(!public_only.accepts(true, false));
        assert!(!public_only.accepts(true, true));

        let public_instance = BindingFlags::PUBLIC | BindingFlags::INSTANCE;
        assert!(public_instance.accepts(true, false));
        assert!(!public_instance.accepts(false, false));
        assert!(!public_instance.accepts(true, true));

        assert!(!BindingFlags::empty().accepts(true, true));
    }
}
