//! Property keys, attributes and descriptors

use crate::atom::Atom;
use crate::value::{ObjectRef, SymbolRef, Value};

bitflags::bitflags! {
    /// Attribute bits of an own property.
    ///
    /// `ACCESSOR` is internal: it marks slots that hold a get/set pair
    /// instead of a data value and is never exposed through descriptors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u8 {
        const WRITABLE = 1 << 0;
        const ENUMERABLE = 1 << 1;
        const CONFIGURABLE = 1 << 2;
        const ACCESSOR = 1 << 3;
    }
}

impl PropertyAttributes {
    /// Writable + enumerable + configurable, the shorthand for fresh
    /// data properties created by plain assignment.
    pub const ALL_PRESENT: PropertyAttributes = PropertyAttributes::WRITABLE
        .union(PropertyAttributes::ENUMERABLE)
        .union(PropertyAttributes::CONFIGURABLE);

    /// Writable + configurable, used for builtin methods.
    pub const BUILTIN: PropertyAttributes =
        PropertyAttributes::WRITABLE.union(PropertyAttributes::CONFIGURABLE);

    #[inline]
    pub fn is_writable(self) -> bool {
        self.contains(PropertyAttributes::WRITABLE)
    }

    #[inline]
    pub fn is_enumerable(self) -> bool {
        self.contains(PropertyAttributes::ENUMERABLE)
    }

    #[inline]
    pub fn is_configurable(self) -> bool {
        self.contains(PropertyAttributes::CONFIGURABLE)
    }

    #[inline]
    pub fn is_accessor(self) -> bool {
        self.contains(PropertyAttributes::ACCESSOR)
    }
}

/// A resolved property key.
///
/// Integer-like string keys are canonicalized to `Index` so the dense
/// element path and own-key ordering can recognize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Index(u32),
    Atom(Atom),
    Symbol(SymbolRef),
}

impl PropertyKey {
    #[inline]
    pub fn as_index(self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(i),
            _ => None,
        }
    }
}

/// Storage of one own property.
#[derive(Debug, Clone, Copy)]
pub enum PropertySlot {
    Data(Value),
    Accessor {
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
    },
}

impl PropertySlot {
    /// The value as seen by a plain data read; accessors are resolved
    /// by the caller, which needs to invoke the getter.
    #[inline]
    pub fn data(&self) -> Option<Value> {
        match self {
            PropertySlot::Data(v) => Some(*v),
            PropertySlot::Accessor { .. } => None,
        }
    }
}

/// A property descriptor as used by defineOwnProperty and
/// getOwnPropertyDescriptor. Absent fields mean "leave unchanged" on
/// redefinition and "default" on creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub get: Option<Option<ObjectRef>>,
    pub set: Option<Option<ObjectRef>>,
    pub writable: Option<bool>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// A fully-populated data descriptor.
    pub fn data(value: Value, attrs: PropertyAttributes) -> Self {
        PropertyDescriptor {
            value: Some(value),
            get: None,
            set: None,
            writable: Some(attrs.is_writable()),
            enumerable: Some(attrs.is_enumerable()),
            configurable: Some(attrs.is_configurable()),
        }
    }

    /// A fully-populated accessor descriptor.
    pub fn accessor(
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        attrs: PropertyAttributes,
    ) -> Self {
        PropertyDescriptor {
            value: None,
            get: Some(get),
            set: Some(set),
            writable: None,
            enumerable: Some(attrs.is_enumerable()),
            configurable: Some(attrs.is_configurable()),
        }
    }

    #[inline]
    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    #[inline]
    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// Fill absent fields with creation defaults (false / undefined).
    pub fn complete(mut self) -> Self {
        if self.is_accessor_descriptor() {
            self.get.get_or_insert(None);
            self.set.get_or_insert(None);
        } else {
            self.value.get_or_insert(Value::undefined());
            self.writable.get_or_insert(false);
        }
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }

    /// Attribute bits of a completed descriptor.
    pub fn attributes(&self) -> PropertyAttributes {
        let mut attrs = PropertyAttributes::empty();
        if self.writable == Some(true) {
            attrs |= PropertyAttributes::WRITABLE;
        }
        if self.enumerable == Some(true) {
            attrs |= PropertyAttributes::ENUMERABLE;
        }
        if self.configurable == Some(true) {
            attrs |= PropertyAttributes::CONFIGURABLE;
        }
        if self.is_accessor_descriptor() {
            attrs |= PropertyAttributes::ACCESSOR;
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_present_shorthand() {
        let a = PropertyAttributes::ALL_PRESENT;
        assert!(a.is_writable() && a.is_enumerable() && a.is_configurable());
        assert!(!a.is_accessor());
    }

    #[test]
    fn descriptor_completion_defaults() {
        let d = PropertyDescriptor {
            value: Some(Value::int32(1)),
            ..Default::default()
        }
        .complete();
        assert_eq!(d.writable, Some(false));
        assert_eq!(d.enumerable, Some(false));
        assert_eq!(d.configurable, Some(false));

        let a = PropertyDescriptor {
            get: Some(None),
            ..Default::default()
        }
        .complete();
        assert!(a.is_accessor_descriptor());
        assert_eq!(a.set, Some(None));
        assert!(a.value.is_none());
    }

    #[test]
    fn descriptor_attribute_bits() {
        let d = PropertyDescriptor::data(Value::int32(0), PropertyAttributes::ALL_PRESENT);
        assert_eq!(d.attributes(), PropertyAttributes::ALL_PRESENT);

        let acc = PropertyDescriptor::accessor(None, None, PropertyAttributes::CONFIGURABLE);
        assert!(acc.attributes().is_accessor());
        assert!(!acc.attributes().is_writable());
    }
}
