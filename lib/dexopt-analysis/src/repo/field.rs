use crate::repo::{ClassUid, FieldUid, Visibility};
use dexopt_ir::flags::FieldFlags;
use dexopt_ir::refs::FieldRef;
use dexopt_ir::types::Type;
use std::fmt;

/// The enriched field definition.
#[derive(Debug, Clone)]
pub struct Field {
    // Unique identifier in the repository
    uid: FieldUid,
    // Owning class in the repository
    class: ClassUid,
    // Names and type that identify the field
    descriptor: FieldRef,
    flags: FieldFlags,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

impl Field {
    pub(crate) fn new(
        uid: FieldUid,
        class: ClassUid,
        descriptor: FieldRef,
        flags: FieldFlags,
    ) -> Self {
        Self {
            uid,
            class,
            descriptor,
            flags,
        }
    }

    #[inline]
    #[must_use]
    pub fn uid(&self) -> FieldUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub fn class_uid(&self) -> ClassUid {
        self.class
    }

    #[inline]
    pub fn descriptor(&self) -> &FieldRef {
        &self.descriptor
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    #[inline]
    pub fn definer(&self) -> &str {
        self.descriptor.definer()
    }

    #[inline]
    pub fn type_(&self) -> &Type {
        self.descriptor.type_()
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        if self.flags.contains(FieldFlags::ACC_PUBLIC) {
            Visibility::Public
        } else if self.flags.contains(FieldFlags::ACC_PROTECTED) {
            Visibility::Protected
        } else if self.flags.contains(FieldFlags::ACC_PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::ACC_STATIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.flags.contains(FieldFlags::ACC_FINAL)
    }
}
