use crate::repo::{ClassUid, MethodUid, Visibility};
use dexopt_ir::code::Code;
use dexopt_ir::flags::MethodFlags;
use dexopt_ir::refs::{MethodRef, Proto};
use dexopt_ir::types::Type;
use std::fmt;
use std::sync::RwLock;

/// The enriched method definition.
///
/// The body lives behind a lock: during the parallel resolution phase
/// each method is rewritten only by the worker that owns it, so the
/// lock is never contended, but it is what lets workers share the
/// repository immutably.
#[derive(Debug)]
pub struct Method {
    // Unique identifier in the repository
    uid: MethodUid,
    // Owning class in the repository
    class: ClassUid,
    // Names and types that identify the method
    descriptor: MethodRef,
    flags: MethodFlags,
    code: Option<RwLock<Code>>,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

impl Method {
    pub(crate) fn new(
        uid: MethodUid,
        class: ClassUid,
        descriptor: MethodRef,
        flags: MethodFlags,
        code: Option<Code>,
    ) -> Self {
        Self {
            uid,
            class,
            descriptor,
            flags,
            code: code.map(RwLock::new),
        }
    }

    #[inline]
    #[must_use]
    pub fn uid(&self) -> MethodUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub fn class_uid(&self) -> ClassUid {
        self.class
    }

    #[inline]
    pub fn descriptor(&self) -> &MethodRef {
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
    pub fn proto(&self) -> &Proto {
        self.descriptor.proto()
    }

    #[inline]
    pub fn return_type(&self) -> &Type {
        self.descriptor.proto().return_type()
    }

    #[must_use]
    pub fn code(&self) -> Option<&RwLock<Code>> {
        self.code.as_ref()
    }

    /// Narrows the declared return type, for signature specialization.
    /// Only called from the serialized phase of the resolver.
    pub(crate) fn set_return_type(&mut self, return_type: Type) {
        let mut proto = self.descriptor.proto().clone();
        proto.set_return_type(return_type);
        self.descriptor = MethodRef::new(self.descriptor.definer(), self.descriptor.name(), proto);
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        if self.flags.contains(MethodFlags::ACC_PUBLIC) {
            Visibility::Public
        } else if self.flags.contains(MethodFlags::ACC_PROTECTED) {
            Visibility::Protected
        } else if self.flags.contains(MethodFlags::ACC_PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_PUBLIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_PRIVATE)
    }

    #[inline]
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_STATIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_FINAL)
    }

    #[inline]
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_ABSTRACT)
    }

    #[inline]
    #[must_use]
    pub const fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_CONSTRUCTOR)
    }
}
