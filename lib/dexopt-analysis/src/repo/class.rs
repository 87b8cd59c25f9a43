use crate::repo::{ClassUid, FieldUid, MethodUid, Repo};
use dexopt_ir::flags::ClassFlags;
use dexopt_ir::refs::Proto;
use std::cmp::Ordering;
use std::fmt;

/// The enriched class definition.
#[derive(Debug, Clone)]
pub struct Class {
    // Unique identifier in the repository
    uid: ClassUid,
    // Cache of the name that identifies the class
    name: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    flags: ClassFlags,
    // Flag to indicate that the class belongs to the platform SDK
    // rather than to the program being optimized
    external: bool,
    // Declaration-only classes have been seen as a supertype or a
    // reference definer without being registered themselves
    defined: bool,
    // List of contained methods (declaration level)
    methods: Vec<MethodUid>,
    // List of contained fields (declaration level)
    fields: Vec<FieldUid>,
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for Class {}

impl PartialOrd for Class {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Class {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uid.cmp(&other.uid)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Class {
    pub(crate) fn new(
        uid: ClassUid,
        name: &str,
        superclass: Option<String>,
        interfaces: Vec<String>,
        flags: ClassFlags,
        external: bool,
    ) -> Self {
        Self {
            uid,
            name: name.to_string(),
            superclass,
            interfaces,
            flags,
            external,
            defined: true,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Builds a declaration-only class, for supertypes referenced but
    /// never registered. Such classes are treated as external.
    pub(crate) fn new_no_def(uid: ClassUid, name: &str) -> Self {
        Self {
            uid,
            name: name.to_string(),
            superclass: None,
            interfaces: Vec::new(),
            flags: ClassFlags::ACC_PUBLIC,
            external: true,
            defined: false,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn uid(&self) -> ClassUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    #[inline]
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        self.defined
    }

    #[inline]
    #[must_use]
    pub const fn is_external(&self) -> bool {
        self.external
    }

    #[inline]
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_PUBLIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_FINAL)
    }

    #[inline]
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_INTERFACE)
    }

    #[inline]
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_ABSTRACT)
    }

    /// Promotes the class to public visibility. Idempotent; this is
    /// the only class mutation the resolver ever requests.
    pub(crate) fn set_public(&mut self) {
        self.flags.remove(ClassFlags::ACC_PRIVATE | ClassFlags::ACC_PROTECTED);
        self.flags.insert(ClassFlags::ACC_PUBLIC);
    }

    pub(crate) fn push_method(&mut self, muid: MethodUid) {
        self.methods.push(muid);
    }

    pub(crate) fn push_field(&mut self, fuid: FieldUid) {
        self.fields.push(fuid);
    }

    /// Returns an iterator over all methods contained in the class.
    pub fn iter_methods<'a>(&'a self, repo: &'a Repo) -> impl Iterator<Item = &'a super::Method> {
        self.methods.iter().map(|muid| &repo[*muid])
    }

    pub fn get_method(&self, name: &str, proto: &Proto, repo: &Repo) -> Option<MethodUid> {
        self.methods
            .iter()
            .copied()
            .find(|muid| repo[*muid].name() == name && repo[*muid].proto() == proto)
    }

    pub fn iter_fields<'a>(&'a self, repo: &'a Repo) -> impl Iterator<Item = &'a super::Field> {
        self.fields.iter().map(|fuid| &repo[*fuid])
    }

    pub fn get_field(&self, name: &str, type_: &dexopt_ir::types::Type, repo: &Repo) -> Option<FieldUid> {
        self.fields
            .iter()
            .copied()
            .find(|fuid| repo[*fuid].name() == name && repo[*fuid].type_() == type_)
    }
}
