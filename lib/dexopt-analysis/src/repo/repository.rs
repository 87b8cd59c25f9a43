//! A repository to centralize program and platform classes.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::hierarchy::Hierarchy;
use crate::repo::*;
use dexopt_ir::defs::ClassDef;
use dexopt_ir::refs::{FieldRef, MethodRef, Proto};
use std::ops;

const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// Member visibility, derived from access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

/// How a symbolic method reference is searched, one kind per invoke
/// opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSearch {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl MethodSearch {
    /// The search kind matching an invoke opcode.
    #[must_use]
    pub const fn of_invoke(kind: dexopt_ir::instrs::InvokeKind) -> Self {
        use dexopt_ir::instrs::InvokeKind;
        match kind {
            InvokeKind::Virtual => Self::Virtual,
            InvokeKind::Super => Self::Super,
            InvokeKind::Direct => Self::Direct,
            InvokeKind::Static => Self::Static,
            InvokeKind::Interface => Self::Interface,
        }
    }
}

/// How a symbolic field reference is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSearch {
    Static,
    Instance,
}

#[derive(Default)]
pub struct Repo {
    hierarchy: Hierarchy,
    counters: RepoCounters,
    classes: Vec<Class>,
    methods: Vec<Method>,
    fields: Vec<Field>,
}

impl ops::Index<ClassUid> for Repo {
    type Output = Class;

    fn index(&self, cuid: ClassUid) -> &Class {
        &self.classes[cuid.idx()]
    }
}

impl ops::Index<MethodUid> for Repo {
    type Output = Method;

    fn index(&self, muid: MethodUid) -> &Method {
        &self.methods[muid.idx()]
    }
}

impl ops::Index<FieldUid> for Repo {
    type Output = Field;

    fn index(&self, fuid: FieldUid) -> &Field {
        &self.fields[fuid.idx()]
    }
}

impl Repo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests a class definition. `external` marks platform SDK
    /// classes that are resolution targets but not rewrite subjects.
    pub fn register_class(&mut self, def: ClassDef, external: bool) -> AnalysisResult<()> {
        log::trace!(
            "pushing '{}'{} in repository",
            def.name,
            if external { " (SDK)" } else { "" }
        );

        let mut uid_to_update = None;
        if let Some(class) = self.get_class_by_name(&def.name) {
            if class.is_defined() {
                log::warn!(
                    "class '{}'{} has already been pushed in repository",
                    def.name,
                    if external { " (SDK)" } else { "" }
                );
                return Ok(());
            }
            uid_to_update = Some(class.uid());
        }

        let cuid = uid_to_update.unwrap_or_else(|| self.counters.new_class_uid());
        let mut class = Class::new(
            cuid,
            &def.name,
            def.superclass.clone(),
            def.interfaces.clone(),
            def.flags,
            external,
        );

        for method_def in def.methods {
            let muid = self.counters.new_method_uid();
            let descriptor = MethodRef::new(&def.name, &method_def.name, method_def.proto);
            self.methods.push(Method::new(
                muid,
                cuid,
                descriptor,
                method_def.flags,
                method_def.code,
            ));
            class.push_method(muid);
        }
        for field_def in def.fields {
            let fuid = self.counters.new_field_uid();
            let descriptor = FieldRef::new(&def.name, &field_def.name, field_def.type_);
            self.fields
                .push(Field::new(fuid, cuid, descriptor, field_def.flags));
            class.push_field(fuid);
        }

        if uid_to_update.is_some() {
            self.classes[cuid.idx()] = class;
        } else {
            self.classes.push(class);
            self.hierarchy.insert_class(&def.name, cuid)?;
        }

        // filling in the hierarchy links
        if let Some(superclass) = &def.superclass {
            self.ensure_declared(superclass)?;
            self.hierarchy.insert_extends(&def.name, superclass)?;
        }
        for interface in &def.interfaces {
            self.ensure_declared(interface)?;
            self.hierarchy.insert_implements(&def.name, interface)?;
        }

        Ok(())
    }

    fn ensure_declared(&mut self, name: &str) -> AnalysisResult<()> {
        if !self.hierarchy.contains_class(name) {
            let uid = self.counters.new_class_uid();
            self.classes.push(Class::new_no_def(uid, name));
            self.hierarchy.insert_class(name, uid)?;
        }
        Ok(())
    }

    /// Roots every parentless class at `java/lang/Object`. Must be
    /// called once all classes are registered, before any analysis.
    pub fn close_hierarchy(&mut self) -> AnalysisResult<()> {
        self.ensure_declared(JAVA_LANG_OBJECT)?;
        for orphan in self.hierarchy.orphans() {
            if orphan != JAVA_LANG_OBJECT {
                log::warn!("add missing java.lang.Object inheritance to {orphan}");
                self.hierarchy.insert_extends(&orphan, JAVA_LANG_OBJECT)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get_class_by_name(&self, name: &str) -> Option<&Class> {
        self.hierarchy.get_uid(name).map(|uid| &self[uid])
    }

    #[inline]
    pub fn iter_classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// All methods of the repository, in registration order. The
    /// parallel resolution phase fans out over this slice.
    #[inline]
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn iter_classes_methods(&self) -> impl Iterator<Item = (&Class, &Method)> {
        self.iter_classes()
            .flat_map(move |class| class.iter_methods(self).map(move |method| (class, method)))
    }

    /// Promotes a class to public visibility. Idempotent.
    pub fn set_public(&mut self, cuid: ClassUid) {
        self.classes[cuid.idx()].set_public();
    }

    /// Narrows the declared return type of a method. Only meaningful
    /// from the serialized specialization phase of the resolver.
    pub(crate) fn set_return_type(&mut self, muid: MethodUid, rtype: dexopt_ir::types::Type) {
        self.methods[muid.idx()].set_return_type(rtype);
    }

    /// Checks whether `type_name1` can be used where a `type_name2` is
    /// expected, i.e. whether there is an inheritance path from
    /// `type_name1` up to `type_name2`.
    pub fn is_typeable_as(&self, type_name1: &str, type_name2: &str) -> AnalysisResult<bool> {
        // every type is typeable as itself:
        if type_name1 == type_name2 {
            return Ok(true);
        }

        // every class inherits (directly or indirectly) from Object:
        if type_name2 == JAVA_LANG_OBJECT {
            return Ok(true);
        }

        let sup = self
            .hierarchy
            .get_uid(type_name2)
            .ok_or_else(|| AnalysisError::ClassNotFound(type_name2.to_string()))?;
        Ok(self.hierarchy.all_parents(type_name1)?.contains(&sup))
    }

    /// The least common superclass of two classes, or `None` when
    /// either is unknown to the hierarchy. Interfaces do not
    /// participate: the reference join follows superclass chains only,
    /// like the platform verifier.
    #[must_use]
    pub fn least_common_class(&self, type_name1: &str, type_name2: &str) -> Option<String> {
        self.get_class_by_name(type_name1)?;
        self.get_class_by_name(type_name2)?;

        let mut current = Some(type_name1.to_string());
        while let Some(name) = current {
            if self.is_typeable_as(type_name2, &name).unwrap_or(false) {
                return Some(name);
            }
            current = self
                .get_class_by_name(&name)
                .and_then(|class| class.superclass().map(str::to_string));
        }
        Some(JAVA_LANG_OBJECT.to_string())
    }

    /// Resolves a symbolic method reference to its definition,
    /// following the platform resolution order for the given search
    /// kind. `caller_class` only matters for the `Super` search, which
    /// starts above the caller.
    #[must_use]
    pub fn resolve_method(
        &self,
        mref: &MethodRef,
        search: MethodSearch,
        caller_class: &str,
    ) -> Option<MethodUid> {
        let name = mref.name();
        let proto = mref.proto();
        match search {
            MethodSearch::Static => {
                self.search_superclass_chain(mref.definer(), name, proto, Method::is_static)
            }
            MethodSearch::Direct => {
                self.search_superclass_chain(mref.definer(), name, proto, |m| !m.is_static())
            }
            MethodSearch::Virtual => self.search_virtual(mref.definer(), name, proto),
            MethodSearch::Super => {
                let start = self.get_class_by_name(caller_class)?.superclass()?;
                self.search_virtual(start, name, proto)
            }
            MethodSearch::Interface => self
                .search_one_interface(mref.definer(), name, proto)
                .or_else(|| {
                    // interface refs to Object methods (toString, ...)
                    self.search_superclass_chain(JAVA_LANG_OBJECT, name, proto, |m| !m.is_static())
                }),
        }
    }

    /// Virtual resolution starting at the superclass of the given
    /// class; used to simplify `invoke-super` sites.
    #[must_use]
    pub fn resolve_method_above(
        &self,
        class_name: &str,
        name: &str,
        proto: &Proto,
    ) -> Option<MethodUid> {
        let start = self.get_class_by_name(class_name)?.superclass()?;
        self.search_virtual(start, name, proto)
    }

    fn search_virtual(&self, start: &str, name: &str, proto: &Proto) -> Option<MethodUid> {
        self.search_superclass_chain(start, name, proto, |m| !m.is_static() && !m.is_private())
            .or_else(|| self.search_interfaces_from(start, name, proto))
    }

    fn search_superclass_chain(
        &self,
        start: &str,
        name: &str,
        proto: &Proto,
        accept: impl Fn(&Method) -> bool,
    ) -> Option<MethodUid> {
        let mut current = Some(start.to_string());
        while let Some(class_name) = current {
            let class = self.get_class_by_name(&class_name)?;
            if let Some(muid) = class.get_method(name, proto, self) {
                if accept(&self[muid]) {
                    return Some(muid);
                }
            }
            current = class.superclass().map(str::to_string);
        }
        None
    }

    /// Searches the interfaces transitively implemented along the
    /// superclass chain of `start`, in declaration order, depth-first.
    /// This mirrors the platform tie-break when several interfaces
    /// contribute a method.
    fn search_interfaces_from(&self, start: &str, name: &str, proto: &Proto) -> Option<MethodUid> {
        let mut current = Some(start.to_string());
        while let Some(class_name) = current {
            let class = self.get_class_by_name(&class_name)?;
            for interface in class.interfaces() {
                if let Some(muid) = self.search_one_interface(interface, name, proto) {
                    return Some(muid);
                }
            }
            current = class.superclass().map(str::to_string);
        }
        None
    }

    fn search_one_interface(&self, name_of: &str, name: &str, proto: &Proto) -> Option<MethodUid> {
        let class = self.get_class_by_name(name_of)?;
        if let Some(muid) = class.get_method(name, proto, self) {
            if !self[muid].is_static() {
                return Some(muid);
            }
        }
        for superinterface in class.interfaces() {
            if let Some(muid) = self.search_one_interface(superinterface, name, proto) {
                return Some(muid);
            }
        }
        None
    }

    /// Resolves a symbolic field reference to its definition. Static
    /// search scans interfaces before superclasses, per the platform
    /// field resolution order.
    #[must_use]
    pub fn resolve_field(&self, fref: &FieldRef, search: FieldSearch) -> Option<FieldUid> {
        match search {
            FieldSearch::Instance => {
                let mut current = Some(fref.definer().to_string());
                while let Some(class_name) = current {
                    let class = self.get_class_by_name(&class_name)?;
                    if let Some(fuid) = class.get_field(fref.name(), fref.type_(), self) {
                        if !self[fuid].is_static() {
                            return Some(fuid);
                        }
                    }
                    current = class.superclass().map(str::to_string);
                }
                None
            }
            FieldSearch::Static => self.resolve_static_field(fref.definer(), fref),
        }
    }

    fn resolve_static_field(&self, class_name: &str, fref: &FieldRef) -> Option<FieldUid> {
        let class = self.get_class_by_name(class_name)?;
        if let Some(fuid) = class.get_field(fref.name(), fref.type_(), self) {
            if self[fuid].is_static() {
                return Some(fuid);
            }
        }
        for interface in class.interfaces() {
            if let Some(fuid) = self.resolve_static_field(interface, fref) {
                return Some(fuid);
            }
        }
        class
            .superclass()
            .and_then(|superclass| self.resolve_static_field(superclass, fref))
    }

    /// The concrete methods overriding the given declaration across
    /// the subtypes of its class, excluding the declaration itself.
    pub fn overriders(
        &self,
        class_name: &str,
        name: &str,
        proto: &Proto,
    ) -> AnalysisResult<Vec<MethodUid>> {
        let base = self.hierarchy.get_uid(class_name);
        let mut found = Vec::new();
        for cuid in self.hierarchy.all_children(class_name)? {
            if Some(cuid) == base {
                continue;
            }
            if let Some(muid) = self[cuid].get_method(name, proto, self) {
                found.push(muid);
            }
        }
        Ok(found)
    }

    /// Whether code in `caller_class` may access a member of
    /// `member_class` with the given visibility.
    #[must_use]
    pub fn can_access(&self, caller_class: &str, member_class: &str, vis: Visibility) -> bool {
        let class_ok = match self.get_class_by_name(member_class) {
            Some(class) => class.is_public() || same_package(caller_class, member_class),
            None => false,
        };
        class_ok
            && match vis {
                Visibility::Public => true,
                Visibility::Private => caller_class == member_class,
                Visibility::Protected => {
                    same_package(caller_class, member_class)
                        || self
                            .is_typeable_as(caller_class, member_class)
                            .unwrap_or(false)
                }
                Visibility::Package => same_package(caller_class, member_class),
            }
    }

    pub fn nb_classes(&self) -> usize {
        self.counters.nb_classes()
    }

    pub fn nb_methods(&self) -> usize {
        self.counters.nb_methods()
    }

    pub fn nb_fields(&self) -> usize {
        self.counters.nb_fields()
    }
}

fn same_package(class1: &str, class2: &str) -> bool {
    let package = |name: &str| name.rsplit_once('/').map(|(pkg, _)| pkg.to_string());
    package(class1) == package(class2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexopt_ir::defs::{ClassDef, FieldDef, MethodDef};
    use dexopt_ir::flags::{ClassFlags, FieldFlags, MethodFlags};
    use dexopt_ir::types::Type;

    fn void_proto() -> Proto {
        Proto::new(Type::Void, vec![])
    }

    fn declared_method(name: &str) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            proto: void_proto(),
            flags: MethodFlags::ACC_PUBLIC,
            code: None,
        }
    }

    // A <- B <- C, with B implementing I
    fn diamond_repo() -> Repo {
        let mut a = ClassDef::named("com/x/A");
        a.methods.push(declared_method("m"));
        let mut i = ClassDef::named("com/x/I");
        i.flags = ClassFlags::ACC_PUBLIC | ClassFlags::ACC_INTERFACE;
        i.fields.push(FieldDef {
            name: "CONST".to_string(),
            type_: Type::Int,
            flags: FieldFlags::ACC_PUBLIC | FieldFlags::ACC_STATIC | FieldFlags::ACC_FINAL,
        });
        let mut b = ClassDef::named("com/x/B");
        b.superclass = Some("com/x/A".to_string());
        b.interfaces.push("com/x/I".to_string());
        let mut c = ClassDef::named("com/x/C");
        c.superclass = Some("com/x/B".to_string());
        c.methods.push(declared_method("m"));

        let mut repo = Repo::new();
        repo.register_class(a, false).unwrap();
        repo.register_class(i, false).unwrap();
        repo.register_class(b, false).unwrap();
        repo.register_class(c, false).unwrap();
        repo.close_hierarchy().unwrap();
        repo
    }

    #[test]
    fn subtyping_follows_extends_and_implements() {
        let repo = diamond_repo();
        assert!(repo.is_typeable_as("com/x/C", "com/x/A").unwrap());
        assert!(repo.is_typeable_as("com/x/C", "com/x/I").unwrap());
        assert!(repo.is_typeable_as("com/x/B", "java/lang/Object").unwrap());
        assert!(!repo.is_typeable_as("com/x/A", "com/x/C").unwrap());
        assert!(!repo.is_typeable_as("com/x/A", "com/x/I").unwrap());
    }

    #[test]
    fn least_common_class_walks_superclass_chains() {
        let repo = diamond_repo();
        assert_eq!(
            repo.least_common_class("com/x/C", "com/x/B").as_deref(),
            Some("com/x/B")
        );
        assert_eq!(
            repo.least_common_class("com/x/C", "com/x/A").as_deref(),
            Some("com/x/A")
        );
        // interfaces do not participate in the join
        assert_eq!(
            repo.least_common_class("com/x/C", "com/x/I").as_deref(),
            Some("java/lang/Object")
        );
        assert_eq!(repo.least_common_class("com/x/C", "com/x/Unknown"), None);
    }

    #[test]
    fn virtual_resolution_walks_the_chain_to_the_definition() {
        let repo = diamond_repo();
        let mref = MethodRef::new("com/x/B", "m", void_proto());
        let muid = repo
            .resolve_method(&mref, MethodSearch::Virtual, "com/x/B")
            .unwrap();
        assert_eq!(repo[muid].definer(), "com/x/A");

        let mref = MethodRef::new("com/x/C", "m", void_proto());
        let muid = repo
            .resolve_method(&mref, MethodSearch::Virtual, "com/x/C")
            .unwrap();
        assert_eq!(repo[muid].definer(), "com/x/C");
    }

    #[test]
    fn static_field_resolution_searches_interfaces() {
        let repo = diamond_repo();
        let fref = FieldRef::new("com/x/C", "CONST", Type::Int);
        let fuid = repo.resolve_field(&fref, FieldSearch::Static).unwrap();
        assert_eq!(repo[fuid].definer(), "com/x/I");
        assert!(repo.resolve_field(&fref, FieldSearch::Instance).is_none());
    }

    #[test]
    fn overriders_are_collected_from_subtypes() {
        let repo = diamond_repo();
        let overriders = repo.overriders("com/x/A", "m", &void_proto()).unwrap();
        assert_eq!(overriders.len(), 1);
        assert_eq!(repo[overriders[0]].definer(), "com/x/C");
    }

    #[test]
    fn access_rules_combine_class_and_member_visibility() {
        let repo = diamond_repo();
        assert!(repo.can_access("com/x/C", "com/x/A", Visibility::Public));
        assert!(repo.can_access("com/x/C", "com/x/A", Visibility::Package));
        assert!(repo.can_access("com/y/Far", "com/x/A", Visibility::Public));
        assert!(!repo.can_access("com/y/Far", "com/x/A", Visibility::Package));
        // protected members are reachable from subclasses
        assert!(repo.can_access("com/x/C", "com/x/A", Visibility::Protected));
        assert!(!repo.can_access("com/y/Far", "com/x/A", Visibility::Protected));
        assert!(!repo.can_access("com/x/C", "com/x/A", Visibility::Private));
        assert!(repo.can_access("com/x/A", "com/x/A", Visibility::Private));
    }

    #[test]
    fn registering_twice_keeps_the_first_definition() {
        let mut repo = Repo::new();
        repo.register_class(ClassDef::named("com/x/A"), false).unwrap();
        repo.register_class(ClassDef::named("com/x/A"), false).unwrap();
        repo.close_hierarchy().unwrap();
        assert_eq!(repo.iter_classes().filter(|c| c.name() == "com/x/A").count(), 1);
    }
}
