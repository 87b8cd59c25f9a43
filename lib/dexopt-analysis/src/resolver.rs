//! The reference resolver.
//!
//! Rebinds symbolic field and method references to their most specific
//! concrete definitions, narrows virtual dispatch sites using the
//! inferred receiver types, simplifies `invoke-super` and
//! `invoke-interface` forms, and optionally specializes declared
//! return types.
//!
//! Every rewrite is conservative: lookup ambiguity, inaccessibility or
//! an external mismatch leaves the site unchanged. The resolver never
//! produces per-method errors, it accumulates counters.

use crate::api::MinSdkApi;
use crate::errors::AnalysisResult;
use crate::repo::{Class, ClassUid, FieldSearch, Method, MethodSearch, MethodUid, Repo};
use crate::typing::TypeStates;
use dexopt_ir::instrs::{FieldOpKind, Instr, InvokeKind};
use dexopt_ir::refs::{FieldRef, MethodRef};
use dexopt_ir::types::Type;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

/// Recognized options of the resolver pass.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Permit rewriting references to targets owned by platform
    /// classes, still gated by the min-SDK surface.
    pub refine_to_external: bool,
    /// Rewrite `invoke-super` to `invoke-virtual` when the callee is
    /// final.
    pub desuperify: bool,
    /// Collect and apply return type specializations, then re-run
    /// virtual refinement.
    pub specialize_rtype: bool,
    /// Inferred rewrites whose target starts with any of these
    /// prefixes are rejected.
    pub excluded_externals: Vec<String>,
    /// Worker threads for the per-method parallel phase; 0 keeps the
    /// process-wide default.
    pub num_threads: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            refine_to_external: false,
            desuperify: true,
            specialize_rtype: false,
            excluded_externals: Vec::new(),
            num_threads: 0,
        }
    }
}

/// Counters accumulated over one resolver run. Merged per-thread
/// results are combined with `+=`, which is commutative.
#[derive(Debug, Default)]
pub struct RefStats {
    pub method_refs_resolved: usize,
    pub field_refs_resolved: usize,
    pub num_invoke_virtual_refined: usize,
    pub num_invoke_interface_replaced: usize,
    pub num_invoke_super_removed: usize,
    pub num_rtype_specialization_candidates: usize,

    // public promotions are the only cross-method effect; they are
    // collected here and applied after the parallel phase
    public_promotions: BTreeSet<ClassUid>,
    // per method, the join of the inferred types of its return-object
    // sources; None poisons the method (some return was not inferred)
    rtype_candidates: BTreeMap<MethodUid, Option<Type>>,
}

impl AddAssign for RefStats {
    fn add_assign(&mut self, other: Self) {
        self.method_refs_resolved += other.method_refs_resolved;
        self.field_refs_resolved += other.field_refs_resolved;
        self.num_invoke_virtual_refined += other.num_invoke_virtual_refined;
        self.num_invoke_interface_replaced += other.num_invoke_interface_replaced;
        self.num_invoke_super_removed += other.num_invoke_super_removed;
        self.num_rtype_specialization_candidates += other.num_rtype_specialization_candidates;
        self.public_promotions.extend(other.public_promotions);
        self.rtype_candidates.extend(other.rtype_candidates);
    }
}

impl RefStats {
    pub fn log(&self) {
        log::info!("[ref reso] method refs resolved {}", self.method_refs_resolved);
        log::info!("[ref reso] field refs resolved {}", self.field_refs_resolved);
        log::info!(
            "[ref reso] invoke-virtual refined {}",
            self.num_invoke_virtual_refined
        );
        log::info!(
            "[ref reso] invoke-interface replaced {}",
            self.num_invoke_interface_replaced
        );
        log::info!(
            "[ref reso] invoke-super removed {}",
            self.num_invoke_super_removed
        );
        log::info!(
            "[ref reso] rtype specialization candidates {}",
            self.num_rtype_specialization_candidates
        );
    }
}

/// The resolver pass. Method-level work is embarrassingly parallel:
/// each worker rewrites only the method it owns, the repository is
/// shared read-only, and class promotions are deferred.
pub struct ResolveRefs<'a> {
    config: ResolverConfig,
    min_sdk_api: &'a MinSdkApi,
}

impl<'a> ResolveRefs<'a> {
    #[must_use]
    pub fn new(config: ResolverConfig, min_sdk_api: &'a MinSdkApi) -> Self {
        Self {
            config,
            min_sdk_api,
        }
    }

    /// Runs the pass over every program method.
    ///
    /// # Errors
    ///
    /// Only fatal conditions (malformed IR) abort the pass.
    pub fn run(&self, repo: &mut Repo) -> AnalysisResult<RefStats> {
        match self.config.num_threads {
            0 => self.run_phases(repo),
            threads => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| crate::errors::AnalysisError::Internal(err.to_string()))?;
                pool.install(|| self.run_phases(repo))
            }
        }
    }

    fn run_phases(&self, repo: &mut Repo) -> AnalysisResult<RefStats> {
        let mut stats = self.parallel_phase(
            repo,
            true,
            self.config.desuperify,
            self.config.specialize_rtype,
        )?;
        apply_promotions(repo, &mut stats);

        if self.config.specialize_rtype {
            let candidates = collect_specializable(repo, &stats);
            stats.num_rtype_specialization_candidates = candidates.len();
            for (muid, rtype) in candidates {
                specialize_rtype(repo, muid, rtype);
            }

            // resolve virtual refs again based on the new rtypes, with
            // further collection and desuperification disabled
            let mut second = self.parallel_phase(repo, false, false, false)?;
            apply_promotions(repo, &mut second);
            stats += second;
        }

        stats.log();
        Ok(stats)
    }

    fn parallel_phase(
        &self,
        repo: &Repo,
        resolve: bool,
        desuperify: bool,
        specialize_rtype: bool,
    ) -> AnalysisResult<RefStats> {
        repo.methods()
            .par_iter()
            .filter(|method| method.code().is_some() && !repo[method.class_uid()].is_external())
            .map(|method| {
                let mut local = RefStats::default();
                if resolve {
                    self.resolve_refs(method, repo, &mut local);
                }
                self.refine_virtual_callsites(
                    method,
                    repo,
                    desuperify,
                    specialize_rtype,
                    &mut local,
                )?;
                Ok(local)
            })
            .try_reduce(RefStats::default, |mut acc, local| {
                acc += local;
                Ok(acc)
            })
    }

    /// Rebinds field and method references to their definitions along
    /// the class hierarchy.
    fn resolve_refs(&self, method: &Method, repo: &Repo, stats: &mut RefStats) {
        let code = method.code().expect("filtered on methods with code");
        let mut code = code.write().expect("code lock poisoned");

        for linstr in code.iter_instructions_mut() {
            let instr = linstr.instr_mut();

            let method_rewrite = instr.invoke().and_then(|(kind, _, mref)| {
                // direct refs are already definitions by construction
                if kind == InvokeKind::Direct {
                    None
                } else {
                    self.resolve_mref(method, kind, mref, repo, stats)
                }
            });
            if let Some(new_ref) = method_rewrite {
                instr.set_method_ref(new_ref);
                stats.method_refs_resolved += 1;
                continue;
            }

            let field_rewrite = instr
                .field_access()
                .and_then(|(op, fref)| self.resolve_fref(op, fref, repo, stats));
            if let Some(new_ref) = field_rewrite {
                instr.set_field_ref(new_ref);
                stats.field_refs_resolved += 1;
            }
        }
    }

    fn resolve_mref(
        &self,
        method: &Method,
        kind: InvokeKind,
        mref: &MethodRef,
        repo: &Repo,
        stats: &mut RefStats,
    ) -> Option<MethodRef> {
        let search = MethodSearch::of_invoke(kind);
        let muid = repo.resolve_method(mref, search, method.definer())?;
        let mdef = &repo[muid];
        if mdef.descriptor() == mref {
            return None;
        }
        log::debug!("resolving {mref} => {}", mdef.descriptor());
        let cls = &repo[mdef.class_uid()];
        if !self.admissible_external(cls, || self.min_sdk_api.has_method(mdef.descriptor())) {
            return None;
        }
        if !cls.is_public() {
            if cls.is_external() {
                return None;
            }
            stats.public_promotions.insert(cls.uid());
        }
        Some(mdef.descriptor().clone())
    }

    fn resolve_fref(
        &self,
        op: FieldOpKind,
        fref: &FieldRef,
        repo: &Repo,
        stats: &mut RefStats,
    ) -> Option<FieldRef> {
        let search = if op.is_static() {
            FieldSearch::Static
        } else {
            FieldSearch::Instance
        };
        let fuid = repo.resolve_field(fref, search)?;
        let fdef = &repo[fuid];
        if fdef.descriptor() == fref {
            return None;
        }
        let cls = &repo[fdef.class_uid()];
        if !self.admissible_external(cls, || self.min_sdk_api.has_field(fdef.descriptor())) {
            return None;
        }
        if !cls.is_public() {
            if cls.is_external() {
                return None;
            }
            stats.public_promotions.insert(cls.uid());
        }
        log::debug!("resolving {fref} => {}", fdef.descriptor());
        Some(fdef.descriptor().clone())
    }

    /// External targets are only admissible when the configuration
    /// allows them and the min-SDK surface has the member.
    fn admissible_external(&self, cls: &Class, in_min_sdk: impl Fn() -> bool) -> bool {
        if !cls.is_external() {
            return true;
        }
        if !self.config.refine_to_external {
            return false;
        }
        if !in_min_sdk() {
            log::debug!("bailed on min-sdk mismatch within {}", cls.name());
            return false;
        }
        true
    }

    /// Narrows `invoke-virtual` and `invoke-interface` sites using the
    /// inferred concrete receiver classes, desuperifies final callees,
    /// and collects inferred return types for specialization.
    fn refine_virtual_callsites(
        &self,
        method: &Method,
        repo: &Repo,
        desuperify: bool,
        specialize_rtype: bool,
        stats: &mut RefStats,
    ) -> AnalysisResult<()> {
        let states = TypeStates::forward_compute(method, repo)?;

        let code = method.code().expect("filtered on methods with code");
        let mut code = code.write().expect("code lock poisoned");

        let mut rtype_seen = false;
        let mut rtype_join: Option<Type> = None;

        for linstr in code.iter_instructions_mut() {
            let addr = linstr.addr();
            let instr = linstr.instr_mut();

            if desuperify {
                try_desuperify(method, instr, repo, stats);
            }

            if specialize_rtype {
                if let Instr::ReturnObject(src) = instr {
                    let inferred = states
                        .entries
                        .get(&addr)
                        .and_then(|env| env.get_dex_type(*src).cloned());
                    rtype_join = match (rtype_seen, rtype_join.take(), inferred) {
                        (false, _, inferred) => inferred,
                        (true, Some(acc), Some(inferred)) => join_rtypes(repo, acc, &inferred),
                        _ => None,
                    };
                    rtype_seen = true;
                    continue;
                }
            }

            let invoke = instr
                .invoke()
                .map(|(kind, args, mref)| (kind, args.clone(), mref.clone()));
            let Some((kind, args, mref)) = invoke else {
                continue;
            };
            if kind != InvokeKind::Virtual && kind != InvokeKind::Interface {
                continue;
            }

            let Some(this_reg) = args.first() else {
                continue;
            };
            let Some(receiver_type) = states
                .entries
                .get(&addr)
                .and_then(|env| env.get_dex_type(this_reg).cloned())
            else {
                // unsuccessful inference
                continue;
            };

            let Some(muid) = self.inferred_method_def(method, &mref, &receiver_type, repo) else {
                continue;
            };
            let mdef = &repo[muid];
            if mdef.descriptor() == &mref {
                continue;
            }
            let def_cls = &repo[mdef.class_uid()];
            if !self.admissible_external(def_cls, || self.min_sdk_api.has_method(mdef.descriptor()))
            {
                continue;
            }

            log::debug!("refining {mref} => {}", mdef.descriptor());
            if kind == InvokeKind::Interface && !def_cls.is_interface() {
                *instr = Instr::InvokeVirtual(args, mdef.descriptor().clone());
                stats.num_invoke_interface_replaced += 1;
            } else {
                instr.set_method_ref(mdef.descriptor().clone());
                stats.num_invoke_virtual_refined += 1;
            }
        }

        if specialize_rtype && rtype_seen {
            stats.rtype_candidates.insert(method.uid(), rtype_join);
        }
        Ok(())
    }

    /// The most specific override of the callee resolvable against the
    /// inferred receiver class, if it is admissible.
    fn inferred_method_def(
        &self,
        caller: &Method,
        mref: &MethodRef,
        receiver_type: &Type,
        repo: &Repo,
    ) -> Option<MethodUid> {
        let receiver_cls = receiver_type.as_class_name().ok()?;
        let rebound = mref.rebind(receiver_cls);
        let muid = repo.resolve_method(&rebound, MethodSearch::Virtual, caller.definer())?;
        let mdef = &repo[muid];
        let cls = &repo[mdef.class_uid()];

        if cls.is_external() && self.is_excluded_external(&mdef.descriptor().to_string()) {
            log::debug!("bailed on excluded external {}", mdef.descriptor());
            return None;
        }
        if !repo.can_access(caller.definer(), mdef.definer(), mdef.visibility()) {
            log::debug!(
                "bailed on inaccessible {} from {}",
                mdef.descriptor(),
                caller.definer()
            );
            return None;
        }
        Some(muid)
    }

    fn is_excluded_external(&self, name: &str) -> bool {
        self.config
            .excluded_externals
            .iter()
            .any(|excluded| name.starts_with(excluded.as_str()))
    }
}

/// `invoke-super` on a final, non-external, non-interface callee
/// dispatches exactly like `invoke-virtual`, and the virtual form is
/// cheaper at runtime.
fn try_desuperify(method: &Method, instr: &mut Instr, repo: &Repo, stats: &mut RefStats) {
    let rewrite = match instr.invoke() {
        Some((InvokeKind::Super, args, mref)) => {
            // skip interface default methods
            let callee_is_interface = repo
                .get_class_by_name(mref.definer())
                .map_or(true, Class::is_interface);
            if callee_is_interface {
                return;
            }
            let Some(muid) = repo.resolve_method_above(method.definer(), mref.name(), mref.proto())
            else {
                return;
            };
            let callee = &repo[muid];
            // external methods may not stay final across releases
            if repo[callee.class_uid()].is_external() || !callee.is_final() {
                return;
            }
            log::debug!("desuperifying {mref} because {} is final", callee.descriptor());
            Some((args.clone(), mref.clone()))
        }
        _ => None,
    };
    if let Some((args, mref)) = rewrite {
        *instr = Instr::InvokeVirtual(args, mref);
        stats.num_invoke_super_removed += 1;
    }
}

fn apply_promotions(repo: &mut Repo, stats: &mut RefStats) {
    for cuid in std::mem::take(&mut stats.public_promotions) {
        repo.set_public(cuid);
    }
}

fn join_rtypes(repo: &Repo, acc: Type, other: &Type) -> Option<Type> {
    if &acc == other {
        return Some(acc);
    }
    match (&acc, other) {
        (Type::Class(name1), Type::Class(name2)) => {
            repo.least_common_class(name1, name2).map(Type::Class)
        }
        _ => None,
    }
}

/// A method is specializable when every `return-object` source was
/// inferred, the join is strictly more specific than the declared
/// return type, and all overriders agree on a type at least as
/// specific.
fn collect_specializable(repo: &Repo, stats: &RefStats) -> Vec<(MethodUid, Type)> {
    let mut candidates = Vec::new();
    for (muid, rtype_join) in &stats.rtype_candidates {
        let Some(rtype) = rtype_join else {
            continue;
        };
        let Type::Class(inferred_name) = rtype else {
            continue;
        };
        let method = &repo[*muid];
        let Type::Class(declared_name) = method.return_type() else {
            continue;
        };
        if inferred_name == declared_name
            || !repo
                .is_typeable_as(inferred_name, declared_name)
                .unwrap_or(false)
        {
            continue;
        }
        let Ok(overriders) = repo.overriders(method.definer(), method.name(), method.proto())
        else {
            continue;
        };
        let compatible = overriders.iter().all(|ouid| {
            matches!(
                stats.rtype_candidates.get(ouid),
                Some(Some(Type::Class(name)))
                    if repo.is_typeable_as(name, inferred_name).unwrap_or(false)
            )
        });
        if compatible {
            candidates.push((*muid, rtype.clone()));
        }
    }
    candidates
}

/// Rewrites the declared return type of the method and of its whole
/// override cluster, so the override relation keeps holding.
fn specialize_rtype(repo: &mut Repo, muid: MethodUid, rtype: Type) {
    let method = &repo[muid];
    let (definer, name, proto) = (
        method.definer().to_string(),
        method.name().to_string(),
        method.proto().clone(),
    );
    let overriders = repo
        .overriders(&definer, &name, &proto)
        .unwrap_or_default();
    log::debug!("specializing {definer}->{name} return type to {rtype}");
    repo.set_return_type(muid, rtype.clone());
    for ouid in overriders {
        repo.set_return_type(ouid, rtype.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;
    use dexopt_ir::code::Code;
    use dexopt_ir::defs::{ClassDef, FieldDef, MethodDef};
    use dexopt_ir::flags::{ClassFlags, FieldFlags, MethodFlags};
    use dexopt_ir::refs::Proto;
    use dexopt_ir::registers::{Reg, RegList};
    use dexopt_ir::Addr;

    fn reg_list(regs: Vec<u16>) -> RegList {
        RegList::from(regs)
    }

    fn empty_body_method(name: &str, flags: MethodFlags) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            proto: Proto::new(Type::Void, vec![]),
            flags,
            code: Some(Code::new(1, vec![Instr::ReturnVoid])),
        }
    }

    fn static_method(name: &str, proto: Proto, registers: u16, instrs: Vec<Instr>) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            proto,
            flags: MethodFlags::ACC_PUBLIC | MethodFlags::ACC_STATIC,
            code: Some(Code::new(registers, instrs)),
        }
    }

    fn close(mut repo: Repo) -> Repo {
        repo.close_hierarchy().unwrap();
        repo
    }

    fn run_pass(repo: &mut Repo, config: ResolverConfig, api: &MinSdkApi) -> RefStats {
        ResolveRefs::new(config, api).run(repo).unwrap()
    }

    fn first_instr_of(repo: &Repo, class: &str, name: &str) -> Instr {
        let method = repo
            .get_class_by_name(class)
            .unwrap()
            .iter_methods(repo)
            .find(|m| m.name() == name)
            .unwrap();
        let code = method.code().unwrap().read().unwrap();
        code.instruction_at(Addr(0)).unwrap().instr().clone()
    }

    #[test]
    fn virtual_calls_are_refined_to_the_inferred_receiver() {
        let mut base = ClassDef::named("com/test/Base");
        base.methods
            .push(empty_body_method("m", MethodFlags::ACC_PUBLIC));
        let mut derived = ClassDef::named("com/test/Derived");
        derived.superclass = Some("com/test/Base".to_string());
        derived
            .methods
            .push(empty_body_method("m", MethodFlags::ACC_PUBLIC));
        let mut foo = ClassDef::named("com/test/Foo");
        foo.methods.push(static_method(
            "foo",
            Proto::new(Type::Void, vec![Type::class("com/test/Derived")]),
            1,
            vec![
                Instr::InvokeVirtual(
                    reg_list(vec![0]),
                    MethodRef::new("com/test/Base", "m", Proto::new(Type::Void, vec![])),
                ),
                Instr::ReturnVoid,
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(base, false).unwrap();
        repo.register_class(derived, false).unwrap();
        repo.register_class(foo, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.num_invoke_virtual_refined, 1);

        let instr = first_instr_of(&repo, "com/test/Foo", "foo");
        let (kind, _, mref) = instr.invoke().unwrap();
        assert_eq!(kind, InvokeKind::Virtual);
        assert_eq!(mref.definer(), "com/test/Derived");
    }

    #[test]
    fn super_calls_on_final_callees_are_desuperified() {
        let mut b = ClassDef::named("com/test/B");
        b.methods.push(empty_body_method(
            "f",
            MethodFlags::ACC_PUBLIC | MethodFlags::ACC_FINAL,
        ));
        let mut c = ClassDef::named("com/test/C");
        c.superclass = Some("com/test/B".to_string());
        c.methods.push(MethodDef {
            name: "c".to_string(),
            proto: Proto::new(Type::Void, vec![]),
            flags: MethodFlags::ACC_PUBLIC,
            code: Some(Code::new(
                1,
                vec![
                    Instr::InvokeSuper(
                        reg_list(vec![0]),
                        MethodRef::new("com/test/B", "f", Proto::new(Type::Void, vec![])),
                    ),
                    Instr::ReturnVoid,
                ],
            )),
        });

        let mut repo = Repo::new();
        repo.register_class(b, false).unwrap();
        repo.register_class(c, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.num_invoke_super_removed, 1);
        assert_eq!(stats.num_invoke_virtual_refined, 0);

        let instr = first_instr_of(&repo, "com/test/C", "c");
        let (kind, _, mref) = instr.invoke().unwrap();
        assert_eq!(kind, InvokeKind::Virtual);
        assert_eq!(mref.definer(), "com/test/B");
    }

    #[test]
    fn interface_calls_become_virtual_on_concrete_receivers() {
        let mut iface = ClassDef::named("com/test/I");
        iface.flags = ClassFlags::ACC_PUBLIC | ClassFlags::ACC_INTERFACE | ClassFlags::ACC_ABSTRACT;
        iface.methods.push(MethodDef {
            name: "m".to_string(),
            proto: Proto::new(Type::Void, vec![]),
            flags: MethodFlags::ACC_PUBLIC | MethodFlags::ACC_ABSTRACT,
            code: None,
        });
        let mut impl_cls = ClassDef::named("com/test/Impl");
        impl_cls.interfaces.push("com/test/I".to_string());
        impl_cls
            .methods
            .push(empty_body_method("m", MethodFlags::ACC_PUBLIC));
        let mut foo = ClassDef::named("com/test/Foo");
        foo.methods.push(static_method(
            "foo",
            Proto::new(Type::Void, vec![Type::class("com/test/Impl")]),
            1,
            vec![
                Instr::InvokeInterface(
                    reg_list(vec![0]),
                    MethodRef::new("com/test/I", "m", Proto::new(Type::Void, vec![])),
                ),
                Instr::ReturnVoid,
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(iface, false).unwrap();
        repo.register_class(impl_cls, false).unwrap();
        repo.register_class(foo, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.num_invoke_interface_replaced, 1);

        let instr = first_instr_of(&repo, "com/test/Foo", "foo");
        let (kind, _, mref) = instr.invoke().unwrap();
        assert_eq!(kind, InvokeKind::Virtual);
        assert_eq!(mref.definer(), "com/test/Impl");
    }

    fn external_field_fixture() -> Repo {
        let mut build = ClassDef::named("android/os/Build");
        build.fields.push(FieldDef {
            name: "VERSION".to_string(),
            type_: Type::Int,
            flags: FieldFlags::ACC_PUBLIC | FieldFlags::ACC_STATIC | FieldFlags::ACC_FINAL,
        });
        let mut config_cls = ClassDef::named("com/app/Config");
        config_cls.superclass = Some("android/os/Build".to_string());
        let mut app = ClassDef::named("com/app/App");
        app.methods.push(static_method(
            "ver",
            Proto::new(Type::Int, vec![]),
            1,
            vec![
                Instr::Sget(
                    Reg::from(0),
                    FieldRef::new("com/app/Config", "VERSION", Type::Int),
                ),
                Instr::Return(Reg::from(0)),
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(build, true).unwrap();
        repo.register_class(config_cls, false).unwrap();
        repo.register_class(app, false).unwrap();
        close(repo)
    }

    #[test]
    fn external_field_rebinds_are_rejected_by_default() {
        let mut repo = external_field_fixture();
        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.field_refs_resolved, 0);

        let instr = first_instr_of(&repo, "com/app/App", "ver");
        let (_, fref) = instr.field_access().unwrap();
        assert_eq!(fref.definer(), "com/app/Config");
    }

    #[test]
    fn external_field_rebinds_are_gated_by_the_min_sdk() {
        let mut repo = external_field_fixture();
        let mut api = MinSdkApi::new();
        api.insert_field(FieldRef::new("android/os/Build", "VERSION", Type::Int));
        let config = ResolverConfig {
            refine_to_external: true,
            ..ResolverConfig::default()
        };
        let stats = run_pass(&mut repo, config, &api);
        assert_eq!(stats.field_refs_resolved, 1);

        let instr = first_instr_of(&repo, "com/app/App", "ver");
        let (_, fref) = instr.field_access().unwrap();
        assert_eq!(fref.definer(), "android/os/Build");
    }

    #[test]
    fn external_field_rebinds_missing_from_the_min_sdk_are_rejected() {
        let mut repo = external_field_fixture();
        let api = MinSdkApi::new();
        let config = ResolverConfig {
            refine_to_external: true,
            ..ResolverConfig::default()
        };
        let stats = run_pass(&mut repo, config, &api);
        assert_eq!(stats.field_refs_resolved, 0);
    }

    #[test]
    fn rebinding_promotes_the_owning_class_to_public() {
        let mut holder = ClassDef::named("com/a/Holder");
        holder.flags = ClassFlags::empty();
        holder.fields.push(FieldDef {
            name: "x".to_string(),
            type_: Type::Int,
            flags: FieldFlags::ACC_PUBLIC | FieldFlags::ACC_STATIC,
        });
        let mut sub = ClassDef::named("com/a/Sub");
        sub.superclass = Some("com/a/Holder".to_string());
        let mut user = ClassDef::named("com/b/User");
        user.methods.push(static_method(
            "peek",
            Proto::new(Type::Int, vec![]),
            1,
            vec![
                Instr::Sget(Reg::from(0), FieldRef::new("com/a/Sub", "x", Type::Int)),
                Instr::Return(Reg::from(0)),
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(holder, false).unwrap();
        repo.register_class(sub, false).unwrap();
        repo.register_class(user, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.field_refs_resolved, 1);
        assert!(repo.get_class_by_name("com/a/Holder").unwrap().is_public());
    }

    #[test]
    fn method_refs_are_rebound_to_their_definitions() {
        let mut base = ClassDef::named("com/test/Base");
        base.methods
            .push(empty_body_method("m", MethodFlags::ACC_PUBLIC));
        let mut sub = ClassDef::named("com/test/Sub");
        sub.superclass = Some("com/test/Base".to_string());
        let mut foo = ClassDef::named("com/test/Foo");
        foo.methods.push(static_method(
            "foo",
            Proto::new(Type::Void, vec![Type::class("com/test/Sub")]),
            1,
            vec![
                Instr::InvokeVirtual(
                    reg_list(vec![0]),
                    MethodRef::new("com/test/Sub", "m", Proto::new(Type::Void, vec![])),
                ),
                Instr::ReturnVoid,
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(base, false).unwrap();
        repo.register_class(sub, false).unwrap();
        repo.register_class(foo, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let stats = run_pass(&mut repo, ResolverConfig::default(), &api);
        assert_eq!(stats.method_refs_resolved, 1);

        let instr = first_instr_of(&repo, "com/test/Foo", "foo");
        let (_, _, mref) = instr.invoke().unwrap();
        assert_eq!(mref.definer(), "com/test/Base");
    }

    #[test]
    fn excluded_external_prefixes_block_refinement() {
        let mut base = ClassDef::named("android/view/View");
        base.methods
            .push(empty_body_method("draw", MethodFlags::ACC_PUBLIC));
        let mut special = ClassDef::named("android/view/Special");
        special.superclass = Some("android/view/View".to_string());
        special
            .methods
            .push(empty_body_method("draw", MethodFlags::ACC_PUBLIC));
        let mut foo = ClassDef::named("com/test/Foo");
        foo.methods.push(static_method(
            "foo",
            Proto::new(Type::Void, vec![Type::class("android/view/Special")]),
            1,
            vec![
                Instr::InvokeVirtual(
                    reg_list(vec![0]),
                    MethodRef::new("android/view/View", "draw", Proto::new(Type::Void, vec![])),
                ),
                Instr::ReturnVoid,
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(base, true).unwrap();
        repo.register_class(special, true).unwrap();
        repo.register_class(foo, false).unwrap();
        let mut repo = close(repo);

        let mut api = MinSdkApi::new();
        api.insert_method(MethodRef::new(
            "android/view/Special",
            "draw",
            Proto::new(Type::Void, vec![]),
        ));
        let config = ResolverConfig {
            refine_to_external: true,
            excluded_externals: vec!["Landroid/view/Special;".to_string()],
            ..ResolverConfig::default()
        };
        let stats = run_pass(&mut repo, config, &api);
        assert_eq!(stats.num_invoke_virtual_refined, 0);
    }

    #[test]
    fn return_types_are_specialized_from_inferred_returns() {
        let base = ClassDef::named("com/test/Base");
        let mut derived = ClassDef::named("com/test/Derived");
        derived.superclass = Some("com/test/Base".to_string());
        derived.methods.push(MethodDef {
            name: "<init>".to_string(),
            proto: Proto::new(Type::Void, vec![]),
            flags: MethodFlags::ACC_PUBLIC | MethodFlags::ACC_CONSTRUCTOR,
            code: Some(Code::new(1, vec![Instr::ReturnVoid])),
        });
        let mut factory = ClassDef::named("com/test/Factory");
        factory.methods.push(static_method(
            "make",
            Proto::new(Type::class("com/test/Base"), vec![]),
            1,
            vec![
                Instr::NewInstance(Reg::from(0), Type::class("com/test/Derived")),
                Instr::InvokeDirect(
                    reg_list(vec![0]),
                    MethodRef::new("com/test/Derived", "<init>", Proto::new(Type::Void, vec![])),
                ),
                Instr::ReturnObject(Reg::from(0)),
            ],
        ));

        let mut repo = Repo::new();
        repo.register_class(base, false).unwrap();
        repo.register_class(derived, false).unwrap();
        repo.register_class(factory, false).unwrap();
        let mut repo = close(repo);

        let api = MinSdkApi::new();
        let config = ResolverConfig {
            specialize_rtype: true,
            ..ResolverConfig::default()
        };
        let stats = run_pass(&mut repo, config, &api);
        assert_eq!(stats.num_rtype_specialization_candidates, 1);

        let make = repo
            .get_class_by_name("com/test/Factory")
            .unwrap()
            .iter_methods(&repo)
            .find(|m| m.name() == "make")
            .unwrap();
        assert_eq!(make.return_type(), &Type::class("com/test/Derived"));
    }
}
