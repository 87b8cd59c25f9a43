//! The per-method type checker.
//!
//! The checker takes a method, infers the type of all registers and
//! validates that every operation is well typed against the platform
//! verifier rules. The inferred types stay available through
//! [`TypeChecker::get_type`] for passes that need them. Checking stops
//! at the first error encountered.
//!
//! Invoke instructions are assumed to be in denormalized form: wide
//! arguments are explicitly represented by a pair of consecutive
//! registers. The checker never modifies the IR.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::repo::{FieldSearch, Method, MethodSearch, MethodUid, Repo};
use crate::typing::errors::CheckError;
use crate::typing::{IRType, TypeEnvironment, TypeStates, JAVA_LANG_THROWABLE};
use dexopt_ir::instrs::{Instr, Instruction, InvokeKind, LabeledInstr};
use dexopt_ir::refs::MethodRef;
use dexopt_ir::registers::{Reg, RegList};
use dexopt_ir::types::Type;
use dexopt_ir::Addr;

/// The per-method type checker.
///
/// `run` transitions the checker from *pending* to *complete*;
/// `good`, `fail`, `what` and the type accessors are only meaningful
/// afterwards and panic when consulted on a pending checker.
pub struct TypeChecker<'a> {
    repo: &'a Repo,
    method: MethodUid,
    validate_access: bool,
    verify_moves: bool,
    check_no_overwrite_this: bool,
    complete: bool,
    states: Option<TypeStates>,
    error: Option<CheckError>,
}

impl<'a> TypeChecker<'a> {
    #[must_use]
    pub fn new(method: MethodUid, repo: &'a Repo) -> Self {
        Self {
            repo,
            method,
            validate_access: false,
            verify_moves: false,
            check_no_overwrite_this: false,
            complete: false,
            states: None,
            error: None,
        }
    }

    /// `⊤` represents an undefined value and should never occur as an
    /// instruction operand. The platform verifier allows one
    /// exception: an undefined value used as the operand of a `move-*`
    /// instruction. By default the checker complies; enabling this
    /// switch makes a `move-*` reading an undefined register a hard
    /// type error.
    pub fn verify_moves(&mut self) {
        if !self.complete {
            // this parameter can only be set before running
            self.verify_moves = true;
        }
    }

    /// Makes any write to the receiver register of an instance method
    /// a type error; some platform runtimes miscompile such methods.
    pub fn check_no_overwrite_this(&mut self) {
        if !self.complete {
            // this parameter can only be set before running
            self.check_no_overwrite_this = true;
        }
    }

    /// Also validates that every referenced field and method is
    /// accessible from the checked method.
    pub fn validate_access(&mut self) {
        if !self.complete {
            // this parameter can only be set before running
            self.validate_access = true;
        }
    }

    /// Runs type inference, then sweeps the instructions in address
    /// order and records the first precondition violation. Idempotent.
    ///
    /// # Errors
    ///
    /// Only fatal conditions (malformed IR) are returned as errors;
    /// per-method type errors are reported through
    /// [`fail`](Self::fail) and [`what`](Self::what).
    pub fn run(&mut self) -> AnalysisResult<()> {
        if self.complete {
            return Ok(());
        }
        let repo = self.repo;
        let method = &repo[self.method];
        log::debug!("typecheck {method}");
        let states = TypeStates::forward_compute(method, repo)?;

        let swept = self.sweep(method, &states);
        self.states = Some(states);
        self.complete = true;
        match swept {
            Ok(()) => Ok(()),
            Err(AnalysisError::Check(error)) => {
                log::debug!("typecheck failed on {method}: {error}");
                self.error = Some(error);
                Ok(())
            }
            Err(fatal) => Err(fatal),
        }
    }

    fn check_completion(&self) {
        assert!(
            self.complete,
            "the type checker did not run on method {}",
            self.repo[self.method]
        );
    }

    #[must_use]
    pub fn good(&self) -> bool {
        self.check_completion();
        self.error.is_none()
    }

    #[must_use]
    pub fn fail(&self) -> bool {
        self.check_completion();
        self.error.is_some()
    }

    /// A legible description of the type error, or `"OK"`.
    #[must_use]
    pub fn what(&self) -> String {
        self.check_completion();
        self.error
            .as_ref()
            .map_or_else(|| "OK".to_string(), CheckError::to_string)
    }

    #[must_use]
    pub fn error(&self) -> Option<&CheckError> {
        self.check_completion();
        self.error.as_ref()
    }

    /// The scalar type of `reg` at the instruction entry, i.e. the
    /// type of the register *before* the instruction executes.
    pub fn get_type(&self, addr: Addr, reg: Reg) -> AnalysisResult<IRType> {
        self.check_completion();
        self.entry_state(addr)?.get_type(reg)
    }

    /// The inferred concrete class of `reg` at the instruction entry,
    /// if known.
    pub fn get_dex_type(&self, addr: Addr, reg: Reg) -> AnalysisResult<Option<Type>> {
        self.check_completion();
        Ok(self.entry_state(addr)?.get_dex_type(reg).cloned())
    }

    fn entry_state(&self, addr: Addr) -> AnalysisResult<&TypeEnvironment> {
        self.states
            .as_ref()
            .expect("complete checkers hold their states")
            .entries
            .get(&addr)
            .ok_or_else(|| {
                AnalysisError::Internal(format!("no state recorded at address {addr}"))
            })
    }

    fn sweep(&self, method: &Method, states: &TypeStates) -> AnalysisResult<()> {
        let code = method.code().ok_or(AnalysisError::NoCode)?;
        let code = code.read().expect("code lock poisoned");

        let this_reg = if method.is_static() {
            None
        } else {
            let nb_param_registers = method.proto().parameter_registers() + 1;
            Some(Reg::from(
                code.registers_size() - nb_param_registers as u16,
            ))
        };

        for linstr in code.iter_instructions() {
            // instructions with no recorded entry state are
            // unreachable from the method entry
            let Some(env) = states.entries.get(&linstr.addr()) else {
                continue;
            };
            let ctx = InstrCtx {
                repo: self.repo,
                env,
                addr: linstr.addr(),
                mnemonic: linstr.instr().mnemonic(),
                verify_moves: self.verify_moves,
            };
            if self.check_no_overwrite_this {
                if let (Some(this_reg), Some((dest, wide))) = (this_reg, linstr.instr().dest()) {
                    if dest == this_reg || (wide && dest.next() == this_reg) {
                        return Err(CheckError::OverwriteThis {
                            addr: ctx.addr,
                            mnemonic: ctx.mnemonic,
                        }
                        .into());
                    }
                }
            }
            self.check_instruction(linstr, &ctx, method)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn check_instruction(
        &self,
        linstr: &LabeledInstr,
        ctx: &InstrCtx<'_>,
        method: &Method,
    ) -> AnalysisResult<()> {
        use IRType::*;

        match linstr.instr() {
            Instr::Nop
            | Instr::Goto(_)
            | Instr::Const(_, _)
            | Instr::ConstWide(_, _)
            | Instr::ConstString(_, _)
            | Instr::ConstClass(_, _)
            | Instr::NewInstance(_, _) => Ok(()),

            Instr::Move(_, src) => ctx.assume_moved_scalar(*src),
            Instr::MoveObject(_, src) => ctx.assume_moved_reference(*src),
            Instr::MoveWide(_, src) => ctx.assume_moved_wide(*src),

            Instr::MoveResult(dst) => {
                let found = ctx.env.result().scalar();
                ctx.check_result(found, *dst)?;
                if !found.leq(Scalar) {
                    return Err(ctx.scalar_mismatch(*dst, found, Scalar));
                }
                Ok(())
            }
            Instr::MoveResultObject(dst) => {
                let found = ctx.env.result().scalar();
                ctx.check_result(found, *dst)?;
                if !found.leq(Reference) {
                    return Err(ctx.scalar_mismatch(*dst, found, Reference));
                }
                Ok(())
            }
            Instr::MoveResultWide(dst) => {
                let found = ctx.env.result().scalar();
                if found == Top {
                    return Err(ctx.undefined(*dst));
                }
                if !found.is_wide_first() {
                    return Err(ctx.wide_mismatch(*dst));
                }
                Ok(())
            }

            Instr::ReturnVoid => match method.return_type() {
                Type::Void => Ok(()),
                _ => Err(ctx.return_mismatch()),
            },
            Instr::Return(ret) => match method.return_type() {
                Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int => {
                    ctx.assume(*ret, Int)
                }
                Type::Float => ctx.assume(*ret, Float),
                _ => Err(ctx.return_mismatch()),
            },
            Instr::ReturnWide(ret) => match method.return_type() {
                Type::Long => ctx.assume_wide_kind(*ret, Long1),
                Type::Double => ctx.assume_wide_kind(*ret, Double1),
                _ => Err(ctx.return_mismatch()),
            },
            Instr::ReturnObject(ret) => {
                let rtype = method.return_type();
                if !rtype.is_reference() {
                    return Err(ctx.return_mismatch());
                }
                ctx.assume_reference(*ret)?;
                if let Some(found) = ctx.env.get_dex_type(*ret) {
                    if definitely_not_subtype(ctx.repo, found, rtype) {
                        return Err(ctx.return_mismatch());
                    }
                }
                Ok(())
            }

            Instr::MonitorEnter(ptr) | Instr::MonitorExit(ptr) => ctx.assume_reference(*ptr),
            Instr::CheckCast(ptr, _) => ctx.assume_reference(*ptr),
            Instr::InstanceOf(_, ptr, _) => ctx.assume_reference(*ptr),

            Instr::ArrayLength(_, arr) => ctx.assume_array(*arr),
            Instr::NewArray(_, siz, typ) => {
                ctx.assume(*siz, Int)?;
                match typ {
                    Type::Array(_, _) => Ok(()),
                    _ => Err(ctx.reference_mismatch(format!("{typ} is not an array type"))),
                }
            }
            Instr::Throw(ptr) => {
                ctx.assume_reference(*ptr)?;
                if let Some(found) = ctx.env.get_dex_type(*ptr) {
                    if definitely_not_subtype(ctx.repo, found, &JAVA_LANG_THROWABLE) {
                        return Err(
                            ctx.reference_mismatch(format!("{found} is not a throwable"))
                        );
                    }
                }
                Ok(())
            }
            Instr::PackedSwitch(src, _, _) => ctx.assume(*src, Int),

            Instr::CmplFloat(_, src1, src2) | Instr::CmpgFloat(_, src1, src2) => {
                ctx.assume(*src1, Float)?;
                ctx.assume(*src2, Float)
            }
            Instr::CmplDouble(_, src1, src2) | Instr::CmpgDouble(_, src1, src2) => {
                ctx.assume_wide_kind(*src1, Double1)?;
                ctx.assume_wide_kind(*src2, Double1)
            }
            Instr::CmpLong(_, src1, src2) => {
                ctx.assume_wide_kind(*src1, Long1)?;
                ctx.assume_wide_kind(*src2, Long1)
            }

            Instr::IfEq(src1, src2, _) | Instr::IfNe(src1, src2, _) => {
                ctx.assume_comparable(*src1, *src2)
            }
            Instr::IfLt(src1, src2, _)
            | Instr::IfGe(src1, src2, _)
            | Instr::IfGt(src1, src2, _)
            | Instr::IfLe(src1, src2, _) => {
                ctx.assume(*src1, Int)?;
                ctx.assume(*src2, Int)
            }
            Instr::IfEqz(src, _) | Instr::IfNez(src, _) => ctx.assume_zero_testable(*src),
            Instr::IfLtz(src, _)
            | Instr::IfGez(src, _)
            | Instr::IfGtz(src, _)
            | Instr::IfLez(src, _) => ctx.assume(*src, Int),

            Instr::Aget(_, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume_array_element(*arr, |elt| {
                    matches!(
                        elt,
                        Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int
                            | Type::Float
                    )
                })
            }
            Instr::AgetBoolean(_, arr, idx) => ctx.assume_typed_array(*arr, *idx, &Type::Boolean),
            Instr::AgetByte(_, arr, idx) => ctx.assume_typed_array(*arr, *idx, &Type::Byte),
            Instr::AgetChar(_, arr, idx) => ctx.assume_typed_array(*arr, *idx, &Type::Char),
            Instr::AgetShort(_, arr, idx) => ctx.assume_typed_array(*arr, *idx, &Type::Short),
            Instr::AgetWide(_, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume_array_element(*arr, Type::is_wide)
            }
            Instr::AgetObject(_, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume_array_element(*arr, Type::is_reference)
            }

            Instr::Aput(src, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                let found = ctx.env.get_type(*src)?;
                if found == Top {
                    return Err(ctx.undefined(*src));
                }
                if found.is_wide() {
                    return Err(ctx.wide_mismatch(*src));
                }
                if !found.leq(Int) && !found.leq(Float) {
                    return Err(ctx.scalar_mismatch(*src, found, Scalar));
                }
                ctx.assume_array_element(*arr, |elt| !elt.is_wide() && !elt.is_reference())
            }
            Instr::AputBoolean(src, arr, idx)
            | Instr::AputByte(src, arr, idx)
            | Instr::AputChar(src, arr, idx)
            | Instr::AputShort(src, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume(*src, Int)
            }
            Instr::AputWide(src, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume_wide(*src)?;
                ctx.assume_array_element(*arr, Type::is_wide)
            }
            Instr::AputObject(src, arr, idx) => {
                ctx.assume(*idx, Int)?;
                ctx.assume_array(*arr)?;
                ctx.assume_reference(*src)?;
                ctx.assume_array_element(*arr, Type::is_reference)
            }

            Instr::Iget(dst, ptr, fref)
            | Instr::IgetBoolean(dst, ptr, fref)
            | Instr::IgetByte(dst, ptr, fref)
            | Instr::IgetChar(dst, ptr, fref)
            | Instr::IgetShort(dst, ptr, fref)
            | Instr::IgetObject(dst, ptr, fref)
            | Instr::IgetWide(dst, ptr, fref) => {
                ctx.assume_reference(*ptr)?;
                if let Some(found) = ctx.env.get_dex_type(*ptr) {
                    let owner = Type::class(fref.definer());
                    if definitely_not_subtype(ctx.repo, found, &owner) {
                        return Err(ctx.reference_mismatch(format!(
                            "{found} does not have the fields of {owner}"
                        )));
                    }
                }
                ctx.assume_field_kind(linstr.instr(), fref.type_(), *dst)?;
                self.check_field_access(ctx, linstr.instr(), method)
            }
            Instr::Sget(dst, fref)
            | Instr::SgetBoolean(dst, fref)
            | Instr::SgetByte(dst, fref)
            | Instr::SgetChar(dst, fref)
            | Instr::SgetShort(dst, fref)
            | Instr::SgetObject(dst, fref)
            | Instr::SgetWide(dst, fref) => {
                ctx.assume_field_kind(linstr.instr(), fref.type_(), *dst)?;
                self.check_field_access(ctx, linstr.instr(), method)
            }

            Instr::Iput(src, ptr, fref)
            | Instr::IputBoolean(src, ptr, fref)
            | Instr::IputByte(src, ptr, fref)
            | Instr::IputChar(src, ptr, fref)
            | Instr::IputShort(src, ptr, fref)
            | Instr::IputObject(src, ptr, fref)
            | Instr::IputWide(src, ptr, fref) => {
                ctx.assume_reference(*ptr)?;
                ctx.assume_field_kind(linstr.instr(), fref.type_(), *src)?;
                ctx.assume_field_value(*src, fref.type_())?;
                self.check_field_access(ctx, linstr.instr(), method)
            }
            Instr::Sput(src, fref)
            | Instr::SputBoolean(src, fref)
            | Instr::SputByte(src, fref)
            | Instr::SputChar(src, fref)
            | Instr::SputShort(src, fref)
            | Instr::SputObject(src, fref)
            | Instr::SputWide(src, fref) => {
                ctx.assume_field_kind(linstr.instr(), fref.type_(), *src)?;
                ctx.assume_field_value(*src, fref.type_())?;
                self.check_field_access(ctx, linstr.instr(), method)
            }

            Instr::InvokeVirtual(args, mref)
            | Instr::InvokeSuper(args, mref)
            | Instr::InvokeDirect(args, mref)
            | Instr::InvokeStatic(args, mref)
            | Instr::InvokeInterface(args, mref) => {
                let (kind, _, _) = linstr
                    .instr()
                    .invoke()
                    .expect("matched an invoke instruction");
                self.check_invocation(ctx, kind, args, mref, method)
            }

            Instr::NegInt(_, src) | Instr::NotInt(_, src) => ctx.assume(*src, Int),
            Instr::NegFloat(_, src) => ctx.assume(*src, Float),
            Instr::NegLong(_, src) | Instr::NotLong(_, src) => ctx.assume_wide_kind(*src, Long1),
            Instr::NegDouble(_, src) => ctx.assume_wide_kind(*src, Double1),

            Instr::IntToLong(_, src)
            | Instr::IntToFloat(_, src)
            | Instr::IntToDouble(_, src)
            | Instr::IntToByte(_, src)
            | Instr::IntToChar(_, src)
            | Instr::IntToShort(_, src) => ctx.assume(*src, Int),
            Instr::LongToInt(_, src) | Instr::LongToFloat(_, src) | Instr::LongToDouble(_, src) => {
                ctx.assume_wide_kind(*src, Long1)
            }
            Instr::FloatToInt(_, src) | Instr::FloatToLong(_, src) | Instr::FloatToDouble(_, src) => {
                ctx.assume(*src, Float)
            }
            Instr::DoubleToInt(_, src)
            | Instr::DoubleToLong(_, src)
            | Instr::DoubleToFloat(_, src) => ctx.assume_wide_kind(*src, Double1),

            Instr::AddInt(_, src1, src2)
            | Instr::SubInt(_, src1, src2)
            | Instr::MulInt(_, src1, src2)
            | Instr::DivInt(_, src1, src2)
            | Instr::RemInt(_, src1, src2)
            | Instr::AndInt(_, src1, src2)
            | Instr::OrInt(_, src1, src2)
            | Instr::XorInt(_, src1, src2)
            | Instr::ShlInt(_, src1, src2)
            | Instr::ShrInt(_, src1, src2)
            | Instr::UshrInt(_, src1, src2) => {
                ctx.assume(*src1, Int)?;
                ctx.assume(*src2, Int)
            }

            Instr::AddLong(_, src1, src2)
            | Instr::SubLong(_, src1, src2)
            | Instr::MulLong(_, src1, src2)
            | Instr::DivLong(_, src1, src2)
            | Instr::RemLong(_, src1, src2)
            | Instr::AndLong(_, src1, src2)
            | Instr::OrLong(_, src1, src2)
            | Instr::XorLong(_, src1, src2) => {
                ctx.assume_wide_kind(*src1, Long1)?;
                ctx.assume_wide_kind(*src2, Long1)
            }
            Instr::ShlLong(_, src1, src2)
            | Instr::ShrLong(_, src1, src2)
            | Instr::UshrLong(_, src1, src2) => {
                ctx.assume_wide_kind(*src1, Long1)?;
                ctx.assume(*src2, Int)
            }

            Instr::AddFloat(_, src1, src2)
            | Instr::SubFloat(_, src1, src2)
            | Instr::MulFloat(_, src1, src2)
            | Instr::DivFloat(_, src1, src2)
            | Instr::RemFloat(_, src1, src2) => {
                ctx.assume(*src1, Float)?;
                ctx.assume(*src2, Float)
            }

            Instr::AddDouble(_, src1, src2)
            | Instr::SubDouble(_, src1, src2)
            | Instr::MulDouble(_, src1, src2)
            | Instr::DivDouble(_, src1, src2)
            | Instr::RemDouble(_, src1, src2) => {
                ctx.assume_wide_kind(*src1, Double1)?;
                ctx.assume_wide_kind(*src2, Double1)
            }
        }
    }

    fn check_invocation(
        &self,
        ctx: &InstrCtx<'_>,
        kind: InvokeKind,
        args: &RegList,
        mref: &MethodRef,
        method: &Method,
    ) -> AnalysisResult<()> {
        use IRType::*;

        let mut args_it = args.iter();

        if kind != InvokeKind::Static {
            let this_reg = args_it.next().ok_or_else(|| {
                AnalysisError::Internal(format!("missing receiver argument on {mref}"))
            })?;
            let is_ctor_call = kind == InvokeKind::Direct && mref.name() == "<init>";
            ctx.assume(this_reg, Reference)?;
            if !is_ctor_call && ctx.env.get(this_reg)?.domain().is_uninit() {
                return Err(ctx.reference_mismatch(format!(
                    "{this_reg} holds an uninitialized object"
                )));
            }
            if let Some(found) = ctx.env.get_dex_type(this_reg) {
                let owner = Type::class(mref.definer());
                if definitely_not_subtype(ctx.repo, found, &owner) {
                    return Err(ctx.reference_mismatch(format!(
                        "receiver {found} is not a subtype of {owner}"
                    )));
                }
            }
        }

        for param in mref.proto().parameters() {
            let arg_reg = args_it.next().ok_or_else(|| {
                AnalysisError::Internal(format!("not enough argument registers on {mref}"))
            })?;
            match param {
                Type::Long => {
                    args_it.next(); // the pair occupies the next register
                    ctx.assume_wide_kind(arg_reg, Long1)?;
                }
                Type::Double => {
                    args_it.next(); // the pair occupies the next register
                    ctx.assume_wide_kind(arg_reg, Double1)?;
                }
                Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int => {
                    ctx.assume(arg_reg, Int)?;
                }
                Type::Float => ctx.assume(arg_reg, Float)?,
                Type::Class(_) | Type::Array(_, _) => {
                    ctx.assume_reference(arg_reg)?;
                    if let Some(found) = ctx.env.get_dex_type(arg_reg) {
                        if definitely_not_subtype(ctx.repo, found, param) {
                            return Err(ctx.reference_mismatch(format!(
                                "argument {found} is not a subtype of {param}"
                            )));
                        }
                    }
                }
                Type::Void => {
                    return Err(AnalysisError::Internal(format!(
                        "void parameter type on {mref}"
                    )))
                }
            }
        }
        if args_it.next().is_some() {
            return Err(AnalysisError::Internal(format!(
                "too many argument registers on {mref}"
            )));
        }

        if self.validate_access {
            let search = MethodSearch::of_invoke(kind);
            if let Some(muid) = self.repo.resolve_method(mref, search, method.definer()) {
                let callee = &self.repo[muid];
                if !self
                    .repo
                    .can_access(method.definer(), callee.definer(), callee.visibility())
                {
                    return Err(CheckError::InaccessibleMember {
                        addr: ctx.addr,
                        mnemonic: ctx.mnemonic,
                        member: callee.to_string(),
                        caller: method.definer().to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    fn check_field_access(
        &self,
        ctx: &InstrCtx<'_>,
        instr: &Instr,
        method: &Method,
    ) -> AnalysisResult<()> {
        if !self.validate_access {
            return Ok(());
        }
        let (op, fref) = instr.field_access().expect("matched a field instruction");
        let search = if op.is_static() {
            FieldSearch::Static
        } else {
            FieldSearch::Instance
        };
        if let Some(fuid) = self.repo.resolve_field(fref, search) {
            let field = &self.repo[fuid];
            if !self
                .repo
                .can_access(method.definer(), field.definer(), field.visibility())
            {
                return Err(CheckError::InaccessibleMember {
                    addr: ctx.addr,
                    mnemonic: ctx.mnemonic,
                    member: field.to_string(),
                    caller: method.definer().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Per-instruction checking context and precondition helpers.
struct InstrCtx<'c> {
    repo: &'c Repo,
    env: &'c TypeEnvironment,
    addr: Addr,
    mnemonic: &'static str,
    verify_moves: bool,
}

impl InstrCtx<'_> {
    fn undefined(&self, reg: Reg) -> AnalysisError {
        CheckError::UndefinedOperand {
            addr: self.addr,
            mnemonic: self.mnemonic,
            reg,
        }
        .into()
    }

    fn wide_mismatch(&self, reg: Reg) -> AnalysisError {
        CheckError::WideMismatch {
            addr: self.addr,
            mnemonic: self.mnemonic,
            reg,
        }
        .into()
    }

    fn scalar_mismatch(&self, reg: Reg, found: IRType, expected: IRType) -> AnalysisError {
        CheckError::ScalarTypeMismatch {
            addr: self.addr,
            mnemonic: self.mnemonic,
            reg,
            found,
            expected,
        }
        .into()
    }

    fn reference_mismatch(&self, details: String) -> AnalysisError {
        CheckError::ReferenceTypeMismatch {
            addr: self.addr,
            mnemonic: self.mnemonic,
            details,
        }
        .into()
    }

    fn return_mismatch(&self) -> AnalysisError {
        CheckError::ReturnTypeMismatch {
            addr: self.addr,
            mnemonic: self.mnemonic,
        }
        .into()
    }

    /// The operand must be defined, narrow, and below `expected`.
    fn assume(&self, reg: Reg, expected: IRType) -> AnalysisResult<()> {
        let found = self.env.get_type(reg)?;
        if found == IRType::Top {
            return Err(self.undefined(reg));
        }
        if found.is_wide() {
            return Err(self.wide_mismatch(reg));
        }
        if !found.leq(expected) {
            return Err(self.scalar_mismatch(reg, found, expected));
        }
        Ok(())
    }

    fn assume_reference(&self, reg: Reg) -> AnalysisResult<()> {
        self.assume(reg, IRType::Reference)
    }

    /// A well-formed wide pair at `reg`, `reg + 1`.
    fn assume_wide(&self, reg: Reg) -> AnalysisResult<()> {
        use IRType::*;
        let first = self.env.get_type(reg)?;
        let second = self.env.get_type(reg.next())?;
        if first == Top {
            return Err(self.undefined(reg));
        }
        if !matches!(
            (first, second),
            (Long1, Long2) | (Double1, Double2) | (Const2, Const2)
        ) {
            return Err(self.wide_mismatch(reg));
        }
        Ok(())
    }

    fn assume_wide_kind(&self, reg: Reg, expected_first: IRType) -> AnalysisResult<()> {
        self.assume_wide(reg)?;
        let first = self.env.get_type(reg)?;
        if !first.leq(expected_first) {
            return Err(self.scalar_mismatch(reg, first, expected_first));
        }
        Ok(())
    }

    /// `move` source: an undefined value is tolerated unless
    /// `verify_moves` is set, matching the platform verifier.
    fn assume_moved_scalar(&self, reg: Reg) -> AnalysisResult<()> {
        let found = self.env.get_type(reg)?;
        if found == IRType::Top {
            return if self.verify_moves {
                Err(self.undefined(reg))
            } else {
                Ok(())
            };
        }
        if found.is_wide() {
            return Err(self.wide_mismatch(reg));
        }
        Ok(())
    }

    fn assume_moved_reference(&self, reg: Reg) -> AnalysisResult<()> {
        let found = self.env.get_type(reg)?;
        if found == IRType::Top {
            return if self.verify_moves {
                Err(self.undefined(reg))
            } else {
                Ok(())
            };
        }
        if !found.leq(IRType::Reference) {
            return Err(self.scalar_mismatch(reg, found, IRType::Reference));
        }
        Ok(())
    }

    fn assume_moved_wide(&self, reg: Reg) -> AnalysisResult<()> {
        let first = self.env.get_type(reg)?;
        let second = self.env.get_type(reg.next())?;
        if first == IRType::Top && second == IRType::Top {
            return if self.verify_moves {
                Err(self.undefined(reg))
            } else {
                Ok(())
            };
        }
        self.assume_wide(reg)
    }

    fn check_result(&self, found: IRType, dst: Reg) -> AnalysisResult<()> {
        if found == IRType::Top {
            return Err(self.undefined(dst));
        }
        if found.is_wide() {
            return Err(self.wide_mismatch(dst));
        }
        Ok(())
    }

    /// `if-eqz`/`if-nez` accept integers and references alike.
    fn assume_zero_testable(&self, reg: Reg) -> AnalysisResult<()> {
        let found = self.env.get_type(reg)?;
        if found == IRType::Top {
            return Err(self.undefined(reg));
        }
        if found.is_wide() {
            return Err(self.wide_mismatch(reg));
        }
        if !found.leq(IRType::Int) && !found.leq(IRType::Reference) {
            return Err(self.scalar_mismatch(reg, found, IRType::Scalar));
        }
        Ok(())
    }

    /// `if-eq`/`if-ne` need two integers or two references.
    fn assume_comparable(&self, src1: Reg, src2: Reg) -> AnalysisResult<()> {
        self.assume_zero_testable(src1)?;
        self.assume_zero_testable(src2)?;
        let joined = self.env.get_type(src1)?.join(self.env.get_type(src2)?);
        if !joined.leq(IRType::Int) && !joined.leq(IRType::Reference) {
            return Err(self.scalar_mismatch(src1, joined, IRType::Scalar));
        }
        Ok(())
    }

    /// An array operand: a reference that is not a known non-array.
    fn assume_array(&self, reg: Reg) -> AnalysisResult<()> {
        self.assume_reference(reg)?;
        if let Some(found) = self.env.get_dex_type(reg) {
            if !matches!(found, Type::Array(_, _)) {
                return Err(self.reference_mismatch(format!("{found} is not an array")));
            }
        }
        Ok(())
    }

    /// When the array type is known, its element type must satisfy the
    /// opcode family.
    fn assume_array_element(
        &self,
        reg: Reg,
        accept: impl Fn(&Type) -> bool,
    ) -> AnalysisResult<()> {
        if let Some(Type::Array(_, _)) = self.env.get_dex_type(reg) {
            let elt = self
                .env
                .get_dex_type(reg)
                .expect("just matched")
                .array_element()?;
            if !accept(&elt) {
                return Err(
                    self.reference_mismatch(format!("array element {elt} has the wrong kind"))
                );
            }
        }
        Ok(())
    }

    fn assume_typed_array(&self, arr: Reg, idx: Reg, elt: &Type) -> AnalysisResult<()> {
        self.assume(idx, IRType::Int)?;
        self.assume_array(arr)?;
        let expected = elt.clone();
        self.assume_array_element(arr, move |found| *found == expected)
    }

    /// The field type must match the opcode family: `iget-boolean`
    /// only reads boolean fields, plain `iget` only int or float ones,
    /// and so on.
    fn assume_field_kind(
        &self,
        instr: &Instr,
        field_type: &Type,
        reg: Reg,
    ) -> AnalysisResult<()> {
        let expected = match instr {
            Instr::Iget(_, _, _) | Instr::Iput(_, _, _) | Instr::Sget(_, _) | Instr::Sput(_, _) => {
                matches!(field_type, Type::Int | Type::Float)
            }
            Instr::IgetBoolean(_, _, _) | Instr::IputBoolean(_, _, _)
            | Instr::SgetBoolean(_, _) | Instr::SputBoolean(_, _) => {
                *field_type == Type::Boolean
            }
            Instr::IgetByte(_, _, _) | Instr::IputByte(_, _, _) | Instr::SgetByte(_, _)
            | Instr::SputByte(_, _) => *field_type == Type::Byte,
            Instr::IgetChar(_, _, _) | Instr::IputChar(_, _, _) | Instr::SgetChar(_, _)
            | Instr::SputChar(_, _) => *field_type == Type::Char,
            Instr::IgetShort(_, _, _) | Instr::IputShort(_, _, _) | Instr::SgetShort(_, _)
            | Instr::SputShort(_, _) => *field_type == Type::Short,
            Instr::IgetWide(_, _, _) | Instr::IputWide(_, _, _) | Instr::SgetWide(_, _)
            | Instr::SputWide(_, _) => field_type.is_wide(),
            Instr::IgetObject(_, _, _) | Instr::IputObject(_, _, _) | Instr::SgetObject(_, _)
            | Instr::SputObject(_, _) => field_type.is_reference(),
            _ => true,
        };
        if expected {
            Ok(())
        } else {
            Err(self.scalar_mismatch(
                reg,
                IRType::of_declared(field_type),
                IRType::of_declared(&Type::Int),
            ))
        }
    }

    /// The value stored by a `*put` must fit the field type.
    fn assume_field_value(&self, src: Reg, field_type: &Type) -> AnalysisResult<()> {
        match field_type {
            Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int => {
                self.assume(src, IRType::Int)
            }
            Type::Float => self.assume(src, IRType::Float),
            Type::Long => self.assume_wide_kind(src, IRType::Long1),
            Type::Double => self.assume_wide_kind(src, IRType::Double1),
            Type::Class(_) | Type::Array(_, _) => {
                self.assume_reference(src)?;
                if let Some(found) = self.env.get_dex_type(src) {
                    if definitely_not_subtype(self.repo, found, field_type) {
                        return Err(self.reference_mismatch(format!(
                            "{found} cannot be stored into a {field_type} field"
                        )));
                    }
                }
                Ok(())
            }
            Type::Void => Err(AnalysisError::Internal("void field type".to_string())),
        }
    }
}

/// Conservative dex-level subtype refutation: only reports a mismatch
/// when both types are known well enough to be certain. Unknown
/// classes never fail here; the hierarchy is allowed to be partial.
fn definitely_not_subtype(repo: &Repo, sub: &Type, sup: &Type) -> bool {
    if sub == sup {
        return false;
    }
    match (sub, sup) {
        (_, Type::Class(sup_name)) if sup_name == "java/lang/Object" => false,
        (Type::Class(sub_name), Type::Class(sup_name)) => {
            repo.get_class_by_name(sub_name).is_some()
                && repo.get_class_by_name(sup_name).is_some()
                && !repo.is_typeable_as(sub_name, sup_name).unwrap_or(true)
        }
        (Type::Class(_), Type::Array(_, _)) => true,
        (Type::Array(_, _), Type::Class(sup_name)) => {
            // arrays are only objects, serializables and cloneables
            !matches!(
                sup_name.as_str(),
                "java/lang/Object" | "java/io/Serializable" | "java/lang/Cloneable"
            )
        }
        (Type::Array(dims1, elt1), Type::Array(dims2, elt2)) => {
            dims1 == dims2 && definitely_not_subtype(repo, elt1, elt2)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;
    use dexopt_ir::code::Code;
    use dexopt_ir::defs::{ClassDef, FieldDef, MethodDef};
    use dexopt_ir::flags::{FieldFlags, MethodFlags};
    use dexopt_ir::refs::{FieldRef, Proto};
    use dexopt_ir::registers::RegList;
    use crate::typing::errors::CheckError;

    fn reg(r: u16) -> Reg {
        Reg::from(r)
    }

    fn static_method(name: &str, proto: Proto, registers: u16, instrs: Vec<Instr>) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            proto,
            flags: MethodFlags::ACC_PUBLIC | MethodFlags::ACC_STATIC,
            code: Some(Code::new(registers, instrs)),
        }
    }

    fn repo_with(classes: Vec<ClassDef>) -> Repo {
        let mut repo = Repo::new();
        for class in classes {
            repo.register_class(class, false).unwrap();
        }
        repo.close_hierarchy().unwrap();
        repo
    }

    fn method_uid(repo: &Repo, class: &str, name: &str) -> MethodUid {
        repo.get_class_by_name(class)
            .unwrap()
            .iter_methods(repo)
            .find(|m| m.name() == name)
            .unwrap()
            .uid()
    }

    fn to_string_ref() -> MethodRef {
        MethodRef::new(
            "java/lang/Object",
            "toString",
            Proto::new(Type::class("java/lang/String"), vec![]),
        )
    }

    #[test]
    fn null_is_a_valid_receiver() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            1,
            vec![
                Instr::Const(reg(0), 0),
                Instr::InvokeVirtual(RegList::from(vec![0]), to_string_ref()),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.good(), "{}", checker.what());
        assert_eq!(checker.what(), "OK");
        assert_eq!(
            checker.get_type(Addr(1), reg(0)).unwrap(),
            IRType::Zero
        );
    }

    #[test]
    fn reading_a_wide_half_as_narrow_fails() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            3,
            vec![
                Instr::ConstWide(reg(0), 1),
                Instr::Move(reg(2), reg(0)),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.fail());
        assert!(matches!(
            checker.error(),
            Some(CheckError::WideMismatch { .. })
        ));
    }

    #[test]
    fn narrow_write_invalidates_the_pair() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            3,
            vec![
                Instr::ConstWide(reg(0), 1),
                Instr::Const(reg(1), 7),
                Instr::NegLong(reg(0), reg(0)),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.fail());
        assert!(matches!(
            checker.error(),
            Some(CheckError::UndefinedOperand { .. })
        ));
    }

    #[test]
    fn overwriting_this_is_flagged_when_enabled() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(MethodDef {
            name: "m".to_string(),
            proto: Proto::new(Type::Void, vec![]),
            flags: MethodFlags::ACC_PUBLIC,
            code: Some(Code::new(
                2,
                vec![Instr::Const(reg(1), 0), Instr::ReturnVoid],
            )),
        });
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "m");

        let mut lenient = TypeChecker::new(muid, &repo);
        lenient.run().unwrap();
        assert!(lenient.good(), "{}", lenient.what());

        let mut strict = TypeChecker::new(muid, &repo);
        strict.check_no_overwrite_this();
        strict.run().unwrap();
        assert!(strict.fail());
        assert!(matches!(
            strict.error(),
            Some(CheckError::OverwriteThis { .. })
        ));
    }

    #[test]
    fn moving_an_undefined_value_is_gated_by_verify_moves() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            2,
            vec![Instr::Move(reg(0), reg(1)), Instr::ReturnVoid],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut lenient = TypeChecker::new(muid, &repo);
        lenient.run().unwrap();
        assert!(lenient.good(), "{}", lenient.what());

        let mut strict = TypeChecker::new(muid, &repo);
        strict.verify_moves();
        strict.run().unwrap();
        assert!(strict.fail());
        assert!(matches!(
            strict.error(),
            Some(CheckError::UndefinedOperand { .. })
        ));
    }

    #[test]
    fn zero_joins_with_a_reference_across_branches() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            1,
            vec![
                Instr::Const(reg(0), 0),
                Instr::IfEqz(reg(0), 2),
                Instr::ConstString(reg(0), "hi".to_string()),
                Instr::InvokeVirtual(RegList::from(vec![0]), to_string_ref()),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.good(), "{}", checker.what());
        assert_eq!(
            checker.get_type(Addr(3), reg(0)).unwrap(),
            IRType::Reference
        );
        assert_eq!(checker.get_dex_type(Addr(3), reg(0)).unwrap(), None);
    }

    #[test]
    fn comparing_two_references_refines_nullness_on_both_edges() {
        use crate::typing::Nullness;

        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![Type::class("java/lang/Object")]),
            2,
            vec![
                Instr::Const(reg(0), 0),
                Instr::IfEq(reg(0), reg(1), 2),
                Instr::ReturnVoid,
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");
        let method = &repo[muid];

        let states = TypeStates::forward_compute(method, &repo).unwrap();
        // not-equal edge: differing from the null in v0 makes v1
        // not-null
        let not_equal = states.entries.get(&Addr(2)).unwrap();
        assert_eq!(
            not_equal.get(reg(1)).unwrap().domain().nullness(),
            Nullness::NotNull
        );
        // equal edge: v1 holds the same value as v0, which is null
        let equal = states.entries.get(&Addr(3)).unwrap();
        assert_eq!(
            equal.get(reg(1)).unwrap().domain().nullness(),
            Nullness::IsNull
        );
    }

    #[test]
    fn a_loop_reaches_its_fixpoint() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            1,
            vec![
                Instr::Const(reg(0), 0),
                Instr::AddInt(reg(0), reg(0), reg(0)),
                Instr::IfEqz(reg(0), -1),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.good(), "{}", checker.what());
        // Zero from the entry path joins with Int from the back edge
        assert_eq!(checker.get_type(Addr(1), reg(0)).unwrap(), IRType::Int);
    }

    #[test]
    fn running_the_inference_twice_is_idempotent() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Void, vec![]),
            1,
            vec![
                Instr::Const(reg(0), 0),
                Instr::IfEqz(reg(0), 2),
                Instr::ConstString(reg(0), "hi".to_string()),
                Instr::InvokeVirtual(RegList::from(vec![0]), to_string_ref()),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");
        let method = &repo[muid];

        let first = TypeStates::forward_compute(method, &repo).unwrap();
        let second = TypeStates::forward_compute(method, &repo).unwrap();
        assert_eq!(first.entries, second.entries);
        assert_eq!(first.exits, second.exits);
    }

    #[test]
    fn return_form_must_match_the_declared_type() {
        let mut class = ClassDef::named("com/test/Foo");
        class.methods.push(static_method(
            "main",
            Proto::new(Type::Int, vec![]),
            1,
            vec![Instr::ReturnVoid],
        ));
        let repo = repo_with(vec![class]);
        let muid = method_uid(&repo, "com/test/Foo", "main");

        let mut checker = TypeChecker::new(muid, &repo);
        checker.run().unwrap();
        assert!(checker.fail());
        assert!(matches!(
            checker.error(),
            Some(CheckError::ReturnTypeMismatch { .. })
        ));
    }

    #[test]
    fn private_members_are_flagged_with_validate_access() {
        let mut owner = ClassDef::named("com/a/Owner");
        owner.fields.push(FieldDef {
            name: "secret".to_string(),
            type_: Type::Int,
            flags: FieldFlags::ACC_PRIVATE | FieldFlags::ACC_STATIC,
        });
        let mut user = ClassDef::named("com/b/User");
        user.methods.push(static_method(
            "peek",
            Proto::new(Type::Void, vec![]),
            1,
            vec![
                Instr::Sget(reg(0), FieldRef::new("com/a/Owner", "secret", Type::Int)),
                Instr::ReturnVoid,
            ],
        ));
        let repo = repo_with(vec![owner, user]);
        let muid = method_uid(&repo, "com/b/User", "peek");

        let mut lenient = TypeChecker::new(muid, &repo);
        lenient.run().unwrap();
        assert!(lenient.good(), "{}", lenient.what());

        let mut strict = TypeChecker::new(muid, &repo);
        strict.validate_access();
        strict.run().unwrap();
        assert!(strict.fail());
        assert!(matches!(
            strict.error(),
            Some(CheckError::InaccessibleMember { .. })
        ));
    }
}
