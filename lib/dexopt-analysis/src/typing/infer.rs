//! The permissive transfer function of the typing pass.
//!
//! Inference never rejects an instruction: operands that violate a
//! precondition simply flow `⊤` (or the declared destination type)
//! onward, and the checker reports the violation afterwards from the
//! recorded entry states. This matches the platform verifier, which
//! only faults a register when it is actually used.

use crate::controlflow::{Branch, Comp, Operand};
use crate::dataflow::AbstractForwardState;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::repo::{Method, Repo};
use crate::typing::{
    DexTypeDomain, IRType, Nullness, Slot, TypeEnvironment, JAVA_LANG_CLASS, JAVA_LANG_STRING,
};
use dexopt_ir::instrs::Instr;
use dexopt_ir::registers::Reg;
use dexopt_ir::types::Type;

impl<'a> AbstractForwardState<'a> for TypeEnvironment {
    type Context<'c> = Repo;
    type Error = AnalysisError;

    fn init(method: &Method, _repo: &Repo) -> AnalysisResult<Self> {
        // Registers layout:
        // [... local registers ...]
        // ['this' register (if the method is not static)]
        // [... parameter registers ...]
        let code = method.code().ok_or(AnalysisError::NoCode)?;
        let nb_registers = code.read().expect("code lock poisoned").registers_size();

        let mut env = Self::new_top(nb_registers);

        let nb_param_registers =
            method.proto().parameter_registers() + usize::from(!method.is_static());
        if (nb_registers as usize) < nb_param_registers {
            return Err(AnalysisError::Internal(format!(
                "method {method} has a {nb_registers} registers frame for {nb_param_registers} parameter registers"
            )));
        }
        let mut param_reg = nb_registers - nb_param_registers as u16;

        if !method.is_static() {
            let this_type = Type::class(method.definer());
            let domain = if method.is_constructor() {
                DexTypeDomain::Uninit {
                    class: this_type,
                    is_this: true,
                }
            } else {
                DexTypeDomain::of_type(this_type, Nullness::NotNull)
            };
            env.write(Reg::from(param_reg), Slot::new(IRType::Reference, domain))?;
            param_reg += 1;
        }

        for typ in method.proto().parameters() {
            let slot = Slot::of_declared(typ, Nullness::MaybeNull);
            if typ.is_wide() {
                env.write_pair(Reg::from(param_reg), slot)?;
                param_reg += 2;
            } else {
                env.write(Reg::from(param_reg), slot)?;
                param_reg += 1;
            }
        }

        Ok(env)
    }

    fn join(&mut self, other: &Self, repo: &Repo) -> AnalysisResult<()> {
        TypeEnvironment::join(self, other, repo)
    }

    fn transfer_branch(&mut self, branch: &Branch, _repo: &Repo) -> AnalysisResult<()> {
        match branch {
            // a zero test pins the nullness of the tested reference on
            // both outgoing edges
            Branch::IfTrue(reg, Comp::Eq, Operand::Zero)
            | Branch::IfFalse(reg, Comp::Ne, Operand::Zero) => {
                self.refine_nullness(*reg, Nullness::IsNull)
            }
            Branch::IfFalse(reg, Comp::Eq, Operand::Zero)
            | Branch::IfTrue(reg, Comp::Ne, Operand::Zero) => {
                self.refine_nullness(*reg, Nullness::NotNull)
            }
            // on the equal edge both operands hold the same value, so
            // the more precise nullness fact carries over to both
            Branch::IfTrue(reg1, Comp::Eq, Operand::Register(reg2))
            | Branch::IfFalse(reg1, Comp::Ne, Operand::Register(reg2)) => {
                let n1 = self.get(*reg1)?.domain().nullness();
                let n2 = self.get(*reg2)?.domain().nullness();
                if n1.leq(n2) {
                    self.refine_nullness(*reg2, n1)
                } else if n2.leq(n1) {
                    self.refine_nullness(*reg1, n2)
                } else {
                    Ok(())
                }
            }
            // on the not-equal edge, differing from a known null means
            // not-null
            Branch::IfFalse(reg1, Comp::Eq, Operand::Register(reg2))
            | Branch::IfTrue(reg1, Comp::Ne, Operand::Register(reg2)) => {
                let n1 = self.get(*reg1)?.domain().nullness();
                let n2 = self.get(*reg2)?.domain().nullness();
                if n1 == Nullness::IsNull {
                    self.refine_nullness(*reg2, Nullness::NotNull)?;
                }
                if n2 == Nullness::IsNull {
                    self.refine_nullness(*reg1, Nullness::NotNull)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn transfer_instr(&mut self, instr: &Instr, _repo: &Repo) -> AnalysisResult<()> {
        use IRType::*;

        // the RESULT pseudo-register is only valid immediately after
        // an invoke
        let last_result = self.take_result();

        match instr {
            Instr::Nop
            | Instr::Goto(_)
            | Instr::PackedSwitch(_, _, _)
            | Instr::MonitorEnter(_)
            | Instr::MonitorExit(_)
            | Instr::Throw(_)
            | Instr::ReturnVoid
            | Instr::Return(_)
            | Instr::ReturnWide(_)
            | Instr::ReturnObject(_)
            | Instr::IfEq(_, _, _)
            | Instr::IfNe(_, _, _)
            | Instr::IfLt(_, _, _)
            | Instr::IfGe(_, _, _)
            | Instr::IfGt(_, _, _)
            | Instr::IfLe(_, _, _)
            | Instr::IfEqz(_, _)
            | Instr::IfNez(_, _)
            | Instr::IfLtz(_, _)
            | Instr::IfGez(_, _)
            | Instr::IfGtz(_, _)
            | Instr::IfLez(_, _)
            | Instr::Aput(_, _, _)
            | Instr::AputWide(_, _, _)
            | Instr::AputObject(_, _, _)
            | Instr::AputBoolean(_, _, _)
            | Instr::AputByte(_, _, _)
            | Instr::AputChar(_, _, _)
            | Instr::AputShort(_, _, _)
            | Instr::Iput(_, _, _)
            | Instr::IputWide(_, _, _)
            | Instr::IputObject(_, _, _)
            | Instr::IputBoolean(_, _, _)
            | Instr::IputByte(_, _, _)
            | Instr::IputChar(_, _, _)
            | Instr::IputShort(_, _, _)
            | Instr::Sput(_, _)
            | Instr::SputWide(_, _)
            | Instr::SputObject(_, _)
            | Instr::SputBoolean(_, _)
            | Instr::SputByte(_, _)
            | Instr::SputChar(_, _)
            | Instr::SputShort(_, _) => Ok(()),

            Instr::Move(dst, src) | Instr::MoveObject(dst, src) => {
                let slot = self.get(*src)?.clone();
                self.write(*dst, slot)
            }
            Instr::MoveWide(dst, src) => {
                let first = self.get(*src)?.clone();
                self.write_pair(*dst, first)
            }
            Instr::MoveResult(dst) | Instr::MoveResultObject(dst) => self.write(*dst, last_result),
            Instr::MoveResultWide(dst) => self.write_pair(*dst, last_result),

            Instr::Const(dst, value) => {
                let slot = if *value == 0 {
                    Slot::new(Zero, DexTypeDomain::null())
                } else {
                    Slot::new(Const1, DexTypeDomain::top())
                };
                self.write(*dst, slot)
            }
            Instr::ConstWide(dst, _) => {
                self.write_pair(*dst, Slot::new(Const2, DexTypeDomain::top()))
            }
            Instr::ConstString(dst, _) => self.write(
                *dst,
                Slot::new(
                    Reference,
                    DexTypeDomain::of_type(JAVA_LANG_STRING.clone(), Nullness::NotNull),
                ),
            ),
            Instr::ConstClass(dst, _) => self.write(
                *dst,
                Slot::new(
                    Reference,
                    DexTypeDomain::of_type(JAVA_LANG_CLASS.clone(), Nullness::NotNull),
                ),
            ),

            Instr::CheckCast(reg, typ) => {
                // the platform narrows on the cast-success edge; this
                // implementation narrows unconditionally after the
                // instruction
                let nullness = match self.get(*reg)?.domain() {
                    DexTypeDomain::Typed { nullness, .. } => *nullness,
                    _ => Nullness::MaybeNull,
                };
                self.write(
                    *reg,
                    Slot::new(Reference, DexTypeDomain::of_type(typ.clone(), nullness)),
                )
            }
            Instr::InstanceOf(dst, _, _) => {
                self.write(*dst, Slot::new(Boolean, DexTypeDomain::top()))
            }
            Instr::ArrayLength(dst, _) => self.write(*dst, Slot::new(Int, DexTypeDomain::top())),
            Instr::NewInstance(dst, typ) => self.write(
                *dst,
                Slot::new(
                    Reference,
                    DexTypeDomain::Uninit {
                        class: typ.clone(),
                        is_this: false,
                    },
                ),
            ),
            Instr::NewArray(dst, _, typ) => self.write(
                *dst,
                Slot::new(
                    Reference,
                    DexTypeDomain::of_type(typ.clone(), Nullness::NotNull),
                ),
            ),

            Instr::CmplFloat(dst, _, _)
            | Instr::CmpgFloat(dst, _, _)
            | Instr::CmplDouble(dst, _, _)
            | Instr::CmpgDouble(dst, _, _)
            | Instr::CmpLong(dst, _, _) => self.write(*dst, Slot::new(Int, DexTypeDomain::top())),

            Instr::Aget(dst, arr, _) => {
                // the element kind of an int-or-float access is only
                // known when the array type is; a constant tag keeps
                // both uses legal otherwise
                let slot = match array_element(self.get(*arr)?) {
                    Some(elt) if !elt.is_reference() && !elt.is_wide() => {
                        Slot::of_declared(&elt, Nullness::Unknown)
                    }
                    _ => Slot::new(Const1, DexTypeDomain::top()),
                };
                self.write(*dst, slot)
            }
            Instr::AgetBoolean(dst, _, _) => {
                self.write(*dst, Slot::new(Boolean, DexTypeDomain::top()))
            }
            Instr::AgetByte(dst, _, _) => self.write(*dst, Slot::new(Byte, DexTypeDomain::top())),
            Instr::AgetChar(dst, _, _) => self.write(*dst, Slot::new(Char, DexTypeDomain::top())),
            Instr::AgetShort(dst, _, _) => self.write(*dst, Slot::new(Short, DexTypeDomain::top())),
            Instr::AgetWide(dst, arr, _) => {
                let slot = match array_element(self.get(*arr)?) {
                    Some(Type::Long) => Slot::new(Long1, DexTypeDomain::top()),
                    Some(Type::Double) => Slot::new(Double1, DexTypeDomain::top()),
                    _ => Slot::new(Const2, DexTypeDomain::top()),
                };
                self.write_pair(*dst, slot)
            }
            Instr::AgetObject(dst, arr, _) => {
                let slot = match array_element(self.get(*arr)?) {
                    Some(elt) if elt.is_reference() => Slot::new(
                        Reference,
                        DexTypeDomain::of_type(elt, Nullness::MaybeNull),
                    ),
                    _ => Slot::new(
                        Reference,
                        DexTypeDomain::Typed {
                            class: None,
                            nullness: Nullness::MaybeNull,
                        },
                    ),
                };
                self.write(*dst, slot)
            }

            Instr::Iget(dst, _, fref)
            | Instr::IgetObject(dst, _, fref)
            | Instr::IgetBoolean(dst, _, fref)
            | Instr::IgetByte(dst, _, fref)
            | Instr::IgetChar(dst, _, fref)
            | Instr::IgetShort(dst, _, fref) => {
                let slot = Slot::of_declared(fref.type_(), Nullness::MaybeNull);
                self.write(*dst, slot)
            }
            Instr::IgetWide(dst, _, fref) => {
                let slot = Slot::of_declared(fref.type_(), Nullness::MaybeNull);
                self.write_pair(*dst, slot)
            }
            Instr::Sget(dst, fref)
            | Instr::SgetObject(dst, fref)
            | Instr::SgetBoolean(dst, fref)
            | Instr::SgetByte(dst, fref)
            | Instr::SgetChar(dst, fref)
            | Instr::SgetShort(dst, fref) => {
                let slot = Slot::of_declared(fref.type_(), Nullness::MaybeNull);
                self.write(*dst, slot)
            }
            Instr::SgetWide(dst, fref) => {
                let slot = Slot::of_declared(fref.type_(), Nullness::MaybeNull);
                self.write_pair(*dst, slot)
            }

            Instr::InvokeDirect(args, mref) => {
                // a constructor call initializes the receiver object
                if mref.name() == "<init>" {
                    if let Some(this_reg) = args.first() {
                        if let DexTypeDomain::Uninit { class, .. } = self.get(this_reg)?.domain() {
                            let class = class.clone();
                            self.write(
                                this_reg,
                                Slot::new(
                                    Reference,
                                    DexTypeDomain::of_type(class, Nullness::NotNull),
                                ),
                            )?;
                        }
                    }
                }
                self.record_result(mref.proto().return_type());
                Ok(())
            }
            Instr::InvokeVirtual(_, mref)
            | Instr::InvokeSuper(_, mref)
            | Instr::InvokeStatic(_, mref)
            | Instr::InvokeInterface(_, mref) => {
                self.record_result(mref.proto().return_type());
                Ok(())
            }

            Instr::NegInt(dst, _) | Instr::NotInt(dst, _) => {
                self.write(*dst, Slot::new(Int, DexTypeDomain::top()))
            }
            Instr::NegFloat(dst, _) => self.write(*dst, Slot::new(Float, DexTypeDomain::top())),
            Instr::NegLong(dst, _) | Instr::NotLong(dst, _) => {
                self.write_pair(*dst, Slot::new(Long1, DexTypeDomain::top()))
            }
            Instr::NegDouble(dst, _) => {
                self.write_pair(*dst, Slot::new(Double1, DexTypeDomain::top()))
            }

            Instr::IntToLong(dst, _) | Instr::FloatToLong(dst, _) | Instr::DoubleToLong(dst, _) => {
                self.write_pair(*dst, Slot::new(Long1, DexTypeDomain::top()))
            }
            Instr::IntToDouble(dst, _)
            | Instr::LongToDouble(dst, _)
            | Instr::FloatToDouble(dst, _) => {
                self.write_pair(*dst, Slot::new(Double1, DexTypeDomain::top()))
            }
            Instr::LongToInt(dst, _) | Instr::FloatToInt(dst, _) | Instr::DoubleToInt(dst, _) => {
                self.write(*dst, Slot::new(Int, DexTypeDomain::top()))
            }
            Instr::IntToFloat(dst, _)
            | Instr::LongToFloat(dst, _)
            | Instr::DoubleToFloat(dst, _) => {
                self.write(*dst, Slot::new(Float, DexTypeDomain::top()))
            }
            Instr::IntToByte(dst, _) => self.write(*dst, Slot::new(Byte, DexTypeDomain::top())),
            Instr::IntToChar(dst, _) => self.write(*dst, Slot::new(Char, DexTypeDomain::top())),
            Instr::IntToShort(dst, _) => self.write(*dst, Slot::new(Short, DexTypeDomain::top())),

            Instr::AddInt(dst, _, _)
            | Instr::SubInt(dst, _, _)
            | Instr::MulInt(dst, _, _)
            | Instr::DivInt(dst, _, _)
            | Instr::RemInt(dst, _, _)
            | Instr::AndInt(dst, _, _)
            | Instr::OrInt(dst, _, _)
            | Instr::XorInt(dst, _, _)
            | Instr::ShlInt(dst, _, _)
            | Instr::ShrInt(dst, _, _)
            | Instr::UshrInt(dst, _, _) => self.write(*dst, Slot::new(Int, DexTypeDomain::top())),

            Instr::AddLong(dst, _, _)
            | Instr::SubLong(dst, _, _)
            | Instr::MulLong(dst, _, _)
            | Instr::DivLong(dst, _, _)
            | Instr::RemLong(dst, _, _)
            | Instr::AndLong(dst, _, _)
            | Instr::OrLong(dst, _, _)
            | Instr::XorLong(dst, _, _)
            | Instr::ShlLong(dst, _, _)
            | Instr::ShrLong(dst, _, _)
            | Instr::UshrLong(dst, _, _) => {
                self.write_pair(*dst, Slot::new(Long1, DexTypeDomain::top()))
            }

            Instr::AddFloat(dst, _, _)
            | Instr::SubFloat(dst, _, _)
            | Instr::MulFloat(dst, _, _)
            | Instr::DivFloat(dst, _, _)
            | Instr::RemFloat(dst, _, _) => {
                self.write(*dst, Slot::new(Float, DexTypeDomain::top()))
            }

            Instr::AddDouble(dst, _, _)
            | Instr::SubDouble(dst, _, _)
            | Instr::MulDouble(dst, _, _)
            | Instr::DivDouble(dst, _, _)
            | Instr::RemDouble(dst, _, _) => {
                self.write_pair(*dst, Slot::new(Double1, DexTypeDomain::top()))
            }
        }
    }
}

impl TypeEnvironment {
    fn record_result(&mut self, return_type: &Type) {
        if *return_type != Type::Void {
            self.set_result(Slot::of_declared(return_type, Nullness::MaybeNull));
        }
    }

    fn refine_nullness(&mut self, reg: Reg, nullness: Nullness) -> AnalysisResult<()> {
        let slot = self.get(reg)?.clone();
        if slot.scalar().is_reference() {
            let domain = slot.domain().with_nullness(nullness);
            self.write(reg, Slot::new(slot.scalar(), domain))?;
        }
        Ok(())
    }
}

fn array_element(slot: &Slot) -> Option<Type> {
    slot.domain()
        .get_dex_type()
        .and_then(|typ| typ.array_element().ok())
}
