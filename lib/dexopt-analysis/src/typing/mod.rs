//! Dalvik bytecode typing pass stuff.

mod infer;
mod types;

pub mod errors;

use crate::dataflow;
use crate::dataflow::Dataflow;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::repo::{Method, Repo};
use dexopt_ir::registers::Reg;
use dexopt_ir::types::Type;
use std::fmt;

pub use types::{DexTypeDomain, IRType, Nullness};
pub(crate) use types::{JAVA_LANG_CLASS, JAVA_LANG_STRING, JAVA_LANG_THROWABLE};

/// Result of the typing pass.
///
/// Contains per-instruction entry and exit abstract states for the
/// analyzed method, after reaching fixpoint.
pub type TypeStates = Dataflow<TypeEnvironment>;

impl TypeStates {
    /// Runs the forward type inference onto the given method and
    /// returns the results of the dataflow analysis.
    ///
    /// Inference is permissive: ill-typed operands flow `⊤` into
    /// destinations instead of failing; precondition validation is the
    /// checker's job.
    ///
    /// # Errors
    ///
    /// This function only generates fatal errors (method without code,
    /// malformed control flow, register out of bounds).
    pub fn forward_compute(method: &Method, repo: &Repo) -> AnalysisResult<Self> {
        dataflow::forward(method, repo)
    }
}

/// The abstract value of one register slot: the scalar lattice element
/// and the reference domain element, joined pointwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    scalar: IRType,
    domain: DexTypeDomain,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.scalar, self.domain)
    }
}

impl Slot {
    #[must_use]
    pub const fn new(scalar: IRType, domain: DexTypeDomain) -> Self {
        Self { scalar, domain }
    }

    #[must_use]
    pub const fn top() -> Self {
        Self {
            scalar: IRType::Top,
            domain: DexTypeDomain::top(),
        }
    }

    /// The slot of a value with the given declared type; for wide
    /// types this is the first half of the pair.
    #[must_use]
    pub fn of_declared(typ: &Type, nullness: Nullness) -> Self {
        match typ {
            Type::Class(_) | Type::Array(_, _) => Self::new(
                IRType::Reference,
                DexTypeDomain::of_type(typ.clone(), nullness),
            ),
            _ => Self::new(IRType::of_declared(typ), DexTypeDomain::top()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn scalar(&self) -> IRType {
        self.scalar
    }

    #[inline]
    pub const fn domain(&self) -> &DexTypeDomain {
        &self.domain
    }

    fn join(&mut self, other: &Self, repo: &Repo) {
        self.scalar = self.scalar.join(other.scalar);
        self.domain = self.domain.clone().join(other.domain.clone(), repo);
    }
}

impl IRType {
    /// The scalar lattice element of a declared type; wide types map
    /// to the tag of the first pair half.
    #[must_use]
    pub fn of_declared(typ: &Type) -> Self {
        match typ {
            Type::Void => Self::Top,
            Type::Class(_) | Type::Array(_, _) => Self::Reference,
            Type::Boolean => Self::Boolean,
            Type::Byte => Self::Byte,
            Type::Short => Self::Short,
            Type::Char => Self::Char,
            Type::Int => Self::Int,
            Type::Float => Self::Float,
            Type::Long => Self::Long1,
            Type::Double => Self::Double1,
        }
    }
}

/// The abstract state of the typing pass: one [`Slot`] per register,
/// plus the `RESULT` pseudo-register holding the value of the most
/// recent invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEnvironment {
    regs: Vec<Slot>,
    result: Slot,
}

impl fmt::Display for TypeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, slot) in self.regs.iter().enumerate() {
            writeln!(f, "    v{i}: {slot}")?;
        }
        writeln!(f, "    result: {}", self.result)
    }
}

impl TypeEnvironment {
    pub(crate) fn new_top(nb_registers: u16) -> Self {
        Self {
            regs: vec![Slot::top(); nb_registers as usize],
            result: Slot::top(),
        }
    }

    #[must_use]
    pub fn nb_registers(&self) -> u16 {
        self.regs.len() as u16
    }

    /// Returns the slot of the rth register.
    ///
    /// # Errors
    ///
    /// Accessing a register beyond the frame is a programmer error in
    /// the IR producer, reported as fatal.
    pub fn get(&self, r: Reg) -> AnalysisResult<&Slot> {
        self.regs
            .get(r.value() as usize)
            .ok_or(AnalysisError::OutOfBoundsRegister(r.value()))
    }

    /// The scalar lattice element of the rth register.
    pub fn get_type(&self, r: Reg) -> AnalysisResult<IRType> {
        Ok(self.get(r)?.scalar())
    }

    /// The inferred concrete type of the rth register, if any.
    #[must_use]
    pub fn get_dex_type(&self, r: Reg) -> Option<&Type> {
        self.regs
            .get(r.value() as usize)
            .and_then(|slot| slot.domain().get_dex_type())
    }

    #[inline]
    pub(crate) fn result(&self) -> &Slot {
        &self.result
    }

    pub(crate) fn set_result(&mut self, slot: Slot) {
        self.result = slot;
    }

    pub(crate) fn take_result(&mut self) -> Slot {
        std::mem::replace(&mut self.result, Slot::top())
    }

    fn set(&mut self, r: Reg, slot: Slot) -> AnalysisResult<()> {
        self.regs
            .get_mut(r.value() as usize)
            .map(|s| *s = slot)
            .ok_or(AnalysisError::OutOfBoundsRegister(r.value()))
    }

    /// Writes a narrow value, invalidating any wide pair the write
    /// tears apart.
    pub(crate) fn write(&mut self, r: Reg, slot: Slot) -> AnalysisResult<()> {
        if let Some(prev) = r.prev() {
            if self.get(prev)?.scalar().is_wide_first() && self.get(r)?.scalar().is_wide_second() {
                self.set(prev, Slot::top())?;
            }
        }
        if self.get(r)?.scalar().is_wide_first() {
            if let Ok(next) = self.get(r.next()).map(Slot::scalar) {
                if next.is_wide_second() {
                    self.set(r.next(), Slot::top())?;
                }
            }
        }
        self.set(r, slot)
    }

    /// Writes a wide value: `r` receives the given first-half slot and
    /// `r+1` the matching second-half tag. Pairs overlapping from
    /// below or above are invalidated.
    pub(crate) fn write_pair(&mut self, r: Reg, first: Slot) -> AnalysisResult<()> {
        if let Some(prev) = r.prev() {
            if self.get(prev)?.scalar().is_wide_first() && self.get(r)?.scalar().is_wide_second() {
                self.set(prev, Slot::top())?;
            }
        }
        let upper = r.next().next();
        if self.get(r.next())?.scalar().is_wide_first() {
            if let Ok(slot) = self.get(upper) {
                if slot.scalar().is_wide_second() {
                    self.set(upper, Slot::top())?;
                }
            }
        }
        let second = Slot::new(first.scalar().wide_pair_of(), DexTypeDomain::top());
        self.set(r, first)?;
        self.set(r.next(), second)
    }

    pub(crate) fn join(&mut self, other: &Self, repo: &Repo) -> AnalysisResult<()> {
        if self.regs.len() != other.regs.len() {
            return Err(AnalysisError::Internal(
                "joining type environments of different frame sizes".to_string(),
            ));
        }
        for (slot, other_slot) in self.regs.iter_mut().zip(other.regs.iter()) {
            slot.join(other_slot, repo);
        }
        self.result.join(&other.result, repo);
        Ok(())
    }
}
