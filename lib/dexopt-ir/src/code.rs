//! Method bodies.

use crate::instrs::{Instr, LabeledInstr};
use crate::{Addr, Instruction};
use std::fmt;

/// A method body: the register frame size and the instruction list,
/// labeled with consecutive addresses.
#[derive(Debug, Clone)]
pub struct Code {
    registers_size: u16,
    instrs: Vec<LabeledInstr>,
}

impl Code {
    /// Builds a method body, assigning an address to each instruction.
    #[must_use]
    pub fn new(registers_size: u16, instrs: Vec<Instr>) -> Self {
        let instrs = instrs
            .into_iter()
            .enumerate()
            .map(|(i, instr)| LabeledInstr {
                addr: Addr(i),
                instr,
            })
            .collect();
        Self {
            registers_size,
            instrs,
        }
    }

    /// The number of virtual registers of the frame.
    #[inline]
    #[must_use]
    pub const fn registers_size(&self) -> u16 {
        self.registers_size
    }

    #[inline]
    #[must_use]
    pub fn instructions_count(&self) -> usize {
        self.instrs.len()
    }

    #[inline]
    pub fn iter_instructions(&self) -> impl Iterator<Item = &LabeledInstr> {
        self.instrs.iter()
    }

    #[inline]
    pub fn iter_instructions_mut(&mut self) -> impl Iterator<Item = &mut LabeledInstr> {
        self.instrs.iter_mut()
    }

    /// The instruction at the given address.
    #[must_use]
    pub fn instruction_at(&self, addr: Addr) -> Option<&LabeledInstr> {
        self.instrs.get(addr.0)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for linstr in &self.instrs {
            writeln!(f, "{}: {}", linstr.addr(), linstr.instr().mnemonic())?;
        }
        Ok(())
    }
}
