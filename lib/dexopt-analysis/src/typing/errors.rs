//! Typing errors definitions.

use crate::typing::IRType;
use dexopt_ir::registers::Reg;
use dexopt_ir::Addr;
use thiserror::Error;

/// A per-method type error, reported by the checker.
///
/// Only the first error of a method is surfaced; the checker stops at
/// the offending instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("'{mnemonic}' at {addr}: operand {reg} is undefined")]
    UndefinedOperand {
        addr: Addr,
        mnemonic: &'static str,
        reg: Reg,
    },

    #[error("'{mnemonic}' at {addr}: register {reg} breaks wide pairing")]
    WideMismatch {
        addr: Addr,
        mnemonic: &'static str,
        reg: Reg,
    },

    #[error("'{mnemonic}' at {addr}: {reg} holds {found}, expected at most {expected}")]
    ScalarTypeMismatch {
        addr: Addr,
        mnemonic: &'static str,
        reg: Reg,
        found: IRType,
        expected: IRType,
    },

    #[error("'{mnemonic}' at {addr}: {details}")]
    ReferenceTypeMismatch {
        addr: Addr,
        mnemonic: &'static str,
        details: String,
    },

    #[error("'{mnemonic}' at {addr}: returned value does not match the declared return type")]
    ReturnTypeMismatch { addr: Addr, mnemonic: &'static str },

    #[error("'{mnemonic}' at {addr}: {member} is not accessible from {caller}")]
    InaccessibleMember {
        addr: Addr,
        mnemonic: &'static str,
        member: String,
        caller: String,
    },

    #[error("'{mnemonic}' at {addr}: instance methods may not overwrite the 'this' register")]
    OverwriteThis { addr: Addr, mnemonic: &'static str },
}
