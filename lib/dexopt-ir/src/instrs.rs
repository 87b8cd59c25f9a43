//! Dalvik bytecode instructions definitions.
//!
//! The instruction set is the denormalized register-based subset the
//! analysis core operates on: wide values always occupy explicit
//! register pairs, and the `/from16`, `/range`, `/2addr` and literal
//! encodings are folded into their canonical forms.

use crate::refs::{FieldRef, MethodRef};
use crate::registers::{Reg, RegList};
use crate::types::Type;
use crate::Addr;

pub trait Instruction {
    fn mnemonic(&self) -> &'static str;
    fn can_throw(&self) -> bool;
}

/// An instruction labeled with its address in the method body.
#[derive(Debug, Clone)]
pub struct LabeledInstr {
    pub(crate) addr: Addr,
    pub(crate) instr: Instr,
}

impl LabeledInstr {
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> Addr {
        self.addr
    }

    #[inline]
    #[must_use]
    pub const fn instr(&self) -> &Instr {
        &self.instr
    }

    #[inline]
    pub fn instr_mut(&mut self) -> &mut Instr {
        &mut self.instr
    }

    #[inline]
    #[must_use]
    pub const fn next_addr(&self) -> Addr {
        self.addr.next()
    }
}

/// The dispatch kind of an `invoke-*` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

/// The addressing kind of a field access instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOpKind {
    InstanceGet,
    InstancePut,
    StaticGet,
    StaticPut,
}

impl FieldOpKind {
    #[inline]
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(self, Self::StaticGet | Self::StaticPut)
    }
}

#[derive(Debug, Clone)]
pub enum Instr {
    /// Waste cycles.
    Nop,

    /// Move the contents of one non-object register to another.
    Move(Reg, Reg),
    /// Move the contents of one register pair to another.
    MoveWide(Reg, Reg),
    /// Move the contents of one object register to another.
    MoveObject(Reg, Reg),
    /// Move the non-object result of the most recent invoke.
    MoveResult(Reg),
    /// Move the wide result of the most recent invoke.
    MoveResultWide(Reg),
    /// Move the object result of the most recent invoke.
    MoveResultObject(Reg),

    /// Return from a `void` method.
    ReturnVoid,
    /// Return a non-object value.
    Return(Reg),
    /// Return a wide value.
    ReturnWide(Reg),
    /// Return an object reference.
    ReturnObject(Reg),

    /// Load a 32-bit literal.
    Const(Reg, i32),
    /// Load a 64-bit literal into a register pair.
    ConstWide(Reg, i64),
    /// Load a string reference.
    ConstString(Reg, String),
    /// Load a class reference.
    ConstClass(Reg, Type),

    /// Acquire the monitor of an object.
    MonitorEnter(Reg),
    /// Release the monitor of an object.
    MonitorExit(Reg),

    /// Throw if the reference cannot be cast to the type, then narrow.
    CheckCast(Reg, Type),
    /// Test whether the reference is an instance of the type.
    InstanceOf(Reg, Reg, Type),
    /// Read the length of an array.
    ArrayLength(Reg, Reg),
    /// Allocate an uninitialized object.
    NewInstance(Reg, Type),
    /// Allocate an array of the given size.
    NewArray(Reg, Reg, Type),
    /// Throw an exception object.
    Throw(Reg),

    /// Unconditional relative branch.
    Goto(i32),
    /// Indexed jump table: first key and relative targets.
    PackedSwitch(Reg, i32, Vec<i32>),

    /// Compare two floats, biasing NaN toward -1.
    CmplFloat(Reg, Reg, Reg),
    /// Compare two floats, biasing NaN toward 1.
    CmpgFloat(Reg, Reg, Reg),
    /// Compare two doubles, biasing NaN toward -1.
    CmplDouble(Reg, Reg, Reg),
    /// Compare two doubles, biasing NaN toward 1.
    CmpgDouble(Reg, Reg, Reg),
    /// Compare two longs.
    CmpLong(Reg, Reg, Reg),

    /// Branch if the registers compare equal.
    IfEq(Reg, Reg, i32),
    /// Branch if the registers compare not-equal.
    IfNe(Reg, Reg, i32),
    /// Branch if less-than.
    IfLt(Reg, Reg, i32),
    /// Branch if greater-or-equal.
    IfGe(Reg, Reg, i32),
    /// Branch if greater-than.
    IfGt(Reg, Reg, i32),
    /// Branch if less-or-equal.
    IfLe(Reg, Reg, i32),
    /// Branch if the register is zero or null.
    IfEqz(Reg, i32),
    /// Branch if the register is non-zero and non-null.
    IfNez(Reg, i32),
    /// Branch if negative.
    IfLtz(Reg, i32),
    /// Branch if non-negative.
    IfGez(Reg, i32),
    /// Branch if positive.
    IfGtz(Reg, i32),
    /// Branch if non-positive.
    IfLez(Reg, i32),

    /// Read an int or float array element.
    Aget(Reg, Reg, Reg),
    /// Read a wide array element.
    AgetWide(Reg, Reg, Reg),
    /// Read an object array element.
    AgetObject(Reg, Reg, Reg),
    /// Read a boolean array element.
    AgetBoolean(Reg, Reg, Reg),
    /// Read a byte array element.
    AgetByte(Reg, Reg, Reg),
    /// Read a char array element.
    AgetChar(Reg, Reg, Reg),
    /// Read a short array element.
    AgetShort(Reg, Reg, Reg),
    /// Write an int or float array element.
    Aput(Reg, Reg, Reg),
    /// Write a wide array element.
    AputWide(Reg, Reg, Reg),
    /// Write an object array element.
    AputObject(Reg, Reg, Reg),
    /// Write a boolean array element.
    AputBoolean(Reg, Reg, Reg),
    /// Write a byte array element.
    AputByte(Reg, Reg, Reg),
    /// Write a char array element.
    AputChar(Reg, Reg, Reg),
    /// Write a short array element.
    AputShort(Reg, Reg, Reg),

    /// Read an int or float instance field.
    Iget(Reg, Reg, FieldRef),
    /// Read a wide instance field.
    IgetWide(Reg, Reg, FieldRef),
    /// Read an object instance field.
    IgetObject(Reg, Reg, FieldRef),
    /// Read a boolean instance field.
    IgetBoolean(Reg, Reg, FieldRef),
    /// Read a byte instance field.
    IgetByte(Reg, Reg, FieldRef),
    /// Read a char instance field.
    IgetChar(Reg, Reg, FieldRef),
    /// Read a short instance field.
    IgetShort(Reg, Reg, FieldRef),
    /// Write an int or float instance field.
    Iput(Reg, Reg, FieldRef),
    /// Write a wide instance field.
    IputWide(Reg, Reg, FieldRef),
    /// Write an object instance field.
    IputObject(Reg, Reg, FieldRef),
    /// Write a boolean instance field.
    IputBoolean(Reg, Reg, FieldRef),
    /// Write a byte instance field.
    IputByte(Reg, Reg, FieldRef),
    /// Write a char instance field.
    IputChar(Reg, Reg, FieldRef),
    /// Write a short instance field.
    IputShort(Reg, Reg, FieldRef),

    /// Read an int or float static field.
    Sget(Reg, FieldRef),
    /// Read a wide static field.
    SgetWide(Reg, FieldRef),
    /// Read an object static field.
    SgetObject(Reg, FieldRef),
    /// Read a boolean static field.
    SgetBoolean(Reg, FieldRef),
    /// Read a byte static field.
    SgetByte(Reg, FieldRef),
    /// Read a char static field.
    SgetChar(Reg, FieldRef),
    /// Read a short static field.
    SgetShort(Reg, FieldRef),
    /// Write an int or float static field.
    Sput(Reg, FieldRef),
    /// Write a wide static field.
    SputWide(Reg, FieldRef),
    /// Write an object static field.
    SputObject(Reg, FieldRef),
    /// Write a boolean static field.
    SputBoolean(Reg, FieldRef),
    /// Write a byte static field.
    SputByte(Reg, FieldRef),
    /// Write a char static field.
    SputChar(Reg, FieldRef),
    /// Write a short static field.
    SputShort(Reg, FieldRef),

    /// Dispatch through the receiver class.
    InvokeVirtual(RegList, MethodRef),
    /// Dispatch through the superclass chain of the caller.
    InvokeSuper(RegList, MethodRef),
    /// Call a private method or constructor.
    InvokeDirect(RegList, MethodRef),
    /// Call a static method.
    InvokeStatic(RegList, MethodRef),
    /// Dispatch through an interface.
    InvokeInterface(RegList, MethodRef),

    /// Negate an int.
    NegInt(Reg, Reg),
    /// Bitwise-complement an int.
    NotInt(Reg, Reg),
    /// Negate a long.
    NegLong(Reg, Reg),
    /// Bitwise-complement a long.
    NotLong(Reg, Reg),
    /// Negate a float.
    NegFloat(Reg, Reg),
    /// Negate a double.
    NegDouble(Reg, Reg),

    /// Convert int to long.
    IntToLong(Reg, Reg),
    /// Convert int to float.
    IntToFloat(Reg, Reg),
    /// Convert int to double.
    IntToDouble(Reg, Reg),
    /// Convert long to int.
    LongToInt(Reg, Reg),
    /// Convert long to float.
    LongToFloat(Reg, Reg),
    /// Convert long to double.
    LongToDouble(Reg, Reg),
    /// Convert float to int.
    FloatToInt(Reg, Reg),
    /// Convert float to long.
    FloatToLong(Reg, Reg),
    /// Convert float to double.
    FloatToDouble(Reg, Reg),
    /// Convert double to int.
    DoubleToInt(Reg, Reg),
    /// Convert double to long.
    DoubleToLong(Reg, Reg),
    /// Convert double to float.
    DoubleToFloat(Reg, Reg),
    /// Truncate int to byte.
    IntToByte(Reg, Reg),
    /// Truncate int to char.
    IntToChar(Reg, Reg),
    /// Truncate int to short.
    IntToShort(Reg, Reg),

    /// Int addition.
    AddInt(Reg, Reg, Reg),
    /// Int subtraction.
    SubInt(Reg, Reg, Reg),
    /// Int multiplication.
    MulInt(Reg, Reg, Reg),
    /// Int division.
    DivInt(Reg, Reg, Reg),
    /// Int remainder.
    RemInt(Reg, Reg, Reg),
    /// Int bitwise and.
    AndInt(Reg, Reg, Reg),
    /// Int bitwise or.
    OrInt(Reg, Reg, Reg),
    /// Int bitwise xor.
    XorInt(Reg, Reg, Reg),
    /// Int left shift.
    ShlInt(Reg, Reg, Reg),
    /// Int arithmetic right shift.
    ShrInt(Reg, Reg, Reg),
    /// Int logical right shift.
    UshrInt(Reg, Reg, Reg),

    /// Long addition.
    AddLong(Reg, Reg, Reg),
    /// Long subtraction.
    SubLong(Reg, Reg, Reg),
    /// Long multiplication.
    MulLong(Reg, Reg, Reg),
    /// Long division.
    DivLong(Reg, Reg, Reg),
    /// Long remainder.
    RemLong(Reg, Reg, Reg),
    /// Long bitwise and.
    AndLong(Reg, Reg, Reg),
    /// Long bitwise or.
    OrLong(Reg, Reg, Reg),
    /// Long bitwise xor.
    XorLong(Reg, Reg, Reg),
    /// Long left shift (int shift amount).
    ShlLong(Reg, Reg, Reg),
    /// Long arithmetic right shift (int shift amount).
    ShrLong(Reg, Reg, Reg),
    /// Long logical right shift (int shift amount).
    UshrLong(Reg, Reg, Reg),

    /// Float addition.
    AddFloat(Reg, Reg, Reg),
    /// Float subtraction.
    SubFloat(Reg, Reg, Reg),
    /// Float multiplication.
    MulFloat(Reg, Reg, Reg),
    /// Float division.
    DivFloat(Reg, Reg, Reg),
    /// Float remainder.
    RemFloat(Reg, Reg, Reg),

    /// Double addition.
    AddDouble(Reg, Reg, Reg),
    /// Double subtraction.
    SubDouble(Reg, Reg, Reg),
    /// Double multiplication.
    MulDouble(Reg, Reg, Reg),
    /// Double division.
    DivDouble(Reg, Reg, Reg),
    /// Double remainder.
    RemDouble(Reg, Reg, Reg),
}

impl Instruction for Instr {
    fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Move(_, _) => "move",
            Self::MoveWide(_, _) => "move-wide",
            Self::MoveObject(_, _) => "move-object",
            Self::MoveResult(_) => "move-result",
            Self::MoveResultWide(_) => "move-result-wide",
            Self::MoveResultObject(_) => "move-result-object",
            Self::ReturnVoid => "return-void",
            Self::Return(_) => "return",
            Self::ReturnWide(_) => "return-wide",
            Self::ReturnObject(_) => "return-object",
            Self::Const(_, _) => "const",
            Self::ConstWide(_, _) => "const-wide",
            Self::ConstString(_, _) => "const-string",
            Self::ConstClass(_, _) => "const-class",
            Self::MonitorEnter(_) => "monitor-enter",
            Self::MonitorExit(_) => "monitor-exit",
            Self::CheckCast(_, _) => "check-cast",
            Self::InstanceOf(_, _, _) => "instance-of",
            Self::ArrayLength(_, _) => "array-length",
            Self::NewInstance(_, _) => "new-instance",
            Self::NewArray(_, _, _) => "new-array",
            Self::Throw(_) => "throw",
            Self::Goto(_) => "goto",
            Self::PackedSwitch(_, _, _) => "packed-switch",
            Self::CmplFloat(_, _, _) => "cmpl-float",
            Self::CmpgFloat(_, _, _) => "cmpg-float",
            Self::CmplDouble(_, _, _) => "cmpl-double",
            Self::CmpgDouble(_, _, _) => "cmpg-double",
            Self::CmpLong(_, _, _) => "cmp-long",
            Self::IfEq(_, _, _) => "if-eq",
            Self::IfNe(_, _, _) => "if-ne",
            Self::IfLt(_, _, _) => "if-lt",
            Self::IfGe(_, _, _) => "if-ge",
            Self::IfGt(_, _, _) => "if-gt",
            Self::IfLe(_, _, _) => "if-le",
            Self::IfEqz(_, _) => "if-eqz",
            Self::IfNez(_, _) => "if-nez",
            Self::IfLtz(_, _) => "if-ltz",
            Self::IfGez(_, _) => "if-gez",
            Self::IfGtz(_, _) => "if-gtz",
            Self::IfLez(_, _) => "if-lez",
            Self::Aget(_, _, _) => "aget",
            Self::AgetWide(_, _, _) => "aget-wide",
            Self::AgetObject(_, _, _) => "aget-object",
            Self::AgetBoolean(_, _, _) => "aget-boolean",
            Self::AgetByte(_, _, _) => "aget-byte",
            Self::AgetChar(_, _, _) => "aget-char",
            Self::AgetShort(_, _, _) => "aget-short",
            Self::Aput(_, _, _) => "aput",
            Self::AputWide(_, _, _) => "aput-wide",
            Self::AputObject(_, _, _) => "aput-object",
            Self::AputBoolean(_, _, _) => "aput-boolean",
            Self::AputByte(_, _, _) => "aput-byte",
            Self::AputChar(_, _, _) => "aput-char",
            Self::AputShort(_, _, _) => "aput-short",
            Self::Iget(_, _, _) => "iget",
            Self::IgetWide(_, _, _) => "iget-wide",
            Self::IgetObject(_, _, _) => "iget-object",
            Self::IgetBoolean(_, _, _) => "iget-boolean",
            Self::IgetByte(_, _, _) => "iget-byte",
            Self::IgetChar(_, _, _) => "iget-char",
            Self::IgetShort(_, _, _) => "iget-short",
            Self::Iput(_, _, _) => "iput",
            Self::IputWide(_, _, _) => "iput-wide",
            Self::IputObject(_, _, _) => "iput-object",
            Self::IputBoolean(_, _, _) => "iput-boolean",
            Self::IputByte(_, _, _) => "iput-byte",
            Self::IputChar(_, _, _) => "iput-char",
            Self::IputShort(_, _, _) => "iput-short",
            Self::Sget(_, _) => "sget",
            Self::SgetWide(_, _) => "sget-wide",
            Self::SgetObject(_, _) => "sget-object",
            Self::SgetBoolean(_, _) => "sget-boolean",
            Self::SgetByte(_, _) => "sget-byte",
            Self::SgetChar(_, _) => "sget-char",
            Self::SgetShort(_, _) => "sget-short",
            Self::Sput(_, _) => "sput",
            Self::SputWide(_, _) => "sput-wide",
            Self::SputObject(_, _) => "sput-object",
            Self::SputBoolean(_, _) => "sput-boolean",
            Self::SputByte(_, _) => "sput-byte",
            Self::SputChar(_, _) => "sput-char",
            Self::SputShort(_, _) => "sput-short",
            Self::InvokeVirtual(_, _) => "invoke-virtual",
            Self::InvokeSuper(_, _) => "invoke-super",
            Self::InvokeDirect(_, _) => "invoke-direct",
            Self::InvokeStatic(_, _) => "invoke-static",
            Self::InvokeInterface(_, _) => "invoke-interface",
            Self::NegInt(_, _) => "neg-int",
            Self::NotInt(_, _) => "not-int",
            Self::NegLong(_, _) => "neg-long",
            Self::NotLong(_, _) => "not-long",
            Self::NegFloat(_, _) => "neg-float",
            Self::NegDouble(_, _) => "neg-double",
            Self::IntToLong(_, _) => "int-to-long",
            Self::IntToFloat(_, _) => "int-to-float",
            Self::IntToDouble(_, _) => "int-to-double",
            Self::LongToInt(_, _) => "long-to-int",
            Self::LongToFloat(_, _) => "long-to-float",
            Self::LongToDouble(_, _) => "long-to-double",
            Self::FloatToInt(_, _) => "float-to-int",
            Self::FloatToLong(_, _) => "float-to-long",
            Self::FloatToDouble(_, _) => "float-to-double",
            Self::DoubleToInt(_, _) => "double-to-int",
            Self::DoubleToLong(_, _) => "double-to-long",
            Self::DoubleToFloat(_, _) => "double-to-float",
            Self::IntToByte(_, _) => "int-to-byte",
            Self::IntToChar(_, _) => "int-to-char",
            Self::IntToShort(_, _) => "int-to-short",
            Self::AddInt(_, _, _) => "add-int",
            Self::SubInt(_, _, _) => "sub-int",
            Self::MulInt(_, _, _) => "mul-int",
            Self::DivInt(_, _, _) => "div-int",
            Self::RemInt(_, _, _) => "rem-int",
            Self::AndInt(_, _, _) => "and-int",
            Self::OrInt(_, _, _) => "or-int",
            Self::XorInt(_, _, _) => "xor-int",
            Self::ShlInt(_, _, _) => "shl-int",
            Self::ShrInt(_, _, _) => "shr-int",
            Self::UshrInt(_, _, _) => "ushr-int",
            Self::AddLong(_, _, _) => "add-long",
            Self::SubLong(_, _, _) => "sub-long",
            Self::MulLong(_, _, _) => "mul-long",
            Self::DivLong(_, _, _) => "div-long",
            Self::RemLong(_, _, _) => "rem-long",
            Self::AndLong(_, _, _) => "and-long",
            Self::OrLong(_, _, _) => "or-long",
            Self::XorLong(_, _, _) => "xor-long",
            Self::ShlLong(_, _, _) => "shl-long",
            Self::ShrLong(_, _, _) => "shr-long",
            Self::UshrLong(_, _, _) => "ushr-long",
            Self::AddFloat(_, _, _) => "add-float",
            Self::SubFloat(_, _, _) => "sub-float",
            Self::MulFloat(_, _, _) => "mul-float",
            Self::DivFloat(_, _, _) => "div-float",
            Self::RemFloat(_, _, _) => "rem-float",
            Self::AddDouble(_, _, _) => "add-double",
            Self::SubDouble(_, _, _) => "sub-double",
            Self::MulDouble(_, _, _) => "mul-double",
            Self::DivDouble(_, _, _) => "div-double",
            Self::RemDouble(_, _, _) => "rem-double",
        }
    }

    fn can_throw(&self) -> bool {
        matches!(
            self,
            Self::Throw(_)
                | Self::CheckCast(_, _)
                | Self::ArrayLength(_, _)
                | Self::NewInstance(_, _)
                | Self::NewArray(_, _, _)
                | Self::MonitorEnter(_)
                | Self::MonitorExit(_)
                | Self::Aget(_, _, _)
                | Self::AgetWide(_, _, _)
                | Self::AgetObject(_, _, _)
                | Self::AgetBoolean(_, _, _)
                | Self::AgetByte(_, _, _)
                | Self::AgetChar(_, _, _)
                | Self::AgetShort(_, _, _)
                | Self::Aput(_, _, _)
                | Self::AputWide(_, _, _)
                | Self::AputObject(_, _, _)
                | Self::AputBoolean(_, _, _)
                | Self::AputByte(_, _, _)
                | Self::AputChar(_, _, _)
                | Self::AputShort(_, _, _)
                | Self::Iget(_, _, _)
                | Self::IgetWide(_, _, _)
                | Self::IgetObject(_, _, _)
                | Self::IgetBoolean(_, _, _)
                | Self::IgetByte(_, _, _)
                | Self::IgetChar(_, _, _)
                | Self::IgetShort(_, _, _)
                | Self::Iput(_, _, _)
                | Self::IputWide(_, _, _)
                | Self::IputObject(_, _, _)
                | Self::IputBoolean(_, _, _)
                | Self::IputByte(_, _, _)
                | Self::IputChar(_, _, _)
                | Self::IputShort(_, _, _)
                | Self::InvokeVirtual(_, _)
                | Self::InvokeSuper(_, _)
                | Self::InvokeDirect(_, _)
                | Self::InvokeStatic(_, _)
                | Self::InvokeInterface(_, _)
                | Self::DivInt(_, _, _)
                | Self::RemInt(_, _, _)
                | Self::DivLong(_, _, _)
                | Self::RemLong(_, _, _)
        )
    }
}

impl Instr {
    /// The dispatch kind and symbolic reference of an invoke.
    #[must_use]
    pub fn invoke(&self) -> Option<(InvokeKind, &RegList, &MethodRef)> {
        match self {
            Self::InvokeVirtual(args, mref) => Some((InvokeKind::Virtual, args, mref)),
            Self::InvokeSuper(args, mref) => Some((InvokeKind::Super, args, mref)),
            Self::InvokeDirect(args, mref) => Some((InvokeKind::Direct, args, mref)),
            Self::InvokeStatic(args, mref) => Some((InvokeKind::Static, args, mref)),
            Self::InvokeInterface(args, mref) => Some((InvokeKind::Interface, args, mref)),
            _ => None,
        }
    }

    /// Replaces the symbolic method reference of an invoke.
    pub fn set_method_ref(&mut self, new_ref: MethodRef) {
        match self {
            Self::InvokeVirtual(_, mref)
            | Self::InvokeSuper(_, mref)
            | Self::InvokeDirect(_, mref)
            | Self::InvokeStatic(_, mref)
            | Self::InvokeInterface(_, mref) => *mref = new_ref,
            _ => (),
        }
    }

    /// The access kind and symbolic reference of a field operation.
    #[must_use]
    pub fn field_access(&self) -> Option<(FieldOpKind, &FieldRef)> {
        match self {
            Self::Iget(_, _, fref)
            | Self::IgetWide(_, _, fref)
            | Self::IgetObject(_, _, fref)
            | Self::IgetBoolean(_, _, fref)
            | Self::IgetByte(_, _, fref)
            | Self::IgetChar(_, _, fref)
            | Self::IgetShort(_, _, fref) => Some((FieldOpKind::InstanceGet, fref)),
            Self::Iput(_, _, fref)
            | Self::IputWide(_, _, fref)
            | Self::IputObject(_, _, fref)
            | Self::IputBoolean(_, _, fref)
            | Self::IputByte(_, _, fref)
            | Self::IputChar(_, _, fref)
            | Self::IputShort(_, _, fref) => Some((FieldOpKind::InstancePut, fref)),
            Self::Sget(_, fref)
            | Self::SgetWide(_, fref)
            | Self::SgetObject(_, fref)
            | Self::SgetBoolean(_, fref)
            | Self::SgetByte(_, fref)
            | Self::SgetChar(_, fref)
            | Self::SgetShort(_, fref) => Some((FieldOpKind::StaticGet, fref)),
            Self::Sput(_, fref)
            | Self::SputWide(_, fref)
            | Self::SputObject(_, fref)
            | Self::SputBoolean(_, fref)
            | Self::SputChar(_, fref)
            | Self::SputByte(_, fref)
            | Self::SputShort(_, fref) => Some((FieldOpKind::StaticPut, fref)),
            _ => None,
        }
    }

    /// Replaces the symbolic field reference of a field operation.
    pub fn set_field_ref(&mut self, new_ref: FieldRef) {
        match self {
            Self::Iget(_, _, fref)
            | Self::IgetWide(_, _, fref)
            | Self::IgetObject(_, _, fref)
            | Self::IgetBoolean(_, _, fref)
            | Self::IgetByte(_, _, fref)
            | Self::IgetChar(_, _, fref)
            | Self::IgetShort(_, _, fref)
            | Self::Iput(_, _, fref)
            | Self::IputWide(_, _, fref)
            | Self::IputObject(_, _, fref)
            | Self::IputBoolean(_, _, fref)
            | Self::IputByte(_, _, fref)
            | Self::IputChar(_, _, fref)
            | Self::IputShort(_, _, fref)
            | Self::Sget(_, fref)
            | Self::SgetWide(_, fref)
            | Self::SgetObject(_, fref)
            | Self::SgetBoolean(_, fref)
            | Self::SgetByte(_, fref)
            | Self::SgetChar(_, fref)
            | Self::SgetShort(_, fref)
            | Self::Sput(_, fref)
            | Self::SputWide(_, fref)
            | Self::SputObject(_, fref)
            | Self::SputBoolean(_, fref)
            | Self::SputByte(_, fref)
            | Self::SputChar(_, fref)
            | Self::SputShort(_, fref) => *fref = new_ref,
            _ => (),
        }
    }

    /// The destination register written by this instruction, with a
    /// flag telling whether the write is wide (occupies a pair).
    #[must_use]
    pub fn dest(&self) -> Option<(Reg, bool)> {
        match self {
            Self::Move(dst, _)
            | Self::MoveObject(dst, _)
            | Self::MoveResult(dst)
            | Self::MoveResultObject(dst)
            | Self::Const(dst, _)
            | Self::ConstString(dst, _)
            | Self::ConstClass(dst, _)
            | Self::InstanceOf(dst, _, _)
            | Self::ArrayLength(dst, _)
            | Self::NewInstance(dst, _)
            | Self::NewArray(dst, _, _)
            | Self::CmplFloat(dst, _, _)
            | Self::CmpgFloat(dst, _, _)
            | Self::CmplDouble(dst, _, _)
            | Self::CmpgDouble(dst, _, _)
            | Self::CmpLong(dst, _, _)
            | Self::Aget(dst, _, _)
            | Self::AgetObject(dst, _, _)
            | Self::AgetBoolean(dst, _, _)
            | Self::AgetByte(dst, _, _)
            | Self::AgetChar(dst, _, _)
            | Self::AgetShort(dst, _, _)
            | Self::Iget(dst, _, _)
            | Self::IgetObject(dst, _, _)
            | Self::IgetBoolean(dst, _, _)
            | Self::IgetByte(dst, _, _)
            | Self::IgetChar(dst, _, _)
            | Self::IgetShort(dst, _, _)
            | Self::Sget(dst, _)
            | Self::SgetObject(dst, _)
            | Self::SgetBoolean(dst, _)
            | Self::SgetByte(dst, _)
            | Self::SgetChar(dst, _)
            | Self::SgetShort(dst, _)
            | Self::NegInt(dst, _)
            | Self::NotInt(dst, _)
            | Self::NegFloat(dst, _)
            | Self::IntToFloat(dst, _)
            | Self::LongToInt(dst, _)
            | Self::LongToFloat(dst, _)
            | Self::FloatToInt(dst, _)
            | Self::DoubleToInt(dst, _)
            | Self::DoubleToFloat(dst, _)
            | Self::IntToByte(dst, _)
            | Self::IntToChar(dst, _)
            | Self::IntToShort(dst, _)
            | Self::AddInt(dst, _, _)
            | Self::SubInt(dst, _, _)
            | Self::MulInt(dst, _, _)
            | Self::DivInt(dst, _, _)
            | Self::RemInt(dst, _, _)
            | Self::AndInt(dst, _, _)
            | Self::OrInt(dst, _, _)
            | Self::XorInt(dst, _, _)
            | Self::ShlInt(dst, _, _)
            | Self::ShrInt(dst, _, _)
            | Self::UshrInt(dst, _, _)
            | Self::AddFloat(dst, _, _)
            | Self::SubFloat(dst, _, _)
            | Self::MulFloat(dst, _, _)
            | Self::DivFloat(dst, _, _)
            | Self::RemFloat(dst, _, _) => Some((*dst, false)),

            Self::MoveWide(dst, _)
            | Self::MoveResultWide(dst)
            | Self::ConstWide(dst, _)
            | Self::AgetWide(dst, _, _)
            | Self::IgetWide(dst, _, _)
            | Self::SgetWide(dst, _)
            | Self::NegLong(dst, _)
            | Self::NotLong(dst, _)
            | Self::NegDouble(dst, _)
            | Self::IntToLong(dst, _)
            | Self::IntToDouble(dst, _)
            | Self::LongToDouble(dst, _)
            | Self::FloatToLong(dst, _)
            | Self::FloatToDouble(dst, _)
            | Self::DoubleToLong(dst, _)
            | Self::AddLong(dst, _, _)
            | Self::SubLong(dst, _, _)
            | Self::MulLong(dst, _, _)
            | Self::DivLong(dst, _, _)
            | Self::RemLong(dst, _, _)
            | Self::AndLong(dst, _, _)
            | Self::OrLong(dst, _, _)
            | Self::XorLong(dst, _, _)
            | Self::ShlLong(dst, _, _)
            | Self::ShrLong(dst, _, _)
            | Self::UshrLong(dst, _, _)
            | Self::AddDouble(dst, _, _)
            | Self::SubDouble(dst, _, _)
            | Self::MulDouble(dst, _, _)
            | Self::DivDouble(dst, _, _)
            | Self::RemDouble(dst, _, _) => Some((*dst, true)),

            _ => None,
        }
    }
}
