//! The instruction subset executed by the interpreter
//!
//! Bodies are flat sequences. Structured instructions (`block`, `loop`, `if`,
//! `try`) open a scope that is closed by a matching `End`; the function body
//! itself is closed implicitly, so bodies carry no trailing `End`.

use super::ValueType;

/// Block type: the result of a structured instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
}

impl BlockType {
    /// Number of values the block leaves on the stack
    pub fn arity(&self) -> usize {
        match self {
            BlockType::Empty => 0,
            BlockType::Value(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Control
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    Return,
    Call(u32),

    // Exception handling
    Try(BlockType),
    Catch(u32),
    CatchAll,
    Throw(u32),
    Rethrow(u32),

    // Parametric
    Drop,

    // Variable
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Numeric
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    I32Add,
    I32Sub,
    I32Mul,
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32GtS,
    I64Add,

    // Reference
    RefNull,
    RefIsNull,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Unreachable => "unreachable",
            Instruction::Nop => "nop",
            Instruction::Block(_) => "block",
            Instruction::Loop(_) => "loop",
            Instruction::If(_) => "if",
            Instruction::Else => "else",
            Instruction::End => "end",
            Instruction::Br(_) => "br",
            Instruction::BrIf(_) => "br_if",
            Instruction::Return => "return",
            Instruction::Call(_) => "call",
            Instruction::Try(_) => "try",
            Instruction::Catch(_) => "catch",
            Instruction::CatchAll => "catch_all",
            Instruction::Throw(_) => "throw",
            Instruction::Rethrow(_) => "rethrow",
            Instruction::Drop => "drop",
            Instruction::LocalGet(_) => "local.get",
            Instruction::LocalSet(_) => "local.set",
            Instruction::LocalTee(_) => "local.tee",
            Instruction::GlobalGet(_) => "global.get",
            Instruction::GlobalSet(_) => "global.set",
            Instruction::I32Const(_) => "i32.const",
            Instruction::I64Const(_) => "i64.const",
            Instruction::F32Const(_) => "f32.const",
            Instruction::F64Const(_) => "f64.const",
            Instruction::I32Add => "i32.add",
            Instruction::I32Sub => "i32.sub",
            Instruction::I32Mul => "i32.mul",
            Instruction::I32Eqz => "i32.eqz",
            Instruction::I32Eq => "i32.eq",
            Instruction::I32Ne => "i32.ne",
            Instruction::I32LtS => "i32.lt_s",
            Instruction::I32GtS => "i32.gt_s",
            Instruction::I64Add => "i64.add",
            Instruction::RefNull => "ref.null",
            Instruction::RefIsNull => "ref.is_null",
        }
    }

    /// Whether this instruction opens a scope closed by `End`
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) | Instruction::Try(_)
        )
    }
}
