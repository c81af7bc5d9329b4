//! Control map: the static block structure of a function body
//!
//! The interpreter runs bodies as flat instruction sequences with a program
//! counter, so that an in-flight call stack is plain data that can be parked in
//! a continuation. Branch targets and exception handlers are resolved once,
//! up front, into this map.

use super::instruction::Instruction;
use crate::error::Error;
use std::collections::HashMap;

/// Which exceptions a handler clause accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// `catch tag`: exceptions carrying this tag index
    Tag(u32),
    /// `catch_all`: any catchable exception
    All,
}

/// Static information about one structured instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Position of the matching `End`
    pub end: usize,
    /// Position of `Else` for an `if` that has one
    pub else_pc: Option<usize>,
    /// Handler clauses of a `try`, in declaration order
    pub handlers: Vec<(HandlerKind, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlMap {
    blocks: HashMap<usize, BlockInfo>,
    /// `Else`/`Catch`/`CatchAll` position -> matching `End`
    clause_ends: HashMap<usize, usize>,
}

struct OpenBlock {
    start: usize,
    kind: OpenKind,
    clauses: Vec<usize>,
    else_pc: Option<usize>,
    handlers: Vec<(HandlerKind, usize)>,
    seen_catch_all: bool,
}

#[derive(PartialEq)]
enum OpenKind {
    Block,
    Loop,
    If,
    Try,
}

impl ControlMap {
    /// Validate the nesting of `body` and resolve every scope
    ///
    /// # Errors
    /// - `Else` outside an `if`, `Catch` outside a `try`, `catch` after `catch_all`
    /// - unbalanced `End`
    /// - a branch whose depth exceeds the enclosing scopes
    pub fn build(body: &[Instruction]) -> Result<Self, Error> {
        let mut map = ControlMap::default();
        let mut open: Vec<OpenBlock> = Vec::new();

        for (pc, instruction) in body.iter().enumerate() {
            match instruction {
                Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) | Instruction::Try(_) => {
                    let kind = match instruction {
                        Instruction::Block(_) => OpenKind::Block,
                        Instruction::Loop(_) => OpenKind::Loop,
                        Instruction::If(_) => OpenKind::If,
                        _ => OpenKind::Try,
                    };
                    open.push(OpenBlock {
                        start: pc,
                        kind,
                        clauses: Vec::new(),
                        else_pc: None,
                        handlers: Vec::new(),
                        seen_catch_all: false,
                    });
                }
                Instruction::Else => {
                    let block = open
                        .last_mut()
                        .filter(|b| b.kind == OpenKind::If && b.else_pc.is_none())
                        .ok_or_else(|| Error::Compile(format!("else without matching if at {pc}")))?;
                    block.else_pc = Some(pc);
                    block.clauses.push(pc);
                }
                Instruction::Catch(_) | Instruction::CatchAll => {
                    let block = open
                        .last_mut()
                        .filter(|b| b.kind == OpenKind::Try)
                        .ok_or_else(|| Error::Compile(format!("{} outside of try at {pc}", instruction.mnemonic())))?;
                    if block.seen_catch_all {
                        return Err(Error::Compile(format!("{} after catch_all at {pc}", instruction.mnemonic())));
                    }
                    let kind = match instruction {
                        Instruction::Catch(tag) => HandlerKind::Tag(*tag),
                        _ => {
                            block.seen_catch_all = true;
                            HandlerKind::All
                        }
                    };
                    block.handlers.push((kind, pc));
                    block.clauses.push(pc);
                }
                Instruction::End => {
                    let block = open
                        .pop()
                        .ok_or_else(|| Error::Compile(format!("unbalanced end at {pc}")))?;
                    for clause in &block.clauses {
                        map.clause_ends.insert(*clause, pc);
                    }
                    map.blocks.insert(
                        block.start,
                        BlockInfo {
                            end: pc,
                            else_pc: block.else_pc,
                            handlers: block.handlers,
                        },
                    );
                }
                Instruction::Br(depth) | Instruction::BrIf(depth) => {
                    // depth == open.len() targets the function body itself
                    if *depth as usize > open.len() {
                        return Err(Error::Compile(format!("invalid branch depth {depth} at {pc}")));
                    }
                }
                Instruction::Rethrow(depth) => {
                    if *depth as usize >= open.len() {
                        return Err(Error::Compile(format!("invalid rethrow depth {depth} at {pc}")));
                    }
                }
                _ => {}
            }
        }

        if let Some(block) = open.last() {
            return Err(Error::Compile(format!("unterminated block opened at {}", block.start)));
        }
        Ok(map)
    }

    /// Scope information for the structured instruction at `pc`
    pub fn block(&self, pc: usize) -> Result<&BlockInfo, Error> {
        self.blocks
            .get(&pc)
            .ok_or_else(|| Error::Runtime(format!("no block starts at {pc}")))
    }

    /// The `End` closing the clause that starts at `pc`
    pub fn clause_end(&self, pc: usize) -> Result<usize, Error> {
        self.clause_ends
            .get(&pc)
            .copied()
            .ok_or_else(|| Error::Runtime(format!("no clause starts at {pc}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::instruction::BlockType;
    use crate::module::ValueType;

    #[test]
    fn test_nested_blocks_resolve_ends() {
        let body = vec![
            Instruction::Block(BlockType::Empty), // 0
            Instruction::Loop(BlockType::Empty),  // 1
            Instruction::Br(1),                   // 2
            Instruction::End,                     // 3
            Instruction::End,                     // 4
        ];
        let map = ControlMap::build(&body).unwrap();
        assert_eq!(map.block(0).unwrap().end, 4);
        assert_eq!(map.block(1).unwrap().end, 3);
    }

    #[test]
    fn test_if_else_clauses() {
        let body = vec![
            Instruction::I32Const(1),
            Instruction::If(BlockType::Value(ValueType::I32)), // 1
            Instruction::I32Const(10),
            Instruction::Else, // 3
            Instruction::I32Const(20),
            Instruction::End, // 5
        ];
        let map = ControlMap::build(&body).unwrap();
        let info = map.block(1).unwrap();
        assert_eq!(info.else_pc, Some(3));
        assert_eq!(info.end, 5);
        assert_eq!(map.clause_end(3).unwrap(), 5);
    }

    #[test]
    fn test_try_handlers_in_order() {
        let body = vec![
            Instruction::Try(BlockType::Value(ValueType::I32)), // 0
            Instruction::Call(0),
            Instruction::Catch(0), // 2
            Instruction::CatchAll, // 3
            Instruction::I32Const(0),
            Instruction::End, // 5
        ];
        let map = ControlMap::build(&body).unwrap();
        let info = map.block(0).unwrap();
        assert_eq!(info.handlers, vec![(HandlerKind::Tag(0), 2), (HandlerKind::All, 3)]);
        assert_eq!(map.clause_end(2).unwrap(), 5);
        assert_eq!(map.clause_end(3).unwrap(), 5);
    }

    #[test]
    fn test_branch_to_function_level_is_valid() {
        let body = vec![Instruction::I32Const(0), Instruction::BrIf(0)];
        assert!(ControlMap::build(&body).is_ok());
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        let cases = vec![
            vec![Instruction::End],
            vec![Instruction::Else],
            vec![Instruction::Block(BlockType::Empty)],
            vec![Instruction::Block(BlockType::Empty), Instruction::Catch(0), Instruction::End],
            vec![
                Instruction::Try(BlockType::Empty),
                Instruction::CatchAll,
                Instruction::Catch(0),
                Instruction::End,
            ],
            vec![Instruction::Br(1)],
            vec![Instruction::Rethrow(0)],
        ];
        for body in cases {
            let err = ControlMap::build(&body).unwrap_err();
            assert!(matches!(err, Error::Compile(_)), "{body:?} gave {err:?}");
        }
    }
}
