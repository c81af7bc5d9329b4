//! Resumable WebAssembly instruction executor
//!
//! The executor never recurses on the Rust stack for wasm-to-wasm calls: every
//! active call is a [`Frame`] on an explicit frame stack, and all frames share
//! one operand [`Stack`]. An [`ExecState`] is therefore a complete, movable
//! picture of an in-flight computation. When a suspending import hands back a
//! promise, [`run`] returns [`Step::Suspended`] with the state intact; the
//! continuation manager parks it and later calls [`run`] again with the
//! settled value or error, which lands exactly at the call site.
//!
//! Host calls do recurse: a host function may call back into wasm, which runs
//! on a fresh, owner-less `ExecState` nested on the Rust stack. Such nested
//! executions can never suspend.

use super::control::{Label, LabelKind};
use super::frame::Frame;
use super::stack::Stack;
use super::store::{FuncAddr, FunctionInstance};
use super::Value;
use crate::bridge::continuation::ContinuationId;
use crate::bridge::suspending::{self, HostCall};
use crate::engine::Engine;
use crate::error::Error;
use crate::host::{Exception, HostValue, Promise};
use crate::module::control::HandlerKind;
use crate::module::{BlockType, Instruction, ValueType};
use tracing::debug;

/// Result of running an execution until it stops
#[derive(Debug)]
pub(crate) enum Step {
    /// The entry function returned these values
    Complete(Vec<Value>),
    /// A suspending import returned this promise; the state is parked at the
    /// call site
    Suspended(Promise),
}

/// How to continue an execution
#[derive(Debug)]
pub(crate) enum Resume {
    Start,
    /// The awaited promise fulfilled; the value is the import's result
    Value(HostValue),
    /// The awaited promise rejected; the error is thrown at the call site
    Throw(Error),
}

/// Abrupt completion of an instruction
#[derive(Debug)]
pub(crate) enum Unwind {
    /// Not catchable by wasm handlers
    Trap(Error),
    /// Catchable by `catch_all`, and by `catch` when the tag matches
    Throw(Error),
}

impl From<Error> for Unwind {
    fn from(error: Error) -> Self {
        Unwind::Trap(error)
    }
}

fn no_frame() -> Error {
    Error::Runtime("no active frame".to_string())
}

#[derive(Debug)]
pub(crate) struct ExecState {
    frames: Vec<Frame>,
    stack: Stack,
    /// Continuation this execution runs on; `None` for direct host calls
    owner: Option<ContinuationId>,
    /// Function to call on [`Resume::Start`], its arguments already on the stack
    entry: Option<FuncAddr>,
    /// Result types of the host call the execution is suspended in
    pending: Option<Vec<ValueType>>,
    executed: u64,
}

impl ExecState {
    pub(crate) fn new(owner: Option<ContinuationId>, entry: FuncAddr, args: Vec<Value>) -> Self {
        let mut stack = Stack::new();
        stack.push_all(args);
        ExecState {
            frames: Vec::new(),
            stack,
            owner,
            entry: Some(entry),
            pending: None,
            executed: 0,
        }
    }

    fn frame(&self) -> Result<&Frame, Error> {
        self.frames.last().ok_or_else(no_frame)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, Error> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    fn tick(&mut self, engine: &Engine) -> Result<(), Unwind> {
        self.executed += 1;
        match engine.config().instruction_budget {
            Some(budget) if self.executed > budget => Err(Unwind::Trap(Error::Runtime(
                "instruction budget exhausted".to_string(),
            ))),
            _ => Ok(()),
        }
    }

    fn enter_block(&mut self, kind: LabelKind, block_type: BlockType, pc: usize) -> Result<(), Error> {
        let stack_height = self.stack.len();
        let frame = self.frame_mut()?;
        let end = frame.code.control.block(pc)?.end;
        frame.labels.push(Label {
            kind,
            arity: block_type.arity(),
            start: pc,
            end,
            stack_height,
        });
        Ok(())
    }

    fn end_block(&mut self) -> Result<(), Error> {
        let label = self
            .frame_mut()?
            .labels
            .pop()
            .ok_or_else(|| Error::Runtime("end without an open block".to_string()))?;
        let results = self.stack.pop_n(label.arity)?;
        self.stack.truncate(label.stack_height);
        self.stack.push_all(results);
        Ok(())
    }

    /// Skip to the `End` of the clause starting at `pc`
    fn skip_clause(&mut self, pc: usize) -> Result<(), Error> {
        let frame = self.frame_mut()?;
        let end = frame.code.control.clause_end(pc)?;
        frame.pc = end;
        Ok(())
    }

    fn branch(&mut self, depth: u32) -> Result<(), Error> {
        if depth as usize == self.frame()?.labels.len() {
            return self.return_from_frame();
        }
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let label = frame
            .labels
            .get(depth)
            .cloned()
            .ok_or_else(|| Error::Runtime(format!("invalid branch depth {depth}")))?;
        let outer = frame.labels.len() - depth as usize - 1;
        if label.is_loop() {
            frame.labels.truncate(outer + 1);
            frame.pc = label.start + 1;
        } else {
            frame.labels.truncate(outer);
            frame.pc = label.end + 1;
        }
        let results = self.stack.pop_n(label.branch_arity())?;
        self.stack.truncate(label.stack_height);
        self.stack.push_all(results);
        Ok(())
    }

    fn return_from_frame(&mut self) -> Result<(), Error> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        let results = self.stack.pop_n(frame.return_arity())?;
        self.stack.truncate(frame.stack_base);
        self.stack.push_all(results);
        Ok(())
    }

    fn local(&self, idx: u32) -> Result<Value, Error> {
        self.frame()?
            .locals
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| Error::Runtime(format!("local index out of bounds: {idx}")))
    }

    fn set_local(&mut self, idx: u32, value: Value) -> Result<(), Error> {
        let slot = self
            .frame_mut()?
            .locals
            .get_mut(idx as usize)
            .ok_or_else(|| Error::Runtime(format!("local index out of bounds: {idx}")))?;
        if slot.typ() != value.typ() {
            return Err(Error::Runtime(format!(
                "type mismatch: expected {}, got {}",
                slot.typ(),
                value.typ()
            )));
        }
        *slot = value;
        Ok(())
    }

    fn binary_i32(&mut self, op: impl Fn(i32, i32) -> i32) -> Result<(), Error> {
        let b = self.stack.pop_i32()?;
        let a = self.stack.pop_i32()?;
        self.stack.push(Value::I32(op(a, b)));
        Ok(())
    }

    /// Drop everything; the execution is dead
    fn abandon(&mut self) {
        self.frames.clear();
        self.stack.clear();
        self.pending = None;
    }

    /// Find a handler for `unwind`, innermost first, popping frames on the way
    ///
    /// Returns `Ok` once a handler has been entered, or the error when it
    /// escapes the entry frame.
    fn unwind(&mut self, engine: &Engine, unwind: Unwind) -> Result<(), Error> {
        let error = match unwind {
            Unwind::Trap(error) => {
                debug!(error = %error, "trap");
                self.abandon();
                return Err(error);
            }
            Unwind::Throw(error) => error,
        };

        while let Some(frame) = self.frames.last_mut() {
            while let Some(label) = frame.labels.pop() {
                if !matches!(label.kind, LabelKind::Try) {
                    continue;
                }
                let tags = &engine.store.instance(frame.instance)?.tags;
                for (handler, pc) in &frame.code.control.block(label.start)?.handlers {
                    let payload = match (handler, &error) {
                        (HandlerKind::All, _) => Some(Vec::new()),
                        (HandlerKind::Tag(idx), Error::Exception(exception)) => match tags.get(*idx as usize) {
                            Some(tag) if exception.is(tag) => Some(exception.payload().to_vec()),
                            _ => None,
                        },
                        _ => None,
                    };
                    if let Some(payload) = payload {
                        self.stack.truncate(label.stack_height);
                        self.stack.push_all(payload);
                        frame.pc = pc + 1;
                        frame.labels.push(Label {
                            kind: LabelKind::Catch(error),
                            ..label
                        });
                        return Ok(());
                    }
                }
            }
            let base = frame.stack_base;
            self.frames.pop();
            self.stack.truncate(base);
        }

        self.abandon();
        Err(error)
    }
}

/// Run `state` until its entry function returns, it suspends, or an error
/// escapes it
pub(crate) fn run(engine: &mut Engine, state: &mut ExecState, resume: Resume) -> Result<Step, Error> {
    match resume {
        Resume::Start => {
            if let Some(addr) = state.entry.take() {
                match call(engine, state, addr) {
                    Ok(Some(promise)) => return Ok(Step::Suspended(promise)),
                    Ok(None) => {}
                    Err(unwind) => state.unwind(engine, unwind)?,
                }
            }
        }
        Resume::Value(value) => {
            let types = state
                .pending
                .take()
                .ok_or_else(|| Error::Runtime("resumed an execution that is not suspended".to_string()))?;
            match value.to_wasm_results(&types) {
                Ok(values) => state.stack.push_all(values),
                Err(error) => state.unwind(engine, Unwind::Throw(error))?,
            }
        }
        Resume::Throw(error) => {
            state.pending = None;
            state.unwind(engine, Unwind::Throw(error))?;
        }
    }

    loop {
        if state.frames.is_empty() {
            let results = state.stack.pop_n(state.stack.len())?;
            return Ok(Step::Complete(results));
        }
        match step(engine, state) {
            Ok(None) => {}
            Ok(Some(promise)) => return Ok(Step::Suspended(promise)),
            Err(unwind) => state.unwind(engine, unwind)?,
        }
    }
}

/// Call the function at `addr` with its arguments on top of the stack
fn call(engine: &mut Engine, state: &mut ExecState, addr: FuncAddr) -> Result<Option<Promise>, Unwind> {
    match engine.store.function(addr)?.clone() {
        FunctionInstance::Wasm { instance, code } => {
            if engine.call_depth() + state.frames.len() >= engine.config().max_call_depth {
                return Err(Unwind::Trap(Error::stack_overflow()));
            }
            let args = state.stack.pop_types(&code.func_type.parameters)?;
            let stack_base = state.stack.len();
            state.frames.push(Frame::new(code, instance, args, stack_base));
            Ok(None)
        }
        FunctionInstance::Host(import) => {
            let args = state.stack.pop_types(&import.func_type.parameters)?;
            let depth = state.frames.len();
            engine.enter_host(depth)?;
            let result = suspending::dispatch(engine, &import, args, state.owner);
            engine.leave_host(depth);
            match result? {
                HostCall::Return(values) => {
                    state.stack.push_all(values);
                    Ok(None)
                }
                HostCall::Suspend(promise) => {
                    state.pending = Some(import.func_type.return_types.clone());
                    Ok(Some(promise))
                }
            }
        }
    }
}

/// Execute one instruction of the innermost frame
fn step(engine: &mut Engine, state: &mut ExecState) -> Result<Option<Promise>, Unwind> {
    state.tick(engine)?;

    let (pc, instruction) = {
        let frame = state.frame_mut()?;
        (frame.pc, frame.code.body.get(frame.pc).cloned())
    };
    // Falling off the end of the body is an implicit return
    let Some(instruction) = instruction else {
        state.return_from_frame()?;
        return Ok(None);
    };
    state.frame_mut()?.pc += 1;

    match instruction {
        Instruction::Unreachable => return Err(Unwind::Trap(Error::Runtime("unreachable".to_string()))),
        Instruction::Nop => {}
        Instruction::Block(block_type) => state.enter_block(LabelKind::Block, block_type, pc)?,
        Instruction::Loop(block_type) => state.enter_block(LabelKind::Loop, block_type, pc)?,
        Instruction::Try(block_type) => state.enter_block(LabelKind::Try, block_type, pc)?,
        Instruction::If(block_type) => {
            let condition = state.stack.pop_i32()?;
            state.enter_block(LabelKind::If, block_type, pc)?;
            if condition == 0 {
                let frame = state.frame_mut()?;
                let info = frame.code.control.block(pc)?;
                let target = match info.else_pc {
                    Some(else_pc) => else_pc + 1,
                    None => info.end,
                };
                frame.pc = target;
            }
        }
        // Reached by falling off the end of a `then` arm or a `try` body/clause
        Instruction::Else | Instruction::Catch(_) | Instruction::CatchAll => state.skip_clause(pc)?,
        Instruction::End => state.end_block()?,
        Instruction::Br(depth) => state.branch(depth)?,
        Instruction::BrIf(depth) => {
            if state.stack.pop_i32()? != 0 {
                state.branch(depth)?;
            }
        }
        Instruction::Return => state.return_from_frame()?,
        Instruction::Call(idx) => {
            let addr = engine.store.instance(state.frame()?.instance)?.function(idx)?;
            return call(engine, state, addr);
        }

        Instruction::Throw(idx) => {
            let tag = engine.store.instance(state.frame()?.instance)?.tag(idx)?.clone();
            let payload = state.stack.pop_types(tag.parameters())?;
            return Err(Unwind::Throw(Error::Exception(Exception::new(tag, payload))));
        }
        Instruction::Rethrow(depth) => {
            return match state.frame()?.labels.get(depth) {
                Some(Label {
                    kind: LabelKind::Catch(error),
                    ..
                }) => Err(Unwind::Throw(error.clone())),
                _ => Err(Unwind::Trap(Error::Runtime(format!(
                    "rethrow target {depth} is not a catch clause"
                )))),
            };
        }

        Instruction::Drop => {
            state.stack.pop()?;
        }

        Instruction::LocalGet(idx) => {
            let value = state.local(idx)?;
            state.stack.push(value);
        }
        Instruction::LocalSet(idx) => {
            let value = state.stack.pop()?;
            state.set_local(idx, value)?;
        }
        Instruction::LocalTee(idx) => {
            let value = state.stack.pop()?;
            state.stack.push(value.clone());
            state.set_local(idx, value)?;
        }
        Instruction::GlobalGet(idx) => {
            let value = engine.store.instance(state.frame()?.instance)?.global(idx)?.get();
            state.stack.push(value);
        }
        Instruction::GlobalSet(idx) => {
            let value = state.stack.pop()?;
            engine.store.instance(state.frame()?.instance)?.global(idx)?.set(value)?;
        }

        Instruction::I32Const(v) => state.stack.push(Value::I32(v)),
        Instruction::I64Const(v) => state.stack.push(Value::I64(v)),
        Instruction::F32Const(v) => state.stack.push(Value::F32(v)),
        Instruction::F64Const(v) => state.stack.push(Value::F64(v)),
        Instruction::I32Add => state.binary_i32(i32::wrapping_add)?,
        Instruction::I32Sub => state.binary_i32(i32::wrapping_sub)?,
        Instruction::I32Mul => state.binary_i32(i32::wrapping_mul)?,
        Instruction::I32Eqz => {
            let v = state.stack.pop_i32()?;
            state.stack.push(Value::I32((v == 0) as i32));
        }
        Instruction::I32Eq => state.binary_i32(|a, b| (a == b) as i32)?,
        Instruction::I32Ne => state.binary_i32(|a, b| (a != b) as i32)?,
        Instruction::I32LtS => state.binary_i32(|a, b| (a < b) as i32)?,
        Instruction::I32GtS => state.binary_i32(|a, b| (a > b) as i32)?,
        Instruction::I64Add => {
            let b = state.stack.pop_i64()?;
            let a = state.stack.pop_i64()?;
            state.stack.push(Value::I64(a.wrapping_add(b)));
        }

        Instruction::RefNull => state.stack.push(Value::ExternRef(HostValue::Null)),
        Instruction::RefIsNull => {
            let value = state.stack.pop_typed(ValueType::ExternRef)?;
            let is_null = matches!(value, Value::ExternRef(HostValue::Null));
            state.stack.push(Value::I32(is_null as i32));
        }
    }
    Ok(None)
}
