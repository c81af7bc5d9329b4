//! WebAssembly label stack for control flow
//!
//! See: <https://webassembly.github.io/spec/core/exec/runtime.html#labels>
//!
//! Labels carry everything a branch or an unwinding exception needs, so a
//! frame's label stack can be parked with its continuation and resumed later
//! without consulting anything but the function's [`ControlMap`].
//!
//! [`ControlMap`]: crate::module::ControlMap

use crate::error::Error;

/// Type of label construct
#[derive(Debug, Clone)]
pub enum LabelKind {
    /// Branches target the end of the block
    Block,
    /// Branches target the beginning of the loop
    Loop,
    If,
    /// The body of a `try`; its handlers are eligible for thrown exceptions
    Try,
    /// A `catch`/`catch_all` clause in progress, holding the caught exception
    /// for `rethrow`
    Catch(Error),
}

/// A label on the label stack
#[derive(Debug, Clone)]
pub struct Label {
    pub kind: LabelKind,
    /// Number of values the construct leaves on the stack
    pub arity: usize,
    /// Position of the structured instruction that opened this label
    pub start: usize,
    /// Position of the matching `End`
    pub end: usize,
    /// Height of value stack when entering this label
    pub stack_height: usize,
}

impl Label {
    /// Number of values carried by a branch to this label
    pub fn branch_arity(&self) -> usize {
        match self.kind {
            LabelKind::Loop => 0,
            _ => self.arity,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, LabelKind::Loop)
    }
}

#[derive(Debug, Default)]
pub struct LabelStack {
    labels: Vec<Label>,
}

impl LabelStack {
    pub fn new() -> Self {
        LabelStack { labels: Vec::new() }
    }

    pub fn push(&mut self, label: Label) {
        self.labels.push(label);
    }

    pub fn pop(&mut self) -> Option<Label> {
        self.labels.pop()
    }

    /// Get a label by relative depth (0 = innermost)
    pub fn get(&self, depth: u32) -> Option<&Label> {
        let len = self.labels.len();
        if depth as usize >= len {
            return None;
        }
        self.labels.get(len - 1 - depth as usize)
    }

    /// Keep only the outermost `len` labels
    pub fn truncate(&mut self, len: usize) {
        self.labels.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
