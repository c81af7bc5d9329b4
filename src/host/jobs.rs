//! The host's microtask queue
//!
//! Promise reactions and thenable adoption run as jobs, in FIFO order, when
//! the embedder drains the queue with [`Engine::run_microtasks`].
//!
//! [`Engine::run_microtasks`]: crate::engine::Engine::run_microtasks

use crate::engine::Engine;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

pub type Job = Box<dyn FnOnce(&mut Engine)>;

/// Shared handle to the queue; promises keep one so they can schedule
/// reactions without access to the engine
#[derive(Clone, Default)]
pub struct JobQueue(Rc<RefCell<VecDeque<Job>>>);

impl JobQueue {
    pub fn new() -> Self {
        JobQueue::default()
    }

    pub fn enqueue(&self, job: impl FnOnce(&mut Engine) + 'static) {
        self.0.borrow_mut().push_back(Box::new(job));
    }

    /// Take the oldest job; the queue is not borrowed while it runs
    pub fn pop(&self) -> Option<Job> {
        self.0.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobQueue({} pending)", self.len())
    }
}
