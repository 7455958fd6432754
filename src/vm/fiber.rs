use std::rc::Rc;

use crate::interpreter::errors::ScriptError;
use crate::value::Value;
use crate::vm::Chunk;

pub type FiberId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    New,
    Runnable,
    Running,
    Suspended,
    Dead,
}

/// One frame of script execution: a chunk, the next instruction to run, and
/// the stack offset where this frame's locals begin.
pub struct CallFrame {
    pub chunk: Rc<Chunk>,
    pub ip: usize,
    pub bp: usize,
}

/// An independent unit of bytecode execution: operand stack, call frames,
/// and scheduling state. Owned exclusively by the VM for its lifetime.
pub struct Fiber {
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    pub state: FiberState,
    /// Value delivered on the next resume, pushed onto the operand stack.
    pub pending_result: Option<Value>,
    /// Error delivered on the next resume, raised at the suspension point.
    pub pending_error: Option<ScriptError>,
    /// Fiber to wake when this one completes.
    pub waiter: Option<FiberId>,
    /// Final outcome, set exactly once when the fiber dies.
    pub result: Option<Result<Value, ScriptError>>,
}

impl Fiber {
    pub fn new(chunk: Rc<Chunk>, args: Vec<Value>) -> Self {
        let stack = args;
        Self {
            frames: vec![CallFrame {
                chunk,
                ip: 0,
                bp: 0,
            }],
            stack,
            state: FiberState::New,
            pending_result: None,
            pending_error: None,
            waiter: None,
            result: None,
        }
    }

    /// A fiber that never runs; used to carry an immediately available
    /// outcome, e.g. a deferred native call executed at spawn time.
    pub fn completed(result: Result<Value, ScriptError>) -> Self {
        Self {
            frames: Vec::new(),
            stack: Vec::new(),
            state: FiberState::Dead,
            pending_result: None,
            pending_error: None,
            waiter: None,
            result: Some(result),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state == FiberState::Dead
    }
}
