//=============================================
// emberscript/vm/runtime.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Fiber virtual machine runtime
// Objective: Execute compiled chunks inside cooperatively scheduled fibers
//            with per-fiber error isolation and deferred magic-method calls
//=============================================

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::interpreter::errors::ScriptError;
use crate::value::{NativeFunction, Value};
use crate::vm::builtins;
use crate::vm::fiber::{CallFrame, Fiber, FiberId, FiberState};
use crate::vm::fiber_control::FiberControl;
use crate::vm::magic::{binary_magic_name, call_magic_if_present, unary_magic_name};
use crate::vm::{Chunk, Instruction};

/// What a single resume of a fiber ended with.
enum FiberRun {
    Yielded,
    Suspended,
    Completed(Value),
}

/// The virtual machine: fiber slab, round-robin run queue, and the global
/// namespace. Single threaded; fibers interleave only at the boundaries the
/// scheduler controls.
pub struct Vm {
    fibers: Vec<Fiber>,
    run_queue: VecDeque<FiberId>,
    globals: HashMap<String, Value>,
    control: FiberControl,
    output: Rc<RefCell<dyn Write>>,
    running: Option<FiberId>,
    last_completed: Option<FiberId>,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            fibers: Vec::new(),
            run_queue: VecDeque::new(),
            globals: HashMap::new(),
            control: FiberControl::new(),
            output: Rc::new(RefCell::new(io::stdout())),
            running: None,
            last_completed: None,
        };
        builtins::install(&mut vm);
        vm
    }

    /// Redirect `print` output, e.g. into a buffer under test.
    pub fn with_output(mut self, sink: Rc<RefCell<dyn Write>>) -> Self {
        self.output = sink;
        self
    }

    pub fn write_line(&mut self, text: &str) {
        if let Err(error) = writeln!(self.output.borrow_mut(), "{}", text) {
            warn!(%error, "output sink write failed");
        }
    }

    //=============================================
    //            Section 1: Host Surface
    //=============================================

    /// Register a host callable under `name` in the global namespace.
    pub fn register_native(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&mut Vm, Vec<Value>) -> Result<Value, ScriptError> + 'static,
    ) {
        let name = name.into();
        let native = NativeFunction::new(name.clone(), func);
        self.globals.insert(name, Value::object(native));
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Handle a host thread can use to flag cancellation.
    pub fn control(&self) -> FiberControl {
        self.control.clone()
    }

    pub fn fiber_state(&self, fiber: FiberId) -> Option<FiberState> {
        self.fibers.get(fiber).map(|f| f.state)
    }

    pub fn fiber_result(&self, fiber: FiberId) -> Option<Result<Value, ScriptError>> {
        self.fibers.get(fiber).and_then(|f| f.result.clone())
    }

    //=============================================
    //            Section 2: Fiber Lifecycle
    //=============================================

    /// Create a runnable fiber for `chunk` with `args` as its first locals.
    pub fn add_fiber(&mut self, chunk: Rc<Chunk>, args: Vec<Value>) -> FiberId {
        let id = self.fibers.len();
        let mut fiber = Fiber::new(chunk, args);
        fiber.state = FiberState::Runnable;
        self.fibers.push(fiber);
        self.control.register(id);
        self.run_queue.push_back(id);
        debug!(fiber = id, "fiber spawned");
        id
    }

    /// Schedule a call on its own fiber. Script functions get a fresh fiber;
    /// a native callee executes synchronously and the returned fiber is
    /// already complete.
    pub fn spawn_call(&mut self, callee: Value, args: Vec<Value>) -> Result<FiberId, ScriptError> {
        if let Value::Object(object) = &callee {
            if object.as_native().is_some() {
                let object = Rc::clone(object);
                let result = match object.as_native() {
                    Some(native) => native.call(self, args),
                    None => unreachable!("checked above"),
                };
                let id = self.fibers.len();
                self.fibers.push(Fiber::completed(result));
                self.last_completed = Some(id);
                return Ok(id);
            }
            if let Some(func) = object.as_script_fn() {
                if args.len() != func.nparams {
                    return Err(ScriptError::type_error(format!(
                        "{} expects {} arguments, got {}",
                        func.name,
                        func.nparams,
                        args.len()
                    )));
                }
                let chunk = Rc::clone(&func.chunk);
                return Ok(self.add_fiber(chunk, args));
            }
        }
        Err(ScriptError::type_error(format!(
            "{} is not callable",
            callee.desc()
        )))
    }

    /// Cancel a fiber. It never executes another instruction; a child it was
    /// awaiting is abandoned, and any fiber awaiting it is woken with an
    /// error.
    pub fn cancel(&mut self, fiber: FiberId) {
        if fiber >= self.fibers.len() {
            return;
        }
        if self.running == Some(fiber) {
            // The slab slot holds a placeholder while the fiber runs; flag
            // it so the dispatch loop stops at the next native boundary.
            self.control.cancel(fiber);
            return;
        }
        for child in &mut self.fibers {
            if child.waiter == Some(fiber) {
                child.waiter = None;
            }
        }
        if self.fibers[fiber].is_dead() {
            return;
        }
        let waiter = self.fibers[fiber].waiter.take();
        let target = &mut self.fibers[fiber];
        target.state = FiberState::Dead;
        if target.result.is_none() {
            target.result = Some(Err(ScriptError::value_error("fiber cancelled")));
        }
        self.control.complete(fiber);
        debug!(fiber, "fiber cancelled");
        if let Some(waiter) = waiter {
            self.wake(
                waiter,
                Err(ScriptError::value_error("awaited fiber was cancelled")),
            );
        }
    }

    fn wake(&mut self, fiber: FiberId, delivery: Result<Value, ScriptError>) {
        let Some(target) = self.fibers.get_mut(fiber) else {
            return;
        };
        if target.is_dead() {
            return;
        }
        match delivery {
            Ok(value) => target.pending_result = Some(value),
            Err(error) => target.pending_error = Some(error),
        }
        target.state = FiberState::Runnable;
        self.run_queue.push_back(fiber);
    }

    fn finish(&mut self, fiber: FiberId, result: Result<Value, ScriptError>) {
        let waiter = self.fibers[fiber].waiter.take();
        self.fibers[fiber].state = FiberState::Dead;
        self.fibers[fiber].result = Some(result.clone());
        self.control.complete(fiber);
        self.last_completed = Some(fiber);
        match (&result, waiter) {
            (Err(error), None) => {
                // The error dies with its fiber; globals and the other
                // fibers are untouched.
                warn!(fiber, %error, "fiber failed");
            }
            (_, Some(waiter)) => self.wake(waiter, result),
            _ => {}
        }
    }

    //=============================================
    //            Section 3: Scheduling
    //=============================================

    /// Drive the run queue until no runnable fiber remains, then return the
    /// most recently completed fiber's result.
    pub fn run(&mut self) -> Result<Value, ScriptError> {
        self.run_all();
        match self
            .last_completed
            .and_then(|id| self.fibers[id].result.clone())
        {
            Some(result) => result,
            None => Ok(Value::Int(0)),
        }
    }

    fn run_all(&mut self) {
        while let Some(id) = self.run_queue.pop_front() {
            if self.fibers[id].is_dead() {
                continue;
            }
            if self.control.is_cancelled(id) {
                self.cancel(id);
                continue;
            }
            self.resume(id);
        }
    }

    /// Run one chunk on a fresh fiber to completion.
    pub fn evaluate(&mut self, chunk: Chunk) -> Result<Value, ScriptError> {
        let id = self.add_fiber(Rc::new(chunk), Vec::new());
        self.run_all();
        match self.fibers[id].result.clone() {
            Some(result) => result,
            None => Err(ScriptError::value_error("fiber did not run to completion")),
        }
    }

    /// Tokenize, parse, compile, and run a semicolon separated program.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, ScriptError> {
        let chunk = crate::vm::compiler::compile_source(source)?;
        self.evaluate(chunk)
    }

    fn resume(&mut self, id: FiberId) {
        // Take the fiber out of the slab so natives invoked during execution
        // can borrow the VM mutably.
        let mut fiber =
            std::mem::replace(&mut self.fibers[id], Fiber::completed(Ok(Value::Int(0))));

        if let Some(error) = fiber.pending_error.take() {
            self.fibers[id] = fiber;
            self.finish(id, Err(error));
            return;
        }

        fiber.state = FiberState::Running;
        if let Some(value) = fiber.pending_result.take() {
            fiber.stack.push(value);
        }

        let previous = self.running.replace(id);
        let outcome = self.run_fiber(id, &mut fiber);
        self.running = previous;
        self.fibers[id] = fiber;
        match outcome {
            Ok(FiberRun::Yielded) => {
                self.fibers[id].state = FiberState::Runnable;
                self.run_queue.push_back(id);
            }
            Ok(FiberRun::Suspended) => {
                self.fibers[id].state = FiberState::Suspended;
            }
            Ok(FiberRun::Completed(value)) => self.finish(id, Ok(value)),
            Err(error) => self.finish(id, Err(error)),
        }
    }

    //=============================================
    //            Section 4: Dispatch Loop
    //=============================================

    fn run_fiber(&mut self, id: FiberId, fiber: &mut Fiber) -> Result<FiberRun, ScriptError> {
        loop {
            let Some(frame) = fiber.frames.last_mut() else {
                return Ok(FiberRun::Completed(
                    fiber.stack.pop().unwrap_or(Value::Int(0)),
                ));
            };
            let Some(instruction) = frame.chunk.code.get(frame.ip).copied() else {
                // Falling off the end of a chunk behaves like Return.
                let value = fiber.stack.pop().unwrap_or(Value::Int(0));
                if let Some(done) = fiber.frames.pop() {
                    fiber.stack.truncate(done.bp);
                }
                if fiber.frames.is_empty() {
                    return Ok(FiberRun::Completed(value));
                }
                fiber.stack.push(value);
                continue;
            };
            frame.ip += 1;

            match instruction {
                Instruction::Nop => {}
                Instruction::Push(idx) => {
                    let value = {
                        let frame = top_frame(fiber)?;
                        frame
                            .chunk
                            .consts
                            .get(idx)
                            .map(|c| c.to_value())
                            .ok_or_else(|| {
                                ScriptError::value_error(format!(
                                    "constant index {} out of range",
                                    idx
                                ))
                            })?
                    };
                    fiber.stack.push(value);
                }
                Instruction::Dup => {
                    let top = pop(&mut fiber.stack)?;
                    fiber.stack.push(top.clone());
                    fiber.stack.push(top);
                }
                Instruction::Swap => {
                    let a = pop(&mut fiber.stack)?;
                    let b = pop(&mut fiber.stack)?;
                    fiber.stack.push(a);
                    fiber.stack.push(b);
                }
                Instruction::Pop => {
                    pop(&mut fiber.stack)?;
                }
                Instruction::UnaryOp(op) => {
                    let operand = pop(&mut fiber.stack)?;
                    match operand.unary_op(op) {
                        Ok(value) => fiber.stack.push(value),
                        Err(decline @ ScriptError::UndefinedOperator { .. }) => {
                            // Operator magic receives the receiver as its
                            // first argument.
                            let magic = match unary_magic_name(op) {
                                Some(name) => {
                                    call_magic_if_present(&operand, name, vec![operand.clone()])?
                                }
                                None => None,
                            };
                            match magic {
                                Some(call) => {
                                    if self.defer(id, fiber, call.callee, call.args)? {
                                        return Ok(FiberRun::Suspended);
                                    }
                                    if self.control.is_cancelled(id) {
                                        return Ok(FiberRun::Yielded);
                                    }
                                }
                                None => return Err(decline),
                            }
                        }
                        Err(error) => return Err(error),
                    }
                }
                Instruction::BinaryOp(op) => {
                    let rhs = pop(&mut fiber.stack)?;
                    let lhs = pop(&mut fiber.stack)?;
                    match lhs.binary_op(op, &rhs) {
                        Ok(value) => fiber.stack.push(value),
                        Err(decline @ ScriptError::UndefinedOperator { .. }) => {
                            let magic = match binary_magic_name(op) {
                                Some(name) => {
                                    call_magic_if_present(&lhs, name, vec![lhs.clone(), rhs])?
                                }
                                None => None,
                            };
                            match magic {
                                Some(call) => {
                                    if self.defer(id, fiber, call.callee, call.args)? {
                                        return Ok(FiberRun::Suspended);
                                    }
                                    if self.control.is_cancelled(id) {
                                        return Ok(FiberRun::Yielded);
                                    }
                                }
                                None => return Err(decline),
                            }
                        }
                        Err(error) => return Err(error),
                    }
                }
                Instruction::LoadLocal(slot) => {
                    let index = top_frame(fiber)?.bp + slot;
                    let value = fiber.stack.get(index).cloned().ok_or_else(|| {
                        ScriptError::value_error(format!("local slot {} out of range", slot))
                    })?;
                    fiber.stack.push(value);
                }
                Instruction::StoreLocal(slot) => {
                    let index = top_frame(fiber)?.bp + slot;
                    let value = pop(&mut fiber.stack)?;
                    match fiber.stack.get_mut(index) {
                        Some(cell) => *cell = value,
                        None => {
                            return Err(ScriptError::value_error(format!(
                                "local slot {} out of range",
                                slot
                            )));
                        }
                    }
                }
                Instruction::LoadGlobal(idx) => {
                    let name = const_name(fiber, idx)?;
                    let value = self
                        .globals
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| ScriptError::name(name))?;
                    fiber.stack.push(value);
                }
                Instruction::StoreGlobal(idx) => {
                    let name = const_name(fiber, idx)?;
                    let value = pop(&mut fiber.stack)?;
                    self.globals.insert(name, value);
                }
                Instruction::Jump(offset) => {
                    jump(top_frame(fiber)?, offset)?;
                }
                Instruction::JumpIfTrue(offset) => {
                    let cond = pop(&mut fiber.stack)?;
                    if cond.is_truthy() {
                        jump(top_frame(fiber)?, offset)?;
                    }
                }
                Instruction::JumpIfFalse(offset) => {
                    let cond = pop(&mut fiber.stack)?;
                    if !cond.is_truthy() {
                        jump(top_frame(fiber)?, offset)?;
                    }
                }
                Instruction::Call(argc) => {
                    let split = fiber
                        .stack
                        .len()
                        .checked_sub(argc)
                        .ok_or_else(|| ScriptError::value_error("stack underflow in call"))?;
                    let args: Vec<Value> = fiber.stack.split_off(split);
                    let callee = pop(&mut fiber.stack)?;
                    self.call_in_fiber(fiber, callee, args)?;
                    // A native may have cancelled this very fiber; stop
                    // before the next instruction and let the scheduler
                    // reap it.
                    if self.control.is_cancelled(id) {
                        return Ok(FiberRun::Yielded);
                    }
                }
                Instruction::Return => {
                    let value = fiber.stack.pop().unwrap_or(Value::Int(0));
                    let frame = fiber
                        .frames
                        .pop()
                        .ok_or_else(|| ScriptError::value_error("return without a frame"))?;
                    fiber.stack.truncate(frame.bp);
                    if fiber.frames.is_empty() {
                        return Ok(FiberRun::Completed(value));
                    }
                    fiber.stack.push(value);
                }
                Instruction::GetItem => {
                    let index = pop(&mut fiber.stack)?;
                    let target = pop(&mut fiber.stack)?;
                    let object = target.as_object().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "{} is not subscriptable",
                            target.type_name()
                        ))
                    })?;
                    let value = object.item(&index)?;
                    fiber.stack.push(value);
                }
                Instruction::SetItem => {
                    let value = pop(&mut fiber.stack)?;
                    let index = pop(&mut fiber.stack)?;
                    let target = pop(&mut fiber.stack)?;
                    let object = target.as_object().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "{} is not subscriptable",
                            target.type_name()
                        ))
                    })?;
                    object.set_item(&index, value.clone())?;
                    fiber.stack.push(value);
                }
                Instruction::Yield => return Ok(FiberRun::Yielded),
            }
        }
    }

    /// Call dispatch inside a fiber: a native runs synchronously on the
    /// current fiber, a script function pushes a new frame.
    fn call_in_fiber(
        &mut self,
        fiber: &mut Fiber,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<(), ScriptError> {
        if let Value::Object(object) = &callee {
            if object.as_native().is_some() {
                let object = Rc::clone(object);
                let result = match object.as_native() {
                    Some(native) => native.call(self, args)?,
                    None => unreachable!("checked above"),
                };
                fiber.stack.push(result);
                return Ok(());
            }
            if let Some(func) = object.as_script_fn() {
                if args.len() != func.nparams {
                    return Err(ScriptError::type_error(format!(
                        "{} expects {} arguments, got {}",
                        func.name,
                        func.nparams,
                        args.len()
                    )));
                }
                let chunk = Rc::clone(&func.chunk);
                let bp = fiber.stack.len();
                fiber.stack.extend(args);
                fiber.frames.push(CallFrame { chunk, ip: 0, bp });
                return Ok(());
            }
        }
        Err(ScriptError::type_error(format!(
            "{} is not callable",
            callee.desc()
        )))
    }

    /// Schedule a deferred magic-method call. Returns true when the current
    /// fiber must suspend awaiting the child; a native callee completes at
    /// spawn time and its result is pushed immediately.
    fn defer(
        &mut self,
        id: FiberId,
        fiber: &mut Fiber,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<bool, ScriptError> {
        let child = self.spawn_call(callee, args)?;
        if self.fibers[child].is_dead() {
            match self.fibers[child].result.clone() {
                Some(Ok(value)) => {
                    fiber.stack.push(value);
                    Ok(false)
                }
                Some(Err(error)) => Err(error),
                None => Err(ScriptError::value_error("deferred call produced no result")),
            }
        } else {
            self.fibers[child].waiter = Some(id);
            debug!(fiber = id, child, "fiber awaiting deferred call");
            Ok(true)
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ScriptError> {
    stack
        .pop()
        .ok_or_else(|| ScriptError::value_error("stack underflow"))
}

fn top_frame(fiber: &mut Fiber) -> Result<&mut CallFrame, ScriptError> {
    fiber
        .frames
        .last_mut()
        .ok_or_else(|| ScriptError::value_error("no active frame"))
}

fn const_name(fiber: &Fiber, idx: usize) -> Result<String, ScriptError> {
    let frame = fiber
        .frames
        .last()
        .ok_or_else(|| ScriptError::value_error("no active frame"))?;
    match frame.chunk.consts.get(idx) {
        Some(crate::vm::Constant::Str(name)) => Ok(name.clone()),
        Some(other) => Err(ScriptError::value_error(format!(
            "constant {:?} is not a name",
            other
        ))),
        None => Err(ScriptError::value_error(format!(
            "constant index {} out of range",
            idx
        ))),
    }
}

fn jump(frame: &mut CallFrame, offset: i32) -> Result<(), ScriptError> {
    let target = frame.ip as i64 + offset as i64;
    if target < 0 || target as usize > frame.chunk.code.len() {
        return Err(ScriptError::value_error(format!(
            "jump target {} out of range",
            target
        )));
    }
    frame.ip = target as usize;
    Ok(())
}

//=============================================
// End of file
//=============================================
