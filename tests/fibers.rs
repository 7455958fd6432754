//==============================================
// File: tests/fibers.rs
// Author: Emberlight Contributors
// License: MIT
// Goal: Fiber VM surface coverage
// Objective: Exercise scheduling, builtins, and cancellation through the
//            public crate API
//==============================================

use std::cell::RefCell;
use std::rc::Rc;

use emberscript::vm::compiler::compile_source;
use emberscript::{FiberState, ScriptError, Value, Vm};

#[test]
fn eval_source_runs_a_program_to_completion() {
    let mut vm = Vm::new();
    let result = vm.eval_source("a = 6; b = 7; a * b").expect("run");
    assert_eq!(result, Value::Int(42));
}

#[test]
fn print_writes_to_the_injected_sink() {
    use emberscript::vm::{Chunk, Constant, Instruction};

    let sink: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new().with_output(sink.clone());

    let mut chunk = Chunk::new();
    let print = chunk.add_const(Constant::Str("print".into()));
    let greeting = chunk.add_const(Constant::Str("hello".into()));
    let seven = chunk.add_const(Constant::Int(7));
    chunk.emit(Instruction::LoadGlobal(print));
    chunk.emit(Instruction::Push(greeting));
    chunk.emit(Instruction::Push(seven));
    chunk.emit(Instruction::Call(2));
    chunk.emit(Instruction::Return);
    vm.evaluate(chunk).expect("run");

    let captured = String::from_utf8(sink.borrow().clone()).expect("utf8");
    assert_eq!(captured, "hello,7\n");
}

#[test]
fn time_builtin_returns_seconds_since_the_epoch() {
    let mut vm = Vm::new();
    let time = vm.get_global("time").expect("time builtin");
    let fiber = vm.spawn_call(time, Vec::new()).expect("spawn");
    match vm.fiber_result(fiber) {
        Some(Ok(Value::Int(seconds))) => assert!(seconds > 1_600_000_000),
        other => panic!("unexpected time result: {:?}", other),
    }
}

#[test]
fn native_registration_is_callable_from_fibers() {
    let mut vm = Vm::new();
    vm.register_native("double", |_vm, args| {
        let n = args
            .first()
            .and_then(Value::as_int)
            .ok_or_else(|| ScriptError::type_error("double expects an int"))?;
        Ok(Value::Int(n * 2))
    });
    let double = vm.get_global("double").expect("registered");
    let fiber = vm
        .spawn_call(double, vec![Value::Int(21)])
        .expect("spawn");
    assert_eq!(vm.fiber_result(fiber), Some(Ok(Value::Int(42))));
}

#[test]
fn native_failure_propagates_unchanged() {
    let mut vm = Vm::new();
    vm.register_native("fail", |_vm, _args| {
        Err(ScriptError::value_error("native said no"))
    });
    let fail = vm.get_global("fail").expect("registered");
    let fiber = vm.spawn_call(fail, Vec::new()).expect("spawn");
    match vm.fiber_result(fiber) {
        Some(Err(error)) => assert_eq!(error.to_string(), "value error: native said no"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn control_handle_cancels_before_first_resume() {
    let mut vm = Vm::new();
    let fiber = vm.add_fiber(
        Rc::new(compile_source("1 + 1").expect("compile")),
        Vec::new(),
    );
    let control = vm.control();
    assert!(control.cancel(fiber));
    let _ = vm.run();
    assert_eq!(vm.fiber_state(fiber), Some(FiberState::Dead));
    assert!(matches!(vm.fiber_result(fiber), Some(Err(_))));
}

#[test]
fn globals_survive_across_programs() {
    let mut vm = Vm::new();
    vm.eval_source("counter = 1").expect("run");
    vm.eval_source("counter += 9").expect("run");
    assert_eq!(vm.get_global("counter"), Some(Value::Int(10)));
}

//==============================================
// End of file
//==============================================
