use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;
use crate::vm::compiler::compile_source;
use crate::vm::fiber::FiberState;
use crate::vm::runtime::Vm;
use crate::vm::{Chunk, Constant, Instruction};

/// A chunk that calls `print` with a constant string, optionally yielding
/// between calls.
fn print_chunk(lines: &[&str], yield_between: bool) -> Chunk {
    let mut chunk = Chunk::new();
    let print = chunk.add_const(Constant::Str("print".into()));
    for (i, line) in lines.iter().enumerate() {
        let text = chunk.add_const(Constant::Str((*line).into()));
        chunk.emit(Instruction::LoadGlobal(print));
        chunk.emit(Instruction::Push(text));
        chunk.emit(Instruction::Call(1));
        chunk.emit(Instruction::Pop);
        if yield_between && i + 1 < lines.len() {
            chunk.emit(Instruction::Yield);
        }
    }
    chunk.emit(Instruction::Return);
    chunk
}

fn captured_lines(sink: &Rc<RefCell<Vec<u8>>>) -> Vec<String> {
    String::from_utf8(sink.borrow().clone())
        .expect("utf8 output")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn fibers_alternate_round_robin_at_yield_points() {
    let sink: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new().with_output(sink.clone());
    vm.add_fiber(Rc::new(print_chunk(&["a1", "a2"], true)), Vec::new());
    vm.add_fiber(Rc::new(print_chunk(&["b1", "b2"], true)), Vec::new());
    vm.run().expect("run");
    assert_eq!(captured_lines(&sink), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn native_calls_never_interleave_mid_call() {
    let trace: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new();
    {
        let trace = trace.clone();
        vm.register_native("probe", move |_vm, args| {
            let tag = args.first().map(Value::str_).unwrap_or_default();
            trace.borrow_mut().push(format!("enter {}", tag));
            trace.borrow_mut().push(format!("exit {}", tag));
            Ok(Value::Int(0))
        });
    }

    let probe_chunk = |tag: &str| {
        let mut chunk = Chunk::new();
        let probe = chunk.add_const(Constant::Str("probe".into()));
        let text = chunk.add_const(Constant::Str(tag.into()));
        for _ in 0..2 {
            chunk.emit(Instruction::LoadGlobal(probe));
            chunk.emit(Instruction::Push(text));
            chunk.emit(Instruction::Call(1));
            chunk.emit(Instruction::Pop);
            chunk.emit(Instruction::Yield);
        }
        chunk.emit(Instruction::Return);
        chunk
    };
    vm.add_fiber(Rc::new(probe_chunk("a")), Vec::new());
    vm.add_fiber(Rc::new(probe_chunk("b")), Vec::new());
    vm.run().expect("run");

    let trace = trace.borrow();
    for pair in trace.chunks(2) {
        let tag = pair[0].strip_prefix("enter ").expect("enter first");
        assert_eq!(pair[1], format!("exit {}", tag), "call was interleaved");
    }
}

#[test]
fn a_failing_fiber_leaves_other_fibers_and_globals_intact() {
    let mut vm = Vm::new();
    vm.set_global("x", Value::Int(5));
    let bad = vm.add_fiber(
        Rc::new(compile_source("1 / 0").expect("compile")),
        Vec::new(),
    );
    let good = vm.add_fiber(
        Rc::new(compile_source("x * 2").expect("compile")),
        Vec::new(),
    );
    let _ = vm.run();

    assert!(matches!(vm.fiber_result(bad), Some(Err(_))));
    assert_eq!(vm.fiber_result(good), Some(Ok(Value::Int(10))));
    assert_eq!(vm.get_global("x"), Some(Value::Int(5)));
}

#[test]
fn cancelled_fiber_never_resumes() {
    let counter: Rc<RefCell<i64>> = Rc::new(RefCell::new(0));
    let mut vm = Vm::new();
    {
        let counter = counter.clone();
        vm.register_native("bump", move |_vm, _args| {
            *counter.borrow_mut() += 1;
            Ok(Value::Int(0))
        });
    }

    // Victim: bump, yield, bump.
    let mut victim_chunk = Chunk::new();
    let bump = victim_chunk.add_const(Constant::Str("bump".into()));
    victim_chunk.emit(Instruction::LoadGlobal(bump));
    victim_chunk.emit(Instruction::Call(0));
    victim_chunk.emit(Instruction::Pop);
    victim_chunk.emit(Instruction::Yield);
    victim_chunk.emit(Instruction::LoadGlobal(bump));
    victim_chunk.emit(Instruction::Call(0));
    victim_chunk.emit(Instruction::Pop);
    victim_chunk.emit(Instruction::Return);
    let victim = vm.add_fiber(Rc::new(victim_chunk), Vec::new());

    {
        // Killer runs while the victim is parked at its yield.
        vm.register_native("kill", move |vm, _args| {
            vm.cancel(victim);
            Ok(Value::Int(0))
        });
    }
    let mut killer_chunk = Chunk::new();
    let kill = killer_chunk.add_const(Constant::Str("kill".into()));
    killer_chunk.emit(Instruction::LoadGlobal(kill));
    killer_chunk.emit(Instruction::Call(0));
    killer_chunk.emit(Instruction::Return);
    vm.add_fiber(Rc::new(killer_chunk), Vec::new());

    let _ = vm.run();
    assert_eq!(*counter.borrow(), 1, "victim ran past its cancellation");
    assert_eq!(vm.fiber_state(victim), Some(FiberState::Dead));
}

#[test]
fn a_fiber_cancelling_itself_stops_at_the_native_boundary() {
    let counter: Rc<RefCell<i64>> = Rc::new(RefCell::new(0));
    let mut vm = Vm::new();
    {
        let counter = counter.clone();
        vm.register_native("bump", move |_vm, _args| {
            *counter.borrow_mut() += 1;
            Ok(Value::Int(0))
        });
    }
    vm.register_native("kill_self", |vm, _args| {
        vm.cancel(0);
        Ok(Value::Int(0))
    });

    // Fiber 0: kill_self(), then bump(). The bump must never run.
    let mut chunk = Chunk::new();
    let kill_self = chunk.add_const(Constant::Str("kill_self".into()));
    let bump = chunk.add_const(Constant::Str("bump".into()));
    chunk.emit(Instruction::LoadGlobal(kill_self));
    chunk.emit(Instruction::Call(0));
    chunk.emit(Instruction::Pop);
    chunk.emit(Instruction::LoadGlobal(bump));
    chunk.emit(Instruction::Call(0));
    chunk.emit(Instruction::Pop);
    chunk.emit(Instruction::Return);
    let fiber = vm.add_fiber(Rc::new(chunk), Vec::new());

    let _ = vm.run();
    assert_eq!(*counter.borrow(), 0, "instruction ran after cancellation");
    assert_eq!(vm.fiber_state(fiber), Some(FiberState::Dead));
    assert!(matches!(vm.fiber_result(fiber), Some(Err(_))));
}

#[test]
fn host_cancellation_flag_is_observed_before_resume() {
    let counter: Rc<RefCell<i64>> = Rc::new(RefCell::new(0));
    let mut vm = Vm::new();
    {
        let counter = counter.clone();
        vm.register_native("bump", move |_vm, _args| {
            *counter.borrow_mut() += 1;
            Ok(Value::Int(0))
        });
    }
    let fiber = vm.add_fiber(
        Rc::new(compile_source("bump").expect("compile")),
        Vec::new(),
    );
    vm.control().cancel(fiber);
    let _ = vm.run();
    assert_eq!(*counter.borrow(), 0);
    assert_eq!(vm.fiber_state(fiber), Some(FiberState::Dead));
}

#[test]
fn run_reports_the_most_recent_completion() {
    let mut vm = Vm::new();
    vm.add_fiber(Rc::new(compile_source("1").expect("compile")), Vec::new());
    vm.add_fiber(Rc::new(compile_source("2").expect("compile")), Vec::new());
    assert_eq!(vm.run().expect("run"), Value::Int(2));
}
