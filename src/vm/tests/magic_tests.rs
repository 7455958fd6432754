use std::rc::Rc;

use crate::parser;
use crate::value::{NativeFunction, ScriptFunction, Table, Value};
use crate::vm::compiler::Compiler;
use crate::vm::fiber::FiberState;
use crate::vm::magic::{binary_magic_name, call_magic_if_present, unary_magic_name};
use crate::vm::runtime::Vm;
use crate::vm::{Chunk, Constant, Instruction};
use crate::op::Op;

#[test]
fn magic_lookup_misses_return_none_without_raising() {
    assert!(call_magic_if_present(&Value::Int(3), "__add__", Vec::new())
        .expect("lookup")
        .is_none());
    assert!(
        call_magic_if_present(&Value::object(Table::new()), "__add__", Vec::new())
            .expect("lookup")
            .is_none()
    );
}

#[test]
fn non_callable_magic_member_is_a_type_error() {
    let table = Table::new().with_member("__add__", Value::Int(3));
    let error = call_magic_if_present(&Value::object(table), "__add__", Vec::new()).unwrap_err();
    assert_eq!(error.code_str(), "E103");
}

#[test]
fn resolution_defers_instead_of_invoking() {
    let called: Rc<std::cell::Cell<bool>> = Rc::new(std::cell::Cell::new(false));
    let flag = called.clone();
    let native = NativeFunction::new("__add__", move |_vm, _args| {
        flag.set(true);
        Ok(Value::Int(0))
    });
    let table = Table::new().with_member("__add__", Value::object(native));
    let deferred = call_magic_if_present(&Value::object(table), "__add__", vec![Value::Int(1)])
        .expect("lookup")
        .expect("deferred call");
    assert!(!called.get(), "resolution must not invoke the callee");
    assert_eq!(deferred.args, vec![Value::Int(1)]);
}

#[test]
fn operator_names_cover_the_dispatch_table() {
    assert_eq!(binary_magic_name(Op::Add), Some("__add__"));
    assert_eq!(binary_magic_name(Op::ShiftLeft), Some("__shl__"));
    assert_eq!(binary_magic_name(Op::Assign), None);
    assert_eq!(unary_magic_name(Op::Tilde), Some("__invert__"));
    assert_eq!(unary_magic_name(Op::Mul), None);
}

/// Chunk computing `t OP <rhs>` for a global `t`.
fn operator_chunk(op: Op, rhs: i64) -> Chunk {
    let mut chunk = Chunk::new();
    let t = chunk.add_const(Constant::Str("t".into()));
    let rhs = chunk.add_const(Constant::Int(rhs));
    chunk.emit(Instruction::LoadGlobal(t));
    chunk.emit(Instruction::Push(rhs));
    chunk.emit(Instruction::BinaryOp(op));
    chunk.emit(Instruction::Return);
    chunk
}

#[test]
fn native_magic_method_overrides_a_binary_operator() {
    let mut vm = Vm::new();
    let add = NativeFunction::new("__add__", |_vm, args| {
        // args[0] is the receiver, args[1] the rhs.
        let rhs = args[1].as_int().unwrap_or(0);
        Ok(Value::Int(rhs * 2))
    });
    let table = Table::new().with_member("__add__", Value::object(add));
    vm.set_global("t", Value::object(table));

    assert_eq!(vm.evaluate(operator_chunk(Op::Add, 21)).expect("run"), Value::Int(42));
}

#[test]
fn script_magic_method_runs_on_its_own_fiber() {
    let body = parser::parse_expression("rhs * 3").expect("parse");
    let chunk =
        Compiler::compile_function(vec!["self".into(), "rhs".into()], &body).expect("compile");
    let method = ScriptFunction::new("__mul__", Rc::new(chunk), 2);
    let table = Table::new().with_member("__mul__", Value::object(method));

    let mut vm = Vm::new();
    vm.set_global("t", Value::object(table));
    assert_eq!(vm.evaluate(operator_chunk(Op::Mul, 7)).expect("run"), Value::Int(21));
}

#[test]
fn magic_method_error_reaches_the_awaiting_fiber() {
    let body = parser::parse_expression("boom").expect("parse");
    let chunk =
        Compiler::compile_function(vec!["self".into(), "rhs".into()], &body).expect("compile");
    let method = ScriptFunction::new("__sub__", Rc::new(chunk), 2);
    let table = Table::new().with_member("__sub__", Value::object(method));

    let mut vm = Vm::new();
    vm.set_global("t", Value::object(table));
    let error = vm.evaluate(operator_chunk(Op::Sub, 1)).unwrap_err();
    assert_eq!(error.to_string(), "'boom' is not defined");
}

#[test]
fn unary_magic_method_overrides_negation() {
    let neg = NativeFunction::new("__neg__", |_vm, _args| Ok(Value::Int(-5)));
    let table = Table::new().with_member("__neg__", Value::object(neg));

    let mut vm = Vm::new();
    vm.set_global("t", Value::object(table));

    let mut chunk = Chunk::new();
    let t = chunk.add_const(Constant::Str("t".into()));
    chunk.emit(Instruction::LoadGlobal(t));
    chunk.emit(Instruction::UnaryOp(Op::Sub));
    chunk.emit(Instruction::Return);
    assert_eq!(vm.evaluate(chunk).expect("run"), Value::Int(-5));
}

#[test]
fn cancelling_a_fiber_awaiting_a_magic_call_abandons_the_child() {
    let body = parser::parse_expression("rhs * 3").expect("parse");
    let chunk =
        Compiler::compile_function(vec!["self".into(), "rhs".into()], &body).expect("compile");
    let method = ScriptFunction::new("__mul__", Rc::new(chunk), 2);
    let table = Table::new().with_member("__mul__", Value::object(method));

    let mut vm = Vm::new();
    vm.set_global("t", Value::object(table));
    let awaiting = vm.add_fiber(Rc::new(operator_chunk(Op::Mul, 7)), Vec::new());
    vm.register_native("kill", move |vm, _args| {
        vm.cancel(awaiting);
        Ok(Value::Int(0))
    });
    let mut killer = Chunk::new();
    let kill = killer.add_const(Constant::Str("kill".into()));
    killer.emit(Instruction::LoadGlobal(kill));
    killer.emit(Instruction::Call(0));
    killer.emit(Instruction::Return);
    vm.add_fiber(Rc::new(killer), Vec::new());

    // Order of execution: the awaiting fiber suspends on the deferred
    // __mul__ child, the killer cancels it, then the child completes with
    // nobody watching.
    let _ = vm.run();
    assert_eq!(vm.fiber_state(awaiting), Some(FiberState::Dead));
    assert!(matches!(vm.fiber_result(awaiting), Some(Err(_))));
    let child = 2;
    assert_eq!(vm.fiber_state(child), Some(FiberState::Dead));
    assert_eq!(vm.fiber_result(child), Some(Ok(Value::Int(21))));
}

#[test]
fn missing_magic_method_reports_the_original_operator_error() {
    let mut vm = Vm::new();
    vm.set_global("t", Value::object(Table::new()));
    let error = vm.evaluate(operator_chunk(Op::Add, 1)).unwrap_err();
    assert_eq!(error.code_str(), "E105");
}
