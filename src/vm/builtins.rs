use std::time::{SystemTime, UNIX_EPOCH};

use crate::interpreter::errors::ScriptError;
use crate::value::Value;
use crate::vm::runtime::Vm;

/// Install the default native functions into a fresh VM.
pub fn install(vm: &mut Vm) {
    vm.register_native("print", print);
    vm.register_native("time", time);
}

/// `print(args...)`: render each argument and write them comma separated to
/// the VM's output sink. Returns the number of arguments.
fn print(vm: &mut Vm, args: Vec<Value>) -> Result<Value, ScriptError> {
    let rendered: Vec<String> = args.iter().map(Value::str_).collect();
    vm.write_line(&rendered.join(","));
    Ok(Value::Int(args.len() as i64))
}

/// `time()`: seconds since the Unix epoch.
fn time(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, ScriptError> {
    if !args.is_empty() {
        return Err(ScriptError::type_error(format!(
            "time expects 0 arguments, got {}",
            args.len()
        )));
    }
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Int(seconds))
}
