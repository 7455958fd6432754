use crate::interpreter::errors::ScriptError;
use crate::op::Op;
use crate::value::Value;

/// A call that has been resolved but not invoked. The holder must drive it
/// to completion, normally by spawning it as a fiber and awaiting the
/// result; magic-method resolution never calls back into script execution
/// directly.
#[derive(Debug)]
pub struct DeferredCall {
    pub callee: Value,
    pub args: Vec<Value>,
}

/// Look up a magic method on `receiver`. Returns `Ok(None)` when the
/// receiver is not an object kind or has no member under `name` (absence is
/// not an error). A member that exists but is not callable is a `TypeError`.
pub fn call_magic_if_present(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Option<DeferredCall>, ScriptError> {
    let object = match receiver.as_object() {
        Some(object) => object,
        None => return Ok(None),
    };

    let member = match object.member(name) {
        Some(member) => member,
        None => return Ok(None),
    };

    let callable = matches!(
        &member,
        Value::Object(m) if m.as_native().is_some() || m.as_script_fn().is_some()
    );
    if !callable {
        return Err(ScriptError::type_error(format!(
            "'{}' on {} is not callable",
            name,
            receiver.desc()
        )));
    }

    Ok(Some(DeferredCall {
        callee: member,
        args,
    }))
}

/// The magic-method name consulted when binary dispatch on `op` declines.
/// The VM passes the receiver as the first argument of the deferred call.
pub fn binary_magic_name(op: Op) -> Option<&'static str> {
    Some(match op {
        Op::Add => "__add__",
        Op::Sub => "__sub__",
        Op::Mul => "__mul__",
        Op::Div => "__div__",
        Op::Mod => "__mod__",
        Op::BitAnd => "__and__",
        Op::BitOr => "__or__",
        Op::BitXor => "__xor__",
        Op::ShiftLeft => "__shl__",
        Op::ShiftRight => "__shr__",
        Op::Equal => "__eq__",
        Op::NotEqual => "__ne__",
        Op::Less => "__lt__",
        Op::LessEqual => "__le__",
        Op::Greater => "__gt__",
        Op::GreaterEqual => "__ge__",
        _ => return None,
    })
}

/// The magic-method name consulted when unary dispatch on `op` declines.
pub fn unary_magic_name(op: Op) -> Option<&'static str> {
    Some(match op {
        Op::Sub => "__neg__",
        Op::Add => "__pos__",
        Op::Tilde => "__invert__",
        _ => return None,
    })
}
