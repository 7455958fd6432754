//=============================================
// emberscript/value/mod.rs
//=============================================
// Author: Emberlight Contributors
// License: MIT
// Goal: Polymorphic runtime value protocol
// Objective: Define the Value handle, the Object trait for host and script
//            objects, and binary/unary operator dispatch for every kind
//=============================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::errors::ScriptError;
use crate::op::Op;
use crate::vm::runtime::Vm;
use crate::vm::Chunk;

//=============================================
//            Section 1: Object Trait
//=============================================

/// Interface every object-kind runtime datum implements. Integers and
/// strings dispatch branch-free inside `Value`; everything else goes through
/// this trait.
pub trait Object {
    fn type_name(&self) -> &'static str;

    fn str_(&self) -> String {
        self.desc()
    }

    fn desc(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Member lookup by name. `None` means the member does not exist, which
    /// is not an error at this level.
    fn member(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_member(&self, name: &str, _value: Value) -> Result<(), ScriptError> {
        Err(ScriptError::type_error(format!(
            "{} has no assignable member '{}'",
            self.type_name(),
            name
        )))
    }

    fn item(&self, _index: &Value) -> Result<Value, ScriptError> {
        Err(ScriptError::type_error(format!(
            "{} is not subscriptable",
            self.type_name()
        )))
    }

    fn set_item(&self, _index: &Value, _value: Value) -> Result<(), ScriptError> {
        Err(ScriptError::type_error(format!(
            "{} is not subscriptable",
            self.type_name()
        )))
    }

    /// Native operator hook. The default declines, which lets the VM fall
    /// back to script-level magic methods.
    fn binary_op(&self, op: Op, rhs: &Value) -> Result<Value, ScriptError> {
        Err(ScriptError::undefined_operator(
            op,
            &[self.desc(), rhs.desc()],
        ))
    }

    fn unary_op(&self, op: Op) -> Result<Value, ScriptError> {
        Err(ScriptError::undefined_operator(op, &[self.desc()]))
    }

    fn as_native(&self) -> Option<&NativeFunction> {
        None
    }

    fn as_script_fn(&self) -> Option<&ScriptFunction> {
        None
    }
}

//=============================================
//            Section 2: Value Handle
//=============================================

/// A reference-counted handle to a runtime datum. Cloning shares the datum;
/// the core's contract forbids reference cycles through the value graph.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Str(Rc<str>),
    Object(Rc<dyn Object>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::from(s.into()))
    }

    pub fn object(obj: impl Object + 'static) -> Value {
        Value::Object(Rc::new(obj))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Plain textual rendering, as `print` shows it.
    pub fn str_(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Object(obj) => obj.str_(),
        }
    }

    /// Diagnostic rendering, e.g. `<int: 3>` or `<str: abc>`.
    pub fn desc(&self) -> String {
        match self {
            Value::Int(n) => format!("<int: {}>", n),
            Value::Str(s) => format!("<str: {}>", s),
            Value::Object(obj) => obj.desc(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<dyn Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    //=============================================
    //            Section 3: Operator Dispatch
    //=============================================

    /// Binary dispatch: every binary operation in the runtime resolves here
    /// as `lhs.binary_op(op, rhs)`.
    pub fn binary_op(&self, op: Op, rhs: &Value) -> Result<Value, ScriptError> {
        if op == Op::Comma {
            return Ok(rhs.clone());
        }

        match (self, rhs) {
            (Value::Int(l), Value::Int(r)) => int_binary_op(*l, op, *r),
            (Value::Str(l), Value::Str(r)) => match op {
                Op::Add => Ok(Value::string(format!("{}{}", l, r))),
                Op::Equal => Ok(Value::Int((l == r) as i64)),
                Op::NotEqual => Ok(Value::Int((l != r) as i64)),
                _ => Err(ScriptError::undefined_operator(
                    op,
                    &[self.desc(), rhs.desc()],
                )),
            },
            (Value::Str(l), Value::Int(r)) if op == Op::Mul => {
                if *r < 0 {
                    return Err(ScriptError::value_error(format!(
                        "negative repeat count: {}",
                        r
                    )));
                }
                Ok(Value::string(l.repeat(*r as usize)))
            }
            (Value::Object(obj), _) => obj.binary_op(op, rhs),
            _ => Err(ScriptError::undefined_operator(
                op,
                &[self.desc(), rhs.desc()],
            )),
        }
    }

    /// Unary dispatch, `operand.unary_op(op)`.
    pub fn unary_op(&self, op: Op) -> Result<Value, ScriptError> {
        match self {
            Value::Int(n) => match op {
                Op::Add => Ok(Value::Int(*n)),
                Op::Sub => Ok(Value::Int(n.wrapping_neg())),
                Op::Tilde => Ok(Value::Int(!n)),
                _ => Err(ScriptError::undefined_operator(op, &[self.desc()])),
            },
            Value::Object(obj) => obj.unary_op(op),
            _ => Err(ScriptError::undefined_operator(op, &[self.desc()])),
        }
    }
}

/// Signed 64-bit semantics with two's-complement wraparound. Comparisons and
/// logicals yield Int 0/1.
fn int_binary_op(l: i64, op: Op, r: i64) -> Result<Value, ScriptError> {
    let result = match op {
        Op::Add => l.wrapping_add(r),
        Op::Sub => l.wrapping_sub(r),
        Op::Mul => l.wrapping_mul(r),
        Op::Div => {
            if r == 0 {
                return Err(ScriptError::value_error("division by zero"));
            }
            l.wrapping_div(r)
        }
        Op::Mod => {
            if r == 0 {
                return Err(ScriptError::value_error("modulo by zero"));
            }
            l.wrapping_rem(r)
        }
        Op::BitAnd => l & r,
        Op::BitOr => l | r,
        Op::BitXor => l ^ r,
        Op::ShiftLeft => {
            if r < 0 {
                return Err(ScriptError::value_error(format!(
                    "negative shift count: {}",
                    r
                )));
            }
            l.wrapping_shl((r % 64) as u32)
        }
        Op::ShiftRight => {
            if r < 0 {
                return Err(ScriptError::value_error(format!(
                    "negative shift count: {}",
                    r
                )));
            }
            l.wrapping_shr((r % 64) as u32)
        }
        Op::Equal => (l == r) as i64,
        Op::NotEqual => (l != r) as i64,
        Op::LessEqual => (l <= r) as i64,
        Op::Less => (l < r) as i64,
        Op::GreaterEqual => (l >= r) as i64,
        Op::Greater => (l > r) as i64,
        Op::LogicalAnd => (l != 0 && r != 0) as i64,
        Op::LogicalOr => (l != 0 || r != 0) as i64,
        _ => {
            return Err(ScriptError::undefined_operator(
                op,
                &[format!("<int: {}>", l), format!("<int: {}>", r)],
            ))
        }
    };
    Ok(Value::Int(result))
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.desc())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Str(l), Value::Str(r)) => l == r,
            (Value::Object(l), Value::Object(r)) => Rc::ptr_eq(l, r),
            _ => false,
        }
    }
}

//=============================================
//            Section 4: Callable Objects
//=============================================

pub type NativeFn = Box<dyn Fn(&mut Vm, Vec<Value>) -> Result<Value, ScriptError>>;

/// A host callable exposed to scripts. Invocation is synchronous and may not
/// suspend a fiber.
pub struct NativeFunction {
    pub name: String,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Vm, Vec<Value>) -> Result<Value, ScriptError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Value, ScriptError> {
        (self.func)(vm, args)
    }
}

impl Object for NativeFunction {
    fn type_name(&self) -> &'static str {
        "native function"
    }

    fn desc(&self) -> String {
        format!("<native fn: {}>", self.name)
    }

    fn as_native(&self) -> Option<&NativeFunction> {
        Some(self)
    }
}

/// A script-defined function: compiled bytecode plus arity. Invoking one
/// pushes a call frame inside a fiber.
pub struct ScriptFunction {
    pub name: String,
    pub chunk: Rc<Chunk>,
    pub nparams: usize,
}

impl ScriptFunction {
    pub fn new(name: impl Into<String>, chunk: Rc<Chunk>, nparams: usize) -> Self {
        Self {
            name: name.into(),
            chunk,
            nparams,
        }
    }
}

impl Object for ScriptFunction {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn desc(&self) -> String {
        format!("<fn: {}>", self.name)
    }

    fn as_script_fn(&self) -> Option<&ScriptFunction> {
        Some(self)
    }
}

//=============================================
//            Section 5: Container Objects
//=============================================

/// A fixed-length bank of cells addressed by integer index, backing the
/// `name[expr]` memory-reference syntax.
pub struct ArrayObject {
    cells: RefCell<Vec<Value>>,
}

impl ArrayObject {
    pub fn with_len(len: usize) -> Self {
        Self {
            cells: RefCell::new(vec![Value::Int(0); len]),
        }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            cells: RefCell::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }

    fn cell_index(&self, index: &Value) -> Result<usize, ScriptError> {
        let raw = index.as_int().ok_or_else(|| {
            ScriptError::type_error(format!("array index must be an int, got {}", index.desc()))
        })?;
        let len = self.len();
        if raw < 0 || raw as usize >= len {
            return Err(ScriptError::value_error(format!(
                "index {} out of range for length {}",
                raw, len
            )));
        }
        Ok(raw as usize)
    }
}

impl Object for ArrayObject {
    fn type_name(&self) -> &'static str {
        "array"
    }

    fn str_(&self) -> String {
        let cells = self.cells.borrow();
        let rendered: Vec<String> = cells.iter().map(Value::str_).collect();
        format!("[{}]", rendered.join(", "))
    }

    fn desc(&self) -> String {
        format!("<array: {}>", self.len())
    }

    fn item(&self, index: &Value) -> Result<Value, ScriptError> {
        let i = self.cell_index(index)?;
        Ok(self.cells.borrow()[i].clone())
    }

    fn set_item(&self, index: &Value, value: Value) -> Result<(), ScriptError> {
        let i = self.cell_index(index)?;
        self.cells.borrow_mut()[i] = value;
        Ok(())
    }
}

/// A mutable member table, the basic script/host object kind. Magic methods
/// live in the table under their `__name__` keys.
#[derive(Default)]
pub struct Table {
    members: RefCell<HashMap<String, Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(self, name: impl Into<String>, value: Value) -> Self {
        self.members.borrow_mut().insert(name.into(), value);
        self
    }
}

impl Object for Table {
    fn type_name(&self) -> &'static str {
        "object"
    }

    fn desc(&self) -> String {
        format!("<object: {} members>", self.members.borrow().len())
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.members.borrow().get(name).cloned()
    }

    fn set_member(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        self.members.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

//=============================================
// End of file
//=============================================
