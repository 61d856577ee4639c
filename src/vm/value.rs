use std::fmt;

use super::object::{LoxString, ObjRef};

/// A dynamically typed Lox value.
///
/// - Bool: `true` / `false`
/// - Nil: the absent value
/// - Number: 64-bit IEEE 754 double
/// - Obj: shared handle to a heap object (string, function, native)
#[derive(Clone, Default)]
pub enum Value {
    Bool(bool),
    #[default]
    Nil,
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&ObjRef> {
        match self {
            Value::Obj(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&LoxString> {
        self.as_obj().and_then(ObjRef::as_string)
    }

    /// `nil` and `false` are falsey; every other value is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Get the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::Obj(r) => r.type_name(),
        }
    }
}

impl PartialEq for Value {
    /// Variants must match. Objects compare by identity, which for interned
    /// strings is the same as comparing their text.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Nil => write!(f, "Nil"),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Obj(r) => write!(f, "Obj({:?})", r),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Obj(r) => write!(f, "{}", r),
        }
    }
}
