//! Heap object model.
//!
//! Every object lives behind an [`ObjRef`], a reference-counted handle that
//! compares by identity. Objects are also threaded onto the owning heap's
//! allocation list through their `next` link, which is only ever cut when the
//! heap is torn down.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{Chunk, Value};

/// A host function callable from scripts.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Value>;

/// Shared handle to a heap object.
#[derive(Clone)]
pub struct ObjRef(Rc<HeapObject>);

/// A heap object plus its allocation-list link.
pub struct HeapObject {
    object: Object,
    next: RefCell<Option<ObjRef>>,
}

/// The heap object variants.
pub enum Object {
    String(LoxString),
    Function(Rc<Function>),
    Native(NativeFunction),
}

/// An immutable string with its FNV-1a hash computed up front.
pub struct LoxString {
    chars: Box<str>,
    hash: u32,
}

/// A compiled function. The top-level script is a function without a name.
#[derive(Debug, Default)]
pub struct Function {
    pub arity: usize,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

/// A native function registered by the host.
pub struct NativeFunction {
    name: Box<str>,
    arity: usize,
    function: NativeFn,
}

/// 32-bit FNV-1a over the UTF-8 bytes of `text`.
pub fn hash_string(text: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

impl ObjRef {
    pub(super) fn new(object: Object, next: Option<ObjRef>) -> Self {
        Self(Rc::new(HeapObject {
            object,
            next: RefCell::new(next),
        }))
    }

    pub fn object(&self) -> &Object {
        &self.0.object
    }

    /// The object allocated just before this one on the same heap.
    pub(super) fn next_allocated(&self) -> Option<ObjRef> {
        self.0.next.borrow().clone()
    }

    /// Detach this object from the allocation list, returning its successor.
    pub(super) fn take_next(&self) -> Option<ObjRef> {
        self.0.next.borrow_mut().take()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.object(), Object::String(_))
    }

    pub fn as_string(&self) -> Option<&LoxString> {
        match self.object() {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self.object() {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn type_name(&self) -> &'static str {
        match self.object() {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Native(_) => "native",
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjRef {}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object() {
            Object::String(s) => write!(f, "String({:?})", s.as_str()),
            Object::Function(func) => write!(f, "Function({})", func.display_name()),
            Object::Native(n) => write!(f, "Native({})", n.name()),
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object() {
            Object::String(s) => f.write_str(s.as_str()),
            Object::Function(func) => match func.name() {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<script>"),
            },
            Object::Native(_) => write!(f, "<native fn>"),
        }
    }
}

impl LoxString {
    pub(super) fn new(chars: Box<str>, hash: u32) -> Self {
        Self { chars, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().and_then(ObjRef::as_string).map(LoxString::as_str)
    }

    /// Name used in stack traces and listings: `name` or `script`.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("script")
    }
}

impl NativeFunction {
    pub fn new(name: &str, arity: usize, function: NativeFn) -> Self {
        Self {
            name: name.into(),
            arity,
            function,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.function)(args)
    }
}
