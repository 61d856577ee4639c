use std::marker::PhantomData;
use std::rc::Rc;

use super::object::{hash_string, Function, LoxString, NativeFunction, ObjRef, Object};
use super::{Table, Value};

// =============================================================================
// Heap
// =============================================================================
//
// Every allocation is pushed onto the front of an intrusive singly-linked
// list (newest first). Nothing is reclaimed while the heap is alive: the list
// keeps each object reachable until the heap itself is dropped, at which point
// it is unlinked iteratively so long lists cannot overflow the native stack.
//
// The heap also owns the string intern table. Every string object is created
// through `intern`/`take_string`, so two strings with the same text are always
// the same object.

/// Object allocator and string interner for one VM.
pub struct Heap {
    head: Option<ObjRef>,
    strings: Table,
    object_count: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            head: None,
            strings: Table::new(),
            object_count: 0,
        }
    }

    fn allocate(&mut self, object: Object) -> ObjRef {
        let r = ObjRef::new(object, self.head.take());
        self.head = Some(r.clone());
        self.object_count += 1;
        r
    }

    /// Return the canonical string object for `text`, copying it on first use.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = hash_string(text);
        if let Some(existing) = self.strings.find_string(text, hash) {
            return existing;
        }
        self.insert_string(text.into(), hash)
    }

    /// Like [`Heap::intern`], but takes ownership of an already built string.
    pub fn take_string(&mut self, text: String) -> ObjRef {
        let hash = hash_string(&text);
        if let Some(existing) = self.strings.find_string(&text, hash) {
            return existing;
        }
        self.insert_string(text.into_boxed_str(), hash)
    }

    fn insert_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        tracing::trace!(text = %chars, hash, "interned string");
        let r = self.allocate(Object::String(LoxString::new(chars, hash)));
        self.strings.set(r.clone(), Value::Nil);
        r
    }

    /// Find an already interned string without creating one.
    pub fn lookup(&self, text: &str) -> Option<ObjRef> {
        self.strings.find_string(text, hash_string(text))
    }

    pub fn alloc_function(&mut self, function: Function) -> ObjRef {
        self.allocate(Object::Function(Rc::new(function)))
    }

    pub fn alloc_native(&mut self, native: NativeFunction) -> ObjRef {
        self.allocate(Object::Native(native))
    }

    /// Number of objects allocated on this heap.
    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Number of distinct interned strings.
    pub fn string_count(&self) -> usize {
        self.strings.iter().count()
    }

    /// Walk the allocation list, newest object first.
    pub fn objects(&self) -> Objects<'_> {
        Objects {
            next: self.head.clone(),
            _heap: PhantomData,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.strings = Table::new();
        let mut next = self.head.take();
        while let Some(r) = next {
            // Objects still referenced elsewhere get unlinked too, so
            // nothing behind them is released recursively.
            next = r.take_next();
        }
    }
}

/// Iterator over a heap's allocation list.
pub struct Objects<'a> {
    next: Option<ObjRef>,
    _heap: PhantomData<&'a Heap>,
}

impl Iterator for Objects<'_> {
    type Item = ObjRef;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.next_allocated();
        Some(current)
    }
}
