use super::Value;
use super::object::{LoxString, ObjRef};

const MAX_LOAD: f64 = 0.75;

/// One bucket. `key == None` with `Value::Nil` is empty; with `Value::Bool(true)`
/// it is a tombstone left by `delete`.
#[derive(Debug, Clone, Default)]
struct Entry {
    key: Option<ObjRef>,
    value: Value,
}

impl Entry {
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !self.value.is_nil()
    }
}

/// Open-addressing hash table keyed by interned strings.
///
/// Keys compare by identity, so every key must come from the same heap's
/// intern table. `count` tracks live entries plus tombstones and is what the
/// load factor is checked against.
#[derive(Debug, Default)]
pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

fn key_hash(key: &ObjRef) -> u32 {
    key.as_string().map_or(0, LoxString::hash)
}

/// Probe for `key`: the slot holding it, or the slot to insert it into
/// (the first tombstone passed, else the empty slot that ended the probe).
fn find_entry(entries: &[Entry], key: &ObjRef) -> usize {
    let capacity = entries.len();
    let mut index = key_hash(key) as usize % capacity;
    let mut tombstone = None;
    loop {
        let entry = &entries[index];
        match &entry.key {
            Some(k) if k.ptr_eq(key) => return index,
            Some(_) => {}
            None if entry.is_tombstone() => {
                tombstone.get_or_insert(index);
            }
            None => return tombstone.unwrap_or(index),
        }
        index = (index + 1) % capacity;
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots in use, tombstones included.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &ObjRef) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[find_entry(&self.entries, key)];
        entry.key.as_ref().map(|_| entry.value.clone())
    }

    /// Insert or overwrite. Returns `true` if `key` was not present.
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            let capacity = (self.capacity() * 2).max(8);
            self.adjust_capacity(capacity);
        }

        let index = find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        if is_new && entry.value.is_nil() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Remove `key`, leaving a tombstone so later probes keep walking.
    pub fn delete(&mut self, key: &ObjRef) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        true
    }

    /// Copy every live entry of `self` into `to`.
    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key.clone(), value.clone());
        }
    }

    /// Look up a key by content rather than identity. Used by interning.
    pub fn find_string(&self, text: &str, hash: u32) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = hash as usize % capacity;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                None if !entry.is_tombstone() => return None,
                None => {}
                Some(key) => {
                    if let Some(s) = key.as_string()
                        && s.hash() == hash
                        && s.as_str() == text
                    {
                        return Some(key.clone());
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Live entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjRef, &Value)> {
        self.entries
            .iter()
            .filter_map(|e| e.key.as_ref().map(|k| (k, &e.value)))
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        tracing::trace!(from = self.capacity(), to = capacity, "growing table");
        let mut entries = vec![Entry::default(); capacity];
        self.count = 0;
        for old in std::mem::take(&mut self.entries) {
            if let Some(key) = old.key {
                let index = find_entry(&entries, &key);
                entries[index] = Entry {
                    key: Some(key),
                    value: old.value,
                };
                self.count += 1;
            }
        }
        self.entries = entries;
    }
}
