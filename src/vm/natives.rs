//! Host functions installed as globals on every new VM.

use std::rc::Rc;
use std::time::Instant;

use super::{NativeFn, Value};

/// `clock()`: seconds elapsed since `start`.
pub fn clock(start: Instant) -> NativeFn {
    Rc::new(move |_args: &[Value]| Value::Number(start.elapsed().as_secs_f64()))
}
