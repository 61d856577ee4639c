mod chunk;
mod heap;
pub mod natives;
mod object;
mod ops;
mod output;
mod table;
mod value;
mod vm;

pub use chunk::{Chunk, MAX_CONSTANTS};
pub use heap::{Heap, Objects};
pub use object::{Function, LoxString, NativeFn, NativeFunction, ObjRef, Object, hash_string};
pub use ops::OpCode;
pub use output::OutputBuffer;
pub use table::Table;
pub use value::Value;
pub use vm::{FRAMES_MAX, STACK_MAX, VM};
