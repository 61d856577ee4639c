//! lox-vm - a bytecode compiler and virtual machine for Lox
//!
//! Source text is compiled in a single pass straight to bytecode, then run
//! on a stack-based VM.

pub mod compiler;
pub mod config;
pub mod error;
pub mod vm;

// Re-export commonly used types
pub use config::{RuntimeConfig, Timings, TimingsFormat};
pub use error::{CompileError, Diagnostic, InterpretError, RuntimeError};
pub use vm::{Chunk, OutputBuffer, VM, Value};
