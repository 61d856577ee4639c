pub mod dump;
pub mod lexer;
mod parser;
mod rules;

pub use dump::{Disassembler, disassemble_chunk, disassemble_function_tree, disassemble_instruction};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::compile;

use crate::error::CompileError;
use crate::vm::Heap;

/// Compile `source` and return its disassembly without running it.
pub fn disassemble_source(source: &str) -> Result<String, CompileError> {
    let mut heap = Heap::new();
    let script = compile(source, &mut heap)?;
    Ok(script
        .as_function()
        .map(|function| disassemble_function_tree(function))
        .unwrap_or_default())
}

/// Check that `source` compiles.
pub fn check(source: &str) -> Result<(), CompileError> {
    let mut heap = Heap::new();
    compile(source, &mut heap).map(|_| ())
}
