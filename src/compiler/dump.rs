//! Bytecode disassembler.
//!
//! Renders one instruction per line as
//! `OFFSET LINE MNEMONIC OPERANDS`, where LINE is `   |` when it repeats the
//! previous instruction's source line.

use crate::vm::{Chunk, Function, ObjRef, OpCode, Value};

/// Disassembler for one chunk.
pub struct Disassembler<'a> {
    chunk: &'a Chunk,
    output: String,
}

impl<'a> Disassembler<'a> {
    pub fn new(chunk: &'a Chunk) -> Self {
        Self {
            chunk,
            output: String::new(),
        }
    }

    /// Full listing headed by `== name ==`.
    pub fn disassemble(&mut self, name: &str) -> &str {
        self.writeln(&format!("== {} ==", name));
        let mut offset = 0;
        while offset < self.chunk.len() {
            let (line, next) = self.instruction(offset);
            self.writeln(&line);
            offset = next;
        }
        &self.output
    }

    /// Render the instruction at `offset` and return the offset of the next one.
    pub fn instruction(&self, offset: usize) -> (String, usize) {
        let mut out = format!("{:04} ", offset);
        let line = self.chunk.line(offset);
        if offset > 0 && line == self.chunk.line(offset - 1) {
            out.push_str("   | ");
        } else {
            out.push_str(&format!("{:4} ", line));
        }

        let byte = self.chunk.code[offset];
        let Ok(op) = OpCode::try_from(byte) else {
            out.push_str(&format!("Unknown opcode {}", byte));
            return (out, offset + 1);
        };

        let next = offset + 1 + op.operand_len();
        if next > self.chunk.len() {
            out.push_str(&format!("{:<16} <truncated>", op.name()));
            return (out, self.chunk.len());
        }

        let operands = match op {
            OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
                let index = self.chunk.code[offset + 1];
                let value = self
                    .chunk
                    .constants
                    .get(index as usize)
                    .map(Value::to_string)
                    .unwrap_or_else(|| "<?>".to_string());
                format!("{:<16} {:4} '{}'", op.name(), index, value)
            }
            OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => {
                let operand = self.chunk.code[offset + 1];
                format!("{:<16} {:4}", op.name(), operand)
            }
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
                let jump = self.chunk.read_u16(offset + 1) as usize;
                let target = if op == OpCode::Loop {
                    next.wrapping_sub(jump) as isize
                } else {
                    (next + jump) as isize
                };
                format!("{:<16} {:4} -> {}", op.name(), offset, target)
            }
            _ => op.name().to_string(),
        };
        out.push_str(&operands);
        (out, next)
    }

    fn writeln(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    Disassembler::new(chunk).instruction(offset)
}

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    Disassembler::new(chunk).disassemble(name).to_string()
}

/// Listing of `function` followed by every function nested in its constants.
pub fn disassemble_function_tree(function: &Function) -> String {
    let mut output = disassemble_chunk(&function.chunk, function.name().unwrap_or("<script>"));
    for constant in &function.chunk.constants {
        if let Some(nested) = constant.as_obj().and_then(ObjRef::as_function) {
            output.push('\n');
            output.push_str(&disassemble_function_tree(nested));
        }
    }
    output
}

/// Stack contents as printed by the execution trace.
pub fn format_stack(stack: &[Value]) -> String {
    let mut out = String::from("          ");
    for value in stack {
        out.push_str(&format!("[ {} ]", value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::vm::Heap;

    fn compile_script(source: &str) -> (Heap, ObjRef) {
        let mut heap = Heap::new();
        let script = compile(source, &mut heap).unwrap();
        (heap, script)
    }

    /// Walk every instruction and check each byte is covered exactly once.
    fn assert_accounts_for_every_byte(chunk: &Chunk) {
        let mut offset = 0;
        let mut covered = 0;
        while offset < chunk.len() {
            let (_, next) = disassemble_instruction(chunk, offset);
            assert!(next > offset);
            covered += next - offset;
            offset = next;
        }
        assert_eq!(offset, chunk.len());
        assert_eq!(covered, chunk.len());
    }

    #[test]
    fn test_simple_listing() {
        let (_heap, script) = compile_script("print 1 + 2;");
        let function = script.as_function().unwrap();
        let output = disassemble_chunk(&function.chunk, "test");
        let expected = "\
== test ==
0000    1 OP_CONSTANT         0 '1'
0002    | OP_CONSTANT         1 '2'
0004    | OP_ADD
0005    | OP_PRINT
0006    | OP_NIL
0007    | OP_RETURN
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_jumps_show_targets() {
        let (_heap, script) = compile_script("while (false) print 1;");
        let function = script.as_function().unwrap();
        let output = disassemble_chunk(&function.chunk, "loop");
        assert!(output.contains("OP_JUMP_IF_FALSE    1 -> 11"), "{}", output);
        assert!(output.contains("OP_LOOP             8 -> 0"), "{}", output);
    }

    #[test]
    fn test_every_byte_accounted_for() {
        let source = r#"
            var g = "global";
            fun fib(n) {
                if (n < 2) return n;
                return fib(n - 1) + fib(n - 2);
            }
            for (var i = 0; i < 3; i = i + 1) {
                var x = i and !false or nil;
                print fib(i) >= -x;
            }
            g = g + "!";
        "#;
        let (_heap, script) = compile_script(source);
        let function = script.as_function().unwrap();
        assert_accounts_for_every_byte(&function.chunk);
        for constant in &function.chunk.constants {
            if let Some(nested) = constant.as_obj().and_then(ObjRef::as_function) {
                assert_accounts_for_every_byte(&nested.chunk);
            }
        }
    }

    #[test]
    fn test_function_tree() {
        let (_heap, script) = compile_script("fun add(a, b) { return a + b; } print add(1, 2);");
        let function = script.as_function().unwrap();
        let output = disassemble_function_tree(function);
        assert!(output.starts_with("== <script> =="));
        assert!(output.contains("== add =="));
        assert!(output.contains("OP_GET_LOCAL        1"));
        assert!(output.contains("OP_CALL             2"));
        assert!(output.contains("'<fn add>'"));
    }

    #[test]
    fn test_unknown_and_truncated() {
        let mut chunk = Chunk::new();
        chunk.write(200, 1);
        chunk.write(OpCode::Constant as u8, 1);
        let (text, next) = disassemble_instruction(&chunk, 0);
        assert!(text.ends_with("Unknown opcode 200"));
        assert_eq!(next, 1);
        let (text, next) = disassemble_instruction(&chunk, 1);
        assert!(text.contains("<truncated>"));
        assert_eq!(next, 2);
    }

    #[test]
    fn test_format_stack() {
        let stack = vec![Value::Number(1.0), Value::Nil];
        assert_eq!(format_stack(&stack), "          [ 1 ][ nil ]");
    }
}
