use std::io::{self, Write};
use std::iter;
use std::mem;
use std::rc::Rc;
use std::time::Instant;

use crate::compiler::{compile, disassemble_function_tree, disassemble_instruction, dump::format_stack};
use crate::config::{RuntimeConfig, Timings};
use crate::error::{InterpretError, RuntimeError};
use crate::vm::{natives, Function, Heap, NativeFn, NativeFunction, ObjRef, Object, OpCode, Table, Value};

/// Maximum number of live call frames.
pub const FRAMES_MAX: usize = 64;
/// Initial value stack reservation.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// A call frame for the VM.
#[derive(Debug, Clone)]
struct CallFrame {
    function: Rc<Function>,
    /// Offset of the next byte to execute
    ip: usize,
    /// Stack slot of the callee; locals are addressed relative to it
    base: usize,
}

enum ControlFlow {
    Continue,
    Halt,
}

/// The Lox virtual machine.
///
/// Globals and interned strings persist across `interpret` calls, so one VM
/// can serve a whole REPL session.
pub struct VM {
    stack: Vec<Value>,
    /// Suspended callers; the running frame lives in `run`.
    frames: Vec<CallFrame>,
    globals: Table,
    config: RuntimeConfig,
    last_timings: Option<Timings>,
    /// Output stream for print statements
    output: Box<dyn Write>,
    started: Instant,
    // Dropped last: everything above may hold object handles.
    heap: Heap,
}

impl VM {
    pub fn new() -> Self {
        Self::new_with_config(RuntimeConfig::default(), Box::new(io::stdout()))
    }

    /// Create a VM with a custom output stream.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::new_with_config(RuntimeConfig::default(), output)
    }

    /// Create a VM with full configuration.
    pub fn new_with_config(config: RuntimeConfig, output: Box<dyn Write>) -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            config,
            last_timings: None,
            output,
            started: Instant::now(),
            heap: Heap::new(),
        };
        if vm.config.natives {
            vm.define_native("clock", 0, natives::clock(vm.started));
        }
        vm
    }

    /// Get immutable reference to the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compile and execute timings of the most recent `interpret` call.
    pub fn last_timings(&self) -> Option<Timings> {
        self.last_timings
    }

    /// Values currently on the stack. Empty between `interpret` calls.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Install a host function as a global.
    pub fn define_native(&mut self, name: &str, arity: usize, function: NativeFn) {
        let native = self.heap.alloc_native(NativeFunction::new(name, arity, function));
        let key = self.heap.intern(name);
        self.globals.set(key, Value::Obj(native));
    }

    /// Current value of a global, if defined.
    pub fn global(&self, name: &str) -> Option<Value> {
        let key = self.heap.lookup(name)?;
        self.globals.get(&key)
    }

    /// Compile and run `source`.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let compile_start = Instant::now();
        let script = compile(source, &mut self.heap)?;
        let compile_time = compile_start.elapsed();

        let Some(function) = script.as_function().cloned() else {
            return Ok(());
        };
        if self.config.dump_bytecode {
            eprint!("{}", disassemble_function_tree(&function));
        }

        let execute_start = Instant::now();
        self.stack.push(Value::Obj(script));
        let frame = CallFrame {
            function,
            ip: 0,
            base: self.stack.len() - 1,
        };
        let result = self.run(frame);
        self.last_timings = Some(Timings::new(compile_time, execute_start.elapsed()));

        if let Err(e) = self.output.flush() {
            tracing::warn!(error = %e, "failed to flush output");
        }
        result.map_err(InterpretError::from)
    }

    fn run(&mut self, mut frame: CallFrame) -> Result<(), RuntimeError> {
        tracing::debug!(globals = self.globals.iter().count(), "executing script");
        loop {
            if self.config.trace_execution {
                self.trace_instruction(&frame);
            }
            match self.execute_op(&mut frame) {
                Ok(ControlFlow::Continue) => {}
                Ok(ControlFlow::Halt) => return Ok(()),
                Err(message) => return Err(self.runtime_error(&frame, message)),
            }
        }
    }

    fn execute_op(&mut self, frame: &mut CallFrame) -> Result<ControlFlow, String> {
        let byte = read_byte(frame)?;
        let op = OpCode::try_from(byte).map_err(|b| format!("Unknown opcode {}.", b))?;

        match op {
            OpCode::Constant => {
                let value = read_constant(frame)?;
                self.stack.push(value);
            }
            OpCode::Nil => self.stack.push(Value::Nil),
            OpCode::True => self.stack.push(Value::Bool(true)),
            OpCode::False => self.stack.push(Value::Bool(false)),
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::GetLocal => {
                let slot = frame.base + read_byte(frame)? as usize;
                let value = self.stack.get(slot).cloned().ok_or("Invalid local slot.")?;
                self.stack.push(value);
            }
            OpCode::SetLocal => {
                let slot = frame.base + read_byte(frame)? as usize;
                let value = self.peek(0)?.clone();
                let target = self.stack.get_mut(slot).ok_or("Invalid local slot.")?;
                *target = value;
            }
            OpCode::GetGlobal => {
                let name = read_name(frame)?;
                let value = self
                    .globals
                    .get(&name)
                    .ok_or_else(|| format!("Undefined variable '{}'.", name))?;
                self.stack.push(value);
            }
            OpCode::DefineGlobal => {
                let name = read_name(frame)?;
                let value = self.peek(0)?.clone();
                self.globals.set(name, value);
                self.pop()?;
            }
            OpCode::SetGlobal => {
                let name = read_name(frame)?;
                let value = self.peek(0)?.clone();
                if self.globals.set(name.clone(), value) {
                    // Assignment never creates a global; undo the insert.
                    self.globals.delete(&name);
                    return Err(format!("Undefined variable '{}'.", name));
                }
            }
            OpCode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a == b));
            }
            OpCode::Greater => self.binary_number(|a, b| Value::Bool(a > b))?,
            OpCode::Less => self.binary_number(|a, b| Value::Bool(a < b))?,
            OpCode::Add => self.add()?,
            OpCode::Subtract => self.binary_number(|a, b| Value::Number(a - b))?,
            OpCode::Multiply => self.binary_number(|a, b| Value::Number(a * b))?,
            OpCode::Divide => self.binary_number(|a, b| Value::Number(a / b))?,
            OpCode::Not => {
                let value = self.pop()?;
                self.stack.push(Value::Bool(value.is_falsey()));
            }
            OpCode::Negate => {
                let n = self
                    .peek(0)?
                    .as_number()
                    .ok_or("Operand must be a number.")?;
                self.pop()?;
                self.stack.push(Value::Number(-n));
            }
            OpCode::Print => {
                let value = self.pop()?;
                writeln!(self.output, "{}", value)
                    .map_err(|e| format!("Failed to write output: {}.", e))?;
            }
            OpCode::Jump => {
                let offset = read_u16(frame)?;
                frame.ip += offset as usize;
            }
            OpCode::JumpIfFalse => {
                let offset = read_u16(frame)?;
                if self.peek(0)?.is_falsey() {
                    frame.ip += offset as usize;
                }
            }
            OpCode::Loop => {
                let offset = read_u16(frame)?;
                frame.ip = frame
                    .ip
                    .checked_sub(offset as usize)
                    .ok_or("Loop offset out of bounds.")?;
            }
            OpCode::Call => {
                let argc = read_byte(frame)? as usize;
                let callee = self.peek(argc)?.clone();
                self.call_value(frame, &callee, argc)?;
            }
            OpCode::Return => {
                let result = self.pop()?;
                self.stack.truncate(frame.base);
                match self.frames.pop() {
                    Some(caller) => {
                        *frame = caller;
                        self.stack.push(result);
                    }
                    None => return Ok(ControlFlow::Halt),
                }
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "Stack underflow.".to_string())
    }

    fn peek(&self, distance: usize) -> Result<&Value, String> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|index| self.stack.get(index))
            .ok_or_else(|| "Stack underflow.".to_string())
    }

    /// Pop two numbers and push `f(a, b)`. Operands stay on the stack if
    /// either is not a number.
    fn binary_number(&mut self, f: impl Fn(f64, f64) -> Value) -> Result<(), String> {
        let (Some(a), Some(b)) = (self.peek(1)?.as_number(), self.peek(0)?.as_number()) else {
            return Err("Operands must be numbers.".to_string());
        };
        self.stack.truncate(self.stack.len() - 2);
        self.stack.push(f(a, b));
        Ok(())
    }

    /// Numeric addition or string concatenation.
    fn add(&mut self) -> Result<(), String> {
        let result = match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (a, b) => match (a.as_string(), b.as_string()) {
                (Some(a), Some(b)) => {
                    let mut text = String::with_capacity(a.len() + b.len());
                    text.push_str(a.as_str());
                    text.push_str(b.as_str());
                    Value::Obj(self.heap.take_string(text))
                }
                _ => return Err("Operands must be two numbers or two strings.".to_string()),
            },
        };
        self.stack.truncate(self.stack.len() - 2);
        self.stack.push(result);
        Ok(())
    }

    fn call_value(&mut self, frame: &mut CallFrame, callee: &Value, argc: usize) -> Result<(), String> {
        match callee.as_obj().map(ObjRef::object) {
            Some(Object::Function(function)) => self.call(frame, Rc::clone(function), argc),
            Some(Object::Native(native)) => {
                if native.arity() != argc {
                    return Err(format!(
                        "Expected {} arguments but got {}.",
                        native.arity(),
                        argc
                    ));
                }
                let args_start = self.stack.len() - argc;
                let result = native.call(&self.stack[args_start..]);
                // drop the arguments and the callee
                self.stack.truncate(args_start - 1);
                self.stack.push(result);
                Ok(())
            }
            _ => Err("Can only call functions and classes.".to_string()),
        }
    }

    fn call(&mut self, frame: &mut CallFrame, function: Rc<Function>, argc: usize) -> Result<(), String> {
        if argc != function.arity {
            return Err(format!(
                "Expected {} arguments but got {}.",
                function.arity, argc
            ));
        }
        if self.frames.len() + 1 >= FRAMES_MAX {
            return Err("Stack overflow.".to_string());
        }

        let callee = CallFrame {
            function,
            ip: 0,
            base: self.stack.len() - argc - 1,
        };
        let caller = mem::replace(frame, callee);
        self.frames.push(caller);
        Ok(())
    }

    /// Build the error with a stack trace, innermost frame first, and reset
    /// the VM so it can run again.
    fn runtime_error(&mut self, frame: &CallFrame, message: String) -> RuntimeError {
        let trace: Vec<String> = iter::once(frame)
            .chain(self.frames.iter().rev())
            .map(|f| {
                let line = f.function.chunk.line(f.ip.saturating_sub(1));
                match f.function.name() {
                    Some(name) => format!("[line {}] in {}()", line, name),
                    None => format!("[line {}] in script", line),
                }
            })
            .collect();
        tracing::debug!(%message, depth = trace.len(), "runtime error");
        self.reset_stack();
        RuntimeError { message, trace }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    fn trace_instruction(&self, frame: &CallFrame) {
        eprintln!("{}", format_stack(&self.stack));
        let (line, _) = disassemble_instruction(&frame.function.chunk, frame.ip);
        eprintln!("{}", line);
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

fn read_byte(frame: &mut CallFrame) -> Result<u8, String> {
    let byte = frame
        .function
        .chunk
        .code
        .get(frame.ip)
        .copied()
        .ok_or("Instruction pointer out of bounds.")?;
    frame.ip += 1;
    Ok(byte)
}

fn read_u16(frame: &mut CallFrame) -> Result<u16, String> {
    let hi = read_byte(frame)?;
    let lo = read_byte(frame)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

fn read_constant(frame: &mut CallFrame) -> Result<Value, String> {
    let index = read_byte(frame)? as usize;
    frame
        .function
        .chunk
        .constants
        .get(index)
        .cloned()
        .ok_or_else(|| format!("Invalid constant index {}.", index))
}

/// Read a constant that must be an interned name.
fn read_name(frame: &mut CallFrame) -> Result<ObjRef, String> {
    match read_constant(frame)? {
        Value::Obj(name) if name.is_string() => Ok(name),
        other => Err(format!("Expected a name constant, found {}.", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterpretError;
    use crate::vm::OutputBuffer;

    fn vm_with_buffer() -> (VM, OutputBuffer) {
        let buffer = OutputBuffer::new();
        (VM::with_output(Box::new(buffer.clone())), buffer)
    }

    fn run(source: &str) -> String {
        let (mut vm, buffer) = vm_with_buffer();
        vm.interpret(source).unwrap();
        buffer.contents()
    }

    fn runtime_error(source: &str) -> RuntimeError {
        let (mut vm, _buffer) = vm_with_buffer();
        match vm.interpret(source) {
            Err(InterpretError::Runtime(e)) => e,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("print 1 + 2 * 3;"), "7\n");
        assert_eq!(run("print (1 + 2) * 3;"), "9\n");
        assert_eq!(run("print 10 / 4;"), "2.5\n");
        assert_eq!(run("print -(3 - 5);"), "2\n");
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(run("print 1 < 2; print 2 <= 1; print !nil; print 1 == 1;"), "true\nfalse\ntrue\ntrue\n");
        assert_eq!(run("print nil or \"x\"; print false and 1; print 1 and 2;"), "x\nfalse\n2\n");
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let out = run("var a = 0; fun bump() { a = a + 1; return true; } false and bump(); true or bump(); print a;");
        assert_eq!(out, "0\n");
    }

    #[test]
    fn test_string_concatenation_is_interned() {
        let (mut vm, buffer) = vm_with_buffer();
        vm.interpret("var a = \"lo\" + \"x\"; print a == \"lox\";").unwrap();
        assert_eq!(buffer.contents(), "true\n");
        assert!(vm.heap().lookup("lox").is_some());
    }

    #[test]
    fn test_locals_and_shadowing() {
        assert_eq!(run("var a = 1; { var a = 2; print a; } print a;"), "2\n1\n");
        assert_eq!(run("{ var a = 1; a = a + 1; print a; }"), "2\n");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(run("if (1 > 2) print \"a\"; else print \"b\";"), "b\n");
        assert_eq!(run("var i = 0; while (i < 3) { print i; i = i + 1; }"), "0\n1\n2\n");
        assert_eq!(run("for (var i = 0; i < 3; i = i + 1) print i;"), "0\n1\n2\n");
        assert_eq!(run("var n = 0; for (;n < 2;) n = n + 1; print n;"), "2\n");
    }

    #[test]
    fn test_functions() {
        assert_eq!(run("fun add(a, b) { return a + b; } print add(1, 2);"), "3\n");
        assert_eq!(run("fun f() {} print f();"), "nil\n");
        assert_eq!(run("fun f() { return; } print f();"), "nil\n");
        assert_eq!(run("fun f() {} print f;"), "<fn f>\n");
        assert_eq!(run("print clock;"), "<native fn>\n");
    }

    #[test]
    fn test_recursion() {
        let source = "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(15);";
        assert_eq!(run(source), "610\n");
    }

    #[test]
    fn test_clock() {
        assert_eq!(run("print clock() > 0;"), "true\n");
    }

    #[test]
    fn test_deep_nesting_is_a_compile_error() {
        let (mut vm, _buffer) = vm_with_buffer();
        let depth = 20_000;
        let source = format!("print {}1{};", "(".repeat(depth), ")".repeat(depth));
        let err = vm.interpret(&source).unwrap_err();
        assert_eq!(err.exit_code(), 65);
        assert_eq!(err.to_string(), "[line 1] Error at '(': Nesting too deep.");
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn test_undefined_variable() {
        let err = runtime_error("print missing;");
        assert_eq!(err.message, "Undefined variable 'missing'.");
        assert_eq!(err.trace, vec!["[line 1] in script"]);
    }

    #[test]
    fn test_assign_undefined_global_is_not_created() {
        let (mut vm, _buffer) = vm_with_buffer();
        let err = vm.interpret("x = 1;").unwrap_err();
        assert_eq!(err.to_string(), "Undefined variable 'x'.\n[line 1] in script");
        assert_eq!(vm.global("x"), None);
    }

    #[test]
    fn test_add_type_error() {
        let err = runtime_error("1 + \"a\";");
        assert_eq!(err.message, "Operands must be two numbers or two strings.");
    }

    #[test]
    fn test_operand_errors() {
        assert_eq!(runtime_error("-\"a\";").message, "Operand must be a number.");
        assert_eq!(runtime_error("1 < nil;").message, "Operands must be numbers.");
    }

    #[test]
    fn test_call_errors() {
        assert_eq!(
            runtime_error("fun f(a) {} f();").message,
            "Expected 1 arguments but got 0."
        );
        assert_eq!(
            runtime_error("clock(1);").message,
            "Expected 0 arguments but got 1."
        );
        assert_eq!(
            runtime_error("\"s\"();").message,
            "Can only call functions and classes."
        );
    }

    #[test]
    fn test_stack_overflow_trace() {
        let err = runtime_error("fun f() { return f(); }\nf();");
        assert_eq!(err.message, "Stack overflow.");
        assert_eq!(err.trace.len(), FRAMES_MAX);
        assert_eq!(err.trace[0], "[line 1] in f()");
        assert_eq!(err.trace.last().map(String::as_str), Some("[line 2] in script"));
    }

    #[test]
    fn test_nested_trace() {
        let source = "fun inner() { return 1 + nil; }\nfun outer() {\n  return inner();\n}\nouter();";
        let err = runtime_error(source);
        assert_eq!(
            err.trace,
            vec!["[line 1] in inner()", "[line 3] in outer()", "[line 5] in script"]
        );
    }

    #[test]
    fn test_state_survives_errors() {
        let (mut vm, buffer) = vm_with_buffer();
        vm.interpret("var kept = 41;").unwrap();
        assert!(vm.interpret("fun f() { return nil + 1; } f();").is_err());
        assert_eq!(vm.stack_len(), 0);
        vm.interpret("print kept + 1;").unwrap();
        assert_eq!(buffer.contents(), "42\n");
    }

    #[test]
    fn test_compile_error_is_reported() {
        let (mut vm, _buffer) = vm_with_buffer();
        let err = vm.interpret("print ;").unwrap_err();
        assert_eq!(err.exit_code(), 65);
    }

    #[test]
    fn test_define_native() {
        let (mut vm, buffer) = vm_with_buffer();
        vm.define_native(
            "twice",
            1,
            Rc::new(|args: &[Value]| Value::Number(args[0].as_number().unwrap_or(0.0) * 2.0)),
        );
        vm.interpret("print twice(21);").unwrap();
        assert_eq!(buffer.contents(), "42\n");
    }

    #[test]
    fn test_without_natives() {
        let config = RuntimeConfig {
            natives: false,
            ..RuntimeConfig::default()
        };
        let mut vm = VM::new_with_config(config, Box::new(OutputBuffer::new()));
        let err = vm.interpret("clock();").unwrap_err();
        assert!(err.to_string().starts_with("Undefined variable 'clock'."));
    }

    #[test]
    fn test_timings_recorded() {
        let (mut vm, _buffer) = vm_with_buffer();
        assert!(vm.last_timings().is_none());
        vm.interpret("print 1;").unwrap();
        assert!(vm.last_timings().is_some());
    }
}
