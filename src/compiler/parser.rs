//! Single-pass compiler: parses Lox source with a Pratt parser and emits
//! bytecode directly, without building a syntax tree.

use std::mem;

use super::lexer::{Lexer, Token, TokenKind};
use super::rules::{ParseFn, Precedence, rule};
use crate::error::{CompileError, Diagnostic, ErrorLocation};
use crate::vm::{Chunk, Function, Heap, MAX_CONSTANTS, ObjRef, OpCode, Value};

/// Local slots per function, including the reserved slot 0.
const MAX_LOCALS: usize = 256;
const MAX_ARGS: usize = 255;
/// Combined depth of nested expressions, statements and function bodies.
const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

#[derive(Debug, Clone, Copy)]
struct Local<'src> {
    name: &'src str,
    depth: usize,
    /// False while the local's own initializer is being compiled.
    initialized: bool,
}

/// Per-function compilation state.
struct FunctionState<'src> {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    scope_depth: usize,
}

impl<'src> FunctionState<'src> {
    fn new(kind: FunctionKind, name: Option<ObjRef>) -> Self {
        let mut locals = Vec::with_capacity(MAX_LOCALS);
        // Slot 0 holds the callee.
        locals.push(Local {
            name: "",
            depth: 0,
            initialized: true,
        });
        Self {
            function: Function {
                arity: 0,
                chunk: Chunk::new(),
                name,
            },
            kind,
            locals,
            scope_depth: 0,
        }
    }
}

/// Compile `source` into the top-level script function.
///
/// All diagnostics are collected; compilation keeps going after an error to
/// report as many as possible.
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, CompileError> {
    let mut parser = Parser::new(source, heap);
    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }
    parser.finish()
}

struct Parser<'src, 'heap> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    heap: &'heap mut Heap,
    state: FunctionState<'src>,
    /// Enclosing functions, outermost first.
    enclosing: Vec<FunctionState<'src>>,
    depth: usize,
    /// Set once nesting overflowed; silences everything reported after it.
    too_deep: bool,
}

impl<'src, 'heap> Parser<'src, 'heap> {
    fn new(source: &'src str, heap: &'heap mut Heap) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: Token::synthetic(""),
            previous: Token::synthetic(""),
            panic_mode: false,
            diagnostics: Vec::new(),
            heap,
            state: FunctionState::new(FunctionKind::Script, None),
            enclosing: Vec::new(),
            depth: 0,
            too_deep: false,
        }
    }

    fn finish(mut self) -> Result<ObjRef, CompileError> {
        let function = self.end_function();
        if !self.diagnostics.is_empty() {
            tracing::debug!(errors = self.diagnostics.len(), "compilation failed");
            return Err(CompileError {
                diagnostics: self.diagnostics,
            });
        }
        tracing::debug!(
            bytes = function.chunk.len(),
            constants = function.chunk.constants.len(),
            objects = self.heap.object_count(),
            "compiled script"
        );
        Ok(self.heap.alloc_function(function))
    }

    // ========================================
    // Token handling
    // ========================================

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ========================================
    // Error reporting
    // ========================================

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode || self.too_deep {
            return;
        }
        self.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::End,
            TokenKind::Error => ErrorLocation::None,
            _ => ErrorLocation::Lexeme(token.lexeme.to_string()),
        };
        self.diagnostics.push(Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    /// Skip tokens until a likely statement boundary.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semi {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    /// Run `body` one nesting level deeper. Past `MAX_NESTING` the rest of
    /// the input is abandoned so the native stack stays bounded.
    fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        if self.depth >= MAX_NESTING {
            self.error_at_current("Nesting too deep.");
            self.too_deep = true;
            while !self.check(TokenKind::Eof) {
                self.advance();
            }
            return;
        }
        self.depth += 1;
        body(self);
        self.depth -= 1;
    }

    // ========================================
    // Emission
    // ========================================

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state.function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.chunk().write_op(op, line);
    }

    fn emit_op_arg(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if self.chunk().constants.len() >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        self.chunk().add_constant(value) as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_arg(OpCode::Constant, index);
    }

    /// Emit a jump with a placeholder offset; returns the operand position.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // -2 for the operand itself
        let jump = self.chunk().len() - offset - 2;
        let Ok(jump) = u16::try_from(jump) else {
            self.error("Too much code to jump over.");
            return;
        };
        let [hi, lo] = jump.to_be_bytes();
        let code = &mut self.chunk().code;
        code[offset] = hi;
        code[offset + 1] = lo;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk().len() - loop_start + 2;
        let Ok(offset) = u16::try_from(offset) else {
            self.error("Loop body too large.");
            return;
        };
        let [hi, lo] = offset.to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    /// Close the current function and return to the enclosing one.
    fn end_function(&mut self) -> Function {
        self.emit_return();
        let outer = self
            .enclosing
            .pop()
            .unwrap_or_else(|| FunctionState::new(FunctionKind::Script, None));
        let finished = mem::replace(&mut self.state, outer);
        tracing::trace!(
            function = finished.function.display_name(),
            bytes = finished.function.chunk.len(),
            "finished function"
        );
        finished.function
    }

    // ========================================
    // Variables and scopes
    // ========================================

    /// Constant index of an interned name, reusing an existing entry.
    fn identifier_constant(&mut self, name: &str) -> u8 {
        let name = self.heap.intern(name);
        let existing = self
            .chunk()
            .constants
            .iter()
            .position(|c| matches!(c, Value::Obj(r) if r.ptr_eq(&name)));
        match existing {
            Some(index) => index as u8,
            None => self.make_constant(Value::Obj(name)),
        }
    }

    fn begin_scope(&mut self) {
        self.state.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state.scope_depth -= 1;
        while self
            .state
            .locals
            .last()
            .is_some_and(|local| local.depth > self.state.scope_depth)
        {
            self.emit_op(OpCode::Pop);
            self.state.locals.pop();
        }
    }

    fn add_local(&mut self, name: &'src str) {
        if self.state.locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state.locals.push(Local {
            name,
            depth: self.state.scope_depth,
            initialized: false,
        });
    }

    fn declare_variable(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = self.state.scope_depth;
        let duplicate = self
            .state
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= depth)
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Ident, message);
        self.declare_variable();
        if self.state.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn mark_initialized(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.state.locals.last_mut() {
            local.initialized = true;
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.state.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_arg(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let (slot, local) = self
            .state
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)?;
        if !local.initialized {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(slot as u8)
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let (get, set, arg) = match self.resolve_local(name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let index = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.match_token(TokenKind::Eq) {
            self.expression();
            self.emit_op_arg(set, arg);
        } else {
            self.emit_op_arg(get, arg);
        }
    }

    // ========================================
    // Declarations and statements
    // ========================================

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Initialized before the body so the function can call itself.
        self.mark_initialized();
        self.nested(|p| p.function(FunctionKind::Function));
        self.define_variable(global);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Eq) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semi, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.heap.intern(self.previous.lexeme);
        let outer = mem::replace(&mut self.state, FunctionState::new(kind, Some(name)));
        self.enclosing.push(outer);
        self.begin_scope();

        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RParen) {
            loop {
                self.state.function.arity += 1;
                if self.state.function.arity > MAX_ARGS {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: returning from the frame discards its locals.
        let function = self.end_function();
        let function = self.heap.alloc_function(function);
        self.emit_constant(Value::Obj(function));
    }

    fn statement(&mut self) {
        self.nested(Self::statement_inner);
    }

    fn statement_inner(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semi, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semi, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.state.kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semi) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semi, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semi) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semi) {
            self.expression();
            self.consume(TokenKind::Semi, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RParen) {
            // The increment runs after the body, so jump over it now and
            // loop back to it from the end of the body.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    // ========================================
    // Expressions
    // ========================================

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.nested(|p| p.parse_precedence_inner(precedence));
    }

    fn parse_precedence_inner(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        self.apply(prefix, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                self.apply(infix, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Eq) {
            self.error("Invalid assignment target.");
        }
    }

    fn apply(&mut self, parse_fn: ParseFn, can_assign: bool) {
        match parse_fn {
            ParseFn::Grouping => self.grouping(),
            ParseFn::Call => self.call(),
            ParseFn::Unary => self.unary(),
            ParseFn::Binary => self.binary(),
            ParseFn::Variable => self.named_variable(self.previous.lexeme, can_assign),
            ParseFn::String => self.string(),
            ParseFn::Number => self.number(),
            ParseFn::Literal => self.literal(),
            ParseFn::And => self.and(),
            ParseFn::Or => self.or(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after expression.");
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_arg(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression();
                if count == MAX_ARGS {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.");
        count.min(MAX_ARGS) as u8
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => {}
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(rule(operator).precedence.next());

        match operator {
            TokenKind::NotEq => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqEq => self.emit_op(OpCode::Equal),
            TokenKind::Gt => self.emit_op(OpCode::Greater),
            TokenKind::Ge => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Lt => self.emit_op(OpCode::Less),
            TokenKind::Le => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => {}
        }
    }

    fn number(&mut self) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let text = &lexeme[1..lexeme.len() - 1];
        let string = self.heap.intern(text);
        self.emit_constant(Value::Obj(string));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => {}
        }
    }

    /// `a and b`: skip `b` when `a` is falsey, leaving `a` as the result.
    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// `a or b`: skip `b` when `a` is truthy, leaving `a` as the result.
    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }
}
