//! Error types shared by the compiler, the VM and the CLI.

use std::fmt;

/// Process exit codes used by the `lox` binary (sysexits.h values).
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const USAGE: i32 = 64;
    pub const COMPILE: i32 = 65;
    pub const RUNTIME: i32 = 70;
    pub const IO: i32 = 74;
    pub const CONFIG: i32 = 78;
}

/// Where on the line a compile error was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At a token with this lexeme.
    Lexeme(String),
    /// At end of input.
    End,
    /// No location; used for lexical errors, whose token text is the message.
    None,
}

/// A single compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            ErrorLocation::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorLocation::End => write!(f, " at end")?,
            ErrorLocation::None => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Every diagnostic recorded while compiling one source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// A runtime failure with the call stack at the point of failure,
/// innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<String>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretError::Compile(_) => exit_code::COMPILE,
            InterpretError::Runtime(_) => exit_code::RUNTIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(location: ErrorLocation) -> Diagnostic {
        Diagnostic {
            line: 3,
            location,
            message: "Expect expression.".to_string(),
        }
    }

    #[test]
    fn test_diagnostic_formats() {
        assert_eq!(
            diagnostic(ErrorLocation::Lexeme("+".into())).to_string(),
            "[line 3] Error at '+': Expect expression."
        );
        assert_eq!(
            diagnostic(ErrorLocation::End).to_string(),
            "[line 3] Error at end: Expect expression."
        );
        assert_eq!(
            diagnostic(ErrorLocation::None).to_string(),
            "[line 3] Error: Expect expression."
        );
    }

    #[test]
    fn test_compile_error_one_line_per_diagnostic() {
        let err = CompileError {
            diagnostics: vec![diagnostic(ErrorLocation::End), diagnostic(ErrorLocation::None)],
        };
        assert_eq!(err.to_string().lines().count(), 2);
    }

    #[test]
    fn test_runtime_error_display_and_exit_code() {
        let err = RuntimeError {
            message: "Stack overflow.".to_string(),
            trace: vec!["[line 1] in f()".to_string(), "[line 1] in script".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Stack overflow.\n[line 1] in f()\n[line 1] in script"
        );
        assert_eq!(InterpretError::from(err).exit_code(), 70);
    }
}
