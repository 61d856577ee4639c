//! Pratt parsing table.

use super::lexer::TokenKind;

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // ()
    Primary,
}

impl Precedence {
    /// One level tighter, used for the right operand of left-associative
    /// binary operators.
    pub fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// Parse handlers the compiler dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFn {
    Grouping,
    Call,
    Unary,
    Binary,
    Variable,
    String,
    Number,
    Literal,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
pub struct ParseRule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

const fn rule_of(
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

pub fn rule(kind: TokenKind) -> ParseRule {
    use ParseFn as F;
    use Precedence as P;
    use TokenKind as T;

    match kind {
        T::LParen => rule_of(Some(F::Grouping), Some(F::Call), P::Call),
        T::Minus => rule_of(Some(F::Unary), Some(F::Binary), P::Term),
        T::Plus => rule_of(None, Some(F::Binary), P::Term),
        T::Slash | T::Star => rule_of(None, Some(F::Binary), P::Factor),
        T::Bang => rule_of(Some(F::Unary), None, P::None),
        T::NotEq | T::EqEq => rule_of(None, Some(F::Binary), P::Equality),
        T::Gt | T::Ge | T::Lt | T::Le => rule_of(None, Some(F::Binary), P::Comparison),
        T::Ident => rule_of(Some(F::Variable), None, P::None),
        T::Str => rule_of(Some(F::String), None, P::None),
        T::Number => rule_of(Some(F::Number), None, P::None),
        T::And => rule_of(None, Some(F::And), P::And),
        T::Or => rule_of(None, Some(F::Or), P::Or),
        T::False | T::True | T::Nil => rule_of(Some(F::Literal), None, P::None),
        T::RParen
        | T::LBrace
        | T::RBrace
        | T::Comma
        | T::Dot
        | T::Semi
        | T::Eq
        | T::Class
        | T::Else
        | T::For
        | T::Fun
        | T::If
        | T::Print
        | T::Return
        | T::Super
        | T::This
        | T::Var
        | T::While
        | T::Error
        | T::Eof => rule_of(None, None, P::None),
    }
}
