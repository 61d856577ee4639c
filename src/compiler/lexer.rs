/// Token kinds for the Lox language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,

    // Operators
    Minus,
    Plus,
    Slash,
    Star,
    Bang,
    NotEq,
    Eq,
    EqEq,
    Gt,
    Ge,
    Lt,
    Le,

    // Literals
    Ident,
    Str,
    Number,

    // Keywords
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    // Special
    Error,
    Eof,
}

/// A token borrowing its text from the source.
///
/// For `TokenKind::Error` the lexeme is the error message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub lexeme: &'src str,
    pub line: usize,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, lexeme: &'src str, line: usize) -> Self {
        Self { kind, lexeme, line }
    }

    /// Placeholder used before the first token is read.
    pub fn synthetic(lexeme: &'src str) -> Self {
        Self::new(TokenKind::Error, lexeme, 0)
    }
}

/// On-demand scanner for Lox source code.
pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: usize,
    done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            done: false,
        }
    }

    /// Scan the next token. Returns `Eof` forever once the input is exhausted.
    pub fn next_token(&mut self) -> Token<'src> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        let Some(ch) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        match ch {
            '(' => self.make_token(TokenKind::LParen),
            ')' => self.make_token(TokenKind::RParen),
            '{' => self.make_token(TokenKind::LBrace),
            '}' => self.make_token(TokenKind::RBrace),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            ';' => self.make_token(TokenKind::Semi),
            '-' => self.make_token(TokenKind::Minus),
            '+' => self.make_token(TokenKind::Plus),
            '/' => self.make_token(TokenKind::Slash),
            '*' => self.make_token(TokenKind::Star),
            '!' => {
                let kind = if self.match_char('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                };
                self.make_token(kind)
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                };
                self.make_token(kind)
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                };
                self.make_token(kind)
            }
            '"' => self.scan_string(),
            '0'..='9' => self.scan_number(),
            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier(),
            _ => self.error_token("Unexpected character."),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Token<'src> {
        // The token's line is the line the string ends on.
        while let Some(ch) = self.peek() {
            if ch == '"' {
                break;
            }
            self.advance();
        }
        if self.peek().is_none() {
            return self.error_token("Unterminated string.");
        }
        self.advance(); // closing quote
        self.make_token(TokenKind::Str)
    }

    fn scan_number(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(); // '.'
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn scan_identifier(&mut self) -> Token<'src> {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let kind = identifier_kind(&self.source[self.start..self.current]);
        self.make_token(kind)
    }
}

/// Classify an identifier by its first one or two characters, then confirm
/// the remainder.
fn identifier_kind(text: &str) -> TokenKind {
    let check = |start: usize, rest: &str, kind: TokenKind| {
        if &text[start..] == rest {
            kind
        } else {
            TokenKind::Ident
        }
    };

    match text.as_bytes() {
        [b'a', ..] => check(1, "nd", TokenKind::And),
        [b'c', ..] => check(1, "lass", TokenKind::Class),
        [b'e', ..] => check(1, "lse", TokenKind::Else),
        [b'f', b'a', ..] => check(2, "lse", TokenKind::False),
        [b'f', b'o', ..] => check(2, "r", TokenKind::For),
        [b'f', b'u', ..] => check(2, "n", TokenKind::Fun),
        [b'i', ..] => check(1, "f", TokenKind::If),
        [b'n', ..] => check(1, "il", TokenKind::Nil),
        [b'o', ..] => check(1, "r", TokenKind::Or),
        [b'p', ..] => check(1, "rint", TokenKind::Print),
        [b'r', ..] => check(1, "eturn", TokenKind::Return),
        [b's', ..] => check(1, "uper", TokenKind::Super),
        [b't', b'h', ..] => check(2, "is", TokenKind::This),
        [b't', b'r', ..] => check(2, "ue", TokenKind::True),
        [b'v', ..] => check(1, "ar", TokenKind::Var),
        [b'w', ..] => check(1, "hile", TokenKind::While),
        _ => TokenKind::Ident,
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    /// Yields every token up to and including the first `Eof`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.done = true;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens: Vec<_> = Lexer::new("var x = 42;").collect();

        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!(tokens[2].kind, TokenKind::Eq);
        assert_eq!(tokens[3].kind, TokenKind::Number);
        assert_eq!(tokens[3].lexeme, "42");
        assert_eq!(tokens[4].kind, TokenKind::Semi);
        assert_eq!(tokens[5].kind, TokenKind::Eof);
    }

    #[test]
    fn test_operators() {
        let expected = vec![
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Comma,
            TokenKind::Dot,
            TokenKind::Minus,
            TokenKind::Plus,
            TokenKind::Semi,
            TokenKind::Slash,
            TokenKind::Star,
            TokenKind::Bang,
            TokenKind::NotEq,
            TokenKind::Eq,
            TokenKind::EqEq,
            TokenKind::Gt,
            TokenKind::Ge,
            TokenKind::Lt,
            TokenKind::Le,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("( ) { } , . - + ; / * ! != = == > >= < <="), expected);
    }

    #[test]
    fn test_keywords() {
        let source = "and class else false for fun if nil or print return super this true var while";
        let expected = vec![
            TokenKind::And,
            TokenKind::Class,
            TokenKind::Else,
            TokenKind::False,
            TokenKind::For,
            TokenKind::Fun,
            TokenKind::If,
            TokenKind::Nil,
            TokenKind::Or,
            TokenKind::Print,
            TokenKind::Return,
            TokenKind::Super,
            TokenKind::This,
            TokenKind::True,
            TokenKind::Var,
            TokenKind::While,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(source), expected);
    }

    #[test]
    fn test_keyword_prefixes_are_identifiers() {
        for word in ["an", "andy", "f", "fa", "fort", "t", "thi", "truth", "variable", "_if"] {
            assert_eq!(kinds(word), vec![TokenKind::Ident, TokenKind::Eof], "{}", word);
        }
    }

    #[test]
    fn test_numbers() {
        let tokens: Vec<_> = Lexer::new("3.14 7. .5").collect();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "3.14");
        // a trailing dot is not part of the number
        assert_eq!(tokens[1].lexeme, "7");
        assert_eq!(tokens[2].kind, TokenKind::Dot);
        assert_eq!(tokens[3].kind, TokenKind::Dot);
        assert_eq!(tokens[4].lexeme, "5");
    }

    #[test]
    fn test_string_spans_lines() {
        let tokens: Vec<_> = Lexer::new("\"a\nb\" x").collect();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, "\"a\nb\"");
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_unterminated_string() {
        let tokens: Vec<_> = Lexer::new("\"abc").collect();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "Unterminated string.");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_unexpected_character_keeps_scanning() {
        let tokens: Vec<_> = Lexer::new("@ x # é").collect();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "Unexpected character.");
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Error);
        assert_eq!(tokens[3].kind, TokenKind::Error);
        assert_eq!(tokens[4].kind, TokenKind::Eof);
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens: Vec<_> = Lexer::new("// comment\nprint 1; // trailing\n\nx").collect();
        assert_eq!(tokens[0].kind, TokenKind::Print);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[3].kind, TokenKind::Ident);
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next(), Some(Token::new(TokenKind::Eof, "", 1)));
        assert_eq!(lexer.next(), None);
    }
}
