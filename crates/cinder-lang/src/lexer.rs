//! The Cinder tokenizer.
//!
//! A direct-coded lexer over one source buffer. Multi-character operators
//! are matched longest-first; `//` and `/* */` comments are skipped; string
//! literals decode the usual escapes. Errors are reported to the handler
//! and lexing continues with the next character.

use cinder_util::{Handler, Span, Symbol};

use crate::token::{keyword_from_ident, Token};

/// Multi-character operator spellings, longest first.
const OPERATORS: &[(&str, Token)] = &[
    ("<<=", Token::ShlAssign),
    (">>=", Token::ShrAssign),
    ("::", Token::ColonColon),
    (":=", Token::ColonAssign),
    ("->", Token::Arrow),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("==", Token::EqEq),
    ("!=", Token::NotEq),
    ("<<", Token::Shl),
    (">>", Token::Shr),
    ("+=", Token::PlusAssign),
    ("-=", Token::MinusAssign),
    ("*=", Token::StarAssign),
    ("/=", Token::SlashAssign),
    ("%=", Token::PercentAssign),
    ("&=", Token::AmpAssign),
    ("|=", Token::PipeAssign),
    ("^=", Token::CaretAssign),
    ("&&", Token::AndAnd),
    ("||", Token::OrOr),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    ("&", Token::Amp),
    ("|", Token::Pipe),
    ("^", Token::Caret),
    ("~", Token::Tilde),
    ("!", Token::Bang),
    ("=", Token::Assign),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("(", Token::LParen),
    (")", Token::RParen),
    ("{", Token::LBrace),
    ("}", Token::RBrace),
    ("[", Token::LBracket),
    ("]", Token::RBracket),
    (",", Token::Comma),
    (";", Token::Semi),
    (":", Token::Colon),
    (".", Token::Dot),
];

/// Tokenizer for Cinder source.
pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    line: u32,
    column: u32,
    file: Symbol,
    handler: &'src Handler,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file: Symbol, handler: &'src Handler) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            file,
            handler,
        }
    }

    /// Lex the whole buffer into (token, span) pairs, ending with `Eof`.
    pub fn tokenize(mut self) -> Vec<(Token, Span)> {
        let mut tokens = Vec::new();
        loop {
            let (token, span) = self.next_token();
            let done = token == Token::Eof;
            tokens.push((token, span));
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> (Token, Span) {
        self.skip_trivia();
        let span = self.span_here();
        if self.at_end() {
            return (Token::Eof, span);
        }

        let b = self.byte(0);
        let token = if b.is_ascii_digit() {
            self.lex_number()
        } else if b.is_ascii_alphabetic() || b == b'_' {
            self.lex_identifier()
        } else if b == b'"' {
            self.lex_string(span)
        } else {
            self.lex_operator(span)
        };
        (token, span)
    }

    // ------------------------------------------------------------------

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    #[inline]
    fn byte(&self, offset: usize) -> u8 {
        *self.source.as_bytes().get(self.pos + offset).unwrap_or(&0)
    }

    fn bump(&mut self) {
        let b = self.byte(0);
        if self.at_end() {
            return;
        }
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn span_here(&self) -> Span {
        Span::new(self.file, self.line, self.column, self.pos as u32)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.byte(0) {
                b' ' | b'\t' | b'\r' | b'\n' => self.bump(),
                b'/' if self.byte(1) == b'/' => {
                    while !self.at_end() && self.byte(0) != b'\n' {
                        self.bump();
                    }
                }
                b'/' if self.byte(1) == b'*' => {
                    let open = self.span_here();
                    self.bump_n(2);
                    loop {
                        if self.at_end() {
                            self.handler.error("unterminated block comment", open);
                            return;
                        }
                        if self.byte(0) == b'*' && self.byte(1) == b'/' {
                            self.bump_n(2);
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let mut is_real = false;
        while self.byte(0).is_ascii_digit() || self.byte(0) == b'.' {
            if self.byte(0) == b'.' {
                if !self.byte(1).is_ascii_digit() {
                    break;
                }
                is_real = true;
            }
            self.bump();
        }
        let text = &self.source[start..self.pos];
        if is_real {
            match text.parse::<f64>() {
                Ok(value) => Token::RealLit(value),
                Err(_) => {
                    self.handler
                        .error(format!("invalid real literal '{text}'"), self.span_here());
                    Token::RealLit(0.0)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Token::IntLit(value),
                Err(_) => {
                    self.handler.error(
                        format!("integer literal '{text}' is out of range"),
                        self.span_here(),
                    );
                    Token::IntLit(0)
                }
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos;
        while self.byte(0).is_ascii_alphanumeric() || self.byte(0) == b'_' {
            self.bump();
        }
        let text = &self.source[start..self.pos];
        keyword_from_ident(text).unwrap_or_else(|| Token::Ident(Symbol::intern(text)))
    }

    fn lex_string(&mut self, open: Span) -> Token {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.byte(0) {
                b'"' => {
                    self.bump();
                    break;
                }
                0 if self.at_end() => {
                    self.handler.error("unterminated string literal", open);
                    break;
                }
                b'\n' => {
                    self.handler.error("unterminated string literal", open);
                    break;
                }
                b'\\' => {
                    self.bump();
                    let c = match self.byte(0) {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'\\' => '\\',
                        b'"' => '"',
                        other => {
                            self.handler.warning(
                                format!("unknown escape sequence '\\{}'", other as char),
                                self.span_here(),
                            );
                            other as char
                        }
                    };
                    text.push(c);
                    self.bump();
                }
                _ => {
                    let c = self.source[self.pos..].chars().next().unwrap_or('\0');
                    text.push(c);
                    self.bump_n(c.len_utf8());
                }
            }
        }
        Token::StrLit(Symbol::intern(&text))
    }

    fn lex_operator(&mut self, span: Span) -> Token {
        for (spelling, token) in OPERATORS {
            if self.source[self.pos..].starts_with(spelling) {
                self.bump_n(spelling.len());
                return token.clone();
            }
        }
        let c = self.source[self.pos..].chars().next().unwrap_or('\0');
        self.handler
            .error(format!("unexpected character '{c}'"), span);
        self.bump_n(c.len_utf8().max(1));
        // Resume with whatever follows.
        let (token, _) = self.next_token();
        token
    }
}
