//! The preprocessor lexer.
//!
//! Converts one contiguous source buffer into [`PpToken`]s, one call at a
//! time. The lexer owns the two token flags: whitespace and comments set
//! `has_space` on the following token, newlines set `at_line_start` and
//! reset the column. Line continuations (backslash-newline) splice physical
//! lines without touching either flag.
//!
//! At each position the rules are tried in order: whitespace, newline, line
//! continuation, comments, then string/char prefixes, identifiers,
//! pp-numbers, literals, and greedy longest-match punctuators. A byte no
//! rule matches becomes an [`PpTokenKind::Other`] token plus a diagnostic;
//! an unterminated comment or literal reports and degrades to end-of-input.

use cinder_util::{Handler, Span, Symbol};

use crate::token::{PpToken, PpTokenKind, StrEnc, PUNCT_SPELLINGS};

#[inline]
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Lexer over one file's bytes.
///
/// Restartable only by constructing a new lexer on a new buffer.
pub struct PpLexer<'src> {
    source: &'src str,
    pos: usize,
    /// Physical line (1-based), counting newlines in the buffer.
    physical_line: u32,
    /// Column (1-based, bytes).
    column: u32,
    /// `#line` adjustment: reported line = physical line + delta.
    line_delta: i64,
    /// Reported file name; `#line` may override it.
    file: Symbol,
    handler: &'src Handler,
    /// Flags accumulated for the next token.
    pending_line_start: bool,
    pending_space: bool,
    /// Set on unterminated constructs; the lexer then reports end-of-input.
    done: bool,
}

impl<'src> PpLexer<'src> {
    /// Create a lexer over `source`, reporting locations under `file`.
    pub fn new(source: &'src str, file: Symbol, handler: &'src Handler) -> Self {
        Self {
            source,
            pos: 0,
            physical_line: 1,
            column: 1,
            line_delta: 0,
            file,
            handler,
            // The first token of a file is at the start of its line.
            pending_line_start: true,
            pending_space: false,
            done: false,
        }
    }

    /// Produce the next token; end-of-input yields `Eof` forever.
    pub fn next_token(&mut self) -> PpToken {
        if self.done {
            return PpToken::eof(self.span_here());
        }

        self.skip_trivia();

        let span = self.span_here();
        let at_line_start = std::mem::take(&mut self.pending_line_start);
        let has_space = std::mem::take(&mut self.pending_space);

        if self.at_end() {
            let mut eof = PpToken::eof(span);
            eof.has_space = has_space;
            return eof;
        }

        let kind = self.lex_kind();
        let mut token = PpToken::new(kind, span);
        token.at_line_start = at_line_start;
        token.has_space = has_space;
        if self.done {
            // An unterminated literal degrades to end-of-input.
            return PpToken::eof(span);
        }
        token
    }

    /// Apply a `#line` override: subsequent spans report
    /// `physical + delta`, optionally under a new file name.
    pub(crate) fn set_reported(&mut self, delta: i64, file: Option<Symbol>) {
        self.line_delta = delta;
        if let Some(file) = file {
            self.file = file;
        }
    }

    /// Current `#line` delta.
    pub(crate) fn line_delta(&self) -> i64 {
        self.line_delta
    }

    // ------------------------------------------------------------------
    // Cursor primitives
    // ------------------------------------------------------------------

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    #[inline]
    fn byte(&self, offset: usize) -> u8 {
        *self.source.as_bytes().get(self.pos + offset).unwrap_or(&0)
    }

    /// Advance one byte, tracking line and column.
    #[inline]
    fn bump(&mut self) {
        let b = self.byte(0);
        if b == 0 && self.at_end() {
            return;
        }
        self.pos += 1;
        if b == b'\n' {
            self.physical_line += 1;
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

    /// Decode the UTF-8 character at the cursor.
    fn char_here(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn span_here(&self) -> Span {
        let line = (self.physical_line as i64 + self.line_delta).max(0) as u32;
        Span::new(self.file, line, self.column, self.pos as u32)
    }

    // ------------------------------------------------------------------
    // Trivia: whitespace, newlines, continuations, comments
    // ------------------------------------------------------------------

    fn skip_trivia(&mut self) {
        loop {
            match self.byte(0) {
                b' ' | b'\t' | 0x0B | 0x0C => {
                    self.pending_space = true;
                    self.bump();
                }
                b'\r' if self.byte(1) == b'\n' => {
                    self.bump();
                    self.bump();
                    self.pending_line_start = true;
                    self.pending_space = false;
                }
                b'\n' => {
                    self.bump();
                    self.pending_line_start = true;
                    self.pending_space = false;
                }
                // Line continuation: splice without flagging.
                b'\\' if self.byte(1) == b'\n' => {
                    self.bump();
                    self.bump();
                }
                b'\\' if self.byte(1) == b'\r' && self.byte(2) == b'\n' => {
                    self.bump_n(3);
                }
                b'/' if self.byte(1) == b'/' => {
                    while !self.at_end() && self.byte(0) != b'\n' {
                        self.bump();
                    }
                    self.pending_space = true;
                }
                b'/' if self.byte(1) == b'*' => {
                    self.skip_block_comment();
                    self.pending_space = true;
                }
                _ => break,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let open = self.span_here();
        self.bump();
        self.bump();
        loop {
            if self.at_end() {
                self.handler.error("unterminated block comment", open);
                self.done = true;
                return;
            }
            if self.byte(0) == b'*' && self.byte(1) == b'/' {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Token dispatch
    // ------------------------------------------------------------------

    fn lex_kind(&mut self) -> PpTokenKind {
        let b = self.byte(0);

        // Encoding prefixes bind tighter than identifiers.
        match (b, self.byte(1), self.byte(2)) {
            (b'u', b'8', b'"') => {
                self.bump_n(2);
                return self.lex_string(StrEnc::Utf8);
            }
            (b'u', b'8', b'\'') => {
                self.bump_n(2);
                return self.lex_char(StrEnc::Utf8);
            }
            (b'u', b'"', _) => {
                self.bump();
                return self.lex_string(StrEnc::Utf16);
            }
            (b'u', b'\'', _) => {
                self.bump();
                return self.lex_char(StrEnc::Utf16);
            }
            (b'U', b'"', _) => {
                self.bump();
                return self.lex_string(StrEnc::Utf32);
            }
            (b'U', b'\'', _) => {
                self.bump();
                return self.lex_char(StrEnc::Utf32);
            }
            (b'L', b'"', _) => {
                self.bump();
                return self.lex_string(StrEnc::Wide);
            }
            (b'L', b'\'', _) => {
                self.bump();
                return self.lex_char(StrEnc::Wide);
            }
            _ => {}
        }

        if b == b'"' {
            return self.lex_string(StrEnc::Plain);
        }
        if b == b'\'' {
            return self.lex_char(StrEnc::Plain);
        }
        if is_ident_start(b) || (b == b'\\' && matches!(self.byte(1), b'u' | b'U')) {
            return self.lex_identifier();
        }
        if b.is_ascii_digit() || (b == b'.' && self.byte(1).is_ascii_digit()) {
            return self.lex_number();
        }

        for (spelling, punct) in PUNCT_SPELLINGS {
            if self.source[self.pos..].starts_with(spelling) {
                self.bump_n(spelling.len());
                return PpTokenKind::Punct(*punct);
            }
        }

        let c = self.char_here();
        self.handler
            .error(format!("unexpected character '{c}'"), self.span_here());
        self.bump_n(c.len_utf8());
        PpTokenKind::Other(c)
    }

    /// Identifiers: `[A-Za-z_][A-Za-z0-9_]*` plus universal character names.
    fn lex_identifier(&mut self) -> PpTokenKind {
        let start = self.pos;
        let mut decoded: Option<String> = None;
        loop {
            let b = self.byte(0);
            if is_ident_continue(b) {
                if let Some(s) = decoded.as_mut() {
                    s.push(b as char);
                }
                self.bump();
            } else if b == b'\\' && matches!(self.byte(1), b'u' | b'U') {
                // Switch to the decoded buffer on the first UCN.
                let mut s =
                    decoded.unwrap_or_else(|| self.source[start..self.pos].to_owned());
                self.bump();
                let c = self.lex_ucn();
                s.push(c);
                decoded = Some(s);
            } else {
                break;
            }
        }
        let name = match decoded {
            Some(s) => Symbol::intern(&s),
            None => Symbol::intern(&self.source[start..self.pos]),
        };
        PpTokenKind::Ident(name)
    }

    /// A universal character name after its backslash: `uXXXX` or
    /// `UXXXXXXXX`.
    fn lex_ucn(&mut self) -> char {
        let span = self.span_here();
        let digits = if self.byte(0) == b'u' { 4 } else { 8 };
        self.bump();
        let mut value: u32 = 0;
        for _ in 0..digits {
            match (self.byte(0) as char).to_digit(16) {
                Some(d) => {
                    value = value.wrapping_mul(16).wrapping_add(d);
                    self.bump();
                }
                None => {
                    self.handler
                        .error("incomplete universal character name", span);
                    break;
                }
            }
        }
        char::from_u32(value).unwrap_or_else(|| {
            self.handler
                .error(format!("invalid universal character name \\u{value:X}"), span);
            char::REPLACEMENT_CHARACTER
        })
    }

    /// The C pp-number production: leading digit or `.digit`, then any run
    /// of digits, letters, `.`, and sign-suffixed exponents.
    fn lex_number(&mut self) -> PpTokenKind {
        let start = self.pos;
        self.bump();
        loop {
            let b = self.byte(0);
            if matches!(b, b'e' | b'E' | b'p' | b'P') && matches!(self.byte(1), b'+' | b'-') {
                self.bump();
                self.bump();
            } else if is_ident_continue(b) || b == b'.' {
                self.bump();
            } else {
                break;
            }
        }
        PpTokenKind::Number(Symbol::intern(&self.source[start..self.pos]))
    }

    fn lex_string(&mut self, enc: StrEnc) -> PpTokenKind {
        let open = self.span_here();
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.byte(0) {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\n' => {
                    self.handler.error("unterminated string literal", open);
                    self.done = true;
                    break;
                }
                0 if self.at_end() => {
                    self.handler.error("unterminated string literal", open);
                    self.done = true;
                    break;
                }
                b'\\' => {
                    self.bump();
                    text.push(self.lex_escape());
                }
                _ => {
                    let c = self.char_here();
                    text.push(c);
                    self.bump_n(c.len_utf8());
                }
            }
        }
        PpTokenKind::Str {
            enc,
            text: Symbol::intern(&text),
        }
    }

    fn lex_char(&mut self, enc: StrEnc) -> PpTokenKind {
        let open = self.span_here();
        self.bump(); // opening quote
        let mut chars: Vec<char> = Vec::new();
        loop {
            match self.byte(0) {
                b'\'' => {
                    self.bump();
                    break;
                }
                b'\n' => {
                    self.handler.error("unterminated character constant", open);
                    self.done = true;
                    break;
                }
                0 if self.at_end() => {
                    self.handler.error("unterminated character constant", open);
                    self.done = true;
                    break;
                }
                b'\\' => {
                    self.bump();
                    let c = self.lex_escape();
                    chars.push(c);
                }
                _ => {
                    let c = self.char_here();
                    chars.push(c);
                    self.bump_n(c.len_utf8());
                }
            }
        }
        let value = match chars.len() {
            0 => {
                if !self.done {
                    self.handler.error("empty character constant", open);
                }
                0
            }
            1 => chars[0] as u32,
            _ => {
                self.handler
                    .warning("multi-character character constant", open);
                chars[0] as u32
            }
        };
        PpTokenKind::Char { enc, value }
    }

    /// An escape sequence after its backslash.
    fn lex_escape(&mut self) -> char {
        let span = self.span_here();
        let b = self.byte(0);
        match b {
            b'n' => {
                self.bump();
                '\n'
            }
            b't' => {
                self.bump();
                '\t'
            }
            b'r' => {
                self.bump();
                '\r'
            }
            b'a' => {
                self.bump();
                '\x07'
            }
            b'b' => {
                self.bump();
                '\x08'
            }
            b'f' => {
                self.bump();
                '\x0C'
            }
            b'v' => {
                self.bump();
                '\x0B'
            }
            b'\\' | b'\'' | b'"' | b'?' => {
                self.bump();
                b as char
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                for _ in 0..3 {
                    match self.byte(0) {
                        d @ b'0'..=b'7' => {
                            value = value * 8 + (d - b'0') as u32;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            b'x' => {
                self.bump();
                let mut value: u32 = 0;
                let mut any = false;
                while let Some(d) = (self.byte(0) as char).to_digit(16) {
                    value = value.wrapping_mul(16).wrapping_add(d);
                    any = true;
                    self.bump();
                }
                if !any {
                    self.handler.error("\\x used with no following hex digits", span);
                }
                char::from_u32(value).unwrap_or_else(|| {
                    self.handler
                        .error(format!("hex escape \\x{value:X} out of range"), span);
                    char::REPLACEMENT_CHARACTER
                })
            }
            b'u' | b'U' => self.lex_ucn(),
            _ => {
                let c = self.char_here();
                self.handler
                    .warning(format!("unknown escape sequence '\\{c}'"), span);
                self.bump_n(c.len_utf8());
                c
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Punct;

    fn lex_all(source: &str) -> (Vec<PpToken>, Handler) {
        let handler = Handler::new();
        let mut tokens = Vec::new();
        // The handler outlives the lexer inside this scope.
        {
            let mut lexer = PpLexer::new(source, Symbol::intern("test.c"), &handler);
            loop {
                let token = lexer.next_token();
                let eof = token.is_eof();
                tokens.push(token);
                if eof {
                    break;
                }
            }
        }
        (tokens, handler)
    }

    fn kinds(source: &str) -> Vec<PpTokenKind> {
        let (tokens, handler) = lex_all(source);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        tokens
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, PpTokenKind::Eof))
            .collect()
    }

    fn ident(name: &str) -> PpTokenKind {
        PpTokenKind::Ident(Symbol::intern(name))
    }

    fn number(raw: &str) -> PpTokenKind {
        PpTokenKind::Number(Symbol::intern(raw))
    }

    #[test]
    fn identifiers_and_numbers() {
        assert_eq!(
            kinds("int x2 = 42;"),
            vec![
                ident("int"),
                ident("x2"),
                PpTokenKind::Punct(Punct::Assign),
                number("42"),
                PpTokenKind::Punct(Punct::Semi),
            ]
        );
    }

    #[test]
    fn pp_number_shapes() {
        assert_eq!(
            kinds("1.5e+10 0x1p-3 .5 0b1010 12ull"),
            vec![
                number("1.5e+10"),
                number("0x1p-3"),
                number(".5"),
                number("0b1010"),
                number("12ull"),
            ]
        );
    }

    #[test]
    fn flags_track_lines_and_spaces() {
        let (tokens, _) = lex_all("a b\n  c");
        assert!(tokens[0].at_line_start);
        assert!(!tokens[0].has_space);
        assert!(!tokens[1].at_line_start);
        assert!(tokens[1].has_space);
        assert!(tokens[2].at_line_start);
        assert!(tokens[2].has_space);
    }

    #[test]
    fn function_like_adjacency_flag() {
        let (tokens, _) = lex_all("F(x) G (y)");
        assert!(!tokens[1].has_space, "F( must have no gap");
        assert!(tokens[5].has_space, "G ( must record the gap");
    }

    #[test]
    fn line_continuation_splices() {
        let (tokens, _) = lex_all("ab\\\ncd efg");
        // The continuation splices the physical lines; `cd` neither starts a
        // line nor gains a space.
        assert_eq!(tokens[1].kind, ident("cd"));
        assert!(!tokens[1].at_line_start);
        assert_eq!(tokens[2].span.line, 2);
    }

    #[test]
    fn comments_count_as_space() {
        let (tokens, _) = lex_all("a/*x*/b // tail\nc");
        assert_eq!(tokens[1].kind, ident("b"));
        assert!(tokens[1].has_space);
        assert!(tokens[2].at_line_start);
        assert_eq!(tokens[2].span.line, 2);
    }

    #[test]
    fn multiline_comment_keeps_line_count() {
        let (tokens, _) = lex_all("/* one\ntwo\nthree */ x");
        assert_eq!(tokens[0].span.line, 3);
    }

    #[test]
    fn unterminated_comment_reports() {
        let (tokens, handler) = lex_all("a /* never closed");
        assert!(handler.has_errors());
        assert!(tokens.last().unwrap().is_eof());
    }

    #[test]
    fn string_escapes_decode() {
        let kinds = kinds(r#""a\tb\x41\"" 'q' '\n'"#);
        assert_eq!(
            kinds[0],
            PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: Symbol::intern("a\tbA\""),
            }
        );
        assert_eq!(
            kinds[1],
            PpTokenKind::Char {
                enc: StrEnc::Plain,
                value: 'q' as u32
            }
        );
        assert_eq!(
            kinds[2],
            PpTokenKind::Char {
                enc: StrEnc::Plain,
                value: '\n' as u32
            }
        );
    }

    #[test]
    fn encoding_prefixes() {
        let kinds = kinds(r#"u8"a" u"b" U"c" L"d" u8x"#);
        assert!(matches!(kinds[0], PpTokenKind::Str { enc: StrEnc::Utf8, .. }));
        assert!(matches!(kinds[1], PpTokenKind::Str { enc: StrEnc::Utf16, .. }));
        assert!(matches!(kinds[2], PpTokenKind::Str { enc: StrEnc::Utf32, .. }));
        assert!(matches!(kinds[3], PpTokenKind::Str { enc: StrEnc::Wide, .. }));
        assert_eq!(kinds[4], ident("u8x"));
    }

    #[test]
    fn unterminated_string_reports() {
        let (tokens, handler) = lex_all("\"no end");
        assert!(handler.has_errors());
        assert!(tokens.last().unwrap().is_eof());
    }

    #[test]
    fn greedy_punctuators() {
        assert_eq!(
            kinds("a <<= b >>= c ... ## #"),
            vec![
                ident("a"),
                PpTokenKind::Punct(Punct::ShlEq),
                ident("b"),
                PpTokenKind::Punct(Punct::ShrEq),
                ident("c"),
                PpTokenKind::Punct(Punct::Ellipsis),
                PpTokenKind::Punct(Punct::HashHash),
                PpTokenKind::Punct(Punct::Hash),
            ]
        );
    }

    #[test]
    fn digraphs_normalize() {
        assert_eq!(
            kinds("<% %> <: :> %: %:%:"),
            vec![
                PpTokenKind::Punct(Punct::LBrace),
                PpTokenKind::Punct(Punct::RBrace),
                PpTokenKind::Punct(Punct::LBracket),
                PpTokenKind::Punct(Punct::RBracket),
                PpTokenKind::Punct(Punct::Hash),
                PpTokenKind::Punct(Punct::HashHash),
            ]
        );
    }

    #[test]
    fn ucn_identifier() {
        assert_eq!(kinds(r"a\u00E9b"), vec![ident("a\u{e9}b")]);
    }

    #[test]
    fn stray_byte_reports_other() {
        let (tokens, handler) = lex_all("a @ b");
        assert!(handler.has_errors());
        assert_eq!(tokens[1].kind, PpTokenKind::Other('@'));
    }

    #[test]
    fn spans_point_into_the_file() {
        let (tokens, _) = lex_all("ab cd\nef");
        assert_eq!((tokens[0].span.line, tokens[0].span.column), (1, 1));
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (1, 4));
        assert_eq!((tokens[2].span.line, tokens[2].span.column), (2, 1));
        assert_eq!(tokens[2].span.offset, 6);
    }

    #[test]
    fn line_override_applies() {
        let handler = Handler::new();
        let mut lexer = PpLexer::new("a\nb", Symbol::intern("real.c"), &handler);
        let a = lexer.next_token();
        assert_eq!(a.span.line, 1);
        lexer.set_reported(99, Some(Symbol::intern("virtual.c")));
        let b = lexer.next_token();
        assert_eq!(b.span.line, 101);
        assert_eq!(b.span.file.as_str(), "virtual.c");
    }
}
