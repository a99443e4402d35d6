//! Preprocessor token representation.
//!
//! A [`PpToken`] is the unit everything in this crate works on: the lexer
//! produces them, the iterator threads them between files and macro
//! expansions, and the converter turns the survivors into language tokens.
//!
//! Two flags carry information lost by tokenization and are load-bearing:
//! `at_line_start` gates directive recognition (`#` introduces a directive
//! only as the first token of a line) and ends macro definitions, while
//! `has_space` distinguishes a function-like macro invocation (`F(` with no
//! gap) from a plain identifier followed by a parenthesis.

use std::fmt;

use cinder_util::{Span, Symbol};

/// String and character literal encodings, by prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrEnc {
    /// No prefix.
    Plain,
    /// `L"..."`.
    Wide,
    /// `u8"..."`.
    Utf8,
    /// `u"..."`.
    Utf16,
    /// `U"..."`.
    Utf32,
}

impl StrEnc {
    /// The literal prefix this encoding is written with.
    pub fn prefix(self) -> &'static str {
        match self {
            StrEnc::Plain => "",
            StrEnc::Wide => "L",
            StrEnc::Utf8 => "u8",
            StrEnc::Utf16 => "u",
            StrEnc::Utf32 => "U",
        }
    }
}

/// The C punctuators.
///
/// Digraphs (`<%`, `%>`, `<:`, `:>`, `%:`, `%:%:`) are folded into their
/// primary spelling by the lexer, so downstream stages only ever see one
/// spelling of each punctuator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Question,
    Dot,
    Ellipsis,
    Arrow,
    Inc,
    Dec,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    Amp,
    AmpAmp,
    AmpEq,
    Pipe,
    PipePipe,
    PipeEq,
    Caret,
    CaretEq,
    Tilde,
    Bang,
    BangEq,
    Assign,
    EqEq,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    ShlEq,
    ShrEq,
    Hash,
    HashHash,
}

impl Punct {
    /// The punctuator's primary spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::Comma => ",",
            Punct::Semi => ";",
            Punct::Colon => ":",
            Punct::Question => "?",
            Punct::Dot => ".",
            Punct::Ellipsis => "...",
            Punct::Arrow => "->",
            Punct::Inc => "++",
            Punct::Dec => "--",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::PlusEq => "+=",
            Punct::MinusEq => "-=",
            Punct::StarEq => "*=",
            Punct::SlashEq => "/=",
            Punct::PercentEq => "%=",
            Punct::Amp => "&",
            Punct::AmpAmp => "&&",
            Punct::AmpEq => "&=",
            Punct::Pipe => "|",
            Punct::PipePipe => "||",
            Punct::PipeEq => "|=",
            Punct::Caret => "^",
            Punct::CaretEq => "^=",
            Punct::Tilde => "~",
            Punct::Bang => "!",
            Punct::BangEq => "!=",
            Punct::Assign => "=",
            Punct::EqEq => "==",
            Punct::Lt => "<",
            Punct::Gt => ">",
            Punct::Le => "<=",
            Punct::Ge => ">=",
            Punct::Shl => "<<",
            Punct::Shr => ">>",
            Punct::ShlEq => "<<=",
            Punct::ShrEq => ">>=",
            Punct::Hash => "#",
            Punct::HashHash => "##",
        }
    }
}

/// Spelling table used for greedy longest-match punctuator lexing.
///
/// Ordered by descending spelling length; the first prefix match wins.
/// Digraph rows map to the primary punctuator.
pub(crate) const PUNCT_SPELLINGS: &[(&str, Punct)] = &[
    ("%:%:", Punct::HashHash),
    ("<<=", Punct::ShlEq),
    (">>=", Punct::ShrEq),
    ("...", Punct::Ellipsis),
    ("->", Punct::Arrow),
    ("++", Punct::Inc),
    ("--", Punct::Dec),
    ("<<", Punct::Shl),
    (">>", Punct::Shr),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("==", Punct::EqEq),
    ("!=", Punct::BangEq),
    ("&&", Punct::AmpAmp),
    ("||", Punct::PipePipe),
    ("+=", Punct::PlusEq),
    ("-=", Punct::MinusEq),
    ("*=", Punct::StarEq),
    ("/=", Punct::SlashEq),
    ("%=", Punct::PercentEq),
    ("&=", Punct::AmpEq),
    ("|=", Punct::PipeEq),
    ("^=", Punct::CaretEq),
    ("##", Punct::HashHash),
    ("<:", Punct::LBracket),
    (":>", Punct::RBracket),
    ("<%", Punct::LBrace),
    ("%>", Punct::RBrace),
    ("%:", Punct::Hash),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (";", Punct::Semi),
    (":", Punct::Colon),
    ("?", Punct::Question),
    (".", Punct::Dot),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
    ("~", Punct::Tilde),
    ("!", Punct::Bang),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("#", Punct::Hash),
];

/// Preprocessor token kind and payload.
#[derive(Clone, Debug, PartialEq)]
pub enum PpTokenKind {
    /// Identifier or keyword-shaped word; classification happens later.
    Ident(Symbol),
    /// A pp-number: the raw lexeme, kept unclassified until conversion.
    Number(Symbol),
    /// String literal with decoded contents.
    Str { enc: StrEnc, text: Symbol },
    /// Character constant with decoded code point.
    Char { enc: StrEnc, value: u32 },
    /// Punctuator.
    Punct(Punct),
    /// A byte no rule matched; reported and dropped at conversion.
    Other(char),
    /// End of all input.
    Eof,
}

/// One preprocessor token.
#[derive(Clone, Debug, PartialEq)]
pub struct PpToken {
    pub kind: PpTokenKind,
    pub span: Span,
    /// First non-whitespace token on its line.
    pub at_line_start: bool,
    /// At least one space/tab/comment precedes it on the same line.
    pub has_space: bool,
    /// Macro names painted blue on this token; a listed macro will not
    /// expand here again.
    pub hide: Vec<Symbol>,
}

impl PpToken {
    /// Create a token with cleared flags and an empty hide-set.
    pub fn new(kind: PpTokenKind, span: Span) -> Self {
        Self {
            kind,
            span,
            at_line_start: false,
            has_space: false,
            hide: Vec::new(),
        }
    }

    /// The end-of-input sentinel. `at_line_start` is set so that every
    /// scan-to-end-of-line loop terminates at it.
    pub fn eof(span: Span) -> Self {
        Self {
            kind: PpTokenKind::Eof,
            span,
            at_line_start: true,
            has_space: false,
            hide: Vec::new(),
        }
    }

    /// True for the end-of-input sentinel.
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, PpTokenKind::Eof)
    }

    /// True if this token is the given punctuator.
    #[inline]
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == PpTokenKind::Punct(punct)
    }

    /// The identifier symbol, if this is an identifier.
    #[inline]
    pub fn ident(&self) -> Option<Symbol> {
        match self.kind {
            PpTokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// True if `name` is painted blue on this token.
    pub fn is_hidden(&self, name: Symbol) -> bool {
        self.hide.contains(&name)
    }

    /// Paint `name` blue on this token.
    pub fn hide_name(&mut self, name: Symbol) {
        if !self.hide.contains(&name) {
            self.hide.push(name);
        }
    }
}

impl fmt::Display for PpToken {
    /// Writes the token's lexeme: the exact spelling re-lexing would accept.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PpTokenKind::Ident(name) => write!(f, "{name}"),
            PpTokenKind::Number(raw) => write!(f, "{raw}"),
            PpTokenKind::Str { enc, text } => {
                write!(f, "{}\"", enc.prefix())?;
                write_escaped(f, text.as_str(), '"')?;
                f.write_str("\"")
            }
            PpTokenKind::Char { enc, value } => {
                write!(f, "{}'", enc.prefix())?;
                match char::from_u32(*value) {
                    Some(c) => {
                        let mut buffer = [0u8; 4];
                        write_escaped(f, c.encode_utf8(&mut buffer), '\'')?;
                    }
                    None => write!(f, "\\U{value:08X}")?,
                }
                f.write_str("'")
            }
            PpTokenKind::Punct(punct) => f.write_str(punct.as_str()),
            PpTokenKind::Other(c) => write!(f, "{c}"),
            PpTokenKind::Eof => Ok(()),
        }
    }
}

/// Escape `text` so the lexer decodes it back to the same contents.
fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str, quote: char) -> fmt::Result {
    for c in text.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if c == quote => write!(f, "\\{c}")?,
            c if (c as u32) < 0x20 => write!(f, "\\u{:04X}", c as u32)?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

/// Print a token slice with single spaces between tokens.
///
/// This is the lossy pretty form used by stringize, `#error` messages, and
/// preprocessed output: re-lexing it yields the same token sequence, and
/// printing that sequence again yields the identical string.
pub fn print_tokens<'a>(tokens: impl IntoIterator<Item = &'a PpToken>) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.is_eof() {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    out
}

static_assertions::assert_impl_all!(PpToken: Send, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: PpTokenKind) -> PpToken {
        PpToken::new(kind, Span::DUMMY)
    }

    #[test]
    fn punct_spellings_round_trip() {
        for (spelling, punct) in PUNCT_SPELLINGS {
            // Digraph rows spell differently from their primary form; every
            // primary row must match its own `as_str`.
            if *spelling == punct.as_str() {
                assert_eq!(token(PpTokenKind::Punct(*punct)).to_string(), *spelling);
            }
        }
    }

    #[test]
    fn spelling_table_is_longest_first() {
        let mut previous = usize::MAX;
        for (spelling, _) in PUNCT_SPELLINGS {
            assert!(spelling.len() <= previous);
            previous = spelling.len();
        }
    }

    #[test]
    fn string_display_escapes() {
        let tok = token(PpTokenKind::Str {
            enc: StrEnc::Plain,
            text: Symbol::intern("a\"b\\c\n"),
        });
        assert_eq!(tok.to_string(), r#""a\"b\\c\n""#);

        let wide = token(PpTokenKind::Str {
            enc: StrEnc::Wide,
            text: Symbol::intern("x"),
        });
        assert_eq!(wide.to_string(), "L\"x\"");
    }

    #[test]
    fn char_display() {
        let tok = token(PpTokenKind::Char {
            enc: StrEnc::Plain,
            value: 'A' as u32,
        });
        assert_eq!(tok.to_string(), "'A'");

        let newline = token(PpTokenKind::Char {
            enc: StrEnc::Plain,
            value: '\n' as u32,
        });
        assert_eq!(newline.to_string(), r"'\n'");
    }

    #[test]
    fn print_tokens_single_spaces() {
        let tokens = vec![
            token(PpTokenKind::Ident(Symbol::intern("int"))),
            token(PpTokenKind::Ident(Symbol::intern("x"))),
            token(PpTokenKind::Punct(Punct::Assign)),
            token(PpTokenKind::Number(Symbol::intern("42"))),
            token(PpTokenKind::Punct(Punct::Semi)),
        ];
        assert_eq!(print_tokens(&tokens), "int x = 42 ;");
    }

    #[test]
    fn hide_set() {
        let mut tok = token(PpTokenKind::Ident(Symbol::intern("A")));
        let a = Symbol::intern("A");
        assert!(!tok.is_hidden(a));
        tok.hide_name(a);
        tok.hide_name(a);
        assert!(tok.is_hidden(a));
        assert_eq!(tok.hide.len(), 1);
    }
}
