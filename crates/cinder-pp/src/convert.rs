//! Conversion of preprocessor tokens into language tokens.
//!
//! The last stage of the pipeline: identifiers are checked against the
//! keyword table, pp-numbers are classified into integer or floating
//! constants (with base and suffix), and strings, characters, and
//! punctuators pass through. A malformed numeric literal produces a
//! diagnostic and an error token the parser can skip past.

use cinder_util::{Handler, Span, Symbol};

use crate::token::{PpToken, PpTokenKind, Punct, StrEnc};

/// The C keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CKeyword {
    Auto,
    Break,
    Case,
    Char,
    Const,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    Float,
    For,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Register,
    Restrict,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,
    Volatile,
    While,
}

impl CKeyword {
    /// Keyword for an identifier spelling, if it is one.
    pub fn from_ident(name: Symbol) -> Option<CKeyword> {
        Some(match name.as_str() {
            "auto" => CKeyword::Auto,
            "break" => CKeyword::Break,
            "case" => CKeyword::Case,
            "char" => CKeyword::Char,
            "const" => CKeyword::Const,
            "continue" => CKeyword::Continue,
            "default" => CKeyword::Default,
            "do" => CKeyword::Do,
            "double" => CKeyword::Double,
            "else" => CKeyword::Else,
            "enum" => CKeyword::Enum,
            "extern" => CKeyword::Extern,
            "float" => CKeyword::Float,
            "for" => CKeyword::For,
            "goto" => CKeyword::Goto,
            "if" => CKeyword::If,
            "inline" => CKeyword::Inline,
            "int" => CKeyword::Int,
            "long" => CKeyword::Long,
            "register" => CKeyword::Register,
            "restrict" => CKeyword::Restrict,
            "return" => CKeyword::Return,
            "short" => CKeyword::Short,
            "signed" => CKeyword::Signed,
            "sizeof" => CKeyword::Sizeof,
            "static" => CKeyword::Static,
            "struct" => CKeyword::Struct,
            "switch" => CKeyword::Switch,
            "typedef" => CKeyword::Typedef,
            "union" => CKeyword::Union,
            "unsigned" => CKeyword::Unsigned,
            "void" => CKeyword::Void,
            "volatile" => CKeyword::Volatile,
            "while" => CKeyword::While,
            _ => return None,
        })
    }
}

/// Width/signedness suffix of an integer constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntSuffix {
    None,
    U,
    L,
    Ul,
    Ll,
    Ull,
}

/// Precision suffix of a floating constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatSuffix {
    None,
    F,
    L,
}

/// Language token kinds handed to the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum CTokenKind {
    Keyword(CKeyword),
    Ident(Symbol),
    Int {
        value: u64,
        base: u32,
        suffix: IntSuffix,
    },
    Float {
        value: f64,
        suffix: FloatSuffix,
    },
    Str {
        enc: StrEnc,
        text: Symbol,
    },
    Char {
        enc: StrEnc,
        value: u32,
    },
    Punct(Punct),
    /// Produced for malformed literals; parsers skip it.
    Error,
}

/// One language token.
#[derive(Clone, Debug, PartialEq)]
pub struct CToken {
    pub kind: CTokenKind,
    pub span: Span,
}

/// Convert one preprocessor token. `None` filters the token out (EOF and
/// already-reported stray bytes).
pub fn convert(token: &PpToken, handler: &Handler) -> Option<CToken> {
    let kind = match &token.kind {
        PpTokenKind::Ident(name) => match CKeyword::from_ident(*name) {
            Some(keyword) => CTokenKind::Keyword(keyword),
            None => CTokenKind::Ident(*name),
        },
        PpTokenKind::Number(raw) => match classify_number(raw.as_str()) {
            Ok(kind) => kind,
            Err(message) => {
                handler.error(message, token.span);
                CTokenKind::Error
            }
        },
        PpTokenKind::Str { enc, text } => CTokenKind::Str {
            enc: *enc,
            text: *text,
        },
        PpTokenKind::Char { enc, value } => CTokenKind::Char {
            enc: *enc,
            value: *value,
        },
        PpTokenKind::Punct(punct) => CTokenKind::Punct(*punct),
        // Stray bytes were reported at lex time; drop them here.
        PpTokenKind::Other(_) => return None,
        PpTokenKind::Eof => return None,
    };
    Some(CToken {
        kind,
        span: token.span,
    })
}

/// Classify a pp-number lexeme into an integer or floating constant.
pub(crate) fn classify_number(text: &str) -> Result<CTokenKind, String> {
    let is_hex = text.starts_with("0x") || text.starts_with("0X");
    let is_float = if is_hex {
        text.contains('.') || text[2..].contains(['p', 'P'])
    } else {
        text.contains('.') || text.contains(['e', 'E'])
    };
    if is_float {
        classify_float(text, is_hex)
    } else {
        classify_int(text)
    }
}

fn classify_int(text: &str) -> Result<CTokenKind, String> {
    let (base, digits_and_suffix) = if let Some(rest) =
        text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
    {
        (16, rest)
    } else if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (2, rest)
    } else if text.len() > 1 && text.starts_with('0') {
        (8, &text[1..])
    } else {
        (10, text)
    };

    let suffix_start = digits_and_suffix
        .find(|c: char| !c.is_digit(base))
        .unwrap_or(digits_and_suffix.len());
    let (mut digits, suffix_text) = digits_and_suffix.split_at(suffix_start);

    if digits.is_empty() {
        if base == 8 {
            // A bare `0` with a suffix: the stripped leading zero is the
            // whole number.
            digits = "0";
        } else {
            return Err(format!("invalid integer constant '{text}'"));
        }
    }
    let suffix = parse_int_suffix(suffix_text)
        .ok_or_else(|| format!("invalid suffix '{suffix_text}' on integer constant"))?;
    let value = u64::from_str_radix(digits, base)
        .map_err(|_| format!("integer constant '{text}' is out of range"))?;
    Ok(CTokenKind::Int {
        value,
        base,
        suffix,
    })
}

fn parse_int_suffix(text: &str) -> Option<IntSuffix> {
    Some(match text.to_ascii_lowercase().as_str() {
        "" => IntSuffix::None,
        "u" => IntSuffix::U,
        "l" => IntSuffix::L,
        "ul" | "lu" => IntSuffix::Ul,
        "ll" => IntSuffix::Ll,
        "ull" | "llu" => IntSuffix::Ull,
        _ => return None,
    })
}

fn classify_float(text: &str, is_hex: bool) -> Result<CTokenKind, String> {
    let (body, suffix) = match text.chars().last() {
        Some('f') | Some('F') => (&text[..text.len() - 1], FloatSuffix::F),
        Some('l') | Some('L') => (&text[..text.len() - 1], FloatSuffix::L),
        _ => (text, FloatSuffix::None),
    };
    let value = if is_hex {
        parse_hex_float(body).ok_or_else(|| format!("invalid floating constant '{text}'"))?
    } else {
        body.parse::<f64>()
            .map_err(|_| format!("invalid floating constant '{text}'"))?
    };
    if !value.is_finite() {
        return Err(format!("floating constant '{text}' is out of range"));
    }
    Ok(CTokenKind::Float { value, suffix })
}

/// Parse a hexadecimal floating constant: `0x` hex-digits [`.` hex-digits]
/// `p`±dec-digits.
fn parse_hex_float(text: &str) -> Option<f64> {
    let body = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    let (mantissa_text, exponent_text) = match body.find(['p', 'P']) {
        Some(i) => (&body[..i], &body[i + 1..]),
        // A hex constant with '.' but no exponent is malformed in C.
        None => return None,
    };
    let (int_part, frac_part) = match mantissa_text.find('.') {
        Some(i) => (&mantissa_text[..i], &mantissa_text[i + 1..]),
        None => (mantissa_text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut mantissa = 0.0f64;
    for c in int_part.chars() {
        mantissa = mantissa * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        mantissa += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    let exponent: i32 = exponent_text.parse().ok()?;
    Some(mantissa * 2f64.powi(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(kind: PpTokenKind) -> PpToken {
        PpToken::new(kind, Span::DUMMY)
    }

    fn number(text: &str) -> PpToken {
        pp(PpTokenKind::Number(Symbol::intern(text)))
    }

    fn convert_ok(token: &PpToken) -> CTokenKind {
        let handler = Handler::new();
        let converted = convert(token, &handler).unwrap();
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        converted.kind
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            convert_ok(&pp(PpTokenKind::Ident(Symbol::intern("while")))),
            CTokenKind::Keyword(CKeyword::While)
        );
        assert_eq!(
            convert_ok(&pp(PpTokenKind::Ident(Symbol::intern("whilex")))),
            CTokenKind::Ident(Symbol::intern("whilex"))
        );
    }

    #[test]
    fn integer_bases() {
        assert_eq!(
            convert_ok(&number("42")),
            CTokenKind::Int {
                value: 42,
                base: 10,
                suffix: IntSuffix::None
            }
        );
        assert_eq!(
            convert_ok(&number("0xFF")),
            CTokenKind::Int {
                value: 255,
                base: 16,
                suffix: IntSuffix::None
            }
        );
        assert_eq!(
            convert_ok(&number("0b1010")),
            CTokenKind::Int {
                value: 10,
                base: 2,
                suffix: IntSuffix::None
            }
        );
        assert_eq!(
            convert_ok(&number("0777")),
            CTokenKind::Int {
                value: 0o777,
                base: 8,
                suffix: IntSuffix::None
            }
        );
    }

    #[test]
    fn integer_suffixes() {
        assert_eq!(
            convert_ok(&number("1u")),
            CTokenKind::Int {
                value: 1,
                base: 10,
                suffix: IntSuffix::U
            }
        );
        assert_eq!(
            convert_ok(&number("0L")),
            CTokenKind::Int {
                value: 0,
                base: 8,
                suffix: IntSuffix::L
            }
        );
        assert_eq!(
            convert_ok(&number("2ULL")),
            CTokenKind::Int {
                value: 2,
                base: 10,
                suffix: IntSuffix::Ull
            }
        );
        assert_eq!(
            convert_ok(&number("0x1fLL")),
            CTokenKind::Int {
                value: 31,
                base: 16,
                suffix: IntSuffix::Ll
            }
        );
    }

    #[test]
    fn floats() {
        assert_eq!(
            convert_ok(&number("3.5")),
            CTokenKind::Float {
                value: 3.5,
                suffix: FloatSuffix::None
            }
        );
        assert_eq!(
            convert_ok(&number("1e3f")),
            CTokenKind::Float {
                value: 1000.0,
                suffix: FloatSuffix::F
            }
        );
        assert_eq!(
            convert_ok(&number("0x1p-2")),
            CTokenKind::Float {
                value: 0.25,
                suffix: FloatSuffix::None
            }
        );
        assert_eq!(
            convert_ok(&number("0x1.8p1")),
            CTokenKind::Float {
                value: 3.0,
                suffix: FloatSuffix::None
            }
        );
    }

    #[test]
    fn bad_literals_become_error_tokens() {
        for bad in ["0x", "1uu", "12abc", "18446744073709551616"] {
            let handler = Handler::new();
            let converted = convert(&number(bad), &handler).unwrap();
            assert_eq!(converted.kind, CTokenKind::Error, "literal {bad:?}");
            assert!(handler.has_errors(), "literal {bad:?}");
        }
    }

    #[test]
    fn passthrough_kinds() {
        assert_eq!(
            convert_ok(&pp(PpTokenKind::Punct(Punct::Semi))),
            CTokenKind::Punct(Punct::Semi)
        );
        assert_eq!(
            convert_ok(&pp(PpTokenKind::Char {
                enc: StrEnc::Plain,
                value: 65
            })),
            CTokenKind::Char {
                enc: StrEnc::Plain,
                value: 65
            }
        );
    }

    #[test]
    fn stray_bytes_are_filtered() {
        let handler = Handler::new();
        assert!(convert(&pp(PpTokenKind::Other('@')), &handler).is_none());
    }
}
