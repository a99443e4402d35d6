//! `#if`/`#elif` constant-expression evaluation.
//!
//! Operates on the directive's tokens after `defined` replacement and macro
//! expansion. Values are signed 64-bit; the full C operator set is
//! supported at C precedence, including the ternary. Identifiers that
//! survive expansion evaluate to 0 (not an error), and division or modulus
//! by zero reports a diagnostic and yields 0.
//!
//! `&&`, `||`, and `?:` evaluate both sides syntactically but suppress
//! division diagnostics in the branch that is not taken, so guards like
//! `x && 1 / x` behave.

use cinder_util::{Handler, Span};

use crate::convert::{classify_number, CTokenKind};
use crate::token::{PpToken, PpTokenKind, Punct};

/// Evaluate a directive expression to its truth value.
pub fn eval_condition(tokens: &[PpToken], handler: &Handler, span: Span) -> bool {
    if tokens.is_empty() {
        handler.error("expected expression after directive", span);
        return false;
    }
    let mut eval = Eval {
        tokens,
        pos: 0,
        handler,
        span,
    };
    let value = eval.ternary(true);
    if eval.pos < eval.tokens.len() {
        handler.error(
            format!(
                "unexpected token '{}' in preprocessor expression",
                eval.tokens[eval.pos]
            ),
            eval.tokens[eval.pos].span,
        );
    }
    value != 0
}

struct Eval<'a> {
    tokens: &'a [PpToken],
    pos: usize,
    handler: &'a Handler,
    /// The directive's location, for end-of-expression diagnostics.
    span: Span,
}

/// Binding strength of a binary operator; higher binds tighter.
fn precedence(punct: Punct) -> Option<u8> {
    Some(match punct {
        Punct::PipePipe => 1,
        Punct::AmpAmp => 2,
        Punct::Pipe => 3,
        Punct::Caret => 4,
        Punct::Amp => 5,
        Punct::EqEq | Punct::BangEq => 6,
        Punct::Lt | Punct::Le | Punct::Gt | Punct::Ge => 7,
        Punct::Shl | Punct::Shr => 8,
        Punct::Plus | Punct::Minus => 9,
        Punct::Star | Punct::Slash | Punct::Percent => 10,
        _ => return None,
    })
}

impl<'a> Eval<'a> {
    fn peek_punct(&self) -> Option<Punct> {
        match self.tokens.get(self.pos).map(|t| &t.kind) {
            Some(PpTokenKind::Punct(p)) => Some(*p),
            _ => None,
        }
    }

    fn here(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(self.span)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// `cond ? a : b`, right-associative, lowest precedence.
    fn ternary(&mut self, live: bool) -> i64 {
        let condition = self.binary(1, live);
        if self.peek_punct() == Some(Punct::Question) {
            self.bump();
            let then_value = self.ternary(live && condition != 0);
            if self.peek_punct() == Some(Punct::Colon) {
                self.bump();
            } else {
                self.handler
                    .error("expected ':' in preprocessor expression", self.here());
            }
            let else_value = self.ternary(live && condition == 0);
            return if condition != 0 { then_value } else { else_value };
        }
        condition
    }

    /// Precedence climbing over the binary operators.
    fn binary(&mut self, min_prec: u8, live: bool) -> i64 {
        let mut lhs = self.unary(live);
        while let Some(op) = self.peek_punct() {
            let Some(prec) = precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs_live = match op {
                Punct::AmpAmp => live && lhs != 0,
                Punct::PipePipe => live && lhs == 0,
                _ => live,
            };
            let op_span = self.here();
            let rhs = self.binary(prec + 1, rhs_live);
            lhs = self.apply(op, lhs, rhs, live, op_span);
        }
        lhs
    }

    fn apply(&self, op: Punct, lhs: i64, rhs: i64, live: bool, span: Span) -> i64 {
        match op {
            Punct::PipePipe => ((lhs != 0) || (rhs != 0)) as i64,
            Punct::AmpAmp => ((lhs != 0) && (rhs != 0)) as i64,
            Punct::Pipe => lhs | rhs,
            Punct::Caret => lhs ^ rhs,
            Punct::Amp => lhs & rhs,
            Punct::EqEq => (lhs == rhs) as i64,
            Punct::BangEq => (lhs != rhs) as i64,
            Punct::Lt => (lhs < rhs) as i64,
            Punct::Le => (lhs <= rhs) as i64,
            Punct::Gt => (lhs > rhs) as i64,
            Punct::Ge => (lhs >= rhs) as i64,
            Punct::Shl => lhs.wrapping_shl(rhs as u32 & 63),
            Punct::Shr => lhs.wrapping_shr(rhs as u32 & 63),
            Punct::Plus => lhs.wrapping_add(rhs),
            Punct::Minus => lhs.wrapping_sub(rhs),
            Punct::Star => lhs.wrapping_mul(rhs),
            Punct::Slash => {
                if rhs == 0 {
                    if live {
                        self.handler
                            .error("division by zero in preprocessor expression", span);
                    }
                    0
                } else {
                    lhs.wrapping_div(rhs)
                }
            }
            Punct::Percent => {
                if rhs == 0 {
                    if live {
                        self.handler
                            .error("modulus by zero in preprocessor expression", span);
                    }
                    0
                } else {
                    lhs.wrapping_rem(rhs)
                }
            }
            _ => unreachable!("non-binary operator in apply"),
        }
    }

    fn unary(&mut self, live: bool) -> i64 {
        match self.peek_punct() {
            Some(Punct::Plus) => {
                self.bump();
                self.unary(live)
            }
            Some(Punct::Minus) => {
                self.bump();
                self.unary(live).wrapping_neg()
            }
            Some(Punct::Bang) => {
                self.bump();
                (self.unary(live) == 0) as i64
            }
            Some(Punct::Tilde) => {
                self.bump();
                !self.unary(live)
            }
            _ => self.primary(live),
        }
    }

    fn primary(&mut self, live: bool) -> i64 {
        let Some(token) = self.tokens.get(self.pos) else {
            self.handler
                .error("expected expression in preprocessor condition", self.span);
            return 0;
        };
        match &token.kind {
            PpTokenKind::Number(raw) => {
                let span = token.span;
                self.bump();
                match classify_number(raw.as_str()) {
                    Ok(CTokenKind::Int { value, .. }) => value as i64,
                    Ok(_) => {
                        self.handler
                            .error("floating constant in preprocessor expression", span);
                        0
                    }
                    Err(message) => {
                        self.handler.error(message, span);
                        0
                    }
                }
            }
            PpTokenKind::Char { value, .. } => {
                self.bump();
                *value as i64
            }
            // Identifiers remaining after expansion evaluate to 0.
            PpTokenKind::Ident(_) => {
                self.bump();
                0
            }
            PpTokenKind::Punct(Punct::LParen) => {
                self.bump();
                let value = self.ternary(live);
                if self.peek_punct() == Some(Punct::RParen) {
                    self.bump();
                } else {
                    self.handler
                        .error("expected ')' in preprocessor expression", self.here());
                }
                value
            }
            _ => {
                self.handler.error(
                    format!("unexpected token '{token}' in preprocessor expression"),
                    token.span,
                );
                self.bump();
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_util::Symbol;

    fn tokens(source: &str) -> Vec<PpToken> {
        let handler = Handler::new();
        let mut lexer =
            crate::lexer::PpLexer::new(source, Symbol::intern("expr"), &handler);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            if token.is_eof() {
                break;
            }
            out.push(token);
        }
        assert!(!handler.has_errors());
        out
    }

    fn eval(source: &str) -> (bool, Handler) {
        let handler = Handler::new();
        let value = eval_condition(&tokens(source), &handler, Span::DUMMY);
        (value, handler)
    }

    fn eval_ok(source: &str) -> bool {
        let (value, handler) = eval(source);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        value
    }

    #[test]
    fn literals_and_arithmetic() {
        assert!(eval_ok("1"));
        assert!(!eval_ok("0"));
        assert!(eval_ok("1 + 2 * 3 == 7"));
        assert!(eval_ok("(1 + 2) * 3 == 9"));
        assert!(eval_ok("10 / 3 == 3 && 10 % 3 == 1"));
    }

    #[test]
    fn precedence_matches_c() {
        assert!(eval_ok("1 << 2 == 4"));
        assert!(eval_ok("1 | 2 == 2"));
        assert!(eval_ok("(1 | 2) == 3"));
        assert!(eval_ok("2 + 3 << 1 == 10"));
        assert!(eval_ok("1 ^ 3 & 2 == 1 ^ (3 & 2)"));
    }

    #[test]
    fn unary_operators() {
        assert!(eval_ok("-1 + 2 == 1"));
        assert!(eval_ok("!0"));
        assert!(!eval_ok("!5"));
        assert!(eval_ok("~0 == -1"));
        assert!(eval_ok("+7 == 7"));
    }

    #[test]
    fn ternary() {
        assert!(eval_ok("1 ? 2 : 0"));
        assert!(!eval_ok("0 ? 2 : 0"));
        assert!(eval_ok("0 ? 0 : 1 ? 1 : 0"));
    }

    #[test]
    fn identifiers_are_zero() {
        assert!(!eval_ok("UNDEFINED_NAME"));
        assert!(eval_ok("UNDEFINED_NAME + 1"));
    }

    #[test]
    fn character_constants() {
        assert!(eval_ok("'A' == 65"));
    }

    #[test]
    fn division_by_zero_reports_and_yields_zero() {
        let (value, handler) = eval("1 / 0");
        assert!(!value);
        assert_eq!(handler.error_count(), 1);

        let (value, handler) = eval("5 % 0");
        assert!(!value);
        assert!(handler.has_errors());
    }

    #[test]
    fn short_circuit_suppresses_dead_division() {
        let (value, handler) = eval("0 && 1 / 0");
        assert!(!value);
        assert!(!handler.has_errors());

        let (value, handler) = eval("1 || 1 / 0");
        assert!(value);
        assert!(!handler.has_errors());

        let (_, handler) = eval("1 ? 2 : 1 / 0");
        assert!(!handler.has_errors());
    }

    #[test]
    fn malformed_expressions_report() {
        let (_, handler) = eval("(1 + 2");
        assert!(handler.has_errors());

        let (_, handler) = eval("1 2");
        assert!(handler.has_errors());

        let (_, handler) = eval("\"str\"");
        assert!(handler.has_errors());
    }

    #[test]
    fn empty_expression_reports() {
        let handler = Handler::new();
        assert!(!eval_condition(&[], &handler, Span::DUMMY));
        assert!(handler.has_errors());
    }
}
