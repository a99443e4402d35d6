//! Macro expansion.
//!
//! Given the current token, decide whether expansion applies and rewrite
//! the upcoming stream: clone the definition (substituting arguments for a
//! function-like macro), stamp every produced token with the invocation
//! site's location, paint the macro's name into each token's hide-set, and
//! splice the result back so the next loop iteration rescans it.
//!
//! The hide-set paint is what makes every expansion terminate: a macro name
//! never expands again inside its own replacement, so `#define A A` leaves
//! a single `A` behind.

use std::time::{SystemTime, UNIX_EPOCH};

use cinder_util::{sym, Handler, Symbol};

use crate::lexer::PpLexer;
use crate::macros::{Builtin, MacroKind};
use crate::pp::Preprocessor;
use crate::token::{print_tokens, PpToken, PpTokenKind, Punct, StrEnc};

impl<'src> Preprocessor<'src> {
    /// Attempt to expand the current token. Returns true if the stream was
    /// rewritten; the caller re-peeks, which is the rescan.
    pub(crate) fn try_expand(&mut self) -> bool {
        let token = self.iter.peek();
        let Some(name) = token.ident() else {
            return false;
        };
        if token.is_hidden(name) {
            return false;
        }
        let Some(mac) = self.macros.get(name) else {
            return false;
        };
        let kind = mac.kind.clone();

        match kind {
            MacroKind::Builtin(builtin) => {
                self.expand_builtin(name, builtin);
                true
            }
            MacroKind::Object { body } => {
                let invocation = self.iter.eat();
                let replacement = self.stamp(body, &invocation, name);
                self.finish_expansion(replacement, &invocation);
                true
            }
            MacroKind::Function {
                params,
                variadic,
                body,
            } => {
                // Invocation requires an immediately adjacent '('; a bare
                // name passes through as an identifier.
                let next = self.iter.peek_forward(1);
                if !next.is_punct(Punct::LParen) || next.has_space {
                    return false;
                }
                let invocation = self.iter.eat();
                self.iter.eat(); // '('
                let Some(args) = self.collect_args(name, &params, variadic, &invocation) else {
                    return true;
                };
                let replacement = self.substitute(&params, variadic, &body, &args);
                let replacement = self.stamp(replacement, &invocation, name);
                self.finish_expansion(replacement, &invocation);
                true
            }
        }
    }

    /// Collect the invocation's arguments: token sequences separated by
    /// top-level commas, parentheses balanced. Once every named formal has
    /// an argument, a variadic macro stops splitting and the rest (commas
    /// included) becomes `__VA_ARGS__`.
    ///
    /// The returned layout is one `Vec` per named formal, plus one trailing
    /// slot for `__VA_ARGS__` when variadic.
    fn collect_args(
        &mut self,
        name: Symbol,
        params: &[Symbol],
        variadic: bool,
        invocation: &PpToken,
    ) -> Option<Vec<Vec<PpToken>>> {
        let named = params.len();
        let mut args: Vec<Vec<PpToken>> = Vec::new();
        let mut current: Vec<PpToken> = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.iter.peek();
            if token.is_eof() {
                self.handler.error(
                    format!("unterminated invocation of macro '{name}'"),
                    invocation.span,
                );
                return None;
            }
            if token.is_punct(Punct::RParen) && depth == 0 {
                self.iter.eat();
                break;
            }
            if token.is_punct(Punct::LParen) {
                depth += 1;
            } else if token.is_punct(Punct::RParen) {
                depth -= 1;
            } else if token.is_punct(Punct::Comma) && depth == 0 && args.len() < named {
                self.iter.eat();
                args.push(std::mem::take(&mut current));
                continue;
            }
            current.push(self.iter.eat());
        }
        args.push(current);

        // `M()` supplies zero arguments, not one empty one.
        if named == 0 && !variadic && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }

        if variadic {
            // Layout is named args plus a __VA_ARGS__ slot; an absent or
            // empty tail is allowed.
            if args.len() < named {
                self.handler.error(
                    format!(
                        "macro '{name}' requires at least {named} argument{}",
                        if named == 1 { "" } else { "s" }
                    ),
                    invocation.span,
                );
            }
            while args.len() < named + 1 {
                args.push(Vec::new());
            }
        } else if args.len() != named {
            self.handler.error(
                format!(
                    "macro '{name}' requires {named} argument{}, but {} given",
                    if named == 1 { "" } else { "s" },
                    args.len()
                ),
                invocation.span,
            );
            args.resize_with(named, Vec::new);
        }
        Some(args)
    }

    /// Walk the definition, substituting arguments and applying `#` and
    /// `##`. Arguments are inserted as captured; the rescan after splicing
    /// expands whatever they contain.
    fn substitute(
        &mut self,
        params: &[Symbol],
        variadic: bool,
        body: &[PpToken],
        args: &[Vec<PpToken>],
    ) -> Vec<PpToken> {
        let param_of = |token: &PpToken| -> Option<usize> {
            let name = token.ident()?;
            if let Some(index) = params.iter().position(|p| *p == name) {
                Some(index)
            } else if variadic && name == sym::VA_ARGS {
                Some(params.len())
            } else {
                None
            }
        };

        let mut out: Vec<PpToken> = Vec::new();
        // True when the previous element was a formal whose argument was
        // empty: the placemarker a following '##' pastes against.
        let mut placemarker = false;
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];

            if token.is_punct(Punct::Hash) {
                match body.get(i + 1).and_then(|t| param_of(t)) {
                    Some(k) => {
                        let text = print_tokens(&args[k]);
                        let mut stringized = PpToken::new(
                            PpTokenKind::Str {
                                enc: StrEnc::Plain,
                                text: Symbol::intern(&text),
                            },
                            token.span,
                        );
                        stringized.has_space = token.has_space;
                        out.push(stringized);
                        placemarker = false;
                        i += 2;
                        continue;
                    }
                    None => {
                        self.handler
                            .error("'#' is not followed by a macro parameter", token.span);
                        // Emitted as an ordinary token below.
                    }
                }
            }

            if token.is_punct(Punct::HashHash) {
                let Some(next) = body.get(i + 1) else {
                    // Flagged at definition time; nothing to paste.
                    i += 1;
                    continue;
                };

                // GNU extension: `, ## __VA_ARGS__` erases the comma when
                // the variadic argument is empty, and pastes nothing when
                // it is not.
                if variadic
                    && next.ident() == Some(sym::VA_ARGS)
                    && out.last().map(|t| t.is_punct(Punct::Comma)).unwrap_or(false)
                {
                    let va = &args[params.len()];
                    if va.is_empty() {
                        out.pop();
                        placemarker = true;
                    } else {
                        out.extend(va.iter().cloned());
                        placemarker = false;
                    }
                    i += 2;
                    continue;
                }

                let rhs_unit: Vec<PpToken> = match param_of(next) {
                    Some(k) => args[k].clone(),
                    None => vec![next.clone()],
                };
                if rhs_unit.is_empty() {
                    // Right placemarker: the left operand stands alone.
                    i += 2;
                    continue;
                }
                if placemarker || out.is_empty() {
                    // Left placemarker: the right operand stands alone.
                    out.extend(rhs_unit);
                } else {
                    let lhs = out.pop().unwrap();
                    out.extend(self.paste(lhs, rhs_unit[0].clone()));
                    out.extend(rhs_unit[1..].iter().cloned());
                }
                placemarker = false;
                i += 2;
                continue;
            }

            if let Some(k) = param_of(token) {
                if args[k].is_empty() {
                    placemarker = true;
                } else {
                    let start = out.len();
                    out.extend(args[k].iter().cloned());
                    out[start].has_space = token.has_space;
                    placemarker = false;
                }
                i += 1;
                continue;
            }

            out.push(token.clone());
            placemarker = false;
            i += 1;
        }
        out
    }

    /// Concatenate two lexemes and re-lex; the result must form exactly one
    /// preprocessing token.
    fn paste(&mut self, lhs: PpToken, rhs: PpToken) -> Vec<PpToken> {
        let text = format!("{lhs}{rhs}");
        let pasted = {
            // Scratch handler: a failed paste is reported as one paste
            // diagnostic, not as stray lexer errors.
            let scratch = Handler::new();
            let mut lexer = PpLexer::new(&text, lhs.span.file, &scratch);
            let first = lexer.next_token();
            let second = lexer.next_token();
            if scratch.has_errors() || first.is_eof() || !second.is_eof() {
                None
            } else {
                Some(first)
            }
        };
        match pasted {
            Some(mut token) => {
                token.span = lhs.span;
                token.at_line_start = false;
                token.has_space = lhs.has_space;
                vec![token]
            }
            None => {
                self.handler.error(
                    format!("pasting '{lhs}' and '{rhs}' does not give a valid preprocessing token"),
                    lhs.span,
                );
                vec![lhs, rhs]
            }
        }
    }

    /// Stamp replacement tokens: the invocation site's location wins for
    /// every token, the macro name (and the invocation's own hide-set) is
    /// painted onto each, and the first token inherits the invocation's
    /// whitespace flags. Body-internal spacing is preserved.
    fn stamp(
        &mut self,
        mut tokens: Vec<PpToken>,
        invocation: &PpToken,
        name: Symbol,
    ) -> Vec<PpToken> {
        for token in tokens.iter_mut() {
            token.span = invocation.span;
            token.at_line_start = false;
            for &hidden in &invocation.hide {
                token.hide_name(hidden);
            }
            token.hide_name(name);
        }
        if let Some(first) = tokens.first_mut() {
            first.at_line_start = invocation.at_line_start;
            first.has_space = invocation.has_space;
        }
        tokens
    }

    /// Splice the replacement, or transfer the invocation's whitespace
    /// flags to the following token when the replacement is empty.
    fn finish_expansion(&mut self, replacement: Vec<PpToken>, invocation: &PpToken) {
        if replacement.is_empty() {
            if let Some(next) = self.iter.peek_current_mut() {
                next.at_line_start |= invocation.at_line_start;
                next.has_space |= invocation.has_space;
            }
        } else {
            self.iter.splice(replacement);
        }
    }

    /// Synthesize the single token a dynamic builtin expands to.
    fn expand_builtin(&mut self, name: Symbol, builtin: Builtin) {
        let invocation = self.iter.eat();
        let kind = match builtin {
            Builtin::File => PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: invocation.span.file,
            },
            Builtin::Line => number_kind(invocation.span.line as u64),
            Builtin::Counter => {
                let value = self.counter;
                self.counter += 1;
                number_kind(value as u64)
            }
            Builtin::IncludeLevel => {
                number_kind(self.iter.include_depth().saturating_sub(1) as u64)
            }
            Builtin::BaseFile => PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: self.base_file,
            },
            Builtin::Date => PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: self.date,
            },
            Builtin::Time => PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: self.time,
            },
            Builtin::Timestamp => PpTokenKind::Str {
                enc: StrEnc::Plain,
                text: self.timestamp,
            },
        };
        let mut token = PpToken::new(kind, invocation.span);
        token.at_line_start = invocation.at_line_start;
        token.has_space = invocation.has_space;
        token.hide = invocation.hide.clone();
        token.hide_name(name);
        self.iter.splice(vec![token]);
    }
}

fn number_kind(value: u64) -> PpTokenKind {
    PpTokenKind::Number(Symbol::intern(&value.to_string()))
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];

/// The session's `__DATE__`, `__TIME__`, and `__TIMESTAMP__` strings,
/// fixed at construction. `SOURCE_DATE_EPOCH` overrides the clock for
/// reproducible builds.
pub(crate) fn session_timestamps() -> (Symbol, Symbol, Symbol) {
    let epoch = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

    let days = (epoch / 86_400) as i64;
    let (year, month, day) = civil_from_days(days);
    let seconds = epoch % 86_400;
    let (hour, minute, second) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    // 1970-01-01 was a Thursday.
    let weekday = WEEKDAYS[(days % 7) as usize];

    let date = format!("{} {:2} {}", MONTHS[(month - 1) as usize], day, year);
    let time = format!("{hour:02}:{minute:02}:{second:02}");
    let timestamp = format!(
        "{} {} {:2} {} {}",
        weekday,
        MONTHS[(month - 1) as usize],
        day,
        time,
        year
    );
    (
        Symbol::intern(&date),
        Symbol::intern(&time),
        Symbol::intern(&timestamp),
    )
}

/// Days-since-epoch to (year, month, day) in the proleptic Gregorian
/// calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_known_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(365), (1971, 1, 1));
        // 2000-03-01, the day after the leap day.
        assert_eq!(civil_from_days(11_017), (2000, 3, 1));
        // 2026-08-01.
        assert_eq!(civil_from_days(20_666), (2026, 8, 1));
    }

    #[test]
    fn weekday_anchor() {
        // Day zero of the epoch was a Thursday.
        assert_eq!(WEEKDAYS[0], "Thu");
    }
}
