//! The preprocessing session.
//!
//! [`Preprocessor`] owns everything one translation unit needs: the file
//! store, the token iterator, the macro table, the conditional stack, the
//! `__COUNTER__` state, and a reference to the diagnostic handler. There is
//! no process-wide state; sessions with disjoint arenas run in parallel.
//!
//! The main loop peeks one token at a time: a `#` at the start of a line is
//! dispatched as a directive, an identifier is offered to the macro
//! expander, and whatever remains is converted into a language token.

use std::path::Path;

use bumpalo::Bump;
use cinder_util::{sym, Fatal, Handler, Span, Symbol};

use crate::cond::{skip_branch, CondStack};
use crate::convert::{self, CToken};
use crate::expr::eval_condition;
use crate::files::{FileId, FileStore, IncludeStyle};
use crate::iter::TokenIter;
use crate::lexer::PpLexer;
use crate::macros::{check_paste_placement, Macro, MacroKind, MacroTable};
use crate::token::{print_tokens, PpToken, PpTokenKind, Punct, StrEnc};

/// Nested `#include` limit; exceeding it is an error and the directive is
/// skipped.
const MAX_INCLUDE_DEPTH: usize = 64;

/// One preprocessing session.
pub struct Preprocessor<'src> {
    pub(crate) files: FileStore<'src>,
    pub(crate) iter: TokenIter<'src>,
    pub(crate) macros: MacroTable,
    pub(crate) cond: CondStack,
    pub(crate) handler: &'src Handler,
    /// Next `__COUNTER__` value.
    pub(crate) counter: u32,
    /// Name of the root file, for `__BASE_FILE__`.
    pub(crate) base_file: Symbol,
    pub(crate) date: Symbol,
    pub(crate) time: Symbol,
    pub(crate) timestamp: Symbol,
}

impl<'src> Preprocessor<'src> {
    /// Create a session allocating file contents into `arena` and
    /// reporting to `handler`.
    pub fn new(arena: &'src Bump, handler: &'src Handler) -> Self {
        let (date, time, timestamp) = crate::expand::session_timestamps();
        Self {
            files: FileStore::new(arena),
            iter: TokenIter::new(),
            macros: MacroTable::new(),
            cond: CondStack::new(),
            handler,
            counter: 0,
            base_file: sym::EMPTY,
            date,
            time,
            timestamp,
        }
    }

    /// Append a user (`-I`) include directory.
    pub fn add_include_dir(&mut self, dir: impl Into<std::path::PathBuf>) {
        self.files.add_include_dir(dir);
    }

    /// Append a system include directory.
    pub fn add_system_dir(&mut self, dir: impl Into<std::path::PathBuf>) {
        self.files.add_system_dir(dir);
    }

    /// Set the starting `__COUNTER__` value.
    pub fn set_counter_start(&mut self, value: u32) {
        self.counter = value;
    }

    /// Preprocess a file on disk into language tokens.
    pub fn preprocess_file(&mut self, path: &Path) -> Result<Vec<CToken>, Fatal> {
        let tokens = self.pp_tokens_file(path)?;
        Ok(self.convert_stream(&tokens))
    }

    /// Preprocess in-memory contents into language tokens.
    pub fn preprocess_source(&mut self, name: &str, text: &str) -> Vec<CToken> {
        let tokens = self.pp_tokens_source(name, text);
        self.convert_stream(&tokens)
    }

    /// Preprocess a file on disk into the raw preprocessor-token stream
    /// (the `-E` form).
    pub fn pp_tokens_file(&mut self, path: &Path) -> Result<Vec<PpToken>, Fatal> {
        let root = self.files.load_root(path)?;
        self.start(root);
        Ok(self.run())
    }

    /// Preprocess in-memory contents into the raw preprocessor-token
    /// stream.
    pub fn pp_tokens_source(&mut self, name: &str, text: &str) -> Vec<PpToken> {
        let root = self.files.add_virtual(name, text);
        self.start(root);
        self.run()
    }

    fn start(&mut self, root: FileId) {
        let file = self.files.get(root);
        self.base_file = file.name;
        self.iter.set_eof_span(Span::new(file.name, 0, 0, 0));
        self.push_include(root);
    }

    fn push_include(&mut self, id: FileId) {
        let file = self.files.get(id);
        let lexer = PpLexer::new(file.contents, file.name, self.handler);
        self.iter.push_file(lexer, id);
    }

    /// The main preprocessing loop.
    fn run(&mut self) -> Vec<PpToken> {
        let mut out = Vec::new();
        loop {
            let token = self.iter.peek();
            if token.is_eof() {
                break;
            }
            if token.is_punct(Punct::Hash) && token.at_line_start {
                self.directive();
                continue;
            }
            if self.try_expand() {
                continue;
            }
            out.push(self.iter.eat());
        }
        if let Some(frame) = self.cond.unterminated() {
            self.handler.error("unterminated '#if'", frame.span);
        }
        out
    }

    fn convert_stream(&self, tokens: &[PpToken]) -> Vec<CToken> {
        tokens
            .iter()
            .filter_map(|token| convert::convert(token, self.handler))
            .collect()
    }

    // ------------------------------------------------------------------
    // Directive dispatch
    // ------------------------------------------------------------------

    /// Handle a `#` directive. The directive name itself is never
    /// macro-expanded.
    fn directive(&mut self) {
        let hash = self.iter.eat();
        let span = hash.span;

        let token = self.iter.peek();
        // `#` alone on its line is the null directive.
        if token.at_line_start || token.is_eof() {
            return;
        }
        let Some(name) = token.ident() else {
            self.handler
                .error("invalid preprocessing directive", token.span);
            self.skip_to_line_start();
            return;
        };
        let name_line = token.span.line;

        if name == sym::DEFINE {
            self.iter.eat();
            self.dir_define();
        } else if name == sym::UNDEF {
            self.iter.eat();
            self.dir_undef();
        } else if name == sym::INCLUDE {
            self.iter.eat();
            self.dir_include(span);
        } else if name == sym::IF {
            self.iter.eat();
            let value = self.eval_directive_expr(span);
            self.cond.push(value, span);
            if !value {
                skip_branch(&mut self.iter, self.handler, span);
            }
        } else if name == sym::IFDEF || name == sym::IFNDEF {
            self.iter.eat();
            self.dir_ifdef(name == sym::IFNDEF, span);
        } else if name == sym::ELIF {
            self.iter.eat();
            self.dir_elif(span);
        } else if name == sym::ELSE {
            self.iter.eat();
            self.dir_else(span);
        } else if name == sym::ENDIF {
            self.iter.eat();
            if self.cond.pop().is_none() {
                self.handler.error("'#endif' without '#if'", span);
            }
        } else if name == sym::LINE {
            self.iter.eat();
            self.dir_line(name_line, span);
        } else if name == sym::PRAGMA {
            self.iter.eat();
            self.dir_pragma();
        } else if name == sym::ERROR || name == sym::WARNING {
            self.iter.eat();
            self.dir_message(name == sym::ERROR, span);
        } else {
            self.handler
                .error(format!("unknown directive '#{name}'"), token.span);
            self.iter.eat();
        }

        self.skip_to_line_start();
    }

    /// Discard the rest of the directive line.
    fn skip_to_line_start(&mut self) {
        loop {
            let token = self.iter.peek();
            if token.is_eof() || token.at_line_start {
                break;
            }
            self.iter.eat();
        }
    }

    /// Raw tokens up to the end of the current line.
    fn rest_of_line(&mut self) -> Vec<PpToken> {
        let mut tokens = Vec::new();
        loop {
            let token = self.iter.peek();
            if token.is_eof() || token.at_line_start {
                break;
            }
            tokens.push(self.iter.eat());
        }
        tokens
    }

    // ------------------------------------------------------------------
    // #define / #undef
    // ------------------------------------------------------------------

    fn dir_define(&mut self) {
        let token = self.iter.peek().clone();
        let Some(name) = token.ident() else {
            self.handler
                .error("macro name must be an identifier", token.span);
            return;
        };
        self.iter.eat();

        let open = self.iter.peek();
        let kind = if open.is_punct(Punct::LParen) && !open.has_space && !open.at_line_start {
            self.iter.eat();
            let (params, variadic) = self.define_params();
            let body = self.rest_of_line();
            if !variadic
                && body
                    .iter()
                    .any(|t| t.ident() == Some(sym::VA_ARGS))
            {
                self.handler.error(
                    "'__VA_ARGS__' can only appear in a variadic macro",
                    token.span,
                );
            }
            check_paste_placement(&body, token.span, self.handler);
            MacroKind::Function {
                params,
                variadic,
                body,
            }
        } else {
            let body = self.rest_of_line();
            check_paste_placement(&body, token.span, self.handler);
            MacroKind::Object { body }
        };

        self.macros.define(
            Macro {
                name,
                span: token.span,
                kind,
            },
            self.handler,
        );
    }

    /// The parenthesized formal-parameter list of a function-like macro.
    fn define_params(&mut self) -> (Vec<Symbol>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;

        if self.iter.peek().is_punct(Punct::RParen) {
            self.iter.eat();
            return (params, variadic);
        }
        loop {
            let token = self.iter.peek().clone();
            if token.at_line_start || token.is_eof() {
                self.handler
                    .error("missing ')' in macro parameter list", token.span);
                return (params, variadic);
            }
            if token.is_punct(Punct::Ellipsis) {
                variadic = true;
                self.iter.eat();
            } else if let Some(param) = token.ident() {
                if param == sym::VA_ARGS {
                    self.handler.error(
                        "'__VA_ARGS__' cannot be used as a macro parameter name",
                        token.span,
                    );
                } else if params.contains(&param) {
                    self.handler.error(
                        format!("duplicate macro parameter '{param}'"),
                        token.span,
                    );
                } else {
                    params.push(param);
                }
                self.iter.eat();
            } else {
                self.handler
                    .error("invalid token in macro parameter list", token.span);
                self.iter.eat();
            }

            // `...` must close the list.
            if !variadic && self.iter.peek().is_punct(Punct::Comma) {
                self.iter.eat();
                continue;
            }
            break;
        }
        if self.iter.peek().is_punct(Punct::RParen) {
            self.iter.eat();
        } else {
            let span = self.iter.peek().span;
            self.handler.error("missing ')' in macro parameter list", span);
        }
        (params, variadic)
    }

    fn dir_undef(&mut self) {
        let token = self.iter.peek().clone();
        match token.ident() {
            Some(name) => {
                self.iter.eat();
                self.macros.undef(name, token.span, self.handler);
            }
            None => {
                self.handler
                    .error("macro name must be an identifier", token.span);
            }
        }
    }

    // ------------------------------------------------------------------
    // #include
    // ------------------------------------------------------------------

    fn dir_include(&mut self, span: Span) {
        loop {
            let token = self.iter.peek().clone();
            if token.at_line_start || token.is_eof() {
                self.handler
                    .error("expected \"FILENAME\" or <FILENAME>", span);
                return;
            }
            match token.kind {
                PpTokenKind::Str {
                    enc: StrEnc::Plain,
                    text,
                } => {
                    self.iter.eat();
                    self.skip_to_line_start();
                    self.do_include(text.as_str(), IncludeStyle::Quoted, span);
                    return;
                }
                PpTokenKind::Punct(Punct::Lt) => {
                    self.iter.eat();
                    let mut name = String::new();
                    loop {
                        let part = self.iter.peek().clone();
                        if part.at_line_start || part.is_eof() {
                            self.handler.error("expected '>' in #include", span);
                            return;
                        }
                        if part.is_punct(Punct::Gt) {
                            self.iter.eat();
                            break;
                        }
                        name.push_str(&part.to_string());
                        self.iter.eat();
                    }
                    self.skip_to_line_start();
                    self.do_include(&name, IncludeStyle::Angled, span);
                    return;
                }
                // The include tail is the one directive tail that IS
                // macro-expanded when it is not already a header name.
                _ => {
                    if !self.try_expand() {
                        self.handler
                            .error("expected \"FILENAME\" or <FILENAME>", token.span);
                        return;
                    }
                }
            }
        }
    }

    fn do_include(&mut self, name: &str, style: IncludeStyle, span: Span) {
        if self.iter.include_depth() >= MAX_INCLUDE_DEPTH {
            self.handler
                .error(format!("#include nested too deeply ('{name}')"), span);
            return;
        }
        let parent = self.iter.current_file();
        match self.files.resolve_include(name, style, parent) {
            Some(id) => {
                if self.files.is_pragma_once(id) {
                    return;
                }
                tracing::debug!(file = name, "entering include");
                self.push_include(id);
            }
            None => {
                self.handler
                    .error(format!("'{name}' file not found"), span);
            }
        }
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    fn dir_ifdef(&mut self, negate: bool, span: Span) {
        let token = self.iter.peek().clone();
        let defined = match token.ident() {
            Some(name) => {
                self.iter.eat();
                self.macros.is_defined(name)
            }
            None => {
                self.handler.error(
                    format!(
                        "expected identifier after '#{}'",
                        if negate { "ifndef" } else { "ifdef" }
                    ),
                    token.span,
                );
                false
            }
        };
        let included = defined != negate;
        self.cond.push(included, span);
        if !included {
            skip_branch(&mut self.iter, self.handler, span);
        }
    }

    fn dir_elif(&mut self, span: Span) {
        let Some(frame) = self.cond.top_mut() else {
            self.handler.error("'#elif' without '#if'", span);
            return;
        };
        if frame.after_else {
            self.handler.error("'#elif' after '#else'", span);
            return;
        }
        let already_included = frame.included;
        if already_included {
            // A branch was taken; this one is dead, expression and all.
            skip_branch(&mut self.iter, self.handler, span);
        } else {
            let value = self.eval_directive_expr(span);
            if value {
                if let Some(frame) = self.cond.top_mut() {
                    frame.included = true;
                }
            } else {
                skip_branch(&mut self.iter, self.handler, span);
            }
        }
    }

    fn dir_else(&mut self, span: Span) {
        let Some(frame) = self.cond.top_mut() else {
            self.handler.error("'#else' without '#if'", span);
            return;
        };
        if frame.after_else {
            self.handler.error("'#else' after '#else'", span);
            return;
        }
        frame.after_else = true;
        if frame.included {
            skip_branch(&mut self.iter, self.handler, span);
        } else {
            frame.included = true;
        }
    }

    /// Collect, `defined`-replace, macro-expand, and evaluate an
    /// `#if`/`#elif` expression.
    fn eval_directive_expr(&mut self, span: Span) -> bool {
        // First pass: the raw directive line, with `defined X` and
        // `defined(X)` replaced before any expansion.
        let mut line: Vec<PpToken> = Vec::new();
        loop {
            let token = self.iter.peek();
            if token.is_eof() || token.at_line_start {
                break;
            }
            let token = self.iter.eat();
            if token.ident() == Some(sym::DEFINED) {
                let value = self.parse_defined();
                let mut replaced = PpToken::new(
                    PpTokenKind::Number(Symbol::intern(if value { "1" } else { "0" })),
                    token.span,
                );
                replaced.has_space = token.has_space;
                line.push(replaced);
            } else {
                line.push(token);
            }
        }

        // Second pass: splice back and expand up to the line boundary.
        self.iter.splice(line);
        let mut expanded = Vec::new();
        loop {
            let token = self.iter.peek();
            if token.is_eof() || token.at_line_start {
                break;
            }
            if self.try_expand() {
                continue;
            }
            expanded.push(self.iter.eat());
        }

        eval_condition(&expanded, self.handler, span)
    }

    /// The operand of a `defined` operator: `NAME` or `(NAME)`.
    fn parse_defined(&mut self) -> bool {
        let token = self.iter.peek().clone();
        if token.at_line_start || token.is_eof() {
            self.handler
                .error("expected identifier after 'defined'", token.span);
            return false;
        }
        if token.is_punct(Punct::LParen) {
            self.iter.eat();
            let name_token = self.iter.peek().clone();
            let result = match name_token.ident() {
                Some(name) => {
                    self.iter.eat();
                    self.macros.is_defined(name)
                }
                None => {
                    self.handler
                        .error("expected identifier after 'defined'", name_token.span);
                    false
                }
            };
            if self.iter.peek().is_punct(Punct::RParen) {
                self.iter.eat();
            } else {
                let span = self.iter.peek().span;
                self.handler.error("expected ')' after 'defined'", span);
            }
            result
        } else if let Some(name) = token.ident() {
            self.iter.eat();
            self.macros.is_defined(name)
        } else {
            self.handler
                .error("expected identifier after 'defined'", token.span);
            false
        }
    }

    // ------------------------------------------------------------------
    // #line / #pragma / #error / #warning
    // ------------------------------------------------------------------

    fn dir_line(&mut self, directive_line: u32, span: Span) {
        let token = self.iter.peek().clone();
        let target = match &token.kind {
            PpTokenKind::Number(raw) => raw.as_str().parse::<u32>().ok(),
            _ => None,
        };
        let Some(target) = target else {
            self.handler
                .error("expected line number after '#line'", span);
            return;
        };
        self.iter.eat();

        let next = self.iter.peek().clone();
        let file = match next.kind {
            PpTokenKind::Str {
                enc: StrEnc::Plain,
                text,
            } if !next.at_line_start => {
                self.iter.eat();
                Some(text)
            }
            _ => None,
        };
        self.iter.override_line(target, file, directive_line);
    }

    fn dir_pragma(&mut self) {
        let token = self.iter.peek().clone();
        if token.ident() == Some(sym::ONCE) {
            self.iter.eat();
            if let Some(id) = self.iter.current_file() {
                self.files.mark_pragma_once(id);
            }
        } else {
            tracing::debug!("ignoring unrecognized '#pragma'");
        }
    }

    fn dir_message(&mut self, is_error: bool, span: Span) {
        let tokens = self.rest_of_line();
        let message = print_tokens(&tokens);
        if is_error {
            self.handler.error(format!("#error {message}"), span);
        } else {
            self.handler.warning(format!("#warning {message}"), span);
        }
    }
}
