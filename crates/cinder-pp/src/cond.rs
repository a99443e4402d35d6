//! Conditional-inclusion state.
//!
//! One [`CondFrame`] per lexically-nested `#if`-family directive. The frame
//! records whether a branch of this conditional has been taken (`included`)
//! and whether its `#else` has been consumed (`after_else`). The skip
//! scanner discards tokens of untaken branches without macro expansion or
//! directive execution.

use cinder_util::{sym, Handler, Span, Symbol};

use crate::iter::TokenIter;
use crate::token::Punct;

/// One `#if`/`#elif`/`#else`/`#endif` nesting level.
#[derive(Clone, Copy, Debug)]
pub struct CondFrame {
    /// A branch of this conditional has been selected and emitted.
    pub included: bool,
    /// An `#else` has already been consumed; another is an error.
    pub after_else: bool,
    /// The opening directive, for unterminated-`#if` diagnostics.
    pub span: Span,
}

/// The conditional-inclusion stack.
#[derive(Default)]
pub struct CondStack {
    frames: Vec<CondFrame>,
}

impl CondStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, included: bool, span: Span) {
        self.frames.push(CondFrame {
            included,
            after_else: false,
            span,
        });
    }

    pub fn pop(&mut self) -> Option<CondFrame> {
        self.frames.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut CondFrame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost unterminated frame, for end-of-session diagnostics.
    pub fn unterminated(&self) -> Option<&CondFrame> {
        self.frames.last()
    }
}

/// Is this identifier one of the directives that opens a nested
/// conditional during a skip?
fn opens_conditional(name: Symbol) -> bool {
    name == sym::IF || name == sym::IFDEF || name == sym::IFNDEF
}

/// Does this identifier end or switch the branch being skipped?
fn switches_branch(name: Symbol) -> bool {
    name == sym::ELIF || name == sym::ELSE || name == sym::ENDIF
}

/// Discard tokens of an untaken branch.
///
/// Reads raw tokens from the iterator, tracking `#if`-family nesting, and
/// stops with the `#` of the first `#elif`/`#else`/`#endif` at depth zero
/// still unconsumed so the dispatcher can resume there. Hitting end of
/// input first reports an unterminated conditional.
pub fn skip_branch(iter: &mut TokenIter<'_>, handler: &Handler, opened_at: Span) {
    let mut depth = 0usize;
    loop {
        let token = iter.peek();
        if token.is_eof() {
            handler.error("unterminated conditional directive", opened_at);
            return;
        }
        if !(token.is_punct(Punct::Hash) && token.at_line_start) {
            iter.eat();
            continue;
        }

        let name = iter.peek_forward(1).ident();
        match name {
            Some(name) if opens_conditional(name) => {
                depth += 1;
                iter.eat();
                iter.eat();
            }
            Some(name) if switches_branch(name) => {
                if depth == 0 {
                    return;
                }
                if name == sym::ENDIF {
                    depth -= 1;
                }
                iter.eat();
                iter.eat();
            }
            _ => {
                // Any other directive (or stray '#') is inert while
                // skipping.
                iter.eat();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;
    use crate::lexer::PpLexer;

    fn iter_over<'a>(source: &'a str, handler: &'a Handler) -> TokenIter<'a> {
        let mut iter = TokenIter::new();
        iter.push_file(
            PpLexer::new(source, Symbol::intern("t.c"), handler),
            FileId(0),
        );
        iter
    }

    #[test]
    fn stack_push_pop() {
        let mut stack = CondStack::new();
        assert!(stack.is_empty());
        stack.push(true, Span::DUMMY);
        stack.push(false, Span::DUMMY);
        assert_eq!(stack.depth(), 2);
        assert!(!stack.top_mut().unwrap().included);
        stack.pop();
        assert!(stack.top_mut().unwrap().included);
        stack.pop();
        assert!(stack.is_empty());
    }

    #[test]
    fn skip_stops_at_matching_else() {
        let handler = Handler::new();
        let mut iter = iter_over("skipped tokens\n#else\nkept", &handler);
        skip_branch(&mut iter, &handler, Span::DUMMY);
        assert!(!handler.has_errors());
        // The '#' is left unconsumed.
        let hash = iter.eat();
        assert!(hash.is_punct(Punct::Hash));
        assert_eq!(iter.eat().ident(), Some(sym::ELSE));
    }

    #[test]
    fn skip_tracks_nesting() {
        let handler = Handler::new();
        let source = "#if 0\n#else\n#endif\nstill skipped\n#endif\nafter";
        let mut iter = iter_over(source, &handler);
        skip_branch(&mut iter, &handler, Span::DUMMY);
        assert!(!handler.has_errors());
        let hash = iter.eat();
        assert!(hash.is_punct(Punct::Hash));
        assert_eq!(iter.eat().ident(), Some(sym::ENDIF));
        assert_eq!(iter.eat().ident().unwrap().as_str(), "after");
    }

    #[test]
    fn skip_ignores_defines_in_dead_branch() {
        let handler = Handler::new();
        let mut iter = iter_over("#define X 1\n#endif\n", &handler);
        skip_branch(&mut iter, &handler, Span::DUMMY);
        assert!(!handler.has_errors());
        let hash = iter.eat();
        assert!(hash.is_punct(Punct::Hash));
        assert_eq!(iter.eat().ident(), Some(sym::ENDIF));
    }

    #[test]
    fn unterminated_skip_reports() {
        let handler = Handler::new();
        let mut iter = iter_over("no end in sight", &handler);
        skip_branch(&mut iter, &handler, Span::DUMMY);
        assert!(handler.has_errors());
    }
}
