//! The stacked token cursor.
//!
//! A [`TokenIter`] threads lexers and inserted token lists together: each
//! stack entry is either a live lexer over a file (pushed by `#include`) or
//! a list of already-produced tokens being replayed (macro expansion output,
//! pushback). The top entry is consumed first; when it runs dry the next one
//! transparently takes over, and once everything is exhausted an
//! end-of-input sentinel is returned forever.
//!
//! `peek` is idempotent between `eat` calls, and `splice` makes the next
//! `peek` return the first spliced token.

use std::collections::VecDeque;

use cinder_util::{Span, Symbol};

use crate::files::FileId;
use crate::lexer::PpLexer;
use crate::token::PpToken;

struct Entry<'src> {
    /// Live lexer, until it reports end-of-input.
    lexer: Option<PpLexer<'src>>,
    /// Set for entries created by `#include`; expansion entries carry none.
    file: Option<FileId>,
    /// Tokens already materialized or spliced, consumed before the lexer.
    pending: VecDeque<PpToken>,
}

/// Stacked cursor over (lexer, pending-token-list) entries.
pub struct TokenIter<'src> {
    /// Entry stack; the top is the last element.
    stack: Vec<Entry<'src>>,
    /// Sentinel returned once all entries are exhausted.
    eof: PpToken,
}

impl<'src> TokenIter<'src> {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            eof: PpToken::eof(Span::DUMMY),
        }
    }

    /// Set the span reported on the end-of-input sentinel.
    pub fn set_eof_span(&mut self, span: Span) {
        self.eof = PpToken::eof(span);
    }

    /// Push a new file entry; the next `peek` returns its first token.
    pub fn push_file(&mut self, lexer: PpLexer<'src>, file: FileId) {
        self.stack.push(Entry {
            lexer: Some(lexer),
            file: Some(file),
            pending: VecDeque::new(),
        });
    }

    /// Prepend tokens to the current entry's pending list.
    pub fn splice(&mut self, tokens: Vec<PpToken>) {
        if self.stack.is_empty() {
            self.stack.push(Entry {
                lexer: None,
                file: None,
                pending: VecDeque::new(),
            });
        }
        let entry = self.stack.last_mut().unwrap();
        for token in tokens.into_iter().rev() {
            entry.pending.push_front(token);
        }
    }

    /// Number of file entries on the stack (the `#include` nesting level).
    pub fn include_depth(&self) -> usize {
        self.stack.iter().filter(|e| e.file.is_some()).count()
    }

    /// The file of the innermost file-backed entry, if any.
    pub fn current_file(&self) -> Option<FileId> {
        self.stack.iter().rev().find_map(|e| e.file)
    }

    /// Current token without advancing.
    pub fn peek(&mut self) -> &PpToken {
        self.peek_forward(0)
    }

    /// The n-th token ahead (0 = current), materializing lazily. When the
    /// top entry exhausts before n tokens exist, the surplus is drawn from
    /// the entry below it.
    pub fn peek_forward(&mut self, n: usize) -> &PpToken {
        match self.materialize(n) {
            Some((entry, index)) => &self.stack[entry].pending[index],
            None => &self.eof,
        }
    }

    /// Mutable access to the current token (used to transfer whitespace
    /// flags across an empty expansion).
    pub fn peek_current_mut(&mut self) -> Option<&mut PpToken> {
        self.materialize(0)
            .map(|(entry, index)| &mut self.stack[entry].pending[index])
    }

    /// Discard and return the current token.
    pub fn eat(&mut self) -> PpToken {
        loop {
            let Some(entry) = self.stack.last_mut() else {
                return self.eof.clone();
            };
            if let Some(token) = entry.pending.pop_front() {
                return token;
            }
            if let Some(lexer) = entry.lexer.as_mut() {
                let token = lexer.next_token();
                if token.is_eof() {
                    entry.lexer = None;
                } else {
                    return token;
                }
            }
            if entry.lexer.is_none() && entry.pending.is_empty() {
                self.stack.pop();
            }
        }
    }

    /// Apply a `#line` override to the innermost file-backed lexer.
    ///
    /// `directive_line` is the reported line the directive itself sits on;
    /// the override takes effect on the following line. Tokens already
    /// materialized ahead of the directive are patched in place.
    pub fn override_line(&mut self, target: u32, file: Option<Symbol>, directive_line: u32) {
        let Some(index) = self.stack.iter().rposition(|e| e.lexer.is_some()) else {
            return;
        };
        let entry = &mut self.stack[index];
        let lexer = entry.lexer.as_mut().unwrap();
        let old_delta = lexer.line_delta();
        let physical_directive = directive_line as i64 - old_delta;
        let new_delta = target as i64 - physical_directive - 1;
        lexer.set_reported(new_delta, file);
        for token in entry.pending.iter_mut() {
            let physical = token.span.line as i64 - old_delta;
            token.span.line = (physical + new_delta).max(0) as u32;
            if let Some(file) = file {
                token.span.file = file;
            }
        }
    }

    /// Ensure the n-th lookahead token exists, walking entries from the
    /// top. Returns its (entry, pending-index) address, or `None` at
    /// end-of-input. Materialized tokens are appended to the pending list
    /// of the entry that produced them, so entries never intermix.
    fn materialize(&mut self, n: usize) -> Option<(usize, usize)> {
        let mut need = n;
        let mut level = 0usize;
        loop {
            let index = self.stack.len().checked_sub(1 + level)?;
            loop {
                if self.stack[index].pending.len() > need {
                    return Some((index, need));
                }
                let entry = &mut self.stack[index];
                let Some(lexer) = entry.lexer.as_mut() else {
                    break;
                };
                let token = lexer.next_token();
                if token.is_eof() {
                    entry.lexer = None;
                } else {
                    entry.pending.push_back(token);
                }
            }
            need -= self.stack[index].pending.len();
            level += 1;
        }
    }
}

impl Default for TokenIter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{PpTokenKind, Punct};
    use cinder_util::Handler;

    fn lexer<'a>(source: &'a str, handler: &'a Handler) -> PpLexer<'a> {
        PpLexer::new(source, Symbol::intern("t.c"), handler)
    }

    fn ident(name: &str) -> PpToken {
        PpToken::new(PpTokenKind::Ident(Symbol::intern(name)), Span::DUMMY)
    }

    fn text_of(token: &PpToken) -> String {
        token.to_string()
    }

    #[test]
    fn peek_is_idempotent() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("a b c", &handler), FileId(0));
        assert_eq!(text_of(iter.peek()), "a");
        assert_eq!(text_of(iter.peek()), "a");
        assert_eq!(text_of(&iter.eat()), "a");
        assert_eq!(text_of(iter.peek()), "b");
    }

    #[test]
    fn peek_forward_materializes() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("a b c", &handler), FileId(0));
        assert_eq!(text_of(iter.peek_forward(2)), "c");
        assert_eq!(text_of(iter.peek_forward(0)), "a");
        assert!(iter.peek_forward(3).is_eof());
    }

    #[test]
    fn exhausted_entry_resumes_caller() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("outer", &handler), FileId(0));
        iter.push_file(lexer("inner", &handler), FileId(1));
        assert_eq!(iter.include_depth(), 2);
        assert_eq!(text_of(&iter.eat()), "inner");
        assert_eq!(text_of(&iter.eat()), "outer");
        assert!(iter.eat().is_eof());
        assert!(iter.eat().is_eof());
    }

    #[test]
    fn peek_forward_crosses_entries() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("x y", &handler), FileId(0));
        iter.push_file(lexer("a", &handler), FileId(1));
        assert_eq!(text_of(iter.peek_forward(0)), "a");
        assert_eq!(text_of(iter.peek_forward(1)), "x");
        assert_eq!(text_of(iter.peek_forward(2)), "y");
    }

    #[test]
    fn splice_prepends() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("tail", &handler), FileId(0));
        iter.splice(vec![ident("one"), ident("two")]);
        assert_eq!(text_of(&iter.eat()), "one");
        assert_eq!(text_of(&iter.eat()), "two");
        assert_eq!(text_of(&iter.eat()), "tail");
    }

    #[test]
    fn splice_onto_empty_stack() {
        let mut iter = TokenIter::new();
        iter.splice(vec![ident("only")]);
        assert_eq!(text_of(&iter.eat()), "only");
        assert!(iter.eat().is_eof());
    }

    #[test]
    fn current_file_skips_expansion_entries() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("a", &handler), FileId(7));
        iter.splice(vec![ident("e")]);
        assert_eq!(iter.current_file(), Some(FileId(7)));
    }

    #[test]
    fn line_override_patches_pending_lookahead() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("a\nb\nc", &handler), FileId(0));
        // Materialize `b` (line 2) before overriding.
        assert_eq!(iter.peek_forward(1).span.line, 2);
        let _ = iter.eat(); // consume `a` on line 1
        iter.override_line(50, Some(Symbol::intern("gen.c")), 1);
        let b = iter.eat();
        assert_eq!(b.span.line, 50);
        assert_eq!(b.span.file.as_str(), "gen.c");
        let c = iter.eat();
        assert_eq!(c.span.line, 51);
    }

    #[test]
    fn eof_sentinel_is_line_start() {
        let mut iter = TokenIter::new();
        let eof = iter.eat();
        assert!(eof.is_eof());
        assert!(eof.at_line_start);
    }

    #[test]
    fn punct_flags_survive_the_stack() {
        let handler = Handler::new();
        let mut iter = TokenIter::new();
        iter.push_file(lexer("#define", &handler), FileId(0));
        let hash = iter.eat();
        assert!(hash.is_punct(Punct::Hash));
        assert!(hash.at_line_start);
    }
}
