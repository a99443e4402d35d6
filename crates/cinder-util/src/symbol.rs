//! String interning for identifier and file-name handling.
//!
//! A [`Symbol`] is a compact (4-byte) handle to a string stored in a global
//! table. Interning makes string comparison an integer comparison and keeps a
//! single copy of every identifier, macro name, and file name a session
//! touches.
//!
//! The table is backed by `DashMap` hashed with `AHasher`, so independent
//! preprocessing sessions running on different threads can intern without
//! blocking each other. Interned strings are allocated once and never freed;
//! the total is bounded by the unique names in the input.
//!
//! Names the preprocessor consults constantly (directive names, `defined`,
//! `__VA_ARGS__`, the dynamic builtin macros) are pre-interned at fixed
//! indices and exposed as constants in [`sym`].

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use ahash::RandomState;
use dashmap::DashMap;

/// An interned string.
///
/// Two symbols are equal exactly when the strings they intern are equal.
///
/// # Examples
///
/// ```
/// use cinder_util::Symbol;
///
/// let a = Symbol::intern("counter");
/// let b = Symbol::intern("counter");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "counter");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    /// Index into the global string table.
    pub(crate) index: u32,
}

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Interning the same string twice returns the same symbol.
    #[inline]
    pub fn intern(string: &str) -> Self {
        STRING_TABLE.intern(string)
    }

    /// The string this symbol interns.
    #[inline]
    pub fn as_str(self) -> &'static str {
        STRING_TABLE.get(self).unwrap_or("")
    }

    /// True for the interned empty string.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == sym::EMPTY
    }

    /// Raw table index, for debugging.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-interned symbols with fixed, stable indices.
///
/// The constants are declared next to their text; the table below is
/// interned in declaration order at startup, and a test pins each constant
/// to its text.
pub mod sym {
    use super::Symbol;

    macro_rules! known_symbols {
        ($($index:expr, $name:ident, $text:literal;)*) => {
            $(
                #[doc = concat!("Pre-interned `", $text, "`.")]
                pub const $name: Symbol = Symbol { index: $index };
            )*
            /// Known-symbol texts, indexed by symbol index.
            pub(super) const KNOWN: &[&str] = &[$($text),*];
        };
    }

    known_symbols! {
        0, EMPTY, "";
        // Directive names
        1, DEFINE, "define";
        2, UNDEF, "undef";
        3, INCLUDE, "include";
        4, IF, "if";
        5, IFDEF, "ifdef";
        6, IFNDEF, "ifndef";
        7, ELIF, "elif";
        8, ELSE, "else";
        9, ENDIF, "endif";
        10, LINE, "line";
        11, PRAGMA, "pragma";
        12, ERROR, "error";
        13, WARNING, "warning";
        // Preprocessor-special identifiers
        14, DEFINED, "defined";
        15, ONCE, "once";
        16, VA_ARGS, "__VA_ARGS__";
        // Dynamic builtin macros
        17, FILE_MACRO, "__FILE__";
        18, LINE_MACRO, "__LINE__";
        19, COUNTER_MACRO, "__COUNTER__";
        20, DATE_MACRO, "__DATE__";
        21, TIME_MACRO, "__TIME__";
        22, TIMESTAMP_MACRO, "__TIMESTAMP__";
        23, BASE_FILE_MACRO, "__BASE_FILE__";
        24, INCLUDE_LEVEL_MACRO, "__INCLUDE_LEVEL__";
    }
}

/// Indices below this value are reserved for [`sym`] constants.
const RESERVED_SYMBOLS_END: u32 = 64;

/// Global string table.
static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    table.initialize_known_symbols();
    table
});

/// Thread-safe string table.
///
/// Strings are leaked on first interning to obtain `'static` references;
/// the table lives for the program duration and entries are never removed.
struct StringTable {
    /// String → index. Keyed by the leaked string itself so hash collisions
    /// are resolved by the map, not by us.
    map: DashMap<&'static str, u32, RandomState>,
    /// Index → string, for `Symbol::as_str`.
    names: DashMap<u32, &'static str, RandomState>,
    /// Next free index. Starts past the reserved range.
    next_index: AtomicU32,
}

impl StringTable {
    fn new() -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher(256, RandomState::new()),
            names: DashMap::with_capacity_and_hasher(256, RandomState::new()),
            next_index: AtomicU32::new(RESERVED_SYMBOLS_END),
        }
    }

    /// Intern every [`sym`] constant at its fixed index.
    fn initialize_known_symbols(&self) {
        for (index, text) in sym::KNOWN.iter().enumerate() {
            let index = index as u32;
            debug_assert!(index < RESERVED_SYMBOLS_END);
            self.map.insert(*text, index);
            self.names.insert(index, *text);
        }
    }

    fn intern(&self, string: &str) -> Symbol {
        // Fast path: already interned.
        if let Some(entry) = self.map.get(string) {
            return Symbol { index: *entry };
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        match self.map.entry(leaked) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                // Another thread interned the same string first; our copy of
                // the bytes stays leaked, the index is shared.
                Symbol { index: *entry.get() }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let index = self.next_index.fetch_add(1, Ordering::Relaxed);
                entry.insert(index);
                self.names.insert(index, leaked);
                Symbol { index }
            }
        }
    }

    fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.names.get(&symbol.index).map(|entry| *entry)
    }
}

static_assertions::assert_eq_size!(Symbol, u32);
static_assertions::assert_impl_all!(Symbol: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn intern_same_string() {
        let a = Symbol::intern("hello");
        let b = Symbol::intern("hello");
        let c = Symbol::intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "hello");
        assert_eq!(c.as_str(), "world");
    }

    #[test]
    fn known_symbols_are_consistent() {
        for (index, text) in sym::KNOWN.iter().enumerate() {
            let symbol = Symbol::intern(text);
            assert_eq!(symbol.index, index as u32, "known symbol {text:?}");
            assert_eq!(symbol.as_str(), *text);
        }
        assert_eq!(sym::DEFINE.as_str(), "define");
        assert_eq!(sym::VA_ARGS.as_str(), "__VA_ARGS__");
        assert_eq!(sym::COUNTER_MACRO.as_str(), "__COUNTER__");
    }

    #[test]
    fn empty_string() {
        let empty = Symbol::intern("");
        assert_eq!(empty, sym::EMPTY);
        assert!(empty.is_empty());
        assert!(!Symbol::intern("x").is_empty());
    }

    #[test]
    fn display_and_debug() {
        let symbol = Symbol::intern("main");
        assert_eq!(format!("{symbol}"), "main");
        assert_eq!(format!("{symbol:?}"), "Symbol(main)");
    }

    #[test]
    fn concurrent_interning_agrees() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| Symbol::intern("shared_across_threads")))
            .collect();
        let symbols: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbol in &symbols[1..] {
            assert_eq!(symbols[0], *symbol);
        }
    }

    #[test]
    fn unicode_round_trips() {
        for text in ["größe", "日本語", "🦀"] {
            assert_eq!(Symbol::intern(text).as_str(), text);
        }
    }
}
