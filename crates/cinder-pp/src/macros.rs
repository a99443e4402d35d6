//! The macro registry.
//!
//! Macro names are unique: `#define` of an existing name is an error unless
//! the new definition is token-for-token identical (same kinds, lexemes, and
//! spacing). The dynamic builtin macros are pre-populated at construction
//! and protected from both `#define` and `#undef`.

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::FxHasher;

use cinder_util::{sym, Handler, Span, Symbol};

use crate::token::{PpToken, PpTokenKind};

/// Capacity hint matching the fixed table size the registry replaces.
const MACRO_TABLE_CAPACITY: usize = 2048;

/// The dynamic builtin macros, whose expansion is computed at the
/// invocation site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    File,
    Line,
    Counter,
    Date,
    Time,
    Timestamp,
    BaseFile,
    IncludeLevel,
}

impl Builtin {
    /// Every builtin with its name, for registration.
    pub const ALL: &'static [(Symbol, Builtin)] = &[
        (sym::FILE_MACRO, Builtin::File),
        (sym::LINE_MACRO, Builtin::Line),
        (sym::COUNTER_MACRO, Builtin::Counter),
        (sym::DATE_MACRO, Builtin::Date),
        (sym::TIME_MACRO, Builtin::Time),
        (sym::TIMESTAMP_MACRO, Builtin::Timestamp),
        (sym::BASE_FILE_MACRO, Builtin::BaseFile),
        (sym::INCLUDE_LEVEL_MACRO, Builtin::IncludeLevel),
    ];
}

/// What a registered name expands to.
#[derive(Clone, Debug)]
pub enum MacroKind {
    /// `#define NAME body…`
    Object { body: Vec<PpToken> },
    /// `#define NAME(params…) body…`
    Function {
        params: Vec<Symbol>,
        variadic: bool,
        body: Vec<PpToken>,
    },
    /// Computed at the invocation site.
    Builtin(Builtin),
}

/// One registered macro.
#[derive(Clone, Debug)]
pub struct Macro {
    pub name: Symbol,
    /// Where the macro was defined, for redefinition diagnostics.
    pub span: Span,
    pub kind: MacroKind,
}

/// Name → macro table for one session.
///
/// Insertion order is preserved, so listing and diagnostics are
/// deterministic for a given input.
pub struct MacroTable {
    map: IndexMap<Symbol, Macro, BuildHasherDefault<FxHasher>>,
}

impl MacroTable {
    /// Create a table with the builtin macros installed.
    pub fn new() -> Self {
        let mut map = IndexMap::with_capacity_and_hasher(
            MACRO_TABLE_CAPACITY,
            BuildHasherDefault::default(),
        );
        for &(name, builtin) in Builtin::ALL {
            map.insert(
                name,
                Macro {
                    name,
                    span: Span::DUMMY,
                    kind: MacroKind::Builtin(builtin),
                },
            );
        }
        Self { map }
    }

    pub fn get(&self, name: Symbol) -> Option<&Macro> {
        self.map.get(&name)
    }

    pub fn is_defined(&self, name: Symbol) -> bool {
        self.map.contains_key(&name)
    }

    /// Register a macro, enforcing the redefinition rules.
    pub fn define(&mut self, mac: Macro, handler: &Handler) {
        let Some(existing) = self.map.get(&mac.name) else {
            tracing::trace!(name = %mac.name, "macro defined");
            self.map.insert(mac.name, mac);
            return;
        };
        if matches!(existing.kind, MacroKind::Builtin(_)) {
            handler.error(
                format!("redefining builtin macro '{}'", mac.name),
                mac.span,
            );
        } else if !same_definition(&existing.kind, &mac.kind) {
            handler.error(format!("macro '{}' redefined", mac.name), mac.span);
            handler.note(
                format!("previous definition of '{}' is kept", mac.name),
                existing.span,
            );
        }
        // A token-for-token identical redefinition is allowed and leaves
        // the original in place.
    }

    /// Remove a macro. Absent names warn; builtins refuse.
    pub fn undef(&mut self, name: Symbol, span: Span, handler: &Handler) {
        let Some(mac) = self.map.get(&name) else {
            handler.warning(format!("'{name}' is not a defined macro"), span);
            return;
        };
        if matches!(mac.kind, MacroKind::Builtin(_)) {
            handler.error(format!("undefining builtin macro '{name}'"), span);
            return;
        }
        self.map.shift_remove(&name);
    }
}

impl Default for MacroTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Token-for-token identity, the condition under which a redefinition is
/// allowed. Spacing between body tokens is significant; locations are not.
fn same_definition(a: &MacroKind, b: &MacroKind) -> bool {
    match (a, b) {
        (MacroKind::Object { body: a }, MacroKind::Object { body: b }) => same_body(a, b),
        (
            MacroKind::Function {
                params: pa,
                variadic: va,
                body: ba,
            },
            MacroKind::Function {
                params: pb,
                variadic: vb,
                body: bb,
            },
        ) => pa == pb && va == vb && same_body(ba, bb),
        _ => false,
    }
}

fn same_body(a: &[PpToken], b: &[PpToken]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.kind == y.kind && x.has_space == y.has_space)
}

/// True if a body is well-formed with respect to the paste operator, which
/// may not appear at either end.
pub fn check_paste_placement(body: &[PpToken], span: Span, handler: &Handler) {
    let at_edge = |t: Option<&PpToken>| {
        t.map(|t| t.kind == PpTokenKind::Punct(crate::token::Punct::HashHash))
            .unwrap_or(false)
    };
    if at_edge(body.first()) || at_edge(body.last()) {
        handler.error(
            "'##' cannot appear at either end of a macro expansion",
            span,
        );
    }
}
