//! Property tests: random macro definitions must never hang the expander,
//! and preprocessing is deterministic.

use bumpalo::Bump;
use cinder_pp::{print_tokens, Preprocessor};
use cinder_util::Handler;
use proptest::prelude::*;

/// A small closed alphabet of macro names; bodies reference only these, so
/// self- and mutual recursion are generated often.
const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn run_once(source: &str) -> String {
    let arena = Bump::new();
    let handler = Handler::new();
    let tokens = {
        let mut pp = Preprocessor::new(&arena, &handler);
        pp.set_counter_start(0);
        pp.pp_tokens_source("prop.c", source)
    };
    print_tokens(&tokens)
}

fn name_index() -> impl Strategy<Value = usize> {
    0..NAMES.len()
}

/// `(name, body)` pairs; a body is a short sequence of names from the same
/// alphabet.
fn definitions() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    prop::collection::vec((name_index(), prop::collection::vec(name_index(), 0..4)), 0..4)
}

fn program(defs: &[(usize, Vec<usize>)], uses: &[usize]) -> String {
    let mut source = String::new();
    let mut defined = Vec::new();
    for (name, body) in defs {
        // Redefinitions of a different body are diagnosed but must not
        // affect termination; keep the program single-definition so the
        // determinism check sees a clean run.
        if defined.contains(name) {
            continue;
        }
        defined.push(*name);
        source.push_str("#define ");
        source.push_str(NAMES[*name]);
        for part in body {
            source.push(' ');
            source.push_str(NAMES[*part]);
        }
        source.push('\n');
    }
    for used in uses {
        source.push_str(NAMES[*used]);
        source.push(' ');
    }
    source.push('\n');
    source
}

proptest! {
    /// Expansion terminates on every input. Reaching the assertion at all
    /// means no macro chain recursed forever; the painted-name rule cuts
    /// every cycle.
    #[test]
    fn expansion_always_terminates(
        defs in definitions(),
        uses in prop::collection::vec(name_index(), 1..8),
    ) {
        let source = program(&defs, &uses);
        let printed = run_once(&source);
        // Every output token spells one of the alphabet names.
        for word in printed.split_whitespace() {
            prop_assert!(NAMES.contains(&word), "unexpected token {word:?}");
        }
    }

    /// The same input and the same `__COUNTER__` start produce the same
    /// output.
    #[test]
    fn preprocessing_is_deterministic(
        defs in definitions(),
        uses in prop::collection::vec(name_index(), 1..8),
    ) {
        let source = program(&defs, &uses);
        prop_assert_eq!(run_once(&source), run_once(&source));
    }

    /// The lossy pretty-print is idempotent: printing, re-lexing, and
    /// printing again reproduces the string.
    #[test]
    fn pretty_print_is_idempotent(
        defs in definitions(),
        uses in prop::collection::vec(name_index(), 1..8),
    ) {
        let source = program(&defs, &uses);
        let first = run_once(&source);
        let second = run_once(&first);
        prop_assert_eq!(first, second);
    }
}
