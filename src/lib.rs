//! `peggen` compiles a parsing expression grammar into Rust source for a
//! backtracking recursive-descent parser with packrat memoization and
//! seed-grown left recursion.
//!
//! The input is a [`Grammar`] value produced by an external grammar parser;
//! this crate never reads grammar text itself. [`compile`] runs a fixed
//! sequence of analysis passes, each contributing diagnostics with stable
//! `PEG00xx` codes, and finally emits the parser source. Generated parsers
//! depend on the `peggen-runtime` crate and expose a `parse` entry point
//! (plus a `parse_with_lexical` overload when the grammar has lexical
//! rules, and one entry per `export`/`public` rule).
//!
//! ```
//! use peggen::ast::{Expression, Grammar, Rule};
//!
//! let grammar = Grammar::new(vec![], vec![Rule::new("start", Expression::literal("OK"))]);
//! let result = peggen::compile(&grammar);
//! assert!(result.diagnostics.is_empty());
//! assert!(result.code.contains("pub fn parse"));
//! ```

pub mod ast;
pub mod diagnostics;

mod analysis;
mod translate;
mod types;
mod validate;

use crate::ast::Grammar;
use crate::diagnostics::{Diagnostic, Diagnostics, Severity};

pub use crate::types::{ExpressionTypes, Ty};

/// The output of one compile invocation.
pub struct CompileResult<'g> {
    /// Generated parser source; empty when a structural error suppressed
    /// code generation.
    pub code: String,
    /// Every diagnostic, in pass order then discovery order.
    pub diagnostics: Vec<Diagnostic>,
    /// The inferred type of every expression in the grammar, exposed for
    /// external analysis and testing.
    pub types: ExpressionTypes<'g>,
}

impl<'g> CompileResult<'g> {
    /// The error-severity diagnostics, in order.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// Compile a grammar.
///
/// Never fails: every problem is reported as a diagnostic, and warnings do
/// not block code generation. Passes run in a fixed order and each appends
/// its findings, so the diagnostic list's order is a stable contract.
pub fn compile(grammar: &Grammar) -> CompileResult<'_> {
    let mut diagnostics = Diagnostics::new();

    validate::rule_count(grammar, &mut diagnostics);
    validate::duplicate_rules(grammar, &mut diagnostics);
    validate::references(grammar, &mut diagnostics);
    validate::labels(grammar, &mut diagnostics);
    validate::settings(grammar, &mut diagnostics);
    validate::flags(grammar, &mut diagnostics);
    validate::quantifiers(grammar, &mut diagnostics);
    validate::resources(grammar, &mut diagnostics);

    let types = types::infer(grammar, &mut diagnostics);
    let analysis = analysis::check(grammar, &mut diagnostics);

    validate::usage(grammar, &mut diagnostics);
    validate::naming(grammar, &mut diagnostics);

    let code = if diagnostics.blocks_codegen() {
        String::new()
    } else {
        translate::compile_grammar(grammar, &types, &analysis)
    };

    CompileResult {
        code,
        diagnostics: diagnostics.into_vec(),
        types,
    }
}
