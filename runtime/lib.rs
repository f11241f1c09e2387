//! Runtime support for parsers generated by `peggen`.
//!
//! Generated code refers to everything in this crate by absolute path, so a
//! crate embedding a generated parser only needs this crate as a dependency.
//! The public surface of a generated parser itself is its `parse` entry
//! points; the items here are the plumbing those entry points and the
//! generated rule functions are built from.

use std::fmt::{self, Display};

pub mod error;
pub mod str;

/// The result type used internally in generated parsers.
///
/// `Matched` carries the input position after the match along with the
/// matched value. The public API of a parser adapts this to
/// `std::result::Result`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RuleResult<T> {
    Matched(usize, T),
    Failed,
}

impl<T> RuleResult<T> {
    /// Position reached by a successful match.
    pub fn end(&self) -> Option<usize> {
        match self {
            RuleResult::Matched(end, _) => Some(*end),
            RuleResult::Failed => None,
        }
    }

    /// True if `self` reaches strictly further into the input than `prev`.
    ///
    /// This is the progress measure of the seed-growing loop for memoized
    /// left-recursive rules: growing stops as soon as a re-parse fails to
    /// advance past the previous attempt.
    pub fn advances_past<U>(&self, prev: &RuleResult<U>) -> bool {
        match (self.end(), prev.end()) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// A type that can be used as input to a generated parser.
pub trait Parse {
    type PositionRepr: Display;
    fn start(&self) -> usize;
    fn is_eof(&self, pos: usize) -> bool;
    fn position_repr(&self, pos: usize) -> Self::PositionRepr;
}

/// A parser input type supporting the wildcard expression.
pub trait ParseElem: Parse {
    /// A single atomic element of the input.
    type Element;

    /// Get the element at `pos`, or `Failed` if past end of input.
    fn parse_elem(&self, pos: usize) -> RuleResult<Self::Element>;
}

/// A parser input type supporting literal expressions.
pub trait ParseLiteral: Parse {
    /// Attempt to match `literal` exactly at `pos`.
    fn parse_string_literal(&self, pos: usize, literal: &str) -> RuleResult<()>;

    /// Attempt to match `literal` at `pos`, ignoring case.
    fn parse_string_literal_insensitive(&self, pos: usize, literal: &str) -> RuleResult<()>;
}

/// A parser input type supporting character class expressions.
pub trait ParseClass: Parse {
    /// Attempt to match one element against a set of inclusive ranges.
    fn parse_class(
        &self,
        pos: usize,
        ranges: &[(char, char)],
        negated: bool,
        insensitive: bool,
    ) -> RuleResult<()>;
}

/// A parser input type whose spans can be sliced, for synthesized span values.
pub trait ParseSlice<'input>: Parse {
    /// Type of a slice of the input.
    type Slice;

    /// Get a slice of input.
    fn parse_slice(&'input self, p1: usize, p2: usize) -> Self::Slice;
}

/// A span recorded by a rule flagged `lexical`.
///
/// Spans are collected in completion order: a lexical rule nested inside
/// another lexical rule's derivation is recorded before its enclosing rule.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LexicalElement {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
}

impl Display for LexicalElement {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}@{}:{}", self.name, self.start, self.end)
    }
}
