//! Parse failure reporting

use crate::{Parse, RuleResult};
use std::collections::HashSet;
use std::fmt::{self, Debug, Display};

/// A set of literals or names that failed to match
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ExpectedSet {
    expected: HashSet<&'static str>,
}

impl ExpectedSet {
    /// Iterator of expected literals
    pub fn tokens(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.expected.iter().copied()
    }
}

impl Display for ExpectedSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        if self.expected.is_empty() {
            write!(fmt, "<unreported>")?;
        } else if self.expected.len() == 1 {
            write!(fmt, "{}", self.expected.iter().next().unwrap())?;
        } else {
            let mut errors = self.tokens().collect::<Vec<_>>();
            errors.sort_unstable();
            let mut iter = errors.into_iter();

            write!(fmt, "one of {}", iter.next().unwrap())?;
            for elem in iter {
                write!(fmt, ", {}", elem)?;
            }
        }

        Ok(())
    }
}

/// A failure raised by an `#error{}` block.
///
/// Unlike an ordinary match failure this aborts the entire parse: it is never
/// treated as "this alternative failed".
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct ParseErr<L> {
    /// The location at which the error occurred.
    pub location: L,

    /// The message the grammar's error block produced.
    pub message: String,
}

impl<L: Display> Display for ParseErr<L> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "error at {}: {}", self.location, self.message)
    }
}

/// A parse failure.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ParseError<L> {
    /// The furthest position the parser reached in the input before failing.
    pub location: L,

    /// The set of literals that failed to match at that position.
    pub expected: ExpectedSet,
}

impl<L: Display> Display for ParseError<L> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "error at {}: expected {}", self.location, self.expected)
    }
}

impl<L: Display + Debug> std::error::Error for ParseError<L> {}

/// Outcome of a failed top-level parse.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ParseFailure<L> {
    /// No derivation matched; carries the rightmost expected set.
    Expected(ParseError<L>),
    /// An `#error{}` block aborted the parse.
    Error(ParseErr<L>),
}

impl<L: Display> Display for ParseFailure<L> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            ParseFailure::Expected(e) => Display::fmt(e, fmt),
            ParseFailure::Error(e) => Display::fmt(e, fmt),
        }
    }
}

impl<L: Display + Debug> std::error::Error for ParseFailure<L> {}

#[doc(hidden)]
#[derive(Debug)]
pub struct ErrorState {
    /// Furthest failure we've hit so far.
    pub max_err_pos: usize,

    /// Are we inside a lookahead? If so, failure reporting is disabled.
    /// Non-zero => yes, to support nested lookaheads.
    pub suppress_fail: usize,

    /// The tokens expected at `max_err_pos`.
    pub expected: ExpectedSet,

    /// Set by an `#error{}` block; aborts the whole parse.
    pub fatal: Option<ParseErr<usize>>,
}

impl ErrorState {
    pub fn new(initial_pos: usize) -> Self {
        ErrorState {
            max_err_pos: initial_pos,
            suppress_fail: 0,
            expected: ExpectedSet {
                expected: HashSet::new(),
            },
            fatal: None,
        }
    }

    /// Flag a failure at `pos`.
    ///
    /// A failure beyond the rightmost one recorded so far replaces the
    /// expected set; a failure at the rightmost position extends it; earlier
    /// failures are ignored.
    #[inline]
    pub fn mark_failure(&mut self, pos: usize, expected: &'static str) -> RuleResult<()> {
        if self.suppress_fail == 0 {
            if pos > self.max_err_pos {
                self.max_err_pos = pos;
                self.expected.expected.clear();
            }
            if pos == self.max_err_pos {
                self.expected.expected.insert(expected);
            }
        }
        RuleResult::Failed
    }

    /// Flag a fatal `#error{}` failure. The first one wins.
    pub fn mark_fatal(&mut self, pos: usize, message: String) {
        if self.fatal.is_none() {
            self.fatal = Some(ParseErr {
                location: pos,
                message,
            });
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Build the failure returned by a parser entry point.
    pub fn into_failure<I: Parse + ?Sized>(self, input: &I) -> ParseFailure<I::PositionRepr> {
        match self.fatal {
            Some(err) => ParseFailure::Error(ParseErr {
                location: input.position_repr(err.location),
                message: err.message,
            }),
            None => ParseFailure::Expected(ParseError {
                location: input.position_repr(self.max_err_pos),
                expected: self.expected,
            }),
        }
    }
}
