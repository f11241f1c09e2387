use super::{Parse, ParseClass, ParseElem, ParseLiteral, ParseSlice, RuleResult};
use std::fmt;

/// Line and column within a `str` subject.
///
/// Lines and columns are 1-based; `offset` is the byte offset.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl fmt::Display for LineCol {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.line, self.column)
    }
}

impl Parse for str {
    type PositionRepr = LineCol;

    fn start(&self) -> usize {
        0
    }

    fn is_eof(&self, pos: usize) -> bool {
        pos >= self.len()
    }

    fn position_repr(&self, pos: usize) -> LineCol {
        let before = &self[..pos];
        let line = before.as_bytes().iter().filter(|&&b| b == b'\n').count() + 1;
        let column = before.chars().rev().take_while(|&c| c != '\n').count() + 1;
        LineCol {
            line,
            column,
            offset: pos,
        }
    }
}

impl ParseElem for str {
    type Element = char;

    fn parse_elem(&self, pos: usize) -> RuleResult<char> {
        match self[pos..].chars().next() {
            Some(c) => RuleResult::Matched(pos + c.len_utf8(), c),
            None => RuleResult::Failed,
        }
    }
}

impl ParseLiteral for str {
    fn parse_string_literal(&self, pos: usize, literal: &str) -> RuleResult<()> {
        let l = literal.len();
        if self.len() >= pos + l && &self.as_bytes()[pos..pos + l] == literal.as_bytes() {
            RuleResult::Matched(pos + l, ())
        } else {
            RuleResult::Failed
        }
    }

    fn parse_string_literal_insensitive(&self, pos: usize, literal: &str) -> RuleResult<()> {
        // Compared char by char: a case fold can change the byte length of
        // the matched input, so the advance is the input's length, not the
        // literal's.
        let mut chars = self[pos..].chars();
        let mut len = 0;
        for want in literal.chars() {
            match chars.next() {
                Some(have) if have == want || have.to_lowercase().eq(want.to_lowercase()) => {
                    len += have.len_utf8();
                }
                _ => return RuleResult::Failed,
            }
        }
        RuleResult::Matched(pos + len, ())
    }
}

fn in_ranges(c: char, ranges: &[(char, char)]) -> bool {
    ranges.iter().any(|&(min, max)| c >= min && c <= max)
}

impl ParseClass for str {
    fn parse_class(
        &self,
        pos: usize,
        ranges: &[(char, char)],
        negated: bool,
        insensitive: bool,
    ) -> RuleResult<()> {
        let c = match self[pos..].chars().next() {
            Some(c) => c,
            None => return RuleResult::Failed,
        };
        let mut hit = in_ranges(c, ranges);
        if !hit && insensitive && c.is_alphabetic() {
            hit = c.to_lowercase().any(|v| in_ranges(v, ranges))
                || c.to_uppercase().any(|v| in_ranges(v, ranges));
        }
        if hit != negated {
            RuleResult::Matched(pos + c.len_utf8(), ())
        } else {
            RuleResult::Failed
        }
    }
}

impl<'input> ParseSlice<'input> for str {
    type Slice = &'input str;

    fn parse_slice(&'input self, p1: usize, p2: usize) -> &'input str {
        &self[p1..p2]
    }
}
