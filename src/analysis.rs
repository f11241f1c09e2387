//! Left-recursion and memoization analysis.
//!
//! Builds the graph of rules reachable at a rule's first parsed position,
//! classifies its cycles (resolvable by seed-growing over a memoized entry
//! point, unmemoized, or ambiguous), and flags repetitions whose bodies can
//! match zero width.

use std::collections::{HashMap, HashSet};

use crate::ast::{CodeKind, Expression, Grammar, Rule};
use crate::diagnostics::{Code, Diagnostics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemoRequirement {
    NotRequired,
    /// Memoized and on an accepted left-recursive cycle: the rule gets the
    /// seed-growing fixed-point wrapper at code generation.
    Required,
    /// On a cycle that needs memoization no rule provides (PEG0020).
    Missing,
}

pub(crate) struct Analysis {
    memo: HashMap<String, MemoRequirement>,
}

impl Analysis {
    pub(crate) fn requirement(&self, rule: &str) -> MemoRequirement {
        self.memo
            .get(rule)
            .copied()
            .unwrap_or(MemoRequirement::NotRequired)
    }
}

struct Edge {
    target: usize,
    assertion: bool,
}

pub(crate) fn check(grammar: &Grammar, diagnostics: &mut Diagnostics) -> Analysis {
    // First definition wins, matching the other passes' handling of
    // PEG0002 grammars.
    let mut rules: Vec<&Rule> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for rule in &grammar.rules {
        if !index.contains_key(rule.name.as_str()) {
            index.insert(rule.name.as_str(), rules.len());
            rules.push(rule);
        }
    }

    let mut walker = Walker {
        rules: &rules,
        index: &index,
        nullable: vec![Cached::Unknown; rules.len()],
        zero_width: vec![Cached::Unknown; rules.len()],
    };

    let mut edges: Vec<Vec<Edge>> = Vec::with_capacity(rules.len());
    for rule in &rules {
        let mut out = Vec::new();
        walker.collect_first(&rule.expr, false, &mut out);
        edges.push(out);
    }

    let adjacency: Vec<Vec<usize>> = edges
        .iter()
        .map(|out| {
            let mut targets: Vec<usize> = out.iter().map(|e| e.target).collect();
            targets.sort_unstable();
            targets.dedup();
            targets
        })
        .collect();

    let mut components = strongly_connected(&adjacency);
    components.retain(|comp| comp.len() > 1 || adjacency[comp[0]].contains(&comp[0]));
    components.sort_by_key(|comp| comp[0]);

    let mut memo: HashMap<String, MemoRequirement> = rules
        .iter()
        .map(|r| (r.name.clone(), MemoRequirement::NotRequired))
        .collect();

    for comp in &components {
        let comp_set: HashSet<usize> = comp.iter().copied().collect();
        let span = rules[comp[0]].span;
        let path = cycle_path(&rules, comp);

        let through_assertion = comp.iter().any(|&m| {
            edges[m]
                .iter()
                .any(|e| e.assertion && comp_set.contains(&e.target))
        });
        if through_assertion {
            diagnostics.error(
                Code::AmbiguousLeftRecursion,
                span,
                format!("ambiguous left recursion through a lookahead: {}", path),
            );
            continue;
        }

        let memoized: Vec<usize> = comp
            .iter()
            .copied()
            .filter(|&m| rules[m].is_memoized())
            .collect();
        if memoized.is_empty() {
            diagnostics.error(
                Code::UnmemoizedLeftRecursion,
                span,
                format!("left recursive rules require memoization: {}", path),
            );
            for &m in comp {
                memo.insert(rules[m].name.clone(), MemoRequirement::Missing);
            }
            continue;
        }

        // Two memoized rules each carrying their own base case make the
        // fixed point depend on which rule is entered first.
        let competing = memoized
            .iter()
            .filter(|&&m| choice_mixes(&mut walker, rules[m], &comp_set))
            .count();
        if competing >= 2 {
            diagnostics.error(
                Code::AmbiguousLeftRecursion,
                span,
                format!("ambiguous left recursion: no single base case dominates {}", path),
            );
            continue;
        }

        for &m in &memoized {
            memo.insert(rules[m].name.clone(), MemoRequirement::Required);
        }
    }

    for rule in &rules {
        rule.expr.walk(&mut |e| {
            if let Expression::Repetition {
                inner,
                min,
                max,
                span,
            } = e
            {
                if *max == Some(*min) {
                    // Fixed repetition count; cannot diverge.
                    return;
                }
                if !walker.expr_zero_width(inner) {
                    return;
                }
                match max {
                    None => {
                        if contains_code(inner) {
                            diagnostics.warning(
                                Code::UnboundedZeroWidthRepetition,
                                *span,
                                "unbounded repetition of a zero-width code expression cannot make progress",
                            );
                        } else {
                            diagnostics.error(
                                Code::UnboundedZeroWidthRepetition,
                                *span,
                                "unbounded repetition of a zero-width expression creates an infinite loop",
                            );
                        }
                    }
                    Some(_) => {
                        diagnostics.warning(
                            Code::BoundedZeroWidthRepetition,
                            *span,
                            "bounded repetition of a zero-width expression matches the same position repeatedly",
                        );
                    }
                }
            }
        });
    }

    Analysis { memo }
}

fn cycle_path(rules: &[&Rule], comp: &[usize]) -> String {
    let mut names: Vec<&str> = comp.iter().map(|&m| rules[m].name.as_str()).collect();
    names.push(names[0]);
    names.join(" -> ")
}

/// True when the rule's root choice has both an alternative that re-enters
/// the cycle at its first position and one that does not.
fn choice_mixes(walker: &mut Walker, rule: &Rule, comp: &HashSet<usize>) -> bool {
    let alternatives = match root_choice(&rule.expr) {
        Some(alts) => alts,
        None => return false,
    };
    let mut in_cycle = false;
    let mut base = false;
    for alt in alternatives {
        let mut refs = Vec::new();
        walker.collect_first(alt, false, &mut refs);
        if refs.iter().any(|e| comp.contains(&e.target)) {
            in_cycle = true;
        } else {
            base = true;
        }
    }
    in_cycle && base
}

fn root_choice(e: &Expression) -> Option<&[Expression]> {
    match e {
        Expression::Choice(alternatives) => Some(alternatives),
        Expression::Typed { inner, .. } => root_choice(inner),
        _ => None,
    }
}

fn contains_code(e: &Expression) -> bool {
    let mut found = false;
    e.walk(&mut |e| {
        if matches!(
            e,
            Expression::Code {
                kind: CodeKind::Action
                    | CodeKind::AndCode
                    | CodeKind::NotCode
                    | CodeKind::ParseCode,
                ..
            }
        ) {
            found = true;
        }
    });
    found
}

#[derive(Clone, Copy)]
enum Cached {
    Unknown,
    InProgress,
    Done(bool),
}

struct Walker<'g> {
    rules: &'g [&'g Rule],
    index: &'g HashMap<&'g str, usize>,
    nullable: Vec<Cached>,
    zero_width: Vec<Cached>,
}

impl<'g> Walker<'g> {
    /// True if the rule is known to match without consuming any input.
    /// Conservative: an unresolved cycle counts as consuming, to avoid
    /// reporting false positives for left recursion.
    fn rule_nullable(&mut self, i: usize) -> bool {
        match self.nullable[i] {
            Cached::Done(b) => b,
            Cached::InProgress => false,
            Cached::Unknown => {
                self.nullable[i] = Cached::InProgress;
                let b = self.expr_nullable(&self.rules[i].expr);
                self.nullable[i] = Cached::Done(b);
                b
            }
        }
    }

    fn expr_nullable(&mut self, e: &Expression) -> bool {
        match e {
            Expression::Literal { value, .. } => value.is_empty(),
            Expression::Class { .. } | Expression::Wildcard { .. } => false,
            Expression::Name { name, .. } => match self.index.get(name.as_str()) {
                Some(&i) => self.rule_nullable(i),
                None => false,
            },
            Expression::Sequence(items) => {
                let mut all = true;
                for item in items {
                    all &= self.expr_nullable(item);
                }
                all
            }
            Expression::Choice(alternatives) => {
                let mut any = false;
                for alt in alternatives {
                    any |= self.expr_nullable(alt);
                }
                any
            }
            Expression::Repetition { inner, min, .. } => *min == 0 || self.expr_nullable(inner),
            Expression::And(_) | Expression::Not(_) => true,
            Expression::Prefixed { inner, .. } | Expression::Typed { inner, .. } => {
                self.expr_nullable(inner)
            }
            Expression::Code {
                kind: CodeKind::Action | CodeKind::AndCode | CodeKind::NotCode,
                ..
            } => true,
            // `#parse{}` width is unknown; `#error{}` aborts.
            Expression::Code { .. } => false,
        }
    }

    /// Like nullability, but for the repetition hazard check: `#parse{}`
    /// counts as possibly zero-width, since the static analysis cannot prove
    /// it makes progress.
    fn rule_zero_width(&mut self, i: usize) -> bool {
        match self.zero_width[i] {
            Cached::Done(b) => b,
            Cached::InProgress => false,
            Cached::Unknown => {
                self.zero_width[i] = Cached::InProgress;
                let b = self.expr_zero_width(&self.rules[i].expr);
                self.zero_width[i] = Cached::Done(b);
                b
            }
        }
    }

    fn expr_zero_width(&mut self, e: &Expression) -> bool {
        match e {
            Expression::Literal { value, .. } => value.is_empty(),
            Expression::Class { .. } | Expression::Wildcard { .. } => false,
            Expression::Name { name, .. } => match self.index.get(name.as_str()) {
                Some(&i) => self.rule_zero_width(i),
                None => false,
            },
            Expression::Sequence(items) => {
                let mut all = true;
                for item in items {
                    all &= self.expr_zero_width(item);
                }
                all
            }
            Expression::Choice(alternatives) => {
                let mut any = false;
                for alt in alternatives {
                    any |= self.expr_zero_width(alt);
                }
                any
            }
            Expression::Repetition { inner, min, .. } => *min == 0 || self.expr_zero_width(inner),
            Expression::And(_) | Expression::Not(_) => true,
            Expression::Prefixed { inner, .. } | Expression::Typed { inner, .. } => {
                self.expr_zero_width(inner)
            }
            Expression::Code {
                kind: CodeKind::ErrorCode,
                ..
            } => false,
            Expression::Code { .. } => true,
        }
    }

    /// Collect every rule reference reachable before any required input is
    /// consumed: sequence prefixes up to the first non-nullable member, all
    /// choice alternatives, assertion bodies, repetition bodies.
    fn collect_first(&mut self, e: &Expression, in_assert: bool, out: &mut Vec<Edge>) {
        match e {
            Expression::Name { name, .. } => {
                if let Some(&i) = self.index.get(name.as_str()) {
                    out.push(Edge {
                        target: i,
                        assertion: in_assert,
                    });
                }
            }
            Expression::Sequence(items) => {
                for item in items {
                    self.collect_first(item, in_assert, out);
                    if !self.expr_nullable(item) {
                        break;
                    }
                }
            }
            Expression::Choice(alternatives) => {
                for alt in alternatives {
                    self.collect_first(alt, in_assert, out);
                }
            }
            Expression::Repetition { inner, .. } => self.collect_first(inner, in_assert, out),
            Expression::And(inner) | Expression::Not(inner) => {
                self.collect_first(inner, true, out)
            }
            Expression::Prefixed { inner, .. } | Expression::Typed { inner, .. } => {
                self.collect_first(inner, in_assert, out)
            }
            _ => {}
        }
    }
}

fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        adjacency: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        counter: usize,
        components: Vec<Vec<usize>>,
    }

    fn connect(s: &mut State, v: usize) {
        s.index[v] = Some(s.counter);
        s.low[v] = s.counter;
        s.counter += 1;
        s.stack.push(v);
        s.on_stack[v] = true;

        for i in 0..s.adjacency[v].len() {
            let w = s.adjacency[v][i];
            match s.index[w] {
                None => {
                    connect(s, w);
                    s.low[v] = s.low[v].min(s.low[w]);
                }
                Some(w_index) if s.on_stack[w] => {
                    s.low[v] = s.low[v].min(w_index);
                }
                _ => {}
            }
        }

        if s.low[v] == s.index[v].unwrap() {
            let mut comp = Vec::new();
            loop {
                let w = s.stack.pop().unwrap();
                s.on_stack[w] = false;
                comp.push(w);
                if w == v {
                    break;
                }
            }
            comp.sort_unstable();
            s.components.push(comp);
        }
    }

    let n = adjacency.len();
    let mut state = State {
        adjacency,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            connect(&mut state, v);
        }
    }
    state.components
}
