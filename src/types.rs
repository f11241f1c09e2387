//! Type inference: computes the value type every expression yields, bottom-up
//! over a rule-reference graph that may contain cycles.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::ast::{CodeKind, Expression, Grammar, Rule};
use crate::diagnostics::{Code, Diagnostics};

/// The value type an expression yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// A slice of the subject text, `&'input str` in generated code.
    Str,
    /// No value.
    Unit,
    /// Ordered list of the inner type.
    List(Box<Ty>),
    /// A declared host type, verbatim.
    Named(String),
    /// Could not be determined; PEG0019 where a type is required.
    Unknown,
}

impl fmt::Display for Ty {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ty::Str => fmt.write_str("&'input str"),
            Ty::Unit => fmt.write_str("()"),
            Ty::List(inner) => write!(fmt, "Vec<{}>", inner),
            Ty::Named(name) => fmt.write_str(name),
            Ty::Unknown => fmt.write_str("<unknown>"),
        }
    }
}

/// Expression-to-type table, keyed by node identity within the grammar the
/// compile consumed. The borrow ties the table's validity to that grammar.
pub struct ExpressionTypes<'g> {
    map: HashMap<usize, Ty>,
    rules: HashMap<String, Ty>,
    _grammar: PhantomData<&'g Expression>,
}

impl<'g> ExpressionTypes<'g> {
    fn new() -> ExpressionTypes<'g> {
        ExpressionTypes {
            map: HashMap::new(),
            rules: HashMap::new(),
            _grammar: PhantomData,
        }
    }

    fn insert(&mut self, expr: &'g Expression, ty: Ty) {
        self.map.insert(expr as *const Expression as usize, ty);
    }

    pub fn get(&self, expr: &Expression) -> Option<&Ty> {
        self.map.get(&(expr as *const Expression as usize))
    }

    /// The result type of a rule: its declared type, or the inferred type of
    /// its root expression.
    pub fn rule(&self, name: &str) -> Option<&Ty> {
        self.rules.get(name)
    }
}

/// Members that contribute a value to their parent sequence: everything but
/// labels (consumed by action code) and zero-width code assertions.
pub(crate) fn is_value_member(e: &Expression) -> bool {
    !matches!(
        e,
        Expression::Prefixed { .. }
            | Expression::Code {
                kind: CodeKind::AndCode | CodeKind::NotCode | CodeKind::ErrorCode,
                ..
            }
    )
}

pub(crate) fn infer<'g>(grammar: &'g Grammar, diagnostics: &mut Diagnostics) -> ExpressionTypes<'g> {
    let mut rules: HashMap<&'g str, &'g Rule> = HashMap::new();
    for rule in &grammar.rules {
        rules.entry(rule.name.as_str()).or_insert(rule);
    }

    let mut cx = InferContext {
        rules,
        states: HashMap::new(),
        types: ExpressionTypes::new(),
    };

    for rule in &grammar.rules {
        cx.rule_ty(&rule.name);
    }

    let mut seen = std::collections::HashSet::new();
    for rule in &grammar.rules {
        if !seen.insert(rule.name.as_str()) {
            continue;
        }
        if rule.is_memoized() && cx.rule_ty(&rule.name) == Ty::Unknown {
            diagnostics.error(
                Code::UnresolvedType,
                rule.span,
                format!("could not determine the result type of rule `{}`", rule.name),
            );
        }
        rule.expr.walk(&mut |e| {
            if let Expression::Prefixed { label, span, inner } = e {
                if cx.types.get(inner) == Some(&Ty::Unknown) {
                    diagnostics.error(
                        Code::UnresolvedType,
                        *span,
                        format!("could not determine the type captured by label `{}`", label),
                    );
                }
            }
        });
    }

    for (name, rule) in cx.rules.clone() {
        let ty = cx.rule_ty(&rule.name);
        cx.types.rules.insert(name.to_owned(), ty);
    }

    cx.types
}

enum RuleState {
    InProgress,
    Done(Ty),
}

struct InferContext<'g> {
    rules: HashMap<&'g str, &'g Rule>,
    states: HashMap<&'g str, RuleState>,
    types: ExpressionTypes<'g>,
}

impl<'g> InferContext<'g> {
    fn rule_ty(&mut self, name: &str) -> Ty {
        let rule = match self.rules.get(name) {
            Some(rule) => *rule,
            None => return Ty::Unknown,
        };
        match self.states.get(rule.name.as_str()) {
            Some(RuleState::Done(ty)) => return ty.clone(),
            // A reference back into a rule whose body is still being
            // inferred: no base type is available on this path.
            Some(RuleState::InProgress) => return Ty::Unknown,
            None => {}
        }
        self.states
            .insert(rule.name.as_str(), RuleState::InProgress);

        let declared = rule.ret_type.clone().map(Ty::Named);
        let inferred = self.infer_expr(&rule.expr, declared.as_ref());
        let ty = declared.unwrap_or(inferred);

        self.states
            .insert(rule.name.as_str(), RuleState::Done(ty.clone()));
        ty
    }

    /// `ambient` is the declared type flowing down from the rule or the
    /// nearest `Typed` annotation; action and `#parse{}` blocks take it as
    /// their result type, defaulting to the matched text when absent.
    fn infer_expr(&mut self, expr: &'g Expression, ambient: Option<&Ty>) -> Ty {
        let ty = match expr {
            Expression::Literal { .. } | Expression::Class { .. } | Expression::Wildcard { .. } => {
                Ty::Str
            }
            Expression::Name { name, .. } => self.rule_ty(name),
            Expression::Sequence(items) => {
                let member_tys: Vec<Ty> = items
                    .iter()
                    .map(|e| self.infer_expr(e, ambient))
                    .collect();
                if matches!(
                    items.last(),
                    Some(Expression::Code {
                        kind: CodeKind::Action,
                        ..
                    })
                ) {
                    member_tys.last().cloned().unwrap()
                } else {
                    let values: Vec<&Ty> = items
                        .iter()
                        .zip(&member_tys)
                        .filter(|(e, _)| is_value_member(e))
                        .map(|(_, ty)| ty)
                        .collect();
                    match values.as_slice() {
                        [single] => (*single).clone(),
                        _ => Ty::Str,
                    }
                }
            }
            Expression::Choice(alternatives) => {
                let mut tys = alternatives.iter().map(|e| self.infer_expr(e, ambient));
                match tys.next() {
                    Some(first) => {
                        if tys.all(|ty| ty == first) {
                            first
                        } else {
                            Ty::Unknown
                        }
                    }
                    None => Ty::Str,
                }
            }
            Expression::Repetition { inner, .. } => {
                Ty::List(Box::new(self.infer_expr(inner, None)))
            }
            Expression::And(inner) => self.infer_expr(inner, ambient),
            Expression::Not(inner) => {
                // A negative lookahead succeeds only when the inner
                // expression failed, so its value is the empty span.
                self.infer_expr(inner, None);
                Ty::Str
            }
            Expression::Prefixed { inner, .. } => {
                self.infer_expr(inner, None);
                Ty::Unit
            }
            Expression::Code {
                kind: CodeKind::Action | CodeKind::ParseCode,
                ..
            } => ambient.cloned().unwrap_or(Ty::Str),
            Expression::Code { .. } => Ty::Unit,
            Expression::Typed { ty, inner } => {
                let named = Ty::Named(ty.clone());
                self.infer_expr(inner, Some(&named));
                named
            }
        };
        self.types.insert(expr, ty.clone());
        ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression as E;

    fn grammar_of(rules: Vec<Rule>) -> Grammar {
        Grammar::new(vec![], rules)
    }

    #[test]
    fn literal_yields_the_matched_text() {
        let grammar = grammar_of(vec![Rule::new("a", E::literal("OK"))]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        assert_eq!(types.get(&grammar.rules[0].expr), Some(&Ty::Str));
        assert_eq!(types.rule("a"), Some(&Ty::Str));
    }

    #[test]
    fn repetition_yields_a_list() {
        let grammar = grammar_of(vec![Rule::new("a", E::repeat(E::wildcard(), 0, None))]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        assert_eq!(
            types.rule("a"),
            Some(&Ty::List(Box::new(Ty::Str)))
        );
    }

    #[test]
    fn declared_type_flows_into_a_trailing_action() {
        let rule = Rule::new(
            "a",
            E::sequence(vec![E::labeled("d", E::wildcard()), E::action("d.parse().unwrap()")]),
        )
        .with_type("i64");
        let grammar = grammar_of(vec![rule]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        assert_eq!(types.rule("a"), Some(&Ty::Named("i64".to_owned())));
        assert_eq!(
            types.get(&grammar.rules[0].expr),
            Some(&Ty::Named("i64".to_owned()))
        );
    }

    #[test]
    fn mixed_choice_is_unknown() {
        let rule = Rule::new(
            "a",
            E::choice(vec![
                E::typed("i64", E::sequence(vec![E::literal("x"), E::action("1")])),
                E::literal("y"),
            ]),
        );
        let grammar = grammar_of(vec![rule]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        assert_eq!(types.get(&grammar.rules[0].expr), Some(&Ty::Unknown));
    }

    #[test]
    fn self_recursive_rule_without_a_base_type_is_unknown() {
        let grammar = grammar_of(vec![Rule::new("a", E::name("a"))]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        assert_eq!(types.rule("a"), Some(&Ty::Unknown));
    }

    #[test]
    fn positive_lookahead_passes_the_inner_type_through() {
        let rule = Rule::new(
            "a",
            E::sequence(vec![E::labeled(
                "x",
                E::and(E::typed(
                    "i64",
                    E::sequence(vec![E::literal("OK"), E::action("0")]),
                )),
            )]),
        );
        let grammar = grammar_of(vec![rule]);
        let mut diagnostics = Diagnostics::new();
        let types = infer(&grammar, &mut diagnostics);
        let root = &grammar.rules[0].expr;
        let and_expr = match root {
            Expression::Sequence(items) => match &items[0] {
                Expression::Prefixed { inner, .. } => &**inner,
                _ => panic!("expected label"),
            },
            _ => panic!("expected sequence"),
        };
        assert_eq!(types.get(and_expr), Some(&Ty::Named("i64".to_owned())));
    }
}
