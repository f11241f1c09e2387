use std::fmt;

/// A byte range within the grammar source, supplied by the upstream grammar
/// parser. Synthesized nodes use `Span::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }
}

/// A complete grammar: ordered settings followed by ordered rules.
#[derive(Debug)]
pub struct Grammar {
    pub settings: Vec<Setting>,
    pub rules: Vec<Rule>,
}

impl Grammar {
    pub fn new(settings: Vec<Setting>, rules: Vec<Rule>) -> Grammar {
        Grammar { settings, rules }
    }

    /// The first setting with the given key, if any.
    pub fn setting(&self, key: &str) -> Option<&Setting> {
        self.settings.iter().find(|s| s.key == key)
    }

    /// The start rule: the one named by an `start` setting, or the first
    /// declared rule. `None` when the named rule does not exist (PEG0003) or
    /// the grammar is empty (PEG0001).
    pub fn start_rule(&self) -> Option<&Rule> {
        match self.setting("start") {
            Some(s) => self.rules.iter().find(|r| r.name == s.value),
            None => self.rules.first(),
        }
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

/// A `@key value` pair from the grammar header.
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub span: Span,
}

impl Setting {
    pub fn new(key: &str, value: &str) -> Setting {
        Setting {
            key: key.to_owned(),
            value: value.to_owned(),
            span: Span::default(),
        }
    }
}

/// A flag attached to a rule, e.g. `-memoize` or `-lexical`.
#[derive(Debug, Clone)]
pub struct Flag {
    pub name: String,
    pub span: Span,
}

#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub span: Span,
    /// Declared result type, verbatim host (Rust) text. Inferred when absent.
    pub ret_type: Option<String>,
    pub flags: Vec<Flag>,
    pub expr: Expression,
}

impl Rule {
    pub fn new(name: &str, expr: Expression) -> Rule {
        Rule {
            name: name.to_owned(),
            span: Span::default(),
            ret_type: None,
            flags: Vec::new(),
            expr,
        }
    }

    pub fn with_type(mut self, ty: &str) -> Rule {
        self.ret_type = Some(ty.to_owned());
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Rule {
        self.flags.push(Flag {
            name: flag.to_owned(),
            span: Span::default(),
        });
        self
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.name == name)
    }

    pub fn is_memoized(&self) -> bool {
        self.has_flag("memoize")
    }

    pub fn is_lexical(&self) -> bool {
        self.has_flag("lexical")
    }

    /// Exported rules get their own entry point and are exempt from the
    /// unused-rule warning.
    pub fn is_exported(&self) -> bool {
        self.has_flag("export") || self.has_flag("public")
    }
}

/// The kind of an embedded host-code block. The body is opaque text in the
/// host language; the compiler splices it into generated output unparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// `{ ... }` — supplies the enclosing sequence's result value.
    Action,
    /// `&{ ... }` — zero-width assertion, succeeds iff the expression is true.
    AndCode,
    /// `!{ ... }` — zero-width assertion, succeeds iff the expression is false.
    NotCode,
    /// `#parse{ ... }` — host code that drives the cursor directly.
    ParseCode,
    /// `#error{ ... }` — aborts the entire parse with the evaluated message.
    ErrorCode,
}

/// The expression algebra rules are built from.
///
/// Trees are exclusively owned and acyclic; recursion between rules exists
/// only semantically, through `Name` references resolved by identifier.
#[derive(Debug)]
pub enum Expression {
    Literal {
        value: String,
        /// `Some(true)` for an `i` suffix, `Some(false)` for `s`, `None` when
        /// the global `ignorecase` setting governs.
        case: Option<bool>,
        /// `'...'r`: the value names an entry in the resource table.
        resource: bool,
        span: Span,
    },
    Class {
        /// Inclusive `(min, max)` ranges.
        ranges: Vec<(char, char)>,
        negated: bool,
        case: Option<bool>,
        span: Span,
    },
    Wildcard {
        span: Span,
    },
    Name {
        name: String,
        span: Span,
    },
    Sequence(Vec<Expression>),
    /// Ordered alternation: first success wins.
    Choice(Vec<Expression>),
    Repetition {
        inner: Box<Expression>,
        min: u32,
        max: Option<u32>,
        span: Span,
    },
    /// `&e` — zero-width positive lookahead; passes `e`'s value through.
    And(Box<Expression>),
    /// `!e` — zero-width negative lookahead.
    Not(Box<Expression>),
    /// `label:e` — binds `e`'s value for sibling/ancestor action code.
    Prefixed {
        label: String,
        span: Span,
        inner: Box<Expression>,
    },
    Code {
        kind: CodeKind,
        body: String,
        span: Span,
    },
    /// `<T> e` — explicit type annotation, overriding inference.
    Typed {
        ty: String,
        inner: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: &str) -> Expression {
        Expression::Literal {
            value: value.to_owned(),
            case: None,
            resource: false,
            span: Span::default(),
        }
    }

    pub fn class(ranges: &[(char, char)]) -> Expression {
        Expression::Class {
            ranges: ranges.to_vec(),
            negated: false,
            case: None,
            span: Span::default(),
        }
    }

    pub fn wildcard() -> Expression {
        Expression::Wildcard {
            span: Span::default(),
        }
    }

    pub fn name(name: &str) -> Expression {
        Expression::Name {
            name: name.to_owned(),
            span: Span::default(),
        }
    }

    pub fn sequence(items: Vec<Expression>) -> Expression {
        Expression::Sequence(items)
    }

    pub fn choice(alternatives: Vec<Expression>) -> Expression {
        Expression::Choice(alternatives)
    }

    pub fn repeat(inner: Expression, min: u32, max: Option<u32>) -> Expression {
        Expression::Repetition {
            inner: Box::new(inner),
            min,
            max,
            span: Span::default(),
        }
    }

    pub fn and(inner: Expression) -> Expression {
        Expression::And(Box::new(inner))
    }

    pub fn not(inner: Expression) -> Expression {
        Expression::Not(Box::new(inner))
    }

    pub fn labeled(label: &str, inner: Expression) -> Expression {
        Expression::Prefixed {
            label: label.to_owned(),
            span: Span::default(),
            inner: Box::new(inner),
        }
    }

    pub fn code(kind: CodeKind, body: &str) -> Expression {
        Expression::Code {
            kind,
            body: body.to_owned(),
            span: Span::default(),
        }
    }

    pub fn action(body: &str) -> Expression {
        Expression::code(CodeKind::Action, body)
    }

    pub fn typed(ty: &str, inner: Expression) -> Expression {
        Expression::Typed {
            ty: ty.to_owned(),
            inner: Box::new(inner),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expression::Literal { span, .. }
            | Expression::Class { span, .. }
            | Expression::Wildcard { span }
            | Expression::Name { span, .. }
            | Expression::Repetition { span, .. }
            | Expression::Prefixed { span, .. }
            | Expression::Code { span, .. } => *span,
            Expression::Sequence(items) | Expression::Choice(items) => {
                items.first().map(Expression::span).unwrap_or_default()
            }
            Expression::And(inner) | Expression::Not(inner) | Expression::Typed { inner, .. } => {
                inner.span()
            }
        }
    }

    /// Preorder walk of this expression and all descendants.
    pub fn walk(&self, f: &mut dyn FnMut(&Expression)) {
        f(self);
        match self {
            Expression::Sequence(items) | Expression::Choice(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Expression::Repetition { inner, .. }
            | Expression::And(inner)
            | Expression::Not(inner)
            | Expression::Prefixed { inner, .. }
            | Expression::Typed { inner, .. } => inner.walk(f),
            _ => {}
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}..{}", self.start, self.end)
    }
}
