use std::fmt;

use crate::ast::Span;

/// Diagnostic codes are a compatibility contract: editors and build tools key
/// behavior off the exact `PEG00xx` strings, so codes never change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// PEG0001: the grammar contains no rules.
    NoRules,
    /// PEG0002: a rule name is defined more than once.
    DuplicateRule,
    /// PEG0003: a referenced rule (or the declared start rule) is not defined.
    UndefinedRule,
    /// PEG0005: a setting key appears more than once.
    DuplicateSetting,
    /// PEG0006: a setting key is not recognized.
    UnrecognizedSetting,
    /// PEG0007: a label is bound twice within one rule's expression tree.
    DuplicateLabel,
    /// PEG0012: a setting value fails validation for its key.
    InvalidSettingValue,
    /// PEG0013: a rule flag is not recognized.
    UnrecognizedFlag,
    /// PEG0015: a quantifier can never be satisfied usefully.
    ImpossibleQuantifier,
    /// PEG0016: a resource literal is used without a `resources` setting.
    MissingResources,
    /// PEG0017: a rule is defined but never used.
    UnusedRule,
    /// PEG0019: a required result type could not be determined.
    UnresolvedType,
    /// PEG0020: left recursion without memoization would diverge.
    UnmemoizedLeftRecursion,
    /// PEG0021: unbounded repetition of a zero-width expression.
    UnboundedZeroWidthRepetition,
    /// PEG0022: bounded repetition of a zero-width expression.
    BoundedZeroWidthRepetition,
    /// PEG0023: left recursion whose resolution is ambiguous.
    AmbiguousLeftRecursion,
    /// PEG0025: an exported rule's name does not start with an uppercase letter.
    LowercaseExportedRule,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        use self::Code::*;
        match self {
            NoRules => "PEG0001",
            DuplicateRule => "PEG0002",
            UndefinedRule => "PEG0003",
            DuplicateSetting => "PEG0005",
            UnrecognizedSetting => "PEG0006",
            DuplicateLabel => "PEG0007",
            InvalidSettingValue => "PEG0012",
            UnrecognizedFlag => "PEG0013",
            ImpossibleQuantifier => "PEG0015",
            MissingResources => "PEG0016",
            UnusedRule => "PEG0017",
            UnresolvedType => "PEG0019",
            UnmemoizedLeftRecursion => "PEG0020",
            UnboundedZeroWidthRepetition => "PEG0021",
            BoundedZeroWidthRepetition => "PEG0022",
            AmbiguousLeftRecursion => "PEG0023",
            LowercaseExportedRule => "PEG0025",
        }
    }

    /// Structural codes invalidate invariants the code generator relies on;
    /// an error with one of these suppresses code generation.
    pub fn is_structural(self) -> bool {
        use self::Code::*;
        matches!(
            self,
            NoRules
                | DuplicateRule
                | UndefinedRule
                | DuplicateSetting
                | DuplicateLabel
                | InvalidSettingValue
                | MissingResources
                | UnresolvedType
                | UnmemoizedLeftRecursion
                | AmbiguousLeftRecursion
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Code,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(fmt, "{} {}: {}", kind, self.code, self.message)
    }
}

/// Append-only ordered diagnostic list.
///
/// Ordering reflects pass-execution order, then discovery order within a
/// pass; passes never remove or rewrite earlier diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn report(&mut self, code: Code, severity: Severity, span: Span, message: impl Into<String>) {
        self.list.push(Diagnostic {
            code,
            severity,
            message: message.into(),
            span,
        });
    }

    pub fn error(&mut self, code: Code, span: Span, message: impl Into<String>) {
        self.report(code, Severity::Error, span, message);
    }

    pub fn warning(&mut self, code: Code, span: Span, message: impl Into<String>) {
        self.report(code, Severity::Warning, span, message);
    }

    pub fn has_errors(&self) -> bool {
        self.list.iter().any(|d| d.severity == Severity::Error)
    }

    /// True when an error with a structural code has been reported, in which
    /// case code generation is skipped.
    pub fn blocks_codegen(&self) -> bool {
        self.list
            .iter()
            .any(|d| d.severity == Severity::Error && d.code.is_structural())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.list
    }
}
