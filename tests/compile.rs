//! Diagnostic-contract tests: each `PEG00xx` code fires exactly when the
//! corresponding grammar defect is present, with its fixed severity.

use peggen::ast::{CodeKind, Expression as E, Grammar, Rule, Setting, Span};
use peggen::diagnostics::{Code, Severity};
use peggen::{CompileResult, Ty};

fn rules(rules: Vec<Rule>) -> Grammar {
    Grammar::new(vec![], rules)
}

fn assert_single(result: &CompileResult, code: Code, severity: Severity) {
    assert_eq!(
        result.diagnostics.len(),
        1,
        "expected a single diagnostic, got {:?}",
        result.diagnostics
    );
    assert_eq!(result.diagnostics[0].code, code);
    assert_eq!(result.diagnostics[0].severity, severity);
}

fn assert_first(result: &CompileResult, code: Code, severity: Severity) {
    assert!(
        !result.diagnostics.is_empty(),
        "expected at least one diagnostic"
    );
    assert_eq!(result.diagnostics[0].code, code);
    assert_eq!(result.diagnostics[0].severity, severity);
}

#[test]
fn no_rules_yields_error() {
    let grammar = rules(vec![]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::NoRules, Severity::Error);
    assert!(result.code.is_empty());
}

#[test]
fn single_simple_rule_succeeds() {
    let grammar = rules(vec![Rule::new("start", E::literal("OK"))]);
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(!result.code.is_empty());
}

#[test]
fn duplicate_definition_yields_error() {
    let grammar = rules(vec![
        Rule::new("a", E::literal("a")),
        Rule::new("a", E::literal("b")),
    ]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::DuplicateRule, Severity::Error);
    assert!(result.code.is_empty());
}

#[test]
fn missing_rule_definition_yields_error() {
    let grammar = rules(vec![Rule::new("a", E::name("b"))]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UndefinedRule, Severity::Error);
}

#[test]
fn missing_start_rule_yields_error() {
    let grammar = Grammar::new(
        vec![Setting::new("start", "b")],
        vec![Rule::new("a", E::literal("OK"))],
    );
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UndefinedRule, Severity::Error);
}

#[test]
fn duplicate_setting_yields_error() {
    for key in ["namespace", "classname"] {
        let grammar = Grammar::new(
            vec![Setting::new(key, "OK"), Setting::new(key, "OK")],
            vec![Rule::new("a", E::literal("OK"))],
        );
        let result = peggen::compile(&grammar);
        assert_single(&result, Code::DuplicateSetting, Severity::Error);
    }
}

#[test]
fn unrecognized_setting_yields_warning() {
    let grammar = Grammar::new(
        vec![Setting::new("barnacle", "OK")],
        vec![Rule::new("a", E::literal("OK"))],
    );
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UnrecognizedSetting, Severity::Warning);
    assert!(!result.code.is_empty());
}

#[test]
fn repeated_label_yields_error() {
    let grammar = rules(vec![Rule::new(
        "a",
        E::sequence(vec![
            E::labeled("foo", E::literal("OK")),
            E::labeled("foo", E::literal("OK")),
        ]),
    )]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::DuplicateLabel, Severity::Error);
}

#[test]
fn invalid_setting_value_yields_error() {
    let grammar = Grammar::new(
        vec![Setting::new("accessibility", "private")],
        vec![Rule::new("a", E::literal("OK"))],
    );
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::InvalidSettingValue, Severity::Error);

    let grammar = Grammar::new(
        vec![Setting::new("ignorecase", "maybe")],
        vec![Rule::new("a", E::literal("OK"))],
    );
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::InvalidSettingValue, Severity::Error);
}

#[test]
fn unknown_flag_yields_warning() {
    let grammar = rules(vec![Rule::new("a", E::literal("OK")).with_flag("unknown")]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UnrecognizedFlag, Severity::Warning);
}

#[test]
fn impossible_quantifier_yields_warning() {
    for (min, max) in [(0, 0), (1, 0), (2, 1)] {
        let grammar = rules(vec![Rule::new(
            "a",
            E::repeat(E::literal("OK"), min, Some(max)),
        )]);
        let result = peggen::compile(&grammar);
        assert_first(&result, Code::ImpossibleQuantifier, Severity::Warning);
    }
}

#[test]
fn resource_literal_without_resources_setting_yields_error() {
    let grammar = rules(vec![Rule::new(
        "a",
        E::Literal {
            value: "OkResource".to_owned(),
            case: None,
            resource: true,
            span: Span::default(),
        },
    )]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::MissingResources, Severity::Error);
}

#[test]
fn unused_rules_yield_warnings() {
    let grammar = rules(vec![
        Rule::new("a", E::name("b")),
        Rule::new("b", E::literal("OK")),
        Rule::new("c", E::name("d")),
        Rule::new("d", E::sequence(vec![E::literal("OK"), E::name("c")])),
    ]);
    let result = peggen::compile(&grammar);
    assert_first(&result, Code::UnusedRule, Severity::Warning);
    assert_eq!(result.diagnostics.len(), 2);
    assert!(!result.code.is_empty());
}

#[test]
fn rules_used_only_by_export_or_public_are_not_unused() {
    let grammar = rules(vec![
        Rule::new("Start", E::literal("OK")),
        Rule::new("B", E::literal("OK")).with_flag("export"),
        Rule::new("C", E::literal("OK")).with_flag("public"),
    ]);
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn memoized_rule_with_undetermined_type_yields_error() {
    let grammar = rules(vec![Rule::new("a", E::name("a")).with_flag("memoize")]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UnresolvedType, Severity::Error);
}

#[test]
fn complex_left_recursion_succeeds() {
    let grammar = rules(vec![
        Rule::new("a", E::name("b")).with_type("i64").with_flag("memoize"),
        Rule::new("b", E::name("c")).with_type("i64").with_flag("memoize"),
        Rule::new("c", E::choice(vec![E::name("e"), E::name("d")]))
            .with_type("i64")
            .with_flag("memoize"),
        Rule::new("d", E::name("e")).with_type("i64"),
        Rule::new("e", E::name("f")).with_type("i64").with_flag("memoize"),
        Rule::new("f", E::name("g")).with_type("i64").with_flag("memoize"),
        Rule::new("g", E::name("g")).with_type("i64").with_flag("memoize"),
    ]);
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn unmemoized_left_recursion_yields_error() {
    let cases: Vec<Vec<Rule>> = vec![
        // a = a
        vec![Rule::new("a", E::name("a"))],
        // a = '' a
        vec![Rule::new(
            "a",
            E::sequence(vec![E::literal(""), E::name("a")]),
        )],
        // a = b a; b = ''
        vec![
            Rule::new("a", E::sequence(vec![E::name("b"), E::name("a")])),
            Rule::new("b", E::literal("")),
        ],
        // a = ('OK' / '') a
        vec![Rule::new(
            "a",
            E::sequence(vec![
                E::choice(vec![E::literal("OK"), E::literal("")]),
                E::name("a"),
            ]),
        )],
        // a = !b a; b = 'OK'
        vec![
            Rule::new("a", E::sequence(vec![E::not(E::name("b")), E::name("a")])),
            Rule::new("b", E::literal("OK")),
        ],
        // a = b* a; b = 'OK'
        vec![
            Rule::new(
                "a",
                E::sequence(vec![E::repeat(E::name("b"), 0, None), E::name("a")]),
            ),
            Rule::new("b", E::literal("OK")),
        ],
        // a = ''<2,> a
        vec![Rule::new(
            "a",
            E::sequence(vec![E::repeat(E::literal(""), 2, None), E::name("a")]),
        )],
    ];
    for case in cases {
        let grammar = rules(case);
        let result = peggen::compile(&grammar);
        assert_first(&result, Code::UnmemoizedLeftRecursion, Severity::Error);
        assert!(result.code.is_empty());
    }
}

#[test]
fn indirect_unmemoized_cycle_yields_one_error() {
    let grammar = rules(vec![
        Rule::new("a", E::name("b")),
        Rule::new("b", E::name("c")),
        Rule::new("c", E::name("a")),
    ]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::UnmemoizedLeftRecursion, Severity::Error);
}

fn left_recursive_arithmetic() -> Grammar {
    // a <i64> -memoize = x:a '+' y:b { x + y } / b
    // b <i64> = c:[0-9] { c.parse().unwrap() }
    rules(vec![
        Rule::new(
            "a",
            E::choice(vec![
                E::sequence(vec![
                    E::labeled("x", E::name("a")),
                    E::literal("+"),
                    E::labeled("y", E::name("b")),
                    E::action("x + y"),
                ]),
                E::name("b"),
            ]),
        )
        .with_type("i64")
        .with_flag("memoize"),
        Rule::new(
            "b",
            E::sequence(vec![
                E::labeled("c", E::class(&[('0', '9')])),
                E::action("c.parse::<i64>().unwrap()"),
            ]),
        )
        .with_type("i64"),
    ])
}

#[test]
fn memoized_left_recursion_with_base_case_succeeds() {
    let grammar = left_recursive_arithmetic();
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(!result.code.is_empty());
}

#[test]
fn recursion_through_assertion_yields_ambiguity_error() {
    let grammar = rules(vec![
        Rule::new("a", E::sequence(vec![E::and(E::name("b")), E::name("c")])),
        Rule::new("b", E::name("a")),
        Rule::new("c", E::literal("OK")),
    ]);
    let result = peggen::compile(&grammar);
    assert_first(&result, Code::AmbiguousLeftRecursion, Severity::Error);
    assert!(result.code.is_empty());
}

#[test]
fn lowercase_exported_rule_yields_warning() {
    for flag in ["export", "public"] {
        let grammar = rules(vec![Rule::new("a", E::literal("OK")).with_flag(flag)]);
        let result = peggen::compile(&grammar);
        assert_single(&result, Code::LowercaseExportedRule, Severity::Warning);
    }

    let grammar = rules(vec![
        Rule::new("start", E::literal("OK")),
        Rule::new("b", E::literal("OK")).with_flag("export"),
    ]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::LowercaseExportedRule, Severity::Warning);
}

#[test]
fn zero_width_parse_code_repetition_yields_warning() {
    for (max, code) in [
        (None, Code::UnboundedZeroWidthRepetition),
        (Some(5), Code::BoundedZeroWidthRepetition),
    ] {
        let grammar = rules(vec![
            Rule::new(
                "a",
                E::sequence(vec![
                    E::repeat(E::code(CodeKind::ParseCode, "self_hosted(__pos)"), 1, max),
                    E::name("b"),
                ]),
            ),
            Rule::new("b", E::literal("OK")),
        ]);
        let result = peggen::compile(&grammar);
        assert_first(&result, code, Severity::Warning);
    }
}

#[test]
fn zero_width_literal_repetition_severity_depends_on_bound() {
    let grammar = rules(vec![Rule::new("a", E::repeat(E::literal(""), 0, None))]);
    let result = peggen::compile(&grammar);
    assert_first(&result, Code::UnboundedZeroWidthRepetition, Severity::Error);

    let grammar = rules(vec![Rule::new("a", E::repeat(E::literal(""), 1, Some(5)))]);
    let result = peggen::compile(&grammar);
    assert_single(&result, Code::BoundedZeroWidthRepetition, Severity::Warning);

    let grammar = rules(vec![Rule::new("a", E::repeat(E::literal(""), 5, Some(5)))]);
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn lookahead_type_reflects_the_inner_expression() {
    // a = x:&(<i64> 'OK' { 0 })
    let grammar = rules(vec![Rule::new(
        "a",
        E::sequence(vec![E::labeled(
            "x",
            E::and(E::typed(
                "i64",
                E::sequence(vec![E::literal("OK"), E::action("0")]),
            )),
        )]),
    )]);
    let result = peggen::compile(&grammar);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let and_node = match &grammar.rules[0].expr {
        E::Sequence(items) => match &items[0] {
            E::Prefixed { inner, .. } => &**inner,
            other => panic!("unexpected node {:?}", other),
        },
        other => panic!("unexpected root {:?}", other),
    };
    assert_eq!(
        result.types.get(and_node),
        Some(&Ty::Named("i64".to_owned()))
    );
}

#[test]
fn diagnostic_codes_are_stable_strings() {
    assert_eq!(Code::NoRules.as_str(), "PEG0001");
    assert_eq!(Code::DuplicateLabel.as_str(), "PEG0007");
    assert_eq!(Code::UnresolvedType.as_str(), "PEG0019");
    assert_eq!(Code::UnmemoizedLeftRecursion.as_str(), "PEG0020");
    assert_eq!(Code::AmbiguousLeftRecursion.as_str(), "PEG0023");
    assert_eq!(Code::LowercaseExportedRule.as_str(), "PEG0025");
}

#[test]
fn pass_order_is_reflected_in_diagnostic_order() {
    // Flag validation runs before usage analysis, so the unknown-flag
    // warning on `c` precedes its unused-rule warning.
    let grammar = rules(vec![
        Rule::new("a", E::literal("OK")),
        Rule::new("c", E::literal("OK")).with_flag("unknown"),
    ]);
    let result = peggen::compile(&grammar);
    let codes: Vec<Code> = result.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![Code::UnrecognizedFlag, Code::UnusedRule]);
}
