//! Generated-source shape tests: compile small grammars and check that the
//! emitted module carries the expected entry points, state and combinator
//! calls. Execution of generated parsers is exercised by the runtime crate's
//! tests, which use the same code shapes.

use peggen::ast::{CodeKind, Expression as E, Grammar, Rule, Setting};

fn compile_ok(grammar: &Grammar) -> String {
    let result = peggen::compile(grammar);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    assert!(!result.code.is_empty());
    result.code
}

#[test]
fn emits_module_with_entry_point() {
    let grammar = Grammar::new(vec![], vec![Rule::new("a", E::literal("OK"))]);
    let code = compile_ok(&grammar);
    assert!(code.starts_with("// Generated by peggen"));
    assert!(code.contains("pub mod parser"));
    assert!(code.contains("pub fn parse"));
    assert!(code.contains("fn __parse_a"));
    assert!(code.contains("parse_string_literal"));
    assert!(code.contains("ParseFailure"));
    assert!(code.contains("struct ParseState"));
}

#[test]
fn settings_shape_the_module() {
    let grammar = Grammar::new(
        vec![
            Setting::new("namespace", "myns"),
            Setting::new("classname", "pg"),
            Setting::new("accessibility", "internal"),
        ],
        vec![Rule::new("a", E::literal("OK"))],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("pub(crate) mod myns"));
    assert!(code.contains("pub(crate) mod pg"));
    assert!(!code.contains("mod parser"));
}

#[test]
fn global_ignorecase_governs_unsuffixed_literals() {
    let grammar = Grammar::new(
        vec![Setting::new("ignorecase", "true")],
        vec![Rule::new("a", E::literal("Ok"))],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("parse_string_literal_insensitive"));
}

#[test]
fn sensitivity_suffix_overrides_the_global_setting() {
    let grammar = Grammar::new(
        vec![Setting::new("ignorecase", "true")],
        vec![Rule::new(
            "a",
            E::Literal {
                value: "Ok".to_owned(),
                case: Some(false),
                resource: false,
                span: Default::default(),
            },
        )],
    );
    let code = compile_ok(&grammar);
    assert!(!code.contains("parse_string_literal_insensitive"));
    assert!(code.contains("parse_string_literal"));
}

#[test]
fn insensitivity_suffix_works_without_the_global_setting() {
    let grammar = Grammar::new(
        vec![],
        vec![Rule::new(
            "a",
            E::Literal {
                value: "Ok".to_owned(),
                case: Some(true),
                resource: false,
                span: Default::default(),
            },
        )],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("parse_string_literal_insensitive"));
}

#[test]
fn memoized_rule_gets_a_packrat_cache() {
    let grammar = Grammar::new(
        vec![],
        vec![
            Rule::new("a", E::name("b")),
            Rule::new("b", E::literal("OK")).with_flag("memoize"),
        ],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("b_cache"));
    assert!(code.contains("__rule_result"));
    assert!(!code.contains("advances_past"));
}

#[test]
fn left_recursive_memoized_rule_gets_seed_growing() {
    let grammar = Grammar::new(
        vec![],
        vec![
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
        ],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("a_cache"));
    assert!(code.contains("advances_past"));
    assert!(code.contains("__best"));
}

#[test]
fn lexical_rules_emit_span_plumbing() {
    let grammar = Grammar::new(
        vec![],
        vec![
            Rule::new("a", E::name("b")).with_flag("lexical"),
            Rule::new("b", E::literal("OK")).with_flag("lexical"),
        ],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("parse_with_lexical"));
    assert!(code.contains("LexicalElement"));
    assert!(code.contains("__lexical_start"));
}

#[test]
fn non_lexical_grammars_have_no_span_plumbing() {
    let grammar = Grammar::new(vec![], vec![Rule::new("a", E::literal("OK"))]);
    let code = compile_ok(&grammar);
    assert!(!code.contains("parse_with_lexical"));
    assert!(!code.contains("LexicalElement"));
}

#[test]
fn error_blocks_mark_a_fatal_failure() {
    let grammar = Grammar::new(
        vec![],
        vec![Rule::new(
            "a",
            E::sequence(vec![
                E::literal("OK"),
                E::code(CodeKind::ErrorCode, "\"boom\""),
                E::literal("OK"),
            ]),
        )],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("mark_fatal"));
    assert!(code.contains("is_fatal"));
}

#[test]
fn class_and_wildcard_matchers() {
    let grammar = Grammar::new(
        vec![],
        vec![Rule::new(
            "a",
            E::sequence(vec![E::class(&[('0', '9')]), E::wildcard()]),
        )],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("parse_class"));
    assert!(code.contains("parse_elem"));
    assert!(code.contains("any character"));
}

#[test]
fn code_assertions_compile_to_boolean_checks() {
    let grammar = Grammar::new(
        vec![],
        vec![Rule::new(
            "a",
            E::sequence(vec![
                E::code(CodeKind::AndCode, "true"),
                E::code(CodeKind::NotCode, "false"),
                E::literal("OK"),
            ]),
        )],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("fn __parse_a"));
    assert!(code.contains("true"));
    assert!(code.contains("false"));
}

#[test]
fn start_setting_selects_the_entry_rule() {
    let grammar = Grammar::new(
        vec![Setting::new("start", "b")],
        vec![
            Rule::new("a", E::literal("wrong")),
            Rule::new("b", E::name("a")),
        ],
    );
    let code = compile_ok(&grammar);
    let entry = code.find("pub fn parse").unwrap();
    assert!(code[entry..].contains("__parse_b("));
}

#[test]
fn exported_rules_get_their_own_entry_points() {
    let grammar = Grammar::new(
        vec![],
        vec![
            Rule::new("start", E::literal("OK")),
            Rule::new("Other", E::literal("OK")).with_flag("export"),
        ],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("pub fn Other"));
    assert!(code.contains("fn __parse_Other"));
}

#[test]
fn resource_literals_read_the_resource_table() {
    let grammar = Grammar::new(
        vec![Setting::new("resources", "my_res")],
        vec![Rule::new(
            "a",
            E::Literal {
                value: "greeting".to_owned(),
                case: None,
                resource: true,
                span: Default::default(),
            },
        )],
    );
    let code = compile_ok(&grammar);
    assert!(code.contains("my_res::greeting"));
}

#[test]
fn warnings_do_not_block_code_generation() {
    let grammar = Grammar::new(
        vec![],
        vec![
            Rule::new("a", E::literal("OK")),
            Rule::new("unused", E::literal("OK")),
        ],
    );
    let result = peggen::compile(&grammar);
    assert!(!result.diagnostics.is_empty());
    assert!(!result.code.is_empty());
}

#[test]
fn structural_errors_suppress_code_generation() {
    let grammar = Grammar::new(vec![], vec![Rule::new("a", E::name("missing"))]);
    let result = peggen::compile(&grammar);
    assert!(result.code.is_empty());
}
