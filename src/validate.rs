//! Structural, settings, flag, quantifier, resource, usage and naming passes.
//!
//! Each pass is independent: it reports its diagnostics and returns, leaving
//! unrelated rules to be analyzed by the passes that follow.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expression, Grammar, Rule};
use crate::diagnostics::{Code, Diagnostics};

const KNOWN_SETTINGS: &[&str] = &[
    "namespace",
    "classname",
    "accessibility",
    "start",
    "ignorecase",
    "resources",
];

const KNOWN_FLAGS: &[&str] = &["memoize", "lexical", "export", "public"];

pub(crate) fn rule_count(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    if grammar.rules.is_empty() {
        diagnostics.error(
            Code::NoRules,
            Default::default(),
            "grammar does not contain any rules",
        );
    }
}

pub(crate) fn duplicate_rules(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    let mut seen = HashSet::new();
    for rule in &grammar.rules {
        if !seen.insert(rule.name.as_str()) {
            diagnostics.error(
                Code::DuplicateRule,
                rule.span,
                format!("duplicate rule `{}`", rule.name),
            );
        }
    }
}

/// PEG0003: every `Name` reference and the declared start rule must resolve
/// to a defined rule. Undefined references are reported once per name.
pub(crate) fn references(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    let defined: HashSet<&str> = grammar.rules.iter().map(|r| r.name.as_str()).collect();
    let mut reported = HashSet::new();

    for rule in &grammar.rules {
        rule.expr.walk(&mut |e| {
            if let Expression::Name { name, span } = e {
                if !defined.contains(name.as_str()) && reported.insert(name.clone()) {
                    diagnostics.error(
                        Code::UndefinedRule,
                        *span,
                        format!("undefined rule `{}`", name),
                    );
                }
            }
        });
    }

    if let Some(start) = grammar.setting("start") {
        if !defined.contains(start.value.as_str()) {
            diagnostics.error(
                Code::UndefinedRule,
                start.span,
                format!("start rule `{}` is not defined", start.value),
            );
        }
    }
}

/// PEG0007: labels are scoped to the whole rule, so a label may only be
/// bound once anywhere in the rule's expression tree.
pub(crate) fn labels(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    for rule in &grammar.rules {
        let mut seen = HashSet::new();
        rule.expr.walk(&mut |e| {
            if let Expression::Prefixed { label, span, .. } = e {
                if !seen.insert(label.clone()) {
                    diagnostics.error(
                        Code::DuplicateLabel,
                        *span,
                        format!("duplicate label `{}` in rule `{}`", label, rule.name),
                    );
                }
            }
        });
    }
}

pub(crate) fn settings(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    let mut seen = HashSet::new();
    for setting in &grammar.settings {
        if !seen.insert(setting.key.as_str()) {
            diagnostics.error(
                Code::DuplicateSetting,
                setting.span,
                format!("duplicate setting `{}`", setting.key),
            );
            continue;
        }

        if !KNOWN_SETTINGS.contains(&setting.key.as_str()) {
            diagnostics.warning(
                Code::UnrecognizedSetting,
                setting.span,
                format!("unrecognized setting `{}`", setting.key),
            );
            continue;
        }

        let valid = match setting.key.as_str() {
            "ignorecase" => setting.value == "true" || setting.value == "false",
            "accessibility" => setting.value == "public" || setting.value == "internal",
            "classname" => is_identifier(&setting.value),
            "namespace" | "resources" => is_module_path(&setting.value),
            // `start` is validated against the rule set by `references`.
            _ => true,
        };
        if !valid {
            diagnostics.error(
                Code::InvalidSettingValue,
                setting.span,
                format!(
                    "invalid value `{}` for setting `{}`",
                    setting.value, setting.key
                ),
            );
        }
    }
}

pub(crate) fn flags(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    for rule in &grammar.rules {
        for flag in &rule.flags {
            if !KNOWN_FLAGS.contains(&flag.name.as_str()) {
                diagnostics.warning(
                    Code::UnrecognizedFlag,
                    flag.span,
                    format!("unrecognized flag `{}` on rule `{}`", flag.name, rule.name),
                );
            }
        }
    }
}

/// PEG0015: a repetition whose maximum is zero, or below its minimum, can
/// never match the intended number of times.
pub(crate) fn quantifiers(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    for rule in &grammar.rules {
        rule.expr.walk(&mut |e| {
            if let Expression::Repetition {
                min,
                max: Some(max),
                span,
                ..
            } = e
            {
                if *max == 0 || min > max {
                    diagnostics.warning(
                        Code::ImpossibleQuantifier,
                        *span,
                        format!("impossible quantifier <{},{}>", min, max),
                    );
                }
            }
        });
    }
}

/// PEG0016: resource literals need a `resources` setting naming the table
/// the generated code reads them from.
pub(crate) fn resources(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    if grammar.setting("resources").is_some() {
        return;
    }
    for rule in &grammar.rules {
        rule.expr.walk(&mut |e| {
            if let Expression::Literal {
                value,
                resource: true,
                span,
                ..
            } = e
            {
                diagnostics.error(
                    Code::MissingResources,
                    *span,
                    format!(
                        "resource literal `{}` requires a `resources` setting",
                        value
                    ),
                );
            }
        });
    }
}

/// PEG0017: rules unreachable from the start rule. Exported rules are entry
/// points in their own right, so they and everything they reach count as
/// used. When the declared start rule is undefined (already PEG0003) the
/// first rule stands in, so the grammar is not additionally flagged.
pub(crate) fn usage(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    let mut rules: HashMap<&str, &Rule> = HashMap::new();
    for rule in &grammar.rules {
        rules.entry(rule.name.as_str()).or_insert(rule);
    }

    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = Vec::new();

    if let Some(start) = grammar.start_rule().or_else(|| grammar.rules.first()) {
        queue.push(&start.name);
    }
    for rule in &grammar.rules {
        if rule.is_exported() {
            queue.push(&rule.name);
        }
    }

    while let Some(name) = queue.pop() {
        if !reached.insert(name) {
            continue;
        }
        if let Some(rule) = rules.get(name) {
            rule.expr.walk(&mut |e| {
                if let Expression::Name { name, .. } = e {
                    if let Some((key, _)) = rules.get_key_value(name.as_str()) {
                        if !reached.contains(key) {
                            queue.push(key);
                        }
                    }
                }
            });
        }
    }

    let mut warned = HashSet::new();
    for rule in &grammar.rules {
        if !reached.contains(rule.name.as_str()) && warned.insert(rule.name.as_str()) {
            diagnostics.warning(
                Code::UnusedRule,
                rule.span,
                format!("rule `{}` is never used", rule.name),
            );
        }
    }
}

/// PEG0025: exported rule names are part of the generated public surface and
/// should be capitalized.
pub(crate) fn naming(grammar: &Grammar, diagnostics: &mut Diagnostics) {
    for rule in &grammar.rules {
        if rule.is_exported() && !rule.name.chars().next().is_some_and(char::is_uppercase) {
            diagnostics.warning(
                Code::LowercaseExportedRule,
                rule.span,
                format!(
                    "exported rule `{}` should start with an uppercase letter",
                    rule.name
                ),
            );
        }
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_module_path(s: &str) -> bool {
    !s.is_empty() && s.split("::").all(is_identifier)
}
