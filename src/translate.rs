//! Code generation: walks the annotated grammar and emits a Rust module
//! implementing a backtracking recursive-descent parser.
//!
//! Positions are restored by shadowing `__pos` rather than by mutating a
//! cursor: a combinator that fails simply returns `Failed`, leaving the
//! caller's `__pos` binding untouched. Mutable per-parse state (memo tables,
//! lexical spans, the rightmost-error tracker) lives in `ParseState` and
//! `ErrorState`, created fresh by every entry-point call.

use std::collections::HashSet;

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};

use crate::analysis::{Analysis, MemoRequirement};
use crate::ast::{CodeKind, Expression, Grammar, Rule};
use crate::types::{is_value_member, ExpressionTypes, Ty};
use crate::validate::is_identifier;

struct Context<'g> {
    types: &'g ExpressionTypes<'g>,
    analysis: &'g Analysis,
    /// Global `ignorecase` setting; an explicit `i`/`s` suffix overrides it.
    ignorecase: bool,
    resources: Option<TokenStream>,
    has_lexical: bool,
    has_fatal: bool,
}

pub(crate) fn compile_grammar<'g>(
    grammar: &'g Grammar,
    types: &'g ExpressionTypes<'g>,
    analysis: &'g Analysis,
) -> String {
    let ignorecase = grammar
        .setting("ignorecase")
        .is_some_and(|s| s.value == "true");
    let resources = grammar
        .setting("resources")
        .map(|s| module_path_tokens(&s.value));
    let has_lexical = grammar.rules.iter().any(Rule::is_lexical);
    let has_fatal = grammar.rules.iter().any(|rule| {
        let mut found = false;
        rule.expr.walk(&mut |e| {
            if matches!(
                e,
                Expression::Code {
                    kind: CodeKind::ErrorCode,
                    ..
                }
            ) {
                found = true;
            }
        });
        found
    });

    let cx = Context {
        types,
        analysis,
        ignorecase,
        resources,
        has_lexical,
        has_fatal,
    };

    let mut items = vec![make_parse_state(grammar, &cx)];

    if let Some(start) = grammar.start_rule() {
        items.push(compile_entry(&cx, start, "parse"));
    }

    let mut seen_rule_names = HashSet::new();
    for rule in &grammar.rules {
        if !seen_rule_names.insert(rule.name.as_str()) {
            continue;
        }
        if rule.is_exported() && rule.name != "parse" {
            items.push(compile_entry(&cx, rule, &rule.name));
        }
        items.push(compile_rule(&cx, rule));
    }

    let classname = grammar
        .setting("classname")
        .map(|s| s.value.clone())
        .unwrap_or_else(|| "parser".to_owned());
    let mod_name = ident(&classname);
    let vis = match grammar.setting("accessibility").map(|s| s.value.as_str()) {
        Some("internal") => quote!(pub(crate)),
        _ => quote!(pub),
    };

    let mut module = quote! {
        #vis mod #mod_name {
            #[allow(unused_imports)]
            use super::*;

            #(#items)*
        }
    };

    if let Some(namespace) = grammar.setting("namespace") {
        let segments: Vec<&str> = namespace.value.split("::").collect();
        for segment in segments.into_iter().rev() {
            let segment = ident(segment);
            module = quote!(#vis mod #segment { #module });
        }
    }

    let rendered = match syn::parse2::<syn::File>(module.clone()) {
        Ok(file) => prettyplease::unparse(&file),
        // User action code can be token-valid without parsing as Rust
        // syntax; hand the raw rendering to the host compiler in that case.
        Err(_) => module.to_string(),
    };

    format!(
        "// Generated by peggen {}.\n// Changes to this file will be lost if the code is regenerated.\n\n{}",
        env!("CARGO_PKG_VERSION"),
        rendered
    )
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
    "where", "while",
];

fn ident(name: &str) -> Ident {
    if RUST_KEYWORDS.contains(&name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        Ident::new(name, Span::call_site())
    }
}

fn module_path_tokens(path: &str) -> TokenStream {
    let segments = path.split("::").map(ident);
    quote!(#(#segments)::*)
}

fn ty_tokens(ty: &Ty) -> TokenStream {
    match ty {
        Ty::Str => quote!(&'input str),
        Ty::Unit | Ty::Unknown => quote!(()),
        Ty::List(inner) => {
            let inner = ty_tokens(inner);
            quote!(::std::vec::Vec<#inner>)
        }
        Ty::Named(name) => name.parse().unwrap_or_else(|_| {
            quote!(compile_error!("declared rule type is not a valid Rust type"))
        }),
    }
}

fn rule_ty(cx: &Context, rule: &Rule) -> Ty {
    cx.types.rule(&rule.name).cloned().unwrap_or(Ty::Str)
}

/// Splice an opaque host-code block. The compiler never validates the code;
/// anything that lexes is passed through for the host compiler to judge.
fn host_code(body: &str) -> TokenStream {
    body.parse().unwrap_or_else(|_| {
        quote!(compile_error!("embedded code block is not a valid Rust token stream"))
    })
}

fn make_parse_state(grammar: &Grammar, cx: &Context) -> TokenStream {
    let mut cache_fields_def: Vec<TokenStream> = Vec::new();
    let mut cache_fields: Vec<Ident> = Vec::new();
    let mut seen = HashSet::new();
    for rule in &grammar.rules {
        if !seen.insert(rule.name.as_str()) || !rule.is_memoized() {
            continue;
        }
        let name = format_ident!("{}_cache", rule.name);
        let ret_ty = ty_tokens(&rule_ty(cx, rule));
        let entry_ty = if cx.has_lexical {
            // A memo hit must replay the lexical spans the original
            // computation produced.
            quote!((::peggen_runtime::RuleResult<#ret_ty>, ::std::vec::Vec<::peggen_runtime::LexicalElement>))
        } else {
            quote!(::peggen_runtime::RuleResult<#ret_ty>)
        };
        cache_fields_def.push(quote!(#name: ::std::collections::HashMap<usize, #entry_ty>));
        cache_fields.push(name);
    }

    let lexical_field_def = cx
        .has_lexical
        .then(|| quote!(lexical: ::std::vec::Vec<::peggen_runtime::LexicalElement>,));
    let lexical_field_init = cx
        .has_lexical
        .then(|| quote!(lexical: ::std::vec::Vec::new(),));

    quote! {
        struct ParseState<'input> {
            _phantom: ::std::marker::PhantomData<&'input ()>,
            #lexical_field_def
            #(#cache_fields_def),*
        }

        impl<'input> ParseState<'input> {
            fn new() -> ParseState<'input> {
                ParseState {
                    _phantom: ::std::marker::PhantomData,
                    #lexical_field_init
                    #(#cache_fields: ::std::collections::HashMap::new()),*
                }
            }
        }
    }
}

fn compile_entry(cx: &Context, rule: &Rule, fn_name: &str) -> TokenStream {
    let name = ident(fn_name);
    let parse_fn = format_ident!("__parse_{}", rule.name);
    let ret_ty = ty_tokens(&rule_ty(cx, rule));
    let ret = quote! {
        ::std::result::Result<#ret_ty, ::peggen_runtime::error::ParseFailure<::peggen_runtime::str::LineCol>>
    };

    let body = |on_success: TokenStream| {
        quote! {
            let mut __err_state = ::peggen_runtime::error::ErrorState::new(::peggen_runtime::Parse::start(__input));
            let mut __state = ParseState::new();
            let __result = #parse_fn(__input, &mut __state, &mut __err_state, ::peggen_runtime::Parse::start(__input));
            if let ::peggen_runtime::RuleResult::Matched(_, __value) = __result {
                if !__err_state.is_fatal() {
                    #on_success
                    return ::std::result::Result::Ok(__value);
                }
            }
            ::std::result::Result::Err(__err_state.into_failure(__input))
        }
    };

    if cx.has_lexical && fn_name == "parse" {
        let plain_body = body(quote!());
        let lexical_body = body(quote!(__lexical.extend(__state.lexical.drain(..));));
        quote! {
            pub fn parse_with_lexical<'input>(
                __input: &'input str,
                __lexical: &mut ::std::vec::Vec<::peggen_runtime::LexicalElement>,
            ) -> #ret {
                #![allow(non_snake_case, unused)]
                #lexical_body
            }

            pub fn #name<'input>(__input: &'input str) -> #ret {
                #![allow(non_snake_case, unused)]
                #plain_body
            }
        }
    } else {
        let plain_body = body(quote!());
        quote! {
            pub fn #name<'input>(__input: &'input str) -> #ret {
                #![allow(non_snake_case, unused)]
                #plain_body
            }
        }
    }
}

fn compile_rule(cx: &Context, rule: &Rule) -> TokenStream {
    let name = format_ident!("__parse_{}", rule.name);
    let ret_ty = ty_tokens(&rule_ty(cx, rule));

    let mut body = compile_expr(cx, &rule.expr, true);

    if rule.is_lexical() {
        let rule_name = rule.name.as_str();
        body = quote! {{
            let __lexical_start = __pos;
            let __lexical_mark = __state.lexical.len();
            let __lexical_res = { #body };
            match __lexical_res {
                ::peggen_runtime::RuleResult::Matched(__endpos, __val) => {
                    __state.lexical.push(::peggen_runtime::LexicalElement {
                        name: #rule_name,
                        start: __lexical_start,
                        end: __endpos,
                    });
                    ::peggen_runtime::RuleResult::Matched(__endpos, __val)
                }
                ::peggen_runtime::RuleResult::Failed => {
                    __state.lexical.truncate(__lexical_mark);
                    ::peggen_runtime::RuleResult::Failed
                }
            }
        }};
    }

    let wrapped_body = if cfg!(feature = "trace") {
        let str_rule_name = rule.name.as_str();
        quote! {{
            let __loc = ::peggen_runtime::Parse::position_repr(__input, __pos);
            println!("[PEG_TRACE] Attempting to match rule `{}` at {}", #str_rule_name, __loc);
            let __peg_result: ::peggen_runtime::RuleResult<#ret_ty> = { #body };
            match __peg_result {
                ::peggen_runtime::RuleResult::Matched(__epos, __v) => {
                    let __eloc = ::peggen_runtime::Parse::position_repr(__input, __epos);
                    println!("[PEG_TRACE] Matched rule `{}` at {} to {}", #str_rule_name, __loc, __eloc);
                    ::peggen_runtime::RuleResult::Matched(__epos, __v)
                }
                ::peggen_runtime::RuleResult::Failed => {
                    println!("[PEG_TRACE] Failed to match rule `{}` at {}", #str_rule_name, __loc);
                    ::peggen_runtime::RuleResult::Failed
                }
            }
        }}
    } else {
        body
    };

    let fn_body = if rule.is_memoized() {
        let cache_field = format_ident!("{}_cache", rule.name);
        let seed_growing = cx.analysis.requirement(&rule.name) == MemoRequirement::Required;
        match (seed_growing, cx.has_lexical) {
            (false, false) => quote! {
                if let ::std::option::Option::Some(entry) = __state.#cache_field.get(&__pos) {
                    return entry.clone();
                }
                let __rule_result = #wrapped_body;
                __state.#cache_field.insert(__pos, __rule_result.clone());
                __rule_result
            },
            (false, true) => quote! {
                if let ::std::option::Option::Some((entry, spans)) = __state.#cache_field.get(&__pos) {
                    let (__cached, __spans) = (entry.clone(), spans.clone());
                    __state.lexical.extend(__spans);
                    return __cached;
                }
                let __memo_mark = __state.lexical.len();
                let __rule_result = #wrapped_body;
                let __memo_spans = __state.lexical[__memo_mark..].to_vec();
                __state.#cache_field.insert(__pos, (__rule_result.clone(), __memo_spans));
                __rule_result
            },
            // Seed growing: seed the memo with failure, re-parse while each
            // attempt ends strictly further than the last, commit the best.
            (true, false) => quote! {
                if let ::std::option::Option::Some(entry) = __state.#cache_field.get(&__pos) {
                    return entry.clone();
                }
                __state.#cache_field.insert(__pos, ::peggen_runtime::RuleResult::Failed);
                let mut __best = ::peggen_runtime::RuleResult::Failed;
                loop {
                    let __attempt = #wrapped_body;
                    if !__attempt.advances_past(&__best) {
                        break;
                    }
                    __best = __attempt;
                    __state.#cache_field.insert(__pos, __best.clone());
                }
                __best
            },
            (true, true) => quote! {
                if let ::std::option::Option::Some((entry, spans)) = __state.#cache_field.get(&__pos) {
                    let (__cached, __spans) = (entry.clone(), spans.clone());
                    __state.lexical.extend(__spans);
                    return __cached;
                }
                __state.#cache_field.insert(
                    __pos,
                    (::peggen_runtime::RuleResult::Failed, ::std::vec::Vec::new()),
                );
                let __memo_mark = __state.lexical.len();
                let mut __best = ::peggen_runtime::RuleResult::Failed;
                loop {
                    __state.lexical.truncate(__memo_mark);
                    let __attempt = #wrapped_body;
                    if !__attempt.advances_past(&__best) {
                        break;
                    }
                    __best = __attempt;
                    let __memo_spans = __state.lexical[__memo_mark..].to_vec();
                    __state.#cache_field.insert(__pos, (__best.clone(), __memo_spans));
                }
                __state.lexical.truncate(__memo_mark);
                if let ::std::option::Option::Some((_, __spans)) = __state.#cache_field.get(&__pos) {
                    let __spans = __spans.clone();
                    __state.lexical.extend(__spans);
                }
                __best
            },
        }
    } else {
        wrapped_body
    };

    quote! {
        fn #name<'input>(
            __input: &'input str,
            __state: &mut ParseState<'input>,
            __err_state: &mut ::peggen_runtime::error::ErrorState,
            __pos: usize,
        ) -> ::peggen_runtime::RuleResult<#ret_ty> {
            #![allow(non_snake_case, unused)]
            #fn_body
        }
    }
}

fn compile_expr(cx: &Context, e: &Expression, result_used: bool) -> TokenStream {
    match e {
        Expression::Literal {
            value,
            case,
            resource,
            ..
        } => {
            let insensitive = case.unwrap_or(cx.ignorecase);
            let expected = format!("'{}'", value);
            let literal: TokenStream = if *resource {
                let table = cx.resources.clone().unwrap_or_else(|| quote!(resources));
                if is_identifier(value) {
                    let key = ident(value);
                    quote!(#table::#key)
                } else {
                    quote!(compile_error!("resource key is not a valid identifier"))
                }
            } else {
                quote!(#value)
            };
            let matcher = if insensitive {
                format_ident!("parse_string_literal_insensitive")
            } else {
                format_ident!("parse_string_literal")
            };
            let success = match_success(result_used);
            quote! {
                match ::peggen_runtime::ParseLiteral::#matcher(__input, __pos, #literal) {
                    ::peggen_runtime::RuleResult::Matched(__newpos, ()) => #success,
                    ::peggen_runtime::RuleResult::Failed => {
                        __err_state.mark_failure(__pos, #expected);
                        ::peggen_runtime::RuleResult::Failed
                    }
                }
            }
        }

        Expression::Class {
            ranges,
            negated,
            case,
            ..
        } => {
            let insensitive = case.unwrap_or(cx.ignorecase);
            let expected = class_description(ranges, *negated);
            let lo = ranges.iter().map(|r| r.0);
            let hi = ranges.iter().map(|r| r.1);
            let success = match_success(result_used);
            quote! {
                match ::peggen_runtime::ParseClass::parse_class(__input, __pos, &[#((#lo, #hi)),*], #negated, #insensitive) {
                    ::peggen_runtime::RuleResult::Matched(__newpos, ()) => #success,
                    ::peggen_runtime::RuleResult::Failed => {
                        __err_state.mark_failure(__pos, #expected);
                        ::peggen_runtime::RuleResult::Failed
                    }
                }
            }
        }

        Expression::Wildcard { .. } => {
            let success = match_success(result_used);
            quote! {
                match ::peggen_runtime::ParseElem::parse_elem(__input, __pos) {
                    ::peggen_runtime::RuleResult::Matched(__newpos, _) => #success,
                    ::peggen_runtime::RuleResult::Failed => {
                        __err_state.mark_failure(__pos, "any character");
                        ::peggen_runtime::RuleResult::Failed
                    }
                }
            }
        }

        Expression::Name { name, .. } => {
            let func = format_ident!("__parse_{}", name);
            if result_used {
                quote!(#func(__input, __state, __err_state, __pos))
            } else {
                quote! {
                    match #func(__input, __state, __err_state, __pos) {
                        ::peggen_runtime::RuleResult::Matched(__newpos, _) => {
                            ::peggen_runtime::RuleResult::Matched(__newpos, ())
                        }
                        ::peggen_runtime::RuleResult::Failed => ::peggen_runtime::RuleResult::Failed,
                    }
                }
            }
        }

        Expression::Sequence(items) => compile_seq(cx, items, result_used),

        Expression::Choice(alternatives) => ordered_choice(cx, alternatives, result_used),

        Expression::Repetition {
            inner, min, max, ..
        } => {
            let inner_comp = compile_expr(cx, inner, result_used);
            let needs_vec = result_used || *min > 0 || max.is_some();

            let repeat_vec = needs_vec.then(|| quote!(let mut __repeat_value = vec![];));
            let repeat_step = needs_vec.then(|| quote!(__repeat_value.push(__value);));
            let max_check = max.map(|max| {
                let max = Literal::usize_unsuffixed(max as usize);
                quote!(if __repeat_value.len() >= #max { break; })
            });
            let step_mark = cx
                .has_lexical
                .then(|| quote!(let __step_mark = __state.lexical.len();));
            let step_truncate = cx
                .has_lexical
                .then(|| quote!(__state.lexical.truncate(__step_mark);));

            let result = if result_used {
                quote!(__repeat_value)
            } else {
                quote!(())
            };
            let needs_rollback = cx.has_lexical && (*min > 0 || cx.has_fatal);
            let rep_mark =
                needs_rollback.then(|| quote!(let __rep_mark = __state.lexical.len();));
            let rep_truncate =
                needs_rollback.then(|| quote!(__state.lexical.truncate(__rep_mark);));

            let result_check = if *min > 0 {
                let min = Literal::usize_unsuffixed(*min as usize);
                quote! {
                    if __repeat_value.len() >= #min {
                        ::peggen_runtime::RuleResult::Matched(__repeat_pos, #result)
                    } else {
                        #rep_truncate
                        ::peggen_runtime::RuleResult::Failed
                    }
                }
            } else {
                quote!(::peggen_runtime::RuleResult::Matched(__repeat_pos, #result))
            };
            let outcome = if cx.has_fatal {
                quote! {
                    if __err_state.is_fatal() {
                        #rep_truncate
                        ::peggen_runtime::RuleResult::Failed
                    } else {
                        #result_check
                    }
                }
            } else {
                result_check
            };

            quote! {{
                #rep_mark
                let mut __repeat_pos = __pos;
                #repeat_vec

                loop {
                    let __pos = __repeat_pos;
                    #max_check
                    #step_mark

                    let __step_res = #inner_comp;
                    match __step_res {
                        ::peggen_runtime::RuleResult::Matched(__newpos, __value) => {
                            __repeat_pos = __newpos;
                            #repeat_step
                        }
                        ::peggen_runtime::RuleResult::Failed => {
                            #step_truncate
                            break;
                        }
                    }
                }

                #outcome
            }}
        }

        Expression::And(inner) => {
            let inner_comp = compile_expr(cx, inner, result_used);
            let mark = cx
                .has_lexical
                .then(|| quote!(let __assert_mark = __state.lexical.len();));
            let truncate = cx
                .has_lexical
                .then(|| quote!(__state.lexical.truncate(__assert_mark);));
            quote! {{
                __err_state.suppress_fail += 1;
                #mark
                let __assert_res = #inner_comp;
                __err_state.suppress_fail -= 1;
                #truncate
                match __assert_res {
                    ::peggen_runtime::RuleResult::Matched(_, __value) => {
                        ::peggen_runtime::RuleResult::Matched(__pos, __value)
                    }
                    ::peggen_runtime::RuleResult::Failed => ::peggen_runtime::RuleResult::Failed,
                }
            }}
        }

        Expression::Not(inner) => {
            let inner_comp = compile_expr(cx, inner, false);
            let mark = cx
                .has_lexical
                .then(|| quote!(let __assert_mark = __state.lexical.len();));
            let truncate = cx
                .has_lexical
                .then(|| quote!(__state.lexical.truncate(__assert_mark);));
            let value = if result_used { quote!("") } else { quote!(()) };
            let success = if cx.has_fatal {
                // An `#error{}` inside the lookahead must not be inverted
                // into a success.
                quote! {
                    if __err_state.is_fatal() {
                        ::peggen_runtime::RuleResult::Failed
                    } else {
                        ::peggen_runtime::RuleResult::Matched(__pos, #value)
                    }
                }
            } else {
                quote!(::peggen_runtime::RuleResult::Matched(__pos, #value))
            };
            quote! {{
                __err_state.suppress_fail += 1;
                #mark
                let __assert_res = #inner_comp;
                __err_state.suppress_fail -= 1;
                #truncate
                match __assert_res {
                    ::peggen_runtime::RuleResult::Failed => #success,
                    ::peggen_runtime::RuleResult::Matched(..) => ::peggen_runtime::RuleResult::Failed,
                }
            }}
        }

        // A label outside a sequence has no action to feed; the binding
        // evaporates and the expression contributes no value.
        Expression::Prefixed { inner, .. } => {
            let inner_comp = compile_expr(cx, inner, false);
            quote! {
                match #inner_comp {
                    ::peggen_runtime::RuleResult::Matched(__newpos, _) => {
                        ::peggen_runtime::RuleResult::Matched(__newpos, ())
                    }
                    ::peggen_runtime::RuleResult::Failed => ::peggen_runtime::RuleResult::Failed,
                }
            }
        }

        Expression::Code { kind, body, .. } => {
            let code = host_code(body);
            match kind {
                CodeKind::Action => {
                    quote!(::peggen_runtime::RuleResult::Matched(__pos, (|| { #code })()))
                }
                CodeKind::AndCode => quote! {
                    if (|| { #code })() {
                        ::peggen_runtime::RuleResult::Matched(__pos, ())
                    } else {
                        ::peggen_runtime::RuleResult::Failed
                    }
                },
                CodeKind::NotCode => quote! {
                    if (|| { #code })() {
                        ::peggen_runtime::RuleResult::Failed
                    } else {
                        ::peggen_runtime::RuleResult::Matched(__pos, ())
                    }
                },
                // The block drives the cursor itself: it sees `__input`,
                // `__state`, `__err_state` and `__pos`, and must evaluate to
                // a `RuleResult`.
                CodeKind::ParseCode => quote!({ #code }),
                CodeKind::ErrorCode => quote! {{
                    __err_state.mark_fatal(
                        __pos,
                        ::std::string::ToString::to_string(&(|| { #code })()),
                    );
                    ::peggen_runtime::RuleResult::Failed
                }},
            }
        }

        Expression::Typed { inner, .. } => compile_expr(cx, inner, result_used),
    }
}

fn match_success(result_used: bool) -> TokenStream {
    if result_used {
        quote! {
            ::peggen_runtime::RuleResult::Matched(
                __newpos,
                ::peggen_runtime::ParseSlice::parse_slice(__input, __pos, __newpos),
            )
        }
    } else {
        quote!(::peggen_runtime::RuleResult::Matched(__newpos, ()))
    }
}

fn class_description(ranges: &[(char, char)], negated: bool) -> String {
    let mut out = String::from("[");
    if negated {
        out.push('^');
    }
    for &(min, max) in ranges {
        out.push(min);
        if min != max {
            out.push('-');
            out.push(max);
        }
    }
    out.push(']');
    out
}

/// Compile a sequence as a continuation chain: each member matches and hands
/// the (shadowed) cursor position to the rest of the sequence; a failure
/// anywhere fails the whole chain, leaving the caller's position untouched.
fn compile_seq(cx: &Context, items: &[Expression], result_used: bool) -> TokenStream {
    let trailing_action = matches!(
        items.last(),
        Some(Expression::Code {
            kind: CodeKind::Action,
            ..
        })
    );

    let mut value_index: Option<usize> = None;
    let mut needs_span = false;
    let fold_items: &[Expression];
    let terminal: TokenStream;

    if trailing_action {
        fold_items = &items[..items.len() - 1];
        let code = match items.last() {
            Some(Expression::Code { body, .. }) => host_code(body),
            _ => unreachable!(),
        };
        terminal = if result_used {
            quote!(::peggen_runtime::RuleResult::Matched(__pos, (|| { #code })()))
        } else {
            // The action may have side effects; run it and drop the value.
            quote!(::peggen_runtime::RuleResult::Matched(__pos, { (|| { #code })(); }))
        };
    } else {
        fold_items = items;
        if result_used {
            let values: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, e)| is_value_member(e))
                .map(|(i, _)| i)
                .collect();
            if let [single] = values.as_slice() {
                value_index = Some(*single);
                terminal = quote!(::peggen_runtime::RuleResult::Matched(__pos, __seq_value));
            } else {
                needs_span = true;
                terminal = quote! {
                    ::peggen_runtime::RuleResult::Matched(
                        __pos,
                        ::peggen_runtime::ParseSlice::parse_slice(__input, __seq_start, __pos),
                    )
                };
            }
        } else {
            terminal = quote!(::peggen_runtime::RuleResult::Matched(__pos, ()));
        }
    }

    let chain = fold_items
        .iter()
        .enumerate()
        .rev()
        .fold(terminal, |continuation, (i, item)| {
            let (expr, pat, used) = match item {
                Expression::Prefixed { label, inner, .. } => {
                    let label = ident(label);
                    (&**inner, quote!(#label), true)
                }
                _ if value_index == Some(i) => (item, quote!(__seq_value), true),
                _ => (item, quote!(_), false),
            };
            let step = compile_expr(cx, expr, used);
            quote! {{
                let __seq_res = #step;
                match __seq_res {
                    ::peggen_runtime::RuleResult::Matched(__pos, #pat) => { #continuation }
                    ::peggen_runtime::RuleResult::Failed => ::peggen_runtime::RuleResult::Failed,
                }
            }}
        });

    if needs_span {
        quote!({ let __seq_start = __pos; #chain })
    } else {
        chain
    }
}

/// Alternatives are tried strictly in declaration order; the first success
/// wins and later alternatives are never attempted.
fn ordered_choice(cx: &Context, alternatives: &[Expression], result_used: bool) -> TokenStream {
    let mut compiled: Vec<TokenStream> = alternatives
        .iter()
        .map(|alt| compile_expr(cx, alt, result_used))
        .collect();
    let last = match compiled.pop() {
        Some(last) => last,
        None => return quote!(::peggen_runtime::RuleResult::Failed),
    };

    compiled.into_iter().rev().fold(last, |fallback, preferred| {
        let mark = cx
            .has_lexical
            .then(|| quote!(let __choice_mark = __state.lexical.len();));
        let truncate = cx
            .has_lexical
            .then(|| quote!(__state.lexical.truncate(__choice_mark);));
        let retry = if cx.has_fatal {
            // A fatal `#error{}` is never "this alternative failed".
            quote! {
                if __err_state.is_fatal() {
                    ::peggen_runtime::RuleResult::Failed
                } else {
                    #truncate
                    #fallback
                }
            }
        } else {
            quote!({ #truncate #fallback })
        };
        quote! {{
            #mark
            let __choice_res = #preferred;
            match __choice_res {
                ::peggen_runtime::RuleResult::Matched(__pos, __value) => {
                    ::peggen_runtime::RuleResult::Matched(__pos, __value)
                }
                ::peggen_runtime::RuleResult::Failed => #retry,
            }
        }}
    })
}
