//! The type-lattice dispatcher and the symbol-based dispatch path.
//!
//! `dispatch_call` cases on the receiver's variant: unions dispatch both
//! sides and merge under OR, intersections try both sides with errors
//! suppressed and adopt the single resolving side, proxy variants try
//! their intrinsic owner before decaying to their underlying class, and
//! meta-types redirect `new` onto the wrapped type. Plain classes and
//! applied generics go through `dispatch_call_symbol`, which implements
//! the full calling convention: positional, optional, rest, keyword,
//! keyword-rest, block, and setter-return semantics.

use rowan::{TextRange, TextSize};
use rustc_hash::FxHashSet;

use sable_types::subtype::{self, UntypedMode};
use sable_types::{ClassRef, GlobalEnv, Loc, MethodRef, ParamInfo, StrictLevel, Ty, TypeConstraint};

use crate::args::{DispatchArgs, TypeAndOrigins};
use crate::diag::{Autocorrect, Diagnostic, DiagnosticCode, ErrorLine, ErrorSection};
use crate::intrinsics;
use crate::overload::guess_overload;
use crate::result::{Combinator, DispatchResult};

/// Method names that look like declaration macros; a failed lookup of one
/// of these suggests extending `T::Helpers`.
const DECLARATION_MACROS: &[&str] = &[
    "interface!",
    "abstract!",
    "final!",
    "sealed!",
    "mixes_in_class_methods",
];

// ── Entry point ────────────────────────────────────────────────────────

/// Dispatch one call against a receiver type.
pub fn dispatch_call(env: &GlobalEnv, recv: &Ty, args: &DispatchArgs) -> DispatchResult {
    match recv {
        // Untyped absorbs: untyped receiver, untyped return, no method, no
        // errors. Blame propagates.
        Ty::Untyped { .. } => DispatchResult::new(recv.clone(), args.self_type.clone(), None),

        Ty::Void => {
            let mut result = DispatchResult::new(Ty::untyped(), args.self_type.clone(), None);
            if !args.suppress_errors {
                result.main.errors.push(Diagnostic::new(
                    DiagnosticCode::UnknownMethod,
                    args.locs.call_loc(),
                    format!("Can not call method `{}` on void type", args.name),
                ));
            }
            result
        }

        Ty::Class(c) => dispatch_call_symbol(env, args, *c, &[]),
        Ty::Applied(c, targs) => dispatch_call_symbol(env, args, *c, targs),
        Ty::Nil => dispatch_call_symbol(env, args, env.builtins().nil_class, &[]),

        Ty::Or(l, r) => {
            let left = dispatch_call(env, l, &args.with_this((**l).clone()));
            let right = dispatch_call(env, r, &args.with_this((**r).clone()));
            DispatchResult::merge(env, Combinator::Or, left, right)
        }

        Ty::And(l, r) => dispatch_and(env, l, r, args),

        Ty::Literal(_) => dispatch_proxy(env, recv.underlying(env), args),
        Ty::Shape(..) => dispatch_proxy_with_intrinsics(env, recv, env.builtins().shape, args),
        Ty::Tuple(_) => dispatch_proxy_with_intrinsics(env, recv, env.builtins().tuple, args),

        Ty::Meta(wrapped) => dispatch_meta(env, wrapped, args),

        // Values bounded by a type member dispatch against the bound.
        Ty::LambdaParam { upper, .. } => dispatch_call(env, upper, args),

        Ty::Top => {
            let mut result = DispatchResult::new(Ty::untyped(), args.self_type.clone(), None);
            if !args.suppress_errors {
                result.main.errors.push(Diagnostic::new(
                    DiagnosticCode::UnknownMethod,
                    args.locs.call_loc(),
                    format!(
                        "Method `{}` does not exist on `{}`",
                        args.name,
                        recv.show(env)
                    ),
                ));
            }
            result
        }

        // Degenerate receivers recover as untyped: unreachable code and
        // unresolved inference artifacts should not cascade.
        Ty::Bottom | Ty::Var(_) | Ty::SelfParam(_) | Ty::SelfType => {
            DispatchResult::new(Ty::untyped(), args.self_type.clone(), None)
        }
    }
}

fn dispatch_proxy(env: &GlobalEnv, underlying: Ty, args: &DispatchArgs) -> DispatchResult {
    let narrowed = args.with_this(underlying.clone());
    dispatch_call(env, &underlying, &narrowed)
}

/// Shape and tuple receivers consult their intrinsic owner first; an
/// intrinsic that sets a return type takes the call, anything else decays
/// to the underlying class.
fn dispatch_proxy_with_intrinsics(
    env: &GlobalEnv,
    recv: &Ty,
    owner: ClassRef,
    args: &DispatchArgs,
) -> DispatchResult {
    let mut pending_errors = Vec::new();
    if let Some(method) = env.symbols.find_member(owner, &args.name) {
        if let Some(id) = env.symbols.method(method).intrinsic {
            let mut res = DispatchResult::pending(args.self_type.clone(), Some(method));
            intrinsics::apply(env, id, args, &mut res);
            if res.return_type.is_some() {
                return res;
            }
            // The intrinsic declined the call but may already have
            // diagnosed something; carry that into the fallback.
            pending_errors = std::mem::take(&mut res.main.errors);
        }
    }
    let mut out = dispatch_proxy(env, recv.underlying(env), args);
    if !pending_errors.is_empty() {
        pending_errors.append(&mut out.main.errors);
        out.main.errors = pending_errors;
    }
    out
}

fn dispatch_and(env: &GlobalEnv, l: &Ty, r: &Ty, args: &DispatchArgs) -> DispatchResult {
    // Dispatch both sides quietly first; producing errors on the branch we
    // are about to discard is wasted work.
    let left_quiet = dispatch_call(env, l, &args.with_this(l.clone()).errors_suppressed());
    let right_quiet = dispatch_call(env, r, &args.with_this(r.clone()).errors_suppressed());

    let left_ok = left_quiet.all_components_present();
    let right_ok = right_quiet.all_components_present();
    if left_ok && !right_ok {
        return left_quiet;
    }
    if right_ok && !left_ok {
        return right_quiet;
    }

    let (left, right) = if !left_ok && !right_ok {
        // Neither side resolved: redo the dispatches with errors enabled so
        // the user sees why.
        (
            dispatch_call(env, l, &args.with_this(l.clone())),
            dispatch_call(env, r, &args.with_this(r.clone())),
        )
    } else {
        (left_quiet, right_quiet)
    };
    DispatchResult::merge(env, Combinator::And, left, right)
}

fn dispatch_meta(env: &GlobalEnv, wrapped: &Ty, args: &DispatchArgs) -> DispatchResult {
    if args.name == "new" {
        let mut inner = args.clone();
        inner.name = "initialize".to_string();
        inner.this_type = wrapped.clone();
        inner.self_type = wrapped.clone();
        inner.full_type = TypeAndOrigins {
            ty: wrapped.clone(),
            origins: args.full_type.origins.clone(),
        };
        let mut original = dispatch_call(env, wrapped, &inner);
        original.return_type = Some(wrapped.clone());
        original.main.send_ty = Some(wrapped.clone());
        return original;
    }

    let mut diag = None;
    if !args.suppress_errors {
        let loc = args.locs.call_loc();
        let mut d = Diagnostic::new(
            DiagnosticCode::MetaTypeDispatchCall,
            loc,
            format!(
                "Call to method `{}` on `{}` mistakes a type for a value",
                args.name,
                wrapped.show(env)
            ),
        );
        if args.name == "===" {
            if let Ty::Applied(klass, _) = wrapped {
                d.add_note(
                    "It looks like you're trying to pattern match on a generic, \
                     which doesn't work at runtime",
                );
                d.add_autocorrect(Autocorrect {
                    title: "Replace with class name".to_string(),
                    loc,
                    replacement: env.symbols.class(*klass).name.clone(),
                });
            }
        }
        diag = Some(d);
    }

    let mut res = dispatch_proxy(env, Ty::class(env.builtins().object), args);
    if let Some(d) = diag {
        res.main.errors.insert(0, d);
    }
    res
}

// ── Helpers ────────────────────────────────────────────────────────────

/// A name like `foo=` is a setter; comparison operators are not.
fn is_setter(name: &str) -> bool {
    name.len() >= 2
        && name.ends_with('=')
        && !matches!(name, "==" | "!=" | "<=" | ">=" | "===")
}

/// The smallest argument origin inside the call; falls back to the call
/// site itself. Keeps mismatch diagnostics pointing at the narrowest
/// relevant expression.
fn smallest_loc_within(call_loc: Loc, arg: &TypeAndOrigins) -> Loc {
    let mut chosen = call_loc;
    for loc in &arg.origins {
        if loc.file == call_loc.file
            && call_loc.range.contains_range(loc.range)
            && loc.range.len() < chosen.range.len()
        {
            chosen = *loc;
        }
    }
    chosen
}

/// Render a method's positional arity: `2`, `1..3`, or `2+`.
pub fn pretty_arity(env: &GlobalEnv, method: MethodRef) -> String {
    let mut required = 0;
    let mut optional = 0;
    let mut repeated = false;
    for arg in &env.symbols.method(method).params {
        if arg.flags.keyword || arg.flags.block {
            // ignore
        } else if arg.flags.default {
            optional += 1;
        } else if arg.flags.repeated {
            repeated = true;
        } else {
            required += 1;
        }
    }
    if repeated {
        format!("{}+", required)
    } else if optional > 0 {
        format!("{}..{}", required, required + optional)
    } else {
        format!("{}", required)
    }
}

fn explain_expected(
    env: &GlobalEnv,
    expected: &Ty,
    spec: &ParamInfo,
    method: MethodRef,
) -> ErrorSection {
    let lines = match spec.loc {
        Some(loc) => vec![ErrorLine::new(loc, "defined here")],
        None => Vec::new(),
    };
    ErrorSection {
        header: format!(
            "Expected `{}` for argument `{}` of method `{}`:",
            expected.show(env),
            spec.argument_name(),
            env.symbols.show_method(method)
        ),
        lines,
    }
}

/// Check one actual against one formal under the live constraint. Returns
/// the diagnostic on mismatch; `None` on success or when errors are
/// suppressed (the subtype check still runs so constraints accumulate).
#[allow(clippy::too_many_arguments)]
fn match_arg_type(
    env: &GlobalEnv,
    constr: &mut TypeConstraint,
    call_loc: Loc,
    in_class: ClassRef,
    method: MethodRef,
    arg: &TypeAndOrigins,
    spec: &ParamInfo,
    self_type: &Ty,
    targs: &[Ty],
    arg_loc: Option<Loc>,
    origin_for_uninitialized: Option<Loc>,
    may_be_setter: bool,
    suppress_errors: bool,
) -> Option<Diagnostic> {
    let owner = env.symbols.method(method).owner;
    let mut expected = match &spec.ty {
        Some(t) => subtype::result_type_as_seen_from(env, t, owner, in_class, targs),
        None => Ty::untyped_blamed(method),
    };
    expected = subtype::replace_self_type(env, &expected, self_type);

    if subtype::is_subtype_under(env, constr, &arg.ty, &expected, UntypedMode::AlwaysCompatible) {
        return None;
    }
    if suppress_errors {
        return None;
    }

    let loc = smallest_loc_within(call_loc, arg);
    let mut diag;
    if may_be_setter && is_setter(&env.symbols.method(method).name) {
        diag = Diagnostic::new(
            DiagnosticCode::MethodArgumentMismatch,
            loc,
            format!(
                "Assigning a value to `{}` that does not match expected type `{}`",
                spec.argument_name(),
                expected.show(env)
            ),
        );
    } else {
        diag = Diagnostic::new(
            DiagnosticCode::MethodArgumentMismatch,
            loc,
            format!(
                "Expected `{}` but found `{}` for argument `{}`",
                expected.show(env),
                arg.ty.show(env),
                spec.argument_name()
            ),
        );
        diag.add_section(explain_expected(env, &expected, spec, method));
    }
    diag.add_section(arg.explain_got(env, origin_for_uninitialized));

    if let Some(arg_loc) = arg_loc {
        if let Some(src) = env.source(arg_loc) {
            if let Some(wrap) = &env.options.suggest_unsafe {
                diag.add_autocorrect(Autocorrect {
                    title: format!("Wrap in `{}`", wrap),
                    loc: arg_loc,
                    replacement: format!("{}({})", wrap, src),
                });
            } else {
                // Stripping nil would make the argument fit: offer the
                // nil-assertion wrap.
                let without_nil = subtype::approximate_subtract(env, &arg.ty, &Ty::Nil);
                if !without_nil.is_bottom()
                    && subtype::is_subtype_under(
                        env,
                        constr,
                        &without_nil,
                        &expected,
                        UntypedMode::AlwaysCompatible,
                    )
                {
                    diag.add_autocorrect(Autocorrect {
                        title: "Wrap in `T.must`".to_string(),
                        loc: arg_loc,
                        replacement: format!("T.must({})", src),
                    });
                }
            }
        }
    }
    Some(diag)
}

fn missing_kwarg(env: &GlobalEnv, call_loc: Loc, method: MethodRef, spec: &ParamInfo) -> Diagnostic {
    Diagnostic::new(
        DiagnosticCode::MethodArgumentCountMismatch,
        call_loc,
        format!(
            "Missing required keyword argument `{}` for method `{}`",
            spec.name,
            env.symbols.show_method(method)
        ),
    )
}

// ── Unknown-method diagnostics ─────────────────────────────────────────

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos.min(text.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn line_padding(text: &str, line_start: usize) -> usize {
    text[line_start.min(text.len())..]
        .chars()
        .take_while(|c| *c == ' ')
        .count()
}

/// Offer to insert `extend T::Helpers` right below the class head, when
/// the class does not already extend it and its definition is in the same
/// file as the call.
fn maybe_suggest_extend_helpers(
    env: &GlobalEnv,
    enclosing: ClassRef,
    call: Loc,
    diag: &mut Diagnostic,
) {
    if let Some(singleton) = env.symbols.class(enclosing).singleton_class {
        if env.symbols.derives_from(singleton, env.builtins().t_helpers) {
            return;
        }
    }
    let Some(class_loc) = env.symbols.class(enclosing).loc else {
        return;
    };
    if class_loc.file != call.file {
        return;
    }
    let text = &env.file(class_loc.file).text;
    let class_start: usize = class_loc.range.start().into();
    let this_line = line_start(text, class_start);
    let this_padding = line_padding(text, this_line);
    let Some(newline) = text[class_start..].find('\n') else {
        return;
    };
    let next_line = class_start + newline + 1;
    let next_padding = line_padding(text, next_line);

    let prefix = " ".repeat(std::cmp::max(this_padding + 2, next_padding));
    let insert_at = Loc::new(
        class_loc.file,
        TextRange::empty(TextSize::from(next_line as u32)),
    );
    diag.add_autocorrect(Autocorrect {
        title: "Add `extend T::Helpers`".to_string(),
        loc: insert_at,
        replacement: format!("{}extend T::Helpers\n", prefix),
    });
}

/// Member lookup failed: build the `UnknownMethod` diagnostic, with fuzzy
/// suggestions, nil-stripping wraps, and declaration-macro help.
fn unknown_method(env: &GlobalEnv, args: &DispatchArgs, symbol: ClassRef) -> DispatchResult {
    let call_loc = args.locs.call_loc();

    if args.name == "initialize" {
        // Constructing a class with no custom constructor: silently
        // untyped, complaining only about stray arguments.
        let mut result = DispatchResult::new(Ty::untyped(), args.self_type.clone(), None);
        if !args.args.is_empty() && !args.suppress_errors {
            result.main.errors.push(Diagnostic::new(
                DiagnosticCode::MethodArgumentCountMismatch,
                call_loc,
                format!(
                    "Wrong number of arguments for constructor. Expected: `0`, got: `{}`",
                    args.args.len()
                ),
            ));
        }
        return result;
    }
    if args.name == "super" {
        return DispatchResult::new(Ty::untyped(), args.self_type.clone(), None);
    }

    let mut result = DispatchResult::new(Ty::untyped(), args.self_type.clone(), None);
    if args.suppress_errors {
        // Short circuit to avoid constructing an expensive error message.
        return result;
    }

    let this_str = args.this_type.show(env);
    let mut diag;
    if args.full_type.ty != args.this_type {
        diag = Diagnostic::new(
            DiagnosticCode::UnknownMethod,
            call_loc,
            format!(
                "Method `{}` does not exist on `{}` component of `{}`",
                args.name,
                this_str,
                args.full_type.ty.show(env)
            ),
        );
    } else {
        diag = Diagnostic::new(
            DiagnosticCode::UnknownMethod,
            call_loc,
            format!("Method `{}` does not exist on `{}`", args.name, this_str),
        );
        if DECLARATION_MACROS.contains(&args.name.as_str())
            || (args.name == "requires_ancestor" && env.options.required_ancestors)
        {
            if let Some(attached) = env.symbols.class(symbol).attached_class {
                maybe_suggest_extend_helpers(env, attached, call_loc, &mut diag);
            }
        }
    }

    if !args.full_type.origins.is_empty() {
        diag.add_section(args.full_type.explain_got(env, args.origin_for_uninitialized));
    }

    let receiver_loc = args.locs.receiver_loc();
    let suggest_wrap = env.options.suggest_unsafe.is_some()
        || (args.full_type.ty != args.this_type && symbol == env.builtins().nil_class);
    if receiver_loc.is_some() && suggest_wrap {
        let receiver_loc = receiver_loc.unwrap();
        let wrap_fn = env
            .options
            .suggest_unsafe
            .clone()
            .unwrap_or_else(|| "T.must".to_string());
        if receiver_loc.range.is_empty() {
            // Block-pass syntax (`&:name`) leaves a zero-width receiver.
            // Expand it to an explicit block around the wrapped value.
            let pos: usize = receiver_loc.range.start().into();
            let end = pos + 1 + args.name.len() + 1;
            let text_len = env.file(receiver_loc.file).text.len();
            if pos >= 2 && end <= text_len {
                let block_pass_loc = Loc::new(
                    receiver_loc.file,
                    TextRange::new(TextSize::from((pos - 2) as u32), TextSize::from(end as u32)),
                );
                let block_pass_src = format!("(&:{})", args.name);
                if env.source(block_pass_loc) == Some(block_pass_src.as_str()) {
                    diag.add_autocorrect(Autocorrect {
                        title: format!("Expand to block with `{}`", wrap_fn),
                        loc: block_pass_loc,
                        replacement: format!(" {{|x| {}(x).{}}}", wrap_fn, args.name),
                    });
                }
            }
        } else if let Some(src) = env.source(receiver_loc) {
            diag.add_autocorrect(Autocorrect {
                title: format!("Wrap in `{}`", wrap_fn),
                loc: receiver_loc,
                replacement: format!("{}({})", wrap_fn, src),
            });
        }
    } else {
        if env.symbols.class(symbol).is_module {
            // The method exists on the root object and is owned by a
            // module: the user probably forgot to include that module.
            if let Some(obj_meth) = env
                .symbols
                .find_member_transitive(env.builtins().object, &args.name)
            {
                let owner = env.symbols.method(obj_meth).owner;
                if env.symbols.class(owner).is_module {
                    diag.add_note(format!(
                        "Did you mean to `include {}` in this module?",
                        env.symbols.class(owner).name
                    ));
                }
            }
        }

        let alternatives = env.symbols.find_member_fuzzy_match(symbol, &args.name);
        if !alternatives.is_empty() {
            let mut lines = Vec::new();
            for alt in alternatives {
                let replacement = env.symbols.method(alt).name.clone();
                let mut added_autocorrect = false;
                if replacement != args.name {
                    if let Some(recv_loc) = args.locs.receiver_loc() {
                        let call_src = env.source(call_loc);
                        let recv_src = env.source(recv_loc);
                        if let (Some(call_src), Some(recv_src)) = (call_src, recv_src) {
                            if call_src.starts_with(&format!("{}.{}", recv_src, args.name)) {
                                let start = u32::from(recv_loc.range.end()) + 1;
                                let end = start + args.name.len() as u32;
                                diag.add_autocorrect(Autocorrect {
                                    title: format!("Replace with `{}`", replacement),
                                    loc: Loc::new(
                                        call_loc.file,
                                        TextRange::new(start.into(), end.into()),
                                    ),
                                    replacement: replacement.clone(),
                                });
                                added_autocorrect = true;
                            }
                        }
                    }
                }
                if !added_autocorrect {
                    lines.push(ErrorLine {
                        loc: env.symbols.method(alt).loc,
                        message: format!("`{}`", env.symbols.show_method(alt)),
                    });
                }
            }
            if !lines.is_empty() {
                diag.add_section(ErrorSection {
                    header: "Did you mean:".to_string(),
                    lines,
                });
            }
        }
    }

    result.main.errors.push(diag);
    result
}

// ── Symbol-based dispatch ──────────────────────────────────────────────

/// Dispatch a call against a resolved class and its type arguments.
///
/// This implements the argument matching logic of the source language
/// (assigning values passed at a call site to the formal parameters of
/// the method). Known incompleteness, preserved deliberately: there is no
/// coercion to keyword arguments via a hash-conversion method, and a
/// non-shape hash never satisfies keyword arguments (the
/// `non_shape_kwargs_satisfy_rest` option relaxes the latter for keyword
/// rest parameters only).
pub(crate) fn dispatch_call_symbol(
    env: &GlobalEnv,
    args: &DispatchArgs,
    symbol: ClassRef,
    targs: &[Ty],
) -> DispatchResult {
    let call_loc = args.locs.call_loc();

    let mut found = env.symbols.find_member_transitive(symbol, &args.name);
    if found.is_none() && env.options.required_ancestors {
        // The method may be promised by a required ancestor.
        for ancestor in env.symbols.required_ancestors_transitive(symbol) {
            found = env.symbols.find_member_transitive(ancestor, &args.name);
            if found.is_some() {
                break;
            }
        }
    }
    let Some(primary) = found else {
        return unknown_method(env, args, symbol);
    };

    let method = if env.symbols.method(primary).is_overloaded() {
        guess_overload(
            env,
            symbol,
            primary,
            args.num_pos_args,
            &args.args,
            targs,
            args.block.is_some(),
        )
    } else {
        primary
    };

    let mut result = DispatchResult::pending(args.self_type.clone(), Some(method));
    let data = env.symbols.method(method);

    let mut constr = if args.block.is_some() || data.is_generic() {
        TypeConstraint::new()
    } else {
        TypeConstraint::empty_frozen()
    };
    if data.is_generic() {
        constr.define_domain(&data.type_params);
    }

    let mut pos_args = args.num_pos_args;
    let has_kwargs = data.has_keyword_params();
    let non_pos_args = args.args.len() - args.num_pos_args;
    let mut has_kwsplat = non_pos_args % 2 == 1;
    let num_kwargs = if has_kwsplat {
        non_pos_args - 1
    } else {
        non_pos_args
    };

    // Formals with the trailing block parameter stripped; it is checked
    // separately from the rest.
    let params = &data.params[..data.params.len() - 1];
    let p_end = params.len();
    let mut pi = 0usize;
    let mut ai = 0usize;
    let mut a_end = args.args.len();
    let a_pos_end = args.num_pos_args;

    // Positional phase.
    while pi < p_end && ai < a_pos_end {
        let spec = &params[pi];
        let arg = &args.args[ai];
        if spec.flags.keyword {
            break;
        }
        // The last actual may be an implicit keyword hash rather than a
        // positional argument; leave it for keyword processing.
        if ai + 1 == a_end
            && has_kwargs
            && (spec.flags.default || spec.flags.repeated)
            && subtype::approximate(env, &arg.ty, &constr).derives_from(env, env.builtins().hash)
        {
            break;
        }

        if let Some(e) = match_arg_type(
            env,
            &mut constr,
            call_loc,
            symbol,
            method,
            arg,
            spec,
            &args.self_type,
            targs,
            args.locs.arg_loc(ai),
            args.origin_for_uninitialized,
            args.args.len() == 1,
            args.suppress_errors,
        ) {
            result.main.errors.push(e);
        }

        if !spec.flags.repeated {
            pi += 1;
        }
        ai += 1;
    }

    // Implicit kwsplat promotion: positional actuals remain, the method
    // accepts keyword arguments, and none were given -- treat the final
    // positional actual as the keyword hash.
    let mut implicit_kwsplat = false;
    if ai < a_pos_end && has_kwargs && args.args.len() == args.num_pos_args {
        if env.options.strict_keyword_args && !args.suppress_errors {
            if let Some(splat_loc) = args.locs.arg_loc(args.args.len() - 1) {
                let mut d = Diagnostic::new(
                    DiagnosticCode::KeywordArgHashWithoutSplat,
                    splat_loc,
                    "Keyword argument hash without `**` is deprecated",
                );
                if let Some(src) = env.source(splat_loc) {
                    d.add_autocorrect(Autocorrect {
                        title: "Use `**` for the keyword argument hash".to_string(),
                        loc: splat_loc,
                        replacement: format!("**{}", src),
                    });
                }
                result.main.errors.push(d);
            }
        }
        has_kwsplat = true;
        implicit_kwsplat = true;
    }

    // Keyword bundle assembly.
    let mut kwargs: Option<Ty> = None;
    let mut kwargs_loc: Option<Loc> = None;
    let mut kw_splat_is_hash = false;
    let mut kw_splat_type: Option<Ty> = None;
    if num_kwargs > 0 || has_kwsplat {
        kwargs_loc = if num_kwargs == 0 {
            args.locs.arg_loc(args.locs.args.len().wrapping_sub(1))
        } else {
            match (
                args.locs.arg_loc(args.num_pos_args),
                args.locs.arg_loc(args.locs.args.len().wrapping_sub(1)),
            ) {
                (Some(start), Some(end)) => {
                    Some(Loc::new(start.file, start.range.cover(end.range)))
                }
                (one, _) => one,
            }
        };

        let mut keys: Vec<sable_types::Lit> = Vec::new();
        let mut values: Vec<Ty> = Vec::new();
        let mut k = args.num_pos_args;
        let kw_end = args.num_pos_args + num_kwargs;
        while k < kw_end {
            let key = &args.args[k];
            k += 1;
            // A non-symbol key means this cannot be a keyword bundle yet;
            // abandon keyword matching and let later phases complain.
            match &key.ty {
                Ty::Literal(lit) if lit.is_symbol() => {
                    let val = &args.args[k];
                    k += 1;
                    keys.push(lit.clone());
                    values.push(val.ty.clone());
                }
                _ => {
                    keys.clear();
                    values.clear();
                    break;
                }
            }
        }

        if has_kwsplat {
            let kw_splat_arg = &args.args[a_end - 1];
            let approx = subtype::approximate(env, &kw_splat_arg.ty, &constr);
            kw_splat_type = Some(approx.clone());

            if has_kwargs {
                match &approx {
                    Ty::Shape(sk, sv) if subtype::shape_has_symbol_keys(sk) => {
                        keys.extend(sk.iter().cloned());
                        values.extend(sv.iter().cloned());
                        kwargs = Some(Ty::Shape(keys, values));
                        a_end -= 1;
                    }
                    t if t.is_untyped() => {
                        // An untyped splat satisfies all keyword args.
                        a_end -= 1;
                        kwargs = Some(Ty::untyped());
                    }
                    t if t.derives_from(env, env.builtins().hash) => {
                        // This is an error if the hash ends up supplying
                        // keyword arguments, but it may also be consumed as
                        // a positional arg; defer the decision.
                        let has_kwrest = data
                            .params
                            .iter()
                            .any(|p| p.flags.keyword && p.flags.repeated);
                        kw_splat_is_hash =
                            !(env.options.non_shape_kwargs_satisfy_rest && has_kwrest);
                        a_end -= 1;
                        kwargs = Some(Ty::untyped());
                    }
                    _ => {}
                }
                if implicit_kwsplat && kwargs.is_some() {
                    pos_args -= 1;
                }
            } else {
                // The method takes no keyword arguments; consume the splat
                // as a plain value.
                kwargs = Some(approx);
                a_end -= 1;
            }
        } else {
            kwargs = Some(Ty::Shape(keys, values));
        }

        // Positional formals remain and no keyword-shaped formal will take
        // the bundle: consume the keyword hash as a single positional
        // argument.
        if kwargs.is_some()
            && pi < p_end
            && !params[pi].flags.block
            && (!has_kwargs
                || (!params[pi].flags.repeated
                    && !params[pi].flags.keyword
                    && !params[pi].flags.default))
        {
            let spec = &params[pi];
            let tao = TypeAndOrigins {
                ty: kwargs.take().unwrap(),
                origins: kwargs_loc.into_iter().collect(),
            };
            if let Some(e) = match_arg_type(
                env,
                &mut constr,
                call_loc,
                symbol,
                method,
                &tao,
                spec,
                &args.self_type,
                targs,
                kwargs_loc,
                args.origin_for_uninitialized,
                args.args.len() == 1,
                args.suppress_errors,
            ) {
                result.main.errors.push(e);
            }
            if !spec.flags.repeated {
                pi += 1;
            }
            kwargs = None;
            pos_args += 1;
            if !has_kwargs {
                ai += num_kwargs;
            }
        } else if kw_splat_is_hash {
            if !args.suppress_errors {
                let mut d = Diagnostic::new(
                    DiagnosticCode::UntypedSplat,
                    call_loc,
                    "Passing a hash where the specific keys are unknown to a method taking \
                     keyword arguments",
                );
                let splat_tpo = TypeAndOrigins {
                    ty: kw_splat_type.clone().unwrap_or_else(Ty::untyped),
                    origins: args.args[a_end].origins.clone(),
                };
                d.add_section(splat_tpo.explain_got(env, args.origin_for_uninitialized));
                result.main.errors.push(d);
            }
        }
    }

    // Too few positional arguments.
    if pi < p_end {
        let spec = &params[pi];
        if !(spec.flags.keyword || spec.flags.default || spec.flags.repeated || spec.flags.block)
            && !args.suppress_errors
        {
            let header = if args.full_type.ty != args.this_type {
                format!(
                    "Not enough arguments provided for method `{}` on `{}` component of `{}`. \
                     Expected: `{}`, got: `{}`",
                    env.symbols.show_method(method),
                    args.this_type.show(env),
                    args.full_type.ty.show(env),
                    pretty_arity(env, method),
                    pos_args
                )
            } else {
                format!(
                    "Not enough arguments provided for method `{}`. Expected: `{}`, got: `{}`",
                    env.symbols.show_method(method),
                    pretty_arity(env, method),
                    pos_args
                )
            };
            let mut d = Diagnostic::new(DiagnosticCode::MethodArgumentCountMismatch, call_loc, header);
            if let Some(loc) = data.loc {
                d.add_line(loc, format!("`{}` defined here", env.symbols.show_method(method)));
            }
            if args.name == "any"
                && env.symbols.class(symbol).attached_class == Some(env.builtins().t)
            {
                d.add_note("If you want to allow any type as an argument, use `T.untyped`");
            }
            result.main.errors.push(d);
        }
    }

    // Keyword phase: match the assembled bundle against keyword formals.
    let mut consumed: FxHashSet<String> = FxHashSet::default();
    if has_kwargs {
        // The inline keyword args are consumed as a bundle.
        ai += num_kwargs;

        match &kwargs {
            Some(Ty::Shape(hash_keys, hash_values)) => {
                let mut kwi = pi;
                while kwi < data.params.len() && !data.params[kwi].flags.keyword {
                    kwi += 1;
                }
                while kwi < data.params.len() {
                    let spec = &data.params[kwi];
                    if spec.flags.block {
                        break;
                    }
                    if spec.flags.repeated {
                        // A keyword-rest formal absorbs every remaining
                        // symbol key.
                        for (idx, key) in hash_keys.iter().enumerate() {
                            let Some(name) = key.as_sym() else { continue };
                            if consumed.contains(name) {
                                continue;
                            }
                            consumed.insert(name.to_string());
                            let tpe = TypeAndOrigins {
                                ty: hash_values[idx].clone(),
                                origins: kwargs_loc.into_iter().collect(),
                            };
                            if let Some(e) = match_arg_type(
                                env,
                                &mut constr,
                                call_loc,
                                symbol,
                                method,
                                &tpe,
                                spec,
                                &args.self_type,
                                targs,
                                None,
                                args.origin_for_uninitialized,
                                false,
                                args.suppress_errors,
                            ) {
                                result.main.errors.push(e);
                            }
                        }
                        break;
                    }
                    kwi += 1;

                    let found = hash_keys
                        .iter()
                        .position(|k| k.as_sym() == Some(spec.name.as_str()));
                    match found {
                        None => {
                            if !spec.flags.default && !args.suppress_errors {
                                result
                                    .main
                                    .errors
                                    .push(missing_kwarg(env, call_loc, method, spec));
                            }
                        }
                        Some(idx) => {
                            consumed.insert(spec.name.clone());
                            let tpe = TypeAndOrigins {
                                ty: hash_values[idx].clone(),
                                origins: kwargs_loc.into_iter().collect(),
                            };
                            if let Some(e) = match_arg_type(
                                env,
                                &mut constr,
                                call_loc,
                                symbol,
                                method,
                                &tpe,
                                spec,
                                &args.self_type,
                                targs,
                                None,
                                args.origin_for_uninitialized,
                                false,
                                args.suppress_errors,
                            ) {
                                result.main.errors.push(e);
                            }
                        }
                    }
                }

                // Anything left in the bundle was not recognized.
                for key in hash_keys {
                    if let Some(name) = key.as_sym() {
                        if consumed.contains(name) {
                            continue;
                        }
                    }
                    if !args.suppress_errors {
                        result.main.errors.push(Diagnostic::new(
                            DiagnosticCode::MethodArgumentCountMismatch,
                            call_loc,
                            format!(
                                "Unrecognized keyword argument `{}` passed for method `{}`",
                                key,
                                env.symbols.show_method(method)
                            ),
                        ));
                    }
                }
            }
            None => {
                // The method has keyword arguments but none were provided.
                for spec in &data.params {
                    if !spec.flags.keyword || spec.flags.default || spec.flags.repeated {
                        continue;
                    }
                    if !args.suppress_errors {
                        result
                            .main
                            .errors
                            .push(missing_kwarg(env, call_loc, method, spec));
                    }
                }
            }
            // An untyped bundle satisfies every keyword argument.
            Some(_) => {}
        }
    }

    // Too many arguments.
    if ai < a_end && !args.suppress_errors {
        let hash_count = if num_kwargs > 0 || has_kwsplat { 1 } else { 0 };
        let num_args_given = args.num_pos_args + hash_count;
        let mut d;
        if !has_kwargs {
            d = Diagnostic::new(
                DiagnosticCode::MethodArgumentCountMismatch,
                call_loc,
                format!(
                    "Too many arguments provided for method `{}`. Expected: `{}`, got: `{}`",
                    env.symbols.show_method(method),
                    pretty_arity(env, method),
                    num_args_given
                ),
            );
            if let Some(loc) = data.loc {
                d.add_line(loc, format!("`{}` defined here", args.name));
            }
        } else {
            d = Diagnostic::new(
                DiagnosticCode::MethodArgumentCountMismatch,
                call_loc,
                format!(
                    "Too many positional arguments provided for method `{}`. \
                     Expected: `{}`, got: `{}`",
                    env.symbols.show_method(method),
                    pretty_arity(env, method),
                    pos_args
                ),
            );
            if let Some(loc) = data.loc {
                d.add_line(loc, format!("`{}` defined here", args.name));
            }
            // An optional keyword the user did not supply is a likely
            // culprit; point it out.
            let first_keyword = data
                .params
                .iter()
                .find(|p| p.flags.keyword && p.flags.default && !consumed.contains(&p.name));
            if let Some(kw) = first_keyword {
                d.add_line(
                    call_loc,
                    format!(
                        "`{}` has optional keyword arguments. Did you mean to provide a value \
                         for `{}`?",
                        env.symbols.show_method(method),
                        kw.argument_name()
                    ),
                );
            }
        }
        result.main.errors.push(d);
    }

    // Block argument.
    if args.block.is_some() {
        let bspec = data.block_param();
        if data.has_sig && bspec.flags.synthetic {
            if let Some(loc) = data.loc {
                if env.file(loc.file).strict >= StrictLevel::Strict && !args.suppress_errors {
                    let mut d = Diagnostic::new(
                        DiagnosticCode::TakesNoBlock,
                        call_loc,
                        format!(
                            "Method `{}` does not take a block",
                            env.symbols.show_method(method)
                        ),
                    );
                    d.add_line(loc, format!("`{}` defined here", env.symbols.show_method(method)));
                    result.main.errors.push(d);
                }
            }
        }

        let mut block_type = match &bspec.ty {
            Some(t) => subtype::result_type_as_seen_from(env, t, data.owner, symbol, targs),
            None => Ty::untyped_blamed(method),
        };
        result.main.block_return_type = Some(subtype::get_proc_return_type(
            env,
            &subtype::drop_nil(env, &block_type),
        ));
        block_type = if constr.is_solved() {
            subtype::instantiate(env, &block_type, &constr)
        } else {
            subtype::approximate(env, &block_type, &constr)
        };
        result.main.block_pre_type = Some(block_type);
        result.main.block_spec = Some(bspec.clone());
    }

    // Intrinsic application. The handler may set the return type and
    // replace the constraint; an intrinsic-supplied constraint wins.
    if let Some(id) = data.intrinsic {
        intrinsics::apply(env, id, args, &mut result);
        if let Some(c) = result.main.constr.take() {
            constr = c;
        }
    }

    let mut result_ty = result.return_type.take();
    if result_ty.is_none() {
        result_ty = if args.args.len() == 1 && is_setter(&data.name) {
            // Assignments always return their right-hand side.
            Some(args.args[0].ty.clone())
        } else if args.args.len() == 2 && data.name == "[]=" {
            Some(args.args[1].ty.clone())
        } else {
            data.result_type
                .as_ref()
                .map(|t| subtype::result_type_as_seen_from(env, t, data.owner, symbol, targs))
        };
    }

    if args.block.is_none() {
        // No block: solve here. With a block, the caller solves after
        // processing the block body.
        if !constr.solve(env) && !args.suppress_errors {
            let mut d = Diagnostic::new(
                DiagnosticCode::GenericMethodConstraintUnsolved,
                call_loc,
                format!(
                    "Could not find valid instantiation of type parameters for `{}`",
                    env.symbols.show_method(method)
                ),
            );
            if let Some(loc) = data.loc {
                d.add_line(loc, format!("`{}` defined here", env.symbols.show_method(method)));
            }
            d.add_section(ErrorSection {
                header: "Bounds on inferred type parameters:".to_string(),
                lines: constr
                    .explain(env)
                    .into_iter()
                    .map(|message| ErrorLine { loc: None, message })
                    .collect(),
            });
            result.main.errors.push(d);
        }

        // The declared block parameter is not nilable but no block came.
        if let Some(block_ty) = &data.block_param().ty {
            if !subtype::is_subtype(env, &Ty::Nil, block_ty) && !args.suppress_errors {
                let mut d = Diagnostic::new(
                    DiagnosticCode::BlockNotPassed,
                    call_loc,
                    format!(
                        "`{}` requires a block parameter, but no block was passed",
                        args.name
                    ),
                );
                if let Some(loc) = data.loc {
                    d.add_line(loc, "defined here");
                }
                result.main.errors.push(d);
            }
        }
    }

    let mut ret = match result_ty {
        None => Ty::untyped_blamed(method),
        Some(t) => {
            if !constr.is_empty() && constr.is_solved() {
                subtype::instantiate(env, &t, &constr)
            } else {
                t
            }
        }
    };
    ret = subtype::replace_self_type(env, &ret, &args.self_type);

    if args.block.is_some() {
        result.main.send_ty = Some(ret.clone());
    }
    result.return_type = Some(ret);
    if !constr.is_frozen() {
        result.main.constr = Some(constr);
    }
    result
}

// ── Formal-parameter projection ────────────────────────────────────────

/// The formal-parameter tuple of `name` on a receiver, without performing
/// a full dispatch. Control-flow analysis uses this to type block-pass
/// pipelines.
pub fn get_call_arguments(env: &GlobalEnv, recv: &Ty, name: &str) -> Option<Ty> {
    match recv {
        Ty::Untyped { .. } => Some(recv.clone()),
        Ty::Or(l, r) => {
            // A method call through a union must fit both sides: take the
            // greatest lower bound of the argument tuples.
            let la = get_call_arguments(env, l, name).unwrap_or_else(Ty::untyped);
            let ra = get_call_arguments(env, r, name).unwrap_or_else(Ty::untyped);
            Some(subtype::glb(env, &la, &ra))
        }
        Ty::And(l, r) => {
            let la = get_call_arguments(env, l, name);
            let ra = get_call_arguments(env, r, name);
            match (la, ra) {
                (None, other) | (other, None) => other,
                (Some(l), Some(r)) => Some(subtype::any(env, &l, &r)),
            }
        }
        Ty::Class(c) => get_method_arguments(env, *c, name, &[]),
        Ty::Applied(c, targs) => get_method_arguments(env, *c, name, targs),
        Ty::Nil => get_method_arguments(env, env.builtins().nil_class, name, &[]),
        Ty::Literal(_) | Ty::Shape(..) | Ty::Tuple(_) => {
            get_call_arguments(env, &recv.underlying(env), name)
        }
        _ => None,
    }
}

fn get_method_arguments(env: &GlobalEnv, klass: ClassRef, name: &str, targs: &[Ty]) -> Option<Ty> {
    let method = env.symbols.find_member_transitive(klass, name)?;
    let data = env.symbols.method(method);
    let mut out = Vec::new();
    for arg in &data.params {
        if arg.flags.block || arg.flags.keyword {
            continue;
        }
        let ty = match &arg.ty {
            Some(t) => subtype::result_type_as_seen_from(env, t, data.owner, klass, targs),
            None => Ty::untyped(),
        };
        if arg.flags.repeated {
            return Some(subtype::array_of(env, ty));
        }
        out.push(ty);
    }
    Some(Ty::Tuple(out))
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::ParamInfo;

    #[test]
    fn setter_names() {
        assert!(is_setter("foo="));
        assert!(is_setter("[]="));
        assert!(!is_setter("=="));
        assert!(!is_setter("!="));
        assert!(!is_setter("<="));
        assert!(!is_setter(">="));
        assert!(!is_setter("==="));
        assert!(!is_setter("="));
        assert!(!is_setter("foo"));
    }

    #[test]
    fn pretty_arity_formats() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let c = env.symbols.define_class("C", Some(b.object));
        let int = Ty::class(b.integer);

        let two = env.symbols.define_method(
            c,
            "two",
            vec![
                ParamInfo::positional("a", int.clone()),
                ParamInfo::positional("b", int.clone()),
            ],
            None,
        );
        assert_eq!(pretty_arity(&env, two), "2");

        let opt = env.symbols.define_method(
            c,
            "opt",
            vec![
                ParamInfo::positional("a", int.clone()),
                ParamInfo::optional("b", int.clone()),
                ParamInfo::optional("c", int.clone()),
            ],
            None,
        );
        assert_eq!(pretty_arity(&env, opt), "1..3");

        let rest = env.symbols.define_method(
            c,
            "rest",
            vec![
                ParamInfo::positional("a", int.clone()),
                ParamInfo::positional("b", int.clone()),
                ParamInfo::rest("rest", int),
            ],
            None,
        );
        assert_eq!(pretty_arity(&env, rest), "2+");
    }
}
