//! Integration tests for the argument matcher: positional, optional,
//! rest, keyword, keyword-rest, splat, block, and the setter-return
//! rules, along with their arity diagnostics.

use rowan::{TextRange, TextSize};
use sable_dispatch::{
    dispatch_call, env_with_intrinsics, BlockArg, CallLocs, DiagnosticCode, Diagnostic,
    DispatchArgs, DispatchResult, TypeAndOrigins,
};
use sable_types::{subtype, ClassRef, FileId, GlobalEnv, Loc, ParamInfo, StrictLevel, Ty};

// ── Helpers ────────────────────────────────────────────────────────────

fn locs() -> CallLocs {
    CallLocs::synthetic(FileId(0))
}

fn tao(ty: Ty) -> TypeAndOrigins {
    TypeAndOrigins::with_origins(ty, Vec::new())
}

fn call_args(recv: &Ty, name: &str, pos: Vec<Ty>) -> DispatchArgs {
    let mut a = DispatchArgs::new(name, locs(), recv.clone());
    a.num_pos_args = pos.len();
    a.args = pos.into_iter().map(tao).collect();
    a
}

fn call(env: &GlobalEnv, recv: &Ty, name: &str, pos: Vec<Ty>) -> DispatchResult {
    dispatch_call(env, recv, &call_args(recv, name, pos))
}

/// Call with inline keyword arguments (alternating key/value after the
/// positional ones).
fn call_kw(
    env: &GlobalEnv,
    recv: &Ty,
    name: &str,
    pos: Vec<Ty>,
    kw: Vec<(&str, Ty)>,
) -> DispatchResult {
    let mut a = call_args(recv, name, pos);
    for (k, v) in kw {
        a.args.push(tao(Ty::sym(k)));
        a.args.push(tao(v));
    }
    dispatch_call(env, recv, &a)
}

/// Call with a trailing keyword-splat argument.
fn call_kwsplat(env: &GlobalEnv, recv: &Ty, name: &str, pos: Vec<Ty>, splat: Ty) -> DispatchResult {
    let mut a = call_args(recv, name, pos);
    a.args.push(tao(splat));
    dispatch_call(env, recv, &a)
}

fn errors(mut res: DispatchResult) -> Vec<Diagnostic> {
    res.take_errors()
}

fn error_codes(res: DispatchResult) -> Vec<DiagnosticCode> {
    errors(res).into_iter().map(|d| d.code).collect()
}

fn range(start: u32, end: u32) -> TextRange {
    TextRange::new(TextSize::from(start), TextSize::from(end))
}

/// `class C` with one method and a `C` receiver type.
fn class_with_method(
    env: &mut GlobalEnv,
    name: &str,
    params: Vec<ParamInfo>,
    result: Option<Ty>,
) -> (ClassRef, Ty) {
    let object = env.builtins().object;
    let c = env.symbols.define_class("C", Some(object));
    env.symbols.define_method(c, name, params, result);
    (c, Ty::class(c))
}

// ── Positional matching ────────────────────────────────────────────────

#[test]
fn positional_type_mismatch_is_reported() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::positional("x", Ty::class(b.integer))],
        Some(Ty::class(b.string)),
    );
    let res = call(&env, &recv, "f", vec![Ty::class(b.string)]);
    // The call still proceeds to the declared return type.
    assert_eq!(res.ret(), Ty::class(b.string));
    let errs = errors(res);
    assert_eq!(errs[0].code, DiagnosticCode::MethodArgumentMismatch);
    assert!(errs[0].header.contains("Expected `Integer` but found `String` for argument `x`"));
}

#[test]
fn rest_params_accept_many_arguments() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::positional("x", Ty::class(b.integer)),
            ParamInfo::rest("rest", Ty::class(b.string)),
        ],
        None,
    );
    let res = call(
        &env,
        &recv,
        "f",
        vec![
            Ty::class(b.integer),
            Ty::class(b.string),
            Ty::class(b.string),
            Ty::class(b.string),
        ],
    );
    assert!(error_codes(res).is_empty());
}

#[test]
fn too_few_arguments_renders_pretty_arity() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::positional("x", Ty::class(b.integer)),
            ParamInfo::optional("y", Ty::class(b.integer)),
        ],
        None,
    );
    let res = call(&env, &recv, "f", vec![]);
    let errs = errors(res);
    assert_eq!(errs[0].code, DiagnosticCode::MethodArgumentCountMismatch);
    assert!(
        errs[0].header.contains("Expected: `1..2`, got: `0`"),
        "got {}",
        errs[0].header
    );
}

#[test]
fn too_many_arguments_is_reported() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::positional("x", Ty::class(b.integer))],
        None,
    );
    let res = call(
        &env,
        &recv,
        "f",
        vec![Ty::class(b.integer), Ty::class(b.integer)],
    );
    let errs = errors(res);
    assert_eq!(errs[0].code, DiagnosticCode::MethodArgumentCountMismatch);
    assert!(errs[0].header.contains("Too many arguments"));
    assert!(errs[0].header.contains("Expected: `1`, got: `2`"));
}

// ── Keyword matching ───────────────────────────────────────────────────

#[test]
fn missing_required_keyword_argument() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::keyword("x", Ty::class(b.integer)),
            ParamInfo::keyword_default("y", Ty::class(b.integer)),
        ],
        Some(Ty::class(b.string)),
    );
    let res = call_kw(&env, &recv, "f", vec![], vec![("y", Ty::int(2))]);
    assert_eq!(res.ret(), Ty::class(b.string));
    let errs = errors(res);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, DiagnosticCode::MethodArgumentCountMismatch);
    assert!(errs[0].header.contains("Missing required keyword argument `x`"));
}

#[test]
fn unrecognized_keyword_argument() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword_default("x", Ty::class(b.integer))],
        None,
    );
    let res = call_kw(&env, &recv, "f", vec![], vec![("z", Ty::int(1))]);
    let errs = errors(res);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].header.contains("Unrecognized keyword argument `:z`"));
}

#[test]
fn keyword_value_types_are_checked() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword("x", Ty::class(b.integer))],
        None,
    );
    let res = call_kw(&env, &recv, "f", vec![], vec![("x", Ty::class(b.string))]);
    assert_eq!(error_codes(res), vec![DiagnosticCode::MethodArgumentMismatch]);
}

#[test]
fn keyword_rest_absorbs_extra_keys() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::keyword("x", Ty::class(b.integer)),
            ParamInfo::keyword_rest("rest", Ty::class(b.integer)),
        ],
        None,
    );
    let ok = call_kw(
        &env,
        &recv,
        "f",
        vec![],
        vec![("x", Ty::int(1)), ("a", Ty::int(2)), ("b", Ty::int(3))],
    );
    assert!(error_codes(ok).is_empty());

    let bad = call_kw(
        &env,
        &recv,
        "f",
        vec![],
        vec![("x", Ty::int(1)), ("a", Ty::class(b.string))],
    );
    assert_eq!(error_codes(bad), vec![DiagnosticCode::MethodArgumentMismatch]);
}

#[test]
fn trailing_hash_fills_keyword_arguments() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::positional("x", Ty::class(b.integer)),
            ParamInfo::keyword("y", Ty::class(b.integer)),
        ],
        None,
    );
    // f(1, {y: 2})
    let shape = Ty::Shape(vec![sable_types::Lit::sym("y")], vec![Ty::int(2)]);
    let res = call(&env, &recv, "f", vec![Ty::int(1), shape]);
    assert!(error_codes(res).is_empty());
}

#[test]
fn trailing_hash_after_two_positionals_fills_keyword_arguments() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![
            ParamInfo::positional("x", Ty::class(b.integer)),
            ParamInfo::positional("y", Ty::class(b.integer)),
            ParamInfo::keyword("z", Ty::class(b.integer)),
        ],
        None,
    );
    // f(1, 2, {z: 3})
    let shape = Ty::Shape(vec![sable_types::Lit::sym("z")], vec![Ty::int(3)]);
    let res = call(&env, &recv, "f", vec![Ty::int(1), Ty::int(2), shape]);
    assert!(error_codes(res).is_empty());
}

#[test]
fn explicit_kwsplat_shape_fills_keyword_arguments() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword("x", Ty::class(b.integer))],
        None,
    );
    let splat = Ty::Shape(vec![sable_types::Lit::sym("x")], vec![Ty::int(1)]);
    let res = call_kwsplat(&env, &recv, "f", vec![], splat);
    assert!(error_codes(res).is_empty());
}

#[test]
fn untyped_kwsplat_satisfies_all_keywords() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword("x", Ty::class(b.integer))],
        None,
    );
    let res = call_kwsplat(&env, &recv, "f", vec![], Ty::untyped());
    assert!(error_codes(res).is_empty());
}

#[test]
fn non_shape_hash_never_satisfies_keywords() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword("x", Ty::class(b.integer))],
        None,
    );
    let res = call_kwsplat(&env, &recv, "f", vec![], subtype::hash_of_untyped(&env));
    assert_eq!(error_codes(res), vec![DiagnosticCode::UntypedSplat]);
}

#[test]
fn non_shape_hash_policy_knob_allows_keyword_rest() {
    let mut env = env_with_intrinsics();
    env.options.non_shape_kwargs_satisfy_rest = true;
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword_rest("kwargs", Ty::untyped())],
        None,
    );
    let res = call_kwsplat(&env, &recv, "f", vec![], subtype::hash_of_untyped(&env));
    assert!(error_codes(res).is_empty());
}

#[test]
fn keyword_hash_consumed_positionally_when_positionals_remain() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    // f takes a required positional hash; the inline "keyword" args are
    // really that hash.
    let opts_ty = subtype::hash_of_untyped(&env);
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::positional("opts", opts_ty)],
        None,
    );
    let res = call_kw(&env, &recv, "f", vec![], vec![("a", Ty::int(1))]);
    assert!(error_codes(res).is_empty());
}

#[test]
fn strict_keyword_args_flags_implicit_hash() {
    let mut env = env_with_intrinsics();
    env.options.strict_keyword_args = true;
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::keyword("x", Ty::class(b.integer))],
        None,
    );
    let file = env.add_file("test.sb", "f(opts)", StrictLevel::True);

    let shape = Ty::Shape(vec![sable_types::Lit::sym("x")], vec![Ty::int(1)]);
    let mut args = DispatchArgs::new(
        "f",
        CallLocs {
            file,
            call: range(0, 7),
            receiver: None,
            args: vec![range(2, 6)],
        },
        recv.clone(),
    );
    args.num_pos_args = 1;
    args.args = vec![tao(shape)];

    let mut res = dispatch_call(&env, &recv, &args);
    let errs = res.take_errors();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].code, DiagnosticCode::KeywordArgHashWithoutSplat);
    assert_eq!(errs[0].autocorrects[0].replacement, "**opts");
}

// ── Setter semantics ───────────────────────────────────────────────────

#[test]
fn setters_return_their_right_hand_side() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "value=",
        vec![ParamInfo::positional("value", Ty::class(b.integer))],
        Some(Ty::class(b.object)),
    );
    let res = call(&env, &recv, "value=", vec![Ty::int(42)]);
    // The declared result type is ignored; assignment yields the RHS.
    assert_eq!(res.ret(), Ty::int(42));
    assert!(error_codes(res).is_empty());
}

#[test]
fn setter_mismatch_uses_assignment_phrasing() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "value=",
        vec![ParamInfo::positional("value", Ty::class(b.integer))],
        None,
    );
    let res = call(&env, &recv, "value=", vec![Ty::class(b.string)]);
    let errs = errors(res);
    assert!(errs[0].header.contains("Assigning a value to `value`"));
}

#[test]
fn index_assignment_returns_second_argument() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "[]=",
        vec![
            ParamInfo::positional("key", Ty::class(b.string)),
            ParamInfo::positional("value", Ty::class(b.integer)),
        ],
        None,
    );
    let res = call(&env, &recv, "[]=", vec![Ty::class(b.string), Ty::int(7)]);
    assert_eq!(res.ret(), Ty::int(7));
}

// ── Blocks ─────────────────────────────────────────────────────────────

#[test]
fn block_not_passed_when_formal_requires_one() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let block_ty = subtype::proc_of_arity(&env, 1);
    let (_, recv) = class_with_method(
        &mut env,
        "each",
        vec![ParamInfo::block("blk", block_ty)],
        Some(Ty::class(b.object)),
    );
    let res = call(&env, &recv, "each", vec![]);
    assert_eq!(error_codes(res), vec![DiagnosticCode::BlockNotPassed]);
}

#[test]
fn nilable_block_formal_tolerates_no_block() {
    let mut env = env_with_intrinsics();
    let block_ty = subtype::any(
        &env,
        &subtype::proc_of_arity(&env, 1),
        &Ty::Nil,
    );
    let (_, recv) = class_with_method(&mut env, "each", vec![ParamInfo::block("blk", block_ty)], None);
    let res = call(&env, &recv, "each", vec![]);
    assert!(error_codes(res).is_empty());
}

#[test]
fn block_pre_type_is_exposed_and_solving_deferred() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let block_ty = subtype::proc_of_arity(&env, 1);
    let (_, recv) = class_with_method(
        &mut env,
        "each",
        vec![ParamInfo::block("blk", block_ty.clone())],
        Some(Ty::class(b.object)),
    );
    let mut args = call_args(&recv, "each", vec![]);
    args.block = Some(BlockArg {
        fixed_arity: Some(1),
    });
    let res = dispatch_call(&env, &recv, &args);
    assert_eq!(res.main.block_pre_type, Some(block_ty));
    assert!(res.main.block_spec.is_some());
    // With a block attached the constraint is left for the caller to
    // solve after the block body is processed.
    assert!(res.main.constr.is_some());
    assert!(!res.main.constr.as_ref().unwrap().is_solved());
    assert!(error_codes(res).is_empty());
}

#[test]
fn takes_no_block_in_strict_files() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (c, recv) = class_with_method(&mut env, "quiet", vec![], Some(Ty::class(b.integer)));
    let file = env.add_file("strict.sb", "def quiet; end", StrictLevel::Strict);
    let method = env.symbols.find_member(c, "quiet").unwrap();
    env.symbols.method_mut(method).loc = Some(Loc::new(file, range(0, 14)));

    let mut args = call_args(&recv, "quiet", vec![]);
    args.block = Some(BlockArg {
        fixed_arity: Some(0),
    });
    let res = dispatch_call(&env, &recv, &args);
    assert_eq!(error_codes(res), vec![DiagnosticCode::TakesNoBlock]);
}

// ── Generic methods ────────────────────────────────────────────────────

/// `def first_of(x: U): U` for a method-level type parameter `U`.
#[test]
fn generic_method_infers_from_arguments() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let c = env.symbols.define_class("C", Some(b.object));
    let u = env.symbols.define_type_param("U");
    let m = env.symbols.define_method(
        c,
        "first_of",
        vec![ParamInfo::positional("x", Ty::Var(u))],
        Some(Ty::Var(u)),
    );
    env.symbols.method_mut(m).type_params.push(u);

    let recv = Ty::class(c);
    let res = call(&env, &recv, "first_of", vec![Ty::class(b.string)]);
    assert_eq!(res.ret(), Ty::class(b.string));
    assert!(error_codes(res).is_empty());
}

#[test]
fn generic_method_instantiates_lower_bound() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let c = env.symbols.define_class("C", Some(b.object));
    let u = env.symbols.define_type_param("U");
    let m = env.symbols.define_method(
        c,
        "pin",
        vec![
            ParamInfo::positional("x", Ty::Var(u)),
            // The second formal constrains U from above.
            ParamInfo::positional("y", Ty::class(b.integer)),
        ],
        Some(Ty::Var(u)),
    );
    env.symbols.method_mut(m).type_params.push(u);

    let recv = Ty::class(c);
    let res = call(
        &env,
        &recv,
        "pin",
        vec![Ty::class(b.string), Ty::class(b.integer)],
    );
    assert_eq!(res.ret(), Ty::class(b.string));
    assert!(error_codes(res).is_empty());
}

// ── Suppression ────────────────────────────────────────────────────────

#[test]
fn suppressed_dispatch_retains_no_diagnostics() {
    let mut env = env_with_intrinsics();
    let b = *env.builtins();
    let (_, recv) = class_with_method(
        &mut env,
        "f",
        vec![ParamInfo::positional("x", Ty::class(b.integer))],
        None,
    );
    // Wrong type AND wrong arity: still silent under suppression.
    let args = call_args(
        &recv,
        "f",
        vec![Ty::class(b.string), Ty::class(b.string)],
    )
    .errors_suppressed();
    let res = dispatch_call(&env, &recv, &args);
    assert!(error_codes(res).is_empty());
}
