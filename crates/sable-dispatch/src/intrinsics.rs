//! The intrinsic registry: built-in operations the ordinary signature
//! system cannot express.
//!
//! Each intrinsic is a plain function over `(env, args, &mut result)`,
//! registered in a static table keyed by owner class, instance/singleton
//! kind, and method name. `install` walks the table once at startup,
//! defines the carrier method symbols, and stamps each with its handler
//! id; during dispatch the symbol path consults `method.intrinsic` and
//! calls back into `apply`.
//!
//! A handler may set the result's return type (taking the call over),
//! push diagnostics, and replace the in-flight constraint. A handler
//! that returns without setting a return type leaves the ordinary
//! machinery in charge.

use rowan::TextRange;

use sable_types::subtype::{self, UntypedMode};
use sable_types::{
    ClassRef, GlobalEnv, IntrinsicId, Lit, Loc, ParamInfo, Ty, TypeConstraint,
};

use crate::args::{BlockArg, CallLocs, DispatchArgs, TypeAndOrigins};
use crate::diag::{Autocorrect, Diagnostic, DiagnosticCode, ErrorLine, ErrorSection};
use crate::dispatch::dispatch_call;
use crate::result::{DispatchComponent, DispatchResult};
use crate::unwrap::unwrap_type;

pub(crate) type IntrinsicFn = fn(&GlobalEnv, &DispatchArgs, &mut DispatchResult);

#[derive(Copy, Clone, Debug)]
enum Owner {
    T,
    Module,
    Object,
    Class,
    Magic,
    Tuple,
    Shape,
    Array,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Kind {
    Instance,
    Singleton,
}

struct Entry {
    owner: Owner,
    kind: Kind,
    name: &'static str,
    handler: IntrinsicFn,
}

const fn entry(owner: Owner, kind: Kind, name: &'static str, handler: IntrinsicFn) -> Entry {
    Entry {
        owner,
        kind,
        name,
        handler,
    }
}

static REGISTRY: &[Entry] = &[
    entry(Owner::T, Kind::Singleton, "untyped", t_untyped),
    entry(Owner::T, Kind::Singleton, "must", t_must),
    entry(Owner::T, Kind::Singleton, "all", t_all),
    entry(Owner::T, Kind::Singleton, "any", t_any),
    entry(Owner::T, Kind::Singleton, "nilable", t_nilable),
    entry(Owner::T, Kind::Singleton, "reveal_type", t_reveal_type),
    entry(Owner::T, Kind::Singleton, "noreturn", t_noreturn),
    entry(Owner::T, Kind::Singleton, "proc", t_proc),
    entry(Owner::Module, Kind::Instance, "[]", generic_square_brackets),
    entry(Owner::Object, Kind::Instance, "class", object_class),
    entry(Owner::Object, Kind::Instance, "singleton_class", object_class),
    entry(Owner::Class, Kind::Instance, "new", class_new),
    entry(Owner::Magic, Kind::Singleton, "build_hash", magic_build_hash),
    entry(Owner::Magic, Kind::Singleton, "build_array", magic_build_array),
    entry(Owner::Magic, Kind::Singleton, "build_range", magic_build_range),
    entry(Owner::Magic, Kind::Singleton, "expand_splat", magic_expand_splat),
    entry(Owner::Magic, Kind::Singleton, "call_with_splat", magic_call_with_splat),
    entry(Owner::Magic, Kind::Singleton, "call_with_block", magic_call_with_block),
    entry(
        Owner::Magic,
        Kind::Singleton,
        "call_with_splat_and_block",
        magic_call_with_splat_and_block,
    ),
    entry(Owner::Magic, Kind::Singleton, "suggest_type", magic_suggest_type),
    entry(Owner::Magic, Kind::Singleton, "self_new", magic_self_new),
    entry(Owner::Magic, Kind::Singleton, "splat", magic_splat),
    entry(Owner::Tuple, Kind::Instance, "[]", tuple_square_brackets),
    entry(Owner::Tuple, Kind::Instance, "first", tuple_first),
    entry(Owner::Tuple, Kind::Instance, "last", tuple_last),
    entry(Owner::Tuple, Kind::Instance, "min", tuple_min_max),
    entry(Owner::Tuple, Kind::Instance, "max", tuple_min_max),
    entry(Owner::Tuple, Kind::Instance, "to_a", tuple_to_a),
    entry(Owner::Tuple, Kind::Instance, "concat", tuple_concat),
    entry(Owner::Shape, Kind::Instance, "[]", shape_square_brackets),
    entry(Owner::Shape, Kind::Instance, "[]=", shape_square_brackets_eq),
    entry(Owner::Shape, Kind::Instance, "merge", shape_merge),
    entry(Owner::Shape, Kind::Instance, "to_hash", shape_to_hash),
    entry(Owner::Array, Kind::Instance, "flatten", array_flatten),
    entry(Owner::Array, Kind::Instance, "product", array_product),
    entry(Owner::Array, Kind::Instance, "compact", array_compact),
    entry(Owner::Array, Kind::Instance, "zip", array_zip),
    entry(Owner::Module, Kind::Instance, "===", module_triple_eq),
];

/// Run one intrinsic handler.
pub(crate) fn apply(env: &GlobalEnv, id: IntrinsicId, args: &DispatchArgs, res: &mut DispatchResult) {
    (REGISTRY[id.0 as usize].handler)(env, args, res)
}

// ── Registration ───────────────────────────────────────────────────────

/// Register the core library signatures and the intrinsic table into an
/// environment. Call once, right after `GlobalEnv::with_builtins`.
pub fn install(env: &mut GlobalEnv) {
    register_core_methods(env);

    let b = *env.builtins();
    for (i, e) in REGISTRY.iter().enumerate() {
        let owner_class = match e.owner {
            Owner::T => b.t,
            Owner::Module => b.module,
            Owner::Object => b.object,
            Owner::Class => b.class,
            Owner::Magic => b.magic,
            Owner::Tuple => b.tuple,
            Owner::Shape => b.shape,
            Owner::Array => b.array,
        };
        let owner = match e.kind {
            Kind::Instance => owner_class,
            Kind::Singleton => env.singleton_class(owner_class),
        };
        let method = match env.symbols.find_member(owner, e.name) {
            Some(m) => m,
            None => {
                let params = intrinsic_params(env, e);
                let result = intrinsic_result(env, e);
                env.symbols.define_method(owner, e.name, params, result)
            }
        };
        env.symbols.method_mut(method).intrinsic = Some(IntrinsicId(i as u16));
    }
}

fn intrinsic_params(env: &GlobalEnv, e: &Entry) -> Vec<ParamInfo> {
    let b = env.builtins();
    let int = Ty::class(b.integer);
    match (e.owner, e.name) {
        (Owner::T, "untyped" | "noreturn" | "proc") => vec![],
        (Owner::T, "must" | "nilable" | "reveal_type") => {
            vec![ParamInfo::positional("value", Ty::untyped())]
        }
        (Owner::T, "any" | "all") => vec![
            ParamInfo::positional("type", Ty::untyped()),
            ParamInfo::rest("types", Ty::untyped()),
        ],
        (Owner::Module, "[]") => vec![ParamInfo::rest("types", Ty::untyped())],
        (Owner::Module, "===") => vec![ParamInfo::positional("other", Ty::untyped())],
        (Owner::Object, _) => vec![],
        (Owner::Class, "new") => vec![ParamInfo::rest("args", Ty::untyped())],
        (Owner::Magic, "build_range") => vec![
            ParamInfo::positional("from", Ty::untyped()),
            ParamInfo::positional("to", Ty::untyped()),
            ParamInfo::positional("exclude_end", Ty::untyped()),
        ],
        (Owner::Magic, "expand_splat") => vec![
            ParamInfo::positional("value", Ty::untyped()),
            ParamInfo::positional("before", int),
            ParamInfo::positional("after", Ty::untyped()),
        ],
        (Owner::Magic, "call_with_splat") => vec![
            ParamInfo::positional("receiver", Ty::untyped()),
            ParamInfo::positional("method", Ty::untyped()),
            ParamInfo::positional("pos_args", Ty::untyped()),
            ParamInfo::positional("kw_args", Ty::untyped()),
        ],
        (Owner::Magic, "call_with_block") => vec![
            ParamInfo::positional("receiver", Ty::untyped()),
            ParamInfo::positional("method", Ty::untyped()),
            ParamInfo::positional("block", Ty::untyped()),
            ParamInfo::rest("args", Ty::untyped()),
        ],
        (Owner::Magic, "call_with_splat_and_block") => vec![
            ParamInfo::positional("receiver", Ty::untyped()),
            ParamInfo::positional("method", Ty::untyped()),
            ParamInfo::positional("pos_args", Ty::untyped()),
            ParamInfo::positional("kw_args", Ty::untyped()),
            ParamInfo::positional("block", Ty::untyped()),
        ],
        (Owner::Magic, "suggest_type" | "splat") => {
            vec![ParamInfo::positional("value", Ty::untyped())]
        }
        (Owner::Magic, "self_new") => vec![
            ParamInfo::positional("recv", Ty::untyped()),
            ParamInfo::rest("args", Ty::untyped()),
        ],
        (Owner::Magic, _) => vec![ParamInfo::rest("args", Ty::untyped())],
        (Owner::Tuple, "[]") => vec![ParamInfo::positional("index", Ty::untyped())],
        (Owner::Tuple, "concat") => vec![ParamInfo::rest("others", Ty::untyped())],
        (Owner::Tuple, _) => vec![],
        (Owner::Shape, "[]") => vec![ParamInfo::positional("key", Ty::untyped())],
        (Owner::Shape, "[]=") => vec![
            ParamInfo::positional("key", Ty::untyped()),
            ParamInfo::positional("value", Ty::untyped()),
        ],
        (Owner::Shape, "merge") => vec![ParamInfo::rest("others", Ty::untyped())],
        (Owner::Shape, _) => vec![],
        (Owner::Array, "flatten") => vec![ParamInfo::optional("depth", int)],
        (Owner::Array, "compact") => vec![],
        (Owner::Array, _) => vec![ParamInfo::rest("others", Ty::untyped())],
        _ => vec![],
    }
}

fn intrinsic_result(env: &GlobalEnv, e: &Entry) -> Option<Ty> {
    let b = env.builtins();
    match (e.owner, e.name) {
        (Owner::Module, "===") => Some(Ty::class(b.bool)),
        (Owner::Object, _) => Some(Ty::class(b.class)),
        (Owner::Array, "flatten" | "product" | "zip" | "compact") => {
            Some(subtype::array_of(env, Ty::untyped()))
        }
        _ => None,
    }
}

/// Core library signatures the dispatcher falls back on when a proxy
/// intrinsic declines a call (tuples decay to `Array`, shapes to `Hash`).
fn register_core_methods(env: &mut GlobalEnv) {
    let b = *env.builtins();
    let elem_member = env.symbols.class(b.array).type_members[0];
    let elem = Ty::LambdaParam {
        member: elem_member,
        upper: Box::new(Ty::untyped()),
        lower: Box::new(Ty::Bottom),
    };
    let hash_k_member = env.symbols.class(b.hash).type_members[0];
    let hash_v_member = env.symbols.class(b.hash).type_members[1];
    let hash_k = Ty::LambdaParam {
        member: hash_k_member,
        upper: Box::new(Ty::untyped()),
        lower: Box::new(Ty::Bottom),
    };
    let hash_v = Ty::LambdaParam {
        member: hash_v_member,
        upper: Box::new(Ty::untyped()),
        lower: Box::new(Ty::Bottom),
    };
    let elem_or_nil = Ty::Or(Box::new(elem.clone()), Box::new(Ty::Nil));
    let v_or_nil = Ty::Or(Box::new(hash_v.clone()), Box::new(Ty::Nil));
    let int = Ty::class(b.integer);

    let st = &mut env.symbols;
    let bool_ty = Ty::class(b.bool);
    st.define_method(
        b.object,
        "==",
        vec![ParamInfo::positional("other", Ty::untyped())],
        Some(bool_ty.clone()),
    );
    st.define_method(
        b.object,
        "!=",
        vec![ParamInfo::positional("other", Ty::untyped())],
        Some(bool_ty.clone()),
    );
    st.define_method(
        b.object,
        "===",
        vec![ParamInfo::positional("other", Ty::untyped())],
        Some(bool_ty),
    );
    st.define_method(
        b.array,
        "[]",
        vec![ParamInfo::positional("index", int)],
        Some(elem_or_nil.clone()),
    );
    st.define_method(b.array, "first", vec![], Some(elem_or_nil.clone()));
    st.define_method(b.array, "last", vec![], Some(elem_or_nil.clone()));
    st.define_method(b.array, "min", vec![], Some(elem_or_nil.clone()));
    st.define_method(b.array, "max", vec![], Some(elem_or_nil));
    st.define_method(b.array, "to_a", vec![], Some(Ty::SelfType));
    st.define_method(b.array, "to_ary", vec![], Some(Ty::SelfType));
    st.define_method(
        b.array,
        "concat",
        vec![ParamInfo::rest("others", Ty::untyped())],
        Some(Ty::SelfType),
    );

    st.define_method(
        b.hash,
        "[]",
        vec![ParamInfo::positional("key", hash_k.clone())],
        Some(v_or_nil),
    );
    st.define_method(
        b.hash,
        "[]=",
        vec![
            ParamInfo::positional("key", hash_k),
            ParamInfo::positional("value", hash_v.clone()),
        ],
        Some(hash_v),
    );
    st.define_method(
        b.hash,
        "merge",
        vec![ParamInfo::rest("others", Ty::untyped())],
        Some(Ty::SelfType),
    );
    st.define_method(b.hash, "to_hash", vec![], Some(Ty::SelfType));

    st.define_method(b.proc, "to_proc", vec![], Some(Ty::SelfType));
    st.define_method(
        b.proc,
        "call",
        vec![ParamInfo::rest("args", Ty::untyped())],
        None,
    );
    st.define_method(b.symbol, "to_proc", vec![], Some(Ty::class(b.proc)));
}

// ── Shared helpers ─────────────────────────────────────────────────────

/// The class symbol behind a receiver type, looking through proxies.
fn unwrap_symbol(env: &GlobalEnv, ty: &Ty) -> Option<ClassRef> {
    match ty {
        Ty::Class(c) | Ty::Applied(c, _) => Some(*c),
        Ty::Literal(_) | Ty::Shape(..) | Ty::Tuple(_) => unwrap_symbol(env, &ty.underlying(env)),
        _ => None,
    }
}

/// The symbol name carried by a symbol-literal type.
fn sym_lit_name(ty: &Ty) -> Option<&str> {
    match ty {
        Ty::Literal(Lit::Sym(name)) => Some(name),
        _ => None,
    }
}

fn arg_range(args: &DispatchArgs, index: usize) -> TextRange {
    args.locs
        .args
        .get(index)
        .copied()
        .unwrap_or(args.locs.call)
}

fn receiver_full(receiver: &TypeAndOrigins) -> TypeAndOrigins {
    TypeAndOrigins {
        ty: receiver.ty.clone(),
        origins: receiver.origins.clone(),
    }
}

// ── T ──────────────────────────────────────────────────────────────────

fn t_untyped(_env: &GlobalEnv, _args: &DispatchArgs, res: &mut DispatchResult) {
    res.return_type = Some(Ty::meta(Ty::untyped()));
}

fn t_noreturn(_env: &GlobalEnv, _args: &DispatchArgs, res: &mut DispatchResult) {
    res.return_type = Some(Ty::meta(Ty::Bottom));
}

fn t_proc(env: &GlobalEnv, _args: &DispatchArgs, res: &mut DispatchResult) {
    res.return_type = Some(Ty::meta(Ty::class(env.builtins().proc)));
}

fn t_must(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.is_empty() {
        return;
    }
    let loc = args.locs.call_loc();
    let arg = &args.args[0];
    if !arg.ty.is_fully_defined() {
        if !args.suppress_errors {
            res.main.errors.push(Diagnostic::new(
                DiagnosticCode::BareTypeUsage,
                loc,
                format!("T.must() applied to incomplete type `{}`", arg.ty.show(env)),
            ));
        }
        return;
    }
    let ret = subtype::approximate_subtract(env, &arg.ty, &Ty::Nil);
    if ret == arg.ty && !args.suppress_errors {
        let header = if arg.ty.is_untyped() {
            format!("`T.must` called on `{}`, which is redundant", arg.ty.show(env))
        } else {
            format!("`T.must` called on `{}`, which is never `nil`", arg.ty.show(env))
        };
        let mut d = Diagnostic::new(DiagnosticCode::InvalidCast, loc, header);
        d.add_section(arg.explain_got(env, args.origin_for_uninitialized));
        if let Some(src) = env.source(loc) {
            if let Some(inner) = src.strip_prefix("T.must(").and_then(|s| s.strip_suffix(')')) {
                d.add_autocorrect(Autocorrect {
                    title: "Remove `T.must`".to_string(),
                    loc,
                    replacement: inner.to_string(),
                });
            }
        }
        res.main.errors.push(d);
    }
    res.return_type = Some(ret);
}

fn t_any(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.is_empty() {
        return;
    }
    let mut ret = Ty::Bottom;
    for (i, arg) in args.args.iter().enumerate() {
        let loc = args.locs.arg_loc(i).unwrap_or_else(|| args.locs.call_loc());
        let ty = unwrap_type(env, loc, &arg.ty, &mut res.main.errors, args.suppress_errors);
        ret = subtype::any(env, &ret, &ty);
    }
    res.return_type = Some(Ty::meta(ret));
}

fn t_all(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.is_empty() {
        return;
    }
    let mut ret = Ty::Top;
    for (i, arg) in args.args.iter().enumerate() {
        let loc = args.locs.arg_loc(i).unwrap_or_else(|| args.locs.call_loc());
        let ty = unwrap_type(env, loc, &arg.ty, &mut res.main.errors, args.suppress_errors);
        ret = subtype::all(env, &ret, &ty);
    }
    res.return_type = Some(Ty::meta(ret));
}

fn t_nilable(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 1 {
        return;
    }
    let loc = args.locs.arg_loc(0).unwrap_or_else(|| args.locs.call_loc());
    let ty = unwrap_type(env, loc, &args.args[0].ty, &mut res.main.errors, args.suppress_errors);
    res.return_type = Some(Ty::meta(subtype::any(env, &ty, &Ty::Nil)));
}

fn t_reveal_type(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 1 {
        return;
    }
    if !args.suppress_errors {
        let mut d = Diagnostic::new(
            DiagnosticCode::RevealType,
            args.locs.call_loc(),
            format!("Revealed type: `{}`", args.args[0].ty.show(env)),
        );
        d.add_section(args.args[0].explain_got(env, args.origin_for_uninitialized));
        res.main.errors.push(d);
    }
    res.return_type = Some(args.args[0].ty.clone());
}

// ── Generic application ────────────────────────────────────────────────

/// `Generic[Type, ...]`: validate arity and bounds, substitute fixed
/// members, and produce the applied type as a value.
fn generic_square_brackets(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(self_cls) = unwrap_symbol(env, &args.this_type) else {
        return;
    };
    let Some(attached) = env.symbols.class(self_cls).attached_class else {
        return;
    };
    if env.symbols.class(attached).type_members.is_empty() {
        return;
    }
    let arity = env.symbols.type_arity(attached);
    let call_loc = args.locs.call_loc();

    let num_kwargs = args.args.len() - args.num_pos_args;
    if num_kwargs > 0 && !args.suppress_errors {
        let start = arg_range(args, args.num_pos_args);
        let end = arg_range(args, args.args.len() - 1);
        let kwargs_loc = Loc::new(args.locs.file, start.cover(end));
        let mut d = Diagnostic::new(
            DiagnosticCode::GenericArgumentKeywordArgs,
            kwargs_loc,
            format!(
                "Keyword arguments given to `{}`",
                env.symbols.class(attached).name
            ),
        );
        // Offer to turn the keyword args into a hash when there is no
        // trailing double-splat.
        if num_kwargs % 2 == 0 {
            if let Some(src) = env.source(kwargs_loc) {
                d.add_autocorrect(Autocorrect {
                    title: "Wrap with braces".to_string(),
                    loc: kwargs_loc,
                    replacement: format!("{{{}}}", src),
                });
            }
        }
        res.main.errors.push(d);
    }

    if args.num_pos_args != arity && !args.suppress_errors {
        res.main.errors.push(Diagnostic::new(
            DiagnosticCode::GenericArgumentCountMismatch,
            call_loc,
            format!(
                "Wrong number of type parameters for `{}`. Expected: `{}`, got: `{}`",
                env.symbols.class(attached).name,
                arity,
                args.num_pos_args
            ),
        ));
    }

    let members = env.symbols.class(attached).type_members.clone();
    let mut targs = Vec::with_capacity(members.len());
    let mut it = 0usize;
    for mem in members {
        let memd = env.symbols.type_member(mem);
        if memd.fixed {
            // Fixed members are implicitly applied and consume no type
            // argument from the list.
            targs.push(memd.upper.clone());
            continue;
        }
        if it < args.args.len() {
            let loc = args.locs.arg_loc(it).unwrap_or(call_loc);
            let arg_ty = unwrap_type(env, loc, &args.args[it].ty, &mut res.main.errors, args.suppress_errors);
            let mut valid_bounds = true;

            if !subtype::is_subtype(env, &arg_ty, &memd.upper) {
                valid_bounds = false;
                if !args.suppress_errors {
                    let mut d = Diagnostic::new(
                        DiagnosticCode::GenericTypeParamBoundMismatch,
                        loc,
                        format!(
                            "`{}` is not a subtype of upper bound of type member `{}`",
                            arg_ty.show(env),
                            memd.name
                        ),
                    );
                    if let Some(mem_loc) = memd.loc {
                        d.add_line(
                            mem_loc,
                            format!(
                                "`{}` is `upper` bounded by `{}` here",
                                memd.name,
                                memd.upper.show(env)
                            ),
                        );
                    }
                    res.main.errors.push(d);
                }
            }
            if !subtype::is_subtype(env, &memd.lower, &arg_ty) {
                valid_bounds = false;
                if !args.suppress_errors {
                    let mut d = Diagnostic::new(
                        DiagnosticCode::GenericTypeParamBoundMismatch,
                        loc,
                        format!(
                            "`{}` is not a supertype of lower bound of type member `{}`",
                            arg_ty.show(env),
                            memd.name
                        ),
                    );
                    if let Some(mem_loc) = memd.loc {
                        d.add_line(
                            mem_loc,
                            format!(
                                "`{}` is `lower` bounded by `{}` here",
                                memd.name,
                                memd.lower.show(env)
                            ),
                        );
                    }
                    res.main.errors.push(d);
                }
            }

            targs.push(if valid_bounds { arg_ty } else { Ty::untyped() });
            it += 1;
        } else {
            targs.push(Ty::untyped());
        }
    }

    res.return_type = Some(Ty::meta(Ty::Applied(attached, targs)));
}

// ── Class primitives ───────────────────────────────────────────────────

fn object_class(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let class_class = Ty::class(env.builtins().class);
    let Some(self_cls) = unwrap_symbol(env, &args.this_type) else {
        res.return_type = Some(class_class);
        return;
    };
    res.return_type = Some(match env.symbols.class(self_cls).singleton_class {
        Some(singleton) => env.symbols.external_type(singleton),
        None => class_class,
    });
}

fn class_new(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(self_cls) = unwrap_symbol(env, &args.this_type) else {
        return;
    };
    let attached = match env.symbols.class(self_cls).attached_class {
        Some(a) => a,
        // `Class.new(...)` on no class in particular still yields some
        // sort of object.
        None if self_cls == env.builtins().class => env.builtins().object,
        None => return,
    };
    let instance_ty = env.symbols.external_type(attached);

    let mut inner = args.clone();
    inner.name = "initialize".to_string();
    inner.this_type = instance_ty.clone();
    inner.self_type = instance_ty.clone();
    inner.full_type = TypeAndOrigins {
        ty: instance_ty.clone(),
        origins: args.full_type.origins.clone(),
    };
    let mut dispatched = dispatch_call(env, &instance_ty, &inner);

    let pre = std::mem::take(&mut res.main.errors);
    dispatched.main.errors.extend(pre);
    res.return_type = Some(instance_ty.clone());
    res.main = dispatched.main;
    if res.main.method.is_none() {
        // The class defines no custom initializer; still record that the
        // call dispatched to the stock constructor.
        res.main.method = env.symbols.find_member_transitive(env.builtins().class, "new");
    }
    res.main.send_ty = Some(instance_ty);
}

// ── Runtime-call shims ─────────────────────────────────────────────────

fn magic_build_hash(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    debug_assert!(args.args.len() % 2 == 0);
    let mut keys = Vec::with_capacity(args.args.len() / 2);
    let mut values = Vec::with_capacity(args.args.len() / 2);
    let mut i = 0;
    while i + 1 < args.args.len() {
        match &args.args[i].ty {
            Ty::Literal(lit) => {
                keys.push(lit.clone());
                values.push(args.args[i + 1].ty.clone());
            }
            _ => {
                res.return_type = Some(subtype::hash_of_untyped(env));
                return;
            }
        }
        i += 2;
    }
    res.return_type = Some(Ty::Shape(keys, values));
}

fn magic_build_array(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    // An array of type values is itself a type value: lift the whole
    // tuple to the meta level.
    let is_type = args.args.iter().any(|a| matches!(a.ty, Ty::Meta(_)));
    let mut elems = Vec::with_capacity(args.args.len());
    for (i, arg) in args.args.iter().enumerate() {
        if is_type {
            let loc = args.locs.arg_loc(i).unwrap_or_else(|| args.locs.call_loc());
            elems.push(unwrap_type(env, loc, &arg.ty, &mut res.main.errors, args.suppress_errors));
        } else {
            elems.push(arg.ty.clone());
        }
    }
    let tuple = Ty::Tuple(elems);
    res.return_type = Some(if is_type { Ty::meta(tuple) } else { tuple });
}

fn magic_build_range(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 3 {
        return;
    }
    let mut elem = subtype::drop_literal(env, &args.args[0].ty);
    let first_is_nil = elem.is_nil();
    if !first_is_nil {
        elem = subtype::drop_nil(env, &elem);
    }
    let other = subtype::drop_literal(env, &args.args[1].ty);
    let second_is_nil = other.is_nil();
    if first_is_nil {
        if second_is_nil {
            elem = Ty::untyped();
        } else {
            elem = subtype::drop_nil(env, &other);
        }
    } else if !second_is_nil {
        elem = subtype::any(env, &elem, &subtype::drop_nil(env, &other));
    }
    res.return_type = Some(subtype::range_of(env, elem));
}

fn expand_array(env: &GlobalEnv, ty: &Ty, expand_to: usize) -> Ty {
    if let Ty::Or(l, r) = ty {
        return subtype::any(
            env,
            &expand_array(env, l, expand_to),
            &expand_array(env, r, expand_to),
        );
    }
    let mut types = match ty {
        Ty::Tuple(elems) => elems.clone(),
        _ => {
            if subtype::approximate(env, ty, &TypeConstraint::empty_frozen())
                .derives_from(env, env.builtins().array)
            {
                // A plain array: nothing to say about its elements, pass
                // it through unexpanded.
                return ty.clone();
            }
            vec![ty.clone()]
        }
    };
    if types.len() < expand_to {
        types.resize(expand_to, Ty::Nil);
    }
    Ty::Tuple(types)
}

fn magic_expand_splat(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 3 {
        res.return_type = Some(subtype::array_of(env, Ty::untyped()));
        return;
    }
    let val = &args.args[0].ty;
    let (before, after) = match (&args.args[1].ty, &args.args[2].ty) {
        (Ty::Literal(Lit::Int(b)), Ty::Literal(Lit::Int(a))) => (*b, *a),
        _ => {
            res.return_type = Some(Ty::untyped());
            return;
        }
    };
    res.return_type = Some(expand_array(env, val, (before + after).max(0) as usize));
}

fn magic_splat(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 1 {
        return;
    }
    let arg = &args.args[0];
    let locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: Some(args.locs.call),
        args: Vec::new(),
    };
    let inner = DispatchArgs {
        name: "to_a".to_string(),
        locs,
        num_pos_args: 0,
        args: Vec::new(),
        this_type: arg.ty.clone(),
        self_type: arg.ty.clone(),
        full_type: TypeAndOrigins {
            ty: arg.ty.clone(),
            origins: args.full_type.origins.clone(),
        },
        block: None,
        suppress_errors: false,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };
    let mut dispatched = dispatch_call(env, &arg.ty, &inner);
    // The runtime handles a failing to_a itself; all we need to know is
    // whether the call checked out.
    if !dispatched.take_errors().is_empty() {
        res.return_type = Some(subtype::array_of(env, Ty::untyped()));
    } else {
        res.return_type = Some(dispatched.ret());
    }
}

fn magic_suggest_type(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 1 {
        return;
    }
    let ty = subtype::widen(env, &args.args[0].ty);
    let loc = args.locs.arg_loc(0).unwrap_or_else(|| args.locs.call_loc());
    if !args.suppress_errors {
        let mut d = Diagnostic::new(
            DiagnosticCode::UntypedConstantSuggestion,
            loc,
            "Constants must have type annotations with `T.let` when specifying `# typed: strict`",
        );
        if !ty.is_untyped() {
            if let Some(src) = env.source(loc) {
                d.add_autocorrect(Autocorrect {
                    title: format!("Initialize as `{}`", ty.show(env)),
                    loc,
                    replacement: format!("T.let({}, {})", src, ty.show(env)),
                });
            }
        }
        res.main.errors.push(d);
    }
    res.return_type = Some(ty);
}

fn magic_self_new(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    // args[0] is the class to instantiate; the rest go to the constructor.
    if args.args.is_empty() {
        res.return_type = Some(Ty::untyped());
        return;
    }
    let self_tao = &args.args[0];
    let self_cls = unwrap_symbol(env, &self_tao.ty);

    let num_pos_args = args.num_pos_args.saturating_sub(1);
    let send_args: Vec<TypeAndOrigins> = args.args[1..].to_vec();
    let send_arg_ranges: Vec<TextRange> =
        (1..args.args.len()).map(|i| arg_range(args, i)).collect();
    let send_locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: args.locs.args.first().copied(),
        args: send_arg_ranges,
    };
    let inner = DispatchArgs {
        name: "new".to_string(),
        locs: send_locs,
        num_pos_args,
        args: send_args,
        this_type: self_tao.ty.clone(),
        self_type: self_tao.ty.clone(),
        full_type: receiver_full(self_tao),
        block: args.block.clone(),
        suppress_errors: args.suppress_errors,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };
    let mut dispatched = dispatch_call(env, &self_tao.ty, &inner);
    let mut return_ty = dispatched.ret();

    // Dispatching to something constructor-shaped on a singleton: the
    // instance being made is "the attached class", which stays abstract
    // in subclass-aware contexts.
    if let Some(self_cls) = self_cls {
        let is_singleton = env.symbols.class(self_cls).attached_class.is_some();
        let class_new_method = env.symbols.find_member_transitive(env.builtins().class, "new");
        let hit_constructor = dispatched.main.method.map_or(false, |m| {
            Some(m) == class_new_method || env.symbols.method(m).name == "initialize"
        });
        if is_singleton && hit_constructor {
            if let Some(attached_member) = env.symbols.find_type_member(self_cls, "AttachedClass") {
                return_ty = Ty::SelfParam(attached_member);
            }
        }
    }

    let pre = std::mem::take(&mut res.main.errors);
    dispatched.main.errors.extend(pre);
    res.main = dispatched.main;
    res.return_type = Some(return_ty.clone());
    res.main.send_ty = Some(return_ty);
}

fn magic_call_with_splat(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    // args: receiver, method, positional-args tuple, keyword-args tuple.
    if args.args.len() != 4 {
        return;
    }
    let receiver = &args.args[0];
    if receiver.ty.is_untyped() {
        res.return_type = Some(receiver.ty.clone());
        return;
    }
    if !receiver.ty.is_fully_defined() {
        return;
    }
    let Some(fn_name) = sym_lit_name(&args.args[1].ty) else {
        return;
    };
    if args.args[2].ty.is_untyped() {
        res.return_type = Some(args.args[2].ty.clone());
        return;
    }
    let Ty::Tuple(pos_elems) = &args.args[2].ty else {
        if !args.suppress_errors {
            res.main.errors.push(Diagnostic::new(
                DiagnosticCode::UntypedSplat,
                Loc::new(args.locs.file, arg_range(args, 2)),
                "Splats are only supported where the size of the array is known statically",
            ));
        }
        return;
    };
    let kw_elems: Option<&[Ty]> = match &args.args[3].ty {
        Ty::Tuple(elems) => Some(elems),
        Ty::Nil => None,
        _ => {
            if !args.suppress_errors {
                res.main.errors.push(Diagnostic::new(
                    DiagnosticCode::UntypedSplat,
                    Loc::new(args.locs.file, arg_range(args, 2)),
                    "Keyword args with splats are only supported where the shape of the hash \
                     is known statically",
                ));
            }
            return;
        }
    };

    let fn_name = fn_name.to_string();
    let splat_range = arg_range(args, 2);
    let splat_loc = Loc::new(args.locs.file, splat_range);
    let send_args: Vec<TypeAndOrigins> = pos_elems
        .iter()
        .chain(kw_elems.into_iter().flatten())
        .map(|t| TypeAndOrigins::new(t.clone(), splat_loc))
        .collect();
    let send_locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: args.locs.args.first().copied(),
        args: vec![splat_range; send_args.len()],
    };
    let inner = DispatchArgs {
        name: fn_name,
        locs: send_locs,
        num_pos_args: pos_elems.len(),
        args: send_args,
        this_type: receiver.ty.clone(),
        self_type: receiver.ty.clone(),
        full_type: receiver_full(receiver),
        block: args.block.clone(),
        suppress_errors: args.suppress_errors,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };
    let mut dispatched = dispatch_call(env, &receiver.ty, &inner);

    if dispatched
        .main
        .constr
        .as_ref()
        .map_or(true, |c| c.is_empty())
    {
        dispatched.main.constr = res.main.constr.take();
    }
    let pre = std::mem::take(&mut res.main.errors);
    dispatched.main.errors.extend(pre);
    res.return_type = dispatched.return_type.clone();
    res.main = dispatched.main;
}

/// Coerce a block-position value to a proc by dispatching `to_proc` on
/// it. Nil blocks stay nil; a nilable block rejoins nil with whatever
/// `to_proc` produced.
fn type_to_proc(
    env: &GlobalEnv,
    block: &TypeAndOrigins,
    locs: &CallLocs,
    receiver_range: TextRange,
    origin_for_uninitialized: Option<Loc>,
    errors: &mut Vec<Diagnostic>,
    suppress_errors: bool,
) -> Ty {
    let mut ty = block.ty.clone();
    let mut is_nilable = false;
    if subtype::is_subtype(env, &Ty::Nil, &ty) {
        let dropped = subtype::drop_nil(env, &ty);
        is_nilable = true;
        if dropped.is_bottom() {
            return Ty::Nil;
        }
        ty = dropped;
    }

    let inner_locs = CallLocs {
        file: locs.file,
        call: locs.call,
        receiver: Some(receiver_range),
        args: Vec::new(),
    };
    let inner = DispatchArgs {
        name: "to_proc".to_string(),
        locs: inner_locs,
        num_pos_args: 0,
        args: Vec::new(),
        this_type: ty.clone(),
        self_type: ty.clone(),
        full_type: TypeAndOrigins {
            ty: ty.clone(),
            origins: block.origins.clone(),
        },
        block: None,
        suppress_errors,
        origin_for_uninitialized,
    };
    let mut dispatched = dispatch_call(env, &ty, &inner);
    errors.extend(dispatched.take_errors());

    if is_nilable {
        subtype::any(env, &dispatched.ret(), &Ty::Nil)
    } else {
        dispatched.ret()
    }
}

fn show_location_of_arg_defn(
    env: &GlobalEnv,
    d: &mut Diagnostic,
    block_type: &Ty,
    comp: &DispatchComponent,
) {
    let Some(method) = comp.method else {
        return;
    };
    let bspec = env.symbols.method(method).block_param();
    let lines = match bspec.loc {
        Some(loc) => vec![ErrorLine::new(loc, "defined here")],
        None => Vec::new(),
    };
    d.add_section(ErrorSection {
        header: format!(
            "Expected `{}` for block argument `{}` of method `{}`:",
            block_type.show(env),
            bspec.argument_name(),
            env.symbols.show_method(method)
        ),
        lines,
    });
}

/// Dispatch the underlying send of a call-with-block shim and check the
/// coerced block value against the resolved method's block parameter,
/// solving the constraint the block discovery accumulated.
fn simulate_call(
    env: &GlobalEnv,
    receiver: &TypeAndOrigins,
    inner_args: &DispatchArgs,
    passed_block_type: Ty,
    block_loc: Loc,
    call_loc: Loc,
    res: &mut DispatchResult,
) {
    let suppress = inner_args.suppress_errors;
    let mut dispatched = dispatch_call(env, &receiver.ty, inner_args);
    let inner_errors = std::mem::take(&mut dispatched.main.errors);
    res.main.errors.extend(inner_errors);

    let mut passed = passed_block_type;
    let mut constr = dispatched
        .main
        .constr
        .take()
        .unwrap_or_else(TypeConstraint::new);

    if let Some(block_pre) = dispatched.main.block_pre_type.clone() {
        if !subtype::is_subtype_under(env, &mut constr, &passed, &block_pre, UntypedMode::AlwaysCompatible)
        {
            let non_nil_block = subtype::drop_nil(env, &block_pre);
            let passed_is_bare_proc =
                matches!(&passed, Ty::Class(c) if *c == env.builtins().proc);
            if passed_is_bare_proc && subtype::is_subtype(env, &non_nil_block, &passed) {
                // A proc of unknown arity meets a formal of known arity.
                // Flag it, then substitute a proc of the right arity with
                // untyped parameters so generic inference lands on untyped
                // rather than bottom.
                if !suppress {
                    let mut d = Diagnostic::new(
                        DiagnosticCode::ProcArityUnknown,
                        block_loc,
                        format!(
                            "Cannot use a `Proc` with unknown arity as a `{}`",
                            block_pre.show(env)
                        ),
                    );
                    if dispatched.secondary.is_none() {
                        show_location_of_arg_defn(env, &mut d, &block_pre, &dispatched.main);
                    }
                    res.main.errors.push(d);
                }
                if let Some(arity) = subtype::get_proc_arity(env, &non_nil_block) {
                    passed = subtype::proc_of_arity(env, arity);
                }
            } else if !suppress {
                let mut d = Diagnostic::new(
                    DiagnosticCode::MethodArgumentMismatch,
                    block_loc,
                    format!(
                        "Expected `{}` but found `{}` for block argument",
                        block_pre.show(env),
                        passed.show(env)
                    ),
                );
                if dispatched.secondary.is_none() {
                    show_location_of_arg_defn(env, &mut d, &block_pre, &dispatched.main);
                }
                res.main.errors.push(d);
            }
        }
    }

    // Walk the whole chain rechecking the block against each component's
    // declared block parameter, to discover the generic bounds each one
    // implies.
    {
        let mut node = Some(&dispatched);
        while let Some(cur) = node {
            if let Some(method) = cur.main.method {
                if let Some(bty) = &env.symbols.method(method).block_param().ty {
                    let _ = subtype::is_subtype_under(
                        env,
                        &mut constr,
                        &passed,
                        bty,
                        UntypedMode::AlwaysCompatible,
                    );
                }
            }
            node = cur.secondary.as_deref();
        }
    }

    if !constr.is_frozen() {
        if !constr.solve(env) {
            if !suppress {
                res.main.errors.push(Diagnostic::new(
                    DiagnosticCode::GenericMethodConstraintUnsolved,
                    call_loc,
                    "Could not find valid instantiation of type parameters",
                ));
            }
            dispatched.return_type = Some(Ty::untyped());
        } else if !constr.is_empty() {
            dispatched.return_type = Some(subtype::instantiate(env, &dispatched.ret(), &constr));
        }
    }
    res.return_type = Some(dispatched.ret());
}

fn magic_call_with_block(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    // args: receiver, method, block value, then the forwarded arguments;
    // equivalent to `receiver.method(*args[3..], &args[2])`.
    if args.args.len() < 3 {
        return;
    }
    let receiver = &args.args[0];
    if receiver.ty.is_untyped() {
        res.return_type = Some(receiver.ty.clone());
        return;
    }
    if !receiver.ty.is_fully_defined() {
        return;
    }
    if matches!(args.args[2].ty, Ty::Var(_)) {
        if !args.suppress_errors {
            res.main.errors.push(Diagnostic::new(
                DiagnosticCode::GenericPassedAsBlock,
                Loc::new(args.locs.file, arg_range(args, 2)),
                "Passing generics as block arguments is not supported",
            ));
        }
        return;
    }
    let Some(fn_name) = sym_lit_name(&args.args[1].ty) else {
        return;
    };
    let fn_name = fn_name.to_string();

    let num_pos_args = args.num_pos_args.saturating_sub(3);
    let send_args: Vec<TypeAndOrigins> = args.args[3..].to_vec();
    let send_arg_ranges: Vec<TextRange> =
        (3..args.args.len()).map(|i| arg_range(args, i)).collect();
    let send_locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: args.locs.args.first().copied(),
        args: send_arg_ranges,
    };

    let block_range = arg_range(args, 2);
    let final_block_type = type_to_proc(
        env,
        &args.args[2],
        &args.locs,
        block_range,
        args.origin_for_uninitialized,
        &mut res.main.errors,
        args.suppress_errors,
    );
    let block_arity = subtype::get_proc_arity(env, &final_block_type);
    res.main.constr = Some(TypeConstraint::new());

    let inner = DispatchArgs {
        name: fn_name,
        locs: send_locs,
        num_pos_args,
        args: send_args,
        this_type: receiver.ty.clone(),
        self_type: receiver.ty.clone(),
        full_type: receiver_full(receiver),
        block: Some(BlockArg {
            fixed_arity: block_arity,
        }),
        suppress_errors: args.suppress_errors,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };

    simulate_call(
        env,
        receiver,
        &inner,
        final_block_type,
        Loc::new(args.locs.file, block_range),
        args.locs.call_loc(),
        res,
    );
}

fn magic_call_with_splat_and_block(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    // args: receiver, method, positional tuple, keyword tuple, block.
    if args.args.len() != 5 {
        return;
    }
    let receiver = &args.args[0];
    if receiver.ty.is_untyped() {
        res.return_type = Some(receiver.ty.clone());
        return;
    }
    if !receiver.ty.is_fully_defined() {
        return;
    }
    let Some(fn_name) = sym_lit_name(&args.args[1].ty) else {
        return;
    };
    let fn_name = fn_name.to_string();

    if args.args[2].ty.is_untyped() {
        res.return_type = Some(args.args[2].ty.clone());
        return;
    }
    let Ty::Tuple(pos_elems) = &args.args[2].ty else {
        if !args.suppress_errors {
            res.main.errors.push(Diagnostic::new(
                DiagnosticCode::UntypedSplat,
                Loc::new(args.locs.file, arg_range(args, 2)),
                "Splats are only supported where the size of the array is known statically",
            ));
        }
        return;
    };
    let kw_elems: Option<&[Ty]> = match &args.args[3].ty {
        Ty::Tuple(elems) => Some(elems),
        Ty::Nil => None,
        _ => {
            if !args.suppress_errors {
                res.main.errors.push(Diagnostic::new(
                    DiagnosticCode::UntypedSplat,
                    Loc::new(args.locs.file, arg_range(args, 2)),
                    "Keyword args with splats are only supported where the shape of the hash \
                     is known statically",
                ));
            }
            return;
        }
    };
    if matches!(args.args[4].ty, Ty::Var(_)) {
        if !args.suppress_errors {
            res.main.errors.push(Diagnostic::new(
                DiagnosticCode::GenericPassedAsBlock,
                Loc::new(args.locs.file, arg_range(args, 4)),
                "Passing generics as block arguments is not supported",
            ));
        }
        return;
    }

    let splat_range = arg_range(args, 2);
    let splat_loc = Loc::new(args.locs.file, splat_range);
    let send_args: Vec<TypeAndOrigins> = pos_elems
        .iter()
        .chain(kw_elems.into_iter().flatten())
        .map(|t| TypeAndOrigins::new(t.clone(), splat_loc))
        .collect();
    let send_locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: args.locs.args.first().copied(),
        args: vec![splat_range; send_args.len()],
    };

    let block_range = arg_range(args, 4);
    let final_block_type = type_to_proc(
        env,
        &args.args[4],
        &args.locs,
        block_range,
        args.origin_for_uninitialized,
        &mut res.main.errors,
        args.suppress_errors,
    );
    let block_arity = subtype::get_proc_arity(env, &final_block_type);
    res.main.constr = Some(TypeConstraint::new());

    let inner = DispatchArgs {
        name: fn_name,
        locs: send_locs,
        num_pos_args: pos_elems.len(),
        args: send_args,
        this_type: receiver.ty.clone(),
        self_type: receiver.ty.clone(),
        full_type: receiver_full(receiver),
        block: Some(BlockArg {
            fixed_arity: block_arity,
        }),
        suppress_errors: args.suppress_errors,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };

    simulate_call(
        env,
        receiver,
        &inner,
        final_block_type,
        Loc::new(args.locs.file, block_range),
        args.locs.call_loc(),
        res,
    );
}

// ── Tuple ──────────────────────────────────────────────────────────────

fn tuple_square_brackets(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Tuple(elems) = &args.this_type else {
        return;
    };
    if args.args.len() != 1 {
        return;
    }
    let Ty::Literal(lit) = &args.args[0].ty else {
        return;
    };
    let Some(mut idx) = lit.as_int() else {
        return;
    };
    if idx < 0 {
        idx += elems.len() as i64;
    }
    res.return_type = Some(if idx < 0 || idx as usize >= elems.len() {
        Ty::Nil
    } else {
        elems[idx as usize].clone()
    });
}

fn tuple_first(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Tuple(elems) = &args.this_type else {
        return;
    };
    if !args.args.is_empty() {
        return;
    }
    res.return_type = Some(elems.first().cloned().unwrap_or(Ty::Nil));
}

fn tuple_last(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Tuple(elems) = &args.this_type else {
        return;
    };
    if !args.args.is_empty() {
        return;
    }
    res.return_type = Some(elems.last().cloned().unwrap_or(Ty::Nil));
}

fn tuple_min_max(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Tuple(elems) = &args.this_type else {
        return;
    };
    if !args.args.is_empty() {
        return;
    }
    res.return_type = Some(if elems.is_empty() {
        Ty::Nil
    } else {
        subtype::tuple_element_type(env, elems)
    });
}

fn tuple_to_a(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    res.return_type = Some(args.self_type.clone());
}

fn tuple_concat(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Tuple(elems) = &args.this_type else {
        return;
    };
    let mut out = elems.clone();
    for arg in &args.args {
        match &arg.ty {
            Ty::Tuple(more) => out.extend(more.iter().cloned()),
            _ => return,
        }
    }
    res.return_type = Some(Ty::Tuple(out));
}

// ── Shape ──────────────────────────────────────────────────────────────

fn shape_square_brackets(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Shape(keys, values) = &args.this_type else {
        return;
    };
    if args.args.len() != 1 {
        return;
    }
    let Ty::Literal(lit) = &args.args[0].ty else {
        return;
    };
    res.return_type = Some(match keys.iter().position(|k| k == lit) {
        Some(idx) => values[idx].clone(),
        None => Ty::Nil,
    });
}

/// Locate the literal source text for a shape key's value. There is no
/// recorded location for "the value of key k", so scan the shape's origin
/// for the most common pinned literals. The scan must be exact or the
/// autocorrect is dropped.
fn loc_of_value_for_key(env: &GlobalEnv, origin: Loc, key: &str, expected: &Ty) -> Option<Loc> {
    let value_str = match expected {
        Ty::Nil => "nil",
        Ty::Literal(Lit::Bool(true)) => "true",
        Ty::Literal(Lit::Bool(false)) => "false",
        _ => return None,
    };
    let source = env.source(origin)?;
    let key_marker = format!("{}:", key);
    let key_start = source.find(&key_marker)?;

    let value_begin = usize::from(origin.range.start()) + key_start + key_marker.len() + 1;
    let value_end = value_begin + value_str.len();
    let loc = Loc::new(
        origin.file,
        TextRange::new((value_begin as u32).into(), (value_end as u32).into()),
    );
    if env.source(loc) == Some(value_str) {
        Some(loc)
    } else {
        None
    }
}

fn shape_square_brackets_eq(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Shape(keys, values) = &args.this_type else {
        return;
    };
    if args.args.len() != 2 {
        // Arg matching will report the arity problem.
        return;
    }
    let Ty::Literal(arg_lit) = &args.args[0].ty else {
        return;
    };

    match keys.iter().position(|k| k == arg_lit) {
        Some(idx) => {
            let expected = &values[idx];
            let actual = &args.args[1];
            if !subtype::is_subtype(
                env,
                &subtype::drop_literal(env, &actual.ty),
                &subtype::drop_literal(env, expected),
            ) && !args.suppress_errors
            {
                let arg_loc = args
                    .locs
                    .arg_loc(1)
                    .unwrap_or_else(|| args.locs.call_loc());
                let mut d = Diagnostic::new(
                    DiagnosticCode::MethodArgumentMismatch,
                    arg_loc,
                    format!(
                        "Expected `{}` but found `{}` for key `{}`",
                        expected.show(env),
                        actual.ty.show(env),
                        keys[idx]
                    ),
                );
                d.add_section(ErrorSection {
                    header: "Shape originates from here:".to_string(),
                    lines: args
                        .full_type
                        .origins
                        .iter()
                        .map(|loc| ErrorLine {
                            loc: Some(*loc),
                            message: String::new(),
                        })
                        .collect(),
                });
                d.add_section(actual.explain_got(env, args.origin_for_uninitialized));

                if args.full_type.origins.len() == 1 {
                    if let Some(key_name) = arg_lit.as_sym() {
                        if let Some(value_loc) =
                            loc_of_value_for_key(env, args.full_type.origins[0], key_name, expected)
                        {
                            let widened = subtype::any(env, expected, &actual.ty);
                            let original = env.source(value_loc).unwrap_or_default().to_string();
                            d.add_autocorrect(Autocorrect {
                                title: "Initialize with `T.let`".to_string(),
                                loc: value_loc,
                                replacement: format!("T.let({}, {})", original, widened.show(env)),
                            });
                        }
                    }
                }
                res.main.errors.push(d);
            }
            // Leave the return type unset: the call falls through to the
            // underlying hash, which checks the argument types.
        }
        None => {
            // Unknown key: writes grow the hash at runtime, so accept
            // anything and give up on precision.
            res.return_type = Some(Ty::untyped());
        }
    }
}

fn shape_merge(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Ty::Shape(keys0, values0) = &args.this_type else {
        return;
    };
    if args.args.is_empty() || args.block.is_some() {
        return;
    }

    // Either a kwsplat argument or a single positional shape argument.
    let non_pos = args.args.len() - args.num_pos_args;
    let num_kwargs = non_pos & !1usize;
    let has_kwsplat = non_pos % 2 == 1;
    let mut kwsplat: Option<(&Vec<Lit>, &Vec<Ty>)> = None;
    if has_kwsplat || (num_kwargs == 0 && args.args.len() == 1) {
        match &args.args.last().unwrap().ty {
            Ty::Shape(k, v) => kwsplat = Some((k, v)),
            _ => return,
        }
    }

    let mut keys = keys0.clone();
    let mut values = values0.clone();
    fn add_entry(keys: &mut Vec<Lit>, values: &mut Vec<Ty>, key: &Lit, value: &Ty) {
        match keys.iter().position(|k| k == key) {
            Some(i) => values[i] = value.clone(),
            None => {
                keys.push(key.clone());
                values.push(value.clone());
            }
        }
    }

    // Inlined keyword arguments first.
    let start = args.num_pos_args;
    let mut i = start;
    while i < start + num_kwargs {
        let Ty::Literal(key) = &args.args[i].ty else {
            return;
        };
        if !key.is_symbol() {
            return;
        }
        add_entry(&mut keys, &mut values, key, &args.args[i + 1].ty);
        i += 2;
    }

    // Then the kwsplat.
    if let Some((sk, sv)) = kwsplat {
        for (k, v) in sk.iter().zip(sv.iter()) {
            add_entry(&mut keys, &mut values, k, v);
        }
    }

    res.return_type = Some(Ty::Shape(keys, values));
}

fn shape_to_hash(_env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    res.return_type = Some(args.self_type.clone());
}

// ── Array ──────────────────────────────────────────────────────────────

/// The element type of an array-like receiver, when statically known.
fn array_element(env: &GlobalEnv, ty: &Ty) -> Option<Ty> {
    match ty {
        Ty::Applied(c, targs)
            if env.symbols.derives_from(*c, env.builtins().array) && !targs.is_empty() =>
        {
            Some(targs[0].clone())
        }
        Ty::Tuple(elems) => Some(subtype::tuple_element_type(env, elems)),
        _ => None,
    }
}

/// Implicit `to_ary` coercion during flattening: if the element responds,
/// keep flattening whatever it returns; otherwise leave it alone.
fn flatten_to_ary(env: &GlobalEnv, args: &DispatchArgs, ty: &Ty, new_depth: i64) -> Ty {
    if ty.is_untyped() {
        return ty.clone();
    }
    let locs = CallLocs {
        file: args.locs.file,
        call: args.locs.call,
        receiver: args.locs.receiver,
        args: Vec::new(),
    };
    let inner = DispatchArgs {
        name: "to_ary".to_string(),
        locs,
        num_pos_args: 0,
        args: Vec::new(),
        this_type: ty.clone(),
        self_type: ty.clone(),
        full_type: TypeAndOrigins {
            ty: ty.clone(),
            origins: args.full_type.origins.clone(),
        },
        block: None,
        suppress_errors: false,
        origin_for_uninitialized: args.origin_for_uninitialized,
    };
    let mut dispatched = dispatch_call(env, ty, &inner);
    if dispatched.take_errors().is_empty() {
        let ret = dispatched.ret();
        recursively_flatten(env, args, &ret, new_depth)
    } else {
        ty.clone()
    }
}

/// Flatten nested arrays and tuples down to the element type, stopping at
/// the depth limit.
fn recursively_flatten(env: &GlobalEnv, args: &DispatchArgs, ty: &Ty, depth: i64) -> Ty {
    if depth == 0 {
        return ty.clone();
    }
    let new_depth = depth - 1;
    match ty {
        // A tuple's element type is the union of its elements, so nested
        // tuples surface as unions; descend through them.
        Ty::Or(l, r) => subtype::any(
            env,
            &recursively_flatten(env, args, l, new_depth),
            &recursively_flatten(env, args, r, new_depth),
        ),
        Ty::Applied(c, targs)
            if env.symbols.derives_from(*c, env.builtins().array) && !targs.is_empty() =>
        {
            recursively_flatten(env, args, &targs[0], new_depth)
        }
        Ty::Tuple(elems) => {
            recursively_flatten(env, args, &subtype::tuple_element_type(env, elems), new_depth)
        }
        Ty::Class(_) | Ty::Applied(..) => flatten_to_ary(env, args, ty, new_depth),
        other => other.clone(),
    }
}

fn array_flatten(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(element) = array_element(env, &args.this_type) else {
        return;
    };

    let depth = match args.args.len() {
        0 => i64::MAX,
        1 => match &args.args[0].ty {
            // Negative depths behave as if no depth was given.
            Ty::Literal(Lit::Int(d)) if *d >= 0 => *d,
            Ty::Literal(Lit::Int(_)) => i64::MAX,
            _ => {
                if !args.suppress_errors {
                    let loc = args.locs.arg_loc(0).unwrap_or_else(|| args.locs.call_loc());
                    res.main.errors.push(Diagnostic::new(
                        DiagnosticCode::ExpectedLiteralType,
                        loc,
                        "You must pass an Integer literal to specify a depth with Array#flatten",
                    ));
                }
                return;
            }
        },
        // Arity errors are reported by ordinary argument matching.
        _ => return,
    };

    res.return_type = Some(subtype::array_of(
        env,
        recursively_flatten(env, args, &element, depth),
    ));
}

fn array_product(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(element) = array_element(env, &args.this_type) else {
        return;
    };
    let mut elems = Vec::with_capacity(args.args.len() + 1);
    elems.push(element);
    for arg in &args.args {
        match array_element(env, &arg.ty) {
            Some(e) => elems.push(e),
            None => {
                // The argument type was already reported; recover.
                res.return_type = Some(Ty::untyped());
                return;
            }
        }
    }
    res.return_type = Some(subtype::array_of(env, Ty::Tuple(elems)));
}

fn array_compact(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(element) = array_element(env, &args.this_type) else {
        return;
    };
    let ret = subtype::approximate_subtract(env, &element, &Ty::Nil);
    res.return_type = Some(subtype::array_of(env, ret));
}

fn array_zip(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    let Some(element) = array_element(env, &args.this_type) else {
        return;
    };
    let mut elems = Vec::with_capacity(args.args.len() + 1);
    elems.push(element);
    for arg in &args.args {
        match array_element(env, &arg.ty) {
            // Zipped partners run out before self does: their slots are
            // nilable.
            Some(e) => elems.push(subtype::any(env, &e, &Ty::Nil)),
            None => {
                res.return_type = Some(Ty::untyped());
                return;
            }
        }
    }
    res.return_type = Some(subtype::array_of(env, Ty::Tuple(elems)));
}

// ── Module ─────────────────────────────────────────────────────────────

/// Statically decide `Klass === value` where possible.
fn module_triple_eq(env: &GlobalEnv, args: &DispatchArgs, res: &mut DispatchResult) {
    if args.args.len() != 1 {
        return;
    }
    let rhs = &args.args[0].ty;
    if rhs.is_untyped() {
        res.return_type = Some(rhs.clone());
        return;
    }
    let Some(represented) = subtype::get_represented_class(env, &args.this_type) else {
        res.return_type = Some(Ty::class(env.builtins().bool));
        return;
    };
    let lhs = env.symbols.external_type(represented);
    if subtype::is_subtype(env, rhs, &lhs) {
        res.return_type = Some(Ty::bool_lit(true));
        return;
    }
    if subtype::glb(env, rhs, &lhs).is_bottom() {
        res.return_type = Some(Ty::bool_lit(false));
        return;
    }
    res.return_type = Some(Ty::class(env.builtins().bool));
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn registry_has_no_duplicate_keys() {
        let mut seen = FxHashSet::default();
        for e in REGISTRY {
            let key = format!("{:?}|{:?}|{}", e.owner, e.kind, e.name);
            assert!(
                seen.insert(key),
                "duplicate intrinsic entry: {:?} {:?} {}",
                e.owner,
                e.kind,
                e.name
            );
        }
    }

    #[test]
    fn install_attaches_handlers() {
        let mut env = GlobalEnv::with_builtins();
        install(&mut env);
        let b = *env.builtins();

        let t_singleton = env.singleton_class(b.t);
        let must = env.symbols.find_member(t_singleton, "must").unwrap();
        assert!(env.symbols.method(must).intrinsic.is_some());

        let tuple_index = env.symbols.find_member(b.tuple, "[]").unwrap();
        assert!(env.symbols.method(tuple_index).intrinsic.is_some());

        let triple_eq = env.symbols.find_member(b.module, "===").unwrap();
        assert!(env.symbols.method(triple_eq).intrinsic.is_some());
    }
}
