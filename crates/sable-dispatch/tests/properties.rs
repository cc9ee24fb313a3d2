//! Property tests for the dispatcher.
//!
//! These stress invariants that must hold for any input, not just the
//! hand-picked examples in the other suites: untyped absorption, union
//! commutativity, the setter-return law, value-to-type round-trips,
//! shape-merge algebra, and overload arity monotonicity.

use proptest::prelude::*;

use sable_dispatch::{
    dispatch_call, env_with_intrinsics, guess_overload, unwrap_type, CallLocs, DispatchArgs,
    DispatchResult, TypeAndOrigins,
};
use sable_types::{subtype, FileId, GlobalEnv, Lit, ParamInfo, Ty};

// ── Generators ─────────────────────────────────────────────────────────

/// An environment-independent recipe for a type; resolved against the
/// builtins of a freshly built environment.
#[derive(Clone, Debug)]
enum LeafTy {
    Int,
    Str,
    Float,
    Bool,
    Nil,
    Untyped,
    IntLit(i64),
    SymLit(String),
}

fn to_ty(env: &GlobalEnv, leaf: &LeafTy) -> Ty {
    let b = env.builtins();
    match leaf {
        LeafTy::Int => Ty::class(b.integer),
        LeafTy::Str => Ty::class(b.string),
        LeafTy::Float => Ty::class(b.float),
        LeafTy::Bool => Ty::class(b.bool),
        LeafTy::Nil => Ty::Nil,
        LeafTy::Untyped => Ty::untyped(),
        LeafTy::IntLit(i) => Ty::int(*i),
        LeafTy::SymLit(s) => Ty::sym(s.clone()),
    }
}

fn arb_leaf() -> impl Strategy<Value = LeafTy> {
    prop_oneof![
        Just(LeafTy::Int),
        Just(LeafTy::Str),
        Just(LeafTy::Float),
        Just(LeafTy::Bool),
        Just(LeafTy::Nil),
        Just(LeafTy::Untyped),
        (-5i64..5).prop_map(LeafTy::IntLit),
        prop::sample::select(&["a", "b", "c", "k"][..]).prop_map(|s| LeafTy::SymLit(s.to_string())),
    ]
}

fn arb_method_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(&["foo", "bar", "each", "[]", "length", "new"][..])
}

fn locs() -> CallLocs {
    CallLocs::synthetic(FileId(0))
}

fn tao(ty: Ty) -> TypeAndOrigins {
    TypeAndOrigins::with_origins(ty, Vec::new())
}

fn call(env: &GlobalEnv, recv: &Ty, name: &str, pos: Vec<Ty>) -> DispatchResult {
    let mut a = DispatchArgs::new(name, locs(), recv.clone());
    a.num_pos_args = pos.len();
    a.args = pos.into_iter().map(tao).collect();
    dispatch_call(env, recv, &a)
}

// ── Properties ─────────────────────────────────────────────────────────

proptest! {
    /// Untyped absorbs dispatch: any name, any argument shape, no method,
    /// no errors, untyped return.
    #[test]
    fn untyped_absorbs_dispatch(name in arb_method_name(), leaves in prop::collection::vec(arb_leaf(), 0..4)) {
        let env = env_with_intrinsics();
        let args: Vec<Ty> = leaves.iter().map(|l| to_ty(&env, l)).collect();
        let mut res = call(&env, &Ty::untyped(), name, args);
        prop_assert!(res.ret().is_untyped());
        prop_assert!(res.main.method.is_none());
        prop_assert!(res.take_errors().is_empty());
    }

    /// Union dispatch commutes up to any-equivalence of the return type.
    #[test]
    fn union_dispatch_commutes(ret_a in arb_leaf(), ret_b in arb_leaf()) {
        let mut env = env_with_intrinsics();
        let object = env.builtins().object;
        let a = env.symbols.define_class("A", Some(object));
        let c = env.symbols.define_class("B", Some(object));
        let ta = to_ty(&env, &ret_a);
        let tb = to_ty(&env, &ret_b);
        env.symbols.define_method(a, "m", vec![], Some(ta));
        env.symbols.define_method(c, "m", vec![], Some(tb));

        let ab = Ty::Or(Box::new(Ty::class(a)), Box::new(Ty::class(c)));
        let ba = Ty::Or(Box::new(Ty::class(c)), Box::new(Ty::class(a)));
        let r1 = call(&env, &ab, "m", vec![]).ret();
        let r2 = call(&env, &ba, "m", vec![]).ret();
        prop_assert!(subtype::is_subtype(&env, &r1, &r2), "{:?} vs {:?}", r1, r2);
        prop_assert!(subtype::is_subtype(&env, &r2, &r1), "{:?} vs {:?}", r1, r2);
    }

    /// A setter returns its right-hand side, whatever the declared result
    /// type says.
    #[test]
    fn setter_returns_rhs(rhs in arb_leaf()) {
        let mut env = env_with_intrinsics();
        let object = env.builtins().object;
        let string = env.builtins().string;
        let c = env.symbols.define_class("C", Some(object));
        env.symbols.define_method(
            c,
            "value=",
            vec![ParamInfo::positional("value", Ty::untyped())],
            Some(Ty::class(string)),
        );
        let rhs_ty = to_ty(&env, &rhs);
        let res = call(&env, &Ty::class(c), "value=", vec![rhs_ty.clone()]);
        prop_assert_eq!(res.ret(), rhs_ty);
    }

    /// Wrapping a type as a value and unwrapping it round-trips.
    #[test]
    fn unwrap_round_trips_meta(leaves in prop::collection::vec(arb_leaf(), 1..4)) {
        let env = env_with_intrinsics();
        let elems: Vec<Ty> = leaves
            .iter()
            .filter(|l| !matches!(l, LeafTy::IntLit(_) | LeafTy::SymLit(_)))
            .map(|l| to_ty(&env, l))
            .collect();
        prop_assume!(!elems.is_empty());
        let ty = if elems.len() == 1 {
            elems[0].clone()
        } else {
            Ty::Tuple(elems)
        };
        let loc = locs().call_loc();
        let mut errs = Vec::new();
        let unwrapped = unwrap_type(&env, loc, &Ty::meta(ty.clone()), &mut errs, false);
        prop_assert_eq!(unwrapped, ty);
        prop_assert!(errs.is_empty());
    }

    /// Merging an empty shape is the identity; merging a singleton shape
    /// adds or replaces exactly that key.
    #[test]
    fn shape_merge_algebra(
        base_vals in prop::collection::vec(arb_leaf(), 1..3),
        new_val in arb_leaf(),
        key_idx in 0usize..4,
    ) {
        let env = env_with_intrinsics();
        let key_pool = ["a", "b", "c", "d"];
        let keys: Vec<Lit> = key_pool.iter().take(base_vals.len()).map(|k| Lit::sym(*k)).collect();
        let values: Vec<Ty> = base_vals.iter().map(|l| to_ty(&env, l)).collect();
        let shape = Ty::Shape(keys.clone(), values.clone());

        // Identity.
        let id = call(&env, &shape, "merge", vec![Ty::Shape(Vec::new(), Vec::new())]);
        prop_assert_eq!(id.ret(), shape.clone());

        // Single-key merge.
        let new_key = Lit::sym(key_pool[key_idx]);
        let new_ty = to_ty(&env, &new_val);
        let merged = call(
            &env,
            &shape,
            "merge",
            vec![Ty::Shape(vec![new_key.clone()], vec![new_ty.clone()])],
        );
        let Ty::Shape(out_keys, out_values) = merged.ret() else {
            panic!("merge did not produce a shape");
        };
        let idx = out_keys.iter().position(|k| *k == new_key).expect("merged key present");
        prop_assert_eq!(&out_values[idx], &new_ty);
        // Every original key survives.
        for (k, v) in keys.iter().zip(values.iter()) {
            let i = out_keys.iter().position(|ok| ok == k).expect("original key present");
            if *k != new_key {
                prop_assert_eq!(&out_values[i], v);
            }
        }
    }

    /// The overload resolver never picks a candidate whose arity is below
    /// the supplied argument count while a covering candidate exists.
    #[test]
    fn overload_pick_is_arity_monotone(
        arities in prop::collection::btree_set(0usize..5, 1..4),
        arg_count in 0usize..6,
        has_block in any::<bool>(),
    ) {
        let mut env = env_with_intrinsics();
        let object = env.builtins().object;
        let c = env.symbols.define_class("C", Some(object));

        let make_params = |n: usize| -> Vec<ParamInfo> {
            (0..n).map(|i| ParamInfo::positional(format!("p{}", i), Ty::untyped())).collect()
        };
        let mut iter = arities.iter();
        let first = *iter.next().unwrap();
        let primary = env.symbols.define_method(c, "f", make_params(first), None);
        for a in iter {
            env.symbols.define_overload(primary, make_params(*a), None);
        }

        let args: Vec<TypeAndOrigins> = (0..arg_count).map(|_| tao(Ty::untyped())).collect();
        let picked = guess_overload(&env, c, primary, arg_count, &args, &[], has_block);
        let picked_arity = env.symbols.method(picked).arity();
        let any_covers = arities.iter().any(|a| *a >= arg_count);
        if any_covers && !has_block {
            prop_assert!(
                picked_arity >= arg_count,
                "picked arity {} for {} args from {:?}",
                picked_arity,
                arg_count,
                arities
            );
        }
    }

    /// Intersection dispatch with the method on exactly one side behaves
    /// as if the receiver were that side alone.
    #[test]
    fn intersection_short_circuits(ret in arb_leaf()) {
        let mut env = env_with_intrinsics();
        let object = env.builtins().object;
        let a = env.symbols.define_class("A", Some(object));
        let m = env.symbols.define_module("M");
        let ret_ty = to_ty(&env, &ret);
        let method = env.symbols.define_method(m, "solo", vec![], Some(ret_ty));

        let both = Ty::And(Box::new(Ty::class(a)), Box::new(Ty::class(m)));
        let mut via_and = call(&env, &both, "solo", vec![]);
        let via_module = call(&env, &Ty::class(m), "solo", vec![]);

        prop_assert_eq!(via_and.main.method, Some(method));
        prop_assert_eq!(via_and.ret(), via_module.ret());
        prop_assert!(via_and.take_errors().is_empty());
    }

    /// Tuple indexing with an in-bounds literal returns exactly that
    /// element; out of bounds is nil.
    #[test]
    fn tuple_index_law(leaves in prop::collection::vec(arb_leaf(), 1..4), idx in -5i64..5) {
        let env = env_with_intrinsics();
        let elems: Vec<Ty> = leaves.iter().map(|l| to_ty(&env, l)).collect();
        let tuple = Ty::Tuple(elems.clone());
        let res = call(&env, &tuple, "[]", vec![Ty::int(idx)]);
        let wrapped = if idx < 0 { idx + elems.len() as i64 } else { idx };
        if wrapped >= 0 && (wrapped as usize) < elems.len() {
            prop_assert_eq!(res.ret(), elems[wrapped as usize].clone());
        } else {
            prop_assert_eq!(res.ret(), Ty::Nil);
        }
    }
}
