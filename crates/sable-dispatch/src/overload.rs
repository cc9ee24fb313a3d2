//! Arity-based overload selection.
//!
//! When a method carries alternative signatures, the resolver picks the
//! candidate with the smallest arity that still fits the call: filter by
//! positional argument types, then by block parity, then keep the
//! candidates whose arity covers the supplied argument count.

use sable_types::{subtype, ClassRef, GlobalEnv, MethodRef, Ty};

use crate::args::TypeAndOrigins;

fn arity(env: &GlobalEnv, method: MethodRef) -> usize {
    env.symbols.method(method).arity()
}

/// Pick one candidate among a method's signatures.
///
/// The selection is stable: candidates sort by (arity, definition order)
/// up front, and every filter preserves that order.
pub fn guess_overload(
    env: &GlobalEnv,
    in_class: ClassRef,
    primary: MethodRef,
    num_pos_args: usize,
    args: &[TypeAndOrigins],
    targs: &[Ty],
    has_block: bool,
) -> MethodRef {
    if let Some(loc) = env.symbols.method(primary).loc {
        debug_assert!(
            env.file(loc.file).permits_overloads,
            "overload not permitted here"
        );
    }

    let mut all_candidates: Vec<MethodRef> = vec![primary];
    all_candidates.extend(env.symbols.method(primary).overloads.iter().copied());
    all_candidates.sort_by_key(|m| (arity(env, *m), m.0));

    let mut fallback = primary;
    let mut left = all_candidates.clone();

    // Filter by positional argument subtyping. A candidate survives unless
    // one of its fully-defined formals rejects the corresponding actual.
    let check_arg = |left: &mut Vec<MethodRef>, i: usize, arg: &Ty| {
        left.retain(|cand| {
            if i >= arity(env, *cand) {
                return false;
            }
            let data = env.symbols.method(*cand);
            match &data.params[i].ty {
                Some(declared) => {
                    let expected =
                        subtype::result_type_as_seen_from(env, declared, data.owner, in_class, targs);
                    !(expected.is_fully_defined() && !subtype::is_subtype(env, arg, &expected))
                }
                None => true,
            }
        });
    };

    for (i, arg) in args.iter().enumerate().take(num_pos_args) {
        check_arg(&mut left, i, &arg.ty);
    }
    // Keyword arguments present: the post-positional formal must accept an
    // untyped hash.
    if num_pos_args < args.len() {
        check_arg(&mut left, num_pos_args, &subtype::hash_of_untyped(env));
    }

    if left.is_empty() {
        left = all_candidates;
    } else {
        fallback = left[0];
    }

    // Keep only candidates whose block-arg-ness matches the call.
    left.retain(|cand| {
        let mentions_block = !env.symbols.method(*cand).block_param().flags.synthetic;
        mentions_block == has_block
    });

    // Keep the candidates with the smallest arity that still covers the
    // argument count; when none covers it, keep everything.
    let cutoff = left.partition_point(|m| arity(env, *m) < args.len());
    if cutoff < left.len() {
        left.drain(..cutoff);
    }

    left.first().copied().unwrap_or(fallback)
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::{GlobalEnv, ParamInfo};

    fn tao(ty: Ty) -> TypeAndOrigins {
        TypeAndOrigins::with_origins(ty, Vec::new())
    }

    /// `f(x: Integer)` with an overload `f(x: Integer, y: String)`.
    fn env_with_overloads() -> (GlobalEnv, ClassRef, MethodRef, MethodRef, MethodRef) {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let c = env.symbols.define_class("C", Some(b.object));
        let primary = env.symbols.define_method(
            c,
            "f",
            vec![ParamInfo::positional("x", Ty::class(b.integer))],
            Some(Ty::class(b.integer)),
        );
        let two = env.symbols.define_overload(
            primary,
            vec![
                ParamInfo::positional("x", Ty::class(b.integer)),
                ParamInfo::positional("y", Ty::class(b.string)),
            ],
            Some(Ty::class(b.string)),
        );
        (env, c, primary, primary, two)
    }

    #[test]
    fn picks_by_arity() {
        let (env, c, primary, one, two) = env_with_overloads();
        let b = env.builtins();

        let picked = guess_overload(
            &env,
            c,
            primary,
            1,
            &[tao(Ty::class(b.integer))],
            &[],
            false,
        );
        assert_eq!(picked, one);

        let picked = guess_overload(
            &env,
            c,
            primary,
            2,
            &[tao(Ty::class(b.integer)), tao(Ty::class(b.string))],
            &[],
            false,
        );
        assert_eq!(picked, two);
    }

    #[test]
    fn never_picks_smaller_arity_when_larger_exists() {
        let (env, c, primary, _, two) = env_with_overloads();
        let b = env.builtins();
        // Two Integer arguments: the type filter rejects both candidates
        // (the arity-2 overload wants a String second argument), so the
        // full set is restored. The arity cut must still prefer the
        // candidate that covers both arguments over the arity-1 one.
        let picked = guess_overload(
            &env,
            c,
            primary,
            2,
            &[tao(Ty::class(b.integer)), tao(Ty::class(b.integer))],
            &[],
            false,
        );
        assert_eq!(picked, two);

        // When no candidate covers the argument count, the smallest arity
        // wins as the least-bad answer.
        let picked = guess_overload(
            &env,
            c,
            primary,
            3,
            &[
                tao(Ty::class(b.integer)),
                tao(Ty::class(b.string)),
                tao(Ty::class(b.string)),
            ],
            &[],
            false,
        );
        assert_eq!(picked, primary);
    }

    #[test]
    fn filters_by_argument_type() {
        let (env, c, primary, _, two) = env_with_overloads();
        let b = env.builtins();
        // A String first argument rejects both (first formal is Integer in
        // both); the full set is restored and the smallest arity wins.
        let picked = guess_overload(&env, c, primary, 1, &[tao(Ty::class(b.string))], &[], false);
        assert_eq!(picked, primary);
        // Two args where only the arity-2 candidate fits.
        let picked = guess_overload(
            &env,
            c,
            primary,
            2,
            &[tao(Ty::class(b.integer)), tao(Ty::class(b.string))],
            &[],
            false,
        );
        assert_eq!(picked, two);
    }

    #[test]
    fn filters_by_block_parity() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let c = env.symbols.define_class("C", Some(b.object));
        let primary = env.symbols.define_method(
            c,
            "g",
            vec![ParamInfo::positional("x", Ty::class(b.integer))],
            None,
        );
        let with_block = env.symbols.define_overload(
            primary,
            vec![
                ParamInfo::positional("x", Ty::class(b.integer)),
                ParamInfo::block("blk", Ty::class(b.proc)),
            ],
            None,
        );
        let picked = guess_overload(
            &env,
            c,
            primary,
            1,
            &[tao(Ty::class(b.integer))],
            &[],
            true,
        );
        assert_eq!(picked, with_block);
        let picked = guess_overload(
            &env,
            c,
            primary,
            1,
            &[tao(Ty::class(b.integer))],
            &[],
            false,
        );
        assert_eq!(picked, primary);
    }
}
