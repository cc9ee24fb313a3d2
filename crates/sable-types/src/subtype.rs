//! The subtype kernel: subtyping, union/intersection construction, and the
//! substitution helpers the dispatcher leans on.
//!
//! Subtyping is nominal at its core (superclass chain plus includes), with
//! structural rules layered on for the proxy variants: literals sit below
//! their underlying class, tuples compare elementwise and decay to
//! `Array[lub]`, shapes compare by key set and decay to an untyped `Hash`.
//!
//! When the comparison meets a method type parameter (`Ty::Var`) under an
//! unfrozen constraint, the kernel records a bound instead of answering
//! directly; that is how generic method inference accumulates information
//! during argument matching.

use crate::constraint::TypeConstraint;
use crate::symbols::{ClassRef, GlobalEnv};
use crate::ty::{Lit, Ty};

/// How untyped behaves in a comparison. Dispatch always uses
/// `AlwaysCompatible`: untyped is both a subtype and a supertype of
/// everything.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UntypedMode {
    AlwaysCompatible,
    AlwaysIncompatible,
}

/// Subtype check with no constraint in scope.
pub fn is_subtype(env: &GlobalEnv, a: &Ty, b: &Ty) -> bool {
    let mut frozen = TypeConstraint::empty_frozen();
    is_subtype_under(env, &mut frozen, a, b, UntypedMode::AlwaysCompatible)
}

/// Subtype check under a constraint. Meeting `Ty::Var` on either side
/// records a bound when the constraint is unfrozen, and checks against the
/// solved type when it is frozen.
pub fn is_subtype_under(
    env: &GlobalEnv,
    constr: &mut TypeConstraint,
    a: &Ty,
    b: &Ty,
    mode: UntypedMode,
) -> bool {
    if a == b {
        return true;
    }
    if a.is_untyped() || b.is_untyped() {
        return mode == UntypedMode::AlwaysCompatible;
    }

    if let Ty::Var(id) = b {
        return if constr.is_frozen() {
            match constr.solution(*id) {
                Some(sol) => {
                    let sol = sol.clone();
                    is_subtype_under(env, constr, a, &sol, mode)
                }
                None => false,
            }
        } else if constr.has_var(*id) {
            constr.record_lower_bound(env, *id, a.clone());
            true
        } else {
            false
        };
    }
    if let Ty::Var(id) = a {
        return if constr.is_frozen() {
            match constr.solution(*id) {
                Some(sol) => {
                    let sol = sol.clone();
                    is_subtype_under(env, constr, &sol, b, mode)
                }
                None => false,
            }
        } else if constr.has_var(*id) {
            constr.record_upper_bound(env, *id, b.clone());
            true
        } else {
            false
        };
    }

    if a.is_bottom() {
        return true;
    }
    if matches!(b, Ty::Top) {
        return true;
    }

    // Union/intersection decomposition. A union on the left and an
    // intersection on the right decompose into conjunctions and must be
    // tried before the disjunctive cases.
    if let Ty::Or(l, r) = a {
        return is_subtype_under(env, constr, l, b, mode) && is_subtype_under(env, constr, r, b, mode);
    }
    if let Ty::And(l, r) = b {
        return is_subtype_under(env, constr, a, l, mode) && is_subtype_under(env, constr, a, r, mode);
    }
    if let Ty::Or(l, r) = b {
        return is_subtype_under(env, constr, a, l, mode) || is_subtype_under(env, constr, a, r, mode);
    }
    if let Ty::And(l, r) = a {
        return is_subtype_under(env, constr, l, b, mode) || is_subtype_under(env, constr, r, b, mode);
    }

    match (a, b) {
        // Distinct literals never relate; a literal sits below its
        // underlying class.
        (Ty::Literal(_), Ty::Literal(_)) => false,
        (Ty::Literal(_), _) => {
            let und = a.underlying(env);
            is_subtype_under(env, constr, &und, b, mode)
        }

        (Ty::Tuple(ea), Ty::Tuple(eb)) => {
            ea.len() == eb.len()
                && ea
                    .iter()
                    .zip(eb.iter())
                    .all(|(x, y)| is_subtype_under(env, constr, x, y, mode))
        }
        (Ty::Tuple(_), _) => {
            let und = a.underlying(env);
            is_subtype_under(env, constr, &und, b, mode)
        }

        (Ty::Shape(ka, va), Ty::Shape(kb, vb)) => {
            ka.len() == kb.len()
                && kb.iter().zip(vb.iter()).all(|(key, want)| {
                    match ka.iter().position(|k| k == key) {
                        Some(i) => is_subtype_under(env, constr, &va[i], want, mode),
                        None => false,
                    }
                })
        }
        (Ty::Shape(..), _) => {
            let und = a.underlying(env);
            is_subtype_under(env, constr, &und, b, mode)
        }

        (Ty::Class(ca), Ty::Class(cb)) => env.symbols.derives_from(*ca, *cb),
        (Ty::Applied(ca, aa), Ty::Applied(cb, ab)) => {
            if ca == cb {
                aa.len() == ab.len()
                    && aa
                        .iter()
                        .zip(ab.iter())
                        .all(|(x, y)| is_subtype_under(env, constr, x, y, mode))
            } else {
                env.symbols.derives_from(*ca, *cb)
            }
        }
        // An applied generic erases to its class, but a bare class never
        // promotes to an applied generic: a `Proc` of unknown arity is not
        // a `Proc[untyped, untyped]`.
        (Ty::Applied(ca, _), Ty::Class(cb)) => env.symbols.derives_from(*ca, *cb),

        (Ty::Meta(ia), Ty::Meta(ib)) => ia == ib,

        (Ty::LambdaParam { upper, .. }, _) => is_subtype_under(env, constr, upper, b, mode),
        (_, Ty::LambdaParam { lower, .. }) => is_subtype_under(env, constr, a, lower, mode),

        _ => false,
    }
}

fn collect_or_members(ty: &Ty, out: &mut Vec<Ty>) {
    match ty {
        Ty::Or(l, r) => {
            collect_or_members(l, out);
            collect_or_members(r, out);
        }
        other => out.push(other.clone()),
    }
}

fn collect_and_members(ty: &Ty, out: &mut Vec<Ty>) {
    match ty {
        Ty::And(l, r) => {
            collect_and_members(l, out);
            collect_and_members(r, out);
        }
        other => out.push(other.clone()),
    }
}

/// The union (least upper bound) of two types, normalized: subsumed
/// members are absorbed and nested unions are flattened.
pub fn any(env: &GlobalEnv, a: &Ty, b: &Ty) -> Ty {
    if a.is_untyped() {
        return a.clone();
    }
    if b.is_untyped() {
        return b.clone();
    }
    if is_subtype(env, a, b) {
        return b.clone();
    }
    if is_subtype(env, b, a) {
        return a.clone();
    }

    let mut members = Vec::new();
    collect_or_members(a, &mut members);
    collect_or_members(b, &mut members);

    let mut kept: Vec<Ty> = Vec::new();
    for m in members {
        if kept.iter().any(|k| is_subtype(env, &m, k)) {
            continue;
        }
        kept.retain(|k| !is_subtype(env, k, &m));
        kept.push(m);
    }
    kept.into_iter()
        .reduce(|acc, t| Ty::Or(Box::new(acc), Box::new(t)))
        .unwrap_or(Ty::Bottom)
}

/// The nominal class behind a type, when there is one. Used for the
/// disjointness collapse in `all`.
fn nominal_class(env: &GlobalEnv, ty: &Ty) -> Option<ClassRef> {
    match ty {
        Ty::Class(c) | Ty::Applied(c, _) => Some(*c),
        Ty::Literal(_) | Ty::Tuple(_) | Ty::Shape(..) => nominal_class(env, &ty.underlying(env)),
        _ => None,
    }
}

/// The intersection (greatest lower bound) of two types. Disjoint concrete
/// classes collapse to `Bottom`; modules keep an `And` because a value may
/// mix both in.
pub fn all(env: &GlobalEnv, a: &Ty, b: &Ty) -> Ty {
    if a.is_untyped() {
        return b.clone();
    }
    if b.is_untyped() {
        return a.clone();
    }
    if is_subtype(env, a, b) {
        return a.clone();
    }
    if is_subtype(env, b, a) {
        return b.clone();
    }

    if let (Some(ca), Some(cb)) = (nominal_class(env, a), nominal_class(env, b)) {
        let ma = env.symbols.class(ca).is_module;
        let mb = env.symbols.class(cb).is_module;
        if !ma && !mb && !env.symbols.derives_from(ca, cb) && !env.symbols.derives_from(cb, ca) {
            return Ty::Bottom;
        }
    }
    if a.is_nil() || b.is_nil() {
        return Ty::Bottom;
    }

    let mut members = Vec::new();
    collect_and_members(a, &mut members);
    collect_and_members(b, &mut members);

    let mut kept: Vec<Ty> = Vec::new();
    for m in members {
        if kept.iter().any(|k| is_subtype(env, k, &m)) {
            continue;
        }
        kept.retain(|k| !is_subtype(env, &m, k));
        kept.push(m);
    }
    kept.into_iter()
        .reduce(|acc, t| Ty::And(Box::new(acc), Box::new(t)))
        .unwrap_or(Ty::Top)
}

/// Greatest lower bound; alias kept for callers that think in lattice
/// terms rather than type-constructor terms.
pub fn glb(env: &GlobalEnv, a: &Ty, b: &Ty) -> Ty {
    all(env, a, b)
}

/// Replace inference variables with the best information the constraint
/// has: solution, else upper bound, else lower bound, else untyped.
pub fn approximate(env: &GlobalEnv, ty: &Ty, constr: &TypeConstraint) -> Ty {
    match ty {
        Ty::Var(id) => constr
            .solution(*id)
            .or_else(|| constr.upper_bound(*id))
            .or_else(|| constr.lower_bound(*id))
            .cloned()
            .unwrap_or_else(Ty::untyped),
        Ty::Applied(c, args) => Ty::Applied(
            *c,
            args.iter().map(|t| approximate(env, t, constr)).collect(),
        ),
        Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|t| approximate(env, t, constr)).collect()),
        Ty::Shape(keys, values) => Ty::Shape(
            keys.clone(),
            values.iter().map(|t| approximate(env, t, constr)).collect(),
        ),
        Ty::Or(l, r) => any(env, &approximate(env, l, constr), &approximate(env, r, constr)),
        Ty::And(l, r) => all(env, &approximate(env, l, constr), &approximate(env, r, constr)),
        Ty::Meta(inner) => Ty::meta(approximate(env, inner, constr)),
        other => other.clone(),
    }
}

/// Subtract `b` from `a`, approximately: members of a union that are
/// subtypes of `b` are dropped. Anything else is left alone. Untyped is
/// untouched; it is compatible with everything but a member of nothing.
pub fn approximate_subtract(env: &GlobalEnv, a: &Ty, b: &Ty) -> Ty {
    if a.is_untyped() {
        return a.clone();
    }
    if is_subtype(env, a, b) {
        return Ty::Bottom;
    }
    match a {
        Ty::Or(l, r) => any(
            env,
            &approximate_subtract(env, l, b),
            &approximate_subtract(env, r, b),
        ),
        other => other.clone(),
    }
}

/// Widen a literal to its underlying class.
pub fn drop_literal(env: &GlobalEnv, ty: &Ty) -> Ty {
    match ty {
        Ty::Literal(lit) => Ty::Class(lit.underlying_class(env)),
        other => other.clone(),
    }
}

/// Remove nil from a type, approximately.
pub fn drop_nil(env: &GlobalEnv, ty: &Ty) -> Ty {
    approximate_subtract(env, ty, &Ty::Nil)
}

/// Forget value-level precision: literals widen to their class, tuples to
/// arrays, shapes to untyped hashes.
pub fn widen(env: &GlobalEnv, ty: &Ty) -> Ty {
    match ty {
        Ty::Literal(lit) => Ty::Class(lit.underlying_class(env)),
        Ty::Tuple(elems) => {
            let elem = elems
                .iter()
                .map(|t| widen(env, t))
                .reduce(|acc, t| any(env, &acc, &t))
                .unwrap_or_else(Ty::untyped);
            array_of(env, elem)
        }
        Ty::Shape(..) => hash_of_untyped(env),
        Ty::Or(l, r) => any(env, &widen(env, l), &widen(env, r)),
        Ty::And(l, r) => all(env, &widen(env, l), &widen(env, r)),
        other => other.clone(),
    }
}

/// Substitute references to the receiver's type members with the applied
/// type arguments. `defining` is the class the signature was written in;
/// substitution only fires when the receiver actually inherits that
/// class's members.
pub fn result_type_as_seen_from(
    env: &GlobalEnv,
    ty: &Ty,
    defining: ClassRef,
    receiver: ClassRef,
    targs: &[Ty],
) -> Ty {
    match ty {
        Ty::LambdaParam { member, .. } => {
            let owner = env.symbols.type_member(*member).owner;
            let aligned = owner == defining || env.symbols.derives_from(receiver, owner);
            if aligned {
                let idx = env
                    .symbols
                    .class(owner)
                    .type_members
                    .iter()
                    .position(|m| m == member);
                match idx.and_then(|i| targs.get(i)) {
                    Some(t) => t.clone(),
                    None => Ty::untyped(),
                }
            } else {
                Ty::untyped()
            }
        }
        Ty::Applied(c, args) => Ty::Applied(
            *c,
            args.iter()
                .map(|t| result_type_as_seen_from(env, t, defining, receiver, targs))
                .collect(),
        ),
        Ty::Tuple(elems) => Ty::Tuple(
            elems
                .iter()
                .map(|t| result_type_as_seen_from(env, t, defining, receiver, targs))
                .collect(),
        ),
        Ty::Shape(keys, values) => Ty::Shape(
            keys.clone(),
            values
                .iter()
                .map(|t| result_type_as_seen_from(env, t, defining, receiver, targs))
                .collect(),
        ),
        Ty::Or(l, r) => any(
            env,
            &result_type_as_seen_from(env, l, defining, receiver, targs),
            &result_type_as_seen_from(env, r, defining, receiver, targs),
        ),
        Ty::And(l, r) => all(
            env,
            &result_type_as_seen_from(env, l, defining, receiver, targs),
            &result_type_as_seen_from(env, r, defining, receiver, targs),
        ),
        Ty::Meta(inner) => Ty::meta(result_type_as_seen_from(env, inner, defining, receiver, targs)),
        other => other.clone(),
    }
}

/// Substitute the `self` placeholder with the receiver type.
pub fn replace_self_type(env: &GlobalEnv, ty: &Ty, self_ty: &Ty) -> Ty {
    match ty {
        Ty::SelfType => self_ty.clone(),
        Ty::Applied(c, args) => Ty::Applied(
            *c,
            args.iter()
                .map(|t| replace_self_type(env, t, self_ty))
                .collect(),
        ),
        Ty::Tuple(elems) => Ty::Tuple(
            elems
                .iter()
                .map(|t| replace_self_type(env, t, self_ty))
                .collect(),
        ),
        Ty::Shape(keys, values) => Ty::Shape(
            keys.clone(),
            values
                .iter()
                .map(|t| replace_self_type(env, t, self_ty))
                .collect(),
        ),
        Ty::Or(l, r) => any(
            env,
            &replace_self_type(env, l, self_ty),
            &replace_self_type(env, r, self_ty),
        ),
        Ty::And(l, r) => all(
            env,
            &replace_self_type(env, l, self_ty),
            &replace_self_type(env, r, self_ty),
        ),
        Ty::Meta(inner) => Ty::meta(replace_self_type(env, inner, self_ty)),
        other => other.clone(),
    }
}

/// Apply a solved constraint: replace every domain variable with its
/// solution.
pub fn instantiate(env: &GlobalEnv, ty: &Ty, constr: &TypeConstraint) -> Ty {
    match ty {
        Ty::Var(id) => constr.solution(*id).cloned().unwrap_or_else(|| ty.clone()),
        Ty::Applied(c, args) => Ty::Applied(
            *c,
            args.iter().map(|t| instantiate(env, t, constr)).collect(),
        ),
        Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|t| instantiate(env, t, constr)).collect()),
        Ty::Shape(keys, values) => Ty::Shape(
            keys.clone(),
            values.iter().map(|t| instantiate(env, t, constr)).collect(),
        ),
        Ty::Or(l, r) => any(env, &instantiate(env, l, constr), &instantiate(env, r, constr)),
        Ty::And(l, r) => all(env, &instantiate(env, l, constr), &instantiate(env, r, constr)),
        Ty::Meta(inner) => Ty::meta(instantiate(env, inner, constr)),
        other => other.clone(),
    }
}

// ── Builtin type construction ──────────────────────────────────────────

pub fn array_of(env: &GlobalEnv, elem: Ty) -> Ty {
    Ty::Applied(env.builtins().array, vec![elem])
}

pub fn range_of(env: &GlobalEnv, elem: Ty) -> Ty {
    Ty::Applied(env.builtins().range, vec![elem])
}

pub fn hash_of_untyped(env: &GlobalEnv) -> Ty {
    Ty::Applied(env.builtins().hash, vec![Ty::untyped(), Ty::untyped()])
}

/// The union of a tuple's element types; `Bottom` for the empty tuple.
pub fn tuple_element_type(env: &GlobalEnv, elems: &[Ty]) -> Ty {
    elems
        .iter()
        .cloned()
        .reduce(|acc, t| any(env, &acc, &t))
        .unwrap_or(Ty::Bottom)
}

/// A proc type of the given positional arity with nothing known about its
/// parameters: `Proc[untyped, untyped * arity]`, return type first.
pub fn proc_of_arity(env: &GlobalEnv, arity: usize) -> Ty {
    Ty::Applied(env.builtins().proc, vec![Ty::untyped(); arity + 1])
}

/// The return projection of a proc type. Unknown-arity procs and
/// non-procs project to untyped.
pub fn get_proc_return_type(env: &GlobalEnv, ty: &Ty) -> Ty {
    match ty {
        Ty::Applied(c, targs) if *c == env.builtins().proc => {
            targs.first().cloned().unwrap_or_else(Ty::untyped)
        }
        _ => Ty::untyped(),
    }
}

/// The positional arity of a proc type, when statically known.
pub fn get_proc_arity(env: &GlobalEnv, ty: &Ty) -> Option<usize> {
    match ty {
        Ty::Applied(c, targs) if *c == env.builtins().proc => Some(targs.len().saturating_sub(1)),
        _ => None,
    }
}

/// For a singleton-class type, the instance class it represents.
pub fn get_represented_class(env: &GlobalEnv, ty: &Ty) -> Option<ClassRef> {
    match ty {
        Ty::Class(c) | Ty::Applied(c, _) => env.symbols.class(*c).attached_class,
        _ => None,
    }
}

/// Whether a shape's keys are all symbol literals, i.e. whether it can
/// supply keyword arguments.
pub fn shape_has_symbol_keys(keys: &[Lit]) -> bool {
    keys.iter().all(Lit::is_symbol)
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_animals() -> (GlobalEnv, ClassRef, ClassRef) {
        let mut env = GlobalEnv::with_builtins();
        let object = env.builtins().object;
        let animal = env.symbols.define_class("Animal", Some(object));
        let dog = env.symbols.define_class("Dog", Some(animal));
        (env, animal, dog)
    }

    #[test]
    fn nominal_subtyping() {
        let (env, animal, dog) = env_with_animals();
        assert!(is_subtype(&env, &Ty::class(dog), &Ty::class(animal)));
        assert!(!is_subtype(&env, &Ty::class(animal), &Ty::class(dog)));
    }

    #[test]
    fn untyped_is_compatible_both_ways() {
        let (env, animal, _) = env_with_animals();
        assert!(is_subtype(&env, &Ty::untyped(), &Ty::class(animal)));
        assert!(is_subtype(&env, &Ty::class(animal), &Ty::untyped()));
    }

    #[test]
    fn literal_below_underlying_class() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        assert!(is_subtype(&env, &Ty::int(3), &Ty::class(b.integer)));
        assert!(!is_subtype(&env, &Ty::class(b.integer), &Ty::int(3)));
        assert!(!is_subtype(&env, &Ty::int(3), &Ty::int(4)));
    }

    #[test]
    fn union_rules() {
        let (env, animal, dog) = env_with_animals();
        let b = env.builtins();
        let u = any(&env, &Ty::class(b.integer), &Ty::class(b.string));
        assert!(is_subtype(&env, &Ty::class(b.integer), &u));
        assert!(is_subtype(&env, &Ty::class(b.string), &u));
        assert!(!is_subtype(&env, &u, &Ty::class(b.integer)));

        // Absorption: Dog | Animal collapses to Animal.
        assert_eq!(any(&env, &Ty::class(dog), &Ty::class(animal)), Ty::class(animal));
    }

    #[test]
    fn intersection_collapses_disjoint_classes() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        assert_eq!(
            all(&env, &Ty::class(b.integer), &Ty::class(b.string)),
            Ty::Bottom
        );
    }

    #[test]
    fn intersection_keeps_module_mixes() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let c = env.symbols.define_class("C", Some(b.object));
        let m = env.symbols.define_module("M");
        let both = all(&env, &Ty::class(c), &Ty::class(m));
        assert!(matches!(both, Ty::And(..)));
    }

    #[test]
    fn tuple_subtyping_and_decay() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let t = Ty::Tuple(vec![Ty::class(b.integer), Ty::class(b.string)]);
        assert!(is_subtype(&env, &t, &t));
        // A tuple is an array of the union of its elements.
        let arr = array_of(
            &env,
            any(&env, &Ty::class(b.integer), &Ty::class(b.string)),
        );
        assert!(is_subtype(&env, &t, &arr));
        assert!(is_subtype(&env, &t, &Ty::class(b.array)));
    }

    #[test]
    fn shape_subtyping_is_key_exact() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let s1 = Ty::Shape(vec![Lit::sym("a")], vec![Ty::int(1)]);
        let s2 = Ty::Shape(vec![Lit::sym("a")], vec![Ty::class(b.integer)]);
        let s3 = Ty::Shape(vec![Lit::sym("z")], vec![Ty::class(b.integer)]);
        assert!(is_subtype(&env, &s1, &s2));
        assert!(!is_subtype(&env, &s2, &s1));
        assert!(!is_subtype(&env, &s1, &s3));
        assert!(is_subtype(&env, &s1, &Ty::class(b.hash)));
    }

    #[test]
    fn drop_nil_strips_union_members() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let nilable = any(&env, &Ty::class(b.integer), &Ty::Nil);
        assert_eq!(drop_nil(&env, &nilable), Ty::class(b.integer));
        assert_eq!(drop_nil(&env, &Ty::class(b.integer)), Ty::class(b.integer));
        assert_eq!(drop_nil(&env, &Ty::Nil), Ty::Bottom);
    }

    #[test]
    fn subtype_records_bounds_under_constraint() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let p = env.symbols.define_type_param("U");
        let mut constr = TypeConstraint::new();
        constr.define_domain(&[p]);

        assert!(is_subtype_under(
            &env,
            &mut constr,
            &Ty::class(b.integer),
            &Ty::Var(p),
            UntypedMode::AlwaysCompatible,
        ));
        assert!(constr.solve(&env));
        assert_eq!(constr.solution(p), Some(&Ty::class(b.integer)));
    }

    #[test]
    fn result_type_substitutes_type_members() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let elem = env.symbols.class(b.array).type_members[0];
        let sig_ty = Ty::LambdaParam {
            member: elem,
            upper: Box::new(Ty::untyped()),
            lower: Box::new(Ty::Bottom),
        };
        let seen = result_type_as_seen_from(&env, &sig_ty, b.array, b.array, &[Ty::class(b.integer)]);
        assert_eq!(seen, Ty::class(b.integer));
        // No type arguments available: fall back to untyped.
        let unseen = result_type_as_seen_from(&env, &sig_ty, b.array, b.array, &[]);
        assert!(unseen.is_untyped());
    }

    #[test]
    fn widen_forgets_value_precision() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        assert_eq!(widen(&env, &Ty::int(3)), Ty::class(b.integer));
        assert_eq!(
            widen(&env, &Ty::Tuple(vec![Ty::int(1), Ty::int(2)])),
            array_of(&env, Ty::class(b.integer))
        );
    }

    #[test]
    fn proc_projections() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let p = proc_of_arity(&env, 2);
        assert_eq!(get_proc_arity(&env, &p), Some(2));
        assert!(get_proc_return_type(&env, &p).is_untyped());
        assert_eq!(get_proc_arity(&env, &Ty::class(b.proc)), None);
    }
}
