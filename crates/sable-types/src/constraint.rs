//! Per-call constraints on inferred method type parameters.
//!
//! A `TypeConstraint` lives for the duration of a single dispatch. The
//! subtype kernel records lower/upper bounds on type parameters as it
//! compares argument types against formals; `solve` then picks an
//! instantiation (lower bound preferred) and verifies the bounds are
//! consistent.
//!
//! Non-generic, blockless dispatches use `TypeConstraint::empty_frozen()`:
//! an immutable empty constraint under which the kernel checks bounds
//! instead of recording them.

use rustc_hash::FxHashMap;

use crate::subtype;
use crate::symbols::{GlobalEnv, TypeParamId};
use crate::ty::Ty;

#[derive(Clone, Debug, Default)]
pub struct TypeConstraint {
    domain: Vec<TypeParamId>,
    upper: FxHashMap<TypeParamId, Ty>,
    lower: FxHashMap<TypeParamId, Ty>,
    solution: FxHashMap<TypeParamId, Ty>,
    solved: bool,
    cant_solve: bool,
    frozen: bool,
}

impl TypeConstraint {
    pub fn new() -> TypeConstraint {
        TypeConstraint::default()
    }

    /// The stand-in for "no constraint in scope": empty and immutable.
    pub fn empty_frozen() -> TypeConstraint {
        TypeConstraint {
            frozen: true,
            ..TypeConstraint::default()
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty() && self.upper.is_empty() && self.lower.is_empty()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Declare the type parameters this constraint ranges over.
    pub fn define_domain(&mut self, params: &[TypeParamId]) {
        debug_assert!(!self.frozen, "cannot define a domain on a frozen constraint");
        for p in params {
            if !self.domain.contains(p) {
                self.domain.push(*p);
            }
        }
    }

    pub fn has_var(&self, id: TypeParamId) -> bool {
        self.domain.contains(&id)
    }

    pub fn lower_bound(&self, id: TypeParamId) -> Option<&Ty> {
        self.lower.get(&id)
    }

    pub fn upper_bound(&self, id: TypeParamId) -> Option<&Ty> {
        self.upper.get(&id)
    }

    pub fn solution(&self, id: TypeParamId) -> Option<&Ty> {
        self.solution.get(&id)
    }

    /// Record `ty <: id`. Bounds accumulate by union.
    pub fn record_lower_bound(&mut self, env: &GlobalEnv, id: TypeParamId, ty: Ty) {
        debug_assert!(!self.frozen, "cannot record bounds on a frozen constraint");
        let merged = match self.lower.get(&id) {
            Some(existing) => subtype::any(env, existing, &ty),
            None => ty,
        };
        self.lower.insert(id, merged);
    }

    /// Record `id <: ty`. Bounds accumulate by intersection.
    pub fn record_upper_bound(&mut self, env: &GlobalEnv, id: TypeParamId, ty: Ty) {
        debug_assert!(!self.frozen, "cannot record bounds on a frozen constraint");
        let merged = match self.upper.get(&id) {
            Some(existing) => subtype::all(env, existing, &ty),
            None => ty,
        };
        self.upper.insert(id, merged);
    }

    /// Mark the constraint as unsolvable; `solve` will fail.
    pub fn mark_cant_solve(&mut self) {
        self.cant_solve = true;
    }

    /// Pick an instantiation for every domain parameter: the lower bound if
    /// one was recorded, else the upper bound, else untyped. Fails when a
    /// parameter's lower bound is not a subtype of its upper bound.
    pub fn solve(&mut self, env: &GlobalEnv) -> bool {
        if self.solved {
            return !self.cant_solve;
        }
        if self.cant_solve {
            return false;
        }
        let mut ok = true;
        for id in self.domain.clone() {
            let lower = self.lower.get(&id).cloned();
            let upper = self.upper.get(&id).cloned();
            if let (Some(lo), Some(up)) = (&lower, &upper) {
                if !subtype::is_subtype(env, lo, up) {
                    ok = false;
                }
            }
            let sol = lower.or(upper).unwrap_or_else(Ty::untyped);
            self.solution.insert(id, sol);
        }
        self.solved = true;
        if !ok {
            self.cant_solve = true;
        }
        ok
    }

    /// One line per constrained parameter, for the unsolved-constraint
    /// diagnostic section.
    pub fn explain(&self, env: &GlobalEnv) -> Vec<String> {
        let mut lines = Vec::new();
        for id in &self.domain {
            let name = &env.symbols.type_param(*id).name;
            match (self.lower.get(id), self.upper.get(id)) {
                (Some(lo), Some(up)) => lines.push(format!(
                    "{} must be a supertype of {} and a subtype of {}",
                    name,
                    lo.show(env),
                    up.show(env)
                )),
                (Some(lo), None) => {
                    lines.push(format!("{} must be a supertype of {}", name, lo.show(env)))
                }
                (None, Some(up)) => {
                    lines.push(format!("{} must be a subtype of {}", name, up.show(env)))
                }
                (None, None) => lines.push(format!("{} is unconstrained", name)),
            }
        }
        lines
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_prefers_lower_bound() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let p = env.symbols.define_type_param("U");

        let mut constr = TypeConstraint::new();
        constr.define_domain(&[p]);
        constr.record_lower_bound(&env, p, Ty::class(b.integer));
        assert!(constr.solve(&env));
        assert_eq!(constr.solution(p), Some(&Ty::class(b.integer)));
    }

    #[test]
    fn solve_falls_back_to_upper_then_untyped() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let p = env.symbols.define_type_param("U");
        let q = env.symbols.define_type_param("V");

        let mut constr = TypeConstraint::new();
        constr.define_domain(&[p, q]);
        constr.record_upper_bound(&env, p, Ty::class(b.string));
        assert!(constr.solve(&env));
        assert_eq!(constr.solution(p), Some(&Ty::class(b.string)));
        assert_eq!(constr.solution(q), Some(&Ty::untyped()));
    }

    #[test]
    fn solve_fails_on_inconsistent_bounds() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let p = env.symbols.define_type_param("U");

        let mut constr = TypeConstraint::new();
        constr.define_domain(&[p]);
        constr.record_lower_bound(&env, p, Ty::class(b.integer));
        constr.record_upper_bound(&env, p, Ty::class(b.string));
        assert!(!constr.solve(&env));
    }

    #[test]
    fn lower_bounds_accumulate_by_union() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let p = env.symbols.define_type_param("U");

        let mut constr = TypeConstraint::new();
        constr.define_domain(&[p]);
        constr.record_lower_bound(&env, p, Ty::class(b.integer));
        constr.record_lower_bound(&env, p, Ty::class(b.string));
        assert!(constr.solve(&env));
        let sol = constr.solution(p).unwrap();
        assert!(subtype::is_subtype(&env, &Ty::class(b.integer), sol));
        assert!(subtype::is_subtype(&env, &Ty::class(b.string), sol));
    }

    #[test]
    fn empty_frozen_solves_trivially() {
        let env = GlobalEnv::with_builtins();
        let mut constr = TypeConstraint::empty_frozen();
        assert!(constr.solve(&env));
        assert!(constr.is_empty());
    }
}
