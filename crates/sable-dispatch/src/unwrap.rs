//! Lifting value-level expressions back to type level.
//!
//! `Array[Integer].new` first resolves `Array` as the singleton class of
//! `Array`, because at that point it could equally be a receiver for a
//! singleton method call. When an intrinsic decides the expression was
//! meant as a type (a generic application, a `T.any` argument, ...) it
//! calls `unwrap_type` to turn the value-level type back into the type it
//! stands for.

use sable_types::{GlobalEnv, Loc, Ty};

use crate::diag::{Diagnostic, DiagnosticCode};

/// Turn a value-level type into the type it denotes.
///
/// - `Meta(x)` unwraps to `x`.
/// - A singleton class unwraps to its attached class's external type;
///   enum values stand for themselves.
/// - Shapes and tuples unwrap their components recursively.
/// - Literals are rejected: a literal is a value, not a type.
/// - Everything else passes through unchanged.
pub fn unwrap_type(
    env: &GlobalEnv,
    loc: Loc,
    tp: &Ty,
    errors: &mut Vec<Diagnostic>,
    suppress_errors: bool,
) -> Ty {
    match tp {
        Ty::Meta(inner) => (**inner).clone(),

        Ty::Class(c) => {
            if env.symbols.class(*c).is_enum {
                // Enum values are allowed to stand for themselves in type
                // positions.
                return tp.clone();
            }
            match env.symbols.class(*c).attached_class {
                Some(attached) => env.symbols.external_type(attached),
                None => {
                    if !suppress_errors {
                        errors.push(Diagnostic::new(
                            DiagnosticCode::BareTypeUsage,
                            loc,
                            "Unsupported usage of bare type",
                        ));
                    }
                    Ty::untyped()
                }
            }
        }

        Ty::Applied(c, _) => match env.symbols.class(*c).attached_class {
            Some(attached) => env.symbols.external_type(attached),
            None => {
                if !suppress_errors {
                    errors.push(Diagnostic::new(
                        DiagnosticCode::BareTypeUsage,
                        loc,
                        "Unsupported usage of bare type",
                    ));
                }
                Ty::untyped()
            }
        },

        Ty::Shape(keys, values) => {
            let unwrapped = values
                .iter()
                .map(|v| unwrap_type(env, loc, v, errors, suppress_errors))
                .collect();
            Ty::Shape(keys.clone(), unwrapped)
        }

        Ty::Tuple(elems) => {
            let unwrapped = elems
                .iter()
                .map(|e| unwrap_type(env, loc, e, errors, suppress_errors))
                .collect();
            Ty::Tuple(unwrapped)
        }

        Ty::Literal(_) => {
            if !suppress_errors {
                errors.push(Diagnostic::new(
                    DiagnosticCode::BareTypeUsage,
                    loc,
                    "Unsupported usage of literal type",
                ));
            }
            Ty::untyped()
        }

        other => other.clone(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::TextRange;
    use sable_types::FileId;

    fn loc() -> Loc {
        Loc::new(FileId(0), TextRange::empty(0.into()))
    }

    #[test]
    fn meta_unwraps_to_inner() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let mut errs = Vec::new();
        let t = unwrap_type(&env, loc(), &Ty::meta(Ty::class(b.integer)), &mut errs, false);
        assert_eq!(t, Ty::class(b.integer));
        assert!(errs.is_empty());
    }

    #[test]
    fn singleton_unwraps_to_attached_external_type() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let array_singleton = env.singleton_class(b.array);
        let mut errs = Vec::new();
        let t = unwrap_type(&env, loc(), &Ty::class(array_singleton), &mut errs, false);
        assert_eq!(t, Ty::applied(b.array, vec![Ty::untyped()]));
        assert!(errs.is_empty());
    }

    #[test]
    fn plain_class_is_a_bare_type_error() {
        let env = GlobalEnv::with_builtins();
        let b = env.builtins();
        let mut errs = Vec::new();
        let t = unwrap_type(&env, loc(), &Ty::class(b.integer), &mut errs, false);
        assert!(t.is_untyped());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, DiagnosticCode::BareTypeUsage);
    }

    #[test]
    fn literal_is_rejected() {
        let env = GlobalEnv::with_builtins();
        let mut errs = Vec::new();
        let t = unwrap_type(&env, loc(), &Ty::int(3), &mut errs, false);
        assert!(t.is_untyped());
        assert_eq!(errs[0].code, DiagnosticCode::BareTypeUsage);
    }

    #[test]
    fn tuple_unwraps_elementwise() {
        let mut env = GlobalEnv::with_builtins();
        let b = *env.builtins();
        let int_singleton = env.singleton_class(b.integer);
        let mut errs = Vec::new();
        let t = unwrap_type(
            &env,
            loc(),
            &Ty::Tuple(vec![Ty::class(int_singleton), Ty::meta(Ty::class(b.string))]),
            &mut errs,
            false,
        );
        assert_eq!(
            t,
            Ty::Tuple(vec![Ty::class(b.integer), Ty::class(b.string)])
        );
        assert!(errs.is_empty());
    }
}
