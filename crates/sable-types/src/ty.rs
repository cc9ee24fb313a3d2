//! Type representation for the Sable type lattice.
//!
//! Defines the core `Ty` enum: nominal classes, applied generics, literal
//! singleton types, record-like shapes, tuples, unions, intersections, and
//! the handful of inference artifacts (`Var`, `SelfParam`, `LambdaParam`,
//! `SelfType`). The lattice is a sealed sum; every consumer matches it
//! exhaustively.
//!
//! Unions and intersections are never built directly -- `subtype::any` and
//! `subtype::all` normalize on construction so that neither side of an
//! `Or`/`And` is itself an `Or`/`And` with the same partners.

use std::fmt;

use crate::symbols::{ClassRef, GlobalEnv, MethodRef, TypeMemberRef, TypeParamId};

/// A literal singleton value type: the type of exactly one value.
///
/// Each literal projects onto an underlying builtin class (`1 : Integer`,
/// `:foo : Symbol`, ...). Shape keys are always literals.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lit {
    Int(i64),
    Str(String),
    Sym(String),
    Bool(bool),
}

impl Lit {
    pub fn sym(name: impl Into<String>) -> Lit {
        Lit::Sym(name.into())
    }

    pub fn str(value: impl Into<String>) -> Lit {
        Lit::Str(value.into())
    }

    /// The builtin class this literal is an instance of.
    pub fn underlying_class(&self, env: &GlobalEnv) -> ClassRef {
        let b = env.builtins();
        match self {
            Lit::Int(_) => b.integer,
            Lit::Str(_) => b.string,
            Lit::Sym(_) => b.symbol,
            Lit::Bool(_) => b.bool,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Lit::Sym(_))
    }

    /// The symbol name, for symbol literals.
    pub fn as_sym(&self) -> Option<&str> {
        match self {
            Lit::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Lit::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Int(i) => write!(f, "{}", i),
            Lit::Str(s) => write!(f, "\"{}\"", s),
            Lit::Sym(s) => write!(f, ":{}", s),
            Lit::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A Sable type.
///
/// The proxy variants (`Literal`, `Shape`, `Tuple`) carry more information
/// than their underlying class; `underlying` projects them back down when a
/// consumer only understands plain classes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    /// An instance of a nominal class or module.
    Class(ClassRef),
    /// A generic class applied to concrete type arguments.
    Applied(ClassRef, Vec<Ty>),
    /// A singleton value type.
    Literal(Lit),
    /// A record type: literal keys in definition order, one value type per
    /// key. Invariant: `keys.len() == values.len()`.
    Shape(Vec<Lit>, Vec<Ty>),
    /// A fixed-length heterogeneous sequence.
    Tuple(Vec<Ty>),
    /// A union. Build through `subtype::any`.
    Or(Box<Ty>, Box<Ty>),
    /// An intersection. Build through `subtype::all`.
    And(Box<Ty>, Box<Ty>),
    /// A type surfaced as a first-class value (`Array[Integer]` in an
    /// expression position).
    Meta(Box<Ty>),
    /// A method-level type parameter under inference.
    Var(TypeParamId),
    /// A class type member as seen from `self` (e.g. `AttachedClass`).
    /// Opaque until substituted by the subtype kernel.
    SelfParam(TypeMemberRef),
    /// The declared bound pair of a class type member, as it appears inside
    /// the signatures of the owning generic class.
    LambdaParam {
        member: TypeMemberRef,
        upper: Box<Ty>,
        lower: Box<Ty>,
    },
    /// The `self` placeholder in signatures; substituted with the receiver
    /// type at the end of dispatch.
    SelfType,
    /// The lattice fixpoint: compatible with everything, absorbs dispatch.
    /// `blame` optionally records the method that introduced the untypedness.
    Untyped { blame: Option<MethodRef> },
    Top,
    Bottom,
    Nil,
    /// The type of statements evaluated for effect; calling a method on it
    /// is an error.
    Void,
}

impl Ty {
    pub fn class(c: ClassRef) -> Ty {
        Ty::Class(c)
    }

    pub fn applied(c: ClassRef, args: Vec<Ty>) -> Ty {
        Ty::Applied(c, args)
    }

    pub fn untyped() -> Ty {
        Ty::Untyped { blame: None }
    }

    pub fn untyped_blamed(method: MethodRef) -> Ty {
        Ty::Untyped {
            blame: Some(method),
        }
    }

    pub fn meta(inner: Ty) -> Ty {
        Ty::Meta(Box::new(inner))
    }

    pub fn sym(name: impl Into<String>) -> Ty {
        Ty::Literal(Lit::Sym(name.into()))
    }

    pub fn str(value: impl Into<String>) -> Ty {
        Ty::Literal(Lit::Str(value.into()))
    }

    pub fn int(value: i64) -> Ty {
        Ty::Literal(Lit::Int(value))
    }

    pub fn bool_lit(value: bool) -> Ty {
        Ty::Literal(Lit::Bool(value))
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, Ty::Untyped { .. })
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Ty::Nil)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Ty::Bottom)
    }

    /// The blame recorded on an untyped type, if any.
    pub fn untyped_blame(&self) -> Option<MethodRef> {
        match self {
            Ty::Untyped { blame } => *blame,
            _ => None,
        }
    }

    /// Whether this is a proxy variant wrapping a plain class.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Ty::Literal(_) | Ty::Shape(..) | Ty::Tuple(_))
    }

    /// True when the type mentions no inference artifacts. Fully-defined
    /// types can be compared without a constraint in scope.
    pub fn is_fully_defined(&self) -> bool {
        match self {
            Ty::Var(_) | Ty::SelfParam(_) | Ty::LambdaParam { .. } | Ty::SelfType => false,
            Ty::Class(_) | Ty::Literal(_) | Ty::Untyped { .. } | Ty::Top | Ty::Bottom | Ty::Nil
            | Ty::Void => true,
            Ty::Applied(_, args) => args.iter().all(Ty::is_fully_defined),
            Ty::Shape(_, values) => values.iter().all(Ty::is_fully_defined),
            Ty::Tuple(elems) => elems.iter().all(Ty::is_fully_defined),
            Ty::Or(l, r) | Ty::And(l, r) => l.is_fully_defined() && r.is_fully_defined(),
            Ty::Meta(inner) => inner.is_fully_defined(),
        }
    }

    /// Project a proxy variant onto its underlying class type.
    ///
    /// Literal -> its builtin class; shape -> `Hash[untyped, untyped]`;
    /// tuple -> `Array[lub(elems)]`. Non-proxy types project to themselves.
    pub fn underlying(&self, env: &GlobalEnv) -> Ty {
        match self {
            Ty::Literal(lit) => Ty::Class(lit.underlying_class(env)),
            Ty::Shape(..) => crate::subtype::hash_of_untyped(env),
            Ty::Tuple(elems) => {
                crate::subtype::array_of(env, crate::subtype::tuple_element_type(env, elems))
            }
            other => other.clone(),
        }
    }

    /// Nominal ancestry test, looking through proxy variants.
    pub fn derives_from(&self, env: &GlobalEnv, klass: ClassRef) -> bool {
        match self {
            Ty::Class(c) => env.symbols.derives_from(*c, klass),
            Ty::Applied(c, _) => env.symbols.derives_from(*c, klass),
            Ty::Literal(_) | Ty::Shape(..) | Ty::Tuple(_) => {
                self.underlying(env).derives_from(env, klass)
            }
            _ => false,
        }
    }

    /// Render the type for diagnostics. Class names live in the symbol
    /// table, so rendering needs the environment.
    pub fn show(&self, env: &GlobalEnv) -> String {
        match self {
            Ty::Class(c) => env.symbols.class(*c).name.clone(),
            Ty::Applied(c, args) => {
                let mut out = env.symbols.class(*c).name.clone();
                if !args.is_empty() {
                    out.push('[');
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(&a.show(env));
                    }
                    out.push(']');
                }
                out
            }
            Ty::Literal(lit) => format!("{}({})", env.symbols.class(lit.underlying_class(env)).name, lit),
            Ty::Shape(keys, values) => {
                let mut out = String::from("{");
                for (i, (k, v)) in keys.iter().zip(values.iter()).enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&format!("{} => {}", k, v.show(env)));
                }
                out.push('}');
                out
            }
            Ty::Tuple(elems) => {
                let mut out = String::from("[");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&e.show(env));
                }
                out.push(']');
                out
            }
            Ty::Or(l, r) => format!("T.any({}, {})", l.show(env), r.show(env)),
            Ty::And(l, r) => format!("T.all({}, {})", l.show(env), r.show(env)),
            Ty::Meta(inner) => format!("<Type: {}>", inner.show(env)),
            Ty::Var(id) => format!("T.type_parameter(:{})", env.symbols.type_param(*id).name),
            Ty::SelfParam(m) => format!("T.attached_class (:{})", env.symbols.type_member(*m).name),
            Ty::LambdaParam { member, .. } => env.symbols.type_member(*member).name.clone(),
            Ty::SelfType => "T.self_type".to_string(),
            Ty::Untyped { .. } => "T.untyped".to_string(),
            Ty::Top => "T.anything".to_string(),
            Ty::Bottom => "T.noreturn".to_string(),
            Ty::Nil => "NilClass".to_string(),
            Ty::Void => "void".to_string(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
