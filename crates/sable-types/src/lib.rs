//! Type-system foundations for the Sable type checker.
//!
//! This crate owns the pieces the dispatch core consumes read-only: the
//! type lattice (`ty`), the symbol table and global environment
//! (`symbols`), the subtype kernel (`subtype`), and per-call type
//! constraints (`constraint`). It knows nothing about call sites or
//! diagnostics; that is the dispatch crate's business.

pub mod constraint;
pub mod subtype;
pub mod symbols;
pub mod ty;

pub use constraint::TypeConstraint;
pub use symbols::{
    Builtins, CheckOptions, ClassRef, FileId, GlobalEnv, IntrinsicId, Loc, MethodRef, ParamFlags,
    ParamInfo, StrictLevel, SymbolTable, TypeMemberRef, TypeParamId,
};
pub use ty::{Lit, Ty};
