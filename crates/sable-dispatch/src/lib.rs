//! Method dispatch core for the Sable type checker.
//!
//! Given a receiver type, a method name, typed arguments, and an optional
//! block, the dispatcher resolves the call against the type lattice and
//! produces an inferred return type, constraints on inferred type
//! variables, and a stream of diagnostics with autocorrects.
//!
//! The crate consumes `sable-types` read-only: the symbol table, the
//! subtype kernel, and type constraints come from there. Everything
//! call-shaped lives here: the lattice dispatcher (`dispatch`), the
//! overload resolver (`overload`), the argument matcher (inside
//! `dispatch`), the intrinsic registry (`intrinsics`), the value-to-type
//! unwrapper (`unwrap`), and the diagnostic model (`diag`, rendered by
//! `render`).

pub mod args;
pub mod diag;
pub mod dispatch;
pub mod intrinsics;
pub mod overload;
pub mod render;
pub mod result;
pub mod unwrap;

pub use args::{BlockArg, CallLocs, DispatchArgs, TypeAndOrigins};
pub use diag::{Autocorrect, Diagnostic, DiagnosticCode, ErrorLine, ErrorQueue, ErrorSection};
pub use dispatch::{dispatch_call, get_call_arguments, pretty_arity};
pub use overload::guess_overload;
pub use result::{Combinator, DispatchComponent, DispatchResult};
pub use unwrap::unwrap_type;

use sable_types::GlobalEnv;

/// An environment with the builtin classes, core library signatures, and
/// the intrinsic table installed. The common starting point for embedders
/// and tests.
pub fn env_with_intrinsics() -> GlobalEnv {
    let mut env = GlobalEnv::with_builtins();
    intrinsics::install(&mut env);
    env
}
