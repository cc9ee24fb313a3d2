//! Call-site inputs to dispatch.
//!
//! `DispatchArgs` carries everything the dispatcher knows about one call:
//! the method name, source locations for diagnostics, the typed actual
//! arguments (positional first, then alternating keyword key/value pairs,
//! then an optional trailing keyword splat), the receiver in its three
//! roles, and the attached block if any.

use rowan::TextRange;

use sable_types::{FileId, GlobalEnv, Loc, Ty};

use crate::diag::{ErrorLine, ErrorSection};

/// A type together with the source locations it flowed from. Origins feed
/// the "originating from" sections of diagnostics.
#[derive(Clone, Debug)]
pub struct TypeAndOrigins {
    pub ty: Ty,
    pub origins: Vec<Loc>,
}

impl TypeAndOrigins {
    pub fn new(ty: Ty, origin: Loc) -> TypeAndOrigins {
        TypeAndOrigins {
            ty,
            origins: vec![origin],
        }
    }

    pub fn with_origins(ty: Ty, origins: Vec<Loc>) -> TypeAndOrigins {
        TypeAndOrigins { ty, origins }
    }

    /// The "Got X originating from:" section of an argument diagnostic.
    pub fn explain_got(&self, env: &GlobalEnv, origin_for_uninitialized: Option<Loc>) -> ErrorSection {
        let mut lines: Vec<ErrorLine> = self
            .origins
            .iter()
            .map(|loc| ErrorLine {
                loc: Some(*loc),
                message: String::new(),
            })
            .collect();
        if lines.is_empty() {
            if let Some(loc) = origin_for_uninitialized {
                lines.push(ErrorLine {
                    loc: Some(loc),
                    message: "possibly uninitialized here".to_string(),
                });
            }
        }
        ErrorSection {
            header: format!("Got `{}` originating from:", self.ty.show(env)),
            lines,
        }
    }
}

/// A block attached to a call, with its parsed positional arity when the
/// block literal made it statically known.
#[derive(Clone, Debug)]
pub struct BlockArg {
    pub fixed_arity: Option<usize>,
}

/// Source ranges for one call site. `receiver` is `None` for implicit
/// receivers; a zero-width receiver range marks block-pass syntax.
#[derive(Clone, Debug)]
pub struct CallLocs {
    pub file: FileId,
    pub call: TextRange,
    pub receiver: Option<TextRange>,
    pub args: Vec<TextRange>,
}

impl CallLocs {
    /// Synthetic locations for compiler-generated inner calls.
    pub fn synthetic(file: FileId) -> CallLocs {
        CallLocs {
            file,
            call: TextRange::empty(0.into()),
            receiver: None,
            args: Vec::new(),
        }
    }

    pub fn call_loc(&self) -> Loc {
        Loc::new(self.file, self.call)
    }

    pub fn receiver_loc(&self) -> Option<Loc> {
        self.receiver.map(|r| Loc::new(self.file, r))
    }

    pub fn arg_loc(&self, index: usize) -> Option<Loc> {
        self.args.get(index).map(|r| Loc::new(self.file, *r))
    }
}

/// One method call, as presented to the dispatcher.
///
/// `args` holds positional arguments first, then the inline keyword
/// arguments as alternating key/value entries, then (when the
/// non-positional count is odd) a trailing keyword-splat argument.
///
/// The receiver appears in three roles: `this_type` is the component
/// currently being dispatched (narrowed during union/intersection
/// recursion), `self_type` is the static receiver, and `full_type` is the
/// broadest receiver with its origins, used for diagnostics.
#[derive(Clone, Debug)]
pub struct DispatchArgs {
    pub name: String,
    pub locs: CallLocs,
    pub num_pos_args: usize,
    pub args: Vec<TypeAndOrigins>,
    pub this_type: Ty,
    pub self_type: Ty,
    pub full_type: TypeAndOrigins,
    pub block: Option<BlockArg>,
    pub suppress_errors: bool,
    pub origin_for_uninitialized: Option<Loc>,
}

impl DispatchArgs {
    /// A call with no arguments and the receiver filling all three roles.
    pub fn new(name: impl Into<String>, locs: CallLocs, receiver: Ty) -> DispatchArgs {
        DispatchArgs {
            name: name.into(),
            locs,
            num_pos_args: 0,
            args: Vec::new(),
            this_type: receiver.clone(),
            self_type: receiver.clone(),
            full_type: TypeAndOrigins {
                ty: receiver,
                origins: Vec::new(),
            },
            block: None,
            suppress_errors: false,
            origin_for_uninitialized: None,
        }
    }

    /// Narrow `this_type` to a component of the receiver.
    pub fn with_this(&self, ty: Ty) -> DispatchArgs {
        let mut out = self.clone();
        out.this_type = ty;
        out
    }

    /// Re-root the call on a different receiver entirely.
    pub fn with_self(&self, ty: Ty) -> DispatchArgs {
        let mut out = self.clone();
        out.this_type = ty.clone();
        out.self_type = ty;
        out
    }

    pub fn errors_suppressed(&self) -> DispatchArgs {
        let mut out = self.clone();
        out.suppress_errors = true;
        out
    }
}
