//! Dispatch results.
//!
//! A `DispatchResult` is a linked chain of components: union and
//! intersection receivers contribute one component per side, joined by the
//! combinator that merged them. Each component owns its own error vector;
//! callers decide whether those errors survive (intersection dispatch
//! throws away the losing side's).

use sable_types::{subtype, GlobalEnv, MethodRef, ParamInfo, Ty, TypeConstraint};

use crate::diag::{Diagnostic, ErrorQueue};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// One resolved (or unresolved) component of a dispatch.
#[derive(Clone, Debug)]
pub struct DispatchComponent {
    pub receiver: Ty,
    pub method: Option<MethodRef>,
    pub constr: Option<TypeConstraint>,
    pub block_pre_type: Option<Ty>,
    pub block_return_type: Option<Ty>,
    pub block_spec: Option<ParamInfo>,
    pub errors: Vec<Diagnostic>,
    pub send_ty: Option<Ty>,
}

impl DispatchComponent {
    pub fn new(receiver: Ty, method: Option<MethodRef>) -> DispatchComponent {
        DispatchComponent {
            receiver,
            method,
            constr: None,
            block_pre_type: None,
            block_return_type: None,
            block_spec: None,
            errors: Vec::new(),
            send_ty: None,
        }
    }
}

/// The outcome of dispatching one call against one receiver type.
///
/// `return_type` is `None` only transiently, while an intrinsic decides
/// whether to take over; every public dispatch entry point returns it
/// filled in.
#[derive(Clone, Debug)]
pub struct DispatchResult {
    pub return_type: Option<Ty>,
    pub main: DispatchComponent,
    pub secondary: Option<Box<DispatchResult>>,
    pub secondary_kind: Option<Combinator>,
}

impl DispatchResult {
    pub fn new(return_type: Ty, receiver: Ty, method: Option<MethodRef>) -> DispatchResult {
        DispatchResult {
            return_type: Some(return_type),
            main: DispatchComponent::new(receiver, method),
            secondary: None,
            secondary_kind: None,
        }
    }

    /// A result whose return type is still to be decided (by an intrinsic
    /// or by the tail of the symbol path).
    pub fn pending(receiver: Ty, method: Option<MethodRef>) -> DispatchResult {
        DispatchResult {
            return_type: None,
            main: DispatchComponent::new(receiver, method),
            secondary: None,
            secondary_kind: None,
        }
    }

    /// The computed return type; untyped when nothing was determined.
    pub fn ret(&self) -> Ty {
        self.return_type.clone().unwrap_or_else(Ty::untyped)
    }

    /// Link two results under a combinator. The left result's chain is
    /// extended with the right one and the return types are joined
    /// (`any` for OR, `all` for AND).
    pub fn merge(
        env: &GlobalEnv,
        kind: Combinator,
        mut left: DispatchResult,
        right: DispatchResult,
    ) -> DispatchResult {
        let ret = match kind {
            Combinator::Or => subtype::any(env, &left.ret(), &right.ret()),
            Combinator::And => subtype::all(env, &left.ret(), &right.ret()),
        };
        fn append(node: &mut DispatchResult, kind: Combinator, next: DispatchResult) {
            match node.secondary {
                Some(ref mut tail) => append(tail, kind, next),
                None => {
                    node.secondary_kind = Some(kind);
                    node.secondary = Some(Box::new(next));
                }
            }
        }
        append(&mut left, kind, right);
        left.return_type = Some(ret);
        left
    }

    /// Whether every component of the chain resolved its method. OR links
    /// require the rest of the chain to resolve too; an AND link is
    /// satisfied by its head alone.
    pub fn all_components_present(&self) -> bool {
        if self.main.method.is_none() {
            return false;
        }
        match (&self.secondary, self.secondary_kind) {
            (None, _) => true,
            (Some(_), Some(Combinator::And)) => true,
            (Some(next), _) => next.all_components_present(),
        }
    }

    /// Drain every component's errors, in chain order.
    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        let mut out = std::mem::take(&mut self.main.errors);
        if let Some(next) = self.secondary.as_mut() {
            out.extend(next.take_errors());
        }
        out
    }

    /// Move the chain's errors into the global queue.
    pub fn sink_errors(&mut self, queue: &mut ErrorQueue) {
        queue.extend(self.take_errors());
    }
}
