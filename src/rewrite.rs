//! The rewriter callout.
//!
//! The rewriting rule book is a separate subsystem invoked through a narrow
//! interface; the interface itself (this trait) is part of the core.
//! `NullRewriter` implements rewrite-level 0 (never rewrites). `BasicRewriter`
//! is the minimum rule book needed to make a handful of everyday algebraic
//! identities hold — it is deliberately not a full simplifier. Its rules
//! follow the same shape as a small local simplifier: short
//! `Option<Edge>`-returning functions, one per operator, tried in sequence.

use crate::edge::Edge;
use crate::node::Kind;

/// The narrow callback interface a constructor consults before falling
/// through to the primitive unique-table path.
pub trait Rewriter {
    /// `upper`/`lower` describe the slice being taken of `a`.
    fn rewrite_unary_slice(&self, a: Edge, upper: u32, lower: u32) -> Option<Edge>;
    fn rewrite_binary(&self, kind: Kind, a: Edge, b: Edge) -> Option<Edge>;
    fn rewrite_ternary(&self, kind: Kind, a: Edge, b: Edge, c: Edge) -> Option<Edge>;
}

/// rewrite-level 0: the rewriter is disabled and every constructor falls
/// straight through to the unique table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRewriter;

impl Rewriter for NullRewriter {
    fn rewrite_unary_slice(&self, _a: Edge, _upper: u32, _lower: u32) -> Option<Edge> {
        None
    }
    fn rewrite_binary(&self, _kind: Kind, _a: Edge, _b: Edge) -> Option<Edge> {
        None
    }
    fn rewrite_ternary(&self, _kind: Kind, _a: Edge, _b: Edge, _c: Edge) -> Option<Edge> {
        None
    }
}

/// rewrite-level >= 1: applies a handful of algebraic identities directly.
/// Full constant folding of bit-vector constants
/// needs access to the node's payload, which this trait's flat `Edge`
/// signature doesn't carry, so `Context` folds constants itself
/// (`Context::fold_const_binary`) before consulting the rewriter; this
/// struct covers the structural identities that work purely in terms of
/// edge identity and inversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRewriter;

impl Rewriter for BasicRewriter {
    fn rewrite_unary_slice(&self, _a: Edge, _upper: u32, _lower: u32) -> Option<Edge> {
        None
    }

    fn rewrite_binary(&self, kind: Kind, a: Edge, b: Edge) -> Option<Edge> {
        match kind {
            // and(x,x) -> x; and(x,!x) would be a width mismatch for
            // bit-vector AND in general widths, so it is left to constant
            // folding once either side is actually a zero constant.
            Kind::And if a == b => Some(a),
            // eq(x,x) -> true needs a sort-aware constant and is handled in
            // `Context::bv_eq`, along with stripping a shared inversion from
            // both operands (eq(!a,!b) and eq(a,b) are the same node) before
            // this rewriter is ever consulted.
            _ => None,
        }
    }

    fn rewrite_ternary(&self, kind: Kind, _a: Edge, b: Edge, c: Edge) -> Option<Edge> {
        match kind {
            // cond(c, t, t) -> t
            Kind::Cond if b == c => Some(b),
            _ => None,
        }
    }
}
