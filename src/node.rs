//! The node record and its kind-specific payload.

use crate::bits::BitVector;
use crate::edge::{Edge, NodeId};
use crate::sort::SortId;

/// The closed primitive kernel plus `proxy`. Every other operator in the
/// public constructor surface is a derived expansion built out of these (see
/// `context::Context`'s derived constructors) and never gets its own `Kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Invalid,
    Const,
    Var,
    Param,
    Slice,
    And,
    BvEq,
    FunEq,
    Add,
    Mul,
    Ult,
    Sll,
    Srl,
    Udiv,
    Urem,
    Concat,
    Apply,
    Lambda,
    Cond,
    Args,
    Uf,
    Update,
    Proxy,
}

impl Kind {
    pub fn arity(self) -> u8 {
        use Kind::*;
        match self {
            Invalid | Proxy => 0,
            Const | Var | Param | Uf => 0,
            Slice => 1,
            And | BvEq | FunEq | Add | Mul | Ult | Sll | Srl | Udiv | Urem | Concat | Apply => 2,
            Lambda => 2, // (param, body) -- param itself is a node, not a child slot
            // an argument spine holds up to 3 elements directly, or 2 plus a
            // continuation link when the flat list is longer; the real count
            // for a given node is narrower and is stamped onto `Node::arity`
            // at construction time in `Context::intern_structural`.
            Args => 3,
            Cond | Update => 3,
        }
    }

    /// true for the handful of binary kinds the unique table sorts children
    /// of when `sort_commutative_children` is enabled.
    pub fn is_commutative(self) -> bool {
        matches!(self, Kind::And | Kind::Add | Kind::Mul | Kind::BvEq | Kind::FunEq)
    }
}

/// Kind-specific extra data that doesn't fit the generic child-slot model.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Const(BitVector),
    Slice { upper: u32, lower: u32 },
    Param {
        /// the lambda currently binding this parameter, if any -- a
        /// parameter has at most one binding lambda at a time.
        binding: Option<NodeId>,
    },
    Lambda {
        param: NodeId,
        /// cached alpha-invariant structural hash, so equivalence checks
        /// between two lambdas don't re-walk either body from scratch.
        hash: u64,
        /// arg-tuple -> value pairs seeded by array-write encodings
        static_rho: Vec<(Edge, Edge)>,
    },
    Uf {
        /// memoized (argument tuple -> result) applications, analogous to a
        /// lambda's static rho but keyed by the uninterpreted function's own
        /// applies.
        rho: Vec<(Edge, Edge)>,
    },
}

/// One entry in a doubly linked parent list: names a parent node and which
/// of that parent's (at most three) child slots points at the node this
/// entry is threaded through. The slot simply lives alongside the id here
/// rather than packed into it; see DESIGN.md for why that packing is not
/// reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentEntry {
    pub parent: NodeId,
    pub slot: u8,
}

/// prev/next pointers for one of *this* node's own child slots, i.e. this
/// node's position in the parent list anchored at `children[slot]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentLink {
    pub prev: Option<ParentEntry>,
    pub next: Option<ParentEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unique,
    NotUnique,
    Erased,
    Disconnected,
    Deallocated,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: Kind,
    pub sort: SortId,
    pub arity: u8,
    pub children: [Edge; 3],
    pub payload: Payload,

    // -- reference counting --
    pub refs: u32,
    pub ext_refs: u32,

    // -- lifecycle + structural state flags --
    pub lifecycle: Lifecycle,
    pub parameterized: bool,
    pub lambda_below: bool,
    pub apply_below: bool,
    pub is_array: bool,

    // -- parent bookkeeping --
    /// this node's own position within each of its children's parent lists
    pub child_links: [ParentLink; 3],
    /// head/tail of the list of parents that reference *this* node
    pub first_parent: Option<ParentEntry>,
    pub last_parent: Option<ParentEntry>,
    pub parent_count: u32,

    /// forward pointer to a canonical replacement, set at most once. Once
    /// set it never changes: every outstanding handle to this node keeps
    /// resolving to the same replacement for the node's remaining lifetime.
    pub simplified: Option<Edge>,
}

impl Node {
    pub fn new(id: NodeId, kind: Kind, sort: SortId, children: [Edge; 3], payload: Payload) -> Node {
        let arity = kind.arity();
        Node {
            id,
            kind,
            sort,
            arity,
            children,
            payload,
            refs: 1,
            ext_refs: 0,
            lifecycle: Lifecycle::Unique,
            parameterized: false,
            lambda_below: false,
            apply_below: false,
            is_array: false,
            child_links: [ParentLink::default(); 3],
            first_parent: None,
            last_parent: None,
            parent_count: 0,
            simplified: None,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.lifecycle == Lifecycle::Unique
    }

    pub fn is_proxy(&self) -> bool {
        self.kind == Kind::Proxy
    }
}
