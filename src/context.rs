//! The expression-DAG façade.
//!
//! `Context` owns every table the rest of the crate only reads a slice of at
//! a time: the node [`Arena`], the [`UniqueTable`], the [`SortTable`], the
//! [`SymbolTable`], and the configured [`Rewriter`]. Every public
//! constructor funnels through here so hash-consing, parent-list bookkeeping
//! and reference counting stay consistent; nothing outside this module ever
//! allocates a [`Node`] directly.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::arena::Arena;
use crate::bits::BitVector;
use crate::edge::{Edge, NodeId};
use crate::lambda;
use crate::node::{Kind, Lifecycle, Node, Payload};
use crate::parent;
use crate::rewrite::{BasicRewriter, NullRewriter, Rewriter};
use crate::sort::{SortId, SortTable};
use crate::symtab::SymbolTable;
use crate::unique_table::UniqueTable;

/// Typed construction-time options, rather than a stringly-typed bag.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// canonicalize the operand order of commutative binary kinds so
    /// `and(a,b)` and `and(b,a)` collapse to the same node.
    pub sort_commutative_children: bool,
    /// 0 disables the rewriter entirely; >=1 enables [`BasicRewriter`].
    pub rewrite_level: u8,
    /// encode array writes as a parameterized lambda with a static-rho seed
    /// rather than an explicit `update` node.
    pub fun_store_lambdas: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            sort_commutative_children: true,
            rewrite_level: 1,
            fun_store_lambdas: true,
        }
    }
}

pub struct Context {
    arena: Arena,
    table: UniqueTable,
    sorts: SortTable,
    syms: SymbolTable,
    rewriter: Box<dyn Rewriter>,
    options: Options,
}

impl Context {
    pub fn new() -> Context {
        Context::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Context {
        let rewriter: Box<dyn Rewriter> = if options.rewrite_level == 0 {
            Box::new(NullRewriter)
        } else {
            Box::new(BasicRewriter)
        };
        Context {
            arena: Arena::new(),
            table: UniqueTable::new(),
            sorts: SortTable::new(),
            syms: SymbolTable::new(),
            rewriter,
            options,
        }
    }

    pub fn sorts(&mut self) -> &mut SortTable {
        &mut self.sorts
    }

    pub fn symbols(&mut self) -> &mut SymbolTable {
        &mut self.syms
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn live_node_count(&self) -> usize {
        self.arena.live_count()
    }

    fn sort_of(&self, e: Edge) -> SortId {
        self.arena.get(e.id()).sort
    }

    fn width_of(&self, e: Edge) -> u32 {
        self.sorts.width(self.sort_of(e))
    }

    // -- hashing -----------------------------------------------------------

    fn fingerprint(kind: Kind, sort: SortId, children: &[Edge], extra: u64) -> u64 {
        let mut h = fxhash::FxHasher::default();
        (kind as u8).hash(&mut h);
        sort.hash(&mut h);
        for c in children {
            c.hash(&mut h);
        }
        extra.hash(&mut h);
        h.finish()
    }

    /// Recompute the fingerprint a *live* node would be found under. Used
    /// only by [`UniqueTable::maybe_grow`]'s rehash walk.
    fn rehash_node(arena: &Arena, id: NodeId) -> u64 {
        let n = arena.get(id);
        match n.kind {
            Kind::Const => match &n.payload {
                Payload::Const(bv) => Context::fingerprint(n.kind, n.sort, &[], bv.eq_hash()),
                _ => unreachable!("Const node without a Const payload"),
            },
            Kind::Slice => match &n.payload {
                Payload::Slice { upper, lower } => {
                    let extra = ((*upper as u64) << 32) | (*lower as u64);
                    Context::fingerprint(n.kind, n.sort, &n.children[..1], extra)
                }
                _ => unreachable!("Slice node without a Slice payload"),
            },
            Kind::Lambda => match &n.payload {
                Payload::Lambda { hash, .. } => *hash,
                _ => unreachable!("Lambda node without a Lambda payload"),
            },
            _ => Context::fingerprint(n.kind, n.sort, &n.children[..n.arity as usize], 0),
        }
    }

    /// Follow `simplified` forward pointers left behind by a proxy
    /// conversion until reaching a live node.
    fn canonical(&self, e: Edge) -> Edge {
        let mut cur = e;
        loop {
            let node = self.arena.get(cur.id());
            match node.simplified {
                Some(target) => cur = target.inv_if(cur.is_inverted()),
                None => return cur,
            }
        }
    }

    fn bump_ref(&mut self, id: NodeId) {
        self.arena.get_mut(id).refs += 1;
    }

    // -- generic structural interning ---------------------------------------

    /// Probe-or-build for every primitive kind whose equality is plain
    /// structural equality of (kind, sort, children) -- i.e. everything
    /// except `const` (keyed on value), `lambda` (keyed on alpha-equivalence)
    /// and the always-fresh `var`/`param`/`uf` leaves.
    fn intern_structural(&mut self, kind: Kind, sort: SortId, children: &[Edge]) -> Edge {
        let children = children.to_vec();
        let hash = Context::fingerprint(kind, sort, &children, 0);
        let arena = &self.arena;
        let found = self.table.find(hash, |id| {
            let n = arena.get(id);
            n.kind == kind && n.sort == sort && n.children[..children.len()] == children[..]
        });
        if let Some(id) = found {
            self.bump_ref(id);
            return Edge::raw(id);
        }

        let parameterized = children.iter().any(|c| self.arena.get(c.id()).parameterized);
        let lambda_below = children.iter().any(|c| self.arena.get(c.id()).lambda_below);
        let apply_below = kind == Kind::Apply || children.iter().any(|c| self.arena.get(c.id()).apply_below);
        let mut full_children = [Edge::INVALID; 3];
        full_children[..children.len()].copy_from_slice(&children);

        let new_id = self.arena.alloc(|id| {
            let mut n = Node::new(id, kind, sort, full_children, Payload::None);
            // `Kind::arity()` gives the per-kind maximum; a variable-arity
            // kind (`Args`) may use fewer slots than that for a given node,
            // so the real count is stamped on here instead.
            n.arity = children.len() as u8;
            n.parameterized = parameterized;
            n.lambda_below = lambda_below;
            n.apply_below = apply_below;
            n
        });
        let append = kind == Kind::Apply;
        for (slot, c) in children.iter().enumerate() {
            if c.is_valid() {
                parent::connect_child(&mut self.arena, new_id, slot as u8, c.id(), append);
                // the new node's edge to this child is itself a reference;
                // children are released in turn when their parent is.
                self.bump_ref(c.id());
            }
        }
        self.table.insert(hash, new_id);
        let arena = &self.arena;
        self.table.maybe_grow(|id| Context::rehash_node(arena, id));
        trace!("interned {:?} -> {}", kind, new_id);
        Edge::raw(new_id)
    }

    /// Canonicalize operand order for commutative kinds, if enabled.
    fn canon_pair(&mut self, kind: Kind, a: Edge, b: Edge) -> (Edge, Edge) {
        if self.options.sort_commutative_children && kind.is_commutative() {
            if (a.id(), a.is_inverted()) > (b.id(), b.is_inverted()) {
                return (b, a);
            }
        }
        (a, b)
    }

    fn build_binary(&mut self, kind: Kind, sort: SortId, a: Edge, b: Edge) -> Edge {
        let a = self.canonical(a);
        let b = self.canonical(b);
        let (a, b) = self.canon_pair(kind, a, b);
        if self.options.rewrite_level > 0 {
            if let Some(folded) = self.fold_const_binary(kind, a, b) {
                return folded;
            }
        }
        if let Some(hit) = self.rewriter.rewrite_binary(kind, a, b) {
            self.bump_ref(hit.id());
            return hit;
        }
        self.intern_structural(kind, sort, &[a, b])
    }

    /// reads a node's value as a `BitVector`, with the edge's own inversion
    /// bit already folded in -- `None` for anything that isn't a constant.
    fn const_value(&self, e: Edge) -> Option<BitVector> {
        match &self.arena.get(e.id()).payload {
            Payload::Const(bv) => Some(if e.is_inverted() { bv.complement() } else { bv.clone() }),
            _ => None,
        }
    }

    /// Constant folding for the primitive binary kernel: when both operands
    /// are literal constants, compute the result directly rather than
    /// allocating a node for it. This needs `Payload::Const` access that
    /// `Rewriter::rewrite_binary`'s flat `Edge` signature can't carry (see
    /// `rewrite.rs`), so it lives here, gated the same way the rewriter
    /// itself is: disabled at `rewrite_level` 0.
    fn fold_const_binary(&mut self, kind: Kind, a: Edge, b: Edge) -> Option<Edge> {
        let bv_a = self.const_value(a)?;
        let bv_b = self.const_value(b)?;
        let folded = match kind {
            Kind::And => bv_a.and(&bv_b),
            Kind::Add => bv_a.add(&bv_b),
            Kind::Mul => bv_a.mul(&bv_b),
            Kind::Udiv => bv_a.udiv(&bv_b),
            Kind::Urem => bv_a.urem(&bv_b),
            Kind::Concat => bv_a.concat(&bv_b),
            Kind::Ult => {
                return Some(self.mk_const(if bv_a.ult(&bv_b) { BitVector::one(1) } else { BitVector::zero(1) }));
            }
            Kind::BvEq => {
                return Some(self.mk_const(if bv_a == bv_b { BitVector::one(1) } else { BitVector::zero(1) }));
            }
            Kind::Sll => bv_a.shl(bv_b.as_u64() as u32),
            Kind::Srl => bv_a.lshr(bv_b.as_u64() as u32),
            _ => return None,
        };
        Some(self.mk_const(folded))
    }

    fn build_ternary(&mut self, kind: Kind, sort: SortId, a: Edge, b: Edge, c: Edge) -> Edge {
        let a = self.canonical(a);
        let b = self.canonical(b);
        let c = self.canonical(c);
        if let Some(hit) = self.rewriter.rewrite_ternary(kind, a, b, c) {
            self.bump_ref(hit.id());
            return hit;
        }
        self.intern_structural(kind, sort, &[a, b, c])
    }

    // -- primitive constructors ----------------------------------------------

    /// Constant normalization (spec invariant 10): a constant whose low bit
    /// is set is never stored directly -- the unique table is probed/filled
    /// with its bitwise complement instead, and an inversion bit is applied
    /// on the returned edge. This halves the constant cache, since `bv` and
    /// `bv.complement()` always resolve to the same underlying node.
    pub fn mk_const(&mut self, bv: BitVector) -> Edge {
        let sort = self.sorts.bitvec(bv.width());
        let (stored, inverted) = if bv.low_bit() { (bv.complement(), true) } else { (bv, false) };
        let hash = Context::fingerprint(Kind::Const, sort, &[], stored.eq_hash());
        let arena = &self.arena;
        let found = self.table.find(hash, |id| match &arena.get(id).payload {
            Payload::Const(other) => arena.get(id).sort == sort && other == &stored,
            _ => false,
        });
        if let Some(id) = found {
            self.bump_ref(id);
            return Edge::raw(id).inv_if(inverted);
        }
        let new_id = self
            .arena
            .alloc(|id| Node::new(id, Kind::Const, sort, [Edge::INVALID; 3], Payload::Const(stored)));
        self.table.insert(hash, new_id);
        Edge::raw(new_id).inv_if(inverted)
    }

    pub fn zero(&mut self, width: u32) -> Edge {
        self.mk_const(BitVector::zero(width))
    }

    pub fn ones(&mut self, width: u32) -> Edge {
        self.mk_const(BitVector::ones(width))
    }

    pub fn one(&mut self, width: u32) -> Edge {
        self.mk_const(BitVector::one(width))
    }

    /// Signed integer literal at `sort`'s width, sign-extended/truncated.
    pub fn int(&mut self, i: i64, sort: SortId) -> Edge {
        let width = self.sorts.width(sort);
        self.mk_const(BitVector::from_i64(width, i))
    }

    /// Unsigned integer literal at `sort`'s width, zero-extended/truncated.
    pub fn unsigned(&mut self, u: u64, sort: SortId) -> Edge {
        let width = self.sorts.width(sort);
        self.mk_const(BitVector::from_u64(width, u))
    }

    /// The 1-bit `true` constant, at the bool sort.
    pub fn true_(&mut self) -> Edge {
        self.one(1)
    }

    /// The 1-bit `false` constant, at the bool sort.
    pub fn false_(&mut self) -> Edge {
        self.zero(1)
    }

    /// Variables are never hash-consed: two calls always produce distinct
    /// nodes, even with the same name -- naming is a side table, not an
    /// identity.
    pub fn mk_var(&mut self, sort: SortId, name: Option<&str>) -> Edge {
        let is_array = matches!(self.sorts.desc(sort), crate::sort::SortDesc::Fun { .. });
        let id = self.arena.alloc(|id| {
            let mut n = Node::new(id, Kind::Var, sort, [Edge::INVALID; 3], Payload::None);
            n.is_array = is_array;
            n
        });
        let e = Edge::raw(id);
        if let Some(name) = name {
            self.syms.tag(name.to_string(), e);
        }
        let _ = self.syms.next_input_id();
        e
    }

    pub fn mk_param(&mut self, sort: SortId, name: Option<&str>) -> Edge {
        let id = self.arena.alloc(|id| {
            let mut n = Node::new(
                id,
                Kind::Param,
                sort,
                [Edge::INVALID; 3],
                Payload::Param { binding: None },
            );
            n.parameterized = true;
            n
        });
        let e = Edge::raw(id);
        if let Some(name) = name {
            self.syms.tag(name.to_string(), e);
        }
        e
    }

    pub fn mk_uf(&mut self, sort: SortId, name: Option<&str>) -> Edge {
        let is_array = matches!(self.sorts.desc(sort), crate::sort::SortDesc::Fun { .. });
        assert!(is_array, "uf() requires a function sort");
        let id = self.arena.alloc(|id| {
            let mut n = Node::new(id, Kind::Uf, sort, [Edge::INVALID; 3], Payload::Uf { rho: Vec::new() });
            n.is_array = true;
            n
        });
        let e = Edge::raw(id);
        if let Some(name) = name {
            self.syms.tag(name.to_string(), e);
        }
        e
    }

    pub fn slice(&mut self, a: Edge, upper: u32, lower: u32) -> Edge {
        let a = self.canonical(a);
        assert!(upper >= lower, "slice upper bound below lower bound");
        assert!(upper < self.width_of(a), "slice upper bound out of range");
        if let Some(hit) = self.rewriter.rewrite_unary_slice(a, upper, lower) {
            self.bump_ref(hit.id());
            return hit;
        }
        let sort = self.sorts.bitvec(upper - lower + 1);
        let extra = ((upper as u64) << 32) | (lower as u64);
        let hash = Context::fingerprint(Kind::Slice, sort, &[a], extra);
        let arena = &self.arena;
        let found = self.table.find(hash, |id| {
            let n = arena.get(id);
            n.kind == Kind::Slice
                && n.children[0] == a
                && matches!(&n.payload, Payload::Slice { upper: u, lower: l } if *u == upper && *l == lower)
        });
        if let Some(id) = found {
            self.bump_ref(id);
            return Edge::raw(id);
        }
        let parameterized = self.arena.get(a.id()).parameterized;
        let lambda_below = self.arena.get(a.id()).lambda_below;
        let apply_below = self.arena.get(a.id()).apply_below;
        let new_id = self.arena.alloc(|id| {
            let mut n = Node::new(
                id,
                Kind::Slice,
                sort,
                [a, Edge::INVALID, Edge::INVALID],
                Payload::Slice { upper, lower },
            );
            n.parameterized = parameterized;
            n.lambda_below = lambda_below;
            n.apply_below = apply_below;
            n
        });
        parent::connect_child(&mut self.arena, new_id, 0, a.id(), false);
        self.bump_ref(a.id());
        self.table.insert(hash, new_id);
        Edge::raw(new_id)
    }

    pub fn and(&mut self, a: Edge, b: Edge) -> Edge {
        let sort = self.sort_of(a);
        assert_eq!(sort, self.sort_of(b), "and: operand sort mismatch");
        self.build_binary(Kind::And, sort, a, b)
    }

    /// Left-fold of `and` over `items`, same as chaining `and` calls by
    /// hand.
    pub fn and_n(&mut self, items: &[Edge]) -> Edge {
        assert!(!items.is_empty(), "and_n: at least one operand is required");
        let mut acc = self.copy(items[0]);
        for &item in &items[1..] {
            let next = self.and(acc, item);
            self.release(acc);
            acc = next;
        }
        acc
    }

    /// Dispatches to `bv_eq` or `fun_eq` depending on whether the operands
    /// are array/function-typed: resolved by tagging each node with
    /// `is_array` at construction time and branching on that flag here,
    /// rather than threading a separate "kind of eq" parameter through every
    /// call site.
    pub fn eq(&mut self, a: Edge, b: Edge) -> Edge {
        if self.arena.get(a.id()).is_array {
            self.fun_eq(a, b)
        } else {
            self.bv_eq(a, b)
        }
    }

    /// `eq(x, x) -> true` needs a sort-aware constant, which the flat
    /// `Edge`-only signature of [`Rewriter::rewrite_binary`] can't build, so
    /// it is folded here instead and holds regardless of rewrite level.
    pub fn bv_eq(&mut self, a: Edge, b: Edge) -> Edge {
        let a = self.canonical(a);
        let b = self.canonical(b);
        // complementing both sides of an equality never changes whether
        // they're equal, so `eq(!a,!b)` and `eq(a,b)` denote the same node --
        // the client's inversions cancel here rather than producing a
        // distinct (but equivalent) term.
        let (a, b) = if a.is_inverted() && b.is_inverted() { (a.real(), b.real()) } else { (a, b) };
        if a == b {
            return self.one(1);
        }
        assert_eq!(self.sort_of(a), self.sort_of(b), "bv_eq: operand sort mismatch");
        let bsort = self.sorts.bool_sort();
        self.build_binary(Kind::BvEq, bsort, a, b)
    }

    pub fn fun_eq(&mut self, a: Edge, b: Edge) -> Edge {
        assert_eq!(self.sort_of(a), self.sort_of(b), "fun_eq: operand sort mismatch");
        let bsort = self.sorts.bool_sort();
        self.build_binary(Kind::FunEq, bsort, a, b)
    }

    pub fn add(&mut self, a: Edge, b: Edge) -> Edge {
        let sort = self.sort_of(a);
        assert_eq!(sort, self.sort_of(b), "add: operand sort mismatch");
        self.build_binary(Kind::Add, sort, a, b)
    }

    pub fn mul(&mut self, a: Edge, b: Edge) -> Edge {
        let sort = self.sort_of(a);
        assert_eq!(sort, self.sort_of(b), "mul: operand sort mismatch");
        self.build_binary(Kind::Mul, sort, a, b)
    }

    pub fn ult(&mut self, a: Edge, b: Edge) -> Edge {
        assert_eq!(self.sort_of(a), self.sort_of(b), "ult: operand sort mismatch");
        let bsort = self.sorts.bool_sort();
        self.build_binary(Kind::Ult, bsort, a, b)
    }

    /// The shift amount's width must equal `log2` of the shiftee's width,
    /// which must itself be a power of two greater than one (spec.md §6).
    fn assert_shift_sorts(&self, a: Edge, b: Edge, op: &str) {
        let width = self.width_of(a);
        assert!(width > 1 && width.is_power_of_two(), "{op}: shiftee width {width} must be a power of two greater than one");
        let log2 = width.trailing_zeros();
        assert_eq!(self.width_of(b), log2, "{op}: shift amount width must equal log2(shiftee width)");
    }

    pub fn sll(&mut self, a: Edge, b: Edge) -> Edge {
        self.assert_shift_sorts(a, b, "sll");
        let sort = self.sort_of(a);
        self.build_binary(Kind::Sll, sort, a, b)
    }

    pub fn srl(&mut self, a: Edge, b: Edge) -> Edge {
        self.assert_shift_sorts(a, b, "srl");
        let sort = self.sort_of(a);
        self.build_binary(Kind::Srl, sort, a, b)
    }

    pub fn udiv(&mut self, a: Edge, b: Edge) -> Edge {
        let sort = self.sort_of(a);
        assert_eq!(sort, self.sort_of(b), "udiv: operand sort mismatch");
        self.build_binary(Kind::Udiv, sort, a, b)
    }

    pub fn urem(&mut self, a: Edge, b: Edge) -> Edge {
        let sort = self.sort_of(a);
        assert_eq!(sort, self.sort_of(b), "urem: operand sort mismatch");
        self.build_binary(Kind::Urem, sort, a, b)
    }

    pub fn concat(&mut self, a: Edge, b: Edge) -> Edge {
        let (wa, wb) = (self.width_of(a), self.width_of(b));
        let width = wa.checked_add(wb).expect("concat: combined width overflows");
        let sort = self.sorts.bitvec(width);
        self.build_binary(Kind::Concat, sort, a, b)
    }

    pub fn cond(&mut self, c: Edge, t: Edge, e: Edge) -> Edge {
        let c = self.canonical(c);
        assert!(self.sorts.is_bool(self.sort_of(c)), "cond: condition must be 1-bit");
        assert_eq!(self.sort_of(t), self.sort_of(e), "cond: branch sort mismatch");
        let sort = self.sort_of(t);
        if let Payload::Const(bv) = &self.arena.get(c.id()).payload {
            let truthy = bv.low_bit() ^ c.is_inverted();
            return if truthy { self.copy(t) } else { self.copy(e) };
        }
        self.build_ternary(Kind::Cond, sort, c, t, e)
    }

    /// Build an argument tuple from a flat list as a spine of nodes capped
    /// at arity 3: a node holds every remaining element directly when 3 or
    /// fewer remain; otherwise the first two slots hold data and the third
    /// chains to the spine covering the rest. Regardless of how many
    /// physical nodes the chain uses, the whole spine's *sort* is always the
    /// flat N-element tuple of the original list, so a caller never needs to
    /// know the chaining depth to ask how many arguments it represents (see
    /// [`Context::args_len`]). `Args` nodes use append-on-construct parent
    /// lists just like `Apply`, so a body walk meets the function before its
    /// arguments.
    pub fn args(&mut self, items: &[Edge]) -> Edge {
        assert!(!items.is_empty(), "argument lists must be non-empty");
        self.build_args_spine(items)
    }

    fn build_args_spine(&mut self, items: &[Edge]) -> Edge {
        let elem_sorts: Vec<SortId> = items.iter().map(|&e| self.sort_of(e)).collect();
        let tuple_sort = self.sorts.tuple(elem_sorts);
        if items.len() <= 3 {
            self.intern_structural(Kind::Args, tuple_sort, items)
        } else {
            let rest = self.build_args_spine(&items[2..]);
            self.intern_structural(Kind::Args, tuple_sort, &[items[0], items[1], rest])
        }
    }

    /// Number of elements an argument-spine edge represents, read directly
    /// off its flat tuple sort rather than walking the chain.
    fn args_len(&self, e: Edge) -> usize {
        self.sorts.arity(self.sort_of(e))
    }

    /// Flattens an argument spine into its individual elements, in order.
    fn flatten_args(&self, e: Edge) -> Vec<Edge> {
        let mut out = Vec::with_capacity(self.args_len(e));
        self.flatten_args_into(e, &mut out);
        out
    }

    fn flatten_args_into(&self, e: Edge, out: &mut Vec<Edge>) {
        let n = self.arena.get(e.id());
        assert_eq!(n.kind, Kind::Args, "expected an argument spine");
        let total = self.sorts.arity(n.sort);
        if total <= 3 {
            for i in 0..total {
                out.push(n.children[i]);
            }
        } else {
            out.push(n.children[0]);
            out.push(n.children[1]);
            self.flatten_args_into(n.children[2], out);
        }
    }

    /// Applies `fun` to the argument spine `args_edge`, consuming one
    /// argument per curried parameter. When `fun` resolves to a `lambda`,
    /// this beta-reduces in place (one substitution per parameter) instead
    /// of leaving an uninterpreted `Apply` node; if the lambda chain is
    /// consumed before the argument list runs out and the result is itself
    /// an uninterpreted function, application continues against the
    /// remaining arguments. If fewer arguments are supplied than there are
    /// curried parameters, the result is a partially applied lambda value,
    /// same as ordinary lambda calculus. Reaching an uninterpreted function,
    /// `apply` builds (or reuses, via the function's rho cache) an `Apply`
    /// node over whatever arguments remain.
    pub fn apply(&mut self, fun: Edge, args_edge: Edge) -> Edge {
        let mut fun = self.canonical(fun);
        let values = self.flatten_args(args_edge);
        let mut idx = 0;
        loop {
            let fun_id = fun.id();
            let kind = self.arena.get(fun_id).kind;
            match kind {
                Kind::Lambda if idx < values.len() => {
                    let (param, body) = match &self.arena.get(fun_id).payload {
                        Payload::Lambda { param, .. } => (*param, self.arena.get(fun_id).children[0]),
                        _ => unreachable!("Lambda node without a Lambda payload"),
                    };
                    let arg = values[idx];
                    assert_eq!(
                        self.sort_of(arg),
                        self.arena.get(param).sort,
                        "apply: argument sort does not match the lambda's domain"
                    );
                    let mut memo = HashMap::new();
                    let reduced = self.substitute(body, param, arg, &mut memo);
                    fun = self.canonical(reduced);
                    idx += 1;
                }
                Kind::Uf => {
                    let domain = self.sorts.domain(self.arena.get(fun_id).sort).to_vec();
                    let remaining = &values[idx..];
                    assert_eq!(
                        remaining.len(),
                        domain.len(),
                        "apply: argument count does not match the function's domain arity"
                    );
                    for (&v, &d) in remaining.iter().zip(domain.iter()) {
                        assert_eq!(self.sort_of(v), d, "apply: argument sort does not match the function's domain");
                    }
                    let remaining_args = if idx == 0 { args_edge } else { self.args(remaining) };
                    let cached = match &self.arena.get(fun_id).payload {
                        Payload::Uf { rho } => rho.iter().find(|(k, _)| *k == remaining_args).map(|(_, v)| *v),
                        _ => unreachable!("Uf node without a Uf payload"),
                    };
                    if let Some(value) = cached {
                        self.bump_ref(value.id());
                        return value;
                    }
                    let sort = self.sorts.codomain(self.arena.get(fun_id).sort);
                    let result = self.intern_structural(Kind::Apply, sort, &[fun, remaining_args]);
                    // the rho cache holds its own reference to both the key
                    // and the value, independent of any reference a caller
                    // (or `result`'s own child slot) happens to hold --
                    // otherwise a caller releasing `result` down to zero
                    // would free it while a stale edge stayed behind in
                    // `rho`, and a later identical `apply` would dereference
                    // a deallocated node. Freed alongside the rest of the
                    // Uf's payload in `release_inner`/`convert_to_proxy`.
                    self.bump_ref(remaining_args.id());
                    self.bump_ref(result.id());
                    if let Payload::Uf { rho } = &mut self.arena.get_mut(fun_id).payload {
                        rho.push((remaining_args, result));
                    }
                    return result;
                }
                _ if idx == values.len() => return fun,
                other => panic!("apply: {:?} is neither a lambda nor an uninterpreted function", other),
            }
        }
    }

    /// Applies `fun` to a flat list of argument expressions, building the
    /// argument spine itself -- the expression-list-shaped counterpart of
    /// [`Context::apply`], which takes an already-built spine edge.
    pub fn apply_exps(&mut self, args_list: &[Edge], fun: Edge) -> Edge {
        let args_edge = self.args(args_list);
        self.apply(fun, args_edge)
    }

    fn rebuild(&mut self, kind: Kind, a: Edge, b: Edge, c: Edge) -> Edge {
        match kind {
            Kind::And => self.and(a, b),
            Kind::BvEq => self.bv_eq(a, b),
            Kind::FunEq => self.fun_eq(a, b),
            Kind::Add => self.add(a, b),
            Kind::Mul => self.mul(a, b),
            Kind::Ult => self.ult(a, b),
            Kind::Sll => self.sll(a, b),
            Kind::Srl => self.srl(a, b),
            Kind::Udiv => self.udiv(a, b),
            Kind::Urem => self.urem(a, b),
            Kind::Concat => self.concat(a, b),
            Kind::Cond => self.cond(a, b, c),
            Kind::Apply => self.apply(a, b),
            Kind::Update => self.update_with_args(a, b, c),
            other => panic!("rebuild: unsupported kind {:?} under substitution", other),
        }
    }

    /// Recursive substitution used by beta-reduction; re-enters the
    /// constructors above so the result stays hash-consed, memoizing by
    /// source node id to keep sharing (and DAG size) intact.
    fn substitute(&mut self, e: Edge, param: NodeId, value: Edge, memo: &mut HashMap<NodeId, Edge>) -> Edge {
        let id = e.id();
        if let Some(&cached) = memo.get(&id) {
            let result = cached.inv_if(e.is_inverted());
            self.bump_ref(result.id());
            return result;
        }
        let node = self.arena.get(id).clone();
        let result = if !node.parameterized {
            self.copy(Edge::raw(id))
        } else if node.kind == Kind::Param {
            if id == param {
                self.copy(value)
            } else {
                self.copy(Edge::raw(id))
            }
        } else if node.kind == Kind::Slice {
            let (upper, lower) = match node.payload {
                Payload::Slice { upper, lower } => (upper, lower),
                _ => unreachable!(),
            };
            let new_a = self.substitute(node.children[0], param, value, memo);
            self.slice(new_a, upper, lower)
        } else if node.kind == Kind::Lambda {
            let (inner_param, body) = match &node.payload {
                Payload::Lambda { param: p, .. } => (*p, node.children[0]),
                _ => unreachable!(),
            };
            let new_body = self.substitute(body, param, value, memo);
            let inner_param_edge = Edge::raw(inner_param);
            self.lambda(inner_param_edge, new_body)
        } else if node.kind == Kind::Args {
            // substitution preserves the spine's flat tuple sort; only the
            // physical slots (up to `arity`, not `Kind::arity()`) are real.
            let arity = node.arity as usize;
            let mut kids = [Edge::INVALID; 3];
            for i in 0..arity {
                kids[i] = self.substitute(node.children[i], param, value, memo);
            }
            self.intern_structural(Kind::Args, node.sort, &kids[..arity])
        } else {
            let arity = node.arity as usize;
            let mut kids = [Edge::INVALID; 3];
            for i in 0..arity {
                kids[i] = self.substitute(node.children[i], param, value, memo);
            }
            self.rebuild(node.kind, kids[0], kids[1], kids[2])
        };
        memo.insert(id, result);
        result.inv_if(e.is_inverted())
    }

    /// Builds (or finds, by alpha-equivalence) the lambda binding `param`
    /// over `body`.
    pub fn lambda(&mut self, param: Edge, body: Edge) -> Edge {
        assert_eq!(self.arena.get(param.id()).kind, Kind::Param, "lambda: not a parameter");
        assert!(!param.is_inverted(), "lambda: parameter edges are never inverted");
        let body = self.canonical(body);
        let (hash, _free) = lambda::structural_hash(&self.arena, param.id(), body);
        let param_sort = self.arena.get(param.id()).sort;
        let body_sort = self.sort_of(body);
        let sort = self.sorts.fun(vec![param_sort], body_sort);

        if let Some(existing) = self.find_equivalent_lambda(hash, param.id(), body, sort) {
            self.bump_ref(existing);
            return Edge::raw(existing);
        }

        let parameterized = false; // a lambda closes over its parameter; it is not itself "open"
        let lambda_below = true;
        let apply_below = self.arena.get(body.id()).apply_below;
        let new_id = self.arena.alloc(|id| {
            let mut n = Node::new(
                id,
                Kind::Lambda,
                sort,
                [body, Edge::INVALID, Edge::INVALID],
                Payload::Lambda {
                    param: param.id(),
                    hash,
                    static_rho: Vec::new(),
                },
            );
            n.parameterized = parameterized;
            n.lambda_below = lambda_below;
            n.apply_below = apply_below;
            n
        });
        parent::connect_child(&mut self.arena, new_id, 0, body.id(), false);
        self.bump_ref(body.id());
        self.bump_ref(param.id());
        self.arena.get_mut(param.id()).payload = Payload::Param { binding: Some(new_id) };
        self.table.insert(hash, new_id);
        let arena = &self.arena;
        self.table.maybe_grow(|id| Context::rehash_node(arena, id));
        Edge::raw(new_id)
    }

    /// Curried multi-parameter function: `fun([p0, p1, ...], body)` builds
    /// `lambda(p0, lambda(p1, ... lambda(pn, body)))`, right-associated so
    /// the first parameter is consumed first by [`Context::apply`].
    pub fn fun(&mut self, params: &[Edge], body: Edge) -> Edge {
        assert!(!params.is_empty(), "fun: at least one parameter is required");
        let mut acc = body;
        for &param in params.iter().rev() {
            acc = self.lambda(param, acc);
        }
        acc
    }

    fn find_equivalent_lambda(&self, hash: u64, param: NodeId, body: Edge, sort: SortId) -> Option<NodeId> {
        self.table.find(hash, |id| {
            let n = self.arena.get(id);
            n.kind == Kind::Lambda
                && n.sort == sort
                && match &n.payload {
                    Payload::Lambda { hash: h, param: p, .. } => {
                        *h == hash && self.lambdas_equivalent(*p, n.children[0], param, body)
                    }
                    _ => false,
                }
        })
    }

    /// Alpha-equivalence: two lambdas agree if substituting one's bound
    /// parameter for the other's produces identical bodies. A cheap
    /// pre-check on the cached hash already ran in the caller; this
    /// does the exact check that hash is only a heuristic for.
    fn lambdas_equivalent(&self, param_a: NodeId, body_a: Edge, param_b: NodeId, body_b: Edge) -> bool {
        if param_a == param_b {
            return body_a == body_b;
        }
        // structural walk treating param_a and param_b as equal
        fn walk(arena: &Arena, a: Edge, b: Edge, pa: NodeId, pb: NodeId) -> bool {
            if a.is_inverted() != b.is_inverted() {
                return false;
            }
            let (na, nb) = (a.id(), b.id());
            if na == nb {
                return true;
            }
            let (node_a, node_b) = (arena.get(na), arena.get(nb));
            if node_a.kind != node_b.kind || node_a.sort != node_b.sort {
                return false;
            }
            match node_a.kind {
                Kind::Param => (na == pa && nb == pb) || (na == nb),
                Kind::Const => matches!((&node_a.payload, &node_b.payload), (Payload::Const(x), Payload::Const(y)) if x == y),
                Kind::Lambda => match (&node_a.payload, &node_b.payload) {
                    (Payload::Lambda { param: ia, .. }, Payload::Lambda { param: ib, .. }) => {
                        walk(arena, node_a.children[0], node_b.children[0], *ia, *ib)
                    }
                    _ => false,
                },
                _ => {
                    for i in 0..node_a.arity as usize {
                        if !walk(arena, node_a.children[i], node_b.children[i], pa, pb) {
                            return false;
                        }
                    }
                    true
                }
            }
        }
        walk(&self.arena, body_a, body_b, param_a, param_b)
    }

    /// Explicit functional-array update node, used when
    /// `Options::fun_store_lambdas` is disabled. The index slot holds an
    /// `args` spine rather than a bare index edge, matching the shape
    /// `read`/`apply` expect: an `update` node's children are `A`, `args(i)`,
    /// `v`.
    pub fn update(&mut self, array: Edge, index: Edge, value: Edge) -> Edge {
        let index_args = self.args(&[index]);
        self.update_with_args(array, index_args, value)
    }

    /// Same as [`Context::update`] but takes an already-built `args` spine,
    /// so `rebuild` (substitution) doesn't double-wrap an index that is
    /// already in spine form.
    fn update_with_args(&mut self, array: Edge, index_args: Edge, value: Edge) -> Edge {
        let sort = self.sort_of(array);
        self.build_ternary(Kind::Update, sort, array, index_args, value)
    }

    /// `read(arr, i) = apply(arr, args(i))`, except when `arr`
    /// is itself a primitive `update` node: `apply` only knows how to invoke
    /// a `lambda` or an uninterpreted function, so a read through an
    /// `update` chain is expanded here to the same `cond(i==j, v, read(A,i))`
    /// shape the lambda encoding of `write` would have produced, one update
    /// link at a time.
    pub fn read(&mut self, array: Edge, index: Edge) -> Edge {
        let array = self.canonical(array);
        if self.arena.get(array.id()).kind == Kind::Update {
            let n = self.arena.get(array.id());
            let update_args = self.flatten_args(n.children[1]);
            let (inner, update_index, value) = (n.children[0], update_args[0], n.children[2]);
            let matches = self.bv_eq(update_index, index);
            let recursive = self.read(inner, index);
            return self.cond(matches, value, recursive);
        }
        let args_edge = self.args(&[index]);
        if self.arena.get(array.id()).kind == Kind::Lambda {
            // a write-as-lambda encoding seeds its static rho with exactly
            // this key (see `write`); a hit here short-circuits the
            // beta-reduction through the `cond` the lambda body would
            // otherwise need.
            let cached = match &self.arena.get(array.id()).payload {
                Payload::Lambda { static_rho, .. } => static_rho.iter().find(|(k, _)| *k == args_edge).map(|(_, v)| *v),
                _ => unreachable!("Lambda node without a Lambda payload"),
            };
            if let Some(value) = cached {
                self.bump_ref(value.id());
                return value;
            }
        }
        self.apply(array, args_edge)
    }

    /// Array write. With `fun_store_lambdas` on, or when any operand is
    /// already under a binder (a primitive `update` node can't close over a
    /// parameter the way a lambda can), encodes the write as a fresh
    /// parameter `p`, body `cond(p == index, value, read(array, p))`, and
    /// seeds the resulting lambda's static rho with `(args(index), value)` --
    /// the same key shape `read`'s `apply` path builds -- so the common case
    /// of reading straight back the written index is a cache hit instead of
    /// a beta-reduction through the conditional.
    pub fn write(&mut self, array: Edge, index: Edge, value: Edge) -> Edge {
        let under_binder = self.arena.get(array.id()).parameterized
            || self.arena.get(index.id()).parameterized
            || self.arena.get(value.id()).parameterized;
        if !self.options.fun_store_lambdas && !under_binder {
            return self.update(array, index, value);
        }
        let index_sort = self.sort_of(index);
        let p = self.mk_param(index_sort, None);
        let eq_p_index = self.bv_eq(p, index);
        let read_p = self.read(array, p);
        let body = self.cond(eq_p_index, value, read_p);
        let result = self.lambda(p, body);
        let key = self.args(&[index]);
        let already_seeded = match &self.arena.get(result.id()).payload {
            Payload::Lambda { static_rho, .. } => static_rho.iter().any(|(k, _)| *k == key),
            _ => unreachable!("Lambda node without a Lambda payload"),
        };
        if already_seeded {
            // `lambda()` hash-consed `result` to a pre-existing alpha
            // equivalent binder that already carries this key (hash-consing
            // makes `key` resolve to the same node either way); the fresh
            // `key`/`value` references this call would otherwise have handed
            // to the cache are unneeded.
            self.release(key);
        } else {
            // the rho cache holds its own reference to each entry,
            // independent of the one `key`/`value` already have via the
            // lambda body -- freed alongside the lambda's other payload in
            // `release_inner`/`convert_to_proxy`.
            self.bump_ref(key.id());
            self.bump_ref(value.id());
            if let Payload::Lambda { static_rho, .. } = &mut self.arena.get_mut(result.id()).payload {
                static_rho.push((key, value));
            }
        }
        result
    }

    // -- derived operators ----------------------------------------------------

    pub fn not(&self, a: Edge) -> Edge {
        !a
    }

    pub fn or(&mut self, a: Edge, b: Edge) -> Edge {
        let r = self.and(!a, !b);
        !r
    }

    pub fn nand(&mut self, a: Edge, b: Edge) -> Edge {
        !self.and(a, b)
    }

    pub fn nor(&mut self, a: Edge, b: Edge) -> Edge {
        !self.or(a, b)
    }

    pub fn xor(&mut self, a: Edge, b: Edge) -> Edge {
        let left = self.and(a, !b);
        let right = self.and(!a, b);
        self.or(left, right)
    }

    pub fn xnor(&mut self, a: Edge, b: Edge) -> Edge {
        !self.xor(a, b)
    }

    pub fn iff(&mut self, a: Edge, b: Edge) -> Edge {
        self.xnor(a, b)
    }

    pub fn implies(&mut self, a: Edge, b: Edge) -> Edge {
        self.or(!a, b)
    }

    pub fn ne(&mut self, a: Edge, b: Edge) -> Edge {
        let e = self.eq(a, b);
        !e
    }

    pub fn neg(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let one = self.one(width);
        let flipped = !a;
        self.add(flipped, one)
    }

    pub fn sub(&mut self, a: Edge, b: Edge) -> Edge {
        let nb = self.neg(b);
        self.add(a, nb)
    }

    pub fn inc(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let one = self.one(width);
        self.add(a, one)
    }

    pub fn dec(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let one = self.one(width);
        self.sub(a, one)
    }

    pub fn zext(&mut self, a: Edge, extra: u32) -> Edge {
        if extra == 0 {
            return self.copy(a);
        }
        let pad = self.zero(extra);
        self.concat(pad, a)
    }

    pub fn sext(&mut self, a: Edge, extra: u32) -> Edge {
        if extra == 0 {
            return self.copy(a);
        }
        let width = self.width_of(a);
        let sign = self.slice(a, width - 1, width - 1);
        let ones = self.ones(extra);
        let zeros = self.zero(extra);
        let pad = self.cond(sign, ones, zeros);
        self.concat(pad, a)
    }

    /// Flip the sign bit of both operands, turning a signed comparison into
    /// an unsigned one over the same bit pattern -- the standard
    /// two's-complement comparison trick.
    fn sign_flip_mask(&mut self, width: u32) -> Edge {
        if width == 1 {
            return self.one(1);
        }
        let top = self.one(1);
        let rest = self.zero(width - 1);
        self.concat(top, rest)
    }

    pub fn slt(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let mask = self.sign_flip_mask(width);
        let fa = self.xor(a, mask);
        let fb = self.xor(b, mask);
        self.ult(fa, fb)
    }

    pub fn sgt(&mut self, a: Edge, b: Edge) -> Edge {
        self.slt(b, a)
    }

    pub fn ulte(&mut self, a: Edge, b: Edge) -> Edge {
        let gt = self.ult(b, a);
        !gt
    }

    pub fn ugt(&mut self, a: Edge, b: Edge) -> Edge {
        self.ult(b, a)
    }

    pub fn ugte(&mut self, a: Edge, b: Edge) -> Edge {
        let lt = self.ult(a, b);
        !lt
    }

    pub fn slte(&mut self, a: Edge, b: Edge) -> Edge {
        let gt = self.slt(b, a);
        !gt
    }

    pub fn sgte(&mut self, a: Edge, b: Edge) -> Edge {
        let lt = self.slt(a, b);
        !lt
    }

    pub fn sra(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let sign = self.slice(a, width - 1, width - 1);
        let not_a = !a;
        let shifted = self.srl(not_a, b);
        let flipped = !shifted;
        let plain = self.srl(a, b);
        self.cond(sign, flipped, plain)
    }

    /// `width - b`, computed in the shift-amount's own (narrower) sort --
    /// matching `width` mod `2^shift_width` is exactly `width` truncated to
    /// that width, since the shiftee's width is required to be a power of
    /// two (`assert_shift_sorts`).
    fn shift_complement(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let shift_width = self.width_of(b);
        let width_const = self.mk_const(BitVector::from_u64(shift_width, width as u64));
        self.sub(width_const, b)
    }

    pub fn rol(&mut self, a: Edge, b: Edge) -> Edge {
        let complement = self.shift_complement(a, b);
        let left = self.sll(a, b);
        let right = self.srl(a, complement);
        self.or(left, right)
    }

    pub fn ror(&mut self, a: Edge, b: Edge) -> Edge {
        let complement = self.shift_complement(a, b);
        let right = self.srl(a, b);
        let left = self.sll(a, complement);
        self.or(left, right)
    }

    /// Double the width, perform the operation, and check whether truncating
    /// back down and re-extending reproduces the double-width result --
    /// avoids a width-specialized carry network while staying exact for
    /// every width.
    pub fn uaddo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let ea = self.zext(a, 1);
        let eb = self.zext(b, 1);
        let sum = self.add(ea, eb);
        self.slice(sum, width, width)
    }

    pub fn saddo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let ea = self.sext(a, 1);
        let eb = self.sext(b, 1);
        let sum = self.add(ea, eb);
        let low = self.slice(sum, width - 1, 0);
        let resext = self.sext(low, 1);
        self.ne(resext, sum)
    }

    pub fn usubo(&mut self, a: Edge, b: Edge) -> Edge {
        self.ult(a, b)
    }

    pub fn ssubo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let sign_a = self.slice(a, width - 1, width - 1);
        let sign_b = self.slice(b, width - 1, width - 1);
        let diff = self.sub(a, b);
        let sign_diff = self.slice(diff, width - 1, width - 1);
        let signs_differ = self.xor(sign_a, sign_b);
        let result_changed_sign = self.xor(sign_a, sign_diff);
        self.and(signs_differ, result_changed_sign)
    }

    pub fn umulo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let ea = self.zext(a, width);
        let eb = self.zext(b, width);
        let product = self.mul(ea, eb);
        let low = self.slice(product, width - 1, 0);
        let reext = self.zext(low, width);
        self.ne(reext, product)
    }

    pub fn smulo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let ea = self.sext(a, width);
        let eb = self.sext(b, width);
        let product = self.mul(ea, eb);
        let low = self.slice(product, width - 1, 0);
        let reext = self.sext(low, width);
        self.ne(reext, product)
    }

    /// Signed division overflows in exactly one case: `INT_MIN / -1`.
    pub fn sdivo(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let min_signed = self.mk_const(BitVector::from_i64(width, i64::MIN >> (64 - width)));
        let minus_one = self.mk_const(BitVector::from_i64(width, -1));
        let a_is_min = self.bv_eq(a, min_signed);
        let b_is_minus_one = self.bv_eq(b, minus_one);
        self.and(a_is_min, b_is_minus_one)
    }

    fn abs(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let sign = self.slice(a, width - 1, width - 1);
        let negated = self.neg(a);
        self.cond(sign, negated, a)
    }

    pub fn sdiv(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let sign_a = self.slice(a, width - 1, width - 1);
        let sign_b = self.slice(b, width - 1, width - 1);
        let abs_a = self.abs(a);
        let abs_b = self.abs(b);
        let quot = self.udiv(abs_a, abs_b);
        let neg_quot = self.neg(quot);
        let signs_differ = self.xor(sign_a, sign_b);
        self.cond(signs_differ, neg_quot, quot)
    }

    pub fn srem(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let sign_a = self.slice(a, width - 1, width - 1);
        let abs_a = self.abs(a);
        let abs_b = self.abs(b);
        let rem = self.urem(abs_a, abs_b);
        let neg_rem = self.neg(rem);
        self.cond(sign_a, neg_rem, rem)
    }

    pub fn smod(&mut self, a: Edge, b: Edge) -> Edge {
        let width = self.width_of(a);
        let r = self.srem(a, b);
        let zero = self.zero(width);
        let r_is_zero = self.bv_eq(r, zero);
        let sign_r = self.slice(r, width - 1, width - 1);
        let sign_b = self.slice(b, width - 1, width - 1);
        let signs_differ = self.xor(sign_r, sign_b);
        let adjusted = self.add(r, b);
        let needs_adjust = self.and(!r_is_zero, signs_differ);
        self.cond(needs_adjust, adjusted, r)
    }

    pub fn redor(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let zero = self.zero(width);
        self.ne(a, zero)
    }

    pub fn redand(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let ones = self.ones(width);
        self.bv_eq(a, ones)
    }

    pub fn redxor(&mut self, a: Edge) -> Edge {
        let width = self.width_of(a);
        let mut acc = self.slice(a, 0, 0);
        for i in 1..width {
            let bit = self.slice(a, i, i);
            acc = self.xor(acc, bit);
        }
        acc
    }

    // -- reference counting ----------------------------------------------

    pub fn copy(&mut self, e: Edge) -> Edge {
        self.bump_ref(e.id());
        e
    }

    pub fn ext_copy(&mut self, e: Edge) -> Edge {
        self.bump_ref(e.id());
        self.arena.get_mut(e.id()).ext_refs += 1;
        e
    }

    pub fn release(&mut self, e: Edge) {
        self.release_inner(e.id(), false);
    }

    pub fn ext_release(&mut self, e: Edge) {
        self.release_inner(e.id(), true);
    }

    /// Iterative, explicit-worklist release so a long linear chain doesn't
    /// blow the call stack.
    fn release_inner(&mut self, id: NodeId, is_ext: bool) {
        let mut worklist = vec![(id, is_ext)];
        while let Some((id, ext)) = worklist.pop() {
            let node = self.arena.get_mut(id);
            if ext {
                assert!(node.ext_refs > 0, "external release of {} with no external references", id);
                node.ext_refs -= 1;
            }
            assert!(node.refs > 0, "refcount underflow releasing node {}", id);
            node.refs -= 1;
            if node.refs > 0 {
                continue;
            }

            let hash = Context::rehash_node(&self.arena, id);
            let node = self.arena.get(id).clone();
            debug!("releasing node {} (kind {:?}, ext={})", id, node.kind, ext);
            match &node.kind {
                Kind::Var | Kind::Param => {}
                Kind::Uf => {
                    // the function-rho cache holds its own reference on
                    // every key/value pair it memoized (see `apply`); free
                    // those alongside the rest of this node's local payload.
                    if let Payload::Uf { rho } = &node.payload {
                        for &(k, v) in rho {
                            worklist.push((k.id(), false));
                            worklist.push((v.id(), false));
                        }
                    }
                }
                _ => self.table.remove(hash, id),
            }
            self.syms.forget(id);
            for slot in 0..node.arity as usize {
                let child = node.children[slot];
                if child.is_valid() {
                    parent::disconnect_child(&mut self.arena, id, slot as u8, child.id());
                    worklist.push((child.id(), false));
                }
            }
            if node.kind == Kind::Lambda {
                if let Payload::Lambda { param, static_rho, .. } = &node.payload {
                    let param = *param;
                    // clear the binding only if this lambda still owns it --
                    // a param is never reused by a
                    // second `lambda()` call while its first binder is alive,
                    // but the check keeps the invariant explicit rather than
                    // assumed.
                    if let Some(p) = self.arena.try_get(param) {
                        if matches!(p.payload, Payload::Param { binding: Some(b) } if b == id) {
                            self.arena.get_mut(param).payload = Payload::Param { binding: None };
                        }
                    }
                    // the static-rho cache holds its own reference on every
                    // seeded (args, value) pair -- see `write`.
                    for &(k, v) in static_rho {
                        worklist.push((k.id(), false));
                        worklist.push((v.id(), false));
                    }
                    worklist.push((param, false));
                }
            }
            self.arena.get_mut(id).lifecycle = Lifecycle::Deallocated;
            self.arena.free(id);
        }
    }

    // -- proxy conversion -------------------------------------------------

    /// Converts `old` in place into a forwarding proxy pointing at `new`,
    /// preserving `old`'s id and any external handles to it -- used when a
    /// rewrite produces a different node for an id that already escaped to
    /// a caller.
    pub fn convert_to_proxy(&mut self, old: NodeId, new: Edge) {
        assert_ne!(old, new.id(), "a node cannot proxy to itself");
        warn!("converting node {} to a proxy for {}", old, new.id());
        let hash = Context::rehash_node(&self.arena, old);
        let old_node = self.arena.get(old).clone();
        match &old_node.kind {
            Kind::Var | Kind::Param | Kind::Proxy => {}
            Kind::Uf => {
                // free the function-rho cache's own references, same as an
                // ordinary release (see `release_inner`).
                if let Payload::Uf { rho } = &old_node.payload {
                    for &(k, v) in rho {
                        self.release_inner(k.id(), false);
                        self.release_inner(v.id(), false);
                    }
                }
            }
            _ => self.table.remove(hash, old),
        }
        for slot in 0..old_node.arity as usize {
            let child = old_node.children[slot];
            if child.is_valid() {
                parent::disconnect_child(&mut self.arena, old, slot as u8, child.id());
                // children are released -- this may itself cascade into a
                // full deallocation of the child, same as an ordinary
                // release.
                self.release_inner(child.id(), false);
            }
        }
        if old_node.kind == Kind::Lambda {
            if let Payload::Lambda { param, static_rho, .. } = &old_node.payload {
                let param = *param;
                if let Some(p) = self.arena.try_get(param) {
                    if matches!(p.payload, Payload::Param { binding: Some(b) } if b == old) {
                        self.arena.get_mut(param).payload = Payload::Param { binding: None };
                    }
                }
                // free the static-rho cache's own references, same as an
                // ordinary release (see `release_inner`).
                for &(k, v) in static_rho {
                    self.release_inner(k.id(), false);
                    self.release_inner(v.id(), false);
                }
                self.release_inner(param, false);
            }
        }
        self.bump_ref(new.id());
        let node = self.arena.get_mut(old);
        node.kind = Kind::Proxy;
        node.children = [Edge::INVALID; 3];
        node.payload = Payload::None; // erased
        node.simplified = Some(new);
        node.lifecycle = Lifecycle::NotUnique;
    }

    // -- teardown -------------------------------------------------------------

    /// Walks every surviving node and asserts no external handle is still
    /// outstanding. Consumes the context since nothing is safe to do with it
    /// afterward.
    pub fn teardown(mut self) {
        let ids: Vec<NodeId> = self.arena.iter_ids().collect();
        for id in ids {
            let ext_refs = self.arena.get(id).ext_refs;
            assert_eq!(ext_refs, 0, "node {} torn down with outstanding external references", id);
        }
        for id in self.arena.iter_ids().collect::<Vec<_>>() {
            while self.arena.try_get(id).map(|n| n.refs > 0).unwrap_or(false) {
                self.release_inner(id, false);
            }
        }
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_identical_trees_share_a_node() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let x = ctx.mk_var(sort, Some("x"));
        let y = ctx.mk_var(sort, Some("y"));
        let a = ctx.and(x, y);
        let b = ctx.and(x, y);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn commutative_sort_unifies_either_operand_order() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let x = ctx.mk_var(sort, Some("x"));
        let y = ctx.mk_var(sort, Some("y"));
        let a = ctx.and(x, y);
        let b = ctx.and(y, x);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn not_is_involutive_through_context() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(1);
        let x = ctx.mk_var(sort, Some("x"));
        assert_eq!(ctx.not(ctx.not(x)), x);
    }

    #[test]
    fn and_of_self_collapses_to_self() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(4);
        let x = ctx.mk_var(sort, None);
        let a = ctx.and(x, x);
        assert_eq!(a, x);
    }

    #[test]
    fn cond_with_identical_branches_collapses() {
        let mut ctx = Context::new();
        let bsort = ctx.sorts().bool_sort();
        let sort = ctx.sorts().bitvec(4);
        let c = ctx.mk_var(bsort, None);
        let t = ctx.mk_var(sort, None);
        let e = ctx.cond(c, t, t);
        assert_eq!(e, t);
    }

    #[test]
    fn copy_release_is_balanced() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let x = ctx.mk_var(sort, None);
        let before = ctx.live_node_count();
        for _ in 0..1000 {
            let c = ctx.copy(x);
            ctx.release(c);
        }
        assert_eq!(ctx.live_node_count(), before);
    }

    #[test]
    fn lambda_write_then_read_back_same_index() {
        let mut ctx = Context::new();
        let elem = ctx.sorts().bitvec(8);
        let idx_sort = ctx.sorts().bitvec(4);
        let fun_sort = ctx.sorts().fun(vec![idx_sort], elem);
        let array = ctx.mk_uf(fun_sort, None);
        let index = ctx.mk_const(BitVector::from_u64(4, 3));
        let value = ctx.mk_const(BitVector::from_u64(8, 42));
        let written = ctx.write(array, index, value);
        let read_back = ctx.read(written, index);
        assert_eq!(read_back, value);
    }

    #[test]
    fn alpha_equivalent_lambdas_are_shared() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let p1 = ctx.mk_param(sort, None);
        let body1 = ctx.add(p1, p1);
        let l1 = ctx.lambda(p1, body1);

        let p2 = ctx.mk_param(sort, None);
        let body2 = ctx.add(p2, p2);
        let l2 = ctx.lambda(p2, body2);

        assert_eq!(l1.id(), l2.id());
    }

    #[test]
    fn apply_beta_reduces_identity_lambda() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let p = ctx.mk_param(sort, None);
        let identity = ctx.lambda(p, p);
        let arg = ctx.mk_var(sort, None);
        let args_edge = ctx.args(&[arg]);
        let result = ctx.apply(identity, args_edge);
        assert_eq!(result, arg);
    }

    #[test]
    fn proxy_conversion_preserves_id_and_is_chased() {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let x = ctx.mk_var(sort, None);
        let y = ctx.mk_var(sort, None);
        let old = ctx.add(x, y);
        let old_id = old.id();
        let replacement = ctx.mk_var(sort, None);

        ctx.convert_to_proxy(old_id, replacement);

        assert!(ctx.arena.get(old_id).is_proxy());
        assert_eq!(ctx.canonical(old), replacement);
        // an inverted handle to the proxy still chases to the (inverted)
        // replacement.
        assert_eq!(ctx.canonical(!old), !replacement);
    }

    #[test]
    fn write_without_store_lambdas_builds_update_node() {
        let mut ctx = Context::with_options(Options {
            sort_commutative_children: true,
            rewrite_level: 1,
            fun_store_lambdas: false,
        });
        let elem = ctx.sorts().bitvec(8);
        let idx_sort = ctx.sorts().bitvec(8);
        let fun_sort = ctx.sorts().fun(vec![idx_sort], elem);
        let array = ctx.mk_uf(fun_sort, None);
        let index = ctx.mk_const(BitVector::from_u64(8, 0x01));
        let value = ctx.mk_const(BitVector::from_u64(8, 0xff));
        let written = ctx.write(array, index, value);
        assert_eq!(ctx.arena.get(written.id()).kind, Kind::Update);
        assert_eq!(ctx.arena.get(written.id()).children[0], array);
        assert_eq!(ctx.arena.get(written.id()).children[2], value);

        let read_back = ctx.read(written, index);
        assert_eq!(read_back, value);
    }
}
