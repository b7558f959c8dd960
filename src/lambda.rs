//! Lambda/parameter machinery.
//!
//! Two lambdas are structurally equal when they bind parameters of the same
//! sort and their bodies are equal under a substitution that maps one's
//! bound parameter to the other's (alpha-equivalence). Hashing a lambda
//! therefore must not depend on which concrete parameter node is bound —
//! this module computes that alpha-invariant hash. The actual
//! alpha-equivalence *equality* test additionally needs to rebuild
//! candidate subterms through the unique table, which requires the full
//! constructor path, so it lives on `Context` (see `context.rs`,
//! `lambdas_equivalent`); this module only owns the pure hashing walk.

use std::collections::HashSet;

use crate::arena::Arena;
use crate::edge::NodeId;
use crate::node::{Kind, Payload};

fn mix(acc: &mut u64, x: u64) {
    // a cheap, order-sensitive mixing step; good enough for a hash-cons key,
    // not a cryptographic hash.
    *acc = acc.wrapping_mul(0x100000001b3).wrapping_add(x);
}

fn kind_tag(k: Kind) -> u64 {
    k as u64 + 1
}

/// Alpha-invariant structural hash of `body`, treating `bound` as the
/// parameter being bound (and thus excluded from the hash) and collecting
/// every other parameter reachable from `body` as "free".
pub fn structural_hash(arena: &Arena, bound: NodeId, body: crate::edge::Edge) -> (u64, HashSet<NodeId>) {
    let mut seen = HashSet::new();
    let mut free_params = HashSet::new();
    let mut acc: u64 = 0xcbf29ce484222325; // FNV offset basis, arbitrary seed
    walk(arena, body.id(), bound, &mut seen, &mut free_params, &mut acc);
    mix(&mut acc, body.is_inverted() as u64);
    (acc, free_params)
}

fn walk(
    arena: &Arena,
    n: NodeId,
    bound: NodeId,
    seen: &mut HashSet<NodeId>,
    free_params: &mut HashSet<NodeId>,
    acc: &mut u64,
) {
    if !seen.insert(n) {
        return;
    }
    let node = arena.get(n);
    match node.kind {
        Kind::Param => {
            if n != bound {
                free_params.insert(n);
            }
            mix(acc, kind_tag(Kind::Param));
        }
        Kind::Lambda => {
            // a nested lambda contributes its own cached hash plus its kind
            // and its bound parameter's kind -- never its body again, which
            // is exactly what makes hash caching pay off.
            if let Payload::Lambda { hash, param, .. } = &node.payload {
                mix(acc, *hash);
                mix(acc, kind_tag(Kind::Lambda));
                mix(acc, kind_tag(arena.get(*param).kind));
            }
        }
        _ if node.parameterized => {
            mix(acc, kind_tag(node.kind));
            for i in 0..node.arity as usize {
                walk(arena, node.children[i].id(), bound, seen, free_params, acc);
            }
        }
        _ => {
            // non-parameterized reachable node: contributes only its id,
            // since nothing below it can mention the bound parameter.
            mix(acc, n.index() as u64 + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::Node;
    use crate::sort::SortId;

    fn push(arena: &mut Arena, kind: Kind, children: [Edge; 3], payload: Payload) -> NodeId {
        arena.alloc(|id| {
            let mut n = Node::new(id, kind, SortId::default(), children, payload);
            n.parameterized = kind == Kind::Param
                || children.iter().any(|c| {
                    c.is_valid() && arena_peek_parameterized(arena, c.id())
                });
            n
        })
    }

    // helper to peek at a not-yet-inserted arena during construction in tests only
    fn arena_peek_parameterized(arena: &Arena, id: NodeId) -> bool {
        arena.try_get(id).map(|n| n.parameterized).unwrap_or(false)
    }

    #[test]
    fn same_shape_different_param_hashes_equal() {
        let mut a1 = Arena::new();
        let p1 = push(&mut a1, Kind::Param, [Edge::INVALID; 3], Payload::None);
        let body1 = push(
            &mut a1,
            Kind::And,
            [Edge::raw(p1), Edge::raw(p1), Edge::INVALID],
            Payload::None,
        );
        let (h1, free1) = structural_hash(&a1, p1, Edge::raw(body1));

        let mut a2 = Arena::new();
        let p2 = push(&mut a2, Kind::Param, [Edge::INVALID; 3], Payload::None);
        let body2 = push(
            &mut a2,
            Kind::And,
            [Edge::raw(p2), Edge::raw(p2), Edge::INVALID],
            Payload::None,
        );
        let (h2, free2) = structural_hash(&a2, p2, Edge::raw(body2));

        assert_eq!(h1, h2, "alpha-equivalent bodies must hash equal");
        assert!(free1.is_empty());
        assert!(free2.is_empty());
    }

    #[test]
    fn free_parameter_is_collected() {
        let mut arena = Arena::new();
        let bound = push(&mut arena, Kind::Param, [Edge::INVALID; 3], Payload::None);
        let free = push(&mut arena, Kind::Param, [Edge::INVALID; 3], Payload::None);
        let body = push(
            &mut arena,
            Kind::And,
            [Edge::raw(bound), Edge::raw(free), Edge::INVALID],
            Payload::None,
        );
        let (_h, free_params) = structural_hash(&arena, bound, Edge::raw(body));
        assert_eq!(free_params, HashSet::from([free]));
    }
}
