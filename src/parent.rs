//! Parent-list splicing.
//!
//! Each child edge contributes one entry to a doubly linked list anchored at
//! the child's `first_parent`/`last_parent`; the list threads through the
//! *parent's* own per-slot `prev`/`next` pointers (`Node::child_links`),
//! since the parent's node record is the one this node-as-a-child doesn't
//! otherwise need to touch. Most additions prepend; `apply` parents append
//! so that a walk discovers the function before its arguments.

use crate::arena::Arena;
use crate::edge::NodeId;
use crate::node::{ParentEntry, ParentLink};

/// Add `parent`'s slot `slot` (which holds an edge to `child`) to `child`'s
/// parent list. Handles all four splice cases (empty, head, tail, interior)
/// uniformly via the `Option` links.
pub fn connect_child(arena: &mut Arena, parent: NodeId, slot: u8, child: NodeId, append: bool) {
    let entry = ParentEntry { parent, slot };
    if append {
        let old_last = arena.get(child).last_parent;
        arena.get_mut(parent).child_links[slot as usize] = ParentLink {
            prev: old_last,
            next: None,
        };
        match old_last {
            Some(last) => arena.get_mut(last.parent).child_links[last.slot as usize].next = Some(entry),
            None => arena.get_mut(child).first_parent = Some(entry),
        }
        arena.get_mut(child).last_parent = Some(entry);
    } else {
        let old_first = arena.get(child).first_parent;
        arena.get_mut(parent).child_links[slot as usize] = ParentLink {
            prev: None,
            next: old_first,
        };
        match old_first {
            Some(first) => arena.get_mut(first.parent).child_links[first.slot as usize].prev = Some(entry),
            None => arena.get_mut(child).last_parent = Some(entry),
        }
        arena.get_mut(child).first_parent = Some(entry);
    }
    arena.get_mut(child).parent_count += 1;
}

/// Remove `parent`'s slot `slot` from `child`'s parent list. `parent` and
/// `child` must still be the live endpoints of that edge; callers splice
/// before freeing either side.
pub fn disconnect_child(arena: &mut Arena, parent: NodeId, slot: u8, child: NodeId) {
    let link = arena.get(parent).child_links[slot as usize];
    match link.prev {
        Some(p) => arena.get_mut(p.parent).child_links[p.slot as usize].next = link.next,
        None => arena.get_mut(child).first_parent = link.next,
    }
    match link.next {
        Some(n) => arena.get_mut(n.parent).child_links[n.slot as usize].prev = link.prev,
        None => arena.get_mut(child).last_parent = link.prev,
    }
    arena.get_mut(parent).child_links[slot as usize] = ParentLink::default();
    arena.get_mut(child).parent_count -= 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::{Kind, Payload};
    use crate::sort::SortId;

    fn dummy(arena: &mut Arena) -> NodeId {
        arena.alloc(|id| crate::node::Node::new(id, Kind::Var, SortId::default(), [Edge::INVALID; 3], Payload::None))
    }

    #[test]
    fn prepend_then_append_orders_correctly() {
        let mut arena = Arena::new();
        let child = dummy(&mut arena);
        let p1 = dummy(&mut arena);
        let p2 = dummy(&mut arena);
        let p3 = dummy(&mut arena);

        connect_child(&mut arena, p1, 0, child, false); // [p1]
        connect_child(&mut arena, p2, 0, child, false); // [p2, p1]
        connect_child(&mut arena, p3, 0, child, true); // [p2, p1, p3]

        assert_eq!(arena.get(child).parent_count, 3);
        assert_eq!(arena.get(child).first_parent.unwrap().parent, p2);
        assert_eq!(arena.get(child).last_parent.unwrap().parent, p3);

        disconnect_child(&mut arena, p1, 0, child); // interior removal: [p2, p3]
        assert_eq!(arena.get(child).parent_count, 2);
        let first = arena.get(child).first_parent.unwrap();
        assert_eq!(first.parent, p2);
        let p2_next = arena.get(p2).child_links[0].next.unwrap();
        assert_eq!(p2_next.parent, p3);

        disconnect_child(&mut arena, p2, 0, child); // head removal: [p3]
        assert_eq!(arena.get(child).first_parent.unwrap().parent, p3);
        disconnect_child(&mut arena, p3, 0, child); // tail/only removal: []
        assert_eq!(arena.get(child).parent_count, 0);
        assert!(arena.get(child).first_parent.is_none());
        assert!(arena.get(child).last_parent.is_none());
    }
}
