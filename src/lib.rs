//! A crate for working with bit-precise expression DAGs: hash-consed,
//! reference-counted bit-vector and array terms for an SMT solver's
//! bit-blasting front end.
//!
//! [`Context`] owns the whole graph. Everything else in this crate is a
//! table, index, or helper that `Context` composes -- there is no
//! process-wide mutable state, and no two contexts ever share a node.

#![allow(clippy::many_single_char_names)]

#[macro_use] extern crate log;

/// Handles into the expression DAG (node ids plus the inversion bit).
pub mod edge;
/// Node record, kind tags, and kind-specific payload.
pub mod node;
/// Node arena and id table.
pub mod arena;
/// Hash-cons "unique table".
pub mod unique_table;
/// Per-child-slot parent-list splicing.
pub mod parent;
/// Lambda/parameter alpha-equivalence hashing.
pub mod lambda;
/// Opaque sort (type) allocator.
pub mod sort;
/// Opaque bit-vector constant arithmetic.
pub mod bits;
/// The rewriter callout interface.
pub mod rewrite;
/// Symbol and input-id side tables.
pub mod symtab;
/// The expression-DAG façade: `Context` and its constructors.
pub mod context;

pub use bits::BitVector;
pub use context::{Context, Options};
pub use edge::{Edge, NodeId};
pub use node::Kind;
pub use sort::{SortDesc, SortId};
