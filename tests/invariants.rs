//! Integration coverage for the hash-consing and reference-counting
//! invariants, exercised only through the public `Context` API (the unit
//! tests colocated with each module already cover the internal plumbing --
//! parent-list splicing, unique-table growth, lambda hashing -- in
//! isolation).

use smt_dag::{BitVector, Context, Options};

/// A balanced sequence of constructions and releases leaves no live node
/// behind and no outstanding external reference.
#[test]
fn balanced_construction_and_teardown_leaves_nothing_live() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let x = ctx.mk_var(sort, Some("x"));
    let y = ctx.mk_var(sort, Some("y"));
    let handle = ctx.ext_copy(x);
    let sum = ctx.add(handle, y);
    let sum_handle = ctx.ext_copy(sum);
    ctx.ext_release(sum_handle);
    ctx.release(sum);
    ctx.ext_release(handle);
    ctx.release(y);
    assert_eq!(ctx.live_node_count(), 0);
    ctx.teardown(); // must not panic: no outstanding ext_refs
}

/// Two independently constructed but structurally identical trees collapse
/// to the same node -- exercised over a deeper expression than the
/// single-operator unit test in context.rs.
#[test]
fn deep_structurally_identical_trees_share_every_node() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let x = ctx.mk_var(sort, Some("x"));
    let y = ctx.mk_var(sort, Some("y"));
    let z = ctx.mk_var(sort, Some("z"));

    let build = |ctx: &mut Context| {
        let a = ctx.add(x, y);
        let b = ctx.mul(a, z);
        ctx.ult(b, x)
    };
    let left = build(&mut ctx);
    let right = build(&mut ctx);
    assert_eq!(left, right);
}

/// `not` is its own inverse at value equality, never allocating a node --
/// holds at every width.
#[test]
fn not_is_involutive_for_every_width() {
    let mut ctx = Context::new();
    for width in [1, 4, 8, 32] {
        let sort = ctx.sorts().bitvec(width);
        let x = ctx.mk_var(sort, None);
        let before = ctx.live_node_count();
        assert_eq!(ctx.not(ctx.not(x)), x);
        assert_eq!(ctx.live_node_count(), before, "not() must not allocate");
    }
}

/// Constant normalization: `const(bv)` is idempotent, and
/// `const(bv.complement())` is the same node as `!const(bv)`.
#[test]
fn constant_complement_matches_inverted_edge() {
    let mut ctx = Context::new();
    let bv = BitVector::from_u64(8, 0b0110_0101);
    let a = ctx.mk_const(bv.clone());
    let b = ctx.mk_const(bv.clone());
    assert_eq!(a, b, "const() must be idempotent");

    let complement = ctx.mk_const(bv.complement());
    assert_eq!(complement, !a);
}

/// `write` with `fun_store_lambdas=false` returns a primitive `update` node
/// rather than a lambda encoding.
#[test]
fn write_without_store_lambdas_uses_update_node() {
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
    // an `update` node, unlike the lambda encoding, does not grow the live
    // node count by more than the three operands it closes over plus itself.
    let before = ctx.live_node_count();
    let _again = ctx.write(array, index, value);
    assert_eq!(
        ctx.live_node_count(),
        before,
        "identical update() calls must hash-cons to the same node"
    );
}

/// With the rewriter disabled, `sub(x, x)` expands to
/// `add(x, add(not x, 1))`, reaching exactly four primitive nodes (`x`, the
/// constant `1`, and the two `add` nodes) with one external reference.
#[test]
fn sub_of_self_at_rewrite_level_zero_builds_expected_shape() {
    let mut ctx = Context::with_options(Options {
        sort_commutative_children: true,
        rewrite_level: 0,
        fun_store_lambdas: false,
    });
    let sort = ctx.sorts().bitvec(4);
    let x = ctx.mk_var(sort, None);
    let before = ctx.live_node_count();
    let diff = ctx.sub(x, x);
    let result = ctx.ext_copy(diff);
    let after = ctx.live_node_count();
    // x, one-constant, inner add, outer add: three new nodes beyond x itself.
    assert_eq!(after - before, 3);
    ctx.ext_release(result);
}

/// `cond(c, t, t)` collapses to `t` under the rewriter.
#[test]
fn cond_with_equal_branches_is_rewritten_to_the_branch() {
    let mut ctx = Context::new();
    let bsort = ctx.sorts().bool_sort();
    let sort = ctx.sorts().bitvec(8);
    let c = ctx.mk_var(bsort, None);
    let t = ctx.mk_var(sort, None);
    assert_eq!(ctx.cond(c, t, t), t);
}

/// Applying an identity lambda to an argument reduces straight to the
/// argument via the beta path baked into `apply`, with no uninterpreted
/// `Apply` node left behind.
#[test]
fn apply_of_identity_lambda_reduces_to_argument() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let p = ctx.mk_param(sort, None);
    let identity = ctx.lambda(p, p);
    let arg = ctx.mk_var(sort, None);
    let args_edge = ctx.args(&[arg]);
    let result = ctx.apply(identity, args_edge);
    assert_eq!(result, arg);
}

/// A long sequence of paired copy/release calls is a no-op on the live node
/// population and leaves the node's refcount where it started -- scaled
/// down from a much longer soak run so the test suite stays fast, which is
/// representative since the releaser's cost is per-call, not amortized.
#[test]
fn many_paired_copy_release_cycles_are_a_no_op() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(16);
    let x = ctx.mk_var(sort, None);
    let before = ctx.live_node_count();
    for _ in 0..50_000 {
        let c = ctx.copy(x);
        ctx.release(c);
    }
    assert_eq!(ctx.live_node_count(), before);
}

/// Releasing a long `add` chain must not overflow the call stack -- the
/// releaser walks an explicit worklist.
#[test]
fn releasing_a_deep_chain_does_not_recurse_on_the_stack() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let mut acc = ctx.mk_var(sort, None);
    for _ in 0..20_000 {
        let one = ctx.one(8);
        let next = ctx.add(acc, one);
        // `add` takes its own references on `acc` and `one`; the chain no
        // longer needs to hold its own handle to either once `next` exists.
        ctx.release(acc);
        ctx.release(one);
        acc = next;
    }
    let handle = ctx.ext_copy(acc);
    ctx.ext_release(handle);
    ctx.release(acc);
    assert_eq!(ctx.live_node_count(), 0);
}

/// Shifts require the shift-amount width to equal `log2` of a power-of-two
/// shiftee width (spec.md §6); an 8-bit shiftee takes a 3-bit amount.
#[test]
fn shift_amount_sort_is_log2_of_shiftee_width() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let amount_sort = ctx.sorts().bitvec(3);
    let x = ctx.mk_var(sort, None);
    let amount = ctx.mk_var(amount_sort, None);
    let left = ctx.sll(x, amount);
    let right = ctx.srl(x, amount);
    assert_ne!(left, right);
    // repeating either call hits the unique table rather than allocating twice.
    assert_eq!(ctx.sll(x, amount), left);
}

#[test]
#[should_panic(expected = "shift amount width")]
fn shift_with_mismatched_amount_width_panics() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let wrong_amount_sort = ctx.sorts().bitvec(4);
    let x = ctx.mk_var(sort, None);
    let amount = ctx.mk_var(wrong_amount_sort, None);
    ctx.sll(x, amount);
}

/// `rol`/`ror` build and release cleanly at a non-trivial width, and a
/// rotate is its own operand's sort (not the shift-amount's).
#[test]
fn rotate_left_and_right_build_without_panicking() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let amount_sort = ctx.sorts().bitvec(3);
    let x = ctx.mk_var(sort, None);
    let amount = ctx.mk_var(amount_sort, None);
    let before = ctx.live_node_count();
    let rotated = ctx.rol(x, amount);
    let handle = ctx.ext_copy(rotated);
    ctx.ext_release(handle);
    ctx.release(rotated);
    assert_eq!(ctx.live_node_count(), before);
}

/// `smod` combines a comparison-derived 1-bit predicate (`bv_eq`) with a
/// slice-derived 1-bit sign bit in the same `and`; both must resolve to the
/// same 1-bit sort for that `and` to type-check.
#[test]
fn smod_builds_without_sort_mismatch() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let a = ctx.mk_var(sort, None);
    let b = ctx.mk_var(sort, None);
    let before = ctx.live_node_count();
    let result = ctx.smod(a, b);
    let handle = ctx.ext_copy(result);
    ctx.ext_release(handle);
    ctx.release(result);
    assert_eq!(ctx.live_node_count(), before);
}

#[test]
#[should_panic(expected = "branch sort mismatch")]
fn cond_with_mismatched_branch_sorts_panics() {
    let mut ctx = Context::new();
    let bsort = ctx.sorts().bool_sort();
    let wide = ctx.sorts().bitvec(8);
    let narrow = ctx.sorts().bitvec(4);
    let c = ctx.mk_var(bsort, None);
    let t = ctx.mk_var(wide, None);
    let e = ctx.mk_var(narrow, None);
    ctx.cond(c, t, e);
}

#[test]
#[should_panic(expected = "argument sort does not match")]
fn apply_with_mismatched_argument_sort_panics() {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let wrong_sort = ctx.sorts().bitvec(4);
    let p = ctx.mk_param(sort, None);
    let identity = ctx.lambda(p, p);
    let arg = ctx.mk_var(wrong_sort, None);
    let args_edge = ctx.args(&[arg]);
    ctx.apply(identity, args_edge);
}

/// A repeated `apply` against the same `Uf` and arguments must hit the
/// function-rho cache on the second call rather than allocating a fresh
/// `Apply` node -- and releasing the handle from the first call must not
/// leave the cache holding a dangling edge for the second call to trip over.
#[test]
fn repeated_apply_hits_rho_cache_after_releasing_the_prior_result() {
    use simplelog::*;
    TermLogger::init(LevelFilter::Trace, Config::default()).unwrap();

    let mut ctx = Context::new();
    let elem = ctx.sorts().bitvec(8);
    let idx_sort = ctx.sorts().bitvec(8);
    let fun_sort = ctx.sorts().fun(vec![idx_sort], elem);
    let f = ctx.mk_uf(fun_sort, None);
    let arg = ctx.mk_var(idx_sort, None);
    let args_edge = ctx.args(&[arg]);

    let first = ctx.apply(f, args_edge);
    let handle = ctx.ext_copy(first);
    ctx.ext_release(handle);
    ctx.release(first);

    // second call must reuse the cached result, not dereference a freed node.
    let args_edge = ctx.args(&[arg]);
    let second = ctx.apply(f, args_edge);
    assert_eq!(first, second);
    ctx.release(second);
}
