//! Throughput of the hash-cons path: construct/release cycles over a small
//! expression shape, and growth of the unique table under distinct terms.

fn main() {
    divan::main();
}

use smt_dag::{BitVector, Context};

#[divan::bench]
fn and_tree_depth_8(bencher: divan::Bencher) {
    bencher.bench(|| {
        let mut ctx = Context::new();
        let sort = ctx.sorts().bitvec(8);
        let mut vars = Vec::with_capacity(9);
        for _ in 0..9 {
            vars.push(ctx.mk_var(sort, None));
        }
        let mut acc = vars[0];
        for &v in &vars[1..] {
            acc = ctx.and(acc, v);
        }
        acc
    });
}

#[divan::bench]
fn repeated_construction_hits_unique_table(bencher: divan::Bencher) {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let x = ctx.mk_var(sort, None);
    let y = ctx.mk_var(sort, None);
    bencher.bench_local(|| {
        let e = ctx.and(x, y);
        ctx.release(e);
    });
}

#[divan::bench]
fn copy_release_is_o1(bencher: divan::Bencher) {
    let mut ctx = Context::new();
    let sort = ctx.sorts().bitvec(8);
    let x = ctx.mk_var(sort, None);
    bencher.bench_local(|| {
        let c = ctx.copy(x);
        ctx.release(c);
    });
}

#[divan::bench(args = [4, 8, 16])]
fn array_write_then_read(bencher: divan::Bencher, width: u32) {
    bencher.bench(|| {
        let mut ctx = Context::new();
        let elem = ctx.sorts().bitvec(width);
        let idx_sort = ctx.sorts().bitvec(4);
        let fun_sort = ctx.sorts().fun(vec![idx_sort], elem);
        let array = ctx.mk_uf(fun_sort, None);
        let index = ctx.mk_const(BitVector::from_u64(4, 3));
        let value = ctx.mk_const(BitVector::from_u64(width, 42));
        let written = ctx.write(array, index, value);
        ctx.read(written, index)
    });
}
