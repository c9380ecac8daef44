use iai_callgrind::{black_box, main};
use nonzero::nonzero as nz;

use tripcount::expr::{AffineContext, AffineExpr};
use tripcount::loops::{AffineBound, AffineMap, ForLoop, OperandId};
use tripcount::tripcount::{largest_divisor_of_trip_count, trip_count};

/// Builds `(d0 * 4 + s0 * 8 + 12 - d0 * 2) floordiv 2 + ((d1 + 3) mod 4) * 3`.
fn build_expr(ctx: &mut AffineContext) -> AffineExpr {
    let d0 = ctx.dim(0);
    let d1 = ctx.dim(1);
    let s0 = ctx.symbol(0);
    let [two, three, four, eight, twelve] = [2, 3, 4, 8, 12].map(|v| ctx.constant(v));
    let a = ctx.mul(d0, four);
    let b = ctx.mul(s0, eight);
    let c = ctx.mul(d0, two);
    let sum = ctx.add(a, b);
    let sum = ctx.add(sum, twelve);
    let sum = ctx.sub(sum, c);
    let halved = ctx.floor_div(sum, two);
    let shifted = ctx.add(d1, three);
    let wrapped = ctx.modulo(shifted, four);
    let scaled = ctx.mul(wrapped, three);
    ctx.add(halved, scaled)
}

#[inline(never)]
fn simplify_mixed_expr() {
    let mut ctx = AffineContext::new();
    let e = build_expr(&mut ctx);
    black_box(ctx.simplify(black_box(e)));
}

#[inline(never)]
fn symbolic_trip_count() {
    let mut ctx = AffineContext::new();
    let d0 = ctx.dim(0);
    let s0 = ctx.symbol(0);
    let eight = ctx.constant(8);
    let scaled = ctx.mul(s0, eight);
    let ub_expr = ctx.add(d0, scaled);
    let operands = [OperandId(0), OperandId(1)];
    let lb = AffineBound::new(AffineMap::new(1, 1, [d0]), operands);
    let ub = AffineBound::new(AffineMap::new(1, 1, [ub_expr]), operands);
    let for_loop = ForLoop::new(lb, ub, nz!(4i64));
    black_box(trip_count(&mut ctx, black_box(&for_loop)));
    black_box(largest_divisor_of_trip_count(&mut ctx, &for_loop));
}

main!(
    callgrind_args = "--simulate-wb=no", "--simulate-hwpref=yes",
        "--I1=32768,8,64", "--D1=32768,8,64", "--LL=8388608,16,64";
    functions = simplify_mixed_expr, symbolic_trip_count
);
