//! Trip counts of counted loops with affine bounds.
//!
//! The trip count is computed as an [AffineExpr] so that it can be symbolic when the bounds are
//! not literals. Two scalar queries are derived from it: [constant_trip_count], for loops whose
//! count folds to a literal, and [largest_divisor_of_trip_count], which is what unrolling and
//! vectorization need when the exact count is unknown.

use crate::expr::{AffineContext, AffineExpr};
use crate::loops::ForLoop;
use crate::simplify::UNBOUNDED_DIVISOR;
use log::debug;

/// Returns the trip count of `for_loop` as a simplified [AffineExpr], or `None` if it cannot be
/// expressed.
///
/// When the span `upper - lower + 1` folds to a constant, the result is a constant. Otherwise
/// the result is `span ceildiv |step|` over the bounds' shared operands.
///
/// The bounds are unanalyzable if either has more than one result, if their maps take
/// different numbers of dimensions or symbols, or if they are applied to different operands.
pub fn trip_count(ctx: &mut AffineContext, for_loop: &ForLoop) -> Option<AffineExpr> {
    let step = for_loop.step().get();

    let loop_span = if let (Some(lb), Some(ub)) = (
        for_loop.constant_lower_bound(ctx),
        for_loop.constant_upper_bound(ctx),
    ) {
        let Some(span) = ub.checked_sub(lb).and_then(|d| d.checked_add(1)) else {
            debug!("Span of loop from {lb} to {ub} overflows i64");
            return None;
        };
        span
    } else {
        let span_expr = span_expr(ctx, for_loop)?;
        match ctx.as_constant(span_expr) {
            Some(span) => span,
            None => {
                let Some(abs_step) = step.checked_abs() else {
                    debug!("Step {step} has no representable magnitude");
                    return None;
                };
                let divisor = ctx.constant(abs_step);
                return Some(ctx.ceil_div(span_expr, divisor));
            }
        }
    };

    let count = trip_count_from_span(loop_span, step)?;
    Some(ctx.constant(count))
}

/// Builds and simplifies `upper - lower + 1` for two compatible single-result bounds.
fn span_expr(ctx: &mut AffineContext, for_loop: &ForLoop) -> Option<AffineExpr> {
    let lower = for_loop.lower_bound().to_affine(ctx);
    let upper = for_loop.upper_bound().to_affine(ctx);

    let (Some(lower_result), Some(upper_result)) =
        (lower.map.single_result(), upper.map.single_result())
    else {
        debug!(
            "Loop bounds have {} and {} results; only single-result bounds are supported",
            lower.map.results.len(),
            upper.map.results.len()
        );
        return None;
    };

    if lower.map.num_dims != upper.map.num_dims || lower.map.num_symbols != upper.map.num_symbols
    {
        debug!(
            "Loop bound maps take different inputs: {}d+{}s vs. {}d+{}s",
            lower.map.num_dims, lower.map.num_symbols, upper.map.num_dims, upper.map.num_symbols
        );
        return None;
    }

    if lower.operands != upper.operands {
        debug!("Loop bounds are applied to different operands");
        return None;
    }

    let diff = ctx.sub(upper_result, lower_result);
    let one = ctx.constant(1);
    let span = ctx.add(diff, one);
    Some(ctx.simplify(span))
}

/// The number of iterations of a loop with a constant span.
fn trip_count_from_span(loop_span: i64, step: i64) -> Option<i64> {
    // Zero-iteration loops.
    if (loop_span < 0 && step >= 1) || (loop_span > 0 && step <= -1) {
        return Some(0);
    }
    if loop_span < 0 && step != -1 {
        debug!("Rounding of span {loop_span} by step {step} is not defined");
        return None;
    }
    // Here, `loop_span` is zero or has the same sign as `step`.
    let quotient = loop_span.checked_div(step)?;
    if loop_span % step == 0 {
        Some(quotient)
    } else {
        Some(quotient + 1)
    }
}

/// Returns the trip count of `for_loop` if it is a known constant.
pub fn constant_trip_count(ctx: &mut AffineContext, for_loop: &ForLoop) -> Option<u64> {
    let trip_count = trip_count(ctx, for_loop)?;
    // Trip counts are never negative for well-formed loops, so this is a reinterpretation.
    ctx.as_constant(trip_count).map(|v| v as u64)
}

/// Returns the greatest integer known to divide the trip count of `for_loop`.
///
/// Returns 1 when the trip count cannot be computed and [UNBOUNDED_DIVISOR] when the loop never
/// runs.
pub fn largest_divisor_of_trip_count(ctx: &mut AffineContext, for_loop: &ForLoop) -> u64 {
    let Some(trip_count) = trip_count(ctx, for_loop) else {
        return 1;
    };
    match ctx.as_constant(trip_count) {
        Some(0) => UNBOUNDED_DIVISOR,
        Some(count) => count as u64,
        None => ctx.largest_known_divisor(trip_count),
    }
}
