#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::num::NonZeroI64;

use tripcount::expr::AffineContext;
use tripcount::loops::{Bound, ForLoop};
use tripcount::nameenv::NameEnv;
use tripcount::parse::parse_bound;
use tripcount::tripcount::{constant_trip_count, largest_divisor_of_trip_count, trip_count};
use tripcount::UNBOUNDED_DIVISOR;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Computes the trip count of `for i = LOWER to UPPER step STEP`, where both bounds are
/// inclusive.
#[derive(Parser)]
#[command(author, version, about, long_about = None, allow_negative_numbers = true)]
struct Args {
    /// Lower bound: an integer or an affine map such as `(d0)[s0] -> (d0 + s0)`
    lower: String,

    /// Upper bound: an integer or an affine map
    upper: String,

    #[arg(long, default_value = "1")]
    step: NonZeroI64,

    /// Names of the values the lower bound map is applied to, dimensions first
    #[arg(long, value_delimiter = ',')]
    lower_operands: Vec<String>,

    /// Names of the values the upper bound map is applied to, dimensions first
    #[arg(long, value_delimiter = ',')]
    upper_operands: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut ctx = AffineContext::new();
    let mut names = NameEnv::new();
    let lower = read_bound(&mut ctx, &mut names, &args.lower, &args.lower_operands)
        .context("Failed to parse the lower bound")?;
    let upper = read_bound(&mut ctx, &mut names, &args.upper, &args.upper_operands)
        .context("Failed to parse the upper bound")?;
    let for_loop = ForLoop::new(lower, upper, args.step);

    let start_time = std::time::Instant::now();
    let count = trip_count(&mut ctx, &for_loop);
    let constant = constant_trip_count(&mut ctx, &for_loop);
    let divisor = largest_divisor_of_trip_count(&mut ctx, &for_loop);
    info!("Analysis took {:?}", start_time.elapsed());
    info!("Context holds {} expressions", ctx.len());

    match count {
        Some(e) => println!("trip count: {}", ctx.display(e)),
        None => println!("trip count: unknown"),
    }
    match constant {
        Some(c) => println!("constant trip count: {c}"),
        None => println!("constant trip count: unknown"),
    }
    if divisor == UNBOUNDED_DIVISOR {
        println!("largest divisor: unbounded");
    } else {
        println!("largest divisor: {divisor}");
    }
    Ok(())
}

fn read_bound(
    ctx: &mut AffineContext,
    names: &mut NameEnv,
    text: &str,
    operand_names: &[String],
) -> Result<Bound> {
    let operands = operand_names
        .iter()
        .map(|n| names.operand(n))
        .collect::<Vec<_>>();
    Ok(parse_bound(ctx, text, &operands)?)
}
