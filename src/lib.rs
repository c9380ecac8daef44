pub mod expr;
pub mod loops;
pub mod nameenv;
pub mod parse;
pub mod simplify;
pub mod tripcount;

pub use simplify::UNBOUNDED_DIVISOR;
