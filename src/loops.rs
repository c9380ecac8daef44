use crate::expr::{AffineContext, AffineExpr};
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};
use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroI64;

/// Identity of an SSA value bound to an affine map operand.
///
/// Two bounds use the same operand at a position exactly when their [OperandId]s there are
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandId(pub u32);

/// A function from `num_dims` dimensions and `num_symbols` symbols to a list of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineMap {
    pub num_dims: u32,
    pub num_symbols: u32,
    pub results: SmallVec<[AffineExpr; 1]>,
}

/// An [AffineMap] applied to concrete operands: dimensions first, then symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineBound {
    pub map: AffineMap,
    pub operands: SmallVec<[OperandId; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Constant(i64),
    Affine(AffineBound),
}

/// A counted loop running from `lower` to `upper`, both inclusive, in increments of `step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoop {
    lower: Bound,
    upper: Bound,
    step: NonZeroI64,
}

pub struct DisplayMap<'a> {
    ctx: &'a AffineContext,
    map: &'a AffineMap,
}

impl AffineMap {
    pub fn new(
        num_dims: u32,
        num_symbols: u32,
        results: impl IntoIterator<Item = AffineExpr>,
    ) -> Self {
        AffineMap {
            num_dims,
            num_symbols,
            results: results.into_iter().collect(),
        }
    }

    /// A map with no inputs and the single result `value`.
    pub fn constant(ctx: &mut AffineContext, value: i64) -> Self {
        AffineMap {
            num_dims: 0,
            num_symbols: 0,
            results: smallvec![ctx.constant(value)],
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_dims as usize + self.num_symbols as usize
    }

    /// Returns the only result, if the map has exactly one.
    pub fn single_result(&self) -> Option<AffineExpr> {
        match self.results.as_slice() {
            [r] => Some(*r),
            _ => None,
        }
    }

    pub fn display<'a>(&'a self, ctx: &'a AffineContext) -> DisplayMap<'a> {
        DisplayMap { ctx, map: self }
    }
}

impl fmt::Display for DisplayMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = (0..self.map.num_dims).map(|i| format!("d{i}")).join(", ");
        write!(f, "({dims})")?;
        if self.map.num_symbols > 0 {
            let syms = (0..self.map.num_symbols).map(|i| format!("s{i}")).join(", ");
            write!(f, "[{syms}]")?;
        }
        let results = self
            .map
            .results
            .iter()
            .map(|r| self.ctx.display(*r).to_string())
            .join(", ");
        write!(f, " -> ({results})")
    }
}

impl AffineBound {
    pub fn new(map: AffineMap, operands: impl IntoIterator<Item = OperandId>) -> Self {
        AffineBound {
            map,
            operands: operands.into_iter().collect(),
        }
    }

    pub fn constant(ctx: &mut AffineContext, value: i64) -> Self {
        AffineBound {
            map: AffineMap::constant(ctx, value),
            operands: smallvec![],
        }
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }
}

impl Bound {
    /// The value of the bound if it is a literal or a map with a single constant result.
    pub fn as_constant(&self, ctx: &AffineContext) -> Option<i64> {
        match self {
            Bound::Constant(v) => Some(*v),
            Bound::Affine(b) => ctx.as_constant(b.map.single_result()?),
        }
    }

    /// Views this bound as an [AffineBound]. A literal becomes a map with no inputs.
    pub fn to_affine(&self, ctx: &mut AffineContext) -> Cow<'_, AffineBound> {
        match self {
            Bound::Constant(v) => Cow::Owned(AffineBound::constant(ctx, *v)),
            Bound::Affine(b) => Cow::Borrowed(b),
        }
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Self {
        Bound::Constant(value)
    }
}

impl From<AffineBound> for Bound {
    fn from(bound: AffineBound) -> Self {
        Bound::Affine(bound)
    }
}

impl ForLoop {
    pub fn new(lower: impl Into<Bound>, upper: impl Into<Bound>, step: NonZeroI64) -> Self {
        ForLoop {
            lower: lower.into(),
            upper: upper.into(),
            step,
        }
    }

    pub fn lower_bound(&self) -> &Bound {
        &self.lower
    }

    pub fn upper_bound(&self) -> &Bound {
        &self.upper
    }

    pub fn step(&self) -> NonZeroI64 {
        self.step
    }

    pub fn constant_lower_bound(&self, ctx: &AffineContext) -> Option<i64> {
        self.lower.as_constant(ctx)
    }

    pub fn constant_upper_bound(&self, ctx: &AffineContext) -> Option<i64> {
        self.upper.as_constant(ctx)
    }

    pub fn has_constant_bounds(&self, ctx: &AffineContext) -> bool {
        self.constant_lower_bound(ctx).is_some() && self.constant_upper_bound(ctx).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{AffineBound, AffineMap, Bound, ForLoop, OperandId};
    use crate::expr::AffineContext;
    use nonzero::nonzero as nz;

    #[test]
    fn test_constant_bounds_are_detected() {
        let mut ctx = AffineContext::new();
        let l = ForLoop::new(0i64, 9i64, nz!(1i64));
        assert!(l.has_constant_bounds(&ctx));

        let five = AffineBound::constant(&mut ctx, 5);
        let l = ForLoop::new(five, 9i64, nz!(1i64));
        assert_eq!(l.constant_lower_bound(&ctx), Some(5));
        assert!(l.has_constant_bounds(&ctx));

        let d0 = ctx.dim(0);
        let map = AffineMap::new(1, 0, [d0]);
        let l = ForLoop::new(0i64, AffineBound::new(map, [OperandId(0)]), nz!(1i64));
        assert!(!l.has_constant_bounds(&ctx));
        assert_eq!(l.constant_upper_bound(&ctx), None);
    }

    #[test]
    fn test_literal_bound_viewed_as_map() {
        let mut ctx = AffineContext::new();
        let bound = Bound::Constant(3);
        let affine = bound.to_affine(&mut ctx).into_owned();
        assert_eq!(affine.num_operands(), 0);
        assert_eq!(affine.map.num_inputs(), 0);
        let result = affine.map.single_result().unwrap();
        assert_eq!(ctx.as_constant(result), Some(3));
    }

    #[test]
    fn test_display_map() {
        let mut ctx = AffineContext::new();
        let d0 = ctx.dim(0);
        let s0 = ctx.symbol(0);
        let sum = ctx.add(d0, s0);
        let map = AffineMap::new(1, 1, [sum, d0]);
        assert_eq!(map.display(&ctx).to_string(), "(d0)[s0] -> (d0 + s0, d0)");
        assert_eq!(map.single_result(), None);
    }
}
