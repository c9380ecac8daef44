use crate::expr::{AffineContext, AffineExpr, AffineExprKind, BinaryOp};
use num_integer::Integer;

/// Conventional divisor of an expression which is always zero: every integer divides it.
pub const UNBOUNDED_DIVISOR: u64 = u64::MAX;

/// A flattened sum: `Σ coeff * atom + intercept`.
///
/// Atoms are simplified expressions which are not themselves additive (dimensions, symbols,
/// division and modulo nodes, and products of two non-constant expressions). Forms are
/// accumulated with `i128` coefficients so that sums which only overflow part-way through,
/// such as `1 + (MAX - MAX)`, still fold; they are narrowed to `i64` once complete.
#[derive(Debug, PartialEq, Eq, Clone)]
struct AffineForm<C = i64>(Vec<Term<C>>, C);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Term<C = i64>(C, AffineExpr);

impl AffineForm<i128> {
    fn add_constant(&mut self, c: i128) -> Option<()> {
        self.1 = self.1.checked_add(c)?;
        Some(())
    }

    fn add_term(&mut self, coeff: i128, atom: AffineExpr) -> Option<()> {
        if coeff == 0 {
            return Some(());
        }
        let AffineForm(terms, _) = self;
        if let Some(idx) = terms.iter().position(|Term(_, a)| *a == atom) {
            let merged = terms[idx].0.checked_add(coeff)?;
            if merged == 0 {
                terms.remove(idx);
            } else {
                terms[idx].0 = merged;
            }
        } else {
            terms.push(Term(coeff, atom));
        }
        Some(())
    }

    /// Returns `None` if the intercept or any coefficient does not fit in an `i64`.
    fn narrow(self) -> Option<AffineForm> {
        let AffineForm(terms, intercept) = self;
        let terms = terms
            .into_iter()
            .map(|Term(c, a)| i64::try_from(c).ok().map(|c| Term(c, a)))
            .collect::<Option<Vec<_>>>()?;
        Some(AffineForm(terms, i64::try_from(intercept).ok()?))
    }
}

impl AffineForm {
    fn as_constant(&self) -> Option<i64> {
        self.0.is_empty().then_some(self.1)
    }

    fn is_multiple_of(&self, rhs: i64) -> bool {
        self.1.checked_rem(rhs) == Some(0)
            && self.0.iter().all(|Term(c, _)| c.checked_rem(rhs) == Some(0))
    }

    /// Divide all coefficients and the intercept by `rhs` if all are divisible. Returns `true`
    /// if so.
    fn div_through(&mut self, rhs: i64) -> bool {
        if !self.is_multiple_of(rhs) {
            return false;
        }
        let Some(intercept) = self.1.checked_div(rhs) else {
            return false;
        };
        let Some(terms) = self
            .0
            .iter()
            .map(|Term(c, a)| c.checked_div(rhs).map(|q| Term(q, *a)))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        *self = AffineForm(terms, intercept);
        true
    }

    /// Reduce every coefficient and the intercept modulo a positive `rhs`.
    ///
    /// e.g., `(7*x + 3*y + 9) mod 5` has the same value as `(2*x + 3*y + 4) mod 5`.
    fn reduce_mod(self, rhs: i64) -> Self {
        debug_assert!(rhs > 0);
        let reduced_intercept = self.1.rem_euclid(rhs);
        let reduced_terms = self
            .0
            .into_iter()
            .map(|Term(c, a)| Term(c.rem_euclid(rhs), a))
            .filter(|Term(c, _)| *c != 0)
            .collect();
        AffineForm(reduced_terms, reduced_intercept)
    }
}

impl AffineContext {
    /// Canonicalize `expr`.
    ///
    /// Folds constant sub-trees, flattens additive chains (merging like terms and constants,
    /// dropping zeros), and divides through by constant divisors where that is exact. Any
    /// operation which would divide by zero or overflow `i64` is left in place, so this never
    /// fails. The result is a fixed point: simplifying it again returns the same handle.
    pub fn simplify(&mut self, expr: AffineExpr) -> AffineExpr {
        match *self.kind(expr) {
            AffineExprKind::Constant(_) | AffineExprKind::Dim(_) | AffineExprKind::Symbol(_) => {
                expr
            }
            AffineExprKind::Binary(
                op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul),
                lhs,
                rhs,
            ) => match self.linearize(expr) {
                Some(form) => self.rebuild(form),
                None => {
                    log::trace!("Leaving additive expression unflattened due to overflow");
                    let lhs = self.simplify(lhs);
                    let rhs = self.simplify(rhs);
                    let rebuilt = self.binary(op, lhs, rhs);
                    // The rebuilt node may flatten where the original did not.
                    if rebuilt == expr {
                        rebuilt
                    } else {
                        self.simplify(rebuilt)
                    }
                }
            },
            AffineExprKind::Binary(op, lhs, rhs) => self.simplify_division(op, lhs, rhs),
        }
    }

    /// Flattens `expr`, or returns `None` if the flattened form does not fit in `i64`.
    fn linearize(&mut self, expr: AffineExpr) -> Option<AffineForm> {
        let mut form = AffineForm(vec![], 0i128);
        self.accumulate(&mut form, expr, 1)?;
        form.narrow()
    }

    /// Adds `scale * expr` to `form`. Returns `None` on overflow.
    fn accumulate(
        &mut self,
        form: &mut AffineForm<i128>,
        expr: AffineExpr,
        scale: i128,
    ) -> Option<()> {
        match *self.kind(expr) {
            AffineExprKind::Constant(v) => form.add_constant(i128::from(v).checked_mul(scale)?),
            AffineExprKind::Dim(_) | AffineExprKind::Symbol(_) => form.add_term(scale, expr),
            AffineExprKind::Binary(BinaryOp::Add, lhs, rhs) => {
                self.accumulate(form, lhs, scale)?;
                self.accumulate(form, rhs, scale)
            }
            AffineExprKind::Binary(BinaryOp::Sub, lhs, rhs) => {
                self.accumulate(form, lhs, scale)?;
                self.accumulate(form, rhs, scale.checked_neg()?)
            }
            AffineExprKind::Binary(BinaryOp::Mul, lhs, rhs) => {
                let lhs = self.simplify(lhs);
                let rhs = self.simplify(rhs);
                if let Some(c) = self.as_constant(rhs) {
                    self.accumulate(form, lhs, scale.checked_mul(c.into())?)
                } else if let Some(c) = self.as_constant(lhs) {
                    self.accumulate(form, rhs, scale.checked_mul(c.into())?)
                } else {
                    let product = self.mul(lhs, rhs);
                    form.add_term(scale, product)
                }
            }
            AffineExprKind::Binary(_, _, _) => {
                let simplified = self.simplify(expr);
                match self.kind(simplified) {
                    AffineExprKind::Binary(
                        BinaryOp::FloorDiv | BinaryOp::CeilDiv | BinaryOp::Mod,
                        _,
                        _,
                    ) => form.add_term(scale, simplified),
                    _ => self.accumulate(form, simplified, scale),
                }
            }
        }
    }

    /// Dimensions by position, then symbols by position, then everything else by handle.
    fn atom_order(&self, atom: AffineExpr) -> (u8, u32, AffineExpr) {
        match *self.kind(atom) {
            AffineExprKind::Dim(p) => (0, p, atom),
            AffineExprKind::Symbol(p) => (1, p, atom),
            _ => (2, 0, atom),
        }
    }

    fn rebuild(&mut self, form: AffineForm) -> AffineExpr {
        let AffineForm(mut terms, intercept) = form;
        terms.sort_by_key(|Term(_, atom)| self.atom_order(*atom));

        let mut accum: Option<AffineExpr> = None;
        for Term(coeff, atom) in terms {
            accum = Some(match accum {
                None => self.scaled(atom, coeff),
                Some(prev) if coeff < 0 && coeff != i64::MIN => {
                    let term = self.scaled(atom, -coeff);
                    self.sub(prev, term)
                }
                Some(prev) => {
                    let term = self.scaled(atom, coeff);
                    self.add(prev, term)
                }
            });
        }

        match accum {
            None => self.constant(intercept),
            Some(e) if intercept == 0 => e,
            Some(e) if intercept < 0 && intercept != i64::MIN => {
                let c = self.constant(-intercept);
                self.sub(e, c)
            }
            Some(e) => {
                let c = self.constant(intercept);
                self.add(e, c)
            }
        }
    }

    fn scaled(&mut self, atom: AffineExpr, coeff: i64) -> AffineExpr {
        if coeff == 1 {
            atom
        } else {
            let c = self.constant(coeff);
            self.mul(atom, c)
        }
    }

    fn simplify_division(&mut self, op: BinaryOp, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        let lhs = self.simplify(lhs);
        let rhs = self.simplify(rhs);
        let Some(divisor) = self.as_constant(rhs).filter(|&d| d != 0) else {
            return self.binary(op, lhs, rhs);
        };

        if let Some(dividend) = self.as_constant(lhs) {
            return match fold_division(op, dividend, divisor) {
                Some(v) => self.constant(v),
                None => self.binary(op, lhs, rhs),
            };
        }

        if divisor == 1 {
            return match op {
                BinaryOp::Mod => self.constant(0),
                _ => lhs,
            };
        }

        let Some(mut form) = self.linearize(lhs) else {
            return self.binary(op, lhs, rhs);
        };
        match op {
            BinaryOp::FloorDiv | BinaryOp::CeilDiv => {
                if form.div_through(divisor) {
                    self.rebuild(form)
                } else {
                    self.binary(op, lhs, rhs)
                }
            }
            BinaryOp::Mod if divisor > 0 => {
                let reduced = form.reduce_mod(divisor);
                if let Some(c) = reduced.as_constant() {
                    // Already in [0, divisor).
                    return self.constant(c);
                }
                let reduced_lhs = self.rebuild(reduced);
                self.modulo(reduced_lhs, rhs)
            }
            BinaryOp::Mod if form.is_multiple_of(divisor) => self.constant(0),
            _ => self.binary(op, lhs, rhs),
        }
    }

    /// The greatest integer known to divide every value `expr` can take.
    ///
    /// This is conservative: the true greatest divisor may be larger. An expression which is
    /// always zero yields [UNBOUNDED_DIVISOR].
    pub fn largest_known_divisor(&self, expr: AffineExpr) -> u64 {
        match self.known_divisor(expr) {
            0 => UNBOUNDED_DIVISOR,
            d => d,
        }
    }

    /// Returns true if every value of `expr` is known to be a multiple of `factor`.
    pub fn is_multiple_of(&self, expr: AffineExpr, factor: i64) -> bool {
        let d = self.known_divisor(expr);
        if factor == 0 {
            return d == 0;
        }
        d % factor.unsigned_abs() == 0
    }

    /// Like [AffineContext::largest_known_divisor], but returns 0 for always-zero expressions so
    /// that it is an identity for gcd.
    fn known_divisor(&self, expr: AffineExpr) -> u64 {
        match *self.kind(expr) {
            AffineExprKind::Constant(v) => v.unsigned_abs(),
            AffineExprKind::Dim(_) | AffineExprKind::Symbol(_) => 1,
            AffineExprKind::Binary(BinaryOp::Add | BinaryOp::Sub, lhs, rhs) => {
                self.known_divisor(lhs).gcd(&self.known_divisor(rhs))
            }
            AffineExprKind::Binary(BinaryOp::Mul, lhs, rhs) => {
                let l = self.known_divisor(lhs);
                let r = self.known_divisor(rhs);
                l.checked_mul(r).unwrap_or(l.max(r))
            }
            AffineExprKind::Binary(BinaryOp::FloorDiv | BinaryOp::CeilDiv, lhs, rhs) => {
                match self.as_constant(rhs) {
                    Some(c) if c != 0 => {
                        let l = self.known_divisor(lhs);
                        let c = c.unsigned_abs();
                        if l % c == 0 {
                            l / c
                        } else {
                            1
                        }
                    }
                    _ => 1,
                }
            }
            AffineExprKind::Binary(BinaryOp::Mod, lhs, rhs) => match self.as_constant(rhs) {
                Some(c) if c != 0 => self.known_divisor(lhs).gcd(&c.unsigned_abs()),
                _ => 1,
            },
        }
    }
}

/// Folds a division or modulo of two constants, rounding toward negative infinity for
/// `FloorDiv` and `Mod` and toward positive infinity for `CeilDiv`.
fn fold_division(op: BinaryOp, lhs: i64, rhs: i64) -> Option<i64> {
    if rhs == 0 || (lhs == i64::MIN && rhs == -1) {
        return None;
    }
    match op {
        BinaryOp::FloorDiv => Some(divrem::DivFloor::div_floor(lhs, rhs)),
        BinaryOp::CeilDiv => Some(divrem::DivCeil::div_ceil(lhs, rhs)),
        BinaryOp::Mod => Some(divrem::RemFloor::rem_floor(lhs, rhs)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => unreachable!(),
    }
}
