use std::collections::HashMap;
use std::fmt::{self, Display};

/// A handle to an affine expression interned in an [AffineContext].
///
/// Handles are only meaningful for the context that produced them. Because every node is
/// hash-consed, two handles from the same context are equal exactly when the expressions are
/// structurally equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AffineExpr(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum BinaryOp {
    Add,
    Sub,
    /// Affine only when one side is a constant.
    Mul,
    FloorDiv,
    CeilDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffineExprKind {
    Constant(i64),
    Dim(u32),
    Symbol(u32),
    Binary(BinaryOp, AffineExpr, AffineExpr),
}

/// Owns every [AffineExpr] built during one analysis session.
///
/// Constructors never simplify; see [AffineContext::simplify].
///
/// # Panics
///
/// The constructors ([AffineContext::constant], [AffineContext::dim],
/// [AffineContext::symbol], [AffineContext::binary] and its shorthands) panic once more than
/// `u32::MAX` distinct expressions have been interned.
#[derive(Debug, Default, Clone)]
pub struct AffineContext {
    nodes: Vec<AffineExprKind>,
    interned: HashMap<AffineExprKind, AffineExpr>,
}

/// Prints an [AffineExpr] using MLIR-style syntax. Returned by [AffineContext::display].
pub struct DisplayExpr<'a> {
    ctx: &'a AffineContext,
    expr: AffineExpr,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::FloorDiv | BinaryOp::CeilDiv | BinaryOp::Mod => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::FloorDiv => "floordiv",
            BinaryOp::CeilDiv => "ceildiv",
            BinaryOp::Mod => "mod",
        }
    }
}

impl AffineContext {
    pub fn new() -> Self {
        AffineContext::default()
    }

    /// The number of distinct expressions interned so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Panics if the handle space is exhausted.
    fn intern(&mut self, kind: AffineExprKind) -> AffineExpr {
        if let Some(&existing) = self.interned.get(&kind) {
            return existing;
        }
        let idx = u32::try_from(self.nodes.len()).expect("affine context exhausted handle space");
        let handle = AffineExpr(idx);
        self.nodes.push(kind);
        self.interned.insert(kind, handle);
        handle
    }

    /// Returns the node behind `expr`.
    ///
    /// Panics if `expr` was produced by a different context.
    pub fn kind(&self, expr: AffineExpr) -> &AffineExprKind {
        &self.nodes[expr.0 as usize]
    }

    pub fn constant(&mut self, value: i64) -> AffineExpr {
        self.intern(AffineExprKind::Constant(value))
    }

    pub fn dim(&mut self, position: u32) -> AffineExpr {
        self.intern(AffineExprKind::Dim(position))
    }

    pub fn symbol(&mut self, position: u32) -> AffineExpr {
        self.intern(AffineExprKind::Symbol(position))
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.intern(AffineExprKind::Binary(op, lhs, rhs))
    }

    pub fn add(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn floor_div(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::FloorDiv, lhs, rhs)
    }

    pub fn ceil_div(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::CeilDiv, lhs, rhs)
    }

    pub fn modulo(&mut self, lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        self.binary(BinaryOp::Mod, lhs, rhs)
    }

    /// Returns the value of `expr` if it is a literal constant node.
    ///
    /// This does not fold; a tree of constants must be simplified first.
    pub fn as_constant(&self, expr: AffineExpr) -> Option<i64> {
        match self.kind(expr) {
            AffineExprKind::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if `expr` has no dimension references.
    pub fn is_symbolic_or_constant(&self, expr: AffineExpr) -> bool {
        match *self.kind(expr) {
            AffineExprKind::Constant(_) | AffineExprKind::Symbol(_) => true,
            AffineExprKind::Dim(_) => false,
            AffineExprKind::Binary(_, lhs, rhs) => {
                self.is_symbolic_or_constant(lhs) && self.is_symbolic_or_constant(rhs)
            }
        }
    }

    /// Returns true if multiplication, division, and modulo in `expr` are only ever by a
    /// literal constant (on the right for division and modulo).
    pub fn is_pure_affine(&self, expr: AffineExpr) -> bool {
        match *self.kind(expr) {
            AffineExprKind::Constant(_) | AffineExprKind::Dim(_) | AffineExprKind::Symbol(_) => {
                true
            }
            AffineExprKind::Binary(BinaryOp::Add | BinaryOp::Sub, lhs, rhs) => {
                self.is_pure_affine(lhs) && self.is_pure_affine(rhs)
            }
            AffineExprKind::Binary(BinaryOp::Mul, lhs, rhs) => {
                self.is_pure_affine(lhs)
                    && self.is_pure_affine(rhs)
                    && (self.as_constant(lhs).is_some() || self.as_constant(rhs).is_some())
            }
            AffineExprKind::Binary(_, lhs, rhs) => {
                self.is_pure_affine(lhs) && self.as_constant(rhs).is_some()
            }
        }
    }

    pub fn is_function_of_dim(&self, expr: AffineExpr, position: u32) -> bool {
        match *self.kind(expr) {
            AffineExprKind::Dim(p) => p == position,
            AffineExprKind::Constant(_) | AffineExprKind::Symbol(_) => false,
            AffineExprKind::Binary(_, lhs, rhs) => {
                self.is_function_of_dim(lhs, position) || self.is_function_of_dim(rhs, position)
            }
        }
    }

    pub fn is_function_of_symbol(&self, expr: AffineExpr, position: u32) -> bool {
        match *self.kind(expr) {
            AffineExprKind::Symbol(p) => p == position,
            AffineExprKind::Constant(_) | AffineExprKind::Dim(_) => false,
            AffineExprKind::Binary(_, lhs, rhs) => {
                self.is_function_of_symbol(lhs, position)
                    || self.is_function_of_symbol(rhs, position)
            }
        }
    }

    /// Rebuilds `expr` with `dims[i]` substituted for `d{i}` and `symbols[i]` for `s{i}`.
    ///
    /// Positions without a replacement are left as they are. The result is not simplified.
    pub fn replace_dims_and_symbols(
        &mut self,
        expr: AffineExpr,
        dims: &[AffineExpr],
        symbols: &[AffineExpr],
    ) -> AffineExpr {
        match *self.kind(expr) {
            AffineExprKind::Constant(_) => expr,
            AffineExprKind::Dim(p) => dims.get(p as usize).copied().unwrap_or(expr),
            AffineExprKind::Symbol(p) => symbols.get(p as usize).copied().unwrap_or(expr),
            AffineExprKind::Binary(op, lhs, rhs) => {
                let new_lhs = self.replace_dims_and_symbols(lhs, dims, symbols);
                let new_rhs = self.replace_dims_and_symbols(rhs, dims, symbols);
                if new_lhs == lhs && new_rhs == rhs {
                    expr
                } else {
                    self.binary(op, new_lhs, new_rhs)
                }
            }
        }
    }

    pub fn display(&self, expr: AffineExpr) -> DisplayExpr<'_> {
        DisplayExpr { ctx: self, expr }
    }
}

impl DisplayExpr<'_> {
    fn write_prec(&self, f: &mut fmt::Formatter<'_>, expr: AffineExpr, min_prec: u8) -> fmt::Result {
        match *self.ctx.kind(expr) {
            AffineExprKind::Constant(v) => write!(f, "{v}"),
            AffineExprKind::Dim(p) => write!(f, "d{p}"),
            AffineExprKind::Symbol(p) => write!(f, "s{p}"),
            AffineExprKind::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                let parenthesize = prec < min_prec;
                if parenthesize {
                    write!(f, "(")?;
                }
                self.write_prec(f, lhs, prec)?;
                write!(f, " {} ", op.symbol())?;
                // All binary ops are left-associative, so an equal-precedence right operand
                // needs parentheses.
                self.write_prec(f, rhs, prec + 1)?;
                if parenthesize {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_prec(f, self.expr, 0)
    }
}
