//! Canonical constructors. Every constructor folds constant operands and
//! applies the local rewrite rules before a node is allocated, so
//! structurally equal inputs always produce structurally equal outputs.

use super::{Expr, ExprKind, ExprRef, Node, UpdateList, Width};
use crate::bitvec::BitVector;
use log::trace;

impl Expr {
    pub fn constant(value: BitVector) -> ExprRef {
        let width = value.width();
        Expr::alloc(Node::Constant(value), width)
    }

    pub fn constant_u64(value: u64, width: Width) -> ExprRef {
        Expr::constant(BitVector::from_u64(value, width))
    }

    pub fn bool(value: bool) -> ExprRef {
        Expr::constant(BitVector::from_bool(value))
    }

    pub fn zero(width: Width) -> ExprRef {
        Expr::constant(BitVector::zero(width))
    }

    /// Wraps `expr` so that rewriting passes leave it alone.
    pub fn not_optimized(expr: &ExprRef) -> ExprRef {
        Expr::alloc(Node::NotOptimized(expr.clone()), expr.width())
    }

    /// Reads `updates` at `index`. Writes at provably equal indices and
    /// constant arrays without symbolic writes are resolved right away.
    pub fn read(updates: UpdateList, index: ExprRef) -> ExprRef {
        assert_eq!(index.width(), updates.root().domain(), "read index width mismatch");

        let mut symbolic_writes = false;
        for update in updates.iter() {
            let cond = Expr::eq(&index, update.index());
            match cond.as_constant() {
                Some(value) if value.is_true() => return update.value().clone(),
                Some(_) => {}
                None => {
                    symbolic_writes = true;
                    break;
                }
            }
        }

        let root = updates.root();
        if root.is_constant() && !symbolic_writes {
            if let Some(position) = index.as_constant().and_then(BitVector::to_u64) {
                if position < root.size() {
                    return root.constant_values()[position as usize].clone();
                }
            }
        }

        let width = root.range();
        Expr::alloc(Node::Read { updates, index }, width)
    }

    pub fn select(cond: &ExprRef, then: &ExprRef, otherwise: &ExprRef) -> ExprRef {
        assert_eq!(cond.width(), Expr::BOOL, "select condition has to be boolean");
        assert_eq!(then.width(), otherwise.width(), "select branch width mismatch");

        if let Some(value) = cond.as_constant() {
            return if value.is_true() { then.clone() } else { otherwise.clone() };
        }
        if then == otherwise {
            return then.clone();
        }
        if then.width() == Expr::BOOL {
            if let Some(value) = then.as_constant() {
                return if value.is_true() {
                    Expr::or(cond, otherwise)
                } else {
                    Expr::and(&Expr::is_zero(cond), otherwise)
                };
            }
            if let Some(value) = otherwise.as_constant() {
                return if value.is_true() {
                    Expr::or(&Expr::is_zero(cond), then)
                } else {
                    Expr::and(cond, then)
                };
            }
        }

        Expr::alloc(
            Node::Select {
                cond: cond.clone(),
                then: then.clone(),
                otherwise: otherwise.clone(),
            },
            then.width(),
        )
    }

    /// `left` forms the most significant bits.
    pub fn concat(left: &ExprRef, right: &ExprRef) -> ExprRef {
        let width = left.width() + right.width();

        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.concat(r));
        }
        if let (
            Node::Extract {
                expr: l,
                offset: l_offset,
            },
            Node::Extract {
                expr: r,
                offset: r_offset,
            },
        ) = (left.node(), right.node())
        {
            if l == r && r_offset + right.width() == *l_offset {
                trace!("Merging adjacent extracts of {}", l);
                return Expr::extract(l, *r_offset, width);
            }
        }

        Expr::alloc(
            Node::Concat {
                left: left.clone(),
                right: right.clone(),
            },
            width,
        )
    }

    /// Concatenates bytes given least significant first.
    pub fn concat_bytes(bytes: &[ExprRef]) -> ExprRef {
        let (first, rest) = bytes
            .split_first()
            .expect("at least one byte has to be concatenated");
        rest.iter()
            .fold(first.clone(), |acc, byte| Expr::concat(byte, &acc))
    }

    pub fn extract(expr: &ExprRef, offset: Width, width: Width) -> ExprRef {
        let source = expr.width();
        assert!(
            width > 0 && offset + width <= source,
            "invalid extract of w{} at {} from w{}",
            width,
            offset,
            source
        );

        if width == source {
            return expr.clone();
        }
        if let Some(value) = expr.as_constant() {
            return Expr::constant(value.extract(offset, width));
        }
        if let Node::Concat { left, right } = expr.node() {
            let split = right.width();
            if offset >= split {
                return Expr::extract(left, offset - split, width);
            }
            if offset + width <= split {
                return Expr::extract(right, offset, width);
            }
            return Expr::concat(
                &Expr::extract(left, 0, width - split + offset),
                &Expr::extract(right, offset, split - offset),
            );
        }

        Expr::alloc(
            Node::Extract {
                expr: expr.clone(),
                offset,
            },
            width,
        )
    }

    pub fn zext(expr: &ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            expr.clone()
        } else if width < expr.width() {
            Expr::extract(expr, 0, width)
        } else if let Some(value) = expr.as_constant() {
            Expr::constant(value.zext(width))
        } else {
            Expr::alloc(Node::ZExt(expr.clone()), width)
        }
    }

    pub fn sext(expr: &ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            expr.clone()
        } else if width < expr.width() {
            Expr::extract(expr, 0, width)
        } else if let Some(value) = expr.as_constant() {
            Expr::constant(value.sext(width))
        } else {
            Expr::alloc(Node::SExt(expr.clone()), width)
        }
    }

    /// Bitwise complement.
    pub fn not(expr: &ExprRef) -> ExprRef {
        if let Some(value) = expr.as_constant() {
            return Expr::constant(!value.clone());
        }
        if let Node::Not(inner) = expr.node() {
            return inner.clone();
        }
        Expr::alloc(Node::Not(expr.clone()), expr.width())
    }

    pub fn is_zero(expr: &ExprRef) -> ExprRef {
        Expr::eq(expr, &Expr::zero(expr.width()))
    }

    pub fn neg(expr: &ExprRef) -> ExprRef {
        Expr::sub(&Expr::zero(expr.width()), expr)
    }

    pub fn add(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() + r.clone()),
            (Some(l), None) => add_constant(l, right),
            (None, Some(r)) => add_constant(r, left),
            (None, None) => add_symbolic(left, right),
        }
    }

    pub fn sub(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() - r.clone()),
            (Some(l), None) => sub_from_constant(l, right),
            // l - c == l + (-c)
            (None, Some(r)) => add_constant(&-r.clone(), left),
            (None, None) => sub_symbolic(left, right),
        }
    }

    pub fn mul(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() * r.clone()),
            (Some(c), None) => mul_constant(c, left, right),
            (None, Some(c)) => mul_constant(c, right, left),
            (None, None) if left.width() == Expr::BOOL => binary(ExprKind::And, left, right),
            (None, None) => binary(ExprKind::Mul, left, right),
        }
    }

    pub fn udiv(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.udiv(r));
        }
        if left.width() == Expr::BOOL {
            // the divisor has to be one
            return left.clone();
        }
        binary(ExprKind::UDiv, left, right)
    }

    pub fn sdiv(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.sdiv(r));
        }
        if left.width() == Expr::BOOL {
            return left.clone();
        }
        binary(ExprKind::SDiv, left, right)
    }

    pub fn urem(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.urem(r));
        }
        if left.width() == Expr::BOOL {
            return Expr::bool(false);
        }
        binary(ExprKind::URem, left, right)
    }

    pub fn srem(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.srem(r));
        }
        if left.width() == Expr::BOOL {
            return Expr::bool(false);
        }
        binary(ExprKind::SRem, left, right)
    }

    pub fn and(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() & r.clone()),
            (Some(c), None) => and_constant(c, left, right),
            (None, Some(c)) => and_constant(c, right, left),
            (None, None) => binary(ExprKind::And, left, right),
        }
    }

    pub fn or(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() | r.clone()),
            (Some(c), None) => or_constant(c, left, right),
            (None, Some(c)) => or_constant(c, right, left),
            (None, None) => binary(ExprKind::Or, left, right),
        }
    }

    pub fn xor(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::constant(l.clone() ^ r.clone()),
            (Some(c), None) => xor_constant(c, left, right),
            (None, Some(c)) => xor_constant(c, right, left),
            (None, None) => binary(ExprKind::Xor, left, right),
        }
    }

    pub fn shl(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.shl(r));
        }
        if left.width() == Expr::BOOL {
            // l & !r
            return Expr::and(left, &Expr::is_zero(right));
        }
        binary(ExprKind::Shl, left, right)
    }

    pub fn lshr(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.lshr(r));
        }
        if left.width() == Expr::BOOL {
            return Expr::and(left, &Expr::is_zero(right));
        }
        binary(ExprKind::LShr, left, right)
    }

    pub fn ashr(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::constant(l.ashr(r));
        }
        if left.width() == Expr::BOOL {
            return left.clone();
        }
        binary(ExprKind::AShr, left, right)
    }

    pub fn eq(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Expr::bool(l == r),
            (Some(c), None) => eq_constant(c, left, right),
            (None, Some(c)) => eq_constant(c, right, left),
            (None, None) => eq_symbolic(left, right),
        }
    }

    pub fn ne(left: &ExprRef, right: &ExprRef) -> ExprRef {
        Expr::eq(&Expr::bool(false), &Expr::eq(left, right))
    }

    pub fn ult(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::bool(l.ult(r));
        }
        if left.width() == Expr::BOOL {
            // !l && r
            return Expr::and(&Expr::is_zero(left), right);
        }
        binary(ExprKind::Ult, left, right)
    }

    pub fn ule(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::bool(l.ule(r));
        }
        if left.width() == Expr::BOOL {
            // !(l && !r)
            return Expr::or(&Expr::is_zero(left), right);
        }
        binary(ExprKind::Ule, left, right)
    }

    pub fn slt(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::bool(l.slt(r));
        }
        if left.width() == Expr::BOOL {
            // l && !r
            return Expr::and(left, &Expr::is_zero(right));
        }
        binary(ExprKind::Slt, left, right)
    }

    pub fn sle(left: &ExprRef, right: &ExprRef) -> ExprRef {
        check_widths(left, right);
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Expr::bool(l.sle(r));
        }
        if left.width() == Expr::BOOL {
            // !(!l && r)
            return Expr::or(left, &Expr::is_zero(right));
        }
        binary(ExprKind::Sle, left, right)
    }

    pub fn ugt(left: &ExprRef, right: &ExprRef) -> ExprRef {
        Expr::ult(right, left)
    }

    pub fn uge(left: &ExprRef, right: &ExprRef) -> ExprRef {
        Expr::ule(right, left)
    }

    pub fn sgt(left: &ExprRef, right: &ExprRef) -> ExprRef {
        Expr::slt(right, left)
    }

    pub fn sge(left: &ExprRef, right: &ExprRef) -> ExprRef {
        Expr::sle(right, left)
    }

    /// Builds a binary or comparison expression of the given kind.
    pub fn binary(kind: ExprKind, left: &ExprRef, right: &ExprRef) -> ExprRef {
        match kind {
            ExprKind::Concat => Expr::concat(left, right),
            ExprKind::Add => Expr::add(left, right),
            ExprKind::Sub => Expr::sub(left, right),
            ExprKind::Mul => Expr::mul(left, right),
            ExprKind::UDiv => Expr::udiv(left, right),
            ExprKind::SDiv => Expr::sdiv(left, right),
            ExprKind::URem => Expr::urem(left, right),
            ExprKind::SRem => Expr::srem(left, right),
            ExprKind::And => Expr::and(left, right),
            ExprKind::Or => Expr::or(left, right),
            ExprKind::Xor => Expr::xor(left, right),
            ExprKind::Shl => Expr::shl(left, right),
            ExprKind::LShr => Expr::lshr(left, right),
            ExprKind::AShr => Expr::ashr(left, right),
            ExprKind::Eq => Expr::eq(left, right),
            ExprKind::Ne => Expr::ne(left, right),
            ExprKind::Ult => Expr::ult(left, right),
            ExprKind::Ule => Expr::ule(left, right),
            ExprKind::Ugt => Expr::ugt(left, right),
            ExprKind::Uge => Expr::uge(left, right),
            ExprKind::Slt => Expr::slt(left, right),
            ExprKind::Sle => Expr::sle(left, right),
            ExprKind::Sgt => Expr::sgt(left, right),
            ExprKind::Sge => Expr::sge(left, right),
            _ => panic!("{} is not a binary expression kind", kind),
        }
    }
}

fn check_widths(left: &ExprRef, right: &ExprRef) {
    assert!(
        left.width() == right.width(),
        "operand width mismatch: w{} vs w{}",
        left.width(),
        right.width()
    );
}

fn binary(kind: ExprKind, left: &ExprRef, right: &ExprRef) -> ExprRef {
    let width = if kind.is_comparison() {
        Expr::BOOL
    } else {
        left.width()
    };
    Expr::alloc(
        Node::Binary {
            kind,
            left: left.clone(),
            right: right.clone(),
        },
        width,
    )
}

/// Left constant operand of an `Add` or `Sub` node.
fn constant_left(expr: &ExprRef, of: ExprKind) -> Option<(&BitVector, &ExprRef)> {
    match expr.node() {
        Node::Binary { kind, left, right } if *kind == of => {
            left.as_constant().map(|c| (c, right))
        }
        _ => None,
    }
}

fn add_constant(c: &BitVector, other: &ExprRef) -> ExprRef {
    if c.width() == Expr::BOOL {
        return xor_constant(c, &Expr::constant(c.clone()), other);
    }
    if c.is_zero() {
        return other.clone();
    }
    // c + (k + x) == (c + k) + x
    if let Some((k, x)) = constant_left(other, ExprKind::Add) {
        return Expr::add(&Expr::constant(c.clone() + k.clone()), x);
    }
    // c + (k - x) == (c + k) - x
    if let Some((k, x)) = constant_left(other, ExprKind::Sub) {
        return Expr::sub(&Expr::constant(c.clone() + k.clone()), x);
    }
    binary(ExprKind::Add, &Expr::constant(c.clone()), other)
}

fn add_symbolic(left: &ExprRef, right: &ExprRef) -> ExprRef {
    if left.width() == Expr::BOOL {
        return Expr::xor(left, right);
    }
    // (k + a) + b == k + (a + b)
    if let Some((k, a)) = constant_left(left, ExprKind::Add) {
        return Expr::add(&Expr::constant(k.clone()), &Expr::add(a, right));
    }
    // (k - a) + b == k + (b - a)
    if let Some((k, a)) = constant_left(left, ExprKind::Sub) {
        return Expr::add(&Expr::constant(k.clone()), &Expr::sub(right, a));
    }
    // a + (k + b) == k + (a + b)
    if let Some((k, b)) = constant_left(right, ExprKind::Add) {
        return Expr::add(&Expr::constant(k.clone()), &Expr::add(left, b));
    }
    // a + (k - b) == k + (a - b)
    if let Some((k, b)) = constant_left(right, ExprKind::Sub) {
        return Expr::add(&Expr::constant(k.clone()), &Expr::sub(left, b));
    }
    binary(ExprKind::Add, left, right)
}

fn sub_from_constant(c: &BitVector, other: &ExprRef) -> ExprRef {
    if c.width() == Expr::BOOL {
        return xor_constant(c, &Expr::constant(c.clone()), other);
    }
    // c - (k + x) == (c - k) - x
    if let Some((k, x)) = constant_left(other, ExprKind::Add) {
        return Expr::sub(&Expr::constant(c.clone() - k.clone()), x);
    }
    // c - (k - x) == (c - k) + x
    if let Some((k, x)) = constant_left(other, ExprKind::Sub) {
        return Expr::add(&Expr::constant(c.clone() - k.clone()), x);
    }
    binary(ExprKind::Sub, &Expr::constant(c.clone()), other)
}

fn sub_symbolic(left: &ExprRef, right: &ExprRef) -> ExprRef {
    if left.width() == Expr::BOOL {
        return Expr::xor(left, right);
    }
    if left == right {
        return Expr::zero(left.width());
    }
    // (k + a) - b == k + (a - b)
    if let Some((k, a)) = constant_left(left, ExprKind::Add) {
        return Expr::add(&Expr::constant(k.clone()), &Expr::sub(a, right));
    }
    // (k - a) - b == k - (a + b)
    if let Some((k, a)) = constant_left(left, ExprKind::Sub) {
        return Expr::sub(&Expr::constant(k.clone()), &Expr::add(a, right));
    }
    // a - (k + b) == (a - b) - k
    if let Some((k, b)) = constant_left(right, ExprKind::Add) {
        return Expr::sub(&Expr::sub(left, b), &Expr::constant(k.clone()));
    }
    // a - (k - b) == (a + b) - k
    if let Some((k, b)) = constant_left(right, ExprKind::Sub) {
        return Expr::sub(&Expr::add(left, b), &Expr::constant(k.clone()));
    }
    binary(ExprKind::Sub, left, right)
}

fn mul_constant(c: &BitVector, constant: &ExprRef, other: &ExprRef) -> ExprRef {
    if c.width() == Expr::BOOL {
        return and_constant(c, constant, other);
    }
    if c.is_one() {
        return other.clone();
    }
    if c.is_zero() {
        return constant.clone();
    }
    binary(ExprKind::Mul, constant, other)
}

fn and_constant(c: &BitVector, constant: &ExprRef, other: &ExprRef) -> ExprRef {
    if c.is_ones() {
        other.clone()
    } else if c.is_zero() {
        constant.clone()
    } else {
        binary(ExprKind::And, constant, other)
    }
}

fn or_constant(c: &BitVector, constant: &ExprRef, other: &ExprRef) -> ExprRef {
    if c.is_ones() {
        constant.clone()
    } else if c.is_zero() {
        other.clone()
    } else {
        binary(ExprKind::Or, constant, other)
    }
}

fn xor_constant(c: &BitVector, constant: &ExprRef, other: &ExprRef) -> ExprRef {
    if c.is_zero() {
        other.clone()
    } else if c.width() == Expr::BOOL {
        // true ^ x == !x
        eq_constant(&BitVector::from_bool(false), &Expr::bool(false), other)
    } else {
        binary(ExprKind::Xor, constant, other)
    }
}

fn eq_symbolic(left: &ExprRef, right: &ExprRef) -> ExprRef {
    if left == right {
        Expr::bool(true)
    } else {
        binary(ExprKind::Eq, left, right)
    }
}

fn eq_constant(c: &BitVector, constant: &ExprRef, other: &ExprRef) -> ExprRef {
    let width = c.width();

    if width == Expr::BOOL {
        if c.is_true() {
            return other.clone();
        }
        match other.node() {
            // !!a == a
            Node::Binary {
                kind: ExprKind::Eq,
                left,
                right,
            } if left.is_false() => return right.clone(),
            // !(a | b) == !a & !b
            Node::Binary {
                kind: ExprKind::Or,
                left,
                right,
            } => return Expr::and(&Expr::is_zero(left), &Expr::is_zero(right)),
            _ => {}
        }
    } else {
        match other.node() {
            Node::SExt(src) => {
                let truncated = c.zext(src.width());
                return if truncated.sext(width) == *c {
                    Expr::eq(src, &Expr::constant(truncated))
                } else {
                    Expr::bool(false)
                };
            }
            Node::ZExt(src) => {
                let truncated = c.zext(src.width());
                return if truncated.zext(width) == *c {
                    Expr::eq(src, &Expr::constant(truncated))
                } else {
                    Expr::bool(false)
                };
            }
            Node::Binary {
                kind: ExprKind::Add,
                left,
                right,
            } => {
                // c0 == c1 + b  <=>  c0 - c1 == b
                if let Some(k) = left.as_constant() {
                    let moved = c.clone() - k.clone();
                    return eq_constant(&moved, &Expr::constant(moved.clone()), right);
                }
            }
            Node::Binary {
                kind: ExprKind::Sub,
                left,
                right,
            } => {
                // c0 == c1 - b  <=>  c1 - c0 == b
                if let Some(k) = left.as_constant() {
                    let moved = k.clone() - c.clone();
                    return eq_constant(&moved, &Expr::constant(moved.clone()), right);
                }
            }
            _ => {}
        }
    }

    eq_symbolic(constant, other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ArrayCache;
    use std::rc::Rc;

    fn byte(cache: &ArrayCache, name: &str) -> ExprRef {
        let array = cache.create_array(name, 8, None, Expr::INT32, Expr::INT8);
        Expr::read_at(&array, 0)
    }

    fn word(cache: &ArrayCache, name: &str) -> ExprRef {
        let array = cache.create_array(name, 8, None, Expr::INT32, Expr::INT8);
        let bytes: Vec<_> = (0..4).map(|i| Expr::read_at(&array, i)).collect();
        Expr::concat_bytes(&bytes)
    }

    fn flag(cache: &ArrayCache, name: &str) -> ExprRef {
        Expr::extract(&byte(cache, name), 0, Expr::BOOL)
    }

    #[test]
    fn subtracting_an_expression_from_itself_gives_zero() {
        let cache = ArrayCache::new();
        for x in &[byte(&cache, "a"), word(&cache, "b")] {
            let difference = Expr::sub(x, x);
            assert_eq!(difference.as_constant(), Some(&BitVector::zero(x.width())));
        }
    }

    #[test]
    fn concatenated_constants_fold_into_a_wider_constant() {
        let folded = Expr::concat(
            &Expr::constant_u64(0x12, Expr::INT8),
            &Expr::constant_u64(0x34, Expr::INT8),
        );
        assert_eq!(folded.as_constant(), Some(&BitVector::from_u64(0x1234, 16)));
    }

    #[test]
    fn full_width_extract_is_identity() {
        let cache = ArrayCache::new();
        let x = word(&cache, "x");
        assert!(Rc::ptr_eq(&Expr::extract(&x, 0, x.width()), &x));
    }

    #[test]
    fn extract_over_concat_selects_the_matching_side() {
        let cache = ArrayCache::new();
        let array = cache.create_array("x", 8, None, Expr::INT32, Expr::INT8);
        let bytes: Vec<_> = (0..4).map(|i| Expr::read_at(&array, i)).collect();
        let x = Expr::concat_bytes(&bytes);

        assert_eq!(Expr::extract(&x, 8, 8), bytes[1]);
        assert_eq!(Expr::extract(&x, 24, 8), bytes[3]);
        assert_eq!(Expr::extract(&x, 8, 16), Expr::concat(&bytes[2], &bytes[1]));
    }

    #[test]
    fn adjacent_extracts_merge() {
        let cache = ArrayCache::new();
        let x = Expr::zext(&byte(&cache, "x"), Expr::INT32);
        let high = Expr::extract(&x, 8, 8);
        let low = Expr::extract(&x, 0, 8);

        assert_eq!(Expr::concat(&high, &low), Expr::extract(&x, 0, 16));
    }

    #[test]
    fn select_with_constant_condition_picks_a_branch() {
        let cache = ArrayCache::new();
        let a = byte(&cache, "a");
        let b = byte(&cache, "b");

        assert_eq!(Expr::select(&Expr::bool(true), &a, &b), a);
        assert_eq!(Expr::select(&Expr::bool(false), &a, &b), b);
        assert_eq!(Expr::select(&flag(&cache, "c"), &a, &a), a);
    }

    #[test]
    fn boolean_arithmetic_degrades_to_logic() {
        let cache = ArrayCache::new();
        let p = flag(&cache, "p");
        let q = flag(&cache, "q");

        assert_eq!(Expr::add(&p, &q).kind(), ExprKind::Xor);
        assert_eq!(Expr::sub(&p, &q).kind(), ExprKind::Xor);
        assert_eq!(Expr::mul(&p, &q).kind(), ExprKind::And);
        assert_eq!(Expr::udiv(&p, &q), p);
        assert_eq!(Expr::urem(&p, &q), Expr::bool(false));
        assert_eq!(Expr::shl(&p, &q), Expr::and(&p, &Expr::is_zero(&q)));
    }

    #[test]
    fn double_negation_is_eliminated() {
        let cache = ArrayCache::new();
        let p = Expr::eq(&byte(&cache, "a"), &Expr::constant_u64(3, Expr::INT8));
        let not_p = Expr::is_zero(&p);

        assert_eq!(not_p.kind(), ExprKind::Eq);
        assert_eq!(Expr::is_zero(&not_p), p);
    }

    #[test]
    fn equality_of_identical_operands_is_true() {
        let cache = ArrayCache::new();
        let x = word(&cache, "x");
        assert!(Expr::eq(&x, &word(&cache, "x")).is_true());
    }

    #[test]
    fn equality_moves_constants_across_addition() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let shifted = Expr::add(&x, &Expr::constant_u64(2, Expr::INT8));

        assert_eq!(
            Expr::eq(&Expr::constant_u64(5, Expr::INT8), &shifted),
            Expr::eq(&Expr::constant_u64(3, Expr::INT8), &x)
        );
    }

    #[test]
    fn equality_against_extension_checks_truncation() {
        let cache = ArrayCache::new();
        let x = Expr::zext(&byte(&cache, "x"), Expr::INT32);

        assert!(Expr::eq(&Expr::constant_u64(0x100, Expr::INT32), &x).is_false());
        assert_eq!(
            Expr::eq(&Expr::constant_u64(0x10, Expr::INT32), &x),
            Expr::eq(&Expr::constant_u64(0x10, Expr::INT8), &byte(&cache, "x"))
        );
    }

    #[test]
    fn greater_than_is_rewritten_to_less_than() {
        let cache = ArrayCache::new();
        let a = word(&cache, "a");
        let b = word(&cache, "b");

        assert_eq!(Expr::ugt(&a, &b), Expr::ult(&b, &a));
        assert_eq!(Expr::sge(&a, &b), Expr::sle(&b, &a));
        assert_eq!(Expr::ne(&a, &b), Expr::is_zero(&Expr::eq(&a, &b)));
    }

    #[test]
    fn addition_reassociates_constants() {
        let cache = ArrayCache::new();
        let x = word(&cache, "x");
        let one = Expr::constant_u64(1, Expr::INT32);
        let twice = Expr::add(&Expr::add(&x, &one), &one);

        assert_eq!(twice, Expr::add(&x, &Expr::constant_u64(2, Expr::INT32)));
        assert_eq!(Expr::sub(&twice, &Expr::constant_u64(2, Expr::INT32)), x);
    }

    #[test]
    fn reads_resolve_through_matching_writes_and_constant_arrays() {
        let cache = ArrayCache::new();
        let values: Vec<_> = (0..4)
            .map(|v| Expr::constant_u64(10 + v, Expr::INT8))
            .collect();
        let table = cache.create_array("table", 4, Some(&values), Expr::INT32, Expr::INT8);

        assert_eq!(Expr::read_at(&table, 2), values[2]);

        let mut updates = UpdateList::from(table);
        updates.extend(
            Expr::constant_u64(1, Expr::INT32),
            Expr::constant_u64(99, Expr::INT8),
        );
        let read = |i: u64| Expr::read(updates.clone(), Expr::constant_u64(i, Expr::INT32));
        assert_eq!(read(1), Expr::constant_u64(99, Expr::INT8));
        assert_eq!(read(3), values[3]);

        let symbolic_index = Expr::zext(&byte(&cache, "i"), Expr::INT32);
        assert_eq!(
            Expr::read(updates.clone(), symbolic_index).kind(),
            ExprKind::Read
        );
    }

    #[test]
    fn constant_division_by_zero_does_not_panic() {
        let seven = Expr::constant_u64(7, Expr::INT8);
        let zero = Expr::zero(Expr::INT8);

        assert_eq!(Expr::udiv(&seven, &zero), Expr::constant_u64(0xff, Expr::INT8));
        assert_eq!(Expr::urem(&seven, &zero), seven);
    }
}
