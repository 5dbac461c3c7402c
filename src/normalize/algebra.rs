use crate::bitvec::BitVector;
use crate::expr::visitor::{ExprVisitor, VisitMemo};
use crate::expr::{Expr, ExprKind, ExprRef, Node};
use log::trace;

/// Rewrites comparisons towards strict less-than.
///
/// Negated `<` and `<=` are flipped into their positive duals, and a
/// non-strict comparison against a constant is made strict by moving the
/// constant by one. The shift is skipped where it would wrap around, so
/// `x <= UMAX` stays as it is.
#[derive(Default)]
pub struct AlgebraNormalizer {
    memo: VisitMemo,
}

impl AlgebraNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, expr: &ExprRef) -> ExprRef {
        self.visit(expr)
    }

    pub fn normalize_all<'a, I>(&mut self, exprs: I) -> Vec<ExprRef>
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        exprs.into_iter().map(|expr| self.visit(expr)).collect()
    }
}

impl ExprVisitor for AlgebraNormalizer {
    fn memo(&mut self) -> &mut VisitMemo {
        &mut self.memo
    }

    fn post_visit(&mut self, expr: ExprRef) -> ExprRef {
        let flipped = flip_negation(&expr).unwrap_or(expr);
        make_strict(&flipped).unwrap_or(flipped)
    }
}

//
// Private Implementation
//

fn flip_negation(expr: &ExprRef) -> Option<ExprRef> {
    let negated = match expr.node() {
        Node::Binary {
            kind: ExprKind::Eq,
            left,
            right,
        } if left.is_false() => right,
        _ => return None,
    };

    match negated.node() {
        Node::Binary { kind, left, right } => {
            #[rustfmt::skip]
            let flipped = match kind {
                ExprKind::Ult => Expr::ule(right, left),
                ExprKind::Ule => Expr::ult(right, left),
                ExprKind::Slt => Expr::sle(right, left),
                ExprKind::Sle => Expr::slt(right, left),
                _ => return None,
            };
            trace!("flipped negated {} into {}", kind, flipped.kind());
            Some(flipped)
        }
        _ => None,
    }
}

fn make_strict(expr: &ExprRef) -> Option<ExprRef> {
    let (kind, left, right) = match expr.node() {
        Node::Binary { kind, left, right }
            if matches!(kind, ExprKind::Ule | ExprKind::Sle) && left.width() > Expr::BOOL =>
        {
            (*kind, left, right)
        }
        _ => return None,
    };
    let signed = kind == ExprKind::Sle;
    let width = left.width();
    let one = BitVector::one(width);

    if let Some(bound) = right.as_constant() {
        let limit = if signed {
            BitVector::signed_max(width)
        } else {
            BitVector::ones(width)
        };
        if *bound == limit {
            return None;
        }
        // a <= c  <=>  a < c + 1
        let shifted = Expr::constant(bound.clone() + one);
        return Some(strict(signed, left, &shifted));
    }

    if let Some(bound) = left.as_constant() {
        let limit = if signed {
            BitVector::signed_min(width)
        } else {
            BitVector::zero(width)
        };
        if *bound == limit {
            return None;
        }
        // c <= b  <=>  c - 1 < b
        let shifted = Expr::constant(bound.clone() - one);
        return Some(strict(signed, &shifted, right));
    }

    None
}

fn strict(signed: bool, left: &ExprRef, right: &ExprRef) -> ExprRef {
    if signed {
        Expr::slt(left, right)
    } else {
        Expr::ult(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ArrayCache;

    fn byte(cache: &ArrayCache, name: &str) -> ExprRef {
        Expr::read_at(&cache.create_array(name, 1, None, Expr::INT32, Expr::INT8), 0)
    }

    fn c(value: u64) -> ExprRef {
        Expr::constant_u64(value, Expr::INT8)
    }

    #[test]
    fn non_strict_bounds_become_strict() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let mut normalizer = AlgebraNormalizer::new();

        assert_eq!(normalizer.normalize(&Expr::ule(&x, &c(9))), Expr::ult(&x, &c(10)));
        assert_eq!(normalizer.normalize(&Expr::ule(&c(9), &x)), Expr::ult(&c(8), &x));
        assert_eq!(
            normalizer.normalize(&Expr::sle(&x, &c(0x10))),
            Expr::slt(&x, &c(0x11))
        );
    }

    #[test]
    fn boundary_constants_are_left_alone() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let mut normalizer = AlgebraNormalizer::new();

        let at_max = Expr::ule(&x, &c(0xff));
        let at_zero = Expr::ule(&c(0), &x);
        let at_smax = Expr::sle(&x, &c(0x7f));
        let at_smin = Expr::sle(&c(0x80), &x);

        assert_eq!(normalizer.normalize(&at_max), at_max);
        assert_eq!(normalizer.normalize(&at_zero), at_zero);
        assert_eq!(normalizer.normalize(&at_smax), at_smax);
        assert_eq!(normalizer.normalize(&at_smin), at_smin);
    }

    #[test]
    fn negated_comparisons_are_flipped() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let y = byte(&cache, "y");
        let mut normalizer = AlgebraNormalizer::new();

        let not_less = Expr::is_zero(&Expr::ult(&x, &y));
        assert_eq!(normalizer.normalize(&not_less), Expr::ule(&y, &x));

        let not_less_equal = Expr::is_zero(&Expr::sle(&x, &y));
        assert_eq!(normalizer.normalize(&not_less_equal), Expr::slt(&y, &x));
    }

    #[test]
    fn equivalent_spellings_share_one_normal_form() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let mut normalizer = AlgebraNormalizer::new();

        // x > 4, !(x <= 4) and 5 <= x all mean the same
        let spellings = vec![
            Expr::ugt(&x, &c(4)),
            Expr::is_zero(&Expr::ule(&x, &c(4))),
            Expr::ule(&c(5), &x),
        ];
        let normalized = normalizer.normalize_all(&spellings);

        assert!(normalized.iter().all(|e| *e == normalized[0]));
        assert_eq!(normalized[0], Expr::ult(&c(4), &x));
    }

    #[test]
    fn equalities_and_boolean_comparisons_are_untouched() {
        let cache = ArrayCache::new();
        let x = byte(&cache, "x");
        let mut normalizer = AlgebraNormalizer::new();

        let eq = Expr::eq(&x, &c(3));
        assert_eq!(normalizer.normalize(&eq), eq);

        let flag = Expr::extract(&x, 0, 1);
        let bool_cmp = Expr::ule(&flag, &Expr::bool(false));
        assert_eq!(normalizer.normalize(&bool_cmp), bool_cmp);
    }
}
