use crate::util::MAGIC_HASH_CONSTANT;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Sub};

pub type Width = u32;

/// Fixed-width bitvector value with two's complement semantics for the
/// signed operations. Values are always kept reduced modulo `2^width`.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct BitVector {
    width: Width,
    value: BigUint,
}

fn mask(width: Width) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl BitVector {
    pub fn new(value: BigUint, width: Width) -> Self {
        assert!(width > 0, "bitvector width has to be positive");
        Self {
            width,
            value: value & mask(width),
        }
    }

    pub fn from_u64(value: u64, width: Width) -> Self {
        Self::new(BigUint::from(value), width)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(u64::from(value), 1)
    }

    /// Interprets `value` modulo `2^width`, so negative numbers wrap around.
    pub fn from_signed(value: &BigInt, width: Width) -> Self {
        let modulus = BigInt::one() << width;
        let mut reduced = value % &modulus;
        if reduced.sign() == Sign::Minus {
            reduced += &modulus;
        }
        Self::new(reduced.to_biguint().unwrap_or_default(), width)
    }

    /// Parses a radix-16 string, rejecting values that do not fit.
    pub fn from_hex(text: &str, width: Width) -> Option<Self> {
        let value = BigUint::parse_bytes(text.as_bytes(), 16)?;
        if width == 0 || value.bits() > u64::from(width) {
            None
        } else {
            Some(Self { width, value })
        }
    }

    pub fn zero(width: Width) -> Self {
        Self::new(BigUint::zero(), width)
    }

    pub fn one(width: Width) -> Self {
        Self::new(BigUint::one(), width)
    }

    pub fn ones(width: Width) -> Self {
        Self::new(mask(width), width)
    }

    pub fn signed_max(width: Width) -> Self {
        Self::new(mask(width) >> 1u32, width)
    }

    pub fn signed_min(width: Width) -> Self {
        Self::new(BigUint::one() << (width - 1), width)
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    /// Lowest 64 bits of the value.
    pub fn low_u64(&self) -> u64 {
        self.value.iter_u64_digits().next().unwrap_or(0)
    }

    pub fn to_signed(&self) -> BigInt {
        let unsigned = BigInt::from(self.value.clone());
        if self.msb() {
            unsigned - (BigInt::one() << self.width)
        } else {
            unsigned
        }
    }

    pub fn to_hex(&self) -> String {
        self.value.to_str_radix(16)
    }

    pub fn msb(&self) -> bool {
        self.value.bit(u64::from(self.width - 1))
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    pub fn is_ones(&self) -> bool {
        self.value == mask(self.width)
    }

    pub fn is_true(&self) -> bool {
        self.width == 1 && self.is_one()
    }

    pub fn is_false(&self) -> bool {
        self.width == 1 && self.is_zero()
    }

    /// Width-independent 32 bit digest of the value.
    pub fn digest(&self) -> u32 {
        self.value.iter_u32_digits().fold(0u32, |res, digit| {
            res.wrapping_mul(MAGIC_HASH_CONSTANT).wrapping_add(digit)
        })
    }

    pub fn udiv(&self, other: &Self) -> Self {
        self.check_width(other);
        if other.is_zero() {
            Self::ones(self.width)
        } else {
            Self::new(&self.value / &other.value, self.width)
        }
    }

    pub fn urem(&self, other: &Self) -> Self {
        self.check_width(other);
        if other.is_zero() {
            self.clone()
        } else {
            Self::new(&self.value % &other.value, self.width)
        }
    }

    pub fn sdiv(&self, other: &Self) -> Self {
        match (self.msb(), other.msb()) {
            (false, false) => self.udiv(other),
            (true, false) => -(-self.clone()).udiv(other),
            (false, true) => -self.udiv(&-other.clone()),
            (true, true) => (-self.clone()).udiv(&-other.clone()),
        }
    }

    pub fn srem(&self, other: &Self) -> Self {
        match (self.msb(), other.msb()) {
            (false, false) => self.urem(other),
            (true, false) => -(-self.clone()).urem(other),
            (false, true) => self.urem(&-other.clone()),
            (true, true) => -(-self.clone()).urem(&-other.clone()),
        }
    }

    pub fn shl(&self, amount: &Self) -> Self {
        match self.shift_amount(amount) {
            Some(n) => Self::new(&self.value << n, self.width),
            None => Self::zero(self.width),
        }
    }

    pub fn lshr(&self, amount: &Self) -> Self {
        match self.shift_amount(amount) {
            Some(n) => Self::new(&self.value >> n, self.width),
            None => Self::zero(self.width),
        }
    }

    pub fn ashr(&self, amount: &Self) -> Self {
        match self.shift_amount(amount) {
            Some(n) => Self::from_signed(&(self.to_signed() >> n), self.width),
            None if self.msb() => Self::ones(self.width),
            None => Self::zero(self.width),
        }
    }

    /// `self` forms the most significant bits of the result.
    pub fn concat(&self, low: &Self) -> Self {
        Self::new(
            (&self.value << low.width) | &low.value,
            self.width + low.width,
        )
    }

    pub fn extract(&self, offset: Width, width: Width) -> Self {
        assert!(offset + width <= self.width, "extract out of range");
        Self::new(&self.value >> offset, width)
    }

    pub fn zext(&self, width: Width) -> Self {
        Self::new(self.value.clone(), width)
    }

    pub fn sext(&self, width: Width) -> Self {
        if width <= self.width {
            self.zext(width)
        } else {
            Self::from_signed(&self.to_signed(), width)
        }
    }

    pub fn ult(&self, other: &Self) -> bool {
        self.check_width(other);
        self.value < other.value
    }

    pub fn ule(&self, other: &Self) -> bool {
        self.check_width(other);
        self.value <= other.value
    }

    pub fn slt(&self, other: &Self) -> bool {
        self.check_width(other);
        self.to_signed() < other.to_signed()
    }

    pub fn sle(&self, other: &Self) -> bool {
        self.check_width(other);
        self.to_signed() <= other.to_signed()
    }

    /// Unsigned order on equal widths, narrower values first otherwise.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.width
            .cmp(&other.width)
            .then_with(|| self.value.cmp(&other.value))
    }

    fn shift_amount(&self, amount: &Self) -> Option<u32> {
        amount
            .value
            .to_u32()
            .filter(|n| *n < self.width)
    }

    fn check_width(&self, other: &Self) {
        assert!(
            self.width == other.width,
            "bitvector width mismatch: {} vs {}",
            self.width,
            other.width
        );
    }
}

impl Neg for BitVector {
    type Output = BitVector;

    fn neg(self) -> Self::Output {
        let width = self.width;
        Self::zero(width) - self
    }
}

impl Add<BitVector> for BitVector {
    type Output = BitVector;

    fn add(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        Self::new(self.value + other.value, self.width)
    }
}

impl Sub<BitVector> for BitVector {
    type Output = BitVector;

    fn sub(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        let modulus = BigUint::one() << self.width;
        Self::new(self.value + modulus - other.value, self.width)
    }
}

impl Mul<BitVector> for BitVector {
    type Output = BitVector;

    fn mul(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        Self::new(self.value * other.value, self.width)
    }
}

impl BitOr<BitVector> for BitVector {
    type Output = BitVector;

    fn bitor(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        Self::new(self.value | other.value, self.width)
    }
}

impl BitAnd<BitVector> for BitVector {
    type Output = BitVector;

    fn bitand(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        Self::new(self.value & other.value, self.width)
    }
}

impl BitXor<BitVector> for BitVector {
    type Output = BitVector;

    fn bitxor(self, other: BitVector) -> Self::Output {
        self.check_width(&other);
        Self::new(self.value ^ other.value, self.width)
    }
}

impl Not for BitVector {
    type Output = BitVector;

    fn not(self) -> Self::Output {
        let width = self.width;
        Self::new(self.value ^ mask(width), width)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}:w{}", self.to_hex(), self.width)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(value: u64, width: Width) -> BitVector {
        BitVector::from_u64(value, width)
    }

    #[test]
    fn arithmetic_wraps_around_width() {
        assert_eq!(bv(255, 8) + bv(1, 8), bv(0, 8));
        assert_eq!(bv(0, 8) - bv(1, 8), bv(255, 8));
        assert_eq!(bv(16, 8) * bv(16, 8), bv(0, 8));
        assert_eq!(-bv(1, 32), BitVector::ones(32));
        assert_eq!(!bv(0x0f, 8), bv(0xf0, 8));
    }

    #[test]
    fn division_by_zero_follows_smtlib() {
        assert_eq!(bv(7, 8).udiv(&bv(0, 8)), bv(255, 8));
        assert_eq!(bv(7, 8).urem(&bv(0, 8)), bv(7, 8));
    }

    #[test]
    fn signed_division_truncates_towards_zero() {
        let minus_seven = -bv(7, 8);
        assert_eq!(minus_seven.sdiv(&bv(2, 8)), -bv(3, 8));
        assert_eq!(minus_seven.srem(&bv(2, 8)), -bv(1, 8));
        assert_eq!(bv(7, 8).srem(&-bv(2, 8)), bv(1, 8));
    }

    #[test]
    fn shifts_saturate_at_width() {
        assert_eq!(bv(1, 8).shl(&bv(3, 8)), bv(8, 8));
        assert_eq!(bv(1, 8).shl(&bv(8, 8)), bv(0, 8));
        assert_eq!(bv(0x80, 8).ashr(&bv(7, 8)), bv(0xff, 8));
        assert_eq!(bv(0x80, 8).ashr(&bv(9, 8)), bv(0xff, 8));
        assert_eq!(bv(0x80, 8).lshr(&bv(7, 8)), bv(1, 8));
    }

    #[test]
    fn wide_values_survive_hex_encoding() {
        let wide = bv(u64::MAX, 64).zext(80).shl(&bv(8, 80));
        assert_eq!(wide.width(), 80);
        assert!(wide.to_u64().is_none());
        assert_eq!(BitVector::from_hex(&wide.to_hex(), 80), Some(wide));
        assert!(BitVector::from_hex("1ff", 8).is_none());
    }

    #[test]
    fn concat_extract_and_extensions() {
        let word = bv(0xab, 8).concat(&bv(0xcd, 8));
        assert_eq!(word, bv(0xabcd, 16));
        assert_eq!(word.extract(8, 8), bv(0xab, 8));
        assert_eq!(bv(0x80, 8).sext(16), bv(0xff80, 16));
        assert_eq!(bv(0x80, 8).zext(16), bv(0x0080, 16));
    }

    #[test]
    fn signed_comparisons() {
        assert!((-bv(1, 8)).slt(&bv(0, 8)));
        assert!(!(-bv(1, 8)).ult(&bv(0, 8)));
        assert_eq!(BitVector::signed_max(8), bv(0x7f, 8));
        assert_eq!(BitVector::signed_min(8), bv(0x80, 8));
    }
}
