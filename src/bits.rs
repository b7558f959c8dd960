//! Opaque bit-vector constant arithmetic.
//!
//! Bit-vector constants are normally an external collaborator, queried only
//! through a handful of operations (new, copy, free, not, compare,
//! equality-hash, set/read bit, width query, signed/unsigned int-to-bv).
//! This module is that library's stand-in: `BitVector` is a width plus a
//! `Vec<usize>` of limbs, with the two's-complement and bitwise-complement
//! operations a bit-precise term language needs.

use std::fmt;

const LIMB_BITS: usize = usize::BITS as usize;

/// A fixed-width bit-vector constant, treated as both unsigned and
/// two's-complement signed depending on the operation applied to it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    width: u32,
    limbs: Vec<usize>,
}

fn limbs_for(width: u32) -> usize {
    ((width as usize) + LIMB_BITS - 1) / LIMB_BITS
}

impl BitVector {
    /// all-zero bit-vector of the given width
    pub fn zero(width: u32) -> BitVector {
        assert!(width > 0, "bit-vector width must be positive");
        BitVector {
            width,
            limbs: vec![0; limbs_for(width)],
        }
    }

    /// all-one bit-vector of the given width
    pub fn ones(width: u32) -> BitVector {
        let mut bv = BitVector::zero(width);
        for i in 0..width {
            bv.set_bit(i, true);
        }
        bv
    }

    pub fn one(width: u32) -> BitVector {
        let mut bv = BitVector::zero(width);
        bv.set_bit(0, true);
        bv
    }

    /// construct from an unsigned value, truncated (or zero-extended) to `width`
    pub fn from_u64(width: u32, value: u64) -> BitVector {
        let mut bv = BitVector::zero(width);
        for i in 0..width.min(64) {
            bv.set_bit(i, (value >> i) & 1 == 1);
        }
        bv
    }

    /// construct from a signed value, sign-extended or truncated to `width`
    pub fn from_i64(width: u32, value: i64) -> BitVector {
        BitVector::from_u64(width, value as u64)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn get_bit(&self, ix: u32) -> bool {
        assert!(ix < self.width, "bit index out of range");
        let ix = ix as usize;
        (self.limbs[ix / LIMB_BITS] >> (ix % LIMB_BITS)) & 1 == 1
    }

    #[inline]
    pub fn set_bit(&mut self, ix: u32, v: bool) {
        assert!(ix < self.width, "bit index out of range");
        let ix = ix as usize;
        let limb = &mut self.limbs[ix / LIMB_BITS];
        let mask = 1usize << (ix % LIMB_BITS);
        if v {
            *limb |= mask;
        } else {
            *limb &= !mask;
        }
    }

    /// bitwise complement (NOT each bit) — used by constant normalization
    /// and the `not` derived operator.
    pub fn complement(&self) -> BitVector {
        let mut res = self.clone();
        for limb in res.limbs.iter_mut() {
            *limb = !*limb;
        }
        res.mask_high();
        res
    }

    fn mask_high(&mut self) {
        let used = self.width as usize % LIMB_BITS;
        if used != 0 {
            if let Some(last) = self.limbs.last_mut() {
                *last &= (1usize << used) - 1;
            }
        }
    }

    /// lowest bit, used by the constant-normalization invariant
    pub fn low_bit(&self) -> bool {
        self.get_bit(0)
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&l| l == 0)
    }

    /// top (most-significant / sign) bit
    pub fn sign_bit(&self) -> bool {
        self.get_bit(self.width - 1)
    }

    pub fn as_u64(&self) -> u64 {
        assert!(self.width <= 64, "as_u64 only valid for width <= 64");
        let mut v = 0u64;
        for i in 0..self.width {
            if self.get_bit(i) {
                v |= 1 << i;
            }
        }
        v
    }

    pub fn as_i64(&self) -> i64 {
        let u = self.as_u64();
        if self.width < 64 && self.sign_bit() {
            (u as i64) - (1i64 << self.width)
        } else {
            u as i64
        }
    }

    /// two's-complement negation: !self + 1
    pub fn neg(&self) -> BitVector {
        let mut res = self.complement();
        res.inc_in_place();
        res
    }

    fn inc_in_place(&mut self) {
        let mut carry = true;
        for i in 0..self.width {
            if !carry {
                break;
            }
            let bit = self.get_bit(i);
            self.set_bit(i, !bit);
            carry = bit;
        }
    }

    pub fn eq_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut h = fxhash::FxHasher::default();
        self.hash(&mut h);
        h.finish()
    }

    /// bitwise AND; both operands must share a width.
    pub fn and(&self, other: &BitVector) -> BitVector {
        assert_eq!(self.width, other.width, "BitVector::and: width mismatch");
        let mut out = BitVector::zero(self.width);
        for i in 0..self.width {
            out.set_bit(i, self.get_bit(i) && other.get_bit(i));
        }
        out
    }

    /// fixed-width addition, wrapping mod 2^width.
    pub fn add(&self, other: &BitVector) -> BitVector {
        assert_eq!(self.width, other.width, "BitVector::add: width mismatch");
        let mut out = BitVector::zero(self.width);
        let mut carry = false;
        for i in 0..self.width {
            let a = self.get_bit(i);
            let b = other.get_bit(i);
            out.set_bit(i, a ^ b ^ carry);
            carry = (a && b) || (carry && (a ^ b));
        }
        out
    }

    /// fixed-width multiplication, wrapping mod 2^width (shift-and-add).
    pub fn mul(&self, other: &BitVector) -> BitVector {
        assert_eq!(self.width, other.width, "BitVector::mul: width mismatch");
        let mut acc = BitVector::zero(self.width);
        for i in 0..self.width {
            if other.get_bit(i) {
                acc = acc.add(&self.shl(i));
            }
        }
        acc
    }

    /// logical shift left by `amount` bits; bits shifted past the top are
    /// discarded, the bottom is zero-filled.
    pub fn shl(&self, amount: u32) -> BitVector {
        let mut out = BitVector::zero(self.width);
        if amount >= self.width {
            return out;
        }
        for i in amount..self.width {
            out.set_bit(i, self.get_bit(i - amount));
        }
        out
    }

    /// logical shift right by `amount` bits, zero-filled from the top.
    pub fn lshr(&self, amount: u32) -> BitVector {
        let mut out = BitVector::zero(self.width);
        if amount >= self.width {
            return out;
        }
        for i in 0..(self.width - amount) {
            out.set_bit(i, self.get_bit(i + amount));
        }
        out
    }

    /// unsigned less-than.
    pub fn ult(&self, other: &BitVector) -> bool {
        assert_eq!(self.width, other.width, "BitVector::ult: width mismatch");
        for i in (0..self.width).rev() {
            let a = self.get_bit(i);
            let b = other.get_bit(i);
            if a != b {
                return !a && b;
            }
        }
        false
    }

    /// restoring binary long division: `(quotient, remainder)`.
    fn divmod(&self, other: &BitVector) -> (BitVector, BitVector) {
        let mut quotient = BitVector::zero(self.width);
        let mut remainder = BitVector::zero(self.width);
        for i in (0..self.width).rev() {
            remainder = remainder.shl(1);
            remainder.set_bit(0, self.get_bit(i));
            if !remainder.ult(other) {
                remainder = remainder.add(&other.neg());
                quotient.set_bit(i, true);
            }
        }
        (quotient, remainder)
    }

    /// unsigned division; division by zero yields all-ones, the standard
    /// SMT-LIB bit-vector convention.
    pub fn udiv(&self, other: &BitVector) -> BitVector {
        assert_eq!(self.width, other.width, "BitVector::udiv: width mismatch");
        if other.is_zero() {
            return BitVector::ones(self.width);
        }
        self.divmod(other).0
    }

    /// unsigned remainder; remainder by zero yields the dividend, the
    /// standard SMT-LIB bit-vector convention.
    pub fn urem(&self, other: &BitVector) -> BitVector {
        assert_eq!(self.width, other.width, "BitVector::urem: width mismatch");
        if other.is_zero() {
            return self.clone();
        }
        self.divmod(other).1
    }

    /// concatenation: `self` supplies the high bits, `lower` the low bits.
    pub fn concat(&self, lower: &BitVector) -> BitVector {
        let mut out = BitVector::zero(self.width + lower.width);
        for i in 0..lower.width {
            out.set_bit(i, lower.get_bit(i));
        }
        for i in 0..self.width {
            out.set_bit(lower.width + i, self.get_bit(i));
        }
        out
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0b")?;
        for i in (0..self.width).rev() {
            write!(f, "{}", if self.get_bit(i) { '1' } else { '0' })?;
        }
        write!(f, ":{}", self.width)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
