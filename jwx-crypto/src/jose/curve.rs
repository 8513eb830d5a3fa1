//! Public point validation for the NIST prime curves.
//!
//! A received ECDH public key must lie on the curve of the private key it is
//! combined with, otherwise a small-subgroup point can leak bits of that
//! private key (the "invalid curve" attack). The check is done here
//! explicitly, before any point reaches the key agreement.

use std::cmp::Ordering;

use crate::jose::key::EllipticCurve;

/// Enough 64-bit limbs for the 521-bit field of P-521.
const LIMBS: usize = 9;

/// Little-endian limb representation of a non-negative integer `< 2^576`.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Uint([u64; LIMBS]);

impl Uint {
    const ZERO: Self = Self([0; LIMBS]);

    fn from_be_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > LIMBS * 8 {
            return None;
        }
        let mut limbs = [0u64; LIMBS];
        for (i, byte) in bytes.iter().rev().enumerate() {
            limbs[i / 8] |= u64::from(*byte) << ((i % 8) * 8);
        }
        Some(Self(limbs))
    }

    fn from_be_hex(hex: &str) -> Self {
        let mut limbs = [0u64; LIMBS];
        for (i, digit) in hex.bytes().rev().enumerate() {
            let nibble = u64::from(char::from(digit).to_digit(16).unwrap_or(0));
            limbs[i / 16] |= nibble << ((i % 16) * 4);
        }
        Self(limbs)
    }

    fn bits(&self) -> usize {
        for (i, limb) in self.0.iter().enumerate().rev() {
            if *limb != 0 {
                return i * 64 + (64 - limb.leading_zeros() as usize);
            }
        }
        0
    }

    fn bit(&self, index: usize) -> bool {
        (self.0[index / 64] >> (index % 64)) & 1 == 1
    }

    fn overflowing_add(&self, other: &Self) -> (Self, bool) {
        let mut out = [0u64; LIMBS];
        let mut carry = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(u64::from(carry));
            *limb = sum;
            carry = c1 || c2;
        }
        (Self(out), carry)
    }

    fn overflowing_sub(&self, other: &Self) -> (Self, bool) {
        let mut out = [0u64; LIMBS];
        let mut borrow = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(u64::from(borrow));
            *limb = diff;
            borrow = b1 || b2;
        }
        (Self(out), borrow)
    }
}

impl Ord for Uint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for Uint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Arithmetic modulo a prime `p < 2^575`; operands must already be reduced.
struct PrimeField {
    p: Uint,
}

impl PrimeField {
    fn add(&self, a: &Uint, b: &Uint) -> Uint {
        let (sum, carry) = a.overflowing_add(b);
        if carry || sum >= self.p {
            sum.overflowing_sub(&self.p).0
        } else {
            sum
        }
    }

    fn sub(&self, a: &Uint, b: &Uint) -> Uint {
        let (diff, borrow) = a.overflowing_sub(b);
        if borrow {
            diff.overflowing_add(&self.p).0
        } else {
            diff
        }
    }

    fn mul(&self, a: &Uint, b: &Uint) -> Uint {
        let mut acc = Uint::ZERO;
        for i in (0..b.bits()).rev() {
            acc = self.add(&acc, &acc);
            if b.bit(i) {
                acc = self.add(&acc, a);
            }
        }
        acc
    }
}

struct CurveParams {
    p: Uint,
    b: Uint,
}

fn params(curve: EllipticCurve) -> CurveParams {
    match curve {
        EllipticCurve::P256 => CurveParams {
            p: Uint::from_be_hex(
                "ffffffff00000001000000000000000000000000ffffffffffffffffffffffff",
            ),
            b: Uint::from_be_hex(
                "5ac635d8aa3a93e7b3ebbd55769886bc651d06b0cc53b0f63bce3c3e27d2604b",
            ),
        },
        EllipticCurve::P384 => CurveParams {
            p: Uint::from_be_hex(concat!(
                "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe",
                "ffffffff0000000000000000ffffffff",
            )),
            b: Uint::from_be_hex(concat!(
                "b3312fa7e23ee7e4988e056be3f82d19181d9c6efe8141120314088f5013875a",
                "c656398d8a2ed19d2a85c8edd3ec2aef",
            )),
        },
        EllipticCurve::P521 => CurveParams {
            // 2^521 - 1
            p: Uint::from_be_hex(concat!(
                "1ff",
                "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            )),
            b: Uint::from_be_hex(concat!(
                "0051953eb9618e1c9a1f929a21a0b68540eea2da725b99b315f3b8b489918ef1",
                "09e156193951ec7e937b1652c0bd3bb1bf073573df883d2c34f1ef451fd46b50",
                "3f00",
            )),
        },
    }
}

/// Whether the affine point `(x, y)` satisfies `y^2 = x^3 - 3x + b (mod p)`
/// with both coordinates reduced modulo `p`.
pub(crate) fn is_on_curve(curve: EllipticCurve, x: &[u8], y: &[u8]) -> bool {
    let CurveParams { p, b } = params(curve);
    let (Some(x), Some(y)) = (Uint::from_be_bytes(x), Uint::from_be_bytes(y)) else {
        return false;
    };
    if x >= p || y >= p {
        return false;
    }

    let field = PrimeField { p };
    let lhs = field.mul(&y, &y);

    let x2 = field.mul(&x, &x);
    let x3 = field.mul(&x2, &x);
    let three_x = field.add(&field.add(&x, &x), &x);
    let rhs = field.add(&field.sub(&x3, &three_x), &b);

    lhs == rhs
}
