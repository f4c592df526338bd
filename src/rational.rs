use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// A fraction laid out like the native `AVRational`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

pub const FRAME_RATE_24: Rational = Rational::new(24, 1);
pub const FRAME_RATE_25: Rational = Rational::new(25, 1);
pub const FRAME_RATE_30: Rational = Rational::new(30, 1);
/// 29.97 fps (NTSC)
pub const FRAME_RATE_29_97: Rational = Rational::new(30000, 1001);
pub const FRAME_RATE_50: Rational = Rational::new(50, 1);
pub const FRAME_RATE_60: Rational = Rational::new(60, 1);
/// Microsecond time base used for native timestamps.
pub const TIME_BASE_MICROS: Rational = Rational::new(1, 1_000_000);

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Rational { num, den }
    }

    /// Value as a float; `0.0` when the denominator is zero.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    pub fn invert(self) -> Self {
        Rational::new(self.den, self.num)
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    /// Lowest terms with a positive denominator. A zero denominator is
    /// returned unchanged.
    pub fn reduce(self) -> Self {
        if self.den == 0 {
            return self;
        }
        from_wide(self.num as i128, self.den as i128)
    }

    /// Orders by value; zero denominators compare by cross-multiplication
    /// like any other value.
    pub fn compare(self, other: Rational) -> Ordering {
        let (an, ad) = self.widened();
        let (bn, bd) = other.widened();
        (an * bd).cmp(&(bn * ad))
    }

    /// Numerator and denominator in `i128`, denominator made non-negative.
    fn widened(self) -> (i128, i128) {
        let (num, den) = (self.num as i128, self.den as i128);
        if den < 0 {
            (-num, -den)
        } else {
            (num, den)
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Rational::new(num, den)
    }
}

impl Mul for Rational {
    type Output = Rational;

    fn mul(self, rhs: Rational) -> Rational {
        arith(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Div for Rational {
    type Output = Rational;

    fn div(self, rhs: Rational) -> Rational {
        self * rhs.invert()
    }
}

impl Add for Rational {
    type Output = Rational;

    fn add(self, rhs: Rational) -> Rational {
        arith(
            self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Sub for Rational {
    type Output = Rational;

    fn sub(self, rhs: Rational) -> Rational {
        arith(
            self.num as i128 * rhs.den as i128 - rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

fn arith(num: i128, den: i128) -> Rational {
    if den == 0 {
        return Rational::new(0, 1);
    }
    from_wide(num, den)
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Reduces `num/den` (den != 0) and, if the result still does not fit in
/// `i32`, picks the closest continued-fraction convergent that does.
fn from_wide(num: i128, den: i128) -> Rational {
    let negative = (num < 0) != (den < 0);
    let (mut n, mut d) = (num.abs(), den.abs());
    let g = gcd(n, d);
    if g > 1 {
        n /= g;
        d /= g;
    }

    let max = i32::MAX as i128;
    let (rn, rd) = if n <= max && d <= max {
        (n, d)
    } else {
        approximate(n, d, max)
    };

    let rn = rn as i32;
    Rational::new(if negative { -rn } else { rn }, rd as i32)
}

fn approximate(mut n: i128, mut d: i128, max: i128) -> (i128, i128) {
    // convergents h(k-2)/k(k-2) and h(k-1)/k(k-1)
    let (mut h0, mut k0) = (0i128, 1i128);
    let (mut h1, mut k1) = (1i128, 0i128);

    while d != 0 {
        let x = n / d;
        let h2 = x * h1 + h0;
        let k2 = x * k1 + k0;
        if h2 > max || k2 > max {
            // largest semiconvergent still within range
            let mut y = x;
            if h1 != 0 {
                y = y.min((max - h0) / h1);
            }
            if k1 != 0 {
                y = y.min((max - k0) / k1);
            }
            if 2 * y >= x && y > 0 {
                h1 = y * h1 + h0;
                k1 = y * k1 + k0;
            }
            break;
        }
        h0 = h1;
        k0 = k1;
        h1 = h2;
        k1 = k2;
        let rem = n - d * x;
        n = d;
        d = rem;
    }

    if k1 == 0 {
        // value too large to represent; clamp
        return (max, 1);
    }
    (h1, k1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_reduce() {
        assert_eq!(Rational::new(6, 4).reduce(), Rational::new(3, 2));
        assert_eq!(Rational::new(-6, -4).reduce(), Rational::new(3, 2));
        assert_eq!(Rational::new(6, -4).reduce(), Rational::new(-3, 2));
        assert_eq!(Rational::new(5, 0).reduce(), Rational::new(5, 0));
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(Rational::new(1, 0).to_f64(), 0.0);
        assert_eq!(Rational::new(1, 0) * Rational::new(1, 2), Rational::new(0, 1));
        assert_eq!(Rational::new(1, 2) / Rational::new(0, 1), Rational::new(0, 1));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Rational::new(1, 2) * Rational::new(3, 4), Rational::new(3, 8));
        assert_eq!(Rational::new(1, 2) + Rational::new(1, 3), Rational::new(5, 6));
        assert_eq!(Rational::new(1, 2) - Rational::new(1, 3), Rational::new(1, 6));
        assert_eq!(Rational::new(1, 2) / Rational::new(1, 4), Rational::new(2, 1));
        assert_eq!(FRAME_RATE_29_97.invert(), Rational::new(1001, 30000));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Rational::new(1, 2).compare(Rational::new(1, 3)), Ordering::Greater);
        assert_eq!(Rational::new(1, 3).compare(Rational::new(1, 2)), Ordering::Less);
        assert_eq!(Rational::new(2, 4).compare(Rational::new(1, 2)), Ordering::Equal);
        assert_eq!(Rational::new(1, -2).compare(Rational::new(0, 1)), Ordering::Less);
    }

    #[test]
    fn test_compare_extreme_denominators() {
        assert_eq!(Rational::new(1, i32::MIN).compare(Rational::new(0, 1)), Ordering::Less);
        assert_eq!(Rational::new(-1, i32::MIN).compare(Rational::new(0, 1)), Ordering::Greater);
        assert_eq!(Rational::new(i32::MIN, i32::MIN).compare(Rational::new(1, 1)), Ordering::Equal);
        assert_eq!(
            Rational::new(i32::MIN, -1).compare(Rational::new(i32::MAX, 1)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_out_of_range_is_approximated() {
        let big = Rational::new(i32::MAX, 3) * Rational::new(7, 5);
        assert!(big.den > 0);
        let exact = (i32::MAX as f64 / 3.0) * (7.0 / 5.0);
        assert!((big.to_f64() - exact).abs() / exact < 1e-6);

        let tiny = Rational::new(1, i32::MAX) * Rational::new(1, 3);
        assert_eq!(tiny.num, 0);
    }

    #[quickcheck]
    fn prop_reduce_preserves_value(num: i32, den: i32) -> bool {
        if den == 0 || num == i32::MIN || den == i32::MIN {
            return true;
        }
        let r = Rational::new(num, den).reduce();
        r.den > 0
            && gcd(r.num as i128, r.den as i128).abs() == 1
            && r.num as i64 * den as i64 == num as i64 * r.den as i64
    }

    #[quickcheck]
    fn prop_small_mul_exact(a: i16, b: i16, c: i16, d: i16) -> bool {
        if b == 0 || d == 0 {
            return true;
        }
        let product = Rational::new(a as i32, b as i32) * Rational::new(c as i32, d as i32);
        product.num as i64 * (b as i64 * d as i64) == (a as i64 * c as i64) * product.den as i64
    }
}
