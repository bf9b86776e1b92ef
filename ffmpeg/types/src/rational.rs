/*!
    Rational numbers used for timebases and frame rates.
*/

use std::fmt;

/**
    A rational number, `num / den`.

    Timestamps throughout the ecosystem are integer ticks whose unit is a
    `Rational` timebase, e.g. `1/90000` of a second.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns true if both components are non-zero, which every timebase must be.
    */
    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    /**
        Returns the value as a float. Zero denominators yield `0.0`.
    */
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /**
        Rescale a timestamp from one timebase to another.

        Computes `ts * from / to` in 128-bit arithmetic so the intermediate
        product cannot overflow, rounds half away from zero and saturates at
        the `i64` range. Returns `None` if either timebase is invalid.
    */
    pub fn rescale(ts: i64, from: Rational, to: Rational) -> Option<i64> {
        if !from.is_valid() || !to.is_valid() {
            return None;
        }
        if from == to {
            return Some(ts);
        }

        let mut num = ts as i128 * from.num as i128 * to.den as i128;
        let mut den = from.den as i128 * to.num as i128;
        if den < 0 {
            num = -num;
            den = -den;
        }

        let mut quotient = num / den;
        let remainder = num % den;
        if remainder.abs() * 2 >= den {
            quotient += num.signum();
        }

        Some(quotient.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_millis_to_mpeg_clock() {
        let ms = Rational::new(1, 1000);
        let mpeg = Rational::new(1, 90000);
        assert_eq!(Rational::rescale(0, ms, mpeg), Some(0));
        assert_eq!(Rational::rescale(1000, ms, mpeg), Some(90000));
        assert_eq!(Rational::rescale(2000, ms, mpeg), Some(180000));
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        let mpeg = Rational::new(1, 90000);
        let ms = Rational::new(1, 1000);
        // 45 ticks = 0.5ms
        assert_eq!(Rational::rescale(45, mpeg, ms), Some(1));
        assert_eq!(Rational::rescale(44, mpeg, ms), Some(0));
        assert_eq!(Rational::rescale(-45, mpeg, ms), Some(-1));
    }

    #[test]
    fn rescale_does_not_overflow() {
        let ns = Rational::new(1, 1_000_000_000);
        let mpeg = Rational::new(1, 90000);
        let ts = i64::MAX / 2;
        let rescaled = Rational::rescale(ts, ns, mpeg).unwrap();
        assert!(rescaled > 0);
        assert_eq!(Rational::rescale(i64::MAX, mpeg, ns), Some(i64::MAX));
    }

    #[test]
    fn rescale_rejects_invalid_timebase() {
        assert_eq!(
            Rational::rescale(10, Rational::new(1, 0), Rational::new(1, 1000)),
            None
        );
        assert_eq!(
            Rational::rescale(10, Rational::new(1, 1000), Rational::new(0, 1)),
            None
        );
    }

    #[test]
    fn rational_display_and_float() {
        let r = Rational::new(24000, 1001);
        assert_eq!(r.to_string(), "24000/1001");
        assert!((r.to_f64() - 23.976).abs() < 0.001);
        assert_eq!(Rational::new(1, 0).to_f64(), 0.0);
    }
}
