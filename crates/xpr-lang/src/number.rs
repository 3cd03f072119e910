use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// A double-precision number with JavaScript-compatible formatting and coercion rules.
#[derive(Debug, Clone, PartialEq, Copy, Default)]
pub struct Number(f64);

/// Represents a Not-a-Number (NaN) value.
pub const NAN: Number = Number(f64::NAN);

/// Represents positive infinity.
pub const INFINITE: Number = Number(f64::INFINITY);

impl Number {
    /// Creates a new `Number` from an `f64` value.
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    /// Returns the underlying `f64` value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Truncates toward zero. NaN maps to zero and infinities saturate.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    /// Returns `true` if the number is finite and has no fractional part.
    pub fn is_int(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }

    pub fn abs(&self) -> Self {
        Number(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    /// Rounds half toward positive infinity, keeping the sign of zero.
    pub fn round(&self) -> Self {
        let floor = self.0.floor();
        let rounded = if self.0 - floor >= 0.5 { floor + 1.0 } else { floor };

        if rounded == 0.0 {
            Number(rounded.copysign(self.0))
        } else {
            Number(rounded)
        }
    }

    /// Parses text the way a numeric conversion of a string does: surrounding
    /// whitespace is ignored, an empty string is zero, `0x`/`0o`/`0b` prefixes
    /// and `Infinity` are accepted, and anything else that is not a decimal
    /// literal is NaN.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if text.is_empty() {
            return Number(0.0);
        }

        let radix = match text.get(..2) {
            Some("0x") | Some("0X") => Some(16),
            Some("0o") | Some("0O") => Some(8),
            Some("0b") | Some("0B") => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            let digits = &text[2..];
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return NAN;
            }
            return Number(
                digits
                    .chars()
                    .filter_map(|c| c.to_digit(radix))
                    .fold(0.0, |acc, d| acc * radix as f64 + d as f64),
            );
        }

        let (sign, unsigned) = match text.as_bytes()[0] {
            b'-' => (-1.0, &text[1..]),
            b'+' => (1.0, &text[1..]),
            _ => (1.0, text),
        };

        if unsigned == "Infinity" {
            return Number(sign * f64::INFINITY);
        }

        canonical_decimal(unsigned)
            .and_then(|canonical| canonical.parse::<f64>().ok())
            .map(|n| Number(sign * n))
            .unwrap_or(NAN)
    }
}

/// Rewrites `int[.frac][e[+-]exp]` into a form every float parser accepts, or `None`
/// when the text is not a decimal literal.
fn canonical_decimal(text: &str) -> Option<String> {
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());

    if (int_part.is_empty() && frac_part.is_empty()) || !digits_only(int_part) || !digits_only(frac_part) {
        return None;
    }

    let exponent = match exponent {
        None => "0",
        Some(exponent) => {
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if digits.is_empty() || !digits_only(digits) {
                return None;
            }
            exponent
        }
    };

    Some(format!(
        "{}.{}e{}",
        if int_part.is_empty() { "0" } else { int_part },
        if frac_part.is_empty() { "0" } else { frac_part },
        exponent
    ))
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Number(-self.0)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number(value as f64)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number(value as f64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl From<bool> for Number {
    fn from(value: bool) -> Self {
        Number(if value { 1.0 } else { 0.0 })
    }
}

/// Shortest round-trip rendering, switching to exponent notation outside `1e-7..1e21`.
impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;

        if value.is_nan() {
            return write!(f, "NaN");
        }
        if value.is_infinite() {
            return write!(f, "{}", if value > 0.0 { "Infinity" } else { "-Infinity" });
        }
        if value == 0.0 {
            return write!(f, "0");
        }
        if value < 0.0 {
            write!(f, "-")?;
        }

        let scientific = format!("{:e}", value.abs());
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
        let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let k = digits.len() as i32;
        let n = exponent + 1;

        if k <= n && n <= 21 {
            write!(f, "{}{}", digits, "0".repeat((n - k) as usize))
        } else if 0 < n && n <= 21 {
            write!(f, "{}.{}", &digits[..n as usize], &digits[n as usize..])
        } else if -6 < n && n <= 0 {
            write!(f, "0.{}{}", "0".repeat((-n) as usize), digits)
        } else {
            let sign = if n - 1 < 0 { '-' } else { '+' };
            if k == 1 {
                write!(f, "{}e{}{}", digits, sign, (n - 1).abs())
            } else {
                write!(f, "{}.{}e{}{}", &digits[..1], &digits[1..], sign, (n - 1).abs())
            }
        }
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Number(self.0 + other.0)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Number(self.0 - other.0)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Number(self.0 * other.0)
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Number(self.0 / other.0)
    }
}

impl Rem for Number {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        Number(self.0 % other.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}
